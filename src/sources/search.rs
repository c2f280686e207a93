//! Suggestion Resolver: turns a free-text term into candidate matches.
//!
//! The upstream search endpoint normally answers with a JSON array of
//! loosely-typed records, but occasionally mislabels the content type or
//! serves plain HTML. Responses are therefore JSON-probed regardless of
//! label, with an anchor-scraping fallback over the raw body.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::entities::{DocumentKind, DrugSuggestion};
use crate::error::LactError;
use crate::sources::fetch::{FetchError, fetch_document};
use crate::sources::rate_limit::RateGovernor;
use crate::sources::{HeaderProfile, SEARCH_PATH};
use crate::utils::slug::{build_drug_url, create_slug};
use crate::utils::text::clean_fragment;

/// Field aliases probed for a record's display name, most specific first.
const NAME_KEYS: [&str; 4] = ["nombre_en", "nombre", "name", "title"];
/// Field aliases probed for the record's classification hint.
const KIND_KEYS: [&str; 3] = ["tipo", "type", "category"];
/// Field aliases probed for the record's slug.
const SLUG_KEYS: [&str; 2] = ["slug", "id"];

static DETAIL_ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<a[^>]+href="(/breastfeeding/[a-z0-9_-]+/(product|tradename|writing)/)"[^>]*>(.*?)</a>"#,
    )
    .expect("valid regex")
});

/// Queries the upstream search endpoint and normalizes the response into a
/// deduplicated suggestion list.
///
/// A failure of the search request itself is surfaced as
/// [`LactError::SearchFailed`]; there is no further fallback once the search
/// call cannot be made.
pub(crate) async fn search_drugs(
    client: &reqwest::Client,
    governor: &RateGovernor,
    base: &str,
    query: &str,
) -> Result<Vec<DrugSuggestion>, LactError> {
    let term = query.trim();
    if term.is_empty() {
        return Err(LactError::InvalidArgument("search term is required".into()));
    }

    let mut url = reqwest::Url::parse(&format!("{base}/{SEARCH_PATH}/")).map_err(|err| {
        LactError::InvalidArgument(format!("invalid upstream base '{base}': {err}"))
    })?;
    url.query_pairs_mut().append_pair("query", term);

    let doc = fetch_document(client, governor, url.as_str(), HeaderProfile::Json)
        .await
        .map_err(|err| search_failed(&err))?;

    let labeled_json = doc
        .media_type()
        .is_some_and(|mt| mt == "application/json" || mt == "text/json" || mt.ends_with("+json"));

    let raw = match serde_json::from_str::<Value>(&doc.body) {
        Ok(value) => suggestions_from_json(&value),
        Err(err) => {
            if labeled_json {
                warn!(%err, "search response labeled JSON but failed to parse; scanning body for anchors");
            } else {
                debug!("search response is not JSON; scanning body for anchors");
            }
            suggestions_from_html(&doc.body)
        }
    };

    Ok(dedupe_suggestions(raw))
}

fn search_failed(err: &FetchError) -> LactError {
    match err {
        FetchError::NotFound { status, excerpt } => LactError::SearchFailed {
            status: status.as_u16().to_string(),
            message: if excerpt.is_empty() {
                "search endpoint returned an error status".to_string()
            } else {
                excerpt.clone()
            },
        },
        FetchError::Transport(source) => LactError::SearchFailed {
            status: "transport".to_string(),
            message: source.to_string(),
        },
        FetchError::BodyTooLarge { limit } => LactError::SearchFailed {
            status: "oversized".to_string(),
            message: format!("search response exceeded {limit} bytes"),
        },
    }
}

fn suggestions_from_json(value: &Value) -> Vec<DrugSuggestion> {
    let records = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => ["results", "suggestions", "data"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    records.iter().filter_map(suggestion_from_record).collect()
}

fn suggestion_from_record(record: &Value) -> Option<DrugSuggestion> {
    let name = probe_str(record, &NAME_KEYS)?.to_string();

    let kind = probe_str(record, &KIND_KEYS)
        .map(DocumentKind::from_hint)
        .unwrap_or(DocumentKind::Product);

    let slug = probe_str(record, &SLUG_KEYS)
        .map(create_slug)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| create_slug(&name));
    if slug.is_empty() {
        return None;
    }

    Some(DrugSuggestion {
        name,
        url: Some(build_drug_url(&slug, kind)),
        category: Some(kind.as_str().to_string()),
    })
}

/// First present, non-placeholder string among the aliased keys.
fn probe_str<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|v| !is_placeholder(v))
}

fn is_placeholder(value: &str) -> bool {
    value.is_empty()
        || value.eq_ignore_ascii_case("undefined")
        || value.eq_ignore_ascii_case("null")
}

fn suggestions_from_html(body: &str) -> Vec<DrugSuggestion> {
    DETAIL_ANCHOR_RE
        .captures_iter(body)
        .filter_map(|caps| {
            let name = clean_fragment(&caps[3]);
            if is_placeholder(&name) {
                return None;
            }
            Some(DrugSuggestion {
                name,
                url: Some(caps[1].to_string()),
                category: Some(caps[2].to_ascii_lowercase()),
            })
        })
        .collect()
}

/// Deduplicates by case-insensitive, trimmed name, keeping first occurrence
/// order, and drops placeholder names.
pub(crate) fn dedupe_suggestions(suggestions: Vec<DrugSuggestion>) -> Vec<DrugSuggestion> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();

    for suggestion in suggestions {
        let key = suggestion.name.trim().to_lowercase();
        if is_placeholder(&key) || seen.iter().any(|s| s == &key) {
            continue;
        }
        seen.push(key);
        out.push(suggestion);
    }

    out
}
