//! Resolution pipeline and the service boundary consumed by callers.
//!
//! A lookup flows: cache → suggestion search → ordered candidate attempts
//! (fetch + extract, rate-governed) → cache store. The candidate chain is
//! short-circuiting: the first candidate that yields a parsed record with a
//! resolvable name wins, and per-candidate failures are never fatal while
//! candidates remain. Exhaustion means "no result", not an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{CacheManager, CacheStore, DiskStore};
use crate::entities::{DocumentKind, DrugDetails, DrugSuggestion};
use crate::error::LactError;
use crate::extract::extract_details;
use crate::sources::fetch::{FetchError, fetch_document};
use crate::sources::rate_limit::{DEFAULT_MIN_INTERVAL, RateGovernor};
use crate::sources::search::search_drugs;
use crate::sources::{BASE_ENV, DEFAULT_BASE, HeaderProfile, build_client, env_base};
use crate::utils::slug::{build_drug_url, create_slug};

/// Why one candidate attempt produced no record.
enum AttemptError {
    Fetch(FetchError),
    /// The page fetched fine but not even a name could be extracted.
    NoRecord,
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Fetch(err) => write!(f, "{err}"),
            AttemptError::NoRecord => write!(f, "page yielded no parseable record"),
        }
    }
}

pub struct DrugService {
    client: reqwest::Client,
    base: String,
    governor: Arc<RateGovernor>,
    cache: CacheManager,
}

impl DrugService {
    /// Production wiring: env-overridable upstream base, persistent on-disk
    /// cache, default inter-request spacing.
    pub fn new() -> Result<Self, LactError> {
        let store: Arc<dyn CacheStore> = Arc::new(DiskStore::open(DiskStore::default_path())?);
        Self::with_parts(
            env_base(DEFAULT_BASE, BASE_ENV).into_owned(),
            store,
            DEFAULT_MIN_INTERVAL,
        )
    }

    pub(crate) fn with_parts(
        base: String,
        store: Arc<dyn CacheStore>,
        min_interval: Duration,
    ) -> Result<Self, LactError> {
        Ok(Self {
            client: build_client()?,
            base,
            governor: Arc::new(RateGovernor::new(min_interval)),
            cache: CacheManager::new(store),
        })
    }

    /// Searches the upstream for suggestion candidates matching `query`.
    ///
    /// Served from the `search_*` cache namespace when possible. A failure
    /// of the search call itself surfaces as [`LactError::SearchFailed`] —
    /// callers distinguish "found nothing" (empty vec) from "could not
    /// check right now" (error).
    pub async fn search(&self, query: &str) -> Result<Vec<DrugSuggestion>, LactError> {
        let term = query.trim();
        if term.is_empty() {
            return Err(LactError::InvalidArgument("search term is required".into()));
        }

        let key = format!("search_{}", create_slug(term));
        if let Some(cached) = self.cache.get::<Vec<DrugSuggestion>>(&key) {
            debug!(term, "search served from cache");
            return Ok(cached);
        }

        let suggestions = search_drugs(&self.client, &self.governor, &self.base, term).await?;
        if let Err(err) = self.cache.set(&key, &suggestions, None) {
            warn!(%err, key, "failed to cache search results");
        }
        Ok(suggestions)
    }

    /// Resolves a drug name to a parsed detail record.
    ///
    /// `Ok(None)` means every candidate was exhausted — the drug may truly
    /// not exist upstream, or every attempt failed transiently; the
    /// orchestrator does not disambiguate the two.
    pub async fn drug_details(&self, name: &str) -> Result<Option<DrugDetails>, LactError> {
        let term = name.trim();
        if term.is_empty() {
            return Err(LactError::InvalidArgument("drug name is required".into()));
        }

        let key = format!("details_{}", create_slug(term));
        if let Some(cached) = self.cache.get::<DrugDetails>(&key) {
            debug!(term, "details served from cache");
            return Ok(Some(cached));
        }

        for candidate in self.candidate_paths(term).await {
            match self.attempt(&candidate).await {
                Ok(details) => {
                    if let Err(err) = self.cache.set(&key, &details, None) {
                        warn!(%err, key, "failed to cache detail record");
                    }
                    return Ok(Some(details));
                }
                Err(err) => {
                    debug!(path = candidate, %err, "candidate failed; trying next");
                }
            }
        }

        Ok(None)
    }

    /// Sequential batch lookup; requests stay spaced by the rate governor.
    ///
    /// Per-name failures degrade to empty suggestion lists so one bad term
    /// cannot fail the whole batch.
    pub async fn search_many(&self, names: &[String]) -> HashMap<String, Vec<DrugSuggestion>> {
        let mut out = HashMap::new();
        for name in names {
            match self.search(name).await {
                Ok(suggestions) => {
                    out.insert(name.clone(), suggestions);
                }
                Err(err) => {
                    warn!(name, %err, "batch search entry failed");
                    out.insert(name.clone(), Vec::new());
                }
            }
        }
        out
    }

    /// Synthetic self-test: can the upstream answer a search for a staple
    /// substance right now?
    pub async fn is_healthy(&self) -> bool {
        match self.search("ibuprofen").await {
            Ok(suggestions) => !suggestions.is_empty(),
            Err(err) => {
                warn!(%err, "health probe failed");
                false
            }
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear_all();
    }

    /// Resource teardown. No persistent connections are held, so this is a
    /// no-op kept for boundary compatibility.
    pub fn close(&self) {}

    /// Ordered candidate queue: suggestion URLs first; when search yields
    /// nothing usable, one synthesized path per document kind.
    async fn candidate_paths(&self, term: &str) -> Vec<String> {
        let suggestions = match self.search(term).await {
            Ok(suggestions) => suggestions,
            Err(err) => {
                // Not fatal here: the synthesized candidates below can still
                // resolve the drug even when the search endpoint is down.
                warn!(term, %err, "suggestion search failed; widening to synthesized candidates");
                Vec::new()
            }
        };

        let mut paths: Vec<String> = suggestions
            .iter()
            .map(|s| match &s.url {
                Some(url) => url.clone(),
                None => build_drug_url(&create_slug(&s.name), DocumentKind::Product),
            })
            .collect();

        if paths.is_empty() {
            let slug = create_slug(term);
            if !slug.is_empty() {
                paths = DocumentKind::ALL
                    .iter()
                    .map(|kind| build_drug_url(&slug, *kind))
                    .collect();
            }
        }

        paths
    }

    async fn attempt(&self, path: &str) -> Result<DrugDetails, AttemptError> {
        let url = format!("{}{}", self.base, path);
        let doc = fetch_document(&self.client, &self.governor, &url, HeaderProfile::Html)
            .await
            .map_err(AttemptError::Fetch)?;

        let mut details = extract_details(&doc.body).ok_or(AttemptError::NoRecord)?;
        details.id = slug_from_path(path);
        Ok(details)
    }
}

/// `/breastfeeding/{slug}/{kind}/` → `{slug}`.
fn slug_from_path(path: &str) -> Option<String> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match (segments.next(), segments.next()) {
        (Some("breastfeeding"), Some(slug)) if !slug.is_empty() => Some(slug.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PARACETAMOL_PAGE: &str = r#"<html>
<head><title>Paracetamol | breastfeeding lookup</title></head>
<body>
  <h1>Paracetamol</h1>
  <span class="risk-level-0">Very Low Risk</span>
  <div class="product-description">Analgesic and antipyretic widely used during lactation.</div>
  <p>Last update: 2024-03-11</p>
</body></html>"#;

    fn service(base: String) -> DrugService {
        DrugService::with_parts(
            base,
            Arc::new(MemoryStore::new()),
            Duration::from_millis(1),
        )
        .expect("service should construct")
    }

    async fn mount_search(server: &MockServer, query: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/megasearch/"))
            .and(query_param("query", query))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn paracetamol_resolves_end_to_end() {
        let server = MockServer::start().await;
        mount_search(
            &server,
            "paracetamol",
            serde_json::json!([{"nombre_en": "Paracetamol", "id": "paracetamol"}]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/breastfeeding/paracetamol/product/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PARACETAMOL_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let svc = service(server.uri());

        let suggestions = svc.search("paracetamol").await.expect("search");
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].name, "Paracetamol");
        assert_eq!(
            suggestions[0].url.as_deref(),
            Some("/breastfeeding/paracetamol/product/")
        );

        let details = svc
            .drug_details("paracetamol")
            .await
            .expect("lookup")
            .expect("record");
        assert_eq!(details.name, "Paracetamol");
        assert_eq!(details.id.as_deref(), Some("paracetamol"));
        assert_eq!(details.risk_level.as_deref(), Some("Very Low Risk"));
        assert_eq!(details.last_update.as_deref(), Some("2024-03-11"));

        // Second lookup must come from cache; the detail mock allows one hit.
        let again = svc.drug_details("paracetamol").await.expect("lookup");
        assert_eq!(again.map(|d| d.name).as_deref(), Some("Paracetamol"));
    }

    #[tokio::test]
    async fn empty_search_widens_to_all_three_document_kinds() {
        let server = MockServer::start().await;
        mount_search(&server, "unknowndrug", serde_json::json!([])).await;
        for kind in ["product", "tradename", "writing"] {
            Mock::given(method("GET"))
                .and(path(format!("/breastfeeding/unknowndrug/{kind}/")))
                .respond_with(ResponseTemplate::new(404))
                .expect(1)
                .mount(&server)
                .await;
        }

        let svc = service(server.uri());
        let details = svc.drug_details("unknowndrug").await.expect("lookup");
        assert!(details.is_none(), "exhaustion is no-result, not an error");
    }

    #[tokio::test]
    async fn first_successful_candidate_short_circuits_the_rest() {
        let server = MockServer::start().await;
        mount_search(&server, "augmentin", serde_json::json!([])).await;
        Mock::given(method("GET"))
            .and(path("/breastfeeding/augmentin/product/"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/breastfeeding/augmentin/tradename/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<h1>Augmentin</h1><p>Compatible with breastfeeding.</p>"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/breastfeeding/augmentin/writing/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let svc = service(server.uri());
        let details = svc
            .drug_details("augmentin")
            .await
            .expect("lookup")
            .expect("record");
        assert_eq!(details.name, "Augmentin");
        assert_eq!(details.id.as_deref(), Some("augmentin"));
    }

    #[tokio::test]
    async fn details_survive_a_failing_search_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/megasearch/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/breastfeeding/aspirin/product/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<h1>Aspirin</h1><p>High Risk during lactation.</p>"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/breastfeeding/aspirin/tradename/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/breastfeeding/aspirin/writing/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let svc = service(server.uri());

        // The top-level search call has no fallback and fails loudly.
        let err = svc.search("aspirin").await.expect_err("search should fail");
        assert!(matches!(err, LactError::SearchFailed { .. }));

        // Detail resolution widens to synthesized candidates instead.
        let details = svc
            .drug_details("aspirin")
            .await
            .expect("lookup")
            .expect("record");
        assert_eq!(details.name, "Aspirin");
        assert_eq!(details.risk_level.as_deref(), Some("High Risk"));
    }

    #[tokio::test]
    async fn search_results_are_cached_per_term() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/megasearch/"))
            .and(query_param("query", "cetirizine"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!([{"nombre_en": "Cetirizine", "id": "cetirizine"}]),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let svc = service(server.uri());
        let first = svc.search("cetirizine").await.expect("first search");
        let second = svc.search("Cetirizine ").await.expect("cached search");
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn batch_lookup_degrades_failures_to_empty_lists() {
        let server = MockServer::start().await;
        mount_search(
            &server,
            "ibuprofen",
            serde_json::json!([{"nombre_en": "Ibuprofen", "id": "ibuprofen"}]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/megasearch/"))
            .and(query_param("query", "brokenterm"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let svc = service(server.uri());
        let out = svc
            .search_many(&["ibuprofen".to_string(), "brokenterm".to_string()])
            .await;

        assert_eq!(out.len(), 2);
        assert_eq!(out["ibuprofen"].len(), 1);
        assert!(out["brokenterm"].is_empty());
    }

    #[tokio::test]
    async fn health_probe_reflects_upstream_availability() {
        let server = MockServer::start().await;
        mount_search(
            &server,
            "ibuprofen",
            serde_json::json!([{"nombre_en": "Ibuprofen", "id": "ibuprofen"}]),
        )
        .await;

        let svc = service(server.uri());
        assert!(svc.is_healthy().await);

        let down = service("http://127.0.0.1:9".to_string());
        assert!(!down.is_healthy().await);
    }

    #[test]
    fn slug_from_path_reads_the_second_segment() {
        assert_eq!(
            slug_from_path("/breastfeeding/valproic-acid/product/").as_deref(),
            Some("valproic-acid")
        );
        assert_eq!(slug_from_path("/about/"), None);
        assert_eq!(slug_from_path(""), None);
    }
}
