//! Detail Extractor: ordered pattern-rule tables over detail-page markup.
//!
//! The upstream markup is unstable and undocumented, so every field is
//! extracted by an ordered battery of rules, most structural first, most
//! generic textual heuristic last. The first match per field that survives
//! cleanup and a minimum-length sanity check wins; remaining rules are not
//! consulted. The rule tables are data, independent of the evaluation loop.

use std::sync::LazyLock;

use regex::Regex;

use crate::entities::DrugDetails;
use crate::utils::text::{clean_fragment, truncate_chars};

const MIN_NAME_CHARS: usize = 2;
const MIN_FIELD_CHARS: usize = 4;
/// Paragraph heuristics need more substance before they are believable.
const MIN_PARAGRAPH_CHARS: usize = 40;
const MAX_FIELD_CHARS: usize = 400;

const MAX_ALTERNATIVES: usize = 6;
const MIN_ALTERNATIVE_CHARS: usize = 3;
const MAX_ALTERNATIVE_CHARS: usize = 60;

/// Fixed table for the structural numeric risk class (level 0..=3).
const RISK_LEVEL_LABELS: [&str; 4] = [
    "Very Low Risk",
    "Low Risk",
    "High Risk",
    "Very High Risk",
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("valid extraction rule"))
        .collect()
}

static NAME_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r#"(?is)<h1[^>]*>(.*?)</h1>"#,
        r#"(?is)<meta[^>]+property=["']og:title["'][^>]+content=["']([^"']+)["']"#,
        r#"(?is)<meta[^>]+content=["']([^"']+)["'][^>]+property=["']og:title["']"#,
        r#"(?is)<title[^>]*>(.*?)</title>"#,
    ])
});

/// Risk-level rules are typed: the structural class carries a numeric level
/// mapped through [`RISK_LEVEL_LABELS`]; textual heuristics carry a coarse
/// label of their own.
enum RiskRule {
    StructuralLevel(Regex),
    Phrase(Regex, &'static str),
}

static RISK_LEVEL_RULES: LazyLock<Vec<RiskRule>> = LazyLock::new(|| {
    let level = |p: &str| RiskRule::StructuralLevel(Regex::new(p).expect("valid extraction rule"));
    let phrase =
        |p: &str, label| RiskRule::Phrase(Regex::new(p).expect("valid extraction rule"), label);
    vec![
        level(r#"(?is)class="[^"]*\brisk[_-]?(?:level[_-]?)?([0-3])\b[^"]*""#),
        level(r#"(?is)class="[^"]*\briesgo[_-]?([0-3])\b[^"]*""#),
        level(r#"(?is)data-risk(?:-level)?=["']([0-3])["']"#),
        phrase(r"(?i)\bvery\s+high\s+risk\b", "Very High Risk"),
        phrase(r"(?i)\bhigh\s+risk\b", "High Risk"),
        phrase(r"(?i)\bvery\s+low\s+risk\b", "Very Low Risk"),
        phrase(r"(?i)\blow\s+risk\b", "Low Risk"),
        phrase(
            r"(?i)\b(?:incompatible|not\s+compatible|avoid(?:ance)?\b|contraindicated)",
            "High Risk",
        ),
        phrase(r"(?i)\b(?:compatible|safe)\b", "Compatible"),
    ]
});

static DESCRIPTION_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r#"(?is)<div[^>]+class="[^"]*(?:product-?description|drug-?summary|intro-?text)[^"]*"[^>]*>(.*?)</div>"#,
        r#"(?is)<meta[^>]+name=["']description["'][^>]+content=["']([^"']+)["']"#,
        r#"(?is)<meta[^>]+content=["']([^"']+)["'][^>]+name=["']description["']"#,
        r#"(?is)<p[^>]*>(.*?)</p>"#,
    ])
});

static RISK_DESCRIPTION_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r#"(?is)<(?:div|section)[^>]+class="[^"]*risk[_-]?(?:comment|description|text)[^"]*"[^>]*>(.*?)</(?:div|section)>"#,
        r#"(?is)<h[23][^>]*>[^<]*(?:risk|recommendation|safety)[^<]*</h[23]>\s*<p[^>]*>(.*?)</p>"#,
        r#"(?is)<p[^>]*>([^<]*\b(?:compatible|incompatible|safe|unsafe|avoid|caution|risk)\b[^<]*)</p>"#,
    ])
});

// The bare-date fallbacks are a known precision risk: they can match an
// unrelated citation date or a copyright year. The labeled rule runs first;
// the bare rules stay intentionally permissive.
static LAST_UPDATE_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r#"(?i)(?:last\s+updated?|updated|modified|última\s+actualización)\s*:?\s*(?:on\s+)?([0-9]{1,2}\s+[A-Za-z]+[,.]?\s+[0-9]{4}|[A-Za-z]+\.?\s+[0-9]{1,2},?\s+[0-9]{4}|[0-9]{4}-[0-9]{2}-[0-9]{2}|[0-9]{1,2}[/.][0-9]{1,2}[/.][0-9]{2,4})"#,
        r#"\b([0-9]{4}-[0-9]{2}-[0-9]{2})\b"#,
        r#"\b([0-9]{1,2}/[0-9]{1,2}/[0-9]{2,4})\b"#,
    ])
});

static ALTERNATIVES_BLOCK_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r#"(?is)<(?:ul|ol)[^>]+(?:class|id)="[^"]*alternativ[^"]*"[^>]*>(.*?)</(?:ul|ol)>"#,
        r#"(?is)<div[^>]+(?:class|id)="[^"]*alternativ[^"]*"[^>]*>(.*?)</div>"#,
    ])
});

static LIST_ITEM_ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a[^>]*>(.*?)</a>").expect("valid extraction rule"));
static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<li[^>]*>(.*?)</li>").expect("valid extraction rule"));

/// Applies each rule in order; the first capture that survives cleanup and
/// the minimum-length check is returned, truncated to the field bound.
///
/// Good-enough wins: once a rule produces an acceptable value, later rules
/// are never consulted.
pub(crate) fn extract_field(html: &str, rules: &[Regex], min_chars: usize) -> Option<String> {
    for rule in rules {
        for caps in rule.captures_iter(html) {
            let Some(group) = caps.get(1) else { continue };
            let cleaned = clean_fragment(group.as_str());
            if cleaned.chars().count() >= min_chars {
                return Some(truncate_chars(&cleaned, MAX_FIELD_CHARS));
            }
        }
    }
    None
}

fn extract_name(html: &str) -> Option<String> {
    let raw = extract_field(html, &NAME_RULES, MIN_NAME_CHARS)?;
    // Page titles carry the site name after a separator.
    let name = raw
        .split(" | ")
        .next()
        .unwrap_or(&raw)
        .trim()
        .to_string();
    (name.chars().count() >= MIN_NAME_CHARS).then_some(name)
}

fn extract_risk_level(html: &str) -> Option<String> {
    for rule in RISK_LEVEL_RULES.iter() {
        match rule {
            RiskRule::StructuralLevel(re) => {
                if let Some(caps) = re.captures(html) {
                    let label = caps[1]
                        .parse::<usize>()
                        .ok()
                        .and_then(|level| RISK_LEVEL_LABELS.get(level));
                    if let Some(label) = label {
                        return Some((*label).to_string());
                    }
                }
            }
            RiskRule::Phrase(re, label) => {
                if re.is_match(html) {
                    return Some((*label).to_string());
                }
            }
        }
    }
    None
}

fn extract_alternatives(html: &str) -> Vec<String> {
    let Some(block) = extract_block(html, &ALTERNATIVES_BLOCK_RULES) else {
        return Vec::new();
    };

    // Nested list-item anchors first; bare list items as a fallback.
    let mut items = collect_items(&block, &LIST_ITEM_ANCHOR_RE);
    if items.is_empty() {
        items = collect_items(&block, &LIST_ITEM_RE);
    }
    items
}

/// Raw (uncleaned) capture of the first matching block rule.
fn extract_block(html: &str, rules: &[Regex]) -> Option<String> {
    rules
        .iter()
        .find_map(|rule| rule.captures(html))
        .and_then(|caps| caps.get(1))
        .map(|group| group.as_str().to_string())
}

fn collect_items(block: &str, item_rule: &Regex) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();

    for caps in item_rule.captures_iter(block) {
        let Some(group) = caps.get(1) else { continue };
        let item = clean_fragment(group.as_str());
        let len = item.chars().count();
        if !(MIN_ALTERNATIVE_CHARS..=MAX_ALTERNATIVE_CHARS).contains(&len) {
            continue;
        }
        let key = item.to_lowercase();
        if seen.iter().any(|s| s == &key) {
            continue;
        }
        seen.push(key);
        out.push(item);
        if out.len() == MAX_ALTERNATIVES {
            break;
        }
    }

    out
}

/// Runs the full per-field rule battery over one detail page.
///
/// Returns `None` when not even a name can be extracted; any other absent
/// field stays `None` in the record, meaning "unknown", never "zero risk".
pub(crate) fn extract_details(html: &str) -> Option<DrugDetails> {
    let name = extract_name(html)?;

    Some(DrugDetails {
        name,
        id: None,
        risk_level: extract_risk_level(html),
        description: extract_description(html),
        risk_description: extract_field(html, &RISK_DESCRIPTION_RULES, MIN_FIELD_CHARS),
        last_update: extract_field(html, &LAST_UPDATE_RULES, MIN_FIELD_CHARS),
        alternatives: extract_alternatives(html),
    })
}

fn extract_description(html: &str) -> Option<String> {
    // The generic-paragraph rule needs a higher floor than the structural
    // rules, so the table is split at that boundary.
    let (specific, paragraph) = DESCRIPTION_RULES.split_at(3);
    extract_field(html, specific, MIN_FIELD_CHARS)
        .or_else(|| extract_field(html, paragraph, MIN_PARAGRAPH_CHARS))
}
