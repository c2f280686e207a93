//! Data model for drug suggestions and resolved compatibility records.

use serde::{Deserialize, Serialize};

/// Upstream classification of a detail page.
///
/// The upstream serves three page families under
/// `/breastfeeding/{slug}/{kind}/`; anything it does not classify is treated
/// as a medicinal product, which is what the overwhelming majority of queries
/// resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Product,
    Tradename,
    Writing,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [
        DocumentKind::Product,
        DocumentKind::Tradename,
        DocumentKind::Writing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Product => "product",
            DocumentKind::Tradename => "tradename",
            DocumentKind::Writing => "writing",
        }
    }

    /// Maps a loose upstream type/category hint onto a kind.
    ///
    /// Unrecognized hints default to `Product`; the upstream leaves most
    /// records unclassified and those resolve as products in practice.
    pub fn from_hint(hint: &str) -> DocumentKind {
        let h = hint.trim().to_ascii_lowercase();
        if h.contains("marca") || h.contains("trade") || h.contains("brand") {
            return DocumentKind::Tradename;
        }
        if h.contains("escrito") || h.contains("writing") || h.contains("article") {
            return DocumentKind::Writing;
        }
        DocumentKind::Product
    }
}

/// A lightweight, unverified candidate match for a free-text drug query.
///
/// Uniqueness is defined by case-insensitive, trimmed `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrugSuggestion {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Structured compatibility data extracted from a resolved detail page.
///
/// Absent optional fields mean "unknown" — no pattern matched — never
/// "zero risk."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrugDetails {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
}
