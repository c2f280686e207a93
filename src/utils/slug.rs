use crate::entities::DocumentKind;

/// Normalizes a free-text drug name into a URL-safe slug.
///
/// Lowercases, strips everything outside word characters, whitespace and
/// hyphens, then collapses whitespace/hyphen runs into single hyphens.
/// Total over any input (empty input yields an empty slug) and idempotent:
/// `create_slug(create_slug(s)) == create_slug(s)`.
pub(crate) fn create_slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '-' {
            pending_hyphen = true;
        }
        // Anything else (punctuation, symbols) is stripped outright.
    }

    out
}

/// Composes the detail-page path for a slug and document kind.
pub(crate) fn build_drug_url(slug: &str, kind: DocumentKind) -> String {
    format!("/breastfeeding/{}/{}/", slug, kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_slug_normalizes_case_and_whitespace() {
        assert_eq!(create_slug("  Aspirin  "), "aspirin");
        assert_eq!(create_slug("Valproic Acid"), "valproic-acid");
        assert_eq!(create_slug("Co -  Amoxiclav"), "co-amoxiclav");
    }

    #[test]
    fn create_slug_strips_punctuation() {
        assert_eq!(create_slug("St. John's Wort"), "st-johns-wort");
        assert_eq!(create_slug("5-HTP (supplement)"), "5-htp-supplement");
    }

    #[test]
    fn create_slug_collapses_hyphen_runs() {
        assert_eq!(create_slug("a---b"), "a-b");
        assert_eq!(create_slug("--edge--"), "edge");
    }

    #[test]
    fn create_slug_is_total_and_idempotent() {
        for input in ["", "   ", "!!!", "Ibuprofen", "a  b--c", "ñandú"] {
            let once = create_slug(input);
            assert_eq!(create_slug(&once), once, "not idempotent for {input:?}");
        }
        assert_eq!(create_slug(""), "");
        assert_eq!(create_slug("!!!"), "");
    }

    #[test]
    fn build_drug_url_composes_all_kinds() {
        assert_eq!(
            build_drug_url("paracetamol", DocumentKind::Product),
            "/breastfeeding/paracetamol/product/"
        );
        assert_eq!(
            build_drug_url("tylenol", DocumentKind::Tradename),
            "/breastfeeding/tylenol/tradename/"
        );
        assert_eq!(
            build_drug_url("caffeine-review", DocumentKind::Writing),
            "/breastfeeding/caffeine-review/writing/"
        );
    }
}
