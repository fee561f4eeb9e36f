//! Version label resolution.
//!
//! "latest" is numeric-aware: `v10` beats `v2`, which plain lexical order
//! would get wrong. Labels that don't parse as numbers fall back to
//! lexical order.

/// Pick the "latest" label out of a set of version labels.
///
/// For each label, a leading case-insensitive `v` prefix is stripped; if
/// the remainder parses as a non-negative integer it is a numeric
/// candidate. When numeric candidates exist, the original label of the
/// maximum value wins (exact ties: the first label reaching the maximum,
/// by scan order). With no numeric candidates, the lexically greatest
/// label wins. Empty input returns `None`.
pub fn resolve_latest(versions: &[String]) -> Option<&str> {
    if versions.is_empty() {
        return None;
    }

    let mut best_numeric: Option<(u128, &str)> = None;
    for label in versions {
        if let Some(n) = numeric_value(label) {
            match best_numeric {
                Some((max, _)) if n <= max => {}
                _ => best_numeric = Some((n, label)),
            }
        }
    }

    if let Some((_, label)) = best_numeric {
        return Some(label);
    }

    versions.iter().map(|s| s.as_str()).max()
}

/// Parse a label as a numeric version candidate: optional `v`/`V` prefix,
/// then digits only.
fn numeric_value(label: &str) -> Option<u128> {
    let digits = label
        .strip_prefix('v')
        .or_else(|| label.strip_prefix('V'))
        .unwrap_or(label);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn numeric_beats_lexical() {
        // lexical order would wrongly pick "v2"
        let versions = labels(&["v1", "v2", "v10"]);
        assert_eq!(resolve_latest(&versions), Some("v10"));
    }

    #[test]
    fn bare_digits_are_numeric() {
        let versions = labels(&["2", "11", "3"]);
        assert_eq!(resolve_latest(&versions), Some("11"));
    }

    #[test]
    fn uppercase_prefix_accepted() {
        let versions = labels(&["V3", "v12"]);
        assert_eq!(resolve_latest(&versions), Some("v12"));
    }

    #[test]
    fn no_numeric_candidates_falls_back_to_lexical() {
        let versions = labels(&["alpha", "beta"]);
        assert_eq!(resolve_latest(&versions), Some("beta"));
    }

    #[test]
    fn mixed_prefers_numeric() {
        let versions = labels(&["beta", "v3", "alpha"]);
        assert_eq!(resolve_latest(&versions), Some("v3"));
    }

    #[test]
    fn empty_input_is_none() {
        assert_eq!(resolve_latest(&[]), None);
    }

    #[test]
    fn single_label() {
        let versions = labels(&["v7"]);
        assert_eq!(resolve_latest(&versions), Some("v7"));
    }

    #[test]
    fn prefix_alone_is_not_numeric() {
        // "v" strips to an empty remainder, so it's lexical only
        let versions = labels(&["v", "w"]);
        assert_eq!(resolve_latest(&versions), Some("w"));
    }

    #[test]
    fn negative_looking_labels_are_lexical() {
        let versions = labels(&["v-1", "v-2"]);
        assert_eq!(resolve_latest(&versions), Some("v-2"));
    }
}
