//! Small text helpers shared by the parsers.

/// Whether `needle` occurs in `haystack` as a whole term.
///
/// An alphanumeric (or leading `.`) edge of the needle must not touch an
/// alphanumeric neighbour, so `"1g"` does not match inside `"21g"` and `".5g"`
/// does not match inside `"1.5g"`. Non-ASCII edges such as fraction glyphs
/// match anywhere.
pub(crate) fn contains_term(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }

    let (Some(first), Some(last)) = (needle.chars().next(), needle.chars().next_back()) else {
        return false;
    };
    let guard_start = first.is_ascii_alphanumeric() || first == '.';
    let guard_end = last.is_ascii_alphanumeric();

    haystack.match_indices(needle).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();

        let start_ok = !guard_start
            || !before.is_some_and(|c| c.is_ascii_alphanumeric() || c == '.');
        let end_ok = !guard_end || !after.is_some_and(|c| c.is_ascii_alphanumeric());
        start_ok && end_ok
    })
}

/// Format an amount with at most two decimals and no trailing zeros.
pub(crate) fn format_amount(value: f64) -> String {
    let formatted = format!("{value:.2}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lowercase, hyphen-separated slug of a name.
pub(crate) fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_term_boundaries() {
        assert!(contains_term("blue dream - 1/8oz", "1/8oz"));
        assert!(contains_term("1g pre-roll", "1g"));
        assert!(!contains_term("21g pack", "1g"));
        assert!(!contains_term("1.5g cart", ".5g"));
        assert!(contains_term("cart .5g", ".5g"));
        assert!(!contains_term("gorilla glue", "o"));
        assert!(contains_term("sour ⅛oz", "⅛"));
        assert!(!contains_term("anything", ""));
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(3.5), "3.5");
        assert_eq!(format_amount(28.0), "28");
        assert_eq!(format_amount(0.5), "0.5");
        assert_eq!(format_amount(9.333_333), "9.33");
        assert_eq!(format_amount(0.0), "0");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Blue Dream  (3.5g)"), "blue-dream-3-5g");
        assert_eq!(slugify("--Gelato--"), "gelato");
        assert_eq!(slugify(""), "");
    }
}
