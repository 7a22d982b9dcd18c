//! Search query shaping for stock and web image sources.

use rand::seq::SliceRandom;
use regex::Regex;
use std::sync::LazyLock;

static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("Invalid regex"));

static YEAR_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{4})").expect("Invalid regex"));

/// Reduce a subject to the tokens a search engine can use.
///
/// `"1994-2001 Acura Integra Type R (DC2)"` becomes
/// `"1994 2001 Acura Integra Type R"`: generation codes in parentheses go,
/// dashes in year ranges become spaces, whitespace collapses.
pub fn simplify_query(subject: &str) -> String {
    let stripped = PARENTHESIZED.replace_all(subject, "");
    let undashed = stripped.replace(['\u{2013}', '\u{2014}'], " ");
    let years = YEAR_RANGE.replace_all(&undashed, "$1 $2");
    years.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Simplified query with the domain keyword appended when missing.
pub fn keyword_query(subject: &str, keyword: Option<&str>) -> String {
    let simple = simplify_query(subject);
    match keyword.map(str::trim).filter(|k| !k.is_empty()) {
        Some(k) if !simple.to_lowercase().contains(&k.to_lowercase()) => {
            format!("{} {}", simple, k)
        }
        _ => simple,
    }
}

/// Query variants for repeated web searches, shuffled.
pub fn query_variants(subject: &str, keyword: Option<&str>) -> Vec<String> {
    let simple = simplify_query(subject);
    let mut suffixes = vec!["", "photo", "front", "side", "interior"];
    if let Some(k) = keyword.map(str::trim).filter(|k| !k.is_empty()) {
        suffixes.insert(1, k);
    }

    let mut variants: Vec<String> = suffixes
        .into_iter()
        .map(|suffix| {
            if suffix.is_empty() {
                simple.clone()
            } else {
                format!("{} {}", simple, suffix)
            }
        })
        .collect();

    variants.shuffle(&mut rand::thread_rng());
    variants
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simplify_query() {
        assert_eq!(
            simplify_query("1994-2001 Acura Integra Type R (DC2)"),
            "1994 2001 Acura Integra Type R"
        );
        assert_eq!(simplify_query("1990\u{2013}1999 Mazda  Miata"), "1990 1999 Mazda Miata");
        assert_eq!(simplify_query("2020 Toyota Supra (A90)"), "2020 Toyota Supra");
        assert_eq!(simplify_query("Mercedes-Benz 190E"), "Mercedes-Benz 190E");
    }

    #[test]
    fn test_keyword_query() {
        assert_eq!(keyword_query("Honda NSX (NA1)", Some("car")), "Honda NSX car");
        assert_eq!(keyword_query("Race car replica", Some("car")), "Race car replica");
        assert_eq!(keyword_query("Honda NSX", None), "Honda NSX");
    }

    #[test]
    fn test_query_variants() {
        let variants = query_variants("Honda NSX (NA1)", Some("car"));
        assert_eq!(variants.len(), 6);
        assert!(variants.contains(&"Honda NSX".to_string()));
        assert!(variants.contains(&"Honda NSX car".to_string()));
        assert!(variants.contains(&"Honda NSX interior".to_string()));
        assert_eq!(query_variants("X", None).len(), 5);
    }
}
