//! Planning-increment (period) tokens.
//!
//! Source tables and users spell the same period many ways ("PI-10", "pi 10",
//! "10", "PI10 "). Everything is folded onto the canonical `PI-<n>` token.

use crate::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

static FIRST_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Prefix of every canonical period token.
pub const PERIOD_PREFIX: &str = "PI-";

/// Normalize a free-form period tag into its canonical token.
///
/// Returns `None` when the tag carries no number at all. Idempotent on its own
/// output.
pub fn normalize_period(raw: &str) -> Option<String> {
    let digits = FIRST_NUMBER.find(raw.trim())?.as_str();
    let trimmed = digits.trim_start_matches('0');
    let number = if trimmed.is_empty() { "0" } else { trimmed };
    Some(format!("{}{}", PERIOD_PREFIX, number))
}

/// Normalize a period requested on the command line.
///
/// Unlike table cells, a requested period must name a number.
pub fn parse_requested_period(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(Error::InvalidInput(
            "missing period (expected e.g. PI-10 or 10)".to_string(),
        ));
    }
    normalize_period(raw).ok_or_else(|| {
        Error::InvalidInput(format!("cannot read a period number from {:?}", raw))
    })
}

/// Whether a feature's period cell places it in `period`.
///
/// Blank tags belong to every period.
pub fn feature_in_period(tag: &str, period: &str) -> bool {
    if tag.trim().is_empty() {
        return true;
    }
    normalize_period(tag).is_some_and(|p| p == period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spellings_fold_to_one_token() {
        for raw in ["pi 10", "PI-10", "10", " PI10 ", "pi_010"] {
            assert_eq!(normalize_period(raw).as_deref(), Some("PI-10"), "{raw}");
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_period("Pi 7").unwrap();
        assert_eq!(normalize_period(&once).unwrap(), once);
    }

    #[test]
    fn test_no_number() {
        assert_eq!(normalize_period("backlog"), None);
        assert_eq!(normalize_period(""), None);
    }

    #[test]
    fn test_requested_period_validation() {
        assert_eq!(parse_requested_period("10").unwrap(), "PI-10");
        assert!(matches!(parse_requested_period(""), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_requested_period("next"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_feature_period_filter() {
        assert!(feature_in_period("PI-10", "PI-10"));
        assert!(!feature_in_period("PI-10", "PI-11"));
        assert!(feature_in_period("", "PI-11"));
        assert!(feature_in_period("  ", "PI-10"));
        assert!(!feature_in_period("someday", "PI-10"));
    }
}
