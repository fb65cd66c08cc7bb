//! Issue ID formatting and parsing.
//!
//! Identifiers are `<prefix>-<integer>` (e.g. `bd-42`). The integer portion is
//! assigned by a per-prefix counter maintained in the store (see
//! `beads-storage::sqlite::counters`); this module only knows how to validate
//! a prefix and format/parse the resulting string.

/// Returns `true` if `prefix` is a valid issue-ID prefix.
///
/// Prefixes are lowercase ASCII alphanumerics and hyphens, non-empty, and
/// must not themselves contain the `-<integer>` separator ambiguously (we
/// simply require at least one alphabetic character so `"123"` is rejected).
pub fn is_valid_prefix(prefix: &str) -> bool {
    if prefix.is_empty() || prefix.len() > 32 {
        return false;
    }
    let ok_chars = prefix
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    ok_chars && prefix.chars().any(|c| c.is_ascii_alphabetic())
}

/// Formats a prefix and counter value into an issue ID.
pub fn format_id(prefix: &str, n: u64) -> String {
    format!("{}-{}", prefix, n)
}

/// Parses an issue ID into its `(prefix, counter)` parts.
///
/// Returns `None` if the ID does not end in a `-<integer>` suffix.
pub fn parse_id(id: &str) -> Option<(&str, u64)> {
    let idx = id.rfind('-')?;
    let (prefix, rest) = (&id[..idx], &id[idx + 1..]);
    if prefix.is_empty() || rest.is_empty() {
        return None;
    }
    let n: u64 = rest.parse().ok()?;
    Some((prefix, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_prefix_accepts_lowercase_alnum() {
        assert!(is_valid_prefix("bd"));
        assert!(is_valid_prefix("my-proj"));
        assert!(is_valid_prefix("a1"));
    }

    #[test]
    fn valid_prefix_rejects_empty_and_numeric_only() {
        assert!(!is_valid_prefix(""));
        assert!(!is_valid_prefix("123"));
    }

    #[test]
    fn valid_prefix_rejects_uppercase() {
        assert!(!is_valid_prefix("BD"));
    }

    #[test]
    fn format_id_basic() {
        assert_eq!(format_id("bd", 42), "bd-42");
    }

    #[test]
    fn parse_id_roundtrip() {
        assert_eq!(parse_id("bd-42"), Some(("bd", 42)));
        assert_eq!(parse_id("my-proj-7"), Some(("my-proj", 7)));
    }

    #[test]
    fn parse_id_rejects_malformed() {
        assert_eq!(parse_id("bd-"), None);
        assert_eq!(parse_id("bd-abc"), None);
        assert_eq!(parse_id("noseparator"), None);
    }
}
