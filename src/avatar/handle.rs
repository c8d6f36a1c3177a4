//! Handle normalization.
//!
//! Raw handles arrive from query strings and JSON bodies in whatever shape the
//! client typed them (`@Example_User`, ` someone `, `Ünïcode`). Everything that
//! keys an upstream lookup or a leaderboard entry goes through [`Handle::normalize`].

use std::fmt;

/// Longest normalized handle, in characters.
pub const MAX_HANDLE_LEN: usize = 32;

/// A canonical, lookup-safe social handle.
///
/// Only contains `[a-z0-9_.-]` and is at most [`MAX_HANDLE_LEN`] characters.
/// The empty handle is valid and means "no identity yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(String);

impl Handle {
    /// Canonicalize a raw handle string.
    ///
    /// Lower-cases, strips one leading `@`, drops every character outside
    /// `[a-z0-9_.-]` and truncates to [`MAX_HANDLE_LEN`].
    pub fn normalize(raw: &str) -> Self {
        let lowered = raw.to_lowercase();
        let stripped = lowered.strip_prefix('@').unwrap_or(&lowered);
        let cleaned: String = stripped
            .chars()
            .filter(|c| is_handle_char(*c))
            .take(MAX_HANDLE_LEN)
            .collect();
        Self(cleaned)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

fn is_handle_char(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9' | '_' | '.' | '-')
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_at_and_lowercases() {
        assert_eq!(Handle::normalize("@Example_User").as_str(), "example_user");
    }

    #[test]
    fn test_normalize_strips_only_one_at() {
        // the second '@' is outside the allowed set and is dropped anyway
        assert_eq!(Handle::normalize("@@abc").as_str(), "abc");
    }

    #[test]
    fn test_normalize_removes_disallowed_chars() {
        assert_eq!(Handle::normalize(" a b!c#d$ ").as_str(), "abcd");
        assert_eq!(Handle::normalize("dot.dash-under_1").as_str(), "dot.dash-under_1");
        assert_eq!(Handle::normalize("émile").as_str(), "mile");
    }

    #[test]
    fn test_normalize_truncates_to_max_len() {
        let raw = "a".repeat(50);
        let handle = Handle::normalize(&raw);
        assert_eq!(handle.as_str().len(), MAX_HANDLE_LEN);
    }

    #[test]
    fn test_normalize_keeps_first_char_when_truncating() {
        let raw = format!("@z{}", "y".repeat(40));
        let handle = Handle::normalize(&raw);
        assert!(handle.as_str().starts_with('z'));
        assert_eq!(handle.as_str().len(), MAX_HANDLE_LEN);
    }

    #[test]
    fn test_normalize_empty_inputs() {
        assert!(Handle::normalize("").is_empty());
        assert!(Handle::normalize("@").is_empty());
        assert!(Handle::normalize("   ").is_empty());
        assert!(Handle::normalize("!!!").is_empty());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "@Example_User",
            "  @@Mixed.Case-Name  ",
            "日本語handle",
            "",
            "@",
            "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_.-extra",
            "İstanbul",
            "tab\there",
        ];
        for raw in inputs {
            let once = Handle::normalize(raw);
            let twice = Handle::normalize(once.as_str());
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn test_normalized_output_charset_and_length() {
        let inputs = ["@Ä√∂x_Y.z-9", "İİİİ", "@ÄÖÜ", &"Zz@".repeat(30)];
        for raw in inputs {
            let handle = Handle::normalize(raw);
            assert!(handle.as_str().len() <= MAX_HANDLE_LEN);
            assert!(handle.as_str().chars().all(is_handle_char), "{handle}");
        }
    }
}
