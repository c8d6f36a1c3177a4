//! Leaderboard storage configuration.

use serde::{Deserialize, Serialize};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "sentient-race";

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeaderboardConfig {
    /// `redis://` or `rediss://` URL. Absent means in-memory storage.
    #[serde(skip_serializing)]
    pub redis_url: Option<String>,

    /// Key prefix for the board and detail hashes.
    pub namespace: Option<String>,
}

impl std::fmt::Debug for LeaderboardConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderboardConfig")
            .field(
                "redis_url",
                &self.redis_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl LeaderboardConfig {
    /// Trimmed namespace, or [`DEFAULT_NAMESPACE`] when blank.
    pub fn effective_namespace(&self) -> String {
        self.namespace
            .as_deref()
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(DEFAULT_NAMESPACE)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_default_and_trim() {
        let mut cfg = LeaderboardConfig::default();
        assert_eq!(cfg.effective_namespace(), "sentient-race");

        cfg.namespace = Some("   ".into());
        assert_eq!(cfg.effective_namespace(), "sentient-race");

        cfg.namespace = Some("  season-2 ".into());
        assert_eq!(cfg.effective_namespace(), "season-2");
    }

    #[test]
    fn test_debug_redacts_url() {
        let cfg = LeaderboardConfig {
            redis_url: Some("redis://:hunter2@host:6379".into()),
            namespace: None,
        };
        let out = format!("{cfg:?}");
        assert!(!out.contains("hunter2"));
        assert!(out.contains("[REDACTED]"));
    }
}
