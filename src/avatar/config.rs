//! Avatar pipeline configuration.

use serde::{Deserialize, Serialize};

use super::fetch::DEFAULT_FETCH_TIMEOUT_MS;
use super::image::{CacheTtls, SourceTier};

/// Identifier of an upstream source adapter, as used in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Authenticated official API lookup (needs a bearer token).
    Official,
    /// Aggregator endpoint answering with a JSON image URL.
    AggregatorJson,
    /// Provider's profile-image redirect URL.
    Redirect,
    /// Public aggregators and initials generators, first image wins.
    Public,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::AggregatorJson => "aggregator_json",
            Self::Redirect => "redirect",
            Self::Public => "public",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "official" => Ok(Self::Official),
            "aggregator_json" => Ok(Self::AggregatorJson),
            "redirect" => Ok(Self::Redirect),
            "public" => Ok(Self::Public),
            _ => Err(format!("Invalid avatar source: {}", s)),
        }
    }
}

/// One URL template tried by the public source. `{handle}` is replaced with
/// the URL-encoded handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateUrl {
    pub url: String,
    pub tier: SourceTier,
}

impl CandidateUrl {
    pub fn new(url: impl Into<String>, tier: SourceTier) -> Self {
        Self {
            url: url.into(),
            tier,
        }
    }

    pub fn expand(&self, handle: &str) -> String {
        self.url.replace("{handle}", &urlencoding::encode(handle))
    }
}

/// Avatar pipeline configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AvatarConfig {
    /// Adapters in priority order
    pub sources: Vec<SourceKind>,
    /// Deadline for one upstream request
    pub fetch_timeout_ms: u64,
    /// Pipeline bound per upstream request an adapter may issue
    pub attempt_timeout_ms: u64,
    /// Bearer credential for the official API; the adapter is inert without it
    #[serde(skip_serializing)]
    pub bearer_token: Option<String>,
    pub official_api_base: String,
    pub aggregator_json_base: String,
    pub redirect_base: String,
    pub public_candidates: Vec<CandidateUrl>,
    /// Shared-cache lifetimes per tier
    pub cache_ttl: CacheTtls,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                SourceKind::Official,
                SourceKind::AggregatorJson,
                SourceKind::Redirect,
                SourceKind::Public,
            ],
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            attempt_timeout_ms: 7_000,
            bearer_token: None,
            official_api_base: "https://api.twitter.com".to_string(),
            aggregator_json_base: "https://unavatar.io".to_string(),
            redirect_base: "https://twitter.com".to_string(),
            public_candidates: default_public_candidates(),
            cache_ttl: CacheTtls::default(),
        }
    }
}

fn default_public_candidates() -> Vec<CandidateUrl> {
    vec![
        CandidateUrl::new("https://unavatar.io/x/{handle}", SourceTier::Aggregator),
        CandidateUrl::new("https://unavatar.io/twitter/{handle}", SourceTier::Aggregator),
        CandidateUrl::new(
            "https://unavatar.io/https://x.com/{handle}",
            SourceTier::Aggregator,
        ),
        CandidateUrl::new("https://avatar.vercel.sh/{handle}", SourceTier::Synthetic),
        CandidateUrl::new(
            "https://api.dicebear.com/9.x/initials/svg?seed={handle}&fontWeight=700",
            SourceTier::Synthetic,
        ),
    ]
}

impl std::fmt::Debug for AvatarConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarConfig")
            .field("sources", &self.sources)
            .field("fetch_timeout_ms", &self.fetch_timeout_ms)
            .field("attempt_timeout_ms", &self.attempt_timeout_ms)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[REDACTED]"))
            .field("official_api_base", &self.official_api_base)
            .field("aggregator_json_base", &self.aggregator_json_base)
            .field("redirect_base", &self.redirect_base)
            .field("public_candidates", &self.public_candidates)
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order() {
        let config = AvatarConfig::default();
        assert_eq!(
            config.sources,
            vec![
                SourceKind::Official,
                SourceKind::AggregatorJson,
                SourceKind::Redirect,
                SourceKind::Public
            ]
        );
        assert_eq!(config.fetch_timeout_ms, 6_000);
        assert_eq!(config.public_candidates.len(), 5);
    }

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("official".parse::<SourceKind>().unwrap(), SourceKind::Official);
        assert_eq!(
            "Aggregator-JSON".parse::<SourceKind>().unwrap(),
            SourceKind::AggregatorJson
        );
        assert!("gravatar".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_candidate_expand_encodes_handle() {
        let c = CandidateUrl::new("https://a.example/{handle}?s={handle}", SourceTier::Aggregator);
        assert_eq!(c.expand("x.y"), "https://a.example/x.y?s=x.y");
        assert_eq!(c.expand("a b"), "https://a.example/a%20b?s=a%20b");
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = AvatarConfig {
            bearer_token: Some("super-secret".to_string()),
            ..Default::default()
        };
        let dbg = format!("{:?}", config);
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn test_token_not_serialized() {
        let config = AvatarConfig {
            bearer_token: Some("super-secret".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
    }

    #[test]
    fn test_partial_config() {
        let config: AvatarConfig =
            serde_json::from_str(r#"{"sources": ["public"], "fetchTimeoutMs": 100}"#).unwrap();
        assert_eq!(config.sources, vec![SourceKind::Public]);
        assert_eq!(config.fetch_timeout_ms, 100);
        assert_eq!(config.redirect_base, "https://twitter.com");
    }
}
