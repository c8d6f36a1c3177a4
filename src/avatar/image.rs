//! Resolved avatar image and its trust tier.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::placeholder::{render_placeholder, PLACEHOLDER_CONTENT_TYPE};

/// How much a source is trusted; decides the shared-cache lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    /// Authenticated official API lookup.
    Official,
    /// Provider's own profile-image redirect.
    Redirect,
    /// Third-party avatar aggregator.
    Aggregator,
    /// Remote initials/gradient generator service.
    Synthetic,
    /// Local placeholder for a handle nobody could resolve.
    Placeholder,
    /// Local placeholder for a request without a handle.
    Anonymous,
    /// Local placeholder after an unexpected fault.
    Fault,
}

impl SourceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::Redirect => "redirect",
            Self::Aggregator => "aggregator",
            Self::Synthetic => "synthetic",
            Self::Placeholder => "placeholder",
            Self::Anonymous => "anonymous",
            Self::Fault => "fault",
        }
    }
}

/// Shared-cache lifetimes per tier, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheTtls {
    pub official: u32,
    pub redirect: u32,
    pub aggregator: u32,
    pub synthetic: u32,
    pub placeholder: u32,
    pub anonymous: u32,
    pub fault: u32,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            official: 86_400,
            redirect: 86_400,
            aggregator: 21_600,
            synthetic: 3_600,
            placeholder: 3_600,
            anonymous: 86_400,
            fault: 1_800,
        }
    }
}

impl CacheTtls {
    pub fn for_tier(&self, tier: SourceTier) -> u32 {
        match tier {
            SourceTier::Official => self.official,
            SourceTier::Redirect => self.redirect,
            SourceTier::Aggregator => self.aggregator,
            SourceTier::Synthetic => self.synthetic,
            SourceTier::Placeholder => self.placeholder,
            SourceTier::Anonymous => self.anonymous,
            SourceTier::Fault => self.fault,
        }
    }
}

/// An image ready to be served. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarImage {
    pub bytes: Bytes,
    pub content_type: String,
    pub cache_seconds: u32,
    /// Hex SHA-256 of `bytes`.
    pub fingerprint: String,
    pub tier: SourceTier,
    /// Name of the source that produced the bytes.
    pub source: String,
}

impl AvatarImage {
    pub fn new(
        bytes: impl Into<Bytes>,
        content_type: impl Into<String>,
        tier: SourceTier,
        source: impl Into<String>,
        cache_seconds: u32,
    ) -> Self {
        let bytes = bytes.into();
        let fingerprint = fingerprint(&bytes);
        Self {
            bytes,
            content_type: content_type.into(),
            cache_seconds,
            fingerprint,
            tier,
            source: source.into(),
        }
    }

    /// Render the local placeholder for `seed`.
    pub fn placeholder(seed: &str, tier: SourceTier, cache_seconds: u32) -> Self {
        Self::new(
            render_placeholder(seed),
            PLACEHOLDER_CONTENT_TYPE,
            tier,
            "placeholder",
            cache_seconds,
        )
    }

    /// Quoted entity tag for the `ETag` header.
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.fingerprint)
    }
}

pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
