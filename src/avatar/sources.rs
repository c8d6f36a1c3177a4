//! Upstream avatar sources.
//!
//! Each source tries one provider for a handle and either yields a servable
//! image or nothing. Failures never escape an adapter: they are logged at
//! debug level and folded into `None` so the pipeline can move on.

use async_trait::async_trait;
use tracing::debug;

use super::config::{AvatarConfig, CandidateUrl, SourceKind};
use super::fetch::{FetchError, FetchedImage, UpstreamClient};
use super::handle::Handle;
use super::image::{AvatarImage, CacheTtls, SourceTier};
use super::rewrite::rewrite_size;
use super::size::SizeToken;
use std::sync::Arc;

/// One strategy for turning a handle into image bytes.
#[async_trait]
pub trait AvatarSource: Send + Sync {
    /// Stable name used in logs, metrics and the served image metadata.
    fn name(&self) -> &str;

    /// Upper bound on sequential upstream requests per attempt.
    fn max_requests(&self) -> u32 {
        1
    }

    /// Try to resolve `handle`. Never fails; `None` means "try the next source".
    async fn attempt(&self, handle: &Handle, size: SizeToken) -> Option<AvatarImage>;
}

fn into_image(fetched: FetchedImage, tier: SourceTier, source: &str, ttls: &CacheTtls) -> AvatarImage {
    AvatarImage::new(
        fetched.bytes,
        fetched.content_type,
        tier,
        source,
        ttls.for_tier(tier),
    )
}

fn log_miss(source: &str, handle: &Handle, err: &FetchError) {
    debug!(source, handle = %handle, error = %err, "avatar source miss");
}

/// Official API: authenticated user lookup, then the profile image it names.
#[derive(Debug, Clone)]
pub struct OfficialApiSource {
    client: UpstreamClient,
    base_url: String,
    bearer_token: Option<String>,
    ttls: CacheTtls,
}

impl OfficialApiSource {
    pub fn new(
        client: UpstreamClient,
        base_url: impl Into<String>,
        bearer_token: Option<String>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token: bearer_token.filter(|t| !t.trim().is_empty()),
            ttls,
        }
    }

    fn lookup_url(&self, handle: &Handle) -> String {
        format!(
            "{}/2/users/by/username/{}?user.fields=profile_image_url",
            self.base_url,
            urlencoding::encode(handle.as_str())
        )
    }

    async fn resolve(
        &self,
        token: &str,
        handle: &Handle,
        size: SizeToken,
    ) -> Result<AvatarImage, FetchError> {
        let lookup_url = self.lookup_url(handle);
        let payload = self.client.fetch_json(&lookup_url, Some(token)).await?;
        let image_url = payload
            .pointer("/data/profile_image_url")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FetchError::MalformedPayload {
                url: lookup_url.clone(),
                message: "missing data.profile_image_url".to_string(),
            })?;

        let fetched = self.client.fetch_image(&rewrite_size(image_url, size)).await?;
        Ok(into_image(fetched, SourceTier::Official, self.name(), &self.ttls))
    }
}

#[async_trait]
impl AvatarSource for OfficialApiSource {
    fn name(&self) -> &str {
        "official"
    }

    fn max_requests(&self) -> u32 {
        2
    }

    async fn attempt(&self, handle: &Handle, size: SizeToken) -> Option<AvatarImage> {
        let Some(token) = self.bearer_token.as_deref() else {
            debug!(handle = %handle, "official API source skipped, no bearer token");
            return None;
        };
        self.resolve(token, handle, size)
            .await
            .map_err(|e| log_miss(self.name(), handle, &e))
            .ok()
    }
}

/// Aggregator that answers `{"url": "..."}` for a handle.
#[derive(Debug, Clone)]
pub struct AggregatorJsonSource {
    client: UpstreamClient,
    base_url: String,
    ttls: CacheTtls,
}

impl AggregatorJsonSource {
    pub fn new(client: UpstreamClient, base_url: impl Into<String>, ttls: CacheTtls) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ttls,
        }
    }

    async fn resolve(&self, handle: &Handle, size: SizeToken) -> Result<AvatarImage, FetchError> {
        let lookup_url = format!(
            "{}/x/{}?json",
            self.base_url,
            urlencoding::encode(handle.as_str())
        );
        let payload = self.client.fetch_json(&lookup_url, None).await?;
        let image_url = payload
            .get("url")
            .and_then(|v| v.as_str())
            .filter(|s| s.starts_with("http"))
            .ok_or_else(|| FetchError::MalformedPayload {
                url: lookup_url.clone(),
                message: "missing url".to_string(),
            })?;

        let fetched = self.client.fetch_image(&rewrite_size(image_url, size)).await?;
        Ok(into_image(fetched, SourceTier::Aggregator, self.name(), &self.ttls))
    }
}

#[async_trait]
impl AvatarSource for AggregatorJsonSource {
    fn name(&self) -> &str {
        "aggregator_json"
    }

    fn max_requests(&self) -> u32 {
        2
    }

    async fn attempt(&self, handle: &Handle, size: SizeToken) -> Option<AvatarImage> {
        self.resolve(handle, size)
            .await
            .map_err(|e| log_miss(self.name(), handle, &e))
            .ok()
    }
}

/// The provider's own `/<handle>/profile_image` redirect, at original size.
#[derive(Debug, Clone)]
pub struct RedirectSource {
    client: UpstreamClient,
    base_url: String,
    ttls: CacheTtls,
}

impl RedirectSource {
    pub fn new(client: UpstreamClient, base_url: impl Into<String>, ttls: CacheTtls) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ttls,
        }
    }
}

#[async_trait]
impl AvatarSource for RedirectSource {
    fn name(&self) -> &str {
        "redirect"
    }

    async fn attempt(&self, handle: &Handle, _size: SizeToken) -> Option<AvatarImage> {
        let url = format!(
            "{}/{}/profile_image?size=original",
            self.base_url,
            urlencoding::encode(handle.as_str())
        );
        match self.client.fetch_image(&url).await {
            Ok(fetched) => Some(into_image(fetched, SourceTier::Redirect, self.name(), &self.ttls)),
            Err(e) => {
                log_miss(self.name(), handle, &e);
                None
            }
        }
    }
}

/// Ordered list of public aggregators and initials generators.
#[derive(Debug, Clone)]
pub struct PublicAggregatorSource {
    client: UpstreamClient,
    candidates: Vec<CandidateUrl>,
    ttls: CacheTtls,
}

impl PublicAggregatorSource {
    pub fn new(client: UpstreamClient, candidates: Vec<CandidateUrl>, ttls: CacheTtls) -> Self {
        Self {
            client,
            candidates,
            ttls,
        }
    }
}

#[async_trait]
impl AvatarSource for PublicAggregatorSource {
    fn name(&self) -> &str {
        "public"
    }

    fn max_requests(&self) -> u32 {
        self.candidates.len() as u32
    }

    async fn attempt(&self, handle: &Handle, _size: SizeToken) -> Option<AvatarImage> {
        for candidate in &self.candidates {
            let url = candidate.expand(handle.as_str());
            match self.client.fetch_image(&url).await {
                Ok(fetched) => return Some(into_image(fetched, candidate.tier, self.name(), &self.ttls)),
                Err(e) => log_miss(self.name(), handle, &e),
            }
        }
        None
    }
}

/// Build the configured sources, in configured order, on top of `client`.
pub fn build_sources(config: &AvatarConfig, client: &UpstreamClient) -> Vec<Arc<dyn AvatarSource>> {
    let ttls = config.cache_ttl;
    config
        .sources
        .iter()
        .map(|kind| -> Arc<dyn AvatarSource> {
            match kind {
                SourceKind::Official => Arc::new(OfficialApiSource::new(
                    client.clone(),
                    &config.official_api_base,
                    config.bearer_token.clone(),
                    ttls,
                )),
                SourceKind::AggregatorJson => Arc::new(AggregatorJsonSource::new(
                    client.clone(),
                    &config.aggregator_json_base,
                    ttls,
                )),
                SourceKind::Redirect => {
                    Arc::new(RedirectSource::new(client.clone(), &config.redirect_base, ttls))
                }
                SourceKind::Public => Arc::new(PublicAggregatorSource::new(
                    client.clone(),
                    config.public_candidates.clone(),
                    ttls,
                )),
            }
        })
        .collect()
}
