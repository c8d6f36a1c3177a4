//! Avatar resolution pipeline.
//!
//! Tries the configured sources strictly in order and returns the first image
//! any of them produces. When all of them come up empty the handle gets a
//! local placeholder; when something goes badly wrong (a panicking source) the
//! caller still gets the default placeholder. [`AvatarResolver::resolve`]
//! therefore always returns an image.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use super::config::AvatarConfig;
use super::fetch::UpstreamClient;
use super::handle::Handle;
use super::image::{AvatarImage, CacheTtls, SourceTier};
use super::placeholder::DEFAULT_SEED;
use super::size::SizeToken;
use super::sources::{build_sources, AvatarSource};
use crate::server::metrics::STD_METRICS;

pub struct AvatarResolver {
    sources: Vec<Arc<dyn AvatarSource>>,
    attempt_timeout: Duration,
    ttls: CacheTtls,
}

impl std::fmt::Debug for AvatarResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarResolver")
            .field("sources", &self.source_names())
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl AvatarResolver {
    pub fn new(
        sources: Vec<Arc<dyn AvatarSource>>,
        attempt_timeout: Duration,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            sources,
            attempt_timeout,
            ttls,
        }
    }

    /// Build the resolver on the shared upstream connection pool.
    pub fn from_config(config: &AvatarConfig) -> Self {
        let client = UpstreamClient::shared(Duration::from_millis(config.fetch_timeout_ms));
        Self::new(
            build_sources(config, &client),
            Duration::from_millis(config.attempt_timeout_ms),
            config.cache_ttl,
        )
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Resolve `handle` to an image. Never fails.
    pub async fn resolve(&self, handle: &Handle, size: SizeToken) -> AvatarImage {
        match AssertUnwindSafe(self.resolve_inner(handle, size))
            .catch_unwind()
            .await
        {
            Ok(image) => image,
            Err(_) => {
                error!(handle = %handle, "avatar resolution panicked, serving default placeholder");
                AvatarImage::placeholder(DEFAULT_SEED, SourceTier::Fault, self.ttls.fault)
            }
        }
    }

    async fn resolve_inner(&self, handle: &Handle, size: SizeToken) -> AvatarImage {
        if handle.is_empty() {
            return AvatarImage::placeholder(DEFAULT_SEED, SourceTier::Anonymous, self.ttls.anonymous);
        }

        for source in &self.sources {
            let budget = self
                .attempt_timeout
                .saturating_mul(source.max_requests().max(1));
            match tokio::time::timeout(budget, source.attempt(handle, size)).await {
                Ok(Some(image)) => {
                    info!(
                        handle = %handle,
                        source = source.name(),
                        tier = image.tier.as_str(),
                        bytes = image.bytes.len(),
                        "avatar resolved"
                    );
                    return image;
                }
                Ok(None) => {
                    debug!(handle = %handle, source = source.name(), "avatar source produced nothing");
                }
                Err(_) => {
                    warn!(
                        handle = %handle,
                        source = source.name(),
                        budget_ms = budget.as_millis() as u64,
                        "avatar source timed out"
                    );
                }
            }
            STD_METRICS.avatar_source_misses_total.inc(&[source.name()]);
        }

        info!(handle = %handle, "all avatar sources failed, serving placeholder");
        AvatarImage::placeholder(handle.as_str(), SourceTier::Placeholder, self.ttls.placeholder)
    }
}
