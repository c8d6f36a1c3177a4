//! Avatar proxy
//!
//! Resolves a social handle to a profile image:
//!
//! - **Handle**: canonical lookup key (`@Example_User` → `example_user`)
//! - **AvatarResolver**: tries the configured sources in priority order
//!   (official API, aggregator JSON, redirect, public aggregators) and falls
//!   back to a locally rendered initials SVG
//! - **rewrite_size**: asks the image CDN for a different resolution
//! - **avatar_response**: `ETag`, tiered `Cache-Control` and `304` handling
//!
//! # Example
//!
//! ```ignore
//! use sentient_race::avatar::{AvatarConfig, AvatarResolver, Handle, SizeToken};
//!
//! let resolver = AvatarResolver::from_config(&AvatarConfig::default());
//! let image = resolver
//!     .resolve(&Handle::normalize("@someone"), SizeToken::Large)
//!     .await;
//! println!("{} bytes from {}", image.bytes.len(), image.source);
//! ```

pub mod cache;
pub mod config;
pub mod fetch;
pub mod handle;
pub mod image;
pub mod pipeline;
pub mod placeholder;
pub mod rewrite;
pub mod size;
pub mod sources;

pub use cache::{avatar_response, cache_control, if_none_match_matches, STALE_WHILE_REVALIDATE_SECS};
pub use config::{AvatarConfig, CandidateUrl, SourceKind};
pub use fetch::{bounded, FetchError, FetchedImage, UpstreamClient, DEFAULT_FETCH_TIMEOUT_MS, USER_AGENT};
pub use handle::{Handle, MAX_HANDLE_LEN};
pub use image::{AvatarImage, CacheTtls, SourceTier};
pub use pipeline::AvatarResolver;
pub use placeholder::{initials, render_placeholder, DEFAULT_SEED};
pub use rewrite::rewrite_size;
pub use size::SizeToken;
pub use sources::{
    build_sources, AggregatorJsonSource, AvatarSource, OfficialApiSource, PublicAggregatorSource,
    RedirectSource,
};
