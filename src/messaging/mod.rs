//! Upstream messaging API access
//!
//! The upstream feed is reverse-chronological and cursor-paginated with
//! no server-side date filter. Everything here exists to turn that into
//! "all messages in `[from, to]`, oldest first":
//!
//! - [`resolver`] decides which of the two route variants serves a conversation
//! - [`fetcher`] walks pages backward until the window is covered
//! - [`strategy`] skips the walk for windows that start in the last few days
//! - [`people`] turns author ids into display names

use crate::error::SourceError;
use crate::models::{Page, Route};
use async_trait::async_trait;

pub mod client;
pub mod fetcher;
pub mod people;
pub mod resolver;
pub mod strategy;

pub use client::HttpMessageSource;
pub use fetcher::{FetchLimits, PaginatedFetcher};
pub use people::{HttpPersonDirectory, NameCache, PersonDirectory};
pub use resolver::EndpointResolver;
pub use strategy::{FetchStrategy, StrategyConfig, StrategySelector};

/// One page request against the upstream feed
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch up to `page_size` records, newest first, starting at `cursor`
    /// (`None` for the most recent page).
    async fn fetch_page(
        &self,
        route: &Route,
        page_size: u32,
        cursor: Option<&str>,
    ) -> std::result::Result<Page, SourceError>;
}
