//! Fetch strategy selection
//!
//! Windows that start within the last few days are assumed to fit in the
//! most recent page, so a single request replaces the backward walk.

use crate::messaging::fetcher::PaginatedFetcher;
use crate::models::{FetchOutcome, Route, TimeWindow};
use crate::progress::ProgressSink;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_RECENT_WINDOW_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyConfig {
    /// Windows starting at most this many whole days ago use a single page
    pub recent_window_days: i64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            recent_window_days: DEFAULT_RECENT_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    LatestPage,
    Paginated,
}

pub struct StrategySelector {
    fetcher: PaginatedFetcher,
    config: StrategyConfig,
}

impl StrategySelector {
    pub fn new(fetcher: PaginatedFetcher, config: StrategyConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn choose(&self, window: &TimeWindow, now: DateTime<Utc>) -> FetchStrategy {
        let elapsed_days = (now - window.from()).num_days();
        if elapsed_days <= self.config.recent_window_days {
            FetchStrategy::LatestPage
        } else {
            FetchStrategy::Paginated
        }
    }

    /// Fetch `window` with the chosen strategy; returns the strategy that ran.
    pub async fn fetch(
        &self,
        route: &Route,
        window: &TimeWindow,
        now: DateTime<Utc>,
        sink: &dyn ProgressSink,
    ) -> crate::Result<(FetchStrategy, FetchOutcome)> {
        let strategy = self.choose(window, now);
        debug!(route = %route, ?strategy, "Fetch strategy selected");

        let outcome = match strategy {
            FetchStrategy::LatestPage => self.fetcher.fetch_latest_page(route, window, sink).await?,
            FetchStrategy::Paginated => self.fetcher.fetch_window(route, window, sink).await?,
        };
        Ok((strategy, outcome))
    }
}
