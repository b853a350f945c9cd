//! Date-bounded pagination
//!
//! The upstream feed only goes newest → oldest, one cursor at a time.
//! [`PaginatedFetcher::fetch_window`] walks it backward and classifies
//! every record against the window:
//!
//! - newer than `to`   → skip, keep paging
//! - inside the window → keep
//! - older than `from` → skip, and stop after this page
//!
//! A page failure aborts the whole walk; partial results are dropped so a
//! report is never silently truncated. Hitting the page cap is the one
//! degraded case: whatever was collected is returned, flagged incomplete.

use crate::error::DigestError;
use crate::messaging::MessageSource;
use crate::models::{FetchOutcome, Message, Placement, Route, TimeWindow};
use crate::progress::ProgressSink;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_PAGE_SIZE: u32 = 250;
pub const DEFAULT_MAX_PAGES: u32 = 20;

/// Per-request caps for one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    /// Records requested per page (the API maximum)
    pub page_size: u32,
    /// Hard limit on page requests per fetch
    pub max_pages: u32,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    /// A record older than `from` was seen.
    WindowClosed,
    EmptyPage,
    EndOfHistory,
    PageCap,
}

/// Mutable state of one pagination walk
struct FetchState {
    cursor: Option<String>,
    pages_processed: u32,
    collected: Vec<Message>,
    range_exhausted: bool,
}

impl FetchState {
    fn new() -> Self {
        Self {
            cursor: None,
            pages_processed: 0,
            collected: Vec::new(),
            range_exhausted: false,
        }
    }

    /// Classify a page's records; returns how many were kept.
    fn absorb(&mut self, records: Vec<Message>, window: &TimeWindow) -> usize {
        let before = self.collected.len();
        for record in records {
            match window.classify(record.created_at) {
                Placement::InRange => self.collected.push(record),
                Placement::Older => self.range_exhausted = true,
                Placement::Newer => {}
            }
        }
        self.collected.len() - before
    }

    fn into_sorted(self) -> Vec<Message> {
        let mut messages = self.collected;
        sort_ascending(&mut messages);
        messages
    }
}

pub(crate) fn sort_ascending(messages: &mut [Message]) {
    messages.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Walks the upstream feed for one route at a time
pub struct PaginatedFetcher {
    source: Arc<dyn MessageSource>,
    limits: FetchLimits,
}

impl PaginatedFetcher {
    pub fn new(source: Arc<dyn MessageSource>, limits: FetchLimits) -> Self {
        Self { source, limits }
    }

    /// Page backward until `window` is covered, then return its messages oldest first.
    pub async fn fetch_window(
        &self,
        route: &Route,
        window: &TimeWindow,
        sink: &dyn ProgressSink,
    ) -> crate::Result<FetchOutcome> {
        let mut state = FetchState::new();

        let reason = loop {
            if state.pages_processed >= self.limits.max_pages {
                break StopReason::PageCap;
            }

            let page = self
                .source
                .fetch_page(route, self.limits.page_size, state.cursor.as_deref())
                .await
                .map_err(|cause| DigestError::Fetch {
                    route: route.clone(),
                    page_index: state.pages_processed,
                    cause,
                })?;
            state.pages_processed += 1;

            if page.records.is_empty() {
                break StopReason::EmptyPage;
            }

            let received = page.records.len();
            let kept = state.absorb(page.records, window);

            debug!(
                route = %route,
                page = state.pages_processed,
                received,
                kept,
                exhausted = state.range_exhausted,
                "Page classified"
            );
            sink.emit(
                "page_fetched",
                json!({
                    "conversation_id": route.conversation_id,
                    "page": state.pages_processed,
                    "received": received,
                    "kept": kept,
                    "collected": state.collected.len(),
                }),
            );

            if state.range_exhausted {
                break StopReason::WindowClosed;
            }

            match page.next_cursor {
                Some(cursor) => state.cursor = Some(cursor),
                None => break StopReason::EndOfHistory,
            }
        };

        let range_incomplete = reason == StopReason::PageCap;
        if range_incomplete {
            warn!(
                route = %route,
                max_pages = self.limits.max_pages,
                collected = state.collected.len(),
                "Page cap reached before the window closed; range may be incomplete"
            );
            sink.emit(
                "range_incomplete",
                json!({
                    "conversation_id": route.conversation_id,
                    "pages": state.pages_processed,
                    "collected": state.collected.len(),
                }),
            );
        }

        let pages_fetched = state.pages_processed;
        let messages = state.into_sorted();

        info!(
            route = %route,
            pages = pages_fetched,
            messages = messages.len(),
            stop = ?reason,
            "Window fetch complete"
        );

        Ok(FetchOutcome {
            route: route.clone(),
            messages,
            pages_fetched,
            range_incomplete,
        })
    }

    /// Fetch only the most recent page and filter it client-side.
    ///
    /// Meant for windows close to now. If the page never reaches `from`
    /// and more history exists, the outcome is flagged incomplete.
    pub async fn fetch_latest_page(
        &self,
        route: &Route,
        window: &TimeWindow,
        sink: &dyn ProgressSink,
    ) -> crate::Result<FetchOutcome> {
        let page = self
            .source
            .fetch_page(route, self.limits.page_size, None)
            .await
            .map_err(|cause| DigestError::Fetch {
                route: route.clone(),
                page_index: 0,
                cause,
            })?;

        let received = page.records.len();
        let reached_from = page
            .records
            .iter()
            .any(|m| window.classify(m.created_at) == Placement::Older);
        let range_incomplete = !reached_from && page.next_cursor.is_some();

        let mut messages: Vec<Message> = page
            .records
            .into_iter()
            .filter(|m| window.contains(m.created_at))
            .collect();
        sort_ascending(&mut messages);

        sink.emit(
            "page_fetched",
            json!({
                "conversation_id": route.conversation_id,
                "page": 1,
                "received": received,
                "kept": messages.len(),
                "collected": messages.len(),
            }),
        );

        if range_incomplete {
            warn!(
                route = %route,
                received,
                "Latest page does not reach the start of the window; range may be incomplete"
            );
            sink.emit(
                "range_incomplete",
                json!({
                    "conversation_id": route.conversation_id,
                    "pages": 1,
                    "collected": messages.len(),
                }),
            );
        }

        Ok(FetchOutcome {
            route: route.clone(),
            messages,
            pages_fetched: 1,
            range_incomplete,
        })
    }
}
