//! Route resolution
//!
//! A conversation's history lives under exactly one of two route variants.
//! The chat route is probed with a one-record request; a 404 there means
//! the channel route serves it. Any other probe failure is surfaced.

use crate::error::{DigestError, SourceError};
use crate::messaging::MessageSource;
use crate::models::{Route, RouteVariant};
use crate::progress::ProgressSink;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Resolves conversation ids to route variants, caching the answer.
///
/// The cache is advisory: both variants are deterministic facts about a
/// conversation, so concurrent misses may probe twice and the last write wins.
#[derive(Clone, Default)]
pub struct EndpointResolver {
    cache: Arc<RwLock<HashMap<String, RouteVariant>>>,
}

impl EndpointResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(
        &self,
        source: &dyn MessageSource,
        conversation_id: &str,
        sink: &dyn ProgressSink,
    ) -> crate::Result<Route> {
        if let Some(variant) = self.cached(conversation_id).await {
            debug!(conversation_id, route = %variant, "Route served from cache");
            return Ok(Route::new(conversation_id, variant));
        }

        let variant = probe(source, conversation_id, sink).await?;

        {
            let mut cache = self.cache.write().await;
            cache.insert(conversation_id.to_string(), variant);
        }

        Ok(Route::new(conversation_id, variant))
    }

    pub async fn cached(&self, conversation_id: &str) -> Option<RouteVariant> {
        let cache = self.cache.read().await;
        cache.get(conversation_id).copied()
    }

    /// Drop a cached answer so the next resolve probes again
    pub async fn invalidate(&self, conversation_id: &str) {
        let mut cache = self.cache.write().await;
        cache.remove(conversation_id);
    }
}

async fn probe(
    source: &dyn MessageSource,
    conversation_id: &str,
    sink: &dyn ProgressSink,
) -> crate::Result<RouteVariant> {
    let primary = Route::new(conversation_id, RouteVariant::Chat);

    match source.fetch_page(&primary, 1, None).await {
        Ok(_) => {
            info!(conversation_id, route = %RouteVariant::Chat, "Route resolved");
            sink.emit(
                "route_resolved",
                json!({ "conversation_id": conversation_id, "route": RouteVariant::Chat }),
            );
            Ok(RouteVariant::Chat)
        }
        Err(SourceError::NotFound) => {
            info!(
                conversation_id,
                route = %RouteVariant::Channel,
                "Chat route not found, falling back"
            );
            sink.emit(
                "route_fallback",
                json!({ "conversation_id": conversation_id, "route": RouteVariant::Channel }),
            );
            Ok(RouteVariant::Channel)
        }
        Err(cause) => Err(DigestError::Resolution {
            conversation_id: conversation_id.to_string(),
            cause,
        }),
    }
}
