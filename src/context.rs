//! Shared state injected into the pipeline components

use crate::messaging::{EndpointResolver, NameCache};
use crate::metrics::Metrics;

/// Process-lifetime state: call counters, the route cache and display names.
///
/// Cloning shares the same underlying tables, so tests build their own
/// instance instead of touching a global.
#[derive(Clone, Default)]
pub struct DigestContext {
    pub metrics: Metrics,
    pub resolver: EndpointResolver,
    pub people: NameCache,
}

impl DigestContext {
    pub fn new() -> Self {
        Self::default()
    }
}
