//! Chat Digest
//!
//! Builds summaries of chat history over an arbitrary date range from an
//! upstream API that only offers newest-first, cursor-based pagination:
//! - Resolves which of two route variants serves each conversation
//! - Walks pages backward until the requested window is covered
//! - Summarizes the merged transcript, backing off while the model is overloaded
//! - Writes a markdown report and streams progress while doing so
//!
//! PIPELINE:
//! RESOLVE → FETCH → TRANSCRIPT → SUMMARIZE → WRITE

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod gemini;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod progress;
pub mod report;
pub mod summary;

pub use error::{DigestError, Result};

// Re-export common types
pub use context::DigestContext;
pub use models::*;
pub use report::{ReportJob, ReportRequest, ReportResult};
