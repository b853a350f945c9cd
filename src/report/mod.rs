//! Report generation job
//!
//! FETCH (per conversation) → TRANSCRIPT → SUMMARIZE → RENDER → WRITE
//!
//! Conversations are fetched one at a time. A resolution or fetch failure
//! only drops that conversation: it is recorded in the report and the job
//! moves on, failing only if no conversation could be collected. An
//! exhausted summarization retry budget or any other summarization failure
//! fails the whole job. A closed progress sink means the client went away,
//! so the job stops at the next conversation boundary instead of finishing
//! unseen.

use crate::config::AppConfig;
use crate::context::DigestContext;
use crate::error::DigestError;
use crate::gemini::GeminiClient;
use crate::messaging::{
    FetchLimits, FetchStrategy, HttpMessageSource, HttpPersonDirectory, MessageSource,
    PaginatedFetcher, PersonDirectory, StrategyConfig, StrategySelector,
};
use crate::models::{FetchOutcome, RouteVariant, TimeWindow};
use crate::progress::ProgressSink;
use crate::summary::transcript::{text_authors, text_messages};
use crate::summary::{build_prompt, build_transcript, GenerativeModel, ResilientSummarizer, RetryPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod writer;

pub use writer::{ReportWriter, WrittenReport};

const EMPTY_SUMMARY: &str = "No messages were found in this window.";

/// What a caller asks for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub conversation_ids: Vec<String>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl ReportRequest {
    pub fn window(&self) -> crate::Result<TimeWindow> {
        TimeWindow::new(self.from, self.to)
    }

    pub fn validate(&self) -> crate::Result<TimeWindow> {
        if self.conversation_ids.iter().all(|id| id.trim().is_empty()) {
            return Err(DigestError::Report(
                "at least one conversation id is required".to_string(),
            ));
        }
        self.window()
    }
}

/// Per-conversation line of a report
#[derive(Debug, Clone, Serialize)]
pub struct ConversationReport {
    pub conversation_id: String,
    /// `None` when the route could not be resolved
    pub route: Option<RouteVariant>,
    pub strategy: Option<FetchStrategy>,
    pub messages: usize,
    pub text_messages: usize,
    pub pages_fetched: u32,
    pub range_incomplete: bool,
    /// Why this conversation was left out of the summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Page index of a failed fetch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_page: Option<u32>,
}

impl ConversationReport {
    fn from_outcome(outcome: &FetchOutcome, strategy: FetchStrategy) -> Self {
        Self {
            conversation_id: outcome.route.conversation_id.clone(),
            route: Some(outcome.route.variant),
            strategy: Some(strategy),
            messages: outcome.messages.len(),
            text_messages: text_messages(&outcome.messages).count(),
            pages_fetched: outcome.pages_fetched,
            range_incomplete: outcome.range_incomplete,
            error: None,
            failed_page: None,
        }
    }

    fn failed(conversation_id: &str, error: &DigestError) -> Self {
        let (route, failed_page) = match error {
            DigestError::Fetch {
                route, page_index, ..
            } => (Some(route.variant), Some(*page_index)),
            _ => (None, None),
        };

        Self {
            conversation_id: conversation_id.to_string(),
            route,
            strategy: None,
            messages: 0,
            text_messages: 0,
            pages_fetched: 0,
            range_incomplete: false,
            error: Some(error.to_string()),
            failed_page,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportResult {
    pub job_id: Uuid,
    pub window: TimeWindow,
    pub conversations: Vec<ConversationReport>,
    pub summary: String,
    pub report: WrittenReport,
    pub generated_at: DateTime<Utc>,
}

/// Tunables for a job, grouped per component
#[derive(Debug, Clone, Copy, Default)]
pub struct JobSettings {
    pub fetch: FetchLimits,
    pub strategy: StrategyConfig,
    pub retry: RetryPolicy,
}

pub struct ReportJob {
    context: DigestContext,
    source: Arc<dyn MessageSource>,
    people: Arc<dyn PersonDirectory>,
    selector: StrategySelector,
    summarizer: ResilientSummarizer,
    writer: ReportWriter,
}

impl ReportJob {
    pub fn new(
        context: DigestContext,
        source: Arc<dyn MessageSource>,
        people: Arc<dyn PersonDirectory>,
        model: Arc<dyn GenerativeModel>,
        settings: JobSettings,
        writer: ReportWriter,
    ) -> Self {
        let fetcher = PaginatedFetcher::new(source.clone(), settings.fetch);
        Self {
            context,
            source,
            people,
            selector: StrategySelector::new(fetcher, settings.strategy),
            summarizer: ResilientSummarizer::new(model, settings.retry),
            writer,
        }
    }

    /// Wire the HTTP messaging API and Gemini clients from configuration
    pub fn from_config(config: &AppConfig, context: DigestContext) -> crate::Result<Self> {
        let source = HttpMessageSource::new(
            &config.messaging_base_url,
            config.messaging_token.clone(),
            context.metrics.clone(),
        )?;
        let people = HttpPersonDirectory::new(
            &config.messaging_base_url,
            config.messaging_token.clone(),
            context.metrics.clone(),
        )?;
        let model = GeminiClient::new(
            config.gemini_api_key.clone(),
            &config.gemini_model,
            context.metrics.clone(),
        )?;

        Ok(Self::new(
            context,
            Arc::new(source),
            Arc::new(people),
            Arc::new(model),
            JobSettings {
                fetch: config.fetch,
                strategy: config.strategy,
                retry: config.retry,
            },
            ReportWriter::new(config.reports_dir.clone()),
        ))
    }

    pub fn context(&self) -> &DigestContext {
        &self.context
    }

    pub async fn run(
        &self,
        request: &ReportRequest,
        sink: &dyn ProgressSink,
    ) -> crate::Result<ReportResult> {
        self.run_at(request, Utc::now(), sink).await
    }

    /// Run with an explicit "now", which drives the fetch strategy choice
    pub async fn run_at(
        &self,
        request: &ReportRequest,
        now: DateTime<Utc>,
        sink: &dyn ProgressSink,
    ) -> crate::Result<ReportResult> {
        let job_id = Uuid::new_v4();
        let span = info_span!("report_job", %job_id);

        let result = self
            .execute(job_id, request, now, sink)
            .instrument(span.clone())
            .await;

        if let Err(e) = &result {
            span.in_scope(|| warn!("Report job failed: {}", e));
            sink.emit(
                "job_failed",
                json!({ "job_id": job_id, "error": e.to_string() }),
            );
        }

        result
    }

    async fn execute(
        &self,
        job_id: Uuid,
        request: &ReportRequest,
        now: DateTime<Utc>,
        sink: &dyn ProgressSink,
    ) -> crate::Result<ReportResult> {
        let window = request.validate()?;

        info!(
            conversations = request.conversation_ids.len(),
            window = %window,
            "Report job started"
        );
        sink.emit(
            "job_started",
            json!({
                "job_id": job_id,
                "conversations": request.conversation_ids.len(),
                "from": window.from(),
                "to": window.to(),
            }),
        );

        let mut outcomes = Vec::with_capacity(request.conversation_ids.len());
        let mut conversations = Vec::with_capacity(request.conversation_ids.len());
        let mut first_failure = None;

        for conversation_id in request
            .conversation_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
        {
            ensure_listening(sink)?;
            sink.emit(
                "conversation_started",
                json!({ "conversation_id": conversation_id }),
            );

            match self.collect(conversation_id, &window, now, sink).await {
                Ok((strategy, outcome)) => {
                    sink.emit(
                        "fetch_complete",
                        json!({
                            "conversation_id": conversation_id,
                            "route": outcome.route.variant,
                            "strategy": strategy,
                            "messages": outcome.messages.len(),
                            "range_incomplete": outcome.range_incomplete,
                        }),
                    );

                    conversations.push(ConversationReport::from_outcome(&outcome, strategy));
                    outcomes.push(outcome);
                }
                Err(error @ (DigestError::Resolution { .. } | DigestError::Fetch { .. })) => {
                    warn!(conversation_id, "Conversation skipped: {}", error);
                    let report = ConversationReport::failed(conversation_id, &error);
                    sink.emit(
                        "conversation_failed",
                        json!({
                            "conversation_id": conversation_id,
                            "error": report.error,
                            "route": report.route,
                            "page_index": report.failed_page,
                        }),
                    );
                    conversations.push(report);
                    if first_failure.is_none() {
                        first_failure = Some(error);
                    }
                }
                Err(error) => return Err(error),
            }
        }

        if outcomes.is_empty() {
            if let Some(error) = first_failure {
                return Err(error);
            }
        }

        let names = self
            .context
            .people
            .resolve_all(self.people.as_ref(), text_authors(&outcomes))
            .await;
        let transcript = build_transcript(&outcomes, &names);
        let summary = if transcript.is_empty() {
            info!("No text messages in window, skipping summarization");
            EMPTY_SUMMARY.to_string()
        } else {
            ensure_listening(sink)?;
            sink.emit(
                "summarizing",
                json!({ "transcript_chars": transcript.len() }),
            );
            self.summarizer
                .summarize(&build_prompt(&window, &transcript), sink)
                .await?
        };

        let markdown = writer::render_markdown(&window, &conversations, &summary);
        let report = self.writer.write(job_id, &window, &markdown).await?;

        sink.emit(
            "report_written",
            json!({
                "job_id": job_id,
                "path": report.path.display().to_string(),
                "sha256": report.sha256,
            }),
        );
        info!(path = %report.path.display(), "Report job complete");

        Ok(ReportResult {
            job_id,
            window,
            conversations,
            summary,
            report,
            generated_at: Utc::now(),
        })
    }

    /// Resolve the route and fetch the window for one conversation
    async fn collect(
        &self,
        conversation_id: &str,
        window: &TimeWindow,
        now: DateTime<Utc>,
        sink: &dyn ProgressSink,
    ) -> crate::Result<(FetchStrategy, FetchOutcome)> {
        let route = self
            .context
            .resolver
            .resolve(self.source.as_ref(), conversation_id, sink)
            .await?;
        self.selector.fetch(&route, window, now, sink).await
    }
}

fn ensure_listening(sink: &dyn ProgressSink) -> crate::Result<()> {
    if sink.is_closed() {
        return Err(DigestError::Abandoned(
            "progress stream closed by client".to_string(),
        ));
    }
    Ok(())
}
