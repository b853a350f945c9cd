//! Markdown rendering and on-disk persistence of digest reports

use crate::models::TimeWindow;
use crate::report::ConversationReport;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

/// Location and fingerprint of a written report
#[derive(Debug, Clone, Serialize)]
pub struct WrittenReport {
    pub path: PathBuf,
    /// SHA-256 of the file contents, hex encoded
    pub sha256: String,
}

pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn file_name(job_id: Uuid, window: &TimeWindow) -> String {
        format!(
            "digest-{}-{}-{}.md",
            window.from().format("%Y%m%dT%H%M"),
            window.to().format("%Y%m%dT%H%M"),
            job_id.simple()
        )
    }

    pub async fn write(
        &self,
        job_id: Uuid,
        window: &TimeWindow,
        markdown: &str,
    ) -> crate::Result<WrittenReport> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(Self::file_name(job_id, window));
        tokio::fs::write(&path, markdown.as_bytes()).await?;

        let sha256 = content_hash(markdown);
        info!(path = %path.display(), bytes = markdown.len(), "Report written");

        Ok(WrittenReport { path, sha256 })
    }
}

pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

pub fn render_markdown(
    window: &TimeWindow,
    conversations: &[ConversationReport],
    summary: &str,
) -> String {
    let mut out = String::new();

    out.push_str("# Chat Digest\n\n");
    out.push_str(&format!(
        "**Window:** {} → {} (UTC)\n\n",
        window.from().format("%Y-%m-%d %H:%M"),
        window.to().format("%Y-%m-%d %H:%M")
    ));

    out.push_str("| Conversation | Route | Messages | Pages |\n");
    out.push_str("|--------------|-------|----------|-------|\n");
    for c in conversations {
        let marker = if c.is_failed() {
            " ❌"
        } else if c.range_incomplete {
            " ⚠️"
        } else {
            ""
        };
        out.push_str(&format!(
            "| {}{} | {} | {} | {} |\n",
            c.conversation_id,
            marker,
            c.route.map(|r| r.as_str()).unwrap_or("-"),
            c.text_messages,
            c.pages_fetched
        ));
    }
    out.push('\n');

    if conversations.iter().any(|c| c.range_incomplete) {
        out.push_str(
            "> ⚠️ The page limit was reached before the start of the window for the \
             marked conversations; their history may be incomplete.\n\n",
        );
    }

    let failed: Vec<_> = conversations.iter().filter(|c| c.is_failed()).collect();
    if !failed.is_empty() {
        out.push_str("## Failed conversations\n\n");
        for c in failed {
            out.push_str(&format!(
                "- {}: {}\n",
                c.conversation_id,
                c.error.as_deref().unwrap_or("unknown error")
            ));
        }
        out.push_str("\nThese conversations are not part of the summary.\n\n");
    }

    out.push_str("## Summary\n\n");
    out.push_str(summary.trim());
    out.push('\n');

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DigestError, SourceError};
    use crate::messaging::FetchStrategy;
    use crate::models::RouteVariant;
    use chrono::{TimeZone, Utc};

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn conversation(id: &str, incomplete: bool) -> ConversationReport {
        ConversationReport {
            conversation_id: id.to_string(),
            route: Some(RouteVariant::Channel),
            strategy: Some(FetchStrategy::Paginated),
            messages: 4,
            text_messages: 3,
            pages_fetched: 2,
            range_incomplete: incomplete,
            error: None,
            failed_page: None,
        }
    }

    #[test]
    fn test_render_lists_conversations_and_summary() {
        let markdown = render_markdown(&window(), &[conversation("c1", false)], "- shipped\n");

        assert!(markdown.contains("2024-01-01 00:00 → 2024-01-02 00:00"));
        assert!(markdown.contains("| c1 | channel | 3 | 2 |"));
        assert!(markdown.ends_with("## Summary\n\n- shipped\n"));
        assert!(!markdown.contains("may be incomplete"));
        assert!(!markdown.contains("Failed conversations"));
    }

    #[test]
    fn test_render_lists_failed_conversations() {
        let error = DigestError::Resolution {
            conversation_id: "c2".into(),
            cause: SourceError::Status {
                status: 403,
                body: "forbidden".into(),
            },
        };
        let markdown = render_markdown(
            &window(),
            &[
                conversation("c1", false),
                ConversationReport::failed("c2", &error),
            ],
            "x",
        );

        assert!(markdown.contains("| c2 ❌ | - | 0 | 0 |"));
        assert!(markdown.contains("## Failed conversations"));
        assert!(markdown.contains("- c2: Could not resolve message route for conversation c2"));
    }

    #[test]
    fn test_render_flags_incomplete_ranges() {
        let markdown = render_markdown(&window(), &[conversation("c1", true)], "x");
        assert!(markdown.contains("| c1 ⚠️ |"));
        assert!(markdown.contains("may be incomplete"));
    }

    #[tokio::test]
    async fn test_write_creates_directory_and_hashes_content() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("nested"));
        let job_id = Uuid::new_v4();

        let written = writer.write(job_id, &window(), "# report\n").await.unwrap();

        let on_disk = std::fs::read_to_string(&written.path).unwrap();
        assert_eq!(on_disk, "# report\n");
        assert_eq!(written.sha256, content_hash("# report\n"));
        assert_eq!(written.sha256.len(), 64);
        assert!(written
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("digest-20240101T0000-20240102T0000-"));
    }
}
