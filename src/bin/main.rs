use chat_digest::{
    config::AppConfig, progress::TracingSink, DigestContext, ReportJob, ReportRequest,
};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Generate a digest of chat history for a date range
#[derive(Debug, Parser)]
#[command(name = "digest", version)]
struct Args {
    /// Conversation id to include (repeatable)
    #[arg(short, long = "conversation", required = true)]
    conversations: Vec<String>,

    /// Start of the window (RFC 3339 or YYYY-MM-DD, inclusive)
    #[arg(long, value_parser = parse_instant)]
    from: DateTime<Utc>,

    /// End of the window (RFC 3339 or YYYY-MM-DD, inclusive; defaults to now)
    #[arg(long, value_parser = parse_instant)]
    to: Option<DateTime<Utc>>,
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("expected RFC 3339 or YYYY-MM-DD, got {:?}", value))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let context = DigestContext::new();
    let job = ReportJob::from_config(&config, context.clone())?;

    let request = ReportRequest {
        conversation_ids: args.conversations,
        from: args.from,
        to: args.to.unwrap_or_else(Utc::now),
    };

    info!(
        conversations = request.conversation_ids.len(),
        from = %request.from,
        to = %request.to,
        "Generating digest"
    );

    match job.run(&request, &TracingSink).await {
        Ok(result) => {
            println!("\n=== DIGEST REPORT ===");
            println!("Job ID: {}", result.job_id);
            println!("Report: {}", result.report.path.display());
            println!("SHA-256: {}", result.report.sha256);
            println!("\nConversations:");
            for (i, c) in result.conversations.iter().enumerate() {
                if let Some(error) = &c.error {
                    println!("  {}: {} FAILED: {}", i + 1, c.conversation_id, error);
                    continue;
                }
                println!(
                    "  {}: {} via {} route, {} messages over {} page(s){}",
                    i + 1,
                    c.conversation_id,
                    c.route.map(|r| r.as_str()).unwrap_or("-"),
                    c.text_messages,
                    c.pages_fetched,
                    if c.range_incomplete { " (possibly incomplete)" } else { "" }
                );
            }
            println!("\nCalls:");
            for (service, stats) in context.metrics.snapshot() {
                println!(
                    "  {}: {} calls, {} errors, {:.0} ms avg",
                    service, stats.calls, stats.errors, stats.avg_ms
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Digest failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
