use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use assessment_intake::config::IntakeConfig;
use assessment_intake::pipeline::{AssessmentProcessor, spawn_consumer};
use assessment_intake::store::{Database, LibSqlBackend};

/// Log to stderr, or to a daily-rolling file when `INTAKE_LOG_DIR` is set.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    match std::env::var("INTAKE_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "assessment-intake.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_tracing();

    let config = IntakeConfig::from_env().context("Invalid intake configuration")?;

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    // ── Consumer ─────────────────────────────────────────────────────────
    let processor = Arc::new(AssessmentProcessor::new(Arc::clone(&db), &config));
    let (queue, consumer) = spawn_consumer(
        processor,
        config.max_concurrent_messages,
        config.queue_capacity,
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        concurrency = config.max_concurrent_messages,
        cooldown_secs = config.reporting_cooldown.as_secs(),
        "Reading assessment messages from stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        if queue.send(line).await.is_err() {
            warn!("Consumer stopped early; discarding remaining input");
            break;
        }
    }
    drop(queue);

    let summary = consumer.await.context("Consumer task failed")?;
    info!(
        consumed = summary.consumed,
        reports_created = summary.reports_created,
        "Input exhausted, shutting down"
    );
    Ok(())
}
