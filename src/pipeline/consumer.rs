//! Bounded worker pool draining the inbound queue.
//!
//! Messages are handled independently with up to `concurrency` in flight.
//! Each one runs in its own task so a panic is contained to that message.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use crate::pipeline::processor::AssessmentProcessor;
use crate::pipeline::types::IntakeOutcome;

/// Totals reported when the queue closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerSummary {
    pub consumed: usize,
    pub reports_created: usize,
    pub dropped: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Counters {
    consumed: AtomicUsize,
    reports_created: AtomicUsize,
    dropped: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn record(&self, outcome: &IntakeOutcome) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            IntakeOutcome::Reported { reports, .. } => {
                self.reports_created.fetch_add(reports.len(), Ordering::Relaxed);
            }
            IntakeOutcome::ContactAttemptRecorded { .. } => {}
            IntakeOutcome::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            IntakeOutcome::Malformed
            | IntakeOutcome::Empty
            | IntakeOutcome::UnknownMonitoree
            | IntakeOutcome::Duplicate { .. }
            | IntakeOutcome::UnknownThreshold { .. } => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn summary(&self) -> ConsumerSummary {
        ConsumerSummary {
            consumed: self.consumed.load(Ordering::Relaxed),
            reports_created: self.reports_created.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Spawn the consumer. Drop every clone of the returned sender to drain and stop it.
pub fn spawn_consumer(
    processor: Arc<AssessmentProcessor>,
    concurrency: usize,
    capacity: usize,
) -> (mpsc::Sender<String>, JoinHandle<ConsumerSummary>) {
    let (tx, rx) = mpsc::channel::<String>(capacity.max(1));
    let concurrency = concurrency.max(1);

    let handle = tokio::spawn(async move {
        info!(concurrency, "Assessment consumer started");
        let counters = Counters::default();
        let tally = &counters;

        ReceiverStream::new(rx)
            .for_each_concurrent(concurrency, move |raw| {
                let processor = Arc::clone(&processor);
                async move {
                    let task = tokio::spawn(async move { processor.consume(&raw).await });
                    match task.await {
                        Ok(outcome) => tally.record(&outcome),
                        Err(e) => {
                            error!(error = %e, "Message handler panicked");
                            tally.record(&IntakeOutcome::Failed);
                        }
                    }
                }
            })
            .await;

        let summary = counters.summary();
        info!(
            consumed = summary.consumed,
            reports_created = summary.reports_created,
            dropped = summary.dropped,
            failed = summary.failed,
            "Assessment consumer stopped"
        );
        summary
    });

    (tx, handle)
}
