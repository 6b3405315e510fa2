use tokio::sync::mpsc;
use tracing::{debug, error};

use super::domain::IncomeBatch;
use super::sticks::StickAccumulator;
use super::store::CertificateStore;

/// Unbounded FIFO buffer decoupling inbound income submission from the
/// sequential monitor. Producers never block; memory growth is traded for
/// ingestion availability.
#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::UnboundedSender<IncomeBatch>,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("ingest consumer is no longer running")]
    ConsumerStopped,
}

impl IngestQueue {
    /// Build a queue and its single consumer. The consumer owns the
    /// accumulator; spawning `worker.run()` starts the drain loop.
    pub fn pair<S: CertificateStore>(
        accumulator: StickAccumulator<S>,
    ) -> (Self, IngestWorker<S>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, IngestWorker { rx, accumulator })
    }

    /// Enqueue a batch, returning the number of events accepted.
    pub fn submit(&self, batch: IncomeBatch) -> Result<usize, IngestError> {
        let events = batch.events.len();
        self.tx
            .send(batch)
            .map_err(|_| IngestError::ConsumerStopped)?;
        Ok(events)
    }
}

/// The queue's single consumer. Batches drain in submission order and events
/// within a batch in list order; this single-writer discipline is what keeps
/// per-person transitions totally ordered.
pub struct IngestWorker<S> {
    rx: mpsc::UnboundedReceiver<IncomeBatch>,
    accumulator: StickAccumulator<S>,
}

impl<S: CertificateStore> IngestWorker<S> {
    pub async fn run(mut self) {
        while let Some(batch) = self.rx.recv().await {
            debug!(
                employer_id = batch.employer_id,
                events = batch.events.len(),
                "processing income batch"
            );
            for event in batch.events {
                let personal_number = event.personal_number.clone();
                // A store failure aborts this event's transition only; the
                // consumer keeps draining.
                if let Err(err) = self.accumulator.process(event) {
                    error!(%personal_number, %err, "income transition aborted");
                }
            }
        }
    }
}
