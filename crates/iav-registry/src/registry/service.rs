use std::sync::Arc;

use chrono::Local;

use super::dispatch::EventDispatcher;
use super::domain::{
    CertificateId, CorrelationInfo, IncomeBatch, IncomeSnapshot, PersonalNumber,
};
use super::eligibility::{EligibilityError, EligibilityEvaluator, EligibilityOutcome};
use super::ingest::{IngestError, IngestQueue};
use super::store::{CertificateStore, PersonDirectory, StoreError};

/// Facade over the registry core, exposing the three public operations the
/// HTTP layer binds to.
pub struct RegistryService<S, P> {
    evaluator: EligibilityEvaluator<S, P>,
    queue: IngestQueue,
    store: Arc<S>,
}

impl<S, P> RegistryService<S, P>
where
    S: CertificateStore,
    P: PersonDirectory,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<P>,
        dispatcher: EventDispatcher,
        queue: IngestQueue,
    ) -> Self {
        let evaluator = EligibilityEvaluator::new(Arc::clone(&store), directory, dispatcher);
        Self {
            evaluator,
            queue,
            store,
        }
    }

    /// Evaluate an eligibility request against today's date.
    pub fn request_eligibility_check(
        &self,
        personal_number: PersonalNumber,
        snapshot: IncomeSnapshot,
        correlation: CorrelationInfo,
    ) -> Result<EligibilityOutcome, EligibilityError> {
        self.evaluator.evaluate(
            personal_number,
            snapshot,
            correlation,
            Local::now().date_naive(),
        )
    }

    /// Queue an employer's monthly batch for the single monitor consumer.
    /// Returns the number of events accepted.
    pub fn submit_income_batch(&self, batch: IncomeBatch) -> Result<usize, IngestError> {
        self.queue.submit(batch)
    }

    /// True when a certificate with exactly this id is on file for the
    /// person.
    pub fn certificate_valid(
        &self,
        personal_number: &PersonalNumber,
        certificate_id: CertificateId,
    ) -> Result<bool, StoreError> {
        Ok(self
            .store
            .get(personal_number)?
            .map(|certificate| certificate.id == certificate_id)
            .unwrap_or(false))
    }
}
