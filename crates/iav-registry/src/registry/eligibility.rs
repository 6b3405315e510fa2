use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use super::dispatch::{DispatchError, EventDispatcher, GrantedNotice, LifecycleEvent};
use super::domain::{Certificate, CorrelationInfo, IncomeSnapshot, NewCertificate, PersonalNumber};
use super::store::{CertificateStore, DirectoryError, PersonDirectory, StoreError};

/// Decision reached for one eligibility request. Everything except `Granted`
/// is resolved locally with no side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EligibilityOutcome {
    Granted(Certificate),
    AlreadyRegistered,
    NotEligible,
    UnknownPerson,
}

#[derive(Debug, thiserror::Error)]
pub enum EligibilityError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Decides whether a person qualifies for a new certificate and creates it.
pub struct EligibilityEvaluator<S, P> {
    store: Arc<S>,
    directory: Arc<P>,
    dispatcher: EventDispatcher,
}

impl<S, P> EligibilityEvaluator<S, P>
where
    S: CertificateStore,
    P: PersonDirectory,
{
    pub fn new(store: Arc<S>, directory: Arc<P>, dispatcher: EventDispatcher) -> Self {
        Self {
            store,
            directory,
            dispatcher,
        }
    }

    /// Evaluate one eligibility request. Idempotent for already-registered
    /// persons and silent for ineligible ones; only a grant touches the store
    /// or the dispatcher.
    pub fn evaluate(
        &self,
        personal_number: PersonalNumber,
        snapshot: IncomeSnapshot,
        correlation: CorrelationInfo,
        issue_date: NaiveDate,
    ) -> Result<EligibilityOutcome, EligibilityError> {
        if self.directory.lookup(&personal_number)?.is_none() {
            info!(%personal_number, "eligibility request for unknown person dropped");
            return Ok(EligibilityOutcome::UnknownPerson);
        }

        if self.store.get(&personal_number)?.is_some() {
            info!(%personal_number, "person already holds an active certificate, request dropped");
            return Ok(EligibilityOutcome::AlreadyRegistered);
        }

        if !snapshot.qualifies() {
            info!(%personal_number, "income above eligibility ceilings, no certificate issued");
            return Ok(EligibilityOutcome::NotEligible);
        }

        let draft = NewCertificate::issued_on(personal_number, issue_date);
        let id = self.store.insert(draft.clone())?;
        let certificate = draft.with_id(id);

        self.dispatcher.dispatch(LifecycleEvent::Granted(GrantedNotice {
            certificate: certificate.clone(),
            correlation,
        }))?;

        info!(
            personal_number = %certificate.personal_number,
            certificate_id = %certificate.id,
            expires = %certificate.expiration_date,
            "certificate issued"
        );
        Ok(EligibilityOutcome::Granted(certificate))
    }
}
