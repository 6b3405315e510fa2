use std::sync::Arc;

use tracing::{debug, info, warn};

use super::dispatch::{DispatchError, EventDispatcher, LifecycleEvent};
use super::domain::{Certificate, MonthlyIncomeEvent, StickSet};
use super::store::{CertificateStore, StoreError};

/// Where the monitor left a person after consuming one income event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomeOutcome {
    /// No certificate on file; an invalid-report notification was queued and
    /// nothing was mutated.
    CertificateNotFound,
    /// Counts updated, certificate still valid.
    Monitored(StickSet),
    /// Limits exceeded; certificate and stick set removed. Carries the final
    /// snapshot of the deleted certificate.
    Revoked(Certificate),
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// The monitoring state machine: Unmonitored -> Monitored -> Revoked.
///
/// Revocation is terminal; later income for the same person re-enters at
/// `CertificateNotFound`. Re-reported months double-count, there is no
/// idempotence key on income events.
pub struct StickAccumulator<S> {
    store: Arc<S>,
    dispatcher: EventDispatcher,
}

impl<S: CertificateStore> StickAccumulator<S> {
    pub fn new(store: Arc<S>, dispatcher: EventDispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Consume one monthly income event and advance the person's state.
    pub fn process(&self, event: MonthlyIncomeEvent) -> Result<IncomeOutcome, MonitorError> {
        let Some(certificate) = self.store.get(&event.personal_number)? else {
            warn!(
                personal_number = %event.personal_number,
                employer_id = event.employer_id,
                "income reported for a person with no certificate"
            );
            self.dispatcher
                .dispatch(LifecycleEvent::InvalidReported(event))?;
            return Ok(IncomeOutcome::CertificateNotFound);
        };

        // Lazily create the stick set on the first monitored income event and
        // persist it immediately at zero.
        let mut sticks = match self.store.stick_set(&event.personal_number)? {
            Some(sticks) => sticks,
            None => {
                let sticks = StickSet::empty(event.personal_number.clone());
                self.store.insert_stick_set(sticks.clone())?;
                sticks
            }
        };

        sticks.accrue(event.income);

        if sticks.within_limits() {
            self.store.update_stick_set(sticks.clone())?;
            debug!(
                personal_number = %sticks.personal_number,
                minor_sticks = sticks.minor_sticks,
                major_sticks = sticks.major_sticks,
                "stick counts updated"
            );
            return Ok(IncomeOutcome::Monitored(sticks));
        }

        // Terminal transition: certificate and stick set go together in one
        // atomic store call.
        let revoked = self.store.revoke(&event.personal_number)?.unwrap_or(certificate);
        info!(
            personal_number = %revoked.personal_number,
            certificate_id = %revoked.id,
            minor_sticks = sticks.minor_sticks,
            major_sticks = sticks.major_sticks,
            "certificate revoked"
        );
        self.dispatcher
            .dispatch(LifecycleEvent::Revoked(revoked.clone()))?;
        Ok(IncomeOutcome::Revoked(revoked))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testkit::{spawn_dispatcher, MemoryStore, RecordingSink};
    use super::*;
    use crate::registry::domain::{NewCertificate, PersonalNumber};
    use chrono::NaiveDate;

    fn person() -> PersonalNumber {
        PersonalNumber::from("19900101-1234")
    }

    fn monitored_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        let issued = NaiveDate::from_ymd_opt(2025, 1, 15).expect("valid date");
        store
            .insert(NewCertificate::issued_on(person(), issued))
            .expect("seed certificate");
        store
    }

    fn income_event(income: i64) -> MonthlyIncomeEvent {
        MonthlyIncomeEvent {
            employer_id: 7,
            personal_number: person(),
            has_certificate: true,
            certificate_id: None,
            year: 2025,
            month: 2,
            income,
        }
    }

    #[tokio::test]
    async fn three_major_incomes_revoke_on_the_third() {
        let store = monitored_store();
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, worker) = spawn_dispatcher(sink.clone());
        let monitor = StickAccumulator::new(store.clone(), dispatcher);

        for _ in 0..2 {
            let outcome = monitor.process(income_event(30_000)).expect("process");
            assert!(matches!(outcome, IncomeOutcome::Monitored(_)));
        }

        let outcome = monitor.process(income_event(30_000)).expect("process");
        let IncomeOutcome::Revoked(certificate) = outcome else {
            panic!("expected revocation, got {outcome:?}");
        };
        assert_eq!(certificate.personal_number, person());
        assert!(store.get(&person()).expect("store").is_none());
        assert!(store.stick_set(&person()).expect("store").is_none());

        drop(monitor);
        let report = worker.await.expect("worker join");
        assert_eq!(report.stats.delivered, 1);
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].1, LifecycleEvent::Revoked(_)));
    }

    #[tokio::test]
    async fn twenty_three_minor_incomes_stay_monitored() {
        let store = monitored_store();
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, worker) = spawn_dispatcher(sink.clone());
        let monitor = StickAccumulator::new(store.clone(), dispatcher);

        let mut last = None;
        for _ in 0..23 {
            last = Some(monitor.process(income_event(6_000)).expect("process"));
        }

        let Some(IncomeOutcome::Monitored(sticks)) = last else {
            panic!("expected the 23rd report to stay monitored");
        };
        assert_eq!(sticks.minor_sticks, 23);
        assert_eq!(sticks.major_sticks, 0);
        assert!(store.get(&person()).expect("store").is_some());

        drop(monitor);
        let report = worker.await.expect("worker join");
        assert_eq!(report.stats.submitted, 0);
    }

    #[tokio::test]
    async fn the_twenty_fourth_minor_income_revokes() {
        let store = monitored_store();
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, worker) = spawn_dispatcher(sink.clone());
        let monitor = StickAccumulator::new(store.clone(), dispatcher);

        for _ in 0..23 {
            monitor.process(income_event(6_000)).expect("process");
        }
        let outcome = monitor.process(income_event(6_000)).expect("process");

        assert!(matches!(outcome, IncomeOutcome::Revoked(_)));
        assert!(store.get(&person()).expect("store").is_none());

        drop(monitor);
        worker.await.expect("worker join");
    }

    #[tokio::test]
    async fn a_major_income_also_counts_as_minor() {
        let store = monitored_store();
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, worker) = spawn_dispatcher(sink.clone());
        let monitor = StickAccumulator::new(store.clone(), dispatcher);

        let outcome = monitor.process(income_event(28_000)).expect("process");
        let IncomeOutcome::Monitored(sticks) = outcome else {
            panic!("expected monitored");
        };
        assert_eq!(sticks.minor_sticks, 1);
        assert_eq!(sticks.major_sticks, 1);

        drop(monitor);
        worker.await.expect("worker join");
    }

    #[tokio::test]
    async fn unmonitored_income_only_signals_an_anomaly() {
        let store = Arc::new(MemoryStore::default());
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, worker) = spawn_dispatcher(sink.clone());
        let monitor = StickAccumulator::new(store.clone(), dispatcher);

        let outcome = monitor.process(income_event(7_000)).expect("process");

        assert_eq!(outcome, IncomeOutcome::CertificateNotFound);
        assert!(store.stick_set(&person()).expect("store").is_none());

        drop(monitor);
        let report = worker.await.expect("worker join");
        assert_eq!(report.stats.delivered, 1);
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].1, LifecycleEvent::InvalidReported(_)));
        assert_eq!(events[0].0, "certificates/invalid");
    }

    #[tokio::test]
    async fn income_after_revocation_reenters_as_not_found() {
        let store = monitored_store();
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, worker) = spawn_dispatcher(sink.clone());
        let monitor = StickAccumulator::new(store.clone(), dispatcher);

        for _ in 0..3 {
            monitor.process(income_event(30_000)).expect("process");
        }
        let outcome = monitor.process(income_event(30_000)).expect("process");

        assert_eq!(outcome, IncomeOutcome::CertificateNotFound);
        assert!(store.stick_set(&person()).expect("store").is_none());

        drop(monitor);
        let report = worker.await.expect("worker join");
        // One revocation plus one invalid-report anomaly.
        assert_eq!(report.stats.delivered, 2);
    }
}
