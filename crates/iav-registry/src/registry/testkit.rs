//! In-memory collaborator stand-ins shared by the registry unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::dispatch::{
    DispatchEndpoints, DispatchReport, EventDispatcher, EventSink, LifecycleEvent, RetryPolicy,
    SinkError,
};
use super::domain::{
    Certificate, CertificateId, IncomeSnapshot, NewCertificate, PersonalNumber, StickSet,
};
use super::store::{
    CertificateStore, DirectoryError, PersonDirectory, StoreError,
};

#[derive(Default)]
struct MemoryState {
    certificates: HashMap<PersonalNumber, Certificate>,
    sticks: HashMap<PersonalNumber, StickSet>,
}

/// Mutex-backed certificate store. One lock covers both tables so `revoke`
/// is atomic.
#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<MemoryState>,
    next_id: AtomicU64,
}

impl CertificateStore for MemoryStore {
    fn insert(&self, certificate: NewCertificate) -> Result<CertificateId, StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        if state.certificates.contains_key(&certificate.personal_number) {
            return Err(StoreError::Conflict);
        }
        let id = CertificateId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        state
            .certificates
            .insert(certificate.personal_number.clone(), certificate.with_id(id));
        Ok(id)
    }

    fn get(&self, personal_number: &PersonalNumber) -> Result<Option<Certificate>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.certificates.get(personal_number).cloned())
    }

    fn remove(&self, id: CertificateId) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let key = state
            .certificates
            .iter()
            .find(|(_, cert)| cert.id == id)
            .map(|(key, _)| key.clone())
            .ok_or(StoreError::NotFound)?;
        state.certificates.remove(&key);
        Ok(())
    }

    fn stick_set(
        &self,
        personal_number: &PersonalNumber,
    ) -> Result<Option<StickSet>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.sticks.get(personal_number).cloned())
    }

    fn insert_stick_set(&self, stick_set: StickSet) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        if state.sticks.contains_key(&stick_set.personal_number) {
            return Err(StoreError::Conflict);
        }
        state
            .sticks
            .insert(stick_set.personal_number.clone(), stick_set);
        Ok(())
    }

    fn update_stick_set(&self, stick_set: StickSet) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        if !state.sticks.contains_key(&stick_set.personal_number) {
            return Err(StoreError::NotFound);
        }
        state
            .sticks
            .insert(stick_set.personal_number.clone(), stick_set);
        Ok(())
    }

    fn remove_stick_set(&self, personal_number: &PersonalNumber) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.sticks.remove(personal_number);
        Ok(())
    }

    fn revoke(
        &self,
        personal_number: &PersonalNumber,
    ) -> Result<Option<Certificate>, StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.sticks.remove(personal_number);
        Ok(state.certificates.remove(personal_number))
    }
}

/// Seedable person directory.
#[derive(Default)]
pub(crate) struct MemoryDirectory {
    persons: Mutex<HashMap<PersonalNumber, IncomeSnapshot>>,
}

impl MemoryDirectory {
    pub(crate) fn insert(&self, personal_number: PersonalNumber, snapshot: IncomeSnapshot) {
        self.persons
            .lock()
            .expect("directory mutex poisoned")
            .insert(personal_number, snapshot);
    }
}

impl PersonDirectory for MemoryDirectory {
    fn lookup(
        &self,
        personal_number: &PersonalNumber,
    ) -> Result<Option<IncomeSnapshot>, DirectoryError> {
        Ok(self
            .persons
            .lock()
            .expect("directory mutex poisoned")
            .get(personal_number)
            .copied())
    }
}

/// Sink that accepts everything and remembers what it saw.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<(String, LifecycleEvent)>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<(String, LifecycleEvent)> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send(&self, endpoint: &str, event: &LifecycleEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push((endpoint.to_string(), event.clone()));
        Ok(())
    }
}

/// Dispatcher with millisecond backoff so tests never wait on real delays.
pub(crate) fn spawn_dispatcher(
    sink: Arc<RecordingSink>,
) -> (EventDispatcher, JoinHandle<DispatchReport>) {
    EventDispatcher::spawn(
        sink,
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            max_attempts: 5,
        },
        DispatchEndpoints::default(),
        None,
    )
}
