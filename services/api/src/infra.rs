use async_trait::async_trait;
use iav_registry::registry::{
    Certificate, CertificateId, CertificateStore, DirectoryError, EventSink, IncomeSnapshot,
    LifecycleEvent, NewCertificate, PersonDirectory, PersonalNumber, SinkError, StickSet,
    StoreError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct RegistryTables {
    certificates: HashMap<PersonalNumber, Certificate>,
    sticks: HashMap<PersonalNumber, StickSet>,
}

/// Mutex-backed certificate store. A single lock spans both tables, which is
/// what makes `revoke` atomic.
#[derive(Default)]
pub(crate) struct InMemoryCertificateStore {
    tables: Mutex<RegistryTables>,
    next_id: AtomicU64,
}

impl CertificateStore for InMemoryCertificateStore {
    fn insert(&self, certificate: NewCertificate) -> Result<CertificateId, StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if tables.certificates.contains_key(&certificate.personal_number) {
            return Err(StoreError::Conflict);
        }
        let id = CertificateId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        tables
            .certificates
            .insert(certificate.personal_number.clone(), certificate.with_id(id));
        Ok(id)
    }

    fn get(&self, personal_number: &PersonalNumber) -> Result<Option<Certificate>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.certificates.get(personal_number).cloned())
    }

    fn remove(&self, id: CertificateId) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let key = tables
            .certificates
            .iter()
            .find(|(_, certificate)| certificate.id == id)
            .map(|(key, _)| key.clone())
            .ok_or(StoreError::NotFound)?;
        tables.certificates.remove(&key);
        Ok(())
    }

    fn stick_set(
        &self,
        personal_number: &PersonalNumber,
    ) -> Result<Option<StickSet>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.sticks.get(personal_number).cloned())
    }

    fn insert_stick_set(&self, stick_set: StickSet) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if tables.sticks.contains_key(&stick_set.personal_number) {
            return Err(StoreError::Conflict);
        }
        tables
            .sticks
            .insert(stick_set.personal_number.clone(), stick_set);
        Ok(())
    }

    fn update_stick_set(&self, stick_set: StickSet) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if !tables.sticks.contains_key(&stick_set.personal_number) {
            return Err(StoreError::NotFound);
        }
        tables
            .sticks
            .insert(stick_set.personal_number.clone(), stick_set);
        Ok(())
    }

    fn remove_stick_set(&self, personal_number: &PersonalNumber) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        tables.sticks.remove(personal_number);
        Ok(())
    }

    fn revoke(
        &self,
        personal_number: &PersonalNumber,
    ) -> Result<Option<Certificate>, StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        tables.sticks.remove(personal_number);
        Ok(tables.certificates.remove(personal_number))
    }
}

/// Seedable stand-in for the external population registry.
#[derive(Default)]
pub(crate) struct InMemoryPersonDirectory {
    persons: Mutex<HashMap<PersonalNumber, IncomeSnapshot>>,
}

impl InMemoryPersonDirectory {
    pub(crate) fn insert(&self, personal_number: PersonalNumber, snapshot: IncomeSnapshot) {
        self.persons
            .lock()
            .expect("directory mutex poisoned")
            .insert(personal_number, snapshot);
    }
}

impl PersonDirectory for InMemoryPersonDirectory {
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

/// Collaborator stand-in for the downstream notification endpoints: accepts
/// every delivery and surfaces it in the service log.
#[derive(Default)]
pub(crate) struct LoggingEventSink;

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn send(&self, endpoint: &str, event: &LifecycleEvent) -> Result<(), SinkError> {
        info!(
            endpoint,
            kind = event.kind(),
            personal_number = %event.personal_number(),
            "lifecycle event accepted by sink"
        );
        Ok(())
    }
}
