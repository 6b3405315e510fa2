//! Certificate lifecycle core: eligibility evaluation, stick accumulation,
//! revocation, and the retrying delivery of lifecycle events.

pub mod dispatch;
pub mod domain;
pub mod eligibility;
pub mod ingest;
pub mod router;
pub mod service;
pub mod sticks;
pub mod store;

#[cfg(test)]
pub(crate) mod testkit;

pub use dispatch::{
    DeadLetter, DispatchEndpoints, DispatchError, DispatchReport, DispatchStatsSnapshot,
    EventDispatcher, EventSink, GrantedNotice, LifecycleEvent, RetryPolicy, SinkError,
};
pub use domain::{
    Certificate, CertificateId, CorrelationInfo, IncomeBatch, IncomeSnapshot, MonthlyIncomeEvent,
    NewCertificate, PersonalNumber, StickSet,
};
pub use eligibility::{EligibilityError, EligibilityEvaluator, EligibilityOutcome};
pub use ingest::{IngestError, IngestQueue, IngestWorker};
pub use router::{registry_router, RegistryState};
pub use service::RegistryService;
pub use sticks::{IncomeOutcome, MonitorError, StickAccumulator};
pub use store::{CertificateStore, DirectoryError, PersonDirectory, StoreError};
