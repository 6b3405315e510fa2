use super::domain::{
    Certificate, CertificateId, IncomeSnapshot, NewCertificate, PersonalNumber, StickSet,
};

/// Persistence boundary for certificates and stick sets.
///
/// Implementations must make `revoke` atomic: the certificate and its stick
/// set disappear in one step, so a crash can never leave one without the
/// other.
pub trait CertificateStore: Send + Sync {
    /// Persist a new certificate and return the store-assigned id.
    fn insert(&self, certificate: NewCertificate) -> Result<CertificateId, StoreError>;

    /// The active certificate for a person, if any.
    fn get(&self, personal_number: &PersonalNumber) -> Result<Option<Certificate>, StoreError>;

    /// Remove a certificate by id.
    fn remove(&self, id: CertificateId) -> Result<(), StoreError>;

    fn stick_set(&self, personal_number: &PersonalNumber)
        -> Result<Option<StickSet>, StoreError>;

    fn insert_stick_set(&self, stick_set: StickSet) -> Result<(), StoreError>;

    fn update_stick_set(&self, stick_set: StickSet) -> Result<(), StoreError>;

    fn remove_stick_set(&self, personal_number: &PersonalNumber) -> Result<(), StoreError>;

    /// Atomically remove a person's certificate and stick set, returning the
    /// removed certificate's final snapshot. `None` if no certificate was on
    /// file.
    fn revoke(&self, personal_number: &PersonalNumber)
        -> Result<Option<Certificate>, StoreError>;
}

/// Error enumeration for store failures. These abort the enclosing
/// transition; nothing in the core retries them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Resolves a personal number to income-eligibility attributes. Owned by the
/// external population registry; only the lookup matters here.
pub trait PersonDirectory: Send + Sync {
    fn lookup(
        &self,
        personal_number: &PersonalNumber,
    ) -> Result<Option<IncomeSnapshot>, DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("person directory unavailable: {0}")]
    Unavailable(String),
}
