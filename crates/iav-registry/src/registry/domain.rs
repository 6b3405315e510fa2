use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Five-year salary income ceiling for certificate eligibility.
pub const SALARY_CEILING: i64 = 100_000;
/// Five-year capital income ceiling for certificate eligibility.
pub const CAPITAL_CEILING: i64 = 20_000;
/// Monthly income at or above this accrues a minor stick.
pub const MINOR_STICK_FLOOR: i64 = 5_000;
/// Monthly income at or above this accrues a major stick.
pub const MAJOR_STICK_FLOOR: i64 = 28_000;
/// A certificate survives while `major_sticks` stays below this limit.
pub const MAJOR_STICK_LIMIT: u32 = 3;
/// A certificate survives while `minor_sticks` stays below this limit.
pub const MINOR_STICK_LIMIT: u32 = 24;
/// Fixed certificate validity period in years.
pub const CERTIFICATE_TERM_YEARS: i32 = 6;

/// Identifier wrapper for a monitored individual, opaque to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonalNumber(pub String);

impl fmt::Display for PersonalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PersonalNumber {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Store-assigned identifier for an issued certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertificateId(pub u64);

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An issued IAV certificate. At most one exists per personal number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    pub personal_number: PersonalNumber,
    pub issue_date: NaiveDate,
    pub expiration_date: NaiveDate,
}

/// Insert shape for a certificate before the store has assigned an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCertificate {
    pub personal_number: PersonalNumber,
    pub issue_date: NaiveDate,
    pub expiration_date: NaiveDate,
}

impl NewCertificate {
    /// Build the insert record for a certificate issued on `issue_date`.
    pub fn issued_on(personal_number: PersonalNumber, issue_date: NaiveDate) -> Self {
        Self {
            personal_number,
            issue_date,
            expiration_date: plus_years(issue_date, CERTIFICATE_TERM_YEARS),
        }
    }

    pub fn with_id(self, id: CertificateId) -> Certificate {
        Certificate {
            id,
            personal_number: self.personal_number,
            issue_date: self.issue_date,
            expiration_date: self.expiration_date,
        }
    }
}

/// Accumulated strikes against a monitored certificate holder.
///
/// Counts never decrease; the set disappears only when the certificate is
/// revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickSet {
    pub personal_number: PersonalNumber,
    pub minor_sticks: u32,
    pub major_sticks: u32,
}

impl StickSet {
    pub fn empty(personal_number: PersonalNumber) -> Self {
        Self {
            personal_number,
            minor_sticks: 0,
            major_sticks: 0,
        }
    }

    /// Apply one monthly income to the counters. Thresholds are inclusive and
    /// not mutually exclusive, so one event can raise both counters.
    pub fn accrue(&mut self, income: i64) {
        if income >= MINOR_STICK_FLOOR {
            self.minor_sticks += 1;
        }
        if income >= MAJOR_STICK_FLOOR {
            self.major_sticks += 1;
        }
    }

    /// True while the holder may keep the certificate.
    pub fn within_limits(&self) -> bool {
        self.major_sticks < MAJOR_STICK_LIMIT && self.minor_sticks < MINOR_STICK_LIMIT
    }
}

/// One employer-reported monthly income figure for one person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyIncomeEvent {
    pub employer_id: u32,
    pub personal_number: PersonalNumber,
    pub has_certificate: bool,
    pub certificate_id: Option<CertificateId>,
    pub year: i32,
    pub month: u32,
    pub income: i64,
}

/// An employer submission batch, consumed in list order by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeBatch {
    pub employer_id: u32,
    pub events: Vec<MonthlyIncomeEvent>,
}

/// Salary and capital income aggregated over the fixed five-year window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeSnapshot {
    pub salary_income: i64,
    pub capital_income: i64,
}

impl IncomeSnapshot {
    /// The eligibility predicate: both aggregates at or under their ceilings.
    pub fn qualifies(&self) -> bool {
        self.salary_income <= SALARY_CEILING && self.capital_income <= CAPITAL_CEILING
    }
}

/// Caller-owned benchmarking metadata carried through grant notifications
/// unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationInfo {
    pub completion: bool,
    pub origin_ms: i64,
}

/// Calendar-year addition; Feb 29 clamps to Feb 28 in a non-leap target year.
pub(crate) fn plus_years(date: NaiveDate, years: i32) -> NaiveDate {
    date.with_year(date.year() + years).unwrap_or_else(|| {
        NaiveDate::from_ymd_opt(date.year() + years, 2, 28).expect("Feb 28 exists in every year")
    })
}
