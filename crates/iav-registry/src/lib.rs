//! Core library for the IAV certificate-monitoring registry: the certificate
//! lifecycle state machine and its asynchronous event-delivery layer, plus
//! the configuration and telemetry plumbing the HTTP service builds on.

pub mod config;
pub mod error;
pub mod eventlog;
pub mod registry;
pub mod telemetry;
