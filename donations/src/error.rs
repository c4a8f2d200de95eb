//! Start-up errors.
//!
//! Operations return [`DomainError`]; this type only covers wiring a process
//! together (connecting to the database, running migrations).

use hemolink_core::{DomainError, StoreError};
use thiserror::Error;

/// Application errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Store connection or migration failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An operation failed while bootstrapping
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Notarization client could not be built
    #[error("Notary error: {0}")]
    Notary(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
