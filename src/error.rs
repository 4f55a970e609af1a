//! Error taxonomy shared by every engine component.
//!
//! Per-item failures inside fan-out loops (one pool, one position) are caught by
//! the caller and logged; only `Validation`, `Confirmation` and `Submission`
//! ever reach the public API as errors. `NotFound` is mapped to an empty
//! result at the facade.

use crate::types::{Pubkey, Signature};
use crate::types::conversions::ConversionError;

/// Convenience alias used across the crate.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Timeouts, connection resets, rate-limit responses. Retryable.
    #[error("transient network error during {operation}: {reason}")]
    TransientNetwork { operation: String, reason: String },

    /// A single element or record could not be decoded.
    #[error("malformed data: {0}")]
    MalformedData(String),

    /// Fatal to the single operation; never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The transaction landed but failed, or expired unconfirmed.
    #[error("transaction {signature} failed in phase {phase}: {reason}")]
    Confirmation {
        signature: Signature,
        phase: String,
        reason: String,
        confirmed: Vec<Signature>,
    },

    /// `send_raw_transaction` itself was rejected; nothing was submitted.
    #[error("submission failed in phase {phase}: {reason}")]
    Submission {
        phase: String,
        reason: String,
        confirmed: Vec<Signature>,
    },

    #[error("{kind} {address} not found")]
    NotFound { kind: &'static str, address: Pubkey },

    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn transient(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::TransientNetwork {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Only transient network failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }

    /// Signatures that reached `Confirmed` before a batch was aborted.
    pub fn confirmed_signatures(&self) -> &[Signature] {
        match self {
            Self::Confirmation { confirmed, .. } | Self::Submission { confirmed, .. } => confirmed,
            _ => &[],
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(format!("{:#}", err))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<ConversionError> for EngineError {
    fn from(err: ConversionError) -> Self {
        Self::MalformedData(err.to_string())
    }
}

impl From<bincode::Error> for EngineError {
    fn from(err: bincode::Error) -> Self {
        Self::MalformedData(format!("transaction encoding: {}", err))
    }
}
