//! Error taxonomy for the transfer pipeline
//!
//! Every component (resolver, builder, signing coordinator, broadcaster) reports
//! failures through [`TransferError`]. The variants map one-to-one onto the
//! outcomes the user interface acts on:
//! - Validation: user must correct input, never retried
//! - Configuration: operator intervention, never retried
//! - Signing: user denied or signer misbehaved
//! - Broadcast: ledger rejected or did not confirm in time
//! - Network: unclassified lower-level failure

use crate::ledger::LedgerError;
use crate::signer::SignerStatus;
use thiserror::Error;

/// Error type for every stage of a send attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Bad address, bad amount or bad email
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing mint / network configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The user declined the approval prompt
    #[error("Signing denied by user ({0})")]
    SigningDenied(SignerStatus),

    /// The signer answered with something we cannot use
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Fee payer cannot cover fees or rent
    #[error("Insufficient funds for fees: {0}")]
    InsufficientGas(String),

    /// Submitted but not confirmed before the deadline (or blockhash expired)
    #[error("Transaction {signature} not confirmed after {waited_secs}s")]
    BroadcastTimeout {
        /// Transaction id returned on acceptance
        signature: String,
        /// Seconds spent waiting
        waited_secs: u64,
    },

    /// The ledger refused the transaction
    #[error("Broadcast rejected: {0}")]
    BroadcastRejected(String),

    /// Generic fallback for lower-level failures
    #[error("Network error: {0}")]
    Network(String),

    /// A guarded operation is already running (double submit)
    #[error("Operation already in progress: {0}")]
    Busy(&'static str),

    /// The user abandoned the attempt
    #[error("Operation cancelled")]
    Cancelled,
}

impl TransferError {
    /// Check if this error is potentially retryable
    ///
    /// Only transient network failures are. Confirmation timeouts are not
    /// retried: the transaction must be rebuilt with a fresh blockhash.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,

            Self::Validation(_)
            | Self::Configuration(_)
            | Self::SigningDenied(_)
            | Self::SigningFailed(_)
            | Self::InsufficientGas(_)
            | Self::BroadcastTimeout { .. }
            | Self::BroadcastRejected(_)
            | Self::Busy(_)
            | Self::Cancelled => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Configuration(_) => "config",
            Self::SigningDenied(_) => "signing_denied",
            Self::SigningFailed(_) => "signing_failed",
            Self::InsufficientGas(_) => "insufficient_gas",
            Self::BroadcastTimeout { .. } => "broadcast_timeout",
            Self::BroadcastRejected(_) => "broadcast_rejected",
            Self::Network(_) => "network",
            Self::Busy(_) => "busy",
            Self::Cancelled => "cancelled",
        }
    }
}

// Convenience constructors for common error scenarios
impl TransferError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    pub fn signing_failed(reason: impl Into<String>) -> Self {
        Self::SigningFailed(reason.into())
    }

    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network(reason.into())
    }
}

impl From<LedgerError> for TransferError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds { message } => Self::InsufficientGas(message),
            LedgerError::Rejected { message, .. } => Self::BroadcastRejected(message),
            LedgerError::BlockhashNotFound => {
                Self::BroadcastRejected("blockhash not found or expired".to_string())
            }
            LedgerError::InvalidAddress(addr) => {
                Self::Validation(format!("invalid address: {addr}"))
            }
            other => Self::Network(other.to_string()),
        }
    }
}
