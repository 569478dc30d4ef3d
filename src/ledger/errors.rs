use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_rpc_client_api::request::RpcError;
use solana_sdk::transaction::TransactionError;
use thiserror::Error;

/// Ledger collaborator error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Timeout errors
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The queried account does not exist on-ledger
    #[error("Account not found: {account}")]
    AccountNotFound { account: String },

    /// Fee payer cannot cover fees or rent
    #[error("Insufficient funds: {message}")]
    InsufficientFunds { message: String },

    #[error("Blockhash not found")]
    BlockhashNotFound,

    /// The node refused the request or the transaction
    #[error("Rejected: {message} (code: {code:?})")]
    Rejected { message: String, code: Option<i64> },

    /// Account exists but its data is not what we expect
    #[error("Invalid account data for {account}: {reason}")]
    InvalidAccountData { account: String, reason: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl LedgerError {
    /// Check if this error is retryable at the submission layer
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Transport { .. } => true,
            LedgerError::Timeout { .. } => true,
            LedgerError::Rejected { code, .. } => matches!(code, Some(c) if (500..600).contains(c)),

            LedgerError::AccountNotFound { .. }
            | LedgerError::InsufficientFunds { .. }
            | LedgerError::BlockhashNotFound
            | LedgerError::InvalidAccountData { .. }
            | LedgerError::InvalidAddress(_) => false,
        }
    }

    pub fn is_account_not_found(&self) -> bool {
        matches!(self, LedgerError::AccountNotFound { .. })
    }

    /// Create from ClientError
    ///
    /// The structured `TransactionError` carried by preflight failures is used
    /// when present; message keywords are only a fallback for errors that
    /// arrive as plain text.
    pub fn from_client_error(err: ClientError) -> Self {
        if let Some(tx_err) = err.get_transaction_error() {
            return Self::from_transaction_error(&tx_err);
        }

        let message = err.to_string();
        match err.kind() {
            ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => {
                LedgerError::Transport { message }
            }
            ClientErrorKind::RpcError(RpcError::RpcResponseError { code, message, .. }) => {
                Self::from_message(message).unwrap_or_else(|| LedgerError::Rejected {
                    message: message.clone(),
                    code: Some(*code),
                })
            }
            _ => Self::from_message(&message).unwrap_or(LedgerError::Transport { message }),
        }
    }

    /// Map an on-ledger transaction error
    pub fn from_transaction_error(err: &TransactionError) -> Self {
        match err {
            TransactionError::InsufficientFundsForFee
            | TransactionError::InsufficientFundsForRent { .. } => LedgerError::InsufficientFunds {
                message: err.to_string(),
            },
            // A fee payer that was never credited shows up as a missing account
            TransactionError::AccountNotFound => LedgerError::InsufficientFunds {
                message: err.to_string(),
            },
            TransactionError::BlockhashNotFound => LedgerError::BlockhashNotFound,
            other => LedgerError::Rejected {
                message: other.to_string(),
                code: None,
            },
        }
    }

    fn from_message(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        if lower.contains("blockhash not found") {
            Some(LedgerError::BlockhashNotFound)
        } else if lower.contains("could not find account") || lower.contains("account not found") {
            Some(LedgerError::AccountNotFound {
                account: "unknown".to_string(),
            })
        } else if lower.contains("insufficient funds") || lower.contains("insufficient lamports") {
            Some(LedgerError::InsufficientFunds {
                message: message.to_string(),
            })
        } else {
            None
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::instruction::InstructionError;

    #[test]
    fn test_error_is_retryable() {
        assert!(LedgerError::Transport {
            message: "connection failed".to_string(),
        }
        .is_retryable());
        assert!(LedgerError::Timeout {
            operation: "send_transaction",
            timeout_ms: 5000,
        }
        .is_retryable());
        assert!(LedgerError::Rejected {
            message: "upstream".to_string(),
            code: Some(503),
        }
        .is_retryable());

        assert!(!LedgerError::BlockhashNotFound.is_retryable());
        assert!(!LedgerError::Rejected {
            message: "preflight".to_string(),
            code: Some(-32002),
        }
        .is_retryable());
    }

    #[test]
    fn test_transaction_error_mapping() {
        let err = LedgerError::from_transaction_error(&TransactionError::InsufficientFundsForRent {
            account_index: 1,
        });
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        let err = LedgerError::from_transaction_error(&TransactionError::AccountNotFound);
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        let err = LedgerError::from_transaction_error(&TransactionError::InstructionError(
            1,
            InstructionError::Custom(1),
        ));
        assert!(matches!(err, LedgerError::Rejected { code: None, .. }));
    }

    #[test]
    fn test_message_fallback() {
        assert_eq!(
            LedgerError::from_message("Blockhash not found"),
            Some(LedgerError::BlockhashNotFound)
        );
        assert!(LedgerError::from_message("Invalid param: could not find account")
            .unwrap()
            .is_account_not_found());
        assert!(LedgerError::from_message("something else entirely").is_none());
    }
}
