//! Failure classification
//!
//! Maps any failure signal from the pipeline onto the handful of outcomes the
//! user interface acts on. Typed errors are classified by variant first;
//! case-insensitive keyword matching is only the fallback for free-text
//! messages from collaborators that carry no structured code.

use serde::{Deserialize, Serialize};

use crate::errors::TransferError;
use crate::ledger::LedgerError;
use crate::signer::SignerStatus;

/// Outcome taxonomy consumed by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    InsufficientGas,
    UserDenied,
    InvalidInput,
    ConfigError,
    NetworkError,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InsufficientGas => "INSUFFICIENT_GAS",
            Self::UserDenied => "USER_DENIED",
            Self::InvalidInput => "INVALID_INPUT",
            Self::ConfigError => "CONFIG_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
        }
    }

    /// What the user can do about it
    pub fn remediation(self, funding_url: &str) -> String {
        match self {
            Self::InsufficientGas => {
                format!("Not enough native balance to pay fees. Top up at {funding_url}")
            }
            Self::UserDenied => "The request was declined in the signer.".to_string(),
            Self::InvalidInput => "Check the recipient and amount and try again.".to_string(),
            Self::ConfigError => "The service is misconfigured; contact the operator.".to_string(),
            Self::NetworkError => "Network problem; try again in a moment.".to_string(),
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything that can go wrong, as seen from the boundary that caught it
#[derive(Debug, Clone, Copy)]
pub enum FailureSignal<'a> {
    Error(&'a TransferError),
    Ledger(&'a LedgerError),
    Message(&'a str),
    SignerStatus(SignerStatus),
    /// Error response from the transfer server
    Http { status: u16, body: &'a str },
}

impl<'a> From<&'a TransferError> for FailureSignal<'a> {
    fn from(err: &'a TransferError) -> Self {
        FailureSignal::Error(err)
    }
}

const INSUFFICIENT_GAS_PHRASES: &[&str] = &[
    "insufficient funds",
    "insufficient lamports",
    "not enough",
];

const USER_DENIED_PHRASES: &[&str] = &[
    "user rejected",
    "rejected by user",
    "user denied",
    "user_request_denied",
    "user_consent_denied",
    "request denied",
];

const INVALID_INPUT_PHRASES: &[&str] = &[
    "invalid recipient",
    "invalid address",
    "invalid sender",
    "invalid amount",
    "invalid email",
    "validation error",
];

const CONFIG_PHRASES: &[&str] = &["not configured", "configuration error", "missing mint"];

pub fn classify(signal: FailureSignal<'_>) -> OutcomeKind {
    match signal {
        FailureSignal::Error(err) => classify_error(err),
        FailureSignal::Ledger(err) => classify_ledger(err),
        FailureSignal::Message(message) => classify_message(message),
        FailureSignal::SignerStatus(status) if status.is_denial() => OutcomeKind::UserDenied,
        FailureSignal::SignerStatus(_) => OutcomeKind::NetworkError,
        FailureSignal::Http { status, body } => classify_http(status, body),
    }
}

fn classify_error(err: &TransferError) -> OutcomeKind {
    match err {
        TransferError::Validation(_) | TransferError::Busy(_) => OutcomeKind::InvalidInput,
        TransferError::Configuration(_) => OutcomeKind::ConfigError,
        TransferError::SigningDenied(_) | TransferError::Cancelled => OutcomeKind::UserDenied,
        TransferError::InsufficientGas(_) => OutcomeKind::InsufficientGas,
        TransferError::SigningFailed(_)
        | TransferError::BroadcastTimeout { .. }
        | TransferError::BroadcastRejected(_)
        | TransferError::Network(_) => classify_message(&err.to_string()),
    }
}

fn classify_ledger(err: &LedgerError) -> OutcomeKind {
    match err {
        LedgerError::InsufficientFunds { .. } => OutcomeKind::InsufficientGas,
        LedgerError::InvalidAddress(_) => OutcomeKind::InvalidInput,
        other => classify_message(&other.to_string()),
    }
}

/// Keyword fallback for free text
pub fn classify_message(message: &str) -> OutcomeKind {
    let lower = message.to_lowercase();
    let mentions = |phrases: &[&str]| phrases.iter().any(|p| lower.contains(p));

    if mentions(INSUFFICIENT_GAS_PHRASES) {
        OutcomeKind::InsufficientGas
    } else if mentions(USER_DENIED_PHRASES) {
        OutcomeKind::UserDenied
    } else if mentions(INVALID_INPUT_PHRASES) {
        OutcomeKind::InvalidInput
    } else if mentions(CONFIG_PHRASES) {
        OutcomeKind::ConfigError
    } else {
        OutcomeKind::NetworkError
    }
}

#[derive(Deserialize)]
struct HttpErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    kind: Option<OutcomeKind>,
}

fn classify_http(status: u16, body: &str) -> OutcomeKind {
    let parsed = serde_json::from_str::<HttpErrorBody>(body).ok();

    if let Some(kind) = parsed.as_ref().and_then(|b| b.kind) {
        return kind;
    }

    let text = match &parsed {
        Some(b) => format!("{} {}", b.error, b.message.as_deref().unwrap_or_default()),
        None => body.to_string(),
    };
    match classify_message(&text) {
        OutcomeKind::NetworkError if status == 400 => OutcomeKind::InvalidInput,
        kind => kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_fallback() {
        assert_eq!(
            classify(FailureSignal::Message("insufficient funds for rent")),
            OutcomeKind::InsufficientGas
        );
        assert_eq!(
            classify(FailureSignal::Message("Attempt to debit: Insufficient Lamports")),
            OutcomeKind::InsufficientGas
        );
        assert_eq!(
            classify(FailureSignal::Message("user rejected")),
            OutcomeKind::UserDenied
        );
        assert_eq!(
            classify(FailureSignal::Message("socket hang up")),
            OutcomeKind::NetworkError
        );
    }

    #[test]
    fn test_signer_status() {
        assert_eq!(
            classify(FailureSignal::SignerStatus(SignerStatus::UserRequestDenied)),
            OutcomeKind::UserDenied
        );
        assert_eq!(
            classify(FailureSignal::SignerStatus(SignerStatus::UserConsentDenied)),
            OutcomeKind::UserDenied
        );
        assert_eq!(
            classify(FailureSignal::SignerStatus(SignerStatus::Failed)),
            OutcomeKind::NetworkError
        );
    }

    #[test]
    fn test_structured_errors_win() {
        let cases = [
            (TransferError::validation("bad amount"), OutcomeKind::InvalidInput),
            (TransferError::configuration("token mint"), OutcomeKind::ConfigError),
            (
                TransferError::SigningDenied(SignerStatus::UserConsentDenied),
                OutcomeKind::UserDenied,
            ),
            (
                TransferError::InsufficientGas("fee".to_string()),
                OutcomeKind::InsufficientGas,
            ),
            (
                TransferError::BroadcastRejected("Insufficient funds for fee".to_string()),
                OutcomeKind::InsufficientGas,
            ),
            (
                TransferError::BroadcastTimeout {
                    signature: "x".to_string(),
                    waited_secs: 60,
                },
                OutcomeKind::NetworkError,
            ),
            (TransferError::network("timeout"), OutcomeKind::NetworkError),
        ];
        for (err, expected) in cases {
            assert_eq!(classify((&err).into()), expected, "{err}");
        }

        assert_eq!(
            classify(FailureSignal::Ledger(&LedgerError::InsufficientFunds {
                message: "rent".to_string()
            })),
            OutcomeKind::InsufficientGas
        );
    }

    #[test]
    fn test_http_payloads() {
        assert_eq!(
            classify(FailureSignal::Http {
                status: 500,
                body: r#"{"error":"Server misconfigured","kind":"CONFIG_ERROR"}"#,
            }),
            OutcomeKind::ConfigError
        );
        assert_eq!(
            classify(FailureSignal::Http {
                status: 400,
                body: r#"{"error":"Invalid amount"}"#,
            }),
            OutcomeKind::InvalidInput
        );
        assert_eq!(
            classify(FailureSignal::Http {
                status: 400,
                body: r#"{"error":"Bad request","message":"something odd"}"#,
            }),
            OutcomeKind::InvalidInput
        );
        assert_eq!(
            classify(FailureSignal::Http {
                status: 502,
                body: "<html>bad gateway</html>",
            }),
            OutcomeKind::NetworkError
        );
        assert_eq!(
            classify(FailureSignal::Http {
                status: 500,
                body: r#"{"error":"Transfer failed","message":"insufficient lamports 0, need 2039280"}"#,
            }),
            OutcomeKind::InsufficientGas
        );
    }
}
