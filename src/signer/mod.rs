//! External custodial signer
//!
//! Signing authority lives in a remote service that holds the user's keys and
//! asks the user to approve every signature. This module defines the contract
//! we consume from it and the coordinator that turns its detached hex
//! signature back into a ledger transaction.
//!
//! ## Data Flow
//! ```text
//! base64 unsigned tx
//!     → coordinator.rs (decode, prompt user through the signer)
//!     → signature.rs (hex decode, length check, splice into payer slot)
//!     → SignedTransaction (ready for the broadcaster)
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::transaction::VersionedTransaction;

use crate::errors::TransferError;

pub mod coordinator;
pub mod http;
pub mod signature;

pub use coordinator::{compose_reason, truncate_address, SigningCoordinator};
pub use http::HttpCustodialSigner;
pub use signature::{bind_signature, decode_signature_hex, parse_signature, SignedTransaction};

/// Status values returned by the signer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignerStatus {
    Success,
    Failed,
    UserRequestDenied,
    UserConsentDenied,
    /// Any status this client does not know about
    #[serde(other)]
    Unknown,
}

impl SignerStatus {
    /// The user declined the request or the consent screen
    pub fn is_denial(self) -> bool {
        matches!(self, Self::UserRequestDenied | Self::UserConsentDenied)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::UserRequestDenied => "USER_REQUEST_DENIED",
            Self::UserConsentDenied => "USER_CONSENT_DENIED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for SignerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User identity the signer binds a wallet to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerUser {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub sol_address: String,
}

/// Response of `getWallet()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletResponse {
    pub status: SignerStatus,
    #[serde(default)]
    pub wallet: Option<WalletInfo>,
    #[serde(default)]
    pub user: Option<SignerUser>,
}

/// Response of `signTransaction()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignResponse {
    pub status: SignerStatus,
    /// Detached signature, hex with optional `0x` prefix
    #[serde(default)]
    pub signature: Option<String>,
    /// Base64 signed transaction, when the signer chooses to return one
    #[serde(default)]
    pub transaction: Option<String>,
}

/// Operations consumed from the custodial signer
///
/// Both calls may suspend for as long as the user leaves the approval
/// prompt open; callers own the deadline.
#[async_trait]
pub trait CustodialSigner: Send + Sync {
    /// Wallet bound to `user`, or to the signed-in user when `None`
    async fn get_wallet(&self, user: Option<&SignerUser>) -> Result<WalletResponse, TransferError>;

    /// Ask the user to approve and sign `tx`; `reason` is shown in the prompt
    async fn sign_transaction(
        &self,
        tx: &VersionedTransaction,
        reason: &str,
    ) -> Result<SignResponse, TransferError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        let status: SignerStatus = serde_json::from_str("\"USER_CONSENT_DENIED\"").unwrap();
        assert_eq!(status, SignerStatus::UserConsentDenied);
        assert!(status.is_denial());

        let status: SignerStatus = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(status, SignerStatus::Unknown);
        assert!(!status.is_denial());
    }

    #[test]
    fn test_wallet_response_shape() {
        let json = r#"{"status":"SUCCESS","wallet":{"solAddress":"abc"},"user":{"email":"a@b.io"}}"#;
        let response: WalletResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.wallet.unwrap().sol_address, "abc");
        assert_eq!(response.user.unwrap().email, "a@b.io");
    }
}
