//! Client-side signing coordinator
//!
//! Hands an unsigned transaction to the custodial signer, waits for the
//! user's decision and reassembles a [`SignedTransaction`]. The signer call
//! is user-mediated and can stay open indefinitely, so it always runs under
//! a deadline.

use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::signature::{bind_signature, parse_signature, SignedTransaction};
use super::{CustodialSigner, SignerStatus};
use crate::errors::TransferError;
use crate::metrics::metrics;
use crate::tx_builder::codec::decode_transaction;

/// Shorten an address to its first 6 and last 4 characters
pub fn truncate_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Approval prompt shown by the signer
///
/// Names the email when the user typed one, the truncated address otherwise.
pub fn compose_reason(amount: &str, symbol: &str, recipient: &str, email: Option<&str>) -> String {
    let target = match email {
        Some(email) => email.to_string(),
        None => truncate_address(recipient),
    };
    format!("Send {amount} {symbol} to {target}")
}

fn fee_payer(tx: &VersionedTransaction) -> Result<Pubkey, TransferError> {
    tx.message
        .static_account_keys()
        .first()
        .copied()
        .ok_or_else(|| TransferError::signing_failed("transaction has no fee payer"))
}

pub struct SigningCoordinator<S: ?Sized> {
    signer: Arc<S>,
    sign_timeout: Duration,
    verify: bool,
}

impl<S: CustodialSigner + ?Sized> SigningCoordinator<S> {
    pub fn new(signer: Arc<S>, sign_timeout: Duration) -> Self {
        Self {
            signer,
            sign_timeout,
            verify: true,
        }
    }

    /// Skip local verification of the returned signature
    pub fn without_verification(mut self) -> Self {
        self.verify = false;
        self
    }

    /// Decode, sign through the custodial signer, and bind the signature
    ///
    /// The signature is bound to the message's fee payer, which the builder
    /// always sets to the sender.
    pub async fn sign(
        &self,
        serialized: &str,
        reason: &str,
    ) -> Result<SignedTransaction, TransferError> {
        let tx = decode_transaction(serialized)?;
        let payer = fee_payer(&tx)?;
        self.request(tx, payer, reason).await
    }

    /// Like [`sign`](Self::sign), but refuses to prompt the user unless the
    /// fee payer is `expected_payer`
    pub async fn sign_for(
        &self,
        expected_payer: &Pubkey,
        serialized: &str,
        reason: &str,
    ) -> Result<SignedTransaction, TransferError> {
        let tx = decode_transaction(serialized)?;
        let payer = fee_payer(&tx)?;
        if &payer != expected_payer {
            warn!(payer = %payer, expected = %expected_payer, "Refusing to sign for another fee payer");
            return Err(TransferError::signing_failed(format!(
                "transaction fee payer {payer} is not the session wallet"
            )));
        }
        self.request(tx, payer, reason).await
    }

    async fn request(
        &self,
        tx: VersionedTransaction,
        payer: Pubkey,
        reason: &str,
    ) -> Result<SignedTransaction, TransferError> {
        debug!(payer = %payer, reason, "Requesting signature from custodial signer");
        let started = Instant::now();

        let response = match timeout(self.sign_timeout, self.signer.sign_transaction(&tx, reason))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    payer = %payer,
                    timeout_secs = self.sign_timeout.as_secs(),
                    "Signer did not answer before the deadline"
                );
                metrics().record_signer_outcome("timeout");
                return Err(TransferError::signing_failed(format!(
                    "signer did not respond within {}s",
                    self.sign_timeout.as_secs()
                )));
            }
        };

        metrics().record_signer_outcome(response.status.as_str());
        metrics()
            .signing_latency
            .observe(started.elapsed().as_secs_f64());

        match response.status {
            SignerStatus::Success => {}
            status if status.is_denial() => {
                info!(payer = %payer, status = %status, "User declined the signature request");
                return Err(TransferError::SigningDenied(status));
            }
            status => {
                warn!(payer = %payer, status = %status, "Signer reported failure");
                return Err(TransferError::signing_failed(format!(
                    "signer returned status {status}"
                )));
            }
        }

        let encoded = response
            .signature
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| TransferError::signing_failed("signer returned no signature"))?;

        let signature = parse_signature(encoded)?;
        let signed = bind_signature(tx, &payer, signature, self.verify)?;

        info!(
            payer = %payer,
            signature = %signed.signature(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transaction signed"
        );
        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::SignResponse;
    use crate::test_utils::{unsigned_transfer, ScriptedSigner};
    use crate::tx_builder::codec::encode_transaction;
    use solana_sdk::signature::{Keypair, Signer};

    fn serialized_for(payer: &Pubkey) -> String {
        encode_transaction(&unsigned_transfer(payer)).unwrap()
    }

    #[test]
    fn test_truncate_and_reason() {
        let address = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
        assert_eq!(truncate_address(address), "7xKXtg...gAsU");
        assert_eq!(truncate_address("short"), "short");

        assert_eq!(
            compose_reason("2.50", "USDC", address, None),
            "Send 2.50 USDC to 7xKXtg...gAsU"
        );
        assert_eq!(
            compose_reason("2.50", "USDC", address, Some("bob@example.com")),
            "Send 2.50 USDC to bob@example.com"
        );
    }

    #[tokio::test]
    async fn test_success_binds_to_payer() {
        let payer = Arc::new(Keypair::new());
        let signer = Arc::new(ScriptedSigner::signing_with(payer.clone()));
        let coordinator = SigningCoordinator::new(signer.clone(), Duration::from_secs(5));

        let signed = coordinator
            .sign(&serialized_for(&payer.pubkey()), "Send 1 USDC")
            .await
            .unwrap();
        assert_eq!(signed.signer(), &payer.pubkey());
        assert_eq!(signer.last_reason().as_deref(), Some("Send 1 USDC"));
    }

    #[tokio::test]
    async fn test_foreign_fee_payer_never_prompts() {
        let session = Arc::new(Keypair::new());
        let signer = Arc::new(ScriptedSigner::signing_with(session.clone()));
        let coordinator = SigningCoordinator::new(signer.clone(), Duration::from_secs(5));

        let err = coordinator
            .sign_for(&session.pubkey(), &serialized_for(&Pubkey::new_unique()), "r")
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::SigningFailed(ref m) if m.contains("session wallet")));
        assert_eq!(signer.sign_requests(), 0);

        let signed = coordinator
            .sign_for(&session.pubkey(), &serialized_for(&session.pubkey()), "r")
            .await
            .unwrap();
        assert_eq!(signed.signer(), &session.pubkey());
        assert_eq!(signer.sign_requests(), 1);
    }

    #[tokio::test]
    async fn test_denial_statuses() {
        for status in [SignerStatus::UserRequestDenied, SignerStatus::UserConsentDenied] {
            let signer = Arc::new(ScriptedSigner::responding(SignResponse {
                status,
                signature: None,
                transaction: None,
            }));
            let coordinator = SigningCoordinator::new(signer, Duration::from_secs(5));
            let err = coordinator
                .sign(&serialized_for(&Pubkey::new_unique()), "r")
                .await
                .unwrap_err();
            assert_eq!(err, TransferError::SigningDenied(status));
        }
    }

    #[tokio::test]
    async fn test_failed_status_and_missing_signature() {
        let payer = Pubkey::new_unique();

        let signer = Arc::new(ScriptedSigner::responding(SignResponse {
            status: SignerStatus::Failed,
            signature: None,
            transaction: None,
        }));
        let err = SigningCoordinator::new(signer, Duration::from_secs(5))
            .sign(&serialized_for(&payer), "r")
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::SigningFailed(_)));

        let signer = Arc::new(ScriptedSigner::responding(SignResponse {
            status: SignerStatus::Success,
            signature: None,
            transaction: None,
        }));
        let err = SigningCoordinator::new(signer, Duration::from_secs(5))
            .sign(&serialized_for(&payer), "r")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransferError::signing_failed("signer returned no signature")
        );
    }

    #[tokio::test]
    async fn test_short_signature_is_rejected() {
        let signer = Arc::new(ScriptedSigner::responding(SignResponse {
            status: SignerStatus::Success,
            signature: Some("0xabcd1234".to_string()),
            transaction: None,
        }));
        let err = SigningCoordinator::new(signer, Duration::from_secs(5))
            .sign(&serialized_for(&Pubkey::new_unique()), "r")
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::SigningFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_prompt_times_out() {
        let signer = Arc::new(ScriptedSigner::hanging());
        let coordinator = SigningCoordinator::new(signer, Duration::from_secs(120));
        let err = coordinator
            .sign(&serialized_for(&Pubkey::new_unique()), "r")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("did not respond"));
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let signer = Arc::new(ScriptedSigner::hanging());
        let coordinator = SigningCoordinator::new(signer, Duration::from_secs(1));
        let err = coordinator.sign("not base64!!", "r").await.unwrap_err();
        assert!(matches!(err, TransferError::SigningFailed(_)));
    }
}
