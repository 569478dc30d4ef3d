//! Broadcast and confirmation
//!
//! Submits a [`SignedTransaction`] with preflight enabled, retries the
//! submission (never the signing) on transient network failures, then polls
//! until the ledger reports `confirmed` commitment. A confirmed receipt is
//! terminal: resubmitting the same transaction returns the stored receipt.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::BroadcastConfig;
use crate::errors::TransferError;
use crate::ledger::{LedgerClient, LedgerError, SendOptions};
use crate::metrics::metrics;
use crate::signer::SignedTransaction;

/// Blockhash validity is checked every this many empty polls
const BLOCKHASH_CHECK_EVERY: u32 = 4;

/// Terminal artifact of a successful send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReceipt {
    pub transaction_id: String,
    pub confirmed_at: DateTime<Utc>,
    /// Submission attempts it took to get accepted
    pub attempts: u32,
}

/// Retry policy for transient submission failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of submission attempts
    pub max_attempts: u32,

    /// Base delay in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,

    /// Jitter factor (0.0 - 1.0)
    pub jitter_factor: f64,

    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2000,
            jitter_factor: 0.1,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after `attempt` (0-based); `None` once exhausted
    pub fn calculate_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts {
            return None;
        }

        let delay_ms = self.base_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64);

        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * self.jitter_factor;
        let jittered = (delay_ms * (1.0 + jitter)).max(0.0) as u64;

        Some(Duration::from_millis(jittered))
    }
}

#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    pub retry: RetryPolicy,
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
}

impl BroadcastSettings {
    pub fn from_config(config: &BroadcastConfig) -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: config.max_retries.max(1) as u32,
                ..RetryPolicy::default()
            },
            confirm_timeout: Duration::from_secs(config.confirm_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self::from_config(&BroadcastConfig::default())
    }
}

pub struct Broadcaster<L: ?Sized> {
    ledger: Arc<L>,
    settings: BroadcastSettings,
    confirmed: DashMap<Signature, BroadcastReceipt>,
}

impl<L: LedgerClient + ?Sized> Broadcaster<L> {
    pub fn new(ledger: Arc<L>, settings: BroadcastSettings) -> Self {
        Self {
            ledger,
            settings,
            confirmed: DashMap::new(),
        }
    }

    /// Stored receipt for an already confirmed transaction
    pub fn receipt_for(&self, signature: &Signature) -> Option<BroadcastReceipt> {
        self.confirmed.get(signature).map(|r| r.value().clone())
    }

    pub async fn submit(&self, signed: &SignedTransaction) -> Result<BroadcastReceipt, TransferError> {
        let expected = signed.signature();
        if let Some(receipt) = self.receipt_for(&expected) {
            debug!(signature = %expected, "Transaction already confirmed, not resubmitting");
            metrics().record_broadcast("resubmit_skipped");
            return Ok(receipt);
        }

        let started = Instant::now();
        let (signature, attempts) = self.send_with_retry(signed).await?;
        info!(signature = %signature, attempts, "Transaction accepted, awaiting confirmation");

        let blockhash = *signed.transaction().message.recent_blockhash();
        match timeout(
            self.settings.confirm_timeout,
            self.await_confirmation(&signature, &blockhash),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let err = match err {
                    ConfirmFailure::Expired => {
                        warn!(signature = %signature, "Blockhash expired before confirmation");
                        metrics().record_broadcast("timeout");
                        TransferError::BroadcastTimeout {
                            signature: signature.to_string(),
                            waited_secs: started.elapsed().as_secs(),
                        }
                    }
                    ConfirmFailure::Failed(ledger_err) => {
                        warn!(signature = %signature, error = %ledger_err, "Transaction failed on ledger");
                        metrics().record_broadcast("rejected");
                        ledger_err.into()
                    }
                };
                return Err(err);
            }
            Err(_) => {
                warn!(
                    signature = %signature,
                    timeout_secs = self.settings.confirm_timeout.as_secs(),
                    "Confirmation wait timed out"
                );
                metrics().record_broadcast("timeout");
                return Err(TransferError::BroadcastTimeout {
                    signature: signature.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
        }

        metrics()
            .confirm_latency
            .observe(started.elapsed().as_secs_f64());
        metrics().record_broadcast("confirmed");

        let receipt = BroadcastReceipt {
            transaction_id: signature.to_string(),
            confirmed_at: Utc::now(),
            attempts,
        };
        self.confirmed.insert(signature, receipt.clone());
        info!(signature = %signature, elapsed_ms = started.elapsed().as_millis() as u64, "Transaction confirmed");
        Ok(receipt)
    }

    async fn send_with_retry(
        &self,
        signed: &SignedTransaction,
    ) -> Result<(Signature, u32), TransferError> {
        let options = SendOptions {
            skip_preflight: false,
            max_retries: self.settings.retry.max_attempts as usize,
        };

        let mut attempt = 0u32;
        loop {
            match self
                .ledger
                .send_transaction(signed.transaction(), options)
                .await
            {
                Ok(signature) => return Ok((signature, attempt + 1)),
                Err(err) if err.is_retryable() => match self.settings.retry.calculate_delay(attempt) {
                    Some(delay) => {
                        debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Retrying submission");
                        sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        warn!(attempts = attempt + 1, error = %err, "Submission retries exhausted");
                        metrics().record_broadcast("rejected");
                        return Err(err.into());
                    }
                },
                Err(err) => {
                    warn!(error = %err, "Submission rejected");
                    metrics().record_broadcast("rejected");
                    return Err(err.into());
                }
            }
        }
    }

    async fn await_confirmation(
        &self,
        signature: &Signature,
        blockhash: &solana_sdk::hash::Hash,
    ) -> Result<(), ConfirmFailure> {
        let mut interval = tokio::time::interval(self.settings.poll_interval);
        let mut empty_polls = 0u32;

        loop {
            interval.tick().await;

            match self.ledger.signature_status(signature).await {
                Ok(Some(Ok(()))) => return Ok(()),
                Ok(Some(Err(tx_err))) => {
                    return Err(ConfirmFailure::Failed(LedgerError::from_transaction_error(
                        &tx_err,
                    )))
                }
                Ok(None) => {
                    empty_polls += 1;
                    if empty_polls % BLOCKHASH_CHECK_EVERY == 0 {
                        if let Ok(false) = self.ledger.is_blockhash_valid(blockhash).await {
                            // One last look; it may have landed right at expiry
                            if let Ok(Some(Ok(()))) = self.ledger.signature_status(signature).await {
                                return Ok(());
                            }
                            return Err(ConfirmFailure::Expired);
                        }
                    }
                }
                Err(err) => {
                    debug!(signature = %signature, error = %err, "Status poll failed, continuing");
                }
            }
        }
    }
}

enum ConfirmFailure {
    Expired,
    Failed(LedgerError),
}
