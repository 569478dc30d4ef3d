//! JSON-RPC implementation of [`LedgerClient`]
//!
//! Every call is wrapped in a deadline; a timed-out call surfaces as
//! [`LedgerError::Timeout`] and is never silently retried here.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::config::RpcSendTransactionConfig;
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};
use spl_token::solana_program::program_pack::Pack;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{LedgerClient, LedgerError, LedgerResult, SendOptions, TokenAccountInfo};

/// Ledger client backed by a Solana JSON-RPC endpoint
#[derive(Clone)]
pub struct RpcLedger {
    client: Arc<RpcClient>,
    endpoint: String,
    timeout_duration: Duration,
}

impl RpcLedger {
    pub fn new(endpoint: impl Into<String>, timeout_duration: Duration) -> Self {
        let endpoint = endpoint.into();
        Self {
            client: Arc::new(RpcClient::new_with_commitment(
                endpoint.clone(),
                CommitmentConfig::confirmed(),
            )),
            endpoint,
            timeout_duration,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn with_deadline<T, F>(&self, operation: &'static str, fut: F) -> LedgerResult<T>
    where
        F: Future<Output = Result<T, solana_client::client_error::ClientError>>,
    {
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                let err = LedgerError::from_client_error(err);
                debug!(endpoint = %self.endpoint, operation, error = %err, "RPC call failed");
                Err(err)
            }
            Err(_) => {
                warn!(endpoint = %self.endpoint, operation, "RPC call timed out");
                Err(LedgerError::Timeout {
                    operation,
                    timeout_ms: self.timeout_duration.as_millis() as u64,
                })
            }
        }
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn latest_blockhash(&self) -> LedgerResult<Hash> {
        let (blockhash, _last_valid_height) = self
            .with_deadline(
                "get_latest_blockhash",
                self.client
                    .get_latest_blockhash_with_commitment(CommitmentConfig::finalized()),
            )
            .await?;
        Ok(blockhash)
    }

    async fn native_balance(&self, owner: &Pubkey) -> LedgerResult<u64> {
        let response = self
            .with_deadline(
                "get_balance",
                self.client
                    .get_balance_with_commitment(owner, CommitmentConfig::confirmed()),
            )
            .await?;
        Ok(response.value)
    }

    async fn token_account(&self, account: &Pubkey) -> LedgerResult<TokenAccountInfo> {
        let response = self
            .with_deadline(
                "get_account",
                self.client
                    .get_account_with_commitment(account, CommitmentConfig::confirmed()),
            )
            .await?;

        let Some(raw) = response.value else {
            return Err(LedgerError::AccountNotFound {
                account: account.to_string(),
            });
        };

        if raw.owner != spl_token::id() {
            return Err(LedgerError::InvalidAccountData {
                account: account.to_string(),
                reason: format!("owned by {}, not the token program", raw.owner),
            });
        }

        let state = spl_token::state::Account::unpack(&raw.data).map_err(|e| {
            LedgerError::InvalidAccountData {
                account: account.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(TokenAccountInfo {
            mint: state.mint,
            owner: state.owner,
            amount: state.amount,
        })
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        options: SendOptions,
    ) -> LedgerResult<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: options.skip_preflight,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            max_retries: Some(options.max_retries),
            ..RpcSendTransactionConfig::default()
        };
        self.with_deadline(
            "send_transaction",
            self.client.send_transaction_with_config(tx, config),
        )
        .await
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> LedgerResult<Option<Result<(), TransactionError>>> {
        self.with_deadline(
            "get_signature_status",
            self.client
                .get_signature_status_with_commitment(signature, CommitmentConfig::confirmed()),
        )
        .await
    }

    async fn is_blockhash_valid(&self, blockhash: &Hash) -> LedgerResult<bool> {
        self.with_deadline(
            "is_blockhash_valid",
            self.client
                .is_blockhash_valid(blockhash, CommitmentConfig::processed()),
        )
        .await
    }
}

impl std::fmt::Debug for RpcLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedger")
            .field("endpoint", &self.endpoint)
            .field("timeout_ms", &self.timeout_duration.as_millis())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_or_timeout() {
        let ledger = RpcLedger::new("http://127.0.0.1:1", Duration::from_millis(500));
        let result = ledger.native_balance(&Pubkey::new_unique()).await;
        match result {
            Err(LedgerError::Transport { .. }) | Err(LedgerError::Timeout { .. }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
