//! Ledger network collaborator
//!
//! The transfer builder, broadcaster and balance cache only talk to the ledger
//! through [`LedgerClient`], which keeps them testable against an in-memory
//! ledger and keeps the commitment levels in one place:
//! - blockhash at `finalized`
//! - balances, account lookups and confirmation at `confirmed`

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::TransactionError,
    transaction::VersionedTransaction,
};

pub mod errors;
pub mod rpc;

pub use errors::{LedgerError, LedgerResult};
pub use rpc::RpcLedger;

/// Decoded state of a token sub-account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccountInfo {
    pub mint: Pubkey,
    pub owner: Pubkey,
    /// Balance in smallest units
    pub amount: u64,
}

/// Options for raw transaction submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub skip_preflight: bool,
    /// Node-side rebroadcast attempts
    pub max_retries: usize,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            skip_preflight: false,
            max_retries: 3,
        }
    }
}

/// Operations consumed from the ledger network
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Latest blockhash at `finalized` commitment
    async fn latest_blockhash(&self) -> LedgerResult<Hash>;

    /// Native balance in lamports
    async fn native_balance(&self, owner: &Pubkey) -> LedgerResult<u64>;

    /// Token sub-account state
    ///
    /// Fails with [`LedgerError::AccountNotFound`] when the account does not
    /// exist, which callers treat as "balance zero" rather than a failure.
    async fn token_account(&self, account: &Pubkey) -> LedgerResult<TokenAccountInfo>;

    /// Submit a signed transaction, returning its id on acceptance
    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        options: SendOptions,
    ) -> LedgerResult<Signature>;

    /// Status at `confirmed` commitment; `None` until the transaction gets there
    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> LedgerResult<Option<Result<(), TransactionError>>>;

    /// Whether a blockhash is still inside its validity window
    async fn is_blockhash_valid(&self, blockhash: &Hash) -> LedgerResult<bool>;
}
