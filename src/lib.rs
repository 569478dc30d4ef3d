//! spl-send - custodial-signer token transfers
//!
//! Builds an unsigned SPL token transfer, has a custodial signer approve and
//! sign it, broadcasts it with retry and confirmation polling, and keeps the
//! sender's balances cached per session. Failures are classified into a small
//! set of user-facing outcomes.

pub mod address;
pub mod api;
pub mod balance;
pub mod broadcast;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod flow;
pub mod ledger;
pub mod metrics;
pub mod observability;
pub mod session;
pub mod signer;
pub mod test_utils;
pub mod tx_builder;

#[cfg(test)]
mod tests {
    mod send_flow_scenarios;
}

pub use address::{AddressResolver, ResolvedAddress};
pub use balance::{BalanceCache, BalanceSnapshot};
pub use broadcast::{BroadcastReceipt, Broadcaster};
pub use classifier::{classify, FailureSignal, OutcomeKind};
pub use config::Config;
pub use errors::TransferError;
pub use flow::{CancelHandle, SendFlow, SendRequest};
pub use signer::{CustodialSigner, SigningCoordinator};
pub use tx_builder::{TransferBuilder, UnsignedTransfer};

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
