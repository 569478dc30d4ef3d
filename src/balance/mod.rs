//! Balances
//!
//! [`BalanceSnapshot`] is advisory display data: it is refreshed from the
//! ledger on session load and after every confirmed send, and persisted so
//! the next session can show something before the live query returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;

use crate::ledger::{LedgerClient, LedgerResult};

pub mod cache;
pub mod store;

pub use cache::BalanceCache;
pub use store::SnapshotStore;

pub const NATIVE_DECIMALS: u8 = 9;

/// Balances of one address at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub address: String,
    /// Native balance in lamports
    pub lamports: u64,
    /// Token balance in smallest units
    pub token_units: u64,
    pub token_decimals: u8,
    pub fetched_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    /// All-zero snapshot, used when the ledger cannot be reached
    pub fn zero(address: &Pubkey, token_decimals: u8) -> Self {
        Self {
            address: address.to_string(),
            lamports: 0,
            token_units: 0,
            token_decimals,
            fetched_at: Utc::now(),
        }
    }

    /// Native balance in whole units
    pub fn native_balance(&self) -> f64 {
        to_whole(self.lamports, NATIVE_DECIMALS)
    }

    /// Token balance in whole units
    pub fn token_balance(&self) -> f64 {
        to_whole(self.token_units, self.token_decimals)
    }

    /// Native balance rounded to 3 decimals for display
    pub fn native_display(&self) -> f64 {
        round_to(self.native_balance(), 3)
    }

    /// Token balance rounded to 2 decimals for display
    pub fn token_display(&self) -> f64 {
        round_to(self.token_balance(), 2)
    }
}

fn to_whole(units: u64, decimals: u8) -> f64 {
    units as f64 / 10f64.powi(i32::from(decimals))
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Query both balances; a missing token sub-account is a zero balance
pub async fn query_balances<L: LedgerClient + ?Sized>(
    ledger: &L,
    owner: &Pubkey,
    mint: &Pubkey,
    token_decimals: u8,
) -> LedgerResult<BalanceSnapshot> {
    let lamports = ledger.native_balance(owner).await?;

    let token_account = get_associated_token_address(owner, mint);
    let token_units = match ledger.token_account(&token_account).await {
        Ok(info) => info.amount,
        Err(e) if e.is_account_not_found() => 0,
        Err(e) => return Err(e),
    };

    Ok(BalanceSnapshot {
        address: owner.to_string(),
        lamports,
        token_units,
        token_decimals,
        fetched_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerError;
    use crate::test_utils::MockLedger;

    #[test]
    fn test_display_rounding() {
        let snapshot = BalanceSnapshot {
            address: "x".to_string(),
            lamports: 1_234_567_890,
            token_units: 2_506_000,
            token_decimals: 6,
            fetched_at: Utc::now(),
        };
        assert_eq!(snapshot.native_display(), 1.235);
        assert_eq!(snapshot.token_display(), 2.51);
        assert_eq!(snapshot.token_balance(), 2.506);
    }

    #[tokio::test]
    async fn test_missing_token_account_is_zero() {
        let ledger = MockLedger::new();
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        ledger.set_native_balance(&owner, 5_000_000_000);

        let snapshot = query_balances(&ledger, &owner, &mint, 6).await.unwrap();
        assert_eq!(snapshot.lamports, 5_000_000_000);
        assert_eq!(snapshot.token_units, 0);
    }

    #[tokio::test]
    async fn test_network_failure_propagates() {
        let ledger = MockLedger::new();
        ledger.fail_reads(LedgerError::Transport {
            message: "down".to_string(),
        });
        let result = query_balances(&ledger, &Pubkey::new_unique(), &Pubkey::new_unique(), 6).await;
        assert!(matches!(result, Err(LedgerError::Transport { .. })));
    }
}
