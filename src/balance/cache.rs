//! Client-side balance cache
//!
//! `refresh` never fails: ledger errors degrade to a zero snapshot and are
//! only logged. Snapshots are published through a watch channel; the
//! foreground send flow and a background refresh may both publish, and the
//! last write wins.

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{query_balances, BalanceSnapshot, SnapshotStore};
use crate::ledger::LedgerClient;
use crate::metrics::metrics;

pub struct BalanceCache<L: ?Sized> {
    ledger: Arc<L>,
    mint: Pubkey,
    token_decimals: u8,
    store: SnapshotStore,
    latest: watch::Sender<Option<BalanceSnapshot>>,
}

impl<L: LedgerClient + ?Sized> BalanceCache<L> {
    pub fn new(ledger: Arc<L>, mint: Pubkey, token_decimals: u8, store: SnapshotStore) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            ledger,
            mint,
            token_decimals,
            store,
            latest,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<BalanceSnapshot>> {
        self.latest.subscribe()
    }

    /// Most recently published snapshot
    pub fn current(&self) -> Option<BalanceSnapshot> {
        self.latest.borrow().clone()
    }

    /// Publish the persisted snapshot for `address`, if any
    pub async fn load(&self, address: &Pubkey) -> Option<BalanceSnapshot> {
        let cached = self.store.load(&address.to_string()).await?;
        debug!(address = %address, "Serving cached balance snapshot");
        self.latest.send_replace(Some(cached.clone()));
        Some(cached)
    }

    /// Persist `snapshot` as the cached value
    pub async fn save(&self, snapshot: &BalanceSnapshot) {
        if let Err(e) = self.store.save(snapshot).await {
            warn!(error = %e, "Failed to persist balance snapshot");
        }
    }

    /// Query the ledger, publish and persist the result
    ///
    /// A degraded zero snapshot is published but never persisted, so the last
    /// good value survives for the next session.
    pub async fn refresh(&self, address: &Pubkey) -> BalanceSnapshot {
        match query_balances(self.ledger.as_ref(), address, &self.mint, self.token_decimals).await
        {
            Ok(snapshot) => {
                self.latest.send_replace(Some(snapshot.clone()));
                self.save(&snapshot).await;
                snapshot
            }
            Err(e) => {
                warn!(address = %address, error = %e, "Balance refresh failed, showing zero");
                metrics().balance_degraded.inc();
                let snapshot = BalanceSnapshot::zero(address, self.token_decimals);
                self.latest.send_replace(Some(snapshot.clone()));
                snapshot
            }
        }
    }

    /// Stale-then-live: publish the cached snapshot, then the live one
    pub async fn load_session(&self, address: &Pubkey) -> BalanceSnapshot {
        self.load(address).await;
        self.refresh(address).await
    }

    /// Forget the published and persisted snapshot (logout)
    pub async fn clear(&self) {
        self.latest.send_replace(None);
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to clear balance snapshot");
        }
    }
}
