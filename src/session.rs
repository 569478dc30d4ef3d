//! Wallet session
//!
//! One session per process, opened from the signer's wallet response and
//! closed on logout. The bound email only ever comes from the structured
//! `user.email` field of that response or from an explicitly supplied value.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tracing::info;

use crate::address::parse_address;
use crate::errors::TransferError;
use crate::signer::{SignerStatus, WalletResponse};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSession {
    pub address: Pubkey,
    pub bound_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WalletSession {
    /// Build a session from a `getWallet()` response
    ///
    /// `explicit_email` wins over the response's `user.email`.
    pub fn from_wallet_response(
        response: &WalletResponse,
        explicit_email: Option<&str>,
    ) -> Result<Self, TransferError> {
        if response.status != SignerStatus::Success {
            return Err(TransferError::signing_failed(format!(
                "wallet lookup returned status {}",
                response.status
            )));
        }
        let wallet = response
            .wallet
            .as_ref()
            .ok_or_else(|| TransferError::signing_failed("wallet lookup returned no wallet"))?;
        let address = parse_address(&wallet.sol_address).map_err(|_| {
            TransferError::signing_failed(format!(
                "signer returned a malformed wallet address: '{}'",
                wallet.sol_address
            ))
        })?;

        let bound_email = explicit_email
            .map(str::to_string)
            .or_else(|| response.user.as_ref().map(|u| u.email.clone()))
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        Ok(Self {
            address,
            bound_email,
            created_at: Utc::now(),
        })
    }
}

/// Single-owner holder of the active session
#[derive(Debug, Default)]
pub struct SessionStore {
    active: Mutex<Option<WalletSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `session`; fails while another one is active
    pub fn open(&self, session: WalletSession) -> Result<WalletSession, TransferError> {
        let mut active = self.active.lock();
        if let Some(existing) = active.as_ref() {
            if existing.address == session.address {
                return Ok(existing.clone());
            }
            return Err(TransferError::Busy("another wallet session is active"));
        }
        info!(address = %session.address, "Wallet session opened");
        *active = Some(session.clone());
        Ok(session)
    }

    pub fn current(&self) -> Option<WalletSession> {
        self.active.lock().clone()
    }

    /// End the session, returning it if one was active
    pub fn close(&self) -> Option<WalletSession> {
        let closed = self.active.lock().take();
        if let Some(session) = &closed {
            info!(address = %session.address, "Wallet session closed");
        }
        closed
    }
}
