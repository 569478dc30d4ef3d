//! Recipient identifier classification and resolution
//!
//! A recipient is typed either as a ledger address or as an email. Emails are
//! resolved through the custodial signer's identity-bound wallet lookup, the
//! same service the user signed in with. Only one email lookup may run at a
//! time: a double submit would otherwise open two signer prompts.

use once_cell::sync::Lazy;
use regex::Regex;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::errors::TransferError;
use crate::signer::{CustodialSigner, SignerStatus, SignerUser};

const MAX_EMAIL_LEN: usize = 254;
const MAX_LOCAL_PART_LEN: usize = 64;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("static email pattern")
});

// Base58 without 0, O, I and l
static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("static address pattern"));

/// What a recipient identifier looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Address,
    Email,
    Invalid,
}

/// Classify a raw identifier by shape alone
pub fn classify_identifier(input: &str) -> IdentifierKind {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return IdentifierKind::Invalid;
    }

    if trimmed.contains('@') {
        let valid = trimmed.len() <= MAX_EMAIL_LEN
            && trimmed.matches('@').count() == 1
            && trimmed
                .split_once('@')
                .is_some_and(|(local, _)| local.len() <= MAX_LOCAL_PART_LEN)
            && EMAIL_RE.is_match(trimmed);
        if valid {
            IdentifierKind::Email
        } else {
            IdentifierKind::Invalid
        }
    } else if ADDRESS_RE.is_match(trimmed) {
        IdentifierKind::Address
    } else {
        IdentifierKind::Invalid
    }
}

/// A concrete recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub address: Pubkey,
    pub kind: IdentifierKind,
    /// The email the user typed, when resolution went through the signer
    pub email: Option<String>,
}

/// Parse a string that already passed the address shape check
pub fn parse_address(input: &str) -> Result<Pubkey, TransferError> {
    let trimmed = input.trim();
    if classify_identifier(trimmed) != IdentifierKind::Address {
        return Err(TransferError::validation("invalid recipient"));
    }
    Pubkey::from_str(trimmed).map_err(|_| TransferError::validation("invalid recipient"))
}

pub struct AddressResolver<S: ?Sized> {
    signer: Arc<S>,
    lookup_timeout: Duration,
    email_lookup_in_flight: AtomicBool,
}

impl<S: CustodialSigner + ?Sized> AddressResolver<S> {
    pub fn new(signer: Arc<S>, lookup_timeout: Duration) -> Self {
        Self {
            signer,
            lookup_timeout,
            email_lookup_in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_lookup_in_flight(&self) -> bool {
        self.email_lookup_in_flight.load(Ordering::Acquire)
    }

    pub async fn resolve(&self, identifier: &str) -> Result<ResolvedAddress, TransferError> {
        let trimmed = identifier.trim();
        match classify_identifier(trimmed) {
            IdentifierKind::Address => Ok(ResolvedAddress {
                address: parse_address(trimmed)?,
                kind: IdentifierKind::Address,
                email: None,
            }),
            IdentifierKind::Email => self.resolve_email(trimmed).await,
            IdentifierKind::Invalid => {
                debug!("Rejected recipient identifier");
                Err(TransferError::validation("invalid recipient"))
            }
        }
    }

    async fn resolve_email(&self, email: &str) -> Result<ResolvedAddress, TransferError> {
        if self
            .email_lookup_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Email lookup already in flight, rejecting duplicate");
            return Err(TransferError::Busy("email lookup"));
        }

        // Released on every exit path, including the future being dropped
        let _guard = scopeguard::guard((), |_| {
            self.email_lookup_in_flight.store(false, Ordering::Release);
        });

        let user = SignerUser {
            email: email.to_string(),
        };
        let response = timeout(self.lookup_timeout, self.signer.get_wallet(Some(&user)))
            .await
            .map_err(|_| {
                TransferError::network(format!(
                    "wallet lookup did not finish within {}s",
                    self.lookup_timeout.as_secs()
                ))
            })??;

        let returned = match (response.status, response.wallet) {
            (SignerStatus::Success, Some(wallet)) if !wallet.sol_address.trim().is_empty() => {
                wallet.sol_address
            }
            (status, _) => {
                info!(status = %status, "No wallet bound to recipient email");
                return Err(TransferError::validation("no wallet is bound to this email"));
            }
        };

        // The signer is not trusted to return a well-formed address
        let address = match classify_identifier(&returned) {
            IdentifierKind::Address => Pubkey::from_str(returned.trim()).ok(),
            _ => None,
        }
        .ok_or_else(|| {
            TransferError::signing_failed(format!(
                "signer returned a malformed address for the recipient: '{returned}'"
            ))
        })?;

        info!(recipient = %address, "Resolved recipient email");
        Ok(ResolvedAddress {
            address,
            kind: IdentifierKind::Email,
            email: Some(email.to_string()),
        })
    }
}
