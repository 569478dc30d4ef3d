//! Test Utilities Module
//!
//! In-memory stand-ins for the ledger and the custodial signer, plus helpers
//! that produce realistic unsigned and signed transfers without a network.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    hash::Hash,
    message::{v0::Message as MessageV0, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::{TransactionError, VersionedTransaction},
};
use spl_associated_token_account::get_associated_token_address;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::TransferError;
use crate::ledger::{LedgerClient, LedgerError, LedgerResult, SendOptions, TokenAccountInfo};
use crate::signer::{
    bind_signature, CustodialSigner, SignResponse, SignedTransaction, SignerStatus, SignerUser,
    WalletInfo, WalletResponse,
};
use crate::tx_builder::{plan_transfer, TransferAccounts};

/// Scripted outcome of one `send_transaction` call
#[derive(Debug, Clone)]
pub enum SendBehavior {
    /// Accepted and confirmed on the next status poll
    Accept,
    /// Accepted, then reported as failed on-ledger
    AcceptThenFail(TransactionError),
    /// Accepted but never reaches confirmed
    AcceptNeverConfirm,
    /// Rejected at submission
    Fail(LedgerError),
}

#[derive(Default)]
struct LedgerState {
    native: HashMap<Pubkey, u64>,
    token_accounts: HashMap<Pubkey, TokenAccountInfo>,
    statuses: HashMap<Signature, Option<Result<(), TransactionError>>>,
    sends: VecDeque<SendBehavior>,
    sent: Vec<VersionedTransaction>,
    read_failure: Option<LedgerError>,
    read_delay: Option<Duration>,
    blockhash_failure: Option<LedgerError>,
    expired: HashSet<Hash>,
    expire_all: bool,
}

/// In-memory ledger
///
/// Unknown addresses have zero native balance and no token account. Sends
/// are accepted and confirmed unless scripted otherwise.
pub struct MockLedger {
    blockhash: Hash,
    state: Mutex<LedgerState>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            blockhash: Hash::new_unique(),
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// The blockhash every `latest_blockhash` call returns
    pub fn blockhash(&self) -> Hash {
        self.blockhash
    }

    pub fn set_native_balance(&self, owner: &Pubkey, lamports: u64) {
        self.state.lock().native.insert(*owner, lamports);
    }

    /// Create (or overwrite) the owner's token sub-account for `mint`
    pub fn set_token_balance(&self, owner: &Pubkey, mint: &Pubkey, amount: u64) {
        let account = get_associated_token_address(owner, mint);
        self.state.lock().token_accounts.insert(
            account,
            TokenAccountInfo {
                mint: *mint,
                owner: *owner,
                amount,
            },
        );
    }

    /// Fail balance and account reads with `err`
    pub fn fail_reads(&self, err: LedgerError) {
        self.state.lock().read_failure = Some(err);
    }

    /// Hold every balance and account read for `delay`
    pub fn delay_reads(&self, delay: Duration) {
        self.state.lock().read_delay = Some(delay);
    }

    async fn read_pause(&self) {
        let delay = self.state.lock().read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn fail_blockhash(&self, err: LedgerError) {
        self.state.lock().blockhash_failure = Some(err);
    }

    /// Queue outcomes for the next `send_transaction` calls
    pub fn script_sends(&self, behaviors: impl IntoIterator<Item = SendBehavior>) {
        self.state.lock().sends.extend(behaviors);
    }

    /// Report every blockhash as outside its validity window
    pub fn expire_blockhashes(&self) {
        self.state.lock().expire_all = true;
    }

    pub fn expire_blockhash(&self, hash: Hash) {
        self.state.lock().expired.insert(hash);
    }

    /// Number of `send_transaction` calls, accepted or not
    pub fn sent_count(&self) -> usize {
        self.state.lock().sent.len()
    }

    pub fn sent_transactions(&self) -> Vec<VersionedTransaction> {
        self.state.lock().sent.clone()
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn latest_blockhash(&self) -> LedgerResult<Hash> {
        match &self.state.lock().blockhash_failure {
            Some(err) => Err(err.clone()),
            None => Ok(self.blockhash),
        }
    }

    async fn native_balance(&self, owner: &Pubkey) -> LedgerResult<u64> {
        self.read_pause().await;
        let state = self.state.lock();
        if let Some(err) = &state.read_failure {
            return Err(err.clone());
        }
        Ok(state.native.get(owner).copied().unwrap_or(0))
    }

    async fn token_account(&self, account: &Pubkey) -> LedgerResult<TokenAccountInfo> {
        self.read_pause().await;
        let state = self.state.lock();
        if let Some(err) = &state.read_failure {
            return Err(err.clone());
        }
        state
            .token_accounts
            .get(account)
            .copied()
            .ok_or_else(|| LedgerError::AccountNotFound {
                account: account.to_string(),
            })
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        _options: SendOptions,
    ) -> LedgerResult<Signature> {
        let mut state = self.state.lock();
        state.sent.push(tx.clone());

        let signature = tx.signatures.first().copied().unwrap_or_default();
        let status = match state.sends.pop_front().unwrap_or(SendBehavior::Accept) {
            SendBehavior::Accept => Some(Ok(())),
            SendBehavior::AcceptThenFail(err) => Some(Err(err)),
            SendBehavior::AcceptNeverConfirm => None,
            SendBehavior::Fail(err) => return Err(err),
        };
        state.statuses.insert(signature, status);
        Ok(signature)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> LedgerResult<Option<Result<(), TransactionError>>> {
        Ok(self
            .state
            .lock()
            .statuses
            .get(signature)
            .cloned()
            .flatten())
    }

    async fn is_blockhash_valid(&self, blockhash: &Hash) -> LedgerResult<bool> {
        let state = self.state.lock();
        Ok(!(state.expire_all || state.expired.contains(blockhash)))
    }
}

enum SignMode {
    Keypair(Arc<Keypair>),
    Fixed(SignResponse),
    Hang,
}

/// Custodial signer with scripted answers
///
/// With a keypair it approves every request and signs for real, and its own
/// wallet (`get_wallet(None)`) is that keypair's address.
pub struct ScriptedSigner {
    mode: SignMode,
    own_email: Option<String>,
    wallets: HashMap<String, String>,
    lookup_delay: Option<Duration>,
    lookups: AtomicUsize,
    reasons: Mutex<Vec<String>>,
}

impl ScriptedSigner {
    /// Signer with no wallets that fails every signature request
    pub fn new() -> Self {
        Self::with_mode(SignMode::Fixed(SignResponse {
            status: SignerStatus::Failed,
            signature: None,
            transaction: None,
        }))
    }

    pub fn signing_with(keypair: Arc<Keypair>) -> Self {
        Self::with_mode(SignMode::Keypair(keypair))
    }

    pub fn responding(response: SignResponse) -> Self {
        Self::with_mode(SignMode::Fixed(response))
    }

    /// Never answers a signature request, like an ignored prompt
    pub fn hanging() -> Self {
        Self::with_mode(SignMode::Hang)
    }

    fn with_mode(mode: SignMode) -> Self {
        Self {
            mode,
            own_email: None,
            wallets: HashMap::new(),
            lookup_delay: None,
            lookups: AtomicUsize::new(0),
            reasons: Mutex::new(Vec::new()),
        }
    }

    /// Bind `address` to `email` for recipient lookups
    pub fn with_wallet(mut self, email: &str, address: &str) -> Self {
        self.wallets.insert(email.to_string(), address.to_string());
        self
    }

    /// Email reported for the signed-in user
    pub fn with_own_email(mut self, email: &str) -> Self {
        self.own_email = Some(email.to_string());
        self
    }

    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    /// Number of `get_wallet` calls made
    pub fn wallet_lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn last_reason(&self) -> Option<String> {
        self.reasons.lock().last().cloned()
    }

    pub fn sign_requests(&self) -> usize {
        self.reasons.lock().len()
    }
}

impl Default for ScriptedSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CustodialSigner for ScriptedSigner {
    async fn get_wallet(&self, user: Option<&SignerUser>) -> Result<WalletResponse, TransferError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }

        let found = match user {
            Some(user) => self
                .wallets
                .get(&user.email)
                .map(|address| (address.clone(), Some(user.clone()))),
            None => match &self.mode {
                SignMode::Keypair(keypair) => Some((
                    keypair.pubkey().to_string(),
                    self.own_email.clone().map(|email| SignerUser { email }),
                )),
                _ => None,
            },
        };

        Ok(match found {
            Some((sol_address, user)) => WalletResponse {
                status: SignerStatus::Success,
                wallet: Some(WalletInfo { sol_address }),
                user,
            },
            None => WalletResponse {
                status: SignerStatus::Failed,
                wallet: None,
                user: None,
            },
        })
    }

    async fn sign_transaction(
        &self,
        tx: &VersionedTransaction,
        reason: &str,
    ) -> Result<SignResponse, TransferError> {
        self.reasons.lock().push(reason.to_string());
        match &self.mode {
            SignMode::Keypair(keypair) => {
                let signature = keypair.sign_message(&tx.message.serialize());
                Ok(SignResponse {
                    status: SignerStatus::Success,
                    signature: Some(format!("0x{}", hex::encode(signature.as_ref()))),
                    transaction: None,
                })
            }
            SignMode::Fixed(response) => Ok(response.clone()),
            SignMode::Hang => std::future::pending().await,
        }
    }
}

/// Unsigned single-instruction transfer paid by `payer`
pub fn unsigned_transfer(payer: &Pubkey) -> VersionedTransaction {
    unsigned_transfer_with_blockhash(payer, Hash::new_unique())
}

pub fn unsigned_transfer_with_blockhash(payer: &Pubkey, blockhash: Hash) -> VersionedTransaction {
    let accounts = TransferAccounts::derive(*payer, Pubkey::new_unique(), Pubkey::new_unique());
    let plan = plan_transfer(&accounts, 1_000_000, 6, true).expect("transfer plan");
    let message =
        MessageV0::try_compile(payer, &plan.instructions, &[], blockhash).expect("compile message");
    VersionedTransaction {
        signatures: vec![Signature::default()],
        message: VersionedMessage::V0(message),
    }
}

/// Transfer signed by a fresh keypair against `blockhash`
pub fn signed_transfer(blockhash: Hash) -> SignedTransaction {
    let payer = Keypair::new();
    let tx = unsigned_transfer_with_blockhash(&payer.pubkey(), blockhash);
    let signature = payer.sign_message(&tx.message.serialize());
    bind_signature(tx, &payer.pubkey(), signature, true).expect("bind signature")
}
