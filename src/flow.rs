//! Client send flow
//!
//! resolve → build → sign → broadcast → refresh balance, for the signed-in
//! session. One send runs at a time; a second submit while one is pending
//! fails with `Busy`. Every attempt carries a [`CancelHandle`]: cancelling it
//! before submission drops the pending stage (typically the signer prompt),
//! returns `Cancelled` and frees the flow for a new attempt. After submission
//! the attempt is committed and ends with a receipt or a broadcast error.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{info, info_span, warn, Instrument};

use crate::address::{AddressResolver, ResolvedAddress};
use crate::balance::{BalanceCache, BalanceSnapshot};
use crate::broadcast::{BroadcastReceipt, BroadcastSettings, Broadcaster};
use crate::classifier::{classify, FailureSignal, OutcomeKind};
use crate::config::Config;
use crate::errors::TransferError;
use crate::ledger::LedgerClient;
use crate::metrics::metrics;
use crate::observability::CorrelationId;
use crate::session::{SessionStore, WalletSession};
use crate::signer::{
    compose_reason, CustodialSigner, SignedTransaction, SignerUser, SigningCoordinator,
};
use crate::tx_builder::UnsignedTransfer;

/// Where unsigned transfers come from: the local builder or the HTTP server
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn unsigned_transfer(
        &self,
        from: &str,
        to: &str,
        amount: &str,
    ) -> Result<UnsignedTransfer, TransferError>;
}

/// Cancellation signal for one send attempt
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Raw recipient identifier as typed
    pub to: String,
    /// Decimal amount as typed
    pub amount: String,
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub receipt: BroadcastReceipt,
    pub recipient: ResolvedAddress,
    /// "Transfer <amount> <symbol>"
    pub description: String,
    pub balance: BalanceSnapshot,
}

/// A failed send, classified for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFailure {
    pub error: TransferError,
    pub outcome: OutcomeKind,
}

impl std::fmt::Display for SendFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.error, self.outcome)
    }
}

impl std::error::Error for SendFailure {}

#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub symbol: String,
    pub lookup_timeout: Duration,
    pub sign_timeout: Duration,
    pub broadcast: BroadcastSettings,
}

impl FlowSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            symbol: config.token.symbol.clone(),
            lookup_timeout: Duration::from_secs(config.signer.lookup_timeout_secs),
            sign_timeout: Duration::from_secs(config.signer.sign_timeout_secs),
            broadcast: BroadcastSettings::from_config(&config.broadcast),
        }
    }
}

/// Open the process session from the signer's `getWallet()`
pub async fn open_session(
    signer: &dyn CustodialSigner,
    sessions: &SessionStore,
    email: Option<&str>,
    lookup_timeout: Duration,
) -> Result<WalletSession, TransferError> {
    let user = email.map(|e| SignerUser {
        email: e.trim().to_string(),
    });
    let response = timeout(lookup_timeout, signer.get_wallet(user.as_ref()))
        .await
        .map_err(|_| TransferError::network("wallet lookup timed out"))??;
    let session = WalletSession::from_wallet_response(&response, email)?;
    sessions.open(session)
}

/// A signed transfer that has not been submitted yet
struct PreparedSend {
    recipient: ResolvedAddress,
    description: String,
    signed: SignedTransaction,
}

pub struct SendFlow {
    signer: Arc<dyn CustodialSigner>,
    lookup_timeout: Duration,
    resolver: AddressResolver<dyn CustodialSigner>,
    coordinator: SigningCoordinator<dyn CustodialSigner>,
    source: Arc<dyn TransactionSource>,
    broadcaster: Broadcaster<dyn LedgerClient>,
    balances: Arc<BalanceCache<dyn LedgerClient>>,
    sessions: Arc<SessionStore>,
    symbol: String,
    send_in_flight: AtomicBool,
}

impl SendFlow {
    pub fn new(
        signer: Arc<dyn CustodialSigner>,
        source: Arc<dyn TransactionSource>,
        ledger: Arc<dyn LedgerClient>,
        balances: Arc<BalanceCache<dyn LedgerClient>>,
        sessions: Arc<SessionStore>,
        settings: FlowSettings,
    ) -> Self {
        Self {
            signer: signer.clone(),
            lookup_timeout: settings.lookup_timeout,
            resolver: AddressResolver::new(signer.clone(), settings.lookup_timeout),
            coordinator: SigningCoordinator::new(signer, settings.sign_timeout),
            source,
            broadcaster: Broadcaster::new(ledger, settings.broadcast),
            balances,
            sessions,
            symbol: settings.symbol,
            send_in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_sending(&self) -> bool {
        self.send_in_flight.load(Ordering::Acquire)
    }

    pub fn balances(&self) -> &BalanceCache<dyn LedgerClient> {
        &self.balances
    }

    /// Open the session and run the session-load balance refresh
    ///
    /// The persisted snapshot is published first, then replaced by the live one.
    pub async fn sign_in(
        &self,
        email: Option<&str>,
    ) -> Result<(WalletSession, BalanceSnapshot), TransferError> {
        let session = open_session(
            self.signer.as_ref(),
            &self.sessions,
            email,
            self.lookup_timeout,
        )
        .await?;
        let balance = self.balances.load_session(&session.address).await;
        info!(address = %session.address, "Session opened");
        Ok((session, balance))
    }

    /// Run one send attempt to completion, failure or cancellation
    ///
    /// Cancellation only reaches the stages before submission. Once the
    /// transaction has gone to the ledger the attempt runs to a receipt or a
    /// broadcast error.
    pub async fn send(
        &self,
        request: SendRequest,
        cancel: &CancelHandle,
    ) -> Result<SendOutcome, SendFailure> {
        let correlation_id = CorrelationId::new();
        let span = info_span!("send", correlation_id = %correlation_id);

        let result = async {
            let session = self
                .sessions
                .current()
                .ok_or_else(|| TransferError::validation("no wallet session, sign in first"))?;

            if self
                .send_in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(TransferError::Busy("send"));
            }
            metrics().sends_in_flight.inc();
            let _guard = scopeguard::guard((), |_| {
                self.send_in_flight.store(false, Ordering::Release);
                metrics().sends_in_flight.dec();
            });

            let prepared = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransferError::Cancelled),
                prepared = self.prepare(&session, &request) => prepared,
            };
            // A cancel that lands while signing completes still wins: nothing is sent yet
            let prepared = match prepared {
                Ok(_) if cancel.is_cancelled() => Err(TransferError::Cancelled),
                other => other,
            };
            if matches!(prepared, Err(TransferError::Cancelled)) {
                info!("Send cancelled by user");
            }
            let prepared = prepared?;

            self.submit(&session, prepared).await
        }
        .instrument(span.clone())
        .await;

        result.map_err(|error| {
            let outcome = classify(FailureSignal::Error(&error));
            metrics().record_failure(error.category());
            metrics().record_outcome(outcome.as_str());
            span.in_scope(|| {
                warn!(category = error.category(), outcome = %outcome, error = %error, "Send failed");
            });
            SendFailure { error, outcome }
        })
    }

    /// Resolve, build and sign; nothing has reached the ledger yet
    async fn prepare(
        &self,
        session: &WalletSession,
        request: &SendRequest,
    ) -> Result<PreparedSend, TransferError> {
        let recipient = self.resolver.resolve(&request.to).await?;
        let amount = request.amount.trim();

        let unsigned = self
            .source
            .unsigned_transfer(
                &session.address.to_string(),
                &recipient.address.to_string(),
                amount,
            )
            .await?;

        let reason = compose_reason(
            amount,
            &self.symbol,
            &recipient.address.to_string(),
            recipient.email.as_deref(),
        );
        let signed = self
            .coordinator
            .sign_for(&session.address, &unsigned.transaction, &reason)
            .await?;

        Ok(PreparedSend {
            recipient,
            description: unsigned.message,
            signed,
        })
    }

    async fn submit(
        &self,
        session: &WalletSession,
        prepared: PreparedSend,
    ) -> Result<SendOutcome, TransferError> {
        let receipt = self.broadcaster.submit(&prepared.signed).await?;
        info!(
            signature = %receipt.transaction_id,
            recipient = %prepared.recipient.address,
            "Transfer confirmed"
        );

        let balance = self.balances.refresh(&session.address).await;

        Ok(SendOutcome {
            receipt,
            recipient: prepared.recipient,
            description: prepared.description,
            balance,
        })
    }
}
