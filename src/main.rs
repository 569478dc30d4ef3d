//! spl-send - custodial-signer token transfers
//!
//! ## Commands
//!
//! - **serve**: run the transfer server (`/api/transfer`, `/api/balance`)
//! - **send**: sign in through the custodial signer, then build, sign,
//!   broadcast and confirm one transfer
//! - **balance**: show cached then live balances for the session wallet
//! - **logout**: drop the cached balance snapshot

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use spl_send::api::{self, AppState, HttpTransferApi};
use spl_send::balance::{query_balances, BalanceCache, SnapshotStore};
use spl_send::config::Config;
use spl_send::flow::{open_session, CancelHandle, FlowSettings, SendFlow, SendRequest, TransactionSource};
use spl_send::ledger::{LedgerClient, RpcLedger};
use spl_send::observability::init_logging;
use spl_send::session::SessionStore;
use spl_send::signer::{CustodialSigner, HttpCustodialSigner};
use spl_send::tx_builder::{TokenSpec, TransferBuilder};
use spl_send::OutcomeKind;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "spl-send.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the transfer server
    Serve,

    /// Send tokens to an address or an email-bound wallet
    Send {
        /// Recipient address or email
        #[arg(long)]
        to: String,

        /// Decimal amount, e.g. 2.50
        #[arg(long)]
        amount: String,

        /// Sign in as this user
        #[arg(long)]
        email: Option<String>,

        /// Build transfers in-process instead of asking the transfer server
        #[arg(long)]
        local: bool,
    },

    /// Show balances
    Balance {
        /// Any address; defaults to the session wallet
        #[arg(long)]
        address: Option<String>,

        #[arg(long)]
        email: Option<String>,
    },

    /// Forget the cached balance snapshot
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(Some(args.config.as_path()))
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    init_logging(&config.observability)?;
    info!(version = env!("CARGO_PKG_VERSION"), "spl-send starting");

    match args.command {
        Command::Serve => serve(config).await,
        Command::Send {
            to,
            amount,
            email,
            local,
        } => send(config, to, amount, email, local).await,
        Command::Balance { address, email } => balance(config, address, email).await,
        Command::Logout => logout(config).await,
    }
}

fn ledger(config: &Config) -> Arc<dyn LedgerClient> {
    Arc::new(RpcLedger::new(
        config.rpc.url.clone(),
        Duration::from_secs(config.rpc.timeout_secs),
    ))
}

fn signer(config: &Config, email: Option<&str>) -> Result<Arc<dyn CustodialSigner>> {
    let app_id = config.signer.app_id.clone().unwrap_or_default();
    let mut signer = HttpCustodialSigner::new(
        config.signer.base_url.clone(),
        app_id,
        Duration::from_secs(config.signer.sign_timeout_secs),
    )?;
    if let Some(email) = email {
        signer = signer.with_user(email.trim());
    }
    Ok(Arc::new(signer))
}

fn balance_cache(config: &Config, ledger: Arc<dyn LedgerClient>) -> Result<Arc<BalanceCache<dyn LedgerClient>>> {
    let token = TokenSpec::from_config(&config.token)?;
    Ok(Arc::new(BalanceCache::new(
        ledger,
        token.mint,
        token.decimals,
        SnapshotStore::new(config.cache.snapshot_path.clone()),
    )))
}

async fn serve(config: Config) -> Result<()> {
    // A missing mint is reported per request; anything else is fatal.
    let problems: Vec<String> = config
        .problems()
        .into_iter()
        .filter(|p| !p.starts_with("token.mint"))
        .collect();
    if !problems.is_empty() {
        anyhow::bail!("Invalid configuration: {}", problems.join("; "));
    }

    let token = TokenSpec::from_config(&config.token);
    if let Err(e) = &token {
        warn!(error = %e, "Token is not configured; transfer requests will fail");
    }

    let state = AppState::new(ledger(&config), token, config.observability.metrics_enabled);
    let app = api::router(
        state,
        Duration::from_secs(config.server.request_timeout_secs),
    );
    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    api::serve(listener, app).await?;
    Ok(())
}

async fn send(
    config: Config,
    to: String,
    amount: String,
    email: Option<String>,
    local: bool,
) -> Result<()> {
    config.validate_client()?;

    let ledger = ledger(&config);
    let signer = signer(&config, email.as_deref())?;
    let balances = balance_cache(&config, ledger.clone())?;
    let sessions = Arc::new(SessionStore::new());
    let settings = FlowSettings::from_config(&config);

    let source: Arc<dyn TransactionSource> = if local {
        Arc::new(TransferBuilder::new(
            ledger.clone(),
            TokenSpec::from_config(&config.token)?,
        ))
    } else {
        Arc::new(HttpTransferApi::new(
            config.server.api_url.clone(),
            Duration::from_secs(config.server.request_timeout_secs),
        )?)
    };

    let flow = SendFlow::new(signer, source, ledger, balances, sessions, settings);

    let (session, balance) = flow.sign_in(email.as_deref()).await.context("Sign-in failed")?;
    println!(
        "Signed in as {}: {} SOL, {} {}",
        session.address,
        balance.native_display(),
        balance.token_display(),
        config.token.symbol
    );

    let cancel = CancelHandle::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match flow.send(SendRequest { to, amount }, &cancel).await {
        Ok(outcome) => {
            println!("{}", outcome.description);
            println!("Transaction: {}", outcome.receipt.transaction_id);
            println!(
                "Balance: {} SOL, {} {}",
                outcome.balance.native_display(),
                outcome.balance.token_display(),
                config.token.symbol
            );
            Ok(())
        }
        Err(failure) => {
            eprintln!("Send failed: {}", failure.error);
            eprintln!("{}", failure.outcome.remediation(&config.funding_url));
            if failure.outcome == OutcomeKind::InsufficientGas {
                warn!(funding_url = %config.funding_url, "Sender needs fee funds");
            }
            Err(failure.into())
        }
    }
}

async fn balance(config: Config, address: Option<String>, email: Option<String>) -> Result<()> {
    let ledger = ledger(&config);
    let token = TokenSpec::from_config(&config.token)?;

    if let Some(address) = address {
        let owner = Pubkey::from_str(address.trim())
            .with_context(|| format!("Invalid address {address}"))?;
        let snapshot = query_balances(ledger.as_ref(), &owner, &token.mint, token.decimals).await?;
        println!(
            "{}: {} SOL, {} {}",
            owner,
            snapshot.native_display(),
            snapshot.token_display(),
            token.symbol
        );
        return Ok(());
    }

    config.validate_client()?;
    let signer = signer(&config, email.as_deref())?;
    let sessions = SessionStore::new();
    let session = open_session(
        signer.as_ref(),
        &sessions,
        email.as_deref(),
        Duration::from_secs(config.signer.lookup_timeout_secs),
    )
    .await
    .context("Sign-in failed")?;

    let cache = balance_cache(&config, ledger)?;
    let snapshot = cache.load_session(&session.address).await;
    println!(
        "{}: {} SOL, {} {}",
        session.address,
        snapshot.native_display(),
        snapshot.token_display(),
        token.symbol
    );
    Ok(())
}

async fn logout(config: Config) -> Result<()> {
    SnapshotStore::new(config.cache.snapshot_path.clone())
        .clear()
        .await
        .context("Failed to clear balance snapshot")?;
    println!("Signed out");
    Ok(())
}
