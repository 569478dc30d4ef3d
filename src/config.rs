//! Configuration module
//!
//! This module handles configuration loading from TOML files and
//! environment variables, and provides structured configuration types.
//! Every field has a default; `.env` is read through dotenvy before the
//! environment overlay is applied.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::TransferError;

pub const ENV_RPC_URL: &str = "SPL_SEND_RPC_URL";
pub const ENV_TOKEN_MINT: &str = "SPL_SEND_TOKEN_MINT";
pub const ENV_SIGNER_APP_ID: &str = "SPL_SEND_SIGNER_APP_ID";
pub const ENV_SIGNER_URL: &str = "SPL_SEND_SIGNER_URL";
pub const ENV_BIND_ADDRESS: &str = "SPL_SEND_BIND_ADDRESS";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub token: TokenConfig,

    #[serde(default)]
    pub signer: SignerConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Where users can top up fee funds
    #[serde(default = "default_funding_url")]
    pub funding_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Ledger JSON-RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Mint address; required
    #[serde(default)]
    pub mint: Option<String>,

    #[serde(default = "default_decimals")]
    pub decimals: u8,

    #[serde(default = "default_symbol")]
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    #[serde(default = "default_signer_url")]
    pub base_url: String,

    #[serde(default)]
    pub app_id: Option<String>,

    /// Deadline for a user to answer the approval prompt
    #[serde(default = "default_sign_timeout")]
    pub sign_timeout_secs: u64,

    /// Deadline for wallet lookups by email
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Submission attempts for transient network failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Base URL the client uses to reach the transfer server
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub json_logs: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Overrides the default filter when `RUST_LOG` is unset
    #[serde(default)]
    pub log_filter: Option<String>,
}

// Default value functions
fn default_rpc_url() -> String { "https://api.devnet.solana.com".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_decimals() -> u8 { 6 }
fn default_symbol() -> String { "USDC".to_string() }
fn default_signer_url() -> String { "http://127.0.0.1:8900".to_string() }
fn default_sign_timeout() -> u64 { 120 }
fn default_lookup_timeout() -> u64 { 60 }
fn default_max_retries() -> usize { 3 }
fn default_confirm_timeout() -> u64 { 60 }
fn default_poll_interval() -> u64 { 500 }
fn default_bind_address() -> String { "127.0.0.1:3000".to_string() }
fn default_api_url() -> String { "http://127.0.0.1:3000".to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_snapshot_path() -> PathBuf { PathBuf::from(".spl-send/snapshot.json") }
fn default_funding_url() -> String { "https://faucet.circle.com".to_string() }
fn default_true() -> bool { true }

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            token: TokenConfig::default(),
            signer: SignerConfig::default(),
            broadcast: BroadcastConfig::default(),
            server: ServerConfig::default(),
            cache: CacheConfig::default(),
            observability: ObservabilityConfig::default(),
            funding_url: default_funding_url(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            mint: None,
            decimals: default_decimals(),
            symbol: default_symbol(),
        }
    }
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            base_url: default_signer_url(),
            app_id: None,
            sign_timeout_secs: default_sign_timeout(),
            lookup_timeout_secs: default_lookup_timeout(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            confirm_timeout_secs: default_confirm_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            json_logs: false,
            metrics_enabled: true,
            log_filter: None,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    ///
    /// A missing file is not an error; defaults plus the environment apply.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay values from `lookup`, which is `std::env::var` outside tests
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_RPC_URL) {
            self.rpc.url = url;
        }
        if let Some(mint) = non_empty(ENV_TOKEN_MINT) {
            self.token.mint = Some(mint);
        }
        if let Some(app_id) = non_empty(ENV_SIGNER_APP_ID) {
            self.signer.app_id = Some(app_id);
        }
        if let Some(url) = non_empty(ENV_SIGNER_URL) {
            self.signer.base_url = url;
        }
        if let Some(bind) = non_empty(ENV_BIND_ADDRESS) {
            self.server.bind_address = bind;
        }
    }

    /// Every problem with the ledger, token and broadcast settings
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let url = self.rpc.url.trim();
        if url.is_empty() {
            problems.push("rpc.url is not configured".to_string());
        } else if !(url.starts_with("http://") || url.starts_with("https://")) {
            problems.push(format!("rpc.url '{url}' must be an http(s) URL"));
        }

        match self.token.mint.as_deref().map(str::trim) {
            None | Some("") => problems.push("token.mint is not configured".to_string()),
            Some(mint) => {
                if Pubkey::from_str(mint).is_err() {
                    problems.push(format!("token.mint '{mint}' is not a valid address"));
                }
            }
        }
        if self.token.decimals > 9 {
            problems.push(format!("token.decimals {} exceeds 9", self.token.decimals));
        }
        if self.token.symbol.trim().is_empty() {
            problems.push("token.symbol is empty".to_string());
        }

        if self.broadcast.max_retries == 0 {
            problems.push("broadcast.max_retries must be at least 1".to_string());
        }
        if self.broadcast.poll_interval_ms == 0 {
            problems.push("broadcast.poll_interval_ms must be positive".to_string());
        }
        if self.broadcast.confirm_timeout_secs == 0 {
            problems.push("broadcast.confirm_timeout_secs must be positive".to_string());
        }

        problems
    }

    /// Fails with a `Configuration` error listing every problem
    pub fn validate(&self) -> Result<(), TransferError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(TransferError::configuration(problems.join("; ")))
        }
    }

    /// Client commands additionally need the signer
    pub fn validate_client(&self) -> Result<(), TransferError> {
        let mut problems = self.problems();
        if self.signer.app_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
            problems.push("signer.app_id is not configured".to_string());
        }
        if self.signer.base_url.trim().is_empty() {
            problems.push("signer.base_url is not configured".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(TransferError::configuration(problems.join("; ")))
        }
    }
}
