//! Core transfer building logic

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    hash::Hash,
    message::{v0::Message as MessageV0, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use super::amount::parse_amount;
use super::codec::encode_transaction;
use super::instructions::{plan_transfer, TransferAccounts};
use crate::config::TokenConfig;
use crate::errors::TransferError;
use crate::flow::TransactionSource;
use crate::ledger::LedgerClient;
use crate::metrics::{metrics, Timer};

/// Token the builder moves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSpec {
    pub mint: Pubkey,
    pub decimals: u8,
    pub symbol: String,
}

impl TokenSpec {
    /// A missing or unparsable mint is a configuration error
    pub fn from_config(config: &TokenConfig) -> Result<Self, TransferError> {
        let mint = config
            .mint
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| TransferError::configuration("token mint is not configured"))?;
        let mint = Pubkey::from_str(mint.trim())
            .map_err(|e| TransferError::configuration(format!("token mint '{mint}': {e}")))?;
        Ok(Self {
            mint,
            decimals: config.decimals,
            symbol: config.symbol.clone(),
        })
    }
}

/// Wire form of an unsigned transfer: `{ transaction, message }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransfer {
    /// Base64 of the transaction wire bytes
    pub transaction: String,
    /// Human-readable description, e.g. "Transfer 2.50 USDC"
    pub message: String,
}

/// Result of a build, with the details callers may want to log or test
#[derive(Debug, Clone)]
pub struct BuiltTransfer {
    pub unsigned: UnsignedTransfer,
    pub units: u64,
    pub instruction_count: usize,
    pub creates_recipient_account: bool,
    pub blockhash: Hash,
}

/// Builds unsigned, fee-payer-correct token transfers
///
/// Stateless apart from its collaborators: every call fetches its own
/// blockhash and checks the recipient sub-account, so concurrent builds are
/// independent. The returned transaction is single-use.
pub struct TransferBuilder<L: ?Sized> {
    ledger: Arc<L>,
    token: TokenSpec,
}

impl<L: LedgerClient + ?Sized> TransferBuilder<L> {
    pub fn new(ledger: Arc<L>, token: TokenSpec) -> Self {
        Self { ledger, token }
    }

    pub fn token(&self) -> &TokenSpec {
        &self.token
    }

    pub async fn build(
        &self,
        from: &str,
        to: &str,
        amount: &str,
    ) -> Result<BuiltTransfer, TransferError> {
        let timer = Timer::start();

        let sender = parse_address(from, "sender")?;
        let recipient = parse_address(to, "recipient")?;
        let units = parse_amount(amount, self.token.decimals)?;

        let accounts = TransferAccounts::derive(sender, recipient, self.token.mint);

        let recipient_account_exists = match self
            .ledger
            .token_account(&accounts.recipient_token_account)
            .await
        {
            Ok(_) => true,
            Err(e) if e.is_account_not_found() => false,
            Err(e) => return Err(e.into()),
        };

        let plan = plan_transfer(
            &accounts,
            units,
            self.token.decimals,
            recipient_account_exists,
        )?;

        let blockhash = self.ledger.latest_blockhash().await?;

        let message = MessageV0::try_compile(&sender, &plan.instructions, &[], blockhash)
            .map_err(|e| TransferError::network(format!("failed to compile message: {e}")))?;
        let message = VersionedMessage::V0(message);
        let required = message.header().num_required_signatures as usize;
        let tx = VersionedTransaction {
            signatures: vec![Signature::default(); required],
            message,
        };

        let unsigned = UnsignedTransfer {
            transaction: encode_transaction(&tx)?,
            message: format!("Transfer {} {}", amount.trim(), self.token.symbol),
        };

        timer.observe_duration(&metrics().build_latency);
        metrics().transfers_built.inc();

        debug!(
            blockhash = %blockhash,
            instructions = plan.instructions.len(),
            "Compiled transfer message"
        );
        info!(
            sender = %sender,
            recipient = %recipient,
            units,
            creates_recipient_account = plan.creates_recipient_account,
            "Built unsigned transfer"
        );

        Ok(BuiltTransfer {
            unsigned,
            units,
            instruction_count: plan.instructions.len(),
            creates_recipient_account: plan.creates_recipient_account,
            blockhash,
        })
    }
}

#[async_trait]
impl<L: LedgerClient + ?Sized> TransactionSource for TransferBuilder<L> {
    async fn unsigned_transfer(
        &self,
        from: &str,
        to: &str,
        amount: &str,
    ) -> Result<UnsignedTransfer, TransferError> {
        Ok(self.build(from, to, amount).await?.unsigned)
    }
}

fn parse_address(input: &str, role: &str) -> Result<Pubkey, TransferError> {
    Pubkey::from_str(input.trim())
        .map_err(|_| TransferError::validation(format!("invalid {role} address")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerError;
    use crate::test_utils::MockLedger;
    use crate::tx_builder::codec::decode_transaction;

    fn token() -> TokenSpec {
        TokenSpec {
            mint: Pubkey::new_unique(),
            decimals: 6,
            symbol: "USDC".to_string(),
        }
    }

    #[tokio::test]
    async fn test_build_with_missing_recipient_account() {
        let ledger = Arc::new(MockLedger::new());
        let builder = TransferBuilder::new(ledger.clone(), token());
        let sender = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();

        let built = builder
            .build(&sender.to_string(), &recipient.to_string(), "2.50")
            .await
            .unwrap();

        assert_eq!(built.units, 2_500_000);
        assert_eq!(built.instruction_count, 2);
        assert!(built.creates_recipient_account);
        assert_eq!(built.unsigned.message, "Transfer 2.50 USDC");
        assert_eq!(built.blockhash, ledger.blockhash());

        let tx = decode_transaction(&built.unsigned.transaction).unwrap();
        assert_eq!(tx.message.static_account_keys()[0], sender);
        assert_eq!(tx.message.header().num_required_signatures, 1);
        assert_eq!(tx.signatures, vec![Signature::default()]);
    }

    #[tokio::test]
    async fn test_build_with_existing_recipient_account() {
        let token = token();
        let ledger = Arc::new(MockLedger::new());
        let recipient = Pubkey::new_unique();
        ledger.set_token_balance(&recipient, &token.mint, 0);

        let builder = TransferBuilder::new(ledger, token);
        let built = builder
            .build(&Pubkey::new_unique().to_string(), &recipient.to_string(), "1.00")
            .await
            .unwrap();
        assert_eq!(built.instruction_count, 1);
        assert_eq!(built.units, 1_000_000);
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let builder = TransferBuilder::new(Arc::new(MockLedger::new()), token());
        let good = Pubkey::new_unique().to_string();

        let err = builder.build("nope", &good, "1").await.unwrap_err();
        assert_eq!(err, TransferError::validation("invalid sender address"));

        let err = builder.build(&good, "0OIl", "1").await.unwrap_err();
        assert_eq!(err, TransferError::validation("invalid recipient address"));

        let err = builder.build(&good, &good, "0.0000001").await.unwrap_err();
        assert!(matches!(err, TransferError::Validation(_)));
    }

    #[tokio::test]
    async fn test_ledger_failure_propagates() {
        let ledger = Arc::new(MockLedger::new());
        ledger.fail_blockhash(LedgerError::Transport {
            message: "connection refused".to_string(),
        });
        let builder = TransferBuilder::new(ledger, token());
        let err = builder
            .build(
                &Pubkey::new_unique().to_string(),
                &Pubkey::new_unique().to_string(),
                "1",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Network(_)));
    }

    #[test]
    fn test_token_spec_requires_mint() {
        let config = TokenConfig::default();
        assert!(matches!(
            TokenSpec::from_config(&config),
            Err(TransferError::Configuration(_))
        ));

        let config = TokenConfig {
            mint: Some(Pubkey::new_unique().to_string()),
            ..TokenConfig::default()
        };
        let spec = TokenSpec::from_config(&config).unwrap();
        assert_eq!(spec.decimals, 6);
        assert_eq!(spec.symbol, "USDC");
    }
}
