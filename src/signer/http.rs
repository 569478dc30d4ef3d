//! JSON-over-HTTP adapter for the custodial signer
//!
//! `POST {base_url}/wallet` and `POST {base_url}/sign`, both carrying the
//! application id and the optional bound user. Transactions travel as base64
//! of their wire bytes.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use solana_sdk::transaction::VersionedTransaction;
use std::time::Duration;
use tracing::debug;

use super::{CustodialSigner, SignResponse, SignerUser, WalletResponse};
use crate::errors::TransferError;
use crate::tx_builder::codec::encode_transaction;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletRequest<'a> {
    app_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a SignerUser>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest<'a> {
    app_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a SignerUser>,
    transaction: String,
    reason: &'a str,
}

/// Custodial signer reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpCustodialSigner {
    client: Client,
    base_url: String,
    app_id: String,
    user: Option<SignerUser>,
}

impl HttpCustodialSigner {
    /// `request_timeout` bounds a single HTTP exchange; the approval
    /// deadline is owned by the coordinator.
    pub fn new(
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, TransferError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransferError::configuration(format!("signer HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            user: None,
        })
    }

    /// Bind the signer to a user, as `{ appId, user: { email } }`
    pub fn with_user(mut self, email: impl Into<String>) -> Self {
        self.user = Some(SignerUser {
            email: email.into(),
        });
        self
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, TransferError>
    where
        B: Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransferError::network(format!("signer request to {path} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(path, status = status.as_u16(), body = %body, "Signer returned HTTP error");
            return Err(TransferError::network(format!(
                "signer {path} returned HTTP {}: {body}",
                status.as_u16()
            )));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| TransferError::signing_failed(format!("malformed signer response: {e}")))
    }
}

#[async_trait]
impl CustodialSigner for HttpCustodialSigner {
    async fn get_wallet(&self, user: Option<&SignerUser>) -> Result<WalletResponse, TransferError> {
        let request = WalletRequest {
            app_id: &self.app_id,
            user: user.or(self.user.as_ref()),
        };
        self.post("wallet", &request).await
    }

    async fn sign_transaction(
        &self,
        tx: &VersionedTransaction,
        reason: &str,
    ) -> Result<SignResponse, TransferError> {
        let request = SignRequest {
            app_id: &self.app_id,
            user: self.user.as_ref(),
            transaction: encode_transaction(tx)?,
            reason,
        };
        self.post("sign", &request).await
    }
}
