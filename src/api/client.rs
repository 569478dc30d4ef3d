//! reqwest client for the transfer server

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::handlers::{BalanceResponse, ErrorBody, TransferRequest};
use crate::classifier::{classify, FailureSignal, OutcomeKind};
use crate::errors::TransferError;
use crate::flow::TransactionSource;
use crate::tx_builder::UnsignedTransfer;

/// Transaction source backed by a remote transfer server
#[derive(Debug, Clone)]
pub struct HttpTransferApi {
    client: Client,
    base_url: String,
}

impl HttpTransferApi {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, TransferError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransferError::configuration(format!("transfer API client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Balances as served by `GET /api/balance`
    pub async fn balance(&self, address: &str) -> Result<BalanceResponse, TransferError> {
        let response = self
            .client
            .get(format!("{}/api/balance", self.base_url))
            .query(&[("address", address)])
            .send()
            .await
            .map_err(|e| TransferError::network(format!("balance request failed: {e}")))?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransferError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| TransferError::network(format!("malformed server response: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %body, "Transfer server returned an error");
        Err(error_from_response(status, &body))
    }
}

/// Rebuild a typed error from `{ error, message?, kind }`
fn error_from_response(status: StatusCode, body: &str) -> TransferError {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok();
    let detail = parsed
        .as_ref()
        .map(|b| b.message.clone().unwrap_or_else(|| b.error.clone()))
        .unwrap_or_else(|| format!("HTTP {}: {body}", status.as_u16()));

    match classify(FailureSignal::Http {
        status: status.as_u16(),
        body,
    }) {
        OutcomeKind::InvalidInput => TransferError::Validation(detail),
        OutcomeKind::ConfigError => TransferError::Configuration(detail),
        OutcomeKind::InsufficientGas => TransferError::InsufficientGas(detail),
        OutcomeKind::UserDenied | OutcomeKind::NetworkError => {
            if status == StatusCode::BAD_GATEWAY {
                TransferError::BroadcastRejected(detail)
            } else {
                TransferError::Network(detail)
            }
        }
    }
}

#[async_trait]
impl TransactionSource for HttpTransferApi {
    async fn unsigned_transfer(
        &self,
        from: &str,
        to: &str,
        amount: &str,
    ) -> Result<UnsignedTransfer, TransferError> {
        let request = TransferRequest {
            from: from.to_string(),
            to: to.to_string(),
            amount: amount.to_string(),
        };
        let response = self
            .client
            .post(format!("{}/api/transfer", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| TransferError::network(format!("transfer request failed: {e}")))?;
        Self::parse(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_unsigned_transfer_success() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/transfer")
            .match_body(Matcher::Json(json!({"from": "a", "to": "b", "amount": "1.5"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"transaction":"AQID","message":"Transfer 1.5 USDC"}"#)
            .create_async()
            .await;

        let api = HttpTransferApi::new(server.url(), Duration::from_secs(5)).unwrap();
        let unsigned = api.unsigned_transfer("a", "b", "1.5").await.unwrap();
        assert_eq!(unsigned.transaction, "AQID");
        assert_eq!(unsigned.message, "Transfer 1.5 USDC");
    }

    #[tokio::test]
    async fn test_error_bodies_map_back() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/transfer")
            .with_status(400)
            .with_body(r#"{"error":"Invalid request","message":"Validation error: invalid recipient address","kind":"INVALID_INPUT"}"#)
            .create_async()
            .await;
        let api = HttpTransferApi::new(server.url(), Duration::from_secs(5)).unwrap();
        let err = api.unsigned_transfer("a", "b", "1").await.unwrap_err();
        assert!(matches!(err, TransferError::Validation(ref m) if m.contains("invalid recipient")));

        assert!(matches!(
            error_from_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"error":"Server misconfigured","kind":"CONFIG_ERROR"}"#
            ),
            TransferError::Configuration(_)
        ));
        assert!(matches!(
            error_from_response(StatusCode::INTERNAL_SERVER_ERROR, "gateway exploded"),
            TransferError::Network(_)
        ));
    }

    #[tokio::test]
    async fn test_balance_query() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/balance")
            .match_query(Matcher::UrlEncoded("address".into(), "abc".into()))
            .with_status(200)
            .with_body(r#"{"solBalance":1.5,"usdcBalance":20.25}"#)
            .create_async()
            .await;

        let api = HttpTransferApi::new(server.url(), Duration::from_secs(5)).unwrap();
        let balance = api.balance("abc").await.unwrap();
        assert_eq!(balance.usdc_balance, 20.25);
    }
}
