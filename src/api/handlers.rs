use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::{info, warn};

use super::AppState;
use crate::balance::query_balances;
use crate::classifier::{classify, FailureSignal, OutcomeKind};
use crate::errors::TransferError;
use crate::metrics::metrics;
use crate::tx_builder::UnsignedTransfer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub sol_balance: f64,
    pub usdc_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub kind: OutcomeKind,
}

/// HTTP error wrapper around [`TransferError`]
#[derive(Debug)]
pub struct ApiError(pub TransferError);

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            TransferError::Validation(_) | TransferError::Busy(_) => StatusCode::BAD_REQUEST,
            TransferError::InsufficientGas(_) | TransferError::BroadcastRejected(_) => {
                StatusCode::BAD_GATEWAY
            }
            TransferError::Configuration(_)
            | TransferError::Network(_)
            | TransferError::SigningDenied(_)
            | TransferError::SigningFailed(_)
            | TransferError::BroadcastTimeout { .. }
            | TransferError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn title(&self) -> &'static str {
        match &self.0 {
            TransferError::Validation(_) | TransferError::Busy(_) => "Invalid request",
            TransferError::Configuration(_) => "Server misconfigured",
            TransferError::InsufficientGas(_) | TransferError::BroadcastRejected(_) => {
                "Ledger rejected the request"
            }
            _ => "Ledger request failed",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = classify(FailureSignal::Error(&self.0));
        if status.is_server_error() {
            warn!(status = status.as_u16(), kind = %kind, error = %self.0, "Request failed");
        }

        let body = ErrorBody {
            error: self.title().to_string(),
            message: Some(self.0.to_string()),
            kind,
        };
        (status, Json(body)).into_response()
    }
}

pub async fn create_transfer(
    State(state): State<AppState>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<UnsignedTransfer>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        TransferError::validation(format!("missing or malformed fields: {}", rejection.body_text()))
    })?;

    let builder = state.builder()?;
    let built = builder
        .build(&request.from, &request.to, &request.amount)
        .await?;

    info!(
        from = %request.from,
        to = %request.to,
        units = built.units,
        instructions = built.instruction_count,
        "Served unsigned transfer"
    );
    Ok(Json(built.unsigned))
}

pub async fn get_balance(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let address = query
        .address
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| TransferError::validation("address query parameter is required"))?;
    let owner = Pubkey::from_str(address)
        .map_err(|_| TransferError::validation("invalid address"))?;

    let token = state.builder()?.token().clone();
    let snapshot = query_balances(state.ledger(), &owner, &token.mint, token.decimals)
        .await
        .map_err(TransferError::from)?;

    Ok(Json(BalanceResponse {
        sol_balance: snapshot.native_display(),
        usdc_balance: snapshot.token_display(),
    }))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn metrics_text() -> Response {
    match metrics().render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{router, AppState};
    use crate::ledger::{LedgerClient, LedgerError};
    use crate::test_utils::MockLedger;
    use crate::tx_builder::{decode_transaction, TokenSpec};
    use axum::{body::Body, http::Request};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn token() -> TokenSpec {
        TokenSpec {
            mint: Pubkey::new_unique(),
            decimals: 6,
            symbol: "USDC".to_string(),
        }
    }

    fn app(ledger: Arc<MockLedger>, token: Result<TokenSpec, TransferError>) -> axum::Router {
        let ledger: Arc<dyn LedgerClient> = ledger;
        router(AppState::new(ledger, token, true), Duration::from_secs(5))
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_transfer(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/transfer")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_transfer_endpoint() {
        let sender = Pubkey::new_unique();
        let response = app(Arc::new(MockLedger::new()), Ok(token()))
            .oneshot(post_transfer(json!({
                "from": sender.to_string(),
                "to": Pubkey::new_unique().to_string(),
                "amount": "2.50"
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: UnsignedTransfer = body_json(response).await;
        assert_eq!(body.message, "Transfer 2.50 USDC");
        let tx = decode_transaction(&body.transaction).unwrap();
        assert_eq!(tx.message.static_account_keys()[0], sender);
        assert_eq!(tx.message.instructions().len(), 2);
    }

    #[tokio::test]
    async fn test_transfer_validation_is_400() {
        let response = app(Arc::new(MockLedger::new()), Ok(token()))
            .oneshot(post_transfer(json!({
                "from": Pubkey::new_unique().to_string(),
                "to": "bogus",
                "amount": "1"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = body_json(response).await;
        assert_eq!(body.kind, OutcomeKind::InvalidInput);

        let response = app(Arc::new(MockLedger::new()), Ok(token()))
            .oneshot(post_transfer(json!({ "from": "x" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_mint_is_500() {
        let response = app(
            Arc::new(MockLedger::new()),
            Err(TransferError::configuration("token mint is not configured")),
        )
        .oneshot(post_transfer(json!({
            "from": Pubkey::new_unique().to_string(),
            "to": Pubkey::new_unique().to_string(),
            "amount": "1"
        })))
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorBody = body_json(response).await;
        assert_eq!(body.kind, OutcomeKind::ConfigError);
        assert_eq!(body.error, "Server misconfigured");
    }

    #[tokio::test]
    async fn test_balance_endpoint() {
        let token = token();
        let ledger = Arc::new(MockLedger::new());
        let owner = Pubkey::new_unique();
        ledger.set_native_balance(&owner, 1_234_567_890);
        ledger.set_token_balance(&owner, &token.mint, 2_506_000);

        let response = app(ledger, Ok(token))
            .oneshot(
                Request::builder()
                    .uri(format!("/api/balance?address={owner}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: BalanceResponse = body_json(response).await;
        assert_eq!(
            body,
            BalanceResponse {
                sol_balance: 1.235,
                usdc_balance: 2.51
            }
        );
    }

    #[tokio::test]
    async fn test_balance_errors() {
        let ledger = Arc::new(MockLedger::new());
        let response = app(ledger.clone(), Ok(token()))
            .oneshot(Request::builder().uri("/api/balance").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        ledger.fail_reads(LedgerError::Transport {
            message: "down".to_string(),
        });
        let response = app(ledger, Ok(token()))
            .oneshot(
                Request::builder()
                    .uri(format!("/api/balance?address={}", Pubkey::new_unique()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ledger_times_out_with_408() {
        let ledger = Arc::new(MockLedger::new());
        ledger.delay_reads(Duration::from_secs(30));
        let ledger: Arc<dyn LedgerClient> = ledger;
        let app = router(AppState::new(ledger, Ok(token()), false), Duration::from_secs(5));

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/balance?address={}", Pubkey::new_unique()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let app = app(Arc::new(MockLedger::new()), Ok(token()));
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
