//! HTTP surface of the transfer server
//!
//! # Data Flow
//! ```text
//! POST /api/transfer { from, to, amount }
//!     → TransferBuilder (fresh blockhash, sub-account check)
//!     → { transaction, message }
//!
//! GET /api/balance?address=...
//!     → ledger balance queries
//!     → { solBalance, usdcBalance }
//! ```
//!
//! Errors serialize as `{ error, message?, kind }` with 400 for validation,
//! 500 for configuration and network failures, 502 for ledger rejections.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info_span, Instrument};

use crate::errors::TransferError;
use crate::ledger::LedgerClient;
use crate::metrics::metrics;
use crate::observability::CorrelationId;
use crate::tx_builder::{TokenSpec, TransferBuilder};

pub mod client;
pub mod handlers;

pub use client::HttpTransferApi;
pub use handlers::{ApiError, BalanceResponse, ErrorBody, TransferRequest};

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    /// Missing token configuration is reported per request as a 500
    builder: Result<Arc<TransferBuilder<dyn LedgerClient>>, TransferError>,
    ledger: Arc<dyn LedgerClient>,
    metrics_enabled: bool,
}

impl AppState {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        token: Result<TokenSpec, TransferError>,
        metrics_enabled: bool,
    ) -> Self {
        let builder = token.map(|token| Arc::new(TransferBuilder::new(ledger.clone(), token)));
        Self {
            builder,
            ledger,
            metrics_enabled,
        }
    }

    pub(crate) fn builder(&self) -> Result<&TransferBuilder<dyn LedgerClient>, TransferError> {
        self.builder.as_deref().map_err(Clone::clone)
    }

    pub(crate) fn ledger(&self) -> &dyn LedgerClient {
        self.ledger.as_ref()
    }
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let mut router = Router::new()
        .route("/api/transfer", post(handlers::create_transfer))
        .route("/api/balance", get(handlers::get_balance))
        .route("/health", get(handlers::health));
    if state.metrics_enabled {
        router = router.route("/metrics", get(handlers::metrics_text));
    }

    router
        .with_state(state)
        .layer(middleware::from_fn(correlate))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Tag every request with a correlation id and count it
async fn correlate(request: Request, next: Next) -> Response {
    let correlation_id = CorrelationId::new();
    let path = request.uri().path().to_string();
    let span = info_span!("http", correlation_id = %correlation_id, method = %request.method(), path = %path);

    let response = next.run(request).instrument(span).await;
    metrics().record_http(&path, response.status().as_u16());
    response
}

/// Serve until Ctrl+C
pub async fn serve(listener: TcpListener, app: Router) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTP server starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
