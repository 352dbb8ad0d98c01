use std::env;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use sfd_ledger::api::{
    CloseSessionRequest, CloseSessionResponse, DisburseRequest, DisburseResponse, Envelope,
    OpenSessionRequest, PaymentRequest, PaymentResponse, WebhookResponse,
};
use sfd_ledger::csv::{Replayer, read_journal};
use sfd_ledger::engine::{ErrorKind, Ledger, LedgerError};
use sfd_ledger::model::{CashSession, SessionId};
use sfd_ledger::store::LedgerStore;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::InvalidState
        | ErrorKind::Precondition
        | ErrorKind::InsufficientFunds
        | ErrorKind::Conflict => StatusCode::CONFLICT,
    }
}

fn respond<T: Serialize>(result: Result<T, LedgerError>) -> (StatusCode, Json<Envelope<T>>) {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => status_for(e.kind()),
    };
    (status, Json(result.into()))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"success": true, "status": "ok"}))
}

async fn open_session(
    State(ledger): State<Arc<Ledger>>,
    Json(req): Json<OpenSessionRequest>,
) -> impl IntoResponse {
    let result: Result<CashSession, LedgerError> = ledger
        .open_session(req.actor_id, req.sfd_id, req.opening_balance, req.notes.as_deref())
        .map_err(LedgerError::from);
    respond(result)
}

async fn close_session(
    State(ledger): State<Arc<Ledger>>,
    Path(session_id): Path<SessionId>,
    Json(req): Json<CloseSessionRequest>,
) -> impl IntoResponse {
    let result = ledger
        .close_session(req.actor_id, session_id, req.counted_balance, req.notes.as_deref())
        .map(CloseSessionResponse::from)
        .map_err(LedgerError::from);
    respond(result)
}

async fn disburse(
    State(ledger): State<Arc<Ledger>>,
    Json(req): Json<DisburseRequest>,
) -> impl IntoResponse {
    let result = ledger
        .disburse(
            req.actor_id,
            req.loan_id,
            req.disbursement_method,
            req.cash_session_id,
        )
        .map(DisburseResponse::from)
        .map_err(LedgerError::from);
    respond(result)
}

async fn pay(
    State(ledger): State<Arc<Ledger>>,
    Json(req): Json<PaymentRequest>,
) -> impl IntoResponse {
    let result = ledger
        .pay(
            req.actor_id,
            req.loan_id,
            req.amount,
            req.payment_method,
            req.reference.as_deref(),
            req.cash_session_id,
        )
        .map(PaymentResponse::from)
        .map_err(LedgerError::from);
    respond(result)
}

/// Providers retry on non-2xx, so every processable payload is acknowledged
/// with 200; only a malformed body gets a 400.
async fn mobile_money_webhook(
    State(ledger): State<Arc<Ledger>>,
    Json(raw): Json<serde_json::Value>,
) -> impl IntoResponse {
    match ledger.ingest_webhook(raw) {
        Ok(outcome) => (StatusCode::OK, Json(WebhookResponse::from(outcome))).into_response(),
        Err(e) => {
            let err = LedgerError::from(e);
            (
                StatusCode::BAD_REQUEST,
                Json(Envelope::<WebhookResponse>::err(&err)),
            )
                .into_response()
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let store = Arc::new(LedgerStore::new());

    // An optional journal seeds the in-memory tables before serving.
    if let Some(path) = env::args().nth(1) {
        let mut replayer = Replayer::new(Ledger::new(store.clone()));
        let (row_sender, row_receiver) = tokio::sync::mpsc::channel(16);
        tokio::spawn(async move {
            for result in read_journal(&path) {
                match result {
                    Ok(row) => {
                        row_sender.send(row).await.unwrap();
                    }
                    Err(e) => {
                        warn!("{e}");
                    }
                }
            }
        });
        replayer.run(ReceiverStream::new(row_receiver)).await;
    }

    let ledger = Arc::new(Ledger::new(store));

    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/cash-sessions", post(open_session))
        .route("/cash-sessions/:id/close", post(close_session))
        .route("/loans/disburse", post(disburse))
        .route("/loans/pay", post(pay));

    let app = Router::new()
        .nest("/api", api_routes)
        .route("/webhooks/mobile-money", post(mobile_money_webhook))
        .with_state(ledger);

    let addr = env::var("SFD_LEDGER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind server address");
    info!(addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .expect("server error");
}
