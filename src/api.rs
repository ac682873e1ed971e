use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use caja_core::{
    text::str_to_date, CreateExpenseCommand, CreateReceiptCommand, InsertMovementCommand,
    LedgerError,
};

use crate::{
    auth::{auth_middleware, CallerIdentity},
    config::AuthConfig,
    Caja,
};

const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub caja: Arc<Caja>,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { success: true, data })
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn forbidden(what: &str) -> Self {
        Self::new(StatusCode::FORBIDDEN, format!("{} requires the admin role", what))
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let status = match &e {
            LedgerError::NotFound(_) | LedgerError::NothingToVoid => StatusCode::NOT_FOUND,
            LedgerError::Conflict(_) | LedgerError::SequenceIntegrity(_) => StatusCode::CONFLICT,
            LedgerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::Persistence(_) => {
                tracing::error!(error = %e, "Storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                success: false,
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Runs a ledger call on the blocking pool; every backend does synchronous I/O.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, LedgerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("task failed: {}", e)))?
        .map_err(ApiError::from)
}

fn parse_date(s: &str) -> Result<Date, ApiError> {
    str_to_date(s).map_err(|_| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, format!("invalid date '{}', expected YYYY-MM-DD", s)))
}

pub fn router(state: AppState, auth: Arc<AuthConfig>) -> Router {
    let protected = Router::new()
        .route("/registers", post(open_register))
        .route("/registers/auto-close", post(auto_close))
        .route("/registers/:date/close", post(close_register))
        .route("/registers/:date/reopen", post(reopen_register))
        .route("/registers/:date/summary", get(summary))
        .route("/registers/:date/movements", post(insert_movement))
        .route("/receipts", post(create_receipt))
        .route("/receipts/void-last", post(void_last_receipt))
        .route("/receipts/:id", delete(delete_receipt))
        .route("/expenses", post(create_expense))
        .route("/expenses/:id", delete(delete_expense).put(update_expense))
        .route("/session/start", post(session_start))
        .layer(middleware::from_fn(auth_middleware))
        .layer(Extension(auth));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .merge(protected)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

#[derive(Deserialize)]
struct OpenRegisterBody {
    #[serde(default)]
    date: Option<Date>,
    opening_balance: Decimal,
}

async fn open_register(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(body): Json<OpenRegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
    let register = blocking(move || {
        let date = body.date.unwrap_or_else(|| state.caja.ledger.clock().today());
        state.caja.ledger.open_register(date, body.opening_balance, &caller.actor)
    })
    .await?;
    Ok((StatusCode::CREATED, ok(register)))
}

#[derive(Deserialize, Default)]
struct CloseRegisterBody {
    #[serde(default)]
    closing_balance: Option<Decimal>,
}

async fn close_register(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(date): Path<String>,
    body: Option<Json<CloseRegisterBody>>,
) -> Result<impl IntoResponse, ApiError> {
    let date = parse_date(&date)?;
    let closing_override = body.map(|Json(b)| b).unwrap_or_default().closing_balance;
    if closing_override.is_some() && !caller.is_admin() {
        return Err(ApiError::forbidden("closing with an explicit balance"));
    }
    let register = blocking(move || state.caja.ledger.close_register(date, &caller.actor, closing_override)).await?;
    Ok(ok(register))
}

async fn reopen_register(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(date): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let date = parse_date(&date)?;
    let register = blocking(move || state.caja.ledger.reopen_register(date, &caller.actor)).await?;
    Ok(ok(register))
}

async fn auto_close(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let report = blocking(move || {
        let ledger = &state.caja.ledger;
        ledger.auto_close_stale(ledger.clock().today(), &ledger.options().system_actor)
    })
    .await?;
    Ok(ok(report))
}

async fn session_start(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<impl IntoResponse, ApiError> {
    let report = blocking(move || state.caja.ledger.on_session_start(&caller.actor)).await?;
    Ok(ok(report))
}

#[derive(Deserialize)]
struct SummaryQuery {
    page: Option<usize>,
    page_size: Option<usize>,
}

async fn summary(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Query(query): Query<SummaryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let date = parse_date(&date)?;
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    let summary = blocking(move || state.caja.ledger.summary(date, page, page_size)).await?;
    Ok(ok(summary))
}

async fn insert_movement(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(date): Path<String>,
    Json(command): Json<InsertMovementCommand>,
) -> Result<impl IntoResponse, ApiError> {
    let date = parse_date(&date)?;
    let movement = blocking(move || state.caja.ledger.insert_movement(date, &command, &caller.actor)).await?;
    Ok((StatusCode::CREATED, ok(movement)))
}

async fn create_receipt(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(command): Json<CreateReceiptCommand>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = blocking(move || state.caja.receipts.create(&command, &caller.actor)).await?;
    Ok((StatusCode::CREATED, ok(receipt)))
}

async fn void_last_receipt(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<impl IntoResponse, ApiError> {
    let voided = blocking(move || state.caja.receipts.void_last(&caller.actor)).await?;
    Ok(ok(voided))
}

async fn delete_receipt(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if !caller.is_admin() {
        return Err(ApiError::forbidden("deleting a receipt"));
    }
    let deleted = blocking(move || state.caja.receipts.delete(id, &caller.actor)).await?;
    Ok(ok(deleted))
}

async fn create_expense(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(command): Json<CreateExpenseCommand>,
) -> Result<impl IntoResponse, ApiError> {
    let expense = blocking(move || state.caja.expenses.create(&command, &caller.actor)).await?;
    Ok((StatusCode::CREATED, ok(expense)))
}

#[derive(Deserialize)]
struct UpdateExpenseBody {
    amount: Decimal,
}

async fn update_expense(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateExpenseBody>,
) -> Result<impl IntoResponse, ApiError> {
    let update = blocking(move || state.caja.expenses.update_amount(id, body.amount, &caller.actor)).await?;
    Ok(ok(update))
}

async fn delete_expense(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let expense = blocking(move || state.caja.expenses.delete(id, &caller.actor)).await?;
    Ok(ok(expense))
}

#[cfg(test)]
mod tests {
    use super::*;
    use caja_core::ConflictError;
    use time::macros::date;

    #[test]
    fn ledger_errors_map_to_status_codes() {
        let cases = [
            (LedgerError::NothingToVoid, StatusCode::NOT_FOUND),
            (LedgerError::NotFound("register".into()), StatusCode::NOT_FOUND),
            (ConflictError::AlreadyClosed(date!(2024 - 03 - 01)).into(), StatusCode::CONFLICT),
            (LedgerError::SequenceIntegrity("x".into()), StatusCode::CONFLICT),
            (LedgerError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status, status);
        }
    }

    #[test]
    fn bad_dates_are_rejected() {
        assert!(parse_date("2024-03-01").is_ok());
        assert_eq!(parse_date("01/03/2024").unwrap_err().status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
