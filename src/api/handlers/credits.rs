//! Credit balance and ledger handlers.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use validator::Validate;

use crate::api::doc::CREDIT_TAG;
use crate::api::dto::{
    AuditResponse, BalanceResponse, TransactionQuery, TransactionResponse, UserQuery,
};
use crate::error::AppError;
use crate::state::AppState;

/// Creates credit ledger routes.
///
/// Routes:
/// - GET /balance      - Materialized balance for a member
/// - GET /transactions - Paged ledger history
/// - GET /audit        - Materialized vs replayed balance
pub fn credit_routes() -> Router<AppState> {
    Router::new()
        .route("/balance", get(get_balance))
        .route("/transactions", get(list_transactions))
        .route("/audit", get(audit_balance))
}

/// GET /api/credits/balance - Materialized balance for a member
///
/// Members without ledger activity report zeroes rather than 404.
#[utoipa::path(
    get,
    path = "/credits/balance",
    params(UserQuery),
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse)
    ),
    tag = CREDIT_TAG
)]
pub async fn get_balance(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state.services.credits.balance(query.user_id).await?;
    Ok(Json(BalanceResponse::from(balance)))
}

/// GET /api/credits/transactions - Paged ledger history, newest first
#[utoipa::path(
    get,
    path = "/credits/transactions",
    params(TransactionQuery),
    responses(
        (status = 200, description = "One page of ledger history", body = Vec<TransactionResponse>)
    ),
    tag = CREDIT_TAG
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<TransactionResponse>>, AppError> {
    query.validate()?;
    let transactions = state
        .services
        .credits
        .transactions(query.user_id, query.page, query.page_size)
        .await?;
    let responses: Vec<TransactionResponse> = transactions
        .into_iter()
        .map(TransactionResponse::from)
        .collect();
    Ok(Json(responses))
}

/// GET /api/credits/audit - Replay the ledger and compare balances
///
/// Drift between the materialized balance and the replayed log means a
/// bug or manual tampering; the mismatch is logged server-side.
#[utoipa::path(
    get,
    path = "/credits/audit",
    params(UserQuery),
    responses(
        (status = 200, description = "Audit result", body = AuditResponse)
    ),
    tag = CREDIT_TAG
)]
pub async fn audit_balance(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<AuditResponse>, AppError> {
    let audit = state.services.credits.audit(query.user_id).await?;
    Ok(Json(AuditResponse::from(audit)))
}
