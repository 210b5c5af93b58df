//! Instructor payout handlers.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::api::doc::PAYOUT_TAG;
use crate::api::dto::{PayoutQuery, PayoutResponse};
use crate::error::AppError;
use crate::state::AppState;

/// Creates payout routes.
///
/// Routes:
/// - GET / - List payouts for an instructor
pub fn payout_routes() -> Router<AppState> {
    Router::new().route("/", get(list_payouts))
}

/// GET /api/payouts - List payouts for an instructor, newest first
#[utoipa::path(
    get,
    path = "/payouts",
    params(PayoutQuery),
    responses(
        (status = 200, description = "Payouts for the instructor", body = Vec<PayoutResponse>)
    ),
    tag = PAYOUT_TAG
)]
pub async fn list_payouts(
    State(state): State<AppState>,
    Query(query): Query<PayoutQuery>,
) -> Result<Json<Vec<PayoutResponse>>, AppError> {
    let payouts = state
        .services
        .payouts
        .list_for_instructor(query.instructor_id)
        .await?;
    let responses: Vec<PayoutResponse> = payouts.into_iter().map(PayoutResponse::from).collect();
    Ok(Json(responses))
}
