//! Credit pack catalog and purchase handlers.
//!
//! Purchases are asynchronous: checkout opens a gateway intent and the
//! credits land when the settlement webhook confirms the charge.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::api::doc::CREDIT_TAG;
use crate::api::dto::{
    CreditPackResponse, ErrorResponse, PurchaseCheckoutResponse, PurchasePackRequest,
    PurchaseResponse, UserQuery,
};
use crate::error::AppError;
use crate::state::AppState;

/// Creates credit pack routes.
///
/// Routes:
/// - GET /           - List active packs
/// - POST /purchase  - Start a pack purchase
/// - GET /purchases  - Purchase history for a member
pub fn credit_pack_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_packs))
        .route("/purchase", post(purchase_pack))
        .route("/purchases", get(list_purchases))
}

/// GET /api/credit-packs - List the active catalog
#[utoipa::path(
    get,
    path = "/credit-packs",
    responses(
        (status = 200, description = "Active credit packs", body = Vec<CreditPackResponse>)
    ),
    tag = CREDIT_TAG
)]
pub async fn list_packs(
    State(state): State<AppState>,
) -> Result<Json<Vec<CreditPackResponse>>, AppError> {
    let packs = state.services.credits.list_packs().await?;
    let responses: Vec<CreditPackResponse> =
        packs.into_iter().map(CreditPackResponse::from).collect();
    Ok(Json(responses))
}

/// POST /api/credit-packs/purchase - Start a pack purchase
///
/// Records the purchase as pending and returns the client secret the
/// payment page confirms. The credit grant happens at webhook settlement.
#[utoipa::path(
    post,
    path = "/credit-packs/purchase",
    request_body = PurchasePackRequest,
    responses(
        (status = 201, description = "Purchase started", body = PurchaseCheckoutResponse),
        (status = 400, description = "Pack is not purchasable", body = ErrorResponse),
        (status = 404, description = "Pack not found", body = ErrorResponse)
    ),
    tag = CREDIT_TAG
)]
pub async fn purchase_pack(
    State(state): State<AppState>,
    Json(payload): Json<PurchasePackRequest>,
) -> Result<(StatusCode, Json<PurchaseCheckoutResponse>), AppError> {
    let checkout = state
        .services
        .credits
        .purchase_pack(payload.user_id, payload.credit_pack_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(PurchaseCheckoutResponse::from(checkout)),
    ))
}

/// GET /api/credit-packs/purchases - Purchase history for a member
#[utoipa::path(
    get,
    path = "/credit-packs/purchases",
    params(UserQuery),
    responses(
        (status = 200, description = "Purchases for the member", body = Vec<PurchaseResponse>)
    ),
    tag = CREDIT_TAG
)]
pub async fn list_purchases(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<PurchaseResponse>>, AppError> {
    let purchases = state.services.credits.purchases(query.user_id).await?;
    let responses: Vec<PurchaseResponse> =
        purchases.into_iter().map(PurchaseResponse::from).collect();
    Ok(Json(responses))
}
