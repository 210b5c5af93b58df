//! Booking request handlers.
//!
//! Booking creation runs the full payment saga: seats are reserved,
//! payment is taken (or a gateway intent opened) and every step is
//! rolled back if a later one fails.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::api::doc::BOOKING_TAG;
use crate::api::dto::{
    BookingCreatedResponse, BookingListQuery, BookingResponse, CancelBookingRequest,
    CancellationResponse, CreateBookingRequest, ErrorResponse,
};
use crate::error::AppError;
use crate::state::AppState;

/// Creates booking-related routes.
///
/// Routes:
/// - GET /             - List a member's bookings
/// - POST /            - Create a booking
/// - GET /:id          - Get booking by ID
/// - POST /:id/cancel  - Cancel a confirmed booking
pub fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_bookings).post(create_booking))
        .route("/{id}", get(get_booking))
        .route("/{id}/cancel", post(cancel_booking))
}

/// POST /api/bookings - Create a booking
///
/// Credits bookings confirm synchronously; card and wallet bookings come
/// back pending with a client secret for the payment page.
#[utoipa::path(
    post,
    path = "/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking created", body = BookingCreatedResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 402, description = "Insufficient credits", body = ErrorResponse),
        (status = 409, description = "Class is full", body = ErrorResponse)
    ),
    tag = BOOKING_TAG
)]
pub async fn create_booking(
    State(state): State<AppState>,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingCreatedResponse>), AppError> {
    payload.validate()?;
    let confirmation = state
        .services
        .bookings
        .book(
            payload.user_id,
            payload.class_id,
            payload.attendee_count,
            payload.payment_method,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(BookingCreatedResponse::from(confirmation)),
    ))
}

/// GET /api/bookings - List a member's bookings, newest first
#[utoipa::path(
    get,
    path = "/bookings",
    params(BookingListQuery),
    responses(
        (status = 200, description = "Bookings for the member", body = Vec<BookingResponse>)
    ),
    tag = BOOKING_TAG
)]
pub async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<BookingListQuery>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    query.validate()?;
    let bookings = state
        .services
        .bookings
        .list_bookings(query.user_id, query.limit(), query.offset())
        .await?;
    let responses: Vec<BookingResponse> =
        bookings.into_iter().map(BookingResponse::from).collect();
    Ok(Json(responses))
}

/// GET /api/bookings/:id - Get booking by ID
#[utoipa::path(
    get,
    path = "/bookings/{id}",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking detail", body = BookingResponse),
        (status = 404, description = "Booking not found", body = ErrorResponse)
    ),
    tag = BOOKING_TAG
)]
pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.services.bookings.get_booking(id).await?;
    Ok(Json(BookingResponse::from(booking)))
}

/// POST /api/bookings/:id/cancel - Cancel a confirmed booking
///
/// Releases the seats and applies the policy refund: the full refund
/// share outside the cancellation window, pro-rated inside it, nothing
/// once the class started.
#[utoipa::path(
    post,
    path = "/bookings/{id}/cancel",
    params(("id" = Uuid, Path, description = "Booking ID")),
    request_body = CancelBookingRequest,
    responses(
        (status = 200, description = "Booking cancelled", body = CancellationResponse),
        (status = 400, description = "Booking is not cancellable", body = ErrorResponse),
        (status = 404, description = "Booking not found", body = ErrorResponse)
    ),
    tag = BOOKING_TAG
)]
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelBookingRequest>>,
) -> Result<Json<CancellationResponse>, AppError> {
    let request = payload.map(|Json(body)| body).unwrap_or_default();
    request.validate()?;
    let outcome = state
        .services
        .bookings
        .cancel_booking(id, request.reason)
        .await?;
    Ok(Json(CancellationResponse::from(outcome)))
}
