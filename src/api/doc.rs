use utoipa::OpenApi;

pub const BOOKING_TAG: &str = "Bookings";
pub const CREDIT_TAG: &str = "Credits";
pub const PAYOUT_TAG: &str = "Payouts";
pub const WEBHOOK_TAG: &str = "Webhooks";
pub const HEALTH_TAG: &str = "Health";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "StudioPay",
        description = "Credit ledger and payment settlement engine for class bookings",
    ),
    servers((url = "/api")),
    paths(
        crate::api::handlers::bookings::create_booking,
        crate::api::handlers::bookings::list_bookings,
        crate::api::handlers::bookings::get_booking,
        crate::api::handlers::bookings::cancel_booking,
        crate::api::handlers::credit_packs::list_packs,
        crate::api::handlers::credit_packs::purchase_pack,
        crate::api::handlers::credit_packs::list_purchases,
        crate::api::handlers::credits::get_balance,
        crate::api::handlers::credits::list_transactions,
        crate::api::handlers::credits::audit_balance,
        crate::api::handlers::payouts::list_payouts,
        crate::api::handlers::webhooks::receive_gateway_event,
        crate::api::handlers::health::health_check,
        crate::api::handlers::health::readiness_check,
        crate::api::handlers::health::liveness_check,
    ),
    components(
        schemas(
            crate::api::dto::ErrorResponse,
        )
    ),
    tags(
        (name = BOOKING_TAG, description = "Class booking and cancellation endpoints"),
        (name = CREDIT_TAG, description = "Credit balance, ledger and pack purchase endpoints"),
        (name = PAYOUT_TAG, description = "Instructor payout endpoints"),
        (name = WEBHOOK_TAG, description = "Payment gateway webhook endpoints"),
        (name = HEALTH_TAG, description = "Health check endpoints"),
    )
)]
pub struct ApiDoc;
