//! Payment gateway adapter.
//!
//! `PaymentGateway` is the port the booking, purchase and payout flows call;
//! `HttpGateway` talks to the real provider and `MockGateway` settles
//! in-process for tests and development. Transient failures are retried
//! through `with_retries` before they surface.

pub mod client;
mod http;
mod mock;
mod provider;
pub mod retry;
pub mod signature;
pub mod types;

pub use http::HttpGateway;
pub use mock::MockGateway;
pub use provider::PaymentGateway;
pub use retry::{RetryPolicy, with_retries};
pub use types::{
    ChargeRequest, GatewayError, GatewayEvent, GatewayRefund, GatewayTransfer, PaymentIntent,
    TransferRequest,
};
