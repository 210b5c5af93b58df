//! Domain entities for the credit ledger and payment settlement engine.
//!
//! Status enums are shared with the Postgres backend (stored as lowercase
//! text); the row structs that diesel maps live with that backend.

mod booking;
mod class_session;
mod credit_pack;
mod credits;
mod gateway_event;
mod payment;
mod payout;

pub use booking::{Booking, BookingStatus, NewBooking, PaymentMethod};
pub use class_session::{ClassSession, NewClassSession};
pub use credit_pack::{CreditPack, CreditPackPurchase, NewCreditPackPurchase, PurchaseStatus};
pub use credits::{
    CreditBalance, CreditTransaction, CreditTransactionKind, LedgerEntry, LedgerReference,
};
pub use gateway_event::{GatewayEventRecord, NewGatewayEventRecord};
pub use payment::{NewPaymentRecord, PaymentRecord, PaymentStatus};
pub use payout::{InstructorPayout, NewInstructorPayout, PayoutStatus};
