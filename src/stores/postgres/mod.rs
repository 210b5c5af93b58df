//! PostgreSQL backend for the storage ports.
//!
//! Hot counters (credit balances, seat counts) and state machines move only
//! through conditional `UPDATE … RETURNING` statements, so concurrent
//! requests serialize in the database rather than in application code.
//! Settlement operations run as single local transactions.

mod booking;
mod capacity;
mod ledger;
mod pack;
mod rows;
mod settlement;

pub use booking::PgBookingStore;
pub use capacity::PgCapacityStore;
pub use ledger::PgLedgerStore;
pub use pack::PgPackStore;
pub use settlement::PgSettlementStore;
