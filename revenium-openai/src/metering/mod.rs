//! Metering: event construction, delivery and background dispatch.

mod delivery;
mod dispatcher;
mod payload;
mod tracker;

pub use delivery::{MeteringClient, RetryPolicy, USER_AGENT};
pub use dispatcher::MeteringDispatcher;
pub use payload::{CallInfo, FirstToken, MIDDLEWARE_SOURCE, MeteringEvent, transaction_id};
pub use tracker::DeliveryTracker;
