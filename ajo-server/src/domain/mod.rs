//! Pure domain rules: scheduling, fees, access control, premium limits

pub mod access;
mod aggregate;
pub mod clock;
pub mod fees;
pub mod premium;
pub mod schedule;
pub mod slug;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregate::PoolAggregate;
pub use clock::{Clock, FixedClock, SystemClock};
pub use schedule::PayoutAnchor;
