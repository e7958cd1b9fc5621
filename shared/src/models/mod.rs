//! Data models
//!
//! Entities persisted by the ajo server plus the request/response payloads
//! exchanged with clients. Status enums round-trip through the database as
//! lowercase strings via `from_db` / `as_db`. Pool and proposal ids are
//! snowflake `i64`s; users are identified by the auth provider's string id.

pub mod contribution;
pub mod member;
pub mod payout;
pub mod penalty;
pub mod pool;
pub mod proposal;
pub mod settlement;
pub mod user;

// Re-exports
pub use contribution::*;
pub use member::*;
pub use payout::*;
pub use penalty::*;
pub use pool::*;
pub use proposal::*;
pub use settlement::*;
pub use user::*;
