//! ajo-server: rotating savings pools settled on Solana
//!
//! Members of a pool contribute a fixed amount every period and one member
//! per cycle receives the pot, in position order. The server keeps the
//! ledger; transfers happen on chain and are only recorded after the
//! payment rail confirms them.
//!
//! - [`lifecycle`]: pool state machine (create, join, contribute, payout)
//! - [`governance`]: member proposals and votes
//! - [`settlement`]: payment-rail adapter
//! - [`store`]: PostgreSQL and in-memory ledgers
//! - [`api`]: HTTP routes

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod governance;
pub mod lifecycle;
pub mod maintenance;
pub mod reconcile;
pub mod settlement;
pub mod state;
pub mod store;
pub mod validation;

pub use config::Config;
pub use state::AppState;
