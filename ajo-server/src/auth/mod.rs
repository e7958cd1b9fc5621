//! Authentication for the ajo API
//!
//! Callers present an HS256 bearer token. User tokens identify a member by
//! the auth provider's id and optionally carry their wallet address; admin
//! service tokens carry `role: admin` and unlock the `/api/admin` routes.

pub mod user_auth;

pub use user_auth::{
    Caller, Claims, Identity, Role, admin_middleware, create_token, optional_auth_middleware,
    user_auth_middleware,
};
