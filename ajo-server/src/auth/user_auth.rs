//! User JWT authentication

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};

use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// JWT claims for API callers
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Wallet address the user signs transfers with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<String>,
    #[serde(default)]
    pub role: Role,
    /// Expiration (Unix timestamp seconds)
    pub exp: usize,
    /// Issued at (Unix timestamp seconds)
    pub iat: usize,
}

/// Authenticated caller extracted from JWT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub wallet_address: Option<String>,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Identity on routes that also serve anonymous callers
#[derive(Debug, Clone, Default)]
pub struct Caller(pub Option<Identity>);

impl Caller {
    pub fn user_id(&self) -> Option<&str> {
        self.0.as_ref().map(|i| i.user_id.as_str())
    }
}

const JWT_EXPIRY_HOURS: i64 = 24;

/// Create a JWT token for a user or admin service
pub fn create_token(
    user_id: &str,
    wallet: Option<&str>,
    role: Role,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        wallet: wallet.map(str::to_string),
        role,
        exp: (now + chrono::Duration::hours(JWT_EXPIRY_HOURS)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify a bearer token and return the caller it names
pub fn decode_identity(token: &str, secret: &str) -> Result<Identity, AppError> {
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("JWT validation failed: {e}");
        match e.kind() {
            ErrorKind::ExpiredSignature => AppError::new(ErrorCode::TokenExpired),
            _ => AppError::new(ErrorCode::TokenInvalid),
        }
    })?;

    let claims = token_data.claims;
    if claims.sub.trim().is_empty() {
        return Err(AppError::new(ErrorCode::TokenInvalid));
    }
    Ok(Identity {
        user_id: claims.sub,
        wallet_address: claims.wallet.filter(|w| !w.is_empty()),
        role: claims.role,
    })
}

fn bearer_token(request: &Request) -> Result<Option<&str>, AppError> {
    let Some(header) = request.headers().get(http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let token = header
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::with_message(ErrorCode::TokenInvalid, "Invalid Authorization format")
        })?;
    Ok(Some(token))
}

/// Middleware that requires a valid token and inserts its [`Identity`]
pub async fn user_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let identity = match bearer_token(&request) {
        Ok(Some(token)) => decode_identity(token, &state.jwt_secret),
        Ok(None) => Err(AppError::with_message(
            ErrorCode::NotAuthenticated,
            "Missing Authorization header",
        )),
        Err(e) => Err(e),
    }
    .map_err(IntoResponse::into_response)?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Like [`user_auth_middleware`] but lets anonymous requests through as `Caller(None)`.
/// A token that is present must still be valid.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let caller = match bearer_token(&request).map_err(IntoResponse::into_response)? {
        Some(token) => Caller(Some(
            decode_identity(token, &state.jwt_secret).map_err(IntoResponse::into_response)?,
        )),
        None => Caller(None),
    };

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

/// Runs after [`user_auth_middleware`]; rejects non-admin identities
pub async fn admin_middleware(request: Request, next: Next) -> Result<Response, Response> {
    let is_admin = request
        .extensions()
        .get::<Identity>()
        .is_some_and(Identity::is_admin);
    if !is_admin {
        return Err(AppError::new(ErrorCode::AdminRequired).into_response());
    }
    Ok(next.run(request).await)
}
