use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::errors::LedgerError;

/// Minimum required key length (256 bits = 32 bytes)
pub const MIN_KEY_LENGTH: usize = 32;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("API_KEYS environment variable is not set")]
    MissingKeys,

    #[error("API key must be at least 32 characters long (found length {0})")]
    WeakKey(usize),

    #[error("No valid API keys found in API_KEYS")]
    NoKeys,
}

/// Accepted bearer keys
#[derive(Debug, Clone)]
pub struct ApiKeys {
    keys: Arc<HashSet<String>>,
}

impl ApiKeys {
    /// Load keys from the comma-separated `API_KEYS` variable.
    ///
    /// Refuses to start without at least one key of [`MIN_KEY_LENGTH`]
    /// characters, so the service never runs unauthenticated.
    pub fn from_env() -> Result<Self, AuthError> {
        let raw = std::env::var("API_KEYS").map_err(|_| AuthError::MissingKeys)?;
        let keys = Self::parse(&raw)?;
        tracing::info!("✓ API authentication initialized with {} valid key(s)", keys.len());
        Ok(keys)
    }

    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let mut keys = HashSet::new();

        for key in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            if key.len() < MIN_KEY_LENGTH {
                tracing::error!(
                    "SECURITY ERROR: API key is too weak (length: {}, minimum: {})",
                    key.len(),
                    MIN_KEY_LENGTH
                );
                return Err(AuthError::WeakKey(key.len()));
            }
            keys.insert(key.to_string());
        }

        if keys.is_empty() {
            return Err(AuthError::NoKeys);
        }

        Ok(Self {
            keys: Arc::new(keys),
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn is_valid(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

/// Middleware to require a valid bearer key on protected endpoints
pub async fn require_api_key(
    State(keys): State<ApiKeys>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    match auth_header.and_then(|auth| auth.strip_prefix("Bearer ")) {
        Some(key) if keys.is_valid(key) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!("Invalid API key attempted");
            Err(StatusCode::UNAUTHORIZED)
        }
        None if auth_header.is_some() => {
            tracing::warn!("Invalid Authorization header format (expected Bearer token)");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("Missing Authorization header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

/// Caller identity, resolved per request from the identity headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: String,
    pub role: Role,
}

impl RequestContext {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::User,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owners see their own challenges; admins see everything.
    pub fn can_access(&self, owner_id: &str) -> bool {
        self.is_admin() || self.user_id == owner_id
    }

    pub fn require_admin(&self) -> Result<(), LedgerError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(LedgerError::Forbidden("admin role required".to_string()))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                tracing::warn!("Request without {} header", USER_ID_HEADER);
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({
                        "kind": "unauthorized",
                        "error": "Missing X-User-Id header",
                    })),
                )
                    .into_response()
            })?;

        let role = match parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            Some(role) if role.trim().eq_ignore_ascii_case("admin") => Role::Admin,
            _ => Role::User,
        };

        Ok(Self {
            user_id: user_id.to_string(),
            role,
        })
    }
}
