//! Caller identity extraction from gateway headers.
//!
//! Authentication happens upstream; the gateway forwards the verified
//! identity as `X-User-Id` / `X-User-Role` / `X-Branch-Id` headers.
//! Endpoints that need an identity reject requests without one (401) and
//! requests with a malformed one (400).

use std::str::FromStr;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use focal_core::{RecipientScope, Role};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";
pub const BRANCH_ID_HEADER: &str = "x-branch-id";

/// The authenticated caller, as asserted by the upstream gateway.
#[derive(Debug, Clone, Copy)]
pub struct CallerIdentity {
    pub user_id: i64,
    pub role: Role,
    pub branch_id: Option<i64>,
}

impl CallerIdentity {
    /// Visibility scope for repository queries.
    pub fn scope(&self) -> RecipientScope {
        RecipientScope {
            user_id: self.user_id,
            role: self.role,
            branch_id: self.branch_id,
        }
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("{} header is not valid UTF-8", name))),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_str(parts, USER_ID_HEADER)?
            .ok_or_else(|| ApiError::Unauthorized("missing X-User-Id header".to_string()))?
            .parse::<i64>()
            .map_err(|_| ApiError::BadRequest("X-User-Id must be an integer".to_string()))?;

        let role = header_str(parts, ROLE_HEADER)?
            .ok_or_else(|| ApiError::Unauthorized("missing X-User-Role header".to_string()))
            .and_then(|raw| {
                Role::from_str(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
            })?;

        let branch_id = header_str(parts, BRANCH_ID_HEADER)?
            .map(|raw| {
                raw.parse::<i64>()
                    .map_err(|_| ApiError::BadRequest("X-Branch-Id must be an integer".to_string()))
            })
            .transpose()?;

        Ok(CallerIdentity {
            user_id,
            role,
            branch_id,
        })
    }
}
