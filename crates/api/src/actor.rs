//! Caller identity resolved by the upstream authentication layer.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use domain::Role;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller of a request.
///
/// A missing role header means an ordinary customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

fn header<'a>(parts: &'a Parts, name: &'static str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map(str::trim)
                .map_err(|_| ApiError::Unauthorized(format!("{name} is not valid text")))
        })
        .transpose()
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)?
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
        let user_id = UserId::parse(user_id)
            .map_err(|e| ApiError::Unauthorized(format!("invalid {USER_ID_HEADER}: {e}")))?;

        let role = match header(parts, USER_ROLE_HEADER)? {
            Some(role) => role.parse().map_err(ApiError::Unauthorized)?,
            None => Role::default(),
        };

        Ok(Actor { user_id, role })
    }
}
