//! Request identity.
//!
//! Authentication happens upstream; the gateway forwards the verified identity
//! in `x-actor-id`, `x-actor-name` and `x-actor-role` headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use domain::{Actor, Role};

use crate::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// The authenticated caller. Rejects with 401 when no identity is present.
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| std::str::from_utf8(value.as_bytes()).ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentActor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, ACTOR_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {ACTOR_ID_HEADER} header")))?;

        let role = match header(parts, ACTOR_ROLE_HEADER) {
            Some(raw) => Role::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown role: {raw}")))?,
            None => Role::Buyer,
        };
        let name = header(parts, ACTOR_NAME_HEADER).unwrap_or(id);

        Ok(CurrentActor(Actor::new(id, name, role)))
    }
}
