use std::sync::Arc;

use axum::{
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::config::{ApiKeyEntry, AuthConfig};
use caja_core::Actor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Cashier,
    Admin,
}

impl Role {
    fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::Cashier
        }
    }
}

/// Authenticated caller, available to handlers via request extensions.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub actor: Actor,
    pub role: Role,
}

impl CallerIdentity {
    fn from_entry(entry: &ApiKeyEntry) -> Self {
        let id = entry.user_id.as_deref().unwrap_or(&entry.name);
        Self {
            actor: Actor::new(id, entry.name.as_str()),
            role: Role::parse(&entry.role),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Serialize)]
struct AuthError {
    success: bool,
    error: String,
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(AuthError {
            success: false,
            error: message.to_string(),
        }),
    )
        .into_response()
}

pub async fn auth_middleware<B>(
    Extension(config): Extension<Arc<AuthConfig>>,
    mut req: Request<B>,
    next: Next<B>,
) -> Response {
    if !config.enabled {
        req.extensions_mut().insert(CallerIdentity {
            actor: Actor::new("anonymous", "anonymous"),
            role: Role::Admin,
        });
        return next.run(req).await;
    }

    let api_key = req
        .headers()
        .get("X-API-Key")
        .or_else(|| req.headers().get(header::AUTHORIZATION))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.strip_prefix("Bearer ").unwrap_or(s));

    let Some(key) = api_key else {
        return unauthorized("Missing API key. Provide X-API-Key header or Authorization: Bearer <key>");
    };

    match config
        .api_keys
        .iter()
        .find(|entry| entry.key.as_bytes().ct_eq(key.as_bytes()).into())
    {
        Some(entry) => {
            let caller = CallerIdentity::from_entry(entry);
            tracing::debug!(caller = %caller.actor, role = ?caller.role, "Authenticated request");
            req.extensions_mut().insert(caller);
            next.run(req).await
        }
        None => {
            tracing::warn!("Invalid API key presented");
            unauthorized("Invalid API key")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_defaults_to_name() {
        let entry = ApiKeyEntry {
            name: "Ana".to_string(),
            user_id: None,
            key: "k".to_string(),
            role: "ADMIN".to_string(),
        };
        let caller = CallerIdentity::from_entry(&entry);
        assert_eq!(caller.actor.id.as_ref(), "Ana");
        assert!(caller.is_admin());
    }

    #[test]
    fn unknown_roles_are_cashiers() {
        assert_eq!(Role::parse("reader"), Role::Cashier);
    }
}
