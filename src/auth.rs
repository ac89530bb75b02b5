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

/// Authenticated caller identity, available to handlers via request extensions.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub name: String,
    pub role: String,
}

impl CallerIdentity {
    /// Mutating endpoints are limited to admin keys.
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
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

fn lookup_key<'a>(config: &'a AuthConfig, presented: &str) -> Option<&'a ApiKeyEntry> {
    config
        .api_keys
        .iter()
        .find(|entry| entry.key.as_bytes().ct_eq(presented.as_bytes()).into())
}

pub async fn auth_middleware<B>(
    Extension(config): Extension<Arc<AuthConfig>>,
    mut req: Request<B>,
    next: Next<B>,
) -> Response {
    // Liveness probes stay open.
    if req.uri().path() == "/health" {
        return next.run(req).await;
    }

    if !config.enabled {
        req.extensions_mut().insert(CallerIdentity {
            name: "anonymous".to_string(),
            role: "admin".to_string(),
        });
        return next.run(req).await;
    }

    let api_key = req
        .headers()
        .get("X-API-Key")
        .or_else(|| req.headers().get(header::AUTHORIZATION))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.strip_prefix("Bearer ").unwrap_or(s));

    let key = match api_key {
        Some(key) => key,
        None => {
            return unauthorized(
                "Missing API key. Provide X-API-Key header or Authorization: Bearer <key>",
            )
        }
    };

    match lookup_key(&config, key) {
        Some(entry) => {
            tracing::debug!(caller = %entry.name, role = %entry.role, "Authenticated request");
            req.extensions_mut().insert(CallerIdentity {
                name: entry.name.clone(),
                role: entry.role.clone(),
            });
            next.run(req).await
        }
        None => {
            tracing::warn!("Invalid API key presented");
            unauthorized("Invalid API key")
        }
    }
}
