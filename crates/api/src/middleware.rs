use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::debug;

use sitebook_auth::JwtValidator;

use crate::app::errors;
use crate::context::{PrincipalContext, TenantContext};

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Resolve the bearer token into tenant and principal context.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer(req.headers()) {
        Ok(token) => token,
        Err(message) => return errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", message),
    };

    let claims = match state.jwt.validate(token, Utc::now()) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "rejected bearer token");
            return errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "invalid or expired token");
        }
    };

    req.extensions_mut().insert(TenantContext::new(claims.tenant_id));
    req.extensions_mut()
        .insert(PrincipalContext::new(claims.sub, claims.roles.clone()));

    next.run(req).await.into_response()
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, &'static str> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or("missing Authorization header")?;

    let header = header.to_str().map_err(|_| "malformed Authorization header")?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or("Authorization header must use the Bearer scheme")?
        .trim();

    if token.is_empty() {
        return Err("empty bearer token");
    }

    Ok(token)
}
