use core::str::FromStr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use sitebook_ai::AiError;
use sitebook_auth::AuthzError;
use sitebook_core::DomainError;
use sitebook_infra::command_dispatcher::DispatchError;

/// Handlers return `Ok(response)` or an already-rendered error response.
pub type ApiResult = Result<Response, Response>;

pub fn dispatch_error_to_response(err: DispatchError) -> Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "concurrency_conflict", msg),
        DispatchError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::Unauthorized => json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden"),
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::TenantIsolation(msg) => json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg),
        DispatchError::Deserialize(msg) => {
            tracing::error!(error = %msg, "stored event failed to deserialize");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => {
            tracing::error!(error = %e, "event store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

pub fn authz_error_to_response(err: AuthzError) -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn ai_error_to_response(err: AiError) -> Response {
    match err {
        AiError::InvalidInput(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        AiError::InferenceFailed(msg) | AiError::InvalidOutput(msg) => {
            json_error(StatusCode::BAD_GATEWAY, "insights_unavailable", msg)
        }
    }
}

pub fn not_found(what: &str) -> Response {
    json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
}

pub fn validation(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

pub fn invariant(message: impl Into<String>) -> Response {
    json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", message)
}

/// Parse a path or body identifier, answering 400 when malformed.
pub fn parse_id<T>(raw: &str) -> Result<T, Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse::<T>().map_err(|e| validation(e.to_string()))
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
