use actix_web::{HttpResponse, ResponseError};
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    // Client errors
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    /// Feature exists but is switched off for this account (e.g. 2FA not enrolled).
    Disabled(String),
    /// Account or IP is in an active lockout window. Carries a Retry-After in seconds.
    LockedOut(u64),
    /// A downstream capability (OAuth provider, WebAuthn RP config) isn't configured.
    NotConfigured(String),

    // Server errors
    Internal(String),
    Database(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            Error::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Error::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            Error::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Error::Disabled(msg) => write!(f, "Disabled: {}", msg),
            Error::LockedOut(secs) => write!(f, "Locked out, retry after {}s", secs),
            Error::NotConfigured(msg) => write!(f, "Not configured: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
            Error::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        if let Error::LockedOut(secs) = self {
            return HttpResponse::TooManyRequests()
                .insert_header(("Retry-After", secs.to_string()))
                .json(serde_json::json!({
                    "error": {
                        "type": "locked_out",
                        "message": self.to_string()
                    }
                }));
        }

        let (status, error_type) = match self {
            Error::NotFound(_) => (actix_web::http::StatusCode::NOT_FOUND, "not_found"),
            Error::BadRequest(_) => (actix_web::http::StatusCode::BAD_REQUEST, "bad_request"),
            Error::Unauthorized(_) => (actix_web::http::StatusCode::UNAUTHORIZED, "unauthorized"),
            Error::Forbidden(_) => (actix_web::http::StatusCode::FORBIDDEN, "forbidden"),
            Error::Conflict(_) => (actix_web::http::StatusCode::CONFLICT, "conflict"),
            Error::Disabled(_) => (actix_web::http::StatusCode::FORBIDDEN, "disabled"),
            Error::NotConfigured(_) => (
                actix_web::http::StatusCode::SERVICE_UNAVAILABLE,
                "not_configured",
            ),
            Error::Internal(_) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
            ),
            Error::Database(_) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "database_error",
            ),
            Error::LockedOut(_) => unreachable!("handled above"),
        };

        HttpResponse::build(status).json(serde_json::json!({
            "error": {
                "type": error_type,
                "message": self.to_string()
            }
        }))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Record not found".to_string()),
            sqlx::Error::Database(e) => Error::Database(e.to_string()),
            _ => Error::Database(err.to_string()),
        }
    }
}

impl From<argon2::password_hash::Error> for Error {
    fn from(err: argon2::password_hash::Error) -> Self {
        Error::Internal(format!("Password hashing error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::MessageBody;

    #[test]
    fn test_locked_out_sets_retry_after() {
        let resp = Error::LockedOut(42).error_response();
        assert_eq!(resp.status(), actix_web::http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            resp.headers().get("Retry-After").unwrap().to_str().unwrap(),
            "42"
        );
    }

    #[test]
    fn test_disabled_is_forbidden() {
        let resp = Error::Disabled("2fa not enrolled".into()).error_response();
        assert_eq!(resp.status(), actix_web::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_not_configured_is_service_unavailable() {
        let resp = Error::NotConfigured("oauth provider".into()).error_response();
        assert_eq!(
            resp.status(),
            actix_web::http::StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_not_found_body_contains_message() {
        let resp = Error::NotFound("user".into()).error_response();
        let body = resp.into_body().try_into_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "not_found");
    }
}
