use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Error taxonomy for the admission-control core and its HTTP surface.
///
/// Store faults (`StoreUnavailable`) are internal: the daily quota and the
/// monthly ledger catch them and fail open, so they must never reach a client
/// as a 5xx. Credential failures deliberately share a generic message so a
/// caller cannot distinguish "unknown key" from "malformed key".
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("API key required")]
    CredentialMissing,

    #[error("Invalid API key")]
    CredentialInvalid,

    #[error("Rotation not available for demo key")]
    RotationForbidden,

    #[error("Too many requests, please try again later")]
    WindowLimitExceeded,

    #[error("Daily key rate limit exceeded")]
    DailyQuotaExceeded,

    #[error("Monthly search limit exceeded")]
    MonthlyEntitlementExceeded,

    #[error("counter store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Account not found")]
    UnknownIdentity,

    #[error("{0} already registered")]
    DuplicateAccount(String),

    #[error("{0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::CredentialMissing => StatusCode::UNAUTHORIZED,
            ApiError::CredentialInvalid => StatusCode::UNAUTHORIZED,
            ApiError::RotationForbidden => StatusCode::BAD_REQUEST,
            ApiError::WindowLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::DailyQuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::MonthlyEntitlementExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::UnknownIdentity => StatusCode::NOT_FOUND,
            ApiError::DuplicateAccount(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable detail string for the JSON error body.
    ///
    /// 5xx details are elided outside debug builds so internal faults are not
    /// leaked to callers.
    pub fn details(&self) -> String {
        match self {
            ApiError::CredentialMissing => {
                "Provide an API key in the X-API-Key header or the api_key query parameter"
                    .to_string()
            }
            ApiError::CredentialInvalid => "Key not found or inactive".to_string(),
            ApiError::RotationForbidden => {
                "Reserved keys cannot be rotated; sign up for your own key".to_string()
            }
            ApiError::WindowLimitExceeded => {
                "Per-address hourly request ceiling reached".to_string()
            }
            ApiError::DailyQuotaExceeded => {
                "Daily request ceiling reached for this API key".to_string()
            }
            ApiError::MonthlyEntitlementExceeded => {
                "Monthly plan allowance exhausted".to_string()
            }
            ApiError::UnknownIdentity => "No account matches this key".to_string(),
            ApiError::DuplicateAccount(field) => format!("Conflicting field: {}", field),
            ApiError::Validation(msg) => msg.clone(),
            ApiError::StoreUnavailable(_)
            | ApiError::Config(_)
            | ApiError::Internal(_)
            | ApiError::Io(_) => {
                if cfg!(debug_assertions) {
                    self.to_string()
                } else {
                    "Something went wrong".to_string()
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "details": self.details(),
        }));

        (status, body).into_response()
    }
}
