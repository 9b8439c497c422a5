//! Unified Error Handling
//!
//! Application-wide error type and response envelope:
//! - [`AppError`] - application error enum
//! - [`AppResponse`] - API response structure
//!
//! # Error code scheme
//!
//! | Prefix | Category | Example |
//! |--------|----------|---------|
//! | E0xxx  | Generic request errors | E0002 validation failed |
//! | E4xxx  | Loyalty conflicts | E4004 code already used |
//! | E9xxx  | System errors | E9002 database error |

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::db::repository::RepoError;
use crate::loyalty::LoyaltyError;

/// Unified API response envelope
///
/// ```json
/// {
///   "code": "E0000",
///   "message": "Success",
///   "data": { ... }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct AppResponse<T> {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Application-level error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ========== Generic Request Errors (4xx) ==========
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    // ========== Loyalty Conflicts (4xx) ==========
    #[error("Per-user limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Emission closed: {0}")]
    EmissionClosed(String),

    #[error("Instance already completed: {0}")]
    InstanceCompleted(String),

    #[error("Code already used: {0}")]
    CodeAlreadyUsed(String),

    #[error("Code expired: {0}")]
    CodeExpired(String),

    #[error("Rule not satisfied: {0}")]
    RuleNotSatisfied(String),

    // ========== System Errors (5xx) ==========
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Not found (404)
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "E0003", msg.as_str()),

            // Conflict (409)
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "E0004", msg.as_str()),

            // Validation (400)
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "E0002", msg.as_str()),

            // Business rule (422)
            AppError::BusinessRule(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "E0005", msg.as_str())
            }

            // Invalid request (400)
            AppError::Invalid(msg) => (StatusCode::BAD_REQUEST, "E0006", msg.as_str()),

            // Loyalty conflicts: retry-safe with fresh input (409/410/422)
            AppError::LimitExceeded(msg) => (StatusCode::CONFLICT, "E4001", msg.as_str()),
            AppError::EmissionClosed(msg) => (StatusCode::CONFLICT, "E4002", msg.as_str()),
            AppError::InstanceCompleted(msg) => (StatusCode::CONFLICT, "E4003", msg.as_str()),
            AppError::CodeAlreadyUsed(msg) => (StatusCode::CONFLICT, "E4004", msg.as_str()),
            AppError::CodeExpired(msg) => (StatusCode::GONE, "E4005", msg.as_str()),
            AppError::RuleNotSatisfied(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "E4006", msg.as_str())
            }

            // Database errors (500)
            AppError::Database(msg) => {
                error!(target: "database", error = %msg, "Database error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "E9002", "Database error")
            }

            // Internal errors (500)
            AppError::Internal(msg) => {
                error!(target: "internal", error = %msg, "Internal error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "E9001",
                    "Internal server error",
                )
            }
        };

        let body = Json(AppResponse::<()> {
            code: code.to_string(),
            message: message.to_string(),
            data: None,
        });

        (status, body).into_response()
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(msg) => AppError::NotFound(msg),
            RepoError::Duplicate(msg) => AppError::Conflict(msg),
            RepoError::Conflict(msg) => AppError::Conflict(msg),
            RepoError::Validation(msg) => AppError::Validation(msg),
            RepoError::Database(msg) => AppError::Database(msg),
        }
    }
}

impl From<LoyaltyError> for AppError {
    fn from(err: LoyaltyError) -> Self {
        match err {
            LoyaltyError::TemplateNotFound(id) => {
                AppError::NotFound(format!("Template {id} not found"))
            }
            LoyaltyError::InstanceNotFound(id) => {
                AppError::NotFound(format!("Card instance {id} not found"))
            }
            LoyaltyError::RewardNotFound(id) => {
                AppError::NotFound(format!("Reward link {id} not found"))
            }
            LoyaltyError::CodeNotFound => AppError::NotFound("Code not found".into()),
            LoyaltyError::LimitExceeded(msg) => AppError::LimitExceeded(msg),
            LoyaltyError::EmissionClosed(msg) => AppError::EmissionClosed(msg),
            LoyaltyError::InstanceCompleted(id) => {
                AppError::InstanceCompleted(format!("Card instance {id} is already complete"))
            }
            LoyaltyError::CodeExpired => AppError::CodeExpired("Code expired".into()),
            LoyaltyError::CodeAlreadyUsed => AppError::CodeAlreadyUsed("Code already used".into()),
            LoyaltyError::RewardAlreadyUsed(id) => {
                AppError::CodeAlreadyUsed(format!("Reward {id} already redeemed"))
            }
            LoyaltyError::RuleNotSatisfied(msg) => AppError::RuleNotSatisfied(msg),
            LoyaltyError::RewardNotReached(msg) => AppError::BusinessRule(msg),
            LoyaltyError::Validation(msg) => AppError::Validation(msg),
            LoyaltyError::Conflict(msg) => AppError::Conflict(msg),
            LoyaltyError::Repo(e) => AppError::from(e),
        }
    }
}

// ========== Helper functions ==========

/// Create a successful response
pub fn ok<T: Serialize>(data: T) -> Json<AppResponse<T>> {
    Json(AppResponse {
        code: "E0000".to_string(),
        message: "Success".to_string(),
        data: Some(data),
    })
}

/// Create a successful response with custom message
pub fn ok_with_message<T: Serialize>(data: T, message: impl Into<String>) -> Json<AppResponse<T>> {
    Json(AppResponse {
        code: "E0000".to_string(),
        message: message.into(),
        data: Some(data),
    })
}
