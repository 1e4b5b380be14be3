//! Error handling for the Warehouse Fulfillment Platform
//!
//! One taxonomy for the whole service: caller-fixable validation errors,
//! detected races, domain conflicts and fatal consistency violations all
//! map to distinct codes and status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Caller-fixable input problems
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Workflow preconditions
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    // Domain-legal but blocked (terminal order, over-validation, ...)
    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    // Race detected between availability snapshot and commit; caller retries
    #[error("Stale availability: {0}")]
    StaleAvailability(String),

    // Ledger drift, orphaned units, missing sub-workflows: abort and roll back
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<shared::IllegalTransition> for AppError {
    fn from(err: shared::IllegalTransition) -> Self {
        AppError::InvalidStateTransition(err.to_string())
    }
}

impl From<shared::NegativeBucket> for AppError {
    fn from(err: shared::NegativeBucket) -> Self {
        AppError::ConsistencyViolation(err.to_string())
    }
}

impl From<shared::LedgerImbalance> for AppError {
    fn from(err: shared::LedgerImbalance) -> Self {
        AppError::ConsistencyViolation(err.to_string())
    }
}

impl From<shared::SplitError> for AppError {
    fn from(err: shared::SplitError) -> Self {
        match err {
            shared::SplitError::OverPicked { .. } => AppError::Conflict {
                resource: "order".to_string(),
                message: err.to_string(),
            },
            _ => AppError::ValidationError(err.to_string()),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message: message.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message: msg.clone(),
                    field: None,
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    code: "NOT_FOUND".to_string(),
                    message: format!("{} not found", resource),
                    field: None,
                },
            ),
            AppError::InvalidStateTransition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "INVALID_STATE_TRANSITION".to_string(),
                    message: msg.clone(),
                    field: None,
                },
            ),
            AppError::Conflict { resource, message } => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "CONFLICT".to_string(),
                    message: message.clone(),
                    field: Some(resource.clone()),
                },
            ),
            AppError::StaleAvailability(msg) => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "STALE_AVAILABILITY".to_string(),
                    message: format!("Availability changed during allocation, retry: {}", msg),
                    field: None,
                },
            ),
            AppError::ConsistencyViolation(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "CONSISTENCY_VIOLATION".to_string(),
                    message: msg.clone(),
                    field: None,
                },
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "DATABASE_ERROR".to_string(),
                    message: "A database error occurred".to_string(),
                    field: None,
                },
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: msg.clone(),
                    field: None,
                },
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred".to_string(),
                    field: None,
                },
            ),
        };

        match &self {
            AppError::ConsistencyViolation(_) | AppError::DatabaseError(_) => {
                tracing::error!("Error: {:?}", self)
            }
            _ => tracing::warn!("Error: {:?}", self),
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers and services
pub type AppResult<T> = Result<T, AppError>;
