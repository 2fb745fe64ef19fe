use crate::db::errors::DbError;
use crate::payment_providers::PaymentError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Caller is authenticated but does not own the resource
    #[error("User does not own {resource} {id}")]
    NotOwner { resource: String, id: String },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Payment method string is not one of the supported gateways
    #[error("Unsupported payment method: {method}")]
    UnsupportedMethod { method: String },

    /// Gateway callback failed signature or checksum verification
    #[error("Invalid signature: {reason}")]
    InvalidSignature { reason: String },

    /// Upstream payment provider rejected or failed the request
    #[error("Payment provider error: {message}")]
    Provider { message: String },

    /// A known gateway that this deployment has no credentials for
    #[error("{feature} is not configured")]
    NotImplemented { feature: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::NotOwner { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } | Error::UnsupportedMethod { .. } | Error::InvalidSignature { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Provider { .. } => StatusCode::BAD_GATEWAY,
            Error::NotImplemented { .. } => StatusCode::NOT_IMPLEMENTED,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::NotOwner { resource, .. } => format!("You do not have access to this {resource}"),
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::UnsupportedMethod { method } => format!("Unsupported payment method: {method}"),
            Error::InvalidSignature { .. } => "Invalid signature".to_string(),
            Error::Provider { message } => format!("Payment provider error: {message}"),
            Error::NotImplemented { feature } => format!("{feature} is not available"),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { constraint, .. } => match constraint.as_deref() {
                    Some("payments_one_active_per_booking") => "A payment for this booking is already in progress".to_string(),
                    _ => "Resource already exists".to_string(),
                },
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Provider { .. } => {
                tracing::error!("Payment provider error: {}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::InvalidSignature { .. } => {
                tracing::warn!("Rejected gateway callback: {}", self);
            }
            Error::Unauthenticated { .. } | Error::NotOwner { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } | Error::UnsupportedMethod { .. } | Error::NotImplemented { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        (status, Json(json!({ "message": self.user_message() }))).into_response()
    }
}

impl From<PaymentError> for Error {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::ProviderApi(message) => Error::Provider { message },
            PaymentError::InvalidSignature(reason) => Error::InvalidSignature { reason },
            PaymentError::InvalidData(message) => Error::BadRequest { message },
            PaymentError::UnsupportedMethod(method) => Error::UnsupportedMethod { method },
            PaymentError::NotConfigured(method) => Error::NotImplemented {
                feature: format!("{method} payments"),
            },
        }
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
