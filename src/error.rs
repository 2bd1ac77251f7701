use std::borrow::Cow;
use std::collections::HashMap;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use validator::{ValidationError, ValidationErrors};

use crate::services::payroll_calc::PayrollError;
use crate::utils::cipher::CipherError;

/// MySQL SQLSTATE for integrity constraint violations (duplicate key, FK).
const INTEGRITY_VIOLATION: &str = "23000";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Payroll(#[from] PayrollError),

    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(entity: &'static str) -> Self {
        AppError::NotFound { entity }
    }

    /// Single-field validation failure, shaped like the `validator` output.
    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(
            field,
            ValidationError::new("invalid").with_message(Cow::Owned(message.into())),
        );
        AppError::Validation(errors)
    }

    fn is_integrity_violation(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some(INTEGRITY_VIOLATION)
            }
            _ => false,
        }
    }
}

fn field_messages(errors: &ValidationErrors) -> HashMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Payroll(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Database(_) if self.is_integrity_violation() => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Cipher(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = match self {
            AppError::Validation(errors) => json!({
                "message": "The given data was invalid",
                "errors": field_messages(errors),
            }),
            AppError::Database(_) if status == StatusCode::CONFLICT => {
                tracing::warn!(error = %self, "Integrity constraint violated");
                json!({ "message": "The record conflicts with existing data" })
            }
            AppError::Database(sqlx::Error::RowNotFound) => json!({ "message": "Record not found" }),
            AppError::Database(_) | AppError::Cipher(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                json!({ "message": "Internal Server Error" })
            }
            other => json!({ "message": other.to_string() }),
        };
        HttpResponse::build(status).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn maps_variants_to_status_codes() {
        assert_eq!(
            AppError::field("fte", "too large").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::not_found("Payroll").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Conflict("dup".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Database(sqlx::Error::PoolTimedOut).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[actix_web::test]
    async fn validation_errors_list_fields() {
        let resp = AppError::field("end_date", "must not be before start_date").error_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json["errors"]["end_date"][0],
            "must not be before start_date"
        );
    }

    #[actix_web::test]
    async fn internal_errors_do_not_leak_details() {
        let resp = AppError::Internal("secret stack detail".into()).error_response();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("secret stack detail"));
    }
}
