use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

/// Failure modes surfaced by the HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Fraud detected: {}", .0.join(", "))]
    FraudDetected(Vec<String>),

    #[error("{0}")]
    ExternalUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InsufficientFunds | AppError::FraudDetected(_) => StatusCode::BAD_REQUEST,
            AppError::ExternalUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(e) => {
                error!(error = ?e, "unhandled error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(serde_json::json!({
                "error": message,
                "success": false,
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraud_message_joins_reasons() {
        let err = AppError::FraudDetected(vec!["invalid amount".into(), "too many rapid payments".into()]);
        assert_eq!(
            err.to_string(),
            "Fraud detected: invalid amount, too many rapid payments"
        );
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let resp = AppError::Internal(anyhow::anyhow!("connection refused")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
        assert_eq!(json["success"], false);
    }
}
