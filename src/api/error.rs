use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::optimizer::OptimizationError;

/// API error types that can be returned from handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Optimization(#[from] OptimizationError),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Error response that gets serialized to JSON
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Optimization(e) => match e {
                OptimizationError::NoForecasts | OptimizationError::NoMachineSpecs => {
                    StatusCode::CONFLICT
                }
                OptimizationError::SolverUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                OptimizationError::InfeasibleOrSuboptimal(_) => StatusCode::UNPROCESSABLE_ENTITY,
                OptimizationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type string
    fn error_type(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Unauthorized => "Unauthorized",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::Optimization(e) => e.kind(),
            ApiError::InternalError(_) => "InternalServerError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        let message = if status.is_server_error() {
            tracing::error!(error = %self, "API error occurred");
            match &self {
                ApiError::Optimization(OptimizationError::SolverUnavailable(_)) => self.to_string(),
                _ => "An internal error occurred".to_string(),
            }
        } else {
            tracing::debug!(error = %self, "Client error");
            self.to_string()
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::InternalError(format!("{error:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::SolveStatus;

    #[test]
    fn test_optimization_error_status_codes() {
        let cases = [
            (OptimizationError::NoForecasts, StatusCode::CONFLICT, "NoForecasts"),
            (
                OptimizationError::SolverUnavailable("none".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                "SolverUnavailable",
            ),
            (
                OptimizationError::InfeasibleOrSuboptimal(SolveStatus::Infeasible),
                StatusCode::UNPROCESSABLE_ENTITY,
                "InfeasibleOrSuboptimal",
            ),
            (
                OptimizationError::Store(anyhow::anyhow!("db down")),
                StatusCode::INTERNAL_SERVER_ERROR,
                "Store",
            ),
        ];
        for (err, status, kind) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status_code(), status);
            assert_eq!(api.error_type(), kind);
        }
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::BadRequest("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InternalError("test".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_display() {
        let error = ApiError::Forbidden("run triggers disabled".to_string());
        assert_eq!(error.to_string(), "Forbidden: run triggers disabled");
    }
}
