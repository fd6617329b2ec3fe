//! Bearer-token guard for the endpoints that trigger runs

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::api::error::ApiError;
use crate::config::AuthConfig;

/// Present in a handler signature when the request carried the configured token
#[derive(Debug, Clone)]
pub struct AuthBearer;

#[async_trait]
impl<S> FromRequestParts<S> for AuthBearer
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let cfg = AuthConfig::from_ref(state);
        if cfg.token.is_empty() {
            return Err(ApiError::Forbidden(
                "run triggers are disabled; set auth.token".to_string(),
            ));
        }

        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        if tokens_match(presented.trim().as_bytes(), cfg.token.as_bytes()) {
            Ok(Self)
        } else {
            tracing::warn!("rejected request with invalid bearer token");
            Err(ApiError::Unauthorized)
        }
    }
}

/// Length-checked comparison without early exit on the first differing byte
fn tokens_match(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(token: &str, header: Option<&str>) -> Result<AuthBearer, ApiError> {
        let mut builder = Request::builder().uri("/");
        if let Some(h) = header {
            builder = builder.header(AUTHORIZATION, h);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        let cfg = AuthConfig {
            token: token.to_string(),
        };
        AuthBearer::from_request_parts(&mut parts, &cfg).await
    }

    #[tokio::test]
    async fn test_valid_token_accepted() {
        assert!(extract("s3cret", Some("Bearer s3cret")).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_or_wrong_token_rejected() {
        assert!(matches!(extract("s3cret", None).await, Err(ApiError::Unauthorized)));
        assert!(matches!(
            extract("s3cret", Some("Bearer nope")).await,
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            extract("s3cret", Some("Basic s3cret")).await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_empty_config_disables_triggers() {
        assert!(matches!(
            extract("", Some("Bearer anything")).await,
            Err(ApiError::Forbidden(_))
        ));
    }
}
