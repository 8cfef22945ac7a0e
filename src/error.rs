use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Sentinel damage score for "no valid score computed"
pub const NO_SCORE: i32 = -1;

#[derive(Debug, Error)]
pub enum OracleError {
    /// Malformed request input (bad hash, missing field, unreadable body)
    #[error("{0}")]
    InvalidInput(String),

    /// Model, image fetch or decode failure
    #[error("{0}")]
    Upstream(String),
}

impl OracleError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OracleError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            OracleError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for OracleError {
    fn from(err: anyhow::Error) -> Self {
        Self::Upstream(format!("{:#}", err))
    }
}

pub type OracleResult<T> = Result<T, OracleError>;

impl IntoResponse for OracleError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
            "damage_score": NO_SCORE,
            "timestamp": chrono::Utc::now().timestamp(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(OracleError::invalid("bad hash").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            OracleError::upstream("model exploded").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_anyhow_becomes_upstream() {
        let err: OracleError = anyhow::anyhow!("decode failed").context("preprocess").into();
        match err {
            OracleError::Upstream(msg) => {
                assert!(msg.contains("preprocess"));
                assert!(msg.contains("decode failed"));
            }
            other => panic!("expected upstream, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_response_carries_sentinel() {
        let resp = OracleError::invalid("hash parameter required").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["damage_score"], NO_SCORE);
        assert_eq!(json["error"], "hash parameter required");
        assert!(json["timestamp"].is_i64());
    }

    #[tokio::test]
    async fn test_upstream_response_carries_sentinel() {
        let resp = OracleError::upstream("model exploded").into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["damage_score"], -1);
        assert_eq!(json["error"], "model exploded");
    }
}
