use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use repolens_core::RepoLensError;
use serde_json::json;

/// Wire envelope for failures: `{success: false, error: {kind, message}}`
/// with a matching HTTP status.
pub struct ApiError(pub RepoLensError);

impl From<RepoLensError> for ApiError {
    fn from(error: RepoLensError) -> Self {
        Self(error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RepoLensError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RepoLensError::NotFound(_) => StatusCode::NOT_FOUND,
            RepoLensError::IndexUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RepoLensError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn envelope(&self) -> serde_json::Value {
        json!({
            "success": false,
            "error": {
                "kind": self.0.kind(),
                "message": self.0.to_string(),
            }
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.envelope())).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_track_error_kinds() {
        assert_eq!(
            ApiError(RepoLensError::InvalidInput("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(RepoLensError::NotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(RepoLensError::IndexUnavailable("x".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError(RepoLensError::Timeout("x".into())).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError(RepoLensError::Internal("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn envelope_carries_kind_and_message() {
        let envelope = ApiError(RepoLensError::ParseFailed("nothing parseable".into())).envelope();
        assert_eq!(envelope["success"], false);
        assert_eq!(envelope["error"]["kind"], "ParseFailed");
        assert!(envelope["error"]["message"]
            .as_str()
            .unwrap()
            .contains("nothing parseable"));
    }
}
