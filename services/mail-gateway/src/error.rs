//! Boundary translation of core errors to HTTP responses
//!
//! Every failure leaving the service becomes a JSON body of the shape
//! `{"error":{"type":"...","message":"..."}}` with a status that tells the
//! caller what to do: 401 means redo authentication/consent, 404 means no
//! connection exists, 502 means the upstream misbehaved, 500 means us.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// A caller-visible failure.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    /// The inbound request carried no caller identity.
    pub fn missing_user_header() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "auth_required",
            "Authentication required. No X-User-ID header found.",
        )
    }

    /// A path parameter was empty or unusable.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
}

impl From<graph_auth::Error> for ApiError {
    fn from(err: graph_auth::Error) -> Self {
        use graph_auth::Error;
        match err {
            Error::NotConnected => Self::new(
                StatusCode::NOT_FOUND,
                "not_connected",
                "No Microsoft connection found. Please connect your Outlook account.",
            ),
            Error::DecryptionFailed => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "decryption_failed",
                "Token decryption failed. Please reconnect.",
            ),
            Error::ReauthNeeded(_) => Self::new(
                StatusCode::UNAUTHORIZED,
                "reauth_needed",
                "Token refresh failed. Please reconnect.",
            ),
            Error::Transport(msg) => Self::new(StatusCode::BAD_GATEWAY, "provider_unreachable", msg),
            Error::Store(_) | Error::EncryptionFailed | Error::InvalidKey(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Internal credential error.",
            ),
        }
    }
}

impl From<graph_mail::Error> for ApiError {
    fn from(err: graph_mail::Error) -> Self {
        use graph_mail::Error;
        match err {
            Error::AuthMissing => Self::new(
                StatusCode::UNAUTHORIZED,
                "auth_required",
                "Microsoft authentication required. Please connect your Outlook account.",
            ),
            Error::ReauthNeeded => Self::new(
                StatusCode::UNAUTHORIZED,
                "reauth_needed",
                "Session expired. Please reconnect your Outlook account.",
            ),
            Error::Upstream(status) => Self::new(
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                format!("Microsoft Graph API error: {status}"),
            ),
            Error::Transport(msg) => Self::new(StatusCode::BAD_GATEWAY, "upstream_unreachable", msg),
            Error::Envelope(msg) => Self::new(
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                format!("Unexpected Microsoft Graph response: {msg}"),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "type": self.kind,
                "message": self.message,
            }
        });
        (
            self.status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_connected_is_404() {
        let err: ApiError = graph_auth::Error::NotConnected.into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(err.message.contains("connect your Outlook account"));
    }

    #[test]
    fn reauth_paths_are_401() {
        let from_refresh: ApiError =
            graph_auth::Error::ReauthNeeded("token endpoint returned 400".into()).into();
        assert_eq!(from_refresh.status, StatusCode::UNAUTHORIZED);

        let from_api: ApiError = graph_mail::Error::ReauthNeeded.into();
        assert_eq!(from_api.status, StatusCode::UNAUTHORIZED);

        let unbound: ApiError = graph_mail::Error::AuthMissing.into();
        assert_eq!(unbound.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn upstream_status_is_propagated_in_message() {
        let err: ApiError = graph_mail::Error::Upstream(429).into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert!(err.message.contains("429"));
    }

    #[test]
    fn decryption_failure_is_opaque_500() {
        let err: ApiError = graph_auth::Error::DecryptionFailed.into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Token decryption failed. Please reconnect.");
    }

    #[tokio::test]
    async fn response_body_has_error_envelope() {
        let response = ApiError::missing_user_header().into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "auth_required");
        assert!(json["error"]["message"].as_str().unwrap().contains("X-User-ID"));
    }
}
