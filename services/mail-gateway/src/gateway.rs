//! Inbound auth gateway
//!
//! Sits in front of every email route. Pulls the caller identity from the
//! `x-user-id` header (the sidecar in front of this service authenticates
//! the end user and forwards their id), resolves a mailbox token through the
//! token manager, and binds it to a `RequestContext` in request extensions.
//! Handlers and the mail client never see raw credentials — only the
//! context. Requests without an identity are rejected before any core code
//! runs.

use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use graph_mail::RequestContext;
use tracing::{Instrument, info_span, warn};

use crate::error::ApiError;
use crate::metrics;
use crate::routes::AppState;

pub async fn require_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let method = request.method().as_str().to_owned();
    let path = request.uri().path().to_owned();

    let user_id = request
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned);

    let Some(user_id) = user_id else {
        metrics::record_auth_failure("missing_header");
        let response = ApiError::missing_user_header().into_response();
        metrics::record_request(
            response.status().as_u16(),
            &method,
            started.elapsed().as_secs_f64(),
        );
        return response;
    };

    let token = match state.tokens.get_token(&user_id).await {
        Ok(token) => token,
        Err(e) => {
            warn!(request_id, user_id, error = %e, "token resolution failed");
            metrics::record_auth_failure("token_resolution");
            let response = ApiError::from(e).into_response();
            metrics::record_request(
                response.status().as_u16(),
                &method,
                started.elapsed().as_secs_f64(),
            );
            return response;
        }
    };

    request
        .extensions_mut()
        .insert(RequestContext::bind(token.user_id, token.access_token));

    let span = info_span!("request", request_id = %request_id, method = %method, path = %path);
    let response = next.run(request).instrument(span).await;
    metrics::record_request(
        response.status().as_u16(),
        &method,
        started.elapsed().as_secs_f64(),
    );
    response
}
