//! Read-only email routes
//!
//! Three endpoints over one folder-scoped mailbox: list, search, read. All
//! of them run behind the auth gateway and consume the `RequestContext` it
//! bound. Responses are plain JSON with presentation already applied —
//! formatted senders, shortened timestamps, tag-stripped bodies.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use graph_auth::TokenManager;
use graph_mail::{MailClient, RequestContext, SearchEngine, SearchQuery, resolve_folder};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::format::{format_email_address, format_received, format_recipients, strip_html};

/// Largest page a caller may request in one call
const MAX_COUNT: usize = 50;

/// Shared application state, constructed once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenManager>,
    pub mail: MailClient,
    pub search: Arc<SearchEngine>,
    pub list_fields: String,
    pub detail_fields: String,
    pub started_at: Instant,
    pub prometheus: PrometheusHandle,
}

fn default_folder() -> String {
    "inbox".to_owned()
}

fn default_count() -> usize {
    10
}

fn clamp_count(count: usize) -> usize {
    count.clamp(1, MAX_COUNT)
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_count")]
    pub count: usize,
}

/// GET /emails — most recent messages in a folder.
pub async fn list_emails(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let count = clamp_count(params.count);
    let endpoint = resolve_folder(&state.mail, &ctx, &params.folder).await;

    let query = vec![
        ("$top".to_owned(), count.to_string()),
        ("$orderby".to_owned(), "receivedDateTime desc".to_owned()),
        ("$select".to_owned(), state.list_fields.clone()),
    ];
    let emails = state.mail.get_paginated(&ctx, &endpoint, count, &query).await?;

    Ok(Json(json!({
        "folder": params.folder,
        "count": emails.len(),
        "emails": emails.iter().map(email_summary).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub has_attachments: Option<bool>,
    pub unread_only: Option<bool>,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_count")]
    pub count: usize,
}

/// GET /emails/search — tiered search; the response names the tier that
/// produced the result.
pub async fn search_emails(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    let count = clamp_count(params.count);
    let endpoint = resolve_folder(&state.mail, &ctx, &params.folder).await;

    let query = SearchQuery {
        query: params.query,
        subject: params.subject,
        from: params.from,
        has_attachments: params.has_attachments,
        unread_only: params.unread_only,
    };
    let outcome = state.search.search(&ctx, &endpoint, &query, count).await?;

    Ok(Json(json!({
        "folder": params.folder,
        "strategy": outcome.strategy.label(),
        "count": outcome.items.len(),
        "emails": outcome.items.iter().map(email_summary).collect::<Vec<_>>(),
    })))
}

/// GET /emails/{id} — full message content.
pub async fn read_email(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(email_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if email_id.trim().is_empty() {
        return Err(ApiError::bad_request("Email ID is required."));
    }

    let email = state
        .mail
        .get(
            &ctx,
            &format!("me/messages/{email_id}"),
            &[("$select".to_owned(), state.detail_fields.clone())],
        )
        .await?;

    let body_obj = &email["body"];
    let body = if body_obj["contentType"] == "html" {
        strip_html(body_obj["content"].as_str().unwrap_or(""))
    } else {
        body_obj["content"]
            .as_str()
            .or_else(|| email["bodyPreview"].as_str())
            .unwrap_or("")
            .to_owned()
    };

    let mut detail = serde_json::Map::new();
    detail.insert("id".into(), email["id"].clone());
    detail.insert(
        "from".into(),
        json!(format_email_address(&email["from"])),
    );
    detail.insert(
        "to".into(),
        json!(format_recipients(email["toRecipients"].as_array())),
    );
    let cc = format_recipients(email["ccRecipients"].as_array());
    if cc != "None" {
        detail.insert("cc".into(), json!(cc));
    }
    let bcc = format_recipients(email["bccRecipients"].as_array());
    if bcc != "None" {
        detail.insert("bcc".into(), json!(bcc));
    }
    detail.insert("subject".into(), json!(subject_of(&email)));
    detail.insert(
        "date".into(),
        json!(format_received(email["receivedDateTime"].as_str().unwrap_or(""))),
    );
    detail.insert(
        "importance".into(),
        json!(email["importance"].as_str().unwrap_or("normal")),
    );
    detail.insert(
        "has_attachments".into(),
        json!(email["hasAttachments"].as_bool().unwrap_or(false)),
    );
    detail.insert("body".into(), json!(body));

    Ok(Json(Value::Object(detail)))
}

fn subject_of(email: &Value) -> &str {
    email["subject"].as_str().unwrap_or("(no subject)")
}

/// Summary projection shared by list and search responses.
fn email_summary(email: &Value) -> Value {
    json!({
        "id": email["id"],
        "subject": subject_of(email),
        "from": format_email_address(&email["from"]),
        "received": format_received(email["receivedDateTime"].as_str().unwrap_or("")),
        "unread": !email["isRead"].as_bool().unwrap_or(false),
        "has_attachments": email["hasAttachments"].as_bool().unwrap_or(false),
    })
}
