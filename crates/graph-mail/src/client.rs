//! Bearer-authenticated GETs against the Graph API, with capped pagination
//!
//! Endpoints come in two shapes: relative resource paths that are joined to
//! the base URL with query parameters, and fully-qualified continuation
//! links from a previous page, which already embed every parameter and are
//! used verbatim. Each call is attempted exactly once; pagination stops the
//! moment a page fails, never returning a silent partial result.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::{Error, Result};

/// Microsoft Graph v1.0 base URL
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// One page of a Graph collection response.
#[derive(Debug, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub value: Vec<Value>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Authenticated Graph API client.
///
/// Holds no per-user state: the bearer token comes from the
/// `RequestContext` on every call.
#[derive(Clone)]
pub struct MailClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl MailClient {
    pub fn new(http: reqwest::Client, base_url: String, timeout: Duration) -> Self {
        Self {
            http,
            base_url,
            timeout,
        }
    }

    /// Issue one authenticated GET.
    ///
    /// `endpoint` is either a resource path relative to the base URL
    /// (`params` become the query string) or an absolute continuation link
    /// (`params` are ignored — the link embeds them).
    pub async fn get(
        &self,
        ctx: &RequestContext,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<Value> {
        let bearer = ctx.bearer()?;

        let mut request = if endpoint.starts_with("http") {
            self.http.get(endpoint)
        } else {
            let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);
            self.http.get(url).query(params)
        };
        request = request.bearer_auth(bearer).timeout(self.timeout);

        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(format!("mailbox request failed: {e}")))?;

        let status = response.status().as_u16();
        if status == 401 {
            return Err(Error::ReauthNeeded);
        }
        if status >= 400 {
            return Err(Error::Upstream(status));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Error::Transport(format!("reading mailbox response: {e}")))
    }

    /// Fetch up to `max_count` items, following continuation links.
    ///
    /// Parameters apply to the first call only; continuation links carry
    /// their own. No request is issued once `max_count` items have
    /// accumulated, and an overshooting final page is truncated to the cap.
    /// Any page failure propagates immediately.
    pub async fn get_paginated(
        &self,
        ctx: &RequestContext,
        endpoint: &str,
        max_count: usize,
        params: &[(String, String)],
    ) -> Result<Vec<Value>> {
        let mut items: Vec<Value> = Vec::new();
        let mut next_link: Option<String> = None;

        while items.len() < max_count {
            let response = match &next_link {
                Some(link) => self.get(ctx, link, &[]).await?,
                None => self.get(ctx, endpoint, params).await?,
            };
            let page: Page = serde_json::from_value(response)
                .map_err(|e| Error::Envelope(e.to_string()))?;
            items.extend(page.value);

            match page.next_link {
                Some(link) if items.len() < max_count => next_link = Some(link),
                _ => break,
            }
        }

        items.truncate(max_count);
        Ok(items)
    }
}
