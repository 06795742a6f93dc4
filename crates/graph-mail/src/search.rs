//! Tiered search with deliberate query reformulation
//!
//! Graph's `$search` is temperamental: combined KQL expressions fail or
//! return nothing for queries that succeed term-by-term. So the engine tries
//! the full expression first, then each term alone in a fixed priority
//! order, then gives up on filtering and returns the most recent messages.
//! Every tier produces a tagged outcome and the loop dispatches on the tag;
//! only the final tier's failure reaches the caller.

use serde_json::Value;
use tracing::warn;

use crate::client::MailClient;
use crate::context::RequestContext;
use crate::error::Result;

/// Caller-supplied search filters. Empty strings count as absent.
#[derive(Debug, Default, Clone)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub has_attachments: Option<bool>,
    pub unread_only: Option<bool>,
}

/// Which tier produced a search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Combined,
    Subject,
    From,
    Query,
    MostRecent,
}

impl Strategy {
    /// Human-readable label, reported to callers for observability.
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Combined => "combined search",
            Strategy::Subject => "subject search",
            Strategy::From => "from search",
            Strategy::Query => "query search",
            Strategy::MostRecent => "recent emails fallback",
        }
    }
}

/// Search result plus the tier that produced it.
#[derive(Debug)]
pub struct SearchOutcome {
    pub items: Vec<Value>,
    pub strategy: Strategy,
}

/// Tagged outcome of one tier attempt.
enum Attempt {
    Hit(Vec<Value>),
    Empty,
    Failed(crate::error::Error),
}

/// Ordered fallback search over one folder.
pub struct SearchEngine {
    client: MailClient,
    select_fields: String,
}

impl SearchEngine {
    pub fn new(client: MailClient, select_fields: String) -> Self {
        Self {
            client,
            select_fields,
        }
    }

    /// Run the tiered search. The first tier returning items wins; tiers
    /// that error or come back empty fall through, except the final
    /// unfiltered fetch, whose failure propagates.
    pub async fn search(
        &self,
        ctx: &RequestContext,
        folder_endpoint: &str,
        query: &SearchQuery,
        max_count: usize,
    ) -> Result<SearchOutcome> {
        // Tier 1: everything at once — quoted terms ANDed in $search,
        // boolean predicates ANDed in $filter
        let mut params = self.base_params(max_count);
        let terms = combined_terms(query);
        if !terms.is_empty() {
            params.push(("$search".into(), terms.join(" ")));
        }
        let filters = structural_filters(query);
        if !filters.is_empty() {
            params.push(("$filter".into(), filters.join(" and ")));
        }
        match self.attempt(ctx, folder_endpoint, max_count, &params).await {
            Attempt::Hit(items) => {
                return Ok(SearchOutcome {
                    items,
                    strategy: Strategy::Combined,
                });
            }
            Attempt::Empty => {}
            Attempt::Failed(e) => warn!(error = %e, "combined search failed, falling back"),
        }

        // Tier 2: one term at a time, fixed priority order
        let single_terms = [
            (Strategy::Subject, single_term(Strategy::Subject, query)),
            (Strategy::From, single_term(Strategy::From, query)),
            (Strategy::Query, single_term(Strategy::Query, query)),
        ];
        for (strategy, term) in single_terms {
            let Some(term) = term else { continue };
            let mut params = self.base_params(max_count);
            params.push(("$search".into(), term));
            match self.attempt(ctx, folder_endpoint, max_count, &params).await {
                Attempt::Hit(items) => return Ok(SearchOutcome { items, strategy }),
                Attempt::Empty => {}
                Attempt::Failed(e) => {
                    warn!(strategy = strategy.label(), error = %e, "single-term search failed");
                }
            }
        }

        // Tier 3: no filtering, most recent first. This one is allowed to
        // return nothing, and its failure is the caller's problem.
        let items = self
            .client
            .get_paginated(ctx, folder_endpoint, max_count, &self.base_params(max_count))
            .await?;
        Ok(SearchOutcome {
            items,
            strategy: Strategy::MostRecent,
        })
    }

    /// Ordering and projection shared by every tier.
    fn base_params(&self, max_count: usize) -> Vec<(String, String)> {
        vec![
            ("$top".into(), max_count.to_string()),
            ("$orderby".into(), "receivedDateTime desc".into()),
            ("$select".into(), self.select_fields.clone()),
        ]
    }

    async fn attempt(
        &self,
        ctx: &RequestContext,
        endpoint: &str,
        max_count: usize,
        params: &[(String, String)],
    ) -> Attempt {
        match self.client.get_paginated(ctx, endpoint, max_count, params).await {
            Ok(items) if items.is_empty() => Attempt::Empty,
            Ok(items) => Attempt::Hit(items),
            Err(e) => Attempt::Failed(e),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Quoted KQL terms for the combined tier, in the fixed order
/// query, subject, from.
fn combined_terms(query: &SearchQuery) -> Vec<String> {
    let mut terms = Vec::new();
    if let Some(q) = non_empty(&query.query) {
        terms.push(format!("\"{q}\""));
    }
    if let Some(s) = non_empty(&query.subject) {
        terms.push(format!("subject:\"{s}\""));
    }
    if let Some(f) = non_empty(&query.from) {
        terms.push(format!("from:\"{f}\""));
    }
    terms
}

/// Boolean predicates for the combined tier's `$filter`.
fn structural_filters(query: &SearchQuery) -> Vec<String> {
    let mut filters = Vec::new();
    if query.has_attachments == Some(true) {
        filters.push("hasAttachments eq true".to_owned());
    }
    if query.unread_only == Some(true) {
        filters.push("isRead eq false".to_owned());
    }
    filters
}

/// The quoted single-term expression for a tier-2 strategy, if the caller
/// supplied that term.
fn single_term(strategy: Strategy, query: &SearchQuery) -> Option<String> {
    match strategy {
        Strategy::Subject => non_empty(&query.subject).map(|s| format!("subject:\"{s}\"")),
        Strategy::From => non_empty(&query.from).map(|f| format!("from:\"{f}\"")),
        Strategy::Query => non_empty(&query.query).map(|q| format!("\"{q}\"")),
        _ => None,
    }
}
