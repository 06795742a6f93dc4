//! Authenticated read access to the Microsoft Graph mailbox API
//!
//! Everything here runs on behalf of one caller whose bearer token was bound
//! to a `RequestContext` by the gateway middleware. `MailClient` issues the
//! raw authenticated GETs and follows continuation links up to a cap;
//! `SearchEngine` layers the tiered search fallback on top; `folders` maps
//! human folder names to Graph endpoints.

pub mod client;
pub mod context;
pub mod error;
pub mod folders;
pub mod search;

pub use client::{GRAPH_BASE_URL, MailClient, Page};
pub use context::RequestContext;
pub use error::{Error, Result};
pub use folders::resolve_folder;
pub use search::{SearchEngine, SearchOutcome, SearchQuery, Strategy};
