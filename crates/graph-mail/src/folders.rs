//! Folder name to Graph endpoint resolution
//!
//! Well-known folder names map statically; anything else is looked up once
//! by display name. Resolution never fails the request — an unknown or
//! unreachable folder falls back to the inbox, which is what callers almost
//! always mean.

use tracing::warn;

use crate::client::MailClient;
use crate::context::RequestContext;

/// Endpoint for the inbox, the universal fallback.
pub const INBOX_ENDPOINT: &str = "me/mailFolders/inbox/messages";

const WELL_KNOWN_FOLDERS: &[(&str, &str)] = &[
    ("inbox", INBOX_ENDPOINT),
    ("drafts", "me/mailFolders/drafts/messages"),
    ("sent", "me/mailFolders/sentItems/messages"),
    ("deleted", "me/mailFolders/deletedItems/messages"),
    ("junk", "me/mailFolders/junkemail/messages"),
    ("archive", "me/mailFolders/archive/messages"),
];

fn well_known_endpoint(name: &str) -> Option<&'static str> {
    WELL_KNOWN_FOLDERS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, endpoint)| *endpoint)
}

/// Resolve a folder name to its messages endpoint.
///
/// Empty names and well-known names resolve without a network call. Custom
/// folders cost one filtered lookup by display name; a failed or empty
/// lookup logs a warning and resolves to the inbox.
pub async fn resolve_folder(
    client: &MailClient,
    ctx: &RequestContext,
    folder: &str,
) -> String {
    if folder.is_empty() {
        return INBOX_ENDPOINT.to_owned();
    }

    let lower = folder.to_lowercase();
    if let Some(endpoint) = well_known_endpoint(&lower) {
        return endpoint.to_owned();
    }

    let filter = format!("displayName eq '{folder}'");
    match client
        .get(ctx, "me/mailFolders", &[("$filter".into(), filter)])
        .await
    {
        Ok(response) => {
            if let Some(id) = response["value"][0]["id"].as_str() {
                return format!("me/mailFolders/{id}/messages");
            }
        }
        Err(e) => {
            warn!(folder, error = %e, "custom folder lookup failed");
        }
    }

    warn!(folder, "folder not found, using inbox");
    INBOX_ENDPOINT.to_owned()
}
