//! Presentation helpers for email payloads
//!
//! Graph returns addresses as nested `{"emailAddress": {"name", "address"}}`
//! objects and bodies as HTML more often than not. These helpers flatten
//! both into the plain strings the API returns to callers.

use serde_json::Value;

/// Reduce HTML to plain text by dropping tags. Good enough for email bodies;
/// anything fancier belongs in the caller's renderer.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Render an address object as `Name (address)`, or just the address when
/// the display name is missing.
pub fn format_email_address(email_obj: &Value) -> String {
    if email_obj.is_null() {
        return "Unknown".to_owned();
    }
    // Either the wrapper object or a bare emailAddress object
    let addr = email_obj.get("emailAddress").unwrap_or(email_obj);
    let name = addr.get("name").and_then(Value::as_str).unwrap_or("");
    let address = addr.get("address").and_then(Value::as_str).unwrap_or("");
    if name.is_empty() {
        address.to_owned()
    } else {
        format!("{name} ({address})")
    }
}

/// Render a recipient list as a comma-separated string.
pub fn format_recipients(recipients: Option<&Vec<Value>>) -> String {
    match recipients {
        Some(list) if !list.is_empty() => list
            .iter()
            .map(format_email_address)
            .collect::<Vec<_>>()
            .join(", "),
        _ => "None".to_owned(),
    }
}

/// `2024-03-01T09:30:00Z` → `2024-03-01 09:30:00`.
pub fn format_received(timestamp: &str) -> String {
    timestamp
        .get(..19)
        .unwrap_or(timestamp)
        .replace('T', " ")
}
