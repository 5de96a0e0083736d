//! Record naming and label derivation.
//!
//! A state record lives in the store under a name derived from its resource
//! type and key:
//!
//! ```text
//! {hyphen-case(type)}-{sanitized(key)}
//! AccessApplication + "pending-my-app"  ->  access-application-pending-my-app
//! ```
//!
//! Names are at most 63 characters of `[a-z0-9-]` and never start or end
//! with a hyphen.

use crate::types::ResourceType;

/// Maximum length of a record name or label value.
pub const MAX_NAME_LEN: usize = 63;

/// Prefix of placeholder keys used before an external ID exists.
pub const PLACEHOLDER_PREFIX: &str = "pending-";

/// Label holding the hyphen-case resource type.
pub const LABEL_RESOURCE_TYPE: &str = "syncstate.io/resource-type";

/// Label holding the sanitized record key.
pub const LABEL_RESOURCE_KEY: &str = "syncstate.io/resource-key";

/// Converts a camel-case tag to hyphen case.
///
/// A hyphen goes before every uppercase letter except the first character,
/// then everything is lowercased: `AccessApplication` -> `access-application`,
/// `DNSRecord` -> `d-n-s-record`.
pub fn hyphen_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            out.push('-');
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// Derives the store name of the record for `(resource_type, key)`.
///
/// If `key` sanitizes to nothing the result is the type prefix alone, so
/// callers must pass a distinguishing key.
pub fn record_name(resource_type: ResourceType, key: &str) -> String {
    let prefix = hyphen_case(resource_type.as_str());
    let budget = MAX_NAME_LEN.saturating_sub(prefix.len() + 1);
    let sanitized = sanitize(key, |c| c == '-', |c| c == '-', budget);

    if sanitized.is_empty() {
        prefix
    } else {
        format!("{prefix}-{sanitized}")
    }
}

/// Derives a label value from an arbitrary string.
///
/// Same transform as record keys with `_` and `.` also allowed. The result
/// begins and ends with an alphanumeric character.
pub fn label_value(value: &str) -> String {
    sanitize(
        value,
        |c| matches!(c, '-' | '_' | '.'),
        |c| !c.is_ascii_alphanumeric(),
        MAX_NAME_LEN,
    )
}

/// Returns the placeholder key for a producer that has no external ID yet.
pub fn placeholder_key(producer_name: &str) -> String {
    format!("{PLACEHOLDER_PREFIX}{producer_name}")
}

/// Returns true if `key` is a placeholder key.
pub fn is_placeholder(key: &str) -> bool {
    key.starts_with(PLACEHOLDER_PREFIX)
}

fn sanitize(
    input: &str,
    extra_allowed: impl Fn(char) -> bool,
    trim: impl Fn(char) -> bool + Copy,
    budget: usize,
) -> String {
    let mapped: String = input
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || extra_allowed(c) {
                c
            } else {
                '-'
            }
        })
        .collect();

    // Every char is ASCII at this point, so byte slicing is safe.
    let trimmed = mapped.trim_matches(trim);
    let truncated = &trimmed[..trimmed.len().min(budget)];
    truncated.trim_end_matches(trim).to_string()
}
