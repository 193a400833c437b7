//! Upstream header names and value parsers.

use std::collections::BTreeMap;

use http::HeaderMap;

pub const CONNECTION_ID_HEADER: &str = "x-asrs-connection-id";
pub const HUB_HEADER: &str = "x-asrs-hub";
pub const CATEGORY_HEADER: &str = "x-asrs-category";
pub const EVENT_HEADER: &str = "x-asrs-event";
pub const USER_ID_HEADER: &str = "x-asrs-user-id";
pub const CLIENT_QUERY_HEADER: &str = "x-asrs-client-query";
pub const USER_CLAIMS_HEADER: &str = "x-asrs-user-claims";
pub const SIGNATURE_HEADER: &str = "x-asrs-signature";

/// All values of `name` joined with `,`; `None` when absent or empty.
///
/// Values that are not valid UTF-8 are skipped.
pub fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let joined = headers
        .get_all(name)
        .iter()
        .filter_map(|v| std::str::from_utf8(v.as_bytes()).ok())
        .collect::<Vec<_>>()
        .join(",");

    Some(joined).filter(|v| !v.trim().is_empty())
}

/// Capture every header under its lowercased name.
pub fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .filter_map(|name| {
            header_value(headers, name.as_str()).map(|value| (name.as_str().to_string(), value))
        })
        .collect()
}

/// Parse a client query string such as `?a=1&b=x%20y`.
///
/// Values are percent-decoded, pairs without `=` are dropped and
/// duplicate keys are joined with `,`.
pub fn parse_query(raw: &str) -> BTreeMap<String, String> {
    let mut query = BTreeMap::new();

    for pair in raw.trim_start_matches('?').split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        insert_joined(&mut query, percent_decode(key), percent_decode(value));
    }

    query
}

/// Parse a claims header such as `role: admin, role: dev, sub: u1`.
///
/// Entries without a `: ` separator are dropped and duplicate claim types
/// are joined with `,`.
pub fn parse_claims(raw: &str) -> BTreeMap<String, String> {
    let mut claims = BTreeMap::new();

    for entry in raw.split(',') {
        let Some((key, value)) = entry.split_once(": ") else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        insert_joined(&mut claims, key.to_string(), value.trim().to_string());
    }

    claims
}

/// Split a signature header into its comma-separated candidates.
pub fn parse_signatures(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn insert_joined(map: &mut BTreeMap<String, String>, key: String, value: String) {
    map.entry(key)
        .and_modify(|existing| {
            existing.push(',');
            existing.push_str(&value);
        })
        .or_insert(value);
}

fn percent_decode(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}
