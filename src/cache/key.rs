//! Query key resolution and persistent cache key hashing

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Query parameters attached to a GET, kept sorted for deterministic keys.
pub type QueryParams = BTreeMap<String, String>;

/// Resolve a path and its parameters into the key identifying the request.
///
/// Parameters are flattened into a URL-encoded query string in key order;
/// empty values are dropped. `/api/risks` with `{status: open}` resolves to
/// `/api/risks?status=open`.
pub fn resolve_query_key(path: &str, params: &QueryParams) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (k, v) in params.iter().filter(|(_, v)| !v.is_empty()) {
        serializer.append_pair(k, v);
        any = true;
    }

    if !any {
        return path.to_string();
    }

    let query = serializer.finish();
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{}{}{}", path, separator, query)
}

/// Path component of a resolved key (everything before `?`).
pub fn key_path(key: &str) -> &str {
    key.split_once('?').map(|(p, _)| p).unwrap_or(key)
}

/// Whether `key` falls under `prefix`: the same path, a query on it, or a
/// sub-path below it.
pub fn key_matches_prefix(key: &str, prefix: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

/// Deterministic storage key for a resolved query key on a given API host.
///
/// The key is a SHA-256 hash so it is safe to use as a file name.
pub fn storage_key(scope: &str, query_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    hasher.update(b"|");
    hasher.update(query_key.as_bytes());
    format!("{:x}", hasher.finalize())
}
