//! JSON output formatting
//!
//! Everything printed with `--format json` is wrapped in an envelope:
//! `{ "data": ..., "meta": { "generated_at", "version", "count" } }`.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

/// Envelope around JSON command output
#[derive(Debug, Serialize)]
pub struct JsonOutput {
    pub data: Value,
    pub meta: Metadata,
}

#[derive(Debug, Serialize)]
pub struct Metadata {
    /// RFC 3339 time the output was produced
    pub generated_at: String,

    /// grcctl version
    pub version: String,

    /// Number of records, when `data` is a list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl JsonOutput {
    pub fn new(data: Value) -> Self {
        let count = data.as_array().map(Vec::len);
        Self {
            data,
            meta: Metadata {
                generated_at: Utc::now().to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                count,
            },
        }
    }
}

/// Format data as pretty-printed JSON inside the output envelope
pub fn format_json<T: Serialize + ?Sized>(data: &T) -> Result<String, serde_json::Error> {
    let output = JsonOutput::new(serde_json::to_value(data)?);
    serde_json::to_string_pretty(&output)
}
