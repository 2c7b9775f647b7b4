//! Result normalization.
//!
//! Turns an aggregated [`QueryResult`] into the bounded payload of an `ok`
//! [`ToolResponse`]:
//!
//! ```json
//! {"rows": [...], "row_count": 1200, "truncated": false, "summarized": true, "pages": 3}
//! ```
//!
//! `row_count` always reports every row the executor returned, even when
//! only the first rows fit under the ceiling.

use crate::error::ErrorKind;
use crate::models::{QueryResult, ToolResponse};
use crate::tools::format::OutputFormat;
use humansize::{BINARY, format_size};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, error};

/// Default cap on rows returned to the client.
pub const DEFAULT_MAX_ROWS: usize = 500;

/// Default cap on the serialized size of the returned rows.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 256 * 1024;

/// Ceilings applied to every result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub max_rows: usize,
    pub max_payload_bytes: usize,
    pub format: OutputFormat,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            format: OutputFormat::Json,
        }
    }
}

impl NormalizeOptions {
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}

#[derive(Debug, Serialize)]
struct NormalizedPayload<'a> {
    rows: &'a [Map<String, JsonValue>],
    row_count: usize,
    truncated: bool,
    summarized: bool,
    pages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    formatted: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
}

/// Wrap non-object rows so every row is a JSON object.
fn into_object(row: JsonValue) -> Map<String, JsonValue> {
    match row {
        JsonValue::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

fn summary_line(kept: usize, row_count: usize, reason: &str) -> String {
    format!(
        "Showing the first {} of {} rows ({}). Narrow the query or time range to see the rest.",
        kept, row_count, reason
    )
}

/// Build the `ok` response for `result` under `options`.
///
/// The byte ceiling covers the whole serialized payload, rendered table
/// and summary included.
pub fn normalize(result: QueryResult, options: &NormalizeOptions) -> ToolResponse {
    let row_count = result.row_count();
    let mut rows = Vec::with_capacity(row_count.min(options.max_rows));
    let mut used_bytes = 0usize;
    let mut hit_byte_ceiling = false;

    // Cheap first cut on the rows alone.
    for row in result.rows.into_iter().take(options.max_rows) {
        let row = into_object(row);
        // Serialized size plus a separator.
        let size = serde_json::to_vec(&row).map(|v| v.len()).unwrap_or(0) + 1;
        if used_bytes + size > options.max_payload_bytes {
            hit_byte_ceiling = true;
            break;
        }
        used_bytes += size;
        rows.push(row);
    }

    loop {
        let summarized = rows.len() < row_count;
        let summary = summarized.then(|| {
            let reason = if hit_byte_ceiling {
                format!("payload limit of {}", format_size(options.max_payload_bytes, BINARY))
            } else {
                format!("row limit of {}", options.max_rows)
            };
            summary_line(rows.len(), row_count, &reason)
        });
        let payload = NormalizedPayload {
            rows: &rows,
            row_count,
            truncated: result.truncated,
            summarized,
            pages: result.pages,
            formatted: options.format.render(&rows, rows.len()),
            summary,
        };

        let encoded = match serde_json::to_vec(&payload) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(error = %e, "Failed to serialize normalized payload");
                return ToolResponse::error(ErrorKind::Internal, "Failed to build the tool result");
            }
        };
        if encoded.len() <= options.max_payload_bytes || rows.is_empty() {
            if summarized {
                debug!(kept = rows.len(), row_count, bytes = encoded.len(), "Summarized result");
            }
            return match serde_json::to_value(&payload) {
                Ok(value) => ToolResponse::ok(value),
                Err(e) => {
                    error!(error = %e, "Failed to serialize normalized payload");
                    ToolResponse::error(ErrorKind::Internal, "Failed to build the tool result")
                }
            };
        }

        drop(payload);

        // Shrink in proportion to the overshoot, always by at least one row.
        hit_byte_ceiling = true;
        let keep = rows.len() * options.max_payload_bytes / encoded.len();
        rows.truncate(keep.min(rows.len() - 1));
    }
}
