//! Grid-view side channel: structured data smuggled through the terminal
//! stream as a private-use OSC sequence.
//!
//! A remote command (the `Out-WebGridView` cmdlet) emits
//! `ESC ] 1337 ; WebGridView ; <base64 JSON> ST` into its output. The
//! emulator intercepts the sequence before rendering and this module turns
//! the payload into a [`GridData`] for the host's data viewer. Decode
//! failures are logged and the sequence is dropped, exactly as an unknown
//! OSC would be.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Private-use OSC identifier reserved for this application.
pub const OSC_IDENTIFIER: u16 = 1337;

/// The only recognized subcommand.
pub const SUBCOMMAND: &[u8] = b"WebGridView";

/// Default title shown by the grid viewer when the sender supplies none.
pub const DEFAULT_TITLE: &str = "Out-WebGridView";

/// A decoded grid-view payload: an ordered set of records for tabular
/// display. Rows are kept as raw JSON values; the sender pre-wraps bare
/// scalars (`{"Value": ...}`) so no coercion happens here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridData {
    pub title: String,
    pub rows: Vec<Value>,
}

impl GridData {
    /// Ordered union of object keys across all rows, first-seen order.
    /// Rows that are not JSON objects contribute no columns.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = Vec::new();
        for row in &self.rows {
            if let Value::Object(map) = row {
                for key in map.keys() {
                    if !columns.iter().any(|c| c == key) {
                        columns.push(key.clone());
                    }
                }
            }
        }
        columns
    }
}

/// Decode a grid-view message from `;`-split OSC parameters.
///
/// Expects `[b"1337", b"WebGridView", <base64>]`. Returns `None` on any
/// mismatch or parse failure; the caller then treats the sequence as
/// unhandled.
pub fn decode(params: &[&[u8]]) -> Option<GridData> {
    if params.len() < 3 {
        return None;
    }
    if params[0] != OSC_IDENTIFIER.to_string().as_bytes() {
        return None;
    }
    if params[1] != SUBCOMMAND {
        log::debug!(
            "ignoring unknown grid-view subcommand: {}",
            String::from_utf8_lossy(params[1])
        );
        return None;
    }

    let raw = match BASE64.decode(params[2]) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("grid-view payload is not valid base64: {e}");
            return None;
        }
    };
    let text = match String::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("grid-view payload is not valid UTF-8: {e}");
            return None;
        }
    };
    let value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("grid-view payload is not valid JSON: {e}");
            return None;
        }
    };

    // A single record still renders as a one-row grid.
    let rows = match value {
        Value::Array(rows) => rows,
        other => vec![other],
    };

    Some(GridData {
        title: DEFAULT_TITLE.to_string(),
        rows,
    })
}
