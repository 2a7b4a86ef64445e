// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! JSON rowset parsing for row-text chunks.
//!
//! Two layouts exist, and which one applies is known from where the bytes
//! came from, never guessed from their content:
//! - [`RowsetLayout::Bracketed`]: a JSON array of row arrays,
//!   `[["1","a"],["2","b"]]` (inline rowsets)
//! - [`RowsetLayout::Unbracketed`]: the concatenation `["1","a"],["2","b"]`
//!   used by remote chunks
//!
//! An empty or whitespace-only payload decodes to zero rows.

use crate::error::{Error, Result};
use crate::types::value::{Row, Value};
use serde_json::Value as JsonValue;

/// Outer framing of a row-text payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowsetLayout {
    /// The rows are elements of one top-level JSON array.
    Bracketed,
    /// The rows follow each other, separated by commas, with no outer array.
    Unbracketed,
}

/// Parse a row-text payload laid out as `layout` into rows.
pub fn parse_json_rowset(data: &[u8], layout: RowsetLayout) -> Result<Vec<Row>> {
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }

    let rows = match layout {
        RowsetLayout::Bracketed => parse_array(data)?,
        RowsetLayout::Unbracketed => {
            let mut wrapped = Vec::with_capacity(data.len() + 2);
            wrapped.push(b'[');
            wrapped.extend_from_slice(data);
            wrapped.push(b']');
            parse_array(&wrapped)?
        }
    };

    let mut decoded = Vec::with_capacity(rows.len());
    let mut width: Option<usize> = None;

    for (row_index, row) in rows.into_iter().enumerate() {
        let JsonValue::Array(cells) = row else {
            return Err(Error::decode(
                0,
                format!("Row {} is not a JSON array", row_index),
            ));
        };

        match width {
            None => width = Some(cells.len()),
            Some(expected) if expected != cells.len() => {
                return Err(Error::decode(
                    0,
                    format!(
                        "Row {} has {} column(s), expected {}",
                        row_index,
                        cells.len(),
                        expected
                    ),
                ));
            }
            Some(_) => {}
        }

        decoded.push(cells.into_iter().map(json_to_value).collect());
    }

    Ok(decoded)
}

fn parse_array(data: &[u8]) -> Result<Vec<JsonValue>> {
    match serde_json::from_slice::<JsonValue>(data) {
        Ok(JsonValue::Array(items)) => Ok(items),
        Ok(_) => Err(Error::decode(0, "Rowset is not a JSON array")),
        Err(e) => Err(Error::decode(0, format!("Malformed JSON rowset: {}", e))),
    }
}

fn json_to_value(cell: JsonValue) -> Value {
    match cell {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Boolean(b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int64(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt64(u)
            } else {
                Value::Float64(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(s) => Value::Utf8(s),
        // Semi-structured cells are handed over as their JSON text
        nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => Value::Utf8(nested.to_string()),
    }
}
