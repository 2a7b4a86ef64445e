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

//! Arrow IPC stream parsing for columnar chunks.
//!
//! The stream header is validated before any batch is read. A chunk that
//! fails validation, or any batch that fails to decode, rejects the whole
//! chunk: no partially decoded batches are ever returned.

use crate::error::{Error, Result};
use arrow_array::RecordBatch;
use arrow_ipc::reader::StreamReader;
use arrow_schema::SchemaRef;
use std::io::Cursor;

/// Marker preceding every message in the current IPC stream format.
const CONTINUATION_MARKER: u32 = 0xFFFF_FFFF;

/// Decoded columnar chunk.
#[derive(Debug, Clone)]
pub struct ColumnarChunk {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl ColumnarChunk {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

/// Check that `data` starts with a complete IPC message header.
///
/// Accepts both the continuation-prefixed layout and the legacy layout
/// where the message starts directly with its metadata length.
fn validate_stream_header(data: &[u8]) -> Result<()> {
    let read_u32 = |offset: usize| -> Option<u32> {
        data.get(offset..offset + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    };

    let first = read_u32(0).ok_or_else(|| {
        Error::decode(
            0,
            format!("Arrow stream header truncated ({} bytes)", data.len()),
        )
    })?;

    let (prefix_len, metadata_len) = if first == CONTINUATION_MARKER {
        let len = read_u32(4).ok_or_else(|| {
            Error::decode(0, "Arrow stream header truncated after continuation marker")
        })?;
        (8usize, len)
    } else {
        (4usize, first)
    };

    let metadata_len = i32::try_from(metadata_len)
        .map_err(|_| Error::decode(0, "Arrow stream header has a negative metadata length"))?
        as usize;

    if metadata_len == 0 {
        return Err(Error::decode(0, "Arrow stream has no schema message"));
    }

    if prefix_len + metadata_len > data.len() {
        return Err(Error::decode(
            0,
            format!(
                "Arrow stream header declares {} bytes of metadata but only {} are available",
                metadata_len,
                data.len() - prefix_len
            ),
        ));
    }

    Ok(())
}

/// Parse an Arrow IPC stream into its schema and record batches.
///
/// A single chunk may contain zero or more batches; row order is preserved.
pub fn parse_arrow_ipc(data: &[u8]) -> Result<ColumnarChunk> {
    // 1. Header check before touching the IPC reader
    validate_stream_header(data)?;

    // 2. Schema message
    let reader = StreamReader::try_new(Cursor::new(data), None).map_err(|e| {
        Error::decode(0, format!("Failed to create Arrow IPC reader: {}", e))
    })?;
    let schema = reader.schema();

    // 3. Collect all batches from the stream
    let batches: Vec<RecordBatch> = reader
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::decode(0, format!("Failed to read Arrow batches: {}", e)))?;

    Ok(ColumnarChunk { schema, batches })
}
