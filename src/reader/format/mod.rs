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

//! Chunk payload decoding.
//!
//! The decoder is selected once from the manifest's [`ResultFormat`]:
//! - `RowText`: JSON rowset parsed into [`Row`]s
//! - `ColumnarBinary`: Arrow IPC stream parsed into record batches
//!
//! Decoding is pure: the same bytes from the same source always produce the
//! same result.

pub mod arrow_parser;
pub mod compression;
pub mod convert;
pub mod json_rowset;

use crate::error::Result;
use crate::types::manifest::ResultFormat;
use crate::types::value::Row;

pub use arrow_parser::{parse_arrow_ipc, ColumnarChunk};
pub use compression::decompress;
pub use convert::batch_to_rows;
pub use json_rowset::{parse_json_rowset, RowsetLayout};

/// Where a chunk's bytes came from.
///
/// Row-text framing differs between the two: the inline rowset is one JSON
/// array, remote chunks are unbracketed row sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSource {
    /// Chunk 0, carried in the query response.
    Inline,
    /// Chunks `1..N`, downloaded by the workers.
    Remote,
}

impl ChunkSource {
    fn rowset_layout(self) -> RowsetLayout {
        match self {
            ChunkSource::Inline => RowsetLayout::Bracketed,
            ChunkSource::Remote => RowsetLayout::Unbracketed,
        }
    }
}

/// Decoded contents of one chunk.
#[derive(Debug, Clone)]
pub enum DecodedChunk {
    Rows(Vec<Row>),
    Batches(ColumnarChunk),
}

impl DecodedChunk {
    /// Number of rows in the chunk.
    pub fn num_rows(&self) -> usize {
        match self {
            DecodedChunk::Rows(rows) => rows.len(),
            DecodedChunk::Batches(chunk) => chunk.num_rows(),
        }
    }

    /// An empty chunk of the given format.
    pub(crate) fn empty(format: ResultFormat) -> Self {
        match format {
            ResultFormat::RowText => DecodedChunk::Rows(Vec::new()),
            ResultFormat::ColumnarBinary => DecodedChunk::Batches(ColumnarChunk {
                schema: std::sync::Arc::new(arrow_schema::Schema::empty()),
                batches: Vec::new(),
            }),
        }
    }
}

/// Decode a chunk's (already decompressed) bytes according to `format`.
///
/// Errors are attributed to chunk 0; callers re-attribute them with the
/// index of the chunk the bytes belong to.
pub fn decode(data: &[u8], format: ResultFormat, source: ChunkSource) -> Result<DecodedChunk> {
    match format {
        ResultFormat::RowText => {
            parse_json_rowset(data, source.rowset_layout()).map(DecodedChunk::Rows)
        }
        ResultFormat::ColumnarBinary => parse_arrow_ipc(data).map(DecodedChunk::Batches),
    }
}
