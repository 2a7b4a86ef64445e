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

//! Result manifest: the chunk layout of one result set.
//!
//! A manifest is built once from the query response and never mutated.
//! Chunk indices are contiguous `0..total_chunks`; chunk 0 is always the
//! inline payload and chunks `1..total_chunks` are fetched remotely.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::collections::HashMap;

/// Encoding of chunk payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFormat {
    /// Row-oriented JSON rowset.
    RowText,
    /// Arrow IPC stream.
    ColumnarBinary,
}

impl ResultFormat {
    /// Parse the format tag used by the query response (`json` / `arrow`).
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::RowText),
            "arrow" | "arrow_force" => Ok(Self::ColumnarBinary),
            other => Err(Error::config(format!("Unknown result format '{}'", other))),
        }
    }
}

/// Compression applied to chunk payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompressionCodec {
    #[default]
    None,
    Lz4Frame,
}

impl CompressionCodec {
    /// Parse compression codec from manifest field value.
    pub fn from_manifest(value: Option<&str>) -> Self {
        match value {
            Some("LZ4_FRAME") => Self::Lz4Frame,
            _ => Self::None,
        }
    }
}

/// A chunk that has to be fetched from remote storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChunk {
    /// Index of this chunk in the result set (always >= 1).
    pub chunk_index: usize,
    /// Location to fetch the chunk bytes from.
    pub location: String,
    /// HTTP headers required by the storage endpoint.
    pub headers: HashMap<String, String>,
    /// Number of rows in this chunk, when the server reports it.
    pub row_count: Option<u64>,
    /// Size of the decompressed payload in bytes, when the server reports it.
    pub uncompressed_size: Option<u64>,
}

impl RemoteChunk {
    pub fn new(chunk_index: usize, location: impl Into<String>) -> Self {
        Self {
            chunk_index,
            location: location.into(),
            headers: HashMap::new(),
            row_count: None,
            uncompressed_size: None,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_row_count(mut self, row_count: u64) -> Self {
        self.row_count = Some(row_count);
        self
    }

    pub fn with_uncompressed_size(mut self, size: u64) -> Self {
        self.uncompressed_size = Some(size);
        self
    }
}

/// Immutable description of a result set's chunks.
#[derive(Debug, Clone)]
pub struct ResultManifest {
    pub format: ResultFormat,
    pub total_chunks: usize,
    /// Raw bytes of chunk 0. Present even when `total_chunks == 0`.
    pub inline_payload: Bytes,
    /// Chunks `1..total_chunks`, in index order.
    pub remote_chunks: Vec<RemoteChunk>,
    /// Codec of the remote chunk bodies.
    pub compression: CompressionCodec,
    /// Codec of `inline_payload`, which may differ from the remote one.
    pub inline_compression: CompressionCodec,
}

impl ResultManifest {
    /// Manifest whose only chunk is the inline payload.
    pub fn inline(format: ResultFormat, inline_payload: impl Into<Bytes>) -> Self {
        Self {
            format,
            total_chunks: 1,
            inline_payload: inline_payload.into(),
            remote_chunks: Vec::new(),
            compression: CompressionCodec::None,
            inline_compression: CompressionCodec::None,
        }
    }

    /// Manifest for a result with no chunks at all.
    pub fn empty(format: ResultFormat) -> Self {
        Self {
            format,
            total_chunks: 0,
            inline_payload: Bytes::new(),
            remote_chunks: Vec::new(),
            compression: CompressionCodec::None,
            inline_compression: CompressionCodec::None,
        }
    }

    /// Manifest with an inline chunk 0 followed by remote chunks.
    ///
    /// `total_chunks` is derived from the number of remote chunks.
    pub fn with_remote_chunks(
        format: ResultFormat,
        inline_payload: impl Into<Bytes>,
        remote_chunks: Vec<RemoteChunk>,
    ) -> Self {
        Self {
            format,
            total_chunks: remote_chunks.len() + 1,
            inline_payload: inline_payload.into(),
            remote_chunks,
            compression: CompressionCodec::None,
            inline_compression: CompressionCodec::None,
        }
    }

    /// Declare the codec of both the inline payload and the remote chunks.
    pub fn with_compression(mut self, compression: CompressionCodec) -> Self {
        self.compression = compression;
        self.inline_compression = compression;
        self
    }

    /// Override the codec of the inline payload only.
    pub fn with_inline_compression(mut self, compression: CompressionCodec) -> Self {
        self.inline_compression = compression;
        self
    }

    /// Check that chunk indices are contiguous and chunk 0 is not remote.
    pub fn validate(&self) -> Result<()> {
        let expected_remote = self.total_chunks.saturating_sub(1);
        if self.remote_chunks.len() != expected_remote {
            return Err(Error::config(format!(
                "Manifest declares {} chunk(s) but lists {} remote chunk(s), expected {}",
                self.total_chunks,
                self.remote_chunks.len(),
                expected_remote
            )));
        }

        for (position, chunk) in self.remote_chunks.iter().enumerate() {
            if chunk.chunk_index != position + 1 {
                return Err(Error::config(format!(
                    "Remote chunk at position {} has index {}, expected {}",
                    position,
                    chunk.chunk_index,
                    position + 1
                )));
            }
        }

        Ok(())
    }

    /// Remote chunk metadata for chunk `index` (>= 1).
    pub fn remote_chunk(&self, index: usize) -> Option<&RemoteChunk> {
        index
            .checked_sub(1)
            .and_then(|position| self.remote_chunks.get(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(count: usize) -> Vec<RemoteChunk> {
        (1..=count)
            .map(|i| RemoteChunk::new(i, format!("https://storage.example.com/chunk{}", i)))
            .collect()
    }

    #[test]
    fn test_result_format_from_tag() {
        assert_eq!(ResultFormat::from_tag("json").unwrap(), ResultFormat::RowText);
        assert_eq!(
            ResultFormat::from_tag("ARROW").unwrap(),
            ResultFormat::ColumnarBinary
        );
        assert!(ResultFormat::from_tag("parquet").is_err());
    }

    #[test]
    fn test_inline_compression_can_differ_from_remote() {
        let manifest = ResultManifest::with_remote_chunks(ResultFormat::RowText, "[]", remote(1))
            .with_compression(CompressionCodec::Lz4Frame);
        assert_eq!(manifest.inline_compression, CompressionCodec::Lz4Frame);

        let manifest = manifest.with_inline_compression(CompressionCodec::None);
        assert_eq!(manifest.compression, CompressionCodec::Lz4Frame);
        assert_eq!(manifest.inline_compression, CompressionCodec::None);
    }

    #[test]
    fn test_compression_codec_from_manifest() {
        assert_eq!(
            CompressionCodec::from_manifest(Some("LZ4_FRAME")),
            CompressionCodec::Lz4Frame
        );
        assert_eq!(
            CompressionCodec::from_manifest(Some("UNKNOWN")),
            CompressionCodec::None
        );
        assert_eq!(CompressionCodec::from_manifest(None), CompressionCodec::None);
    }

    #[test]
    fn test_manifest_validate_ok() {
        let manifest = ResultManifest::with_remote_chunks(ResultFormat::RowText, "[]", remote(3));
        assert_eq!(manifest.total_chunks, 4);
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.remote_chunk(2).unwrap().chunk_index, 2);
        assert!(manifest.remote_chunk(0).is_none());
        assert!(manifest.remote_chunk(4).is_none());
    }

    #[test]
    fn test_manifest_validate_count_mismatch() {
        let mut manifest =
            ResultManifest::with_remote_chunks(ResultFormat::RowText, "[]", remote(2));
        manifest.total_chunks = 5;
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("lists 2 remote chunk(s)"));
    }

    #[test]
    fn test_manifest_validate_non_contiguous() {
        let mut chunks = remote(3);
        chunks[1].chunk_index = 7;
        let manifest = ResultManifest::with_remote_chunks(ResultFormat::RowText, "[]", chunks);
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_empty_manifest_is_valid() {
        let manifest = ResultManifest::empty(ResultFormat::ColumnarBinary);
        assert_eq!(manifest.total_chunks, 0);
        assert!(manifest.validate().is_ok());
    }
}
