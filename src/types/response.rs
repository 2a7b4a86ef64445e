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

//! Query response types and their conversion into a [`ResultManifest`].
//!
//! These types map the JSON `data` object returned by the query-execution
//! endpoint. Only the fields needed to locate and decode result chunks are
//! modelled.

use crate::error::{Error, Result};
use crate::types::manifest::{CompressionCodec, RemoteChunk, ResultFormat, ResultManifest};
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Header carrying the SSE-C algorithm for encrypted chunk storage.
pub const SSE_C_ALGORITHM_HEADER: &str = "x-amz-server-side-encryption-customer-algorithm";
/// Header carrying the SSE-C key for encrypted chunk storage.
pub const SSE_C_KEY_HEADER: &str = "x-amz-server-side-encryption-customer-key";
const SSE_C_AES: &str = "AES256";

/// Result section of a query response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultResponse {
    /// `json` or `arrow`.
    pub query_result_format: String,
    /// Inline JSON rows (row-text results).
    #[serde(default)]
    pub rowset: Option<serde_json::Value>,
    /// Inline Arrow IPC stream, base64 encoded (columnar results).
    #[serde(default)]
    pub rowset_base64: Option<String>,
    /// Total number of rows across all chunks.
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub chunks: Vec<ChunkDescriptor>,
    /// Headers to send with every chunk request.
    #[serde(default)]
    pub chunk_headers: Option<HashMap<String, String>>,
    /// Master key for SSE-C encrypted chunks, used when no headers are given.
    #[serde(default)]
    pub qrmk: Option<String>,
    /// Compression codec of chunk payloads ("LZ4_FRAME" or absent).
    #[serde(default)]
    pub result_compression: Option<String>,
}

/// Location and size of one remote chunk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    pub url: String,
    #[serde(default)]
    pub row_count: Option<u64>,
    #[serde(default)]
    pub uncompressed_size: Option<u64>,
    #[serde(default)]
    pub compressed_size: Option<u64>,
}

impl QueryResultResponse {
    /// Parse the response from its JSON body.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| Error::config(format!("Failed to parse query response: {}", e)))
    }

    /// Build the manifest consumed by the downloader.
    ///
    /// The inline payload is base64-decoded here; invalid base64 is reported
    /// as a decode error for chunk 0.
    pub fn into_manifest(self) -> Result<ResultManifest> {
        let format = ResultFormat::from_tag(&self.query_result_format)?;
        let compression = CompressionCodec::from_manifest(self.result_compression.as_deref());

        // A re-serialized JSON rowset never went through the codec
        let inline_compression = match format {
            ResultFormat::ColumnarBinary => compression,
            ResultFormat::RowText => CompressionCodec::None,
        };

        let inline_payload = match format {
            ResultFormat::ColumnarBinary => match self.rowset_base64.as_deref() {
                Some(encoded) if !encoded.trim().is_empty() => {
                    let decoded = STANDARD.decode(encoded.trim()).map_err(|e| {
                        Error::decode(0, format!("Inline rowset is not valid base64: {}", e))
                    })?;
                    Bytes::from(decoded)
                }
                _ => Bytes::new(),
            },
            ResultFormat::RowText => match &self.rowset {
                Some(rows) => Bytes::from(serde_json::to_vec(rows).map_err(|e| {
                    Error::decode(0, format!("Failed to serialize inline rowset: {}", e))
                })?),
                None => Bytes::new(),
            },
        };

        let headers = self.remote_chunk_headers();
        let remote_chunks: Vec<RemoteChunk> = self
            .chunks
            .into_iter()
            .enumerate()
            .map(|(position, descriptor)| RemoteChunk {
                chunk_index: position + 1,
                location: descriptor.url,
                headers: headers.clone(),
                row_count: descriptor.row_count,
                uncompressed_size: descriptor.uncompressed_size.or(descriptor.compressed_size),
            })
            .collect();

        if inline_payload.is_empty() && remote_chunks.is_empty() {
            debug!("Query response carries no result data, using empty manifest");
            return Ok(ResultManifest::empty(format)
                .with_compression(compression)
                .with_inline_compression(inline_compression));
        }

        debug!(
            "Query response: format={:?}, inline={} bytes, remote_chunks={}, total_rows={:?}",
            format,
            inline_payload.len(),
            remote_chunks.len(),
            self.total
        );

        Ok(
            ResultManifest::with_remote_chunks(format, inline_payload, remote_chunks)
                .with_compression(compression)
                .with_inline_compression(inline_compression),
        )
    }

    fn remote_chunk_headers(&self) -> HashMap<String, String> {
        if let Some(headers) = &self.chunk_headers {
            if !headers.is_empty() {
                return headers.clone();
            }
        }
        match &self.qrmk {
            Some(key) if !key.is_empty() => HashMap::from([
                (SSE_C_ALGORITHM_HEADER.to_string(), SSE_C_AES.to_string()),
                (SSE_C_KEY_HEADER.to_string(), key.clone()),
            ]),
            _ => HashMap::new(),
        }
    }
}
