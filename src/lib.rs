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

//! Chunked Query Result Retrieval for Rust
//!
//! This crate implements the client-side result path of a database driver:
//! after a query executes, the server describes the result as an inline first
//! chunk plus zero or more remote chunks. The crate downloads the remote chunks
//! with bounded concurrency and delivers their rows as one ordered stream.
//!
//! ## Overview
//!
//! - [`Downloader`] - Starts retrieval for one [`ResultManifest`] and owns the
//!   worker pool
//! - [`RowIterator`] - Ordered consumption, row by row or as raw Arrow batches
//! - [`ChunkTransport`] - Pluggable byte fetch; [`HttpTransport`] is bundled
//! - [`BlockingRowReader`] / [`BlockingBatchReader`] - Synchronous adapters
//!
//! ## Features
//!
//! - **Bounded prefetch**: at most `num_workers` fetches and `prefetch_window`
//!   chunks ahead of the consumer, with a buffered-bytes ceiling
//! - **Retry**: capped exponential backoff for transient failures
//! - **Formats**: JSON row sets and Arrow IPC streams with optional LZ4 frame
//!   compression
//!
//! ## Example
//!
//! ```ignore
//! use result_chunks::{
//!     ConsumptionMode, Downloader, DownloaderConfig, HttpClientConfig, HttpTransport,
//!     QueryResultResponse,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let manifest = QueryResultResponse::from_json(&body)?.into_manifest()?;
//! let transport = Arc::new(HttpTransport::new(HttpClientConfig::default())?);
//! let mut rows = Downloader::start(
//!     manifest,
//!     ConsumptionMode::RowStream,
//!     DownloaderConfig::default(),
//!     transport,
//!     CancellationToken::new(),
//! )?;
//! while let Some(row) = rows.next_row().await? {
//!     println!("{:?}", row);
//! }
//! ```
//!
//! ## Configuration Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `chunks.num_workers` | 4 | Concurrent chunk fetches |
//! | `chunks.prefetch_window` | 8 | Chunks fetched ahead of the consumer |
//! | `chunks.max_fetch_attempts` | 5 | Attempts per chunk |
//! | `chunks.backoff_base_ms` | 250 | First retry delay |
//! | `chunks.backoff_cap_ms` | 8000 | Maximum retry delay |
//! | `chunks.decompress` | true | Apply the manifest's compression codec |
//! | `chunks.max_buffered_bytes` | 268435456 | Memory ceiling for fetched chunks |
//! | `chunks.speed_threshold_mbps` | 0.1 | Slow download warning threshold |

pub mod client;
pub mod error;
pub mod logging;
pub mod reader;
pub mod types;

pub use client::{
    ChunkTransport, HttpClientConfig, HttpTransport, TransportError, TransportResponse,
};
pub use error::{CancelReason, Error, ErrorKind, Result};
pub use logging::{init_logging, LogConfig};
pub use reader::chunks::{Downloader, DownloaderState, DownloaderStats, RowIterator};
pub use reader::{BlockingBatchReader, BlockingRowReader};
pub use types::{
    CompressionCodec, ConsumptionMode, DownloaderConfig, QueryResultResponse, RemoteChunk,
    ResultFormat, ResultManifest, Row, Value,
};
