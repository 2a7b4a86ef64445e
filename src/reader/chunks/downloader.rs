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

//! Downloader for orchestrating chunk retrieval.
//!
//! This is the main component that coordinates:
//! - Validation of configuration, manifest and consumption mode
//! - Synchronous decoding of the inline chunk 0 before any task is spawned
//! - A bounded pool of download workers for chunks `1..total_chunks`
//! - Close and context cancellation

use crate::client::ChunkTransport;
use crate::error::{CancelReason, Error, Result};
use crate::reader::chunks::chunk_fetcher::ChunkFetcher;
use crate::reader::chunks::download_workers::spawn_download_workers;
use crate::reader::chunks::pipeline::Pipeline;
use crate::reader::chunks::row_iterator::RowIterator;
use crate::reader::chunks::slots::{lock, ChunkPayload};
use crate::reader::format::{self, decompress, ChunkSource, DecodedChunk};
use crate::types::config::{ConsumptionMode, DownloaderConfig};
use crate::types::manifest::{CompressionCodec, ResultFormat, ResultManifest};
use arrow_schema::SchemaRef;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Lifecycle state of a [`Downloader`].
///
/// `Done`, `Poisoned` and `Closed` are terminal; the first one reached sticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloaderState {
    Running,
    /// Every chunk has been consumed.
    Done,
    /// A chunk failed terminally.
    Poisoned,
    /// Closed explicitly or through context cancellation.
    Closed,
}

/// Point-in-time counters for a [`Downloader`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloaderStats {
    /// Remote chunks handed to a worker.
    pub dispatched: usize,
    /// Remote chunks whose worker finished (successfully or not).
    pub completed: usize,
    /// Bytes held by decoded chunks the iterator has not taken yet.
    pub buffered_bytes: u64,
}

struct Inner {
    pipeline: Arc<Pipeline>,
    mode: ConsumptionMode,
    /// Captured from the first columnar chunk that carries one.
    schema: OnceLock<SchemaRef>,
    context: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

/// Handle to one result set's chunk retrieval.
///
/// Cloning is cheap; every clone controls the same downloader. The
/// [`RowIterator`] returned by [`Downloader::start`] closes it on drop.
#[derive(Clone)]
pub struct Downloader {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("mode", &self.inner.mode)
            .field("total_chunks", &self.inner.pipeline.total_chunks())
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Downloader {
    /// Start retrieving a result set.
    ///
    /// Chunk 0 is decoded on the calling thread first; if it is invalid the
    /// error is returned and no worker is ever spawned. Workers are spawned
    /// on the current tokio runtime only when remote chunks exist.
    ///
    /// # Arguments
    /// * `manifest` - Chunk layout of the result set
    /// * `mode` - Row or raw batch consumption, fixed for the downloader's lifetime
    /// * `config` - Worker pool, prefetch window, retry and memory settings
    /// * `transport` - Byte-fetch capability for remote chunks
    /// * `context` - Governing cancellation token of the query
    pub fn start(
        manifest: ResultManifest,
        mode: ConsumptionMode,
        config: DownloaderConfig,
        transport: Arc<dyn ChunkTransport>,
        context: CancellationToken,
    ) -> Result<RowIterator> {
        config.validate()?;
        manifest.validate()?;

        if mode == ConsumptionMode::RawBatchStream && manifest.format == ResultFormat::RowText {
            return Err(Error::config(
                "RawBatchStream mode requires a ColumnarBinary result; \
                 row-text results have no batch representation",
            ));
        }

        let chunk_zero = decode_inline_chunk(&manifest, &config)?;
        let schema = OnceLock::new();
        if let DecodedChunk::Batches(columnar) = &chunk_zero.chunk {
            if !columnar.schema.fields().is_empty() {
                let _ = schema.set(Arc::clone(&columnar.schema));
            }
        }

        debug!(
            "Starting downloader: format={:?}, mode={:?}, total_chunks={}, chunk 0 has {} rows",
            manifest.format,
            mode,
            manifest.total_chunks,
            chunk_zero.chunk.num_rows()
        );

        let fetcher = ChunkFetcher::new(transport, manifest.compression, &config)
            .with_context(context.clone());
        let stop = context.child_token();
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(manifest),
            chunk_zero,
            fetcher,
            config.prefetch_window,
            config.max_buffered_bytes,
            stop,
        ));

        let remote_chunks = pipeline.total_chunks().saturating_sub(1);
        let worker_count = config.num_workers.min(remote_chunks);
        let workers = if worker_count > 0 && !context.is_cancelled() {
            let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
                Error::config(format!("Downloader must be started within a tokio runtime: {}", e))
            })?;
            info!(
                "Fetching {} remote chunk(s) with {} worker(s), prefetch window {}",
                remote_chunks, worker_count, config.prefetch_window
            );
            spawn_download_workers(&pipeline, worker_count, &runtime)
        } else {
            Vec::new()
        };

        let downloader = Downloader {
            inner: Arc::new(Inner {
                pipeline,
                mode,
                schema,
                context,
                worker_count: workers.len(),
                workers: Mutex::new(workers),
            }),
        };

        Ok(RowIterator::new(downloader))
    }

    /// Stop dispatch, cancel in-flight fetches and release all buffered chunks.
    ///
    /// Idempotent, and safe to call while a `next_row()` / `next_batches()`
    /// call is waiting: that call returns `Cancelled`.
    pub fn close(&self) {
        if self.inner.pipeline.close() {
            debug!("Closing downloader");
            for handle in lock(&self.inner.workers).drain(..) {
                handle.abort();
            }
        }
    }

    pub fn state(&self) -> DownloaderState {
        self.inner.pipeline.state()
    }

    pub fn stats(&self) -> DownloaderStats {
        self.inner.pipeline.stats()
    }

    /// Arrow schema of a ColumnarBinary result.
    ///
    /// Known from start when chunk 0 carries rows or a schema message;
    /// otherwise set once the iterator reaches the first remote chunk.
    pub fn schema(&self) -> Option<SchemaRef> {
        self.inner.schema.get().cloned()
    }

    pub(crate) fn record_schema(&self, schema: &SchemaRef) {
        if !schema.fields().is_empty() {
            let _ = self.inner.schema.get_or_init(|| Arc::clone(schema));
        }
    }

    pub fn mode(&self) -> ConsumptionMode {
        self.inner.mode
    }

    pub fn format(&self) -> ResultFormat {
        self.inner.pipeline.format()
    }

    pub fn total_chunks(&self) -> usize {
        self.inner.pipeline.total_chunks()
    }

    /// Number of download workers spawned at start.
    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }

    pub(crate) fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    /// Whether close or context cancellation has taken effect.
    pub(crate) fn is_stopped(&self) -> bool {
        self.inner.pipeline.stop_token().is_cancelled()
    }

    pub(crate) fn cancel_reason(&self) -> CancelReason {
        if self.inner.context.is_cancelled() {
            CancelReason::Context
        } else {
            CancelReason::Closed
        }
    }
}

/// Decode the inline payload as chunk 0.
///
/// An empty payload is accepted without decoding when there are no chunks,
/// and for columnar results whose rows all live in remote chunks.
fn decode_inline_chunk(
    manifest: &ResultManifest,
    config: &DownloaderConfig,
) -> Result<ChunkPayload> {
    let payload = manifest.inline_payload.clone();

    let skip_decode = payload.is_empty()
        && (manifest.total_chunks == 0
            || (manifest.format == ResultFormat::ColumnarBinary && manifest.total_chunks > 1));
    if skip_decode {
        return Ok(ChunkPayload {
            chunk: DecodedChunk::empty(manifest.format),
            size_bytes: 0,
        });
    }

    let codec = if config.decompress {
        manifest.inline_compression
    } else {
        CompressionCodec::None
    };
    let bytes = decompress(payload, codec)?;
    let chunk = format::decode(&bytes, manifest.format, ChunkSource::Inline)?;

    if manifest.total_chunks == 0 && chunk.num_rows() > 0 {
        debug!(
            "Ignoring {} row(s) in inline payload of a result with no chunks",
            chunk.num_rows()
        );
    }

    Ok(ChunkPayload {
        chunk,
        size_bytes: bytes.len() as u64,
    })
}
