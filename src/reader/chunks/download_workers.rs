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

//! Download workers for the chunk pipeline.
//!
//! Workers are long-lived tokio tasks. Each one repeatedly claims the next
//! chunk index from the [`Pipeline`], fetches and decodes it, and settles the
//! chunk's slot. A worker exits when there is nothing left to claim: every
//! chunk has been dispatched, the pipeline is poisoned, or it was closed.

use crate::error::{Error, Result};
use crate::reader::chunks::pipeline::Pipeline;
use crate::reader::chunks::slots::ChunkPayload;
use crate::reader::format::{self, ChunkSource};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Spawns `num_workers` download workers on `runtime`.
///
/// # Returns
///
/// A vector of `JoinHandle`s for the spawned worker tasks.
pub(crate) fn spawn_download_workers(
    pipeline: &Arc<Pipeline>,
    num_workers: usize,
    runtime: &Handle,
) -> Vec<JoinHandle<()>> {
    debug!(
        "Spawning {} download workers for {} remote chunk(s)",
        num_workers,
        pipeline.total_chunks().saturating_sub(1)
    );

    (0..num_workers)
        .map(|worker_id| {
            let pipeline = Arc::clone(pipeline);
            runtime.spawn(async move {
                worker_task(worker_id, pipeline).await;
            })
        })
        .collect()
}

/// The main worker loop: claim, fetch, decode, settle.
async fn worker_task(worker_id: usize, pipeline: Arc<Pipeline>) {
    debug!("Worker {} started", worker_id);

    while let Some(chunk_index) = pipeline.next_task().await {
        trace!("Worker {} claimed chunk {}", worker_id, chunk_index);

        let result = process_chunk(&pipeline, chunk_index).await;
        pipeline.complete(chunk_index, result);
    }

    debug!("Worker {} exiting", worker_id);
}

/// Fetch and decode one remote chunk.
async fn process_chunk(pipeline: &Pipeline, chunk_index: usize) -> Result<ChunkPayload> {
    let chunk = pipeline.remote_chunk(chunk_index).ok_or_else(|| {
        Error::config(format!("Manifest has no location for chunk {}", chunk_index))
    })?;
    let slot = pipeline
        .slots
        .get(chunk_index)
        .ok_or_else(|| Error::config(format!("No slot for chunk {}", chunk_index)))?;

    let bytes = pipeline.fetcher.fetch(chunk, slot.cancel_token()).await?;

    let decoded = format::decode(&bytes, pipeline.format(), ChunkSource::Remote)
        .map_err(|e| e.at_chunk(chunk_index))?;

    debug!(
        "Decoded chunk {}: {} rows from {} bytes",
        chunk_index,
        decoded.num_rows(),
        bytes.len()
    );

    Ok(ChunkPayload {
        chunk: decoded,
        size_bytes: bytes.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChunkTransport, TransportError, TransportResponse};
    use crate::error::ErrorKind;
    use crate::reader::chunks::chunk_fetcher::ChunkFetcher;
    use crate::reader::chunks::slots::Settled;
    use crate::reader::format::DecodedChunk;
    use crate::types::config::DownloaderConfig;
    use crate::types::manifest::{CompressionCodec, RemoteChunk, ResultFormat, ResultManifest};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    /// Serves `["<n>"]` for location `chunk<n>`, 404 for `missing`.
    #[derive(Debug, Default)]
    struct IndexEchoTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChunkTransport for IndexEchoTransport {
        async fn get(
            &self,
            location: &str,
            _headers: &HashMap<String, String>,
        ) -> std::result::Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match location.strip_prefix("chunk") {
                Some(n) => Ok(TransportResponse::new(200, format!("[\"{}\"]", n))),
                None => Ok(TransportResponse::new(404, "")),
            }
        }
    }

    fn build_pipeline(locations: &[&str], transport: Arc<IndexEchoTransport>) -> Arc<Pipeline> {
        let remote = locations
            .iter()
            .enumerate()
            .map(|(i, location)| RemoteChunk::new(i + 1, *location))
            .collect();
        let manifest = ResultManifest::with_remote_chunks(ResultFormat::RowText, "", remote);
        let config = DownloaderConfig {
            max_fetch_attempts: 1,
            ..Default::default()
        };
        let fetcher = ChunkFetcher::new(transport, CompressionCodec::None, &config);
        Arc::new(Pipeline::new(
            Arc::new(manifest),
            ChunkPayload {
                chunk: DecodedChunk::Rows(vec![]),
                size_bytes: 0,
            },
            fetcher,
            8,
            u64::MAX,
            CancellationToken::new(),
        ))
    }

    #[tokio::test]
    async fn test_workers_settle_every_chunk() {
        let transport = Arc::new(IndexEchoTransport::default());
        let pipeline = build_pipeline(&["chunk1", "chunk2", "chunk3"], transport.clone());

        let handles = spawn_download_workers(&pipeline, 2, &Handle::current());

        for index in 1..4 {
            match pipeline.take(index).await {
                Some(Settled::Ready(payload)) => assert_eq!(payload.chunk.num_rows(), 1),
                other => panic!("chunk {}: unexpected {:?}", index, other),
            }
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert_eq!(pipeline.stats().completed, 3);
    }

    #[tokio::test]
    async fn test_failed_fetch_settles_slot_as_failed() {
        let transport = Arc::new(IndexEchoTransport::default());
        let pipeline = build_pipeline(&["chunk1", "missing"], transport);

        let handles = spawn_download_workers(&pipeline, 1, &Handle::current());

        assert!(matches!(pipeline.take(1).await, Some(Settled::Ready(_))));
        match pipeline.take(2).await {
            Some(Settled::Failed(e)) => {
                assert_eq!(e.kind(), ErrorKind::Fetch);
                assert_eq!(e.chunk_index(), Some(2));
            }
            other => panic!("unexpected {:?}", other),
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_workers_exit_on_close() {
        let transport = Arc::new(IndexEchoTransport::default());
        // Window of 8 with 20 chunks: workers block once the window is full
        let locations: Vec<String> = (1..=20).map(|i| format!("chunk{}", i)).collect();
        let refs: Vec<&str> = locations.iter().map(String::as_str).collect();
        let pipeline = build_pipeline(&refs, transport);

        let handles = spawn_download_workers(&pipeline, 4, &Handle::current());
        assert!(matches!(pipeline.take(1).await, Some(Settled::Ready(_))));

        pipeline.close();
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(pipeline.stats().dispatched < 20);
    }
}
