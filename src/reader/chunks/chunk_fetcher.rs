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

//! ChunkFetcher for downloading remote chunk bytes.
//!
//! This module handles fetching chunk data from its location, including
//! request headers, retry with exponential backoff, cancellation, speed
//! monitoring and decompression.
//!
//! ## Retry Behavior
//!
//! | Outcome | Retried | Sleep before retry |
//! |---|---|---|
//! | Transport error marked retryable (connect, timeout) | Yes | Yes |
//! | 408 / 429 / 5xx | Yes | Yes |
//! | Any other non-2xx status | No | - |
//! | Transport error marked fatal | No | - |
//!
//! Every attempt, including the first, counts against `max_fetch_attempts`.
//! Cancellation is checked while the request is in flight and while sleeping.

use crate::client::ChunkTransport;
use crate::error::{CancelReason, Error, Result};
use crate::reader::chunks::backoff::Backoff;
use crate::reader::format::decompress;
use crate::types::config::DownloaderConfig;
use crate::types::manifest::{CompressionCodec, RemoteChunk};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Longest slice of an error response body kept in the error message.
const ERROR_BODY_PREVIEW: usize = 200;

/// Whether a response status is worth repeating the request for.
fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

/// Downloads chunk bytes over a [`ChunkTransport`].
#[derive(Debug)]
pub struct ChunkFetcher {
    transport: Arc<dyn ChunkTransport>,
    compression: CompressionCodec,
    max_attempts: u32,
    backoff: Backoff,
    speed_threshold_mbps: f64,
    /// Governing query context, used to tell caller cancellation from close.
    context: Option<CancellationToken>,
}

impl ChunkFetcher {
    /// Create a new chunk fetcher.
    ///
    /// # Arguments
    /// * `transport` - Byte-fetch capability used for every attempt
    /// * `compression` - Codec declared by the manifest
    /// * `config` - Retry, backoff and decompression settings
    pub fn new(
        transport: Arc<dyn ChunkTransport>,
        compression: CompressionCodec,
        config: &DownloaderConfig,
    ) -> Self {
        let compression = if config.decompress {
            compression
        } else {
            CompressionCodec::None
        };

        Self {
            transport,
            compression,
            max_attempts: config.max_fetch_attempts,
            backoff: Backoff::from(config),
            speed_threshold_mbps: config.speed_threshold_mbps,
            context: None,
        }
    }

    /// Attribute cancellations to `context` when it is the token that fired.
    pub fn with_context(mut self, context: CancellationToken) -> Self {
        self.context = Some(context);
        self
    }

    fn cancel_reason(&self) -> CancelReason {
        match &self.context {
            Some(context) if context.is_cancelled() => CancelReason::Context,
            _ => CancelReason::Closed,
        }
    }

    /// Fetch the bytes of `chunk`, retrying per policy.
    ///
    /// # Returns
    /// The decompressed chunk body, a `Fetch` error once the request failed
    /// terminally, or `Cancelled` if `cancel` fired first.
    pub async fn fetch(&self, chunk: &RemoteChunk, cancel: &CancellationToken) -> Result<Bytes> {
        let index = chunk.chunk_index;
        let mut previous_delay = None;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let start = Instant::now();

            debug!(
                "Fetching chunk {} (attempt {}/{})",
                index, attempt, self.max_attempts
            );

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(Error::cancelled(Some(index), self.cancel_reason()));
                }
                outcome = self.transport.get(&chunk.location, &chunk.headers) => outcome,
            };

            let (status, message, retryable) = match outcome {
                Ok(response) if response.is_success() => {
                    self.log_throughput(index, response.body.len(), start);
                    return decompress(response.body, self.compression)
                        .map_err(|e| e.at_chunk(index));
                }
                Ok(response) => {
                    let preview_len = response.body.len().min(ERROR_BODY_PREVIEW);
                    let preview = String::from_utf8_lossy(&response.body[..preview_len]);
                    (
                        Some(response.status),
                        format!("HTTP {} - {}", response.status, preview),
                        is_retryable_status(response.status),
                    )
                }
                Err(e) => (None, e.message, e.retryable),
            };

            if !retryable || attempt >= self.max_attempts {
                error!(
                    "Chunk {} fetch failed after {} attempt(s): {}",
                    index, attempt, message
                );
                return Err(Error::Fetch {
                    chunk_index: index,
                    attempts: attempt,
                    status,
                    message,
                });
            }

            let delay = self.backoff.next_delay(previous_delay);
            previous_delay = Some(delay);

            warn!(
                "Chunk {} fetch failed (attempt {}/{}): {}, retrying in {:?}",
                index, attempt, self.max_attempts, message, delay
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(Error::cancelled(Some(index), self.cancel_reason()));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn log_throughput(&self, index: usize, len: usize, start: Instant) {
        let elapsed = start.elapsed().as_secs_f64();
        let size_mb = len as f64 / 1024.0 / 1024.0;
        let speed_mbps = if elapsed > 0.0 {
            size_mb / elapsed
        } else {
            f64::INFINITY
        };

        debug!(
            "Downloaded chunk {}: {:.2} MB in {:.2}s ({:.2} MB/s)",
            index, size_mb, elapsed, speed_mbps
        );

        if speed_mbps < self.speed_threshold_mbps {
            warn!(
                "Chunk download slower than threshold: {:.2} MB/s (threshold: {:.2} MB/s)",
                speed_mbps, self.speed_threshold_mbps
            );
        }
    }
}
