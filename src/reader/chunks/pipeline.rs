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

//! Shared state of the chunk download pipeline.
//!
//! ```text
//!                       claim (window + memory ceiling)
//! [Dispatch cursor] ------------------------------------> [Download Workers]
//!        ^                                                       |
//!        | consumer advanced / bytes released        fetch + decode
//!        |                                                       v
//! [Row Iterator] <------- wait per slot, in index order ---- [Slot Table]
//! ```
//!
//! The dispatch cursor, consumer position, poison index and buffered byte
//! count live under one mutex. Slot payloads are only touched by their
//! worker and by the iterator.

use crate::error::{ErrorKind, Result};
use crate::reader::chunks::chunk_fetcher::ChunkFetcher;
use crate::reader::chunks::downloader::{DownloaderState, DownloaderStats};
use crate::reader::chunks::slots::{lock, ChunkPayload, Settled, SlotTable};
use crate::types::manifest::{RemoteChunk, ResultFormat, ResultManifest};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Mutable dispatch bookkeeping shared by workers and the iterator.
#[derive(Debug)]
struct DispatchState {
    /// Next chunk index not yet assigned to a worker.
    next_dispatch: usize,
    /// Number of chunks the iterator has fully consumed.
    consumed: usize,
    /// Lowest chunk index that failed terminally.
    poisoned_at: Option<usize>,
    closed: bool,
    /// Bytes held by settled chunks the iterator has not taken yet.
    buffered_bytes: u64,
    dispatched: usize,
    completed: usize,
    /// First terminal state reached.
    terminal: Option<DownloaderState>,
}

/// Result of one attempt to claim work.
#[derive(Debug, PartialEq, Eq)]
enum Claim {
    Dispatch(usize),
    Wait,
    Finished,
}

/// State shared between the downloader, its workers and the iterator.
#[derive(Debug)]
pub(crate) struct Pipeline {
    manifest: Arc<ResultManifest>,
    pub(crate) slots: SlotTable,
    pub(crate) fetcher: ChunkFetcher,
    state: Mutex<DispatchState>,
    changed: Notify,
    prefetch_window: usize,
    max_buffered_bytes: u64,
    /// Cancelled on close; child of the caller's context token.
    stop: CancellationToken,
}

impl Pipeline {
    pub(crate) fn new(
        manifest: Arc<ResultManifest>,
        chunk_zero: ChunkPayload,
        fetcher: ChunkFetcher,
        prefetch_window: usize,
        max_buffered_bytes: u64,
        stop: CancellationToken,
    ) -> Self {
        let buffered_bytes = if manifest.total_chunks > 0 {
            chunk_zero.size_bytes
        } else {
            0
        };
        let slots = SlotTable::new(manifest.total_chunks, chunk_zero, &stop);

        Self {
            manifest,
            slots,
            fetcher,
            state: Mutex::new(DispatchState {
                // Chunk 0 is inline and never dispatched
                next_dispatch: 1,
                consumed: 0,
                poisoned_at: None,
                closed: false,
                buffered_bytes,
                dispatched: 0,
                completed: 0,
                terminal: None,
            }),
            changed: Notify::new(),
            prefetch_window,
            max_buffered_bytes,
            stop,
        }
    }

    pub(crate) fn total_chunks(&self) -> usize {
        self.manifest.total_chunks
    }

    pub(crate) fn format(&self) -> ResultFormat {
        self.manifest.format
    }

    pub(crate) fn remote_chunk(&self, index: usize) -> Option<&RemoteChunk> {
        self.manifest.remote_chunk(index)
    }

    pub(crate) fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    fn try_claim(&self) -> Claim {
        let mut state = lock(&self.state);

        if state.closed || state.poisoned_at.is_some() || self.stop.is_cancelled() {
            return Claim::Finished;
        }

        let index = state.next_dispatch;
        if index >= self.total_chunks() {
            return Claim::Finished;
        }

        // Chunk i may only start once chunk i - P has been consumed
        if index >= state.consumed + self.prefetch_window {
            trace!(
                "Chunk {} outside prefetch window (consumed={}, window={})",
                index,
                state.consumed,
                self.prefetch_window
            );
            return Claim::Wait;
        }

        // The chunk the iterator needs next is always allowed through
        if state.buffered_bytes >= self.max_buffered_bytes && index != state.consumed {
            trace!(
                "Memory ceiling reached: {}/{} bytes buffered, holding chunk {}",
                state.buffered_bytes,
                self.max_buffered_bytes,
                index
            );
            return Claim::Wait;
        }

        let Some(slot) = self.slots.get(index) else {
            return Claim::Finished;
        };
        if !slot.mark_fetching() {
            return Claim::Finished;
        }

        state.next_dispatch += 1;
        state.dispatched += 1;

        debug!(
            "Dispatching chunk {}: consumed={}, buffered_bytes={}",
            index, state.consumed, state.buffered_bytes
        );

        Claim::Dispatch(index)
    }

    /// Wait for the next chunk index a worker may fetch.
    ///
    /// Returns `None` once there is no more work: all chunks dispatched,
    /// the pipeline is poisoned, or it was closed.
    pub(crate) async fn next_task(&self) -> Option<usize> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_claim() {
                Claim::Dispatch(index) => return Some(index),
                Claim::Finished => return None,
                Claim::Wait => {}
            }

            tokio::select! {
                _ = self.stop.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    /// Record a worker's outcome for chunk `index`.
    pub(crate) fn complete(&self, index: usize, result: Result<ChunkPayload>) {
        let Some(slot) = self.slots.get(index) else {
            return;
        };

        {
            let mut state = lock(&self.state);
            state.completed += 1;

            match result {
                Ok(payload) => {
                    let discard =
                        state.closed || state.poisoned_at.is_some_and(|failed| index > failed);
                    if discard {
                        debug!("Discarding chunk {}: pipeline no longer delivers it", index);
                        slot.release();
                    } else {
                        let size = payload.size_bytes;
                        if slot.set_ready(payload).is_ok() {
                            state.buffered_bytes += size;
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::Cancelled => {
                    trace!("Chunk {} fetch cancelled", index);
                    slot.release();
                }
                Err(e) => {
                    let lowest = state.poisoned_at.map_or(true, |failed| index < failed);
                    if state.closed || !lowest {
                        debug!("Ignoring failure of chunk {}: {}", index, e);
                        slot.release();
                    } else {
                        error!("Chunk {} failed, poisoning downloader: {}", index, e);
                        state.poisoned_at = Some(index);
                        state.terminal.get_or_insert(DownloaderState::Poisoned);
                        slot.set_failed(e);
                        let freed = self.slots.discard_after(index);
                        state.buffered_bytes = state.buffered_bytes.saturating_sub(freed);
                    }
                }
            }
        }

        self.changed.notify_waiters();
    }

    /// Wait for chunk `index` to settle and take its outcome.
    ///
    /// Returns `None` if the pipeline was stopped first.
    pub(crate) async fn take(&self, index: usize) -> Option<Settled> {
        let slot = self.slots.get(index)?;
        let settled = slot.wait(&self.stop).await?;

        if let Settled::Ready(payload) = &settled {
            let mut state = lock(&self.state);
            state.buffered_bytes = state.buffered_bytes.saturating_sub(payload.size_bytes);
            drop(state);
            self.changed.notify_waiters();
        }

        Some(settled)
    }

    /// The iterator has fully consumed chunks `0..consumed`.
    pub(crate) fn mark_consumed(&self, consumed: usize) {
        {
            let mut state = lock(&self.state);
            if consumed <= state.consumed {
                return;
            }
            state.consumed = consumed;
            trace!("Consumer advanced to chunk {}", consumed);
        }
        self.changed.notify_waiters();
    }

    pub(crate) fn mark_done(&self) {
        lock(&self.state)
            .terminal
            .get_or_insert(DownloaderState::Done);
    }

    /// Stop dispatch, cancel in-flight fetches and drop every payload.
    ///
    /// Returns false if the pipeline was already closed.
    pub(crate) fn close(&self) -> bool {
        {
            let mut state = lock(&self.state);
            if state.closed {
                return false;
            }
            state.closed = true;
            state.terminal.get_or_insert(DownloaderState::Closed);
            self.stop.cancel();
            let freed = self.slots.release_all();
            state.buffered_bytes = state.buffered_bytes.saturating_sub(freed);
        }
        self.changed.notify_waiters();
        true
    }

    pub(crate) fn state(&self) -> DownloaderState {
        let state = lock(&self.state);
        match state.terminal {
            Some(terminal) => terminal,
            None if self.stop.is_cancelled() => DownloaderState::Closed,
            None => DownloaderState::Running,
        }
    }

    pub(crate) fn stats(&self) -> DownloaderStats {
        let state = lock(&self.state);
        DownloaderStats {
            dispatched: state.dispatched,
            completed: state.completed,
            buffered_bytes: state.buffered_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChunkTransport, TransportError, TransportResponse};
    use crate::error::Error;
    use crate::reader::format::DecodedChunk;
    use crate::types::config::DownloaderConfig;
    use crate::types::manifest::CompressionCodec;
    use async_trait::async_trait;
    use std::collections::HashMap;

    #[derive(Debug)]
    struct UnusedTransport;

    #[async_trait]
    impl ChunkTransport for UnusedTransport {
        async fn get(
            &self,
            _location: &str,
            _headers: &HashMap<String, String>,
        ) -> std::result::Result<TransportResponse, TransportError> {
            Err(TransportError::fatal("not used"))
        }
    }

    fn payload(size_bytes: u64) -> ChunkPayload {
        ChunkPayload {
            chunk: DecodedChunk::Rows(vec![]),
            size_bytes,
        }
    }

    fn pipeline(total_chunks: usize, window: usize, max_bytes: u64) -> Pipeline {
        let remote = (1..total_chunks)
            .map(|i| RemoteChunk::new(i, format!("https://example.com/{}", i)))
            .collect();
        let manifest = ResultManifest::with_remote_chunks(ResultFormat::RowText, "", remote);
        let fetcher = ChunkFetcher::new(
            Arc::new(UnusedTransport),
            CompressionCodec::None,
            &DownloaderConfig::default(),
        );
        Pipeline::new(
            Arc::new(manifest),
            payload(0),
            fetcher,
            window,
            max_bytes,
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_claims_in_order_within_window() {
        let p = pipeline(6, 3, u64::MAX);
        assert_eq!(p.try_claim(), Claim::Dispatch(1));
        assert_eq!(p.try_claim(), Claim::Dispatch(2));
        // Chunk 3 needs chunk 0 consumed
        assert_eq!(p.try_claim(), Claim::Wait);

        p.mark_consumed(1);
        assert_eq!(p.try_claim(), Claim::Dispatch(3));
        assert_eq!(p.try_claim(), Claim::Wait);

        p.mark_consumed(3);
        assert_eq!(p.try_claim(), Claim::Dispatch(4));
        assert_eq!(p.try_claim(), Claim::Dispatch(5));
        assert_eq!(p.try_claim(), Claim::Finished);
        assert_eq!(p.stats().dispatched, 5);
    }

    #[tokio::test]
    async fn test_memory_ceiling_holds_dispatch() {
        let p = pipeline(4, 8, 100);
        assert_eq!(p.try_claim(), Claim::Dispatch(1));
        p.complete(1, Ok(payload(150)));
        assert_eq!(p.stats().buffered_bytes, 150);

        assert_eq!(p.try_claim(), Claim::Wait);

        // Taking chunk 1 frees its bytes
        assert!(matches!(p.take(1).await, Some(Settled::Ready(_))));
        assert_eq!(p.stats().buffered_bytes, 0);
        assert_eq!(p.try_claim(), Claim::Dispatch(2));
    }

    #[test]
    fn test_next_needed_chunk_bypasses_ceiling() {
        let p = pipeline(3, 8, 10);
        {
            let mut state = lock(&p.state);
            state.buffered_bytes = 1_000;
            state.consumed = 1;
        }
        assert_eq!(p.try_claim(), Claim::Dispatch(1));
        assert_eq!(p.try_claim(), Claim::Wait);
    }

    #[test]
    fn test_lowest_failure_poisons() {
        let p = pipeline(5, 8, u64::MAX);
        for expected in 1..5 {
            assert_eq!(p.try_claim(), Claim::Dispatch(expected));
        }

        p.complete(4, Ok(payload(10)));
        p.complete(3, Err(Error::decode(3, "bad")));
        assert_eq!(p.state(), DownloaderState::Poisoned);
        // Higher chunk already delivered is discarded
        assert_eq!(p.slots.get(4).unwrap().state_name(), "Released");
        assert_eq!(p.stats().buffered_bytes, 0);

        // Lower chunks still in flight may finish
        p.complete(1, Ok(payload(5)));
        assert_eq!(p.slots.get(1).unwrap().state_name(), "Ready");

        // A lower failure takes over
        p.complete(2, Err(Error::decode(2, "worse")));
        assert_eq!(p.slots.get(2).unwrap().state_name(), "Failed");
        assert_eq!(p.slots.get(3).unwrap().state_name(), "Failed");
        assert_eq!(p.try_claim(), Claim::Finished);
    }

    #[test]
    fn test_close_is_idempotent_and_releases() {
        let p = pipeline(3, 8, u64::MAX);
        assert_eq!(p.try_claim(), Claim::Dispatch(1));
        p.complete(1, Ok(payload(7)));

        assert!(p.close());
        assert!(!p.close());
        assert_eq!(p.state(), DownloaderState::Closed);
        assert_eq!(p.stats().buffered_bytes, 0);
        assert_eq!(p.slots.get(0).unwrap().state_name(), "Released");
        assert_eq!(p.try_claim(), Claim::Finished);
    }

    #[tokio::test]
    async fn test_next_task_wakes_when_consumer_advances() {
        let p = Arc::new(pipeline(4, 2, u64::MAX));
        assert_eq!(p.next_task().await, Some(1));

        let waiter = Arc::clone(&p);
        let handle = tokio::spawn(async move { waiter.next_task().await });

        tokio::task::yield_now().await;
        p.mark_consumed(1);
        assert_eq!(handle.await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_next_task_returns_none_on_close() {
        let p = Arc::new(pipeline(4, 2, u64::MAX));
        assert_eq!(p.next_task().await, Some(1));

        let waiter = Arc::clone(&p);
        let handle = tokio::spawn(async move { waiter.next_task().await });

        tokio::task::yield_now().await;
        p.close();
        assert_eq!(handle.await.unwrap(), None);
    }
}
