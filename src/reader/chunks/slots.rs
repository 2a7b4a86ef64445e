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

//! Chunk slot table: the handoff between download workers and the iterator.
//!
//! One [`ChunkSlot`] exists per chunk index. Each slot has exactly one writer
//! (the worker that claimed it) and one reader (the row iterator).
//!
//! ## State Machine
//!
//! ```text
//! Pending --> Fetching --> Ready --> Released
//!    |           |    \
//!    |           |     +--> Failed
//!    +-----------+--------> Released   (close, or discarded after poisoning)
//! ```
//!
//! `Ready` and `Failed` are never overwritten by a worker. `Failed` is never
//! released, so a failed chunk keeps reporting its error.

use crate::error::Error;
use crate::reader::format::DecodedChunk;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Decoded chunk plus the bytes it accounts for in the memory ceiling.
#[derive(Debug)]
pub struct ChunkPayload {
    pub chunk: DecodedChunk,
    pub size_bytes: u64,
}

/// Per-chunk state.
#[derive(Debug)]
pub enum SlotState {
    /// Not yet claimed by a worker.
    Pending,
    /// Claimed by a worker, fetch and decode in progress.
    Fetching,
    /// Decoded payload waiting for the iterator.
    Ready(ChunkPayload),
    /// Terminal failure for this chunk.
    Failed(Error),
    /// Payload handed to the iterator, or dropped.
    Released,
}

/// What the iterator finds in a slot that is no longer in progress.
#[derive(Debug)]
pub enum Settled {
    Ready(ChunkPayload),
    Failed(Error),
    Released,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-writer/single-reader cell for one chunk.
#[derive(Debug)]
pub struct ChunkSlot {
    index: usize,
    state: Mutex<SlotState>,
    settled: Notify,
    /// Cancels this chunk's in-flight fetch without affecting its siblings.
    cancel: CancellationToken,
}

impl ChunkSlot {
    fn with_state(index: usize, state: SlotState, parent: &CancellationToken) -> Self {
        Self {
            index,
            state: Mutex::new(state),
            settled: Notify::new(),
            cancel: parent.child_token(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Short state name for logging.
    pub fn state_name(&self) -> &'static str {
        match &*lock(&self.state) {
            SlotState::Pending => "Pending",
            SlotState::Fetching => "Fetching",
            SlotState::Ready(_) => "Ready",
            SlotState::Failed(_) => "Failed",
            SlotState::Released => "Released",
        }
    }

    /// Pending -> Fetching. Returns false if the slot was not pending.
    pub fn mark_fetching(&self) -> bool {
        let mut state = lock(&self.state);
        if matches!(*state, SlotState::Pending) {
            *state = SlotState::Fetching;
            true
        } else {
            false
        }
    }

    /// Fetching -> Ready.
    ///
    /// Returns the payload back if the slot is no longer fetching (it was
    /// released by close or poisoning), so the caller can drop it.
    pub fn set_ready(&self, payload: ChunkPayload) -> Result<(), ChunkPayload> {
        {
            let mut state = lock(&self.state);
            if !matches!(*state, SlotState::Fetching) {
                return Err(payload);
            }
            *state = SlotState::Ready(payload);
        }
        self.settled.notify_one();
        Ok(())
    }

    /// Fetching -> Failed. Returns false if the slot is no longer fetching.
    pub fn set_failed(&self, error: Error) -> bool {
        {
            let mut state = lock(&self.state);
            if !matches!(*state, SlotState::Fetching) {
                return false;
            }
            *state = SlotState::Failed(error);
        }
        self.settled.notify_one();
        true
    }

    /// Drop whatever the slot holds, except a failure.
    ///
    /// Returns the number of buffered bytes freed.
    pub fn release(&self) -> u64 {
        let freed = {
            let mut state = lock(&self.state);
            match std::mem::replace(&mut *state, SlotState::Released) {
                SlotState::Ready(payload) => payload.size_bytes,
                SlotState::Failed(error) => {
                    *state = SlotState::Failed(error);
                    0
                }
                _ => 0,
            }
        };
        self.cancel.cancel();
        self.settled.notify_one();
        freed
    }

    /// Take the slot's outcome if it has left Pending/Fetching.
    ///
    /// A ready payload moves out and the slot becomes `Released`.
    pub fn try_take(&self) -> Option<Settled> {
        let mut state = lock(&self.state);
        match &*state {
            SlotState::Pending | SlotState::Fetching => None,
            SlotState::Failed(error) => Some(Settled::Failed(error.clone())),
            SlotState::Released => Some(Settled::Released),
            SlotState::Ready(_) => match std::mem::replace(&mut *state, SlotState::Released) {
                SlotState::Ready(payload) => Some(Settled::Ready(payload)),
                _ => None,
            },
        }
    }

    /// Wait until the slot settles, or `stop` is cancelled (returns `None`).
    pub async fn wait(&self, stop: &CancellationToken) -> Option<Settled> {
        loop {
            if let Some(settled) = self.try_take() {
                return Some(settled);
            }

            tokio::select! {
                _ = stop.cancelled() => return None,
                _ = self.settled.notified() => {}
            }
        }
    }
}

/// Fixed-size table of slots, one per chunk index.
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<ChunkSlot>,
}

impl SlotTable {
    /// Build a table of `total_chunks` slots with chunk 0 already settled.
    ///
    /// An empty table is created when `total_chunks == 0`.
    pub fn new(total_chunks: usize, chunk_zero: ChunkPayload, parent: &CancellationToken) -> Self {
        let mut slots = Vec::with_capacity(total_chunks);
        if total_chunks > 0 {
            slots.push(ChunkSlot::with_state(0, SlotState::Ready(chunk_zero), parent));
            for index in 1..total_chunks {
                slots.push(ChunkSlot::with_state(index, SlotState::Pending, parent));
            }
        }
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChunkSlot> {
        self.slots.get(index)
    }

    /// Cancel in-flight fetches for every chunk after `index` and drop
    /// anything they already produced. Returns the bytes freed.
    pub fn discard_after(&self, index: usize) -> u64 {
        self.slots
            .iter()
            .skip(index + 1)
            .map(ChunkSlot::release)
            .sum()
    }

    /// Release every slot. Returns the bytes freed.
    pub fn release_all(&self) -> u64 {
        self.slots.iter().map(ChunkSlot::release).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::manifest::ResultFormat;
    use crate::types::value::Value;
    use std::sync::Arc;
    use std::time::Duration;

    fn payload(rows: usize, size_bytes: u64) -> ChunkPayload {
        ChunkPayload {
            chunk: DecodedChunk::Rows(vec![vec![Value::Int64(1)]; rows]),
            size_bytes,
        }
    }

    fn slot(index: usize) -> ChunkSlot {
        ChunkSlot::with_state(index, SlotState::Pending, &CancellationToken::new())
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let slot = slot(1);
        assert!(slot.try_take().is_none());

        assert!(slot.mark_fetching());
        assert!(!slot.mark_fetching());
        assert_eq!(slot.state_name(), "Fetching");

        assert!(slot.set_ready(payload(2, 10)).is_ok());
        // A settled slot is never overwritten
        assert!(slot.set_ready(payload(1, 10)).is_err());
        assert!(!slot.set_failed(Error::decode(1, "late")));

        match slot.try_take() {
            Some(Settled::Ready(p)) => assert_eq!(p.chunk.num_rows(), 2),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(slot.try_take(), Some(Settled::Released)));
    }

    #[test]
    fn test_failed_slot_is_sticky() {
        let slot = slot(3);
        slot.mark_fetching();
        assert!(slot.set_failed(Error::decode(3, "bad")));

        assert_eq!(slot.release(), 0);
        for _ in 0..2 {
            match slot.try_take() {
                Some(Settled::Failed(e)) => assert_eq!(e.chunk_index(), Some(3)),
                other => panic!("unexpected: {:?}", other),
            }
        }
    }

    #[test]
    fn test_release_frees_bytes_and_cancels_fetch() {
        let slot = slot(2);
        slot.mark_fetching();
        slot.set_ready(payload(1, 42)).unwrap();

        assert_eq!(slot.release(), 42);
        assert!(slot.cancel_token().is_cancelled());
        assert!(matches!(slot.try_take(), Some(Settled::Released)));
    }

    #[test]
    fn test_worker_result_after_release_is_returned() {
        let slot = slot(2);
        slot.mark_fetching();
        slot.release();

        assert!(slot.set_ready(payload(1, 8)).is_err());
        assert!(!slot.set_failed(Error::decode(2, "x")));
    }

    #[tokio::test]
    async fn test_wait_wakes_on_settle() {
        let slot = Arc::new(slot(1));
        slot.mark_fetching();

        let writer = Arc::clone(&slot);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.set_ready(payload(3, 1)).unwrap();
        });

        let settled = slot.wait(&CancellationToken::new()).await;
        assert!(matches!(settled, Some(Settled::Ready(p)) if p.chunk.num_rows() == 3));
    }

    #[tokio::test]
    async fn test_wait_returns_none_when_stopped() {
        let slot = slot(1);
        slot.mark_fetching();
        let stop = CancellationToken::new();

        let canceller = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        assert!(slot.wait(&stop).await.is_none());
    }

    #[test]
    fn test_table_layout() {
        let parent = CancellationToken::new();
        let table = SlotTable::new(3, payload(1, 5), &parent);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0).unwrap().state_name(), "Ready");
        assert_eq!(table.get(2).unwrap().state_name(), "Pending");

        let empty = SlotTable::new(
            0,
            ChunkPayload {
                chunk: DecodedChunk::empty(ResultFormat::RowText),
                size_bytes: 0,
            },
            &parent,
        );
        assert!(empty.is_empty());
    }

    #[test]
    fn test_discard_after_keeps_lower_slots() {
        let parent = CancellationToken::new();
        let table = SlotTable::new(4, payload(1, 5), &parent);
        for i in 1..4 {
            table.get(i).unwrap().mark_fetching();
        }
        table.get(3).unwrap().set_ready(payload(1, 7)).unwrap();

        assert_eq!(table.discard_after(1), 7);
        assert!(!table.get(1).unwrap().cancel_token().is_cancelled());
        assert!(table.get(2).unwrap().cancel_token().is_cancelled());
        assert_eq!(table.get(0).unwrap().state_name(), "Ready");
        assert_eq!(table.get(1).unwrap().state_name(), "Fetching");
        assert_eq!(table.get(3).unwrap().state_name(), "Released");

        parent.cancel();
        assert!(table.get(1).unwrap().cancel_token().is_cancelled());
    }
}
