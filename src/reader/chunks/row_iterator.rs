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

//! Ordered consumption of a result set.
//!
//! The iterator walks chunk slots in index order and suspends only while the
//! slot it needs is still pending or fetching. Two access patterns exist,
//! selected by the downloader's [`ConsumptionMode`]:
//!
//! - `RowStream`: [`RowIterator::next_row`] yields one row at a time
//! - `RawBatchStream`: [`RowIterator::next_batches`] hands over whole chunks
//!   of Arrow record batches
//!
//! Using the other mode's method fails with `ModeMismatch` and leaves the
//! cursor where it was. End of stream and errors are sticky.

use crate::error::{Error, Result};
use crate::reader::chunks::downloader::Downloader;
use crate::reader::chunks::slots::Settled;
use crate::reader::format::{batch_to_rows, DecodedChunk};
use crate::types::config::ConsumptionMode;
use crate::types::value::Row;
use arrow_array::RecordBatch;
use std::collections::VecDeque;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
enum Terminal {
    EndOfStream,
    Failed(Error),
}

/// Public consumption surface of a [`Downloader`].
///
/// Dropping the iterator closes the downloader.
#[derive(Debug)]
pub struct RowIterator {
    downloader: Downloader,
    /// Next chunk index to take from the slot table.
    next_chunk: usize,
    /// Chunk whose rows are currently being drained.
    current_chunk: Option<usize>,
    rows: VecDeque<Row>,
    /// Batches of the current chunk not yet translated to rows.
    batches: VecDeque<RecordBatch>,
    terminal: Option<Terminal>,
}

impl RowIterator {
    pub(crate) fn new(downloader: Downloader) -> Self {
        Self {
            downloader,
            next_chunk: 0,
            current_chunk: None,
            rows: VecDeque::new(),
            batches: VecDeque::new(),
            terminal: None,
        }
    }

    /// The downloader this iterator consumes. Clone it to close from another task.
    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    /// Next row, `Ok(None)` at end of stream.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        if self.downloader.mode() != ConsumptionMode::RowStream {
            return Err(Error::mode_mismatch(
                "next_row() called on a downloader created in RawBatchStream mode",
            ));
        }

        loop {
            if let Some(terminal) = self.check_terminal() {
                return terminal.map(|_| None);
            }

            if let Some(row) = self.rows.pop_front() {
                return Ok(Some(row));
            }

            if let Some(batch) = self.batches.pop_front() {
                let chunk_index = self.current_chunk.unwrap_or(0);
                match batch_to_rows(&batch) {
                    Ok(rows) => self.rows = rows.into(),
                    Err(e) => return Err(self.fail(e.at_chunk(chunk_index))),
                }
                continue;
            }

            match self.load_next_chunk().await {
                Ok(Some(DecodedChunk::Rows(rows))) => self.rows = rows.into(),
                Ok(Some(DecodedChunk::Batches(columnar))) => {
                    self.batches = columnar.batches.into();
                }
                Ok(None) => return Ok(None),
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    /// Record batches of the next non-empty chunk, `Ok(None)` at end of stream.
    ///
    /// Ownership of the batches moves to the caller; no row translation
    /// takes place.
    pub async fn next_batches(&mut self) -> Result<Option<Vec<RecordBatch>>> {
        if self.downloader.mode() != ConsumptionMode::RawBatchStream {
            return Err(Error::mode_mismatch(
                "next_batches() called on a downloader created in RowStream mode",
            ));
        }

        loop {
            if let Some(terminal) = self.check_terminal() {
                return terminal.map(|_| None);
            }

            match self.load_next_chunk().await {
                Ok(Some(DecodedChunk::Batches(columnar))) => {
                    // Handed over whole, so the chunk is consumed right away
                    self.finish_current_chunk();
                    if !columnar.batches.is_empty() {
                        return Ok(Some(columnar.batches));
                    }
                }
                Ok(Some(DecodedChunk::Rows(_))) => {
                    return Err(self.fail(Error::config(
                        "Row-text chunk encountered in RawBatchStream mode",
                    )));
                }
                Ok(None) => return Ok(None),
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    /// Drain every remaining batch (RawBatchStream mode).
    ///
    /// A result with zero rows yields an empty vector.
    pub async fn collect_batches(&mut self) -> Result<Vec<RecordBatch>> {
        let mut all = Vec::new();
        while let Some(batches) = self.next_batches().await? {
            all.extend(batches);
        }
        Ok(all)
    }

    /// Returns the sticky terminal result, recording close/cancel first.
    ///
    /// `Some(Ok(()))` means end of stream.
    fn check_terminal(&mut self) -> Option<Result<()>> {
        if self.terminal.is_none() && self.downloader.is_stopped() {
            let reason = self.downloader.cancel_reason();
            debug!("Iterator observed cancellation ({})", reason);
            self.terminal = Some(Terminal::Failed(Error::cancelled(
                self.current_chunk.or(Some(self.next_chunk)),
                reason,
            )));
        }

        match &self.terminal {
            None => None,
            Some(Terminal::EndOfStream) => Some(Ok(())),
            Some(Terminal::Failed(e)) => Some(Err(e.clone())),
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        self.rows.clear();
        self.batches.clear();
        self.terminal = Some(Terminal::Failed(error.clone()));
        error
    }

    fn finish_current_chunk(&mut self) {
        if let Some(index) = self.current_chunk.take() {
            trace!("Chunk {} consumed", index);
            self.downloader.pipeline().mark_consumed(index + 1);
        }
    }

    /// Advance to the next chunk and wait for it to settle.
    ///
    /// Returns `Ok(None)` at end of stream.
    async fn load_next_chunk(&mut self) -> Result<Option<DecodedChunk>> {
        self.finish_current_chunk();

        let index = self.next_chunk;
        let pipeline = self.downloader.pipeline();

        if index >= pipeline.total_chunks() {
            debug!("End of stream after {} chunk(s)", index);
            self.terminal = Some(Terminal::EndOfStream);
            pipeline.mark_done();
            return Ok(None);
        }

        match pipeline.take(index).await {
            Some(Settled::Ready(payload)) => {
                trace!("Chunk {} ready: {} rows", index, payload.chunk.num_rows());
                self.next_chunk += 1;
                self.current_chunk = Some(index);
                if let DecodedChunk::Batches(columnar) = &payload.chunk {
                    self.downloader.record_schema(&columnar.schema);
                }
                Ok(Some(payload.chunk))
            }
            Some(Settled::Failed(e)) => Err(e),
            Some(Settled::Released) | None => Err(Error::cancelled(
                Some(index),
                self.downloader.cancel_reason(),
            )),
        }
    }
}

impl Drop for RowIterator {
    fn drop(&mut self) {
        self.downloader.close();
    }
}
