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

//! Result readers for consuming chunked query results.
//!
//! This module provides:
//! - `chunks`: the downloader, its worker pool and the async `RowIterator`
//! - `format`: payload decoders for row-text and columnar chunks
//! - `BlockingRowReader` / `BlockingBatchReader`: synchronous adapters for
//!   driver layers that are not async

pub mod chunks;
pub mod format;

use crate::error::{Error, Result};
use crate::reader::chunks::{Downloader, RowIterator};
use crate::types::config::ConsumptionMode;
use crate::types::value::Row;
use arrow_array::RecordBatch;
use arrow_schema::{ArrowError, Schema, SchemaRef};
use std::collections::VecDeque;
use std::sync::Arc;

pub use chunks::{DownloaderState, DownloaderStats};

/// Synchronous row iterator over a [`RowIterator`].
///
/// Must not be used from within an async context of the same runtime.
/// The iterator is fused: after an error or end of stream it yields `None`.
#[derive(Debug)]
pub struct BlockingRowReader {
    inner: RowIterator,
    runtime_handle: tokio::runtime::Handle,
    finished: bool,
}

impl BlockingRowReader {
    pub fn new(inner: RowIterator, runtime_handle: tokio::runtime::Handle) -> Self {
        Self {
            inner,
            runtime_handle,
            finished: false,
        }
    }

    pub fn downloader(&self) -> &Downloader {
        self.inner.downloader()
    }
}

impl Iterator for BlockingRowReader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let item = self.runtime_handle.block_on(self.inner.next_row()).transpose();
        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }
}

/// Adapter to expose raw batch consumption as arrow's `RecordBatchReader`.
pub struct BlockingBatchReader {
    inner: RowIterator,
    runtime_handle: tokio::runtime::Handle,
    schema: SchemaRef,
    pending: VecDeque<RecordBatch>,
    finished: bool,
}

impl std::fmt::Debug for BlockingBatchReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingBatchReader")
            .field("schema", &self.schema)
            .field("pending", &self.pending.len())
            .field("finished", &self.finished)
            .finish()
    }
}

impl BlockingBatchReader {
    /// Create a new adapter.
    ///
    /// The iterator must be in `RawBatchStream` mode. If chunk 0 did not carry
    /// a schema, the first non-empty chunk is read ahead to determine it.
    pub fn new(mut inner: RowIterator, runtime_handle: tokio::runtime::Handle) -> Result<Self> {
        if inner.downloader().mode() != ConsumptionMode::RawBatchStream {
            return Err(Error::mode_mismatch(
                "BlockingBatchReader requires a downloader created in RawBatchStream mode",
            ));
        }

        let mut pending = VecDeque::new();
        let mut finished = false;
        let schema = match inner.downloader().schema() {
            Some(schema) => schema,
            None => match runtime_handle.block_on(inner.next_batches())? {
                Some(batches) => {
                    let schema = batches
                        .first()
                        .map(|b| b.schema())
                        .unwrap_or_else(|| Arc::new(Schema::empty()));
                    pending.extend(batches);
                    schema
                }
                None => {
                    finished = true;
                    Arc::new(Schema::empty())
                }
            },
        };

        Ok(Self {
            inner,
            runtime_handle,
            schema,
            pending,
            finished,
        })
    }

    pub fn downloader(&self) -> &Downloader {
        self.inner.downloader()
    }
}

impl arrow_array::RecordBatchReader for BlockingBatchReader {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}

impl Iterator for BlockingBatchReader {
    type Item = std::result::Result<RecordBatch, ArrowError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(batch) = self.pending.pop_front() {
                return Some(Ok(batch));
            }
            if self.finished {
                return None;
            }

            match self.runtime_handle.block_on(self.inner.next_batches()) {
                Ok(Some(batches)) => self.pending.extend(batches),
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(ArrowError::ExternalError(Box::new(e))));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChunkTransport, TransportError, TransportResponse};
    use crate::error::ErrorKind;
    use crate::types::config::DownloaderConfig;
    use crate::types::manifest::{RemoteChunk, ResultFormat, ResultManifest};
    use crate::types::value::Value;
    use arrow_array::{Int64Array, RecordBatchReader};
    use arrow_ipc::writer::StreamWriter;
    use arrow_schema::{DataType, Field};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio_util::sync::CancellationToken;

    /// Serves pre-built bodies keyed by location.
    #[derive(Debug)]
    struct MapTransport {
        bodies: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl ChunkTransport for MapTransport {
        async fn get(
            &self,
            location: &str,
            _headers: &HashMap<String, String>,
        ) -> std::result::Result<TransportResponse, TransportError> {
            match self.bodies.get(location) {
                Some(body) => Ok(TransportResponse::new(200, body.clone())),
                None => Ok(TransportResponse::new(404, "")),
            }
        }
    }

    fn arrow_chunk(values: &[i64]) -> Vec<u8> {
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, false)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from(values.to_vec()))],
        )
        .unwrap();
        let mut buffer = Vec::new();
        {
            let mut writer = StreamWriter::try_new(&mut buffer, &schema).unwrap();
            writer.write(&batch).unwrap();
            writer.finish().unwrap();
        }
        buffer
    }

    fn start(
        runtime: &tokio::runtime::Runtime,
        manifest: ResultManifest,
        mode: ConsumptionMode,
        bodies: HashMap<String, Vec<u8>>,
    ) -> Result<RowIterator> {
        let _guard = runtime.enter();
        Downloader::start(
            manifest,
            mode,
            DownloaderConfig::default(),
            Arc::new(MapTransport { bodies }),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_blocking_row_reader() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let manifest = ResultManifest::with_remote_chunks(
            ResultFormat::RowText,
            r#"[["1"]]"#,
            vec![RemoteChunk::new(1, "c1")],
        );
        let bodies = HashMap::from([("c1".to_string(), br#"["2"],["3"]"#.to_vec())]);
        let iter = start(&runtime, manifest, ConsumptionMode::RowStream, bodies).unwrap();

        let rows: Vec<Row> = BlockingRowReader::new(iter, runtime.handle().clone())
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(
            rows,
            vec![
                vec![Value::from("1")],
                vec![Value::from("2")],
                vec![Value::from("3")],
            ]
        );
    }

    #[test]
    fn test_blocking_row_reader_fuses_after_error() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let manifest = ResultManifest::with_remote_chunks(
            ResultFormat::RowText,
            r#"[["1"]]"#,
            vec![RemoteChunk::new(1, "missing")],
        );
        let iter = start(&runtime, manifest, ConsumptionMode::RowStream, HashMap::new()).unwrap();
        let mut reader = BlockingRowReader::new(iter, runtime.handle().clone());

        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_blocking_batch_reader() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let manifest = ResultManifest::with_remote_chunks(
            ResultFormat::ColumnarBinary,
            arrow_chunk(&[1, 2]),
            vec![RemoteChunk::new(1, "c1")],
        );
        let bodies = HashMap::from([("c1".to_string(), arrow_chunk(&[3]))]);
        let iter = start(&runtime, manifest, ConsumptionMode::RawBatchStream, bodies).unwrap();

        let reader = BlockingBatchReader::new(iter, runtime.handle().clone()).unwrap();
        assert_eq!(reader.schema().field(0).name(), "n");

        let batches: Vec<RecordBatch> = reader.collect::<std::result::Result<_, _>>().unwrap();
        let total: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(batches.len(), 2);
        assert_eq!(total, 3);
    }

    #[test]
    fn test_blocking_batch_reader_learns_schema_from_remote_chunk() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let manifest = ResultManifest::with_remote_chunks(
            ResultFormat::ColumnarBinary,
            Vec::<u8>::new(),
            vec![RemoteChunk::new(1, "c1")],
        );
        let bodies = HashMap::from([("c1".to_string(), arrow_chunk(&[7, 8]))]);
        let iter = start(&runtime, manifest, ConsumptionMode::RawBatchStream, bodies).unwrap();

        let reader = BlockingBatchReader::new(iter, runtime.handle().clone()).unwrap();
        assert_eq!(reader.schema().fields().len(), 1);
        assert_eq!(reader.downloader().schema().unwrap().field(0).name(), "n");
        assert_eq!(reader.map(|b| b.unwrap().num_rows()).sum::<usize>(), 2);
    }

    #[test]
    fn test_blocking_batch_reader_requires_raw_mode() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let manifest = ResultManifest::inline(ResultFormat::ColumnarBinary, arrow_chunk(&[1]));
        let iter = start(&runtime, manifest, ConsumptionMode::RowStream, HashMap::new()).unwrap();

        let err = BlockingBatchReader::new(iter, runtime.handle().clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModeMismatch);
    }
}
