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

//! Chunked retrieval of one result set.
//!
//! This module provides:
//! - `Downloader`: starts retrieval, owns the worker pool, close/state/stats
//! - `RowIterator`: ordered row or raw batch consumption
//! - `ChunkFetcher`: single-chunk download with retry and decompression
//! - `Backoff`: capped exponential retry delays

pub mod backoff;
pub mod chunk_fetcher;
mod download_workers;
pub mod downloader;
mod pipeline;
pub mod row_iterator;
pub(crate) mod slots;

pub use backoff::Backoff;
pub use chunk_fetcher::ChunkFetcher;
pub use downloader::{Downloader, DownloaderState, DownloaderStats};
pub use row_iterator::RowIterator;
