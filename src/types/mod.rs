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

//! Type definitions for chunked result retrieval.
//!
//! This module contains data structures organized by domain:
//! - `manifest`: chunk layout of a result set
//! - `config`: downloader options and consumption mode
//! - `response`: query response JSON and its conversion to a manifest
//! - `value`: typed cells for row-oriented consumption

pub mod config;
pub mod manifest;
pub mod response;
pub mod value;

// Re-export commonly used types
pub use config::{ConsumptionMode, DownloaderConfig};
pub use manifest::{CompressionCodec, RemoteChunk, ResultFormat, ResultManifest};
pub use response::{ChunkDescriptor, QueryResultResponse};
pub use value::{Row, Value};
