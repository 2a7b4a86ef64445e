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

//! Error types for chunked result retrieval.
//!
//! Every terminal failure a consumer can observe is one of five kinds:
//!
//! | Kind | Retried | Typical cause |
//! |------|---------|---------------|
//! | `Decode` | never | payload is not valid for the declared format |
//! | `Fetch` | per retry policy | transport failure or HTTP status |
//! | `Cancelled` | never | context cancelled or downloader closed |
//! | `ModeMismatch` | never | row API used in batch mode or vice versa |
//! | `Config` | never | invalid configuration or manifest |
//!
//! Errors are `Clone` so that a terminal error can be handed out again on
//! every subsequent call.

/// Result type alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Why an operation was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The governing context was cancelled by the caller.
    Context,
    /// The downloader was closed.
    Closed,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Context => write!(f, "context cancelled"),
            CancelReason::Closed => write!(f, "downloader closed"),
        }
    }
}

/// Classification of an [`Error`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    Fetch,
    Cancelled,
    ModeMismatch,
    Config,
}

/// Main error type for chunk retrieval and decoding.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Chunk bytes are malformed for the declared format.
    #[error("Failed to decode chunk {chunk_index}: {message}")]
    Decode { chunk_index: usize, message: String },

    /// Chunk could not be fetched, after exhausting retries where applicable.
    #[error("Failed to fetch chunk {chunk_index} after {attempts} attempt(s): {message}")]
    Fetch {
        chunk_index: usize,
        attempts: u32,
        status: Option<u16>,
        message: String,
    },

    /// Operation aborted by cancellation or close.
    #[error("Operation cancelled ({reason}){}", fmt_chunk(.chunk_index))]
    Cancelled {
        chunk_index: Option<usize>,
        reason: CancelReason,
    },

    /// Consumption API used inconsistently with the configured mode.
    #[error("Consumption mode mismatch: {0}")]
    ModeMismatch(String),

    /// Invalid configuration or manifest.
    #[error("Configuration error: {0}")]
    Config(String),
}

fn fmt_chunk(chunk_index: &Option<usize>) -> String {
    match chunk_index {
        Some(i) => format!(" while waiting for chunk {}", i),
        None => String::new(),
    }
}

impl Error {
    pub fn decode(chunk_index: usize, message: impl Into<String>) -> Self {
        Error::Decode {
            chunk_index,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn mode_mismatch(message: impl Into<String>) -> Self {
        Error::ModeMismatch(message.into())
    }

    pub fn cancelled(chunk_index: Option<usize>, reason: CancelReason) -> Self {
        Error::Cancelled {
            chunk_index,
            reason,
        }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Decode { .. } => ErrorKind::Decode,
            Error::Fetch { .. } => ErrorKind::Fetch,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::ModeMismatch(_) => ErrorKind::ModeMismatch,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Index of the chunk this error is attributed to, if any.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Error::Decode { chunk_index, .. } | Error::Fetch { chunk_index, .. } => {
                Some(*chunk_index)
            }
            Error::Cancelled { chunk_index, .. } => *chunk_index,
            Error::ModeMismatch(_) | Error::Config(_) => None,
        }
    }

    /// Re-attributes a decode error to another chunk index.
    ///
    /// Decoders report errors without knowing where the bytes came from.
    pub(crate) fn at_chunk(self, index: usize) -> Self {
        match self {
            Error::Decode { message, .. } => Error::Decode {
                chunk_index: index,
                message,
            },
            other => other,
        }
    }
}
