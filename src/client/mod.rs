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

//! Byte-fetch capability used to download remote chunks.
//!
//! This module provides:
//! - `ChunkTransport` trait: a single-attempt GET returning status and body
//! - `HttpTransport`: `reqwest`-based implementation with connection pooling
//!
//! Retry, backoff and cancellation are layered on top by the chunk fetcher,
//! so transports only perform one request per call.

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

pub use http::{HttpClientConfig, HttpTransport};

/// Response to a single chunk request.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure below the HTTP status level (connect, timeout, request build).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    /// Whether repeating the request may succeed.
    pub retryable: bool,
}

impl TransportError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Abstract byte-fetch capability supplied by the transport collaborator.
#[async_trait]
pub trait ChunkTransport: Send + Sync + std::fmt::Debug {
    /// Issue one GET for `location` with the given headers.
    ///
    /// Non-2xx statuses are returned as a response, not as an error.
    async fn get(
        &self,
        location: &str,
        headers: &HashMap<String, String>,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_response_success_range() {
        assert!(TransportResponse::new(200, "ok").is_success());
        assert!(TransportResponse::new(206, "").is_success());
        assert!(!TransportResponse::new(404, "").is_success());
        assert!(!TransportResponse::new(503, "").is_success());
    }

    #[test]
    fn test_transport_error_constructors() {
        assert!(TransportError::retryable("timeout").retryable);
        let err = TransportError::fatal("bad url");
        assert!(!err.retryable);
        assert_eq!(err.to_string(), "bad url");
    }
}
