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

//! HTTP transport for chunk downloads.
//!
//! This module provides a `reqwest` client with:
//! - Connection pooling
//! - Configurable timeouts
//! - Transparent gzip `Content-Encoding` handling
//!
//! Chunk locations are presigned, so no authentication header is added.

use crate::client::{ChunkTransport, TransportError, TransportResponse};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::time::Duration;
use tracing::trace;

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Idle limit for each body read; resets after every successful read.
    pub read_timeout: Duration,
    /// Maximum number of idle connections per host.
    pub max_connections_per_host: usize,
    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            max_connections_per_host: 100,
            user_agent: format!("result-chunks/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// `reqwest`-backed [`ChunkTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: HttpClientConfig,
}

impl HttpTransport {
    /// Creates a new transport with the given configuration.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Check if the request error is worth repeating.
    fn is_retryable_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
    }
}

#[async_trait]
impl ChunkTransport for HttpTransport {
    async fn get(
        &self,
        location: &str,
        headers: &HashMap<String, String>,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let mut request_builder = self.client.request(Method::GET, location);

        for (key, value) in headers {
            request_builder = request_builder.header(key, value);
        }

        let request = request_builder.build().map_err(|e| {
            TransportError::fatal(format!("Failed to build download request: {}", e))
        })?;

        trace!("GET {}", location);

        let response = self.client.execute(request).await.map_err(|e| {
            let message = format!("HTTP request failed: {}", e);
            if Self::is_retryable_error(&e) {
                TransportError::retryable(message)
            } else {
                TransportError::fatal(message)
            }
        })?;

        let status = response.status().as_u16();

        let body = response.bytes().await.map_err(|e| {
            TransportError::retryable(format!("Failed to read download response: {}", e))
        })?;

        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_config_default() {
        let config = HttpClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert_eq!(config.max_connections_per_host, 100);
        assert!(config.user_agent.starts_with("result-chunks/"));
    }

    #[tokio::test]
    async fn test_http_transport_creation() {
        let transport = HttpTransport::new(HttpClientConfig::default());
        assert!(transport.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_location_is_not_retryable() {
        let transport = HttpTransport::new(HttpClientConfig::default()).unwrap();
        let err = transport
            .get("not a url", &HashMap::new())
            .await
            .unwrap_err();
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn test_slow_body_within_read_timeout_completes() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\n")
                .await
                .unwrap();
            for byte in b"abcd" {
                tokio::time::sleep(Duration::from_millis(200)).await;
                socket.write_all(&[*byte]).await.unwrap();
                socket.flush().await.unwrap();
            }
        });

        // The whole body takes longer than one read timeout, but no single read does.
        let transport = HttpTransport::new(HttpClientConfig {
            read_timeout: Duration::from_millis(500),
            ..HttpClientConfig::default()
        })
        .unwrap();
        let response = transport
            .get(&format!("http://{}/chunk", addr), &HashMap::new())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"abcd");
        server.await.unwrap();
    }
}
