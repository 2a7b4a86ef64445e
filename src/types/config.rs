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

//! Downloader configuration.
//!
//! All options are read once when a downloader is created.
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `chunks.num_workers` | 4 | Concurrent download workers (W) |
//! | `chunks.prefetch_window` | 8 | Chunks allowed ahead of the consumer (P, >= W) |
//! | `chunks.max_fetch_attempts` | 5 | Attempts per chunk before giving up |
//! | `chunks.backoff_base_ms` | 250 | First retry delay |
//! | `chunks.backoff_cap_ms` | 8000 | Upper bound for retry delay |
//! | `chunks.decompress` | true | Apply the manifest's compression codec |
//! | `chunks.max_buffered_bytes` | 268435456 | In-flight memory ceiling |
//! | `chunks.speed_threshold_mbps` | 0.1 | Slow download warning threshold |

use crate::error::{Error, Result};
use std::time::Duration;

/// How the consumer reads the result set.
///
/// Chosen explicitly at creation time and fixed for the downloader's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsumptionMode {
    /// Rows are yielded one at a time via `next_row()`.
    #[default]
    RowStream,
    /// Arrow record batches are handed over whole via `next_batches()`.
    RawBatchStream,
}

/// Configuration for the chunk downloader.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Number of concurrent download workers.
    pub num_workers: usize,
    /// Chunk `i` is only dispatched once chunk `i - prefetch_window` is consumed.
    pub prefetch_window: usize,
    /// Maximum number of fetch attempts per chunk (including the first).
    pub max_fetch_attempts: u32,
    /// Delay before the first retry.
    pub backoff_base: Duration,
    /// Upper bound for any retry delay.
    pub backoff_cap: Duration,
    /// Whether to decompress payloads according to the manifest codec.
    pub decompress: bool,
    /// Ceiling on bytes held by fetched-but-unconsumed chunks.
    pub max_buffered_bytes: u64,
    /// Log warning if download speed falls below this threshold (MB/s).
    pub speed_threshold_mbps: f64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            prefetch_window: 8,
            max_fetch_attempts: 5,
            backoff_base: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(8),
            decompress: true,
            max_buffered_bytes: 256 * 1024 * 1024,
            speed_threshold_mbps: 0.1,
        }
    }
}

impl DownloaderConfig {
    /// Reject configurations the downloader cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(Error::config("chunks.num_workers must be at least 1"));
        }
        if self.prefetch_window < self.num_workers {
            return Err(Error::config(format!(
                "chunks.prefetch_window ({}) must be >= chunks.num_workers ({})",
                self.prefetch_window, self.num_workers
            )));
        }
        if self.max_fetch_attempts == 0 {
            return Err(Error::config("chunks.max_fetch_attempts must be at least 1"));
        }
        if self.backoff_base > self.backoff_cap {
            return Err(Error::config(format!(
                "chunks.backoff_base_ms ({:?}) exceeds chunks.backoff_cap_ms ({:?})",
                self.backoff_base, self.backoff_cap
            )));
        }
        if self.max_buffered_bytes == 0 {
            return Err(Error::config("chunks.max_buffered_bytes must be positive"));
        }
        Ok(())
    }

    /// Set an option from its string form, as passed by driver adapters.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "chunks.num_workers" => self.num_workers = parse_int(key, value)?,
            "chunks.prefetch_window" => self.prefetch_window = parse_int(key, value)?,
            "chunks.max_fetch_attempts" => self.max_fetch_attempts = parse_int(key, value)?,
            "chunks.backoff_base_ms" => {
                self.backoff_base = Duration::from_millis(parse_int(key, value)?)
            }
            "chunks.backoff_cap_ms" => {
                self.backoff_cap = Duration::from_millis(parse_int(key, value)?)
            }
            "chunks.decompress" => self.decompress = parse_bool(key, value)?,
            "chunks.max_buffered_bytes" => self.max_buffered_bytes = parse_int(key, value)?,
            "chunks.speed_threshold_mbps" => {
                self.speed_threshold_mbps = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid_value(key, value))?
            }
            _ => return Err(Error::config(format!("Unknown option '{}'", key))),
        }
        Ok(())
    }

    /// Build a configuration from `(key, value)` pairs on top of the defaults.
    pub fn from_options<'a, I>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        for (key, value) in options {
            config.set_option(key, value)?;
        }
        Ok(config)
    }
}

fn invalid_value(key: &str, value: &str) -> Error {
    Error::config(format!("Invalid value '{}' for option '{}'", value, key))
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| invalid_value(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid_value(key, value)),
    }
}
