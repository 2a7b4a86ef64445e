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

//! Logging configuration for the result-chunks crate.
//!
//! Initializes a `tracing-subscriber` with file or stderr output. The crate
//! itself only emits `tracing` events; installing a subscriber is opt-in
//! for hosts that do not already have one.
//!
//! ## Configuration priority
//!
//! 1. `LogConfig::level` / `LogConfig::file` (highest)
//! 2. `RUST_LOG` environment variable
//! 3. Default: `warn`
//!
//! ## Usage
//!
//! ```bash
//! # Via environment variable
//! RUST_LOG=result_chunks=debug ./my_app
//! ```
//!
//! Or programmatically:
//! ```ignore
//! result_chunks::logging::init_logging(&LogConfig {
//!     level: Some("debug".into()),
//!     file: Some("/tmp/result-chunks.log".into()),
//! });
//! ```

use std::sync::OnceLock;
use tracing_subscriber::{
    fmt::{self, time::SystemTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const LOG_TARGET: &str = "result_chunks";

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Log level: "OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE".
    pub level: Option<String>,
    /// Log file path. If unset, logs go to stderr.
    pub file: Option<String>,
}

impl LogConfig {
    /// `true` when the configured level turns logging off entirely.
    pub fn is_off(&self) -> bool {
        self.level
            .as_deref()
            .is_some_and(|level| level.eq_ignore_ascii_case("off"))
    }

    /// Filter directive for the configured level, `None` to defer to `RUST_LOG`.
    fn directive(&self) -> Option<String> {
        self.level
            .as_ref()
            .map(|level| format!("{}={}", LOG_TARGET, level.to_lowercase()))
    }
}

/// Initialize the tracing subscriber.
///
/// Uses `OnceLock` to ensure this is called at most once per process;
/// subsequent calls are no-ops. An already installed global subscriber
/// is left in place.
pub fn init_logging(config: &LogConfig) {
    LOGGING_INITIALIZED.get_or_init(|| {
        if config.is_off() {
            return;
        }

        let filter = match config.directive() {
            Some(directive) => EnvFilter::new(directive),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{}=warn", LOG_TARGET))),
        };

        if let Some(ref path) = config.file {
            let file = match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("result-chunks: failed to open log file {}: {}", path, e);
                    return;
                }
            };

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(file)
                        .with_target(false)
                        .with_ansi(false)
                        .with_timer(SystemTime),
                )
                .try_init()
                .ok();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .with_timer(SystemTime),
                )
                .try_init()
                .ok();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default_defers_to_env() {
        let config = LogConfig::default();
        assert!(!config.is_off());
        assert!(config.directive().is_none());
    }

    #[test]
    fn test_level_directive_targets_crate() {
        let config = LogConfig {
            level: Some("DEBUG".to_string()),
            file: None,
        };
        assert_eq!(config.directive().as_deref(), Some("result_chunks=debug"));
    }

    #[test]
    fn test_off_is_case_insensitive() {
        let config = LogConfig {
            level: Some("Off".to_string()),
            file: None,
        };
        assert!(config.is_off());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = LogConfig {
            level: Some("off".to_string()),
            file: None,
        };
        init_logging(&config);
        init_logging(&LogConfig::default());
    }
}
