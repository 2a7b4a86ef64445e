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

//! Exponential backoff between fetch attempts.

use crate::types::config::DownloaderConfig;
use std::time::Duration;

/// Capped exponential backoff.
///
/// The delay sequence is `base, 2*base, 4*base, ...` clamped to `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before the next attempt, given the delay used before the previous one.
    pub fn next_delay(&self, previous: Option<Duration>) -> Duration {
        match previous {
            None => self.base.min(self.cap),
            Some(prev) => prev.saturating_mul(2).max(self.base).min(self.cap),
        }
    }
}

impl From<&DownloaderConfig> for Backoff {
    fn from(config: &DownloaderConfig) -> Self {
        Self::new(config.backoff_base, config.backoff_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_delay_is_base() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(None), Duration::from_millis(100));
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(700));

        let mut delays = Vec::new();
        let mut previous = None;
        for _ in 0..5 {
            let delay = backoff.next_delay(previous);
            delays.push(delay.as_millis());
            previous = Some(delay);
        }

        assert_eq!(delays, vec![100, 200, 400, 700, 700]);
    }

    #[test]
    fn test_zero_base_stays_zero() {
        let backoff = Backoff::new(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(backoff.next_delay(None), Duration::ZERO);
        assert_eq!(backoff.next_delay(Some(Duration::ZERO)), Duration::ZERO);
    }

    #[test]
    fn test_no_overflow_on_large_delays() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::MAX);
        let delay = backoff.next_delay(Some(Duration::MAX));
        assert_eq!(delay, Duration::MAX);
    }

    #[test]
    fn test_from_config() {
        let config = DownloaderConfig::default();
        let backoff = Backoff::from(&config);
        assert_eq!(backoff.base, Duration::from_millis(250));
        assert_eq!(backoff.cap, Duration::from_secs(8));
    }
}
