//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zi.
//! The Zi project belongs to the Dunimd Team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

use std::time::Duration;

use rand::Rng;

use crate::errors::{Result, ZiError};

/// Exponential backoff with symmetric jitter.
///
/// The wait before retry `attempt` (1-based) is `base_delay * 2^(attempt-1)`
/// capped at `max_delay`, shifted by a uniform jitter within ±25% and clamped
/// back into `[0, max_delay]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ZiRetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ZiRetryPolicy {
    fn default() -> Self {
        ZiRetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ZiRetryPolicy {
    #[allow(non_snake_case)]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        ZiRetryPolicy {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Un-jittered wait before retry `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Wait before retry `attempt` with ±25% jitter applied.
    pub fn jittered_backoff<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let wait = self.backoff(attempt).as_secs_f64();
        let spread = wait / 4.0;
        let jitter = if spread > 0.0 {
            rng.gen_range(-spread..=spread)
        } else {
            0.0
        };
        let seconds = (wait + jitter).clamp(0.0, self.max_delay.as_secs_f64());
        Duration::from_secs_f64(seconds)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. The closure receives the 1-based attempt.
    pub fn run<T>(&self, label: &str, mut operation: impl FnMut(u32) -> Result<T>) -> Result<T> {
        let mut rng = rand::thread_rng();
        let mut attempt = 1;
        loop {
            match operation(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= self.max_attempts => {
                    log::error!("{label}: giving up after {attempt} attempts: {err}");
                    return Err(ZiError::connection(format!(
                        "{label} failed after {attempt} attempts: {err}"
                    )));
                }
                Err(err) => {
                    let wait = self.jittered_backoff(attempt, &mut rng);
                    log::warn!(
                        "{label}: attempt {attempt}/{} failed: {err}; retrying in {:.2}s",
                        self.max_attempts,
                        wait.as_secs_f64()
                    );
                    std::thread::sleep(wait);
                    attempt += 1;
                }
            }
        }
    }
}
