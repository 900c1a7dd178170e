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

//! # Zirun Connection Pool Tests
//!
//! Tests for lazy one-time pool initialization, retried pool opening and
//! checkout, option mapping and backoff bounds.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test pool
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use zirun::config::ZiStoreConfig;
use zirun::errors::Result;
use zirun::store::{ZiConnectionFactory, ZiPoolOptions, ZiPooledClient, ZiRetryPolicy};
use zirun::ZiError;

/// Factory whose first `open_failures` pool opens and first
/// `checkout_failures` checkouts fail with a connection error.
#[derive(Debug, Default)]
struct FlakyFactory {
    open_failures: usize,
    checkout_failures: usize,
    opens: AtomicUsize,
}

impl FlakyFactory {
    fn new(open_failures: usize) -> Self {
        FlakyFactory {
            open_failures,
            ..FlakyFactory::default()
        }
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl ZiConnectionFactory for FlakyFactory {
    /// Counts checkout attempts against the pool.
    type Pool = AtomicUsize;
    type Connection = usize;

    fn open_pool(&self, _options: &ZiPoolOptions) -> Result<AtomicUsize> {
        let attempt = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.open_failures {
            Err(ZiError::connection(format!("refused (attempt {attempt})")))
        } else {
            Ok(AtomicUsize::new(0))
        }
    }

    fn acquire(&self, pool: &AtomicUsize) -> Result<usize> {
        let checkout = pool.fetch_add(1, Ordering::SeqCst) + 1;
        if checkout <= self.checkout_failures {
            Err(ZiError::connection("pool timed out"))
        } else {
            Ok(checkout)
        }
    }
}

fn quick_retry(max_attempts: u32) -> ZiRetryPolicy {
    ZiRetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(20))
}

/// Tests that the pool is not opened until first use.
#[test]
fn test_pool_is_lazy() {
    let client = ZiPooledClient::new(FlakyFactory::new(0), ZiPoolOptions::default(), quick_retry(3));
    assert!(!client.is_initialized());
    assert_eq!(client.initializations(), 0);
    assert_eq!(client.factory().opens(), 0);

    let connection = client.create_connect().unwrap();
    assert_eq!(connection, 1);
    assert!(client.is_initialized());
    assert_eq!(client.initializations(), 1);
}

/// Tests that concurrent first use opens the pool exactly once.
#[test]
fn test_concurrent_first_use_initializes_once() {
    let client = Arc::new(ZiPooledClient::new(
        FlakyFactory::new(0),
        ZiPoolOptions::default(),
        quick_retry(3),
    ));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = Arc::clone(&client);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                client.create_connect().is_ok()
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }

    assert_eq!(client.initializations(), 1);
    assert_eq!(client.factory().opens(), 1);
    assert_eq!(client.pool().unwrap().load(Ordering::SeqCst), 8);
}

/// Tests that a pool which failed to open is retried and then cached.
#[test]
fn test_flaky_open_recovers() {
    let client = ZiPooledClient::new(FlakyFactory::new(2), ZiPoolOptions::default(), quick_retry(5));
    assert_eq!(client.create_connect().unwrap(), 1);
    assert_eq!(client.factory().opens(), 3);
    assert_eq!(client.initializations(), 1);

    assert_eq!(client.create_connect().unwrap(), 2);
    assert_eq!(client.factory().opens(), 3);
}

/// Tests that failed checkouts are retried against the same pool.
#[test]
fn test_failed_checkout_is_retried() {
    let factory = FlakyFactory {
        checkout_failures: 2,
        ..FlakyFactory::default()
    };
    let client = ZiPooledClient::new(factory, ZiPoolOptions::default(), quick_retry(5));

    assert_eq!(client.create_connect().unwrap(), 3);
    assert_eq!(client.initializations(), 1);
}

/// Tests that connection failures beyond the retry budget are reported.
#[test]
fn test_retry_budget_exhausted() {
    let client = ZiPooledClient::new(FlakyFactory::new(10), ZiPoolOptions::default(), quick_retry(3));
    match client.create_connect() {
        Err(ZiError::Connection { message }) => assert!(message.contains("after 3 attempts")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected the connection to fail"),
    }
    assert!(!client.is_initialized());
    assert_eq!(client.factory().opens(), 3);
}

/// Tests that store settings map onto the backend pool options.
#[test]
fn test_pool_options_from_config() {
    let config = ZiStoreConfig {
        pool_size: 0,
        max_overflow: 3,
        pool_timeout: Duration::from_secs(2),
        pre_ping: false,
        ..ZiStoreConfig::default()
    };
    let options = ZiPoolOptions::from(&config);

    assert_eq!(options.max_size, 1);
    assert_eq!(options.max_connections(), 4);
    assert_eq!(options.timeout, Duration::from_secs(2));
    assert!(!options.pre_ping);
    assert_eq!(ZiPoolOptions::default().max_connections(), 15);
}

/// Tests that non-retryable errors are returned without retrying.
#[test]
fn test_non_retryable_errors_are_not_retried() {
    let mut calls = 0;
    let result: Result<()> = quick_retry(5).run("statement", |_| {
        calls += 1;
        Err(ZiError::store("constraint failed"))
    });
    assert!(matches!(result, Err(ZiError::Store { .. })));
    assert_eq!(calls, 1);
}

/// Tests the documented backoff schedule.
#[test]
fn test_backoff_schedule() {
    let policy = ZiRetryPolicy::default();
    let waits: Vec<u64> = (1..=7).map(|n| policy.backoff(n).as_secs()).collect();
    assert_eq!(waits, [1, 2, 4, 8, 16, 30, 30]);
}

proptest! {
    /// Jittered waits stay within ±25% of the capped backoff and never exceed the cap.
    #[test]
    fn test_jittered_backoff_bounds(attempt in 1u32..40, seed in any::<u64>()) {
        let policy = ZiRetryPolicy::default();
        let mut rng = SmallRng::seed_from_u64(seed);
        let base = policy.backoff(attempt).as_secs_f64();
        let wait = policy.jittered_backoff(attempt, &mut rng).as_secs_f64();

        prop_assert!(wait >= base * 0.75 - 1e-9);
        prop_assert!(wait <= base * 1.25 + 1e-9);
        prop_assert!(wait <= policy.max_delay.as_secs_f64() + 1e-9);
    }
}
