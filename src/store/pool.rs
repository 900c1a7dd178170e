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

//! # Connection Pool Module
//!
//! [`ZiPooledClient`] owns one backend connection pool and builds it on
//! first use behind a `OnceLock`, so concurrent first callers open it exactly
//! once. Sizing, checkout timeout, pre-ping and recycling belong to the
//! backend pool; [`ZiPoolOptions`] carries them over from the store settings.
//!
//! ## Retries
//!
//! Both pool creation and checkout run under the client's
//! [`ZiRetryPolicy`]. A pool that failed to open is not cached, so the next
//! attempt tries again from scratch.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use crate::config::ZiStoreConfig;
use crate::errors::Result;
use crate::store::retry::ZiRetryPolicy;

/// Opens a backend pool and checks connections out of it.
pub trait ZiConnectionFactory: Send + Sync + 'static {
    type Pool: Send + Sync;
    type Connection;

    /// Opens the pool; unreachable backends should be `ZiError::Connection`.
    fn open_pool(&self, options: &ZiPoolOptions) -> Result<Self::Pool>;

    /// Checks one connection out of `pool`, waiting up to the pool timeout.
    fn acquire(&self, pool: &Self::Pool) -> Result<Self::Connection>;
}

/// Sizing and health settings handed to the backend pool.
#[derive(Debug, Clone, PartialEq)]
pub struct ZiPoolOptions {
    pub max_size: usize,
    pub max_overflow: usize,
    pub timeout: Duration,
    pub recycle: Duration,
    pub pre_ping: bool,
}

impl Default for ZiPoolOptions {
    fn default() -> Self {
        ZiPoolOptions {
            max_size: 5,
            max_overflow: 10,
            timeout: Duration::from_secs(30),
            recycle: Duration::from_secs(3600),
            pre_ping: true,
        }
    }
}

impl From<&ZiStoreConfig> for ZiPoolOptions {
    fn from(config: &ZiStoreConfig) -> Self {
        ZiPoolOptions {
            max_size: config.pool_size.max(1),
            max_overflow: config.max_overflow,
            timeout: config.pool_timeout,
            recycle: config.recycle,
            pre_ping: config.pre_ping,
        }
    }
}

impl ZiPoolOptions {
    /// Upper bound on connections alive at once.
    pub fn max_connections(&self) -> u32 {
        u32::try_from(self.max_size + self.max_overflow).unwrap_or(u32::MAX)
    }
}

/// Dependency-injected client owning a lazily created pool.
pub struct ZiPooledClient<F: ZiConnectionFactory> {
    factory: F,
    options: ZiPoolOptions,
    retry: ZiRetryPolicy,
    pool: OnceLock<F::Pool>,
    init: Mutex<()>,
    initializations: AtomicUsize,
}

impl<F: ZiConnectionFactory> fmt::Debug for ZiPooledClient<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZiPooledClient")
            .field("options", &self.options)
            .field("retry", &self.retry)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl<F: ZiConnectionFactory> ZiPooledClient<F> {
    #[allow(non_snake_case)]
    pub fn new(factory: F, options: ZiPoolOptions, retry: ZiRetryPolicy) -> Self {
        ZiPooledClient {
            factory,
            options,
            retry,
            pool: OnceLock::new(),
            init: Mutex::new(()),
            initializations: AtomicUsize::new(0),
        }
    }

    /// The shared pool, opened on first successful call.
    pub fn pool(&self) -> Result<&F::Pool> {
        if let Some(pool) = self.pool.get() {
            return Ok(pool);
        }
        let _guard = self
            .init
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(pool) = self.pool.get() {
            return Ok(pool);
        }
        log::info!(
            "initializing connection pool (size {}, overflow {})",
            self.options.max_size,
            self.options.max_overflow
        );
        let pool = self.factory.open_pool(&self.options)?;
        self.initializations.fetch_add(1, Ordering::SeqCst);
        Ok(self.pool.get_or_init(|| pool))
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.get().is_some()
    }

    /// How many times the pool was opened; never more than one.
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn options(&self) -> &ZiPoolOptions {
        &self.options
    }

    pub fn retry_policy(&self) -> &ZiRetryPolicy {
        &self.retry
    }

    /// Checks out a pooled connection, retrying transient failures with backoff.
    pub fn create_connect(&self) -> Result<F::Connection> {
        self.retry.run("metadata store connection", |_attempt| {
            let pool = self.pool()?;
            self.factory.acquire(pool)
        })
    }
}
