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

//! # SQLite Metadata Store
//!
//! SQLite implementation of [`ZiMetadataStore`] on top of [`ZiPooledClient`].
//! The pool is an `sqlx` [`SqlitePool`] driven by a small private tokio
//! runtime, so the store keeps a blocking API for the executor. Tables are
//! created idempotently when the pool opens.
//!
//! Statements hitting a locked database are retried (20 times, 1s apart by
//! default) before surfacing a store error.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions,
};
use sqlx::Connection;
use tokio::runtime::{Handle, Runtime};

use crate::config::ZiStoreConfig;
use crate::errors::{Result, ZiError};
use crate::store::pool::{ZiConnectionFactory, ZiPoolOptions, ZiPooledClient};
use crate::store::retry::ZiRetryPolicy;
use crate::store::{ZiCleanResult, ZiDatasetFile, ZiMetadataStore, ZiTaskStatus};

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for the executor's tables, one statement each.
const SCHEMA: [&str; 5] = [
    r"CREATE TABLE IF NOT EXISTS t_clean_task (
        id TEXT PRIMARY KEY,
        dest_dataset_id TEXT NOT NULL,
        status TEXT NOT NULL,
        after_size INTEGER NOT NULL DEFAULT 0,
        file_count INTEGER NOT NULL DEFAULT 0,
        finished_at TEXT
    )",
    r"CREATE TABLE IF NOT EXISTS t_dm_datasets (
        id TEXT PRIMARY KEY,
        size_bytes INTEGER NOT NULL DEFAULT 0,
        file_count INTEGER NOT NULL DEFAULT 0
    )",
    r"CREATE TABLE IF NOT EXISTS t_dm_dataset_files (
        id TEXT PRIMARY KEY,
        dataset_id TEXT NOT NULL,
        file_name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        file_type TEXT NOT NULL,
        file_size INTEGER NOT NULL DEFAULT 0,
        check_sum TEXT,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (dataset_id, file_path)
    )",
    r"CREATE TABLE IF NOT EXISTS t_clean_result (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        instance_id TEXT NOT NULL,
        src_file_id TEXT,
        dest_file_id TEXT,
        src_name TEXT,
        dest_name TEXT,
        src_type TEXT,
        dest_type TEXT,
        src_size INTEGER NOT NULL DEFAULT 0,
        dest_size INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL,
        result TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_clean_result_instance ON t_clean_result (instance_id)",
];

/// Opens the SQLite pool for [`ZiPooledClient`].
#[derive(Debug, Clone)]
pub struct ZiSqliteConnector {
    path: PathBuf,
    busy_timeout: Duration,
}

impl ZiSqliteConnector {
    #[allow(non_snake_case)]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ZiSqliteConnector {
            path: path.into(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// An open `sqlx` pool together with the runtime that drives it.
pub struct ZiSqlitePool {
    pool: Option<SqlitePool>,
    runtime: Runtime,
}

impl fmt::Debug for ZiSqlitePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZiSqlitePool")
            .field("size", &self.size())
            .field("idle", &self.num_idle())
            .finish()
    }
}

impl ZiSqlitePool {
    fn inner(&self) -> Result<&SqlitePool> {
        self.pool
            .as_ref()
            .ok_or_else(|| ZiError::connection("connection pool is closed"))
    }

    /// Connections currently open, idle or checked out.
    pub fn size(&self) -> u32 {
        self.pool.as_ref().map_or(0, SqlitePool::size)
    }

    pub fn num_idle(&self) -> usize {
        self.pool.as_ref().map_or(0, SqlitePool::num_idle)
    }
}

impl Drop for ZiSqlitePool {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            self.runtime.block_on(pool.close());
        }
    }
}

/// A connection checked out of a [`ZiSqlitePool`]; returned on drop.
pub struct ZiSqliteConnection {
    conn: Option<PoolConnection<Sqlite>>,
    handle: Handle,
}

impl fmt::Debug for ZiSqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZiSqliteConnection")
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl ZiSqliteConnection {
    /// The runtime handle to block on and the raw connection to run against.
    pub fn parts(&mut self) -> Result<(&Handle, &mut SqliteConnection)> {
        match self.conn.as_deref_mut() {
            Some(conn) => Ok((&self.handle, conn)),
            None => Err(ZiError::connection("connection already returned")),
        }
    }
}

impl Drop for ZiSqliteConnection {
    fn drop(&mut self) {
        // Returning a connection spawns onto the pool's runtime.
        if let Some(conn) = self.conn.take() {
            let _entered = self.handle.enter();
            drop(conn);
        }
    }
}

impl ZiConnectionFactory for ZiSqliteConnector {
    type Pool = ZiSqlitePool;
    type Connection = ZiSqliteConnection;

    fn open_pool(&self, options: &ZiPoolOptions) -> Result<ZiSqlitePool> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                ZiError::connection(format!("cannot create '{}': {err}", parent.display()))
            })?;
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("zirun-store")
            .enable_all()
            .build()
            .map_err(|err| ZiError::internal(format!("cannot start store runtime: {err}")))?;

        let connect = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .busy_timeout(self.busy_timeout);
        let pool_options = SqlitePoolOptions::new()
            .max_connections(options.max_connections())
            .min_connections(0)
            .acquire_timeout(options.timeout)
            .max_lifetime(options.recycle)
            .test_before_acquire(options.pre_ping);

        let pool = runtime
            .block_on(async move {
                let pool = pool_options.connect_with(connect).await?;
                for statement in SCHEMA {
                    sqlx::query(statement).execute(&pool).await?;
                }
                Ok::<_, sqlx::Error>(pool)
            })
            .map_err(|err| {
                ZiError::connection(format!("cannot open '{}': {err}", self.path.display()))
            })?;

        log::debug!("opened sqlite pool at {}", self.path.display());
        Ok(ZiSqlitePool {
            pool: Some(pool),
            runtime,
        })
    }

    fn acquire(&self, pool: &ZiSqlitePool) -> Result<ZiSqliteConnection> {
        let inner = pool.inner()?;
        let conn = pool.runtime.block_on(inner.acquire())?;
        Ok(ZiSqliteConnection {
            conn: Some(conn),
            handle: pool.runtime.handle().clone(),
        })
    }
}

/// Stored state of one task row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZiTaskRow {
    pub dataset_id: String,
    pub status: ZiTaskStatus,
    pub after_size: u64,
    pub file_count: u64,
    pub finished_at: Option<String>,
}

/// SQLite-backed [`ZiMetadataStore`].
#[derive(Debug)]
pub struct ZiSqliteMetadataStore {
    client: ZiPooledClient<ZiSqliteConnector>,
    lock_retries: u32,
    lock_delay: Duration,
}

impl ZiSqliteMetadataStore {
    #[allow(non_snake_case)]
    pub fn new(client: ZiPooledClient<ZiSqliteConnector>) -> Self {
        ZiSqliteMetadataStore {
            client,
            lock_retries: 20,
            lock_delay: Duration::from_secs(1),
        }
    }

    /// Builds the store and its (not yet opened) pool from settings.
    pub fn from_config(config: &ZiStoreConfig) -> Self {
        let retry = ZiRetryPolicy::new(config.max_retries, config.base_delay, config.max_delay);
        let client = ZiPooledClient::new(
            ZiSqliteConnector::new(&config.db_path),
            ZiPoolOptions::from(config),
            retry,
        );
        Self::new(client)
    }

    /// Overrides the locked-database retry budget.
    pub fn with_lock_retry(mut self, retries: u32, delay: Duration) -> Self {
        self.lock_retries = retries;
        self.lock_delay = delay;
        self
    }

    pub fn client(&self) -> &ZiPooledClient<ZiSqliteConnector> {
        &self.client
    }

    /// Runs `statement` on a pooled connection, retrying while the database is locked.
    fn with_connection<T>(
        &self,
        label: &str,
        mut statement: impl FnMut(&Handle, &mut SqliteConnection) -> sqlx::Result<T>,
    ) -> Result<T> {
        let mut connection = self.client.create_connect()?;
        let (handle, conn) = connection.parts()?;
        let mut attempt = 0;
        loop {
            match statement(handle, &mut *conn) {
                Ok(value) => return Ok(value),
                Err(err) if is_locked(&err) && attempt < self.lock_retries => {
                    attempt += 1;
                    log::warn!(
                        "{label}: database is locked, retry {attempt}/{}",
                        self.lock_retries
                    );
                    std::thread::sleep(self.lock_delay);
                }
                Err(err) => {
                    return Err(match ZiError::from(err) {
                        ZiError::Store { message } => ZiError::store(format!("{label}: {message}")),
                        other => other,
                    });
                }
            }
        }
    }

    /// Full stored row for a task, for reconciliation and tests.
    pub fn task_row(&self, instance_id: &str) -> Result<Option<ZiTaskRow>> {
        let row = self.with_connection("read task", |rt, conn| {
            rt.block_on(
                sqlx::query_as::<_, (String, String, i64, i64, Option<String>)>(
                    "SELECT dest_dataset_id, status, after_size, file_count, finished_at
                     FROM t_clean_task WHERE id = ?1",
                )
                .bind(instance_id)
                .fetch_optional(&mut *conn),
            )
        })?;
        row.map(|(dataset_id, status, after_size, file_count, finished_at)| {
            Ok(ZiTaskRow {
                dataset_id,
                status: status.parse()?,
                after_size: after_size.max(0) as u64,
                file_count: file_count.max(0) as u64,
                finished_at,
            })
        })
        .transpose()
    }

    /// Dataset totals as last written by `update_result`.
    pub fn dataset_totals(&self, dataset_id: &str) -> Result<Option<(u64, u64)>> {
        let totals = self.with_connection("read dataset", |rt, conn| {
            rt.block_on(
                sqlx::query_as::<_, (i64, i64)>(
                    "SELECT size_bytes, file_count FROM t_dm_datasets WHERE id = ?1",
                )
                .bind(dataset_id)
                .fetch_optional(&mut *conn),
            )
        })?;
        Ok(totals.map(|(size, count)| (size.max(0) as u64, count.max(0) as u64)))
    }

    /// Per-record result rows of a task, oldest first.
    pub fn clean_results(&self, instance_id: &str) -> Result<Vec<ZiCleanResult>> {
        type Row = (
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            i64,
            i64,
            String,
            Option<String>,
        );
        let rows = self.with_connection("read clean results", |rt, conn| {
            rt.block_on(
                sqlx::query_as::<_, Row>(
                    "SELECT instance_id, src_file_id, dest_file_id, src_name, dest_name, src_type,
                            dest_type, src_size, dest_size, status, result
                     FROM t_clean_result WHERE instance_id = ?1 ORDER BY id",
                )
                .bind(instance_id)
                .fetch_all(&mut *conn),
            )
        })?;
        Ok(rows
            .into_iter()
            .map(|row| ZiCleanResult {
                instance_id: row.0,
                src_file_id: row.1.unwrap_or_default(),
                dest_file_id: row.2.unwrap_or_default(),
                src_name: row.3.unwrap_or_default(),
                dest_name: row.4.unwrap_or_default(),
                src_type: row.5.unwrap_or_default(),
                dest_type: row.6.unwrap_or_default(),
                src_size: row.7.max(0) as u64,
                dest_size: row.8.max(0) as u64,
                status: row.9,
                result: row.10.unwrap_or_default(),
            })
            .collect())
    }

    /// Registered files of a dataset, ordered by path.
    pub fn dataset_files(&self, dataset_id: &str) -> Result<Vec<ZiDatasetFile>> {
        let rows = self.with_connection("read dataset files", |rt, conn| {
            rt.block_on(
                sqlx::query_as::<_, (String, String, String, String, String, i64, Option<String>)>(
                    "SELECT id, dataset_id, file_name, file_path, file_type, file_size, check_sum
                     FROM t_dm_dataset_files WHERE dataset_id = ?1 ORDER BY file_path",
                )
                .bind(dataset_id)
                .fetch_all(&mut *conn),
            )
        })?;
        Ok(rows
            .into_iter()
            .map(
                |(id, dataset_id, file_name, file_path, file_type, file_size, check_sum)| {
                    ZiDatasetFile {
                        id,
                        dataset_id,
                        file_name,
                        file_path,
                        file_type,
                        file_size: file_size.max(0) as u64,
                        check_sum,
                    }
                },
            )
            .collect())
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes.
fn is_locked(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    }
}

fn now() -> String {
    Utc::now().format(DATETIME_FMT).to_string()
}

impl ZiMetadataStore for ZiSqliteMetadataStore {
    fn update_result(&self, dataset_id: &str, instance_id: &str, status: ZiTaskStatus) -> Result<()> {
        let (total_size, file_count) = self.with_connection("sum dataset files", |rt, conn| {
            rt.block_on(
                sqlx::query_as::<_, (i64, i64)>(
                    "SELECT COALESCE(SUM(file_size), 0), COUNT(*) FROM t_dm_dataset_files
                     WHERE dataset_id = ?1",
                )
                .bind(dataset_id)
                .fetch_one(&mut *conn),
            )
        })?;

        let finished_at = status.is_terminal().then(now);
        let changed = self.with_connection("update task", |rt, conn| {
            rt.block_on(
                sqlx::query(
                    "INSERT INTO t_clean_task (id, dest_dataset_id, status, after_size, file_count, finished_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                         status = excluded.status,
                         after_size = excluded.after_size,
                         file_count = excluded.file_count,
                         finished_at = COALESCE(t_clean_task.finished_at, excluded.finished_at)
                     WHERE t_clean_task.status NOT IN ('COMPLETED', 'FAILED', 'STOPPED')",
                )
                .bind(instance_id)
                .bind(dataset_id)
                .bind(status.as_str())
                .bind(total_size)
                .bind(file_count)
                .bind(finished_at.as_deref())
                .execute(&mut *conn),
            )
            .map(|done| done.rows_affected())
        })?;

        // A terminal task keeps the dataset totals it finished with.
        if changed == 0 {
            log::warn!(
                "task {instance_id} already has a terminal status; {status} not applied"
            );
            return Ok(());
        }

        self.with_connection("update dataset", |rt, conn| {
            rt.block_on(
                sqlx::query(
                    "INSERT INTO t_dm_datasets (id, size_bytes, file_count) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET
                         size_bytes = excluded.size_bytes,
                         file_count = excluded.file_count",
                )
                .bind(dataset_id)
                .bind(total_size)
                .bind(file_count)
                .execute(&mut *conn),
            )
        })?;

        log::info!(
            "task {instance_id} (dataset {dataset_id}) -> {status}: {file_count} files, {total_size} bytes"
        );
        Ok(())
    }

    fn task_status(&self, instance_id: &str) -> Result<Option<ZiTaskStatus>> {
        Ok(self.task_row(instance_id)?.map(|row| row.status))
    }

    fn insert_clean_result(&self, result: &ZiCleanResult) -> Result<()> {
        let created_at = now();
        self.with_connection("insert clean result", |rt, conn| {
            rt.block_on(
                sqlx::query(
                    "INSERT INTO t_clean_result (instance_id, src_file_id, dest_file_id, src_name,
                         dest_name, src_type, dest_type, src_size, dest_size, status, result, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                )
                .bind(result.instance_id.as_str())
                .bind(result.src_file_id.as_str())
                .bind(result.dest_file_id.as_str())
                .bind(result.src_name.as_str())
                .bind(result.dest_name.as_str())
                .bind(result.src_type.as_str())
                .bind(result.dest_type.as_str())
                .bind(result.src_size as i64)
                .bind(result.dest_size as i64)
                .bind(result.status.as_str())
                .bind(result.result.as_str())
                .bind(created_at.as_str())
                .execute(&mut *conn),
            )
        })?;
        Ok(())
    }

    fn existing_file_paths(&self, dataset_id: &str) -> Result<HashSet<String>> {
        let paths = self.with_connection("query dataset files", |rt, conn| {
            rt.block_on(
                sqlx::query_scalar::<_, String>(
                    "SELECT file_path FROM t_dm_dataset_files WHERE dataset_id = ?1",
                )
                .bind(dataset_id)
                .fetch_all(&mut *conn),
            )
        })?;
        Ok(paths.into_iter().collect())
    }

    fn insert_dataset_files(&self, files: &[ZiDatasetFile]) -> Result<usize> {
        if files.is_empty() {
            return Ok(0);
        }
        let created_at = now();
        self.with_connection("insert dataset files", |rt, conn| {
            rt.block_on(async {
                let mut tx = conn.begin().await?;
                let mut inserted = 0;
                for file in files {
                    inserted += sqlx::query(
                        "INSERT OR IGNORE INTO t_dm_dataset_files (id, dataset_id, file_name,
                             file_path, file_type, file_size, check_sum, status, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'COMPLETED', ?8)",
                    )
                    .bind(file.id.as_str())
                    .bind(file.dataset_id.as_str())
                    .bind(file.file_name.as_str())
                    .bind(file.file_path.as_str())
                    .bind(file.file_type.as_str())
                    .bind(file.file_size as i64)
                    .bind(file.check_sum.as_deref())
                    .bind(created_at.as_str())
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                }
                tx.commit().await?;
                Ok::<_, sqlx::Error>(inserted as usize)
            })
        })
    }
}
