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

//! # Dataset Ingestion Module
//!
//! Turns a task's dataset description into a lazy stream of records.
//!
//! ## Module Components
//!
//! - **Loader** ([loader.rs](loader/index.html)): availability retries, line
//!   parsing and field normalization
//!
//! ## Supported Inputs
//!
//! - **Path**: a JSONL file that may appear late (storage still syncing)
//! - **Inline**: base64-encoded JSONL embedded in the task configuration

pub mod loader;

pub use loader::{ZiDatasetLoader, ZiDatasetStorage, ZiLocalStorage};
