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

//! # Operator Registry Module
//!
//! Maps operator names to factories that turn a parameter map into a
//! [`ZiOperatorKind`]. The registry is consulted once, when the task
//! configuration is turned into a chain; an unknown name or bad parameters
//! fail the build before any record is read.
//!
//! New operators are added by registering another factory, the engine never
//! changes.

use std::collections::HashMap;

use crate::config::{ZiOperatorConfig, ZiParams};
use crate::errors::{Result, ZiError};
use crate::operator::ZiOperatorKind;

/// Given a parameter map, returns an operator ready to run on records.
pub type ZiOperatorFactory = fn(&ZiParams) -> Result<ZiOperatorKind>;

/// Registry mapping operator names to their factory functions.
#[derive(Debug, Default, Clone)]
pub struct ZiOperatorRegistry {
    inner: HashMap<String, ZiOperatorFactory>,
}

impl ZiOperatorRegistry {
    #[allow(non_snake_case)]
    pub fn new() -> Self {
        ZiOperatorRegistry {
            inner: HashMap::new(),
        }
    }

    /// Creates a registry pre-loaded with the bundled operators.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        crate::operators::register_defaults(&mut registry);
        registry
    }

    #[allow(non_snake_case)]
    pub fn register(&mut self, name: &str, factory: ZiOperatorFactory) {
        self.inner.insert(name.to_string(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inner.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Instantiates the operator for one configured step.
    pub fn build(&self, index: usize, step: &ZiOperatorConfig) -> Result<ZiOperatorKind> {
        let factory = self
            .inner
            .get(&step.name)
            .ok_or_else(|| ZiError::UnsupportedOperator {
                operator: step.name.clone(),
                index,
            })?;
        factory(&step.params).map_err(|err| {
            ZiError::config(format!(
                "invalid parameters for '{}' at step #{index}: {err}",
                step.name
            ))
        })
    }

    /// Instantiates every step, in order, failing on the first bad one.
    pub fn build_chain(&self, steps: &[ZiOperatorConfig]) -> Result<Vec<ZiOperatorKind>> {
        steps
            .iter()
            .enumerate()
            .map(|(index, step)| self.build(index, step))
            .collect()
    }
}
