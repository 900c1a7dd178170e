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

use serde_json::Value;

use crate::config::ZiParams;
use crate::errors::{Result, ZiError};
use crate::operator::{ZiMapper, ZiOperatorKind, ZiRecordContext};
use crate::record::{keys, ZiRecord};

/// Stamps configured fields onto each record without touching its content.
#[derive(Debug)]
pub struct ZiMetadataEnricher {
    fields: ZiParams,
    overwrite: bool,
}

impl ZiMetadataEnricher {
    #[allow(non_snake_case)]
    pub fn new(fields: ZiParams, overwrite: bool) -> Self {
        Self { fields, overwrite }
    }
}

impl ZiMapper for ZiMetadataEnricher {
    fn name(&self) -> &str {
        "MetadataEnricher"
    }

    fn execute(&self, record: &mut ZiRecord, _ctx: &ZiRecordContext<'_>) -> Result<()> {
        for (key, value) in &self.fields {
            if self.overwrite || !record.fields.contains_key(key) {
                record.fields.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }
}

#[allow(non_snake_case)]
pub fn metadata_enricher_factory(params: &ZiParams) -> Result<ZiOperatorKind> {
    let fields = match params.get("fields") {
        Some(Value::Object(fields)) => fields.clone(),
        _ => {
            return Err(ZiError::validation(
                "MetadataEnricher requires object 'fields'",
            ))
        }
    };
    for reserved in [keys::TEXT, keys::DATA] {
        if fields.contains_key(reserved) {
            return Err(ZiError::validation(format!(
                "MetadataEnricher cannot set payload field '{reserved}'"
            )));
        }
    }
    let overwrite = params
        .get("overwrite")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(ZiOperatorKind::Mapper(Box::new(ZiMetadataEnricher::new(
        fields, overwrite,
    ))))
}
