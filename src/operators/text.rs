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

use regex::{Captures, Regex};

use crate::config::ZiParams;
use crate::errors::{Result, ZiError};
use crate::operator::{ZiMapper, ZiOperatorKind, ZiRecordContext};
use crate::operators::{param_bool, param_u64};
use crate::record::ZiRecord;

const TABLE_TAGS: &[&str] = &["table", "thead", "tbody", "tfoot", "tr", "td", "th", "caption"];

/// Strips HTML markup from a record's text.
///
/// `script` and `style` blocks are removed with their content. Table markup
/// survives when `keepTables` is set. XML sources are left untouched.
#[derive(Debug)]
pub struct ZiHtmlTagCleaner {
    keep_tables: bool,
    script: Regex,
    style: Regex,
    comment: Regex,
    tag: Regex,
}

impl ZiHtmlTagCleaner {
    #[allow(non_snake_case)]
    pub fn new(keep_tables: bool) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|err| ZiError::validation(format!("HtmlTagCleaner pattern: {err}")))
        };
        Ok(Self {
            keep_tables,
            script: compile(r"(?is)<script\b[^>]*>.*?</script\s*>")?,
            style: compile(r"(?is)<style\b[^>]*>.*?</style\s*>")?,
            comment: compile(r"(?s)<!--.*?-->")?,
            tag: compile(r"</?\s*([A-Za-z][A-Za-z0-9]*)\b[^>]*>")?,
        })
    }

    pub fn clean(&self, text: &str) -> String {
        let text = self.script.replace_all(text, "");
        let text = self.style.replace_all(&text, "");
        let text = self.comment.replace_all(&text, "");
        let text = self.tag.replace_all(&text, |caps: &Captures<'_>| {
            let name = caps[1].to_ascii_lowercase();
            if self.keep_tables && TABLE_TAGS.contains(&name.as_str()) {
                caps[0].to_string()
            } else {
                String::new()
            }
        });
        text.replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&amp;", "&")
    }
}

impl ZiMapper for ZiHtmlTagCleaner {
    fn name(&self) -> &str {
        "HtmlTagCleaner"
    }

    fn execute(&self, record: &mut ZiRecord, ctx: &ZiRecordContext<'_>) -> Result<()> {
        if record.file_type() == "xml" {
            return Ok(());
        }
        ctx.read_file_first(record)?;
        if !record.text.is_empty() {
            record.text = self.clean(&record.text);
        }
        Ok(())
    }
}

#[allow(non_snake_case)]
pub fn html_tag_cleaner_factory(params: &ZiParams) -> Result<ZiOperatorKind> {
    let keep_tables = param_bool(params, "HtmlTagCleaner", "keepTables")?.unwrap_or(false);
    Ok(ZiOperatorKind::Mapper(Box::new(ZiHtmlTagCleaner::new(
        keep_tables,
    )?)))
}

/// Trims trailing whitespace and collapses runs of blank lines.
#[derive(Debug)]
pub struct ZiWhitespaceNormalizer {
    max_blank_lines: usize,
}

impl ZiWhitespaceNormalizer {
    #[allow(non_snake_case)]
    pub fn new(max_blank_lines: usize) -> Self {
        Self { max_blank_lines }
    }

    pub fn normalize(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut blank_run = 0usize;
        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                blank_run += 1;
                if blank_run > self.max_blank_lines {
                    continue;
                }
            } else {
                blank_run = 0;
            }
            out.push_str(line);
            out.push('\n');
        }
        out.trim().to_string()
    }
}

impl ZiMapper for ZiWhitespaceNormalizer {
    fn name(&self) -> &str {
        "WhitespaceNormalizer"
    }

    fn execute(&self, record: &mut ZiRecord, ctx: &ZiRecordContext<'_>) -> Result<()> {
        ctx.read_file_first(record)?;
        if !record.text.is_empty() {
            record.text = self.normalize(&record.text);
        }
        Ok(())
    }
}

#[allow(non_snake_case)]
pub fn whitespace_normalizer_factory(params: &ZiParams) -> Result<ZiOperatorKind> {
    let max_blank_lines = param_u64(params, "WhitespaceNormalizer", "maxBlankLines")?.unwrap_or(1);
    Ok(ZiOperatorKind::Mapper(Box::new(ZiWhitespaceNormalizer::new(
        max_blank_lines as usize,
    ))))
}
