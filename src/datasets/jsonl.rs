//! JSON Lines reading

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;

use crate::error::MtebError;

/// Read every non-blank line of a JSONL file as `T`
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line).map_err(|e| MtebError::InvalidRow {
            source_name: format!("{}:{}", path.display(), line_no + 1),
            reason: e.to_string(),
        })?;
        rows.push(row);
    }

    Ok(rows)
}
