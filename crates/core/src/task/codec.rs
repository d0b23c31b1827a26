//! Canonical text layout of the task file
//!
//! The file is a JSON array with one record per line:
//!
//! ```text
//! [
//! {"Id":1,...},
//! {"Id":2,...}
//! ]
//! ```
//!
//! An empty list is `[\n\n]`. Because the file always ends with
//! [`CLOSING_MARKER`], an append can overwrite the marker in place and
//! write it again after the new record.

use super::model::Task;
use crate::Result;

pub const OPENING: &str = "[\n";
pub const CLOSING_MARKER: &str = "\n]";
pub const SEPARATOR: &str = ",\n";
pub const EMPTY_DOCUMENT: &str = "[\n\n]";

/// Encode one record as a single line of compact JSON
pub fn encode_record(task: &Task) -> Result<String> {
    Ok(serde_json::to_string(task)?)
}

/// Render the whole file for the given records
pub fn encode_document(tasks: &[Task]) -> Result<String> {
    if tasks.is_empty() {
        return Ok(EMPTY_DOCUMENT.to_string());
    }

    let mut out = String::from(OPENING);
    for (i, task) in tasks.iter().enumerate() {
        if i > 0 {
            out.push_str(SEPARATOR);
        }
        out.push_str(&encode_record(task)?);
    }
    out.push_str(CLOSING_MARKER);
    Ok(out)
}

/// Parse any well-formed JSON array of records
pub fn decode_document(content: &str) -> serde_json::Result<Vec<Task>> {
    serde_json::from_str(content)
}

/// Bytes an append writes over the closing marker
pub fn append_chunk(task: &Task, first: bool) -> Result<String> {
    let record = encode_record(task)?;
    let mut chunk = String::with_capacity(record.len() + SEPARATOR.len() + CLOSING_MARKER.len());
    if !first {
        chunk.push_str(SEPARATOR);
    }
    chunk.push_str(&record);
    chunk.push_str(CLOSING_MARKER);
    Ok(chunk)
}
