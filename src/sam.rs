//src/sam.rs

use thiserror::Error;

use crate::types::AlignmentRecord;

/// Number of mandatory tab-separated fields in a SAM alignment line.
pub const SAM_MANDATORY_FIELDS: usize = 11;

/// Column positions of the mandatory fields we read.
const READ_ID_FIELD: usize = 0;
const REFERENCE_ID_FIELD: usize = 2;

/// Problems with a single alignment line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SamError {
    #[error("expected at least {} tab-separated fields, found {found}", SAM_MANDATORY_FIELDS)]
    TooFewFields { found: usize },

    #[error("edit distance tag '{tag}' is not an unsigned integer")]
    BadEditDistance { tag: String },
}

/// Accumulates raw bytes from a stream and hands back complete lines.
///
/// Bytes arrive in arbitrary slices; anything after the last `\n` is kept
/// until more input (or the end of the stream) arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    start: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        if self.start > 0 {
            self.pending.drain(..self.start);
            self.start = 0;
        }
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete line without its terminator (`\n` or `\r\n`).
    pub fn next_line(&mut self) -> Option<String> {
        let rest = &self.pending[self.start..];
        let nl = rest.iter().position(|&b| b == b'\n')?;

        let mut line = &rest[..nl];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        let text = String::from_utf8_lossy(line).into_owned();
        self.start += nl + 1;
        Some(text)
    }

    /// Bytes received after the last newline.
    pub fn remainder(&self) -> String {
        String::from_utf8_lossy(&self.pending[self.start..]).into_owned()
    }

    /// Empties the buffer, returning whatever incomplete line it held.
    pub fn take_remainder(&mut self) -> String {
        let rest = self.remainder();
        self.pending.clear();
        self.start = 0;
        rest
    }
}

/// Reads the edit distance from an `NM:i:<n>` style tag: the integer after the last colon.
fn parse_edit_distance(tag: &str) -> Result<u32, SamError> {
    let value = tag.rsplit(':').next().unwrap_or(tag);
    value.parse().map_err(|_| SamError::BadEditDistance {
        tag: tag.to_string(),
    })
}

/// Parses one SAM alignment line.
///
/// Optional tags after the mandatory fields are scanned for the first one
/// starting with `NM`; its absence leaves `edit_distance` as `None`.
pub fn parse_alignment_line(line: &str) -> Result<AlignmentRecord, SamError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < SAM_MANDATORY_FIELDS {
        return Err(SamError::TooFewFields { found: fields.len() });
    }

    let edit_distance = match fields[SAM_MANDATORY_FIELDS..]
        .iter()
        .find(|tag| tag.starts_with("NM"))
    {
        Some(tag) => Some(parse_edit_distance(tag)?),
        None => None,
    };

    Ok(AlignmentRecord {
        read_id: fields[READ_ID_FIELD].to_string(),
        reference_id: fields[REFERENCE_ID_FIELD].to_string(),
        edit_distance,
    })
}
