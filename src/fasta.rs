//src/fasta.rs

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::errors::{Error, Result};
use crate::types::FastaRecord;

/// Opens a FASTA file for line reading; `.gz` files are decompressed on the fly.
pub fn open_fasta<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| Error::io(path, e))?;

    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    let reader: Box<dyn BufRead> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };
    Ok(reader)
}

/// Streaming FASTA parser.
///
/// Yields records lazily as headers are encountered. Lines are taken as raw
/// bytes, so headers need not be valid UTF-8. A body line containing a space
/// drops the whole record it belongs to, and nothing is accumulated again
/// until the next header line. Blank lines terminate the current record.
pub struct FastaRecords<R: BufRead> {
    reader: R,
    line: Vec<u8>,
    header: Vec<u8>,
    sequence: Vec<u8>,
    finished: bool,
}

impl<R: BufRead> FastaRecords<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            header: Vec::new(),
            sequence: Vec::new(),
            finished: false,
        }
    }

    /// Reads the next line into `self.line` without its `\n` / `\r\n`; `false` at end of input.
    fn read_line(&mut self) -> io::Result<bool> {
        self.line.clear();
        if self.reader.read_until(b'\n', &mut self.line)? == 0 {
            return Ok(false);
        }
        if self.line.last() == Some(&b'\n') {
            self.line.pop();
            if self.line.last() == Some(&b'\r') {
                self.line.pop();
            }
        }
        Ok(true)
    }

    fn take_pending(&mut self) -> Option<FastaRecord> {
        if self.header.is_empty() {
            self.sequence.clear();
            return None;
        }
        Some(FastaRecord {
            header: std::mem::take(&mut self.header),
            sequence: std::mem::take(&mut self.sequence),
        })
    }
}

impl<R: BufRead> Iterator for FastaRecords<R> {
    type Item = io::Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            match self.read_line() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }

            if self.line.is_empty() || self.line[0] == b'>' {
                let pending = self.take_pending();
                if let Some(rest) = self.line.strip_prefix(b">") {
                    self.header = rest.to_vec();
                }
                if pending.is_some() {
                    return pending.map(Ok);
                }
            } else if !self.header.is_empty() {
                if self.line.contains(&b' ') {
                    log::debug!(
                        "Dropping record '{}': sequence line contains a space",
                        String::from_utf8_lossy(&self.header)
                    );
                    self.header.clear();
                    self.sequence.clear();
                } else {
                    self.sequence.extend_from_slice(&self.line);
                }
            }
        }

        self.finished = true;
        self.take_pending().map(Ok)
    }
}

/// Collects the read identifiers (headers) of a query FASTA, in file order.
///
/// Headers are decoded leniently, the same way aligner output is, so ids from
/// both sides compare equal.
pub fn read_ids<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    log::info!("Reading read IDs from {}", path.display());
    let reader = open_fasta(path)?;
    read_ids_from(reader).map_err(|e| Error::io(path, e))
}

pub fn read_ids_from<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    FastaRecords::new(reader)
        .map(|rec| rec.map(|r| String::from_utf8_lossy(&r.header).into_owned()))
        .collect()
}
