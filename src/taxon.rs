//src/taxon.rs

use ahash::AHashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::errors::{Error, Result};

/// Set of taxon IDs a reference record must carry to be kept, as raw bytes.
pub type TaxonAllowList = AHashSet<Vec<u8>>;

/// Taxon ID embedded in a header or reference name: everything after the last `-`.
/// Names without a `-` are returned whole.
///
/// ```
/// use bt2tax_rs::taxon::taxon_id;
/// assert_eq!(taxon_id("NC_000913-562"), "562");
/// assert_eq!(taxon_id("plasmid-a-1280"), "1280");
/// assert_eq!(taxon_id("9606"), "9606");
/// ```
pub fn taxon_id(name: &str) -> &str {
    match name.rfind('-') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Byte-level [`taxon_id`] for FASTA headers, which need not be UTF-8.
pub fn taxon_id_bytes(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b'-') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Parses a newline-separated list of taxon IDs, one per line.
pub fn load_allow_list<P: AsRef<Path>>(path: P) -> Result<TaxonAllowList> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let allowed = parse_allow_list(BufReader::new(file)).map_err(|e| Error::io(path, e))?;
    log::info!("Accepting {} taxon IDs from {}", allowed.len(), path.display());
    Ok(allowed)
}

pub fn parse_allow_list<R: BufRead>(mut reader: R) -> io::Result<TaxonAllowList> {
    let mut allowed = TaxonAllowList::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        if line.is_empty() {
            continue;
        }
        allowed.insert(line.clone());
    }
    Ok(allowed)
}
