//src/chunker.rs

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};
use crate::taxon::{taxon_id_bytes, TaxonAllowList};
use crate::types::{ChunkSummary, FastaRecord};

/// Bytes in one gigabyte of chunk budget.
pub const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Path of chunk `index` inside `workdir`.
pub fn chunk_path(workdir: &Path, index: usize) -> PathBuf {
    workdir.join(format!("{index}.fasta"))
}

struct ChunkWriter<'a> {
    workdir: &'a Path,
    index: usize,
    path: PathBuf,
    out: BufWriter<File>,
}

impl<'a> ChunkWriter<'a> {
    fn create(workdir: &'a Path, index: usize) -> Result<Self> {
        let path = chunk_path(workdir, index);
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        log::info!("Writing taxid sequences to {}", path.display());
        Ok(Self {
            workdir,
            index,
            path,
            out: BufWriter::new(file),
        })
    }

    /// Writes one record and returns the chunk file's size on disk afterwards.
    fn write_record(&mut self, record: &FastaRecord) -> Result<u64> {
        write_fasta_record(&mut self.out, record).map_err(|e| Error::io(&self.path, e))?;

        fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| Error::io(&self.path, e))
    }

    fn advance(self) -> Result<Self> {
        let next = self.index + 1;
        let workdir = self.workdir;
        self.finish()?;
        ChunkWriter::create(workdir, next)
    }

    fn finish(mut self) -> Result<()> {
        self.out.flush().map_err(|e| Error::io(&self.path, e))
    }
}

fn write_fasta_record<W: Write>(out: &mut W, record: &FastaRecord) -> io::Result<()> {
    out.write_all(b">")?;
    out.write_all(&record.header)?;
    out.write_all(b"\n")?;
    out.write_all(&record.sequence)?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Writes every record whose taxon ID is allowed into `<workdir>/<n>.fasta`.
///
/// The chunk size is checked only after a whole record has been written, so a
/// record is never split and a chunk overshoots `max_chunk_bytes` by at most one
/// record. Once a chunk grows past the limit the next index is opened, which
/// means the last chunk can be empty.
pub fn split_reference<I>(
    records: I,
    allowed: &TaxonAllowList,
    workdir: &Path,
    max_chunk_bytes: u64,
) -> Result<ChunkSummary>
where
    I: IntoIterator<Item = Result<FastaRecord>>,
{
    let mut writer = ChunkWriter::create(workdir, 0)?;
    let mut records_written = 0u64;
    let mut records_dropped = 0u64;

    for record in records {
        let record = record?;

        if !allowed.contains(taxon_id_bytes(&record.header)) {
            records_dropped += 1;
            continue;
        }

        let size = writer.write_record(&record)?;
        records_written += 1;

        if size > max_chunk_bytes {
            log::debug!(
                "Chunk {} reached {} bytes (limit {})",
                writer.index,
                size,
                max_chunk_bytes
            );
            writer = writer.advance()?;
        }
    }

    let last_index = writer.index;
    writer.finish()?;

    log::info!(
        "Split reference into {} chunk(s): {} records kept, {} dropped",
        last_index + 1,
        records_written,
        records_dropped
    );

    Ok(ChunkSummary {
        last_index,
        records_written,
        records_dropped,
    })
}
