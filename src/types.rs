//src/types.rs

use std::path::PathBuf;

/// One FASTA entry: the raw header bytes after `>` and the concatenated body lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub header: Vec<u8>,
    pub sequence: Vec<u8>,
}

/// The parts of one SAM alignment line we care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRecord {
    pub read_id: String,
    pub reference_id: String,
    /// Value of the `NM:i:` tag; `None` when the aligner did not emit one,
    /// which never passes an edit-distance threshold.
    pub edit_distance: Option<u32>,
}

/// Where the chunk splitter left off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    /// Highest chunk index opened; files `0..=last_index` exist.
    pub last_index: usize,
    pub records_written: u64,
    pub records_dropped: u64,
}

impl ChunkSummary {
    pub fn chunk_count(&self) -> usize {
        self.last_index + 1
    }
}

/// Outcome of building the index for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkBuildStatus {
    Built,
    /// The chunk file was empty, so the builder was not run.
    Skipped,
    Failed { exit_code: Option<i32>, log: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkBuild {
    pub index: usize,
    pub chunk_path: PathBuf,
    pub index_prefix: String,
    pub status: ChunkBuildStatus,
}
