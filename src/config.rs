//src/config.rs

use clap::Args;
use std::path::{Path, PathBuf};

use crate::aligner::{BOWTIE2, BOWTIE2_BUILD};
use crate::chunker::BYTES_PER_GIB;
use crate::errors::{Error, Result};
use crate::matches::UnseededPolicy;

/// Settings for classifying query reads against an existing index.
#[derive(Debug, Clone, Args)]
pub struct ClassifyConfig {
    /// Number of threads to allow bowtie2 to run at a time
    #[arg(short = 'p', long = "processes", visible_alias = "threads", default_value_t = 1)]
    pub threads: usize,

    /// Path to the results output file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Path to the index prefix
    #[arg(short, long)]
    pub index: String,

    /// Path to the query reads FASTA file
    #[arg(short, long)]
    pub query: PathBuf,

    /// Number of edits (substitutions and indels) to tolerate in a match
    #[arg(short = 'e', long = "edits")]
    pub max_edit_distance: u32,

    /// Keep alignments for reads that are not in the query file
    #[arg(long)]
    pub accept_unseeded: bool,

    /// bowtie2 executable
    #[arg(long = "bowtie2", env = "BOWTIE2", default_value = BOWTIE2)]
    pub aligner: String,
}

impl ClassifyConfig {
    pub fn unseeded_policy(&self) -> UnseededPolicy {
        if self.accept_unseeded {
            UnseededPolicy::Accept
        } else {
            UnseededPolicy::Ignore
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_threads(self.threads)?;
        check_file(&self.query, "query")?;
        if self.index.is_empty() {
            return Err(Error::Config("index prefix must not be empty".into()));
        }
        Ok(())
    }
}

/// Settings for splitting a reference FASTA and building one index per chunk.
#[derive(Debug, Clone, Args)]
pub struct IndexConfig {
    /// Path to an empty working directory for the chunk files
    #[arg(short, long)]
    pub workdir: PathBuf,

    /// Path to the index prefix; chunk numbers are appended
    #[arg(short, long)]
    pub index: String,

    /// Path to the newline separated list of tax IDs to index
    #[arg(short, long)]
    pub taxids: PathBuf,

    /// Number of gigabytes to limit a reference chunk to
    #[arg(short = 'g', long = "maxchunkgigs", default_value_t = 3)]
    pub max_chunk_gigs: u64,

    /// Path to the FASTA file to index
    #[arg(short, long = "sourcefile")]
    pub source: PathBuf,

    /// Number of threads to allow bowtie2-build to use
    #[arg(short = 'p', long = "processes", visible_alias = "threads", default_value_t = 1)]
    pub threads: usize,

    /// bowtie2-build executable
    #[arg(long = "bowtie2-build", env = "BOWTIE2_BUILD", default_value = BOWTIE2_BUILD)]
    pub builder: String,
}

impl IndexConfig {
    pub fn max_chunk_bytes(&self) -> Result<u64> {
        self.max_chunk_gigs
            .checked_mul(BYTES_PER_GIB)
            .ok_or_else(|| Error::Config(format!("chunk size of {} GB is too large", self.max_chunk_gigs)))
    }

    pub fn validate(&self) -> Result<()> {
        check_threads(self.threads)?;
        if self.max_chunk_gigs == 0 {
            return Err(Error::Config("maximum chunk size must be at least 1 GB".into()));
        }
        self.max_chunk_bytes()?;
        check_file(&self.source, "source")?;
        check_file(&self.taxids, "tax ID list")?;
        if !self.workdir.is_dir() {
            return Err(Error::Config(format!(
                "working directory {} does not exist",
                self.workdir.display()
            )));
        }
        if self.index.is_empty() {
            return Err(Error::Config("index prefix must not be empty".into()));
        }
        Ok(())
    }
}

fn check_threads(threads: usize) -> Result<()> {
    if threads == 0 {
        return Err(Error::Config("thread count must be at least 1".into()));
    }
    Ok(())
}

fn check_file(path: &Path, what: &str) -> Result<()> {
    if !path.is_file() {
        return Err(Error::Config(format!("{what} file {} not found", path.display())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct ClassifyCli {
        #[command(flatten)]
        config: ClassifyConfig,
    }

    #[derive(Parser)]
    struct IndexCli {
        #[command(flatten)]
        config: IndexConfig,
    }

    #[test]
    fn test_classify_defaults() {
        let cli = ClassifyCli::try_parse_from(["t", "-o", "out.txt", "-i", "idx", "-q", "q.fa", "-e", "3"]).unwrap();
        assert_eq!(cli.config.threads, 1);
        assert_eq!(cli.config.max_edit_distance, 3);
        assert_eq!(cli.config.unseeded_policy(), UnseededPolicy::Ignore);
    }

    #[test]
    fn test_classify_requires_edits() {
        assert!(ClassifyCli::try_parse_from(["t", "-o", "out.txt", "-i", "idx", "-q", "q.fa"]).is_err());
        assert!(ClassifyCli::try_parse_from(["t", "-o", "o", "-i", "i", "-q", "q", "-e", "x"]).is_err());
    }

    #[test]
    fn test_index_defaults_and_bytes() {
        let cli = IndexCli::try_parse_from(["t", "-w", "/w", "-i", "idx", "-t", "ids.txt", "-s", "ref.fa"]).unwrap();
        assert_eq!(cli.config.max_chunk_gigs, 3);
        assert_eq!(cli.config.max_chunk_bytes().unwrap(), 3 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_threads_flag_aliases() {
        for flag in ["-p", "--processes", "--threads"] {
            let cli = ClassifyCli::try_parse_from(["t", "-o", "o", "-i", "i", "-q", "q", "-e", "1", flag, "4"]).unwrap();
            assert_eq!(cli.config.threads, 4);
            let cli = IndexCli::try_parse_from(["t", "-w", "/w", "-i", "idx", "-t", "ids", "-s", "ref", flag, "4"]).unwrap();
            assert_eq!(cli.config.threads, 4);
        }
    }

    #[test]
    fn test_validate_reports_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let query = dir.path().join("q.fa");
        std::fs::write(&query, ">r\nA\n").unwrap();

        let mut cfg = ClassifyCli::try_parse_from([
            "t",
            "-o",
            "out.txt",
            "-i",
            "idx",
            "-q",
            query.to_str().unwrap(),
            "-e",
            "1",
        ])
        .unwrap()
        .config;
        assert!(cfg.validate().is_ok());

        cfg.threads = 0;
        assert_eq!(cfg.validate().unwrap_err().exit_code(), 2);

        cfg.threads = 1;
        cfg.query = dir.path().join("missing.fa");
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_index_validate_zero_gigs() {
        let mut cfg = IndexCli::try_parse_from(["t", "-w", "/w", "-i", "idx", "-t", "ids.txt", "-s", "ref.fa"])
            .unwrap()
            .config;
        cfg.max_chunk_gigs = 0;
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }
}
