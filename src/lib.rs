// src/lib.rs
pub mod aligner;
pub mod chunker;
pub mod config;
pub mod errors;
pub mod fasta;
pub mod matches;
pub mod sam;
pub mod taxon;
pub mod types;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::aligner::{alignment_command, index_build_command, ToolRunner};
use crate::chunker::{chunk_path, split_reference};
use crate::config::{ClassifyConfig, IndexConfig};
use crate::errors::{Error, Result};
use crate::fasta::{open_fasta, read_ids, FastaRecords};
use crate::matches::{AggregateStats, MatchTable};
use crate::sam::{parse_alignment_line, SamError};
use crate::taxon::load_allow_list;
use crate::types::{ChunkBuild, ChunkBuildStatus, ChunkSummary};

/// Aggregated alignments for one classification run.
pub struct ClassificationResults {
    pub matches: MatchTable,
    /// Aligner output received after its last newline.
    pub leftover_output: String,
}

impl ClassificationResults {
    pub fn stats(&self) -> AggregateStats {
        self.matches.stats()
    }

    /// Result file contents, one line per read with at least one match.
    pub fn get_result_text(&self) -> String {
        self.matches.to_result_text()
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut out = BufWriter::new(file);
        self.matches
            .write_results(&mut out)
            .and_then(|_| out.flush())
            .map_err(|e| Error::io(path, e))?;
        log::info!(
            "Wrote {} classified reads to {}",
            self.matches.matched_reads(),
            path.display()
        );
        Ok(())
    }
}

/// Result of splitting the reference and building every chunk's index.
pub struct IndexReport {
    pub chunks: ChunkSummary,
    pub builds: Vec<ChunkBuild>,
}

impl IndexReport {
    pub fn failed(&self) -> impl Iterator<Item = &ChunkBuild> {
        self.builds
            .iter()
            .filter(|b| matches!(b.status, ChunkBuildStatus::Failed { .. }))
    }

    pub fn all_built(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Aligns the query reads with bowtie2 and collects the taxa each read matched.
///
/// Every query read is seeded before alignment so that the match table covers
/// exactly the reads of the query file. Short alignment lines are skipped; an
/// unreadable `NM` tag or a non-zero aligner exit fails the run.
pub fn classify_reads<R: ToolRunner>(config: &ClassifyConfig, runner: &mut R) -> Result<ClassificationResults> {
    log::info!(
        "Reading database from: {}, writing results to: {}, allowing {} worker threads",
        config.index,
        config.output.display(),
        config.threads
    );

    // 1. Seed every read id from the query
    let ids = read_ids(&config.query)?;
    let mut table = MatchTable::new(config.max_edit_distance, config.unseeded_policy());
    table.seed(ids);
    log::info!("Tracking {} query reads", table.len());

    // 2. Align and aggregate line by line
    let command = alignment_command(&config.aligner, config.threads, &config.index, &config.query);
    let outcome = runner.invoke(&command, &mut |line| {
        match parse_alignment_line(line) {
            Ok(rec) => {
                table.record(&rec);
            }
            Err(SamError::TooFewFields { found }) => {
                log::warn!("Skipping alignment line with {found} fields: {line}");
                table.note_malformed_line();
            }
            Err(e @ SamError::BadEditDistance { .. }) => {
                return Err(Error::Format {
                    line: line.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    })?;

    if !outcome.remainder.is_empty() {
        log::warn!("Unterminated aligner output: {}", outcome.remainder);
    }
    if !outcome.success() {
        return Err(Error::ToolFailed {
            program: command.program,
            exit_code: outcome.exit_code,
        });
    }

    let stats = table.stats();
    log::info!(
        "Parsed {} alignments: {} accepted, {} over the edit limit, {} for unknown reads, {} malformed lines",
        stats.records_seen,
        stats.accepted,
        stats.rejected_by_distance,
        stats.unseeded,
        stats.malformed_lines
    );

    Ok(ClassificationResults {
        matches: table,
        leftover_output: outcome.remainder,
    })
}

/// Splits the reference into allow-listed chunks and builds one bowtie2 index per chunk.
///
/// Chunk `i` is built into `<index><i>`. A failed build is recorded and the
/// remaining chunks are still attempted; empty chunks are skipped.
pub fn build_index<R: ToolRunner>(config: &IndexConfig, runner: &mut R) -> Result<IndexReport> {
    let max_chunk_bytes = config.max_chunk_bytes()?;
    log::info!(
        "Reading from {}, generating temporary files in {}, writing indices to {}, chunking into files max {} bytes in length",
        config.source.display(),
        config.workdir.display(),
        config.index,
        max_chunk_bytes
    );

    let allowed = load_allow_list(&config.taxids)?;
    let source = config.source.as_path();
    let records = FastaRecords::new(open_fasta(source)?).map(|r| r.map_err(|e| Error::io(source, e)));
    let chunks = split_reference(records, &allowed, &config.workdir, max_chunk_bytes)?;

    let builds = build_chunks(config, &chunks, runner)?;
    Ok(IndexReport { chunks, builds })
}

/// Runs the index builder on chunks `0..=chunks.last_index` in order.
pub fn build_chunks<R: ToolRunner>(
    config: &IndexConfig,
    chunks: &ChunkSummary,
    runner: &mut R,
) -> Result<Vec<ChunkBuild>> {
    let mut builds = Vec::with_capacity(chunks.chunk_count());
    for i in 0..=chunks.last_index {
        let path = chunk_path(&config.workdir, i);
        let index_prefix = format!("{}{}", config.index, i);

        let is_empty = std::fs::metadata(&path)
            .map(|m| m.len() == 0)
            .map_err(|e| Error::io(&path, e))?;
        if is_empty {
            log::warn!("Chunk {} at {} is empty, not building an index", i, path.display());
            builds.push(ChunkBuild {
                index: i,
                chunk_path: path,
                index_prefix,
                status: ChunkBuildStatus::Skipped,
            });
            continue;
        }

        let command = index_build_command(&config.builder, config.threads, &path, &index_prefix);
        let mut build_log = String::new();
        let outcome = runner.invoke(&command, &mut |line| {
            build_log.push_str(line);
            build_log.push('\n');
            Ok(())
        })?;
        build_log.push_str(&outcome.remainder);

        let status = if outcome.success() {
            log::info!("Successfully built index chunk {} of {}", i, chunks.last_index);
            ChunkBuildStatus::Built
        } else {
            log::warn!(
                "Non-zero exit code from {} ({:?}) on chunk {}!\n{}",
                command.program,
                outcome.exit_code,
                i,
                build_log
            );
            ChunkBuildStatus::Failed {
                exit_code: outcome.exit_code,
                log: build_log,
            }
        };

        builds.push(ChunkBuild {
            index: i,
            chunk_path: path,
            index_prefix,
            status,
        });
    }

    Ok(builds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner::CannedRunner;
    use crate::matches::UnseededPolicy;
    use std::fs;
    use std::path::PathBuf;

    fn sam(read: &str, reference: &str, nm: u32) -> String {
        format!("{read}\t0\t{reference}\t1\t42\t4M\t*\t0\t0\tACGT\tIIII\tAS:i:0\tNM:i:{nm}\n")
    }

    fn classify_config(dir: &Path, max_edit_distance: u32) -> ClassifyConfig {
        let query = dir.join("reads.fasta");
        fs::write(&query, ">r1\nACGT\n>r2\nACGG\n").unwrap();
        ClassifyConfig {
            threads: 2,
            output: dir.join("results.txt"),
            index: "/db/idx".to_string(),
            query,
            max_edit_distance,
            accept_unseeded: false,
            aligner: "bowtie2".to_string(),
        }
    }

    #[test]
    fn test_classify_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = classify_config(dir.path(), 3);
        let output = sam("r1", "ref-9", 1) + &sam("r2", "ref-9", 5);
        let mut runner = CannedRunner::new([(output, Some(0))]);

        let results = classify_reads(&config, &mut runner).unwrap();
        results.write_to(&config.output).unwrap();

        assert_eq!(fs::read_to_string(&config.output).unwrap(), "r1::9,\n");
        assert_eq!(results.stats().accepted, 1);
        assert_eq!(results.matches.len(), 2);

        let cmd = &runner.commands[0];
        assert_eq!(cmd.program, "bowtie2");
        assert!(cmd.to_string().contains("--threads 2 -x /db/idx -U"));
    }

    #[test]
    fn test_classify_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let config = classify_config(dir.path(), 3);
        let output = sam("r2", "b-7", 0) + &sam("r1", "a-3", 2) + &sam("r1", "c-1", 0) + &sam("r2", "b-7", 0);

        let mut first = CannedRunner::new([(output.clone(), Some(0))]);
        classify_reads(&config, &mut first).unwrap().write_to(&config.output).unwrap();
        let a = fs::read(&config.output).unwrap();

        let mut second = CannedRunner::new([(output, Some(0))]);
        classify_reads(&config, &mut second).unwrap().write_to(&config.output).unwrap();
        let b = fs::read(&config.output).unwrap();

        assert_eq!(a, b);
        assert_eq!(String::from_utf8(a).unwrap(), "r1:1,::3,\nr2:7,\n");
    }

    #[test]
    fn test_classify_skips_short_lines() {
        let dir = tempfile::tempdir().unwrap();
        let config = classify_config(dir.path(), 3);
        let output = format!("garbage\tline\n{}", sam("r2", "x-4", 3));
        let mut runner = CannedRunner::new([(output, Some(0))]);

        let results = classify_reads(&config, &mut runner).unwrap();
        assert_eq!(results.get_result_text(), "r2::::4,\n");
        assert_eq!(results.stats().malformed_lines, 1);
    }

    #[test]
    fn test_classify_bad_nm_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = classify_config(dir.path(), 3);
        let output = "r1\t0\tref-9\t1\t42\t4M\t*\t0\t0\tACGT\tIIII\tNM:i:oops\n";
        let mut runner = CannedRunner::new([(output, Some(0))]);

        let err = classify_reads(&config, &mut runner).err().unwrap();
        assert!(matches!(err, Error::Format { .. }));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_classify_non_zero_exit_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = classify_config(dir.path(), 3);
        let output = sam("r1", "ref-9", 0) + "partial";
        let mut runner = CannedRunner::new([(output, Some(1))]);

        let err = classify_reads(&config, &mut runner).err().unwrap();
        assert!(matches!(err, Error::ToolFailed { exit_code: Some(1), .. }));
        assert!(!config.output.exists());
    }

    #[test]
    fn test_classify_unseeded_policy() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = classify_config(dir.path(), 3);
        let output = sam("r9", "ref-1", 0);

        let mut runner = CannedRunner::new([(output.clone(), Some(0))]);
        let results = classify_reads(&config, &mut runner).unwrap();
        assert_eq!(results.get_result_text(), "");
        assert_eq!(config.unseeded_policy(), UnseededPolicy::Ignore);

        config.accept_unseeded = true;
        let mut runner = CannedRunner::new([(output, Some(0))]);
        let results = classify_reads(&config, &mut runner).unwrap();
        assert_eq!(results.get_result_text(), "r9:1,\n");
    }

    fn index_config(dir: &Path, reference: &str, taxids: &str) -> IndexConfig {
        let source = dir.join("ref.fasta");
        fs::write(&source, reference).unwrap();
        let ids = dir.join("taxids.txt");
        fs::write(&ids, taxids).unwrap();
        let workdir = dir.join("work");
        fs::create_dir(&workdir).unwrap();
        IndexConfig {
            workdir,
            index: dir.join("idx").display().to_string(),
            taxids: ids,
            max_chunk_gigs: 3,
            source,
            threads: 1,
            builder: "bowtie2-build".to_string(),
        }
    }

    #[test]
    fn test_build_index_single_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let config = index_config(dir.path(), ">a-1\nACGT\n>b-2\nGG\n", "1\n");
        let mut runner = CannedRunner::new([("building\n", Some(0))]);

        let report = build_index(&config, &mut runner).unwrap();

        assert_eq!(report.chunks.chunk_count(), 1);
        assert!(report.all_built());
        assert_eq!(report.builds[0].status, ChunkBuildStatus::Built);
        assert_eq!(report.builds[0].index_prefix, format!("{}0", config.index));
        assert_eq!(
            fs::read_to_string(chunk_path(&config.workdir, 0)).unwrap(),
            ">a-1\nACGT\n"
        );

        let cmd = runner.commands[0].to_string();
        assert!(cmd.ends_with(&format!(
            "{} {}0",
            chunk_path(&config.workdir, 0).display(),
            config.index
        )));
    }

    #[test]
    fn test_build_index_empty_chunk_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = index_config(dir.path(), ">a-1\nACGT\n", "2\n");
        let mut runner = CannedRunner::new(Vec::<(&str, Option<i32>)>::new());

        let report = build_index(&config, &mut runner).unwrap();
        assert_eq!(report.builds.len(), 1);
        assert_eq!(report.builds[0].status, ChunkBuildStatus::Skipped);
        assert!(runner.commands.is_empty());
        assert!(report.all_built());
    }

    #[test]
    fn test_build_index_failures_do_not_stop_later_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let config = index_config(dir.path(), ">a-1\nACGT\n", "1\n");

        // Three pre-split chunks, the first of which fails to build.
        let mut report_runner = CannedRunner::new([
            ("oops\n", Some(1)),
            ("", Some(0)),
            ("", Some(0)),
        ]);
        let chunks = ChunkSummary {
            last_index: 2,
            records_written: 3,
            records_dropped: 0,
        };
        for i in 0..=chunks.last_index {
            fs::write(chunk_path(&config.workdir, i), format!(">s{i}-1\nAC\n")).unwrap();
        }
        let builds = build_chunks(&config, &chunks, &mut report_runner).unwrap();

        let built_paths: Vec<PathBuf> = builds.iter().map(|b| b.chunk_path.clone()).collect();
        assert_eq!(
            built_paths,
            (0..3).map(|i| chunk_path(&config.workdir, i)).collect::<Vec<_>>()
        );
        assert_eq!(
            builds[0].status,
            ChunkBuildStatus::Failed {
                exit_code: Some(1),
                log: "oops\n".to_string()
            }
        );
        assert_eq!(builds[1].status, ChunkBuildStatus::Built);
        assert_eq!(builds[2].status, ChunkBuildStatus::Built);
        assert_eq!(report_runner.commands.len(), 3);
    }
}
