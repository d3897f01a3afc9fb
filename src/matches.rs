//src/matches.rs

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

use crate::taxon::taxon_id;
use crate::types::AlignmentRecord;

/// Accepted `(edit distance, taxon id)` pairs of one read, ordered by distance then taxon.
pub type ReadMatches = BTreeSet<(u32, String)>;

/// What to do with alignments for reads that were never seen in the query file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnseededPolicy {
    #[default]
    Ignore,
    Accept,
}

/// Counters collected while aggregating alignment output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub records_seen: u64,
    pub accepted: u64,
    pub rejected_by_distance: u64,
    pub unseeded: u64,
    pub malformed_lines: u64,
}

/// What happened to a single alignment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Accepted,
    RejectedByDistance,
    UnseededRead,
}

/// Per-read match sets, seeded with every query read before alignment starts.
#[derive(Debug, Default)]
pub struct MatchTable {
    reads: BTreeMap<String, ReadMatches>,
    max_edit_distance: u32,
    unseeded_policy: UnseededPolicy,
    stats: AggregateStats,
}

impl MatchTable {
    pub fn new(max_edit_distance: u32, unseeded_policy: UnseededPolicy) -> Self {
        Self {
            reads: BTreeMap::new(),
            max_edit_distance,
            unseeded_policy,
            stats: AggregateStats::default(),
        }
    }

    /// Registers read ids with an empty match set. Already-known ids are left untouched.
    pub fn seed<I, S>(&mut self, read_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in read_ids {
            self.reads.entry(id.into()).or_default();
        }
    }

    /// Folds one alignment into the table, applying the inclusive edit-distance threshold.
    pub fn record(&mut self, rec: &AlignmentRecord) -> RecordOutcome {
        self.stats.records_seen += 1;

        let distance = match rec.edit_distance {
            Some(d) if d <= self.max_edit_distance => d,
            _ => {
                self.stats.rejected_by_distance += 1;
                return RecordOutcome::RejectedByDistance;
            }
        };

        let taxid = taxon_id(&rec.reference_id).to_string();
        if let Some(matches) = self.reads.get_mut(&rec.read_id) {
            matches.insert((distance, taxid));
        } else if self.unseeded_policy == UnseededPolicy::Accept {
            self.stats.unseeded += 1;
            self.reads
                .insert(rec.read_id.clone(), ReadMatches::from([(distance, taxid)]));
        } else {
            self.stats.unseeded += 1;
            log::debug!("Ignoring alignment for unknown read '{}'", rec.read_id);
            return RecordOutcome::UnseededRead;
        }

        self.stats.accepted += 1;
        RecordOutcome::Accepted
    }

    pub fn note_malformed_line(&mut self) {
        self.stats.malformed_lines += 1;
    }

    pub fn stats(&self) -> AggregateStats {
        self.stats
    }

    pub fn get(&self, read_id: &str) -> Option<&ReadMatches> {
        self.reads.get(read_id)
    }

    /// Number of tracked reads, matched or not.
    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }

    pub fn matched_reads(&self) -> usize {
        self.reads.values().filter(|m| !m.is_empty()).count()
    }

    /// Writes one line per read with at least one match, in read-id order.
    pub fn write_results<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut line = String::new();
        for (read_id, matches) in &self.reads {
            if matches.is_empty() {
                continue;
            }
            line.clear();
            push_result_line(&mut line, read_id, matches);
            out.write_all(line.as_bytes())?;
        }
        Ok(())
    }

    pub fn to_result_text(&self) -> String {
        let mut text = String::new();
        for (read_id, matches) in &self.reads {
            if !matches.is_empty() {
                push_result_line(&mut text, read_id, matches);
            }
        }
        text
    }
}

/// Appends `<read>:` followed by the taxa bucketed by edit distance, starting
/// from distance 0. Every bucket step adds a `:`, so distances with no matches
/// appear as empty segments: `{(0,A),(2,B)}` becomes `r:A,::B,`.
fn push_result_line(out: &mut String, read_id: &str, matches: &ReadMatches) {
    out.push_str(read_id);
    out.push(':');
    let mut bucket = 0u32;
    for (distance, taxid) in matches {
        while bucket < *distance {
            out.push(':');
            bucket += 1;
        }
        out.push_str(taxid);
        out.push(',');
    }
    out.push('\n');
}
