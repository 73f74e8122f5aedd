// src/cache.rs
//
// Sample cache: an append-only buffer of snapshots with an optional CSV
// mirror on disk.
//
// - The in-memory row list is authoritative; the file is a mirror that
//   survives restarts (`open` recovers it).
// - A header is written only when the backing file is empty, so a recovered
//   file (with or without a header) never gets a second one.
// - `flush` truncates the mirror and then clears the rows. Calling it twice
//   is the same as calling it once.
// - Rows with a non-finite field stay cached but never reach training.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::service::PredictionRequest;
use crate::types::{Snapshot, SNAPSHOT_HEADER};

/// Result of an atomic append-and-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub row_count: usize,
    pub should_retrain: bool,
}

/// Rows handed to a retrain pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingBatch {
    pub rows: Vec<Snapshot>,
    /// Rows left out for holding a non-finite field.
    pub dropped: usize,
}

impl TrainingBatch {
    pub fn from_rows(rows: &[Snapshot]) -> Self {
        let valid: Vec<Snapshot> = rows.iter().copied().filter(|s| s.is_finite()).collect();
        let dropped = rows.len() - valid.len();
        Self {
            rows: valid,
            dropped,
        }
    }

    pub fn total(&self) -> usize {
        self.rows.len() + self.dropped
    }
}

#[derive(Debug)]
pub struct SampleCache {
    rows: Vec<Snapshot>,
    path: Option<PathBuf>,
    batch_threshold: usize,
}

impl SampleCache {
    /// Cache with no file mirror.
    pub fn in_memory(batch_threshold: usize) -> Self {
        Self {
            rows: Vec::new(),
            path: None,
            batch_threshold,
        }
    }

    /// Open a cache, recovering rows already present in `path`.
    ///
    /// Lines that do not parse as six numbers are skipped, as is the header.
    pub fn open(path: Option<PathBuf>, batch_threshold: usize) -> Result<Self> {
        let mut cache = Self::in_memory(batch_threshold);
        let Some(path) = path else {
            return Ok(cache);
        };

        if path.exists() {
            let file = File::open(&path)
                .with_context(|| format!("failed to open sample cache {}", path.display()))?;
            let mut skipped = 0usize;
            for (i, line) in BufReader::new(file).lines().enumerate() {
                let line = line
                    .with_context(|| format!("failed to read sample cache {}", path.display()))?;
                if line.trim().is_empty() {
                    continue;
                }
                if i == 0 && is_header(&line) {
                    continue;
                }
                match Snapshot::from_csv_row(&line) {
                    Some(s) => cache.rows.push(s),
                    None => skipped += 1,
                }
            }
            if !cache.rows.is_empty() || skipped > 0 {
                eprintln!(
                    "govtune | cache recovered | path={} rows={} skipped={}",
                    path.display(),
                    cache.rows.len(),
                    skipped
                );
            }
        }

        cache.path = Some(path);
        Ok(cache)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn batch_threshold(&self) -> usize {
        self.batch_threshold
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows since the last flush, including non-finite ones.
    pub fn rows(&self) -> &[Snapshot] {
        &self.rows
    }

    /// Append one row and return the row count.
    ///
    /// The file is written before the row is recorded in memory, so a failed
    /// write leaves the cache unchanged.
    pub fn append(&mut self, snapshot: Snapshot) -> Result<usize> {
        if let Some(path) = &self.path {
            let needs_header = file_is_empty(path);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open sample cache {}", path.display()))?;
            let mut w = BufWriter::new(file);
            if needs_header {
                writeln!(w, "{}", SNAPSHOT_HEADER.join(","))
                    .with_context(|| format!("failed to write header to {}", path.display()))?;
            }
            writeln!(w, "{}", snapshot.to_csv_row())
                .and_then(|_| w.flush())
                .with_context(|| format!("failed to append to {}", path.display()))?;
        }

        self.rows.push(snapshot);
        Ok(self.rows.len())
    }

    /// Append and report whether the batch threshold is now reached.
    pub fn append_and_check(&mut self, snapshot: Snapshot) -> Result<AppendOutcome> {
        let row_count = self.append(snapshot)?;
        Ok(AppendOutcome {
            row_count,
            should_retrain: self.should_retrain(row_count),
        })
    }

    pub fn should_retrain(&self, row_count: usize) -> bool {
        row_count >= self.batch_threshold
    }

    /// Truncate the mirror, then drop every row.
    ///
    /// When truncation fails the rows are kept, matching what a restart
    /// would recover from the file.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(path) = &self.path {
            if path.exists() {
                File::create(path)
                    .with_context(|| format!("failed to truncate {}", path.display()))?;
            }
        }
        self.rows.clear();
        Ok(())
    }

    /// Rows usable for training, with the count of non-finite rows left out.
    pub fn valid_rows(&self) -> TrainingBatch {
        TrainingBatch::from_rows(&self.rows)
    }
}

/// Read snapshots from a CSV file (header optional) or a JSONL file of
/// request bodies. Blank lines are skipped; any other bad line is an error.
pub fn read_snapshot_file(path: &Path) -> Result<Vec<Snapshot>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshots from {}", path.display()))?;

    let mut out = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || (i == 0 && is_header(line)) {
            continue;
        }
        let snapshot = if line.starts_with('{') {
            let req: PredictionRequest = serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid JSON row", path.display(), i + 1))?;
            Snapshot::from(req)
        } else {
            Snapshot::from_csv_row(line)
                .with_context(|| format!("{}:{}: invalid CSV row", path.display(), i + 1))?
        };
        out.push(snapshot);
    }
    Ok(out)
}

fn is_header(line: &str) -> bool {
    line.trim() == SNAPSHOT_HEADER.join(",")
}

fn file_is_empty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(i: usize) -> Snapshot {
        Snapshot::from_array([1e8, 9e7, 1e6, 1000.0 + i as f64, i as f64, 300.0])
    }

    #[test]
    fn threshold_check() {
        let mut cache = SampleCache::in_memory(3);
        assert!(!cache.append_and_check(row(0)).unwrap().should_retrain);
        assert!(!cache.append_and_check(row(1)).unwrap().should_retrain);
        let out = cache.append_and_check(row(2)).unwrap();
        assert_eq!(out.row_count, 3);
        assert!(out.should_retrain);
    }

    #[test]
    fn flush_is_idempotent_in_memory() {
        let mut cache = SampleCache::in_memory(32);
        cache.append(row(0)).unwrap();
        cache.flush().unwrap();
        cache.flush().unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.append(row(1)).unwrap(), 1);
    }

    #[test]
    fn valid_rows_drop_non_finite() {
        let mut cache = SampleCache::in_memory(32);
        cache.append(row(0)).unwrap();
        cache
            .append(Snapshot::from_array([f64::NAN, 1.0, 1.0, 1.0, 1.0, 1.0]))
            .unwrap();
        cache
            .append(Snapshot::from_array([1.0, 1.0, 1.0, f64::INFINITY, 1.0, 1.0]))
            .unwrap();
        cache.append(row(3)).unwrap();

        let batch = cache.valid_rows();
        assert_eq!(batch.rows, vec![row(0), row(3)]);
        assert_eq!(batch.dropped, 2);
        assert_eq!(batch.total(), 4);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn recovered_headerless_file_gets_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.csv");
        fs::write(&path, "1,2,3,4,5,6\n").unwrap();

        let mut cache = SampleCache::open(Some(path.clone()), 32).unwrap();
        assert_eq!(cache.len(), 1);
        cache.append(Snapshot::from_array([7.0; 6])).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "1,2,3,4,5,6\n7,7,7,7,7,7\n");

        let reopened = SampleCache::open(Some(path), 32).unwrap();
        assert_eq!(
            reopened.rows(),
            &[
                Snapshot::from_array([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
                Snapshot::from_array([7.0; 6]),
            ]
        );
    }

    #[test]
    fn header_rewritten_after_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.csv");
        let mut cache = SampleCache::open(Some(path.clone()), 32).unwrap();
        cache.append(row(0)).unwrap();
        cache.flush().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);

        cache.append(row(1)).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(is_header(text.lines().next().unwrap()));
    }

    #[test]
    fn failed_flush_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.csv");
        let mut cache = SampleCache::open(Some(path.clone()), 32).unwrap();
        cache.append(row(0)).unwrap();

        // A directory in place of the mirror cannot be truncated.
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(cache.flush().is_err());
        assert_eq!(cache.rows(), &[row(0)]);
    }

    #[test]
    fn header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.csv");
        let mut cache = SampleCache::open(Some(path.clone()), 32).unwrap();
        cache.append(row(0)).unwrap();
        cache.append(row(1)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "total_supply,circ_supply,balance,votes,height,tx_volume");
        assert_eq!(lines.iter().filter(|l| l.starts_with("total_supply")).count(), 1);
    }

    #[test]
    fn reads_csv_and_jsonl_snapshot_files() {
        let dir = tempfile::tempdir().unwrap();

        let csv = dir.path().join("rows.csv");
        fs::write(
            &csv,
            "total_supply,circ_supply,balance,votes,height,tx_volume\n1,2,3,4,5,6\n\n7,8,9,10,11,12\n",
        )
        .unwrap();
        let rows = read_snapshot_file(&csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].tx_volume, 12.0);

        let jsonl = dir.path().join("rows.jsonl");
        fs::write(
            &jsonl,
            r#"{"total_supply":1,"circ_supply":2,"balance":3,"votes":4,"height":5,"tx_volume":6}"#,
        )
        .unwrap();
        assert_eq!(read_snapshot_file(&jsonl).unwrap()[0].votes_per_period, 4.0);

        let bad = dir.path().join("bad.csv");
        fs::write(&bad, "1,2,3\n").unwrap();
        let err = read_snapshot_file(&bad).unwrap_err();
        assert!(format!("{err:#}").contains("invalid CSV row"));
    }
}
