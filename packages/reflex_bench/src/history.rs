//! Append-only score history, stored as one plain-text record per line.
//!
//! A record is `<strategy id>,<timestamp label>,<score>` where the strategy id is the stable
//! number from [`Strategy::persisted_id()`] and the score is written with two decimals. Records
//! are only ever appended, so the file doubles as a human-readable log.

use std::collections::VecDeque;
use std::fmt::{self, Display};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::{self, FromStr};

use chrono::Local;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::Strategy;

/// Most entries [`HistoryStore::load()`] returns for one strategy.
pub const MAX_LOADED_ENTRIES: usize = 20;

/// Format of the label [`HistoryStore::append_now()`] stamps on a record.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One historical score.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    strategy: Strategy,
    timestamp_label: String,
    score: f64,
}

impl HistoryEntry {
    /// Creates an entry. Field separators and line breaks in `timestamp_label` are replaced with
    /// spaces so the entry always serializes to exactly one record.
    #[must_use]
    pub fn new(strategy: Strategy, timestamp_label: &str, score: f64) -> Self {
        Self {
            strategy,
            timestamp_label: sanitize_label(timestamp_label),
            score,
        }
    }

    /// The strategy that produced the score.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Short human-readable label of when the score was recorded.
    #[must_use]
    pub fn timestamp_label(&self) -> &str {
        &self.timestamp_label
    }

    /// The score in Mops/s.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }
}

fn sanitize_label(label: &str) -> String {
    label.replace([',', '\r', '\n'], " ")
}

fn is_valid_score(score: f64) -> bool {
    score.is_finite() && score >= 0.0
}

impl Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{:.2}",
            self.strategy.persisted_id(),
            self.timestamp_label,
            self.score
        )
    }
}

impl FromStr for HistoryEntry {
    type Err = ParseHistoryEntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(',').collect();

        let [id, label, score] = fields.as_slice() else {
            return Err(ParseHistoryEntryError::FieldCount {
                found: fields.len(),
            });
        };

        let id = id.trim();
        let id: u8 = id
            .parse()
            .map_err(|_| ParseHistoryEntryError::InvalidStrategyId {
                value: id.to_string(),
            })?;

        let strategy = Strategy::from_persisted_id(id)
            .ok_or(ParseHistoryEntryError::UnknownStrategy { id })?;

        let score_text = score.trim();
        let score: f64 = score_text
            .parse()
            .ok()
            .filter(|score| is_valid_score(*score))
            .ok_or_else(|| ParseHistoryEntryError::InvalidScore {
                value: score_text.to_string(),
            })?;

        Ok(Self {
            strategy,
            timestamp_label: (*label).to_string(),
            score,
        })
    }
}

/// Why a history record could not be parsed.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum ParseHistoryEntryError {
    /// The record does not have exactly three comma-separated fields.
    #[error("expected 3 fields, found {found}")]
    FieldCount {
        /// Number of fields in the record.
        found: usize,
    },

    /// The strategy field is not a number.
    #[error("strategy id '{value}' is not a number")]
    InvalidStrategyId {
        /// The strategy field as written.
        value: String,
    },

    /// The strategy field is a number that does not name a strategy.
    #[error("unknown strategy id {id}")]
    UnknownStrategy {
        /// The strategy id as written.
        id: u8,
    },

    /// The score field is not a finite non-negative number.
    #[error("invalid score '{value}'")]
    InvalidScore {
        /// The score field as written.
        value: String,
    },
}

/// Persists scores to a local text file.
///
/// Storage failures never reach the caller: a failed append is logged and dropped, and a file
/// that cannot be read loads as an empty history.
///
/// # Example
///
/// ```no_run
/// use reflex_bench::{HistoryStore, Strategy};
///
/// let history = HistoryStore::new("benchmark_history.txt");
/// history.append_now(Strategy::SingleCore, 5.0);
///
/// for entry in history.load(Strategy::SingleCore) {
///     println!("{}  {:.2}", entry.timestamp_label(), entry.score());
/// }
/// ```
#[derive(Clone, Debug)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    /// Creates a store backed by the file at `path`. The file is created on the first append.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a score labeled with the current local time.
    pub fn append_now(&self, strategy: Strategy, score: f64) {
        let label = Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.append(strategy, score, &label);
    }

    /// Appends a score with an explicit timestamp label.
    ///
    /// Negative and non-finite scores are not recorded.
    pub fn append(&self, strategy: Strategy, score: f64, timestamp_label: &str) {
        if !is_valid_score(score) {
            warn!(%strategy, score, "refusing to record an invalid score");
            return;
        }

        let entry = HistoryEntry::new(strategy, timestamp_label, score);

        match self.write_record(&entry) {
            Ok(()) => debug!(path = %self.path.display(), record = %entry, "recorded score"),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "failed to record score, dropping it"
            ),
        }
    }

    fn write_record(&self, entry: &HistoryEntry) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        // One write per record, so an interrupted append cannot split a line.
        file.write_all(format!("{entry}\n").as_bytes())
    }

    /// Loads the most recent entries for `strategy`, newest first, at most
    /// [`MAX_LOADED_ENTRIES`].
    ///
    /// Malformed records are skipped. A missing or unreadable file is an empty history.
    #[must_use]
    pub fn load(&self, strategy: Strategy) -> Vec<HistoryEntry> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!(path = %self.path.display(), "no history recorded yet");
                return Vec::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to open history");
                return Vec::new();
            }
        };

        let mut recent = VecDeque::with_capacity(MAX_LOADED_ENTRIES.saturating_add(1));

        for line in BufReader::new(file).split(b'\n') {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "history read failed midway");
                    break;
                }
            };

            let Ok(text) = str::from_utf8(&line) else {
                trace!("skipping history record that is not UTF-8");
                continue;
            };

            let text = text.trim_end_matches('\r');

            if text.trim().is_empty() {
                continue;
            }

            match text.parse::<HistoryEntry>() {
                Ok(entry) if entry.strategy() == strategy => {
                    recent.push_back(entry);

                    if recent.len() > MAX_LOADED_ENTRIES {
                        recent.pop_front();
                    }
                }
                Ok(_) => {}
                Err(e) => trace!(record = text, error = %e, "skipping malformed history record"),
            }
        }

        recent.into_iter().rev().collect()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fs;

    use static_assertions::assert_impl_all;
    use tempfile::TempDir;

    use super::*;

    assert_impl_all!(HistoryStore: Send, Sync, Clone);
    assert_impl_all!(HistoryEntry: Send, Sync, Clone);

    fn store_in(dir: &TempDir) -> HistoryStore {
        HistoryStore::new(dir.path().join("benchmark_history.txt"))
    }

    #[test]
    fn entry_round_trips_with_two_decimals() {
        let entry = HistoryEntry::new(Strategy::Gpu, "2026-10-16 09:30", 1234.5678);

        let text = entry.to_string();
        assert_eq!(text, "1,2026-10-16 09:30,1234.57");

        let parsed: HistoryEntry = text.parse().unwrap();
        assert_eq!(parsed.strategy(), Strategy::Gpu);
        assert_eq!(parsed.timestamp_label(), "2026-10-16 09:30");
        assert!((parsed.score() - 1234.57).abs() < 1e-9);
    }

    #[test]
    fn label_separators_are_replaced() {
        let entry = HistoryEntry::new(Strategy::SingleCore, "a,b\r\nc", 1.0);

        assert_eq!(entry.timestamp_label(), "a b  c");
        assert_eq!(entry.to_string(), "0,a b  c,1.00");
    }

    #[test]
    fn parse_rejects_malformed_records() {
        assert_eq!(
            "0,label".parse::<HistoryEntry>(),
            Err(ParseHistoryEntryError::FieldCount { found: 2 })
        );
        assert_eq!(
            "0,a,b,1.0".parse::<HistoryEntry>(),
            Err(ParseHistoryEntryError::FieldCount { found: 4 })
        );
        assert_eq!(
            "x,label,1.0".parse::<HistoryEntry>(),
            Err(ParseHistoryEntryError::InvalidStrategyId {
                value: "x".to_string()
            })
        );
        assert_eq!(
            "7,label,1.0".parse::<HistoryEntry>(),
            Err(ParseHistoryEntryError::UnknownStrategy { id: 7 })
        );
        assert_eq!(
            "0,label,fast".parse::<HistoryEntry>(),
            Err(ParseHistoryEntryError::InvalidScore {
                value: "fast".to_string()
            })
        );
        assert_eq!(
            "0,label,-1.00".parse::<HistoryEntry>(),
            Err(ParseHistoryEntryError::InvalidScore {
                value: "-1.00".to_string()
            })
        );
        assert_eq!(
            "0,label,NaN".parse::<HistoryEntry>(),
            Err(ParseHistoryEntryError::InvalidScore {
                value: "NaN".to_string()
            })
        );
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(store.load(Strategy::SingleCore).is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn append_then_load_returns_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.append(Strategy::MultiCore, 10.0, "first");
        store.append(Strategy::MultiCore, 20.5, "second");

        let loaded = store.load(Strategy::MultiCore);

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].timestamp_label(), "second");
        assert!((loaded[0].score() - 20.5).abs() < 1e-9);
        assert_eq!(loaded[1].timestamp_label(), "first");
    }

    #[test]
    fn load_filters_by_strategy() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.append(Strategy::SingleCore, 5.0, "cpu");
        store.append(Strategy::Gpu, 900.0, "gpu");
        store.append(Strategy::MultiCore, 40.0, "multi");

        let loaded = store.load(Strategy::Gpu);

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].strategy(), Strategy::Gpu);
        assert_eq!(loaded[0].timestamp_label(), "gpu");
    }

    #[test]
    fn load_keeps_most_recent_twenty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        for i in 0..25_u32 {
            store.append(Strategy::SingleCore, f64::from(i), &format!("run {i}"));
        }

        let loaded = store.load(Strategy::SingleCore);

        assert_eq!(loaded.len(), MAX_LOADED_ENTRIES);
        assert_eq!(loaded[0].timestamp_label(), "run 24");
        assert_eq!(loaded[19].timestamp_label(), "run 5");
    }

    #[test]
    fn load_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut contents = b"0,good,1.00\n".to_vec();
        contents.extend_from_slice(b"garbage\n");
        contents.extend_from_slice(b"\n");
        contents.extend_from_slice(b"0,\xff\xfe,3.00\n");
        contents.extend_from_slice(b"9,unknown,2.00\n");
        contents.extend_from_slice(b"0,windows,4.00\r\n");
        contents.extend_from_slice(b"0,no newline,5.00");
        fs::write(store.path(), contents).unwrap();

        let loaded = store.load(Strategy::SingleCore);
        let labels: Vec<&str> = loaded.iter().map(HistoryEntry::timestamp_label).collect();

        assert_eq!(labels, ["no newline", "windows", "good"]);
    }

    #[test]
    fn invalid_scores_are_not_recorded() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.append(Strategy::SingleCore, -1.0, "negative");
        store.append(Strategy::SingleCore, f64::NAN, "nan");
        store.append(Strategy::SingleCore, f64::INFINITY, "infinite");

        assert!(!store.path().exists());
    }

    #[test]
    fn unwritable_path_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("missing").join("history.txt"));

        store.append(Strategy::SingleCore, 1.0, "dropped");

        assert!(store.load(Strategy::SingleCore).is_empty());
    }

    #[test]
    fn append_now_stamps_local_time() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.append_now(Strategy::Gpu, 12.0);

        let loaded = store.load(Strategy::Gpu);
        assert_eq!(loaded.len(), 1);

        // "YYYY-MM-DD HH:MM"
        let label = loaded[0].timestamp_label();
        assert_eq!(label.len(), 16);
        assert_eq!(label.as_bytes()[4], b'-');
        assert_eq!(label.as_bytes()[10], b' ');
        assert_eq!(label.as_bytes()[13], b':');
    }
}
