//! Append-only run log.
//!
//! Three record kinds (failure, success, comment) each flatten to a row of
//! strings. [`SledRecorder`] keeps one sled tree per kind, keyed by
//! monotonically generated ids so iteration returns rows in append order.

use crate::catalog::{Style, Tone};
use crate::summary::{format_timestamp, FinalPost};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

const FAILURES_TREE: &str = "failures";
const RUNS_TREE: &str = "runs";
const COMMENTS_TREE: &str = "comments";

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("database error: {0}")]
    DbError(#[from] sled::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Why a run did not produce a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Extraction,
    TokenLimit,
    Model,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Extraction => "extraction",
            FailureKind::TokenLimit => "token_limit",
            FailureKind::Model => "model",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub timestamp: String,
    pub url: String,
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FailureRecord {
    pub fn new(at: &DateTime<Local>, url: &str, kind: FailureKind) -> Self {
        Self {
            timestamp: format_timestamp(at),
            url: url.to_string(),
            kind,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessRecord {
    pub timestamp: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// `MM:SS mins`
    pub elapsed: String,
    pub style: String,
    pub tone: String,
}

impl SuccessRecord {
    pub fn new(at: &DateTime<Local>, post: &FinalPost, style: Style, tone: Tone) -> Self {
        Self {
            timestamp: format_timestamp(at),
            input_tokens: post.input_tokens,
            output_tokens: post.output_tokens,
            elapsed: format!("{} mins", post.elapsed_formatted()),
            style: style.label().to_string(),
            tone: tone.label().to_string(),
        }
    }
}

/// What a user comment is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    Feedback,
    Suggestion,
    Bug,
}

impl CommentKind {
    pub const ALL: [CommentKind; 3] = [CommentKind::Feedback, CommentKind::Suggestion, CommentKind::Bug];

    pub fn label(self) -> &'static str {
        match self {
            CommentKind::Feedback => "Feedback",
            CommentKind::Suggestion => "Suggestion",
            CommentKind::Bug => "Bug report",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub timestamp: String,
    pub email: String,
    pub text: String,
    pub kind: CommentKind,
}

impl CommentRecord {
    pub fn new(at: &DateTime<Local>, email: &str, text: &str, kind: CommentKind) -> Self {
        Self {
            timestamp: format_timestamp(at),
            email: email.to_string(),
            text: text.to_string(),
            kind,
        }
    }
}

/// One appended row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunRecord {
    Failure(FailureRecord),
    Success(SuccessRecord),
    Comment(CommentRecord),
}

impl RunRecord {
    /// The record as sheet cells.
    pub fn row(&self) -> Vec<String> {
        match self {
            RunRecord::Failure(r) => vec![r.timestamp.clone(), r.url.clone()],
            RunRecord::Success(r) => vec![
                r.timestamp.clone(),
                r.input_tokens.to_string(),
                r.output_tokens.to_string(),
                r.elapsed.clone(),
                r.style.clone(),
                r.tone.clone(),
            ],
            RunRecord::Comment(r) => vec![
                r.timestamp.clone(),
                r.email.clone(),
                r.text.clone(),
                r.kind.label().to_string(),
            ],
        }
    }

    fn payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            RunRecord::Failure(r) => serde_json::to_vec(r),
            RunRecord::Success(r) => serde_json::to_vec(r),
            RunRecord::Comment(r) => serde_json::to_vec(r),
        }
    }

    fn tree(&self) -> &'static str {
        match self {
            RunRecord::Failure(_) => FAILURES_TREE,
            RunRecord::Success(_) => RUNS_TREE,
            RunRecord::Comment(_) => COMMENTS_TREE,
        }
    }
}

/// Sink for run records. Records are only ever appended.
pub trait RunRecorder: Send + Sync {
    fn append(&self, record: &RunRecord) -> Result<(), RecorderError>;
}

/// Sled-backed run log.
pub struct SledRecorder {
    db: sled::Db,
}

impl SledRecorder {
    /// Open or create the log at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RecorderError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Recorded failures, oldest first
    pub fn failures(&self) -> Result<Vec<FailureRecord>, RecorderError> {
        self.read_tree(FAILURES_TREE)
    }

    /// Recorded successful runs, oldest first
    pub fn successes(&self) -> Result<Vec<SuccessRecord>, RecorderError> {
        self.read_tree(RUNS_TREE)
    }

    pub fn comments(&self) -> Result<Vec<CommentRecord>, RecorderError> {
        self.read_tree(COMMENTS_TREE)
    }

    fn read_tree<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Result<Vec<T>, RecorderError> {
        let tree = self.db.open_tree(name)?;
        let mut results = Vec::new();
        for item in tree.iter() {
            let (_key, value) = item?;
            results.push(serde_json::from_slice(&value)?);
        }
        Ok(results)
    }
}

impl RunRecorder for SledRecorder {
    fn append(&self, record: &RunRecord) -> Result<(), RecorderError> {
        let tree = self.db.open_tree(record.tree())?;
        let id = self.db.generate_id()?;
        let value = record.payload()?;
        tree.insert(id.to_be_bytes(), value)?;
        tree.flush()?;
        debug!(tree = record.tree(), id, "run record appended");
        Ok(())
    }
}

/// In-process run log.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    records: Mutex<Vec<RunRecord>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RunRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl RunRecorder for MemoryRecorder {
    fn append(&self, record: &RunRecord) -> Result<(), RecorderError> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_recorder() -> (tempfile::TempDir, SledRecorder) {
        let dir = tempfile::tempdir().unwrap();
        let recorder = SledRecorder::open(dir.path().join("runs")).unwrap();
        (dir, recorder)
    }

    fn post() -> FinalPost {
        FinalPost {
            text: "A post".to_string(),
            input_tokens: 812,
            output_tokens: 143,
            elapsed_seconds: 83.2,
        }
    }

    #[test]
    fn rows_match_sheet_layout() {
        let at = Local::now();
        let failure = RunRecord::Failure(FailureRecord::new(
            &at,
            "https://bad.example",
            FailureKind::Extraction,
        ));
        assert_eq!(
            failure.row(),
            vec![format_timestamp(&at), "https://bad.example".to_string()]
        );

        let success = RunRecord::Success(SuccessRecord::new(&at, &post(), Style::Summary, Tone::Casual));
        assert_eq!(
            success.row()[1..],
            ["812", "143", "01:23 mins", "Summary Post", "Casual"]
        );

        let comment = RunRecord::Comment(CommentRecord::new(&at, "a@b.c", "Nice", CommentKind::Bug));
        assert_eq!(comment.row()[1..], ["a@b.c", "Nice", "Bug report"]);
    }

    #[test]
    fn sled_appends_in_order_per_kind() {
        let (_dir, recorder) = temp_recorder();
        let at = Local::now();
        for url in ["https://one.example", "https://two.example"] {
            recorder
                .append(&RunRecord::Failure(FailureRecord::new(&at, url, FailureKind::Extraction)))
                .unwrap();
        }
        recorder
            .append(&RunRecord::Failure(
                FailureRecord::new(&at, "https://three.example", FailureKind::Model)
                    .with_detail("boom"),
            ))
            .unwrap();
        recorder
            .append(&RunRecord::Success(SuccessRecord::new(
                &at,
                &post(),
                Style::KeyObservations,
                Tone::Inspirational,
            )))
            .unwrap();

        let failures = recorder.failures().unwrap();
        let urls: Vec<_> = failures.iter().map(|f| f.url.as_str()).collect();
        assert_eq!(
            urls,
            ["https://one.example", "https://two.example", "https://three.example"]
        );
        assert_eq!(failures[2].kind, FailureKind::Model);
        assert_eq!(failures[2].detail.as_deref(), Some("boom"));

        let runs = recorder.successes().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].style, "Key Observations Post");
        assert!(recorder.comments().unwrap().is_empty());
    }

    #[test]
    fn duplicate_appends_are_kept() {
        let (_dir, recorder) = temp_recorder();
        let record = RunRecord::Failure(FailureRecord::new(
            &Local::now(),
            "https://again.example",
            FailureKind::TokenLimit,
        ));
        recorder.append(&record).unwrap();
        recorder.append(&record).unwrap();
        assert_eq!(recorder.failures().unwrap().len(), 2);
    }

    #[test]
    fn memory_recorder_keeps_everything() {
        let recorder = MemoryRecorder::new();
        let record = RunRecord::Comment(CommentRecord::new(
            &Local::now(),
            "x@y.z",
            "hello",
            CommentKind::Feedback,
        ));
        recorder.append(&record).unwrap();
        assert_eq!(recorder.records(), vec![record]);
    }
}
