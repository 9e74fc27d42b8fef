//! Generated posts and the outcome of a generation cycle.

use crate::catalog::{Style, Tone};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timestamp layout used in run records and banners.
pub const TIMESTAMP_FORMAT: &str = "%m/%d/%Y, %H:%M:%S";

/// Partial output for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapResult {
    pub chunk_index: usize,
    pub summary_text: String,
}

/// The finished post plus its cost and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalPost {
    pub text: String,
    /// Tokens in the full extracted source text
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Wall clock from the start of the map phase to the end of reduce
    pub elapsed_seconds: f64,
}

impl FinalPost {
    /// Elapsed time as `MM:SS`.
    pub fn elapsed_formatted(&self) -> String {
        format_elapsed(self.elapsed_seconds)
    }
}

/// Format seconds as `MM:SS`; hours fold into minutes.
pub fn format_elapsed(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// How one generation cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Success {
        post: FinalPost,
        style: Style,
        tone: Tone,
        timestamp: DateTime<Local>,
    },
    ExtractionFailure {
        url: String,
        timestamp: DateTime<Local>,
    },
    TokenLimitExceeded {
        url: String,
        timestamp: DateTime<Local>,
    },
    ModelError {
        message: String,
        timestamp: DateTime<Local>,
    },
    Cancelled {
        timestamp: DateTime<Local>,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }

    pub fn post(&self) -> Option<&FinalPost> {
        match self {
            RunOutcome::Success { post, .. } => Some(post),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> &DateTime<Local> {
        match self {
            RunOutcome::Success { timestamp, .. }
            | RunOutcome::ExtractionFailure { timestamp, .. }
            | RunOutcome::TokenLimitExceeded { timestamp, .. }
            | RunOutcome::ModelError { timestamp, .. }
            | RunOutcome::Cancelled { timestamp } => timestamp,
        }
    }

    /// One-line message for the user.
    ///
    /// Extraction and token-limit failures share wording on purpose; the
    /// run log keeps them apart.
    pub fn banner(&self) -> String {
        match self {
            RunOutcome::Success { post, .. } => format!(
                "Post generation successful. Time taken: {} mins",
                post.elapsed_formatted()
            ),
            RunOutcome::ExtractionFailure { .. } | RunOutcome::TokenLimitExceeded { .. } => {
                "Cannot extract data from this article. Please try a different article".to_string()
            }
            RunOutcome::ModelError { message, .. } => format!("Error occurred: {message}"),
            RunOutcome::Cancelled { .. } => "Post not generated".to_string(),
        }
    }
}
