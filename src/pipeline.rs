//! One generation cycle: fetch, chunk, budget check, summarize, record.

use crate::catalog::{Style, Tone};
use crate::chunker::Chunker;
use crate::engine::{EngineError, StopSignal, SummarizeEngine};
use crate::recorder::{FailureKind, FailureRecord, RunRecord, RunRecorder, SuccessRecord};
use crate::scraper::CachedFetcher;
use crate::summary::RunOutcome;
use chrono::Local;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub url: String,
    pub style: Style,
    pub tone: Tone,
}

pub struct Pipeline {
    fetcher: CachedFetcher,
    chunker: Chunker,
    engine: SummarizeEngine,
    recorder: Arc<dyn RunRecorder>,
}

impl Pipeline {
    pub fn new(
        fetcher: CachedFetcher,
        chunker: Chunker,
        engine: SummarizeEngine,
        recorder: Arc<dyn RunRecorder>,
    ) -> Self {
        Self {
            fetcher,
            chunker,
            engine,
            recorder,
        }
    }

    pub fn fetcher(&self) -> &CachedFetcher {
        &self.fetcher
    }

    /// Run a full cycle. Failures are reported through the outcome, never as a partial post.
    #[instrument(skip_all, fields(url = %request.url, style = %request.style, tone = %request.tone))]
    pub async fn run(&self, request: &GenerationRequest, stop: &StopSignal) -> RunOutcome {
        let outcome = self.generate(request, stop).await;
        if !matches!(outcome, RunOutcome::Cancelled { .. }) {
            self.record(request, &outcome);
            self.fetcher.clear();
        }
        outcome
    }

    async fn generate(&self, request: &GenerationRequest, stop: &StopSignal) -> RunOutcome {
        if stop.checkpoint("fetch").is_err() {
            return RunOutcome::Cancelled {
                timestamp: Local::now(),
            };
        }

        let doc = match self.fetcher.fetch(&request.url).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "article extraction failed");
                return RunOutcome::ExtractionFailure {
                    url: request.url.clone(),
                    timestamp: Local::now(),
                };
            }
        };

        let chunks = self.chunker.split(&doc);
        info!(chunks = chunks.len(), "article split");
        if chunks.is_empty() {
            warn!("extracted text produced no chunks");
            return RunOutcome::ExtractionFailure {
                url: request.url.clone(),
                timestamp: Local::now(),
            };
        }

        if let Err(e) = self.engine.guard().check(self.engine.template(), &chunks) {
            warn!(error = %e, "article over token budget");
            return RunOutcome::TokenLimitExceeded {
                url: request.url.clone(),
                timestamp: Local::now(),
            };
        }

        match self
            .engine
            .summarize(&doc.raw_text, &chunks, request.style, request.tone, stop)
            .await
        {
            Ok(post) => RunOutcome::Success {
                post,
                style: request.style,
                tone: request.tone,
                timestamp: Local::now(),
            },
            Err(EngineError::Cancelled) => RunOutcome::Cancelled {
                timestamp: Local::now(),
            },
            Err(EngineError::Budget(e)) if e.is_over_limit() => {
                warn!(error = %e, "combined summaries over token budget");
                RunOutcome::TokenLimitExceeded {
                    url: request.url.clone(),
                    timestamp: Local::now(),
                }
            }
            Err(e) => {
                error!(error = %e, "summarization failed");
                RunOutcome::ModelError {
                    message: e.to_string(),
                    timestamp: Local::now(),
                }
            }
        }
    }

    fn record(&self, request: &GenerationRequest, outcome: &RunOutcome) {
        let record = match outcome {
            RunOutcome::Success {
                post,
                style,
                tone,
                timestamp,
            } => RunRecord::Success(SuccessRecord::new(timestamp, post, *style, *tone)),
            RunOutcome::ExtractionFailure { url, timestamp } => {
                RunRecord::Failure(FailureRecord::new(timestamp, url, FailureKind::Extraction))
            }
            RunOutcome::TokenLimitExceeded { url, timestamp } => {
                RunRecord::Failure(FailureRecord::new(timestamp, url, FailureKind::TokenLimit))
            }
            RunOutcome::ModelError { message, timestamp } => RunRecord::Failure(
                FailureRecord::new(timestamp, &request.url, FailureKind::Model)
                    .with_detail(message.clone()),
            ),
            RunOutcome::Cancelled { .. } => return,
        };

        if let Err(e) = self.recorder.append(&record) {
            warn!(error = %e, "failed to append run record");
        }
    }
}
