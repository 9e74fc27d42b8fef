//! Map-reduce summarization over a single chat model.
//!
//! Map: every chunk is rendered into the prompt template and sent to the
//! model on its own. Reduce: the partial outputs are joined in chunk order
//! and sent through the same template once more to produce the final post.

use crate::agent::{ChatModel, ModelError};
use crate::budget::{BudgetError, TokenBudgetGuard};
use crate::catalog::{Style, Tone};
use crate::chunker::Chunk;
use crate::prompt::{PromptError, PromptTemplate, PromptVariables};
use crate::summary::{FinalPost, MapResult};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Separator between partial summaries in the reduce input.
const PARTIAL_SEPARATOR: &str = "\n\n";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("stop requested")]
    Cancelled,
    #[error("nothing to summarize")]
    NoChunks,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Budget(#[from] BudgetError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// A shared "stop requested" flag, checked between phases.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn checkpoint(&self, phase: &str) -> Result<(), EngineError> {
        if self.is_stop_requested() {
            info!(phase, "stop requested, aborting before phase");
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }
}

/// Engine settings taken from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Maximum map-phase calls in flight; 1 runs chunks one after another
    pub map_concurrency: usize,
    /// Upper bound for a single model call
    pub call_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            map_concurrency: 1,
            call_timeout: Duration::from_secs(120),
        }
    }
}

pub struct SummarizeEngine {
    model: Arc<dyn ChatModel>,
    template: Arc<PromptTemplate>,
    guard: TokenBudgetGuard,
    options: EngineOptions,
}

impl SummarizeEngine {
    pub fn new(
        model: Arc<dyn ChatModel>,
        template: Arc<PromptTemplate>,
        guard: TokenBudgetGuard,
        options: EngineOptions,
    ) -> Self {
        Self {
            model,
            template,
            guard,
            options,
        }
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn guard(&self) -> &TokenBudgetGuard {
        &self.guard
    }

    /// Run map and reduce over `chunks` of `source` and return the final post.
    #[instrument(skip_all, fields(chunks = chunks.len(), model = self.model.model_name()))]
    pub async fn summarize(
        &self,
        source: &str,
        chunks: &[Chunk],
        style: Style,
        tone: Tone,
        stop: &StopSignal,
    ) -> Result<FinalPost, EngineError> {
        if chunks.is_empty() {
            return Err(EngineError::NoChunks);
        }
        let input_tokens = self.guard.counter().count(source);

        let started = Instant::now();

        stop.checkpoint("map")?;
        let partials = self.map(chunks, style, tone).await?;
        debug!(partials = partials.len(), "map phase complete");

        stop.checkpoint("reduce")?;
        let combined = join_partials(&partials);
        self.guard.check_combined(&self.template, &combined)?;
        let text = self.call(&combined, style, tone).await?;

        let elapsed_seconds = started.elapsed().as_secs_f64();
        let output_tokens = self.guard.counter().count(&text);
        info!(
            input_tokens,
            output_tokens,
            elapsed_seconds,
            "summarize complete"
        );

        Ok(FinalPost {
            text,
            input_tokens,
            output_tokens,
            elapsed_seconds,
        })
    }

    /// Partial summaries sorted by chunk index, whatever order the calls finished in.
    async fn map(
        &self,
        chunks: &[Chunk],
        style: Style,
        tone: Tone,
    ) -> Result<Vec<MapResult>, EngineError> {
        let concurrency = self.options.map_concurrency.max(1);

        let mut partials: Vec<MapResult> = stream::iter(chunks)
            .map(|chunk| async move {
                let summary_text = self.call(&chunk.text, style, tone).await?;
                debug!(chunk = chunk.index, "chunk mapped");
                Ok::<_, EngineError>(MapResult {
                    chunk_index: chunk.index,
                    summary_text,
                })
            })
            .buffer_unordered(concurrency)
            .try_collect()
            .await?;

        partials.sort_by_key(|p| p.chunk_index);
        Ok(partials)
    }

    async fn call(&self, text: &str, style: Style, tone: Tone) -> Result<String, EngineError> {
        let prompt = self.template.render(&PromptVariables {
            text,
            style: style.directive(),
            tone: tone.description(),
        })?;

        let timeout = self.options.call_timeout;
        match tokio::time::timeout(timeout, self.model.complete(&prompt)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ModelError::Timeout(timeout).into()),
        }
    }
}

fn join_partials(partials: &[MapResult]) -> String {
    partials
        .iter()
        .map(|p| p.summary_text.as_str())
        .collect::<Vec<_>>()
        .join(PARTIAL_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::TokenCounter;
    use crate::prompt::RenderedPrompt;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    /// Answers map calls with `summary of <chunk>` and the reduce call with `FINAL`.
    /// Earlier chunks are made slower so parallel calls finish out of order.
    struct ScriptedModel {
        calls: Mutex<Vec<RenderedPrompt>>,
        fail_on: Option<&'static str>,
        delay_ms: u64,
        /// Raised from inside every map call
        stop_on_map: Option<StopSignal>,
        /// Every call sleeps this long before answering
        stall: Option<Duration>,
    }

    impl ScriptedModel {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: None,
                delay_ms: 0,
                stop_on_map: None,
                stall: None,
            }
        }

        fn human_calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|p| p.human.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, prompt: &RenderedPrompt) -> Result<String, ModelError> {
            self.calls.lock().unwrap().push(prompt.clone());
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            let text = prompt.human.trim_start_matches("TEXT:").to_string();
            if let Some(bad) = self.fail_on {
                if text == bad {
                    return Err(ModelError::RequestFailed("rate limited".into()));
                }
            }
            if let Some(n) = text.strip_prefix("chunk-") {
                if let Some(stop) = &self.stop_on_map {
                    stop.request_stop();
                }
                let idx: u64 = n.parse().unwrap();
                tokio::time::sleep(Duration::from_millis(self.delay_ms * (5 - idx.min(5)))).await;
                return Ok(format!("summary of chunk-{n}"));
            }
            Ok("FINAL".to_string())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn engine(model: Arc<ScriptedModel>, concurrency: usize) -> SummarizeEngine {
        let template = Arc::new(PromptTemplate::new("{style} / {tone}", "TEXT:{text}").unwrap());
        SummarizeEngine::new(
            model,
            template,
            TokenBudgetGuard::new(Arc::new(WordCounter), 1000),
            EngineOptions {
                map_concurrency: concurrency,
                call_timeout: Duration::from_secs(5),
            },
        )
    }

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk {
                index: i,
                text: format!("chunk-{i}"),
            })
            .collect()
    }

    fn source(chunks: &[Chunk]) -> String {
        chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[tokio::test]
    async fn single_chunk_maps_once_and_reduces_once() {
        let model = Arc::new(ScriptedModel::new());
        let chunks = chunks(1);
        let post = engine(model.clone(), 1)
            .summarize(&source(&chunks), &chunks, Style::Summary, Tone::Casual, &StopSignal::new())
            .await
            .unwrap();

        assert_eq!(post.text, "FINAL");
        assert_eq!(post.output_tokens, 1);
        assert_eq!(post.input_tokens, 1);
        assert!(post.elapsed_seconds >= 0.0);
        assert_eq!(
            model.human_calls(),
            vec!["TEXT:chunk-0", "TEXT:summary of chunk-0"]
        );
    }

    #[tokio::test]
    async fn prompt_carries_directives_not_labels() {
        let model = Arc::new(ScriptedModel::new());
        let chunks = chunks(1);
        engine(model.clone(), 1)
            .summarize(&source(&chunks), &chunks, Style::Summary, Tone::Casual, &StopSignal::new())
            .await
            .unwrap();

        let system = model.calls.lock().unwrap()[0].system.clone();
        assert!(system.starts_with(Style::Summary.directive()));
        assert!(system.ends_with(Tone::Casual.description()));
        assert!(!system.contains(Style::Summary.label()));
        assert!(!system.to_lowercase().contains(&Tone::Casual.label().to_lowercase()));
    }

    #[tokio::test]
    async fn input_tokens_cover_the_whole_source() {
        let model = Arc::new(ScriptedModel::new());
        let chunks = chunks(3);
        let source = "one two three four five six seven eight nine ten";
        let post = engine(model, 1)
            .summarize(source, &chunks, Style::Summary, Tone::Casual, &StopSignal::new())
            .await
            .unwrap();

        assert_eq!(post.input_tokens, WordCounter.count(source));
        assert_eq!(post.input_tokens, 10);
    }

    #[tokio::test]
    async fn reduce_input_keeps_chunk_order_under_parallel_map() {
        let model = Arc::new(ScriptedModel {
            delay_ms: 10,
            ..ScriptedModel::new()
        });
        let chunks = chunks(4);
        engine(model.clone(), 4)
            .summarize(
                &source(&chunks),
                &chunks,
                Style::KeyObservations,
                Tone::Professional,
                &StopSignal::new(),
            )
            .await
            .unwrap();

        let calls = model.human_calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(
            calls.last().unwrap(),
            "TEXT:summary of chunk-0\n\nsummary of chunk-1\n\nsummary of chunk-2\n\nsummary of chunk-3"
        );
    }

    #[tokio::test]
    async fn map_failure_skips_reduce() {
        let model = Arc::new(ScriptedModel {
            fail_on: Some("chunk-1"),
            ..ScriptedModel::new()
        });
        let chunks = chunks(3);
        let err = engine(model.clone(), 1)
            .summarize(&source(&chunks), &chunks, Style::Summary, Tone::Humorous, &StopSignal::new())
            .await
            .unwrap_err();

        match err {
            EngineError::Model(ModelError::RequestFailed(msg)) => assert_eq!(msg, "rate limited"),
            other => panic!("expected model error, got {other:?}"),
        }
        let calls = model.human_calls();
        assert_eq!(calls, vec!["TEXT:chunk-0", "TEXT:chunk-1"]);
        assert!(calls.iter().all(|c| !c.contains("summary of")));
    }

    #[tokio::test]
    async fn stop_before_map_makes_no_calls() {
        let model = Arc::new(ScriptedModel::new());
        let stop = StopSignal::new();
        stop.request_stop();
        let chunks = chunks(2);
        let err = engine(model.clone(), 1)
            .summarize(&source(&chunks), &chunks, Style::Summary, Tone::Casual, &stop)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Cancelled));
        assert!(model.human_calls().is_empty());
    }

    #[tokio::test]
    async fn stop_during_map_skips_reduce() {
        let stop = StopSignal::new();
        let model = Arc::new(ScriptedModel {
            stop_on_map: Some(stop.clone()),
            ..ScriptedModel::new()
        });
        let chunks = chunks(3);
        let err = engine(model.clone(), 1)
            .summarize(&source(&chunks), &chunks, Style::Summary, Tone::Casual, &stop)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Cancelled));
        // Map runs to the end; the reduce call is never made.
        let calls = model.human_calls();
        assert_eq!(calls.len(), chunks.len());
        assert!(calls.iter().all(|c| !c.contains("summary of")));
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let model = Arc::new(ScriptedModel {
            stall: Some(Duration::from_millis(500)),
            ..ScriptedModel::new()
        });
        let template = Arc::new(PromptTemplate::new("{style} / {tone}", "TEXT:{text}").unwrap());
        let engine = SummarizeEngine::new(
            model.clone(),
            template,
            TokenBudgetGuard::new(Arc::new(WordCounter), 1000),
            EngineOptions {
                map_concurrency: 1,
                call_timeout: Duration::from_millis(20),
            },
        );
        let chunks = chunks(2);
        let err = engine
            .summarize(&source(&chunks), &chunks, Style::Summary, Tone::Casual, &StopSignal::new())
            .await
            .unwrap_err();

        match err {
            EngineError::Model(ModelError::Timeout(limit)) => {
                assert_eq!(limit, Duration::from_millis(20))
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(model.human_calls().len(), 1);
    }

    #[tokio::test]
    async fn oversized_reduce_input_is_rejected() {
        let model = Arc::new(ScriptedModel::new());
        let template = Arc::new(PromptTemplate::new("s", "TEXT:{text}").unwrap());
        // Map outputs are three words each; ten chunks push the reduce input past the ceiling.
        let engine = SummarizeEngine::new(
            model.clone(),
            template,
            TokenBudgetGuard::new(Arc::new(WordCounter), 20),
            EngineOptions::default(),
        );
        let chunks = chunks(10);
        let err = engine
            .summarize(&source(&chunks), &chunks, Style::Summary, Tone::Casual, &StopSignal::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::Budget(BudgetError::CombinedLimitExceeded { ceiling: 20, .. })
        ));
        assert_eq!(model.human_calls().len(), 10);
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let model = Arc::new(ScriptedModel::new());
        let err = engine(model, 1)
            .summarize("", &[], Style::Summary, Tone::Casual, &StopSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoChunks));
    }
}
