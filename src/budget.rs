//! Token budget enforcement.
//!
//! Every chunk is measured with the target model's own tokenizer before any
//! paid call is made. One oversized chunk rejects the whole article.

use crate::chunker::Chunk;
use crate::prompt::PromptTemplate;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

/// Ceiling for map-phase input, just under a 4k context window.
pub const DEFAULT_TOKEN_CEILING: usize = 3990;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BudgetError {
    #[error("chunk {chunk_index} needs {tokens} tokens, limit is {ceiling}")]
    TokenLimitExceeded {
        chunk_index: usize,
        tokens: usize,
        ceiling: usize,
    },
    #[error("combined summaries need {tokens} tokens, limit is {ceiling}")]
    CombinedLimitExceeded { tokens: usize, ceiling: usize },
    #[error("no tokenizer available: {0}")]
    Tokenizer(String),
}

impl BudgetError {
    /// True for either ceiling rejection.
    pub fn is_over_limit(&self) -> bool {
        matches!(
            self,
            BudgetError::TokenLimitExceeded { .. } | BudgetError::CombinedLimitExceeded { .. }
        )
    }
}

/// Counts tokens the way a particular model does.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// BPE tokenizer matching an OpenAI model.
#[derive(Clone)]
pub struct TiktokenCounter {
    bpe: Arc<CoreBPE>,
}

impl TiktokenCounter {
    /// Tokenizer for `model`; unknown names fall back to `cl100k_base`.
    pub fn for_model(model: &str) -> Result<Self, BudgetError> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(e) => {
                warn!(model, error = %e, "unknown model for tokenizer, using cl100k_base");
                tiktoken_rs::cl100k_base().map_err(|e| BudgetError::Tokenizer(e.to_string()))?
            }
        };
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Rejects prompts that would not fit the model's context.
#[derive(Clone)]
pub struct TokenBudgetGuard {
    counter: Arc<dyn TokenCounter>,
    ceiling: usize,
}

impl TokenBudgetGuard {
    pub fn new(counter: Arc<dyn TokenCounter>, ceiling: usize) -> Self {
        Self { counter, ceiling }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn counter(&self) -> &Arc<dyn TokenCounter> {
        &self.counter
    }

    /// Check every chunk; the first one at or over the ceiling fails the lot.
    pub fn check(&self, template: &PromptTemplate, chunks: &[Chunk]) -> Result<(), BudgetError> {
        let overhead = self.overhead(template);
        for chunk in chunks {
            self.check_with_overhead(overhead, chunk.index, &chunk.text)?;
        }
        debug!(
            chunks = chunks.len(),
            overhead,
            ceiling = self.ceiling,
            "token budget ok"
        );
        Ok(())
    }

    /// Check the joined partial summaries that feed the reduce call.
    pub fn check_combined(&self, template: &PromptTemplate, text: &str) -> Result<(), BudgetError> {
        let tokens = self.total(self.overhead(template), text);
        if tokens >= self.ceiling {
            return Err(BudgetError::CombinedLimitExceeded {
                tokens,
                ceiling: self.ceiling,
            });
        }
        Ok(())
    }

    fn overhead(&self, template: &PromptTemplate) -> usize {
        self.counter.count(template.system_text()) + self.counter.count(&template.human_skeleton())
    }

    fn total(&self, overhead: usize, text: &str) -> usize {
        overhead + self.counter.count(text)
    }

    fn check_with_overhead(
        &self,
        overhead: usize,
        chunk_index: usize,
        text: &str,
    ) -> Result<(), BudgetError> {
        let tokens = self.total(overhead, text);
        if tokens >= self.ceiling {
            return Err(BudgetError::TokenLimitExceeded {
                chunk_index,
                tokens,
                ceiling: self.ceiling,
            });
        }
        Ok(())
    }
}
