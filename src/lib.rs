//! # Postcraft
//!
//! Turns a web article into a styled, toned social-media post using an LLM.
//!
//! ## Pipeline
//!
//! - **Fetch**: reqwest + scraper extract readable text, cached per URL for one cycle
//! - **Chunk**: fixed character windows with overlap
//! - **Budget**: every chunk is measured with the model's tokenizer before any paid call
//! - **Map-reduce**: each chunk is summarized on its own, then the partials are combined
//! - **Record**: outcomes are appended to a sled-backed run log

pub mod agent;
pub mod budget;
pub mod catalog;
pub mod chunker;
pub mod config;
pub mod credential;
pub mod engine;
pub mod pipeline;
pub mod prompt;
pub mod recorder;
pub mod scraper;
pub mod summary;

pub use catalog::{Style, Tone};
pub use config::Config;
pub use engine::{StopSignal, SummarizeEngine};
pub use pipeline::{GenerationRequest, Pipeline};
pub use summary::{FinalPost, RunOutcome};
