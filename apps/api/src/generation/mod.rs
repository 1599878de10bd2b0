// Article generation engine.
// Implements: keyword research, outline, enrichment, render, scoring, plus summary/expansion.
// All LLM calls go through a ContentGenerator (no direct Gemini calls here).

pub mod extract;
pub mod handlers;
pub mod pipeline;
pub mod prompts;
pub mod render;
pub mod stages;

pub use pipeline::{ArticlePipeline, GeneratedArticle, GenerationRequest, PipelineError, PipelineSettings};
