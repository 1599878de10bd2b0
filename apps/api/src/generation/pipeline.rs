//! Article Pipeline: orchestrates the five generation stages.
//!
//! Flow: keyword research → outline → enrichment → render → scoring.
//!
//! Stages run strictly in order and each one only sees its predecessor's validated
//! output. Any failure in stages 1-4 aborts the run with no partial result. Scoring is
//! best-effort: when it fails, a fallback report is attached and the run still succeeds.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::generation::extract::{char_prefix, clean_markup, markup_to_text, parse_typed, ParseError};
use crate::generation::prompts::{fill_template, EXPAND_SECTION_TEMPLATE, SUMMARY_TEMPLATE};
use crate::generation::render::render_prompt;
use crate::generation::stages::{
    AuthorConcept, ExpertEnrichment, KeywordResearch, OutlinePlanning, OutlineSection,
    SeoReport, SeoScoring, StructuredStage,
};
use crate::llm_client::prompts::{EXPERT_PERSONA, ROMANIAN_OUTPUT_INSTRUCTION};
use crate::llm_client::{ContentGenerator, GenerationError};

const RENDER_STAGE: &str = "Stage 4 (render)";
const SUMMARY_STEP: &str = "article summary";
const EXPANSION_STEP: &str = "section expansion";

// ────────────────────────────────────────────────────────────────────────────
// State machine
// ────────────────────────────────────────────────────────────────────────────

/// Position of a run in the linear stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Init,
    KeywordResearch,
    Outline,
    Enrichment,
    Render,
    Scoring,
    Done,
    Failed,
}

impl PipelinePhase {
    /// The phase after this one succeeds. `Done` and `Failed` are terminal.
    pub fn next(self) -> Self {
        match self {
            Self::Init => Self::KeywordResearch,
            Self::KeywordResearch => Self::Outline,
            Self::Outline => Self::Enrichment,
            Self::Enrichment => Self::Render,
            Self::Render => Self::Scoring,
            Self::Scoring => Self::Done,
            Self::Done => Self::Done,
            Self::Failed => Self::Failed,
        }
    }

    /// Moves to `Failed` and returns the phase that failed.
    pub fn fail(&mut self) -> Self {
        std::mem::replace(self, Self::Failed)
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Init => "init",
            Self::KeywordResearch => "keyword-research",
            Self::Outline => "outline",
            Self::Enrichment => "enrichment",
            Self::Render => "render",
            Self::Scoring => "scoring",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Failure of a pipeline step. Carries the step name for diagnosis.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{step} failed: {source}")]
    Generation {
        step: &'static str,
        #[source]
        source: GenerationError,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// Immutable pipeline input.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub subject: String,
}

impl GenerationRequest {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleMetadata {
    pub unique_angle: String,
    pub proposed_meta_title: String,
    pub proposed_meta_description: String,
    pub generated_at: DateTime<Utc>,
}

/// Aggregate result of a full run, serialized as the `generateArticle` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArticle {
    /// Rendered article markup.
    pub report: String,
    pub final_subject: String,
    pub keywords: String,
    pub article_outline: Vec<OutlineSection>,
    pub author_insights: Vec<AuthorConcept>,
    pub statistic_ideas: Vec<String>,
    pub external_sources: Vec<String>,
    pub seo_analysis: SeoReport,
    pub metadata: ArticleMetadata,
}

/// Character budgets applied to text sent back to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Stage 5 scores only this many leading characters of the article.
    pub scoring_char_budget: usize,
    /// Summary and expansion read only this many leading characters of the source.
    pub source_char_budget: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            scoring_char_budget: 8000,
            source_char_budget: 10_000,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Runs a structured stage: prompt → generate → parse → interpret.
pub async fn run_stage<S: StructuredStage>(
    generator: &dyn ContentGenerator,
    stage: &S,
) -> Result<S::Output, PipelineError> {
    let raw = generator
        .generate(&stage.prompt())
        .await
        .map_err(|source| PipelineError::Generation {
            step: S::NAME,
            source,
        })?;

    let response: S::Response = parse_typed(&raw, S::NAME).map_err(|e| {
        error!(stage = S::NAME, preview = %e.raw_preview, "JSON parsing failed: {}", e.reason);
        e
    })?;

    stage.interpret(response).map_err(|reason| {
        error!(stage = S::NAME, "Stage response rejected: {reason}");
        PipelineError::Parse(ParseError::new(S::NAME, reason, &raw))
    })
}

/// The article generator. Cheap to share behind an `Arc`.
pub struct ArticlePipeline {
    generator: Arc<dyn ContentGenerator>,
    settings: PipelineSettings,
}

impl ArticlePipeline {
    pub fn new(generator: Arc<dyn ContentGenerator>, settings: PipelineSettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    /// Runs all five stages for one subject.
    pub async fn generate_article(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedArticle, PipelineError> {
        let started = std::time::Instant::now();
        let mut phase = PipelinePhase::Init;

        match self.run_stages(request, &mut phase).await {
            Ok(article) => {
                info!(
                    subject = %article.final_subject,
                    seo_score = article.seo_analysis.overall_score,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Article generation completed"
                );
                Ok(article)
            }
            Err(e) => {
                let failed_in = phase.fail();
                error!(
                    %failed_in,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Article generation failed: {e}"
                );
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        request: &GenerationRequest,
        phase: &mut PipelinePhase,
    ) -> Result<GeneratedArticle, PipelineError> {
        let generator = self.generator.as_ref();

        *phase = phase.next();
        info!(%phase, subject = %request.subject, "Stage started");
        let plan = run_stage(
            generator,
            &KeywordResearch {
                subject: &request.subject,
            },
        )
        .await?;
        let keywords = plan.combined_keywords();

        *phase = phase.next();
        info!(%phase, final_subject = %plan.final_subject, "Stage started");
        let outline = run_stage(
            generator,
            &OutlinePlanning {
                final_subject: &plan.final_subject,
                keywords: &keywords,
            },
        )
        .await?;

        *phase = phase.next();
        info!(%phase, sections = outline.sections.len(), "Stage started");
        let insights = run_stage(
            generator,
            &ExpertEnrichment {
                final_subject: &plan.final_subject,
                sections: &outline.sections,
            },
        )
        .await?;

        *phase = phase.next();
        info!(%phase, authors = insights.author_concepts.len(), "Stage started");
        let raw = generator
            .generate(&render_prompt(&plan, &outline, &insights))
            .await
            .map_err(|source| PipelineError::Generation {
                step: RENDER_STAGE,
                source,
            })?;
        let report = clean_markup(&raw);
        if report.is_empty() {
            return Err(ParseError::new(RENDER_STAGE, "no markup left after cleaning", &raw).into());
        }
        info!(html_length = report.len(), "HTML article generated");

        *phase = phase.next();
        info!(%phase, "Stage started");
        let seo_analysis = self.score(&report, &keywords).await;

        *phase = phase.next();

        Ok(GeneratedArticle {
            report,
            final_subject: plan.final_subject,
            keywords,
            article_outline: outline.sections,
            author_insights: insights.author_concepts,
            statistic_ideas: insights.statistic_ideas,
            external_sources: insights.external_sources,
            seo_analysis,
            metadata: ArticleMetadata {
                unique_angle: outline.unique_angle,
                proposed_meta_title: outline.proposed_title,
                proposed_meta_description: outline.proposed_description,
                generated_at: Utc::now(),
            },
        })
    }

    /// Stage 5. Never fails: any error yields `SeoReport::fallback()`.
    async fn score(&self, document: &str, keywords: &str) -> SeoReport {
        let stage = SeoScoring {
            document,
            keywords,
            char_budget: self.settings.scoring_char_budget,
        };

        match run_stage(self.generator.as_ref(), &stage).await {
            Ok(report) => report,
            Err(e) => {
                warn!("SEO report generation failed, using fallback: {e}");
                SeoReport::fallback()
            }
        }
    }

    /// Plain-text summary of an article (markup is stripped from the answer).
    pub async fn summarize_article(&self, article_content: &str) -> Result<String, PipelineError> {
        let prompt = fill_template(
            SUMMARY_TEMPLATE,
            &[
                ("language", ROMANIAN_OUTPUT_INSTRUCTION),
                (
                    "document",
                    char_prefix(article_content, self.settings.source_char_budget),
                ),
            ],
        );

        let raw = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|source| PipelineError::Generation {
                step: SUMMARY_STEP,
                source,
            })?;

        let summary = markup_to_text(&raw);
        if summary.is_empty() {
            return Err(ParseError::new(SUMMARY_STEP, "no text left after cleaning", &raw).into());
        }
        Ok(summary)
    }

    /// New markup for one section of an existing article.
    pub async fn expand_section(
        &self,
        article_content: &str,
        section_title: &str,
    ) -> Result<String, PipelineError> {
        let prompt = fill_template(
            EXPAND_SECTION_TEMPLATE,
            &[
                ("persona", EXPERT_PERSONA),
                ("section_title", section_title),
                ("language", ROMANIAN_OUTPUT_INSTRUCTION),
                (
                    "document",
                    char_prefix(article_content, self.settings.source_char_budget),
                ),
            ],
        );

        let raw = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|source| PipelineError::Generation {
                step: EXPANSION_STEP,
                source,
            })?;

        let expanded = clean_markup(&raw);
        if expanded.is_empty() {
            return Err(ParseError::new(EXPANSION_STEP, "no markup left after cleaning", &raw).into());
        }
        Ok(expanded)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
