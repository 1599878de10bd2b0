//! Stage descriptors for the structured (JSON-answering) pipeline stages.
//!
//! Each descriptor pairs a prompt builder with an interpreter that validates the
//! model's answer. A stage's output is only handed to the next stage after
//! `interpret` accepted it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use crate::generation::extract::char_prefix;
use crate::generation::prompts::{
    fill_template, ENRICHMENT_TEMPLATE, KEYWORD_RESEARCH_TEMPLATE, OUTLINE_TEMPLATE, SEO_SCORING_TEMPLATE,
};
use crate::llm_client::prompts::{
    EXPERT_PERSONA, JSON_ONLY_INSTRUCTION, ROMANIAN_OUTPUT_INSTRUCTION,
};

/// Treats an explicit JSON `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// A pipeline stage that asks for JSON and turns it into a validated value.
pub trait StructuredStage {
    /// Shape the model is asked to return.
    type Response: DeserializeOwned;
    /// Validated value handed to the next stage.
    type Output;

    /// Human-readable stage name, used in logs and error messages.
    const NAME: &'static str;

    fn prompt(&self) -> String;

    /// Rejects answers the next stage cannot work with. The error is a reason string.
    fn interpret(&self, response: Self::Response) -> Result<Self::Output, String>;
}

fn non_blank(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Stage 1: keyword research
// ────────────────────────────────────────────────────────────────────────────

/// Refined subject plus keyword sets chosen by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordPlan {
    pub final_subject: String,
    pub primary_keyword: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub secondary_keywords: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub long_tail_keywords: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rationale: String,
}

impl KeywordPlan {
    /// Primary, secondary and long-tail keywords, comma-joined, empties skipped.
    pub fn combined_keywords(&self) -> String {
        std::iter::once(&self.primary_keyword)
            .chain(&self.secondary_keywords)
            .chain(&self.long_tail_keywords)
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub struct KeywordResearch<'a> {
    pub subject: &'a str,
}

impl StructuredStage for KeywordResearch<'_> {
    type Response = KeywordPlan;
    type Output = KeywordPlan;
    const NAME: &'static str = "Stage 1 (keyword research)";

    fn prompt(&self) -> String {
        fill_template(
            KEYWORD_RESEARCH_TEMPLATE,
            &[
                ("persona", EXPERT_PERSONA),
                ("subject", self.subject),
                ("language", ROMANIAN_OUTPUT_INSTRUCTION),
                ("json_only", JSON_ONLY_INSTRUCTION),
            ],
        )
    }

    fn interpret(&self, plan: KeywordPlan) -> Result<KeywordPlan, String> {
        let final_subject = plan.final_subject.trim().to_string();
        if final_subject.is_empty() {
            return Err("finalSubject is missing".to_string());
        }
        let primary_keyword = plan.primary_keyword.trim().to_string();
        if primary_keyword.is_empty() {
            return Err("primaryKeyword is missing".to_string());
        }

        Ok(KeywordPlan {
            final_subject,
            primary_keyword,
            secondary_keywords: non_blank(plan.secondary_keywords),
            long_tail_keywords: non_blank(plan.long_tail_keywords),
            rationale: plan.rationale.trim().to_string(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stage 2: outline
// ────────────────────────────────────────────────────────────────────────────

/// One H2 section and its H3 sub-sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineSection {
    pub heading: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subheadings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleOutline {
    pub sections: Vec<OutlineSection>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unique_angle: String,
    /// ≤60 characters is asked for, not enforced.
    #[serde(default, deserialize_with = "null_as_default")]
    pub proposed_title: String,
    /// ≤160 characters is asked for, not enforced.
    #[serde(default, deserialize_with = "null_as_default")]
    pub proposed_description: String,
}

pub struct OutlinePlanning<'a> {
    pub final_subject: &'a str,
    pub keywords: &'a str,
}

impl StructuredStage for OutlinePlanning<'_> {
    type Response = ArticleOutline;
    type Output = ArticleOutline;
    const NAME: &'static str = "Stage 2 (outline)";

    fn prompt(&self) -> String {
        fill_template(
            OUTLINE_TEMPLATE,
            &[
                ("persona", EXPERT_PERSONA),
                ("final_subject", self.final_subject),
                ("keywords", self.keywords),
                ("language", ROMANIAN_OUTPUT_INSTRUCTION),
                ("json_only", JSON_ONLY_INSTRUCTION),
            ],
        )
    }

    fn interpret(&self, outline: ArticleOutline) -> Result<ArticleOutline, String> {
        let mut sections = Vec::with_capacity(outline.sections.len());
        for (index, section) in outline.sections.into_iter().enumerate() {
            let heading = section.heading.trim().to_string();
            if heading.is_empty() {
                return Err(format!("section {} has an empty heading", index + 1));
            }
            sections.push(OutlineSection {
                heading,
                subheadings: non_blank(section.subheadings),
            });
        }
        if sections.is_empty() {
            return Err("the outline has no sections".to_string());
        }

        Ok(ArticleOutline {
            sections,
            unique_angle: outline.unique_angle.trim().to_string(),
            proposed_title: outline.proposed_title.trim().to_string(),
            proposed_description: outline.proposed_description.trim().to_string(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stage 3: enrichment
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorConcept {
    pub author: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub concept: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub quote_or_idea: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpertInsights {
    #[serde(default, deserialize_with = "null_as_default")]
    pub author_concepts: Vec<AuthorConcept>,
    /// Themes only, never figures.
    #[serde(default, deserialize_with = "null_as_default")]
    pub statistic_ideas: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub external_sources: Vec<String>,
}

pub struct ExpertEnrichment<'a> {
    pub final_subject: &'a str,
    pub sections: &'a [OutlineSection],
}

impl StructuredStage for ExpertEnrichment<'_> {
    type Response = ExpertInsights;
    type Output = ExpertInsights;
    const NAME: &'static str = "Stage 3 (enrichment)";

    fn prompt(&self) -> String {
        let outline_json = serde_json::to_string(self.sections).unwrap_or_default();
        fill_template(
            ENRICHMENT_TEMPLATE,
            &[
                ("persona", EXPERT_PERSONA),
                ("final_subject", self.final_subject),
                ("outline_json", &outline_json),
                ("language", ROMANIAN_OUTPUT_INSTRUCTION),
                ("json_only", JSON_ONLY_INSTRUCTION),
            ],
        )
    }

    fn interpret(&self, insights: ExpertInsights) -> Result<ExpertInsights, String> {
        Ok(ExpertInsights {
            author_concepts: insights
                .author_concepts
                .into_iter()
                .filter(|c| !c.author.trim().is_empty())
                .collect(),
            statistic_ideas: non_blank(insights.statistic_ideas),
            external_sources: non_blank(insights.external_sources),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stage 5: scoring
// ────────────────────────────────────────────────────────────────────────────

pub const FALLBACK_SCORE: u8 = 75;

/// SEO/UX score report. `overall_score` is always within 0..=100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoReport {
    pub overall_score: u8,
    pub detailed_analysis: Map<String, Value>,
    pub priority_recommendations: Vec<String>,
    pub status: String,
}

impl SeoReport {
    /// Used when scoring fails; the article itself is still returned.
    pub fn fallback() -> Self {
        let mut detailed_analysis = Map::new();
        detailed_analysis.insert(
            "message".to_string(),
            json!("The SEO report could not be fully generated, but the article was created successfully."),
        );

        Self {
            overall_score: FALLBACK_SCORE,
            detailed_analysis,
            priority_recommendations: vec![
                "Check keyword density manually".to_string(),
                "Make sure the H1-H3 structure is correct".to_string(),
                "Review the meta title and description".to_string(),
                "Verify the generated external links".to_string(),
            ],
            status: "Partially analyzed".to_string(),
        }
    }
}

/// Raw scoring answer. The score stays a loose number until it is validated.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoReportResponse {
    overall_score: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    detailed_analysis: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    priority_recommendations: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    status: String,
}

pub struct SeoScoring<'a> {
    pub document: &'a str,
    pub keywords: &'a str,
    /// Only this many leading characters of the document are sent.
    pub char_budget: usize,
}

impl StructuredStage for SeoScoring<'_> {
    type Response = SeoReportResponse;
    type Output = SeoReport;
    const NAME: &'static str = "Stage 5 (scoring)";

    fn prompt(&self) -> String {
        fill_template(
            SEO_SCORING_TEMPLATE,
            &[
                ("keywords", self.keywords),
                ("json_only", JSON_ONLY_INSTRUCTION),
                ("document", char_prefix(self.document, self.char_budget)),
            ],
        )
    }

    fn interpret(&self, response: SeoReportResponse) -> Result<SeoReport, String> {
        let score = response
            .overall_score
            .as_ref()
            .and_then(Value::as_f64)
            .ok_or_else(|| "overallScore is missing or not a number".to_string())?;

        Ok(SeoReport {
            overall_score: score.clamp(0.0, 100.0).round() as u8,
            detailed_analysis: response.detailed_analysis,
            priority_recommendations: non_blank(response.priority_recommendations),
            status: response.status.trim().to_string(),
        })
    }
}
