use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::generation::pipeline::ArticleMetadata;
use crate::generation::stages::{AuthorConcept, OutlineSection, SeoReport};
use crate::history::ArticleRecord;

/// A history row as read back for its owner. The owner columns are filtered on, not
/// selected. Structured parts are stored as JSONB.
#[derive(Debug, Clone, FromRow)]
pub struct ArticleRow {
    pub id: Uuid,
    pub subject: String,
    pub rendered_document: String,
    pub keywords: String,
    pub seo_analysis: Json<SeoReport>,
    pub outline: Json<Vec<OutlineSection>>,
    pub author_insights: Json<Vec<AuthorConcept>>,
    pub statistic_ideas: Json<Vec<String>>,
    pub external_sources: Json<Vec<String>>,
    pub metadata: Json<ArticleMetadata>,
    pub created_at: DateTime<Utc>,
}

impl From<ArticleRow> for ArticleRecord {
    fn from(row: ArticleRow) -> Self {
        ArticleRecord {
            id: row.id,
            subject: row.subject,
            rendered_document: row.rendered_document,
            seo_analysis: row.seo_analysis.0,
            keywords: row.keywords,
            outline: row.outline.0,
            author_insights: row.author_insights.0,
            statistic_ideas: row.statistic_ideas.0,
            external_sources: row.external_sources.0,
            metadata: row.metadata.0,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_converts_to_record() {
        let created_at = Utc::now();
        let row = ArticleRow {
            id: Uuid::new_v4(),
            subject: "Stresul".to_string(),
            rendered_document: "<h1>Stresul</h1>".to_string(),
            keywords: "stres, burnout".to_string(),
            seo_analysis: Json(SeoReport::fallback()),
            outline: Json(vec![OutlineSection {
                heading: "Semne".to_string(),
                subheadings: vec![],
            }]),
            author_insights: Json(vec![]),
            statistic_ideas: Json(vec!["prevalență".to_string()]),
            external_sources: Json(vec![]),
            metadata: Json(ArticleMetadata {
                unique_angle: String::new(),
                proposed_meta_title: "Stresul".to_string(),
                proposed_meta_description: String::new(),
                generated_at: created_at,
            }),
            created_at,
        };

        let record = ArticleRecord::from(row.clone());
        assert_eq!(record.id, row.id);
        assert_eq!(record.outline[0].heading, "Semne");
        assert_eq!(record.seo_analysis.overall_score, 75);
        assert_eq!(record.statistic_ideas, vec!["prevalență".to_string()]);
        assert_eq!(record.created_at, created_at);
    }
}
