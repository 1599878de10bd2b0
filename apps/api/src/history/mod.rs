//! Article history: generated articles persisted per application and user.
//!
//! Records are written once after a successful pipeline run and removed only by an
//! explicit clear. There is no update path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::generation::pipeline::{ArticleMetadata, GeneratedArticle};
use crate::generation::stages::{AuthorConcept, OutlineSection, SeoReport};

pub mod handlers;
pub mod memory;
pub mod postgres;

pub use memory::InMemoryArticleStore;
pub use postgres::PgArticleStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The collection a record belongs to: one per application and user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryOwner {
    pub app_id: String,
    pub user_id: String,
}

impl HistoryOwner {
    pub fn new(app_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// A stored article. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRecord {
    pub id: Uuid,
    pub subject: String,
    pub rendered_document: String,
    pub seo_analysis: SeoReport,
    pub keywords: String,
    pub outline: Vec<OutlineSection>,
    pub author_insights: Vec<AuthorConcept>,
    pub statistic_ideas: Vec<String>,
    pub external_sources: Vec<String>,
    pub metadata: ArticleMetadata,
    pub created_at: DateTime<Utc>,
}

impl ArticleRecord {
    pub fn from_article(article: &GeneratedArticle) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: article.final_subject.clone(),
            rendered_document: article.report.clone(),
            seo_analysis: article.seo_analysis.clone(),
            keywords: article.keywords.clone(),
            outline: article.article_outline.clone(),
            author_insights: article.author_insights.clone(),
            statistic_ideas: article.statistic_ideas.clone(),
            external_sources: article.external_sources.clone(),
            metadata: article.metadata.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Storage backend for article history. Carried in `AppState` as `Arc<dyn ArticleStore>`.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn save(&self, owner: &HistoryOwner, record: &ArticleRecord) -> Result<(), StoreError>;

    /// All records of the owner, newest first.
    async fn list(&self, owner: &HistoryOwner) -> Result<Vec<ArticleRecord>, StoreError>;

    /// Deletes every record of the owner and returns how many were removed.
    async fn clear(&self, owner: &HistoryOwner) -> Result<u64, StoreError>;
}
