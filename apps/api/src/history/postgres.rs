use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;

use super::{ArticleRecord, ArticleStore, HistoryOwner, StoreError};
use crate::models::article::ArticleRow;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS generated_articles (
        id                UUID PRIMARY KEY,
        app_id            TEXT NOT NULL,
        user_id           TEXT NOT NULL,
        subject           TEXT NOT NULL,
        rendered_document TEXT NOT NULL,
        keywords          TEXT NOT NULL,
        seo_analysis      JSONB NOT NULL,
        outline           JSONB NOT NULL,
        author_insights   JSONB NOT NULL,
        statistic_ideas   JSONB NOT NULL,
        external_sources  JSONB NOT NULL,
        metadata          JSONB NOT NULL,
        created_at        TIMESTAMPTZ NOT NULL
    )
"#;

const CREATE_OWNER_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS generated_articles_owner_idx
        ON generated_articles (app_id, user_id, created_at DESC)
"#;

/// PostgreSQL-backed history.
/// CRITICAL: records are append-only. Never UPDATE existing rows.
#[derive(Clone)]
pub struct PgArticleStore {
    pool: PgPool,
}

impl PgArticleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the table and index if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_OWNER_INDEX).execute(&self.pool).await?;
        info!("Article history schema ready");
        Ok(())
    }
}

#[async_trait]
impl ArticleStore for PgArticleStore {
    async fn save(&self, owner: &HistoryOwner, record: &ArticleRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO generated_articles
                (id, app_id, user_id, subject, rendered_document, keywords, seo_analysis,
                 outline, author_insights, statistic_ideas, external_sources, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.id)
        .bind(&owner.app_id)
        .bind(&owner.user_id)
        .bind(&record.subject)
        .bind(&record.rendered_document)
        .bind(&record.keywords)
        .bind(Json(&record.seo_analysis))
        .bind(Json(&record.outline))
        .bind(Json(&record.author_insights))
        .bind(Json(&record.statistic_ideas))
        .bind(Json(&record.external_sources))
        .bind(Json(&record.metadata))
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, owner: &HistoryOwner) -> Result<Vec<ArticleRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, subject, rendered_document, keywords, seo_analysis, outline,
                   author_insights, statistic_ideas, external_sources, metadata, created_at
            FROM generated_articles
            WHERE app_id = $1 AND user_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(&owner.app_id)
        .bind(&owner.user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ArticleRecord::from).collect())
    }

    async fn clear(&self, owner: &HistoryOwner) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM generated_articles WHERE app_id = $1 AND user_id = $2")
                .bind(&owner.app_id)
                .bind(&owner.user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}
