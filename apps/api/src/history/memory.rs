use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ArticleRecord, ArticleStore, HistoryOwner, StoreError};

/// Process-local history. Used when no `DATABASE_URL` is configured, and in tests.
#[derive(Default)]
pub struct InMemoryArticleStore {
    collections: RwLock<HashMap<HistoryOwner, Vec<ArticleRecord>>>,
}

#[async_trait]
impl ArticleStore for InMemoryArticleStore {
    async fn save(&self, owner: &HistoryOwner, record: &ArticleRecord) -> Result<(), StoreError> {
        self.collections
            .write()
            .await
            .entry(owner.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn list(&self, owner: &HistoryOwner) -> Result<Vec<ArticleRecord>, StoreError> {
        let mut records = self
            .collections
            .read()
            .await
            .get(owner)
            .cloned()
            .unwrap_or_default();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn clear(&self, owner: &HistoryOwner) -> Result<u64, StoreError> {
        let removed = self.collections.write().await.remove(owner);
        Ok(removed.map_or(0, |records| records.len() as u64))
    }
}
