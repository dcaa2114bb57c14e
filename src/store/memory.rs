//! 进程内制品存储
//!
//! 所有数据保存在一把读写锁之后，唯一索引与记录在同一个临界区内更新，
//! 因此插入和唯一性检查是原子的。

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{ArtifactStore, DerivedFilter, Page, SourceFilter};
use crate::artifact::{
    DerivedArtifact, DerivedId, DerivedKey, NewDerivedArtifact, NewSourceArtifact,
    SourceArtifact, SourceId,
};
use crate::error::{StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    sources: BTreeMap<SourceId, SourceArtifact>,
    source_urls: HashMap<String, SourceId>,
    derived: BTreeMap<DerivedId, DerivedArtifact>,
    derived_keys: HashMap<DerivedKey, DerivedId>,
    next_source_id: i64,
    next_derived_id: i64,
}

/// 内存存储
#[derive(Default)]
pub struct MemoryArtifactStore {
    tables: RwLock<Tables>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T: Clone>(items: impl Iterator<Item = T>, page: Page) -> Vec<T> {
    items.skip(page.offset).take(page.limit).collect()
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn get_source(&self, id: SourceId) -> StoreResult<Option<SourceArtifact>> {
        Ok(self.tables.read().await.sources.get(&id).cloned())
    }

    async fn get_source_by_url(&self, url: &str) -> StoreResult<Option<SourceArtifact>> {
        let tables = self.tables.read().await;
        Ok(tables
            .source_urls
            .get(url)
            .and_then(|id| tables.sources.get(id))
            .cloned())
    }

    async fn insert_source(&self, artifact: NewSourceArtifact) -> StoreResult<SourceArtifact> {
        let mut tables = self.tables.write().await;

        if tables.source_urls.contains_key(&artifact.url) {
            return Err(StoreError::ConstraintViolation {
                record: "source",
                key: artifact.url,
            });
        }

        tables.next_source_id += 1;
        let id = SourceId(tables.next_source_id);
        let record = artifact.into_artifact(id, Utc::now());

        tables.source_urls.insert(record.url.clone(), id);
        tables.sources.insert(id, record.clone());
        Ok(record)
    }

    async fn list_sources(
        &self,
        page: Page,
        filter: &SourceFilter,
    ) -> StoreResult<Vec<SourceArtifact>> {
        let tables = self.tables.read().await;
        Ok(paginate(
            tables.sources.values().filter(|a| filter.matches(a)).cloned(),
            page,
        ))
    }

    async fn count_sources(&self, filter: &SourceFilter) -> StoreResult<usize> {
        let tables = self.tables.read().await;
        Ok(tables.sources.values().filter(|a| filter.matches(a)).count())
    }

    async fn get_derived(&self, id: DerivedId) -> StoreResult<Option<DerivedArtifact>> {
        Ok(self.tables.read().await.derived.get(&id).cloned())
    }

    async fn get_derived_by_source(
        &self,
        source_id: SourceId,
        language: &str,
    ) -> StoreResult<Option<DerivedArtifact>> {
        let tables = self.tables.read().await;
        let key = DerivedKey::new(source_id, language);
        Ok(tables
            .derived_keys
            .get(&key)
            .and_then(|id| tables.derived.get(id))
            .cloned())
    }

    async fn insert_derived(&self, artifact: NewDerivedArtifact) -> StoreResult<DerivedArtifact> {
        let mut tables = self.tables.write().await;

        if !tables.sources.contains_key(&artifact.source_id) {
            return Err(StoreError::MissingSource(artifact.source_id));
        }

        let key = DerivedKey::new(artifact.source_id, artifact.language.clone());
        if tables.derived_keys.contains_key(&key) {
            return Err(StoreError::ConstraintViolation {
                record: "derived",
                key: key.to_string(),
            });
        }

        tables.next_derived_id += 1;
        let id = DerivedId(tables.next_derived_id);
        let record = artifact.into_artifact(id, Utc::now());

        tables.derived_keys.insert(key, id);
        tables.derived.insert(id, record.clone());
        Ok(record)
    }

    async fn list_derived(
        &self,
        page: Page,
        filter: &DerivedFilter,
    ) -> StoreResult<Vec<DerivedArtifact>> {
        let tables = self.tables.read().await;
        Ok(paginate(
            tables.derived.values().filter(|a| filter.matches(a)).cloned(),
            page,
        ))
    }

    async fn count_derived(&self, filter: &DerivedFilter) -> StoreResult<usize> {
        let tables = self.tables.read().await;
        Ok(tables.derived.values().filter(|a| filter.matches(a)).count())
    }
}
