//! 基于 redb 的嵌入式磁盘存储
//!
//! 每次插入都在一个写事务内完成：检查唯一索引、分配 id、写记录、提交。
//! redb 是同步 API，所有操作都放到阻塞线程池中执行。

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use super::{ArtifactStore, DerivedFilter, Page, SourceFilter};
use crate::artifact::{
    DerivedArtifact, DerivedId, NewDerivedArtifact, NewSourceArtifact, SourceArtifact, SourceId,
};
use crate::error::{StoreError, StoreResult};

const SOURCES: TableDefinition<i64, &[u8]> = TableDefinition::new("sources");
const SOURCE_URLS: TableDefinition<&str, i64> = TableDefinition::new("source_url_index");
const DERIVED: TableDefinition<i64, &[u8]> = TableDefinition::new("derived");
const DERIVED_KEYS: TableDefinition<&str, i64> = TableDefinition::new("derived_key_index");
const COUNTERS: TableDefinition<&str, i64> = TableDefinition::new("counters");

const SOURCE_COUNTER: &str = "source";
const DERIVED_COUNTER: &str = "derived";

macro_rules! impl_from_redb_error {
    ($($error:ty),* $(,)?) => {
        $(
            impl From<$error> for StoreError {
                fn from(error: $error) -> Self {
                    StoreError::Backend(error.to_string())
                }
            }
        )*
    };
}

impl_from_redb_error!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// 派生制品唯一索引的键
fn derived_key(source_id: SourceId, language: &str) -> String {
    format!("{}\u{1f}{}", source_id, language)
}

/// redb 存储
#[derive(Clone)]
pub struct RedbArtifactStore {
    db: Arc<Database>,
}

impl RedbArtifactStore {
    /// 打开（或创建）数据库文件并确保所有表存在
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Backend(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        {
            txn.open_table(SOURCES)?;
            txn.open_table(SOURCE_URLS)?;
            txn.open_table(DERIVED)?;
            txn.open_table(DERIVED_KEYS)?;
            txn.open_table(COUNTERS)?;
        }
        txn.commit()?;

        tracing::debug!(path = %path.display(), "opened redb artifact store");
        Ok(Self { db: Arc::new(db) })
    }

    async fn run<T, F>(&self, operation: F) -> StoreResult<T>
    where
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || operation(&db))
            .await
            .map_err(|e| StoreError::Backend(format!("blocking task failed: {}", e)))?
    }
}

fn read_source(db: &Database, id: i64) -> StoreResult<Option<SourceArtifact>> {
    let txn = db.begin_read()?;
    let table = txn.open_table(SOURCES)?;
    let record = match table.get(id)? {
        Some(bytes) => Some(serde_json::from_slice(bytes.value())?),
        None => None,
    };
    Ok(record)
}

fn read_derived(db: &Database, id: i64) -> StoreResult<Option<DerivedArtifact>> {
    let txn = db.begin_read()?;
    let table = txn.open_table(DERIVED)?;
    let record = match table.get(id)? {
        Some(bytes) => Some(serde_json::from_slice(bytes.value())?),
        None => None,
    };
    Ok(record)
}

fn lookup_index(
    db: &Database,
    index: TableDefinition<&str, i64>,
    key: &str,
) -> StoreResult<Option<i64>> {
    let txn = db.begin_read()?;
    let table = txn.open_table(index)?;
    let id = table.get(key)?.map(|guard| guard.value());
    Ok(id)
}

fn scan<T, P>(
    db: &Database,
    records: TableDefinition<i64, &[u8]>,
    page: Option<Page>,
    predicate: P,
) -> StoreResult<Vec<T>>
where
    T: serde::de::DeserializeOwned,
    P: Fn(&T) -> bool,
{
    let txn = db.begin_read()?;
    let table = txn.open_table(records)?;
    let (offset, limit) = page.map_or((0, usize::MAX), |p| (p.offset, p.limit));

    let mut matched = Vec::new();
    let mut skipped = 0;
    for entry in table.iter()? {
        let (_, bytes) = entry?;
        let record: T = serde_json::from_slice(bytes.value())?;
        if !predicate(&record) {
            continue;
        }
        if skipped < offset {
            skipped += 1;
            continue;
        }
        if matched.len() >= limit {
            break;
        }
        matched.push(record);
    }
    Ok(matched)
}

#[async_trait]
impl ArtifactStore for RedbArtifactStore {
    async fn get_source(&self, id: SourceId) -> StoreResult<Option<SourceArtifact>> {
        self.run(move |db| read_source(db, id.0)).await
    }

    async fn get_source_by_url(&self, url: &str) -> StoreResult<Option<SourceArtifact>> {
        let url = url.to_string();
        self.run(move |db| match lookup_index(db, SOURCE_URLS, &url)? {
            Some(id) => read_source(db, id),
            None => Ok(None),
        })
        .await
    }

    async fn insert_source(&self, artifact: NewSourceArtifact) -> StoreResult<SourceArtifact> {
        self.run(move |db| {
            let txn = db.begin_write()?;
            let record = {
                let mut urls = txn.open_table(SOURCE_URLS)?;
                if urls.get(artifact.url.as_str())?.is_some() {
                    return Err(StoreError::ConstraintViolation {
                        record: "source",
                        key: artifact.url,
                    });
                }

                let mut counters = txn.open_table(COUNTERS)?;
                let next = counters
                    .get(SOURCE_COUNTER)?
                    .map(|guard| guard.value())
                    .unwrap_or(0)
                    + 1;
                counters.insert(SOURCE_COUNTER, next)?;

                let record = artifact.into_artifact(SourceId(next), Utc::now());
                let bytes = serde_json::to_vec(&record)?;
                txn.open_table(SOURCES)?.insert(next, bytes.as_slice())?;
                urls.insert(record.url.as_str(), next)?;
                record
            };
            txn.commit()?;
            Ok(record)
        })
        .await
    }

    async fn list_sources(
        &self,
        page: Page,
        filter: &SourceFilter,
    ) -> StoreResult<Vec<SourceArtifact>> {
        let filter = filter.clone();
        self.run(move |db| scan(db, SOURCES, Some(page), |a| filter.matches(a)))
            .await
    }

    async fn count_sources(&self, filter: &SourceFilter) -> StoreResult<usize> {
        if filter.url.is_none() {
            return self
                .run(|db| {
                    let txn = db.begin_read()?;
                    let len = txn.open_table(SOURCES)?.len()?;
                    Ok(len as usize)
                })
                .await;
        }
        let filter = filter.clone();
        self.run(move |db| {
            let matched: Vec<SourceArtifact> = scan(db, SOURCES, None, |a| filter.matches(a))?;
            Ok(matched.len())
        })
        .await
    }

    async fn get_derived(&self, id: DerivedId) -> StoreResult<Option<DerivedArtifact>> {
        self.run(move |db| read_derived(db, id.0)).await
    }

    async fn get_derived_by_source(
        &self,
        source_id: SourceId,
        language: &str,
    ) -> StoreResult<Option<DerivedArtifact>> {
        let key = derived_key(source_id, language);
        self.run(move |db| match lookup_index(db, DERIVED_KEYS, &key)? {
            Some(id) => read_derived(db, id),
            None => Ok(None),
        })
        .await
    }

    async fn insert_derived(&self, artifact: NewDerivedArtifact) -> StoreResult<DerivedArtifact> {
        self.run(move |db| {
            let txn = db.begin_write()?;
            let record = {
                if txn.open_table(SOURCES)?.get(artifact.source_id.0)?.is_none() {
                    return Err(StoreError::MissingSource(artifact.source_id));
                }

                let key = derived_key(artifact.source_id, &artifact.language);
                let mut keys = txn.open_table(DERIVED_KEYS)?;
                if keys.get(key.as_str())?.is_some() {
                    return Err(StoreError::ConstraintViolation {
                        record: "derived",
                        key: format!("{}:{}", artifact.source_id, artifact.language),
                    });
                }

                let mut counters = txn.open_table(COUNTERS)?;
                let next = counters
                    .get(DERIVED_COUNTER)?
                    .map(|guard| guard.value())
                    .unwrap_or(0)
                    + 1;
                counters.insert(DERIVED_COUNTER, next)?;

                let record = artifact.into_artifact(DerivedId(next), Utc::now());
                let bytes = serde_json::to_vec(&record)?;
                txn.open_table(DERIVED)?.insert(next, bytes.as_slice())?;
                keys.insert(key.as_str(), next)?;
                record
            };
            txn.commit()?;
            Ok(record)
        })
        .await
    }

    async fn list_derived(
        &self,
        page: Page,
        filter: &DerivedFilter,
    ) -> StoreResult<Vec<DerivedArtifact>> {
        let filter = filter.clone();
        self.run(move |db| scan(db, DERIVED, Some(page), |a| filter.matches(a)))
            .await
    }

    async fn count_derived(&self, filter: &DerivedFilter) -> StoreResult<usize> {
        let filter = filter.clone();
        self.run(move |db| {
            let matched: Vec<DerivedArtifact> = scan(db, DERIVED, None, |a| filter.matches(a))?;
            Ok(matched.len())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_source(url: &str) -> NewSourceArtifact {
        NewSourceArtifact {
            url: url.to_string(),
            text: "Hello world".to_string(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifacts.redb");

        let inserted = {
            let store = RedbArtifactStore::open(&path).unwrap();
            let source = store.insert_source(new_source("https://example.com/a")).await.unwrap();
            store
                .insert_derived(NewDerivedArtifact {
                    source_id: source.id,
                    language: "Spanish".to_string(),
                    text: "Hola mundo".to_string(),
                    metadata: None,
                })
                .await
                .unwrap()
        };

        let store = RedbArtifactStore::open(&path).unwrap();
        let source = store
            .get_source_by_url("https://example.com/a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(source.id, SourceId(1));

        let derived = store
            .get_derived_by_source(source.id, "Spanish")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(derived, inserted);
        assert_eq!(store.get_derived(inserted.id).await.unwrap(), Some(inserted));
    }

    #[tokio::test]
    async fn test_duplicate_url_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbArtifactStore::open(dir.path().join("a.redb")).unwrap();

        store.insert_source(new_source("https://example.com/a")).await.unwrap();
        let error = store
            .insert_source(new_source("https://example.com/a"))
            .await
            .unwrap_err();
        assert!(error.is_constraint_violation());

        // 失败的事务不应消耗 id
        let next = store.insert_source(new_source("https://example.com/b")).await.unwrap();
        assert_eq!(next.id, SourceId(2));
        assert_eq!(store.count_sources(&SourceFilter::default()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_derived_constraints() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbArtifactStore::open(dir.path().join("a.redb")).unwrap();

        let orphan = NewDerivedArtifact {
            source_id: SourceId(5),
            language: "Spanish".to_string(),
            text: "Hola".to_string(),
            metadata: None,
        };
        assert_eq!(
            store.insert_derived(orphan.clone()).await.unwrap_err(),
            StoreError::MissingSource(SourceId(5))
        );

        let source = store.insert_source(new_source("https://example.com/a")).await.unwrap();
        let derived = NewDerivedArtifact {
            source_id: source.id,
            ..orphan
        };
        store.insert_derived(derived.clone()).await.unwrap();
        assert!(store
            .insert_derived(derived)
            .await
            .unwrap_err()
            .is_constraint_violation());
    }

    #[tokio::test]
    async fn test_list_pages_in_id_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbArtifactStore::open(dir.path().join("a.redb")).unwrap();
        for i in 0..4 {
            store
                .insert_source(new_source(&format!("https://example.com/{i}")))
                .await
                .unwrap();
        }

        let page = store
            .list_sources(Page::new(2, 10), &SourceFilter::default())
            .await
            .unwrap();
        let urls: Vec<_> = page.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/2", "https://example.com/3"]);

        let filter = SourceFilter {
            url: Some("https://example.com/1".to_string()),
        };
        assert_eq!(store.count_sources(&filter).await.unwrap(), 1);
    }
}
