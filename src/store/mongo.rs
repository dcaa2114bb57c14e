//! MongoDB 存储
//!
//! 唯一性由集合上的唯一索引保证，重复键写入（错误码 11000）
//! 转换为 [`StoreError::ConstraintViolation`]。整数 id 来自 `counters` 集合的原子自增。

use async_trait::async_trait;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};

use super::{ArtifactStore, DerivedFilter, Page, SourceFilter};
use crate::artifact::{
    DerivedArtifact, DerivedId, Metadata, NewDerivedArtifact, NewSourceArtifact, SourceArtifact,
    SourceId,
};
use crate::error::{StoreError, StoreResult};

const DUPLICATE_KEY_CODE: i32 = 11000;

const SOURCE_COLLECTION: &str = "source_artifacts";
const DERIVED_COLLECTION: &str = "derived_artifacts";
const COUNTER_COLLECTION: &str = "counters";

#[derive(Debug, Serialize, Deserialize)]
struct SourceDocument {
    #[serde(rename = "_id")]
    id: i64,
    url: String,
    text: String,
    metadata: Option<Metadata>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    updated_at: DateTime<Utc>,
}

impl From<SourceDocument> for SourceArtifact {
    fn from(document: SourceDocument) -> Self {
        SourceArtifact {
            id: SourceId(document.id),
            url: document.url,
            text: document.text,
            metadata: document.metadata,
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DerivedDocument {
    #[serde(rename = "_id")]
    id: i64,
    source_id: i64,
    language: String,
    text: String,
    metadata: Option<Metadata>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    updated_at: DateTime<Utc>,
}

impl From<DerivedDocument> for DerivedArtifact {
    fn from(document: DerivedDocument) -> Self {
        DerivedArtifact {
            id: DerivedId(document.id),
            source_id: SourceId(document.source_id),
            language: document.language,
            text: document.text,
            metadata: document.metadata,
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        error.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

fn backend(error: mongodb::error::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn source_query(filter: &SourceFilter) -> Document {
    let mut query = Document::new();
    if let Some(url) = &filter.url {
        query.insert("url", url.as_str());
    }
    query
}

fn derived_query(filter: &DerivedFilter) -> Document {
    let mut query = Document::new();
    if let Some(source_id) = filter.source_id {
        query.insert("source_id", source_id.0);
    }
    if let Some(language) = &filter.language {
        query.insert("language", language.as_str());
    }
    query
}

/// MongoDB 存储
#[derive(Clone)]
pub struct MongoArtifactStore {
    sources: Collection<SourceDocument>,
    derived: Collection<DerivedDocument>,
    counters: Collection<Document>,
}

impl MongoArtifactStore {
    /// 连接数据库并创建唯一索引
    pub async fn connect(connection_string: &str, database: &str) -> StoreResult<Self> {
        let client = mongodb::Client::with_uri_str(connection_string)
            .await
            .map_err(backend)?;
        let store = Self::from_database(&client.database(database));
        store.create_indexes().await?;

        tracing::info!(database, "connected to MongoDB artifact store");
        Ok(store)
    }

    pub fn from_database(database: &Database) -> Self {
        Self {
            sources: database.collection(SOURCE_COLLECTION),
            derived: database.collection(DERIVED_COLLECTION),
            counters: database.collection(COUNTER_COLLECTION),
        }
    }

    /// 创建唯一索引
    pub async fn create_indexes(&self) -> StoreResult<()> {
        let url_unique = IndexModel::builder()
            .keys(doc! { "url": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("url_unique".to_string())
                    .build(),
            )
            .build();
        self.sources
            .create_index(url_unique)
            .await
            .map_err(backend)?;

        let key_unique = IndexModel::builder()
            .keys(doc! { "source_id": 1, "language": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("source_language_unique".to_string())
                    .build(),
            )
            .build();
        self.derived
            .create_index(key_unique)
            .await
            .map_err(backend)?;

        Ok(())
    }

    async fn next_id(&self, counter: &str) -> StoreResult<i64> {
        let updated = self
            .counters
            .find_one_and_update(doc! { "_id": counter }, doc! { "$inc": { "seq": 1_i64 } })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::Backend(format!("counter {} was not created", counter)))?;

        updated
            .get_i64("seq")
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl ArtifactStore for MongoArtifactStore {
    async fn get_source(&self, id: SourceId) -> StoreResult<Option<SourceArtifact>> {
        let document = self
            .sources
            .find_one(doc! { "_id": id.0 })
            .await
            .map_err(backend)?;
        Ok(document.map(SourceArtifact::from))
    }

    async fn get_source_by_url(&self, url: &str) -> StoreResult<Option<SourceArtifact>> {
        let document = self
            .sources
            .find_one(doc! { "url": url })
            .await
            .map_err(backend)?;
        Ok(document.map(SourceArtifact::from))
    }

    async fn insert_source(&self, artifact: NewSourceArtifact) -> StoreResult<SourceArtifact> {
        let id = self.next_id("source").await?;
        let record = artifact.into_artifact(SourceId(id), Utc::now());
        let document = SourceDocument {
            id,
            url: record.url.clone(),
            text: record.text.clone(),
            metadata: record.metadata.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        };

        match self.sources.insert_one(document).await {
            Ok(_) => Ok(record),
            Err(error) if is_duplicate_key(&error) => Err(StoreError::ConstraintViolation {
                record: "source",
                key: record.url,
            }),
            Err(error) => Err(backend(error)),
        }
    }

    async fn list_sources(
        &self,
        page: Page,
        filter: &SourceFilter,
    ) -> StoreResult<Vec<SourceArtifact>> {
        let cursor = self
            .sources
            .find(source_query(filter))
            .sort(doc! { "_id": 1 })
            .skip(page.offset as u64)
            .limit(page.limit as i64)
            .await
            .map_err(backend)?;
        let documents: Vec<SourceDocument> = cursor.try_collect().await.map_err(backend)?;
        Ok(documents.into_iter().map(SourceArtifact::from).collect())
    }

    async fn count_sources(&self, filter: &SourceFilter) -> StoreResult<usize> {
        let count = self
            .sources
            .count_documents(source_query(filter))
            .await
            .map_err(backend)?;
        Ok(count as usize)
    }

    async fn get_derived(&self, id: DerivedId) -> StoreResult<Option<DerivedArtifact>> {
        let document = self
            .derived
            .find_one(doc! { "_id": id.0 })
            .await
            .map_err(backend)?;
        Ok(document.map(DerivedArtifact::from))
    }

    async fn get_derived_by_source(
        &self,
        source_id: SourceId,
        language: &str,
    ) -> StoreResult<Option<DerivedArtifact>> {
        let document = self
            .derived
            .find_one(doc! { "source_id": source_id.0, "language": language })
            .await
            .map_err(backend)?;
        Ok(document.map(DerivedArtifact::from))
    }

    async fn insert_derived(&self, artifact: NewDerivedArtifact) -> StoreResult<DerivedArtifact> {
        if self.get_source(artifact.source_id).await?.is_none() {
            return Err(StoreError::MissingSource(artifact.source_id));
        }

        let id = self.next_id("derived").await?;
        let record = artifact.into_artifact(DerivedId(id), Utc::now());
        let document = DerivedDocument {
            id,
            source_id: record.source_id.0,
            language: record.language.clone(),
            text: record.text.clone(),
            metadata: record.metadata.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        };

        match self.derived.insert_one(document).await {
            Ok(_) => Ok(record),
            Err(error) if is_duplicate_key(&error) => Err(StoreError::ConstraintViolation {
                record: "derived",
                key: format!("{}:{}", record.source_id, record.language),
            }),
            Err(error) => Err(backend(error)),
        }
    }

    async fn list_derived(
        &self,
        page: Page,
        filter: &DerivedFilter,
    ) -> StoreResult<Vec<DerivedArtifact>> {
        let cursor = self
            .derived
            .find(derived_query(filter))
            .sort(doc! { "_id": 1 })
            .skip(page.offset as u64)
            .limit(page.limit as i64)
            .await
            .map_err(backend)?;
        let documents: Vec<DerivedDocument> = cursor.try_collect().await.map_err(backend)?;
        Ok(documents.into_iter().map(DerivedArtifact::from).collect())
    }

    async fn count_derived(&self, filter: &DerivedFilter) -> StoreResult<usize> {
        let count = self
            .derived
            .count_documents(derived_query(filter))
            .await
            .map_err(backend)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queries_only_include_set_fields() {
        assert!(source_query(&SourceFilter::default()).is_empty());

        let query = derived_query(&DerivedFilter {
            source_id: Some(SourceId(4)),
            language: Some("German".to_string()),
        });
        assert_eq!(query, doc! { "source_id": 4_i64, "language": "German" });
    }

    #[test]
    fn test_document_maps_to_artifact() {
        let now = Utc::now();
        let artifact: DerivedArtifact = DerivedDocument {
            id: 2,
            source_id: 1,
            language: "Spanish".to_string(),
            text: "Hola".to_string(),
            metadata: None,
            created_at: now,
            updated_at: now,
        }
        .into();
        assert_eq!(artifact.id, DerivedId(2));
        assert_eq!(artifact.source_id, SourceId(1));
    }
}
