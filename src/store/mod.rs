//! 存储模块
//!
//! 制品存储是一个被动的记录保管者：按 id 和按键查询、插入、列表和计数。
//! 插入操作必须与唯一性检查原子地完成，重复键返回
//! [`StoreError::ConstraintViolation`](crate::error::StoreError)。
//!
//! # 模块组织
//!
//! - `memory` - 进程内存储，用于测试和临时运行
//! - `embedded` - 基于 redb 的嵌入式磁盘存储
//! - `mongo` - MongoDB 存储（需要 `web` 特性）

pub mod embedded;
pub mod memory;
#[cfg(feature = "web")]
pub mod mongo;

use std::sync::Arc;

use async_trait::async_trait;

use crate::artifact::{
    DerivedArtifact, DerivedId, NewDerivedArtifact, NewSourceArtifact, SourceArtifact, SourceId,
};
use crate::config::{AppConfig, StoreBackend};
use crate::error::{StoreError, StoreResult};

pub use embedded::RedbArtifactStore;
pub use memory::MemoryArtifactStore;
#[cfg(feature = "web")]
pub use mongo::MongoArtifactStore;

/// 默认每页记录数
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// 分页参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// 源制品过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFilter {
    pub url: Option<String>,
}

impl SourceFilter {
    pub fn matches(&self, artifact: &SourceArtifact) -> bool {
        self.url.as_deref().map_or(true, |url| artifact.url == url)
    }
}

/// 派生制品过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedFilter {
    pub source_id: Option<SourceId>,
    pub language: Option<String>,
}

impl DerivedFilter {
    pub fn matches(&self, artifact: &DerivedArtifact) -> bool {
        self.source_id.map_or(true, |id| artifact.source_id == id)
            && self
                .language
                .as_deref()
                .map_or(true, |language| artifact.language == language)
    }
}

/// 制品存储接口
///
/// 两类记录各有一组类型化的方法，不做运行时的字段分派，
/// 也不会在访问属性时隐式触发 I/O。列表结果按 id 升序。
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn get_source(&self, id: SourceId) -> StoreResult<Option<SourceArtifact>>;

    async fn get_source_by_url(&self, url: &str) -> StoreResult<Option<SourceArtifact>>;

    /// 插入源制品；`url` 已存在时返回约束冲突
    async fn insert_source(&self, artifact: NewSourceArtifact) -> StoreResult<SourceArtifact>;

    async fn list_sources(&self, page: Page, filter: &SourceFilter)
        -> StoreResult<Vec<SourceArtifact>>;

    async fn count_sources(&self, filter: &SourceFilter) -> StoreResult<usize>;

    async fn get_derived(&self, id: DerivedId) -> StoreResult<Option<DerivedArtifact>>;

    async fn get_derived_by_source(
        &self,
        source_id: SourceId,
        language: &str,
    ) -> StoreResult<Option<DerivedArtifact>>;

    /// 插入派生制品；(`source_id`, `language`) 已存在或源不存在时失败
    async fn insert_derived(&self, artifact: NewDerivedArtifact) -> StoreResult<DerivedArtifact>;

    async fn list_derived(
        &self,
        page: Page,
        filter: &DerivedFilter,
    ) -> StoreResult<Vec<DerivedArtifact>>;

    async fn count_derived(&self, filter: &DerivedFilter) -> StoreResult<usize>;
}

pub type SharedStore = Arc<dyn ArtifactStore>;

/// 按配置打开存储后端
pub async fn open_store(config: &AppConfig) -> StoreResult<SharedStore> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::info!("using in-memory artifact store");
            Ok(Arc::new(MemoryArtifactStore::new()))
        }
        StoreBackend::Redb => {
            let path = config.store.path.clone();
            tracing::info!(path = %path.display(), "using redb artifact store");
            let store = tokio::task::spawn_blocking(move || RedbArtifactStore::open(path))
                .await
                .map_err(|e| StoreError::Backend(format!("blocking task failed: {}", e)))??;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "web")]
        StoreBackend::MongoDb => {
            let store =
                MongoArtifactStore::connect(&config.mongodb.url, &config.mongodb.database).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "web"))]
        StoreBackend::MongoDb => Err(StoreError::Backend(
            "the mongodb backend requires the `web` feature".to_string(),
        )),
    }
}
