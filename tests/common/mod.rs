// 集成测试公共模块
//
// 提供可计数的抓取器/翻译器替身和测试环境

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use pagelingo::artifact::{
    DerivedArtifact, DerivedId, Metadata, NewDerivedArtifact, NewSourceArtifact, SourceArtifact,
    SourceId,
};
use pagelingo::config::PipelineConfig;
use pagelingo::error::{ProviderError, ProviderResult, StoreResult};
use pagelingo::orchestrator::Orchestrator;
use pagelingo::provider::{FetchedPage, SourceProvider, TranslationProvider};
use pagelingo::sink::FsSink;
use pagelingo::store::{
    ArtifactStore, DerivedFilter, MemoryArtifactStore, Page, SharedStore, SourceFilter,
};

/// 抓取器替身的行为
#[derive(Debug, Clone)]
pub enum FetchBehavior {
    /// 返回固定 Markdown，带 `description` 元数据
    Page,
    /// 返回空内容
    Empty,
    /// 返回错误
    Fail,
}

/// 计数抓取器，可选延迟，便于制造并发重叠
pub struct StubFetcher {
    pub calls: AtomicUsize,
    pub cached_calls: AtomicUsize,
    behavior: FetchBehavior,
    delay: Duration,
}

impl StubFetcher {
    pub fn new(behavior: FetchBehavior) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            cached_calls: AtomicUsize::new(0),
            behavior,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cached_calls(&self) -> usize {
        self.cached_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceProvider for StubFetcher {
    async fn fetch(&self, url: &str, allow_cache: bool) -> ProviderResult<FetchedPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if allow_cache {
            self.cached_calls.fetch_add(1, Ordering::SeqCst);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.behavior {
            FetchBehavior::Page => {
                let mut metadata = Metadata::new();
                metadata.insert("description".to_string(), json!(format!("Page at {}", url)));
                Ok(FetchedPage {
                    text: format!("# Heading\n\nBody of {}\n", url),
                    metadata: Some(metadata),
                })
            }
            FetchBehavior::Empty => Ok(FetchedPage {
                text: "   \n".to_string(),
                metadata: None,
            }),
            FetchBehavior::Fail => Err(ProviderError::Request("connection refused".to_string())),
        }
    }
}

/// 翻译器替身的行为
#[derive(Debug, Clone)]
pub enum TranslateBehavior {
    /// `[语言] 原文`
    Tag,
    /// 用 ```markdown 围栏包裹输出
    Fenced,
    Empty,
    Fail,
}

pub struct StubTranslator {
    pub calls: AtomicUsize,
    behavior: TranslateBehavior,
    delay: Duration,
}

impl StubTranslator {
    pub fn new(behavior: TranslateBehavior) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            behavior,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for StubTranslator {
    async fn translate(&self, text: &str, language: &str) -> ProviderResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.behavior {
            TranslateBehavior::Tag => Ok(format!("[{}] {}", language, text)),
            TranslateBehavior::Fenced => Ok(format!("```markdown\n[{}] {}```", language, text)),
            TranslateBehavior::Empty => Ok(String::new()),
            TranslateBehavior::Fail => Err(ProviderError::Timeout("model overloaded".to_string())),
        }
    }
}

/// 包装一个存储：前 `blind` 次按 (源, 语言) 查询返回空，
/// 让调用方走到插入一步，从而触发唯一约束冲突。
/// `with_blind_sources` 对按 URL 的查询做同样的事。
pub struct BlindLookupStore {
    pub inner: MemoryArtifactStore,
    remaining_blind: AtomicUsize,
    remaining_blind_sources: AtomicUsize,
}

impl BlindLookupStore {
    pub fn new(blind: usize) -> Self {
        Self {
            inner: MemoryArtifactStore::new(),
            remaining_blind: AtomicUsize::new(blind),
            remaining_blind_sources: AtomicUsize::new(0),
        }
    }

    pub fn with_blind_sources(self, blind: usize) -> Self {
        self.remaining_blind_sources.store(blind, Ordering::SeqCst);
        self
    }
}

fn take_blind(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ArtifactStore for BlindLookupStore {
    async fn get_source(&self, id: SourceId) -> StoreResult<Option<SourceArtifact>> {
        self.inner.get_source(id).await
    }

    async fn get_source_by_url(&self, url: &str) -> StoreResult<Option<SourceArtifact>> {
        if take_blind(&self.remaining_blind_sources) {
            return Ok(None);
        }
        self.inner.get_source_by_url(url).await
    }

    async fn insert_source(&self, artifact: NewSourceArtifact) -> StoreResult<SourceArtifact> {
        self.inner.insert_source(artifact).await
    }

    async fn list_sources(
        &self,
        page: Page,
        filter: &SourceFilter,
    ) -> StoreResult<Vec<SourceArtifact>> {
        self.inner.list_sources(page, filter).await
    }

    async fn count_sources(&self, filter: &SourceFilter) -> StoreResult<usize> {
        self.inner.count_sources(filter).await
    }

    async fn get_derived(&self, id: DerivedId) -> StoreResult<Option<DerivedArtifact>> {
        self.inner.get_derived(id).await
    }

    async fn get_derived_by_source(
        &self,
        source_id: SourceId,
        language: &str,
    ) -> StoreResult<Option<DerivedArtifact>> {
        if take_blind(&self.remaining_blind) {
            return Ok(None);
        }
        self.inner.get_derived_by_source(source_id, language).await
    }

    async fn insert_derived(&self, artifact: NewDerivedArtifact) -> StoreResult<DerivedArtifact> {
        self.inner.insert_derived(artifact).await
    }

    async fn list_derived(
        &self,
        page: Page,
        filter: &DerivedFilter,
    ) -> StoreResult<Vec<DerivedArtifact>> {
        self.inner.list_derived(page, filter).await
    }

    async fn count_derived(&self, filter: &DerivedFilter) -> StoreResult<usize> {
        self.inner.count_derived(filter).await
    }
}

/// 测试环境：临时输出目录 + 存储 + 计数替身
pub struct TestEnvironment {
    pub output_dir: TempDir,
    pub store: SharedStore,
    pub fetcher: Arc<StubFetcher>,
    pub translator: Arc<StubTranslator>,
    pub orchestrator: Orchestrator,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(MemoryArtifactStore::new()),
            StubFetcher::new(FetchBehavior::Page),
            StubTranslator::new(TranslateBehavior::Tag),
        )
    }

    pub fn with_parts(
        store: SharedStore,
        fetcher: StubFetcher,
        translator: StubTranslator,
    ) -> Self {
        let output_dir = tempfile::tempdir().expect("create temp dir");
        let fetcher = Arc::new(fetcher);
        let translator = Arc::new(translator);
        let config = PipelineConfig {
            output_dir: output_dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let orchestrator = Orchestrator::new(
            store.clone(),
            fetcher.clone(),
            translator.clone(),
            Arc::new(FsSink),
            &config,
        );

        Self {
            output_dir,
            store,
            fetcher,
            translator,
            orchestrator,
        }
    }

    pub fn out(&self) -> &Path {
        self.output_dir.path()
    }

    pub fn out_path(&self, relative: &str) -> PathBuf {
        self.output_dir.path().join(relative)
    }

    /// 输出目录下的所有文件（递归）
    pub fn written_files(&self) -> Vec<PathBuf> {
        fn walk(dir: &Path, files: &mut Vec<PathBuf>) {
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_dir() {
                        walk(&path, files);
                    } else {
                        files.push(path);
                    }
                }
            }
        }

        let mut files = Vec::new();
        walk(self.output_dir.path(), &mut files);
        files.sort();
        files
    }
}
