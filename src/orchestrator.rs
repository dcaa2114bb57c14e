//! 获取或生产编排器
//!
//! 对一个 (URL, 目标语言) 请求，决定是否抓取、是否翻译，并保证同一个键
//! 在进程内同时只有一个生产者：
//!
//! 1. 按 URL 查询源制品；未命中时在源键的许可下抓取并插入。
//! 2. 按 (源 id, 语言) 查询派生制品；未命中时在派生键的许可下翻译并通过
//!    [`ResultWriter`] 写入。
//!
//! 等待许可的调用方拿到许可后会重新查询存储，而不是重复调用外部协作者。
//! 插入时的唯一约束冲突被视为"已由别人生产"，通过按键重新读取来解决。
//! 生产过程运行在独立任务上，调用方放弃等待不会中断生产。

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::artifact::{
    DerivedArtifact, DerivedId, DerivedKey, NewSourceArtifact, ResolvedTranslation,
    SourceArtifact,
};
use crate::config::{AppConfig, PipelineConfig};
use crate::error::{PipelineError, PipelineResult, ProviderError, ProviderResult, StoreError};
use crate::gate::KeyedGate;
use crate::provider::{
    ChatTranslationProvider, HttpSourceProvider, SharedSourceProvider, SharedTranslationProvider,
};
use crate::sink::{FsSink, Sink};
use crate::store::SharedStore;
use crate::title::derive_title;
use crate::writer::{ResultWriter, WriteRequest};

/// 一次解析请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub url: String,
    /// 目标语言；为空时使用配置的默认语言
    pub language: Option<String>,
    /// 是否允许抓取器使用自己的缓存（不影响存储查询）
    pub allow_cache: bool,
    /// 显式标题，决定镜像文件名
    pub title: Option<String>,
    /// 是否写出镜像文件；为空时使用配置值
    pub persist_to_sink: Option<bool>,
}

impl ResolveRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            language: None,
            allow_cache: true,
            title: None,
            persist_to_sink: None,
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn allow_cache(mut self, allow_cache: bool) -> Self {
        self.allow_cache = allow_cache;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn persist_to_sink(mut self, persist: bool) -> Self {
        self.persist_to_sink = Some(persist);
        self
    }
}

/// 派生阶段的结果
struct DerivedOutcome {
    derived: DerivedArtifact,
    output_file_path: Option<PathBuf>,
    from_store: bool,
}

impl DerivedOutcome {
    fn existing(derived: DerivedArtifact) -> Self {
        Self {
            output_file_path: derived.output_file_path(),
            derived,
            from_store: true,
        }
    }
}

struct Inner {
    store: SharedStore,
    fetcher: SharedSourceProvider,
    translator: SharedTranslationProvider,
    writer: ResultWriter,
    source_gate: KeyedGate<String>,
    derived_gate: KeyedGate<DerivedKey>,
    default_language: String,
    persist_to_sink: bool,
}

/// 编排器，克隆后共享同一组协作者和许可表
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        store: SharedStore,
        fetcher: SharedSourceProvider,
        translator: SharedTranslationProvider,
        sink: Arc<dyn Sink>,
        config: &PipelineConfig,
    ) -> Self {
        let writer = ResultWriter::new(store.clone(), sink, config.output_dir.clone());
        Self {
            inner: Arc::new(Inner {
                store,
                fetcher,
                translator,
                writer,
                source_gate: KeyedGate::new(),
                derived_gate: KeyedGate::new(),
                default_language: config.default_language.clone(),
                persist_to_sink: config.persist_to_sink,
            }),
        }
    }

    /// 使用默认协作者（HTTP 抓取、聊天补全翻译、本地文件镜像）
    pub fn with_default_providers(store: SharedStore, config: &AppConfig) -> ProviderResult<Self> {
        let fetcher = Arc::new(HttpSourceProvider::new(&config.fetch)?);
        let translator = Arc::new(ChatTranslationProvider::new(&config.translation)?);
        if config.translation.api_key.is_none() {
            tracing::warn!("no translation API key configured, requests may be rejected");
        }
        Ok(Self::new(
            store,
            fetcher,
            translator,
            Arc::new(FsSink),
            &config.pipeline,
        ))
    }

    pub fn store(&self) -> &SharedStore {
        &self.inner.store
    }

    pub fn default_language(&self) -> &str {
        &self.inner.default_language
    }

    /// 获取或抓取源制品，返回值的第二项表示本次是否新抓取
    pub async fn resolve_source(
        &self,
        url: &str,
        allow_cache: bool,
    ) -> PipelineResult<(SourceArtifact, bool)> {
        let url = validate_url(url)?;
        let inner = Arc::clone(&self.inner);
        run_detached(async move { inner.resolve_source(url, allow_cache).await }).await
    }

    /// 获取或翻译派生制品
    pub async fn resolve_derived(
        &self,
        source: &SourceArtifact,
        language: Option<&str>,
    ) -> PipelineResult<DerivedArtifact> {
        let language = self.inner.resolve_language(language)?;
        if self.inner.store.get_source(source.id).await?.is_none() {
            return Err(PipelineError::InvalidInput(format!(
                "source artifact {} is not persisted",
                source.id
            )));
        }

        let inner = Arc::clone(&self.inner);
        let source = source.clone();
        let persist = inner.persist_to_sink;
        let outcome = run_detached(async move {
            inner
                .resolve_derived(&source, &language, false, None, persist)
                .await
        })
        .await?;
        Ok(outcome.derived)
    }

    /// 完整流程：源制品、派生制品、镜像引用
    pub async fn resolve(&self, request: ResolveRequest) -> PipelineResult<ResolvedTranslation> {
        let url = validate_url(&request.url)?;
        let language = self.inner.resolve_language(request.language.as_deref())?;
        let title = request
            .title
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty());
        let persist = request
            .persist_to_sink
            .unwrap_or(self.inner.persist_to_sink);
        let allow_cache = request.allow_cache;

        let inner = Arc::clone(&self.inner);
        run_detached(async move {
            let (source, fresh) = inner.resolve_source(url, allow_cache).await?;
            let outcome = inner
                .resolve_derived(&source, &language, fresh, title.as_deref(), persist)
                .await?;

            tracing::info!(
                source_id = %source.id,
                derived_id = %outcome.derived.id,
                language = %language,
                from_store = outcome.from_store,
                "resolved translation"
            );

            Ok(ResolvedTranslation {
                derived: outcome.derived,
                source_id: source.id,
                source_metadata: source.metadata,
                output_file_path: outcome.output_file_path,
                from_store: outcome.from_store,
            })
        })
        .await
    }

    /// 按 id 读取已有结果，不会触发任何生产
    pub async fn get_existing(&self, id: DerivedId) -> PipelineResult<ResolvedTranslation> {
        let derived = self
            .inner
            .store
            .get_derived(id)
            .await?
            .ok_or(PipelineError::NotFound(id))?;
        let source = self.inner.store.get_source(derived.source_id).await?;

        Ok(ResolvedTranslation {
            source_id: derived.source_id,
            source_metadata: source.and_then(|source| source.metadata),
            output_file_path: derived.output_file_path(),
            derived,
            from_store: true,
        })
    }
}

impl Inner {
    fn resolve_language(&self, language: Option<&str>) -> PipelineResult<String> {
        match language {
            None => Ok(self.default_language.clone()),
            Some(language) => {
                let language = language.trim();
                if language.is_empty() {
                    Err(PipelineError::InvalidInput(
                        "language cannot be empty".to_string(),
                    ))
                } else {
                    Ok(language.to_string())
                }
            }
        }
    }

    async fn resolve_source(
        &self,
        url: String,
        allow_cache: bool,
    ) -> PipelineResult<(SourceArtifact, bool)> {
        if let Some(source) = self.store.get_source_by_url(&url).await? {
            tracing::debug!(url = %url, source_id = %source.id, "source found in store");
            metrics::counter!("pagelingo_store_hits_total", "record" => "source").increment(1);
            return Ok((source, false));
        }

        let _permit = self.source_gate.acquire(url.clone()).await;

        // 等待期间可能已有其他调用方完成了抓取
        if let Some(source) = self.store.get_source_by_url(&url).await? {
            tracing::debug!(url = %url, source_id = %source.id, "source produced by concurrent caller");
            metrics::counter!("pagelingo_store_hits_total", "record" => "source").increment(1);
            return Ok((source, false));
        }

        tracing::info!(url = %url, allow_cache, "fetching source");
        metrics::counter!("pagelingo_fetches_total").increment(1);
        let page = self
            .fetcher
            .fetch(&url, allow_cache)
            .await
            .map_err(|e| {
                tracing::warn!(url = %url, error = %e, "fetch failed");
                PipelineError::fetch_failed(&url, e)
            })?;

        if page.text.trim().is_empty() {
            tracing::warn!(url = %url, "fetch returned no content");
            return Err(PipelineError::fetch_failed(&url, ProviderError::EmptyContent));
        }

        let inserted = self
            .store
            .insert_source(NewSourceArtifact {
                url: url.clone(),
                text: page.text,
                metadata: page.metadata,
            })
            .await;

        match inserted {
            Ok(source) => {
                tracing::info!(url = %url, source_id = %source.id, "stored fresh source");
                Ok((source, true))
            }
            Err(error) if error.is_constraint_violation() => {
                let source = self.store.get_source_by_url(&url).await?.ok_or_else(|| {
                    StoreError::Backend(format!(
                        "source {} vanished after constraint violation",
                        url
                    ))
                })?;
                tracing::info!(url = %url, source_id = %source.id, "source produced concurrently, reusing it");
                metrics::counter!("pagelingo_race_recoveries_total", "record" => "source")
                    .increment(1);
                Ok((source, false))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn resolve_derived(
        &self,
        source: &SourceArtifact,
        language: &str,
        skip_lookup: bool,
        title: Option<&str>,
        persist_to_sink: bool,
    ) -> PipelineResult<DerivedOutcome> {
        // 刚抓取的源不可能已有译文
        if !skip_lookup {
            if let Some(derived) = self.store.get_derived_by_source(source.id, language).await? {
                tracing::debug!(source_id = %source.id, language, derived_id = %derived.id, "translation found in store");
                metrics::counter!("pagelingo_store_hits_total", "record" => "derived").increment(1);
                return Ok(DerivedOutcome::existing(derived));
            }
        }

        let _permit = self
            .derived_gate
            .acquire(DerivedKey::new(source.id, language))
            .await;

        if let Some(derived) = self.store.get_derived_by_source(source.id, language).await? {
            tracing::debug!(source_id = %source.id, language, "translation produced by concurrent caller");
            metrics::counter!("pagelingo_store_hits_total", "record" => "derived").increment(1);
            return Ok(DerivedOutcome::existing(derived));
        }

        tracing::info!(source_id = %source.id, language, chars = source.text.len(), "translating source");
        metrics::counter!("pagelingo_translations_total").increment(1);
        let translated = self
            .translator
            .translate(&source.text, language)
            .await
            .map_err(|e| {
                tracing::warn!(source_id = %source.id, language, error = %e, "translation failed");
                PipelineError::translation_failed(source.id, language, e)
            })?;

        if translated.trim().is_empty() {
            tracing::warn!(source_id = %source.id, language, "translation returned no content");
            return Err(PipelineError::translation_failed(
                source.id,
                language,
                ProviderError::EmptyContent,
            ));
        }

        let title = match title {
            Some(title) => title.to_string(),
            None => derive_title(&source.url, source.metadata.as_ref()),
        };

        let written = self
            .writer
            .persist(WriteRequest {
                source_id: source.id,
                language,
                text: &translated,
                title: &title,
                persist_to_sink,
            })
            .await?;

        Ok(DerivedOutcome {
            derived: written.derived,
            output_file_path: written.output_file_path,
            from_store: written.raced,
        })
    }
}

/// 校验 URL 并返回规范形式
pub fn validate_url(url: &str) -> PipelineResult<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(PipelineError::InvalidInput("url cannot be empty".to_string()));
    }

    let parsed = url::Url::parse(url)
        .map_err(|e| PipelineError::InvalidInput(format!("invalid url '{}': {}", url, e)))?;
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(PipelineError::InvalidInput(format!(
            "url '{}' has no host",
            url
        )));
    }
    Ok(parsed.to_string())
}

/// 在独立任务上运行生产过程，调用方被取消时生产照常完成
async fn run_detached<T, F>(future: F) -> PipelineResult<T>
where
    F: Future<Output = PipelineResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(future)
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?
}
