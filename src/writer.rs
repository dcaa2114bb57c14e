//! 译文结果写入
//!
//! 先写外部镜像，再插入存储记录。镜像写入失败时不会产生记录；
//! 记录插入失败（并发竞争除外）时尽力删除刚写入的文件。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::artifact::{
    DerivedArtifact, Metadata, NewDerivedArtifact, SourceId, OUTPUT_FILE_PATH_KEY, TITLE_KEY,
};
use crate::error::{PipelineError, PipelineResult, StoreError};
use crate::sink::{output_path, strip_code_fences, Sink};
use crate::store::SharedStore;

/// 一次写入所需的全部输入
#[derive(Debug, Clone)]
pub struct WriteRequest<'a> {
    pub source_id: SourceId,
    pub language: &'a str,
    pub text: &'a str,
    pub title: &'a str,
    pub persist_to_sink: bool,
}

/// 写入结果
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenResult {
    pub derived: DerivedArtifact,
    pub output_file_path: Option<PathBuf>,
    /// 记录已被其他生产者插入，返回的是已有记录
    pub raced: bool,
}

/// 结果写入器
#[derive(Clone)]
pub struct ResultWriter {
    store: SharedStore,
    sink: Arc<dyn Sink>,
    output_dir: PathBuf,
}

impl ResultWriter {
    pub fn new(store: SharedStore, sink: Arc<dyn Sink>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            sink,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 清理文本、写镜像、插入记录
    pub async fn persist(&self, request: WriteRequest<'_>) -> PipelineResult<WrittenResult> {
        let content = strip_code_fences(request.text);

        let written_path = if request.persist_to_sink {
            let path = output_path(&self.output_dir, request.title);
            self.sink
                .write(&path, &content)
                .await
                .map_err(|e| PipelineError::SinkWriteFailed {
                    path: path.clone(),
                    cause: e.to_string(),
                })?;
            tracing::debug!(path = %path.display(), "wrote translation to sink");
            Some(path)
        } else {
            None
        };

        let mut metadata = Metadata::new();
        metadata.insert(
            OUTPUT_FILE_PATH_KEY.to_string(),
            written_path
                .as_ref()
                .map_or(Value::Null, |path| Value::String(path.display().to_string())),
        );
        metadata.insert(TITLE_KEY.to_string(), Value::String(request.title.to_string()));

        let insert = self
            .store
            .insert_derived(NewDerivedArtifact {
                source_id: request.source_id,
                language: request.language.to_string(),
                text: content,
                metadata: Some(metadata),
            })
            .await;

        match insert {
            Ok(derived) => {
                metrics::counter!("pagelingo_derived_written_total").increment(1);
                Ok(WrittenResult {
                    derived,
                    output_file_path: written_path,
                    raced: false,
                })
            }
            Err(error) if error.is_constraint_violation() => {
                self.recover_race(request.source_id, request.language, written_path)
                    .await
            }
            Err(error) => {
                if let Some(path) = &written_path {
                    self.discard(path).await;
                }
                Err(error.into())
            }
        }
    }

    /// 另一个生产者先插入了记录：返回已有记录
    async fn recover_race(
        &self,
        source_id: SourceId,
        language: &str,
        written_path: Option<PathBuf>,
    ) -> PipelineResult<WrittenResult> {
        let existing = self
            .store
            .get_derived_by_source(source_id, language)
            .await?
            .ok_or_else(|| {
                StoreError::Backend(format!(
                    "derived record {}:{} vanished after constraint violation",
                    source_id, language
                ))
            })?;

        let existing_path = existing.output_file_path();
        if let Some(path) = written_path {
            if existing_path.as_deref() == Some(path.as_path()) {
                // 本次写入覆盖了胜出者的镜像，恢复为记录中的文本
                self.sink
                    .write(&path, &existing.text)
                    .await
                    .map_err(|e| PipelineError::SinkWriteFailed {
                        path: path.clone(),
                        cause: e.to_string(),
                    })?;
            } else {
                self.discard(&path).await;
            }
        }

        tracing::info!(%source_id, language, "derived record produced concurrently, reusing it");
        metrics::counter!("pagelingo_race_recoveries_total", "record" => "derived").increment(1);

        Ok(WrittenResult {
            derived: existing,
            output_file_path: existing_path,
            raced: true,
        })
    }

    async fn discard(&self, path: &Path) {
        if let Err(e) = self.sink.remove(path).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove orphaned output file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::NewSourceArtifact;
    use crate::sink::FsSink;
    use crate::store::{ArtifactStore, MemoryArtifactStore};
    use async_trait::async_trait;
    use std::io;

    struct BrokenSink;

    #[async_trait]
    impl Sink for BrokenSink {
        async fn write(&self, _path: &Path, _content: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }

        async fn remove(&self, _path: &Path) -> io::Result<()> {
            Ok(())
        }
    }

    async fn store_with_source() -> (Arc<MemoryArtifactStore>, SourceId) {
        let store = Arc::new(MemoryArtifactStore::new());
        let source = store
            .insert_source(NewSourceArtifact {
                url: "https://example.com/a".to_string(),
                text: "Hello".to_string(),
                metadata: None,
            })
            .await
            .unwrap();
        (store, source.id)
    }

    fn request(source_id: SourceId, persist_to_sink: bool) -> WriteRequest<'static> {
        WriteRequest {
            source_id,
            language: "Spanish",
            text: "```markdown\nHola\n```",
            title: "example.com/a",
            persist_to_sink,
        }
    }

    #[tokio::test]
    async fn test_persist_writes_file_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let (store, source_id) = store_with_source().await;
        let writer = ResultWriter::new(store.clone(), Arc::new(FsSink), dir.path());

        let written = writer.persist(request(source_id, true)).await.unwrap();
        let expected = dir.path().join("example.com/a.md");

        assert_eq!(written.output_file_path.as_deref(), Some(expected.as_path()));
        assert_eq!(std::fs::read_to_string(&expected).unwrap(), "Hola\n");
        assert_eq!(written.derived.text, "Hola\n");
        assert_eq!(written.derived.output_file_path(), Some(expected));
        assert_eq!(written.derived.title(), Some("example.com/a"));
        assert!(!written.raced);
    }

    #[tokio::test]
    async fn test_persist_without_sink_records_null_path() {
        let dir = tempfile::tempdir().unwrap();
        let (store, source_id) = store_with_source().await;
        let writer = ResultWriter::new(store, Arc::new(FsSink), dir.path());

        let written = writer.persist(request(source_id, false)).await.unwrap();
        assert!(written.output_file_path.is_none());
        assert_eq!(
            written.derived.metadata.as_ref().unwrap()[OUTPUT_FILE_PATH_KEY],
            Value::Null
        );
        assert!(!dir.path().join("example.com").exists());
    }

    #[tokio::test]
    async fn test_sink_failure_leaves_no_record() {
        let (store, source_id) = store_with_source().await;
        let writer = ResultWriter::new(store.clone(), Arc::new(BrokenSink), "/unused");

        let error = writer.persist(request(source_id, true)).await.unwrap_err();
        assert!(matches!(error, PipelineError::SinkWriteFailed { .. }));
        assert!(store
            .get_derived_by_source(source_id, "Spanish")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_constraint_violation_returns_existing() {
        let dir = tempfile::tempdir().unwrap();
        let (store, source_id) = store_with_source().await;
        let writer = ResultWriter::new(store, Arc::new(FsSink), dir.path());

        let first = writer.persist(request(source_id, true)).await.unwrap();
        let second = writer.persist(request(source_id, true)).await.unwrap();

        assert!(second.raced);
        assert_eq!(second.derived.id, first.derived.id);
        // 同一路径属于胜出的记录，不能被删除
        assert!(dir.path().join("example.com/a.md").exists());
    }

    #[tokio::test]
    async fn test_lost_race_restores_winner_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let (store, source_id) = store_with_source().await;
        let path = dir.path().join("example.com/a.md");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "Ganador\n").unwrap();

        let mut metadata = Metadata::new();
        metadata.insert(
            OUTPUT_FILE_PATH_KEY.to_string(),
            Value::String(path.display().to_string()),
        );
        let winner = store
            .insert_derived(NewDerivedArtifact {
                source_id,
                language: "Spanish".to_string(),
                text: "Ganador\n".to_string(),
                metadata: Some(metadata),
            })
            .await
            .unwrap();

        let writer = ResultWriter::new(store, Arc::new(FsSink), dir.path());
        let written = writer.persist(request(source_id, true)).await.unwrap();

        assert!(written.raced);
        assert_eq!(written.derived.id, winner.id);
        assert_eq!(written.output_file_path.as_deref(), Some(path.as_path()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), written.derived.text);
    }

    #[tokio::test]
    async fn test_failed_insert_removes_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryArtifactStore::new());
        let writer = ResultWriter::new(store, Arc::new(FsSink), dir.path());

        let error = writer.persist(request(SourceId(42), true)).await.unwrap_err();
        assert!(matches!(
            error,
            PipelineError::Store(StoreError::MissingSource(SourceId(42)))
        ));
        assert!(!dir.path().join("example.com/a.md").exists());
    }
}
