//! Web 模块的数据类型定义

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::artifact::{DerivedId, Metadata, ResolvedTranslation, SourceId};
use crate::error::PipelineError;
use crate::orchestrator::{Orchestrator, ResolveRequest};
use crate::feed::FeedChannel;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub feed_channel: FeedChannel,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            feed_channel: FeedChannel::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// 翻译请求
#[derive(Debug, Clone, Deserialize)]
pub struct TranslateRequestInput {
    pub url: String,
    #[serde(default)]
    pub language: Option<String>,
    /// 是否允许抓取器使用缓存
    #[serde(default = "default_true")]
    pub cache: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub save_to_disk: Option<bool>,
}

impl From<TranslateRequestInput> for ResolveRequest {
    fn from(input: TranslateRequestInput) -> Self {
        ResolveRequest {
            url: input.url,
            language: input.language,
            allow_cache: input.cache,
            title: input.title,
            persist_to_sink: input.save_to_disk,
        }
    }
}

/// 响应中的元数据部分
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TranslationMetadata {
    pub output_file_path: Option<PathBuf>,
    pub crawled_metadata: Option<Metadata>,
    pub title: Option<String>,
}

/// 翻译结果
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TranslationData {
    pub translation_id: DerivedId,
    pub source_id: SourceId,
    pub language: String,
    pub content: String,
    pub from_store: bool,
    pub metadata: TranslationMetadata,
}

impl From<ResolvedTranslation> for TranslationData {
    fn from(resolved: ResolvedTranslation) -> Self {
        let title = resolved.derived.title().map(str::to_string);
        Self {
            translation_id: resolved.derived.id,
            source_id: resolved.source_id,
            language: resolved.derived.language,
            content: resolved.derived.text,
            from_store: resolved.from_store,
            metadata: TranslationMetadata {
                output_file_path: resolved.output_file_path,
                crawled_metadata: resolved.source_metadata,
                title,
            },
        }
    }
}

/// 错误详情
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// 统一响应信封 `{success, error, data}`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub error: Option<ErrorBody>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn failure(error: &PipelineError) -> Self {
        Self {
            success: false,
            error: Some(ErrorBody {
                kind: error.kind().to_string(),
                message: error.to_string(),
            }),
            data: None,
        }
    }
}

/// 健康检查响应
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub default_language: String,
}
