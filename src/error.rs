//! 流水线统一错误处理
//!
//! 提供结构化错误类型：调用方拿到的每个失败都带有错误类别、
//! 可读消息以及足够的上下文（URL、语言、底层原因）用于记录日志和决定是否重试。

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::artifact::{DerivedId, SourceId};

/// 存储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// 唯一约束冲突（并发插入同一个键）
    #[error("unique constraint violated on {record} ({key})")]
    ConstraintViolation { record: &'static str, key: String },

    /// 派生制品引用了不存在的源制品
    #[error("source artifact {0} does not exist")]
    MissingSource(SourceId),

    /// 后端错误（数据库、文件、连接）
    #[error("store backend error: {0}")]
    Backend(String),

    /// 记录编码/解码错误
    #[error("record serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Serialization(error.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 外部协作者（抓取器、翻译器）报告的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("provider returned empty content")]
    EmptyContent,
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ProviderError::Timeout(error.to_string())
        } else if error.is_decode() {
            ProviderError::InvalidResponse(error.to_string())
        } else {
            ProviderError::Request(error.to_string())
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// 编排器对外暴露的错误
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// 输入验证错误
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 抓取失败或抓取到空内容
    #[error("failed to fetch {url}: {cause}")]
    FetchFailed { url: String, cause: String },

    /// 翻译失败或翻译结果为空
    #[error("failed to translate source {source_id} into {language}: {cause}")]
    TranslationFailed {
        source_id: SourceId,
        language: String,
        cause: String,
    },

    /// 外部镜像写入失败
    #[error("failed to write {}: {cause}", path.display())]
    SinkWriteFailed { path: PathBuf, cause: String },

    /// 查询的记录不存在
    #[error("translation {0} not found")]
    NotFound(DerivedId),

    /// 存储错误（约束冲突除外，它在内部处理）
    #[error(transparent)]
    Store(#[from] StoreError),

    /// 后台生产任务异常终止
    #[error("background task failed: {0}")]
    Task(String),
}

/// 错误类别，供调用方按类别处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    FetchFailed,
    TranslationFailed,
    SinkWriteFailed,
    NotFound,
    Store,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::FetchFailed => "fetch_failed",
            ErrorKind::TranslationFailed => "translation_failed",
            ErrorKind::SinkWriteFailed => "sink_write_failed",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Store => "store",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    /// 获取错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidInput(_) => ErrorKind::InvalidInput,
            PipelineError::FetchFailed { .. } => ErrorKind::FetchFailed,
            PipelineError::TranslationFailed { .. } => ErrorKind::TranslationFailed,
            PipelineError::SinkWriteFailed { .. } => ErrorKind::SinkWriteFailed,
            PipelineError::NotFound(_) => ErrorKind::NotFound,
            PipelineError::Store(_) => ErrorKind::Store,
            PipelineError::Task(_) => ErrorKind::Internal,
        }
    }

    /// 检查错误是否可由调用方重试
    ///
    /// 编排器自身从不自动重试，重试策略属于调用方。
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::FetchFailed { .. } => true,
            PipelineError::TranslationFailed { .. } => true,
            PipelineError::SinkWriteFailed { .. } => true,
            PipelineError::Store(StoreError::Backend(_)) => true,
            PipelineError::Store(_) => false,
            PipelineError::InvalidInput(_) => false,
            PipelineError::NotFound(_) => false,
            PipelineError::Task(_) => false,
        }
    }

    pub(crate) fn fetch_failed(url: &str, cause: impl fmt::Display) -> Self {
        PipelineError::FetchFailed {
            url: url.to_string(),
            cause: cause.to_string(),
        }
    }

    pub(crate) fn translation_failed(
        source_id: SourceId,
        language: &str,
        cause: impl fmt::Display,
    ) -> Self {
        PipelineError::TranslationFailed {
            source_id,
            language: language.to_string(),
            cause: cause.to_string(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
