//! 外部协作者
//!
//! 编排器只依赖这里的两个 trait；抓取和翻译的具体算法不属于核心流水线。
//!
//! # 模块组织
//!
//! - `extract` - 从 HTML 中提取正文和元数据
//! - `http` - 基于 reqwest 的默认抓取器
//! - `chat` - OpenAI 兼容接口的默认翻译器

pub mod chat;
pub mod extract;
pub mod http;

use std::sync::Arc;

use async_trait::async_trait;

use crate::artifact::Metadata;
use crate::error::ProviderResult;

pub use chat::ChatTranslationProvider;
pub use http::HttpSourceProvider;

/// 抓取结果：提取后的文本和页面元数据
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedPage {
    pub text: String,
    pub metadata: Option<Metadata>,
}

/// 页面抓取器
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// 抓取并提取页面内容
    ///
    /// `allow_cache` 只影响抓取器自己的缓存，与制品存储无关。
    async fn fetch(&self, url: &str, allow_cache: bool) -> ProviderResult<FetchedPage>;
}

/// 翻译器
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate(&self, text: &str, language: &str) -> ProviderResult<String>;
}

pub type SharedSourceProvider = Arc<dyn SourceProvider>;
pub type SharedTranslationProvider = Arc<dyn TranslationProvider>;
