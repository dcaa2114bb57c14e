//! # Pagelingo Library
//!
//! 抓取网页、翻译为双语 Markdown，并按"获取或生成"的方式缓存结果。
//! 同一 URL 只抓取一次，同一 (源, 语言) 只翻译一次，并发请求共享同一次生产。
//!
//! ## 模块组织
//!
//! - `orchestrator` - 获取或生成流程的入口
//! - `store` - 制品存储（内存、redb、MongoDB）
//! - `provider` - 抓取器和翻译器接口及默认实现
//! - `writer` - 结果写入（文件镜像 + 存储记录）
//! - `gate` - 按键的并发许可
//! - `title` / `sink` - 标题推导、代码围栏剥离和输出路径
//! - `feed` - 已抓取内容的 RSS 订阅源
//! - `config` / `env` - 配置文件与环境变量
//! - `web` - Web 服务器功能（可选）

pub mod artifact;
pub mod config;
pub mod env;
pub mod error;
pub mod feed;
pub mod gate;
#[cfg(any(feature = "cli", feature = "web"))]
pub mod logging;
pub mod orchestrator;
pub mod provider;
pub mod sink;
pub mod store;
pub mod title;
#[cfg(feature = "web")]
pub mod web;
pub mod writer;

// Re-export commonly used items for convenience
pub use artifact::{
    DerivedArtifact, DerivedId, Metadata, ResolvedTranslation, SourceArtifact, SourceId,
};
pub use config::AppConfig;
pub use error::{ErrorKind, PipelineError, PipelineResult, ProviderError, StoreError};
pub use orchestrator::{Orchestrator, ResolveRequest};
pub use store::{open_store, ArtifactStore, SharedStore};
