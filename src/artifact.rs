//! 制品数据模型
//!
//! - `SourceArtifact`：一个 URL 对应的抓取结果（提取文本 + 页面元数据）
//! - `DerivedArtifact`：一个 (SourceArtifact, 语言) 对应的翻译结果
//!
//! 两类记录都只在首次生产时插入，之后不会再被修改。

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 元数据：字符串键到任意 JSON 值的映射
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// 译文镜像文件路径在元数据中的键
pub const OUTPUT_FILE_PATH_KEY: &str = "output_file_path";
/// 译文标题在元数据中的键
pub const TITLE_KEY: &str = "title";

macro_rules! artifact_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map($name)
            }
        }
    };
}

artifact_id!(SourceId);
artifact_id!(DerivedId);

/// 抓取得到的源制品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceArtifact {
    pub id: SourceId,
    pub url: String,
    pub text: String,
    pub metadata: Option<Metadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 待插入的源制品（id 和时间戳由存储分配）
#[derive(Debug, Clone, PartialEq)]
pub struct NewSourceArtifact {
    pub url: String,
    pub text: String,
    pub metadata: Option<Metadata>,
}

impl NewSourceArtifact {
    pub(crate) fn into_artifact(self, id: SourceId, now: DateTime<Utc>) -> SourceArtifact {
        SourceArtifact {
            id,
            url: self.url,
            text: self.text,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 翻译得到的派生制品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedArtifact {
    pub id: DerivedId,
    pub source_id: SourceId,
    pub language: String,
    pub text: String,
    pub metadata: Option<Metadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DerivedArtifact {
    /// 元数据中记录的镜像文件路径（如果写过）
    pub fn output_file_path(&self) -> Option<PathBuf> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get(OUTPUT_FILE_PATH_KEY))
            .and_then(|value| value.as_str())
            .map(PathBuf::from)
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get(TITLE_KEY))
            .and_then(|value| value.as_str())
    }
}

/// 待插入的派生制品
#[derive(Debug, Clone, PartialEq)]
pub struct NewDerivedArtifact {
    pub source_id: SourceId,
    pub language: String,
    pub text: String,
    pub metadata: Option<Metadata>,
}

impl NewDerivedArtifact {
    pub(crate) fn into_artifact(self, id: DerivedId, now: DateTime<Utc>) -> DerivedArtifact {
        DerivedArtifact {
            id,
            source_id: self.source_id,
            language: self.language,
            text: self.text,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 派生制品的逻辑唯一键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivedKey {
    pub source_id: SourceId,
    pub language: String,
}

impl DerivedKey {
    pub fn new(source_id: SourceId, language: impl Into<String>) -> Self {
        Self {
            source_id,
            language: language.into(),
        }
    }
}

impl fmt::Display for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_id, self.language)
    }
}

/// 编排器返回给调用方的完整结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTranslation {
    pub derived: DerivedArtifact,
    pub source_id: SourceId,
    pub source_metadata: Option<Metadata>,
    /// 本次或首次生产时写出的镜像文件
    pub output_file_path: Option<PathBuf>,
    /// 结果是否直接来自存储（没有触发翻译）
    pub from_store: bool,
}
