//! 译文镜像输出
//!
//! 译文除了写入存储，还可以镜像到一个外部位置（默认是本地文件系统），
//! 供人工浏览或交给其他工具处理。

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// 镜像文件扩展名
pub const OUTPUT_EXTENSION: &str = "md";
/// 标题清理后为空时使用的文件名
pub const FALLBACK_FILE_STEM: &str = "untitled";

/// 外部镜像目标
#[async_trait]
pub trait Sink: Send + Sync {
    /// 写入内容，必要时创建父目录
    async fn write(&self, path: &Path, content: &str) -> io::Result<()>;

    async fn remove(&self, path: &Path) -> io::Result<()>;
}

/// 本地文件系统
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSink;

#[async_trait]
impl Sink for FsSink {
    async fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

/// 去掉包裹整个文本的代码围栏（```、```markdown、```md）
///
/// 只处理首尾成对的围栏，正文中的代码块保持不变。
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text.to_string();
    };

    let (info, body) = rest.split_once('\n').unwrap_or((rest, ""));
    let info = info.trim();
    if !matches!(info, "" | "markdown" | "md") {
        return text.to_string();
    }

    match body.strip_suffix("```") {
        Some(inner) => inner.to_string(),
        None => text.to_string(),
    }
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .replace('\\', "_")
        .replace('<', "[")
        .replace('>', "]")
        .replace(':', " - ")
        .replace(['"', '?', '*'], "")
        .replace('|', "-")
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .trim()
        .to_string()
}

/// 根据标题计算镜像文件路径
///
/// 标题中的 `/` 保留为目录层级；空段和 `..` 会被丢弃，
/// 因此结果总是落在 `output_dir` 之下。
pub fn output_path(output_dir: &Path, title: &str) -> PathBuf {
    let segments: Vec<String> = title
        .split('/')
        .map(sanitize_segment)
        .filter(|segment| !segment.is_empty())
        .collect();

    let mut path = output_dir.to_path_buf();
    match segments.split_last() {
        Some((file_stem, directories)) => {
            for directory in directories {
                path.push(directory);
            }
            path.push(format!("{}.{}", file_stem, OUTPUT_EXTENSION));
        }
        None => path.push(format!("{}.{}", FALLBACK_FILE_STEM, OUTPUT_EXTENSION)),
    }
    path
}
