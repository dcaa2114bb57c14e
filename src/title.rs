//! 标题推导
//!
//! 没有显式标题时，用页面元数据或 URL 推导译文标题。这是一个纯函数，
//! 不会失败。

use crate::artifact::Metadata;

/// `title` 字段的最大字符数，超出部分用省略号替代
pub const MAX_TITLE_CHARS: usize = 50;
pub const ELLIPSIS: &str = "...";

/// 去掉 URL 开头的 `https://` 和 `www.`
pub fn format_url(url: &str) -> &str {
    let url = url.strip_prefix("https://").unwrap_or(url);
    url.strip_prefix("www.").unwrap_or(url)
}

/// 按字符截断，超出时追加省略号
fn truncate_title(title: &str) -> String {
    if title.chars().count() > MAX_TITLE_CHARS {
        let mut truncated: String = title.chars().take(MAX_TITLE_CHARS).collect();
        truncated.push_str(ELLIPSIS);
        truncated
    } else {
        title.to_string()
    }
}

fn metadata_str<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata
        .get(key)
        .and_then(|value| value.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// 推导标题：`og:title` 优先，其次截断后的 `title`，最后是格式化的 URL
pub fn derive_title(url: &str, metadata: Option<&Metadata>) -> String {
    let formatted_url = format_url(url);

    let Some(metadata) = metadata else {
        return formatted_url.to_string();
    };

    if let Some(og_title) = metadata_str(metadata, "og:title") {
        return og_title.to_string();
    }

    match metadata_str(metadata, "title") {
        Some(given) => truncate_title(given),
        None => formatted_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn test_og_title_wins() {
        let metadata = metadata(&[("og:title", "Foo"), ("title", "Bar")]);
        assert_eq!(
            derive_title("https://www.example.com/x", Some(&metadata)),
            "Foo"
        );
    }

    #[test]
    fn test_no_metadata_uses_formatted_url() {
        assert_eq!(derive_title("https://www.example.com/x", None), "example.com/x");
        assert_eq!(derive_title("https://example.com/a", None), "example.com/a");
    }

    #[test]
    fn test_http_scheme_is_kept() {
        assert_eq!(format_url("http://www.example.com"), "http://www.example.com");
    }

    #[test]
    fn test_long_title_is_truncated() {
        let title = "a".repeat(60);
        let metadata = metadata(&[("title", &title)]);
        let derived = derive_title("https://example.com", Some(&metadata));
        assert_eq!(derived, format!("{}...", "a".repeat(50)));
    }

    #[test]
    fn test_title_of_exact_limit_is_untouched() {
        let title = "b".repeat(50);
        let metadata = metadata(&[("title", &title)]);
        assert_eq!(derive_title("https://example.com", Some(&metadata)), title);
    }

    #[test]
    fn test_truncation_counts_chars_not_bytes() {
        let title = "翻".repeat(55);
        let metadata = metadata(&[("title", &title)]);
        let derived = derive_title("https://example.com", Some(&metadata));
        assert_eq!(derived.chars().count(), 53);
    }

    #[test]
    fn test_empty_metadata_falls_back_to_url() {
        let metadata = metadata(&[("description", "nothing useful")]);
        assert_eq!(
            derive_title("https://www.example.com/post", Some(&metadata)),
            "example.com/post"
        );
    }
}
