//! 已抓取内容的 RSS 2.0 订阅源

use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;

use crate::artifact::SourceArtifact;
use crate::error::StoreResult;
use crate::store::{ArtifactStore, Page, SourceFilter};

/// 条目描述的最大字符数
pub const DESCRIPTION_CHARS: usize = 200;

/// 频道信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedChannel {
    pub title: String,
    pub description: String,
    pub link: String,
}

impl Default for FeedChannel {
    fn default() -> Self {
        Self {
            title: "Pagelingo crawled content".to_string(),
            description: "RSS feed of crawled content".to_string(),
            link: "/feed/".to_string(),
        }
    }
}

/// 一个订阅条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub description: String,
    pub link: String,
    pub guid: String,
    pub pub_date: String,
}

impl From<&SourceArtifact> for FeedItem {
    fn from(source: &SourceArtifact) -> Self {
        Self {
            title: item_title(&source.url),
            description: plain_excerpt(&source.text, DESCRIPTION_CHARS),
            link: source.url.clone(),
            guid: source.url.clone(),
            pub_date: source.created_at.to_rfc2822(),
        }
    }
}

/// 条目标题：URL 路径的最后一段，路径为空时使用主机名
pub fn item_title(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    match url::Url::parse(trimmed) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|segment| !segment.is_empty())
            .or_else(|| parsed.host_str().map(str::to_string))
            .unwrap_or_else(|| trimmed.to_string()),
        Err(_) => trimmed.rsplit('/').next().unwrap_or(trimmed).to_string(),
    }
}

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").expect("link pattern is a valid regex")
    })
}

fn line_marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:#{1,6}|[-*>]|```\w*)\s*")
            .expect("line marker pattern is a valid regex")
    })
}

/// 去掉常见 Markdown 标记后截取前 `max_chars` 个字符
pub fn plain_excerpt(text: &str, max_chars: usize) -> String {
    let plain = link_pattern().replace_all(text, "$1");
    let plain = line_marker_pattern().replace_all(&plain, "");
    let collapsed = plain.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_chars).collect()
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c if c.is_control() && !matches!(c, '\n' | '\t' | '\r') => {}
            c => escaped.push(c),
        }
    }
    escaped
}

/// 渲染 RSS 文档
pub fn render_rss(channel: &FeedChannel, items: &[FeedItem]) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    xml.push_str("<rss version=\"2.0\">\n  <channel>\n");
    let _ = writeln!(xml, "    <title>{}</title>", escape_xml(&channel.title));
    let _ = writeln!(xml, "    <link>{}</link>", escape_xml(&channel.link));
    let _ = writeln!(
        xml,
        "    <description>{}</description>",
        escape_xml(&channel.description)
    );

    for item in items {
        xml.push_str("    <item>\n");
        let _ = writeln!(xml, "      <title>{}</title>", escape_xml(&item.title));
        let _ = writeln!(
            xml,
            "      <description>{}</description>",
            escape_xml(&item.description)
        );
        let _ = writeln!(xml, "      <link>{}</link>", escape_xml(&item.link));
        let _ = writeln!(
            xml,
            "      <guid isPermaLink=\"true\">{}</guid>",
            escape_xml(&item.guid)
        );
        let _ = writeln!(xml, "      <pubDate>{}</pubDate>", escape_xml(&item.pub_date));
        xml.push_str("    </item>\n");
    }

    xml.push_str("  </channel>\n</rss>\n");
    xml
}

/// 列出源制品并生成订阅源
pub async fn build_feed(
    store: &dyn ArtifactStore,
    channel: &FeedChannel,
    page: Page,
) -> StoreResult<String> {
    let sources = store.list_sources(page, &SourceFilter::default()).await?;
    let items: Vec<FeedItem> = sources.iter().map(FeedItem::from).collect();
    tracing::debug!(items = items.len(), "built feed");
    Ok(render_rss(channel, &items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::NewSourceArtifact;
    use crate::store::MemoryArtifactStore;

    #[test]
    fn test_item_title_uses_last_segment() {
        assert_eq!(item_title("https://example.com/blog/post-1"), "post-1");
        assert_eq!(item_title("https://example.com/blog/post-1/"), "post-1");
        assert_eq!(item_title("https://example.com"), "example.com");
    }

    #[test]
    fn test_plain_excerpt_strips_markup() {
        let text = "# Title\n\nSee [the docs](https://example.com) and ![logo](a.png)\n\n- item";
        assert_eq!(plain_excerpt(text, 200), "Title See the docs and logo item");
        assert_eq!(plain_excerpt("ñandú", 3), "ñan");
    }

    #[test]
    fn test_plain_excerpt_limits_stripped_text() {
        let text = format!("```markdown\n> {}\n```", "word ".repeat(100));
        let excerpt = plain_excerpt(&text, DESCRIPTION_CHARS);
        assert_eq!(excerpt.chars().count(), DESCRIPTION_CHARS);
        assert!(excerpt.starts_with("word word"));
        assert!(!excerpt.contains('`'));
        assert!(!excerpt.contains('>'));
    }

    #[test]
    fn test_render_escapes_content() {
        let item = FeedItem {
            title: "a&b".to_string(),
            description: "<script>".to_string(),
            link: "https://example.com/?a=1&b=2".to_string(),
            guid: "https://example.com/?a=1&b=2".to_string(),
            pub_date: "Mon, 01 Jan 2024 00:00:00 +0000".to_string(),
        };
        let xml = render_rss(&FeedChannel::default(), &[item]);

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("<title>a&amp;b</title>"));
        assert!(xml.contains("<description>&lt;script&gt;</description>"));
        assert!(xml.contains("<link>https://example.com/?a=1&amp;b=2</link>"));
    }

    #[tokio::test]
    async fn test_build_feed_lists_sources() {
        let store = MemoryArtifactStore::new();
        store
            .insert_source(NewSourceArtifact {
                url: "https://example.com/a".to_string(),
                text: "x".repeat(300),
                metadata: None,
            })
            .await
            .unwrap();

        let xml = build_feed(&store, &FeedChannel::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(xml.matches("<item>").count(), 1);
        assert!(xml.contains("<title>a</title>"));
        assert!(xml.contains(&format!("<description>{}</description>", "x".repeat(200))));
    }
}
