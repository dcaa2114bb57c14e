//! HTML 正文与元数据提取
//!
//! 用 html5ever 解析文档，输出 Markdown 风格的段落文本：
//! 标题加 `#` 前缀，列表项加 `- ` 前缀，`<pre>` 保留为代码块。
//! 脚本、样式、导航、页眉页脚和表单不会进入正文。

use encoding_rs::{Encoding, UTF_8};
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use serde_json::Value;

use super::FetchedPage;
use crate::artifact::Metadata;

/// 不提取文本的元素
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "form", "noscript", "template", "svg", "iframe",
    "button", "aside",
];

/// 会切断当前段落的容器元素
const CONTAINER_TAGS: &[&str] = &[
    "article", "main", "section", "div", "body", "table", "tbody", "thead", "tr", "ul", "ol", "dl",
    "figure", "details", "summary",
];

/// 作为一个整体输出的段落元素
const PARAGRAPH_TAGS: &[&str] = &["p", "td", "th", "dt", "dd", "figcaption", "caption"];

/// 进入元数据的 `<meta>` 名称
const META_KEYS: &[&str] = &[
    "description",
    "author",
    "keywords",
    "og:title",
    "og:description",
    "og:image",
    "og:site_name",
    "og:type",
];

/// 从 `Content-Type` 中取出 charset
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .map(str::trim)
        .find_map(|part| {
            let (key, value) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"').to_string())
        })
        .filter(|charset| !charset.is_empty())
}

/// 将 HTML 字节解码为字符串
///
/// 优先使用响应头中的编码；没有时按 UTF-8 解析一次，再根据文档里的
/// `<meta charset>` 决定是否重新解码。
pub fn decode_html(data: &[u8], header_charset: Option<&str>) -> String {
    if let Some(encoding) = header_charset.and_then(|label| Encoding::for_label(label.as_bytes())) {
        let (decoded, _, _) = encoding.decode(data);
        return decoded.into_owned();
    }

    let utf8 = String::from_utf8_lossy(data).into_owned();
    let dom = parse_html(&utf8);
    match get_charset(&dom.document).and_then(|label| Encoding::for_label(label.as_bytes())) {
        Some(encoding) if encoding != UTF_8 => {
            let (decoded, _, _) = encoding.decode(data);
            decoded.into_owned()
        }
        _ => utf8,
    }
}

pub fn parse_html(html: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(html)
}

/// 提取页面文本与元数据
pub fn extract_page(html: &str) -> FetchedPage {
    let dom = parse_html(html);
    let metadata = extract_metadata(&dom.document);

    let root = find_nodes(&dom.document, vec!["html", "body"])
        .into_iter()
        .next()
        .unwrap_or_else(|| dom.document.clone());

    let mut collector = TextCollector::default();
    collector.walk(&root);

    FetchedPage {
        text: collector.finish(),
        metadata: (!metadata.is_empty()).then_some(metadata),
    }
}

/// 查找指定路径的 DOM 节点
pub fn find_nodes(node: &Handle, node_names: Vec<&str>) -> Vec<Handle> {
    let Some(&node_name) = node_names.first() else {
        return Vec::new();
    };

    let mut found_nodes = Vec::new();
    let matches = get_node_name(node) == Some(node_name);

    if matches && node_names.len() == 1 {
        found_nodes.push(node.clone());
    }

    if matches && node_names.len() > 1 {
        let rest = node_names[1..].to_vec();
        for child_node in node.children.borrow().iter() {
            found_nodes.append(&mut find_nodes(child_node, rest.clone()));
        }
    } else if !matches || node_names.len() == 1 {
        for child_node in node.children.borrow().iter() {
            found_nodes.append(&mut find_nodes(child_node, node_names.clone()));
        }
    }

    found_nodes
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取文档字符编码
fn get_charset(document: &Handle) -> Option<String> {
    for meta_node in find_nodes(document, vec!["html", "head", "meta"]) {
        if let Some(charset) = get_node_attr(&meta_node, "charset") {
            return Some(charset);
        }

        let is_content_type = get_node_attr(&meta_node, "http-equiv")
            .is_some_and(|value| value.eq_ignore_ascii_case("content-type"));
        if is_content_type {
            if let Some(charset) = get_node_attr(&meta_node, "content")
                .as_deref()
                .and_then(charset_from_content_type)
            {
                return Some(charset);
            }
        }
    }
    None
}

fn extract_metadata(document: &Handle) -> Metadata {
    let mut metadata = Metadata::new();

    if let Some(title_node) = find_nodes(document, vec!["html", "head", "title"]).first() {
        let title = normalize_whitespace(&inline_text(title_node));
        if !title.is_empty() {
            metadata.insert("title".to_string(), Value::String(title));
        }
    }

    for meta_node in find_nodes(document, vec!["html", "head", "meta"]) {
        let Some(key) = get_node_attr(&meta_node, "property")
            .or_else(|| get_node_attr(&meta_node, "name"))
            .map(|key| key.trim().to_ascii_lowercase())
        else {
            continue;
        };
        if !META_KEYS.contains(&key.as_str()) || metadata.contains_key(&key) {
            continue;
        }
        if let Some(content) = get_node_attr(&meta_node, "content") {
            let content = normalize_whitespace(&content);
            if !content.is_empty() {
                metadata.insert(key, Value::String(content));
            }
        }
    }

    metadata
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 收集节点下的全部文本（跳过不提取的元素）
fn inline_text(node: &Handle) -> String {
    let mut text = String::new();
    collect_text(node, &mut text);
    text
}

fn collect_text(node: &Handle, text: &mut String) {
    match &node.data {
        NodeData::Text { contents } => text.push_str(&contents.borrow()),
        NodeData::Element { name, .. } => {
            let tag = name.local.as_ref();
            if SKIPPED_TAGS.contains(&tag) {
                return;
            }
            if tag == "br" {
                text.push(' ');
            }
            for child in node.children.borrow().iter() {
                collect_text(child, text);
            }
        }
        _ => {}
    }
}

fn heading_level(tag: &str) -> Option<usize> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

#[derive(Default)]
struct TextCollector {
    blocks: Vec<String>,
    pending: String,
}

impl TextCollector {
    fn walk(&mut self, node: &Handle) {
        match &node.data {
            NodeData::Document => self.walk_children(node),
            NodeData::Text { contents } => self.pending.push_str(&contents.borrow()),
            NodeData::Element { name, .. } => {
                let tag = name.local.as_ref();
                if SKIPPED_TAGS.contains(&tag) {
                    return;
                }

                if let Some(level) = heading_level(tag) {
                    self.push_block("#".repeat(level), &inline_text(node));
                } else if tag == "li" {
                    self.push_block("-".to_string(), &inline_text(node));
                } else if tag == "blockquote" {
                    self.push_block(">".to_string(), &inline_text(node));
                } else if tag == "pre" {
                    self.flush();
                    let code = inline_text(node);
                    let code = code.trim_matches('\n');
                    if !code.trim().is_empty() {
                        self.blocks.push(format!("```\n{}\n```", code));
                    }
                } else if PARAGRAPH_TAGS.contains(&tag) {
                    self.push_block(String::new(), &inline_text(node));
                } else if CONTAINER_TAGS.contains(&tag) {
                    self.flush();
                    self.walk_children(node);
                    self.flush();
                } else if tag == "br" {
                    self.pending.push(' ');
                } else {
                    self.walk_children(node);
                }
            }
            _ => {}
        }
    }

    fn walk_children(&mut self, node: &Handle) {
        for child in node.children.borrow().iter() {
            self.walk(child);
        }
    }

    fn push_block(&mut self, prefix: String, text: &str) {
        self.flush();
        let text = normalize_whitespace(text);
        if text.is_empty() {
            return;
        }
        if prefix.is_empty() {
            self.blocks.push(text);
        } else {
            self.blocks.push(format!("{} {}", prefix, text));
        }
    }

    /// 容器中游离的文本合成一个段落
    fn flush(&mut self) {
        let text = normalize_whitespace(&self.pending);
        self.pending.clear();
        if !text.is_empty() {
            self.blocks.push(text);
        }
    }

    fn finish(mut self) -> String {
        self.flush();
        self.blocks.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>  A   small page </title>
  <meta name="description" content="About things">
  <meta property="og:title" content="Small Page">
  <script>var x = 1;</script>
</head>
<body>
  <header><a href="/">Home</a></header>
  <nav><ul><li>Menu</li></ul></nav>
  <article>
    <h1>Hello</h1>
    <p>First <strong>paragraph</strong>
       spans lines.</p>
    <ul><li>one</li><li>two</li></ul>
    <pre>fn main() {}</pre>
    loose text
  </article>
  <footer>Copyright</footer>
</body>
</html>"#;

    #[test]
    fn test_extract_text_blocks() {
        let page = extract_page(PAGE);
        assert_eq!(
            page.text,
            "# Hello\n\nFirst paragraph spans lines.\n\n- one\n\n- two\n\n```\nfn main() {}\n```\n\nloose text"
        );
    }

    #[test]
    fn test_extract_metadata() {
        let metadata = extract_page(PAGE).metadata.unwrap();
        assert_eq!(metadata["title"], "A small page");
        assert_eq!(metadata["description"], "About things");
        assert_eq!(metadata["og:title"], "Small Page");
        assert!(!metadata.contains_key("charset"));
    }

    #[test]
    fn test_page_without_head_has_no_metadata() {
        let page = extract_page("<p>just text</p>");
        assert_eq!(page.text, "just text");
        assert!(page.metadata.is_none());
    }

    #[test]
    fn test_empty_body_yields_empty_text() {
        let page = extract_page("<html><body><script>alert(1)</script></body></html>");
        assert!(page.text.is_empty());
    }

    #[test]
    fn test_charset_from_content_type() {
        assert_eq!(
            charset_from_content_type("text/html; charset=\"ISO-8859-1\""),
            Some("ISO-8859-1".to_string())
        );
        assert_eq!(charset_from_content_type("text/html"), None);
    }

    #[test]
    fn test_decode_uses_meta_charset() {
        let mut data = b"<html><head><meta charset=\"windows-1252\"></head><body><p>caf".to_vec();
        data.push(0xE9);
        data.extend_from_slice(b"</p></body></html>");

        let html = decode_html(&data, None);
        assert_eq!(extract_page(&html).text, "café");
    }
}
