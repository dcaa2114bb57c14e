//! 基于 reqwest 的页面抓取器

use std::num::NonZeroUsize;

use async_trait::async_trait;
use lru::LruCache;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::Mutex;

use super::extract::{charset_from_content_type, decode_html, extract_page};
use super::{FetchedPage, SourceProvider};
use crate::config::FetchConfig;
use crate::error::{ProviderError, ProviderResult};

/// HTTP 抓取器
///
/// 自带一个按 URL 的 LRU 抓取缓存，只有调用方允许时才会读取。
pub struct HttpSourceProvider {
    client: reqwest::Client,
    cache: Option<Mutex<LruCache<String, FetchedPage>>>,
}

impl HttpSourceProvider {
    pub fn new(config: &FetchConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {}", e)))?;

        let cache = NonZeroUsize::new(config.cache_size).map(|size| Mutex::new(LruCache::new(size)));

        Ok(Self { client, cache })
    }

    async fn cached(&self, url: &str) -> Option<FetchedPage> {
        let cache = self.cache.as_ref()?;
        cache.lock().await.get(url).cloned()
    }

    async fn remember(&self, url: &str, page: &FetchedPage) {
        if let Some(cache) = &self.cache {
            cache.lock().await.put(url.to_string(), page.clone());
        }
    }
}

#[async_trait]
impl SourceProvider for HttpSourceProvider {
    async fn fetch(&self, url: &str, allow_cache: bool) -> ProviderResult<FetchedPage> {
        if allow_cache {
            if let Some(page) = self.cached(url).await {
                tracing::debug!(url, "fetch cache hit");
                return Ok(page);
            }
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Request(format!("{} returned {}", url, status)));
        }

        let charset = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(charset_from_content_type);
        let body = response.bytes().await?;

        let html = decode_html(&body, charset.as_deref());
        let page = extract_page(&html);
        tracing::debug!(url, bytes = body.len(), chars = page.text.len(), "fetched page");

        if !page.text.trim().is_empty() {
            self.remember(url, &page).await;
        }
        Ok(page)
    }
}
