//! OpenAI 兼容接口的翻译器
//!
//! 生成双语文档：每个段落先给出译文，原文紧随其后。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::TranslationProvider;
use crate::config::TranslationConfig;
use crate::error::{ProviderError, ProviderResult};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// 双语翻译提示词
pub fn bilingual_prompt(language: &str) -> String {
    format!(
        "Take the Markdown content provided by the user and create a bilingual document. \
Translate each paragraph into {language}, then place the original paragraph below it. \
Repeat this for all paragraphs. Translate headings as well and keep the original heading below each one.\n\
\n\
Output requirements:\n\
- Separate each pair of paragraphs with a blank line.\n\
- Keep formatting consistent across both languages, especially lists, code blocks and quotes.\n\
- Keep links, images and code blocks unchanged.\n\
- Return only the document, without commentary.\n\
\n\
Example output format:\n\
\n\
<{language} translation of the first paragraph.>\n\
\n\
<Original first paragraph.>\n\
\n\
<{language} translation of the second paragraph.>\n\
\n\
<Original second paragraph.>\n"
    )
}

/// 聊天补全翻译器
pub struct ChatTranslationProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl ChatTranslationProvider {
    pub fn new(config: &TranslationConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {}", e)))?;

        let endpoint = format!("{}/chat/completions", config.api_url.trim_end_matches('/'));
        tracing::info!(endpoint = %endpoint, model = %config.model, "translation provider configured");

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TranslationProvider for ChatTranslationProvider {
    async fn translate(&self, text: &str, language: &str) -> ProviderResult<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: bilingual_prompt(language),
                },
                ChatMessage {
                    role: "user",
                    content: text.to_string(),
                },
            ],
            temperature: 0.2,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Request(format!(
                "translation endpoint returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("response has no choices".to_string()))?;

        if content.trim().is_empty() {
            return Err(ProviderError::EmptyContent);
        }

        tracing::debug!(language, chars = content.len(), "translation received");
        Ok(content)
    }
}
