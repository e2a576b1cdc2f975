//! 统一 LLM 客户端

use futures::{Stream, StreamExt};
use reqwest::Client;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use super::anthropic::stream_anthropic;
use super::format::{detect_api_format, ApiFormat};
use super::openai::stream_openai;
use super::types::{ChatChunk, ChatMessage, ChatOptions, LlmError, StreamCollectResult};

/// 统一 LLM 客户端
///
/// 支持 OpenAI 和 Anthropic API 格式，根据模型名称自动选择
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    ///
    /// `max_connections` 为每个主机保留的空闲连接数，与请求并发数一致
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        max_connections: usize,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(max_connections.max(1))
            .build()
            .map_err(LlmError::HttpError)?;

        Self::with_http_client(client, api_key, base_url)
    }

    /// 使用已构建的 HTTP 客户端
    pub(crate) fn with_http_client(
        client: Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(LlmError::ConfigError("API Key is required".to_string()));
        }

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into(),
        })
    }

    /// 流式聊天（自动检测 API 格式）
    pub fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        options: ChatOptions,
    ) -> Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>> {
        let api_format = detect_api_format(model);
        debug!("LLM request: model={}, api_format={:?}", model, api_format);

        match api_format {
            ApiFormat::OpenAi => stream_openai(
                &self.client,
                &self.api_key,
                &self.base_url,
                messages,
                model,
                &options,
            ),
            ApiFormat::Anthropic => stream_anthropic(
                &self.client,
                &self.api_key,
                &self.base_url,
                messages,
                model,
                &options,
            ),
        }
    }

    /// 流式请求并收集完整响应
    pub async fn stream_and_collect(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        options: ChatOptions,
    ) -> Result<StreamCollectResult, LlmError> {
        let mut stream = self.stream_chat(messages, model, options);
        let mut result = StreamCollectResult::default();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            result.chunk_count += 1;

            if let Some(content) = chunk.content {
                result.content.push_str(&content);
            }
            if chunk.finish_reason.is_some() {
                result.finish_reason = chunk.finish_reason;
            }
        }

        Ok(result)
    }
}
