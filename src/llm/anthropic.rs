//! Anthropic Messages API 流式实现

use async_stream::try_stream;
use futures::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::debug;

use super::format::{build_anthropic_endpoint, check_response};
use super::sse::SseLineBuffer;
use super::types::{ChatChunk, ChatMessage, ChatOptions, LlmError};

/// Anthropic 请求载荷
#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

/// Anthropic SSE 事件
#[derive(Deserialize, Debug)]
struct AnthropicEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<AnthropicDelta>,
    #[serde(default)]
    error: Option<AnthropicStreamError>,
}

#[derive(Deserialize, Debug)]
struct AnthropicDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    text: Option<String>,
    stop_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct AnthropicStreamError {
    #[serde(rename = "type")]
    error_type: String,
    #[serde(default)]
    message: String,
}

/// 解析单条 SSE data
///
/// 返回 `Ok(None)` 表示该事件不携带内容（ping、content_block_start 等）
pub(super) fn parse_anthropic_event(data: &str) -> Result<Option<ChatChunk>, LlmError> {
    let event: AnthropicEvent = serde_json::from_str(data)?;

    match event.event_type.as_str() {
        "content_block_delta" => Ok(event
            .delta
            .filter(|d| d.delta_type.as_deref() == Some("text_delta"))
            .and_then(|d| d.text)
            .map(ChatChunk::text)),
        "message_delta" => Ok(event
            .delta
            .and_then(|d| d.stop_reason)
            .map(ChatChunk::finished)),
        "error" => {
            let err = event.error.unwrap_or(AnthropicStreamError {
                error_type: "unknown_error".to_string(),
                message: String::new(),
            });
            match err.error_type.as_str() {
                "rate_limit_error" | "overloaded_error" => Err(LlmError::RateLimited { retry_after: None }),
                _ => Err(LlmError::StreamError(format!("{}: {}", err.error_type, err.message))),
            }
        }
        _ => Ok(None),
    }
}

/// 流式调用 Anthropic API
pub fn stream_anthropic(
    client: &Client,
    api_key: &str,
    base_url: &str,
    messages: Vec<ChatMessage>,
    model: &str,
    options: &ChatOptions,
) -> Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>> {
    let endpoint = build_anthropic_endpoint(base_url);
    let api_key = api_key.to_string();
    let model = model.to_string();
    let options = options.clone();
    let client = client.clone();

    Box::pin(try_stream! {
        // 分离系统消息
        let mut system_content: Option<String> = None;
        let mut anthropic_messages: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            if msg.role == "system" {
                system_content = Some(msg.content);
            } else {
                anthropic_messages.push(AnthropicMessage {
                    role: msg.role,
                    content: msg.content,
                });
            }
        }

        let payload = AnthropicRequest {
            model: model.clone(),
            messages: anthropic_messages,
            system: system_content,
            stream: true,
            max_tokens: options.max_tokens.unwrap_or(1024),
            temperature: options.temperature,
        };

        debug!("Anthropic API request: endpoint={}, model={}", endpoint, model);

        let response = client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .header("x-api-key", &api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .send()
            .await?;
        let response = check_response(response, "Anthropic").await?;

        let mut lines = SseLineBuffer::default();
        let mut stream = response.bytes_stream();

        use futures::StreamExt;
        while let Some(chunk_result) = stream.next().await {
            let bytes = chunk_result?;
            for data in lines.push(&bytes) {
                match parse_anthropic_event(&data) {
                    Ok(Some(chunk)) => {
                        yield chunk;
                    }
                    Ok(None) => {}
                    Err(LlmError::JsonError(e)) => {
                        // 跳过无法解析的行，不中断流
                        debug!("Failed to parse Anthropic response: {}, data: {}", e, data);
                    }
                    Err(e) => {
                        Err::<(), LlmError>(e)?;
                    }
                }
            }
        }
    })
}
