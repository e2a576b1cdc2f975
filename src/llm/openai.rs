//! OpenAI Chat Completions API 流式实现

use async_stream::try_stream;
use futures::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::debug;

use super::format::{build_openai_endpoint, check_response};
use super::sse::SseLineBuffer;
use super::types::{ChatChunk, ChatMessage, ChatOptions, LlmError};

/// OpenAI 请求载荷
#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// OpenAI SSE 响应块
#[derive(Deserialize, Debug)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize, Debug)]
struct OpenAiChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct OpenAiDelta {
    content: Option<String>,
}

/// 解析单条 SSE data
pub(super) fn parse_openai_chunk(data: &str) -> Result<Option<ChatChunk>, LlmError> {
    let chunk: OpenAiStreamChunk = serde_json::from_str(data)?;

    Ok(chunk.choices.into_iter().next().and_then(|choice| {
        if choice.delta.content.is_none() && choice.finish_reason.is_none() {
            None
        } else {
            Some(ChatChunk {
                content: choice.delta.content,
                finish_reason: choice.finish_reason,
            })
        }
    }))
}

/// 流式调用 OpenAI API
pub fn stream_openai(
    client: &Client,
    api_key: &str,
    base_url: &str,
    messages: Vec<ChatMessage>,
    model: &str,
    options: &ChatOptions,
) -> Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>> {
    let endpoint = build_openai_endpoint(base_url);
    let api_key = api_key.to_string();
    let model = model.to_string();
    let options = options.clone();
    let client = client.clone();

    Box::pin(try_stream! {
        let payload = OpenAiRequest {
            model: model.clone(),
            messages,
            stream: true,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        debug!("OpenAI API request: endpoint={}, model={}", endpoint, model);

        let response = client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;
        let response = check_response(response, "OpenAI").await?;

        let mut lines = SseLineBuffer::default();
        let mut stream = response.bytes_stream();

        use futures::StreamExt;
        while let Some(chunk_result) = stream.next().await {
            let bytes = chunk_result?;
            for data in lines.push(&bytes) {
                match parse_openai_chunk(&data) {
                    Ok(Some(chunk)) => {
                        yield chunk;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!("Failed to parse OpenAI response: {}, data: {}", e, data);
                    }
                }
            }
        }
    })
}
