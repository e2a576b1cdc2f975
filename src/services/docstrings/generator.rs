//! docstring 生成器
//!
//! 每个声明发送一次 LLM 请求；限流时等待后重试，其它错误直接返回由调用方记录并跳过。

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::prompts;
use super::types::Declaration;
use crate::config::AppConfig;
use crate::llm::{ChatOptions, LlmClient, LlmError};

static RE_CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[\w+-]*").unwrap());

/// docstring 来源
///
/// 处理器只依赖这个 trait，测试中可以替换为固定输出
pub trait DocstringSource: Send + Sync {
    fn generate<'a>(
        &'a self,
        decl: &'a Declaration,
        file_path: &'a str,
    ) -> BoxFuture<'a, Result<String, GeneratorError>>;
}

/// 限流重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 最大重试次数
    pub max_retries: u32,
    /// 默认等待时间
    pub wait: Duration,
}

impl RetryPolicy {
    /// 第 `attempt` 次失败后的等待时间，`None` 表示不再重试
    pub fn delay_for(&self, error: &LlmError, attempt: u32) -> Option<Duration> {
        match error {
            LlmError::RateLimited { retry_after } if attempt < self.max_retries => {
                Some(retry_after.map(Duration::from_secs).unwrap_or(self.wait))
            }
            _ => None,
        }
    }
}

/// 基于 LLM 的 docstring 生成器
pub struct LlmDocstringGenerator {
    client: Arc<LlmClient>,
    model: String,
    options: ChatOptions,
    retry: RetryPolicy,
}

impl LlmDocstringGenerator {
    pub fn new(client: Arc<LlmClient>, config: &AppConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            options: ChatOptions {
                temperature: config.temperature,
                max_tokens: Some(config.max_tokens),
            },
            retry: RetryPolicy {
                max_retries: config.max_retries,
                wait: Duration::from_secs(config.retry_wait_secs),
            },
        }
    }

    async fn generate_inner(&self, decl: &Declaration, file_path: &str) -> Result<String, GeneratorError> {
        let mut attempt = 0;
        loop {
            let messages = prompts::build_messages(decl, file_path);
            match self
                .client
                .stream_and_collect(messages, &self.model, self.options.clone())
                .await
            {
                Ok(result) => {
                    debug!(
                        "Generated docstring for {} ({} chunks, finish_reason={:?})",
                        decl.qualified_name, result.chunk_count, result.finish_reason
                    );
                    return clean_docstring(&result.content)
                        .ok_or_else(|| GeneratorError::Empty(decl.qualified_name.clone()));
                }
                Err(e) => match self.retry.delay_for(&e, attempt) {
                    Some(delay) => {
                        attempt += 1;
                        warn!(
                            "Rate limit reached for {}, waiting {}s (retry {}/{})",
                            decl.qualified_name,
                            delay.as_secs(),
                            attempt,
                            self.retry.max_retries
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None if e.is_rate_limited() => {
                        return Err(GeneratorError::RetriesExhausted { attempts: attempt + 1 });
                    }
                    None => return Err(GeneratorError::Llm(e)),
                },
            }
        }
    }
}

impl DocstringSource for LlmDocstringGenerator {
    fn generate<'a>(
        &'a self,
        decl: &'a Declaration,
        file_path: &'a str,
    ) -> BoxFuture<'a, Result<String, GeneratorError>> {
        Box::pin(self.generate_inner(decl, file_path))
    }
}

/// 清理模型输出
///
/// 去掉代码块标记、外层三引号和多余空白；结果为空时返回 `None`
pub fn clean_docstring(raw: &str) -> Option<String> {
    let mut content = RE_CODE_FENCE.replace_all(raw.trim(), "").trim().to_string();

    for quote in ["\"\"\"", "'''"] {
        let prefixed = ["", "r", "R"]
            .iter()
            .map(|p| format!("{}{}", p, quote))
            .find(|open| content.starts_with(open.as_str()));
        if let Some(open) = prefixed {
            if content.len() >= open.len() + quote.len() && content.ends_with(quote) {
                content = content[open.len()..content.len() - quote.len()].to_string();
                break;
            }
        }
    }

    let content = cleandoc(content.replace("\"\"\"", "").trim());
    if content.is_empty() {
        None
    } else {
        Some(content)
    }
}

/// 与 `inspect.cleandoc` 相同：首行去掉前导空白，其余行去掉公共缩进
fn cleandoc(text: &str) -> String {
    let indent_of = |line: &str| line.bytes().take_while(|b| *b == b' ' || *b == b'\t').count();
    let lines: Vec<&str> = text.lines().collect();
    let margin = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent_of(l))
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .enumerate()
        .map(|(i, l)| {
            if i == 0 {
                l.trim_start()
            } else if l.trim().is_empty() {
                ""
            } else {
                &l[margin..]
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// 生成错误类型
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("{0}")]
    Llm(#[from] LlmError),

    #[error("超过最大重试次数（{attempts} 次请求均被限流）")]
    RetriesExhausted { attempts: u32 },

    #[error("模型没有为 {0} 返回内容")]
    Empty(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::stub_server::{anthropic_stream, http_response, local_http_client, StubServer};
    use crate::services::docstrings::extractor::extract;
    use std::time::Instant;

    #[test]
    fn test_clean_plain_text() {
        assert_eq!(clean_docstring("  Adds two numbers.\n").as_deref(), Some("Adds two numbers."));
    }

    #[test]
    fn test_clean_code_fence_and_quotes() {
        let raw = "```python\n\"\"\"\nAdds two numbers.\n\nArgs:\n    a (int): first\n\"\"\"\n```";
        assert_eq!(
            clean_docstring(raw).as_deref(),
            Some("Adds two numbers.\n\nArgs:\n    a (int): first")
        );
    }

    #[test]
    fn test_clean_single_quotes_and_raw_prefix() {
        assert_eq!(clean_docstring("'''Summary.'''").as_deref(), Some("Summary."));
        assert_eq!(clean_docstring("r\"\"\"Matches \\d+.\"\"\"").as_deref(), Some("Matches \\d+."));
    }

    #[test]
    fn test_clean_strips_inner_triple_quotes() {
        assert_eq!(
            clean_docstring("Use \"\"\" carefully.").as_deref(),
            Some("Use  carefully.")
        );
    }

    #[test]
    fn test_clean_dedents_uniform_indent() {
        assert_eq!(
            clean_docstring("    Summary.\n\n    Returns:\n        int").as_deref(),
            Some("Summary.\n\nReturns:\n    int")
        );
    }

    #[test]
    fn test_clean_empty() {
        assert_eq!(clean_docstring(""), None);
        assert_eq!(clean_docstring("```\n```"), None);
        assert_eq!(clean_docstring("\"\"\"\"\"\""), None);
    }

    #[test]
    fn test_retry_policy() {
        let policy = RetryPolicy {
            max_retries: 2,
            wait: Duration::from_secs(60),
        };
        let limited = LlmError::RateLimited { retry_after: None };
        let hinted = LlmError::RateLimited { retry_after: Some(3) };
        let api = LlmError::ApiError {
            status: 500,
            message: "oops".to_string(),
        };

        assert_eq!(policy.delay_for(&limited, 0), Some(Duration::from_secs(60)));
        assert_eq!(policy.delay_for(&hinted, 1), Some(Duration::from_secs(3)));
        assert_eq!(policy.delay_for(&limited, 2), None);
        assert_eq!(policy.delay_for(&api, 0), None);
    }

    fn generator_for(server: &StubServer, max_retries: u32) -> LlmDocstringGenerator {
        let config = AppConfig {
            api_key: "sk-test".to_string(),
            base_url: server.base_url.clone(),
            max_retries,
            retry_wait_secs: 0,
            ..Default::default()
        };
        let client =
            LlmClient::with_http_client(local_http_client(), config.api_key.clone(), config.base_url.clone()).unwrap();
        LlmDocstringGenerator::new(Arc::new(client), &config)
    }

    fn add_declaration() -> Declaration {
        extract("def add(a, b):\n    return a + b\n", 10_000).unwrap().remove(0)
    }

    fn too_many_requests(retry_after: Option<&str>) -> String {
        let headers: Vec<(&str, &str)> = retry_after.map(|v| ("retry-after", v)).into_iter().collect();
        http_response("429 Too Many Requests", &headers, r#"{"type":"error"}"#)
    }

    #[tokio::test]
    async fn test_rate_limit_waited_out() {
        let server = StubServer::start(vec![
            too_many_requests(Some("1")),
            too_many_requests(None),
            anthropic_stream("```\n\"\"\"Adds two numbers.\"\"\"\n```"),
        ])
        .await;
        let generator = generator_for(&server, 5);
        let decl = add_declaration();

        let started = Instant::now();
        let docstring = generator.generate(&decl, "math.py").await.unwrap();

        assert_eq!(docstring, "Adds two numbers.");
        assert_eq!(server.hits(), 3);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_rate_limit_retries_exhausted() {
        let server = StubServer::start(vec![too_many_requests(Some("0"))]).await;
        let generator = generator_for(&server, 2);
        let decl = add_declaration();

        let err = generator.generate(&decl, "math.py").await.unwrap_err();

        assert!(matches!(err, GeneratorError::RetriesExhausted { attempts: 3 }));
        assert_eq!(server.hits(), 3);
    }

    #[tokio::test]
    async fn test_api_error_not_retried() {
        let server = StubServer::start(vec![http_response("500 Internal Server Error", &[], "boom")]).await;
        let generator = generator_for(&server, 5);
        let decl = add_declaration();

        let err = generator.generate(&decl, "math.py").await.unwrap_err();

        assert!(matches!(err, GeneratorError::Llm(LlmError::ApiError { status: 500, .. })));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_empty_response_reported() {
        let server = StubServer::start(vec![anthropic_stream("```python\n```")]).await;
        let generator = generator_for(&server, 5);
        let decl = add_declaration();

        let err = generator.generate(&decl, "math.py").await.unwrap_err();

        assert!(matches!(err, GeneratorError::Empty(name) if name == "add"));
        assert_eq!(server.hits(), 1);
    }
}
