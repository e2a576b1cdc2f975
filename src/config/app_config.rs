//! 应用配置管理
//!
//! 配置按以下顺序叠加：默认值 → JSON 配置文件 → `.env` / 环境变量 → 命令行参数。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

/// 工作目录下的默认配置文件名
const LOCAL_CONFIG_NAME: &str = "autodocstrings.json";

/// API 密钥的环境变量（按优先级）
const API_KEY_VARS: &[&str] = &["ANTHROPIC_API_KEY", "AUTODOCSTRINGS_API_KEY"];

/// 获取默认配置文件路径
///
/// 优先使用工作目录下的 `autodocstrings.json`，否则使用可执行文件同级目录的 `config.json`
fn default_config_path() -> PathBuf {
    let local = PathBuf::from(LOCAL_CONFIG_NAME);
    if local.is_file() {
        return local;
    }

    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.json")
}

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM API 密钥（只来自环境变量，不落盘）
    #[serde(default, skip_serializing)]
    pub api_key: String,

    /// LLM API 基础 URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// 模型名称
    #[serde(default = "default_model")]
    pub model: String,

    /// 最大 token 数
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// 温度参数，未设置时使用服务端默认值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// 并发请求数量（1 - 16）
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// 触发限流后的最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// 限流后等待的秒数（服务端未给出 retry-after 时）
    #[serde(default = "default_retry_wait_secs")]
    pub retry_wait_secs: u64,

    /// 发送给模型的代码最大字符数
    #[serde(default = "default_max_code_chars")]
    pub max_code_chars: usize,

    /// 写回文件后执行的格式化命令，例如 `black -q`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatter: Option<String>,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-3-haiku-20240307".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_concurrency() -> usize {
    4
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_wait_secs() -> u64 {
    60
}

fn default_max_code_chars() -> usize {
    12_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: None,
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_wait_secs: default_retry_wait_secs(),
            max_code_chars: default_max_code_chars(),
            formatter: None,
        }
    }
}

impl AppConfig {
    /// 加载配置
    ///
    /// 显式指定的配置文件必须存在且合法；默认位置的配置文件缺失时使用默认值。
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut config = match path {
            Some(p) => Self::read_file(p)?,
            None => {
                let default_path = default_config_path();
                if default_path.is_file() {
                    Self::read_file(&default_path)?
                } else {
                    debug!("No config file at {}, using defaults", default_path.display());
                    Self::default()
                }
            }
        };

        // .env 文件缺失时静默忽略
        let _ = dotenvy::dotenv();
        config.apply_env(|name| std::env::var(name).ok());

        Ok(config)
    }

    /// 从 JSON 文件读取配置
    fn read_file(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("读取配置文件 {} 失败: {}", path.display(), e)))?;
        let config = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("解析配置文件 {} 失败: {}", path.display(), e)))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// 用环境变量覆盖配置
    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = API_KEY_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find(|v| !v.trim().is_empty())
        {
            self.api_key = key.trim().to_string();
        }
        if let Some(url) = lookup("ANTHROPIC_BASE_URL").filter(|v| !v.is_empty()) {
            self.base_url = url;
        }
        if let Some(model) = lookup("AUTODOCSTRINGS_MODEL").filter(|v| !v.is_empty()) {
            self.model = model;
        }
    }

    /// 保存配置到文件（不包含 API 密钥）
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("序列化配置失败: {}", e)))?;
        fs::write(path, content)
            .map_err(|e| AppError::Config(format!("写入配置文件失败: {}", e)))?;
        Ok(())
    }

    /// 并发数量限制在 1 - 16
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, 16)
    }

    /// 脱敏后的 API 密钥，仅显示末尾四位
    pub fn masked_api_key(&self) -> String {
        if self.api_key.is_empty() {
            return "<not set>".to_string();
        }
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 4 {
            return "****".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{}", tail)
    }
}

/// 解析逗号分隔的排除列表，去掉空白项
pub fn parse_exclude_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
