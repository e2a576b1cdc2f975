//! 统一错误处理模块
//!
//! 定义应用级错误类型。各子模块有自己的错误枚举，在命令行边界统一转换为 `AppError`。

use std::path::PathBuf;
use thiserror::Error;

use crate::llm::LlmError;
use crate::services::docstrings::{ExtractError, InsertError, ScanError};

/// 应用错误枚举
#[derive(Error, Debug)]
pub enum AppError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(String),

    /// LLM 调用错误
    #[error("LLM 错误: {0}")]
    Llm(#[from] LlmError),

    /// 源文件定位错误
    #[error("扫描错误: {0}")]
    Scan(#[from] ScanError),

    /// Python 源码解析错误
    #[error("解析错误: {0}")]
    Extract(#[from] ExtractError),

    /// docstring 写回错误
    #[error("插入错误: {0}")]
    Insert(#[from] InsertError),

    /// 文件读写错误
    #[error("IO错误 ({0}): {1}")]
    Io(PathBuf, #[source] std::io::Error),
}

/// 便捷类型别名
pub type AppResult<T> = Result<T, AppError>;
