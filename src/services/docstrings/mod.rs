//! Python docstring 生成模块
//!
//! # 流程
//!
//! - 定位目标 `.py` 文件，按目录 / 文件名 / glob 排除
//! - 使用 tree-sitter 提取函数、方法和类声明
//! - 为每个需要处理的声明调用 LLM 生成 docstring，限流时等待重试
//! - 在源码文本上原位写回，校验语法后保存

mod extractor;
mod generator;
mod inserter;
mod processor;
pub mod prompts;
mod scanner;
pub mod types;

pub use extractor::ExtractError;
pub use generator::{DocstringSource, GeneratorError, LlmDocstringGenerator};
pub use inserter::InsertError;
pub use processor::{DocstringProcessor, ProcessOptions};
pub use scanner::{ScanError, ScanOptions, SourceLocator};
pub use types::{ExtractOptions, RunStats};
