//! docstring 写回
//!
//! 直接在源码文本上做区间替换，保留原有格式；替换结果会重新解析校验。

use std::path::Path;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, warn};

use super::extractor::{check_syntax, parse_python};
use super::types::{Anchor, Declaration};

/// 一次文本替换
#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// 渲染 docstring 字面量（不含首行缩进）
///
/// 文本包含反斜杠时使用 raw 字符串，避免转义序列被解释
pub fn render_docstring(text: &str, indent: &str) -> String {
    let text = text.replace("\"\"\"", "");
    let prefix = if text.contains('\\') { "r" } else { "" };

    let body = text
        .lines()
        .map(|line| {
            let line = line.trim_end();
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", indent, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("{}\"\"\"\n{}\n{}\"\"\"", prefix, body, indent)
}

/// 为一个声明计算替换
fn edit_for(decl: &Declaration, docstring: &str) -> Edit {
    let indent = &decl.body_indent;
    let literal = render_docstring(docstring, indent);

    match (decl.existing_docstring, &decl.anchor) {
        (Some(span), _) if decl.docstring_inline => Edit {
            start: decl.colon_end,
            end: span.end,
            text: format!("\n{}{}", indent, literal),
        },
        (Some(span), _) => Edit {
            start: span.start,
            end: span.end,
            text: literal,
        },
        (None, Anchor::BeforeBody { at }) => Edit {
            start: *at,
            end: *at,
            text: format!("{}\n{}", literal, indent),
        },
        (None, Anchor::InlineBody { colon_end, body_start }) => Edit {
            start: *colon_end,
            end: *body_start,
            text: format!("\n{}{}\n{}", indent, literal, indent),
        },
    }
}

/// 将生成的 docstring 写入源码
///
/// 从后往前应用替换以保持字节偏移有效；结果含语法错误时返回 `InsertError::Invalid`
pub fn splice(source: &str, docstrings: &[(Declaration, String)]) -> Result<String, InsertError> {
    let mut edits: Vec<Edit> = docstrings
        .iter()
        .map(|(decl, text)| edit_for(decl, text))
        .collect();
    edits.sort_by_key(|e| (e.start, e.end));

    for pair in edits.windows(2) {
        if pair[0].end > pair[1].start || (pair[0].start == pair[1].start && pair[0].end == pair[1].end) {
            return Err(InsertError::Overlap { at: pair[1].start });
        }
    }

    let mut output = source.to_string();
    for edit in edits.iter().rev() {
        if edit.end > output.len() || edit.start > edit.end {
            return Err(InsertError::OutOfBounds { at: edit.start });
        }
        output.replace_range(edit.start..edit.end, &edit.text);
    }

    let tree = parse_python(&output).map_err(|e| InsertError::Invalid(e.to_string()))?;
    check_syntax(&tree).map_err(|e| InsertError::Invalid(e.to_string()))?;

    Ok(output)
}

/// 写回文件，配置了格式化命令时随后执行
pub async fn write_file(path: &Path, content: &str, formatter: Option<&str>) -> Result<(), InsertError> {
    fs::write(path, content)
        .await
        .map_err(|e| InsertError::Write(path.display().to_string(), e))?;
    debug!("Wrote {}", path.display());

    if let Some(command) = formatter {
        run_formatter(command, path).await;
    }
    Ok(())
}

/// 执行格式化命令，失败只记录警告
///
/// 命令按空白切分，不解析引号，文件路径追加在最后
async fn run_formatter(command: &str, path: &Path) {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        return;
    };

    match Command::new(program).args(parts).arg(path).output().await {
        Ok(output) if output.status.success() => {
            debug!("Formatted {} with {}", path.display(), program);
        }
        Ok(output) => {
            warn!(
                "Formatter '{}' failed on {}: {}",
                command,
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Err(e) => {
            warn!("Failed to run formatter '{}': {}", command, e);
        }
    }
}

/// 写回错误类型
#[derive(Debug, thiserror::Error)]
pub enum InsertError {
    #[error("替换区间重叠（位置 {at}）")]
    Overlap { at: usize },

    #[error("替换位置越界（位置 {at}）")]
    OutOfBounds { at: usize },

    #[error("写回后的源码无法解析: {0}")]
    Invalid(String),

    #[error("写入文件失败 ({0}): {1}")]
    Write(String, #[source] std::io::Error),
}
