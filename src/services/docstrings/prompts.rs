//! LLM Prompt 模板
//!
//! 定义 docstring 生成用的系统提示词和用户提示词

use super::types::{Declaration, DeclarationKind};
use crate::llm::ChatMessage;

/// 系统提示词
pub const SYSTEM_PROMPT: &str = r#"You are a documentation assistant for Python code.
You answer with the content of a single docstring and nothing else: no code fences,
no surrounding quotes, no repetition of the code, no conversational text."#;

/// 函数 / 方法 docstring Prompt
pub const FUNCTION_DOCSTRING_PROMPT: &str = r#"Generate a concise and informative docstring for the following Python {kind} `{name}` from `{file_path}`.

The docstring should include:
- a one-line summary of what the {kind} does,
- a description of each parameter and its type,
- the return value and its type,
- any exceptions the {kind} may raise.

Respond strictly with the docstring content, without quotes or code blocks.

Here is the {kind} to document:

```python
{code_block}
```"#;

/// 类 docstring Prompt
pub const CLASS_DOCSTRING_PROMPT: &str = r#"Generate a concise and informative docstring for the following Python class `{name}` from `{file_path}`.

The docstring should include:
- a one-line summary of what the class represents,
- a short description of its responsibilities,
- its public attributes and their types.

Respond strictly with the docstring content, without quotes or code blocks.

Here is the class to document:

```python
{code_block}
```"#;

/// 格式化 docstring Prompt
pub fn format_docstring_prompt(decl: &Declaration, file_path: &str) -> String {
    let template = match decl.kind {
        DeclarationKind::Class => CLASS_DOCSTRING_PROMPT,
        _ => FUNCTION_DOCSTRING_PROMPT,
    };
    // code_block 最后替换，避免代码中恰好出现占位符
    template
        .replace("{kind}", decl.kind.describe())
        .replace("{name}", &decl.qualified_name)
        .replace("{file_path}", file_path)
        .replace("{code_block}", &decl.code)
}

/// 构建聊天消息列表
pub fn build_messages(decl: &Declaration, file_path: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format_docstring_prompt(decl, file_path)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::docstrings::types::Anchor;

    fn decl(kind: DeclarationKind, code: &str) -> Declaration {
        Declaration {
            name: "parse".to_string(),
            qualified_name: "Parser.parse".to_string(),
            kind,
            line: 3,
            code: code.to_string(),
            existing_docstring: None,
            docstring_inline: false,
            colon_end: 0,
            anchor: Anchor::BeforeBody { at: 0 },
            body_indent: "        ".to_string(),
        }
    }

    #[test]
    fn test_format_method_prompt() {
        let d = decl(DeclarationKind::Method, "def parse(self, text: str) -> Ast:\n    ...");
        let result = format_docstring_prompt(&d, "pkg/parser.py");
        assert!(result.contains("Python method `Parser.parse`"));
        assert!(result.contains("pkg/parser.py"));
        assert!(result.contains("def parse(self, text: str) -> Ast:"));
        assert!(result.contains("exceptions"));
    }

    #[test]
    fn test_format_class_prompt() {
        let d = decl(DeclarationKind::Class, "class Parser:\n    pass");
        let result = format_docstring_prompt(&d, "parser.py");
        assert!(result.contains("Python class `Parser.parse`"));
        assert!(result.contains("attributes"));
    }

    #[test]
    fn test_placeholders_in_code_untouched() {
        let d = decl(DeclarationKind::Function, "def f():\n    return '{name} {kind}'");
        let result = format_docstring_prompt(&d, "f.py");
        assert!(result.contains("return '{name} {kind}'"));
    }

    #[test]
    fn test_build_messages() {
        let d = decl(DeclarationKind::Function, "def f(): pass");
        let messages = build_messages(&d, "f.py");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
    }
}
