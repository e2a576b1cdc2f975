//! docstring 处理流程的类型定义
//!
//! 定义声明、跳过规则、处理统计等核心类型

use serde::Serialize;
use std::fmt;

/// 源码中的字节区间 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSpan {
    pub start: usize,
    pub end: usize,
}

impl ByteSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// 声明类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    /// 模块级或嵌套的普通函数
    Function,
    /// `async def` 函数
    AsyncFunction,
    /// 类体中直接定义的函数
    Method,
    /// 类定义
    Class,
}

impl DeclarationKind {
    /// 用于 prompt 和日志的描述
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::AsyncFunction => "async function",
            Self::Method => "method",
            Self::Class => "class",
        }
    }
}

/// 新 docstring 的写入位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// 在函数体第一行之前插入
    BeforeBody { at: usize },
    /// 函数体与 `def ...:` 在同一行，需要从冒号后断行
    InlineBody { colon_end: usize, body_start: usize },
}

/// 从源码中提取出的声明
#[derive(Debug, Clone)]
pub struct Declaration {
    /// 名称
    pub name: String,
    /// 带外层作用域的名称，例如 `Parser.parse`
    pub qualified_name: String,
    /// 声明类型
    pub kind: DeclarationKind,
    /// 定义所在行（从 1 开始，装饰器不计）
    pub line: usize,
    /// 去缩进、去掉原有 docstring 后的源码，用于 prompt
    pub code: String,
    /// 已有 docstring 语句的区间
    pub existing_docstring: Option<ByteSpan>,
    /// 已有 docstring 是否与声明头在同一行
    pub docstring_inline: bool,
    /// 声明头冒号之后的位置
    pub colon_end: usize,
    /// 新 docstring 的写入位置
    pub anchor: Anchor,
    /// 函数体缩进
    pub body_indent: String,
}

impl Declaration {
    pub fn has_docstring(&self) -> bool {
        self.existing_docstring.is_some()
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "__init__" && self.kind != DeclarationKind::Class
    }

    pub fn is_private(&self) -> bool {
        self.name.starts_with('_')
    }
}

/// 声明被跳过的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    HasDocstring,
    Constructor,
    Class,
    Private,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::HasDocstring => "already documented",
            Self::Constructor => "constructor",
            Self::Class => "class",
            Self::Private => "private",
        };
        f.write_str(text)
    }
}

/// 声明过滤选项
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// 替换已有 docstring
    pub replace_existing: bool,
    /// 跳过 `__init__`
    pub skip_constructors: bool,
    /// 跳过类定义
    pub skip_classes: bool,
    /// 跳过以下划线开头的名称
    pub skip_private: bool,
}

impl ExtractOptions {
    /// 判断声明是否应跳过
    pub fn skip_reason(&self, decl: &Declaration) -> Option<SkipReason> {
        if self.skip_constructors && decl.is_constructor() {
            return Some(SkipReason::Constructor);
        }
        if self.skip_classes && decl.kind == DeclarationKind::Class {
            return Some(SkipReason::Class);
        }
        if self.skip_private && decl.is_private() && !decl.is_constructor() {
            return Some(SkipReason::Private);
        }
        if !self.replace_existing && decl.has_docstring() {
            return Some(SkipReason::HasDocstring);
        }
        None
    }
}

/// 单个文件的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// 文件已写回（或 dry-run 下已输出 diff）
    Updated { documented: usize },
    /// 无需修改
    Unchanged,
}

/// 运行统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// 扫描到的文件数
    pub files_scanned: usize,
    /// 写回的文件数
    pub files_updated: usize,
    /// 未修改的文件数
    pub files_unchanged: usize,
    /// 处理失败的文件数
    pub files_failed: usize,
    /// 生成 docstring 的声明数
    pub documented: usize,
    /// 按规则跳过的声明数
    pub skipped: usize,
    /// 生成失败的声明数
    pub failed: usize,
}

impl RunStats {
    pub fn has_failures(&self) -> bool {
        self.files_failed > 0
    }
}
