//! 声明提取
//!
//! 使用 tree-sitter 解析 Python 源码，找出所有 `def` / `async def` / `class` 定义，
//! 记录已有 docstring 的位置和新 docstring 的写入位置。

use tree_sitter::{Node, Parser, Tree};

use super::types::{Anchor, ByteSpan, Declaration, DeclarationKind};

/// 解析 Python 源码
pub fn parse_python(source: &str) -> Result<Tree, ExtractError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| ExtractError::Language(e.to_string()))?;
    parser.parse(source, None).ok_or(ExtractError::ParseFailed)
}

/// 检查语法树中是否有语法错误
pub fn check_syntax(tree: &Tree) -> Result<(), ExtractError> {
    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_line(root).unwrap_or(1);
        return Err(ExtractError::Syntax { line });
    }
    Ok(())
}

fn first_error_line(node: Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            if let Some(line) = first_error_line(child) {
                return Some(line);
            }
        }
    }
    None
}

/// 提取源码中的全部声明（按源码顺序）
///
/// 含语法错误的源码直接拒绝，与 Python 自身无法解析的文件保持一致
pub fn extract(source: &str, max_code_chars: usize) -> Result<Vec<Declaration>, ExtractError> {
    let tree = parse_python(source)?;
    check_syntax(&tree)?;

    let mut walker = Walker {
        source,
        max_code_chars,
        declarations: Vec::new(),
    };
    walker.visit(tree.root_node(), &[], false);
    Ok(walker.declarations)
}

struct Walker<'s> {
    source: &'s str,
    max_code_chars: usize,
    declarations: Vec<Declaration>,
}

impl<'s> Walker<'s> {
    fn text(&self, node: Node) -> &'s str {
        &self.source[node.start_byte()..node.end_byte()]
    }

    fn visit(&mut self, node: Node, scope: &[String], in_class_body: bool) {
        match node.kind() {
            "function_definition" | "class_definition" => {
                self.visit_definition(node, node, scope, in_class_body);
            }
            "decorated_definition" => {
                if let Some(definition) = node.child_by_field_name("definition") {
                    self.visit_definition(definition, node, scope, in_class_body);
                }
            }
            _ => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    self.visit(child, scope, in_class_body);
                }
            }
        }
    }

    /// `outer` 为带装饰器的外层节点（无装饰器时与 `def` 相同）
    fn visit_definition(&mut self, def: Node, outer: Node, scope: &[String], in_class_body: bool) {
        let Some(name_node) = def.child_by_field_name("name") else {
            return;
        };
        let Some(body) = def.child_by_field_name("body") else {
            return;
        };

        let name = self.text(name_node).to_string();
        let is_class = def.kind() == "class_definition";
        let kind = if is_class {
            DeclarationKind::Class
        } else if in_class_body {
            DeclarationKind::Method
        } else if def.child(0).map(|c| c.kind() == "async").unwrap_or(false) {
            DeclarationKind::AsyncFunction
        } else {
            DeclarationKind::Function
        };

        let mut inner_scope = scope.to_vec();
        inner_scope.push(name.clone());

        if let Some(decl) = self.build_declaration(def, outer, body, name, inner_scope.join("."), kind) {
            self.declarations.push(decl);
        }

        // 嵌套定义：函数体内的函数不是方法，类体内的函数是方法
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            self.visit(child, &inner_scope, is_class);
        }
    }

    fn build_declaration(
        &self,
        def: Node,
        outer: Node,
        body: Node,
        name: String,
        qualified_name: String,
        kind: DeclarationKind,
    ) -> Option<Declaration> {
        let colon = header_colon(def, body)?;
        let colon_row = colon.end_position().row;

        let mut cursor = body.walk();
        let children: Vec<Node> = body.named_children(&mut cursor).collect();

        // 与声明头同一行的注释留在原处
        let anchor_node = children
            .iter()
            .find(|c| !(c.kind() == "comment" && c.start_position().row == colon_row))
            .copied()?;
        let docstring = children
            .iter()
            .find(|c| c.kind() != "comment")
            .copied()
            .filter(|stmt| self.is_docstring_statement(*stmt));

        let def_indent = leading_whitespace(&self.source[line_start(self.source, def.start_byte())..]);
        let unit = if def_indent.contains('\t') { "\t" } else { "    " };
        let nested_indent = format!("{}{}", def_indent, unit);

        let inline = anchor_node.start_position().row == colon_row;
        let (anchor, body_indent) = if inline {
            (
                Anchor::InlineBody {
                    colon_end: colon.end_byte(),
                    body_start: anchor_node.start_byte(),
                },
                nested_indent,
            )
        } else {
            let prefix = &self.source[line_start(self.source, anchor_node.start_byte())..anchor_node.start_byte()];
            let indent = if prefix.chars().all(|c| c == ' ' || c == '\t') && !prefix.is_empty() {
                prefix.to_string()
            } else {
                nested_indent
            };
            (Anchor::BeforeBody { at: anchor_node.start_byte() }, indent)
        };

        let existing_docstring = docstring.map(|d| ByteSpan::new(d.start_byte(), d.end_byte()));
        let docstring_inline = docstring
            .map(|d| d.start_position().row == colon_row)
            .unwrap_or(false);

        Some(Declaration {
            name,
            qualified_name,
            kind,
            line: def.start_position().row + 1,
            code: self.code_for(outer, existing_docstring),
            existing_docstring,
            docstring_inline,
            colon_end: colon.end_byte(),
            anchor,
            body_indent,
        })
    }

    /// 函数体第一条语句是否为普通字符串字面量
    fn is_docstring_statement(&self, stmt: Node) -> bool {
        if stmt.kind() != "expression_statement" || stmt.named_child_count() != 1 {
            return false;
        }
        match stmt.named_child(0) {
            Some(expr) if expr.kind() == "string" => self.is_plain_string(expr),
            Some(expr) if expr.kind() == "concatenated_string" => {
                let mut cursor = expr.walk();
                let all_plain = expr
                    .named_children(&mut cursor)
                    .all(|part| part.kind() == "string" && self.is_plain_string(part));
                all_plain
            }
            _ => false,
        }
    }

    /// f-string 和 bytes 字面量不会成为 `__doc__`
    fn is_plain_string(&self, string: Node) -> bool {
        let mut cursor = string.walk();
        let special = string.children(&mut cursor).any(|child| match child.kind() {
            "interpolation" => true,
            "string_start" => self
                .text(child)
                .chars()
                .any(|c| matches!(c, 'f' | 'F' | 'b' | 'B')),
            _ => false,
        });
        !special
    }

    /// 构造 prompt 用的代码：从定义所在行开始，去掉已有 docstring，去缩进并截断
    fn code_for(&self, outer: Node, docstring: Option<ByteSpan>) -> String {
        let start = line_start(self.source, outer.start_byte());
        let end = outer.end_byte();

        let text = match docstring {
            Some(span) => {
                // 末尾的 docstring 整行删除时，换行符在定义节点之外
                let (cut_start, cut_end) = removal_range(self.source, span);
                let cut_end = cut_end.min(end);
                format!("{}{}", &self.source[start..cut_start], &self.source[cut_end..end])
            }
            None => self.source[start..end].to_string(),
        };

        truncate_chars(&dedent(&text), self.max_code_chars)
    }
}

/// 声明头末尾的冒号（函数体之前的最后一个 `:`）
fn header_colon<'t>(def: Node<'t>, body: Node<'t>) -> Option<Node<'t>> {
    let mut cursor = def.walk();
    let colon = def
        .children(&mut cursor)
        .filter(|c| c.kind() == ":" && c.end_byte() <= body.start_byte())
        .last();
    colon
}

/// docstring 独占若干行时整行删除，否则只删除语句本身
fn removal_range(source: &str, span: ByteSpan) -> (usize, usize) {
    let start = line_start(source, span.start);
    let end = line_end_inclusive(source, span.end);
    let before = &source[start..span.start];
    let after = &source[span.end..end];
    if before.trim().is_empty() && after.trim().is_empty() {
        (start, end)
    } else {
        (span.start, span.end)
    }
}

/// `pos` 所在行的起始字节位置
pub(super) fn line_start(source: &str, pos: usize) -> usize {
    source[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

/// `pos` 所在行的结束位置（包含换行符）
fn line_end_inclusive(source: &str, pos: usize) -> usize {
    source[pos..]
        .find('\n')
        .map(|i| pos + i + 1)
        .unwrap_or(source.len())
}

fn leading_whitespace(line: &str) -> String {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').collect()
}

/// 去掉所有非空行的公共前导空白，空白行变为空行
pub fn dedent(text: &str) -> String {
    let margin = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(leading_whitespace)
        .reduce(|a, b| {
            a.chars()
                .zip(b.chars())
                .take_while(|(x, y)| x == y)
                .map(|(x, _)| x)
                .collect()
        })
        .unwrap_or_default();

    text.lines()
        .map(|l| if l.trim().is_empty() { "" } else { &l[margin.len()..] })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 按字符数截断
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n# ... (truncated)", &text[..idx]),
        None => text.to_string(),
    }
}

/// 提取错误类型
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("无法加载 Python 语法: {0}")]
    Language(String),

    #[error("解析失败")]
    ParseFailed,

    #[error("语法错误（第 {line} 行）")]
    Syntax { line: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: &str = r#"import functools


class Greeter(Base):
    """Greets people."""

    def __init__(self, name):
        self.name = name

    @functools.lru_cache
    def greet(self) -> str:
        return f"hi {self.name}"


async def fetch(url):
    def inner():
        return url
    return inner()
"#;

    fn find<'a>(decls: &'a [Declaration], qualified: &str) -> &'a Declaration {
        decls
            .iter()
            .find(|d| d.qualified_name == qualified)
            .unwrap_or_else(|| panic!("missing declaration {}", qualified))
    }

    #[test]
    fn test_extract_simple_function() {
        let source = "def add(a: int, b: int) -> int:\n    return a + b\n";
        let decls = extract(source, 10_000).unwrap();

        assert_eq!(decls.len(), 1);
        let add = &decls[0];
        assert_eq!(add.name, "add");
        assert_eq!(add.kind, DeclarationKind::Function);
        assert_eq!(add.line, 1);
        assert!(!add.has_docstring());
        assert_eq!(add.body_indent, "    ");
        assert_eq!(add.anchor, Anchor::BeforeBody { at: source.find("return").unwrap() });
        assert_eq!(add.code, "def add(a: int, b: int) -> int:\n    return a + b");
    }

    #[test]
    fn test_extract_kinds_and_scopes() {
        let decls = extract(MODULE, 10_000).unwrap();
        let names: Vec<&str> = decls.iter().map(|d| d.qualified_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Greeter", "Greeter.__init__", "Greeter.greet", "fetch", "fetch.inner"]
        );

        assert_eq!(find(&decls, "Greeter").kind, DeclarationKind::Class);
        assert_eq!(find(&decls, "Greeter.__init__").kind, DeclarationKind::Method);
        assert_eq!(find(&decls, "Greeter.greet").kind, DeclarationKind::Method);
        assert_eq!(find(&decls, "fetch").kind, DeclarationKind::AsyncFunction);
        assert_eq!(find(&decls, "fetch.inner").kind, DeclarationKind::Function);

        assert_eq!(find(&decls, "Greeter").line, 4);
        assert_eq!(find(&decls, "Greeter.greet").line, 11);
        assert_eq!(find(&decls, "fetch.inner").line, 16);
    }

    #[test]
    fn test_docstring_detection() {
        let decls = extract(MODULE, 10_000).unwrap();
        let greeter = find(&decls, "Greeter");
        let span = greeter.existing_docstring.unwrap();
        assert_eq!(&MODULE[span.start..span.end], r#""""Greets people.""""#);
        assert!(!greeter.docstring_inline);
        assert!(!find(&decls, "Greeter.greet").has_docstring());
    }

    #[test]
    fn test_docstring_variants() {
        let source = r#"def a():
    f"not {x}"

def b():
    'single'

def c():
    # note
    """doc"""
    return 1

def d():
    "part one" "part two"
"#;
        let decls = extract(source, 10_000).unwrap();
        assert!(!find(&decls, "a").has_docstring());
        assert!(find(&decls, "b").has_docstring());
        assert!(find(&decls, "c").has_docstring());
        assert!(find(&decls, "d").has_docstring());
    }

    #[test]
    fn test_bytes_literal_is_not_docstring() {
        let source = "def f():\n    b\"raw\"\n    return 1\n\ndef g():\n    rb'x' b'y'\n";
        let decls = extract(source, 10_000).unwrap();
        assert!(!find(&decls, "f").has_docstring());
        assert!(!find(&decls, "g").has_docstring());
        assert_eq!(
            find(&decls, "f").anchor,
            Anchor::BeforeBody { at: source.find("b\"raw").unwrap() }
        );
    }

    #[test]
    fn test_docstring_only_body() {
        let source = "class Proto:\n    def run(self):\n        \"\"\"Run it.\"\"\"\n";
        let decls = extract(source, 10_000).unwrap();
        let run = find(&decls, "Proto.run");
        assert!(run.has_docstring());
        assert_eq!(run.code, "def run(self):");
        assert!(find(&decls, "Proto").code.starts_with("class Proto:\n    def run(self):"));

        let source = "def first():\n    'Only doc.'\n\ndef second():\n    return 2\n";
        let decls = extract(source, 10_000).unwrap();
        assert_eq!(find(&decls, "first").code, "def first():");
        assert!(find(&decls, "second").code.contains("return 2"));

        let decls = extract("def last():\n    '''Doc.'''", 10_000).unwrap();
        assert_eq!(decls[0].code, "def last():");
    }

    #[test]
    fn test_code_excludes_docstring_and_dedents() {
        let decls = extract(MODULE, 10_000).unwrap();

        let greeter = find(&decls, "Greeter");
        assert!(greeter.code.starts_with("class Greeter(Base):\n"));
        assert!(!greeter.code.contains("Greets people"));

        let init = find(&decls, "Greeter.__init__");
        assert_eq!(init.code, "def __init__(self, name):\n    self.name = name");

        let greet = find(&decls, "Greeter.greet");
        assert!(greet.code.starts_with("@functools.lru_cache\ndef greet(self) -> str:"));
        assert_eq!(greet.body_indent, "        ");
    }

    #[test]
    fn test_inline_body() {
        let source = "def noop(): pass\n";
        let decls = extract(source, 10_000).unwrap();
        let noop = &decls[0];
        assert_eq!(
            noop.anchor,
            Anchor::InlineBody {
                colon_end: source.find(':').unwrap() + 1,
                body_start: source.find("pass").unwrap(),
            }
        );
        assert_eq!(noop.body_indent, "    ");
    }

    #[test]
    fn test_tab_indentation() {
        let source = "class A:\n\tdef run(self):\n\t\treturn 1\n";
        let decls = extract(source, 10_000).unwrap();
        assert_eq!(find(&decls, "A").body_indent, "\t");
        assert_eq!(find(&decls, "A.run").body_indent, "\t\t");
    }

    #[test]
    fn test_syntax_error_rejected() {
        let err = extract("def broken(:\n    pass\n", 10_000).unwrap_err();
        assert!(matches!(err, ExtractError::Syntax { line: 1 }));
    }

    #[test]
    fn test_code_truncated() {
        let body: String = (0..50).map(|i| format!("    x{} = {}\n", i, i)).collect();
        let source = format!("def big():\n{}", body);
        let decls = extract(&source, 40).unwrap();
        assert!(decls[0].code.ends_with("# ... (truncated)"));
        assert!(decls[0].code.chars().count() < 70);
    }

    #[test]
    fn test_dedent() {
        assert_eq!(dedent("    a\n\n      b\n    c"), "a\n\n  b\nc");
        assert_eq!(dedent("a\n  b"), "a\n  b");
        assert_eq!(dedent("   \n  x"), "\nx");
    }
}
