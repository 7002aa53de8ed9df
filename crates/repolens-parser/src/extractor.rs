use crate::complexity::{cyclomatic_complexity, is_definition_kind};
use repolens_core::{CodeNode, Language, NodeKind};
use tree_sitter::{Node, Tree};

/// Character cap for the code slice stored on file-level nodes. Function and
/// class nodes keep their full verbatim slice.
const FILE_CODE_CAP: usize = 2000;

/// A call expression observed inside a node, before edge resolution.
#[derive(Debug, Clone)]
pub struct CallRef {
    /// Node id of the innermost enclosing definition (or the file node).
    pub caller: String,
    /// Unqualified callee name.
    pub name: String,
    /// Receiver-qualified spelling, when the call had one (`obj.method`).
    pub qualified: Option<String>,
}

/// An import observed in a file, before edge resolution.
#[derive(Debug, Clone)]
pub struct ImportRef {
    /// Node id of the importing file node.
    pub importer: String,
    /// Imported module or symbol name.
    pub name: String,
}

#[derive(Debug, Default)]
pub struct FileExtraction {
    pub nodes: Vec<CodeNode>,
    pub calls: Vec<CallRef>,
    pub imports: Vec<ImportRef>,
}

/// Extract function, class and file nodes plus raw call/import references
/// from one parsed source file.
pub fn extract_file(
    language: &Language,
    tree: &Tree,
    source: &str,
    relpath: &str,
) -> FileExtraction {
    let file_name = relpath.rsplit('/').next().unwrap_or(relpath).to_string();
    let line_count = source.lines().count().max(1) as u32;

    let mut file_node = CodeNode::new(
        NodeKind::File,
        &file_name,
        file_name.clone(),
        relpath,
        1,
        line_count,
        language.clone(),
    );
    file_node.code = cap_code(source, FILE_CODE_CAP);

    let mut walker = Walker {
        language,
        source,
        relpath,
        extraction: FileExtraction::default(),
        qual_stack: Vec::new(),
        owner_stack: vec![file_node.id.clone()],
        file_id: file_node.id.clone(),
    };
    walker.extraction.nodes.push(file_node);
    walker.walk(tree.root_node());
    walker.extraction
}

struct Walker<'a> {
    language: &'a Language,
    source: &'a str,
    relpath: &'a str,
    extraction: FileExtraction,
    qual_stack: Vec<String>,
    owner_stack: Vec<String>,
    file_id: String,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, node: Node) {
        let kind = node.kind();

        if let Some(node_kind) = definition_kind(self.language, kind) {
            if let Some(name) = self.definition_name(&node) {
                let id = self.push_definition(&node, node_kind, &name);
                self.qual_stack.push(name);
                self.owner_stack.push(id);
                self.walk_children(node);
                self.owner_stack.pop();
                self.qual_stack.pop();
                return;
            }
        }

        // Rust impl blocks contribute to qualified names but are not nodes.
        if kind == "impl_item" {
            let type_name = node
                .child_by_field_name("type")
                .and_then(|t| t.utf8_text(self.source.as_bytes()).ok())
                .map(|s| s.to_string());
            if let Some(type_name) = type_name {
                self.qual_stack.push(type_name);
                self.walk_children(node);
                self.qual_stack.pop();
                return;
            }
        }

        if is_call_kind(kind) {
            self.record_call(&node);
        } else if is_import_kind(kind) {
            self.record_import(&node);
        }

        self.walk_children(node);
    }

    fn walk_children(&mut self, node: Node) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child);
        }
    }

    fn push_definition(&mut self, node: &Node, kind: NodeKind, name: &str) -> String {
        let start_line = node.start_position().row as u32 + 1;
        let end_line = node.end_position().row as u32 + 1;
        let qualname = if self.qual_stack.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.qual_stack.join("."), name)
        };

        let code = self.node_text(node);
        let doc = self.documentation(node);
        let cyclomatic = cyclomatic_complexity(node, self.source);

        let code_node = CodeNode::new(
            kind,
            &qualname,
            name,
            self.relpath,
            start_line,
            end_line,
            self.language.clone(),
        )
        .with_code(code)
        .with_doc(doc)
        .with_cyclomatic(cyclomatic);

        let id = code_node.id.clone();
        self.extraction.nodes.push(code_node);
        id
    }

    fn definition_name(&self, node: &Node) -> Option<String> {
        node.child_by_field_name("name")
            .and_then(|n| n.utf8_text(self.source.as_bytes()).ok())
            .map(|s| s.to_string())
    }

    fn node_text(&self, node: &Node) -> String {
        node.utf8_text(self.source.as_bytes())
            .unwrap_or_default()
            .to_string()
    }

    fn record_call(&mut self, node: &Node) {
        let callee = match node.kind() {
            // Java spells the callee as a direct field.
            "method_invocation" => node.child_by_field_name("name"),
            _ => node.child_by_field_name("function"),
        };
        let Some(callee) = callee else { return };

        let full = self.node_text(&callee);
        let name = match callee.kind() {
            "identifier" | "type_identifier" | "field_identifier" | "property_identifier" => {
                Some(full.clone())
            }
            "attribute" => self.field_text(&callee, "attribute"),
            "member_expression" => self.field_text(&callee, "property"),
            "selector_expression" => self.field_text(&callee, "field"),
            "field_expression" => self.field_text(&callee, "field"),
            "scoped_identifier" => self.field_text(&callee, "name"),
            _ => None,
        };
        let Some(name) = name else { return };
        if name.is_empty() {
            return;
        }

        let qualified = if full != name { Some(full) } else { None };
        let caller = self
            .owner_stack
            .last()
            .cloned()
            .unwrap_or_else(|| self.file_id.clone());
        self.extraction.calls.push(CallRef {
            caller,
            name,
            qualified,
        });
    }

    fn field_text(&self, node: &Node, field: &str) -> Option<String> {
        node.child_by_field_name(field)
            .and_then(|n| n.utf8_text(self.source.as_bytes()).ok())
            .map(|s| s.to_string())
    }

    fn record_import(&mut self, node: &Node) {
        let mut names = Vec::new();
        collect_import_names(node, self.source, &mut names);
        for name in names {
            if name.is_empty() {
                continue;
            }
            self.extraction.imports.push(ImportRef {
                importer: self.file_id.clone(),
                name,
            });
        }
    }

    /// Leading documentation per language convention: Python docstrings,
    /// comment runs immediately above the declaration elsewhere.
    fn documentation(&self, node: &Node) -> String {
        if matches!(self.language, Language::Python) {
            if let Some(doc) = self.python_docstring(node) {
                return doc;
            }
            return String::new();
        }
        self.leading_comments(node)
    }

    fn python_docstring(&self, node: &Node) -> Option<String> {
        let body = node.child_by_field_name("body")?;
        let first = body.named_child(0)?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let string = first.named_child(0)?;
        if string.kind() != "string" {
            return None;
        }
        let raw = string.utf8_text(self.source.as_bytes()).ok()?;
        Some(strip_string_quotes(raw).trim().to_string())
    }

    fn leading_comments(&self, node: &Node) -> String {
        // The comment run must touch the declaration: no blank line between
        // the last comment and the declaration header.
        let mut parts: Vec<String> = Vec::new();
        let mut expected_row = node.start_position().row;
        let mut current = node.prev_sibling();

        while let Some(sibling) = current {
            if !matches!(sibling.kind(), "comment" | "line_comment" | "block_comment") {
                break;
            }
            if sibling.end_position().row + 1 < expected_row {
                break;
            }
            let text = sibling
                .utf8_text(self.source.as_bytes())
                .unwrap_or_default();
            parts.push(clean_comment(text));
            expected_row = sibling.start_position().row;
            current = sibling.prev_sibling();
        }

        parts.reverse();
        parts.join("\n").trim().to_string()
    }
}

fn definition_kind(language: &Language, kind: &str) -> Option<NodeKind> {
    let mapped = match (language, kind) {
        (Language::Rust, "function_item") => NodeKind::Function,
        (Language::Rust, "struct_item" | "enum_item" | "trait_item") => NodeKind::Class,

        (Language::Python, "function_definition") => NodeKind::Function,
        (Language::Python, "class_definition") => NodeKind::Class,

        (
            Language::JavaScript | Language::TypeScript,
            "function_declaration" | "generator_function_declaration" | "method_definition",
        ) => NodeKind::Function,
        (Language::JavaScript | Language::TypeScript, "class_declaration") => NodeKind::Class,
        (Language::TypeScript, "interface_declaration") => NodeKind::Class,

        (Language::Go, "function_declaration" | "method_declaration") => NodeKind::Function,
        (Language::Go, "type_spec") => NodeKind::Class,

        (Language::Java, "method_declaration" | "constructor_declaration") => NodeKind::Function,
        (
            Language::Java,
            "class_declaration" | "interface_declaration" | "enum_declaration",
        ) => NodeKind::Class,

        _ => return None,
    };
    // Guard against grammars sharing kind names with different shapes.
    debug_assert!(is_definition_kind(kind) || kind == "type_spec");
    Some(mapped)
}

fn is_call_kind(kind: &str) -> bool {
    matches!(kind, "call_expression" | "call" | "method_invocation")
}

fn is_import_kind(kind: &str) -> bool {
    matches!(
        kind,
        "import_statement" | "import_from_statement" | "use_declaration" | "import_declaration"
    )
}

/// Pull candidate module/symbol names out of an import declaration. The
/// resolver drops anything that does not map to a known node, so this errs
/// on the side of collecting too much.
fn collect_import_names(node: &Node, source: &str, out: &mut Vec<String>) {
    match node.kind() {
        "identifier" => {
            if let Ok(text) = node.utf8_text(source.as_bytes()) {
                push_unique(out, text.to_string());
            }
        }
        "dotted_name" => {
            if let Ok(text) = node.utf8_text(source.as_bytes()) {
                for part in text.split('.') {
                    push_unique(out, part.to_string());
                }
            }
            return;
        }
        "string" | "string_literal" | "interpreted_string_literal" | "raw_string_literal" => {
            if let Ok(raw) = node.utf8_text(source.as_bytes()) {
                push_unique(out, module_name_from_path(strip_string_quotes(raw)));
            }
            return;
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_import_names(&child, source, out);
    }
}

fn push_unique(out: &mut Vec<String>, name: String) {
    if !name.is_empty() && !out.contains(&name) {
        out.push(name);
    }
}

/// `./lib/utils.js` → `utils`, `github.com/acme/widgets` → `widgets`.
fn module_name_from_path(path: &str) -> String {
    let tail = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
    match tail.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem.to_string(),
        _ => tail.to_string(),
    }
}

fn strip_string_quotes(raw: &str) -> &str {
    let raw = raw.trim();
    for quote in ["\"\"\"", "'''", "\"", "'", "`"] {
        if raw.len() >= 2 * quote.len() && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[quote.len()..raw.len() - quote.len()];
        }
    }
    raw
}

fn clean_comment(text: &str) -> String {
    let mut lines = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        let line = line
            .trim_start_matches("///")
            .trim_start_matches("//!")
            .trim_start_matches("//")
            .trim_start_matches("/**")
            .trim_start_matches("/*")
            .trim_end_matches("*/")
            .trim_start_matches('*')
            .trim_start_matches('#')
            .trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines.join("\n")
}

fn cap_code(source: &str, cap: usize) -> String {
    if source.len() <= cap {
        return source.to_string();
    }
    let mut cut = cap;
    while !source.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}\n... (file truncated, {} more characters)",
        &source[..cut],
        source.len() - cut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(language: Language, source: &str, relpath: &str) -> FileExtraction {
        let registry = crate::LanguageRegistry::new();
        let mut parser = registry.create_parser(&language).unwrap();
        let tree = parser.parse(source, None).unwrap();
        extract_file(&language, &tree, source, relpath)
    }

    #[test]
    fn python_function_with_docstring() {
        let source = "def hello():\n    \"\"\"Say hello.\"\"\"\n    return 'world'\n";
        let result = extract(Language::Python, source, "hello.py");

        // file node + function node
        assert_eq!(result.nodes.len(), 2);
        let func = &result.nodes[1];
        assert_eq!(func.id, "function:hello:hello.py:1");
        assert_eq!(func.kind, NodeKind::Function);
        assert_eq!(func.doc, "Say hello.");
        assert_eq!(func.start_line, 1);
        assert_eq!(func.end_line, 3);
        assert!(func.code.starts_with("def hello"));
    }

    #[test]
    fn python_single_line_function_spans_one_line() {
        let source = "def hello(): return \"world\"\n";
        let result = extract(Language::Python, source, "hello.py");
        let func = &result.nodes[1];
        assert_eq!(func.start_line, 1);
        assert_eq!(func.end_line, 1);
        assert_eq!(func.cyclomatic, 1);
    }

    #[test]
    fn python_method_gets_qualified_id() {
        let source = concat!(
            "class Greeter:\n",
            "    def greet(self):\n",
            "        return 'hi'\n",
        );
        let result = extract(Language::Python, source, "greeter.py");
        let ids: Vec<&str> = result.nodes.iter().map(|n| n.id.as_str()).collect();
        assert!(ids.contains(&"class:Greeter:greeter.py:1"));
        assert!(ids.contains(&"function:Greeter.greet:greeter.py:2"));
    }

    #[test]
    fn python_calls_are_attributed_to_enclosing_function() {
        let source = "def a():\n    b()\n";
        let result = extract(Language::Python, source, "a.py");
        assert_eq!(result.calls.len(), 1);
        assert_eq!(result.calls[0].name, "b");
        assert_eq!(result.calls[0].caller, "function:a:a.py:1");
        assert!(result.calls[0].qualified.is_none());
    }

    #[test]
    fn python_attribute_call_keeps_qualified_form() {
        let source = "def a(x):\n    x.save()\n";
        let result = extract(Language::Python, source, "a.py");
        assert_eq!(result.calls.len(), 1);
        assert_eq!(result.calls[0].name, "save");
        assert_eq!(result.calls[0].qualified.as_deref(), Some("x.save"));
    }

    #[test]
    fn python_imports_collect_module_and_symbol_names() {
        let source = "from utils import helper\nimport os\n";
        let result = extract(Language::Python, source, "main.py");
        let names: Vec<&str> = result.imports.iter().map(|i| i.name.as_str()).collect();
        assert!(names.contains(&"utils"));
        assert!(names.contains(&"helper"));
        assert!(names.contains(&"os"));
        for import in &result.imports {
            assert_eq!(import.importer, result.nodes[0].id);
        }
    }

    #[test]
    fn rust_items_and_method_calls() {
        let source = concat!(
            "/// A counter.\n",
            "struct Counter {\n",
            "    total: u64,\n",
            "}\n",
            "\n",
            "impl Counter {\n",
            "    fn bump(&mut self) {\n",
            "        self.total += 1;\n",
            "        log();\n",
            "    }\n",
            "}\n",
            "\n",
            "fn log() {}\n",
        );
        let result = extract(Language::Rust, source, "counter.rs");

        let ids: Vec<&str> = result.nodes.iter().map(|n| n.id.as_str()).collect();
        assert!(ids.contains(&"class:Counter:counter.rs:2"));
        assert!(ids.contains(&"function:Counter.bump:counter.rs:7"));
        assert!(ids.contains(&"function:log:counter.rs:13"));

        let counter = result.nodes.iter().find(|n| n.name == "Counter").unwrap();
        assert_eq!(counter.doc, "A counter.");

        let call = result.calls.iter().find(|c| c.name == "log").unwrap();
        assert_eq!(call.caller, "function:Counter.bump:counter.rs:7");
    }

    #[test]
    fn javascript_classes_methods_and_imports() {
        let source = concat!(
            "import { render } from './render.js';\n",
            "\n",
            "// Top level widget.\n",
            "class Widget {\n",
            "  draw() {\n",
            "    render(this);\n",
            "  }\n",
            "}\n",
        );
        let result = extract(Language::JavaScript, source, "widget.js");

        let ids: Vec<&str> = result.nodes.iter().map(|n| n.id.as_str()).collect();
        assert!(ids.contains(&"class:Widget:widget.js:4"));
        assert!(ids.contains(&"function:Widget.draw:widget.js:5"));

        let widget = result.nodes.iter().find(|n| n.name == "Widget").unwrap();
        assert_eq!(widget.doc, "Top level widget.");

        let names: Vec<&str> = result.imports.iter().map(|i| i.name.as_str()).collect();
        assert!(names.contains(&"render"));
    }

    #[test]
    fn go_functions_and_types() {
        let source = concat!(
            "package main\n",
            "\n",
            "import \"fmt\"\n",
            "\n",
            "type Server struct{}\n",
            "\n",
            "func run() {\n",
            "    fmt.Println(\"up\")\n",
            "}\n",
        );
        let result = extract(Language::Go, source, "main.go");

        let ids: Vec<&str> = result.nodes.iter().map(|n| n.id.as_str()).collect();
        assert!(ids.contains(&"class:Server:main.go:5"));
        assert!(ids.contains(&"function:run:main.go:7"));

        let names: Vec<&str> = result.imports.iter().map(|i| i.name.as_str()).collect();
        assert!(names.contains(&"fmt"));

        let call = result.calls.iter().find(|c| c.name == "Println").unwrap();
        assert_eq!(call.qualified.as_deref(), Some("fmt.Println"));
    }

    #[test]
    fn file_node_code_is_capped() {
        let long_line = "x = 1  # padding to exceed the file code cap\n".repeat(100);
        let result = extract(Language::Python, &long_line, "big.py");
        let file = &result.nodes[0];
        assert!(file.code.len() < long_line.len());
        assert!(file.code.contains("file truncated"));
    }
}
