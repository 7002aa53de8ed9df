use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Function,
    Class,
    File,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Function => "function",
            NodeKind::Class => "class",
            NodeKind::File => "file",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "function" => Ok(NodeKind::Function),
            "class" => Ok(NodeKind::Class),
            "file" => Ok(NodeKind::File),
            other => Err(format!("unknown node kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Call,
    Import,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::Call => "call",
            EdgeKind::Import => "import",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    Other(String),
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Java => "java",
            Language::Other(s) => s.as_str(),
        };
        write!(f, "{}", s)
    }
}

/// A top-level program unit extracted from a repository: a function, a class
/// or a whole file. Serializes to exactly the `graph.json` node shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeNode {
    pub id: String,
    /// Duplicate of `name`, kept for downstream consumers that key on it.
    pub label: String,
    pub name: String,
    pub kind: NodeKind,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub code: String,
    pub doc: String,
    pub language: Language,
    pub loc: u32,
    pub cyclomatic: u32,
    pub num_calls_in: u32,
    pub num_calls_out: u32,
}

impl CodeNode {
    pub fn new(
        kind: NodeKind,
        qualname: &str,
        name: impl Into<String>,
        file: impl Into<String>,
        start_line: u32,
        end_line: u32,
        language: Language,
    ) -> Self {
        let name = name.into();
        let file = file.into();
        Self {
            id: node_id(kind, qualname, &file, start_line),
            label: name.clone(),
            name,
            kind,
            file,
            start_line,
            end_line,
            code: String::new(),
            doc: String::new(),
            language,
            loc: 0,
            cyclomatic: 1,
            num_calls_in: 0,
            num_calls_out: 0,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn with_cyclomatic(mut self, cyclomatic: u32) -> Self {
        self.cyclomatic = cyclomatic;
        self
    }
}

/// Canonical node identifier: `<kind>:<qualname>:<relpath>:<start_line>`.
pub fn node_id(kind: NodeKind, qualname: &str, relpath: &str, start_line: u32) -> String {
    format!("{}:{}:{}:{}", kind, qualname, relpath, start_line)
}

/// A directed relation between two node ids. `ambiguous` marks edges whose
/// target could not be uniquely resolved by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    #[serde(default)]
    pub ambiguous: bool,
}

impl CodeEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            ambiguous: false,
        }
    }

    pub fn ambiguous(mut self) -> Self {
        self.ambiguous = true;
        self
    }
}
