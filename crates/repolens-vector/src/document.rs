use repolens_core::CodeNode;

/// Per-node cap on document length fed to the embedder. Documents may be
/// truncated but never omitted.
pub const MAX_DOCUMENT_CHARS: usize = 4000;

/// Snippet cap carried in index payloads; enough for a search-result
/// preview without shipping whole files.
pub const MAX_SNIPPET_CHARS: usize = 500;

/// Render a node into the text that gets embedded: kind, name, location,
/// documentation and code joined with stable separators so identical nodes
/// always produce identical documents.
pub fn make_document(node: &CodeNode) -> String {
    let mut parts = vec![format!(
        "{} {} - {}:{}",
        node.kind, node.name, node.file, node.start_line
    )];
    if !node.doc.is_empty() {
        parts.push(node.doc.clone());
    }
    if !node.code.is_empty() {
        parts.push(node.code.clone());
    }
    truncate_chars(&parts.join("\n\n"), MAX_DOCUMENT_CHARS)
}

/// Payload preview of a node's code.
pub fn make_snippet(node: &CodeNode) -> String {
    truncate_chars(&node.code, MAX_SNIPPET_CHARS)
}

fn truncate_chars(text: &str, cap: usize) -> String {
    if text.len() <= cap {
        return text.to_string();
    }
    let mut cut = cap;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_core::{Language, NodeKind};

    fn node_with_code(code: &str) -> CodeNode {
        CodeNode::new(
            NodeKind::Function,
            "hello",
            "hello",
            "hello.py",
            1,
            3,
            Language::Python,
        )
        .with_code(code)
        .with_doc("Say hello.")
    }

    #[test]
    fn document_contains_kind_name_location_doc_and_code() {
        let doc = make_document(&node_with_code("def hello():\n    return 'world'"));
        assert!(doc.starts_with("function hello - hello.py:1"));
        assert!(doc.contains("Say hello."));
        assert!(doc.contains("def hello()"));
    }

    #[test]
    fn document_is_deterministic() {
        let node = node_with_code("def hello(): pass");
        assert_eq!(make_document(&node), make_document(&node));
    }

    #[test]
    fn oversized_documents_are_truncated_not_dropped() {
        let code = "x = 1\n".repeat(2000);
        let doc = make_document(&node_with_code(&code));
        assert!(doc.len() <= MAX_DOCUMENT_CHARS + 3);
        assert!(doc.ends_with("..."));
    }

    #[test]
    fn snippet_is_capped() {
        let code = "y = 2\n".repeat(200);
        let snippet = make_snippet(&node_with_code(&code));
        assert!(snippet.len() <= MAX_SNIPPET_CHARS + 3);
    }
}
