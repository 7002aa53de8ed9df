use tree_sitter::Node;

/// Cyclomatic complexity of a definition: 1 + the number of decision
/// constructs in its body. Nested function and class definitions are
/// excluded; each gets its own node with its own complexity.
pub fn cyclomatic_complexity(node: &Node, source: &str) -> u32 {
    1 + count_decisions(node, source, true)
}

/// Node kinds that produce their own graph nodes; counting stops here.
pub(crate) fn is_definition_kind(kind: &str) -> bool {
    matches!(
        kind,
        "function_definition"
            | "class_definition"
            | "function_item"
            | "struct_item"
            | "enum_item"
            | "trait_item"
            | "function_declaration"
            | "generator_function_declaration"
            | "method_definition"
            | "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "method_declaration"
            | "constructor_declaration"
    )
}

fn count_decisions(node: &Node, source: &str, is_root: bool) -> u32 {
    let kind = node.kind();

    if !is_root && is_definition_kind(kind) {
        return 0;
    }

    let mut count = 0;
    if is_decision_point(kind) {
        count += 1;
    }
    if is_logical_connective(node, source) {
        count += 1;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        count += count_decisions(&child, source, false);
    }
    count
}

/// Branch constructs across Rust, Python, JavaScript, TypeScript, Go, Java:
/// if/elif, loops, case/when clauses, ternaries, exception handlers and
/// comprehension filters.
fn is_decision_point(kind: &str) -> bool {
    matches!(
        kind,
        // if / elif
        "if_statement"
            | "if_expression"
            | "elif_clause"
            // while
            | "while_statement"
            | "while_expression"
            // for
            | "for_statement"
            | "for_expression"
            | "for_in_statement"
            | "for_of_statement"
            | "enhanced_for_statement"
            // case / when
            | "match_arm"
            | "case_clause"
            | "switch_case"
            | "switch_rule"
            | "switch_block_statement_group"
            | "expression_case"
            | "type_case"
            | "communication_case"
            // ternary
            | "conditional_expression"
            | "ternary_expression"
            // exception handlers
            | "catch_clause"
            | "except_clause"
            // comprehension filter (Python)
            | "if_clause"
    )
}

/// `&&` / `||` (and Python's `and` / `or`). Python spells these as a
/// dedicated `boolean_operator` node; the C-family grammars use
/// `binary_expression` with an operator field.
fn is_logical_connective(node: &Node, source: &str) -> bool {
    match node.kind() {
        "boolean_operator" => true,
        "binary_expression" => node
            .child_by_field_name("operator")
            .and_then(|op| op.utf8_text(source.as_bytes()).ok())
            .map(|op| op == "&&" || op == "||")
            .unwrap_or(false),
        _ => false,
    }
}
