//! Serialization of built trees into the textual decision procedure.
//!
//! Both serializers are pure functions over the node variants; the
//! emitted block is a metadata header followed by a single procedure
//! over an attribute-keyed `data` lookup.
use crate::data::Value;
use crate::node::{BranchNode, SplitNode, TestKind};
use chrono::Local;
use std::time::Duration;

/// Metadata header shared by both classifiers.
pub(crate) fn header(classifier: &str, rows: usize, columns: &[String], elapsed: Duration) -> String {
    let lines = [
        format!("# Created: {}", Local::now().format("%Y-%m-%d %H:%M:%S %z")),
        format!("# Rows: {}", rows),
        format!("# Columns: {}", columns.join(", ")),
        format!("# Classifier: {}", classifier),
        format!("# Elapsed: {} seconds", elapsed.as_secs_f64()),
        "#".to_string(),
    ];
    lines.join("\n")
}

/// Render a binary tree as a named procedure of nested conditionals.
pub(crate) fn split_procedure(name: &str, root: &SplitNode) -> String {
    let lines = [format!("def {}(data)", name), split_node(root, 1), "end".to_string()];
    lines.join("\n")
}

fn split_node(node: &SplitNode, depth: usize) -> String {
    let sp = "  ".repeat(depth);
    match node {
        SplitNode::Leaf { labels } => format!("{}return '{}'", sp, labels.join(", ")),
        SplitNode::Internal {
            attribute,
            test,
            value,
            left,
            right,
        } => {
            let test_line = match test {
                TestKind::Less => format!("{}if data['{}'] < {} then", sp, attribute, value),
                TestKind::Equal => format!("{}if data['{}'] == {} then", sp, attribute, quoted(value)),
            };
            let lines = [
                test_line,
                split_node(left, depth + 1),
                format!("{}else", sp),
                split_node(right, depth + 1),
                format!("{}end", sp),
            ];
            lines.join("\n")
        }
    }
}

/// Render a multi-way tree as a named procedure of chained
/// `if`/`elsif` conditionals, one chain per branch node.
pub(crate) fn branch_procedure(name: &str, root: &BranchNode) -> String {
    let lines = [format!("def {}(data)", name), branch_node(root, 1), "end".to_string()];
    lines.join("\n")
}

fn branch_node(node: &BranchNode, depth: usize) -> String {
    let sp = "  ".repeat(depth);
    match node {
        BranchNode::Leaf { labels } => format!("{}return '{}'", sp, labels.join(", ")),
        BranchNode::Branch { attribute, children } => {
            let mut lines = Vec::new();
            for (i, (key, child)) in children.iter().enumerate() {
                let keyword = if i == 0 { "if" } else { "elsif" };
                lines.push(format!("{}{} data['{}'] == {} then", sp, keyword, attribute, quoted(key)));
                match child {
                    BranchNode::Leaf { labels } => lines.push(format!("{}  return '{}'", sp, labels.join(", "))),
                    branch => lines.push(branch_node(branch, depth + 1)),
                }
            }
            lines.push(format!("{}end", sp));
            lines.join("\n")
        }
    }
}

// Symbol values are quoted in the emitted procedure, numbers are not.
fn quoted(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}
