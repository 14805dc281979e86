//! Conversation composition.
//!
//! Each post is rendered with its full comment tree underneath it. The tree
//! is indexed once (parent id to child rows) and walked with an explicit
//! stack, so depth is bounded by memory rather than the call stack.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use modwatch_core::table::str_field;
use modwatch_core::{Record, Table, TableKind};
use serde_json::Value;

use crate::error::{require_columns, ReviewError};
use crate::id_cell;

const NO_TITLE: &str = "[No Title]";
const NO_CONTENT: &str = "[No Content]";
const UNKNOWN_AUTHOR: &str = "[Unknown Author]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub post_id: String,
    pub full_conversation: String,
}

struct CommentNode<'a> {
    id: &'a str,
    author: &'a str,
    body: &'a str,
}

/// Missing, `null` and empty cells all fall back to `default`.
fn text_or<'a>(record: &'a Record, column: &str, default: &'a str) -> &'a str {
    match str_field(record, column) {
        Some(value) if !value.is_empty() => value,
        _ => default,
    }
}

/// One conversation per distinct post, in post-table order. Repeated post or
/// comment ids (the tables are append-only) keep their first row.
///
/// # Errors
///
/// Returns [`ReviewError::MissingColumns`] if either table lacks a column
/// the rendering needs.
pub fn compose_conversations(
    posts: &Table,
    comments: &Table,
) -> Result<Vec<Conversation>, ReviewError> {
    require_columns(posts, TableKind::Posts, &["post_id", "title", "selftext", "author"])?;
    require_columns(
        comments,
        TableKind::Comments,
        &["comment_id", "body", "parent_id", "author"],
    )?;

    let comment_records = comments.records();
    let mut seen_comments = HashSet::new();
    let mut nodes = Vec::new();
    let mut top_level: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut replies: HashMap<&str, Vec<usize>> = HashMap::new();

    for record in &comment_records {
        let Some(id) = str_field(record, "comment_id") else {
            continue;
        };
        if !seen_comments.insert(id) {
            continue;
        }
        let Some(raw_parent) = str_field(record, "parent_id") else {
            continue;
        };
        let (children, parent_id) = if let Some(post) = raw_parent.strip_prefix("t3_") {
            (&mut top_level, post)
        } else if let Some(comment) = raw_parent.strip_prefix("t1_") {
            (&mut replies, comment)
        } else {
            continue;
        };
        children.entry(parent_id).or_default().push(nodes.len());
        nodes.push(CommentNode {
            id,
            author: text_or(record, "author", UNKNOWN_AUTHOR),
            body: text_or(record, "body", NO_CONTENT),
        });
    }

    let mut seen_posts = HashSet::new();
    let mut conversations = Vec::new();
    for record in posts.records() {
        let Some(post_id) = id_cell(record.get("post_id")) else {
            continue;
        };
        if !seen_posts.insert(post_id.clone()) {
            continue;
        }

        let mut text = String::new();
        let _ = writeln!(text, "Post ID: {post_id}");
        let _ = writeln!(text, "Post Title: {}", text_or(&record, "title", NO_TITLE));
        let _ = writeln!(text, "Post Content: {}", text_or(&record, "selftext", NO_CONTENT));
        let _ = writeln!(text, "Post Author: {}", text_or(&record, "author", UNKNOWN_AUTHOR));
        text.push_str(&"-".repeat(50));
        text.push('\n');

        match top_level.get(post_id.as_str()) {
            Some(roots) if !roots.is_empty() => {
                render_threads(&mut text, roots, &nodes, &replies);
            }
            _ => text.push_str("No comments\n"),
        }

        conversations.push(Conversation {
            post_id,
            full_conversation: text,
        });
    }
    Ok(conversations)
}

/// Pre-order walk of every thread under `roots`, two spaces of indent per
/// level. Replies name the comment they answer.
fn render_threads(
    out: &mut String,
    roots: &[usize],
    nodes: &[CommentNode<'_>],
    replies: &HashMap<&str, Vec<usize>>,
) {
    let mut stack: Vec<(usize, usize, Option<usize>)> =
        roots.iter().rev().map(|&index| (index, 0, None)).collect();
    let mut visited = HashSet::new();

    while let Some((index, depth, parent)) = stack.pop() {
        if !visited.insert(index) {
            continue;
        }
        let node = &nodes[index];
        let indent = "  ".repeat(depth);
        let _ = writeln!(out, "{indent}Comment ID: {}", node.id);
        if let Some(parent) = parent {
            let _ = writeln!(
                out,
                "{indent}This comment is a reply to parent comment: {}",
                nodes[parent].id
            );
        }
        let _ = writeln!(out, "{indent}Comment Author: {}", node.author);
        let _ = writeln!(out, "{indent}Comment Body: {}", node.body);
        let _ = writeln!(out, "{indent}{}", "-".repeat(30));

        if let Some(children) = replies.get(node.id) {
            stack.extend(
                children
                    .iter()
                    .rev()
                    .map(|&child| (child, depth + 1, Some(index))),
            );
        }
    }
}

/// The `conversations` table for `conversations`.
#[must_use]
pub fn conversations_table(conversations: &[Conversation]) -> Table {
    let mut table = Table::new(vec![
        "post_id".to_string(),
        "full_conversation".to_string(),
    ]);
    table.rows = conversations
        .iter()
        .map(|c| {
            vec![
                Value::from(c.post_id.clone()),
                Value::from(c.full_conversation.clone()),
            ]
        })
        .collect();
    table
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        Table {
            columns: columns.iter().map(ToString::to_string).collect(),
            rows,
        }
    }

    fn posts(rows: Vec<Vec<Value>>) -> Table {
        table(&["post_id", "title", "selftext", "author"], rows)
    }

    fn comments(rows: Vec<Vec<Value>>) -> Table {
        table(&["comment_id", "post_id", "parent_id", "body", "author"], rows)
    }

    #[test]
    fn renders_nested_thread_in_pre_order() {
        let posts = posts(vec![vec![json!("p1"), json!("Hello"), json!("Body"), json!("op")]]);
        let comments = comments(vec![
            vec![json!("c1"), json!("p1"), json!("t3_p1"), json!("first"), json!("a")],
            vec![json!("c2"), json!("p1"), json!("t1_c1"), json!("reply"), json!("b")],
            vec![json!("c3"), json!("p1"), json!("t3_p1"), json!("second"), json!("c")],
        ]);

        let conversations = compose_conversations(&posts, &comments).unwrap();
        assert_eq!(conversations.len(), 1);

        let dashes50 = "-".repeat(50);
        let dashes30 = "-".repeat(30);
        let expected = format!(
            "Post ID: p1\nPost Title: Hello\nPost Content: Body\nPost Author: op\n{dashes50}\n\
             Comment ID: c1\nComment Author: a\nComment Body: first\n{dashes30}\n\
             \x20\x20Comment ID: c2\n\
             \x20\x20This comment is a reply to parent comment: c1\n\
             \x20\x20Comment Author: b\n\
             \x20\x20Comment Body: reply\n\
             \x20\x20{dashes30}\n\
             Comment ID: c3\nComment Author: c\nComment Body: second\n{dashes30}\n"
        );
        assert_eq!(conversations[0].full_conversation, expected);
    }

    #[test]
    fn post_without_comments_and_missing_fields_use_defaults() {
        let posts = posts(vec![vec![json!("p2"), Value::Null, json!(""), Value::Null]]);
        let conversations = compose_conversations(&posts, &comments(vec![])).unwrap();

        let text = &conversations[0].full_conversation;
        assert!(text.contains("Post Title: [No Title]\n"));
        assert!(text.contains("Post Content: [No Content]\n"));
        assert!(text.contains("Post Author: [Unknown Author]\n"));
        assert!(text.ends_with("No comments\n"));
    }

    #[test]
    fn duplicate_rows_are_rendered_once() {
        let row = vec![json!("p1"), json!("t"), json!("s"), json!("a")];
        let posts = posts(vec![row.clone(), row]);
        let c = vec![json!("c1"), json!("p1"), json!("t3_p1"), json!("x"), json!("y")];
        let comments = comments(vec![c.clone(), c]);

        let conversations = compose_conversations(&posts, &comments).unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(
            conversations[0]
                .full_conversation
                .matches("Comment ID: c1")
                .count(),
            1
        );
    }

    #[test]
    fn deep_threads_render_every_level() {
        let posts = posts(vec![vec![json!("p"), json!("t"), json!("s"), json!("a")]]);
        let mut rows = vec![vec![json!("c0"), json!("p"), json!("t3_p"), json!("b"), json!("a")]];
        for i in 1..1_000 {
            rows.push(vec![
                json!(format!("c{i}")),
                json!("p"),
                json!(format!("t1_c{}", i - 1)),
                json!("b"),
                json!("a"),
            ]);
        }
        let conversations = compose_conversations(&posts, &comments(rows)).unwrap();
        assert_eq!(
            conversations[0].full_conversation.matches("Comment ID:").count(),
            1_000
        );
    }

    #[test]
    fn missing_columns_are_reported() {
        let posts = table(&["post_id", "title"], vec![]);
        let err = compose_conversations(&posts, &comments(vec![])).unwrap_err();
        assert!(
            matches!(err, ReviewError::MissingColumns { kind: TableKind::Posts, ref missing } if missing == &["selftext", "author"])
        );
    }
}
