//! Comment tree flattening.
//!
//! Reply trees are walked with an explicit stack so arbitrarily deep
//! threads cannot exhaust the call stack.

use serde::Serialize;

/// One comment with its position in the tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatComment<T> {
    pub id: String,
    pub parent_id: Option<String>,
    pub depth: usize,
    pub data: T,
}

/// Flatten a reply tree in pre-order.
///
/// `take_children` detaches the replies from a node, so each emitted
/// comment carries only its own fields. `id_of` yields its identifier.
/// Nodes without an id are dropped along with their subtrees.
pub fn flatten_comments<T, C, I>(
    roots: Vec<T>,
    take_children: C,
    id_of: I,
) -> Vec<FlatComment<T>>
where
    C: Fn(&mut T) -> Vec<T>,
    I: Fn(&T) -> Option<String>,
{
    let mut out = Vec::new();
    let mut stack: Vec<(T, Option<String>, usize)> =
        roots.into_iter().rev().map(|node| (node, None, 0)).collect();

    while let Some((mut node, parent_id, depth)) = stack.pop() {
        let Some(id) = id_of(&node) else {
            continue;
        };
        for child in take_children(&mut node).into_iter().rev() {
            stack.push((child, Some(id.clone()), depth + 1));
        }
        out.push(FlatComment {
            id,
            parent_id,
            depth,
            data: node,
        });
    }

    out
}

/// Flatten a JSON comment tree whose replies live under `children_key`.
pub fn flatten_json(
    roots: Vec<serde_json::Value>,
    children_key: &str,
    id_key: &str,
) -> Vec<FlatComment<serde_json::Value>> {
    flatten_comments(
        roots,
        |node| match node.as_object_mut().and_then(|o| o.remove(children_key)) {
            Some(serde_json::Value::Array(children)) => children,
            _ => Vec::new(),
        },
        |node| json_id(node.get(id_key)?),
    )
}

/// Read an id that may be encoded as a string or a number.
pub fn json_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
