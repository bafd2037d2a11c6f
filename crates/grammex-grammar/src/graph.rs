//! Cycle search over small name graphs (inheritance, left-call edges).

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Find a cycle with a three-colour depth-first search.
///
/// Returns the cycle as a path that starts and ends with the same node.
/// Edges to nodes missing from `graph` are followed as leaves. Visits nodes
/// in insertion order, so the reported cycle is deterministic.
pub(crate) fn find_cycle(graph: &IndexMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut marks: FxHashMap<&str, Mark> = FxHashMap::default();
    let mut path: Vec<&str> = Vec::new();

    for node in graph.keys() {
        if !marks.contains_key(node.as_str()) {
            if let Some(cycle) = visit(graph, node, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit<'a>(
    graph: &'a IndexMap<String, Vec<String>>,
    node: &'a str,
    marks: &mut FxHashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    match marks.get(node) {
        Some(Mark::Done) => return None,
        Some(Mark::InProgress) => {
            let start = path.iter().position(|&n| n == node).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        None => {}
    }

    marks.insert(node, Mark::InProgress);
    path.push(node);
    if let Some(edges) = graph.get(node) {
        for next in edges {
            if let Some(cycle) = visit(graph, next, marks, path) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    marks.insert(node, Mark::Done);
    None
}
