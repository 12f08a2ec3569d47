//! Deep merge of captured fragments into progress and timing trees.
//!
//! Keys present in the base but absent from the fragment are never removed.
//! Where both sides hold a branch the merge recurses; anywhere else the
//! fragment wins. Untouched subtrees are shared with the base.

use prc_schemas::tree::{Branch, Key, Node, Tree};
use std::sync::Arc;

pub fn merge<L: Clone>(base: Option<&Tree<L>>, fragment: &Tree<L>) -> Tree<L> {
    match base {
        Some(base) => Tree::from_root(merge_branch(base.root(), fragment.root())),
        None => fragment.clone(),
    }
}

fn merge_branch<L: Clone>(base: &Branch<L>, fragment: &Branch<L>) -> Branch<L> {
    let mut merged = base.clone();
    for (key, incoming) in fragment {
        let next = match (base.get(key), incoming.as_ref()) {
            (Some(existing), _) if Arc::ptr_eq(existing, incoming) => continue,
            (Some(existing), Node::Branch(incoming_children)) => match existing.as_ref() {
                Node::Branch(existing_children) => {
                    Arc::new(Node::Branch(merge_branch(existing_children, incoming_children)))
                }
                Node::Leaf(_) => Arc::clone(incoming),
            },
            _ => Arc::clone(incoming),
        };
        merged.insert(key.clone(), next);
    }
    merged
}

/// Merges `node` at `parent` + `key` only when nothing is recorded there yet.
///
/// Returns `None` when the slot is already taken.
pub fn merge_if_absent<L: Clone>(
    base: &Tree<L>,
    parent: &[Key],
    key: Key,
    node: Node<L>,
) -> Option<Tree<L>> {
    let mut path = parent.to_vec();
    path.push(key.clone());
    if base.contains(&path) {
        return None;
    }
    Some(merge(Some(base), &Tree::singleton(parent, key, node)))
}
