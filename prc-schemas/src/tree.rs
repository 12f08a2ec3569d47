//! Typed recursive trees for captured progress and timing.
//!
//! Both trees are keyed first by template step id, then (for sequence steps)
//! by step group id, then by sub-step / parameter / line id. Status flags live
//! as siblings of the captured data at the unit level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Approval and completion markers stored next to a unit's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusFlag {
    ProductionApproved,
    CtqApproved,
    PartialCtqApproved,
    StepCompleted,
}

impl StatusFlag {
    pub const ALL: [StatusFlag; 4] = [
        StatusFlag::ProductionApproved,
        StatusFlag::CtqApproved,
        StatusFlag::PartialCtqApproved,
        StatusFlag::StepCompleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFlag::ProductionApproved => "productionApproved",
            StatusFlag::CtqApproved => "ctqApproved",
            StatusFlag::PartialCtqApproved => "partialCtqApproved",
            StatusFlag::StepCompleted => "stepCompleted",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|flag| flag.as_str() == name)
    }
}

impl fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tree key. Serialized as a plain string so the persisted form stays a
/// JSON object: ids in decimal, flags by name, anything else verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Key {
    Id(u32),
    Flag(StatusFlag),
    Field(String),
}

impl Key {
    pub fn field(name: &str) -> Self {
        Key::Field(name.to_string())
    }
}

impl From<u32> for Key {
    fn from(id: u32) -> Self {
        Key::Id(id)
    }
}

impl From<StatusFlag> for Key {
    fn from(flag: StatusFlag) -> Self {
        Key::Flag(flag)
    }
}

impl From<String> for Key {
    fn from(raw: String) -> Self {
        if let Some(flag) = StatusFlag::parse(&raw) {
            return Key::Flag(flag);
        }
        match raw.parse::<u32>() {
            Ok(id) if id.to_string() == raw => Key::Id(id),
            _ => Key::Field(raw),
        }
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Id(id) => write!(f, "{}", id),
            Key::Flag(flag) => f.write_str(flag.as_str()),
            Key::Field(name) => f.write_str(name),
        }
    }
}

/// A captured value as entered by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    /// Numbers, and text that parses as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Value::Text(s) => s.trim().is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// Start and end of the active work on one sub-step (or one unit).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimingSpan {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl TimingSpan {
    /// Seconds of active work; inverted spans count as zero.
    pub fn duration_seconds(&self) -> f64 {
        let millis = (self.end_time - self.start_time).num_milliseconds();
        (millis.max(0) as f64) / 1000.0
    }
}

pub type Branch<L> = BTreeMap<Key, Arc<Node<L>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node<L> {
    Leaf(L),
    Branch(Branch<L>),
}

impl<L> Node<L> {
    pub fn as_leaf(&self) -> Option<&L> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            Node::Branch(_) => None,
        }
    }

    pub fn as_branch(&self) -> Option<&Branch<L>> {
        match self {
            Node::Branch(branch) => Some(branch),
            Node::Leaf(_) => None,
        }
    }

    pub fn branch<I>(children: I) -> Self
    where
        I: IntoIterator<Item = (Key, Node<L>)>,
    {
        Node::Branch(
            children
                .into_iter()
                .map(|(key, node)| (key, Arc::new(node)))
                .collect(),
        )
    }
}

/// Root of a progress or timing tree. The root is always a branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tree<L> {
    root: Branch<L>,
}

pub type ProgressTree = Tree<Value>;
pub type TimingTree = Tree<TimingSpan>;

impl<L> Default for Tree<L> {
    fn default() -> Self {
        Self {
            root: BTreeMap::new(),
        }
    }
}

impl<L> Tree<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_root(root: Branch<L>) -> Self {
        Self { root }
    }

    /// A tree holding only `node` under `parent` + `key`.
    pub fn singleton(parent: &[Key], key: Key, node: Node<L>) -> Self {
        let mut current = Node::branch([(key, node)]);
        for ancestor in parent.iter().rev() {
            current = Node::branch([(ancestor.clone(), current)]);
        }
        match current {
            Node::Branch(root) => Self { root },
            Node::Leaf(_) => Self::default(),
        }
    }

    pub fn root(&self) -> &Branch<L> {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn get(&self, path: &[Key]) -> Option<&Node<L>> {
        let (first, rest) = path.split_first()?;
        let mut node = self.root.get(first)?.as_ref();
        for key in rest {
            node = node.as_branch()?.get(key)?.as_ref();
        }
        Some(node)
    }

    pub fn contains(&self, path: &[Key]) -> bool {
        self.get(path).is_some()
    }

    /// The branch at `path`; the empty path is the root.
    pub fn branch_at(&self, path: &[Key]) -> Option<&Branch<L>> {
        if path.is_empty() {
            return Some(&self.root);
        }
        self.get(path)?.as_branch()
    }

    pub fn leaf_at(&self, path: &[Key]) -> Option<&L> {
        self.get(path)?.as_leaf()
    }

    /// Every leaf below `path`, depth first in key order.
    pub fn leaves_under(&self, path: &[Key]) -> Vec<&L> {
        fn collect<'a, L>(node: &'a Node<L>, out: &mut Vec<&'a L>) {
            match node {
                Node::Leaf(leaf) => out.push(leaf),
                Node::Branch(children) => children.values().for_each(|c| collect(c, out)),
            }
        }
        let mut out = Vec::new();
        if path.is_empty() {
            self.root.values().for_each(|c| collect(c, &mut out));
        } else if let Some(node) = self.get(path) {
            collect(node, &mut out);
        }
        out
    }
}

impl Tree<Value> {
    /// `true` only when the flag is present and set to boolean true.
    pub fn flag(&self, unit: &[Key], flag: StatusFlag) -> bool {
        let mut path = unit.to_vec();
        path.push(Key::Flag(flag));
        matches!(self.leaf_at(&path), Some(Value::Bool(true)))
    }

    /// Whether `key` under `unit` has captured (non-flag) data.
    pub fn has_value(&self, unit: &[Key], key: &Key) -> bool {
        let mut path = unit.to_vec();
        path.push(key.clone());
        match self.get(&path) {
            Some(Node::Leaf(value)) => !value.is_blank(),
            Some(Node::Branch(children)) => !children.is_empty(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip_through_strings() {
        assert_eq!(Key::from("12".to_string()), Key::Id(12));
        assert_eq!(
            Key::from("ctqApproved".to_string()),
            Key::Flag(StatusFlag::CtqApproved)
        );
        assert_eq!(Key::from("012".to_string()), Key::Field("012".to_string()));
        assert_eq!(Key::from("batchNumber".to_string()), Key::field("batchNumber"));
        assert_eq!(String::from(Key::Flag(StatusFlag::StepCompleted)), "stepCompleted");
    }

    #[test]
    fn progress_tree_reads_persisted_json() {
        let json = r#"{
            "10": {
                "1": { "100": [0.45, 0.52], "101": "ok", "productionApproved": true }
            }
        }"#;
        let tree: ProgressTree = serde_json::from_str(json).unwrap();
        let group = [Key::Id(10), Key::Id(1)];

        assert!(tree.flag(&group, StatusFlag::ProductionApproved));
        assert!(!tree.flag(&group, StatusFlag::CtqApproved));
        assert!(tree.has_value(&group, &Key::Id(100)));
        assert!(!tree.has_value(&group, &Key::Id(102)));
        assert_eq!(
            tree.leaf_at(&[Key::Id(10), Key::Id(1), Key::Id(101)]),
            Some(&Value::Text("ok".to_string()))
        );

        let back = serde_json::to_value(&tree).unwrap();
        assert_eq!(back["10"]["1"]["productionApproved"], serde_json::json!(true));
    }

    #[test]
    fn timing_tree_distinguishes_spans_from_branches() {
        let json = r#"{
            "10": { "1": { "100": {
                "startTime": "2024-03-01T08:00:00Z",
                "endTime": "2024-03-01T08:00:30Z"
            } } }
        }"#;
        let tree: TimingTree = serde_json::from_str(json).unwrap();
        let span = tree
            .leaf_at(&[Key::Id(10), Key::Id(1), Key::Id(100)])
            .unwrap();
        assert_eq!(span.duration_seconds(), 30.0);
        assert_eq!(tree.leaves_under(&[Key::Id(10)]).len(), 1);
    }

    #[test]
    fn singleton_nests_under_parent_path() {
        let tree: ProgressTree = Tree::singleton(
            &[Key::Id(3), Key::Id(7)],
            Key::Flag(StatusFlag::StepCompleted),
            Node::Leaf(Value::Bool(true)),
        );
        assert!(tree.flag(&[Key::Id(3), Key::Id(7)], StatusFlag::StepCompleted));
        assert_eq!(tree.root().len(), 1);
    }

    #[test]
    fn blank_text_is_not_captured_data() {
        let tree: ProgressTree =
            Tree::singleton(&[Key::Id(1)], Key::Id(2), Node::Leaf(Value::Text("  ".into())));
        assert!(!tree.has_value(&[Key::Id(1)], &Key::Id(2)));
    }
}
