use crate::data::DataPath;
use im::OrdMap;
use std::fmt::{Display, Formatter};

/// Scalar payload of a leaf node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeafValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

impl Display for LeafValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LeafValue::String(s) => write!(f, "{:?}", s),
            LeafValue::Integer(i) => write!(f, "{}", i),
            LeafValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for LeafValue {
    fn from(value: &str) -> Self {
        LeafValue::String(value.to_string())
    }
}

impl From<String> for LeafValue {
    fn from(value: String) -> Self {
        LeafValue::String(value)
    }
}

impl From<i64> for LeafValue {
    fn from(value: i64) -> Self {
        LeafValue::Integer(value)
    }
}

impl From<i32> for LeafValue {
    fn from(value: i32) -> Self {
        LeafValue::Integer(value as i64)
    }
}

impl From<bool> for LeafValue {
    fn from(value: bool) -> Self {
        LeafValue::Boolean(value)
    }
}

/// A value in a data tree.
///
/// The broker never interprets node contents; it only stores, compares and
/// hands them back. Containers keep their children in a persistent ordered
/// map, so cloning a whole tree to take a snapshot is cheap and two trees
/// compare structurally.
///
/// # Examples
///
/// ```rust
/// use databroker::data::NormalizedNode;
///
/// let node = NormalizedNode::container()
///     .with_child("name", NormalizedNode::leaf("eth0"))
///     .with_child("mtu", NormalizedNode::leaf(1500));
/// assert_eq!(node.child("mtu"), Some(&NormalizedNode::leaf(1500)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedNode {
    Leaf(LeafValue),
    Container(OrdMap<String, NormalizedNode>),
}

impl NormalizedNode {
    pub fn leaf(value: impl Into<LeafValue>) -> Self {
        NormalizedNode::Leaf(value.into())
    }

    /// An empty container.
    pub fn container() -> Self {
        NormalizedNode::Container(OrdMap::new())
    }

    /// Returns this node with `child` set under `name`. A leaf is replaced by
    /// a container holding only the child.
    pub fn with_child(self, name: &str, child: NormalizedNode) -> Self {
        let mut children = match self {
            NormalizedNode::Container(children) => children,
            NormalizedNode::Leaf(_) => OrdMap::new(),
        };
        children.insert(name.to_string(), child);
        NormalizedNode::Container(children)
    }

    pub fn child(&self, name: &str) -> Option<&NormalizedNode> {
        match self {
            NormalizedNode::Container(children) => children.get(name),
            NormalizedNode::Leaf(_) => None,
        }
    }

    pub fn children(&self) -> Option<&OrdMap<String, NormalizedNode>> {
        match self {
            NormalizedNode::Container(children) => Some(children),
            NormalizedNode::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafValue> {
        match self {
            NormalizedNode::Leaf(value) => Some(value),
            NormalizedNode::Container(_) => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, NormalizedNode::Leaf(_))
    }

    /// Descends along `path` starting from this node.
    pub fn find(&self, path: &DataPath) -> Option<&NormalizedNode> {
        path.args()
            .iter()
            .try_fold(self, |node, arg| node.child(arg))
    }

    /// Merges `other` into this node.
    ///
    /// Containers merge child by child, recursively; anything else is
    /// replaced by `other`.
    pub fn merged(&self, other: &NormalizedNode) -> NormalizedNode {
        match (self, other) {
            (NormalizedNode::Container(mine), NormalizedNode::Container(theirs)) => {
                let mut children = mine.clone();
                for (name, node) in theirs.iter() {
                    let merged = match mine.get(name) {
                        Some(existing) => existing.merged(node),
                        None => node.clone(),
                    };
                    children.insert(name.clone(), merged);
                }
                NormalizedNode::Container(children)
            }
            _ => other.clone(),
        }
    }
}
