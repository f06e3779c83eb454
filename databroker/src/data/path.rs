use crate::data::LogicalDatastoreType;
use itertools::Itertools;
use smallvec::SmallVec;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// Location of a node in a data tree.
///
/// A path is a sequence of string arguments, the empty sequence being the
/// root. Paths are written `/a/b/c`; the root is written `/`.
///
/// # Examples
///
/// ```rust
/// use databroker::data::DataPath;
///
/// let shard = DataPath::parse("/a");
/// let leaf = DataPath::parse("/a/x");
/// assert!(shard.contains(&leaf));
/// assert!(!leaf.contains(&shard));
/// assert_eq!(leaf.to_string(), "/a/x");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DataPath {
    args: SmallVec<[String; 4]>,
}

impl DataPath {
    pub fn root() -> Self {
        DataPath {
            args: SmallVec::new(),
        }
    }

    /// Parses a `/`-separated path. Empty segments are ignored, so `""`,
    /// `"/"` and `"//"` all denote the root.
    pub fn parse(path: &str) -> Self {
        DataPath {
            args: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DataPath {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn child(&self, arg: &str) -> Self {
        let mut args = self.args.clone();
        args.push(arg.to_string());
        DataPath { args }
    }

    /// Returns the parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.args.is_empty() {
            return None;
        }
        let mut args = self.args.clone();
        args.pop();
        Some(DataPath { args })
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn last(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }

    pub fn is_root(&self) -> bool {
        self.args.is_empty()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Returns true if `self` is an ancestor of `other` or equal to it.
    pub fn contains(&self, other: &DataPath) -> bool {
        self.args.len() <= other.args.len()
            && self.args.iter().zip(other.args.iter()).all(|(a, b)| a == b)
    }

    /// Returns this path relative to `ancestor`, if `ancestor` contains it.
    pub fn relative_to(&self, ancestor: &DataPath) -> Option<DataPath> {
        if !ancestor.contains(self) {
            return None;
        }
        Some(DataPath::from_args(
            self.args[ancestor.args.len()..].iter().cloned(),
        ))
    }
}

impl Display for DataPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.args.iter().join("/"))
    }
}

impl Debug for DataPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DataPath({})", self)
    }
}

impl FromStr for DataPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DataPath::parse(s))
    }
}

impl From<&str> for DataPath {
    fn from(s: &str) -> Self {
        DataPath::parse(s)
    }
}

/// A subtree of one logical datastore.
///
/// Used by the sharded write router to describe what a producer may write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataTreeIdentifier {
    datastore: LogicalDatastoreType,
    root_path: DataPath,
}

impl DataTreeIdentifier {
    pub fn new(datastore: LogicalDatastoreType, root_path: DataPath) -> Self {
        DataTreeIdentifier {
            datastore,
            root_path,
        }
    }

    pub fn datastore(&self) -> LogicalDatastoreType {
        self.datastore
    }

    pub fn root_path(&self) -> &DataPath {
        &self.root_path
    }

    /// True when `other` lies in the same datastore at or below this root.
    pub fn contains(&self, other: &DataTreeIdentifier) -> bool {
        self.datastore == other.datastore && self.root_path.contains(&other.root_path)
    }

    /// True when one of the two subtrees contains the other.
    pub fn overlaps(&self, other: &DataTreeIdentifier) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl Display for DataTreeIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.datastore, self.root_path)
    }
}
