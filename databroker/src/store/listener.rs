use crate::data::{DataPath, NormalizedNode};
use crate::errors::BrokerResult;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Which changes below a registration path a data-change listener hears about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataChangeScope {
    /// Only the node at the registration path itself is replaced or removed.
    Base,
    /// The node itself or one of its direct children changes.
    One,
    /// Anything at or below the registration path changes.
    Subtree,
}

impl DataChangeScope {
    /// Decides whether a modification at `modified` is visible to a listener
    /// registered at `registered` with this scope.
    ///
    /// A modification above the registration path replaces the registered
    /// node and is visible in every scope.
    pub fn covers(&self, registered: &DataPath, modified: &DataPath) -> bool {
        if modified.contains(registered) {
            return true;
        }
        match self {
            DataChangeScope::Base => false,
            DataChangeScope::One => modified.parent().as_ref() == Some(registered),
            DataChangeScope::Subtree => registered.contains(modified),
        }
    }
}

/// Notification delivered to a [`DataChangeListener`] once per commit.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChangeEvent {
    path: DataPath,
    scope: DataChangeScope,
    original: Option<NormalizedNode>,
    updated: Option<NormalizedNode>,
    changed_paths: Vec<DataPath>,
}

impl DataChangeEvent {
    pub fn new(
        path: DataPath,
        scope: DataChangeScope,
        original: Option<NormalizedNode>,
        updated: Option<NormalizedNode>,
        changed_paths: Vec<DataPath>,
    ) -> Self {
        DataChangeEvent {
            path,
            scope,
            original,
            updated,
            changed_paths,
        }
    }

    /// The registration path.
    pub fn path(&self) -> &DataPath {
        &self.path
    }

    pub fn scope(&self) -> DataChangeScope {
        self.scope
    }

    /// The node at the registration path before the commit.
    pub fn original(&self) -> Option<&NormalizedNode> {
        self.original.as_ref()
    }

    /// The node at the registration path after the commit.
    pub fn updated(&self) -> Option<&NormalizedNode> {
        self.updated.as_ref()
    }

    /// Modified paths that fall in the listener's scope.
    pub fn changed_paths(&self) -> &[DataPath] {
        &self.changed_paths
    }
}

pub trait DataChangeCallback: Send + Sync + Fn(DataChangeEvent) -> BrokerResult<()> {}

impl<F> DataChangeCallback for F where F: Send + Sync + Fn(DataChangeEvent) -> BrokerResult<()> {}

/// Listener for scoped data-change notifications.
///
/// ```rust
/// use databroker::store::DataChangeListener;
///
/// let listener = DataChangeListener::new(|event| {
///     println!("{} changed", event.path());
///     Ok(())
/// });
/// ```
#[derive(Clone)]
pub struct DataChangeListener {
    on_change: Arc<dyn DataChangeCallback>,
}

impl DataChangeListener {
    pub fn new(on_change: impl DataChangeCallback + 'static) -> Self {
        DataChangeListener {
            on_change: Arc::new(on_change),
        }
    }

    pub fn on_data_changed(&self, event: DataChangeEvent) -> BrokerResult<()> {
        (self.on_change)(event)
    }
}

impl Debug for DataChangeListener {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataChangeListener").finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModificationType {
    Created,
    Modified,
    Deleted,
}

/// Before and after state of one subtree in a commit.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTreeCandidate {
    root_path: DataPath,
    before: Option<NormalizedNode>,
    after: Option<NormalizedNode>,
}

impl DataTreeCandidate {
    /// Returns `None` when `before` and `after` are equal.
    pub fn new(
        root_path: DataPath,
        before: Option<NormalizedNode>,
        after: Option<NormalizedNode>,
    ) -> Option<Self> {
        if before == after {
            return None;
        }
        Some(DataTreeCandidate {
            root_path,
            before,
            after,
        })
    }

    pub fn root_path(&self) -> &DataPath {
        &self.root_path
    }

    pub fn before(&self) -> Option<&NormalizedNode> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&NormalizedNode> {
        self.after.as_ref()
    }

    pub fn modification_type(&self) -> ModificationType {
        match (&self.before, &self.after) {
            (None, _) => ModificationType::Created,
            (Some(_), None) => ModificationType::Deleted,
            (Some(_), Some(_)) => ModificationType::Modified,
        }
    }
}

pub trait DataTreeChangeCallback: Send + Sync + Fn(Vec<DataTreeCandidate>) -> BrokerResult<()> {}

impl<F> DataTreeChangeCallback for F where F: Send + Sync + Fn(Vec<DataTreeCandidate>) -> BrokerResult<()> {}

/// Listener for tree-change notifications, offered by stores that publish
/// before/after candidates.
#[derive(Clone)]
pub struct DataTreeChangeListener {
    on_change: Arc<dyn DataTreeChangeCallback>,
}

impl DataTreeChangeListener {
    pub fn new(on_change: impl DataTreeChangeCallback + 'static) -> Self {
        DataTreeChangeListener {
            on_change: Arc::new(on_change),
        }
    }

    pub fn on_data_tree_changed(&self, changes: Vec<DataTreeCandidate>) -> BrokerResult<()> {
        (self.on_change)(changes)
    }
}

impl Debug for DataTreeChangeListener {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataTreeChangeListener").finish()
    }
}
