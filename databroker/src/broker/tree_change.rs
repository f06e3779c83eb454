use crate::common::{ListenerRegistration, UNSUPPORTED_DATASTORE_MESSAGE};
use crate::data::{DataTreeIdentifier, LogicalDatastoreType};
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::store::{DataTreeChangeListener, DomStore};
use indexmap::IndexMap;

/// Subtree change notification across all datastores of a broker.
///
/// Only available when every configured store publishes tree changes.
#[derive(Clone)]
pub struct DataTreeChangeService {
    stores: IndexMap<LogicalDatastoreType, DomStore>,
}

impl DataTreeChangeService {
    pub(crate) fn new(stores: &IndexMap<LogicalDatastoreType, DomStore>) -> Option<Self> {
        let missing = stores
            .iter()
            .find(|(_, store)| store.tree_change_publisher().is_none());
        if let Some((datastore, store)) = missing {
            log::debug!(
                "Store {} for {} does not publish tree changes, tree change service disabled",
                store.name(),
                datastore
            );
            return None;
        }

        Some(DataTreeChangeService {
            stores: stores.clone(),
        })
    }

    /// Registers `listener` for changes at and below `tree`.
    pub fn register_data_tree_change_listener(
        &self,
        tree: &DataTreeIdentifier,
        listener: DataTreeChangeListener,
    ) -> BrokerResult<ListenerRegistration> {
        let store = self.stores.get(&tree.datastore()).ok_or_else(|| {
            BrokerError::new(UNSUPPORTED_DATASTORE_MESSAGE, ErrorKind::UnsupportedDatastore)
        })?;
        let publisher = store.tree_change_publisher().ok_or_else(|| {
            BrokerError::new(
                &format!("Store {} does not publish tree changes", store.name()),
                ErrorKind::UnsupportedDatastore,
            )
        })?;
        log::debug!("Registering tree change listener at {}", tree);
        publisher.register_tree_change_listener(tree.root_path(), listener)
    }
}
