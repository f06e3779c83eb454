use crate::data::{DataPath, NormalizedNode};
use crate::store::{
    DataChangeEvent, DataChangeListener, DataChangeScope, DataTreeCandidate,
    DataTreeChangeListener,
};
use basu::error::BasuError;
use basu::event::Event;
use basu::Handle;

/// Published by the in-memory store after every successful commit.
#[derive(Debug, Clone)]
pub(crate) struct StoreCommitEvent {
    pub(crate) before: NormalizedNode,
    pub(crate) after: NormalizedNode,
    pub(crate) modified: Vec<DataPath>,
}

/// Filters commit events down to what one registered listener asked for.
pub(crate) enum CommitEventHandler {
    DataChange {
        path: DataPath,
        scope: DataChangeScope,
        listener: DataChangeListener,
    },
    TreeChange {
        path: DataPath,
        listener: DataTreeChangeListener,
    },
}

impl CommitEventHandler {
    fn deliver(&self, event: &StoreCommitEvent) -> crate::errors::BrokerResult<()> {
        match self {
            CommitEventHandler::DataChange {
                path,
                scope,
                listener,
            } => {
                let changed: Vec<DataPath> = event
                    .modified
                    .iter()
                    .filter(|m| scope.covers(path, m))
                    .cloned()
                    .collect();
                if changed.is_empty() {
                    return Ok(());
                }

                let original = event.before.find(path).cloned();
                let updated = event.after.find(path).cloned();
                if original == updated {
                    return Ok(());
                }
                listener.on_data_changed(DataChangeEvent::new(
                    path.clone(),
                    *scope,
                    original,
                    updated,
                    changed,
                ))
            }
            CommitEventHandler::TreeChange { path, listener } => {
                let touched = event
                    .modified
                    .iter()
                    .any(|m| m.contains(path) || path.contains(m));
                if !touched {
                    return Ok(());
                }

                let candidate = DataTreeCandidate::new(
                    path.clone(),
                    event.before.find(path).cloned(),
                    event.after.find(path).cloned(),
                );
                match candidate {
                    Some(candidate) => listener.on_data_tree_changed(vec![candidate]),
                    None => Ok(()),
                }
            }
        }
    }

    fn path(&self) -> &DataPath {
        match self {
            CommitEventHandler::DataChange { path, .. } => path,
            CommitEventHandler::TreeChange { path, .. } => path,
        }
    }
}

impl Handle<StoreCommitEvent> for CommitEventHandler {
    fn handle(&self, event: &Event<StoreCommitEvent>) -> Result<(), BasuError> {
        // a failing listener must not keep the event from the others
        if let Err(e) = self.deliver(&event.data) {
            log::warn!("Change listener at {} failed: {}", self.path(), e);
        }
        Ok(())
    }
}
