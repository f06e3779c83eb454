mod datastore;
mod node;
mod path;

pub use datastore::*;
pub use node::*;
pub use path::*;

use std::fmt::{Display, Formatter};

/// Human-readable identifier of a transaction.
///
/// Identifiers are unique within a process and only ever used for equality
/// and diagnostics, never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        TransactionId(id.into())
    }

    /// Builds `<prefix><number>`, e.g. `DOM-7`.
    pub fn with_prefix(prefix: &str, number: u64) -> Self {
        TransactionId(format!("{}{}", prefix, number))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        TransactionId::new(id)
    }
}
