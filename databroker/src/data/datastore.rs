use std::fmt::{Display, Formatter};

/// The logical datastores a broker can front.
///
/// Each type is backed by exactly one store in a broker. Configuration data
/// is what applications intend, operational data is what the system reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogicalDatastoreType {
    Configuration,
    Operational,
}

impl LogicalDatastoreType {
    pub const ALL: [LogicalDatastoreType; 2] = [
        LogicalDatastoreType::Configuration,
        LogicalDatastoreType::Operational,
    ];
}

impl Display for LogicalDatastoreType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalDatastoreType::Configuration => write!(f, "CONFIGURATION"),
            LogicalDatastoreType::Operational => write!(f, "OPERATIONAL"),
        }
    }
}
