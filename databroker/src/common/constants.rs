/// Topic on which every broker-internal event bus publishes.
pub const BROKER_EVENT: &str = "broker_event";

/// Default prefix of composite transaction identifiers (`DOM-<n>`).
pub const TRANSACTION_ID_PREFIX: &str = "DOM-";
/// Default prefix of chained transaction identifiers (`DOM-CHAIN-<chain>-<n>`).
pub const CHAIN_ID_PREFIX: &str = "DOM-CHAIN-";
/// Default prefix of sharded write transaction identifiers (`SHARDED-DOM-<n>`).
pub const SHARDED_ID_PREFIX: &str = "SHARDED-DOM-";
/// Prefix of ping-pong frontend identifiers.
pub const PING_PONG_ID_PREFIX: &str = "PING-PONG-";

/// Name given to an in-memory store when none is configured.
pub const DEFAULT_STORE_NAME: &str = "memory";

pub(crate) const UNSUPPORTED_DATASTORE_MESSAGE: &str =
    "Requested logical data store is not available.";
