//! Transaction composition and commit coordination over the backend stores.

mod chain;
mod commit;
mod composite;
mod data_broker;
mod ping_pong;
mod read_only;
mod sharded;
mod traits;
mod transaction_factory;
mod tree_change;
mod write;

pub use chain::{ChainStatus, TransactionChain, TransactionChainListener};
pub use commit::{CommitCoordinator, CommitStats, TransactionCommitter};
pub use data_broker::DataBroker;
pub use ping_pong::{PingPongDataBroker, PingPongTransaction};
pub use read_only::ReadOnlyTransaction;
pub use sharded::{ShardedDataTreeProducer, ShardedWriteTransaction};
pub use traits::*;
pub use tree_change::DataTreeChangeService;
pub use write::{ForwardedWriteTransaction, ReadWriteTransaction, WriteOnlyTransaction};
