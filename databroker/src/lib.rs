//! # Data Broker
//!
//! A transactional broker presenting one logical transaction API over
//! independently implemented backend stores, one per logical datastore
//! (`Configuration`, `Operational`).
//!
//! ## Key Features
//!
//! - **Composite transactions**: read, write and read-write transactions
//!   spanning every datastore, backed by lazily opened store transactions
//! - **Three-phase commit**: `canCommit`, `preCommit` and `commit` driven over
//!   every participating store, aborting all of them on an early failure
//! - **Transaction chains**: each transaction sees the writes of its
//!   predecessor before that predecessor is committed
//! - **Ping-pong writes**: many short logical write transactions batched onto
//!   one backend transaction
//! - **Sharded producers**: exclusive writers over disjoint subtrees
//! - **Change notification**: data-change listeners per store, plus a
//!   tree-change service when every store supports it
//! - **In-memory reference store**: snapshot isolation with optimistic
//!   conflict detection
//!
//! ## Quick Start
//!
//! ```rust
//! use databroker::broker::{DataReadTransaction, DataWriteTransaction};
//! use databroker::data::{DataPath, LogicalDatastoreType, NormalizedNode};
//! use databroker::store::{InMemoryDomStore, InMemoryStoreConfig};
//! use databroker::DataBroker;
//!
//! # fn main() -> databroker::errors::BrokerResult<()> {
//! let broker = DataBroker::builder()
//!     .datastore(LogicalDatastoreType::Configuration, InMemoryDomStore::new(InMemoryStoreConfig::named("config")))
//!     .datastore(LogicalDatastoreType::Operational, InMemoryDomStore::new(InMemoryStoreConfig::named("oper")))
//!     .build()?;
//!
//! let tx = broker.new_read_write_transaction()?;
//! tx.put(LogicalDatastoreType::Configuration, &DataPath::parse("/a"), NormalizedNode::leaf(1))?;
//! tx.put(LogicalDatastoreType::Operational, &DataPath::parse("/b"), NormalizedNode::leaf(2))?;
//! tx.submit()?.get()?;
//!
//! let read = broker.new_read_only_transaction()?;
//! assert!(read.exists(LogicalDatastoreType::Operational, &DataPath::parse("/b"))?.get()?);
//! broker.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`broker`] - Broker, composite transactions, commit coordinator, chains,
//!   ping-pong and sharded producers
//! - [`broker_builder`] - Broker builder
//! - [`broker_config`] - Broker configuration
//! - [`common`] - Futures, event bus, listener registrations and constants
//! - [`data`] - Datastore types, paths and normalized nodes
//! - [`errors`] - Error types and result definitions
//! - [`schema`] - Schema context holder
//! - [`store`] - Backend store contract and the in-memory store

pub mod broker;
pub mod broker_builder;
pub mod broker_config;
pub mod common;
pub mod data;
pub mod errors;
pub mod schema;
pub mod store;

pub use broker::DataBroker;
