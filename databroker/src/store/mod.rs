mod dom_store;
mod listener;
pub mod memory;

pub use dom_store::*;
pub use listener::*;
pub use memory::{InMemoryDomStore, InMemoryStoreConfig};
