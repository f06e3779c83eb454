mod chain;
mod cohort;
mod config;
mod data_tree;
mod notify;
mod store;
mod transaction;

pub use config::*;
pub use store::InMemoryDomStore;
