//! Persistence abstractions and the entities exchanged with the external store.

pub mod memory;
pub mod models;
pub mod storage;
pub mod store;
