//! Persisted-document layer for habitgrid.
//!
//! Stores one JSON document per concern under a data directory: one habit
//! map per goal, the board, the shuffle history, the blocked-topics list,
//! and the reward ledger. Documents carry a schema number; map documents
//! additionally decode the legacy shape produced by the retired two-pass
//! generation strategy.

pub mod config;
pub mod documents;
pub mod legacy;

pub use config::StoreConfig;
pub use documents::{DocumentStore, StoreError};
