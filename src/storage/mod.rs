//! Fact store contract and backends.
//!
//! [`FactStore`] is the narrow interface the reconciliation protocol consumes.
//! [`InMemoryFactStore`] is the reference backend.

pub mod memory;
mod traits;

pub use memory::InMemoryFactStore;
pub use traits::{fingerprint, ChangeOp, ChangeRecord, FactStore, StorageError};
