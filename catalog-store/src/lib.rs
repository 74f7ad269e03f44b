//! Store gateway contract for the federated catalog.
//!
//! Every catalog store, local or remote, is reached through the one
//! [`StoreGateway`] capability set. Concrete adapters (remote catalog
//! protocols, persistence providers) live outside the core; this crate ships
//! only the contract, the [`Subject`] identity scope writes run under, and a
//! [`MemoryStore`] used as the local store in embedded setups and as the
//! workhorse of the test suites.

mod error;
mod gateway;
pub mod memory;
mod subject;

pub use error::{StoreError, StoreResult};
pub use gateway::{
    ContentUpdate, CreateOutcome, DeleteOutcome, FailedItem, Filter, StoreGateway, UpdateOutcome,
};
pub use memory::{MemoryStore, StoreOperation, StoredContent};
pub use subject::{Subject, SubjectKind};
