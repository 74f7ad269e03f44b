//! Publication reconciliation for catalog records.
//!
//! A record carries the set of destinations currently believed to hold a
//! replica (its `published-locations` attribute). Given a desired set, the
//! [`PublicationReconciler`] computes the difference and issues the minimal
//! remote creates and deletes to converge, isolating failures per
//! destination.
//!
//! # Reconciliation
//!
//! 1. **Read**: fetch the record from the local store; absence means nothing
//!    is published
//! 2. **Diff**: `desired − current` is created, `current − desired` deleted,
//!    the intersection is left alone
//! 3. **Execute**: each destination is handled independently; a failure is
//!    recorded and the others proceed
//! 4. **Report**: the outcome lists what is now actually published
//!
//! Persisting the new published set onto the local record is the caller's
//! job; the reconciler never writes to the local store.
//!
//! # Example
//!
//! ```
//! use catalog_publication::diff;
//! use catalog_types::DestinationId;
//! use std::collections::BTreeSet;
//!
//! let current: BTreeSet<DestinationId> = ["A", "B"].into_iter().map(DestinationId::from).collect();
//! let desired: BTreeSet<DestinationId> = ["B", "C"].into_iter().map(DestinationId::from).collect();
//!
//! let plan = diff(&current, &desired);
//! assert!(plan.to_create.contains(&DestinationId::from("C")));
//! assert!(plan.to_delete.contains(&DestinationId::from("A")));
//! assert!(plan.unchanged.contains(&DestinationId::from("B")));
//! ```

mod config;
mod diff;
mod error;
mod outcome;
mod reconciler;
mod registry;

pub use config::ReconcilerConfig;
pub use diff::{diff, PublicationDiff};
pub use error::{PublicationError, PublicationResult};
pub use outcome::{DestinationFailure, PublicationOp, ReconciliationOutcome};
pub use reconciler::PublicationReconciler;
pub use registry::DestinationRegistry;
