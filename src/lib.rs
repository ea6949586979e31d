//! # axiomsync - Reconciling in-memory axioms with an ontology store
//!
//! axiomsync keeps a program's local view of an entity's relations (its
//! superclasses, equivalents, types, domains and so on) in agreement with
//! an external fact store. Every relation is a set; reconciliation is a set
//! diff applied in one of two directions.
//!
//! ## Core Concepts
//!
//! - **EntitySet**: Duplicate-free set of related values with a linear diff
//! - **SynchronisationIntent**: The add/remove/unchanged partition of a diff
//! - **MappingIntent**: Audit record of one applied or attempted change
//! - **Ground**: Binding of an entity to a store context; a descriptor's identity
//! - **Capability**: One fact kind of one ground, with read/write lifecycle
//! - **CompositeDescriptor**: Several capabilities driven together
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use axiomsync::{CompositeDescriptor, Descriptor, EntityRef, FactKind, InMemoryFactStore, StoreContext};
//!
//! let ctx = StoreContext::new("shapes", Arc::new(InMemoryFactStore::new()));
//! let mut cube = CompositeDescriptor::hierarchical(ctx.ground(EntityRef::class("Cube")?))?;
//!
//! cube.links_mut(FactKind::Super).unwrap().add_named("Shape")?;
//! let written = cube.write_axioms();   // [Added Shape]
//! let read = cube.read_axioms();       // [] - already in sync
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod config;
pub mod entity;
pub mod error;
pub mod fact;
pub mod ground;
pub mod storage;

// Reconciliation
pub mod capability;
pub mod descriptor;
pub mod entity_set;
pub mod expand;
pub mod intent;

// Re-export primary types at crate root for convenience
pub use capability::{Capability, Descriptor, Reconcile};
pub use config::{ExpansionBounds, SingletonPolicy, SyncConfig};
pub use descriptor::CompositeDescriptor;
pub use entity::{EntityKind, EntityRef};
pub use entity_set::{CardinalityExceeded, EntitySet};
pub use error::{AxiomError, AxiomResult, SyncError, ValidationError};
pub use expand::{DescriptorArena, DescriptorIndex, ExpansionEdge};
pub use fact::{AxiomValue, Characteristic, FactKind, FactValue, Restriction, RestrictionKind, ValueShape};
pub use ground::{ContextId, Ground, GroundKey, StoreContext};
pub use intent::{IntentKind, MappingIntent, MappingReport, SyncDirection, SynchronisationIntent};
pub use storage::{ChangeOp, ChangeRecord, FactStore, InMemoryFactStore, StorageError};
