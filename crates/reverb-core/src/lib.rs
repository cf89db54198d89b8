//! Reverb Core - state tree and delta engine
//!
//! This crate provides the synchronization core shared by every session:
//! - Dynamic field values (`Value`, `ValueMap`)
//! - Path and identifier types for the node tree
//! - The Var Registry: fields, computed fields, and dependency edges
//! - The state node tree with dirty tracking and step rollback
//! - The delta builder and full-state snapshots
//!
//! ## Model
//!
//! State is a strict tree of typed nodes. Handlers write base fields; the
//! registry's dependency edges decide which computed fields that
//! invalidates; a flush drains everything the client has not seen into a
//! minimal [`Delta`]. Sessions, queues, and transports live in the crates
//! built on top of this one.

mod delta;
mod dirty;
mod error;
mod event;
mod path;
mod registry;
mod snapshot;
mod tree;
mod value;

pub use delta::{Delta, FlushFailure, FlushReport};
pub use dirty::DirtyTracker;
pub use error::{Error, Result};
pub use event::{ClientEvent, Event, SessionToken, Update};
pub use path::{FieldRef, HandlerPath, NodePath, NodeType, ROOT_SEGMENT};
pub use registry::{ComputeFn, ComputedSpec, FieldSpec, NodeSpec, Registry};
pub use snapshot::{NodeSnapshot, TreeSnapshot};
pub use tree::{ComputeScope, StateNode, StateTree};
pub use value::{Value, ValueMap};
