//! Arena-based topology for the B-rep kernel.
//!
//! Topology entities (Vertex, Edge, CoEdge, Wire, Face, Shell, Body) live
//! in a central `TopoStore`, are referenced via typed index handles and are
//! mutated through a journal that supports nested checkpoints.

pub mod arena;
pub mod journal;
pub mod list;
pub mod query;
pub mod store;
pub mod types;
pub mod validate;

pub use journal::Checkpoint;
pub use list::EntityList;
pub use query::{FanItem, PickHit};
pub use store::{StoreCounts, TopoStore};
pub use types::*;
pub use validate::{validate_body, ValidationResult};
