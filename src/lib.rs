//! Blend resolution for a B-rep modelling kernel.
//!
//! Edges, vertices and face pairs of a solid are tagged with *implicit*
//! blend attributes (rounds, chamfers, variable rounds, vertex blends,
//! entity-entity blends). [`fix_blends`] turns them into real geometry:
//! blend surfaces are fitted along each smooth run of edges, the ends of
//! those runs are resolved where they meet, and the resulting faces are
//! spliced into the solid in one transaction.
//!
//! ```no_run
//! use crusst_blend::{fix_blends, make_box, set_const_round, BlendContext, BlendEnds, TopoStore};
//!
//! let mut store = TopoStore::new();
//! let body = make_box(&mut store, 10.0, 10.0, 10.0)?;
//! let edge = store.body_edges(body)?[0];
//! set_const_round(&mut store, &[edge], 2.0, &BlendEnds::default())?;
//! let report = fix_blends(&mut store, body, &BlendContext::default())?;
//! assert!(report.failures.is_empty());
//! # Ok::<(), crusst_blend::BlendError>(())
//! ```

pub mod attrib;
pub mod curve;
pub mod error;
pub mod fit;
pub mod graph;
pub mod junction;
pub mod math;
pub mod nurbs;
pub mod pipeline;
pub mod primitive;
pub mod radius;
pub mod spine;
pub mod surface;
pub mod topo;

pub use attrib::{
    blend_attribute, delete_blend, explicit_blend, set_const_chamfer, set_const_round,
    set_entity_entity_blend, set_instruction, set_variable_blend, set_vertex_blend, BlendAttribute,
    BlendEnds, BlendKind, Convexity, ExplicitBlend, ExplicitKind,
};
pub use error::{BlendError, BlendResult};
pub use graph::{
    detect_blend_network, detect_blend_sequence, find_blend_graph, find_smooth_sequence, BlendUnit,
};
pub use pipeline::{
    complete, discard_sheet, fix_blends, make_sheet, make_wire, preview, BlendContext, BlendOptions,
    BlendReport, BlendSheet, IntersectionGraph, WarningKind,

};
pub use primitive::{make_box, make_cylinder, make_prism, make_sphere, Profile, ProfileSegment};
pub use radius::RadiusFunction;
pub use topo::{BodyId, EdgeId, EntityRef, FaceId, TopoStore, VertexId};
