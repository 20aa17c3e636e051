//! Explicit blend records written on resolved blend faces.

use super::{Attribute, AttributeSlot};
use crate::radius::RadiusFunction;
use crate::topo::{EntityRef, FaceId, TopoStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExplicitKind {
    Round,
    Chamfer,
    Variable,
    Vertex,
    EntityEntity,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExplicitBlend {
    pub kind: ExplicitKind,
    /// Left and right support faces; every face around the vertex for
    /// vertex blends.
    pub supports: Vec<FaceId>,
    pub function: Option<RadiusFunction>,
    /// Shared by every face produced by one resolution call.
    pub op_tag: u64,
    /// Shared by the faces of one smooth sequence.
    pub unit_tag: u64,
}

pub fn explicit_blend(store: &TopoStore, face: FaceId) -> Option<&ExplicitBlend> {
    match store.attribute(EntityRef::Face(face), AttributeSlot::Explicit)? {
        Attribute::Explicit(e) => Some(e),
        Attribute::Implicit(_) => None,
    }
}

pub(crate) fn write_explicit(store: &mut TopoStore, face: FaceId, blend: ExplicitBlend) {
    store.set_attribute(EntityRef::Face(face), Attribute::Explicit(blend));
}
