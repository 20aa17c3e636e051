//! Topology entity types and typed index handles.

use crate::curve::Curve3;
use crate::math::Point3;
use crate::surface::Surface;

// Typed index handles. A handle whose slot has been emptied is stale.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoEdgeId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WireId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShellId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub usize);

/// Any handle that can own an attribute or be reported in an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityRef {
    Vertex(VertexId),
    Edge(EdgeId),
    CoEdge(CoEdgeId),
    Wire(WireId),
    Face(FaceId),
    Shell(ShellId),
    Body(BodyId),
}

impl From<VertexId> for EntityRef {
    fn from(id: VertexId) -> Self {
        EntityRef::Vertex(id)
    }
}

impl From<EdgeId> for EntityRef {
    fn from(id: EdgeId) -> Self {
        EntityRef::Edge(id)
    }
}

impl From<FaceId> for EntityRef {
    fn from(id: FaceId) -> Self {
        EntityRef::Face(id)
    }
}

impl From<BodyId> for EntityRef {
    fn from(id: BodyId) -> Self {
        EntityRef::Body(id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Vertex {
    pub point: Point3,
}

/// A bounded curve segment between two vertices, parameterised from
/// `t_start` to `t_end` (always `t_start < t_end`).
#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub curve: Curve3,
    pub t_start: f64,
    pub t_end: f64,
    pub start: VertexId,
    pub end: VertexId,
}

impl Edge {
    pub fn point_at(&self, s: f64) -> Point3 {
        self.curve.evaluate(self.t_start + s * (self.t_end - self.t_start))
    }

    pub fn midpoint(&self) -> Point3 {
        self.point_at(0.5)
    }

    pub fn is_closed(&self) -> bool {
        self.start == self.end
    }
}

/// An oriented use of an edge by one face loop. Coedges form a circular
/// linked list around the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct CoEdge {
    pub edge: EdgeId,
    /// True if the coedge traverses the edge from start to end.
    pub forward: bool,
    pub next: CoEdgeId,
    pub face: FaceId,
}

/// A closed loop of coedges. Outer loops run counter-clockwise about the
/// face's outward normal, inner loops clockwise.
#[derive(Clone, Debug, PartialEq)]
pub struct Wire {
    pub first_coedge: CoEdgeId,
}

/// Parameter rectangle of a face whose surface domain is bounded by
/// construction (blend faces).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvBox {
    pub u0: f64,
    pub u1: f64,
    pub v0: f64,
    pub v1: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Face {
    pub surface: Surface,
    pub outer_wire: WireId,
    pub inner_wires: Vec<WireId>,
    /// True if the face normal agrees with the surface normal.
    pub outward: bool,
    pub shell: ShellId,
    pub domain: Option<UvBox>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Shell {
    pub faces: Vec<FaceId>,
    pub body: BodyId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    Solid,
    /// An open collection of faces, such as a blend sheet.
    Sheet,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Body {
    pub kind: BodyKind,
    pub shells: Vec<ShellId>,
}
