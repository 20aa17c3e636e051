//! Arena-based topology store with journaled mutation.
//!
//! All topology entities live in the `TopoStore` and reference each other by
//! typed handles. Every write goes through a small set of mutators that
//! record the slot's pre-state, so `rollback_to` can restore the exact
//! model as of a checkpoint. Blend attributes are stored alongside the
//! geometry and share the same journal.

use std::collections::{BTreeMap, HashMap};

use super::arena::{Arena, ArenaOp};
use super::journal::{AttrKey, Checkpoint, Journal, Undo};
use super::types::*;
use crate::attrib::{Attribute, AttributeSlot};
use crate::error::{BlendError, BlendResult};
use crate::math::Isometry3;

#[derive(Clone, Debug, Default)]
pub struct TopoStore {
    vertices: Arena<Vertex>,
    edges: Arena<Edge>,
    coedges: Arena<CoEdge>,
    wires: Arena<Wire>,
    faces: Arena<Face>,
    shells: Arena<Shell>,
    bodies: Arena<Body>,
    attribs: BTreeMap<AttrKey, Attribute>,
    next_tag: u64,
    journal: Journal,
    // Adjacency indexes, maintained by the mutators and rebuilt on rollback.
    vertex_edges: HashMap<VertexId, Vec<EdgeId>>,
    edge_coedges: HashMap<EdgeId, Vec<CoEdgeId>>,
}

/// Live entity counts, used to compare model states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreCounts {
    pub vertices: usize,
    pub edges: usize,
    pub coedges: usize,
    pub wires: usize,
    pub faces: usize,
    pub shells: usize,
    pub bodies: usize,
    pub attributes: usize,
}

macro_rules! entity_methods {
    ($field:ident, $Id:ident, $T:ident, $variant:ident,
     $get:ident, $add:ident, $modify:ident, $remove:ident, $iter:ident) => {
        pub fn $get(&self, id: $Id) -> BlendResult<&$T> {
            self.$field.get(id.0).ok_or(BlendError::EntityNotFound(EntityRef::$variant(id)))
        }

        pub fn $add(&mut self, value: $T) -> $Id {
            let id = $Id(self.$field.push(value));
            self.journal.record(Undo::$variant(ArenaOp::Inserted));
            self.index(EntityRef::$variant(id), true);
            id
        }

        pub fn $modify(&mut self, id: $Id, f: impl FnOnce(&mut $T)) -> BlendResult<()> {
            let old = self.$get(id)?.clone();
            let mut new = old.clone();
            f(&mut new);
            self.index(EntityRef::$variant(id), false);
            self.$field.replace(id.0, Some(new));
            self.journal.record(Undo::$variant(ArenaOp::Replaced(id.0, Some(old))));
            self.index(EntityRef::$variant(id), true);
            Ok(())
        }

        pub fn $remove(&mut self, id: $Id) -> BlendResult<$T> {
            self.$get(id)?;
            self.index(EntityRef::$variant(id), false);
            let old = self
                .$field
                .replace(id.0, None)
                .ok_or(BlendError::EntityNotFound(EntityRef::$variant(id)))?;
            self.journal.record(Undo::$variant(ArenaOp::Replaced(id.0, Some(old.clone()))));
            Ok(old)
        }

        pub fn $iter(&self) -> impl Iterator<Item = ($Id, &$T)> + '_ {
            self.$field.iter().map(|(i, v)| ($Id(i), v))
        }
    };
}

impl TopoStore {
    pub fn new() -> Self {
        TopoStore { next_tag: 1, ..Self::default() }
    }

    entity_methods!(
        vertices, VertexId, Vertex, Vertex,
        vertex, add_vertex, modify_vertex, remove_vertex, iter_vertices
    );
    entity_methods!(
        edges, EdgeId, Edge, Edge,
        edge, add_edge, modify_edge, remove_edge, iter_edges
    );
    entity_methods!(
        coedges, CoEdgeId, CoEdge, CoEdge,
        coedge, add_coedge, modify_coedge, remove_coedge, iter_coedges
    );
    entity_methods!(
        wires, WireId, Wire, Wire,
        wire, add_wire, modify_wire, remove_wire, iter_wires
    );
    entity_methods!(
        faces, FaceId, Face, Face,
        face, add_face, modify_face, remove_face, iter_faces
    );
    entity_methods!(
        shells, ShellId, Shell, Shell,
        shell, add_shell, modify_shell, remove_shell, iter_shells
    );
    entity_methods!(
        bodies, BodyId, Body, Body,
        body, add_body, modify_body, remove_body, iter_bodies
    );

    /// True if the handle refers to a live entity.
    pub fn contains(&self, entity: EntityRef) -> bool {
        match entity {
            EntityRef::Vertex(id) => self.vertices.get(id.0).is_some(),
            EntityRef::Edge(id) => self.edges.get(id.0).is_some(),
            EntityRef::CoEdge(id) => self.coedges.get(id.0).is_some(),
            EntityRef::Wire(id) => self.wires.get(id.0).is_some(),
            EntityRef::Face(id) => self.faces.get(id.0).is_some(),
            EntityRef::Shell(id) => self.shells.get(id.0).is_some(),
            EntityRef::Body(id) => self.bodies.get(id.0).is_some(),
        }
    }

    pub fn ensure(&self, entity: EntityRef) -> BlendResult<()> {
        if self.contains(entity) { Ok(()) } else { Err(BlendError::EntityNotFound(entity)) }
    }

    // --- Attributes ---

    pub fn attribute(&self, owner: EntityRef, slot: AttributeSlot) -> Option<&Attribute> {
        self.attribs.get(&(owner, slot))
    }

    /// Store `attr` on `owner`, replacing whatever occupied the same slot.
    pub fn set_attribute(&mut self, owner: EntityRef, attr: Attribute) -> Option<Attribute> {
        let key = (owner, attr.slot());
        let old = self.attribs.insert(key, attr);
        self.journal.record(Undo::Attr(key, old.clone()));
        old
    }

    pub fn remove_attribute(&mut self, owner: EntityRef, slot: AttributeSlot) -> Option<Attribute> {
        let key = (owner, slot);
        let old = self.attribs.remove(&key)?;
        self.journal.record(Undo::Attr(key, Some(old.clone())));
        Some(old)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (EntityRef, &Attribute)> + '_ {
        self.attribs.iter().map(|((owner, _), a)| (*owner, a))
    }

    pub fn attributes_of(&self, owner: EntityRef) -> impl Iterator<Item = &Attribute> + '_ {
        self.attribs.iter().filter(move |((o, _), _)| *o == owner).map(|(_, a)| a)
    }

    /// A fresh operation/unit tag. Tags are journaled like any other write.
    pub fn fresh_tag(&mut self) -> u64 {
        let tag = self.next_tag.max(1);
        self.journal.record(Undo::Tag(tag));
        self.next_tag = tag + 1;
        tag
    }

    // --- Transactions ---

    pub fn begin(&mut self) -> Checkpoint {
        self.journal.begin()
    }

    pub fn commit(&mut self, cp: Checkpoint) {
        self.journal.commit(cp);
    }

    /// Undo every write since `cp` as one unit.
    pub fn rollback_to(&mut self, cp: Checkpoint) {
        let undone = self.journal.unwind(cp);
        if undone.is_empty() {
            return;
        }
        log::debug!("rolling back {} store writes", undone.len());
        for undo in undone {
            match undo {
                Undo::Vertex(op) => op.undo(&mut self.vertices),
                Undo::Edge(op) => op.undo(&mut self.edges),
                Undo::CoEdge(op) => op.undo(&mut self.coedges),
                Undo::Wire(op) => op.undo(&mut self.wires),
                Undo::Face(op) => op.undo(&mut self.faces),
                Undo::Shell(op) => op.undo(&mut self.shells),
                Undo::Body(op) => op.undo(&mut self.bodies),
                Undo::Attr(key, old) => match old {
                    Some(a) => {
                        self.attribs.insert(key, a);
                    }
                    None => {
                        self.attribs.remove(&key);
                    }
                },
                Undo::Tag(tag) => self.next_tag = tag,
            }
        }
        self.rebuild_indexes();
    }

    pub fn in_transaction(&self) -> bool {
        self.journal.recording()
    }

    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            vertices: self.vertices.live_count(),
            edges: self.edges.live_count(),
            coedges: self.coedges.live_count(),
            wires: self.wires.live_count(),
            faces: self.faces.live_count(),
            shells: self.shells.live_count(),
            bodies: self.bodies.live_count(),
            attributes: self.attribs.len(),
        }
    }

    /// Entity-by-entity comparison of two model states, ignoring the
    /// journal.
    pub fn model_eq(&self, other: &TopoStore) -> bool {
        self.vertices == other.vertices
            && self.edges == other.edges
            && self.coedges == other.coedges
            && self.wires == other.wires
            && self.faces == other.faces
            && self.shells == other.shells
            && self.bodies == other.bodies
            && self.attribs == other.attribs
    }

    // --- Adjacency ---

    pub fn vertex_edges(&self, v: VertexId) -> &[EdgeId] {
        self.vertex_edges.get(&v).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_coedges(&self, e: EdgeId) -> &[CoEdgeId] {
        self.edge_coedges.get(&e).map(Vec::as_slice).unwrap_or(&[])
    }

    fn index(&mut self, entity: EntityRef, add: bool) {
        match entity {
            EntityRef::Edge(id) => {
                let Some(edge) = self.edges.get(id.0) else { return };
                let mut ends = vec![edge.start];
                if edge.end != edge.start {
                    ends.push(edge.end);
                }


                for v in ends {
                    let list = self.vertex_edges.entry(v).or_default();
                    if add {
                        list.push(id);
                    } else {
                        list.retain(|e| *e != id);
                    }
                }
            }
            EntityRef::CoEdge(id) => {
                let Some(coedge) = self.coedges.get(id.0) else { return };
                let list = self.edge_coedges.entry(coedge.edge).or_default();
                if add {
                    list.push(id);
                } else {
                    list.retain(|c| *c != id);
                }
            }
            _ => {}
        }
    }

    fn rebuild_indexes(&mut self) {
        self.vertex_edges.clear();
        self.edge_coedges.clear();
        let edges: Vec<usize> = self.edges.iter().map(|(i, _)| i).collect();
        for i in edges {
            self.index(EntityRef::Edge(EdgeId(i)), true);
        }
        let coedges: Vec<usize> = self.coedges.iter().map(|(i, _)| i).collect();
        for i in coedges {
            self.index(EntityRef::CoEdge(CoEdgeId(i)), true);
        }
    }

    /// Rigidly move every vertex, curve and surface of a body.
    pub fn transform_body(&mut self, body: BodyId, iso: &Isometry3) -> BlendResult<()> {
        let faces = self.body_faces(body)?;
        let edges = self.body_edges(body)?;
        let vertices = self.body_vertices(body)?;
        for v in vertices {
            self.modify_vertex(v, |vx| vx.point = iso * vx.point)?;
        }
        for e in edges {
            self.modify_edge(e, |ed| ed.curve = ed.curve.transformed(iso))?;
        }
        for f in faces {
            self.modify_face(f, |fc| {
                fc.surface = fc.surface.transformed(iso);
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Point3;

    #[test]
    fn rollback_restores_removed_and_added_entities() {
        let mut store = TopoStore::new();
        let a = store.add_vertex(Vertex { point: Point3::origin() });
        let before = store.clone();
        let cp = store.begin();
        store.add_vertex(Vertex { point: Point3::new(1.0, 0.0, 0.0) });
        store.modify_vertex(a, |v| v.point.x = 5.0).unwrap();
        store.remove_vertex(a).unwrap();
        assert!(store.vertex(a).is_err());
        store.rollback_to(cp);
        assert!(store.model_eq(&before));
        assert_eq!(store.vertex(a).unwrap().point, Point3::origin());
    }

    #[test]
    fn edge_index_tracks_mutation_and_rollback() {
        let mut store = TopoStore::new();
        let a = store.add_vertex(Vertex { point: Point3::origin() });
        let b = store.add_vertex(Vertex { point: Point3::new(1.0, 0.0, 0.0) });
        let c = store.add_vertex(Vertex { point: Point3::new(2.0, 0.0, 0.0) });
        let e = store.add_edge(Edge {
            curve: crate::curve::Curve3::segment(Point3::origin(), Point3::new(1.0, 0.0, 0.0)),
            t_start: 0.0,
            t_end: 1.0,
            start: a,
            end: b,
        });
        let cp = store.begin();
        store.modify_edge(e, |ed| ed.end = c).unwrap();
        assert!(store.vertex_edges(b).is_empty());
        assert_eq!(store.vertex_edges(c), &[e]);
        store.rollback_to(cp);
        assert_eq!(store.vertex_edges(b), &[e]);
        assert!(store.vertex_edges(c).is_empty());
    }

    #[test]
    fn tags_are_journaled() {
        let mut store = TopoStore::new();
        let t0 = store.fresh_tag();
        let cp = store.begin();
        let t1 = store.fresh_tag();
        assert_eq!(t1, t0 + 1);
        store.rollback_to(cp);
        assert_eq!(store.fresh_tag(), t1);
    }
}
