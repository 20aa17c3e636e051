//! Attribute setters, accessors and deletion.
//!
//! Every setter validates all of its input before touching the store, so a
//! rejected call leaves the model unchanged. Setting an attribute replaces
//! whatever occupied the same slot on the entity.

use std::collections::HashMap;

use super::*;
use crate::error::{BlendError, BlendResult};
use crate::math::{SMOOTH_ANGLE_TOL, TOLERANCE};
use crate::topo::{FaceId, TopoStore, VertexId};

/// Variable blend parameters for `set_variable_blend`.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableSpec {
    pub start_radius: f64,
    pub end_radius: f64,
    pub function: Option<RadiusFunction>,
    pub calibration: Option<Calibration>,
    pub cross_section: CrossSection,
}

impl VariableSpec {
    pub fn from_function(function: RadiusFunction) -> Self {
        VariableSpec {
            start_radius: function.start_radius(),
            end_radius: function.end_radius(),
            cross_section: if function.is_elliptic() {
                CrossSection::RotatedEllipse
            } else {
                CrossSection::Circular
            },
            function: Some(function),
            calibration: None,
        }
    }
}

/// Vertex blend parameters for `set_vertex_blend`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexBlendSpec {
    pub bulge: f64,
    pub continuity: Continuity,
    pub property: VertexProperty,
    pub auto_setback: AutoSetback,
}

impl Default for VertexBlendSpec {
    fn default() -> Self {
        VertexBlendSpec {
            bulge: 1.0,
            continuity: Continuity::Slope,
            property: VertexProperty::Cap,
            auto_setback: AutoSetback::Unset,
        }
    }
}

fn check_range(value: f64, entities: &[EdgeId]) -> BlendResult<()> {
    if value < -TOLERANCE || !value.is_finite() {
        return Err(BlendError::InvalidRadius {
            value,
            entities: entities.iter().map(|&e| EntityRef::Edge(e)).collect(),
        });
    }
    Ok(())
}

/// Every size `function` can produce must be a valid radius.
fn check_function(function: &RadiusFunction, owners: &[EntityRef]) -> BlendResult<()> {
    function.validate().map_err(|e| e.with_entities(owners))
}

fn check_ends(ends: &BlendEnds, edges: &[EdgeId]) -> BlendResult<()> {
    for s in [ends.start_setback, ends.end_setback] {
        if s.diff_set {
            check_range(s.left(), edges)?;
            check_range(s.right(), edges)?;
        }
    }
    Ok(())
}

fn check_edges(store: &TopoStore, edges: &[EdgeId]) -> BlendResult<()> {
    for &e in edges {
        store.edge(e)?;
    }
    Ok(())
}

/// Convexity of an edge from its support normals at the midpoint: convex
/// when `(n_L × n_R)·T > 0`.
pub fn edge_convexity(store: &TopoStore, edge: EdgeId) -> BlendResult<Convexity> {
    let Ok((left, right)) = store.edge_sides(edge) else {
        return Ok(Convexity::Unknown);
    };
    let e = store.edge(edge)?;
    let tm = 0.5 * (e.t_start + e.t_end);
    let p = e.curve.evaluate(tm);
    let t = e.curve.tangent(tm);
    let nl = store.face_normal_at(left, &p)?;
    let nr = store.face_normal_at(right, &p)?;
    let cross = nl.cross(&nr);
    if cross.norm() < SMOOTH_ANGLE_TOL {
        return Ok(if nl.dot(&nr) > 0.0 { Convexity::Tangent } else { Convexity::Knife });
    }
    Ok(if cross.dot(&t) > 0.0 { Convexity::Convex } else { Convexity::Concave })
}

/// Direction of each listed edge relative to the first one, propagated
/// through shared vertices. Disconnected edges start a new reference.
pub fn reference_senses(store: &TopoStore, edges: &[EdgeId]) -> BlendResult<Vec<bool>> {
    let mut sense: HashMap<EdgeId, bool> = HashMap::new();
    let mut out = Vec::with_capacity(edges.len());
    for &seed in edges {
        if sense.contains_key(&seed) {
            continue;
        }
        sense.insert(seed, true);
        let mut stack = vec![seed];
        while let Some(e) = stack.pop() {
            let fwd = sense[&e];
            let edge = store.edge(e)?;
            let (tail, head) = if fwd { (edge.start, edge.end) } else { (edge.end, edge.start) };
            for &f in edges {
                if sense.contains_key(&f) {
                    continue;
                }
                let other = store.edge(f)?;
                let s = if other.start == head {
                    Some(true)
                } else if other.end == head {
                    Some(false)
                } else if other.end == tail {
                    Some(true)
                } else if other.start == tail {
                    Some(false)
                } else {
                    None
                };
                if let Some(s) = s {
                    sense.insert(f, s);
                    stack.push(f);
                }
            }
        }
    }
    for e in edges {
        out.push(sense[e]);
    }
    Ok(out)
}

fn put_edge_blends(
    store: &mut TopoStore,
    edges: &[EdgeId],
    kind: BlendKind,
    ends: &BlendEnds,
) -> BlendResult<()> {
    let senses = reference_senses(store, edges)?;
    let mut staged = Vec::with_capacity(edges.len());
    for (&e, &fwd) in edges.iter().zip(&senses) {
        let attr = BlendAttribute {
            kind: kind.clone(),
            convexity: edge_convexity(store, e)?,
            ends: *ends,
            owner: EntityRef::Edge(e),
        };
        staged.push((e, if fwd { attr } else { attr.reversed() }));
    }
    for (e, attr) in staged {
        log::debug!("edge blend {:?} set on {e:?}", attr.family());
        store.set_attribute(EntityRef::Edge(e), Attribute::Implicit(attr));
    }
    Ok(())
}

pub fn set_const_round(
    store: &mut TopoStore,
    edges: &[EdgeId],
    radius: f64,
    ends: &BlendEnds,
) -> BlendResult<()> {
    check_edges(store, edges)?;
    check_range(radius, edges)?;
    check_ends(ends, edges)?;
    put_edge_blends(store, edges, BlendKind::ConstRound { radius: radius.max(0.0) }, ends)
}

pub fn set_const_chamfer(
    store: &mut TopoStore,
    edges: &[EdgeId],
    left_range: f64,
    right_range: f64,
    ends: &BlendEnds,
) -> BlendResult<()> {
    check_edges(store, edges)?;
    check_range(left_range, edges)?;
    check_range(right_range, edges)?;
    check_ends(ends, edges)?;
    put_edge_blends(store, edges, BlendKind::ConstChamfer { left_range, right_range }, ends)
}

pub fn set_variable_blend(
    store: &mut TopoStore,
    edges: &[EdgeId],
    spec: VariableSpec,
    ends: &BlendEnds,
) -> BlendResult<()> {
    check_edges(store, edges)?;
    check_range(spec.start_radius, edges)?;
    check_range(spec.end_radius, edges)?;
    if let Some(function) = &spec.function {
        let owners: Vec<EntityRef> = edges.iter().map(|&e| EntityRef::Edge(e)).collect();
        check_function(function, &owners)?;
    }
    check_ends(ends, edges)?;
    if let Some(cal) = &spec.calibration {
        check_edges(store, &[cal.first_edge, cal.last_edge])?;
    }
    put_edge_blends(
        store,
        edges,
        BlendKind::VariableBlend {
            start_radius: spec.start_radius,
            end_radius: spec.end_radius,
            function: spec.function,
            calibration: spec.calibration,
            cross_section: spec.cross_section,
        },
        ends,
    )
}

pub fn set_vertex_blend(
    store: &mut TopoStore,
    vertices: &[VertexId],
    spec: VertexBlendSpec,
) -> BlendResult<()> {

    for &v in vertices {
        store.vertex(v)?;
    }
    if !(0.0..=2.0).contains(&spec.bulge) {
        return Err(BlendError::InvalidBulge {
            value: spec.bulge,
            entities: vertices.iter().map(|&v| EntityRef::Vertex(v)).collect(),
        });
    }
    for &v in vertices {
        let attr = BlendAttribute {
            kind: BlendKind::VertexBlend {
                bulge: spec.bulge,
                continuity: spec.continuity,
                property: spec.property,
                auto_setback: spec.auto_setback,
            },
            convexity: Convexity::Unknown,
            ends: BlendEnds::default(),
            owner: EntityRef::Vertex(v),
        };
        store.set_attribute(EntityRef::Vertex(v), Attribute::Implicit(attr));
    }
    Ok(())
}

/// Blend between two faces; the attribute lives on `left`.
pub fn set_entity_entity_blend(
    store: &mut TopoStore,
    left: FaceId,
    right: FaceId,
    function: RadiusFunction,
    convexity: Convexity,
    help_point: Point3,
) -> BlendResult<()> {
    store.face(left)?;
    store.face(right)?;
    let owners = [EntityRef::Face(left), EntityRef::Face(right)];
    if left == right {
        return Err(BlendError::OverlappingSupports { entities: owners.to_vec() });
    }
    check_function(&function, &owners)?;
    if !(help_point.x.is_finite() && help_point.y.is_finite() && help_point.z.is_finite()) {
        return Err(BlendError::unsupported("help point is not finite", owners.to_vec()));
    }
    let attr = BlendAttribute {
        kind: BlendKind::EntityEntity {
            supports: [left.into(), right.into()],
            help_point,
            function,
        },
        convexity,
        ends: BlendEnds::default(),
        owner: EntityRef::Face(left),
    };
    store.set_attribute(EntityRef::Face(left), Attribute::Implicit(attr));
    Ok(())
}

pub fn set_instruction(
    store: &mut TopoStore,
    vertex: VertexId,
    directive: Directive,
    anchor: Point3,
) -> BlendResult<()> {
    store.vertex(vertex)?;
    let attr = BlendAttribute {
        kind: BlendKind::Instruction { directive, anchor },
        convexity: Convexity::Unknown,
        ends: BlendEnds::default(),
        owner: EntityRef::Vertex(vertex),
    };
    store.set_attribute(EntityRef::Vertex(vertex), Attribute::Implicit(attr));
    Ok(())
}

/// Remove every implicit attribute from the listed entities. Returns how
/// many were removed; entities without attributes are skipped silently.
pub fn delete_blend(store: &mut TopoStore, entities: &[EntityRef]) -> BlendResult<usize> {
    for &e in entities {
        store.ensure(e)?;
    }
    let mut removed = 0;
    for &e in entities {
        for slot in [
            AttributeSlot::EdgeBlend,
            AttributeSlot::VertexBlend,
            AttributeSlot::EntityEntity,
            AttributeSlot::Instruction,
        ] {
            if store.remove_attribute(e, slot).is_some() {
                removed += 1;
            }
        }
    }
    Ok(removed)
}

fn implicit(store: &TopoStore, owner: EntityRef, slot: AttributeSlot) -> Option<&BlendAttribute> {
    store.attribute(owner, slot).and_then(Attribute::as_implicit)
}

/// The implicit round/chamfer/variable blend on an edge.
pub fn blend_attribute(store: &TopoStore, edge: EdgeId) -> Option<&BlendAttribute> {
    implicit(store, EntityRef::Edge(edge), AttributeSlot::EdgeBlend)
}

pub fn vertex_blend(store: &TopoStore, vertex: VertexId) -> Option<&BlendAttribute> {
    implicit(store, EntityRef::Vertex(vertex), AttributeSlot::VertexBlend)
}

pub fn instruction(store: &TopoStore, vertex: VertexId) -> Option<&BlendAttribute> {
    implicit(store, EntityRef::Vertex(vertex), AttributeSlot::Instruction)
}

pub fn entity_entity_blend(store: &TopoStore, face: FaceId) -> Option<&BlendAttribute> {
    implicit(store, EntityRef::Face(face), AttributeSlot::EntityEntity)
}

/// Faces owning an implicit entity-entity blend with a support on `body`.
/// The owner may sit on another body.
pub fn entity_blend_owners(store: &TopoStore, body: crate::topo::BodyId) -> Vec<FaceId> {
    let on_body = |r: &EntityRef| match r {
        EntityRef::Face(f) => store.face_body(*f).map_or(false, |b| b == body),
        _ => false,
    };
    let mut owners: Vec<FaceId> = store
        .attributes()
        .filter_map(|(owner, a)| {
            let Attribute::Implicit(attr) = a else { return None };
            let (EntityRef::Face(f), BlendKind::EntityEntity { supports, .. }) =
                (owner, &attr.kind)
            else {
                return None;
            };
            (on_body(&owner) || supports.iter().any(on_body)).then_some(f)
        })
        .collect();
    owners.sort();
    owners.dedup();
    owners
}

/// Every edge of `body` carrying an implicit edge blend.
pub fn blended_edges(store: &TopoStore, body: crate::topo::BodyId) -> BlendResult<Vec<EdgeId>> {
    let edges = store.body_edges(body)?;
    Ok(edges.into_iter().filter(|&e| blend_attribute(store, e).is_some()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::make_box;

    #[test]
    fn box_edges_are_convex() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 1.0, 1.0, 1.0).unwrap();
        for e in store.body_edges(body).unwrap() {
            assert_eq!(edge_convexity(&store, e).unwrap(), Convexity::Convex);
        }
    }

    #[test]
    fn invalid_round_leaves_store_untouched() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 1.0, 1.0, 1.0).unwrap();
        let edges = store.body_edges(body).unwrap();
        let before = store.clone();
        let err = set_const_round(&mut store, &edges, -0.5, &BlendEnds::default()).unwrap_err();
        assert!(matches!(err, BlendError::InvalidRadius { .. }));
        assert!(store.model_eq(&before));
    }

    #[test]
    fn replacing_keeps_one_attribute() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 1.0, 1.0, 1.0).unwrap();
        let e = store.body_edges(body).unwrap()[0];
        set_const_round(&mut store, &[e], 0.2, &BlendEnds::default()).unwrap();
        set_const_chamfer(&mut store, &[e], 0.1, 0.2, &BlendEnds::default()).unwrap();
        assert_eq!(store.attributes_of(EntityRef::Edge(e)).count(), 1);
        assert_eq!(blend_attribute(&store, e).unwrap().family(), BlendFamily::Chamfer);
    }

    #[test]
    fn delete_of_unset_attribute_is_noop() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 1.0, 1.0, 1.0).unwrap();
        let e = store.body_edges(body).unwrap()[0];
        assert_eq!(delete_blend(&mut store, &[EntityRef::Edge(e)]).unwrap(), 0);
    }

    #[test]
    fn connected_edges_share_reference_sense() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 1.0, 1.0, 1.0).unwrap();
        // Two consecutive edges of the top loop.
        let top = store
            .body_faces(body)
            .unwrap()
            .into_iter()
            .find(|&f| store.face_normal_at(f, &Point3::new(0.0, 0.0, 1.0)).unwrap().z > 0.9)
            .unwrap();
        let loop_edges = store.face_edges(top).unwrap();
        let (a, b) = (loop_edges[0], loop_edges[1]);
        let senses = reference_senses(&store, &[a, b]).unwrap();
        assert_eq!(senses, vec![true, true]);
        set_const_chamfer(&mut store, &[a, b], 0.1, 0.3, &BlendEnds::default()).unwrap();
        let ka = &blend_attribute(&store, a).unwrap().kind;
        assert_eq!(*ka, BlendKind::ConstChamfer { left_range: 0.1, right_range: 0.3 });
    }

    #[test]
    fn hand_built_negative_functions_are_refused() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 1.0, 1.0, 1.0).unwrap();
        let e = store.body_edges(body).unwrap()[0];
        let faces = store.body_faces(body).unwrap();
        let before = store.clone();

        let spec = VariableSpec {
            start_radius: 1.0,
            end_radius: 1.0,
            function: Some(RadiusFunction::Linear { start: -3.0, end: 1.0 }),
            calibration: None,
            cross_section: CrossSection::Circular,
        };
        let err = set_variable_blend(&mut store, &[e], spec, &BlendEnds::default()).unwrap_err();
        assert!(matches!(err, BlendError::InvalidRadius { value, .. } if value == -3.0));
        assert_eq!(err.entities(), vec![EntityRef::Edge(e)]);

        let err = set_entity_entity_blend(
            &mut store,
            faces[0],
            faces[1],
            RadiusFunction::Constant(-2.0),
            Convexity::Concave,
            Point3::origin(),
        )
        .unwrap_err();
        assert!(matches!(err, BlendError::InvalidRadius { .. }));
        assert!(store.model_eq(&before));
    }

    #[test]
    fn bulge_out_of_range_rejected() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 1.0, 1.0, 1.0).unwrap();
        let v = store.body_vertices(body).unwrap()[0];
        let spec = VertexBlendSpec { bulge: 2.5, ..VertexBlendSpec::default() };
        let err = set_vertex_blend(&mut store, &[v], spec);
        assert!(matches!(err, Err(BlendError::InvalidBulge { .. })));
        assert!(vertex_blend(&store, v).is_none());
    }
}
