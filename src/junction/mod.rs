//! Junctions: deciding how each blend unit ends.
//!
//! Every open unit has two ends, each at a vertex of the blank. The
//! vertex's attributes and its other unit ends decide the resolution:
//!
//! 1. a `Cap` instruction caps the end;
//! 2. a roll-on request (instruction, a vertex blend tagged `RollOn`, or
//!    the blend's own `PreferRollOn`) extends a lone end over the most
//!    tangent unblended edge, repeating until no tangent edge is left;
//!    when there is none the end is capped;
//! 3. a vertex blend attribute closes the vertex with a vertex blend. Its
//!    property can override that: `Runout` lets a lone end run out,
//!    `BiBlend` mitres two compatible ends, `Cusp` forces bulge 0;
//! 4. otherwise a lone end is capped (or runs out when its radius is
//!    zero), two compatible ends are mitred, and anything else is closed
//!    by an automatic vertex blend.
//!
//! The chosen resolution turns into an [`EndCondition`]: a spine
//! parameter, a face or a plane where the blend stops. [`cut_end`] solves
//! where each cross section meets that condition.

pub mod mitre;
pub mod sidecap;

pub use mitre::{mitre_compatible, mitre_plane};
pub use sidecap::side_cap_face;

use std::collections::{BTreeMap, BTreeSet};

use crate::attrib::{
    blend_attribute, edge_convexity, instruction, vertex_blend, Attribute, AutoSetback,
    BlendAttribute, BlendHow, BlendKind, Continuity, Directive, VertexProperty,
};
use crate::curve::Curve3;
use crate::error::{BlendError, BlendResult};
use crate::fit::VertexShape;
use crate::graph::{BlendUnit, UnitEnd};
use crate::math::solve::{brent, expand_bracket};
use crate::math::{Point3, Vector3, RUNOUT_RADIUS, SMOOTH_ANGLE_TOL};
use crate::nurbs::fit::interpolate_curve;
use crate::radius::Side;
use crate::spine::{Roller, Spine, SpineSegment};
use crate::surface::Surface;
use crate::topo::{EdgeId, EntityRef, FaceId, TopoStore, VertexId};

const CUT_SAMPLES: usize = 9;
const ROOT_TOL: f64 = 1e-12;
const ROOT_ITER: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Resolution {
    Capped,
    /// The end continues over a tangent edge that has not received the
    /// blend yet; the cut sits at the vertex.
    RolledOn,
    RunOut,
    Mitred,
    /// `auto` is set when no vertex blend attribute asked for it.
    VertexBlended { shape: VertexShape, auto_setback: AutoSetback, auto: bool },
}

/// A junction vertex and the unit ends meeting there.
#[derive(Clone, Debug, PartialEq)]
pub struct Junction {
    pub vertex: VertexId,
    pub resolution: Resolution,
    pub ends: Vec<UnitEnd>,
}

/// Where a blend end stops.
#[derive(Clone, Debug, PartialEq)]
pub enum EndCondition {
    /// At a fixed spine parameter.
    Iso(f64),
    /// Where the sections meet a face's surface.
    OnFace { face: FaceId, surface: Surface },
    /// Where the sections meet a plane.
    Plane { point: Point3, normal: Vector3 },
}

/// The solved end of a blend.
#[derive(Clone, Debug, PartialEq)]
pub struct EndCut {
    pub condition: EndCondition,
    /// Spine parameter where the left and right springs stop.
    pub sigma: [f64; 2],
    /// Smallest and largest spine parameter the cut touches.
    pub span: (f64, f64),
    /// Cut curve from the left spring to the right over `[0, 1]`. `None`
    /// for iso cuts, whose curve is the blend surface's own cross curve.
    pub curve: Option<Curve3>,
    /// Ball centre and radius at the cut, for rounds.
    pub ball: Option<(Point3, f64)>,
    /// The section at the cut has collapsed to a point.
    pub degenerate: bool,
}

impl EndCut {
    /// Cut point on the spring at `side`.
    pub fn spring_sigma(&self, side: Side) -> f64 {
        match side {
            Side::Left => self.sigma[0],
            Side::Right => self.sigma[1],
        }
    }
}

/// Spine parameter of a unit end.
pub fn end_sigma(spine: &Spine, at_start: bool) -> f64 {
    if at_start { 0.0 } else { spine.length() }
}

/// Unit tangent of the spine at an end, pointing away from the end vertex.
pub fn away_tangent(spine: &Spine, at_start: bool) -> Vector3 {
    let (_, t) = spine.frame(end_sigma(spine, at_start));
    if at_start { t } else { -t }
}

/// The spine segment at a unit end.
pub(crate) fn end_segment(spine: &Spine, at_start: bool) -> &SpineSegment {
    if at_start { &spine.segments[0] } else { &spine.segments[spine.segments.len() - 1] }
}

/// The blend attribute governing a unit end, read in unit direction.
pub fn end_attribute(spine: &Spine, at_start: bool) -> &BlendAttribute {
    &end_segment(spine, at_start).attr
}

fn end_radius(spine: &Spine, at_start: bool) -> f64 {
    spine
        .radius_at(end_sigma(spine, at_start))
        .map_or_else(|| nominal_size(end_attribute(spine, at_start)), |r| r.nominal())
}

fn nominal_size(attr: &BlendAttribute) -> f64 {
    match attr.kind {
        BlendKind::ConstChamfer { left_range, right_range } => left_range.max(right_range),
        _ => attr.end_radius(true).map_or(0.0, |r| r.nominal()),
    }
}

fn directive(store: &TopoStore, v: VertexId) -> Option<Directive> {
    match instruction(store, v).map(|a| &a.kind) {
        Some(BlendKind::Instruction { directive, .. }) => Some(*directive),
        _ => None,
    }
}

fn vertex_property(store: &TopoStore, v: VertexId) -> Option<VertexProperty> {
    match vertex_blend(store, v).map(|a| &a.kind) {
        Some(BlendKind::VertexBlend { property, .. }) => Some(*property),
        _ => None,
    }
}

fn vertex_shape(store: &TopoStore, v: VertexId) -> Option<(VertexShape, AutoSetback)> {
    match vertex_blend(store, v).map(|a| &a.kind) {
        Some(BlendKind::VertexBlend { bulge, continuity, property, auto_setback }) => {
            let cusp = *property == VertexProperty::Cusp;
            Some((VertexShape { bulge: *bulge, continuity: *continuity, cusp }, *auto_setback))
        }
        _ => None,
    }
}

fn wants_roll_on(store: &TopoStore, v: VertexId, attr: &BlendAttribute) -> bool {
    match directive(store, v) {
        Some(Directive::Cap) => false,
        Some(Directive::RollOn) => true,
        None => {
            attr.ends.blend_how == BlendHow::PreferRollOn
                || vertex_property(store, v) == Some(VertexProperty::RollOn)
        }
    }
}

/// The unblended edge at `v` that continues `edge` most tangentially.
/// Edges in `claimed` received a copy earlier in the same pass and still
/// count as candidates.
fn roll_on_target(
    store: &TopoStore,
    v: VertexId,
    edge: EdgeId,
    claimed: &BTreeSet<EdgeId>,
) -> BlendResult<Option<EdgeId>> {
    // Direction in which the unit would continue through v.
    let along = -store.edge_direction_from(edge, v)?;
    let mut best: Option<(f64, EdgeId)> = None;
    for &e in store.vertex_edges(v) {
        if e == edge || (blend_attribute(store, e).is_some() && !claimed.contains(&e)) {
            continue;
        }
        let c = store.edge_direction_from(e, v)?.dot(&along);
        if c > SMOOTH_ANGLE_TOL.cos() && best.map_or(true, |(bc, _)| c > bc) {
            best = Some((c, e));
        }
    }
    Ok(best.map(|(_, e)| e))
}

/// Outcome of one roll-on pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RollOnPass {
    /// Vertices rolled through and the edge each blend was copied onto.
    pub rolled: Vec<(VertexId, EdgeId)>,
    /// Vertices that asked for a roll-on but had no tangent edge.
    pub fallbacks: Vec<VertexId>,
}

/// Copy blends across roll-on vertices onto the most tangent unblended
/// edge. The copy keeps the blend's size at the vertex, so it joins the
/// original blend's unit when units are rebuilt. Roll-on outranks a vertex
/// blend on the same vertex.
pub fn propagate_roll_on(store: &mut TopoStore, units: &[BlendUnit]) -> BlendResult<RollOnPass> {
    let mut pass = RollOnPass::default();
    let mut claimed = BTreeSet::new();
    for (v, ends) in crate::graph::unit_ends(units) {
        let [end] = ends.as_slice() else { continue };
        let unit = &units[end.unit];
        let k = if end.at_start { 0 } else { unit.edges.len() - 1 };
        let attr = unit.attribute(store, k)?;
        if !wants_roll_on(store, v, &attr) {
            continue;
        }
        let edge = unit.edges[k];
        let Some(target) = roll_on_target(store, v, edge, &claimed)? else {
            pass.fallbacks.push(v);
            continue;
        };
        // Both ends of a unit can close the last gap through one edge;
        // the first copy serves both.
        if claimed.insert(target) {
            let copied = rolled_attribute(store, &attr, end.at_start, target, v)?;
            log::debug!("rolling {:?} on from {edge:?} to {target:?} at {v:?}", attr.family());
            store.set_attribute(EntityRef::Edge(target), Attribute::Implicit(copied));
        }
        pass.rolled.push((v, target));
    }
    Ok(pass)
}

/// The attribute to put on `target`, stored in `target`'s own direction.
fn rolled_attribute(
    store: &TopoStore,
    attr: &BlendAttribute,
    at_start: bool,
    target: EdgeId,
    v: VertexId,
) -> BlendResult<BlendAttribute> {
    let kind = match &attr.kind {
        BlendKind::ConstChamfer { .. } | BlendKind::ConstRound { .. } => attr.kind.clone(),
        _ => {
            let radius = attr.end_radius(at_start).map_or(0.0, |r| r.nominal());
            BlendKind::ConstRound { radius }
        }
    };
    let mut ends = attr.ends;
    ends.start_setback = Default::default();
    ends.end_setback = Default::default();
    let copied = BlendAttribute {
        kind,
        convexity: edge_convexity(store, target)?,
        ends,
        owner: EntityRef::Edge(target),
    };
    // In unit direction the copy runs away from v past the start, and on
    // from v past the end.
    let e = store.edge(target)?;
    let same_sense = if at_start { e.end == v } else { e.start == v };
    Ok(if same_sense { copied } else { copied.reversed() })
}

/// Decide the resolution at `v`. A roll-on request with a tangent edge
/// still free reads as `RolledOn`; one that has nowhere to go is capped.
pub fn classify_junction(
    store: &TopoStore,
    v: VertexId,
    ends: Vec<UnitEnd>,
    spines: &[Spine],
) -> Junction {
    let resolution = classify(store, v, &ends, spines);
    log::debug!("junction {v:?} with {} ends: {resolution:?}", ends.len());
    Junction { vertex: v, resolution, ends }
}

fn classify(store: &TopoStore, v: VertexId, ends: &[UnitEnd], spines: &[Spine]) -> Resolution {
    if directive(store, v) == Some(Directive::Cap) {
        return Resolution::Capped;
    }
    if let [end] = ends {
        let spine = &spines[end.unit];
        if wants_roll_on(store, v, end_attribute(spine, end.at_start)) {
            let edge = end_edge(spine, end.at_start);
            return match roll_on_target(store, v, edge, &BTreeSet::new()) {
                Ok(Some(_)) => Resolution::RolledOn,
                _ => Resolution::Capped,
            };
        }
    }
    let property = vertex_property(store, v);
    match (ends, property) {
        ([_], Some(VertexProperty::Runout)) => return Resolution::RunOut,
        ([a, b], Some(VertexProperty::BiBlend)) if ends_mitre(spines, *a, *b) => {
            return Resolution::Mitred;
        }
        _ => {}
    }
    if let Some((shape, auto_setback)) = vertex_shape(store, v) {
        return Resolution::VertexBlended { shape, auto_setback, auto: false };
    }
    match ends {
        [end] => {
            let spine = &spines[end.unit];
            if end_radius(spine, end.at_start) <= RUNOUT_RADIUS {
                Resolution::RunOut
            } else {
                Resolution::Capped
            }
        }
        [a, b] if ends_mitre(spines, *a, *b) => Resolution::Mitred,
        _ => auto_vertex_blend(),
    }
}

fn ends_mitre(spines: &[Spine], a: UnitEnd, b: UnitEnd) -> bool {
    let (sa, sb) = (&spines[a.unit], &spines[b.unit]);
    mitre_compatible(
        end_attribute(sa, a.at_start),
        a.at_start,
        end_attribute(sb, b.at_start),
        b.at_start,
    )
}

/// Blank edge at a unit end.
fn end_edge(spine: &Spine, at_start: bool) -> EdgeId {
    end_segment(spine, at_start).edge
}

fn auto_vertex_blend() -> Resolution {
    Resolution::VertexBlended {
        shape: VertexShape { bulge: 1.0, continuity: Continuity::Slope, cusp: false },
        auto_setback: AutoSetback::Unset,
        auto: true,
    }
}

/// Every junction of a set of units.
pub fn junctions(store: &TopoStore, units: &[BlendUnit], spines: &[Spine]) -> Vec<Junction> {
    let ends: BTreeMap<VertexId, Vec<UnitEnd>> = crate::graph::unit_ends(units);
    ends.into_iter().map(|(v, e)| classify_junction(store, v, e, spines)).collect()
}

/// The end condition for one unit end at `junction`.
pub fn end_condition(
    store: &TopoStore,
    junction: &Junction,
    end: UnitEnd,
    spines: &[Spine],
    tol: f64,
) -> BlendResult<EndCondition> {
    let spine = &spines[end.unit];
    let sigma = end_sigma(spine, end.at_start);
    match junction.resolution {
        Resolution::RunOut | Resolution::RolledOn => Ok(EndCondition::Iso(sigma)),
        Resolution::Capped => cap_condition(store, spine, end.at_start, junction.vertex),
        Resolution::Mitred => {
            let other = junction
                .ends
                .iter()
                .find(|e| **e != end)
                .ok_or_else(|| BlendError::unsupported("mitre needs two ends", spine.entities()))?;
            let vertex = store.vertex(junction.vertex)?.point;
            let (point, normal) = mitre_plane(
                vertex,
                away_tangent(spine, end.at_start),
                away_tangent(&spines[other.unit], other.at_start),
                &spine.entities(),
            )?;
            Ok(EndCondition::Plane { point, normal })
        }
        Resolution::VertexBlended { auto_setback, .. } => {
            let (left, right) = setbacks(store, junction, end, spines, auto_setback, tol)?;
            setback_condition(spine, end.at_start, left, right, tol)
        }
    }
}

/// A capped end stops on the face at the vertex that the blend runs
/// into, or on a side cap face when a spring leaves its support first.
fn cap_condition(
    store: &TopoStore,
    spine: &Spine,
    at_start: bool,
    v: VertexId,
) -> BlendResult<EndCondition> {
    if let Some((face, surface)) = side_cap_face(store, spine, at_start)? {
        if sidecap::runs_along(&surface, &away_tangent(spine, at_start)) {
            let reason = "blend is wider than its support face";
            return Err(BlendError::unsupported(reason, spine.entities()));
        }
        return Ok(EndCondition::OnFace { face, surface });
    }
    let seg = end_segment(spine, at_start);
    let p = store.vertex(v)?.point;
    let t = away_tangent(spine, at_start);
    let mut best: Option<(f64, FaceId)> = None;
    for f in store.vertex_faces(v)? {
        if seg.supports.iter().any(|s| s.face == f) {
            continue;
        }
        let score = store.face_normal_at(f, &p)?.dot(&t).abs();
        if best.map_or(true, |(b, _)| score > b) {
            best = Some((score, f));
        }
    }
    match best {
        Some((_, face)) => {
            Ok(EndCondition::OnFace { face, surface: store.face(face)?.surface.clone() })
        }
        None => Ok(EndCondition::Iso(end_sigma(spine, at_start))),
    }
}

/// Left and right setbacks of a vertex-blended end, measured along the
/// spine from the vertex.
fn setbacks(
    store: &TopoStore,
    junction: &Junction,
    end: UnitEnd,
    spines: &[Spine],
    auto_setback: AutoSetback,
    tol: f64,
) -> BlendResult<(f64, f64)> {
    let spine = &spines[end.unit];
    let attr = end_attribute(spine, end.at_start);
    let s = if end.at_start { attr.ends.start_setback } else { attr.ends.end_setback };
    if s.diff_set || s.value > tol {
        return Ok((s.left(), s.right()));
    }
    let r = end_radius(spine, end.at_start);
    if auto_setback == AutoSetback::Linear {
        return Ok((r, r));
    }
    let left = derived_setback(store, junction, end, spines, Side::Left, r)?;
    let right = derived_setback(store, junction, end, spines, Side::Right, r)?;
    Ok((left, right))
}

/// Distance from the vertex at which this end's spring on `side` crosses
/// the spring of a neighbouring blend on the same face. Without a
/// neighbour on that face the end's radius is used.
fn derived_setback(
    store: &TopoStore,
    junction: &Junction,
    end: UnitEnd,
    spines: &[Spine],
    side: Side,
    fallback: f64,
) -> BlendResult<f64> {
    let spine = &spines[end.unit];
    let k = match side {
        Side::Left => 0,
        Side::Right => 1,
    };
    let seg = end_segment(spine, end.at_start);
    let face = seg.supports[k].face;
    let at = |s: f64| if end.at_start { s } else { spine.length() - s };

    let mut result: Option<f64> = None;
    for other in junction.ends.iter().filter(|e| **e != end) {
        let os = &spines[other.unit];
        let oseg = end_segment(os, other.at_start);
        let Some(ok) = oseg.supports.iter().position(|s| s.face == face) else { continue };
        let section = os.section(end_sigma(os, other.at_start))?;
        let q = section.contacts[ok];
        let m = store.face_normal_at(face, &q)?.cross(&away_tangent(os, other.at_start));
        if m.norm() < 1e-12 {
            continue;
        }
        let mut failure = None;
        let mut g = |s: f64| match spine.section(at(s)) {
            Ok(sec) => (sec.contacts[k] - q).dot(&m),
            Err(e) => {
                failure.get_or_insert(e);
                f64::NAN
            }
        };
        let root = expand_bracket(&mut g, 0.0, fallback.max(1e-3), 12)
            .and_then(|(lo, hi)| brent(&mut g, lo, hi, ROOT_TOL, ROOT_ITER).ok());
        if let Some(e) = failure {
            return Err(e);
        }
        if let Some(s) = root.filter(|s| *s > 0.0) {
            result = Some(result.map_or(s, |r: f64| r.max(s)));
        }
    }
    Ok(result.unwrap_or(fallback))
}

/// Iso cut for equal setbacks, otherwise the plane through both spring
/// points that contains the cross direction.
fn setback_condition(
    spine: &Spine,
    at_start: bool,
    left: f64,
    right: f64,
    tol: f64,
) -> BlendResult<EndCondition> {
    let len = spine.length();
    let at = |s: f64| if at_start { s } else { len - s };
    if left.max(right) >= len {
        return Err(BlendError::unsupported("setback exceeds the blend length", spine.entities()));
    }
    if (left - right).abs() <= tol {
        return Ok(EndCondition::Iso(at(left)));
    }
    let a = spine.section(at(left))?.contacts[0];
    let b = spine.section(at(right))?.contacts[1];
    let across = b - a;
    let (_, t) = spine.frame(at(0.5 * (left + right)));
    if across.norm() < 1e-12 {
        return Ok(EndCondition::Iso(at(0.5 * (left + right))));
    }
    let u = across.normalize();
    let normal = t - u * t.dot(&u);
    if normal.norm() < 1e-9 {
        let reason = "setback plane is tangent to the spine";
        return Err(BlendError::unsupported(reason, spine.entities()));
    }
    Ok(EndCondition::Plane { point: a, normal: normal.normalize() })
}

/// Solve where the sections of `spine` meet `condition` near the given end.
pub fn cut_end(
    spine: &Spine,
    condition: EndCondition,
    at_start: bool,
    tol: f64,
) -> BlendResult<EndCut> {
    let nominal = end_sigma(spine, at_start);
    let distance: Box<dyn Fn(&Point3) -> f64> = match condition.clone() {
        EndCondition::Iso(sigma) => return iso_cut(spine, condition, sigma, tol),
        EndCondition::OnFace { surface, .. } => Box::new(move |p: &Point3| {
            let (u, v) = surface.closest_parameters(p);
            (p - surface.evaluate(u, v)).dot(&surface.normal(u, v))
        }),
        EndCondition::Plane { point, normal } => {
            Box::new(move |p: &Point3| (p - point).dot(&normal))
        }
    };

    let reach = 0.5 * end_radius(spine, at_start).max(1e-3);
    let mut roots = Vec::with_capacity(CUT_SAMPLES);
    let mut points = Vec::with_capacity(CUT_SAMPLES);
    let mut center = nominal;
    for i in 0..CUT_SAMPLES {
        let w = i as f64 / (CUT_SAMPLES - 1) as f64;
        let mut failure = None;
        let mut g = |s: f64| match spine.section(s) {
            Ok(sec) => distance(&sec.point_at(w)),
            Err(e) => {
                failure.get_or_insert(e);
                f64::NAN
            }
        };
        let root = expand_bracket(&mut g, center - reach, center + reach, 16)
            .and_then(|(lo, hi)| brent(&mut g, lo, hi, ROOT_TOL, ROOT_ITER).ok());
        if let Some(e) = failure {
            return Err(e);
        }
        let sigma = root.ok_or_else(|| {
            BlendError::unsupported("blend end does not meet its cut", spine.entities())
        })?;
        center = sigma;
        roots.push(sigma);
        points.push(spine.section(sigma)?.point_at(w));
    }

    let lo = roots.iter().copied().fold(f64::MAX, f64::min);
    let hi = roots.iter().copied().fold(f64::MIN, f64::max);
    if hi - lo <= tol {
        return iso_cut(spine, condition, 0.5 * (lo + hi), tol);
    }
    let mut chord = vec![0.0];
    for w in points.windows(2) {
        chord.push(chord[chord.len() - 1] + (w[1] - w[0]).norm());
    }
    let total = chord[chord.len() - 1];
    if total <= tol {
        return iso_cut(spine, condition, 0.5 * (lo + hi), tol);
    }
    let params: Vec<f64> = chord.iter().map(|c| c / total).collect();
    let curve = interpolate_curve(&params, &points, 3)
        .ok_or_else(|| BlendError::unsupported("end cut curve fit failed", spine.entities()))?;
    let middle = spine.section(roots[CUT_SAMPLES / 2])?;
    Ok(EndCut {
        condition,
        sigma: [roots[0], roots[CUT_SAMPLES - 1]],
        span: (lo, hi),
        curve: Some(Curve3::Nurbs(curve)),
        ball: ball_of(&middle.roller, middle.center),
        degenerate: false,
    })
}

fn iso_cut(spine: &Spine, condition: EndCondition, sigma: f64, tol: f64) -> BlendResult<EndCut> {
    let section = spine.section(sigma)?;
    Ok(EndCut {
        condition,
        sigma: [sigma, sigma],
        span: (sigma, sigma),
        curve: None,
        ball: ball_of(&section.roller, section.center),
        degenerate: section.is_degenerate(tol),
    })
}

fn ball_of(roller: &Roller, center: Point3) -> Option<(Point3, f64)> {
    match roller {
        Roller::Ball(r) if *r > RUNOUT_RADIUS => Some((center, *r)),
        _ => None,
    }
}
