//! Phase 1: blend sheets.
//!
//! Every coupled group of units is resolved on its own: spines, junctions,
//! end cuts, blend surfaces and finally faces. The faces of all groups go
//! into one sheet body whose free edges lie on blank faces. Vertices and
//! edges are shared through a [`SheetBuilder`], which welds coincident
//! points, so a mitre edge or the cut curve between an edge blend and its
//! vertex blend exists once.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use crate::attrib::{
    entity_blend_owners, instruction, vertex_blend, AttributeSlot, BlendKind, Continuity, Convexity,
    ExplicitBlend, ExplicitKind,
};
use crate::curve::Curve3;
use crate::error::{BlendError, BlendResult};
use crate::fit::{fit_blend, fit_vertex_blend, split_vbl, FittedBlend, VertexShape, VertexSide};
use crate::graph::{coupled_groups, partition_units, BlendUnit, UnitEnd};
use crate::junction::{
    cut_end, end_condition, end_segment, junctions, propagate_roll_on, EndCondition, EndCut,
    Junction, Resolution,
};
use crate::math::{Point3, Vector3};
use crate::nurbs::fit::{interpolate_curve, interpolate_grid};
use crate::nurbs::NurbsSurface;
use crate::primitive::{make_face, new_body};
use crate::radius::Side;
use crate::spine::{Spine, SpringPiece};
use crate::surface::{Surface, VblBoundary, VblSurface};
use crate::topo::{
    BodyId, BodyKind, Checkpoint, Edge, EdgeId, EntityRef, FaceId, ShellId, TopoStore, UvBox,
    Vertex, VertexId,
};

use super::report::{BlendReport, UnitFailure, WarningKind};
use super::{entity, entity_list, BlendContext};

const CROSS_SAMPLES: usize = 5;
const CONNECTOR_SAMPLES: usize = 8;

/// The phase-1 result: blend faces not yet joined to the blank.
#[derive(Debug)]
pub struct BlendSheet {
    pub body: BodyId,
    pub(crate) shell: ShellId,
    pub blank: BodyId,
    pub units: Vec<SheetUnit>,
    /// Blank face under each free sheet edge.
    pub edge_hints: BTreeMap<EdgeId, FaceId>,
    /// Bodies joined to the blank by entity-entity blends.
    pub others: Vec<BodyId>,
    pub report: BlendReport,
    pub op_tag: u64,
    pub(crate) checkpoint: Checkpoint,
    pub(crate) previews: Vec<NurbsSurface>,
}

/// What one resolved group contributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SheetUnit {
    /// Owners of the implicit attributes the group resolves.
    pub sources: Vec<EntityRef>,
    pub faces: Vec<FaceId>,
    pub explicit: Vec<(FaceId, ExplicitBlend)>,
    pub consumed_edges: Vec<EdgeId>,
    pub consumed_vertices: Vec<VertexId>,
}

/// Creates sheet vertices and edges, reusing coincident ones.
pub(crate) struct SheetBuilder {
    pub shell: ShellId,
    tol: f64,
    vertices: Vec<(VertexId, Point3)>,
    edges: Vec<EdgeId>,
    hints: Vec<(EdgeId, FaceId)>,
}

#[derive(Clone, Copy)]
pub(crate) struct BuilderMark(usize, usize, usize);

impl SheetBuilder {
    pub fn new(shell: ShellId, tol: f64) -> Self {
        SheetBuilder { shell, tol, vertices: Vec::new(), edges: Vec::new(), hints: Vec::new() }
    }

    pub fn mark(&self) -> BuilderMark {
        BuilderMark(self.vertices.len(), self.edges.len(), self.hints.len())
    }

    /// Forget everything created since `mark`; the store side is rolled
    /// back by the caller.
    pub fn rollback(&mut self, mark: BuilderMark) {
        self.vertices.truncate(mark.0);
        self.edges.truncate(mark.1);
        self.hints.truncate(mark.2);
    }

    pub fn vertex(&mut self, store: &mut TopoStore, p: Point3) -> VertexId {
        if let Some(&(v, _)) = self.vertices.iter().find(|(_, q)| (q - p).norm() <= self.tol) {
            return v;
        }
        let v = store.add_vertex(Vertex { point: p });
        self.vertices.push((v, p));
        v
    }

    /// An edge along `curve` from `ta` to `tb`, and whether traversing it
    /// forward goes from `ta` to `tb`.
    pub fn edge(
        &mut self,
        store: &mut TopoStore,
        curve: Curve3,
        ta: f64,
        tb: f64,
    ) -> BlendResult<(EdgeId, bool)> {
        if (tb - ta).abs() <= 1e-12 {
            return Err(BlendError::unsupported("zero-length sheet edge", Vec::new()));
        }
        let va = self.vertex(store, curve.evaluate(ta));
        let vb = self.vertex(store, curve.evaluate(tb));
        let tm = 0.5 * (ta + tb);
        let mid = curve.evaluate(tm);
        let heading = curve.tangent(tm) * (tb - ta).signum();
        for &e in &self.edges {
            let ex = store.edge(e)?;
            if !((ex.start == va && ex.end == vb) || (ex.start == vb && ex.end == va)) {
                continue;
            }
            let (d, t) = ex.curve.distance_within(&mid, ex.t_start, ex.t_end);
            if d <= self.tol {
                return Ok((e, ex.curve.tangent(t).dot(&heading) > 0.0));
            }
        }
        let (edge, forward) = if ta < tb {
            (Edge { curve, t_start: ta, t_end: tb, start: va, end: vb }, true)
        } else {
            (Edge { curve, t_start: tb, t_end: ta, start: vb, end: va }, false)
        };
        let e = store.add_edge(edge);
        self.edges.push(e);
        Ok((e, forward))
    }

    pub fn hint(&mut self, edge: EdgeId, face: FaceId) {
        if !self.hints.iter().any(|(e, _)| *e == edge) {
            self.hints.push((edge, face));
        }
    }

    pub fn face(
        &mut self,
        store: &mut TopoStore,
        surface: Surface,
        loop_: Vec<(EdgeId, bool)>,
        outward: bool,
        domain: Option<UvBox>,
    ) -> FaceId {
        make_face(store, self.shell, surface, &[loop_], outward, domain)
    }

    pub fn into_hints(self) -> BTreeMap<EdgeId, FaceId> {
        self.hints.into_iter().collect()
    }
}

pub(crate) fn reversed_loop(loop_: Vec<(EdgeId, bool)>) -> Vec<(EdgeId, bool)> {
    loop_.into_iter().rev().map(|(e, f)| (e, !f)).collect()
}

/// Phase 1: resolve every implicit blend on `blank` into a sheet.
///
/// Opens a store checkpoint that stays open until [`super::complete`]
/// commits it or [`super::discard_sheet`] rolls it back.
pub fn make_sheet(
    store: &mut TopoStore,
    blank: BodyId,
    ctx: &BlendContext,
) -> BlendResult<BlendSheet> {
    build_sheet(store, blank, ctx, false, &[])
}

/// Build the sheet. Groups touching a source in `held` are not built;
/// they are reported with the held error instead.
pub(crate) fn build_sheet(
    store: &mut TopoStore,
    blank: BodyId,
    ctx: &BlendContext,
    previews: bool,
    held: &[UnitFailure],
) -> BlendResult<BlendSheet> {
    if store.body(blank)?.shells.is_empty() {
        return Err(BlendError::unsupported("blank body has no shell", vec![blank.into()]));
    }
    let checkpoint = store.begin();
    match populate(store, blank, ctx, previews, held, checkpoint) {
        Ok(sheet) => Ok(sheet),
        Err(e) => {
            store.rollback_to(checkpoint);
            Err(e)
        }
    }
}

fn populate(
    store: &mut TopoStore,
    blank: BodyId,
    ctx: &BlendContext,
    want_previews: bool,
    held: &[UnitFailure],
    checkpoint: Checkpoint,
) -> BlendResult<BlendSheet> {
    log::debug!("make_sheet on {blank:?}");
    let op_tag = store.fresh_tag();
    let (body, shell) = new_body(store, BodyKind::Sheet);
    let mut builder = SheetBuilder::new(shell, ctx.options.weld_tolerance());
    let mut report = BlendReport::default();
    let mut previews = Vec::new();

    let rolled = roll_on(store, blank, &mut report)?;

    let units = partition_units(store, blank)?;
    let mut sheet_units = Vec::new();
    for group in coupled_groups(&units) {
        let members: Vec<BlendUnit> = group.iter().map(|&i| units[i].clone()).collect();
        let entities: Vec<EntityRef> =
            members.iter().flat_map(|u| u.edges.iter().map(|&e| EntityRef::Edge(e))).collect();
        if let Some(failure) = held_by(held, &entities) {
            drop_rolled(store, &rolled, &members);
            report.fail(entities, failure.error.clone());
            continue;
        }
        let cp = store.begin();
        let mark = builder.mark();
        let mut group_previews = Vec::new();
        let built = build_group(
            store,
            &mut builder,
            blank,
            &members,
            ctx,
            op_tag,
            &mut report,
            want_previews.then_some(&mut group_previews),
        );
        match built {
            Ok(unit) => {
                store.commit(cp);
                report.resolved.extend(members.iter().map(|u| entity_list(&u.edges)));
                previews.extend(group_previews);
                sheet_units.push(unit);
            }
            Err(e) => {
                store.rollback_to(cp);
                builder.rollback(mark);
                drop_rolled(store, &rolled, &members);
                report.fail(entities.clone(), e.with_entities(&entities));
            }
        }
    }

    let mut others = Vec::new();
    for face in entity_blend_owners(store, blank) {
        if let Some(failure) = held_by(held, &[face.into()]) {
            report.fail(vec![face.into()], failure.error.clone());
            continue;
        }
        let cp = store.begin();
        let mark = builder.mark();
        let mut group_previews = Vec::new();
        let built = entity::build(
            store,
            &mut builder,
            blank,
            face,
            ctx,
            op_tag,
            &mut report,
            want_previews.then_some(&mut group_previews),
        );
        match built {
            Ok((unit, other)) => {
                store.commit(cp);
                report.resolved.push(unit.sources.clone());
                previews.extend(group_previews);
                if let Some(b) = other.filter(|b| *b != blank && !others.contains(b)) {
                    others.push(b);
                }
                sheet_units.push(unit);
            }
            Err(e) => {
                store.rollback_to(cp);
                builder.rollback(mark);
                report.fail(vec![face.into()], e);
            }
        }
    }

    log::debug!(
        "sheet {body:?}: {} groups resolved, {} failed",
        sheet_units.len(),
        report.failures.len()
    );
    Ok(BlendSheet {
        body,
        shell,
        blank,
        units: sheet_units,
        edge_hints: builder.into_hints(),
        others,
        report,
        op_tag,
        checkpoint,
        previews,
    })
}

/// Remove the attributes roll-on copied onto the edges of `members`.
fn drop_rolled(store: &mut TopoStore, rolled: &[EdgeId], members: &[BlendUnit]) {
    for &edge in rolled.iter().filter(|e| members.iter().any(|u| u.contains_edge(**e))) {
        store.remove_attribute(EntityRef::Edge(edge), AttributeSlot::EdgeBlend);
    }
}

fn held_by<'a>(held: &'a [UnitFailure], entities: &[EntityRef]) -> Option<&'a UnitFailure> {
    held.iter().find(|f| f.entities.iter().any(|e| entities.contains(e)))
}

/// Propagate roll-on requests until none moves. Returns the edges that
/// received a copied attribute.
fn roll_on(
    store: &mut TopoStore,
    blank: BodyId,
    report: &mut BlendReport,
) -> BlendResult<Vec<EdgeId>> {
    let mut rolled = Vec::new();
    let limit = store.body_edges(blank)?.len() + 1;
    for _ in 0..limit {
        let units = partition_units(store, blank)?;
        let pass = propagate_roll_on(store, &units)?;
        if pass.rolled.is_empty() {
            for v in pass.fallbacks {
                let message = "no tangent edge to roll onto; end is capped";
                report.warn(WarningKind::RollOnFallback, vec![v.into()], message);
            }
            break;
        }
        rolled.extend(pass.rolled.into_iter().map(|(_, e)| e));
    }
    Ok(rolled)
}

/// Cut curve at one end of a unit, as built into the sheet.
#[derive(Clone, Debug)]
struct CutSide {
    /// Edge and whether its forward sense runs left to right. `None` when
    /// the section collapsed to a point.
    edge: Option<(EdgeId, bool)>,
    /// Left to right over `[0, 1]`.
    curve: Curve3,
    cut: EndCut,
}

#[allow(clippy::too_many_arguments)]
fn build_group(
    store: &mut TopoStore,
    builder: &mut SheetBuilder,
    blank: BodyId,
    units: &[BlendUnit],
    ctx: &BlendContext,
    op_tag: u64,
    report: &mut BlendReport,
    mut previews: Option<&mut Vec<NurbsSurface>>,
) -> BlendResult<SheetUnit> {
    let opts = &ctx.options;
    let spines = units
        .iter()
        .map(|u| Spine::from_unit(store, u, opts.fit_tolerance))
        .collect::<BlendResult<Vec<Spine>>>()?;

    for (unit, spine) in units.iter().zip(&spines) {
        let lost = engulfed_vertices(store, blank, spine, &unit.vertices, opts.tolerance)?;
        if lost.is_empty() {
            continue;
        }
        let mut entities = spine.entities();
        entities.extend(lost.iter().map(|&v| EntityRef::Vertex(v)));
        if opts.retain_features {
            return Err(BlendError::FeatureLoss { entities });
        }
        let message = format!("blend engulfs {} model vertices", lost.len());
        report.warn(WarningKind::FeatureLoss, entities, message);
    }

    let junctions = junctions(store, units, &spines);
    for j in &junctions {
        let concave =
            j.ends.iter().filter(|e| spines[e.unit].convexity == Convexity::Concave).count();
        if concave > 0 && concave < j.ends.len() && !opts.concave_first {
            report.warn(
                WarningKind::OrderingMisuse,
                vec![j.vertex.into()],
                "mixed-convexity junction not resolved concave first",
            );
        }
    }

    // End cuts of every open unit.
    let mut cuts: Vec<Option<(EndCut, EndCut)>> = Vec::with_capacity(spines.len());
    for (i, spine) in spines.iter().enumerate() {
        if spine.closed {
            cuts.push(None);
            continue;
        }
        let cut_at = |at_start| UnitEnd { unit: i, at_start };
        let start = unit_cut(store, &junctions, &spines, cut_at(true), opts.tolerance)?;
        let end = unit_cut(store, &junctions, &spines, cut_at(false), opts.tolerance)?;
        if start.span.1 >= end.span.0 - opts.tolerance {
            return Err(BlendError::unsupported("blend ends overlap", spine.entities()));
        }
        cuts.push(Some((start, end)));
    }

    let mut order: Vec<usize> = (0..spines.len()).collect();
    if opts.concave_first {
        order.sort_by_key(|&i| spines[i].convexity != Convexity::Concave);
    }

    let mut out = SheetUnit::default();
    let mut sides: BTreeMap<(usize, bool), CutSide> = BTreeMap::new();
    for &i in &order {
        let spine = &spines[i];
        let range = match &cuts[i] {
            Some((s, e)) => (s.span.0, e.span.1),
            None => (0.0, spine.length()),
        };
        let fit = fit_blend(spine, range, &opts.fit_options())?;
        if fit.station_limit_hit {
            let message = "marching stopped at the station limit";
            report.warn(WarningKind::StationLimit, spine.entities(), message);
        }
        let (face, ends) = edge_blend_face(store, builder, spine, &fit, cuts[i].as_ref())?;
        if let Some([start, end]) = ends {
            sides.insert((i, true), start);
            sides.insert((i, false), end);
        }
        let unit_tag = store.fresh_tag();
        out.explicit.push((face, explicit_record(spine, op_tag, unit_tag)));
        out.faces.push(face);
        if let Some(p) = previews.as_deref_mut() {
            p.extend(edge_patch(spine, &fit));
        }
        log::debug!("unit {:?} resolved as {:?}", spine.entities(), fit.kind);
    }

    for j in &junctions {
        let Resolution::VertexBlended { shape, .. } = j.resolution else { continue };
        let (face, fan, vbl) = vertex_blend_face(store, builder, j, &spines, &sides, shape, ctx)?;
        let unit_tag = store.fresh_tag();
        let record = ExplicitBlend {
            kind: ExplicitKind::Vertex,
            supports: fan,
            function: None,
            op_tag,
            unit_tag,
        };
        out.explicit.push((face, record));
        out.faces.push(face);
        if let Some(p) = previews.as_deref_mut() {
            p.extend(split_vbl(&vbl, opts.patch_interior_tolerance, opts.patch_boundary_tolerance));
        }
    }

    for unit in units {
        for &e in &unit.edges {
            out.sources.push(EntityRef::Edge(e));
            out.consumed_edges.push(e);
        }
        for &v in &unit.vertices {
            if !out.consumed_vertices.contains(&v) {
                out.consumed_vertices.push(v);
            }
        }
    }
    for j in &junctions {
        if vertex_blend(store, j.vertex).is_some() || instruction(store, j.vertex).is_some() {
            out.sources.push(EntityRef::Vertex(j.vertex));
        }
    }
    Ok(out)
}

fn unit_cut(
    store: &TopoStore,
    junctions: &[Junction],
    spines: &[Spine],
    end: UnitEnd,
    tol: f64,
) -> BlendResult<EndCut> {
    let spine = &spines[end.unit];
    let junction = junctions
        .iter()
        .find(|j| j.ends.contains(&end))
        .ok_or_else(|| BlendError::unsupported("unit end has no junction", spine.entities()))?;
    let condition = end_condition(store, junction, end, spines, tol)?;
    cut_end(spine, condition, end.at_start, tol)
}

/// Blank vertices, other than the unit's own, inside the region a blend
/// sweeps: the triangle between the spine and the two contacts.
pub(crate) fn engulfed_vertices(
    store: &TopoStore,
    blank: BodyId,
    spine: &Spine,
    own: &[VertexId],
    tol: f64,
) -> BlendResult<Vec<VertexId>> {
    let len = spine.length();
    let near = 10.0 * tol.max(1e-9);
    let mut lost = Vec::new();
    for v in store.body_vertices(blank)? {
        if own.contains(&v) {
            continue;
        }
        let q = store.vertex(v)?.point;
        let mut sigma = (0..=16)
            .map(|k| len * k as f64 / 16.0)
            .min_by(|a, b| {
                let da = (spine.frame(*a).0 - q).norm();
                let db = (spine.frame(*b).0 - q).norm();
                da.total_cmp(&db)
            })
            .unwrap_or(0.0);
        for _ in 0..4 {
            let (p, t) = spine.frame(sigma);
            sigma = (sigma + (q - p).dot(&t)).clamp(-near, len + near);
        }
        let (p, t) = spine.frame(sigma);
        if (q - p).dot(&t).abs() > near {
            continue;
        }
        let Ok(section) = spine.section(sigma) else { continue };
        if in_triangle(&q, &section.spine_point, &section.contacts[0], &section.contacts[1], near) {
            lost.push(v);
        }
    }
    Ok(lost)
}

/// Whether `q` lies in the closed triangle `abc` but not at a corner.
fn in_triangle(q: &Point3, a: &Point3, b: &Point3, c: &Point3, tol: f64) -> bool {
    if [a, b, c].iter().any(|corner| (q - *corner).norm() <= tol) {
        return false;
    }
    let (ab, ac, aq) = (b - a, c - a, q - a);
    let n = ab.cross(&ac);
    let area2 = n.norm_squared();
    if area2 <= tol * tol {
        return false;
    }
    if aq.dot(&n).abs() / n.norm() > tol {
        return false;
    }
    let beta = aq.cross(&ac).dot(&n) / area2;
    let gamma = ab.cross(&aq).dot(&n) / area2;
    let slack = tol / n.norm().sqrt();
    beta >= -slack && gamma >= -slack && beta + gamma <= 1.0 + slack
}

/// Consecutive spring pieces on the same face become one.
fn merge_pieces(pieces: Vec<SpringPiece>) -> Vec<SpringPiece> {
    let mut out: Vec<SpringPiece> = Vec::with_capacity(pieces.len());
    for p in pieces {
        match out.last_mut() {
            Some(last) if last.face == p.face => last.t1 = p.t1,
            _ => out.push(p),
        }
    }
    out
}

fn cut_side(
    store: &mut TopoStore,
    builder: &mut SheetBuilder,
    spine: &Spine,
    fit: &FittedBlend,
    cut: &EndCut,
) -> BlendResult<CutSide> {
    let curve = match &cut.curve {
        Some(c) => c.clone(),
        None => fit.cross_curve(spine, cut.sigma[0])?,
    };
    let edge =
        if cut.degenerate { None } else { Some(builder.edge(store, curve.clone(), 0.0, 1.0)?) };
    if let (Some((e, _)), EndCondition::OnFace { face, .. }) = (edge, &cut.condition) {
        builder.hint(e, *face);
    }
    Ok(CutSide { edge, curve, cut: cut.clone() })
}

/// The face of one edge-blend unit, and its cut sides at the start and end.
fn edge_blend_face(
    store: &mut TopoStore,
    builder: &mut SheetBuilder,
    spine: &Spine,
    fit: &FittedBlend,
    cuts: Option<&(EndCut, EndCut)>,
) -> BlendResult<(FaceId, Option<[CutSide; 2]>)> {
    let (lo, hi) = fit.range;
    let ([l0, l1], [r0, r1]) = match cuts {
        Some((s, e)) => (
            [s.spring_sigma(Side::Left), e.spring_sigma(Side::Left)],
            [s.spring_sigma(Side::Right), e.spring_sigma(Side::Right)],
        ),
        None => ([lo, hi], [lo, hi]),
    };
    let left = merge_pieces(fit.springs[0].pieces(spine, Side::Left, l0, l1));
    let right = merge_pieces(fit.springs[1].pieces(spine, Side::Right, r0, r1));

    let mut loop_ = Vec::new();
    for piece in left {
        let (e, fwd) = builder.edge(store, piece.curve, piece.t0, piece.t1)?;
        builder.hint(e, piece.face);
        loop_.push((e, fwd));
    }
    let sides = match cuts {
        Some((s, e)) => {
            let start = cut_side(store, builder, spine, fit, s)?;
            let end = cut_side(store, builder, spine, fit, e)?;
            Some([start, end])
        }
        None => None,
    };
    let seam = match &sides {
        Some(_) => None,
        None => Some(builder.edge(store, fit.cross_curve(spine, lo)?, 0.0, 1.0)?),
    };
    let (x_start, x_end) = match &sides {
        Some([s, e]) => (s.edge, e.edge),
        None => (seam, seam),
    };
    if let Some(x) = x_end {
        loop_.push(x);
    }
    for piece in right.into_iter().rev() {
        let (e, fwd) = builder.edge(store, piece.curve, piece.t0, piece.t1)?;
        builder.hint(e, piece.face);
        loop_.push((e, !fwd));
    }
    if let Some((e, fwd)) = x_start {
        loop_.push((e, !fwd));
    }

    // The loop runs along increasing σ at w = 0; flip it when that is
    // clockwise about the solid's outward direction.
    let mid = 0.5 * (lo + hi);
    let h = 1e-3 * (hi - lo).max(1e-6);
    let p_sigma = fit.point(spine, mid + h, 0.5)? - fit.point(spine, mid - h, 0.5)?;
    let p_w = fit.point(spine, mid, 0.6)? - fit.point(spine, mid, 0.4)?;
    if p_sigma.cross(&p_w).dot(&spine.section(mid)?.bisector()) < 0.0 {
        loop_ = reversed_loop(loop_);
    }

    let mut domain = fit.domain(spine)?;
    if spine.closed && matches!(fit.surface, Surface::Torus { .. }) {
        domain.u1 = domain.u0 + TAU;
    }
    let face = builder.face(store, fit.surface.clone(), loop_, fit.outward, Some(domain));
    Ok((face, sides))
}

fn explicit_record(spine: &Spine, op_tag: u64, unit_tag: u64) -> ExplicitBlend {
    let attr = &spine.segments[0].attr;
    let kind = match attr.kind {
        BlendKind::ConstChamfer { .. } => ExplicitKind::Chamfer,
        BlendKind::VariableBlend { .. } => ExplicitKind::Variable,
        _ => ExplicitKind::Round,
    };
    let mut supports = Vec::new();
    for seg in &spine.segments {
        for s in &seg.supports {
            if !supports.contains(&s.face) {
                supports.push(s.face);
            }
        }
    }
    ExplicitBlend { kind, supports, function: attr.radius_function(), op_tag, unit_tag }
}

/// One bicubic patch through the blend over its fitted range.
fn edge_patch(spine: &Spine, fit: &FittedBlend) -> Option<NurbsSurface> {
    if let Surface::Nurbs(n) = &fit.surface {
        return Some(n.clone());
    }
    let (lo, hi) = fit.range;
    let us: Vec<f64> = (0..9).map(|i| lo + (hi - lo) * i as f64 / 8.0).collect();
    let vs: Vec<f64> = (0..5).map(|j| j as f64 / 4.0).collect();
    let mut grid = Vec::with_capacity(us.len());
    for &u in &us {
        let row =
            vs.iter().map(|&v| fit.point(spine, u, v)).collect::<BlendResult<Vec<Point3>>>().ok()?;
        grid.push(row);
    }
    interpolate_grid(&us, &vs, &grid, 3, 3)
}

/// One corner of the boundary around a blended vertex.
enum Corner {
    /// The cut side of a unit ending here, oriented from the face before
    /// it in the fan to the face after it.
    Cut { edge: (EdgeId, bool), boundary: VblBoundary, ball: Option<(Point3, f64)> },
    /// An unblended edge, crossed at one point.
    Point(Point3),
}

impl Corner {
    fn first(&self) -> Point3 {
        match self {
            Corner::Cut { boundary, .. } => boundary.point(0.0),
            Corner::Point(p) => *p,
        }
    }

    fn last(&self) -> Point3 {
        match self {
            Corner::Cut { boundary, .. } => boundary.point(1.0),
            Corner::Point(p) => *p,
        }
    }
}

/// The face closing a vertex-blended junction. Returns the face, the
/// faces around the vertex and the n-sided patch over the same boundary.
fn vertex_blend_face(
    store: &mut TopoStore,
    builder: &mut SheetBuilder,
    junction: &Junction,
    spines: &[Spine],
    sides: &BTreeMap<(usize, bool), CutSide>,
    shape: VertexShape,
    ctx: &BlendContext,
) -> BlendResult<(FaceId, Vec<FaceId>, VblSurface)> {
    let v = junction.vertex;
    let vertex = store.vertex(v)?.point;
    let fan = store.vertex_fan(v)?;
    let n = fan.len();
    let err = |reason: &str| BlendError::unsupported(reason.to_string(), vec![v.into()]);
    if n < 2 {
        return Err(err("vertex blend needs a closed fan of faces"));
    }
    let faces: Vec<FaceId> = fan.iter().map(|item| item.face).collect();
    let setback = junction
        .ends
        .iter()
        .filter_map(|end| sides.get(&(end.unit, end.at_start)).map(|s| (end, s)))
        .map(|(end, s)| {
            if end.at_start { s.cut.span.1 } else { spines[end.unit].length() - s.cut.span.0 }
        })
        .fold(0.0, f64::max);

    let mut corners = Vec::with_capacity(n);
    for k in 0..n {
        let edge = fan[k].incoming;
        let before = fan[(k + n - 1) % n].face;
        let end = junction
            .ends
            .iter()
            .find(|end| end_segment(&spines[end.unit], end.at_start).edge == edge);
        match end {
            Some(end) => {
                let side = sides
                    .get(&(end.unit, end.at_start))
                    .ok_or_else(|| err("unit end was not cut"))?;
                let (e, fwd) = side.edge.ok_or_else(|| err("collapsed cut at a vertex blend"))?;
                let spine = &spines[end.unit];
                let seg = end_segment(spine, end.at_start);
                let from_left = if seg.supports[0].face == before {
                    true
                } else if seg.supports[1].face == before {
                    false
                } else {
                    return Err(err("cut side does not meet the fan"));
                };
                let (t0, t1) = if from_left { (0.0, 1.0) } else { (1.0, 0.0) };
                let cross = cut_cross_tangents(spine, &side.cut, end.at_start, from_left)?;
                corners.push(Corner::Cut {
                    edge: if from_left { (e, fwd) } else { (e, !fwd) },
                    boundary: VblBoundary { curve: side.curve.clone(), t0, t1, cross },
                    ball: side.cut.ball,
                });
            }
            None => {
                let ed = store.edge(edge)?;
                let dir = store.edge_direction_from(edge, v)?;
                let length = ed.curve.length(ed.t_start, ed.t_end);
                if setback >= length {
                    return Err(err("vertex blend setback exceeds an unblended edge"));
                }
                let t = ed.curve.closest_parameter(&(vertex + dir * setback));
                corners.push(Corner::Point(ed.curve.evaluate(t)));
            }
        }
    }

    let mut loop_ = Vec::new();
    let mut vsides = Vec::new();
    for k in 0..n {
        if let Corner::Cut { edge, boundary, ball } = &corners[k] {
            loop_.push(*edge);
            vsides.push(VertexSide { boundary: boundary.clone(), ball: *ball, connector: false });
        }
        let (a, b) = (corners[k].last(), corners[(k + 1) % n].first());
        if (b - a).norm() <= ctx.options.weld_tolerance() {
            continue;
        }
        let face = fan[k].face;
        let curve = connector_curve(store, face, a, b)?;
        let (e, fwd) = builder.edge(store, curve.clone(), 0.0, 1.0)?;
        builder.hint(e, face);
        loop_.push((e, fwd));
        let cross = connector_cross_tangents(store, face, &curve, &vertex)?;
        vsides.push(VertexSide {
            boundary: VblBoundary { curve, t0: 0.0, t1: 1.0, cross },
            ball: None,
            connector: true,
        });
    }

    let mut outward = Vector3::zeros();
    for &f in &faces {
        outward += store.face_normal_at(f, &vertex)?;
    }
    let outward = if outward.norm() > 1e-12 {
        outward.normalize()
    } else {
        store.face_normal_at(faces[0], &vertex)?
    };

    // Signed area of the boundary about the mean normal.
    let ring: Vec<Point3> = vsides
        .iter()
        .flat_map(|s| (0..4).map(move |i| s.boundary.point(i as f64 / 4.0)))
        .collect();
    let sum = ring.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
    let centre = Point3::from(sum / ring.len().max(1) as f64);
    let area: f64 = (0..ring.len())
        .map(|i| {
            let next = ring[(i + 1) % ring.len()];
            (ring[i] - centre).cross(&(next - centre)).dot(&outward)
        })
        .sum();
    if area < 0.0 {
        loop_ = reversed_loop(loop_);
    }

    let boundaries: Vec<VblBoundary> = vsides.iter().map(|s| s.boundary.clone()).collect();
    let fit = fit_vertex_blend(vsides, vertex, outward, shape, ctx.options.weld_tolerance())?;
    // Spherical closures still get an n-sided patch for previews.
    let patch = match &fit.surface {
        Surface::VertexBlend(vbl) => (**vbl).clone(),
        _ => {
            let slope = !matches!(shape.continuity, Continuity::Position);
            VblSurface::new(boundaries, outward, if shape.cusp { 0.0 } else { shape.bulge }, slope)
        }
    };
    log::debug!("vertex blend at {v:?} with {} sides", patch.sides());
    let face = builder.face(store, fit.surface, loop_, fit.outward, None);
    Ok((face, faces, patch))
}

/// Directions in which the blend continues past its cut towards the
/// vertex, sampled along the cut side.
fn cut_cross_tangents(
    spine: &Spine,
    cut: &EndCut,
    at_start: bool,
    from_left: bool,
) -> BlendResult<Vec<Vector3>> {
    let step = if at_start { -1.0 } else { 1.0 } * 1e-3 * spine.length().max(1.0);
    let mut out = Vec::with_capacity(CROSS_SAMPLES);
    for i in 0..CROSS_SAMPLES {
        let s = i as f64 / (CROSS_SAMPLES - 1) as f64;
        let w = if from_left { s } else { 1.0 - s };
        let sigma = cut.sigma[0] + w * (cut.sigma[1] - cut.sigma[0]);
        let here = spine.section(sigma)?.point_at(w);
        let beyond = spine.section(sigma + step)?.point_at(w);
        let d = beyond - here;
        if d.norm() > 1e-12 {
            out.push(d.normalize());
        }
    }
    Ok(if out.len() == CROSS_SAMPLES { out } else { Vec::new() })
}

/// Connector between two boundary points along a blank face.
fn connector_curve(store: &TopoStore, face: FaceId, a: Point3, b: Point3) -> BlendResult<Curve3> {
    let surface = &store.face(face)?.surface;
    if matches!(surface, Surface::Plane { .. }) {
        return Ok(Curve3::segment(a, b));
    }
    let mut points: Vec<Point3> = (0..=CONNECTOR_SAMPLES)
        .map(|i| {
            let q = a + (b - a) * (i as f64 / CONNECTOR_SAMPLES as f64);
            let (u, v) = surface.closest_parameters(&q);
            surface.evaluate(u, v)
        })
        .collect();
    points[0] = a;
    points[CONNECTOR_SAMPLES] = b;
    let mut chord = vec![0.0];
    for w in points.windows(2) {
        chord.push(chord[chord.len() - 1] + (w[1] - w[0]).norm());
    }
    let total = chord[chord.len() - 1];
    let params: Vec<f64> = chord.iter().map(|c| c / total).collect();
    interpolate_curve(&params, &points, 3)
        .map(Curve3::Nurbs)
        .ok_or_else(|| {
            BlendError::unsupported("vertex blend connector fit failed", vec![face.into()])
        })

}

/// In-face directions across a connector, pointing towards the vertex.
fn connector_cross_tangents(
    store: &TopoStore,
    face: FaceId,
    curve: &Curve3,
    vertex: &Point3,
) -> BlendResult<Vec<Vector3>> {
    let mut out = Vec::with_capacity(CROSS_SAMPLES);
    for i in 0..CROSS_SAMPLES {
        let t = i as f64 / (CROSS_SAMPLES - 1) as f64;
        let p = curve.evaluate(t);
        let c = store.face_normal_at(face, &p)?.cross(&curve.tangent(t));
        if c.norm() < 1e-12 {
            return Ok(Vec::new());
        }
        let c = c.normalize();
        out.push(if c.dot(&(vertex - p)) < 0.0 { -c } else { c });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrib::{blend_attribute, set_const_round, BlendEnds};
    use crate::pipeline::{discard_sheet, BlendOptions};
    use crate::primitive::{make_box, make_prism, Profile, ProfileSegment};
    use crate::topo::validate_body;

    fn vertical_edge_at(store: &TopoStore, body: BodyId, x: f64, y: f64) -> EdgeId {
        store
            .body_edges(body)
            .unwrap()
            .into_iter()
            .find(|&e| {
                let m = store.edge(e).unwrap().midpoint();
                (m.x - x).abs() < 1e-9 && (m.y - y).abs() < 1e-9
            })
            .unwrap()
    }

    #[test]
    fn builder_reuses_coincident_edges() {
        let mut store = TopoStore::new();
        let (_, shell) = new_body(&mut store, BodyKind::Sheet);
        let mut b = SheetBuilder::new(shell, 1e-6);
        let a = Point3::new(0.0, 0.0, 0.0);
        let c = Point3::new(1.0, 0.0, 0.0);
        let (e1, f1) = b.edge(&mut store, Curve3::segment(a, c), 0.0, 1.0).unwrap();
        let (e2, f2) = b.edge(&mut store, Curve3::segment(c, a), 0.0, 1.0).unwrap();
        assert_eq!(e1, e2);
        assert!(f1);
        assert!(!f2);
        assert_eq!(store.counts().vertices, 2);
    }

    #[test]
    fn builder_rollback_forgets_entities() {
        let mut store = TopoStore::new();
        let (_, shell) = new_body(&mut store, BodyKind::Sheet);
        let mut b = SheetBuilder::new(shell, 1e-6);
        let mark = b.mark();
        let cp = store.begin();
        b.vertex(&mut store, Point3::origin());
        store.rollback_to(cp);
        b.rollback(mark);
        let v = b.vertex(&mut store, Point3::origin());
        assert!(store.vertex(v).is_ok());
    }

    #[test]
    fn one_round_gives_one_face_with_hinted_springs() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 10.0, 10.0, 10.0).unwrap();
        let e = vertical_edge_at(&store, body, 10.0, 10.0);
        set_const_round(&mut store, &[e], 4.0, &BlendEnds::default()).unwrap();
        let ctx = BlendContext::new(BlendOptions::default());
        let sheet = make_sheet(&mut store, body, &ctx).unwrap();
        assert_eq!(sheet.units.len(), 1);
        assert_eq!(sheet.units[0].faces.len(), 1);
        assert!(sheet.report.failures.is_empty());
        // Two springs and two cut curves, all lying on blank faces.
        assert_eq!(sheet.edge_hints.len(), 4);
        let check = validate_body(&store, sheet.body).unwrap();
        assert!(check.valid, "{:?}", check.errors);
        discard_sheet(&mut store, sheet);
    }

    #[test]
    fn discarding_restores_the_store() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 10.0, 10.0, 10.0).unwrap();
        let e = vertical_edge_at(&store, body, 10.0, 10.0);
        set_const_round(&mut store, &[e], 4.0, &BlendEnds::default()).unwrap();
        let before = store.clone();
        let sheet = make_sheet(&mut store, body, &BlendContext::default()).unwrap();
        discard_sheet(&mut store, sheet);
        assert!(store.model_eq(&before));
    }

    #[test]
    fn point_in_triangle() {
        let a = Point3::origin();
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        assert!(in_triangle(&Point3::new(0.25, 0.25, 0.0), &a, &b, &c, 1e-9));
        assert!(in_triangle(&Point3::new(0.5, 0.0, 0.0), &a, &b, &c, 1e-9));
        assert!(!in_triangle(&b, &a, &b, &c, 1e-9));
        assert!(!in_triangle(&Point3::new(0.6, 0.6, 0.0), &a, &b, &c, 1e-9));
        assert!(!in_triangle(&Point3::new(0.2, 0.2, 0.1), &a, &b, &c, 1e-9));
    }

    fn notched_block(store: &mut TopoStore) -> BodyId {
        // A step 0.3 deep next to the corner at (10, -10).
        let profile = Profile {
            start: (-10.0, -10.0),
            segments: vec![
                ProfileSegment::Line { to: (10.0, -10.0) },
                ProfileSegment::Line { to: (10.0, -9.7) },
                ProfileSegment::Line { to: (9.8, -9.7) },
                ProfileSegment::Line { to: (9.8, 10.0) },
                ProfileSegment::Line { to: (-10.0, 10.0) },
                ProfileSegment::Line { to: (-10.0, -10.0) },
            ],
        };
        make_prism(store, &profile, 0.0, 10.0).unwrap()
    }

    #[test]
    fn engulfed_step_is_reported() {
        let mut store = TopoStore::new();
        let body = notched_block(&mut store);
        let e = vertical_edge_at(&store, body, 10.0, -10.0);
        set_const_round(&mut store, &[e], 1.0, &BlendEnds::default()).unwrap();
        let ctx = BlendContext::default();
        let sheet = make_sheet(&mut store, body, &ctx).unwrap();
        assert!(sheet.report.has_warning(WarningKind::FeatureLoss));
        discard_sheet(&mut store, sheet);

        let opts = BlendOptions { retain_features: true, ..BlendOptions::default() };
        let strict = BlendContext::new(opts);
        let sheet = make_sheet(&mut store, body, &strict).unwrap();
        assert!(sheet.units.is_empty());
        assert!(matches!(sheet.report.failures[0].error, BlendError::FeatureLoss { .. }));
        discard_sheet(&mut store, sheet);
        assert!(blend_attribute(&store, e).is_some());
    }
}
