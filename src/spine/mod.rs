//! Spines and spring curves.
//!
//! The spine of a blend unit is the chain of its edges, parametrised by arc
//! length `σ` from the unit's start. Each edge contributes one segment,
//! carrying the two support faces on either side of it and the edge's blend
//! attribute read in unit direction. Sections are solved at any `σ`,
//! including slightly beyond either end, which end capping needs.
//!
//! When both supports are simple analytic offsets whose intersection is a
//! line or a circle, [`Spine::analytic_center`] returns that exact ball
//! centre locus.

pub mod section;
pub mod spring;

pub use section::{Foot, Roller, Section, SectionInput, SectionRoller, Support};
pub use spring::{SpringCurve, SpringPiece};

use crate::attrib::{BlendAttribute, BlendKind, Calibration, Convexity};
use crate::curve::Curve3;
use crate::error::{BlendError, BlendResult};
use crate::graph::BlendUnit;
use crate::math::{Point3, Vector3, TOLERANCE};
use crate::nurbs::fit::interpolate_curve;
use crate::nurbs::NurbsCurve3;
use crate::radius::RadiusValue;
use crate::surface::Surface;
use crate::topo::{EdgeId, EntityRef, TopoStore, VertexId};

const CALIBRATION_REFINEMENTS: usize = 6;

/// How the spine geometry is represented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpineKind {
    /// Every segment lies on one straight line.
    Line,
    /// Every segment lies on one circle.
    Circle,
    /// Edges of a single curve family, reused directly.
    Edges,
    /// Edges of mixed families; a calibration curve was fitted.
    Calibrated,
}

/// One edge of a spine.
#[derive(Clone, Debug, PartialEq)]
pub struct SpineSegment {
    pub edge: EdgeId,
    pub forward: bool,
    /// Left and right supports, relative to unit direction.
    pub supports: [Support; 2],
    pub start: f64,
    pub end: f64,
    pub attr: BlendAttribute,
    curve: Curve3,
    t0: f64,
    t1: f64,
}

impl SpineSegment {
    fn edge_param(&self, sigma: f64) -> f64 {
        let len = self.end - self.start;
        let f = if len > 0.0 { (sigma - self.start) / len } else { 0.0 };
        self.t0 + f * (self.t1 - self.t0)
    }

    fn local(&self, sigma: f64) -> f64 {
        let len = self.end - self.start;
        if len > 0.0 { ((sigma - self.start) / len).clamp(0.0, 1.0) } else { 0.0 }
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    /// The edge's carrier curve.
    pub fn curve(&self) -> &Curve3 {
        &self.curve
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Spine {
    pub segments: Vec<SpineSegment>,
    pub vertices: Vec<VertexId>,
    pub closed: bool,
    pub convexity: Convexity,
    pub kind: SpineKind,
    /// Fitted through the whole run when `kind` is `Calibrated`.
    pub fitted: Option<NurbsCurve3>,
    /// Caller-supplied radius parametrisation and whether it runs against
    /// the unit.
    calibration: Option<(NurbsCurve3, bool)>,
    pub tolerance: f64,
}

fn curve_family(c: &Curve3) -> u8 {
    match c {
        Curve3::Line { .. } => 0,
        Curve3::Circle { .. } => 1,
        Curve3::Ellipse { .. } => 2,
        Curve3::Nurbs(_) => 3,
    }
}

impl Spine {
    pub fn from_unit(store: &TopoStore, unit: &BlendUnit, fit_tolerance: f64) -> BlendResult<Self> {
        let mut segments = Vec::with_capacity(unit.edges.len());
        let mut sigma = 0.0;
        for (k, (&e, &fwd)) in unit.edges.iter().zip(&unit.forward).enumerate() {
            let edge = store.edge(e)?;
            let (left, right) = store.edge_sides(e)?;
            let (left, right) = if fwd { (left, right) } else { (right, left) };
            let (t0, t1) =
                if fwd { (edge.t_start, edge.t_end) } else { (edge.t_end, edge.t_start) };
            let len = edge.curve.length(edge.t_start, edge.t_end);
            segments.push(SpineSegment {
                edge: e,
                forward: fwd,
                supports: [Support::from_face(store, left)?, Support::from_face(store, right)?],
                start: sigma,
                end: sigma + len,
                attr: unit.attribute(store, k)?,
                curve: edge.curve.clone(),
                t0,
                t1,
            });
            sigma += len;
        }
        let Some(first) = segments.first() else {
            return Err(BlendError::unsupported("empty blend unit", Vec::new()));
        };

        let calibration = match first.attr.calibration() {
            Some(Calibration { curve, first_edge, last_edge }) => {
                let reversed = *first_edge != unit.edges[0] && *last_edge == unit.edges[0];
                Some((curve.clone(), reversed))
            }
            None => None,
        };

        let mut spine = Spine {
            kind: SpineKind::Edges,
            segments,
            vertices: unit.vertices.clone(),
            closed: unit.closed,
            convexity: unit.convexity,
            fitted: None,
            calibration,
            tolerance: fit_tolerance,
        };
        spine.kind = spine.classify();
        if spine.kind == SpineKind::Calibrated {
            match spine.fit_calibration(fit_tolerance) {
                Ok(curve) => spine.fitted = Some(curve),
                Err(e) => log::warn!(
                    "spine over {:?} left without calibration curve: {e}",
                    spine.entities()
                ),
            }
        }
        Ok(spine)
    }

    fn classify(&self) -> SpineKind {
        let first = &self.segments[0].curve;
        let same = |a: &Curve3, b: &Curve3| match (a, b) {
            (Curve3::Line { origin: o1, dir: d1 }, Curve3::Line { origin: o2, dir: d2 }) => {
                let d1 = d1.normalize();
                d1.cross(&d2.normalize()).norm() < 1e-9 && (o2 - o1).cross(&d1).norm() < TOLERANCE
            }
            (
                Curve3::Circle { center: c1, axis: a1, radius: r1 },
                Curve3::Circle { center: c2, axis: a2, radius: r2 },
            ) => {
                (c1 - c2).norm() < TOLERANCE
                    && (r1 - r2).abs() < TOLERANCE
                    && a1.normalize().cross(&a2.normalize()).norm() < 1e-9
            }
            _ => false,
        };
        if self.segments.iter().all(|s| same(first, &s.curve)) {
            return match first {
                Curve3::Line { .. } => SpineKind::Line,
                Curve3::Circle { .. } => SpineKind::Circle,
                _ => SpineKind::Edges,
            };
        }
        let family = curve_family(first);
        if self.segments.iter().all(|s| curve_family(&s.curve) == family) {
            SpineKind::Edges
        } else {
            SpineKind::Calibrated
        }
    }

    /// Cubic interpolation of the run, refined until every interval
    /// midpoint is within `tolerance` of the true spine. The curve's
    /// parameter is `σ / length`, so segment `k` maps onto
    /// `[start_k, end_k] / length`.
    pub fn fit_calibration(&self, tolerance: f64) -> BlendResult<NurbsCurve3> {
        let total = self.length();
        let mut per_segment = 4;
        for _ in 0..CALIBRATION_REFINEMENTS {
            let mut params = Vec::new();
            for s in &self.segments {
                for i in 0..per_segment {
                    params.push(s.start + s.length() * i as f64 / per_segment as f64);
                }
            }
            params.push(total);
            let points: Vec<Point3> = params.iter().map(|&t| self.frame(t).0).collect();
            let norm: Vec<f64> = params.iter().map(|t| t / total).collect();
            let curve = interpolate_curve(&norm, &points, 3)
                .ok_or_else(|| BlendError::unsupported("calibration fit failed", self.entities()))?;
            let worst = params
                .windows(2)
                .map(|w| {
                    let mid = 0.5 * (w[0] + w[1]);
                    (curve.evaluate(mid / total) - self.frame(mid).0).norm()
                })
                .fold(0.0, f64::max);
            if worst <= tolerance {
                return Ok(curve);
            }
            per_segment *= 2;
        }
        Err(BlendError::unsupported("calibration fit did not reach tolerance", self.entities()))
    }

    pub fn entities(&self) -> Vec<EntityRef> {
        self.segments.iter().map(|s| EntityRef::Edge(s.edge)).collect()
    }

    pub fn length(&self) -> f64 {
        self.segments.last().map_or(0.0, |s| s.end)
    }

    pub fn start_vertex(&self) -> VertexId {
        self.vertices[0]
    }

    pub fn end_vertex(&self) -> VertexId {
        self.vertices[self.vertices.len() - 1]
    }

    /// −1 for convex blends (roller inside the material), +1 for concave.
    pub fn delta(&self) -> BlendResult<f64> {
        match self.convexity {
            Convexity::Convex => Ok(-1.0),
            Convexity::Concave => Ok(1.0),
            other => {
                let reason = format!("cannot blend a {other:?} edge");
                Err(BlendError::unsupported(reason, self.entities()))
            }
        }
    }

    /// Index of the segment covering `sigma`; parameters past either end
    /// map to the end segments.
    pub fn segment_index(&self, sigma: f64) -> usize {
        let sigma = self.wrap(sigma);
        self.segments
            .iter()
            .position(|s| sigma <= s.end)
            .unwrap_or(self.segments.len() - 1)
    }

    pub fn segment(&self, sigma: f64) -> &SpineSegment {
        &self.segments[self.segment_index(sigma)]
    }

    fn wrap(&self, sigma: f64) -> f64 {
        let len = self.length();
        if self.closed && len > 0.0 { sigma.rem_euclid(len) } else { sigma }
    }

    /// Spine point and unit tangent at `sigma`.
    pub fn frame(&self, sigma: f64) -> (Point3, Vector3) {
        let sigma = self.wrap(sigma);
        let seg = self.segment(sigma);
        let t = seg.edge_param(sigma);
        let d = seg.curve.derivative(t) * (seg.t1 - seg.t0).signum();
        let tangent = if d.norm() > 1e-15 { d.normalize() } else { Vector3::x() };
        (seg.curve.evaluate(t), tangent)
    }

    /// Parameter of the radius function at `sigma`: the edge's own local
    /// parameter, or the calibration curve's normalised parameter.
    pub fn radius_param(&self, sigma: f64) -> f64 {
        match &self.calibration {
            Some((curve, reversed)) => {
                let (lo, hi) = curve.domain();
                let p = self.frame(sigma).0;
                let along = Curve3::Nurbs(curve.clone()).closest_parameter(&p);
                let t = ((along - lo) / (hi - lo)).clamp(0.0, 1.0);
                if *reversed { 1.0 - t } else { t }
            }
            None => self.segment(sigma).local(self.wrap(sigma)),
        }
    }

    /// Nominal roller size at `sigma`, before section geometry is applied.
    pub fn radius_at(&self, sigma: f64) -> Option<RadiusValue> {
        let f = self.radius_function(sigma)?;
        Some(f.evaluate(self.radius_param(sigma)))
    }

    /// The function driving the radius at `sigma`. A calibrated run is
    /// driven by its first edge's function throughout.
    fn radius_function(&self, sigma: f64) -> Option<crate::radius::RadiusFunction> {
        match self.calibration {
            Some(_) => self.segments[0].attr.radius_function(),
            None => self.segment(sigma).attr.radius_function(),
        }
    }

    fn input(&self, sigma: f64, delta: f64) -> SectionInput<'_> {
        let seg = self.segment(sigma);
        let (point, tangent) = self.frame(sigma);
        SectionInput {
            sigma,
            point,
            tangent,
            supports: [&seg.supports[0], &seg.supports[1]],
            delta,
            tolerance: self.tolerance,
        }
    }

    /// The blend section at `sigma`, checked against support curvature.
    pub fn section(&self, sigma: f64) -> BlendResult<Section> {
        let delta = self.delta()?;
        let input = self.input(sigma, delta);
        let seg = self.segment(sigma);
        let section = match &seg.attr.kind {
            BlendKind::ConstChamfer { left_range, right_range } => {
                input.chamfer(*left_range, *right_range)?
            }
            _ => {
                let f = self
                    .radius_function(sigma)
                    .ok_or(BlendError::NotAnEdgeBlend(EntityRef::Edge(seg.edge)))?;
                let size = f
                    .resolve(self.radius_param(sigma), &SectionRoller { input })
                    .map_err(|e| e.with_entities(&[EntityRef::Edge(seg.edge)]))?;
                input.round(&size)?
            }
        };
        self.check_curvature(&section, seg, delta)?;
        Ok(section)
    }

    fn check_curvature(
        &self,
        section: &Section,
        seg: &SpineSegment,
        delta: f64,
    ) -> BlendResult<()> {
        let size = section.roller.nominal();
        if size <= 0.0 {
            return Ok(());
        }
        for (support, hint) in seg.supports.iter().zip(section.hints) {
            if size * support.curvature_load(hint, delta) >= 1.0 - 1e-9 {
                return Err(BlendError::CurvatureExceeded {
                    radius: size,
                    entities: vec![EntityRef::Edge(seg.edge), EntityRef::Face(support.face)],
                });
            }
        }
        Ok(())
    }

    /// Uniform stations over `[lo, hi]` plus every segment boundary inside.
    pub fn stations(&self, lo: f64, hi: f64, count: usize) -> Vec<f64> {
        let n = count.max(2) - 1;
        let mut out: Vec<f64> = (0..=n).map(|i| lo + (hi - lo) * i as f64 / n as f64).collect();
        for s in &self.segments[..self.segments.len() - 1] {
            if s.end > lo && s.end < hi {
                out.push(s.end);
            }
        }
        out.sort_by(f64::total_cmp);
        out.dedup_by(|a, b| (*a - *b).abs() < 1e-9 * (1.0 + hi.abs()));
        out
    }

    /// Both segments use the same pair of support surfaces.
    fn single_support_pair(&self) -> bool {
        let first = &self.segments[0].supports;
        self.segments.iter().all(|s| {
            s.supports
                .iter()
                .zip(first)
                .all(|(a, b)| {
                    a.outward == b.outward && a.surface.same_geometry(&b.surface, TOLERANCE)
                })
        })
    }

    /// Exact locus of ball centres for a constant radius `r`, when the
    /// offset supports intersect in a line or circle.
    pub fn analytic_center(&self, r: f64) -> Option<Curve3> {
        let exact_kind = matches!(self.kind, SpineKind::Line | SpineKind::Circle);
        if !self.single_support_pair() || !exact_kind {
            return None;
        }
        let delta = self.delta().ok()?;
        let [a, b] = &self.segments[0].supports;
        let offset = |s: &Support| offset_surface(s, delta * r);
        let (oa, ob) = (offset(a)?, offset(b)?);
        let locus = match (&oa, &ob) {
            (Surface::Plane { .. }, Surface::Plane { .. }) => plane_plane(&oa, &ob),
            (Surface::Plane { .. }, _) => plane_quadric(&oa, &ob),
            (_, Surface::Plane { .. }) => plane_quadric(&ob, &oa),
            _ => None,
        }?;
        // The locus must pass through the true centre of a middle section.
        let mid = self.section(0.5 * self.length()).ok()?;
        let t = locus.closest_parameter(&mid.center);
        ((locus.evaluate(t) - mid.center).norm() < 1e3 * TOLERANCE * (1.0 + r)).then_some(locus)
    }
}

/// The surface at signed distance `d` along a support's outward normal.
fn offset_surface(s: &Support, d: f64) -> Option<Surface> {
    match &s.surface {
        Surface::Plane { origin, normal } => {
            let n = normal.normalize();
            let out = if s.outward { n } else { -n };
            Some(Surface::Plane { origin: origin + out * d, normal: n })
        }
        Surface::Cylinder { origin, axis, radius } => {
            let r = if s.outward { radius + d } else { radius - d };
            (r > 0.0).then(|| Surface::Cylinder { origin: *origin, axis: *axis, radius: r })
        }
        Surface::Sphere { center, radius } => {
            let r = if s.outward { radius + d } else { radius - d };
            (r > 0.0).then(|| Surface::Sphere { center: *center, radius: r })
        }
        _ => None,
    }
}

fn plane_plane(a: &Surface, b: &Surface) -> Option<Curve3> {
    let (Surface::Plane { origin: oa, normal: na }, Surface::Plane { origin: ob, normal: nb }) =
        (a, b)
    else {
        return None;
    };
    let (na, nb) = (na.normalize(), nb.normalize());
    let dir = na.cross(&nb);
    if dir.norm() < 1e-9 {
        return None;
    }
    let (da, db) = (na.dot(&oa.coords), nb.dot(&ob.coords));
    // Point on both planes, in the span of the normals.
    let c = na.dot(&nb);
    let det = 1.0 - c * c;
    let (ka, kb) = ((da - db * c) / det, (db - da * c) / det);
    Some(Curve3::Line { origin: Point3::from(na * ka + nb * kb), dir: dir.normalize() })
}

fn plane_quadric(plane: &Surface, other: &Surface) -> Option<Curve3> {
    let Surface::Plane { origin, normal } = plane else { return None };
    let n = normal.normalize();
    match other {
        Surface::Cylinder { origin: co, axis, radius } => {
            let a = axis.normalize();
            if a.cross(&n).norm() > 1e-9 {
                return None;
            }
            let t = (origin - co).dot(&n) / a.dot(&n);
            Some(Curve3::Circle { center: co + a * t, axis: a, radius: *radius })
        }
        Surface::Sphere { center, radius } => {
            let h = (center - origin).dot(&n);
            let rr = radius * radius - h * h;
            (rr > 0.0)
                .then(|| Curve3::Circle { center: center - n * h, axis: n, radius: rr.sqrt() })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrib::{set_const_round, set_variable_blend, BlendEnds, VariableSpec};
    use crate::graph::find_smooth_sequence;
    use crate::primitive::make_box;
    use crate::radius::RadiusFunction;
    use approx::assert_relative_eq;

    fn vertical_edge(store: &TopoStore, body: crate::topo::BodyId) -> EdgeId {
        store
            .body_edges(body)
            .unwrap()
            .into_iter()
            .find(|&e| {
                let ed = store.edge(e).unwrap();
                let a = store.vertex(ed.start).unwrap().point;
                let b = store.vertex(ed.end).unwrap().point;
                (a.x - b.x).abs() < 1e-12 && (a.y - b.y).abs() < 1e-12
            })
            .unwrap()
    }

    #[test]
    fn box_edge_spine_is_a_line_with_analytic_centre() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 10.0, 10.0, 10.0).unwrap();
        let e = vertical_edge(&store, body);
        set_const_round(&mut store, &[e], 4.0, &BlendEnds::default()).unwrap();
        let unit = find_smooth_sequence(&store, e).unwrap();
        let spine = Spine::from_unit(&store, &unit, 1e-5).unwrap();
        assert_eq!(spine.kind, SpineKind::Line);
        assert_relative_eq!(spine.length(), 20.0, epsilon = 1e-9);
        let center = spine.analytic_center(4.0).unwrap();
        let s = spine.section(7.0).unwrap();
        let t = center.closest_parameter(&s.center);
        assert_relative_eq!(center.evaluate(t), s.center, epsilon = 1e-7);
        // The ball sits 4 from both faces, inside the box.
        let corner = spine.frame(7.0).0;
        assert_relative_eq!((s.center - corner).norm(), 4.0 * 2f64.sqrt(), epsilon = 1e-7);
        assert!(s.center.x.abs() < 10.0 && s.center.y.abs() < 10.0);
    }

    #[test]
    fn variable_radius_follows_its_function() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 10.0, 10.0, 10.0).unwrap();
        let e = vertical_edge(&store, body);
        let spec = VariableSpec::from_function(RadiusFunction::linear(2.0, 6.0).unwrap());
        set_variable_blend(&mut store, &[e], spec, &BlendEnds::default()).unwrap();
        let unit = find_smooth_sequence(&store, e).unwrap();
        let spine = Spine::from_unit(&store, &unit, 1e-5).unwrap();
        for (sigma, r) in [(0.0, 2.0), (10.0, 4.0), (20.0, 6.0)] {
            let s = spine.section(sigma).unwrap();
            assert_relative_eq!(s.roller.nominal(), r, epsilon = 1e-9);
        }
    }

    #[test]
    fn stations_include_segment_boundaries() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 10.0, 10.0, 10.0).unwrap();
        let e = vertical_edge(&store, body);
        set_const_round(&mut store, &[e], 1.0, &BlendEnds::default()).unwrap();
        let unit = find_smooth_sequence(&store, e).unwrap();
        let spine = Spine::from_unit(&store, &unit, 1e-5).unwrap();
        let st = spine.stations(0.0, 20.0, 5);
        assert_eq!(st, vec![0.0, 5.0, 10.0, 15.0, 20.0]);
    }

    #[test]
    fn oversized_ball_in_a_hole_is_rejected() {
        let hole = Support {
            face: crate::topo::FaceId(0),
            surface: Surface::Cylinder {
                origin: Point3::origin(),
                axis: Vector3::z(),
                radius: 2.0,
            },

            outward: false,
        };
        assert!(3.0 * hole.curvature_load((0.0, 0.0), 1.0) >= 1.0);
        assert!(1.0 * hole.curvature_load((0.0, 0.0), 1.0) < 1.0);
    }
}
