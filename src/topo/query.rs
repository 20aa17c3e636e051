//! Read-only traversal and geometric queries over a `TopoStore`.

use std::collections::HashSet;
use std::f64::consts::{FRAC_PI_2, TAU};

use super::store::TopoStore;
use super::types::*;
use crate::error::{BlendError, BlendResult};
use crate::math::{wrap_angle_near, Point3, Vector3};
use crate::surface::Surface;

const MAX_LOOP: usize = 100_000;

/// One face around a vertex, with the edges its loop uses to arrive at and
/// leave the vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FanItem {
    pub face: FaceId,
    pub incoming: EdgeId,
    pub outgoing: EdgeId,
}

/// Result of `ray_pick`, sorted by ray parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct PickHit {
    pub entity: EntityRef,
    pub t: f64,
    pub point: Point3,
}

impl TopoStore {
    /// Coedges of a wire in loop order.
    pub fn wire_coedges(&self, wire: WireId) -> BlendResult<Vec<CoEdgeId>> {
        let first = self.wire(wire)?.first_coedge;
        let mut result = vec![first];
        let mut current = self.coedge(first)?.next;
        while current != first {
            result.push(current);
            if result.len() > MAX_LOOP {
                return Err(BlendError::TopologyCorrupted {
                    reason: "wire does not close".into(),
                    entities: vec![EntityRef::Wire(wire)],
                });
            }
            current = self.coedge(current)?.next;
        }
        Ok(result)
    }

    /// Outer wire first, then the holes.
    pub fn face_wires(&self, face: FaceId) -> BlendResult<Vec<WireId>> {
        let f = self.face(face)?;
        let mut wires = vec![f.outer_wire];
        wires.extend(f.inner_wires.iter().copied());
        Ok(wires)
    }

    pub fn face_coedges(&self, face: FaceId) -> BlendResult<Vec<CoEdgeId>> {
        let mut out = Vec::new();
        for w in self.face_wires(face)? {
            out.extend(self.wire_coedges(w)?);
        }
        Ok(out)
    }

    pub fn face_edges(&self, face: FaceId) -> BlendResult<Vec<EdgeId>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for c in self.face_coedges(face)? {
            let e = self.coedge(c)?.edge;
            if seen.insert(e) {
                out.push(e);
            }
        }
        Ok(out)
    }

    /// Start and end vertex of a coedge in traversal order.
    pub fn coedge_vertices(&self, c: CoEdgeId) -> BlendResult<(VertexId, VertexId)> {
        let co = self.coedge(c)?;
        let e = self.edge(co.edge)?;
        Ok(if co.forward { (e.start, e.end) } else { (e.end, e.start) })
    }

    pub fn body_faces(&self, body: BodyId) -> BlendResult<Vec<FaceId>> {
        let mut out = Vec::new();
        for &s in &self.body(body)?.shells {
            out.extend(self.shell(s)?.faces.iter().copied());
        }
        Ok(out)
    }

    pub fn body_edges(&self, body: BodyId) -> BlendResult<Vec<EdgeId>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for f in self.body_faces(body)? {
            for e in self.face_edges(f)? {
                if seen.insert(e) {
                    out.push(e);
                }
            }
        }
        Ok(out)
    }

    pub fn body_vertices(&self, body: BodyId) -> BlendResult<Vec<VertexId>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for e in self.body_edges(body)? {
            let edge = self.edge(e)?;
            for v in [edge.start, edge.end] {
                if seen.insert(v) {
                    out.push(v);
                }
            }
        }
        Ok(out)
    }

    pub fn face_body(&self, face: FaceId) -> BlendResult<BodyId> {
        let shell = self.face(face)?.shell;
        Ok(self.shell(shell)?.body)
    }

    pub fn edge_body(&self, edge: EdgeId) -> BlendResult<BodyId> {
        let c = self
            .edge_coedges(edge)
            .first()
            .copied()
            .ok_or_else(|| {
                BlendError::unsupported("edge has no face", vec![EntityRef::Edge(edge)])
            })?;
        self.face_body(self.coedge(c)?.face)
    }

    pub fn vertex_body(&self, v: VertexId) -> BlendResult<BodyId> {
        let e = self
            .vertex_edges(v)
            .first()
            .copied()
            .ok_or_else(|| BlendError::unsupported("isolated vertex", vec![EntityRef::Vertex(v)]))?;
        self.edge_body(e)
    }

    /// Faces using an edge, with the direction of each use.
    pub fn edge_faces(&self, edge: EdgeId) -> BlendResult<Vec<(FaceId, bool)>> {
        self.edge(edge)?;
        self.edge_coedges(edge)
            .iter()
            .map(|&c| self.coedge(c).map(|co| (co.face, co.forward)))
            .collect()
    }

    /// `(left, right)` faces of a manifold edge. The left face is the one
    /// whose loop traverses the edge forward.
    pub fn edge_sides(&self, edge: EdgeId) -> BlendResult<(FaceId, FaceId)> {
        let uses = self.edge_faces(edge)?;
        let left = uses.iter().find(|(_, fwd)| *fwd).map(|(f, _)| *f);
        let right = uses.iter().find(|(_, fwd)| !*fwd).map(|(f, _)| *f);
        match (left, right, uses.len()) {
            (Some(l), Some(r), 2) => Ok((l, r)),
            _ => Err(BlendError::unsupported("edge is not manifold", vec![EntityRef::Edge(edge)])),
        }
    }

    pub fn vertex_faces(&self, v: VertexId) -> BlendResult<Vec<FaceId>> {
        let mut out = Vec::new();
        for &e in self.vertex_edges(v) {
            for (f, _) in self.edge_faces(e)? {
                if !out.contains(&f) {
                    out.push(f);
                }
            }
        }
        Ok(out)
    }

    /// Faces around `v` in fan order, each face's outgoing edge being the
    /// next face's incoming one.
    pub fn vertex_fan(&self, v: VertexId) -> BlendResult<Vec<FanItem>> {
        let mut items = Vec::new();
        for &e in self.vertex_edges(v) {
            for &c in self.edge_coedges(e) {
                let (_, end) = self.coedge_vertices(c)?;
                if end != v {
                    continue;
                }
                let co = self.coedge(c)?;
                let next = self.coedge(co.next)?;
                items.push(FanItem { face: co.face, incoming: co.edge, outgoing: next.edge });
            }
        }
        if items.len() < 2 {
            return Ok(items);
        }
        let mut ordered = vec![items[0]];
        let mut used = vec![false; items.len()];
        used[0] = true;
        while ordered.len() < items.len() {
            let last = ordered[ordered.len() - 1];
            let next = (0..items.len()).find(|&k| !used[k] && items[k].incoming == last.outgoing);
            let Some(k) = next else {
                return Ok(items);
            };
            used[k] = true;
            ordered.push(items[k]);
        }
        Ok(ordered)
    }

    /// Unit tangent of `edge` at its end `v`, pointing away from `v`.
    pub fn edge_direction_from(&self, edge: EdgeId, v: VertexId) -> BlendResult<Vector3> {
        let e = self.edge(edge)?;
        if e.start == v {
            Ok(e.curve.tangent(e.t_start))
        } else if e.end == v {
            Ok(-e.curve.tangent(e.t_end))
        } else {
            let entities = vec![EntityRef::Edge(edge), EntityRef::Vertex(v)];
            Err(BlendError::unsupported("vertex is not on edge", entities))
        }
    }

    /// The outward normal of a face at the surface point nearest `p`.
    pub fn face_normal_at(&self, face: FaceId, p: &Point3) -> BlendResult<Vector3> {
        let f = self.face(face)?;
        let (u, v) = f.surface.closest_parameters(p);
        let n = f.surface.normal(u, v);
        Ok(if f.outward { n } else { -n })
    }

    /// Parametric point-in-face test: `p` is projected onto the face's
    /// surface and the winding number of each loop, taken in parameter
    /// space, decides membership.
    pub fn face_contains(&self, face: FaceId, p: &Point3) -> BlendResult<bool> {
        let f = self.face(face)?;
        let (pu, pv) = f.surface.closest_parameters(p);
        let wires = self.face_wires(face)?;
        for (k, &w) in wires.iter().enumerate() {
            let poly = self.wire_uv_polygon(&f.surface, w)?;
            if polygon_area(&poly).abs() < 1e-12 {
                // Degenerate loop (a seam walked both ways): covers the surface.
                if k == 0 {
                    continue;
                }
                return Ok(false);
            }
            let inside = candidate_params(&f.surface, pu, pv)
                .iter()
                .any(|&q| winding_number(&poly, q) != 0);
            if k == 0 && !inside {
                return Ok(false);
            }
            if k > 0 && inside {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// A loop sampled into parameter space, unwrapped across periodic seams.
    fn wire_uv_polygon(&self, surface: &Surface, wire: WireId) -> BlendResult<Vec<(f64, f64)>> {
        const SAMPLES: usize = 12;
        let (periodic_u, periodic_v) = periodicity(surface);
        let mut poly: Vec<(f64, f64)> = Vec::new();
        let mut pole_v: Option<f64> = None;
        for c in self.wire_coedges(wire)? {
            let co = self.coedge(c)?;
            let e = self.edge(co.edge)?;
            for i in 0..SAMPLES {
                let s = i as f64 / SAMPLES as f64;
                let s = if co.forward { s } else { 1.0 - s };
                let p = e.point_at(s);
                let (mut u, mut v) = surface.closest_parameters(&p);
                let at_pole =
                    matches!(surface, Surface::Sphere { .. }) && v.abs() > FRAC_PI_2 - 1e-6;
                if at_pole {
                    pole_v = Some(v.signum() * FRAC_PI_2);
                }
                if let Some(&(pu, pvv)) = poly.last() {
                    if at_pole {
                        u = pu;
                    } else if periodic_u {
                        u = wrap_angle_near(u, pu);
                    }
                    if periodic_v {
                        v = wrap_angle_near(v, pvv);
                    }
                }
                poly.push((u, v));
            }
        }
        // A loop around a sphere pole leaves a 2π gap in u; close it over the pole.
        let ends = (poly.first().copied(), poly.last().copied(), pole_v);
        if let (Some(first), Some(last), Some(pole)) = ends {
            if (last.0 - first.0).abs() > std::f64::consts::PI {
                poly.push((last.0, pole));
                poly.push((first.0, pole));
            }
        }
        Ok(poly)
    }

    /// Hits of the ray `origin + t·dir` (t ≥ 0) with the faces and edges of
    /// a body, nearest first.
    pub fn ray_pick(
        &self,
        body: BodyId,
        origin: &Point3,
        dir: &Vector3,
        tol: f64,
    ) -> BlendResult<Vec<PickHit>> {

        let dir = dir.normalize();
        let verts = self.body_vertices(body)?;
        let mut reach = 1.0;
        for &v in &verts {
            reach = f64::max(reach, (self.vertex(v)?.point - origin).norm());
        }
        for f in self.body_faces(body)? {
            if let Surface::Sphere { center, radius } = &self.face(f)?.surface {
                reach = reach.max((center - origin).norm() + radius);
            }
        }
        let t_max = 2.0 * reach;
        let mut hits = Vec::new();

        for f in self.body_faces(body)? {
            let surface = &self.face(f)?.surface;
            for t in ray_surface_hits(surface, origin, &dir, t_max) {
                let p = origin + dir * t;
                if self.face_contains(f, &p)? {
                    hits.push(PickHit { entity: EntityRef::Face(f), t, point: p });
                }
            }
        }

        for e in self.body_edges(body)? {
            let edge = self.edge(e)?;
            const N: usize = 64;
            let mut best: Option<(f64, f64)> = None;
            for i in 0..=N {
                let q = edge.point_at(i as f64 / N as f64);
                let t = (q - origin).dot(&dir).max(0.0);
                let d = (origin + dir * t - q).norm();
                if best.map_or(true, |(bd, _)| d < bd) {
                    best = Some((d, t));
                }
            }
            if let Some((_, t0)) = best {
                // Refine by alternating projections between ray and curve.
                let mut t = t0;
                let mut dist = f64::MAX;
                for _ in 0..20 {
                    let p = origin + dir * t;
                    let (d, ct) = edge.curve.distance_within(&p, edge.t_start, edge.t_end);
                    dist = d;
                    let q = edge.curve.evaluate(ct);
                    t = (q - origin).dot(&dir).max(0.0);
                }
                if dist < tol {
                    hits.push(PickHit { entity: EntityRef::Edge(e), t, point: origin + dir * t });
                }
            }
        }

        hits.sort_by(|a, b| a.t.total_cmp(&b.t));
        Ok(hits)
    }
}

fn periodicity(surface: &Surface) -> (bool, bool) {
    match surface {
        Surface::Cylinder { .. } | Surface::Sphere { .. } => (true, false),
        Surface::Torus { .. } => (true, true),
        _ => (false, false),
    }
}

fn candidate_params(surface: &Surface, u: f64, v: f64) -> Vec<(f64, f64)> {
    let (pu, pv) = periodicity(surface);
    let us: Vec<f64> = if pu { (-2..=2).map(|k| u + TAU * k as f64).collect() } else { vec![u] };
    let vs: Vec<f64> = if pv { (-2..=2).map(|k| v + TAU * k as f64).collect() } else { vec![v] };
    us.iter().flat_map(|&a| vs.iter().map(move |&b| (a, b))).collect()
}

fn polygon_area(poly: &[(f64, f64)]) -> f64 {
    let n = poly.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = poly[i];
            let (x1, y1) = poly[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum::<f64>()
        * 0.5
}

fn winding_number(poly: &[(f64, f64)], p: (f64, f64)) -> i32 {
    let n = poly.len();
    let mut wn = 0;
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        let cross = (b.0 - a.0) * (p.1 - a.1) - (p.0 - a.0) * (b.1 - a.1);
        if a.1 <= p.1 {
            if b.1 > p.1 && cross > 0.0 {
                wn += 1;
            }
        } else if b.1 <= p.1 && cross < 0.0 {
            wn -= 1;
        }
    }
    wn
}

/// Ray parameters where the ray crosses a surface, found by sign changes of
/// the signed distance followed by bisection.
fn ray_surface_hits(surface: &Surface, origin: &Point3, dir: &Vector3, t_max: f64) -> Vec<f64> {
    if let Surface::Plane { origin: o, normal } = surface {
        let n = normal.normalize();
        let denom = dir.dot(&n);
        if denom.abs() < 1e-14 {
            return Vec::new();
        }
        let t = (o - origin).dot(&n) / denom;
        return if t >= 0.0 { vec![t] } else { Vec::new() };
    }
    let sd = |t: f64| {
        let p = origin + dir * t;
        let (u, v) = surface.closest_parameters(&p);
        (p - surface.evaluate(u, v)).dot(&surface.normal(u, v))
    };
    const STEPS: usize = 400;
    let mut hits = Vec::new();
    let mut t_prev = 0.0;
    let mut f_prev = sd(0.0);
    for i in 1..=STEPS {
        let t = t_max * i as f64 / STEPS as f64;
        let f = sd(t);
        if f_prev.signum() != f.signum() {
            if let Ok(root) = crate::math::solve::brent(sd, t_prev, t, 1e-12, 100) {
                let p = origin + dir * root;
                let (u, v) = surface.closest_parameters(&p);
                // Reject sign flips caused by the distance jumping across a medial axis.
                if (p - surface.evaluate(u, v)).norm() < 1e-6 {
                    hits.push(root);
                }
            }
        }
        t_prev = t;
        f_prev = f;
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winding_of_unit_square() {
        let sq = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        assert_eq!(winding_number(&sq, (0.5, 0.5)), 1);
        assert_eq!(winding_number(&sq, (1.5, 0.5)), 0);
        let cw: Vec<_> = sq.iter().rev().copied().collect();
        assert_eq!(winding_number(&cw, (0.5, 0.5)), -1);
        assert!((polygon_area(&sq) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn plane_ray_hit_is_exact() {
        let plane = Surface::Plane { origin: Point3::new(0.0, 0.0, 2.0), normal: Vector3::z() };
        let hits = ray_surface_hits(&plane, &Point3::origin(), &Vector3::z(), 10.0);
        assert_eq!(hits.len(), 1);
        assert!((hits[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn sphere_ray_hits_twice() {
        let s = Surface::Sphere { center: Point3::new(0.0, 0.0, 5.0), radius: 1.0 };
        let hits = ray_surface_hits(&s, &Point3::new(0.0, 0.2, 0.0), &Vector3::z(), 12.0);
        assert_eq!(hits.len(), 2);
    }
}
