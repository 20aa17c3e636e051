//! Cross-sections of a blend at one spine parameter.
//!
//! A round section is the rolling roller (ball or rotated ellipse) touching
//! both supports, found by a 2-D Newton iteration in the plane normal to the
//! spine. A chamfer section is the flat between two contacts at fixed chord
//! distances from the edge.

use crate::curve::Curve3;
use crate::error::{BlendError, BlendResult};
use crate::math::solve::solve2;
use crate::math::{any_perpendicular, Point3, Vector3, Vector4, RUNOUT_RADIUS};
use crate::nurbs::{homogenize, NurbsCurve3};
use crate::radius::{RadiusValue, SectionContext, Side};
use crate::surface::Surface;
use crate::topo::{FaceId, TopoStore};

const NEWTON_ITERATIONS: usize = 60;

/// A support face seen from the blend: its surface and orientation.
#[derive(Clone, Debug, PartialEq)]
pub struct Support {
    pub face: FaceId,
    pub surface: Surface,
    pub outward: bool,
}

/// Nearest point of a support, with the face's outward normal there.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Foot {
    pub point: Point3,
    pub normal: Vector3,
    pub uv: (f64, f64),
}

impl Support {
    pub fn from_face(store: &TopoStore, face: FaceId) -> BlendResult<Self> {
        let f = store.face(face)?;
        Ok(Support { face, surface: f.surface.clone(), outward: f.outward })
    }

    pub fn foot(&self, p: &Point3, hint: Option<(f64, f64)>) -> Foot {
        let uv = match hint {
            Some(h) => self.surface.closest_parameters_near(p, h),
            None => self.surface.closest_parameters(p),
        };
        let n = self.surface.normal(uv.0, uv.1);
        let normal = if self.outward { n } else { -n };
        Foot { point: self.surface.evaluate(uv.0, uv.1), normal, uv }
    }

    /// Positive outside the material.
    pub fn signed_distance(&self, p: &Point3) -> f64 {
        let f = self.foot(p, None);
        (p - f.point).dot(&f.normal)
    }

    /// Largest `δ·κ` over the principal curvatures at `uv`, with κ taken
    /// against the outward normal. A roller of size `r` fits while
    /// `r·δ·κ < 1`.
    pub fn curvature_load(&self, uv: (f64, f64), delta: f64) -> f64 {
        let (k1, k2) = self.surface.principal_curvatures(uv.0, uv.1);
        let (k1, k2) = if self.outward { (k1, k2) } else { (-k1, -k2) };
        (delta * k1).max(delta * k2)
    }
}

/// The roller that sweeps along the spine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Roller {
    Ball(f64),
    /// Semi-axes `a` along `e_a` and `b` along `e_b`, both in the section plane.
    Ellipse { e_a: Vector3, e_b: Vector3, a: f64, b: f64 },
    Flat,
}

impl Roller {
    /// Support function: distance from the roller centre to its tangent
    /// line with normal `n`.
    fn reach(&self, n: &Vector3) -> f64 {
        match self {
            Roller::Ball(r) => *r,
            Roller::Ellipse { e_a, e_b, a, b } => {
                ((a * n.dot(e_a)).powi(2) + (b * n.dot(e_b)).powi(2)).sqrt()
            }
            Roller::Flat => 0.0,
        }
    }

    /// Point of the roller outline whose outline normal is `m`.
    fn extreme(&self, center: &Point3, m: &Vector3) -> Point3 {
        match self {
            Roller::Ball(r) => center + m * *r,
            Roller::Ellipse { e_a, e_b, a, b } => {
                let h = self.reach(m).max(1e-300);
                center + (e_a * (a * a * m.dot(e_a)) + e_b * (b * b * m.dot(e_b))) / h
            }
            Roller::Flat => *center,
        }
    }

    /// Distance from the centre to the outline along unit direction `u`.
    fn radial(&self, u: &Vector3) -> f64 {
        match self {
            Roller::Ball(r) => *r,
            Roller::Ellipse { e_a, e_b, a, b } => {
                1.0 / ((u.dot(e_a) / a).powi(2) + (u.dot(e_b) / b).powi(2)).sqrt()
            }
            Roller::Flat => 0.0,
        }
    }

    pub fn nominal(&self) -> f64 {
        match self {
            Roller::Ball(r) => *r,
            Roller::Ellipse { a, b, .. } => a.max(*b),
            Roller::Flat => 0.0,
        }
    }
}

/// One station of a blend.
#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    pub sigma: f64,
    pub spine_point: Point3,
    pub tangent: Vector3,
    pub center: Point3,
    /// Left then right contact.
    pub contacts: [Point3; 2],
    pub normals: [Vector3; 2],
    pub roller: Roller,
    pub hints: [(f64, f64); 2],
}

impl Section {
    pub fn contact(&self, side: Side) -> Point3 {
        match side {
            Side::Left => self.contacts[0],
            Side::Right => self.contacts[1],
        }
    }

    /// Outward direction halfway between the support normals.
    pub fn bisector(&self) -> Vector3 {
        let b = self.normals[0] + self.normals[1];
        if b.norm() > 1e-12 { b.normalize() } else { self.normals[0] }
    }

    pub fn is_degenerate(&self, tol: f64) -> bool {
        (self.contacts[1] - self.contacts[0]).norm() <= tol
    }

    /// Homogeneous control points across the section, left to right:
    /// a rational quadratic arc for rounds, a segment for chamfers.
    pub fn control_points(&self) -> Vec<Vector4> {
        let [p0, p2] = self.contacts;
        if matches!(self.roller, Roller::Flat) {
            return vec![homogenize(&p0, 1.0), homogenize(&p2, 1.0)];
        }
        let (p1, w) = self.middle_point().unwrap_or((p0, 1.0));
        vec![homogenize(&p0, 1.0), homogenize(&p1, w), homogenize(&p2, 1.0)]
    }

    /// Tangent-line intersection and shoulder weight of the section conic.
    fn middle_point(&self) -> Option<(Point3, f64)> {
        let [p0, p2] = self.contacts;
        if (p2 - p0).norm() < 1e-12 {
            return None;
        }
        let d0 = self.tangent.cross(&self.normals[0]);
        let d2 = self.tangent.cross(&self.normals[1]);
        let g = p2 - p0;
        let (s, _) = solve2(
            d0.dot(&d0),
            -d0.dot(&d2),
            d0.dot(&d2),
            -d2.dot(&d2),
            g.dot(&d0),
            g.dot(&d2),
        )?;
        let p1 = p0 + d0 * s;
        let m = Point3::from((p0.coords + p2.coords) * 0.5);
        let to_p1 = p1 - self.center;
        if to_p1.norm() < 1e-12 {
            return None;
        }
        let u = to_p1.normalize();
        let shoulder = self.center + u * self.roller.radial(&u);
        let full = (p1 - m).norm();
        if full < 1e-12 {
            return None;
        }
        let s = ((shoulder - m).norm() / full).clamp(1e-6, 1.0 - 1e-6);
        Some((p1, s / (1.0 - s)))
    }

    /// Point of the section at `w ∈ [0, 1]` (left contact to right contact).
    pub fn point_at(&self, w: f64) -> Point3 {
        let pts = self.control_points();
        let w = w.clamp(0.0, 1.0);
        let acc = if pts.len() == 2 {
            pts[0] * (1.0 - w) + pts[1] * w
        } else {
            pts[0] * ((1.0 - w) * (1.0 - w)) + pts[1] * (2.0 * w * (1.0 - w)) + pts[2] * (w * w)
        };
        Point3::new(acc.x / acc.w, acc.y / acc.w, acc.z / acc.w)
    }

    /// The section as an edge carrier parametrised over `[0, 1]`.
    pub fn curve(&self) -> Curve3 {
        let pts = self.control_points();
        if pts.len() == 2 {
            return Curve3::segment(self.contacts[0], self.contacts[1]);
        }
        Curve3::Nurbs(NurbsCurve3::from_homogeneous(2, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0], &pts))
    }
}

/// Everything a section solve needs besides the roller size.
#[derive(Clone, Copy)]
pub struct SectionInput<'a> {
    pub sigma: f64,
    pub point: Point3,
    pub tangent: Vector3,
    pub supports: [&'a Support; 2],
    /// −1 for convex (roller inside the material), +1 for concave.
    pub delta: f64,
    pub tolerance: f64,
}

impl SectionInput<'_> {
    fn feet(&self, p: &Point3, hints: Option<&[(f64, f64); 2]>) -> [Foot; 2] {
        [0, 1].map(|i| self.supports[i].foot(p, hints.map(|h| h[i])))
    }

    /// Outward normals of both supports at the spine point.
    pub fn edge_normals(&self) -> [Vector3; 2] {
        [0, 1].map(|i| self.supports[i].foot(&self.point, None).normal)
    }

    /// Angle between the support normals at the spine point.
    pub fn normal_angle(&self) -> f64 {
        let [a, b] = self.edge_normals();
        a.dot(&b).clamp(-1.0, 1.0).acos()
    }

    fn failure(&self) -> BlendError {
        BlendError::SectionDidNotConverge {
            param: self.sigma,
            entities: vec![self.supports[0].face.into(), self.supports[1].face.into()],
        }
    }

    fn roller_for(&self, size: &RadiusValue, normals: &[Vector3; 2]) -> Roller {
        match *size {
            RadiusValue::Circular(r) => Roller::Ball(r),
            RadiusValue::Elliptic { major, minor, angle } => {
                let raw = normals[0] + normals[1];
                let mut b = raw - self.tangent * raw.dot(&self.tangent);
                if b.norm() < 1e-12 {
                    b = any_perpendicular(&self.tangent);
                }
                let b = b.normalize();
                let side = self.tangent.cross(&b);
                let e_a = b * angle.cos() + side * angle.sin();
                Roller::Ellipse { e_a, e_b: self.tangent.cross(&e_a), a: major, b: minor }
            }
        }
    }

    /// Rolling-roller section of the given size.
    pub fn round(&self, size: &RadiusValue) -> BlendResult<Section> {
        let start = self.feet(&self.point, None);
        let hints = [start[0].uv, start[1].uv];
        let normals = [start[0].normal, start[1].normal];
        if size.nominal() <= RUNOUT_RADIUS {
            return Ok(Section {
                sigma: self.sigma,
                spine_point: self.point,
                tangent: self.tangent,
                center: self.point,
                contacts: [self.point, self.point],
                normals,
                roller: self.roller_for(size, &normals),
                hints,
            });
        }

        let cos = normals[0].dot(&normals[1]);
        if 1.0 + cos < 1e-9 {
            return Err(BlendError::unsupported(
                "supports meet in a knife edge",
                vec![self.supports[0].face.into(), self.supports[1].face.into()],
            ));
        }
        let a = any_perpendicular(&self.tangent).normalize();
        let b = self.tangent.cross(&a);
        let h0 = self.roller_for(size, &normals).reach(&(normals[0] + normals[1]).normalize());
        let guess = self.point + (normals[0] + normals[1]) * (self.delta * h0 / (1.0 + cos));
        let mut c = guess - self.tangent * (guess - self.point).dot(&self.tangent);
        let mut hints = hints;
        let scale = 1.0 + size.nominal();

        for _ in 0..NEWTON_ITERATIONS {
            let feet = self.feet(&c, Some(&hints));
            hints = [feet[0].uv, feet[1].uv];
            let n = [feet[0].normal, feet[1].normal];
            let roller = self.roller_for(size, &n);
            let f0 = (c - feet[0].point).dot(&n[0]) - self.delta * roller.reach(&n[0]);
            let f1 = (c - feet[1].point).dot(&n[1]) - self.delta * roller.reach(&n[1]);
            if f0.abs().max(f1.abs()) <= self.tolerance * 1e-3 * scale {
                let contacts = match roller {
                    Roller::Ball(_) => [feet[0].point, feet[1].point],
                    _ => [0, 1].map(|i| roller.extreme(&c, &(n[i] * -self.delta))),
                };
                return Ok(Section {
                    sigma: self.sigma,
                    spine_point: self.point,
                    tangent: self.tangent,
                    center: c,
                    contacts,
                    normals: n,
                    roller,
                    hints,
                });
            }
            let (dx, dy) = solve2(n[0].dot(&a), n[0].dot(&b), n[1].dot(&a), n[1].dot(&b), -f0, -f1)
                .ok_or_else(|| self.failure())?;
            c += a * dx + b * dy;
            if !c.coords.iter().all(|x| x.is_finite()) {
                return Err(self.failure());
            }
        }
        Err(self.failure())
    }

    /// Chamfer section with chord distances `d_left`, `d_right` from the
    /// edge, each measured within its support.
    pub fn chamfer(&self, d_left: f64, d_right: f64) -> BlendResult<Section> {
        let [n_l, n_r] = self.edge_normals();
        let into = [n_l.cross(&self.tangent), self.tangent.cross(&n_r)];
        let dist = [d_left, d_right];
        let mut contacts = [self.point; 2];
        let mut normals = [n_l, n_r];
        let mut hints = [(0.0, 0.0); 2];
        for k in 0..2 {
            if into[k].norm() < 1e-12 {
                return Err(self.failure());
            }
            let dir = into[k].normalize();
            let mut p = self.point + dir * dist[k];
            for _ in 0..8 {
                let f = self.supports[k].foot(&p, None);
                let off = f.point - self.point;
                let off = off - self.tangent * off.dot(&self.tangent);
                if off.norm() < 1e-15 {
                    break;
                }
                p = self.point + off.normalize() * dist[k];
                normals[k] = f.normal;
                hints[k] = f.uv;
            }
            let f = self.supports[k].foot(&p, None);
            contacts[k] = f.point;
            normals[k] = f.normal;
            hints[k] = f.uv;
        }
        Ok(Section {
            sigma: self.sigma,
            spine_point: self.point,
            tangent: self.tangent,
            center: Point3::from((contacts[0].coords + contacts[1].coords) * 0.5),
            contacts,
            normals,
            roller: Roller::Flat,
            hints,
        })
    }
}

/// Adapter handing section geometry to the geometry-dependent radius
/// functions.
pub struct SectionRoller<'a> {
    pub input: SectionInput<'a>,
}

impl SectionContext for SectionRoller<'_> {
    fn spine_param(&self) -> f64 {
        self.input.sigma
    }

    fn normal_angle(&self) -> f64 {
        self.input.normal_angle()
    }

    fn section_plane(&self) -> (Point3, Vector3) {
        (self.input.point, self.input.tangent)
    }

    fn spring_point(&self, radius: f64, side: Side) -> Option<Point3> {
        self.input.round(&RadiusValue::Circular(radius)).ok().map(|s| s.contact(side))
    }
}
