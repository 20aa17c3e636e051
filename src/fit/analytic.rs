//! Closed-form blend surfaces.

use super::{faces_outward, FitKind, FitOptions, FittedBlend};
use crate::attrib::BlendKind;
use crate::curve::Curve3;
use crate::error::BlendResult;
use crate::math::Vector3;
use crate::radius::Side;
use crate::spine::{Roller, Section, Spine, SpineKind, SpringCurve};
use crate::surface::Surface;

/// The exact surface for `spine`, if one exists.
pub fn try_analytic(
    spine: &Spine,
    range: (f64, f64),
    sections: &[Section],
    opts: &FitOptions,
) -> BlendResult<Option<FittedBlend>> {
    let Some(first) = sections.first() else { return Ok(None) };
    if sections.iter().any(|s| s.is_degenerate(opts.tolerance)) {
        return Ok(None);
    }
    match first.roller {
        Roller::Flat => Ok(planar_chamfer(spine, range, sections, opts)),
        Roller::Ball(r) => {
            let same = |s: &Section| {
                matches!(s.roller, Roller::Ball(q) if (q - r).abs() <= opts.tolerance)
            };
            if !sections.iter().all(same) {
                return Ok(None);
            }
            Ok(rolling_ball(spine, range, sections, r))
        }
        Roller::Ellipse { .. } => Ok(None),
    }
}

fn rolling_ball(
    spine: &Spine,
    range: (f64, f64),
    sections: &[Section],
    r: f64,
) -> Option<FittedBlend> {
    let locus = spine.analytic_center(r)?;
    let first = &sections[0];
    let (kind, surface, springs) = match (&locus, spine.kind) {
        (Curve3::Line { origin, dir }, SpineKind::Line) => {
            let dir = if dir.dot(&first.tangent) >= 0.0 { *dir } else { -dir };
            let surface = Surface::Cylinder { origin: *origin, axis: dir, radius: r };
            (FitKind::Cylinder, surface, line_springs(first, &dir))
        }
        (Curve3::Circle { center, axis, radius }, SpineKind::Circle) => {
            let Curve3::Circle { radius: spine_radius, .. } = spine.segments[0].curve() else {
                return None;
            };
            let surface =
                Surface::Torus { center: *center, axis: *axis, major_r: *radius, minor_r: r };
            let springs = [
                SpringCurve::circle(first, Side::Left, center, axis, *spine_radius),
                SpringCurve::circle(first, Side::Right, center, axis, *spine_radius),
            ];
            (FitKind::Torus, surface, springs)
        }
        _ => return None,
    };
    let mid = &sections[sections.len() / 2];
    Some(FittedBlend {
        kind,
        outward: faces_outward(&surface, mid),
        surface,
        springs,
        sections: sections.to_vec(),
        range,
        station_limit_hit: false,
    })
}

/// A constant chamfer between two planes is itself planar.
fn line_springs(first: &Section, dir: &Vector3) -> [SpringCurve; 2] {
    [SpringCurve::line(first, Side::Left, dir), SpringCurve::line(first, Side::Right, dir)]
}

fn planar_chamfer(
    spine: &Spine,
    range: (f64, f64),
    sections: &[Section],
    opts: &FitOptions,
) -> Option<FittedBlend> {
    if spine.kind != SpineKind::Line {
        return None;
    }
    let planar = spine.segments.iter().all(|s| {
        s.supports.iter().all(|sup| matches!(sup.surface, Surface::Plane { .. }))
            && matches!(s.attr.kind, BlendKind::ConstChamfer { .. })
    });
    let first = &sections[0];
    let dir = first.tangent;
    let across = first.contacts[1] - first.contacts[0];
    let mut normal = dir.cross(&across);
    if !planar || normal.norm() < 1e-12 {
        return None;
    }
    normal = normal.normalize();
    if normal.dot(&first.bisector()) < 0.0 {
        normal = -normal;
    }
    // Every section must lie in the plane.
    let flat = sections.iter().all(|s| {
        s.contacts.iter().all(|c| (c - first.contacts[0]).dot(&normal).abs() <= opts.tolerance)
    });
    if !flat {
        return None;
    }
    let surface = Surface::Plane { origin: first.contacts[0], normal };
    Some(FittedBlend {
        kind: FitKind::Plane,
        outward: true,
        surface,
        springs: line_springs(first, &dir),

        sections: sections.to_vec(),
        range,
        station_limit_hit: false,
    })
}
