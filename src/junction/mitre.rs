//! Mitred junctions: two compatible units meeting at a vertex are cut by
//! the plane bisecting their directions.

use crate::attrib::{BlendAttribute, BlendKind};
use crate::error::{BlendError, BlendResult};
use crate::math::{Point3, Vector3};
use crate::topo::EntityRef;

const MATCH_TOL: f64 = 1e-6;

/// Whether two unit ends can meet in a mitre. Both attributes are read
/// at the junction end.
pub fn mitre_compatible(
    a: &BlendAttribute,
    a_at_start: bool,
    b: &BlendAttribute,
    b_at_start: bool,
) -> bool {
    if a.family() != b.family() || a.convexity != b.convexity {
        return false;
    }
    match (&a.kind, &b.kind) {
        (
            BlendKind::ConstChamfer { left_range: l1, right_range: r1 },
            BlendKind::ConstChamfer { left_range: l2, right_range: r2 },
        ) => {
            let same = (l1 - l2).abs() < MATCH_TOL && (r1 - r2).abs() < MATCH_TOL;
            let swapped = (l1 - r2).abs() < MATCH_TOL && (r1 - l2).abs() < MATCH_TOL;
            same || swapped
        }
        _ => match (a.end_radius(a_at_start), b.end_radius(b_at_start)) {
            (Some(ra), Some(rb)) => ra.approx_eq(&rb, MATCH_TOL),
            _ => false,
        },
    }
}

/// The mitre plane through `vertex`. `away_a` and `away_b` are the unit
/// tangents of the two spines at the vertex, each pointing away from it.
pub fn mitre_plane(
    vertex: Point3,
    away_a: Vector3,
    away_b: Vector3,
    entities: &[EntityRef],
) -> BlendResult<(Point3, Vector3)> {
    let n = away_a - away_b;
    if n.norm() < 1e-9 {
        let reason = "mitred blends fold back on each other";
        return Err(BlendError::unsupported(reason, entities.to_vec()));
    }
    Ok((vertex, n.normalize()))
}
