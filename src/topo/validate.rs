//! Topology validation for B-rep bodies.
//!
//! Checks the invariants a blend splice must preserve:
//! - every solid edge has exactly two coedges of opposite direction
//! - every loop closes and is vertex-connected
//! - coedges point back at the face that owns their loop
//! - Euler–Poincaré: V − E + F − (L − F) = 2(S − G) with integer G ≥ 0

use std::collections::HashMap;

use super::store::TopoStore;
use super::types::*;
use crate::error::BlendResult;

#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    /// Genus implied by the Euler–Poincaré count.
    pub genus: i64,
}

pub fn validate_body(store: &TopoStore, body: BodyId) -> BlendResult<ValidationResult> {
    let mut errors = Vec::new();
    let b = store.body(body)?;
    let faces = store.body_faces(body)?;

    let mut uses: HashMap<EdgeId, Vec<bool>> = HashMap::new();
    let mut loops = 0i64;
    for &f in &faces {
        for w in store.face_wires(f)? {
            loops += 1;
            let coedges = match store.wire_coedges(w) {
                Ok(c) => c,
                Err(_) => {
                    errors.push(format!("Face {f:?}: wire {w:?} is not closed"));
                    continue;
                }
            };
            for (i, &c) in coedges.iter().enumerate() {
                let co = store.coedge(c)?;
                if co.face != f {
                    let claimed = co.face;
                    errors.push(format!("Coedge {c:?} claims face {claimed:?} but lies in {f:?}"));
                }
                uses.entry(co.edge).or_default().push(co.forward);
                let (_, end) = store.coedge_vertices(c)?;
                let (next_start, _) = store.coedge_vertices(coedges[(i + 1) % coedges.len()])?;
                if end != next_start {
                    errors.push(format!("Face {f:?}: loop breaks after coedge {c:?}"));
                }
            }
        }
    }

    for (&e, dirs) in &uses {
        let fwd = dirs.iter().filter(|d| **d).count();
        let rev = dirs.len() - fwd;
        match b.kind {
            BodyKind::Solid => {
                if dirs.len() != 2 {
                    let n = dirs.len();
                    errors.push(format!("Edge {e:?} has {n} coedges (expected 2 for manifold)"));
                } else if fwd != 1 || rev != 1 {
                    errors.push(format!("Edge {e:?}: both coedges run the same way"));
                }
            }
            BodyKind::Sheet => {
                if dirs.len() > 2 || fwd > 1 || rev > 1 {
                    errors.push(format!("Sheet edge {e:?} is used inconsistently"));
                }
            }
        }
    }

    let v = store.body_vertices(body)?.len() as i64;
    let e = uses.len() as i64;
    let f = faces.len() as i64;
    let rings = loops - f;
    let s = b.shells.len() as i64;
    let euler = v - e + f - rings;
    let mut genus = 0;
    if b.kind == BodyKind::Solid {
        let twice_genus = 2 * s - euler;
        if twice_genus < 0 || twice_genus % 2 != 0 {
            errors.push(format!(
                "Euler–Poincaré V-E+F-R = {v}-{e}+{f}-{rings} = {euler} \
                 is inconsistent with {s} shell(s)"
            ));

        } else {
            genus = twice_genus / 2;
        }
    }

    Ok(ValidationResult { valid: errors.is_empty(), errors, genus })
}
