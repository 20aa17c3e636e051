//! Blend surfaces without touching the model.

use crate::error::BlendResult;
use crate::nurbs::NurbsSurface;
use crate::topo::{BodyId, TopoStore};

use super::sheet::build_sheet;
use super::BlendContext;

/// Spline patches approximating every blend surface `fix_blends` would
/// create on `body`. Vertex blends come back split into one patch per
/// side. Units that fail are skipped. The store is left as it was.
pub fn preview(
    store: &mut TopoStore,
    body: BodyId,
    ctx: &BlendContext,
) -> BlendResult<Vec<NurbsSurface>> {

    let checkpoint = store.begin();
    let result = build_sheet(store, body, ctx, true, &[]);
    store.rollback_to(checkpoint);
    let sheet = result?;
    log::debug!("preview of {body:?}: {} patches", sheet.previews.len());
    Ok(sheet.previews)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrib::{set_const_round, BlendEnds};
    use crate::primitive::make_box;

    #[test]
    fn preview_leaves_the_model_alone() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 10.0, 10.0, 10.0).unwrap();
        let e = store
            .body_edges(body)
            .unwrap()
            .into_iter()
            .find(|&e| {
                let m = store.edge(e).unwrap().midpoint();
                (m.x - 10.0).abs() < 1e-9 && (m.y - 10.0).abs() < 1e-9
            })
            .unwrap();
        set_const_round(&mut store, &[e], 4.0, &BlendEnds::default()).unwrap();
        let before = store.clone();
        let patches = preview(&mut store, body, &BlendContext::default()).unwrap();
        assert!(store.model_eq(&before));
        assert_eq!(patches.len(), 1);
        // Mid-height, mid-arc point of the round.
        let (u0, u1) = patches[0].domain_u();
        let (v0, v1) = patches[0].domain_v();
        let p = patches[0].evaluate(0.5 * (u0 + u1), 0.5 * (v0 + v1));
        let axis = crate::math::Point3::new(6.0, 6.0, p.z);
        assert!(((p - axis).norm() - 4.0).abs() < 1e-2);
    }
}
