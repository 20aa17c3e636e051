use approx::assert_relative_eq;
use crusst_blend::attrib::{explicit_blend, ExplicitKind};
use crusst_blend::math::Point3;
use crusst_blend::surface::Surface;
use crusst_blend::topo::validate_body;
use crusst_blend::*;
use pretty_assertions::assert_eq;

fn top_face(store: &TopoStore, body: BodyId) -> FaceId {
    store
        .body_faces(body)
        .unwrap()
        .into_iter()
        .find(|&f| store.face_normal_at(f, &Point3::new(0.0, 0.0, 10.0)).unwrap().z > 0.9)
        .unwrap()
}

#[test]
fn ball_above_a_block_is_joined_by_a_concave_torus() {
    let mut store = TopoStore::new();
    let block = make_box(&mut store, 10.0, 10.0, 10.0).unwrap();
    let ball = make_sphere(&mut store, Point3::new(0.0, 0.0, 14.0), 3.0).unwrap();
    let top = top_face(&store, block);
    let sphere = store.body_faces(ball).unwrap()[0];
    let r = 2.0;
    let function = RadiusFunction::constant(r).unwrap();
    let help = Point3::new(3.0, 0.0, 11.0);
    set_entity_entity_blend(&mut store, top, sphere, function, Convexity::Concave, help).unwrap();

    let report = fix_blends(&mut store, block, &BlendContext::default()).unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.faces.len(), 1);
    assert!(store.body(ball).is_err(), "the ball is merged into the block");

    let check = validate_body(&store, block).unwrap();
    assert!(check.valid, "{:?}", check.errors);
    assert_eq!(store.body_faces(block).unwrap().len(), 8);

    let face = report.faces[0];
    let Surface::Torus { center, axis, major_r, minor_r } = store.face(face).unwrap().surface else {
        panic!("expected a torus")
    };
    assert_relative_eq!(minor_r, r, epsilon = 1e-12);
    assert_relative_eq!(axis.z.abs(), 1.0, epsilon = 1e-12);
    // Tube centre one radius above the plane and one radius off the sphere.
    assert_relative_eq!(center.z - 10.0, r, epsilon = 1e-9);
    let tube = Point3::new(center.x + major_r, center.y, center.z);
    assert_relative_eq!((tube - Point3::new(0.0, 0.0, 14.0)).norm(), 3.0 + r, epsilon = 1e-9);

    // One ring on the plane, one on the sphere, each shared with its support,
    // joined into a single loop by the seam edge.
    let mut neighbours: Vec<FaceId> = store
        .face_edges(face)
        .unwrap()
        .into_iter()
        .flat_map(|e| store.edge_faces(e).unwrap())
        .map(|(f, _)| f)
        .filter(|&f| f != face)
        .collect();
    neighbours.sort();
    neighbours.dedup();
    let mut want = vec![top, sphere];
    want.sort();
    assert_eq!(neighbours, want);
    assert_eq!(store.face_wires(face).unwrap().len(), 1);
    let seams = store
        .face_edges(face)
        .unwrap()
        .into_iter()
        .filter(|&e| store.edge_faces(e).unwrap().iter().all(|&(f, _)| f == face))
        .count();
    assert_eq!(seams, 1);

    let record = explicit_blend(&store, face).unwrap();
    assert_eq!(record.kind, ExplicitKind::EntityEntity);
    assert!(crusst_blend::attrib::entity_entity_blend(&store, top).is_none());
}

#[test]
fn supports_sharing_an_edge_are_refused() {
    let mut store = TopoStore::new();
    let block = make_box(&mut store, 10.0, 10.0, 10.0).unwrap();
    let top = top_face(&store, block);
    let side = store
        .body_faces(block)
        .unwrap()
        .into_iter()
        .find(|&f| store.face_normal_at(f, &Point3::new(10.0, 0.0, 0.0)).unwrap().x > 0.9)
        .unwrap();
    let function = RadiusFunction::constant(1.0).unwrap();
    let help = Point3::new(9.0, 0.0, 9.0);
    set_entity_entity_blend(&mut store, top, side, function, Convexity::Convex, help).unwrap();
    let before = store.clone();

    let report = fix_blends(&mut store, block, &BlendContext::default()).unwrap();
    assert!(report.faces.is_empty());
    assert!(report.has_warning(WarningKind::OverlappingSupports));
    assert!(matches!(report.failures[0].error, BlendError::OverlappingSupports { .. }));
    assert!(store.model_eq(&before));
}

#[test]
fn a_face_cannot_blend_with_itself() {
    let mut store = TopoStore::new();
    let block = make_box(&mut store, 10.0, 10.0, 10.0).unwrap();
    let top = top_face(&store, block);
    let before = store.clone();
    let function = RadiusFunction::constant(1.0).unwrap();
    let help = Point3::origin();
    let err = set_entity_entity_blend(&mut store, top, top, function, Convexity::Concave, help);
    assert!(matches!(err, Err(BlendError::OverlappingSupports { .. })));
    assert!(store.model_eq(&before));
}

fn block_and_ball(store: &mut TopoStore) -> (BodyId, FaceId, FaceId) {
    let block = make_box(store, 10.0, 10.0, 10.0).unwrap();
    let ball = make_sphere(store, Point3::new(0.0, 0.0, 14.0), 3.0).unwrap();
    let top = top_face(store, block);
    let sphere = store.body_faces(ball).unwrap()[0];
    (block, top, sphere)
}

/// Run `fix_blends` on a blend expected to fail on its own.
fn fails_alone(store: &mut TopoStore, block: BodyId) -> BlendError {
    let before = store.clone();
    let report = fix_blends(store, block, &BlendContext::default()).unwrap();
    assert!(report.faces.is_empty());
    assert_eq!(report.failures.len(), 1, "{:?}", report.failures);
    assert!(store.model_eq(&before));
    report.failures[0].error.clone()
}

#[test]
fn blend_owned_by_the_other_body_is_found() {
    let mut store = TopoStore::new();
    let (block, top, sphere) = block_and_ball(&mut store);
    let function = RadiusFunction::constant(2.0).unwrap();
    let help = Point3::new(3.0, 0.0, 11.0);
    set_entity_entity_blend(&mut store, sphere, top, function, Convexity::Concave, help).unwrap();

    let report = fix_blends(&mut store, block, &BlendContext::default()).unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.faces.len(), 1);
    let check = validate_body(&store, block).unwrap();
    assert!(check.valid, "{:?}", check.errors);
    assert!(crusst_blend::attrib::entity_entity_blend(&store, sphere).is_none());
}

#[test]
fn plane_and_cylinder_fail_for_their_unit() {
    let mut store = TopoStore::new();
    let block = make_box(&mut store, 10.0, 10.0, 10.0).unwrap();
    let post = make_cylinder(&mut store, Point3::new(0.0, 0.0, 12.0), 2.0, 4.0).unwrap();
    let top = top_face(&store, block);
    let side = store
        .body_faces(post)
        .unwrap()
        .into_iter()
        .find(|&f| matches!(store.face(f).unwrap().surface, Surface::Cylinder { .. }))
        .unwrap();
    let function = RadiusFunction::constant(1.0).unwrap();
    let help = Point3::new(3.0, 0.0, 11.0);
    set_entity_entity_blend(&mut store, top, side, function, Convexity::Concave, help).unwrap();
    assert!(matches!(fails_alone(&mut store, block), BlendError::UnsupportedTopology { .. }));
}

#[test]
fn varying_radius_fails_for_its_unit() {
    let mut store = TopoStore::new();
    let (block, top, sphere) = block_and_ball(&mut store);
    let function = RadiusFunction::linear(1.0, 2.0).unwrap();
    let help = Point3::new(3.0, 0.0, 11.0);
    set_entity_entity_blend(&mut store, top, sphere, function, Convexity::Concave, help).unwrap();
    assert!(matches!(fails_alone(&mut store, block), BlendError::UnsupportedTopology { .. }));
}

#[test]
fn convex_entity_blend_fails_for_its_unit() {
    let mut store = TopoStore::new();
    let (block, top, sphere) = block_and_ball(&mut store);
    let function = RadiusFunction::constant(2.0).unwrap();
    let help = Point3::new(3.0, 0.0, 11.0);
    set_entity_entity_blend(&mut store, top, sphere, function, Convexity::Convex, help).unwrap();
    assert!(matches!(fails_alone(&mut store, block), BlendError::UnsupportedTopology { .. }));
}

#[test]
fn help_point_below_the_plane_fails_for_its_unit() {
    let mut store = TopoStore::new();
    let (block, top, sphere) = block_and_ball(&mut store);
    let function = RadiusFunction::constant(2.0).unwrap();
    let help = Point3::new(3.0, 0.0, 9.0);
    set_entity_entity_blend(&mut store, top, sphere, function, Convexity::Concave, help).unwrap();
    let err = fails_alone(&mut store, block);
    let BlendError::UnsupportedTopology { ref reason, .. } = err else { panic!("{err:?}") };
    assert!(reason.contains("help point"), "{reason}");

}
