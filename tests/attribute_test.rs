use crusst_blend::attrib::{reference_senses, Setback, VertexBlendSpec};
use crusst_blend::math::Point3;
use crusst_blend::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn corner_edges(store: &TopoStore, body: BodyId) -> (VertexId, Vec<EdgeId>) {
    let v = store
        .body_vertices(body)
        .unwrap()
        .into_iter()
        .find(|&v| (store.vertex(v).unwrap().point - Point3::new(5.0, 5.0, 5.0)).norm() < 1e-9)
        .unwrap();
    (v, store.vertex_edges(v).to_vec())
}

#[test]
fn negative_radius_leaves_the_model_alone() {
    let mut store = TopoStore::new();
    let body = make_box(&mut store, 5.0, 5.0, 5.0).unwrap();
    let edges = store.body_edges(body).unwrap();
    let before = store.clone();
    let err = set_const_round(&mut store, &edges, -0.5, &BlendEnds::default());
    assert!(matches!(err, Err(BlendError::InvalidRadius { .. })));
    assert!(store.model_eq(&before));
}

#[test]
fn setting_again_replaces() {
    let mut store = TopoStore::new();
    let body = make_box(&mut store, 5.0, 5.0, 5.0).unwrap();
    let e = store.body_edges(body).unwrap()[0];
    set_const_round(&mut store, &[e], 1.0, &BlendEnds::default()).unwrap();
    let attributes = store.counts().attributes;
    set_const_round(&mut store, &[e], 2.0, &BlendEnds::default()).unwrap();
    assert_eq!(store.counts().attributes, attributes);
    assert_eq!(blend_attribute(&store, e).unwrap().kind, BlendKind::ConstRound { radius: 2.0 });
    assert_eq!(blend_attribute(&store, e).unwrap().convexity, Convexity::Convex);
}

#[test]
fn chamfer_ranges_stay_with_their_faces() {
    let mut store = TopoStore::new();
    let body = make_box(&mut store, 5.0, 5.0, 5.0).unwrap();
    let (_, edges) = corner_edges(&store, body);
    let pair = [edges[0], edges[1]];
    set_const_chamfer(&mut store, &pair, 1.0, 2.0, &BlendEnds::default()).unwrap();
    let senses = reference_senses(&store, &pair).unwrap();
    assert!(senses[0]);
    for (e, fwd) in pair.into_iter().zip(senses) {
        let attr = blend_attribute(&store, e).unwrap();
        let BlendKind::ConstChamfer { left_range, right_range } = attr.kind else {

            panic!("expected a chamfer")
        };
        let want = if fwd { (1.0, 2.0) } else { (2.0, 1.0) };
        assert_eq!((left_range, right_range), want);
    }
}

#[test]
fn deleting_twice_is_harmless() {
    let mut store = TopoStore::new();
    let body = make_box(&mut store, 5.0, 5.0, 5.0).unwrap();
    let e = store.body_edges(body).unwrap()[0];
    set_const_round(&mut store, &[e], 1.0, &BlendEnds::default()).unwrap();
    assert_eq!(delete_blend(&mut store, &[EntityRef::Edge(e)]).unwrap(), 1);
    assert_eq!(delete_blend(&mut store, &[EntityRef::Edge(e)]).unwrap(), 0);
    assert!(blend_attribute(&store, e).is_none());
}

#[test]
fn vertex_blend_joins_mixed_radii_into_one_network() {
    let mut store = TopoStore::new();
    let body = make_box(&mut store, 5.0, 5.0, 5.0).unwrap();
    let (v, edges) = corner_edges(&store, body);
    for (k, &e) in edges.iter().enumerate() {
        set_const_round(&mut store, &[e], 1.0 + k as f64, &BlendEnds::default()).unwrap();
    }
    set_vertex_blend(&mut store, &[v], VertexBlendSpec::default()).unwrap();

    let unit = find_smooth_sequence(&store, edges[0]).unwrap();
    assert_eq!(unit.edges, vec![edges[0]]);

    let graph = find_blend_graph(&store, EntityRef::Vertex(v)).unwrap();
    let mut want = edges.clone();
    want.sort();
    let mut got = graph.edges.clone();
    got.sort();
    assert_eq!(got, want);
    assert!(graph.vertices.contains(&v));
}

#[test]
fn bulge_out_of_range_is_rejected() {
    let mut store = TopoStore::new();
    let body = make_box(&mut store, 5.0, 5.0, 5.0).unwrap();
    let (v, _) = corner_edges(&store, body);
    let spec = VertexBlendSpec { bulge: 3.0, ..VertexBlendSpec::default() };
    let err = set_vertex_blend(&mut store, &[v], spec);
    assert!(matches!(err, Err(BlendError::InvalidBulge { .. })));

}

proptest! {
    #[test]
    fn setback_sides_round_trip(left in 0.0f64..20.0, right in 0.0f64..20.0) {
        let s = Setback::from_sides(left, right);
        prop_assert!(s.diff_set);
        prop_assert!((s.left() - left).abs() < 1e-12);
        prop_assert!((s.right() - right).abs() < 1e-12);
        let m = s.mirrored();
        prop_assert!((m.left() - right).abs() < 1e-12);
        prop_assert!((m.right() - left).abs() < 1e-12);
    }
}
