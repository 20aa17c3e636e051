use approx::assert_relative_eq;
use crusst_blend::attrib::VariableSpec;
use crusst_blend::curve::Curve3;
use crusst_blend::math::Point3;
use crusst_blend::radius::Side;
use crusst_blend::spine::{Roller, Spine};
use crusst_blend::topo::validate_body;
use crusst_blend::*;
use pretty_assertions::assert_eq;

fn vertical_edge(store: &TopoStore, body: BodyId, x: f64, y: f64) -> EdgeId {
    store
        .body_edges(body)
        .unwrap()
        .into_iter()
        .find(|&e| {
            let m = store.edge(e).unwrap().midpoint();
            (m.x - x).abs() < 1e-9 && (m.y - y).abs() < 1e-9
        })
        .expect("no vertical edge there")
}

fn four_family_block(store: &mut TopoStore) -> (BodyId, Vec<EdgeId>) {
    let body = make_box(store, 20.0, 20.0, 10.0).unwrap();
    let edges = vec![
        vertical_edge(store, body, 20.0, 20.0),
        vertical_edge(store, body, -20.0, 20.0),
        vertical_edge(store, body, -20.0, -20.0),
        vertical_edge(store, body, 20.0, -20.0),
    ];
    let params = [0.0, 0.25, 0.5, 0.75, 1.0];
    let radii = [2.0, 8.0, 2.0, 8.0, 2.0];
    set_const_round(store, &edges[..1], 8.0, &BlendEnds::default()).unwrap();
    let functions = [
        RadiusFunction::fixed_width_for_radius(8.0).unwrap(),
        RadiusFunction::parametrized(&params, &radii).unwrap(),
        RadiusFunction::parametrized_with_slopes(&params, &radii, 0.0, 0.0).unwrap(),
    ];
    for (&e, f) in edges[1..].iter().zip(functions) {
        let spec = VariableSpec::from_function(f);
        set_variable_blend(store, &[e], spec, &BlendEnds::default()).unwrap();
    }
    (body, edges)
}

#[test]
fn four_families_give_four_faces() {
    let mut store = TopoStore::new();
    let (body, edges) = four_family_block(&mut store);
    let before = store.clone();

    let ctx = BlendContext::default();
    let sheet = make_sheet(&mut store, body, &ctx).unwrap();
    assert!(sheet.report.failures.is_empty(), "{:?}", sheet.report.failures);
    assert_eq!(sheet.units.len(), 4);
    for unit in &sheet.units {
        assert_eq!(unit.faces.len(), 1);
        assert_eq!(unit.consumed_edges.len(), 1);
    }
    let mut consumed: Vec<EdgeId> =
        sheet.units.iter().flat_map(|u| u.consumed_edges.clone()).collect();
    consumed.sort();
    let mut expected = edges.clone();
    expected.sort();
    assert_eq!(consumed, expected);

    discard_sheet(&mut store, sheet);
    assert!(store.model_eq(&before));
}

#[test]
fn variable_sections_follow_their_function() {
    let mut store = TopoStore::new();
    let (_, edges) = four_family_block(&mut store);
    let unit = find_smooth_sequence(&store, edges[2]).unwrap();
    let spine = Spine::from_unit(&store, &unit, 1e-5).unwrap();
    // Symmetric control values, so the edge's direction does not matter.
    let params = [0.0, 0.25, 0.5, 0.75, 1.0];
    let function = RadiusFunction::parametrized(&params, &[2.0, 8.0, 2.0, 8.0, 2.0]).unwrap();

    let len = spine.length();
    for k in 1..8 {
        let sigma = len * k as f64 / 8.0;
        let section = spine.section(sigma).unwrap();
        let want = function.evaluate(sigma / len).nominal();
        assert_relative_eq!(section.roller.nominal(), want, epsilon = 1e-9);
        for contact in &section.contacts {
            assert_relative_eq!((section.center - contact).norm(), want, epsilon = 1e-6);
        }
    }
}

#[test]
fn four_families_attach_through_fix_blends() {
    let mut store = TopoStore::new();
    let (body, edges) = four_family_block(&mut store);
    let report = fix_blends(&mut store, body, &BlendContext::default()).unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.faces.len(), 4);
    assert_eq!(store.body_faces(body).unwrap().len(), 10);
    for e in edges {
        assert!(store.edge(e).is_err());
        assert!(blend_attribute(&store, e).is_none());
    }
    let check = validate_body(&store, body).unwrap();
    assert!(check.valid, "{:?}", check.errors);
}

fn corner_spine(store: &mut TopoStore, function: RadiusFunction) -> (BodyId, Spine) {
    let body = make_box(store, 20.0, 20.0, 10.0).unwrap();
    let e = vertical_edge(store, body, 20.0, 20.0);
    let spec = VariableSpec::from_function(function);
    set_variable_blend(store, &[e], spec, &BlendEnds::default()).unwrap();
    let unit = find_smooth_sequence(store, e).unwrap();
    let spine = Spine::from_unit(store, &unit, 1e-5).unwrap();
    (body, spine)
}

fn on_wall(p: &Point3) -> Option<usize> {
    if (p.x - 20.0).abs() < 1e-6 {
        Some(0)
    } else if (p.y - 20.0).abs() < 1e-6 {
        Some(1)
    } else {
        None
    }
}

#[test]
fn rotated_ellipse_ends_take_their_own_axes() {
    let mut store = TopoStore::new();
    let function = RadiusFunction::rotated_ellipse((3.0, 2.0), (1.5, 1.0), (0.0, 0.5)).unwrap();
    let (_, spine) = corner_spine(&mut store, function);
    let mut ends = Vec::new();
    for sigma in [0.0, spine.length()] {
        let section = spine.section(sigma).unwrap();
        let Roller::Ellipse { a, b, .. } = section.roller else { panic!("{:?}", section.roller) };
        ends.push((a.max(b), a.min(b)));
        let walls: Vec<Option<usize>> = section.contacts.iter().map(on_wall).collect();
        assert!(walls.contains(&Some(0)) && walls.contains(&Some(1)), "{:?}", section.contacts);
        assert!(section.center.x < 20.0 && section.center.y < 20.0);
    }
    ends.sort_by(|p, q| p.0.total_cmp(&q.0));
    assert_relative_eq!(ends[0].0, 2.0, epsilon = 1e-9);
    assert_relative_eq!(ends[0].1, 1.0, epsilon = 1e-9);
    assert_relative_eq!(ends[1].0, 3.0, epsilon = 1e-9);
    assert_relative_eq!(ends[1].1, 1.5, epsilon = 1e-9);
}

#[test]
fn holdline_drives_the_radius_along_the_edge() {
    // Holdline on the x = 20 wall drifting from 2 to 4 away from the edge.
    let curve = Curve3::segment(Point3::new(20.0, 18.0, -10.0), Point3::new(20.0, 16.0, 10.0));
    let function = RadiusFunction::holdline(curve, 0.0, 1.0, Side::Left, 3.0).unwrap();
    let mut store = TopoStore::new();
    let (body, spine) = corner_spine(&mut store, function);
    for k in 1..8 {
        let sigma = spine.length() * k as f64 / 8.0;
        let section = spine.section(sigma).unwrap();
        let want = 3.0 + section.spine_point.z / 10.0;
        assert_relative_eq!(section.roller.nominal(), want, epsilon = 1e-6);
        let on_side = |c: &Point3| (c - Point3::new(20.0, 20.0 - want, c.z)).norm() < 1e-6;
        assert!(section.contacts.iter().any(on_side));
    }

    let report = fix_blends(&mut store, body, &BlendContext::default()).unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.faces.len(), 1);
    let check = validate_body(&store, body).unwrap();
    assert!(check.valid, "{:?}", check.errors);
}

/// Large rounded-corner prism: the top edges along y = -120, the corner
/// arc of radius 40, and along x = 200.
fn transition_corner(store: &mut TopoStore) -> (BodyId, [EdgeId; 3]) {
    let (a, b, r) = (200.0, 120.0, 40.0);
    let profile = Profile {
        start: (-a, -b),
        segments: vec![
            ProfileSegment::Line { to: (a - r, -b) },
            ProfileSegment::Arc { to: (a, -b + r), center: (a - r, -b + r), ccw: true },
            ProfileSegment::Line { to: (a, b) },
            ProfileSegment::Line { to: (-a, b) },
            ProfileSegment::Line { to: (-a, -b) },
        ],
    };
    let body = make_prism(store, &profile, 0.0, 100.0).unwrap();
    let near = |store: &TopoStore, x: f64, y: f64| {
        store
            .body_edges(body)
            .unwrap()
            .into_iter()
            .filter(|&e| store.edge(e).unwrap().midpoint().z > 99.0)
            .min_by(|&p, &q| {
                let d = |e: EdgeId| {
                    let m = store.edge(e).unwrap().midpoint();
                    (m.x - x).hypot(m.y - y)
                };
                d(p).total_cmp(&d(q))
            })
            .unwrap()
    };
    let edges = [
        near(store, 0.0, -b),
        near(store, a - r + 28.0, -b + r - 28.0),
        near(store, a, 40.0),
    ];
    (body, edges)
}

#[test]
fn transition_radius_is_smooth_and_monotone_through_the_corner() {
    let mut store = TopoStore::new();
    let (body, [first, arc, last]) = transition_corner(&mut store);
    set_const_round(&mut store, &[first], 20.0, &BlendEnds::default()).unwrap();
    let transition = RadiusFunction::transition(20.0, 36.0).unwrap();
    let spec = VariableSpec::from_function(transition);
    set_variable_blend(&mut store, &[arc], spec, &BlendEnds::default()).unwrap();
    set_const_round(&mut store, &[last], 36.0, &BlendEnds::default()).unwrap();

    let unit = find_smooth_sequence(&store, arc).unwrap();
    assert_eq!(unit.edges.len(), 3);
    let spine = Spine::from_unit(&store, &unit, 1e-5).unwrap();
    let n = 600;
    let radii: Vec<f64> = (0..=n)
        .map(|k| spine.radius_at(spine.length() * k as f64 / n as f64).unwrap().nominal())
        .collect();

    let rising = radii[n] > radii[0];
    let (lo, hi) = if rising { (radii[0], radii[n]) } else { (radii[n], radii[0]) };
    assert_relative_eq!(lo, 20.0, epsilon = 1e-9);
    assert_relative_eq!(hi, 36.0, epsilon = 1e-9);
    for w in radii.windows(2) {
        let step = w[1] - w[0];
        assert!(if rising { step >= -1e-9 } else { step <= 1e-9 }, "{w:?}");
        // No jump anywhere, the joints included.
        assert!(step.abs() < 1.0, "{w:?}");
    }
    for k in [n / 3, n / 2, 2 * n / 3] {
        let sigma = spine.length() * k as f64 / n as f64;
        let section = spine.section(sigma).unwrap();
        assert_relative_eq!(section.roller.nominal(), radii[k], epsilon = 1e-9);
    }

    let report = fix_blends(&mut store, body, &BlendContext::default()).unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    let check = validate_body(&store, body).unwrap();
    assert!(check.valid, "{:?}", check.errors);
}
