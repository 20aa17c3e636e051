//! Marched blend surfaces.
//!
//! Sections are solved at a set of stations and skinned into a rational
//! surface `S(σ, w)`: cubic in `σ`, and in `w` the section conic's own
//! degree (2 for rounds, 1 for chamfers). The surface is compared against
//! freshly solved sections halfway between stations; wherever the error
//! exceeds the march tolerance the midpoint becomes a new station.

use super::{solve_sections, FitKind, FitOptions, FittedBlend};
use crate::curve::Curve3;
use crate::error::{BlendError, BlendResult};
use crate::nurbs::fit::skin_sections;
use crate::nurbs::knot::bezier_knots;
use crate::nurbs::NurbsSurface;
use crate::spine::{Section, Spine, SpringCurve};
use crate::surface::Surface;

const CHECK_POINTS: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

fn skin(spine: &Spine, params: &[f64], sections: &[Section]) -> BlendResult<NurbsSurface> {
    let nets: Vec<_> = sections.iter().map(Section::control_points).collect();
    let nv = nets[0].len();
    if nets.iter().any(|n| n.len() != nv) {
        let reason = "blend changes section type along its spine";
        return Err(BlendError::unsupported(reason, spine.entities()));
    }
    let degree_v = nv - 1;
    skin_sections(params, &nets, 3, degree_v, bezier_knots(degree_v))
        .ok_or_else(|| BlendError::unsupported("blend surface skinning failed", spine.entities()))
}

fn deviation(surface: &NurbsSurface, truth: &Section) -> f64 {
    CHECK_POINTS
        .iter()
        .map(|&w| (surface.evaluate(truth.sigma, w) - truth.point_at(w)).norm())
        .fold(0.0, f64::max)
}

/// Refine `params`/`sections` until the skinned surface is within the march
/// tolerance, or the station limit is reached.
pub fn march(
    spine: &Spine,
    range: (f64, f64),
    mut params: Vec<f64>,
    mut sections: Vec<Section>,
    opts: &FitOptions,
) -> BlendResult<FittedBlend> {
    let mut limit_hit = false;
    let surface = loop {
        let surface = skin(spine, &params, &sections)?;
        let mids: Vec<f64> = params.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        let truth = solve_sections(spine, &mids)?;
        let bad: Vec<Section> =
            truth.into_iter().filter(|s| deviation(&surface, s) > opts.march_tolerance).collect();
        if bad.is_empty() {
            break surface;
        }
        if params.len() + bad.len() > opts.max_stations {
            log::warn!(
                "blend over {:?} stopped at {} stations; {} intervals still exceed {}",
                spine.entities(),
                params.len(),
                bad.len(),
                opts.march_tolerance
            );
            limit_hit = true;
            break surface;
        }
        let mut merged: Vec<Section> = sections.into_iter().chain(bad).collect();
        merged.sort_by(|a, b| a.sigma.total_cmp(&b.sigma));
        params = merged.iter().map(|s| s.sigma).collect();
        sections = merged;
    };

    let springs = [0.0, 1.0].map(|w| SpringCurve {
        curve: Curve3::Nurbs(surface.iso_v(w)),
        offset: 0.0,
        rate: 1.0,
    });
    // The surface's u parameter is σ itself; the orientation follows the
    // majority of stations so one near-degenerate section cannot flip it.
    let agree =
        sections.iter().filter(|s| surface.normal(s.sigma, 0.5).dot(&s.bisector()) > 0.0).count();
    let outward = 2 * agree > sections.len();
    Ok(FittedBlend {
        kind: FitKind::Marched,
        surface: Surface::Nurbs(surface),
        outward,
        springs,
        sections,
        range,
        station_limit_hit: limit_hit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrib::{set_variable_blend, BlendEnds, VariableSpec};
    use crate::fit::fit_blend;
    use crate::graph::find_smooth_sequence;
    use crate::primitive::make_box;
    use crate::radius::RadiusFunction;
    use crate::topo::TopoStore;

    fn variable_spine(store: &mut TopoStore, function: RadiusFunction) -> Spine {
        let body = make_box(store, 10.0, 10.0, 10.0).unwrap();
        let e = store.body_edges(body).unwrap()[0];
        let spec = VariableSpec::from_function(function);
        set_variable_blend(store, &[e], spec, &BlendEnds::default()).unwrap();
        let unit = find_smooth_sequence(store, e).unwrap();
        Spine::from_unit(store, &unit, 1e-5).unwrap()
    }

    #[test]
    fn variable_round_is_marched_within_tolerance() {
        let mut store = TopoStore::new();
        let spine = variable_spine(&mut store, RadiusFunction::linear(1.0, 4.0).unwrap());
        let opts = FitOptions::default();
        let fit = fit_blend(&spine, (0.0, spine.length()), &opts).unwrap();
        assert_eq!(fit.kind, FitKind::Marched);
        assert!(!fit.station_limit_hit);
        let Surface::Nurbs(ref n) = fit.surface else { panic!() };
        for k in 0..7 {
            let sigma = spine.length() * (k as f64 + 0.3) / 7.0;
            let truth = spine.section(sigma).unwrap();
            assert!(deviation(n, &truth) < 10.0 * opts.march_tolerance);
        }
        // Springs meet the supports.
        let s = spine.section(3.0).unwrap();
        assert!((fit.springs[0].point(3.0) - s.contacts[0]).norm() < 1e-3);
        // Oriented by `outward`, the normal points away from the material.
        let flip = if fit.outward { 1.0 } else { -1.0 };
        for k in 0..5 {
            let sigma = spine.length() * (k as f64 + 0.5) / 5.0;
            let truth = spine.section(sigma).unwrap();
            assert!(flip * n.normal(sigma, 0.5).dot(&truth.bisector()) > 0.5, "at {sigma}");
        }
    }

    #[test]
    fn station_limit_is_reported() {
        let mut store = TopoStore::new();
        let wavy =
            RadiusFunction::parametrized(&[0.0, 0.3, 0.6, 1.0], &[1.0, 4.0, 1.5, 3.0]).unwrap();

        let spine = variable_spine(&mut store, wavy);
        let opts = FitOptions { march_tolerance: 1e-14, max_stations: 12, ..FitOptions::default() };
        let fit = fit_blend(&spine, (0.0, spine.length()), &opts).unwrap();
        assert!(fit.station_limit_hit);
        assert!(fit.sections.len() <= 12);
    }
}
