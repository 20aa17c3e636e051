//! The sheet-intersect-attach pipeline.
//!
//! Blending runs as a three-phase transaction:
//!
//! 1. [`make_sheet`] resolves every blend unit into faces collected in a
//!    throw-away sheet body, not yet joined to the blank;
//! 2. [`make_wire`] records where the sheet meets the blank: the blank face
//!    under each free sheet edge, the blank vertex or edge under each free
//!    sheet vertex, and the blank edges and vertices the sheet replaces;
//! 3. [`complete`] splices the sheet into the blank, rewrites the affected
//!    face loops, swaps implicit attributes for explicit records and
//!    validates the result.
//!
//! [`fix_blends`] runs all three. The phases share one store checkpoint
//! opened by `make_sheet`: `complete` commits it and [`discard_sheet`]
//! rolls it back, so an abandoned sheet leaves no trace.

pub mod attach;
pub mod entity;
pub mod preview;
pub mod report;
pub mod sheet;
pub mod wire;

pub use attach::{LoopSplice, SheetAttach};
pub use preview::preview;
pub use report::{Annotation, BlendReport, BlendWarning, UnitFailure, WarningKind};
pub use sheet::{make_sheet, BlendSheet, SheetUnit};
pub use wire::{make_wire, IntersectionGraph, VertexHit};

use std::cell::RefCell;

use crate::attrib::blend_attribute;
use crate::error::{BlendError, BlendResult};
use crate::fit::FitOptions;
use crate::topo::{BodyId, EntityRef, TopoStore};

/// Tolerances and switches for one resolution call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendOptions {
    /// Geometric coincidence.
    pub tolerance: f64,
    /// Calibration curve fit.
    pub fit_tolerance: f64,
    /// Chordal error of marched surfaces.
    pub march_tolerance: f64,
    pub max_stations: usize,
    pub initial_stations: usize,
    /// Refuse units that would engulf model vertices instead of warning.
    pub retain_features: bool,
    pub patch_interior_tolerance: f64,
    pub patch_boundary_tolerance: f64,
    /// Resolve concave units first at mixed-convexity junctions.
    pub concave_first: bool,
}

impl Default for BlendOptions {
    fn default() -> Self {
        BlendOptions {
            tolerance: 1e-6,
            fit_tolerance: 1e-5,
            march_tolerance: 1e-4,
            max_stations: 256,
            initial_stations: 9,
            retain_features: false,
            patch_interior_tolerance: 1e-2,
            patch_boundary_tolerance: 1e-3,
            concave_first: true,
        }
    }
}

impl BlendOptions {
    pub(crate) fn fit_options(&self) -> FitOptions {
        FitOptions {
            tolerance: self.tolerance,
            march_tolerance: self.march_tolerance,
            initial_stations: self.initial_stations,
            max_stations: self.max_stations,
        }
    }

    /// Distance under which sheet and blank points are the same vertex.
    /// Marched springs are only as exact as the march.
    pub(crate) fn weld_tolerance(&self) -> f64 {
        self.tolerance.max(10.0 * self.march_tolerance)
    }
}

/// Options plus the annotation switch.
#[derive(Debug, Default)]
pub struct BlendContext {
    pub options: BlendOptions,
    annotations: RefCell<Vec<bool>>,
}

struct AnnotationScope<'a>(&'a RefCell<Vec<bool>>);

impl Drop for AnnotationScope<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().pop();
    }
}

impl BlendContext {
    pub fn new(options: BlendOptions) -> Self {
        BlendContext { options, annotations: RefCell::new(Vec::new()) }
    }

    /// Run `f` with annotations switched on or off. The previous setting
    /// comes back when `f` returns or unwinds.
    pub fn with_annotations<R>(&self, enabled: bool, f: impl FnOnce(&Self) -> R) -> R {
        self.annotations.borrow_mut().push(enabled);
        let _scope = AnnotationScope(&self.annotations);
        f(self)
    }

    pub fn annotations_enabled(&self) -> bool {
        self.annotations.borrow().last().copied().unwrap_or(false)
    }
}

/// Whether `body` carries anything to resolve.
pub(crate) fn has_pending_blends(store: &TopoStore, body: BodyId) -> BlendResult<bool> {
    for e in store.body_edges(body)? {
        if blend_attribute(store, e).is_some() {
            return Ok(true);
        }
    }
    Ok(!crate::attrib::entity_blend_owners(store, body).is_empty())
}

/// Abandon a phase-1 result. Everything `make_sheet` wrote, roll-on
/// propagation included, is undone.
pub fn discard_sheet(store: &mut TopoStore, sheet: BlendSheet) {
    log::debug!("discarding blend sheet {:?}", sheet.body);
    store.rollback_to(sheet.checkpoint);
}

/// Resolve every implicit blend on `body` in one call.
///
/// Units that cannot be resolved keep their attributes and are listed in
/// the report's failures; the rest are attached. A unit whose faces make
/// the splice fail is held back and the sheet rebuilt without it. A second
/// call with no attributes left does nothing.
pub fn fix_blends(
    store: &mut TopoStore,
    body: BodyId,
    ctx: &BlendContext,
) -> BlendResult<BlendReport> {
    fix_blends_using(store, body, ctx, &LoopSplice)
}

pub(crate) fn fix_blends_using(
    store: &mut TopoStore,
    body: BodyId,
    ctx: &BlendContext,
    attach: &dyn SheetAttach,
) -> BlendResult<BlendReport> {
    store.body(body)?;
    if !has_pending_blends(store, body)? {
        log::debug!("{body:?} has no implicit blends");
        return Ok(BlendReport::default());
    }
    let mut held: Vec<UnitFailure> = Vec::new();
    loop {
        let sheet = sheet::build_sheet(store, body, ctx, false, &held)?;
        if sheet.units.is_empty() {
            let report = sheet.report.clone();
            discard_sheet(store, sheet);
            return Ok(report);
        }
        let graph = make_wire(store, &sheet, ctx);
        let attached = graph
            .as_ref()
            .map_err(|e| e.clone())
            .and_then(|g| attach.attach(store, &sheet, g, ctx));
        let e = match attached {
            Ok(report) => return Ok(finish(store, sheet, report)),
            Err(e) => e,
        };
        let mut culprits = culprit_units(store, &sheet, graph.as_ref().ok(), &e);
        culprits.retain(|c| !held.iter().any(|h| h.entities == *c));
        discard_sheet(store, sheet);
        if culprits.is_empty() {
            log::warn!("attach failed, rolling back: {e}");
            return Err(e);
        }
        log::warn!("attach failed on {} unit(s), retrying without them: {e}", culprits.len());
        let failures =
            culprits.into_iter().map(|entities| UnitFailure { entities, error: e.clone() });

        held.extend(failures);
    }
}

/// Phase 3: splice the sheet into its blank.
pub fn complete(
    store: &mut TopoStore,
    sheet: BlendSheet,
    graph: IntersectionGraph,
    ctx: &BlendContext,
) -> BlendResult<BlendReport> {
    match LoopSplice.attach(store, &sheet, &graph, ctx) {
        Ok(report) => Ok(finish(store, sheet, report)),
        Err(e) => {
            log::warn!("attach failed, rolling back: {e}");
            store.rollback_to(sheet.checkpoint);
            Err(e)
        }
    }
}

fn finish(store: &mut TopoStore, sheet: BlendSheet, mut report: BlendReport) -> BlendReport {
    store.commit(sheet.checkpoint);
    let mut full = sheet.report;
    full.absorb(std::mem::take(&mut report));
    log::debug!("attached {} blend faces", full.faces.len());
    full
}

/// Sources of the sheet units an attach error can be pinned on. Entities
/// a unit owns outright are tried first; blank faces under its free edges
/// only when nothing else matches.
fn culprit_units(
    store: &TopoStore,
    sheet: &BlendSheet,
    graph: Option<&IntersectionGraph>,
    error: &BlendError,
) -> Vec<Vec<EntityRef>> {
    let named = error.entities();
    if named.is_empty() {
        return Vec::new();
    }
    let (own, near): (Vec<_>, Vec<_>) =
        sheet.units.iter().map(|u| footprint(store, sheet, graph, u)).unzip();
    let pick = |sets: &[Vec<EntityRef>]| -> Vec<Vec<EntityRef>> {
        sheet
            .units
            .iter()
            .zip(sets)
            .filter(|(_, set)| named.iter().any(|e| set.contains(e)))
            .map(|(u, _)| u.sources.clone())
            .collect()
    };
    let found = pick(&own);
    if found.is_empty() { pick(&near) } else { found }
}

/// Entities a unit owns, and the blank entities it lands on.
fn footprint(
    store: &TopoStore,
    sheet: &BlendSheet,
    graph: Option<&IntersectionGraph>,
    unit: &SheetUnit,
) -> (Vec<EntityRef>, Vec<EntityRef>) {
    let mut own: Vec<EntityRef> = unit.sources.clone();
    own.extend(entity_list(&unit.consumed_edges));
    own.extend(entity_list(&unit.consumed_vertices));
    own.extend(entity_list(&unit.faces));
    let mut near = Vec::new();
    for &f in &unit.faces {
        for e in store.face_edges(f).unwrap_or_default() {
            own.push(e.into());
            if let Ok(edge) = store.edge(e) {
                own.extend([EntityRef::Vertex(edge.start), EntityRef::Vertex(edge.end)]);
                for v in [edge.start, edge.end] {
                    match graph.and_then(|g| g.hit(v)) {
                        Some(VertexHit::Vertex(b)) => near.push(b.into()),
                        Some(VertexHit::Edge { edge, .. }) => near.push(edge.into()),
                        Some(VertexHit::Face(b)) => near.push(b.into()),
                        None => {}
                    }
                }
            }
            let hint =
                graph.and_then(|g| g.edge_faces.get(&e)).or_else(|| sheet.edge_hints.get(&e));
            near.extend(hint.map(|&b| EntityRef::Face(b)));
        }
    }
    (own, near)
}

pub(crate) fn entity_list<T: Into<EntityRef> + Copy>(items: &[T]) -> Vec<EntityRef> {
    items.iter().map(|&i| i.into()).collect()
}
