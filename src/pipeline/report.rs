//! Diagnostics collected over one resolution call.

use crate::error::BlendError;
use crate::topo::{EntityRef, FaceId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarningKind {
    /// A roll-on request found no tangent edge and was capped instead.
    RollOnFallback,
    /// A mixed-convexity junction was not resolved concave first.
    OrderingMisuse,
    /// Marching stopped at the station limit.
    StationLimit,
    /// The blend engulfs model vertices.
    FeatureLoss,
    /// An entity-entity blend was given overlapping supports.
    OverlappingSupports,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlendWarning {
    pub kind: WarningKind,
    pub entities: Vec<EntityRef>,
    pub message: String,
}

/// A unit that could not be resolved; its attributes are left in place.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitFailure {
    pub entities: Vec<EntityRef>,
    pub error: BlendError,
}

/// Maps a new entity to the blank entities it replaces.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub entity: EntityRef,
    pub replaces: Vec<EntityRef>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlendReport {
    /// Source entities of every resolved unit.
    pub resolved: Vec<Vec<EntityRef>>,
    pub faces: Vec<FaceId>,
    pub failures: Vec<UnitFailure>,
    pub warnings: Vec<BlendWarning>,
    pub annotations: Vec<Annotation>,
}

impl BlendReport {
    pub(crate) fn warn(
        &mut self,
        kind: WarningKind,
        entities: Vec<EntityRef>,
        message: impl Into<String>,
    ) {

        let message = message.into();
        log::warn!("{kind:?}: {message} ({entities:?})");
        self.warnings.push(BlendWarning { kind, entities, message });
    }

    pub(crate) fn fail(&mut self, entities: Vec<EntityRef>, error: BlendError) {
        log::debug!("unit {entities:?} failed: {error}");
        self.failures.push(UnitFailure { entities, error });
    }

    pub fn has_warning(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }

    /// No failures and no warnings.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.warnings.is_empty()
    }

    pub(crate) fn absorb(&mut self, other: BlendReport) {
        self.resolved.extend(other.resolved);
        self.faces.extend(other.faces);
        self.failures.extend(other.failures);
        self.warnings.extend(other.warnings);
        self.annotations.extend(other.annotations);
    }
}
