//! Error type shared by every fallible blend operation.

use crate::topo::EntityRef;

/// Errors reported by the blend engine.
///
/// Input-validation variants are returned before any store mutation.
/// Geometric variants are reported per blend unit and do not abort other
/// units of the same call. `TopologyCorrupted` is fatal and always comes
/// with a rollback.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum BlendError {
    #[error("invalid radius or range {value}")]
    InvalidRadius { value: f64, entities: Vec<EntityRef> },

    #[error("bulge {value} is outside [0, 2]")]
    InvalidBulge { value: f64, entities: Vec<EntityRef> },

    #[error("invalid radius function: {reason}")]
    InvalidRadiusFunction { reason: String },

    #[error("radius control parameters must be strictly increasing")]
    UnsortedRadiusParameters,

    #[error("{0:?} does not exist")]
    EntityNotFound(EntityRef),

    #[error("{0:?} carries no implicit edge blend")]
    NotAnEdgeBlend(EntityRef),

    #[error("offset {radius} exceeds the local radius of curvature")]
    CurvatureExceeded { radius: f64, entities: Vec<EntityRef> },

    #[error("cross-section solve did not converge at spine parameter {param}")]
    SectionDidNotConverge { param: f64, entities: Vec<EntityRef> },

    #[error("holdline radius root-find did not converge at spine parameter {param}")]
    HoldlineDidNotConverge { param: f64, entities: Vec<EntityRef> },

    #[error("unsupported topology: {reason}")]
    UnsupportedTopology { reason: String, entities: Vec<EntityRef> },

    #[error("blend would engulf model features")]
    FeatureLoss { entities: Vec<EntityRef> },

    #[error("entity-entity blend supports overlap")]
    OverlappingSupports { entities: Vec<EntityRef> },

    #[error("topology corrupted: {reason}")]
    TopologyCorrupted { reason: String, entities: Vec<EntityRef> },
}

impl BlendError {
    /// The offending entities, when the failure can be pinned to any.
    pub fn entities(&self) -> Vec<EntityRef> {
        match self {
            BlendError::InvalidRadius { entities, .. }
            | BlendError::InvalidBulge { entities, .. }
            | BlendError::CurvatureExceeded { entities, .. }
            | BlendError::SectionDidNotConverge { entities, .. }
            | BlendError::HoldlineDidNotConverge { entities, .. }
            | BlendError::UnsupportedTopology { entities, .. }
            | BlendError::FeatureLoss { entities }
            | BlendError::OverlappingSupports { entities }
            | BlendError::TopologyCorrupted { entities, .. } => entities.clone(),
            BlendError::EntityNotFound(e) | BlendError::NotAnEdgeBlend(e) => vec![*e],
            BlendError::InvalidRadiusFunction { .. } | BlendError::UnsortedRadiusParameters => {
                Vec::new()
            }
        }
    }

    /// True for input-validation failures, which never touch the store.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            BlendError::InvalidRadius { .. }
                | BlendError::InvalidBulge { .. }
                | BlendError::InvalidRadiusFunction { .. }
                | BlendError::UnsortedRadiusParameters
                | BlendError::EntityNotFound(_)
                | BlendError::NotAnEdgeBlend(_)
        )
    }

    pub(crate) fn unsupported(reason: impl Into<String>, entities: Vec<EntityRef>) -> Self {
        BlendError::UnsupportedTopology { reason: reason.into(), entities }
    }

    /// Attach entities to a variant that was raised without context.
    pub(crate) fn with_entities(self, extra: &[EntityRef]) -> Self {
        let merge = |mut v: Vec<EntityRef>| {
            for e in extra {
                if !v.contains(e) {
                    v.push(*e);
                }
            }
            v
        };
        match self {
            BlendError::InvalidRadius { value, entities } => {
                BlendError::InvalidRadius { value, entities: merge(entities) }
            }
            BlendError::CurvatureExceeded { radius, entities } => {
                BlendError::CurvatureExceeded { radius, entities: merge(entities) }
            }
            BlendError::SectionDidNotConverge { param, entities } => {
                BlendError::SectionDidNotConverge { param, entities: merge(entities) }
            }
            BlendError::HoldlineDidNotConverge { param, entities } => {
                BlendError::HoldlineDidNotConverge { param, entities: merge(entities) }
            }
            BlendError::UnsupportedTopology { reason, entities } => {
                BlendError::UnsupportedTopology { reason, entities: merge(entities) }
            }
            other => other,
        }
    }
}

pub type BlendResult<T> = Result<T, BlendError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topo::{EdgeId, VertexId};

    #[test]
    fn entities_lists_context() {
        let entities = vec![EntityRef::Edge(EdgeId(3))];
        let err = BlendError::InvalidRadius { value: -1.0, entities };

        assert_eq!(err.entities(), vec![EntityRef::Edge(EdgeId(3))]);
        assert!(err.is_input_error());
        assert_eq!(BlendError::EntityNotFound(EntityRef::Vertex(VertexId(1))).entities().len(), 1);
    }

    #[test]
    fn with_entities_merges_without_duplicates() {
        let e = EntityRef::Edge(EdgeId(1));
        let err = BlendError::SectionDidNotConverge { param: 0.5, entities: vec![e] };
        let err = err.with_entities(&[e, EntityRef::Edge(EdgeId(2))]);
        assert_eq!(err.entities().len(), 2);
        assert!(!err.is_input_error());
        assert!(err.to_string().contains("0.5"));
    }
}
