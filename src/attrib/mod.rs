//! Blend attributes: the persistent record of blend intent.
//!
//! Implicit attributes describe a requested round, chamfer, variable
//! blend, vertex blend, entity-entity blend or junction instruction and are
//! owned by the edge, vertex or face they apply to. Resolution replaces
//! them with `ExplicitBlend` records on the new blend faces.

pub mod explicit;
pub mod set;

pub use explicit::{explicit_blend, ExplicitBlend, ExplicitKind};
pub use set::*;

use crate::math::Point3;
use crate::nurbs::NurbsCurve3;
use crate::radius::{RadiusFunction, RadiusValue};
use crate::topo::{EdgeId, EntityRef};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Convexity {
    Convex,
    Concave,
    Tangent,
    Knife,
    Unknown,
}

/// Setback at one end of an edge blend.
///
/// With `diff_set` the left and right setbacks are `value ∓ diff/2`;
/// otherwise they are derived from neighbouring blends during resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Setback {
    pub value: f64,
    pub diff: f64,
    pub diff_set: bool,
}

impl Default for Setback {
    fn default() -> Self {
        Setback { value: 0.0, diff: 0.0, diff_set: false }
    }
}

impl Setback {
    pub fn explicit(value: f64, diff: f64) -> Self {
        Setback { value, diff, diff_set: true }
    }

    pub fn left(&self) -> f64 {
        self.value - self.diff / 2.0
    }

    pub fn right(&self) -> f64 {
        self.value + self.diff / 2.0
    }

    /// Rebuild from left/right setbacks.
    pub fn from_sides(left: f64, right: f64) -> Self {
        Setback::explicit((left + right) / 2.0, right - left)
    }

    /// The same setback seen with left and right exchanged.
    pub fn mirrored(&self) -> Self {
        Setback { diff: -self.diff, ..*self }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendHow {
    #[default]
    Default,
    PreferRollOn,
}

/// End conditions shared by all edge blend kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BlendEnds {
    pub start_setback: Setback,
    pub end_setback: Setback,
    pub start_stop_angle: Option<f64>,
    pub end_stop_angle: Option<f64>,
    pub blend_how: BlendHow,
}

impl BlendEnds {
    /// Ends seen from the other end of the edge.
    pub fn reversed(&self) -> Self {
        BlendEnds {
            start_setback: self.end_setback.mirrored(),
            end_setback: self.start_setback.mirrored(),
            start_stop_angle: self.end_stop_angle,
            end_stop_angle: self.start_stop_angle,
            blend_how: self.blend_how,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CrossSection {
    #[default]
    Circular,
    RotatedEllipse,
}

/// Reparametrisation of a multi-edge sequence as one spine.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    pub curve: NurbsCurve3,
    pub first_edge: EdgeId,
    pub last_edge: EdgeId,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Continuity {
    #[default]
    Unset,
    Position,
    Slope,
    Curvature,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VertexProperty {
    #[default]
    Cap,
    RollOn,
    Runout,
    Cusp,
    BiBlend,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AutoSetback {
    #[default]
    Unset,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    RollOn,
    Cap,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BlendKind {
    ConstRound {
        radius: f64,
    },
    ConstChamfer {
        left_range: f64,
        right_range: f64,
    },
    VariableBlend {
        start_radius: f64,
        end_radius: f64,
        function: Option<RadiusFunction>,
        calibration: Option<Calibration>,
        cross_section: CrossSection,
    },
    VertexBlend {
        bulge: f64,
        continuity: Continuity,
        property: VertexProperty,
        auto_setback: AutoSetback,
    },
    EntityEntity {
        supports: [EntityRef; 2],
        help_point: Point3,
        function: RadiusFunction,
    },
    Instruction {
        directive: Directive,
        anchor: Point3,
    },
}

/// Compatibility class used when grouping edges into sequences: a constant
/// round and a variable blend are both rounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFamily {
    Round,
    Chamfer,
    Vertex,
    EntityEntity,
    Instruction,
}

/// Key under which an attribute is stored on its owner. The three edge
/// blend kinds share one slot, so a new round replaces an old chamfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeSlot {
    EdgeBlend,
    VertexBlend,
    EntityEntity,
    Instruction,
    Explicit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlendAttribute {
    pub kind: BlendKind,
    pub convexity: Convexity,
    pub ends: BlendEnds,
    pub owner: EntityRef,
}

impl BlendAttribute {
    pub fn family(&self) -> BlendFamily {
        match self.kind {
            BlendKind::ConstRound { .. } | BlendKind::VariableBlend { .. } => BlendFamily::Round,
            BlendKind::ConstChamfer { .. } => BlendFamily::Chamfer,
            BlendKind::VertexBlend { .. } => BlendFamily::Vertex,
            BlendKind::EntityEntity { .. } => BlendFamily::EntityEntity,
            BlendKind::Instruction { .. } => BlendFamily::Instruction,
        }
    }

    pub fn slot(&self) -> AttributeSlot {
        match self.kind {
            BlendKind::ConstRound { .. }
            | BlendKind::ConstChamfer { .. }
            | BlendKind::VariableBlend { .. } => AttributeSlot::EdgeBlend,
            BlendKind::VertexBlend { .. } => AttributeSlot::VertexBlend,
            BlendKind::EntityEntity { .. } => AttributeSlot::EntityEntity,
            BlendKind::Instruction { .. } => AttributeSlot::Instruction,
        }
    }

    /// Radius along the owning edge, in the edge's own direction.
    pub fn radius_function(&self) -> Option<RadiusFunction> {
        match &self.kind {
            BlendKind::ConstRound { radius } => Some(RadiusFunction::Constant(*radius)),
            BlendKind::VariableBlend { start_radius, end_radius, function, .. } => match function {
                Some(f) => Some(f.clone()),
                None => RadiusFunction::linear(*start_radius, *end_radius).ok(),
            },
            BlendKind::EntityEntity { function, .. } => Some(function.clone()),
            _ => None,
        }
    }

    pub fn continuity(&self) -> Option<Continuity> {
        match self.kind {
            BlendKind::VertexBlend { continuity, .. } => Some(continuity),
            _ => None,
        }
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        match &self.kind {
            BlendKind::VariableBlend { calibration, .. } => calibration.as_ref(),
            _ => None,
        }
    }

    pub fn cross_section(&self) -> CrossSection {
        match &self.kind {
            BlendKind::VariableBlend { cross_section, .. } => *cross_section,
            _ => CrossSection::Circular,
        }
    }

    /// Roller size at the start (`at_start`) or end of the owning edge.
    pub fn end_radius(&self, at_start: bool) -> Option<RadiusValue> {
        let t = if at_start { 0.0 } else { 1.0 };
        match &self.kind {
            BlendKind::ConstChamfer { left_range, right_range } => {
                Some(RadiusValue::Circular(0.5 * (left_range + right_range)))
            }
            _ => self.radius_function().map(|f| f.evaluate(t)),
        }
    }

    /// The attribute as it reads when its edge is traversed backwards:
    /// left/right and start/end are exchanged.
    pub fn reversed(&self) -> Self {
        let kind = match &self.kind {
            BlendKind::ConstChamfer { left_range, right_range } => {
                BlendKind::ConstChamfer { left_range: *right_range, right_range: *left_range }
            }
            BlendKind::VariableBlend {
                start_radius,
                end_radius,
                function,
                calibration,
                cross_section,
            } => BlendKind::VariableBlend {
                start_radius: *end_radius,
                end_radius: *start_radius,
                function: function.as_ref().map(RadiusFunction::reversed),
                calibration: calibration.clone(),
                cross_section: *cross_section,
            },
            other => other.clone(),
        };
        BlendAttribute {
            kind,
            convexity: self.convexity,
            ends: self.ends.reversed(),
            owner: self.owner,
        }

    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Attribute {
    Implicit(BlendAttribute),
    Explicit(ExplicitBlend),
}

impl Attribute {
    pub fn slot(&self) -> AttributeSlot {
        match self {
            Attribute::Implicit(a) => a.slot(),
            Attribute::Explicit(_) => AttributeSlot::Explicit,
        }
    }

    pub fn as_implicit(&self) -> Option<&BlendAttribute> {
        match self {
            Attribute::Implicit(a) => Some(a),
            Attribute::Explicit(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topo::EdgeId;

    fn chamfer() -> BlendAttribute {
        BlendAttribute {
            kind: BlendKind::ConstChamfer { left_range: 1.0, right_range: 2.0 },
            convexity: Convexity::Convex,
            ends: BlendEnds {
                start_setback: Setback::explicit(3.0, 1.0),
                end_stop_angle: Some(0.2),
                ..BlendEnds::default()
            },
            owner: EntityRef::Edge(EdgeId(0)),
        }
    }

    #[test]
    fn reversal_swaps_sides_and_ends() {
        let a = chamfer();
        let r = a.reversed();
        assert_eq!(r.kind, BlendKind::ConstChamfer { left_range: 2.0, right_range: 1.0 });
        assert_eq!(r.ends.end_setback.diff, -1.0);
        assert_eq!(r.ends.start_stop_angle, Some(0.2));
        assert_eq!(r.reversed(), a);
    }

    #[test]
    fn setback_sides() {
        let s = Setback::explicit(4.0, 2.0);
        assert_eq!((s.left(), s.right()), (3.0, 5.0));
        assert_eq!(s.mirrored().left(), 5.0);
    }

    #[test]
    fn round_and_variable_share_a_family() {
        let round = BlendAttribute { kind: BlendKind::ConstRound { radius: 2.0 }, ..chamfer() };
        let var = BlendAttribute {
            kind: BlendKind::VariableBlend {
                start_radius: 2.0,
                end_radius: 4.0,
                function: None,
                calibration: None,
                cross_section: CrossSection::Circular,
            },
            ..chamfer()
        };
        assert_eq!(round.family(), var.family());
        assert_eq!(round.slot(), AttributeSlot::EdgeBlend);
        assert_eq!(var.end_radius(false), Some(RadiusValue::Circular(4.0)));
    }
}
