//! Animatable value types
//!
//! Linear interpolation for plain numbers and for the numeric and
//! structured [`Value`]s held by properties.

use smallvec::SmallVec;
use tether_core::Value;

/// Trait for values that can be linearly interpolated
pub trait Interpolate: Clone {
    /// Linearly interpolate between self and other by factor t (0.0 to 1.0)
    fn lerp(&self, other: &Self, t: f64) -> Self;

    /// Check if two values are approximately equal
    fn approx_eq(&self, other: &Self, epsilon: f64) -> bool;
}

// ============================================================================
// f64 Implementation
// ============================================================================

impl Interpolate for f64 {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        self + (other - self) * t
    }

    fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        (self - other).abs() < epsilon
    }
}

// ============================================================================
// Value Implementation
// ============================================================================

/// Numbers interpolate as reals and groups of the same kind field by field.
/// Anything else steps to `other` once `t` reaches 1.
impl Interpolate for Value {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        match (self, other) {
            (Value::Group(a_kind, a), Value::Group(b_kind, b)) if a_kind == b_kind => {
                let fields: SmallVec<[f64; 4]> =
                    a.iter().zip(b.iter()).map(|(x, y)| x.lerp(y, t)).collect();
                Value::Group(*a_kind, fields)
            }
            _ => match (self.as_real(), other.as_real()) {
                (Some(a), Some(b)) => Value::Real(a.lerp(&b, t)),
                _ if t >= 1.0 => other.clone(),
                _ => self.clone(),
            },
        }
    }

    fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        match (self, other) {
            (Value::Group(a_kind, a), Value::Group(b_kind, b)) => {
                a_kind == b_kind && a.iter().zip(b.iter()).all(|(x, y)| x.approx_eq(y, epsilon))
            }
            _ => match (self.as_real(), other.as_real()) {
                (Some(a), Some(b)) => a.approx_eq(&b, epsilon),
                _ => self == other,
            },
        }
    }
}

/// Whether a value can be animated by interpolation
pub fn is_animatable(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Real(_) | Value::Group(..))
}
