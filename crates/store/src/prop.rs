use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A value held by a store prop or used as an effect dependency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PropValue {
    Scalar(f32),
    Vector3(Vec3),
    Vector4(Vec4),
    Matrix4(Mat4),
    Flag(bool),
}

impl PropValue {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Vector3(_) => "vector3",
            Self::Vector4(_) => "vector4",
            Self::Matrix4(_) => "matrix4",
            Self::Flag(_) => "flag",
        }
    }

    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector3(&self) -> Option<Vec3> {
        match self {
            Self::Vector3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector4(&self) -> Option<Vec4> {
        match self {
            Self::Vector4(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_matrix4(&self) -> Option<Mat4> {
        match self {
            Self::Matrix4(m) => Some(*m),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub(crate) fn same_kind(&self, other: &PropValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl From<f32> for PropValue {
    fn from(v: f32) -> Self {
        Self::Scalar(v)
    }
}

impl From<Vec3> for PropValue {
    fn from(v: Vec3) -> Self {
        Self::Vector3(v)
    }
}

impl From<Vec4> for PropValue {
    fn from(v: Vec4) -> Self {
        Self::Vector4(v)
    }
}

impl From<Mat4> for PropValue {
    fn from(m: Mat4) -> Self {
        Self::Matrix4(m)
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        Self::Flag(b)
    }
}

/// Pure function restricting a prop's incoming value to a valid range or set.
#[derive(Clone)]
pub struct Clamp(Arc<dyn Fn(PropValue) -> PropValue + Send + Sync>);

impl Clamp {
    pub fn custom(f: impl Fn(PropValue) -> PropValue + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Clamp scalars, and vectors component-wise, into `[min, max]`.
    /// Matrices and flags pass through.
    pub fn range(min: f32, max: f32) -> Self {
        Self::custom(move |value| match value {
            PropValue::Scalar(v) => PropValue::Scalar(v.max(min).min(max)),
            PropValue::Vector3(v) => {
                PropValue::Vector3(v.max(Vec3::splat(min)).min(Vec3::splat(max)))
            }
            PropValue::Vector4(v) => {
                PropValue::Vector4(v.max(Vec4::splat(min)).min(Vec4::splat(max)))
            }
            other => other,
        })
    }

    pub fn at_least(min: f32) -> Self {
        Self::range(min, f32::INFINITY)
    }

    /// `[0, 1]`, for colors and factors.
    pub fn unit() -> Self {
        Self::range(0.0, 1.0)
    }

    pub fn apply(&self, value: PropValue) -> PropValue {
        (self.0)(value)
    }
}

impl std::fmt::Debug for Clamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Clamp(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_clamps_scalars_and_vectors() {
        let c = Clamp::range(1.0, 179.0);
        assert_eq!(c.apply(PropValue::Scalar(500.0)), PropValue::Scalar(179.0));
        assert_eq!(c.apply(PropValue::Scalar(-3.0)), PropValue::Scalar(1.0));

        let unit = Clamp::unit();
        assert_eq!(
            unit.apply(Vec4::new(2.0, -1.0, 0.5, 1.0).into()),
            PropValue::Vector4(Vec4::new(1.0, 0.0, 0.5, 1.0))
        );
    }

    #[test]
    fn range_ignores_matrices_and_flags() {
        let c = Clamp::unit();
        let m = Mat4::from_scale(Vec3::splat(5.0));
        assert_eq!(c.apply(m.into()), PropValue::Matrix4(m));
        assert_eq!(c.apply(true.into()), PropValue::Flag(true));
    }

    #[test]
    fn at_least_has_no_upper_bound() {
        let c = Clamp::at_least(0.1);
        assert_eq!(c.apply(PropValue::Scalar(1e6)), PropValue::Scalar(1e6));
        assert_eq!(c.apply(PropValue::Scalar(0.0)), PropValue::Scalar(0.1));
    }

    #[test]
    fn accessors_match_variant() {
        let v = PropValue::from(Vec3::X);
        assert_eq!(v.as_vector3(), Some(Vec3::X));
        assert_eq!(v.as_scalar(), None);
        assert_eq!(v.kind(), "vector3");
        assert!(v.same_kind(&PropValue::Vector3(Vec3::ZERO)));
        assert!(!v.same_kind(&PropValue::Scalar(0.0)));
    }
}
