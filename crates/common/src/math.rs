//! Thin helpers over glam for the operations the scene graph relies on.
//!
//! Degenerate inputs never panic: they log a warning and fall back to a
//! defined value so the frame loop keeps running.

use glam::{Mat3, Mat4, Quat, Vec3};

/// Nudge applied to a look direction that is parallel to the up axis.
const LOOK_EPSILON: f32 = 1e-4;

/// Determinants below this are treated as singular.
const SINGULAR_DETERMINANT: f32 = 1e-12;

/// Errors from component-indexed math access.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MathError {
    #[error("component index {index} out of range for a {len}-component value")]
    ComponentOutOfRange { index: usize, len: usize },
}

/// Compose a local matrix from translation, rotation and scale (T * R * S).
pub fn compose(position: Vec3, rotation: Quat, scale: Vec3) -> Mat4 {
    Mat4::from_scale_rotation_translation(scale, rotation, position)
}

/// Split a matrix back into translation, rotation and scale.
///
/// When the matrix has a negative determinant the sign lands on the x scale.
pub fn decompose(matrix: &Mat4) -> (Vec3, Quat, Vec3) {
    let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
    (translation, rotation, scale)
}

/// Invert a matrix, falling back to identity when it is singular.
pub fn safe_inverse(matrix: &Mat4) -> Mat4 {
    let det = matrix.determinant();
    if det.abs() <= SINGULAR_DETERMINANT || !det.is_finite() {
        tracing::warn!(det, "singular matrix inverted, using identity");
        return Mat4::IDENTITY;
    }
    matrix.inverse()
}

/// Normalize a vector, returning zero for a zero-length input.
pub fn safe_normalize(v: Vec3) -> Vec3 {
    let len_sq = v.length_squared();
    if len_sq <= f32::EPSILON * f32::EPSILON || !len_sq.is_finite() {
        tracing::warn!(?v, "normalizing zero-length vector");
        return Vec3::ZERO;
    }
    v / len_sq.sqrt()
}

/// Rotation whose -Z axis points from `eye` toward `target`.
///
/// If the direction is parallel to `up`, the direction is nudged by a small
/// epsilon so the basis stays well defined.
pub fn look_rotation(eye: Vec3, target: Vec3, up: Vec3) -> Quat {
    let mut z = eye - target;
    if z.length_squared() == 0.0 {
        z.z = 1.0;
    }
    z = z.normalize();

    let mut x = up.cross(z);
    if x.length_squared() == 0.0 {
        if (up.z.abs() - 1.0).abs() < f32::EPSILON {
            z.x += LOOK_EPSILON;
        } else {
            z.z += LOOK_EPSILON;
        }
        z = z.normalize();
        x = up.cross(z);
    }
    x = x.normalize();
    let y = z.cross(x);

    Quat::from_mat3(&Mat3::from_cols(x, y, z)).normalize()
}

/// Rotation part of a world matrix.
pub fn extract_rotation(matrix: &Mat4) -> Quat {
    decompose(matrix).1
}

/// Translation part of a matrix.
pub fn extract_translation(matrix: &Mat4) -> Vec3 {
    matrix.w_axis.truncate()
}

/// Read one component of a vector by index.
pub fn component(v: Vec3, index: usize) -> Result<f32, MathError> {
    match index {
        0 => Ok(v.x),
        1 => Ok(v.y),
        2 => Ok(v.z),
        _ => Err(MathError::ComponentOutOfRange { index, len: 3 }),
    }
}

/// Write one component of a vector by index.
pub fn set_component(v: &mut Vec3, index: usize, value: f32) -> Result<(), MathError> {
    match index {
        0 => v.x = value,
        1 => v.y = value,
        2 => v.z = value,
        _ => return Err(MathError::ComponentOutOfRange { index, len: 3 }),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::EulerRot;

    fn quat_eq_up_to_sign(a: Quat, b: Quat) -> bool {
        a.abs_diff_eq(b, 1e-4) || a.abs_diff_eq(-b, 1e-4)
    }

    #[test]
    fn compose_decompose_round_trip() {
        let samples = [
            (Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY, Vec3::ONE),
            (
                Vec3::new(-4.0, 0.5, 9.0),
                Quat::from_euler(EulerRot::XYZ, 0.3, -1.2, 2.0),
                Vec3::new(2.0, 3.0, 0.5),
            ),
            (
                Vec3::ZERO,
                Quat::from_axis_angle(Vec3::new(1.0, 1.0, 0.0).normalize(), 2.5),
                Vec3::splat(0.25),
            ),
        ];

        for (p, q, s) in samples {
            let (p2, q2, s2) = decompose(&compose(p, q, s));
            assert!(p2.abs_diff_eq(p, 1e-4), "{p2:?} != {p:?}");
            assert!(s2.abs_diff_eq(s.abs(), 1e-4), "{s2:?} != {s:?}");
            assert!(quat_eq_up_to_sign(q2, q), "{q2:?} != {q:?}");
        }
    }

    #[test]
    fn negative_scale_flips_first_axis() {
        let m = compose(Vec3::ZERO, Quat::IDENTITY, Vec3::new(-2.0, 1.0, 1.0));
        let (_, _, s) = decompose(&m);
        assert!((s.x.abs() - 2.0).abs() < 1e-4);
        assert!((s.y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn singular_inverse_falls_back_to_identity() {
        let singular = Mat4::from_scale(Vec3::new(0.0, 1.0, 1.0));
        assert_eq!(safe_inverse(&singular), Mat4::IDENTITY);
    }

    #[test]
    fn regular_inverse_matches_glam() {
        let m = compose(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(0.7), Vec3::ONE);
        assert!((safe_inverse(&m) * m).abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn zero_vector_normalizes_to_zero() {
        assert_eq!(safe_normalize(Vec3::ZERO), Vec3::ZERO);
        let n = safe_normalize(Vec3::new(3.0, 0.0, 4.0));
        assert!((n.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn look_rotation_points_negative_z_at_target() {
        let q = look_rotation(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), Vec3::Y);
        let forward = q * Vec3::NEG_Z;
        assert!(forward.abs_diff_eq(Vec3::X, 1e-4), "{forward:?}");
    }

    #[test]
    fn look_rotation_parallel_to_up_is_finite() {
        let q = look_rotation(Vec3::ZERO, Vec3::new(0.0, 5.0, 0.0), Vec3::Y);
        assert!(q.is_finite());
        let forward = q * Vec3::NEG_Z;
        assert!(forward.y > 0.99);
    }

    #[test]
    fn component_access() {
        let mut v = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(component(v, 2), Ok(3.0));
        assert_eq!(
            component(v, 3),
            Err(MathError::ComponentOutOfRange { index: 3, len: 3 })
        );
        set_component(&mut v, 0, 9.0).unwrap();
        assert_eq!(v.x, 9.0);
        assert!(set_component(&mut v, 5, 1.0).is_err());
    }
}
