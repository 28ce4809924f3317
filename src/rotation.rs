//! Coordinate frame bookkeeping between the inertial (NED) frame and the body frame.
//!
//! Rotations follow the Z-Y-X (yaw, pitch, roll) Euler convention.
//! The direction cosine matrix maps inertial vectors into the body frame and
//! its inverse maps body vectors back into the inertial frame.

use core::f32::consts::{PI, TAU};
use nalgebra::{Matrix3, Vector3};
#[cfg(not(feature = "std"))]
use num_traits::Float;

use crate::error::MathError;

/// Vectors shorter than this cannot be normalized.
const MIN_NORM: f32 = 1e-6;

/// Unit vectors whose cross product is shorter than this are treated as parallel.
const PARALLEL_EPSILON: f32 = 1e-6;

/// Roll, pitch and yaw angles in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Attitude {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl Attitude {
    pub const fn new(roll: f32, pitch: f32, yaw: f32) -> Self {
        Self { roll, pitch, yaw }
    }

    pub fn is_finite(&self) -> bool {
        self.roll.is_finite() && self.pitch.is_finite() && self.yaw.is_finite()
    }
}

/// Direction cosine matrix and its inverse for the current attitude estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationTransform {
    dcm: Matrix3<f32>,
    dcm_inv: Matrix3<f32>,
}

impl Default for RotationTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationTransform {
    /// Create a transform with both matrices set to identity.
    pub fn new() -> Self {
        Self {
            dcm: Matrix3::identity(),
            dcm_inv: Matrix3::identity(),
        }
    }

    /// Rebuild the matrices from the latest fused attitude.
    ///
    /// The matrix is recomputed wholesale instead of integrated,
    /// so the inverse is always the exact transpose.
    pub fn update(&mut self, attitude: Attitude) {
        self.dcm = direction_cosine_matrix(attitude);
        self.dcm_inv = self.dcm.transpose();
    }

    /// The matrix transforming from the inertial frame to the body frame.
    pub fn dcm(&self) -> &Matrix3<f32> {
        &self.dcm
    }

    /// The matrix transforming from the body frame to the inertial frame.
    pub fn inverse(&self) -> &Matrix3<f32> {
        &self.dcm_inv
    }

    pub fn to_body(&self, inertial: &Vector3<f32>) -> Vector3<f32> {
        self.dcm * inertial
    }

    pub fn to_inertial(&self, body: &Vector3<f32>) -> Vector3<f32> {
        self.dcm_inv * body
    }
}

/// Calculate the Z-Y-X direction cosine matrix (inertial to body) for an attitude.
pub fn direction_cosine_matrix(attitude: Attitude) -> Matrix3<f32> {
    let (sr, cr) = attitude.roll.sin_cos();
    let (sp, cp) = attitude.pitch.sin_cos();
    let (sy, cy) = attitude.yaw.sin_cos();

    Matrix3::new(
        cp * cy,
        cp * sy,
        -sp,
        -cr * sy + sr * sp * cy,
        cr * cy + sr * sp * sy,
        sr * cp,
        sr * sy + cr * sp * cy,
        -sr * cy + cr * sp * sy,
        cr * cp,
    )
}

/// Cross product of two 3D vectors.
pub fn cross(lhs: &Vector3<f32>, rhs: &Vector3<f32>) -> Vector3<f32> {
    Vector3::new(
        lhs.y * rhs.z - lhs.z * rhs.y,
        lhs.z * rhs.x - lhs.x * rhs.z,
        lhs.x * rhs.y - lhs.y * rhs.x,
    )
}

/// Scale a vector to unit length.
pub fn normalize(v: &Vector3<f32>) -> Result<Vector3<f32>, MathError> {
    let norm = v.dot(v).sqrt();
    if !norm.is_finite() || norm < MIN_NORM {
        return Err(MathError::ZeroLength);
    }
    Ok(v / norm)
}

/// Calculate the attitude that rotates the inertial magnetic field onto the body frame reading.
///
/// The rotation is found in axis-angle form: the axis is the normalized cross product
/// from the inertial reference to the body reading and the angle is the one between the
/// two unit vectors. Euler angles are then extracted from the rotation matrix elements.
///
/// A single vector cannot observe rotation about itself, so the result is the smallest
/// rotation explaining the reading. Parallel vectors yield the identity attitude and
/// anti-parallel vectors are rejected since the axis is undefined.
pub fn attitude_from_magnetometer(
    body_reading: &Vector3<f32>,
    inertial_reference: &Vector3<f32>,
) -> Result<Attitude, MathError> {
    let body = normalize(body_reading)?;
    let inertial = normalize(inertial_reference)?;

    let dot = inertial.dot(&body).clamp(-1., 1.);
    let axis = cross(&inertial, &body);
    let axis_norm = axis.dot(&axis).sqrt();
    if axis_norm < PARALLEL_EPSILON {
        return if dot > 0. {
            Ok(Attitude::default())
        } else {
            Err(MathError::AntiParallel)
        };
    }
    let axis = normalize(&axis)?;

    // Equal to acos(dot) but well conditioned for small rotations
    let angle = axis_norm.atan2(dot);
    let (sin, cos) = angle.sin_cos();
    let versine = 1. - cos;

    let r11 = cos + axis.x * axis.x * versine;
    let r12 = axis.x * axis.y * versine - axis.z * sin;
    let r13 = axis.x * axis.z * versine + axis.y * sin;
    let r23 = axis.y * axis.z * versine - axis.x * sin;
    let r33 = cos + axis.z * axis.z * versine;

    Ok(Attitude::new(
        r23.atan2(r33),
        (-r13).clamp(-1., 1.).asin(),
        r12.atan2(r11),
    ))
}

/// Calculate roll and pitch from the gravity direction measured in the body frame.
///
/// `gravity` points down when the vehicle is level, i.e. `(0, 0, g)` at rest.
/// Yaw is unobservable from gravity and is returned as zero.
pub fn attitude_from_accelerometer(gravity: &Vector3<f32>) -> Result<Attitude, MathError> {
    let g = normalize(gravity)?;
    let roll = g.y.atan2(g.z);
    let pitch = (-g.x).atan2((g.y * g.y + g.z * g.z).sqrt());
    Ok(Attitude::new(roll, pitch, 0.))
}

/// Calculate yaw from a magnetometer reading once roll and pitch are known.
///
/// The reading is rotated back to level with `tilt` and yaw is the angle between the
/// horizontal parts of the leveled reading and the inertial reference.
/// Fails if either horizontal part vanishes, where heading is undefined.
pub fn yaw_from_magnetometer(
    body_reading: &Vector3<f32>,
    inertial_reference: &Vector3<f32>,
    tilt: Attitude,
) -> Result<f32, MathError> {
    let body = normalize(body_reading)?;
    let inertial = normalize(inertial_reference)?;

    let leveling = direction_cosine_matrix(Attitude::new(tilt.roll, tilt.pitch, 0.)).transpose();
    let level = leveling * body;
    if level.x.hypot(level.y) < MIN_NORM || inertial.x.hypot(inertial.y) < MIN_NORM {
        return Err(MathError::ZeroLength);
    }

    Ok(wrap_pi(inertial.y.atan2(inertial.x) - level.y.atan2(level.x)))
}

/// Wrap an angle to [0, 2PI).
pub fn wrap_2pi(angle: f32) -> f32 {
    let wrapped = angle % TAU;
    let wrapped = if wrapped < 0. { wrapped + TAU } else { wrapped };
    // Adding TAU to a tiny negative remainder can round up to TAU itself
    if wrapped >= TAU {
        0.
    } else {
        wrapped
    }
}

/// Wrap an angle to (-PI, PI].
pub fn wrap_pi(angle: f32) -> f32 {
    let wrapped = wrap_2pi(angle);
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    const ANGLES: [f32; 7] = [-1.4, -0.9, -0.3, 0., 0.25, 0.8, 1.3];

    fn malmo_field() -> Vector3<f32> {
        Vector3::new(17.2, 0.9, 46.9)
    }

    #[test]
    fn starts_at_identity() {
        let transform = RotationTransform::new();
        assert_eq!(transform.dcm(), &Matrix3::identity());
        assert_eq!(transform.inverse(), &Matrix3::identity());
    }

    #[test]
    fn dcm_is_orthonormal() {
        let mut transform = RotationTransform::new();
        for roll in ANGLES {
            for pitch in ANGLES {
                for yaw in ANGLES {
                    transform.update(Attitude::new(roll, pitch, yaw));

                    assert_eq!(transform.inverse(), &transform.dcm().transpose());
                    assert_relative_eq!(
                        transform.dcm() * transform.inverse(),
                        Matrix3::identity(),
                        epsilon = 1e-5
                    );
                    assert_relative_eq!(transform.dcm().determinant(), 1., epsilon = 1e-5);
                }
            }
        }
    }

    #[test]
    fn frame_conversions_invert_each_other() {
        let mut transform = RotationTransform::new();
        transform.update(Attitude::new(0.3, -0.2, 2.1));

        let v = Vector3::new(1., -2., 0.5);
        let back = transform.to_inertial(&transform.to_body(&v));
        assert_relative_eq!(back, v, epsilon = 1e-5);
    }

    #[test]
    fn pure_yaw_moves_north_onto_negative_body_y() {
        let dcm = direction_cosine_matrix(Attitude::new(0., 0., core::f32::consts::FRAC_PI_2));
        let north_in_body = dcm * Vector3::x();
        assert_relative_eq!(north_in_body, Vector3::new(0., -1., 0.), epsilon = 1e-6);
    }

    #[test]
    fn cross_product() {
        assert_eq!(cross(&Vector3::x(), &Vector3::y()), Vector3::z());
        assert_eq!(cross(&Vector3::y(), &Vector3::x()), -Vector3::z());

        let a = Vector3::new(1., 2., 3.);
        let b = Vector3::new(-4., 0.5, 2.);
        assert_relative_eq!(cross(&a, &b), a.cross(&b), epsilon = 1e-6);
    }

    #[test]
    fn normalize_rejects_zero_length() {
        assert_eq!(normalize(&Vector3::zeros()), Err(MathError::ZeroLength));
        assert_eq!(
            normalize(&Vector3::new(f32::NAN, 0., 1.)),
            Err(MathError::ZeroLength)
        );
        assert_relative_eq!(
            normalize(&Vector3::new(3., 4., 0.)).unwrap(),
            Vector3::new(0.6, 0.8, 0.),
            epsilon = 1e-6
        );
    }

    #[test]
    fn aligned_magnetometer_is_level() {
        let field = malmo_field();
        let attitude = attitude_from_magnetometer(&(field * 0.5), &field).unwrap();
        assert_eq!(attitude, Attitude::default());
    }

    #[test]
    fn anti_parallel_magnetometer_is_rejected() {
        let field = malmo_field();
        assert_eq!(
            attitude_from_magnetometer(&-field, &field),
            Err(MathError::AntiParallel)
        );
        assert_eq!(
            attitude_from_magnetometer(&Vector3::zeros(), &field),
            Err(MathError::ZeroLength)
        );
    }

    #[test]
    fn magnetometer_recovers_single_axis_rotations() {
        for angle in [-1.2f32, -0.4, 0.1, 0.7, 1.4] {
            // Yaw and pitch rotate a north-pointing field about an axis perpendicular to it
            for (attitude, reference) in [
                (Attitude::new(0., 0., angle), Vector3::x()),
                (Attitude::new(0., angle, 0.), Vector3::x()),
                (Attitude::new(angle, 0., 0.), Vector3::y()),
            ] {
                let body = direction_cosine_matrix(attitude) * reference;
                let recovered = attitude_from_magnetometer(&body, &reference).unwrap();

                assert_abs_diff_eq!(recovered.roll, attitude.roll, epsilon = 1e-4);
                assert_abs_diff_eq!(recovered.pitch, attitude.pitch, epsilon = 1e-4);
                assert_abs_diff_eq!(recovered.yaw, attitude.yaw, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn magnetometer_attitude_explains_reading() {
        let field = malmo_field();
        for roll in ANGLES {
            for pitch in [-1.0f32, -0.3, 0.2, 0.9] {
                for yaw in ANGLES {
                    let body = direction_cosine_matrix(Attitude::new(roll, pitch, yaw)) * field;
                    let recovered = attitude_from_magnetometer(&body, &field).unwrap();

                    let predicted = direction_cosine_matrix(recovered) * normalize(&field).unwrap();
                    assert_relative_eq!(predicted, normalize(&body).unwrap(), epsilon = 1e-4);
                }
            }
        }
    }

    #[test]
    fn accelerometer_recovers_tilt() {
        for roll in [-1.2f32, -0.5, 0., 0.4, 1.1] {
            for pitch in [-1.2f32, -0.5, 0., 0.4, 1.1] {
                let gravity =
                    direction_cosine_matrix(Attitude::new(roll, pitch, 0.7)) * Vector3::z() * 9.81;
                let tilt = attitude_from_accelerometer(&gravity).unwrap();

                assert_abs_diff_eq!(tilt.roll, roll, epsilon = 1e-4);
                assert_abs_diff_eq!(tilt.pitch, pitch, epsilon = 1e-4);
                assert_eq!(tilt.yaw, 0.);
            }
        }
    }

    #[test]
    fn tilt_compensated_yaw() {
        let field = malmo_field();
        for roll in [-0.8f32, -0.3, 0., 0.3, 0.8] {
            for pitch in [-0.8f32, -0.2, 0., 0.5] {
                for yaw in ANGLES {
                    let body = direction_cosine_matrix(Attitude::new(roll, pitch, yaw)) * field;
                    let tilt = Attitude::new(roll, pitch, 0.);

                    let recovered = yaw_from_magnetometer(&body, &field, tilt).unwrap();
                    assert_abs_diff_eq!(recovered, yaw, epsilon = 1e-4);
                }
            }
        }

        // A vertical field carries no heading
        assert_eq!(
            yaw_from_magnetometer(&Vector3::z(), &field, Attitude::default()),
            Err(MathError::ZeroLength)
        );
    }

    #[test]
    fn wraps_angles() {
        assert_abs_diff_eq!(wrap_pi(3. * PI / 2.), -PI / 2., epsilon = 1e-5);
        assert_abs_diff_eq!(wrap_pi(-3. * PI / 2.), PI / 2., epsilon = 1e-5);
        assert_abs_diff_eq!(wrap_pi(0.5), 0.5);
        assert_abs_diff_eq!(wrap_2pi(-PI / 2.), 3. * PI / 2., epsilon = 1e-5);
        assert!((0. ..TAU).contains(&wrap_2pi(-1e-9)));
    }
}
