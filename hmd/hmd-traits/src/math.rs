use std::f32::consts::FRAC_PI_2;
use std::fmt;
use std::ops::Mul;

/// How close to ±1 the middle-axis sine may get before the decomposition
/// is treated as gimbal locked.
pub const SINGULARITY_RADIUS: f32 = 1e-7;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Vector3 { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn scale(&self, s: f32) -> Self {
        Vector3::new(self.x * s, self.y * s, self.z * s)
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector3(x={}, y={}, z={})", self.x, self.y, self.z)
    }
}

/// Coordinate axis, in the right-handed convention: X right, Y up, Z towards the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion::identity()
    }
}

impl fmt::Display for Quaternion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Quaternion(w={}, x={}, y={}, z={})", self.w, self.x, self.y, self.z)
    }
}

impl Mul for Quaternion {
    type Output = Quaternion;

    fn mul(self, rhs: Quaternion) -> Quaternion {
        Quaternion {
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        }
    }
}

impl Quaternion {
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Quaternion { w, x, y, z }
    }

    pub fn identity() -> Self {
        Quaternion { w: 1.0, x: 0.0, y: 0.0, z: 0.0 }
    }

    /// Rotation of `angle` radians about `axis`. The axis does not need to be normalized.
    pub fn from_axis_angle(axis: Vector3, angle: f32) -> Self {
        let len = axis.length();
        if len == 0.0 {
            return Quaternion::identity();
        }
        let (s, c) = (angle * 0.5).sin_cos();
        let k = s / len;
        Quaternion { w: c, x: axis.x * k, y: axis.y * k, z: axis.z * k }
    }

    pub fn conjugate(&self) -> Self {
        Quaternion { w: self.w, x: -self.x, y: -self.y, z: -self.z }
    }

    pub fn norm(&self) -> f32 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn normalized(&self) -> Self {
        let n = self.norm();
        if n == 0.0 {
            return Quaternion::identity();
        }
        Quaternion { w: self.w / n, x: self.x / n, y: self.y / n, z: self.z / n }
    }

    pub fn rotate(&self, v: Vector3) -> Vector3 {
        let p = Quaternion { w: 0.0, x: v.x, y: v.y, z: v.z };
        let r = *self * p * self.conjugate();
        Vector3::new(r.x, r.y, r.z)
    }

    /// Decomposes the rotation into three angles (radians) about `a1`, `a2`
    /// and `a3`, applied in that order, for a right-handed system with
    /// counter-clockwise positive rotations.
    ///
    /// Near the poles of the middle axis the first angle is pinned to zero
    /// and the whole rotation about the first and third axes is reported on
    /// the third.
    pub fn euler_angles(&self, a1: Axis, a2: Axis, a3: Axis) -> (f32, f32, f32) {
        let q = [self.x, self.y, self.z];
        let (q1, q2, q3) = (q[a1 as usize], q[a2 as usize], q[a3 as usize]);
        let w = self.w;

        let ww = w * w;
        let q11 = q1 * q1;
        let q22 = q2 * q2;
        let q33 = q3 * q3;

        // +1 for an even permutation of the axes, -1 for an odd one.
        let (i1, i2, i3) = (a1 as usize, a2 as usize, a3 as usize);
        let psign = if (i1 + 1) % 3 == i2 && (i2 + 1) % 3 == i3 { 1.0 } else { -1.0 };

        let s2 = psign * 2.0 * (psign * w * q2 + q1 * q3);

        if s2 < -1.0 + SINGULARITY_RADIUS {
            let c = (2.0 * (psign * q1 * q2 + w * q3)).atan2(ww + q22 - q11 - q33);
            (0.0, -FRAC_PI_2, c)
        } else if s2 > 1.0 - SINGULARITY_RADIUS {
            let c = (2.0 * (psign * q1 * q2 + w * q3)).atan2(ww + q22 - q11 - q33);
            (0.0, FRAC_PI_2, c)
        } else {
            let a = -(-2.0 * (w * q1 - psign * q2 * q3)).atan2(ww + q33 - q11 - q22);
            let b = s2.asin();
            let c = (2.0 * (w * q3 - psign * q1 * q2)).atan2(ww + q11 - q22 - q33);
            (a, b, c)
        }
    }

    /// Yaw about Y (up), pitch about X (right), roll about Z (forward), in radians.
    pub fn yaw_pitch_roll(&self) -> (f32, f32, f32) {
        self.euler_angles(Axis::Y, Axis::X, Axis::Z)
    }

    /// Advances the orientation by a body-frame angular velocity (rad/s)
    /// held constant for `dt` seconds.
    pub fn integrate(&self, angular_velocity: Vector3, dt: f32) -> Self {
        let rate = angular_velocity.length();
        let angle = rate * dt;
        if rate == 0.0 || angle == 0.0 {
            return *self;
        }
        (*self * Quaternion::from_axis_angle(angular_velocity, angle)).normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3 as NaVector3};

    fn from_nalgebra(q: UnitQuaternion<f32>) -> Quaternion {
        Quaternion::new(q.w, q.i, q.j, q.k)
    }

    #[test]
    fn test_identity_has_zero_angles() {
        let (yaw, pitch, roll) = Quaternion::identity().yaw_pitch_roll();
        assert_relative_eq!(yaw, 0.0);
        assert_relative_eq!(pitch, 0.0);
        assert_relative_eq!(roll, 0.0);
    }

    #[test]
    fn test_single_axis_rotations() {
        let angle = 0.6;
        let about = |axis: Vector3| Quaternion::from_axis_angle(axis, angle);

        let (yaw, pitch, roll) = about(Vector3::new(0.0, 1.0, 0.0)).yaw_pitch_roll();
        assert_relative_eq!(yaw, angle, epsilon = 1e-6);
        assert_relative_eq!(pitch, 0.0, epsilon = 1e-6);
        assert_relative_eq!(roll, 0.0, epsilon = 1e-6);

        let (yaw, pitch, roll) = about(Vector3::new(1.0, 0.0, 0.0)).yaw_pitch_roll();
        assert_relative_eq!(yaw, 0.0, epsilon = 1e-6);
        assert_relative_eq!(pitch, angle, epsilon = 1e-6);
        assert_relative_eq!(roll, 0.0, epsilon = 1e-6);

        let (yaw, pitch, roll) = about(Vector3::new(0.0, 0.0, 1.0)).yaw_pitch_roll();
        assert_relative_eq!(yaw, 0.0, epsilon = 1e-6);
        assert_relative_eq!(pitch, 0.0, epsilon = 1e-6);
        assert_relative_eq!(roll, angle, epsilon = 1e-6);
    }

    #[test]
    fn test_composed_rotation_matches_yxz_order() {
        let (yaw, pitch, roll) = (0.7_f32, -0.4_f32, 0.25_f32);
        let q = UnitQuaternion::from_axis_angle(&NaVector3::y_axis(), yaw)
            * UnitQuaternion::from_axis_angle(&NaVector3::x_axis(), pitch)
            * UnitQuaternion::from_axis_angle(&NaVector3::z_axis(), roll);

        let (y, p, r) = from_nalgebra(q).yaw_pitch_roll();
        assert_relative_eq!(y, yaw, epsilon = 1e-5);
        assert_relative_eq!(p, pitch, epsilon = 1e-5);
        assert_relative_eq!(r, roll, epsilon = 1e-5);
    }

    #[test]
    fn test_even_permutation_order() {
        let (a, b, c) = (0.3_f32, 0.5_f32, -1.1_f32);
        let q = UnitQuaternion::from_axis_angle(&NaVector3::x_axis(), a)
            * UnitQuaternion::from_axis_angle(&NaVector3::y_axis(), b)
            * UnitQuaternion::from_axis_angle(&NaVector3::z_axis(), c);

        let (x, y, z) = from_nalgebra(q).euler_angles(Axis::X, Axis::Y, Axis::Z);
        assert_relative_eq!(x, a, epsilon = 1e-5);
        assert_relative_eq!(y, b, epsilon = 1e-5);
        assert_relative_eq!(z, c, epsilon = 1e-5);
    }

    #[test]
    fn test_gimbal_lock_pins_first_angle() {
        // Slightly unnormalized so the middle-axis sine lands just above 1.
        let q = Quaternion::new(0.707_106_8, 0.707_106_8, 0.0, 0.0);
        let (yaw, pitch, roll) = q.yaw_pitch_roll();
        assert_eq!(yaw, 0.0);
        assert_eq!(pitch, FRAC_PI_2);
        assert_relative_eq!(roll, 0.0, epsilon = 1e-6);

        let (yaw, pitch, _) = q.conjugate().yaw_pitch_roll();
        assert_eq!(yaw, 0.0);
        assert_eq!(pitch, -FRAC_PI_2);
    }

    #[test]
    fn test_rotate_matches_nalgebra() {
        let na = UnitQuaternion::from_euler_angles(0.2_f32, -0.3, 0.9);
        let v = NaVector3::new(0.0_f32, 0.0, -1.0);
        let expected = na * v;
        let actual = from_nalgebra(na).rotate(Vector3::new(v.x, v.y, v.z));
        assert_relative_eq!(actual.x, expected.x, epsilon = 1e-5);
        assert_relative_eq!(actual.y, expected.y, epsilon = 1e-5);
        assert_relative_eq!(actual.z, expected.z, epsilon = 1e-5);
    }

    #[test]
    fn test_integrate_without_motion_is_unchanged() {
        let q = Quaternion::from_axis_angle(Vector3::new(1.0, 2.0, 3.0), 0.4);
        assert_eq!(q.integrate(Vector3::default(), 0.05), q);
        assert_eq!(q.integrate(Vector3::new(1.0, 0.0, 0.0), 0.0), q);
    }

    #[test]
    fn test_integrate_constant_yaw_rate() {
        let q = Quaternion::identity().integrate(Vector3::new(0.0, 2.0, 0.0), 0.25);
        let (yaw, pitch, roll) = q.yaw_pitch_roll();
        assert_relative_eq!(yaw, 0.5, epsilon = 1e-6);
        assert_relative_eq!(pitch, 0.0, epsilon = 1e-6);
        assert_relative_eq!(roll, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normalized_zero_falls_back_to_identity() {
        assert_eq!(Quaternion::new(0.0, 0.0, 0.0, 0.0).normalized(), Quaternion::identity());
        assert_relative_eq!(Quaternion::new(2.0, 0.0, 0.0, 0.0).normalized().w, 1.0);
    }
}
