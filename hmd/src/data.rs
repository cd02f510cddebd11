use hmd_traits::Quaternion;
use std::fmt;

/// Head orientation in degrees, decomposed yaw (Y), pitch (X), roll (Z).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrientationSample {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl OrientationSample {
    pub fn from_rotation(rotation: Quaternion) -> Self {
        let (yaw, pitch, roll) = rotation.yaw_pitch_roll();
        OrientationSample {
            yaw: yaw.to_degrees(),
            pitch: pitch.to_degrees(),
            roll: roll.to_degrees(),
        }
    }
}

impl fmt::Display for OrientationSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "yaw: {:.3}, pitch: {:.3}, roll: {:.3}", self.yaw, self.pitch, self.roll)
    }
}
