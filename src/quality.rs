use serde::{Deserialize, Serialize};

/// Pose and eye state reported by the face detector for one crop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceQuality {
    /// Head rotation around the vertical axis, degrees.
    pub yaw: f32,
    /// Head tilt within the image plane, degrees.
    pub roll: f32,
    pub left_eye_open: Option<f32>,
    pub right_eye_open: Option<f32>,
}

/// Accepts only roughly frontal faces with both eyes open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityGate {
    pub max_yaw: f32,
    pub max_roll: f32,
    pub min_eye_open: f32,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            max_yaw: 15.0,
            max_roll: 15.0,
            min_eye_open: 0.5,
        }
    }
}

impl QualityGate {
    pub fn accepts(&self, face: &FaceQuality) -> bool {
        if face.yaw.abs() > self.max_yaw || face.roll.abs() > self.max_roll {
            return false;
        }
        // unknown eye state counts as closed
        face.left_eye_open.unwrap_or(0.0) > self.min_eye_open
            && face.right_eye_open.unwrap_or(0.0) > self.min_eye_open
    }
}
