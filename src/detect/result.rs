use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// Raw detector output in model input coordinates.
///
/// Center-format box plus confidence and class id, exactly as decoded
/// from the output tensor. Not yet mapped to source-frame coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RawDetection {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub conf: f32,
    pub cls_id: i32,
}

/// A confidence-scored box in source-frame coordinates.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DetectionBox {
    pub rect: Rect,
    /// Confidence in 0..=1.
    pub conf: f32,
    pub cls_id: i32,
    pub cls_name: String,
}
