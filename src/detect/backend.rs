use anyhow::Result;

use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// Implementations receive a letterboxed square frame matching their
/// declared input size and return raw detections in that coordinate
/// space. The inference call is synchronous and is the dominant blocking
/// operation per frame; any internal worker threading is opaque to the
/// caller.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Square model input size in pixels.
    fn input_size(&self) -> u32;

    /// False when session construction failed. Not-ready backends must
    /// return empty detection lists from `infer`, never an error.
    fn is_ready(&self) -> bool {
        true
    }

    /// Run detection on a letterboxed frame.
    ///
    /// Callers must treat an empty result as valid (possibly degraded)
    /// output, not as an error.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;
}
