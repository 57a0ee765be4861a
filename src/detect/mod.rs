//! Detection adapter.
//!
//! Wraps pretrained-detector inference behind one `DetectorBackend`
//! trait. Backends receive letterboxed frames and return raw detections
//! in the padded input coordinate space; callers map them back to source
//! coordinates with the letterbox transform.
//!
//! Two interchangeable strategies exist behind the same trait: a single
//! multiclass model, or a legacy person-model + object-model pair that
//! merges both outputs. Selection is configuration, not divergent code
//! paths. A backend whose session failed to construct stays "not ready"
//! and yields empty detection lists instead of erroring past the
//! classifier boundary.

pub mod backend;
pub mod backends;
pub mod decode;
pub mod letterbox;
pub mod result;

pub use backend::DetectorBackend;
pub use backends::stub::{ScriptedDetector, StubDetector};
#[cfg(feature = "backend-tract")]
pub use backends::tract::TractDetector;
pub use letterbox::{letterbox, LetterboxTransform};
pub use result::{DetectionBox, RawDetection};
