//! Camera frame acquisition.
//!
//! Every [`Camera`] runs its [`FrameSource`] on a dedicated thread that publishes the most recent
//! frame into a [`FrameSlot`]. [`StereoCameras`] pairs up the latest frames of two cameras for
//! tracking.

mod camera;
mod slot;
mod stereo;

pub use camera::{Camera, StopHandle};
pub use slot::{FrameSlot, Stamped};
pub use stereo::{StereoCameras, StereoPair, DEFAULT_MAX_SKEW};

use crate::resolution::Resolution;

/// A decoded camera frame.
///
/// The tracking engine never looks at pixel data itself (that is the [`HandDetector`]'s job), it
/// only needs to know the frame size to convert normalized landmark coordinates to pixels.
///
/// [`HandDetector`]: crate::tracker::HandDetector
pub trait Frame {
    fn resolution(&self) -> Resolution;
}

impl<F: Frame + ?Sized> Frame for std::sync::Arc<F> {
    fn resolution(&self) -> Resolution {
        (**self).resolution()
    }
}

/// A device or stream delivering frames.
///
/// If the source corrects lens distortion of its frames, it must also report the intrinsics of the
/// corrected frames to [`Camera::spawn`].
pub trait FrameSource: Send + 'static {
    type Frame: Frame + Send + Sync + 'static;

    /// Reads the next frame, blocking until one is available.
    ///
    /// An error permanently stops the [`Camera`] reading from this source.
    fn read(&mut self) -> anyhow::Result<Self::Frame>;
}
