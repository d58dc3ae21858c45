//! Landmark trackers: a [`FilterBank`] plus the data it is fed with.
//!
//! [`Tracker2D`] smooths the landmarks a [`HandDetector`] finds in a single camera's frames.
//! [`Tracker3D`] smooths triangulated 3D positions.
//!
//! [`FilterBank`]: crate::filter::FilterBank

mod image_plane;
mod space;

pub use image_plane::Tracker2D;
pub use space::Tracker3D;

use crate::landmark::Landmarks;
use crate::video::Frame;

/// A hand landmark detector for a single camera.
///
/// Detectors are external collaborators (typically a neural network). They find at most one hand
/// per frame.
pub trait HandDetector: Send {
    /// The frame type this detector processes.
    type Frame: Frame;

    /// Detects the landmarks of a hand in `frame`.
    ///
    /// Returns either the normalized image coordinates (`[0, 1]` on both axes) of every landmark,
    /// in landmark order, or [`None`] if no hand was found.
    fn process(&mut self, frame: &Self::Frame) -> Option<Vec<[f32; 2]>>;
}

impl<D: HandDetector + ?Sized> HandDetector for Box<D> {
    type Frame = D::Frame;

    fn process(&mut self, frame: &Self::Frame) -> Option<Vec<[f32; 2]>> {
        (**self).process(frame)
    }
}

/// Result of running a detector on a single frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// A hand was found. Landmarks are normalized image coordinates with `z = 0`.
    Detected(Landmarks),
    /// No hand was found in the frame. This is expected during normal operation.
    Missed,
}

impl Detection {
    pub fn is_detected(&self) -> bool {
        matches!(self, Detection::Detected(_))
    }

    /// Returns the detected landmarks, if any.
    pub fn landmarks(&self) -> Option<&Landmarks> {
        match self {
            Detection::Detected(lms) => Some(lms),
            Detection::Missed => None,
        }
    }

    pub fn into_landmarks(self) -> Option<Landmarks> {
        match self {
            Detection::Detected(lms) => Some(lms),
            Detection::Missed => None,
        }
    }
}
