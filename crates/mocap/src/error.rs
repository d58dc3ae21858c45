//! Error type of the tracking engine.

use std::fmt;

use crate::pipeline::Phase;

/// Failures reported by filters, trackers, triangulation and the pipeline state machine.
///
/// Missing detections are *not* errors, they are reported as
/// [`Detection::Missed`][crate::tracker::Detection::Missed].
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingError {
    /// A filter stage was used before its bootstrap finished.
    NotReady { stage: &'static str },
    /// A filter bank was initialized from an empty sample history.
    EmptyHistory,
    /// A filter bank was initialized for zero landmarks.
    NoLandmarks,
    /// A noise profile was requested from a history buffer that is not full yet.
    HistoryNotFull { len: usize, capacity: usize },
    /// A set of landmarks did not have the expected number of entries.
    LandmarkCountMismatch { expected: usize, actual: usize },
    /// The two views of a landmark do not determine a unique, finite 3D point.
    DegenerateTriangulation { landmark: usize },
    /// The innovation covariance of a Kalman filter could not be inverted.
    SingularInnovation,
    /// The bootstrap did not collect enough simultaneous detections in time.
    BootstrapStalled {
        phase: Phase,
        collected: usize,
        attempts: u32,
    },
    /// An operation was invoked in a pipeline phase that does not allow it.
    InvalidPhase { phase: Phase },
}

impl fmt::Display for TrackingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingError::NotReady { stage } => {
                write!(f, "{stage} is not initialized, run the bootstrap first")
            }
            TrackingError::EmptyHistory => {
                f.write_str("cannot initialize filters from an empty history")
            }
            TrackingError::NoLandmarks => f.write_str("cannot track zero landmarks"),
            TrackingError::HistoryNotFull { len, capacity } => write!(
                f,
                "not enough history to compute measurement noise ({len} of {capacity} samples)"
            ),
            TrackingError::LandmarkCountMismatch { expected, actual } => {
                write!(f, "expected {expected} landmarks, got {actual}")
            }
            TrackingError::DegenerateTriangulation { landmark } => {
                write!(f, "triangulation of landmark {landmark} is degenerate")
            }
            TrackingError::SingularInnovation => {
                f.write_str("innovation covariance of the kalman filter is singular")
            }
            TrackingError::BootstrapStalled {
                phase,
                collected,
                attempts,
            } => write!(
                f,
                "bootstrap stalled in phase {phase:?}: {collected} samples after {attempts} attempts"
            ),
            TrackingError::InvalidPhase { phase } => {
                write!(f, "operation not allowed in phase {phase:?}")
            }
        }
    }
}

impl TrackingError {
    /// Returns whether this error only invalidates the frame pair it was raised for.
    ///
    /// Such errors are caused by a single bad detection or an unlucky geometric configuration.
    /// The run loops skip the frame and carry on.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            TrackingError::LandmarkCountMismatch { .. }
                | TrackingError::DegenerateTriangulation { .. }
        )
    }
}

impl std::error::Error for TrackingError {}
