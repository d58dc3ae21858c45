use std::time::Duration;

use crate::triangulation::{StereoExtrinsics, StereoRig};

use super::{Camera, Stamped, StopHandle};

/// Maximum capture time difference of two frames that are tracked as a stereo pair.
pub const DEFAULT_MAX_SKEW: Duration = Duration::from_millis(20);

/// Two frames, one per camera, captured at (roughly) the same time.
#[derive(Debug)]
pub struct StereoPair<F> {
    pub left: Stamped<F>,
    pub right: Stamped<F>,
}

impl<F> StereoPair<F> {
    /// Capture time difference between the two frames.
    pub fn skew(&self) -> Duration {
        abs_diff(&self.left, &self.right)
    }
}

fn abs_diff<F>(a: &Stamped<F>, b: &Stamped<F>) -> Duration {
    let (a, b) = (a.captured_at(), b.captured_at());
    a.saturating_duration_since(b)
        .max(b.saturating_duration_since(a))
}

/// Decides whether the latest frames of two cameras form a new stereo pair.
#[derive(Debug, Clone)]
struct Pairing {
    max_skew: Duration,
    last: Option<(u64, u64)>,
}

impl Pairing {
    fn pair<F>(
        &mut self,
        left: Option<Stamped<F>>,
        right: Option<Stamped<F>>,
    ) -> Option<StereoPair<F>> {
        let (left, right) = (left?, right?);
        if let Some((last_left, last_right)) = self.last {
            if left.seq() <= last_left || right.seq() <= last_right {
                return None;
            }
        }

        let pair = StereoPair { left, right };
        if pair.skew() > self.max_skew {
            // Wait for the lagging camera to deliver a newer frame.
            log::trace!(
                "frames {}/{} too far apart ({:?})",
                pair.left.seq(),
                pair.right.seq(),
                pair.skew()
            );
            return None;
        }

        self.last = Some((pair.left.seq(), pair.right.seq()));
        Some(pair)
    }
}

/// A left and right [`Camera`] whose frames are tracked together.
///
/// The left camera is the reference camera of the stereo rig.
pub struct StereoCameras<F> {
    left: Camera<F>,
    right: Camera<F>,
    pairing: Pairing,
}

impl<F> StereoCameras<F> {
    pub fn new(left: Camera<F>, right: Camera<F>) -> Self {
        Self {
            left,
            right,
            pairing: Pairing {
                max_skew: DEFAULT_MAX_SKEW,
                last: None,
            },
        }
    }

    /// Sets the maximum capture time difference between paired frames.
    pub fn with_max_skew(mut self, max_skew: Duration) -> Self {
        self.set_max_skew(max_skew);
        self
    }

    pub fn set_max_skew(&mut self, max_skew: Duration) {
        self.pairing.max_skew = max_skew;
    }

    pub fn max_skew(&self) -> Duration {
        self.pairing.max_skew
    }

    pub fn left(&self) -> &Camera<F> {
        &self.left
    }

    pub fn right(&self) -> &Camera<F> {
        &self.right
    }

    /// Returns whether both cameras are still capturing.
    pub fn is_running(&self) -> bool {
        self.left.is_running() && self.right.is_running()
    }

    /// Stops both cameras.
    pub fn stop(&self) {
        self.left.stop();
        self.right.stop();
    }

    /// Returns a handle stopping both cameras, usable after `self` was moved to another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.left.stop_handle().join(self.right.stop_handle())
    }

    /// Builds the calibrated stereo rig of these cameras.
    pub fn rig(&self, extrinsics: StereoExtrinsics) -> StereoRig {
        StereoRig::new(
            self.left.intrinsics().clone(),
            self.right.intrinsics().clone(),
            extrinsics,
        )
    }

    /// Returns the latest frame of each camera if they form a new stereo pair.
    ///
    /// A pair is only returned if both cameras have captured a frame since the last returned pair,
    /// and if the two frames were captured at most the configured skew apart. Otherwise, returns
    /// [`None`] and the caller is expected to poll again later.
    pub fn next_pair(&mut self) -> Option<StereoPair<F>> {
        self.pairing.pair(self.left.snapshot(), self.right.snapshot())
    }
}
