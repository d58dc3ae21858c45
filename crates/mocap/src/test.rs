//! Synthetic scenes for unit tests.

use std::collections::VecDeque;

use nalgebra::{Matrix3, Point3, Vector3};

use crate::landmark::HAND_LANDMARK_COUNT;
use crate::resolution::Resolution;
use crate::tracker::HandDetector;
use crate::triangulation::{project, CameraIntrinsics, StereoExtrinsics, StereoRig};
use crate::video::Frame;

/// A frame that carries the landmarks a detector should find in it.
#[derive(Debug, Clone)]
pub struct TestFrame {
    pub resolution: Resolution,
    pub hand: Option<Vec<[f32; 2]>>,
}

impl Default for TestFrame {
    fn default() -> Self {
        Self {
            resolution: Resolution::VGA,
            hand: None,
        }
    }
}

impl Frame for TestFrame {
    fn resolution(&self) -> Resolution {
        self.resolution
    }
}

/// Returns predetermined results, regardless of the frame contents.
pub struct ScriptedDetector {
    script: VecDeque<Option<Vec<[f32; 2]>>>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Option<Vec<[f32; 2]>>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl HandDetector for ScriptedDetector {
    type Frame = TestFrame;

    fn process(&mut self, _: &TestFrame) -> Option<Vec<[f32; 2]>> {
        self.script.pop_front().flatten()
    }
}

/// "Detects" the landmarks stored in a [`TestFrame`].
pub struct FrameDetector;

impl HandDetector for FrameDetector {
    type Frame = TestFrame;

    fn process(&mut self, frame: &TestFrame) -> Option<Vec<[f32; 2]>> {
        frame.hand.clone()
    }
}

/// Two parallel VGA cameras, 10 cm apart.
pub fn rig() -> StereoRig {
    let cam = CameraIntrinsics::pinhole(800.0, 800.0, 320.0, 240.0);
    StereoRig::new(
        cam.clone(),
        cam,
        StereoExtrinsics::from_right_camera_center(Matrix3::identity(), Vector3::new(0.1, 0.0, 0.0)),
    )
}

/// A flat-ish hand of 21 landmarks spread over about 10 cm around `center`.
pub fn hand(center: Point3<f64>) -> Vec<Point3<f64>> {
    (0..HAND_LANDMARK_COUNT)
        .map(|i| {
            center
                + Vector3::new(
                    (i % 5) as f64 * 0.025 - 0.05,
                    (i / 5) as f64 * 0.02 - 0.04,
                    (i % 3) as f64 * 0.01 - 0.01,
                )
        })
        .collect()
}

/// Renders a hand into a pair of [`TestFrame`]s, adding detection noise.
pub struct Scene {
    rig: StereoRig,
    rng: fastrand::Rng,
    /// Standard deviation-ish amplitude of the pixel noise.
    noise_px: f64,
}

impl Scene {
    pub fn new(seed: u64) -> Self {
        Self {
            rig: rig(),
            rng: fastrand::Rng::with_seed(seed),
            noise_px: 0.5,
        }
    }

    pub fn rig(&self) -> &StereoRig {
        &self.rig
    }

    pub fn frames(&mut self, points: &[Point3<f64>]) -> (TestFrame, TestFrame) {
        self.frames_with(points, true, true)
    }

    /// Renders `points`, hiding the hand from the cameras that do not `see` it.
    pub fn frames_with(
        &mut self,
        points: &[Point3<f64>],
        left_sees: bool,
        right_sees: bool,
    ) -> (TestFrame, TestFrame) {
        let res = Resolution::VGA;
        let left = left_sees.then(|| self.detect(points, true, res));
        let right = right_sees.then(|| self.detect(points, false, res));
        (
            TestFrame {
                resolution: res,
                hand: left,
            },
            TestFrame {
                resolution: res,
                hand: right,
            },
        )
    }

    fn detect(&mut self, points: &[Point3<f64>], left: bool, res: Resolution) -> Vec<[f32; 2]> {
        let projection = if left {
            *self.rig.left_projection()
        } else {
            *self.rig.right_projection()
        };
        points
            .iter()
            .map(|p| {
                let px = project(&projection, p).expect("point on principal plane");
                let nx = (self.rng.f64() - 0.5) * 2.0 * self.noise_px;
                let ny = (self.rng.f64() - 0.5) * 2.0 * self.noise_px;
                [
                    ((px.x + nx) / f64::from(res.width())) as f32,
                    ((px.y + ny) / f64::from(res.height())) as f32,
                ]
            })
            .collect()
    }
}
