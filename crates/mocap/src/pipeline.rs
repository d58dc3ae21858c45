//! End-to-end stereo tracking: bootstrap state machine and steady-state frame processing.
//!
//! # Bootstrap
//!
//! Before any filter can run, the pipeline samples the measurement noise of every landmark. The
//! user holds their hand still in front of both cameras while the pipeline runs two passes:
//!
//! 1. [`Phase::Calibrating2D`]: raw detections of both cameras are collected until
//!    `history_size` frames had a hand in both views. The two [`Tracker2D`]s are initialized from
//!    them.
//! 2. [`Phase::Calibrating3D`]: detections are now filtered by the 2D trackers and triangulated.
//!    Once `history_size` frames were triangulated, the [`Tracker3D`] is initialized from them.
//!
//! The pipeline is then [`Phase::Ready`] and switches to [`Phase::Running`] with the first tracked
//! frame.
//!
//! # Missed detections
//!
//! A frame in which one or both cameras do not see the hand is handled according to the
//! configured [`MissPolicy`], see [`plan_frame`].

mod config;

pub use config::{PipelineConfig, DEFAULT_MAX_PREDICTED_FRAMES};

use std::thread::{self, JoinHandle};

use anyhow::{bail, Context};
use nalgebra::Point2;

use crate::error::TrackingError;
use crate::filter::FilterParams;
use crate::landmark::Landmarks;
use crate::output::Emitter;
use crate::timer::{FpsCounter, Timer};
use crate::tracker::{Detection, HandDetector, Tracker2D, Tracker3D};
use crate::triangulation::StereoRig;
use crate::video::{Frame, StereoCameras};

/// Lifecycle phase of a [`StereoTrackingPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No bootstrap has been started yet.
    Idle,
    /// Collecting raw detections to initialize the 2D trackers.
    Calibrating2D,
    /// Collecting triangulated positions to initialize the 3D tracker.
    Calibrating3D,
    /// All trackers are initialized, no frame has been tracked yet.
    Ready,
    /// Frames are being tracked.
    Running,
}

impl Phase {
    pub fn is_calibrating(self) -> bool {
        matches!(self, Phase::Calibrating2D | Phase::Calibrating3D)
    }

    /// Returns whether frames can be tracked in this phase.
    pub fn is_tracking(self) -> bool {
        matches!(self, Phase::Ready | Phase::Running)
    }
}

/// How the pipeline handles frames in which a camera did not detect the hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissPolicy {
    /// Drop every frame in which either camera missed the hand. No filter is advanced.
    #[default]
    SkipFrame,
    /// Forecast through short detection gaps.
    ///
    /// If one camera missed, its 2D tracker predicts the landmarks instead, and the frame is
    /// triangulated and filtered as usual. If both missed, the 3D tracker predicts the positions.
    /// After `max_consecutive` such frames in a row, further frames are skipped until both
    /// cameras see the hand again, since predictions drift without bound.
    Predict { max_consecutive: u32 },
}

/// What the pipeline does with a frame, as decided by [`plan_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePlan {
    /// Both cameras see the hand: filter, triangulate, filter.
    Track,
    /// Like [`FramePlan::Track`], but cameras flagged here use their 2D tracker's prediction.
    PredictImage { left: bool, right: bool },
    /// Forecast the 3D positions without any new measurement.
    PredictSpace,
    /// Emit nothing and leave all filters untouched.
    Skip,
}

/// Decides how to process a frame.
///
/// `consecutive_misses` is the number of frames directly preceding this one in which at least one
/// camera missed the hand.
pub fn plan_frame(
    policy: MissPolicy,
    left_detected: bool,
    right_detected: bool,
    consecutive_misses: u32,
) -> FramePlan {
    if left_detected && right_detected {
        return FramePlan::Track;
    }
    match policy {
        MissPolicy::SkipFrame => FramePlan::Skip,
        MissPolicy::Predict { max_consecutive } if consecutive_misses >= max_consecutive => {
            FramePlan::Skip
        }
        MissPolicy::Predict { .. } => {
            if left_detected || right_detected {
                FramePlan::PredictImage {
                    left: !left_detected,
                    right: !right_detected,
                }
            } else {
                FramePlan::PredictSpace
            }
        }
    }
}

/// Samples collected by the running bootstrap pass.
#[derive(Default)]
struct BootstrapState {
    left: Vec<Landmarks>,
    right: Vec<Landmarks>,
    space: Vec<Landmarks>,
    attempts: u32,
}

impl BootstrapState {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Two [`Tracker2D`]s, triangulation and a [`Tracker3D`], driven frame pair by frame pair.
pub struct StereoTrackingPipeline<D: HandDetector> {
    config: PipelineConfig,
    rig: StereoRig,
    left: Tracker2D<D>,
    right: Tracker2D<D>,
    space: Tracker3D,
    phase: Phase,
    bootstrap: BootstrapState,
    consecutive_misses: u32,
    t_detect: Timer,
    t_filter_2d: Timer,
    t_triangulate: Timer,
    t_filter_3d: Timer,
}

impl<D: HandDetector> StereoTrackingPipeline<D> {
    /// Creates a pipeline in [`Phase::Idle`].
    ///
    /// `left_detector` and `right_detector` process the frames of the left (reference) and right
    /// camera of `rig`.
    pub fn new(
        left_detector: D,
        right_detector: D,
        rig: StereoRig,
        config: PipelineConfig,
    ) -> Self {
        let n = config.landmark_count();
        Self {
            left: Tracker2D::new(left_detector, config.filter_params_2d(), n),
            right: Tracker2D::new(right_detector, config.filter_params_2d(), n),
            space: Tracker3D::new(config.filter_params_3d(), n),
            rig,
            config,
            phase: Phase::Idle,
            bootstrap: BootstrapState::default(),
            consecutive_misses: 0,
            t_detect: Timer::new("detect"),
            t_filter_2d: Timer::new("filter 2D"),
            t_triangulate: Timer::new("triangulate"),
            t_filter_3d: Timer::new("filter 3D"),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rig(&self) -> &StereoRig {
        &self.rig
    }

    pub fn left_tracker(&self) -> &Tracker2D<D> {
        &self.left
    }

    pub fn right_tracker(&self) -> &Tracker2D<D> {
        &self.right
    }

    pub fn space_tracker(&self) -> &Tracker3D {
        &self.space
    }

    /// The per-stage timers, for logging with an [`FpsCounter`].
    pub fn timers(&self) -> [&Timer; 4] {
        [
            &self.t_detect,
            &self.t_filter_2d,
            &self.t_triangulate,
            &self.t_filter_3d,
        ]
    }

    /// Starts (or restarts) the bootstrap, discarding any samples collected so far.
    ///
    /// Initialized trackers keep working until the bootstrap replaces them, but frames can only be
    /// tracked again once the bootstrap is complete.
    pub fn start_bootstrap(&mut self) {
        log::info!(
            "starting bootstrap, hold your hand still in front of both cameras ({} samples per pass)",
            self.config.history_size()
        );
        self.bootstrap.reset();
        self.consecutive_misses = 0;
        self.phase = Phase::Calibrating2D;
    }

    /// Feeds one frame pair to the running bootstrap and returns the new phase.
    ///
    /// Frames in which a camera misses the hand, reports the wrong number of landmarks, or whose
    /// landmarks cannot be triangulated count as failed attempts. Fails with [`TrackingError::BootstrapStalled`] once the configured number
    /// of attempts of a pass is used up without collecting enough samples. In that case the
    /// bootstrap has to be restarted with [`StereoTrackingPipeline::start_bootstrap`].
    pub fn bootstrap_step(
        &mut self,
        left: &D::Frame,
        right: &D::Frame,
    ) -> Result<Phase, TrackingError> {
        if !self.phase.is_calibrating() {
            return Err(TrackingError::InvalidPhase { phase: self.phase });
        }

        let max_attempts = self.config.max_bootstrap_attempts();
        if max_attempts != 0 && self.bootstrap.attempts >= max_attempts {
            return Err(self.stalled());
        }
        self.bootstrap.attempts += 1;

        let (l, r) = match self.detect(left, right) {
            Ok(detections) => detections,
            Err(e) if e.is_frame_local() => {
                log::debug!("bootstrap: discarding frame: {e}");
                return self.check_stall();
            }
            Err(e) => return Err(e),
        };
        let (Detection::Detected(l), Detection::Detected(r)) = (l, r) else {
            return self.check_stall();
        };

        let history_size = self.config.history_size();
        match self.phase {
            Phase::Calibrating2D => {
                self.bootstrap.left.push(l);
                self.bootstrap.right.push(r);
                log::debug!(
                    "2D bootstrap: {}/{history_size} samples",
                    self.bootstrap.left.len()
                );
                if self.bootstrap.left.len() < history_size {
                    return self.check_stall();
                }

                self.left.initialize(&self.bootstrap.left)?;
                self.right.initialize(&self.bootstrap.right)?;
                self.bootstrap.reset();
                self.phase = Phase::Calibrating3D;
                log::info!("2D trackers initialized, calibrating 3D tracker");
            }
            Phase::Calibrating3D => {
                let points = match self.filter_and_triangulate(
                    Detection::Detected(l),
                    Detection::Detected(r),
                    left,
                    right,
                ) {
                    Ok(points) => points,
                    Err(e) if e.is_frame_local() => {
                        log::debug!("3D bootstrap: discarding sample: {e}");
                        return self.check_stall();
                    }
                    Err(e) => return Err(e),
                };
                self.bootstrap.space.push(points);
                log::debug!(
                    "3D bootstrap: {}/{history_size} samples",
                    self.bootstrap.space.len()
                );
                if self.bootstrap.space.len() < history_size {
                    return self.check_stall();
                }

                self.space.initialize(&self.bootstrap.space)?;
                self.bootstrap.reset();
                self.phase = Phase::Ready;
                log::info!("bootstrap complete, tracking");
            }
            Phase::Idle | Phase::Ready | Phase::Running => unreachable!(),
        }
        Ok(self.phase)
    }

    fn check_stall(&self) -> Result<Phase, TrackingError> {
        let max_attempts = self.config.max_bootstrap_attempts();
        if max_attempts != 0 && self.bootstrap.attempts >= max_attempts {
            Err(self.stalled())
        } else {
            Ok(self.phase)
        }
    }

    fn stalled(&self) -> TrackingError {
        let collected = match self.phase {
            Phase::Calibrating2D => self.bootstrap.left.len(),
            _ => self.bootstrap.space.len(),
        };
        TrackingError::BootstrapStalled {
            phase: self.phase,
            collected,
            attempts: self.bootstrap.attempts,
        }
    }

    /// Tracks a frame pair.
    ///
    /// Returns the forecast 3D landmark positions (see
    /// [`LandmarkKalmanFilter::correct_and_predict`]), or [`None`] if the frame was skipped
    /// because of missed detections.
    ///
    /// A degenerate triangulation fails the frame with
    /// [`TrackingError::DegenerateTriangulation`] without advancing the 3D tracker, a detection
    /// with the wrong number of landmarks fails it with [`TrackingError::LandmarkCountMismatch`]
    /// before any filter runs. Fails with [`TrackingError::NotReady`] until the bootstrap is
    /// complete.
    ///
    /// [`LandmarkKalmanFilter::correct_and_predict`]: crate::filter::LandmarkKalmanFilter::correct_and_predict
    pub fn process_frame(
        &mut self,
        left: &D::Frame,
        right: &D::Frame,
    ) -> Result<Option<Landmarks>, TrackingError> {
        if !self.phase.is_tracking() {
            return Err(TrackingError::NotReady { stage: "pipeline" });
        }
        self.phase = Phase::Running;

        let (l, r) = self.detect(left, right)?;
        let plan = plan_frame(
            self.config.miss_policy(),
            l.is_detected(),
            r.is_detected(),
            self.consecutive_misses,
        );
        if l.is_detected() && r.is_detected() {
            self.consecutive_misses = 0;
        } else {
            self.consecutive_misses = self.consecutive_misses.saturating_add(1);
        }

        match plan {
            FramePlan::Track | FramePlan::PredictImage { .. } => {
                let points = self.filter_and_triangulate(l, r, left, right)?;
                let filtered = self
                    .t_filter_3d
                    .time(|| self.space.apply_filtration(&points))?;
                Ok(Some(filtered))
            }
            FramePlan::PredictSpace => {
                log::trace!("hand not visible, predicting 3D positions");
                Ok(Some(self.space.apply_prediction()?))
            }
            FramePlan::Skip => {
                log::trace!(
                    "skipping frame (left: {}, right: {})",
                    l.is_detected(),
                    r.is_detected()
                );
                Ok(None)
            }
        }
    }

    /// Re-tunes the filters of both 2D trackers.
    ///
    /// Only affects future steps, and is kept when the trackers are re-initialized.
    pub fn set_filter_params_2d(&mut self, params: FilterParams) {
        for tracker in [&mut self.left, &mut self.right] {
            let bank = tracker.filter_bank_mut();
            bank.update_measure_factor(params.measure_factor);
            bank.update_process_factor(params.process_factor);
        }
        self.config.set_filter_params_2d(params);
    }

    /// Re-tunes the filters of the 3D tracker.
    ///
    /// Only affects future steps, and is kept when the tracker is re-initialized.
    pub fn set_filter_params_3d(&mut self, params: FilterParams) {
        let bank = self.space.filter_bank_mut();
        bank.update_measure_factor(params.measure_factor);
        bank.update_process_factor(params.process_factor);
        self.config.set_filter_params_3d(params);
    }

    fn detect(
        &mut self,
        left: &D::Frame,
        right: &D::Frame,
    ) -> Result<(Detection, Detection), TrackingError> {
        self.t_detect.time(|| {
            let l = self.left.detect(left)?;
            let r = self.right.detect(right)?;
            Ok::<_, TrackingError>((l, r))
        })
    }

    /// Runs both 2D trackers, correcting with detections and predicting through misses, and
    /// triangulates their output.
    fn filter_and_triangulate(
        &mut self,
        l: Detection,
        r: Detection,
        left: &D::Frame,
        right: &D::Frame,
    ) -> Result<Landmarks, TrackingError> {
        let (l, r) = self.t_filter_2d.time(|| {
            let l = match l {
                Detection::Detected(lms) => self.left.apply_filtration(&lms)?,
                Detection::Missed => self.left.apply_prediction()?,
            };
            let r = match r {
                Detection::Detected(lms) => self.right.apply_filtration(&lms)?,
                Detection::Missed => self.right.apply_prediction()?,
            };
            Ok::<_, TrackingError>((l, r))
        })?;

        self.t_triangulate.time(|| {
            let mut l_px: Vec<Point2<f64>> = left.resolution().landmarks_to_pixels(&l);
            let mut r_px: Vec<Point2<f64>> = right.resolution().landmarks_to_pixels(&r);
            if self.config.undistort_landmarks() {
                self.rig.undistort(&mut l_px, &mut r_px);
            }
            self.rig.triangulate(&l_px, &r_px)
        })
    }
}

impl<D: HandDetector> StereoTrackingPipeline<D>
where
    D::Frame: Send + Sync + 'static,
{
    /// Runs the bootstrap on frames from `cameras` until all trackers are initialized.
    ///
    /// Starts a new bootstrap if none is running. Fails if the cameras stop, or if the bootstrap
    /// stalls.
    ///
    /// Besides the attempts counted by [`StereoTrackingPipeline::bootstrap_step`], the
    /// configured attempt limit also bounds the number of consecutive polls that find no new frame
    /// pair. This catches cameras whose frames are never captured within `max_skew` of each
    /// other.
    pub fn run_bootstrap(&mut self, cameras: &mut StereoCameras<D::Frame>) -> anyhow::Result<()> {
        if !self.phase.is_calibrating() {
            self.start_bootstrap();
        }
        cameras.set_max_skew(self.config.max_skew());

        let max_attempts = self.config.max_bootstrap_attempts();
        let mut idle_polls = 0;
        while self.phase.is_calibrating() {
            if !cameras.is_running() {
                bail!("cameras stopped during bootstrap (phase {:?})", self.phase);
            }
            match cameras.next_pair() {
                Some(pair) => {
                    idle_polls = 0;
                    self.bootstrap_step(pair.left.frame(), pair.right.frame())?;
                }
                None if max_attempts != 0 && idle_polls >= max_attempts => {
                    log::warn!(
                        "no frame pair within {:?} after {idle_polls} polls, check camera sync",
                        cameras.max_skew()
                    );
                    return Err(self.stalled().into());
                }
                None => {
                    idle_polls += 1;
                    thread::sleep(self.config.poll_interval());
                }
            }
        }
        Ok(())
    }

    /// Tracks frames from `cameras` and emits the results until the cameras stop.
    ///
    /// Frames failing with a frame-local error (see [`TrackingError::is_frame_local`]) are skipped,
    /// any other tracking error ends the loop.
    pub fn run<E: Emitter>(
        &mut self,
        cameras: &mut StereoCameras<D::Frame>,
        mut emitter: E,
    ) -> anyhow::Result<()> {
        if !self.phase.is_tracking() {
            bail!("cannot track in phase {:?}, run the bootstrap first", self.phase);
        }
        cameras.set_max_skew(self.config.max_skew());

        let mut fps = FpsCounter::new("tracking");
        while cameras.is_running() {
            let Some(pair) = cameras.next_pair() else {
                thread::sleep(self.config.poll_interval());
                continue;
            };
            match self.process_frame(pair.left.frame(), pair.right.frame()) {
                Ok(Some(landmarks)) => emitter.emit(&landmarks),
                Ok(None) => {}
                Err(e) if e.is_frame_local() => {
                    log::debug!("skipping frame: {e}");
                }
                Err(e) => return Err(e.into()),
            }
            fps.tick_with(self.timers());
        }

        log::info!("cameras stopped, tracking finished");
        Ok(())
    }
}

/// Runs the bootstrap (unless `pipeline` is already tracking) and the tracking loop on a new
/// thread.
///
/// The thread exits with the result of [`StereoTrackingPipeline::run`] when the cameras stop. Use
/// [`StereoCameras::stop_handle`] before calling this to be able to stop it.
pub fn spawn_tracking_thread<D, E>(
    mut pipeline: StereoTrackingPipeline<D>,
    mut cameras: StereoCameras<D::Frame>,
    emitter: E,
) -> anyhow::Result<JoinHandle<anyhow::Result<()>>>
where
    D: HandDetector + 'static,
    D::Frame: Send + Sync + 'static,
    E: Emitter + Send + 'static,
{
    let handle = thread::Builder::new()
        .name("tracking".into())
        .spawn(move || -> anyhow::Result<()> {
            log::trace!("tracking thread starting");
            if !pipeline.phase().is_tracking() {
                pipeline.run_bootstrap(&mut cameras)?;
            }
            let res = pipeline.run(&mut cameras, emitter);
            log::trace!("tracking thread exiting");
            res
        })
        .context("failed to spawn tracking thread")?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use nalgebra::Point3;

    use super::*;
    use crate::filter::FilterBank;
    use crate::test::{hand, FrameDetector, Scene, TestFrame};

    fn pipeline(config: PipelineConfig) -> (StereoTrackingPipeline<FrameDetector>, Scene) {
        let scene = Scene::new(0xb007);
        let pipeline =
            StereoTrackingPipeline::new(FrameDetector, FrameDetector, scene.rig().clone(), config);
        (pipeline, scene)
    }

    fn bootstrapped(config: PipelineConfig) -> (StereoTrackingPipeline<FrameDetector>, Scene) {
        let (mut pipeline, mut scene) = pipeline(config);
        let points = hand(Point3::new(0.0, 0.0, 0.5));
        pipeline.start_bootstrap();
        while pipeline.phase() != Phase::Ready {
            let (l, r) = scene.frames(&points);
            pipeline.bootstrap_step(&l, &r).unwrap();
        }
        (pipeline, scene)
    }

    #[test]
    fn plan() {
        let predict = MissPolicy::Predict { max_consecutive: 2 };
        for policy in [MissPolicy::SkipFrame, predict] {
            assert_eq!(plan_frame(policy, true, true, 0), FramePlan::Track);
            assert_eq!(plan_frame(policy, true, true, 100), FramePlan::Track);
        }
        assert_eq!(
            plan_frame(MissPolicy::SkipFrame, true, false, 0),
            FramePlan::Skip
        );
        assert_eq!(
            plan_frame(MissPolicy::SkipFrame, false, false, 0),
            FramePlan::Skip
        );
        assert_eq!(
            plan_frame(predict, false, true, 0),
            FramePlan::PredictImage {
                left: true,
                right: false
            }
        );
        assert_eq!(
            plan_frame(predict, true, false, 1),
            FramePlan::PredictImage {
                left: false,
                right: true
            }
        );
        assert_eq!(plan_frame(predict, false, false, 1), FramePlan::PredictSpace);
        assert_eq!(plan_frame(predict, false, false, 2), FramePlan::Skip);
        assert_eq!(plan_frame(predict, true, false, 2), FramePlan::Skip);
        assert_eq!(MissPolicy::default(), MissPolicy::SkipFrame);
    }

    #[test]
    fn bootstrap_phases() {
        let config = PipelineConfig::default().with_history_size(4);
        let (mut pipeline, mut scene) = pipeline(config);
        let points = hand(Point3::new(0.0, 0.0, 0.5));
        let (l, r) = scene.frames(&points);

        assert_eq!(pipeline.phase(), Phase::Idle);
        assert_eq!(
            pipeline.bootstrap_step(&l, &r),
            Err(TrackingError::InvalidPhase { phase: Phase::Idle })
        );
        assert_eq!(
            pipeline.process_frame(&l, &r),
            Err(TrackingError::NotReady { stage: "pipeline" })
        );

        pipeline.start_bootstrap();
        for _ in 0..3 {
            let (l, r) = scene.frames(&points);
            assert_eq!(pipeline.bootstrap_step(&l, &r), Ok(Phase::Calibrating2D));
        }
        // Frames with a miss don't count.
        let (l, r) = scene.frames_with(&points, true, false);
        assert_eq!(pipeline.bootstrap_step(&l, &r), Ok(Phase::Calibrating2D));
        assert!(!pipeline.left_tracker().is_ready());

        let (l, r) = scene.frames(&points);
        assert_eq!(pipeline.bootstrap_step(&l, &r), Ok(Phase::Calibrating3D));
        assert!(pipeline.left_tracker().is_ready());
        assert!(pipeline.right_tracker().is_ready());
        assert!(!pipeline.space_tracker().is_ready());

        for _ in 0..3 {
            let (l, r) = scene.frames(&points);
            assert_eq!(pipeline.bootstrap_step(&l, &r), Ok(Phase::Calibrating3D));
        }
        let (l, r) = scene.frames(&points);
        assert_eq!(pipeline.bootstrap_step(&l, &r), Ok(Phase::Ready));
        assert!(pipeline.space_tracker().is_ready());

        assert_eq!(
            pipeline.bootstrap_step(&l, &r),
            Err(TrackingError::InvalidPhase {
                phase: Phase::Ready
            })
        );
        let (l, r) = scene.frames(&points);
        assert!(pipeline.process_frame(&l, &r).unwrap().is_some());
        assert_eq!(pipeline.phase(), Phase::Running);
    }

    #[test]
    fn bootstrap_stalls() {
        let config = PipelineConfig::default().with_max_bootstrap_attempts(5);
        let (mut pipeline, mut scene) = pipeline(config);
        let points = hand(Point3::new(0.0, 0.0, 0.5));
        pipeline.start_bootstrap();

        let (l, r) = scene.frames(&points);
        pipeline.bootstrap_step(&l, &r).unwrap();
        for _ in 0..3 {
            let (l, r) = scene.frames_with(&points, false, true);
            pipeline.bootstrap_step(&l, &r).unwrap();
        }
        let (l, r) = scene.frames_with(&points, false, false);
        let stalled = TrackingError::BootstrapStalled {
            phase: Phase::Calibrating2D,
            collected: 1,
            attempts: 5,
        };
        assert_eq!(pipeline.bootstrap_step(&l, &r), Err(stalled.clone()));
        // Stays stalled until restarted.
        let (l, r) = scene.frames(&points);
        assert_eq!(pipeline.bootstrap_step(&l, &r), Err(stalled));

        pipeline.start_bootstrap();
        assert_eq!(pipeline.bootstrap_step(&l, &r), Ok(Phase::Calibrating2D));
    }

    #[test]
    fn tracks_static_hand() {
        let (mut pipeline, mut scene) = bootstrapped(PipelineConfig::default());
        let points = hand(Point3::new(0.0, 0.0, 0.5));

        let mut error_sum = 0.0;
        let mut count = 0;
        for _ in 0..50 {
            let (l, r) = scene.frames(&points);
            let out = pipeline.process_frame(&l, &r).unwrap().unwrap();
            assert_eq!(out.len(), 21);
            for (est, truth) in out.iter().zip(&points) {
                let err = (est.cast::<f64>() - truth).norm();
                assert!(err < 0.03, "{est} vs {truth}");
                error_sum += err;
                count += 1;
            }
        }
        assert!(error_sum / (count as f64) < 0.01);
    }

    #[test]
    fn skip_policy_leaves_filters_untouched() {
        let (mut pipeline, mut scene) = bootstrapped(PipelineConfig::default());
        let points = hand(Point3::new(0.0, 0.0, 0.5));

        let before = pipeline.space_tracker().filter_bank().filter(0).unwrap().clone();
        let (l, r) = scene.frames_with(&points, true, false);
        assert_eq!(pipeline.process_frame(&l, &r), Ok(None));
        let (l, r) = scene.frames_with(&points, false, false);
        assert_eq!(pipeline.process_frame(&l, &r), Ok(None));

        let after = pipeline.space_tracker().filter_bank().filter(0).unwrap();
        assert_eq!(after.position(), before.position());
        assert_eq!(after.error_cov(), before.error_cov());
    }

    #[test]
    fn predict_policy_bridges_gaps() {
        let config =
            PipelineConfig::default().with_miss_policy(MissPolicy::Predict { max_consecutive: 2 });
        let (mut pipeline, mut scene) = bootstrapped(config);
        let points = hand(Point3::new(0.0, 0.0, 0.5));
        for _ in 0..10 {
            let (l, r) = scene.frames(&points);
            pipeline.process_frame(&l, &r).unwrap().unwrap();
        }

        // Right camera misses: its 2D tracker predicts.
        let (l, r) = scene.frames_with(&points, true, false);
        let out = pipeline.process_frame(&l, &r).unwrap().unwrap();
        assert!((out[0].cast::<f64>() - points[0]).norm() < 0.03);

        // Both miss: 3D prediction.
        let (l, r) = scene.frames_with(&points, false, false);
        assert!(pipeline.process_frame(&l, &r).unwrap().is_some());

        // Gap too long: skipped.
        let (l, r) = scene.frames_with(&points, false, false);
        assert_eq!(pipeline.process_frame(&l, &r), Ok(None));

        // Recovers as soon as both cameras see the hand again.
        let (l, r) = scene.frames(&points);
        assert!(pipeline.process_frame(&l, &r).unwrap().is_some());
        let (l, r) = scene.frames_with(&points, false, true);
        assert!(pipeline.process_frame(&l, &r).unwrap().is_some());
    }

    #[test]
    fn landmark_count_mismatch_fails_frame() {
        let (mut pipeline, _) = bootstrapped(PipelineConfig::default());
        let l = TestFrame {
            hand: Some(vec![[0.5, 0.5]; 20]),
            ..TestFrame::default()
        };
        let r = TestFrame {
            hand: Some(vec![[0.5, 0.5]; 21]),
            ..TestFrame::default()
        };
        assert_eq!(
            pipeline.process_frame(&l, &r),
            Err(TrackingError::LandmarkCountMismatch {
                expected: 21,
                actual: 20
            })
        );
    }

    #[test]
    fn bootstrap_skips_wrong_landmark_count() {
        let config = PipelineConfig::default()
            .with_history_size(2)
            .with_max_bootstrap_attempts(4);
        let (mut pipeline, mut scene) = pipeline(config);
        let points = hand(Point3::new(0.0, 0.0, 0.5));
        pipeline.start_bootstrap();

        let (l, r) = scene.frames(&points);
        assert_eq!(pipeline.bootstrap_step(&l, &r), Ok(Phase::Calibrating2D));
        let short = TestFrame {
            hand: Some(vec![[0.5, 0.5]; 20]),
            ..TestFrame::default()
        };
        assert_eq!(pipeline.bootstrap_step(&short, &r), Ok(Phase::Calibrating2D));
        assert_eq!(pipeline.bootstrap.left.len(), 1);
        assert_eq!(pipeline.bootstrap.attempts, 2);

        let (l, r) = scene.frames(&points);
        assert_eq!(pipeline.bootstrap_step(&l, &r), Ok(Phase::Calibrating3D));

        // Malformed frames still use up attempts.
        pipeline.bootstrap_step(&short, &short).unwrap();
        pipeline.bootstrap_step(&short, &short).unwrap();
        pipeline.bootstrap_step(&short, &short).unwrap();
        assert_eq!(
            pipeline.bootstrap_step(&short, &short),
            Err(TrackingError::BootstrapStalled {
                phase: Phase::Calibrating3D,
                collected: 0,
                attempts: 4,
            })
        );
    }

    #[test]
    fn degenerate_pairs_are_dropped() {
        // Feeding both cameras the same frames keeps both 2D trackers in lockstep, so every
        // landmark has zero disparity and triangulates to infinity.
        let config = PipelineConfig::default().with_history_size(4);
        let (mut pipeline, mut scene) = pipeline(config);
        let points = hand(Point3::new(0.0, 0.0, 0.5));
        pipeline.start_bootstrap();
        for _ in 0..4 {
            let (l, _) = scene.frames(&points);
            pipeline.bootstrap_step(&l, &l).unwrap();
        }
        assert_eq!(pipeline.phase(), Phase::Calibrating3D);

        for _ in 0..6 {
            let (l, _) = scene.frames(&points);
            assert_eq!(pipeline.bootstrap_step(&l, &l), Ok(Phase::Calibrating3D));
        }
        assert!(pipeline.bootstrap.space.is_empty());
        assert_eq!(pipeline.bootstrap.attempts, 6);
        assert!(!pipeline.space_tracker().is_ready());

        // Finish the bootstrap with a 3D history that did not come from these frames.
        let history = (0..4)
            .map(|i| {
                let offset = i as f32 * 0.001;
                Landmarks::from_positions(
                    points
                        .iter()
                        .map(|p| p.cast::<f32>() + nalgebra::Vector3::repeat(offset)),
                )
            })
            .collect::<Vec<_>>();
        pipeline.space.initialize(&history).unwrap();
        pipeline.phase = Phase::Ready;

        let before: FilterBank = pipeline.space_tracker().filter_bank().clone();
        let (l, _) = scene.frames(&points);
        assert!(matches!(
            pipeline.process_frame(&l, &l),
            Err(TrackingError::DegenerateTriangulation { .. })
        ));
        let after = pipeline.space_tracker().filter_bank();
        for i in 0..after.len() {
            let (a, b) = (after.filter(i).unwrap(), before.filter(i).unwrap());
            assert_eq!(a.position(), b.position());
            assert_eq!(a.error_cov(), b.error_cov());
        }
    }

    #[test]
    fn retuning() {
        let (mut pipeline, _) = bootstrapped(PipelineConfig::default());
        let params = FilterParams::new(10.0, 0.5);
        pipeline.set_filter_params_2d(params);
        pipeline.set_filter_params_3d(FilterParams::new(20.0, 0.25));

        assert_eq!(pipeline.config().filter_params_2d(), params);
        assert_eq!(pipeline.left_tracker().filter_bank().params(), params);
        assert_eq!(pipeline.right_tracker().filter_bank().params(), params);
        let filter = pipeline.space_tracker().filter_bank().filter(3).unwrap();
        assert_eq!(filter.process_noise_cov()[(5, 5)], 0.25);
    }
}
