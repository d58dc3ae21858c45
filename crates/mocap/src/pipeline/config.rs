use std::{env, str::FromStr, time::Duration};

use anyhow::{bail, Context};

use crate::filter::FilterParams;
use crate::landmark::HAND_LANDMARK_COUNT;
use crate::output::DEFAULT_UDP_TARGET;
use crate::video::DEFAULT_MAX_SKEW;

use super::MissPolicy;

const ENV_VAR_HISTORY_SIZE: &str = "MOCAP_HISTORY_SIZE";
const ENV_VAR_MISS_POLICY: &str = "MOCAP_MISS_POLICY";
const ENV_VAR_MAX_BOOTSTRAP_ATTEMPTS: &str = "MOCAP_MAX_BOOTSTRAP_ATTEMPTS";
const ENV_VAR_UDP_TARGET: &str = "MOCAP_UDP_TARGET";

/// Number of frames predicted in a row by [`MissPolicy::Predict`] when selected via
/// `MOCAP_MISS_POLICY=predict`.
pub const DEFAULT_MAX_PREDICTED_FRAMES: u32 = 5;

/// Settings of a [`StereoTrackingPipeline`].
///
/// [`StereoTrackingPipeline`]: super::StereoTrackingPipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    landmark_count: usize,
    history_size: usize,
    filter_2d: FilterParams,
    filter_3d: FilterParams,
    miss_policy: MissPolicy,
    max_bootstrap_attempts: u32,
    poll_interval: Duration,
    max_skew: Duration,
    undistort_landmarks: bool,
    udp_target: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            landmark_count: HAND_LANDMARK_COUNT,
            history_size: 10,
            filter_2d: FilterParams::DEFAULT_2D,
            filter_3d: FilterParams::DEFAULT_3D,
            miss_policy: MissPolicy::SkipFrame,
            max_bootstrap_attempts: 1000,
            poll_interval: Duration::from_millis(5),
            max_skew: DEFAULT_MAX_SKEW,
            undistort_landmarks: true,
            udp_target: DEFAULT_UDP_TARGET.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Returns the default configuration, with overrides from the `MOCAP_*` environment variables
    /// applied.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::default().apply_overrides(|name| env::var(name).ok())
    }

    /// Applies overrides looked up by environment variable name.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let get = |name: &str| {
            let value = lookup(name);
            if let Some(value) = &value {
                log::debug!("config override: `{name}` is set to '{value}'");
            }
            value
        };

        if let Some(value) = get(ENV_VAR_HISTORY_SIZE) {
            let size = parse(ENV_VAR_HISTORY_SIZE, &value)?;
            if size == 0 {
                bail!("`{ENV_VAR_HISTORY_SIZE}` must be at least 1");
            }
            self.history_size = size;
        }
        if let Some(value) = get(ENV_VAR_MISS_POLICY) {
            self.miss_policy = match value.trim() {
                "skip" => MissPolicy::SkipFrame,
                "predict" => MissPolicy::Predict {
                    max_consecutive: DEFAULT_MAX_PREDICTED_FRAMES,
                },
                other => bail!(
                    "invalid value '{other}' for `{ENV_VAR_MISS_POLICY}`, expected 'skip' or 'predict'"
                ),
            };
        }
        if let Some(value) = get(ENV_VAR_MAX_BOOTSTRAP_ATTEMPTS) {
            self.max_bootstrap_attempts = parse(ENV_VAR_MAX_BOOTSTRAP_ATTEMPTS, &value)?;
        }
        if let Some(value) = get(ENV_VAR_UDP_TARGET) {
            let addr: std::net::SocketAddr = parse(ENV_VAR_UDP_TARGET, &value)?;
            self.udp_target = addr.to_string();
        }
        Ok(self)
    }

    /// Sets the number of landmarks per hand.
    ///
    /// # Panics
    ///
    /// Panics if `landmark_count` is 0.
    pub fn with_landmark_count(mut self, landmark_count: usize) -> Self {
        assert!(landmark_count >= 1, "landmark count must be at least 1");
        self.landmark_count = landmark_count;
        self
    }

    /// Sets the number of samples collected by each bootstrap pass.
    ///
    /// # Panics
    ///
    /// Panics if `history_size` is 0.
    pub fn with_history_size(mut self, history_size: usize) -> Self {
        assert!(history_size >= 1, "history size must be at least 1");
        self.history_size = history_size;
        self
    }

    pub fn with_filter_params_2d(mut self, params: FilterParams) -> Self {
        self.filter_2d = params;
        self
    }

    pub fn with_filter_params_3d(mut self, params: FilterParams) -> Self {
        self.filter_3d = params;
        self
    }

    pub fn with_miss_policy(mut self, miss_policy: MissPolicy) -> Self {
        self.miss_policy = miss_policy;
        self
    }

    /// Sets the number of detection attempts after which a bootstrap pass fails.
    ///
    /// The same limit applies to consecutive polls of the cameras that yield no frame pair. 0
    /// retries forever.
    pub fn with_max_bootstrap_attempts(mut self, attempts: u32) -> Self {
        self.max_bootstrap_attempts = attempts;
        self
    }

    /// Sets how long the run loops sleep when no new frame pair is available.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets the maximum capture time difference of two frames tracked as a pair.
    pub fn with_max_skew(mut self, max_skew: Duration) -> Self {
        self.max_skew = max_skew;
        self
    }

    /// Sets whether lens distortion is removed from landmarks before triangulation.
    pub fn with_undistort_landmarks(mut self, undistort: bool) -> Self {
        self.undistort_landmarks = undistort;
        self
    }

    pub fn with_udp_target(mut self, target: impl Into<String>) -> Self {
        self.udp_target = target.into();
        self
    }

    pub fn landmark_count(&self) -> usize {
        self.landmark_count
    }

    pub fn history_size(&self) -> usize {
        self.history_size
    }

    pub fn filter_params_2d(&self) -> FilterParams {
        self.filter_2d
    }

    pub fn filter_params_3d(&self) -> FilterParams {
        self.filter_3d
    }

    pub fn miss_policy(&self) -> MissPolicy {
        self.miss_policy
    }

    pub fn max_bootstrap_attempts(&self) -> u32 {
        self.max_bootstrap_attempts
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn max_skew(&self) -> Duration {
        self.max_skew
    }

    pub fn undistort_landmarks(&self) -> bool {
        self.undistort_landmarks
    }

    pub fn udp_target(&self) -> &str {
        &self.udp_target
    }

    pub(super) fn set_filter_params_2d(&mut self, params: FilterParams) {
        self.filter_2d = params;
    }

    pub(super) fn set_filter_params_3d(&mut self, params: FilterParams) {
        self.filter_3d = params;
    }
}

fn parse<T>(name: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value '{value}' for `{name}`"))
}
