use nalgebra::{Point3, Vector3};

use crate::error::TrackingError;

use super::RollingHistory;

/// Smallest per-axis variance used when building a measurement noise covariance.
///
/// Landmarks of the 2D trackers have a Z coordinate that is always 0, so their sampled variance on
/// that axis is exactly 0. The floor keeps the covariance matrix invertible.
pub const MIN_VARIANCE: f32 = 1e-12;

/// Empirical per-axis measurement noise of a single landmark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseProfile {
    std_dev: Vector3<f32>,
}

impl NoiseProfile {
    /// Creates a noise profile from known per-axis standard deviations.
    pub fn from_std_dev(std_dev: Vector3<f32>) -> Self {
        Self { std_dev }
    }

    /// Computes the population standard deviation (no Bessel correction) of each coordinate of
    /// the samples in `history`.
    ///
    /// Fails with [`TrackingError::HistoryNotFull`] unless `history` is full.
    pub fn compute(history: &RollingHistory<Point3<f32>>) -> Result<Self, TrackingError> {
        if !history.is_full() {
            return Err(TrackingError::HistoryNotFull {
                len: history.len(),
                capacity: history.capacity(),
            });
        }

        // Accumulate in f64, the samples may be far away from the origin.
        let n = history.len() as f64;
        let mean = history
            .iter()
            .fold(Vector3::<f64>::zeros(), |acc, p| acc + p.coords.cast::<f64>())
            / n;
        let variance = history.iter().fold(Vector3::<f64>::zeros(), |acc, p| {
            let d = p.coords.cast::<f64>() - mean;
            acc + d.component_mul(&d)
        }) / n;

        Ok(Self {
            std_dev: variance.map(f64::sqrt).cast::<f32>(),
        })
    }

    /// Per-axis standard deviation.
    pub fn std_dev(&self) -> Vector3<f32> {
        self.std_dev
    }

    /// Per-axis variance, clamped to at least [`MIN_VARIANCE`].
    pub fn variance(&self) -> Vector3<f32> {
        self.std_dev.map(|s| (s * s).max(MIN_VARIANCE))
    }
}
