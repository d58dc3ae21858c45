//! Landmark smoothing with empirically parametrized Kalman filters.
//!
//! Filters are created in two steps: first, a [`RollingHistory`] of raw samples is collected for
//! every landmark while the tracked hand is held still. The spread of those samples yields a
//! [`NoiseProfile`], which then determines the measurement noise of that landmark's
//! [`LandmarkKalmanFilter`]. A [`FilterBank`] bundles one filter per landmark.

mod bank;
mod history;
mod kalman;
mod noise;

pub use bank::FilterBank;
pub use history::RollingHistory;
pub use kalman::{FilterParams, LandmarkKalmanFilter};
pub use noise::NoiseProfile;
