//! Stereo hand motion capture.
//!
//! Turns per-camera 2D hand landmark detections into smoothed, triangulated 3D landmark positions.
//!
//! The data flow through the engine is:
//!
//! ```text
//! detector -> Tracker2D (per camera) -> pixel conversion -> triangulation -> Tracker3D -> Emitter
//! ```
//!
//! Both tracker stages are banks of constant-velocity Kalman filters, one per landmark. Their
//! measurement noise is not hand-tuned: it is sampled during a bootstrap phase in which the hand
//! is held still in front of both cameras (see [`pipeline::Phase`]).
//!
//! # Coordinates
//!
//! 2D landmarks are normalized image coordinates in `[0, 1]` with Y pointing *down*, as output by
//! the hand landmark networks. 3D positions are expressed in the frame of the left camera, in the
//! same metric unit as the stereo extrinsics (X right, Y down, Z into the scene).
//!
//! # Environment Variables
//!
//! [`PipelineConfig::from_env`] reads the following overrides:
//!
//! * `MOCAP_HISTORY_SIZE`: number of samples collected per bootstrap pass.
//! * `MOCAP_MISS_POLICY`: `skip` or `predict`, see [`pipeline::MissPolicy`].
//! * `MOCAP_MAX_BOOTSTRAP_ATTEMPTS`: detection attempts per bootstrap pass before giving up, `0`
//!   waits forever.
//! * `MOCAP_UDP_TARGET`: socket address the [`output::UdpEmitter`] sends packets to.
//!
//! [`PipelineConfig::from_env`]: pipeline::PipelineConfig::from_env

use log::LevelFilter;

pub mod error;
pub mod filter;
pub mod landmark;
pub mod output;
pub mod pipeline;
pub mod resolution;
pub mod timer;
pub mod tracker;
pub mod triangulation;
pub mod video;

#[cfg(test)]
mod test;

pub use error::TrackingError;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and `mocap` will log at *debug* level. `RUST_LOG` can be used to override
/// this.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
