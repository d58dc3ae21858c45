use std::{
    panic::resume_unwind,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use anyhow::Context;

use crate::timer::{FpsCounter, Timer};
use crate::triangulation::CameraIntrinsics;

use super::{FrameSlot, FrameSource, Stamped};

/// A camera continuously capturing frames on its own thread.
///
/// The capture thread runs until [`Camera::stop`] is called, the camera is dropped, or the
/// [`FrameSource`] returns an error. Stopping is cooperative: a capture that is already blocked in
/// [`FrameSource::read`] finishes first.
pub struct Camera<F> {
    name: String,
    slot: FrameSlot<F>,
    intrinsics: CameraIntrinsics,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl<F: Send + Sync + 'static> Camera<F> {
    /// Starts capturing frames from `source`.
    ///
    /// `intrinsics` are the calibrated intrinsics of the frames `source` produces.
    pub fn spawn<S>(
        name: impl Into<String>,
        mut source: S,
        intrinsics: CameraIntrinsics,
    ) -> anyhow::Result<Self>
    where
        S: FrameSource<Frame = F>,
    {
        let name = name.into();
        let slot = FrameSlot::new();
        let running = Arc::new(AtomicBool::new(true));

        let handle = thread::Builder::new()
            .name(format!("camera {name}"))
            .spawn({
                let name = name.clone();
                let slot = slot.clone();
                let running = running.clone();
                move || {
                    log::trace!("camera '{name}' starting");
                    let t_read = Timer::new("read");
                    let mut fps = FpsCounter::new(format!("camera {name}"));
                    while running.load(Ordering::Acquire) {
                        match t_read.time(|| source.read()) {
                            Ok(frame) => {
                                slot.publish(frame);
                                fps.tick_with([&t_read]);
                            }
                            Err(e) => {
                                log::error!("camera '{name}' failed: {e:#}");
                                break;
                            }
                        }
                    }
                    running.store(false, Ordering::Release);
                    log::trace!("camera '{name}' exiting");
                }
            })
            .with_context(|| format!("failed to spawn capture thread for camera '{name}'"))?;

        log::info!("started camera '{name}'");
        Ok(Self {
            name,
            slot,
            intrinsics,
            running,
            handle: Some(handle),
        })
    }
}

impl<F> Camera<F> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the capture thread is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns the most recently captured frame.
    pub fn snapshot(&self) -> Option<Stamped<F>> {
        self.slot.snapshot()
    }

    /// Intrinsic matrix and distortion coefficients of this camera.
    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    /// Asks the capture thread to exit after the current frame.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            log::info!("stopping camera '{}'", self.name);
        }
    }

    /// Returns a handle that can stop this camera from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flags: vec![self.running.clone()],
        }
    }
}

/// Stops one or more cameras without access to the [`Camera`] objects.
#[derive(Clone)]
pub struct StopHandle {
    flags: Vec<Arc<AtomicBool>>,
}

impl StopHandle {
    /// Combines two handles into one stopping the cameras of both.
    pub fn join(mut self, other: StopHandle) -> Self {
        self.flags.extend(other.flags);
        self
    }

    /// Asks all cameras to stop, see [`Camera::stop`].
    pub fn stop(&self) {
        for flag in &self.flags {
            flag.store(false, Ordering::Release);
        }
    }
}

impl<F> Drop for Camera<F> {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(payload) = handle.join() {
                if !thread::panicking() {
                    resume_unwind(payload);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::resolution::Resolution;
    use crate::video::Frame;

    struct Counter {
        next: u32,
        limit: u32,
    }

    impl Frame for u32 {
        fn resolution(&self) -> Resolution {
            Resolution::VGA
        }
    }

    impl FrameSource for Counter {
        type Frame = u32;

        fn read(&mut self) -> anyhow::Result<u32> {
            if self.next == self.limit {
                anyhow::bail!("end of stream");
            }
            self.next += 1;
            Ok(self.next)
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let start = Instant::now();
        while !cond() {
            assert!(start.elapsed() < Duration::from_secs(5), "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn stops_on_read_error() {
        let intrinsics = CameraIntrinsics::pinhole(500.0, 500.0, 320.0, 240.0);
        let cam = Camera::spawn("test", Counter { next: 0, limit: 50 }, intrinsics.clone()).unwrap();
        assert_eq!(cam.name(), "test");
        assert_eq!(cam.intrinsics(), &intrinsics);

        wait_until(|| !cam.is_running());
        let last = cam.snapshot().unwrap();
        assert_eq!(*last.frame(), 50);
        assert_eq!(last.seq(), 49);
    }

    #[test]
    fn stop_is_cooperative() {
        let cam = Camera::spawn(
            "endless",
            Counter {
                next: 0,
                limit: u32::MAX,
            },
            CameraIntrinsics::pinhole(500.0, 500.0, 320.0, 240.0),
        )
        .unwrap();
        wait_until(|| cam.snapshot().is_some());
        assert!(cam.is_running());

        cam.stop_handle().stop();
        assert!(!cam.is_running());
        drop(cam);
    }
}
