use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

/// A frame along with its capture metadata.
pub struct Stamped<F> {
    seq: u64,
    captured_at: Instant,
    frame: Arc<F>,
}

impl<F> Stamped<F> {
    /// Sequence number of the frame, increasing by 1 with every published frame of a slot.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn frame(&self) -> &F {
        &self.frame
    }
}

impl<F> Clone for Stamped<F> {
    fn clone(&self) -> Self {
        Self {
            seq: self.seq,
            captured_at: self.captured_at,
            frame: self.frame.clone(),
        }
    }
}

impl<F> fmt::Debug for Stamped<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stamped")
            .field("seq", &self.seq)
            .field("captured_at", &self.captured_at)
            .finish_non_exhaustive()
    }
}

/// A shared cell holding the most recent frame of a camera.
///
/// Publishing a frame always replaces the previous one: there is no queue, and readers may miss
/// frames or see the same frame twice. Readers always get a complete frame, since frames are
/// reference-counted and never mutated after publishing.
pub struct FrameSlot<F> {
    inner: Arc<Mutex<Inner<F>>>,
}

struct Inner<F> {
    latest: Option<Stamped<F>>,
    next_seq: u64,
}

impl<F> FrameSlot<F> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                latest: None,
                next_seq: 0,
            })),
        }
    }

    /// Replaces the slot's frame with `frame`, captured now. Returns the frame's sequence number.
    pub fn publish(&self, frame: F) -> u64 {
        self.publish_at(frame, Instant::now())
    }

    /// Replaces the slot's frame with `frame`, captured at `captured_at`.
    pub fn publish_at(&self, frame: F, captured_at: Instant) -> u64 {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.latest = Some(Stamped {
            seq,
            captured_at,
            frame: Arc::new(frame),
        });
        seq
    }

    /// Returns the most recently published frame, if any frame was published yet.
    pub fn snapshot(&self) -> Option<Stamped<F>> {
        self.lock().latest.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<F>> {
        // Every write leaves `Inner` consistent, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F> Default for FrameSlot<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clones share the same slot.
impl<F> Clone for FrameSlot<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
