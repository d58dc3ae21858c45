//! Hand landmark topology and fixed-size landmark containers.

use std::ops::{Index, IndexMut};

use nalgebra::Point3;

use crate::error::TrackingError;

/// Number of landmarks of a tracked hand.
pub const HAND_LANDMARK_COUNT: usize = 21;

/// Names of the hand landmarks, in the order the landmark networks output them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

impl LandmarkIdx {
    /// All landmarks, ordered by index.
    pub const ALL: [LandmarkIdx; HAND_LANDMARK_COUNT] = {
        use LandmarkIdx::*;
        [
            Wrist,
            ThumbCmc,
            ThumbMcp,
            ThumbIp,
            ThumbTip,
            IndexFingerMcp,
            IndexFingerPip,
            IndexFingerDip,
            IndexFingerTip,
            MiddleFingerMcp,
            MiddleFingerPip,
            MiddleFingerDip,
            MiddleFingerTip,
            RingFingerMcp,
            RingFingerPip,
            RingFingerDip,
            RingFingerTip,
            PinkyMcp,
            PinkyPip,
            PinkyDip,
            PinkyTip,
        ]
    };

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Returns the landmark stored at position `index`, if there is one.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// An ordered set of landmark positions with a length fixed at construction.
///
/// Position `i` always holds landmark `i`; filters, histories and detections are correlated by
/// that position only.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    positions: Box<[Point3<f32>]>,
}

impl Landmarks {
    /// Creates a new [`Landmarks`] collection containing `len` landmarks at the origin.
    pub fn new(len: usize) -> Self {
        Self {
            positions: vec![Point3::origin(); len].into_boxed_slice(),
        }
    }

    /// Collects landmark positions from an iterator.
    pub fn from_positions(positions: impl IntoIterator<Item = Point3<f32>>) -> Self {
        Self {
            positions: positions.into_iter().collect(),
        }
    }

    /// Creates landmarks on the image plane (`z = 0`) from 2D coordinates.
    pub fn from_image_points(points: impl IntoIterator<Item = [f32; 2]>) -> Self {
        Self::from_positions(points.into_iter().map(|[x, y]| Point3::new(x, y, 0.0)))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Point3<f32>] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut [Point3<f32>] {
        &mut self.positions
    }

    pub fn iter(&self) -> impl Iterator<Item = Point3<f32>> + Clone + '_ {
        self.positions.iter().copied()
    }

    /// Returns an error unless `self` contains exactly `expected` landmarks.
    pub fn check_len(&self, expected: usize) -> Result<(), TrackingError> {
        if self.len() == expected {
            Ok(())
        } else {
            Err(TrackingError::LandmarkCountMismatch {
                expected,
                actual: self.len(),
            })
        }
    }

    pub fn map_positions(&mut self, mut f: impl FnMut(Point3<f32>) -> Point3<f32>) {
        for pos in self.positions_mut() {
            *pos = f(*pos);
        }
    }
}

impl Index<usize> for Landmarks {
    type Output = Point3<f32>;

    fn index(&self, index: usize) -> &Point3<f32> {
        &self.positions[index]
    }
}

impl IndexMut<usize> for Landmarks {
    fn index_mut(&mut self, index: usize) -> &mut Point3<f32> {
        &mut self.positions[index]
    }
}

impl Index<LandmarkIdx> for Landmarks {
    type Output = Point3<f32>;

    fn index(&self, index: LandmarkIdx) -> &Point3<f32> {
        &self.positions[index.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landmark_idx_order() {
        for (i, lm) in LandmarkIdx::ALL.iter().enumerate() {
            assert_eq!(lm.index(), i);
            assert_eq!(LandmarkIdx::from_index(i), Some(*lm));
        }
        assert_eq!(LandmarkIdx::from_index(HAND_LANDMARK_COUNT), None);
        assert_eq!(LandmarkIdx::PinkyTip.index(), HAND_LANDMARK_COUNT - 1);
    }

    #[test]
    fn check_len() {
        let lms = Landmarks::new(3);
        assert!(lms.check_len(3).is_ok());
        assert_eq!(
            lms.check_len(21),
            Err(TrackingError::LandmarkCountMismatch {
                expected: 21,
                actual: 3
            })
        );
    }

    #[test]
    fn image_points_are_flat() {
        let lms = Landmarks::from_image_points([[0.25, 0.5], [1.0, 0.0]]);
        assert_eq!(lms.len(), 2);
        assert_eq!(lms[1], Point3::new(1.0, 0.0, 0.0));
        assert!(lms.iter().all(|p| p.z == 0.0));
    }
}
