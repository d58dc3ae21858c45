//! Frame resolutions and normalized-to-pixel conversion.

use std::fmt;

use nalgebra::{Point2, Point3};

use crate::landmark::Landmarks;

/// Resolution (`width x height`) of a camera frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// 720p resolution: `1280x720`
    pub const RES_720P: Self = Self {
        width: 1280,
        height: 720,
    };

    /// VGA resolution: `640x480`
    pub const VGA: Self = Self {
        width: 640,
        height: 480,
    };

    /// Creates a new [`Resolution`] of `width x height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the width of this [`Resolution`].
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of this [`Resolution`].
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Maps a normalized image coordinate (`[0, 1]` on both axes) to pixel units.
    ///
    /// Any Z coordinate of `point` is ignored.
    #[inline]
    pub fn to_pixels(&self, point: Point3<f32>) -> Point2<f64> {
        Point2::new(
            f64::from(point.x) * f64::from(self.width),
            f64::from(point.y) * f64::from(self.height),
        )
    }

    /// Converts a whole set of normalized landmarks to pixel units.
    ///
    /// This is the stateless transform between the 2D trackers and triangulation.
    pub fn landmarks_to_pixels(&self, landmarks: &Landmarks) -> Vec<Point2<f64>> {
        landmarks.iter().map(|p| self.to_pixels(p)).collect()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
