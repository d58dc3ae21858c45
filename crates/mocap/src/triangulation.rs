//! Stereo triangulation of landmark positions.
//!
//! The left camera is the origin of the 3D coordinate system. The right camera is related to it by
//! [`StereoExtrinsics`], so the projection matrices are `P_left = K_left · [I | 0]` and
//! `P_right = K_right · [R | T]`. Every landmark is recovered with the linear (DLT) method by
//! solving the homogeneous system built from both projections.

use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Point3, Vector2, Vector3};

use crate::error::TrackingError;
use crate::landmark::Landmarks;

/// Singular value ratio under which the linear system is considered rank deficient.
const MIN_CONDITION: f64 = 1e-9;

/// Homogeneous coordinate magnitude under which a point is considered to lie at infinity.
const MIN_HOMOGENEOUS_W: f64 = 1e-9;

const UNDISTORT_ITERATIONS: usize = 10;

/// Intrinsic calibration of a single camera, as produced by the external calibration procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraIntrinsics {
    matrix: Matrix3<f64>,
    /// OpenCV ordering: `k1, k2, p1, p2, k3`.
    distortion: [f64; 5],
}

impl CameraIntrinsics {
    /// Creates intrinsics from a 3x3 camera matrix, without lens distortion.
    pub fn new(matrix: Matrix3<f64>) -> Self {
        Self {
            matrix,
            distortion: [0.0; 5],
        }
    }

    /// Creates intrinsics for a pinhole camera with focal lengths `fx`, `fy` (in pixels) and
    /// principal point `(cx, cy)`.
    #[rustfmt::skip]
    pub fn pinhole(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self::new(Matrix3::new(
            fx, 0.0, cx,
            0.0, fy, cy,
            0.0, 0.0, 1.0,
        ))
    }

    /// Sets the distortion coefficients.
    ///
    /// Coefficients are in OpenCV order (`k1, k2, p1, p2, k3`). Missing trailing coefficients are
    /// treated as 0, any beyond the fifth are ignored.
    pub fn with_distortion(mut self, coefficients: &[f64]) -> Self {
        self.distortion = [0.0; 5];
        for (dst, src) in self.distortion.iter_mut().zip(coefficients) {
            *dst = *src;
        }
        self
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn distortion_coefficients(&self) -> &[f64; 5] {
        &self.distortion
    }

    pub fn has_distortion(&self) -> bool {
        self.distortion.iter().any(|&c| c != 0.0)
    }

    /// Removes lens distortion from a pixel coordinate.
    ///
    /// The distortion model is inverted by fixed-point iteration, which converges for the moderate
    /// distortion of typical webcams. Without distortion coefficients, `pixel` is returned as-is.
    pub fn undistort_pixel(&self, pixel: Point2<f64>) -> Point2<f64> {
        if !self.has_distortion() {
            return pixel;
        }

        let (fx, fy) = (self.matrix[(0, 0)], self.matrix[(1, 1)]);
        let (cx, cy) = (self.matrix[(0, 2)], self.matrix[(1, 2)]);
        let skew = self.matrix[(0, 1)];

        let yd = (pixel.y - cy) / fy;
        let xd = (pixel.x - cx - skew * yd) / fx;
        let distorted = Vector2::new(xd, yd);

        let mut n = distorted;
        for _ in 0..UNDISTORT_ITERATIONS {
            n -= self.distort(n) - distorted;
        }

        Point2::new(fx * n.x + skew * n.y + cx, fy * n.y + cy)
    }

    fn distort(&self, n: Vector2<f64>) -> Vector2<f64> {
        let [k1, k2, p1, p2, k3] = self.distortion;
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (k1 + r2 * (k2 + r2 * k3));
        let x_tan = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let y_tan = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }
}

/// Rotation and translation relating the right camera to the left camera.
///
/// A point `x_left` in the left camera's frame is at `R · x_left + T` in the right camera's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoExtrinsics {
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
}

impl StereoExtrinsics {
    /// Creates extrinsics from the `R` and `T` output of a stereo calibration.
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Creates extrinsics from the right camera's orientation and its optical center, expressed
    /// in the left camera's frame.
    ///
    /// For two parallel cameras where the right one is mounted `b` to the right of the left one,
    /// `center` is `(b, 0, 0)`.
    pub fn from_right_camera_center(rotation: Matrix3<f64>, center: Vector3<f64>) -> Self {
        Self::new(rotation, -(rotation * center))
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }
}

/// Projection matrix `K · [I | 0]` of the left (reference) camera.
pub fn left_projection(k_left: &Matrix3<f64>) -> Matrix3x4<f64> {
    let mut rt = Matrix3x4::zeros();
    rt.fixed_view_mut::<3, 3>(0, 0).fill_with_identity();
    k_left * rt
}

/// Projection matrix `K · [R | T]` of the right camera.
pub fn right_projection(k_right: &Matrix3<f64>, extrinsics: &StereoExtrinsics) -> Matrix3x4<f64> {
    let mut rt = Matrix3x4::zeros();
    rt.fixed_view_mut::<3, 3>(0, 0).copy_from(&extrinsics.rotation);
    rt.fixed_view_mut::<3, 1>(0, 3).copy_from(&extrinsics.translation);
    k_right * rt
}

/// Projects a 3D point through a camera, returning its pixel coordinate.
///
/// Returns [`None`] if the point lies on the camera's principal plane.
pub fn project(projection: &Matrix3x4<f64>, point: &Point3<f64>) -> Option<Point2<f64>> {
    let p = projection * point.to_homogeneous();
    if p.z.abs() <= f64::EPSILON {
        return None;
    }
    Some(Point2::new(p.x / p.z, p.y / p.z))
}

/// Triangulates a single point observed by two cameras with projection matrices `p_left` and
/// `p_right`.
///
/// `landmark` is only used to label the error. The point fails to triangulate if the two views do
/// not determine a unique solution (eg. identical cameras), if it lies at infinity (parallel
/// rays), or if the result is not finite.
pub fn triangulate_point(
    p_left: &Matrix3x4<f64>,
    p_right: &Matrix3x4<f64>,
    left: Point2<f64>,
    right: Point2<f64>,
    landmark: usize,
) -> Result<Point3<f64>, TrackingError> {
    let degenerate = TrackingError::DegenerateTriangulation { landmark };

    let mut a = Matrix4::zeros();
    for (i, (cam, p)) in [(p_left, left), (p_right, right)].into_iter().enumerate() {
        a.set_row(2 * i, &(cam.row(2) * p.x - cam.row(0)));
        a.set_row(2 * i + 1, &(cam.row(2) * p.y - cam.row(1)));
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or_else(|| degenerate.clone())?;

    // Singular values are not guaranteed to be sorted.
    let mut order = [0, 1, 2, 3];
    order.sort_by(|&i, &j| svd.singular_values[i].total_cmp(&svd.singular_values[j]));
    let largest = svd.singular_values[order[3]];
    let second_smallest = svd.singular_values[order[1]];
    if largest.is_nan() || largest <= 0.0 || second_smallest / largest < MIN_CONDITION {
        log::trace!(
            "landmark {landmark}: rank deficient system, singular values {:?}",
            svd.singular_values.as_slice()
        );
        return Err(degenerate);
    }

    let x = v_t.row(order[0]);
    let w = x[3];
    if w.abs() < MIN_HOMOGENEOUS_W {
        log::trace!("landmark {landmark}: point at infinity (w = {w})");
        return Err(degenerate);
    }

    let point = Point3::new(x[0] / w, x[1] / w, x[2] / w);
    if point.iter().all(|c| c.is_finite()) {
        Ok(point)
    } else {
        Err(degenerate)
    }
}

/// Triangulates every landmark from their pixel coordinates in both cameras.
///
/// `left` and `right` must contain the same number of points, and be in pixel units (see
/// [`Resolution::landmarks_to_pixels`]). The first landmark that cannot be triangulated fails the
/// whole set.
///
/// [`Resolution::landmarks_to_pixels`]: crate::resolution::Resolution::landmarks_to_pixels
pub fn triangulate(
    left: &[Point2<f64>],
    right: &[Point2<f64>],
    k_left: &Matrix3<f64>,
    k_right: &Matrix3<f64>,
    extrinsics: &StereoExtrinsics,
) -> Result<Landmarks, TrackingError> {
    let p_left = left_projection(k_left);
    let p_right = right_projection(k_right, extrinsics);
    triangulate_with(&p_left, &p_right, left, right)
}

fn triangulate_with(
    p_left: &Matrix3x4<f64>,
    p_right: &Matrix3x4<f64>,
    left: &[Point2<f64>],
    right: &[Point2<f64>],
) -> Result<Landmarks, TrackingError> {
    if left.len() != right.len() {
        return Err(TrackingError::LandmarkCountMismatch {
            expected: left.len(),
            actual: right.len(),
        });
    }

    let points = left
        .iter()
        .zip(right)
        .enumerate()
        .map(|(i, (&l, &r))| triangulate_point(p_left, p_right, l, r, i).map(|p| p.cast::<f32>()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Landmarks::from_positions(points))
}

/// A calibrated pair of cameras.
///
/// Caches both projection matrices so that triangulating a frame does not rebuild them.
#[derive(Debug, Clone)]
pub struct StereoRig {
    left: CameraIntrinsics,
    right: CameraIntrinsics,
    extrinsics: StereoExtrinsics,
    p_left: Matrix3x4<f64>,
    p_right: Matrix3x4<f64>,
}

impl StereoRig {
    pub fn new(
        left: CameraIntrinsics,
        right: CameraIntrinsics,
        extrinsics: StereoExtrinsics,
    ) -> Self {
        let p_left = left_projection(left.matrix());
        let p_right = right_projection(right.matrix(), &extrinsics);
        Self {
            left,
            right,
            extrinsics,
            p_left,
            p_right,
        }
    }

    pub fn left(&self) -> &CameraIntrinsics {
        &self.left
    }

    pub fn right(&self) -> &CameraIntrinsics {
        &self.right
    }

    pub fn extrinsics(&self) -> &StereoExtrinsics {
        &self.extrinsics
    }

    pub fn left_projection(&self) -> &Matrix3x4<f64> {
        &self.p_left
    }

    pub fn right_projection(&self) -> &Matrix3x4<f64> {
        &self.p_right
    }

    /// Removes lens distortion from the pixel coordinates seen by each camera.
    pub fn undistort(&self, left: &mut [Point2<f64>], right: &mut [Point2<f64>]) {
        for p in left {
            *p = self.left.undistort_pixel(*p);
        }
        for p in right {
            *p = self.right.undistort_pixel(*p);
        }
    }

    /// Triangulates every landmark from pixel coordinates, see [`triangulate`].
    pub fn triangulate(
        &self,
        left: &[Point2<f64>],
        right: &[Point2<f64>],
    ) -> Result<Landmarks, TrackingError> {
        triangulate_with(&self.p_left, &self.p_right, left, right)
    }
}
