use nalgebra::{Matrix3, Matrix3x6, Matrix6, Point3, Vector6};

use crate::error::TrackingError;

use super::NoiseProfile;

/// Tuning factors of a [`LandmarkKalmanFilter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    /// Scales the sampled measurement variance. Higher values trust measurements less.
    pub measure_factor: f32,
    /// Process noise added to every state component per step. Higher values follow fast motion
    /// more closely.
    pub process_factor: f32,
}

impl FilterParams {
    /// Parameters of the per-camera 2D landmark filters.
    pub const DEFAULT_2D: Self = Self {
        measure_factor: 1000.0,
        process_factor: 0.00001,
    };

    /// Parameters of the 3D landmark filters.
    pub const DEFAULT_3D: Self = Self {
        measure_factor: 1000.0,
        process_factor: 0.01,
    };

    pub fn new(measure_factor: f32, process_factor: f32) -> Self {
        Self {
            measure_factor,
            process_factor,
        }
    }
}

/// A constant-velocity Kalman filter tracking a single landmark.
///
/// The state is `[x, y, z, vx, vy, vz]`, and each step integrates the velocity into the position.
/// Only the position is observed.
///
/// The measurement noise covariance is `diag(σ²) · measure_factor`, where `σ` comes from the
/// landmark's [`NoiseProfile`]. The process noise covariance is `I · process_factor`.
#[derive(Debug, Clone)]
pub struct LandmarkKalmanFilter {
    noise: NoiseProfile,
    /// Current state estimate.
    state: Vector6<f32>,
    /// Covariance of `state`.
    error_cov: Matrix6<f32>,
    transition: Matrix6<f32>,
    measurement: Matrix3x6<f32>,
    measurement_noise_cov: Matrix3<f32>,
    process_noise_cov: Matrix6<f32>,
}

impl LandmarkKalmanFilter {
    /// Creates a filter at the origin, at rest, with identity error covariance.
    #[rustfmt::skip]
    pub fn new(noise: NoiseProfile, params: FilterParams) -> Self {
        let transition = Matrix6::new(
            1.0, 0.0, 0.0, 1.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 1.0, 0.0, 0.0, 1.0,
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        );
        let measurement = Matrix3x6::new(
            1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0, 0.0, 0.0,
        );

        Self {
            noise,
            state: Vector6::zeros(),
            error_cov: Matrix6::identity(),
            transition,
            measurement,
            measurement_noise_cov: measurement_noise_cov(&noise, params.measure_factor),
            process_noise_cov: Matrix6::identity() * params.process_factor,
        }
    }

    /// Changes the measurement factor. Only affects subsequent steps.
    pub fn update_measure_factor(&mut self, measure_factor: f32) {
        self.measurement_noise_cov = measurement_noise_cov(&self.noise, measure_factor);
    }

    /// Changes the process factor. Only affects subsequent steps.
    pub fn update_process_factor(&mut self, process_factor: f32) {
        self.process_noise_cov = Matrix6::identity() * process_factor;
    }

    /// Corrects the state with a measured position, then advances it by one step.
    ///
    /// The returned position is the *forecast for the next step*, not the corrected estimate of
    /// the current one. Downstream consumers therefore receive positions that are one frame ahead
    /// of the measurement, which compensates for the frame of latency the capture and detection
    /// stages add.
    pub fn correct_and_predict(
        &mut self,
        measured: Point3<f32>,
    ) -> Result<Point3<f32>, TrackingError> {
        self.correct(measured)?;
        Ok(self.predict())
    }

    /// Advances the state by one step without a measurement and returns the predicted position.
    ///
    /// Every call without an intervening correction grows the error covariance, so long runs of
    /// predictions quickly lose accuracy.
    pub fn predict(&mut self) -> Point3<f32> {
        self.state = self.transition * self.state;
        self.error_cov =
            self.transition * self.error_cov * self.transition.transpose() + self.process_noise_cov;
        self.position()
    }

    fn correct(&mut self, measured: Point3<f32>) -> Result<(), TrackingError> {
        let h = &self.measurement;
        let innovation = measured.coords - h * self.state;
        let innovation_cov = h * self.error_cov * h.transpose() + self.measurement_noise_cov;
        let innovation_cov_inv = innovation_cov
            .try_inverse()
            .ok_or(TrackingError::SingularInnovation)?;
        let gain = self.error_cov * h.transpose() * innovation_cov_inv;

        self.state += gain * innovation;
        let error_cov = (Matrix6::identity() - gain * h) * self.error_cov;
        // Keep the covariance symmetric, single precision drifts otherwise.
        self.error_cov = (error_cov + error_cov.transpose()) * 0.5;
        Ok(())
    }

    /// Returns the position component of the current state.
    ///
    /// After [`correct_and_predict`][Self::correct_and_predict] this is the forecast that was
    /// returned, not the corrected estimate.
    pub fn position(&self) -> Point3<f32> {
        Point3::new(self.state[0], self.state[1], self.state[2])
    }

    /// Returns the velocity component of the current state, in units per step.
    pub fn velocity(&self) -> [f32; 3] {
        [self.state[3], self.state[4], self.state[5]]
    }

    pub fn noise_profile(&self) -> &NoiseProfile {
        &self.noise
    }

    pub fn measurement_noise_cov(&self) -> &Matrix3<f32> {
        &self.measurement_noise_cov
    }

    pub fn process_noise_cov(&self) -> &Matrix6<f32> {
        &self.process_noise_cov
    }

    pub fn error_cov(&self) -> &Matrix6<f32> {
        &self.error_cov
    }
}

fn measurement_noise_cov(noise: &NoiseProfile, measure_factor: f32) -> Matrix3<f32> {
    Matrix3::from_diagonal(&noise.variance()) * measure_factor
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nalgebra::Vector3;

    use super::*;
    use crate::filter::noise::MIN_VARIANCE;

    fn filter(std_dev: [f32; 3], params: FilterParams) -> LandmarkKalmanFilter {
        LandmarkKalmanFilter::new(NoiseProfile::from_std_dev(Vector3::from(std_dev)), params)
    }

    #[test]
    fn initial_state() {
        let f = filter([0.1, 0.2, 0.3], FilterParams::new(2.0, 0.5));
        assert_eq!(f.position(), Point3::origin());
        assert_eq!(f.velocity(), [0.0; 3]);
        assert_eq!(*f.error_cov(), Matrix6::identity());
        assert_relative_eq!(
            *f.measurement_noise_cov(),
            Matrix3::from_diagonal(&Vector3::new(0.02, 0.08, 0.18)),
            epsilon = 1e-6
        );
        assert_eq!(*f.process_noise_cov(), Matrix6::identity() * 0.5);
    }

    #[test]
    fn zero_variance_axis_is_invertible() {
        let f = filter([0.01, 0.01, 0.0], FilterParams::DEFAULT_2D);
        assert_eq!(f.measurement_noise_cov()[(2, 2)], MIN_VARIANCE * 1000.0);
        assert!(f.measurement_noise_cov().try_inverse().is_some());
    }

    #[test]
    fn returns_one_step_ahead_forecast() {
        let mut f = filter([0.001; 3], FilterParams::new(1.0, 0.0001));
        // Constant velocity of 1 unit per step along X.
        let mut last = Point3::origin();
        for step in 0..100 {
            last = f
                .correct_and_predict(Point3::new(step as f32, 0.0, 0.0))
                .unwrap();
        }
        // The last measurement was at x = 99, the returned position is the forecast for x = 100.
        assert_abs_diff_eq!(last.x, 100.0, epsilon = 0.01);
        assert_abs_diff_eq!(f.velocity()[0], 1.0, epsilon = 0.01);
        assert_eq!(f.position(), last);
    }

    #[test]
    fn converges_on_constant_input() {
        let target = Point3::new(0.3, -1.2, 2.5);
        let mut f = filter([0.001; 3], FilterParams::new(1.0, 0.00001));
        let mut out = Point3::origin();
        for _ in 0..50 {
            out = f.correct_and_predict(target).unwrap();
        }
        assert_abs_diff_eq!(out, target, epsilon = 1e-3);
    }

    #[test]
    fn deterministic() {
        let mut a = filter([0.02, 0.01, 0.03], FilterParams::DEFAULT_3D);
        a.correct_and_predict(Point3::new(1.0, 2.0, 3.0)).unwrap();
        let mut b = a.clone();
        let input = Point3::new(1.1, 2.1, 2.9);
        assert_eq!(
            a.correct_and_predict(input).unwrap(),
            b.correct_and_predict(input).unwrap()
        );
    }

    #[test]
    fn predict_keeps_measurement_noise() {
        let mut f = filter([0.02, 0.01, 0.0], FilterParams::DEFAULT_3D);
        f.correct_and_predict(Point3::new(1.0, 1.0, 1.0)).unwrap();
        let noise = *f.measurement_noise_cov();
        let mut prev_var = f.error_cov()[(3, 3)];
        for _ in 0..20 {
            f.predict();
            assert_eq!(*f.measurement_noise_cov(), noise);
            // Velocity uncertainty only grows without corrections.
            let var = f.error_cov()[(3, 3)];
            assert!(var > prev_var);
            prev_var = var;
        }
    }

    #[test]
    fn prediction_extrapolates_velocity() {
        let mut f = filter([0.001; 3], FilterParams::new(1.0, 0.0001));
        for step in 0..50 {
            f.correct_and_predict(Point3::new(0.0, step as f32 * 0.5, 0.0))
                .unwrap();
        }
        let a = f.predict();
        let b = f.predict();
        assert_abs_diff_eq!(b.y - a.y, 0.5, epsilon = 0.01);
    }

    #[test]
    fn retuning_affects_noise_only() {
        let mut f = filter([0.1, 0.1, 0.1], FilterParams::new(1.0, 1.0));
        f.update_measure_factor(10.0);
        f.update_process_factor(0.25);
        assert_relative_eq!(f.measurement_noise_cov()[(0, 0)], 0.1, epsilon = 1e-6);
        assert_eq!(f.process_noise_cov()[(5, 5)], 0.25);
        assert_eq!(f.position(), Point3::origin());
    }
}
