use itertools::Itertools;
use nalgebra::Point3;

use crate::error::TrackingError;
use crate::landmark::Landmarks;

use super::{FilterParams, LandmarkKalmanFilter, NoiseProfile, RollingHistory};

/// One [`LandmarkKalmanFilter`] per landmark, addressed by landmark position.
///
/// A bank is either empty (not ready) or holds exactly as many filters as it was initialized
/// with. There is no partially initialized state.
#[derive(Debug, Clone)]
pub struct FilterBank {
    filters: Vec<LandmarkKalmanFilter>,
    params: FilterParams,
    stage: &'static str,
}

impl FilterBank {
    /// Creates an empty, not yet ready filter bank.
    ///
    /// `stage` names the bank in errors and log messages.
    pub fn new(stage: &'static str, params: FilterParams) -> Self {
        Self {
            filters: Vec::new(),
            params,
            stage,
        }
    }

    /// Builds one filter per landmark from a history of captures.
    ///
    /// `landmark_count` must be at least 1, and every capture must contain exactly that many
    /// landmarks. Landmark `i` of every
    /// capture is fed into the noise estimate of filter `i`. On error, the bank is left unchanged.
    ///
    /// Any previously initialized filters are replaced.
    pub fn initialize(
        &mut self,
        history: &[Landmarks],
        landmark_count: usize,
    ) -> Result<(), TrackingError> {
        if landmark_count == 0 {
            return Err(TrackingError::NoLandmarks);
        }
        if history.is_empty() {
            return Err(TrackingError::EmptyHistory);
        }
        for capture in history {
            capture.check_len(landmark_count)?;
        }

        let mut histories = (0..landmark_count)
            .map(|_| RollingHistory::new(history.len()))
            .collect::<Vec<_>>();
        for capture in history {
            for (buf, pos) in histories.iter_mut().zip_eq(capture.iter()) {
                buf.add(pos);
            }
        }

        let filters = histories
            .iter()
            .map(|buf| {
                let noise = NoiseProfile::compute(buf)?;
                Ok(LandmarkKalmanFilter::new(noise, self.params))
            })
            .collect::<Result<Vec<_>, TrackingError>>()?;

        log::debug!(
            "{}: initialized {} filters from {} captures",
            self.stage,
            filters.len(),
            history.len()
        );
        self.filters = filters;
        Ok(())
    }

    /// Returns whether the filters have been initialized.
    pub fn is_ready(&self) -> bool {
        !self.filters.is_empty()
    }

    /// Number of filters, 0 if not ready.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn params(&self) -> FilterParams {
        self.params
    }

    /// Returns the filter of the landmark at `index`.
    pub fn filter(&self, index: usize) -> Option<&LandmarkKalmanFilter> {
        self.filters.get(index)
    }

    /// Corrects every filter with its landmark from `points` and returns the one-step-ahead
    /// forecasts.
    ///
    /// The bank is stepped as a whole: if any filter fails, none of them is changed.
    ///
    /// See [`LandmarkKalmanFilter::correct_and_predict`].
    pub fn correct_and_predict(&mut self, points: &Landmarks) -> Result<Landmarks, TrackingError> {
        self.check_ready()?;
        points.check_len(self.filters.len())?;

        let mut filters = self.filters.clone();
        let forecast = filters
            .iter_mut()
            .zip_eq(points.iter())
            .map(|(filter, pos)| filter.correct_and_predict(pos))
            .collect::<Result<Vec<Point3<f32>>, _>>()?;
        self.filters = filters;
        Ok(Landmarks::from_positions(forecast))
    }

    /// Advances every filter without a measurement.
    pub fn predict(&mut self) -> Result<Landmarks, TrackingError> {
        self.check_ready()?;
        Ok(Landmarks::from_positions(
            self.filters.iter_mut().map(|filter| filter.predict()),
        ))
    }

    /// Changes the measurement factor of all filters, including ones created later.
    pub fn update_measure_factor(&mut self, measure_factor: f32) {
        self.params.measure_factor = measure_factor;
        for filter in &mut self.filters {
            filter.update_measure_factor(measure_factor);
        }
    }

    /// Changes the process factor of all filters, including ones created later.
    pub fn update_process_factor(&mut self, process_factor: f32) {
        self.params.process_factor = process_factor;
        for filter in &mut self.filters {
            filter.update_process_factor(process_factor);
        }
    }

    fn check_ready(&self) -> Result<(), TrackingError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(TrackingError::NotReady { stage: self.stage })
        }
    }
}
