use crate::error::TrackingError;
use crate::filter::{FilterBank, FilterParams};
use crate::landmark::Landmarks;

/// Tracks triangulated landmark positions in metric 3D space.
///
/// This is the last smoothing stage before positions are emitted.
pub struct Tracker3D {
    bank: FilterBank,
    landmark_count: usize,
}

impl Tracker3D {
    pub fn new(params: FilterParams, landmark_count: usize) -> Self {
        Self {
            bank: FilterBank::new("3D tracker", params),
            landmark_count,
        }
    }

    pub fn landmark_count(&self) -> usize {
        self.landmark_count
    }

    /// Initializes the filters from a history of triangulated positions.
    pub fn initialize(&mut self, history: &[Landmarks]) -> Result<(), TrackingError> {
        self.bank.initialize(history, self.landmark_count)
    }

    pub fn is_ready(&self) -> bool {
        self.bank.is_ready()
    }

    /// Filters freshly triangulated positions, returning the forecast positions.
    pub fn apply_filtration(&mut self, points: &Landmarks) -> Result<Landmarks, TrackingError> {
        self.bank.correct_and_predict(points)
    }

    /// Forecasts positions for a frame without triangulation result.
    pub fn apply_prediction(&mut self) -> Result<Landmarks, TrackingError> {
        self.bank.predict()
    }

    pub fn filter_bank(&self) -> &FilterBank {
        &self.bank
    }

    pub fn filter_bank_mut(&mut self) -> &mut FilterBank {
        &mut self.bank
    }
}
