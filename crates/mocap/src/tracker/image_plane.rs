use crate::error::TrackingError;
use crate::filter::{FilterBank, FilterParams};
use crate::landmark::Landmarks;

use super::{Detection, HandDetector};

/// Tracks the landmarks of a hand in the image plane of one camera.
///
/// Landmarks are treated as 3D points with a Z coordinate that is always 0, so the filters see no
/// noise and no motion on that axis.
pub struct Tracker2D<D> {
    detector: D,
    bank: FilterBank,
    landmark_count: usize,
}

impl<D: HandDetector> Tracker2D<D> {
    pub fn new(detector: D, params: FilterParams, landmark_count: usize) -> Self {
        Self {
            detector,
            bank: FilterBank::new("2D tracker", params),
            landmark_count,
        }
    }

    pub fn landmark_count(&self) -> usize {
        self.landmark_count
    }

    /// Runs the detector on `frame`.
    ///
    /// Fails if the detector reports a hand with the wrong number of landmarks.
    pub fn detect(&mut self, frame: &D::Frame) -> Result<Detection, TrackingError> {
        match self.detector.process(frame) {
            Some(points) => {
                let landmarks = Landmarks::from_image_points(points);
                landmarks.check_len(self.landmark_count)?;
                Ok(Detection::Detected(landmarks))
            }
            None => Ok(Detection::Missed),
        }
    }

    /// Initializes the filters from a history of raw detections.
    pub fn initialize(&mut self, history: &[Landmarks]) -> Result<(), TrackingError> {
        self.bank.initialize(history, self.landmark_count)
    }

    pub fn is_ready(&self) -> bool {
        self.bank.is_ready()
    }

    /// Filters a fresh detection, returning the forecast landmark positions.
    pub fn apply_filtration(&mut self, points: &Landmarks) -> Result<Landmarks, TrackingError> {
        let mut flat = points.clone();
        flat.map_positions(|mut p| {
            p.z = 0.0;
            p
        });
        self.bank.correct_and_predict(&flat)
    }

    /// Forecasts the landmark positions for a frame in which the hand was not detected.
    pub fn apply_prediction(&mut self) -> Result<Landmarks, TrackingError> {
        self.bank.predict()
    }

    pub fn filter_bank(&self) -> &FilterBank {
        &self.bank
    }

    pub fn filter_bank_mut(&mut self) -> &mut FilterBank {
        &mut self.bank
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }
}
