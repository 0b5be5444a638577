//! Run configuration.

use std::time::Duration;

use crate::{
    constants::{
        HIGH_THRESHOLD, LOW_THRESHOLD, MERGE_DISTANCE, MIN_NUM_VOXEL_IN_FEATURE, NUM_TRACK_STEPS,
    },
    error::ConfigError,
    feature::{PredictionMode, TrackingDirection},
    feature_tracker::OpacityWindow,
    geometry::GridDims,
};

/// Inclusive range of timesteps of a dataset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DatasetRange {
    /// First timestep, extracted before tracking starts.
    pub start: usize,
    /// Last timestep the host advances to.
    pub end: usize,
}

impl Default for DatasetRange {
    fn default() -> Self {
        Self { start: 0, end: 1 }
    }
}

/// Parameters shared by the host and all workers.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackingConfig {
    /// Number of blocks along each axis.
    pub partition: [usize; 3],
    /// Timesteps available for tracking.
    pub dataset: DatasetRange,
    /// Number of forward steps the host issues.
    pub num_track_steps: usize,
    /// Lower bound of the opacity window.
    pub low_threshold: f32,
    /// Upper bound of the opacity window.
    pub high_threshold: f32,
    /// Smallest body a newly extracted feature may have.
    pub min_feature_voxels: usize,
    /// Largest centroid distance at which two edges describe the same crossing.
    pub merge_distance: f64,
    /// Frontier prediction scheme.
    pub prediction: PredictionMode,
    /// Direction of time.
    pub direction: TrackingDirection,
    /// Give up on a peer after this long. Ignored by transports without timeouts.
    pub comm_timeout: Option<Duration>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            partition: [1, 1, 1],
            dataset: DatasetRange::default(),
            num_track_steps: NUM_TRACK_STEPS,
            low_threshold: LOW_THRESHOLD,
            high_threshold: HIGH_THRESHOLD,
            min_feature_voxels: MIN_NUM_VOXEL_IN_FEATURE,
            merge_distance: MERGE_DISTANCE,
            prediction: PredictionMode::default(),
            direction: TrackingDirection::default(),
            comm_timeout: None,
        }
    }
}

impl TrackingConfig {
    /// Check the configuration for values no run can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partition.iter().any(|&p| p == 0) {
            return Err(ConfigError::EmptyPartition(self.partition));
        }

        if self.dataset.end < self.dataset.start {
            return Err(ConfigError::EmptyDataset {
                start: self.dataset.start,
                end: self.dataset.end,
            });
        }

        let (low, high) = (self.low_threshold, self.high_threshold);
        if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low > high {
            return Err(ConfigError::InvalidThresholds { low, high });
        }

        Ok(())
    }

    /// Check that `nworkers` processes can cover the partition, one block each.
    pub fn check_worker_count(&self, nworkers: usize) -> Result<(), ConfigError> {
        let expected = self.partition_grid().len();
        if expected == nworkers {
            Ok(())
        } else {
            Err(ConfigError::WorkerCountMismatch {
                partition: self.partition,
                expected,
                actual: nworkers,
            })
        }
    }

    /// The partition as a grid of blocks.
    pub fn partition_grid(&self) -> GridDims {
        GridDims::new(self.partition)
    }

    /// The opacity window features are grown in.
    pub fn opacity_window(&self) -> OpacityWindow {
        OpacityWindow {
            low: self.low_threshold,
            high: self.high_threshold,
        }
    }
}
