//! Crate wide constants.

/// World rank of the coordinating host process.
pub const HOST_RANK: usize = 0;

/// Default lower bound of the tracked opacity window.
pub const LOW_THRESHOLD: f32 = 0.2;

/// Default upper bound of the tracked opacity window.
pub const HIGH_THRESHOLD: f32 = 1.0;

/// Default minimum number of body voxels for a newly seeded feature.
pub const MIN_NUM_VOXEL_IN_FEATURE: usize = 10;

/// Default distance below which two boundary centroids describe the same crossing.
pub const MERGE_DISTANCE: f64 = 4.0;

/// Number of historical centroids kept per feature.
pub const HISTORY_DEPTH: usize = 3;

/// Number of faces of a block.
pub const NUM_FACES: usize = 6;

/// Number of channels per transfer function entry (RGBA).
pub const TF_CHANNELS: usize = 4;

/// Default resolution of a transfer function.
pub const TF_RESOLUTION: usize = 1024;

/// Default number of forward steps issued by the host.
pub const NUM_TRACK_STEPS: usize = 3;
