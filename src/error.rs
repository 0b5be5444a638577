//! Error types.
//!
//! Configuration problems and transport failures are fatal: they propagate out of
//! the controller and end the run. Nothing in here is retried.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum ParaftError {
    /// Misconfiguration detected at startup.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Per-block tracking failure.
    #[error("tracking error: {0}")]
    Track(#[from] TrackError),

    /// Message passing failure.
    #[error("communication error: {0}")]
    Comm(#[from] CommError),

    /// Protocol violation between host and workers.
    #[error("control error: {0}")]
    Control(#[from] ControlError),
}

/// Startup misconfigurations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The partition grid has a zero extent.
    #[error("partition {0:?} has an empty axis")]
    EmptyPartition([usize; 3]),

    /// A block coordinate lies outside of the partition grid.
    #[error("block {block:?} lies outside of partition {partition:?}")]
    BlockOutOfPartition {
        /// Coordinate of the block.
        block: [i32; 3],
        /// Partition grid.
        partition: [usize; 3],
    },

    /// The number of worker processes does not match the partition grid.
    #[error("partition {partition:?} needs {expected} workers but {actual} are running")]
    WorkerCountMismatch {
        /// Partition grid.
        partition: [usize; 3],
        /// Number of blocks.
        expected: usize,
        /// Number of workers.
        actual: usize,
    },

    /// The dataset range is empty.
    #[error("dataset range {start}..={end} is empty")]
    EmptyDataset {
        /// First timestep.
        start: usize,
        /// Last timestep.
        end: usize,
    },

    /// The opacity window is not a valid sub-interval of [0, 1].
    #[error("invalid opacity window [{low}, {high}]")]
    InvalidThresholds {
        /// Lower bound.
        low: f32,
        /// Upper bound.
        high: f32,
    },

    /// The global volume cannot be split evenly into blocks.
    #[error("volume {dims:?} is not divisible by partition {partition:?}")]
    IndivisibleVolume {
        /// Voxel dimensions of the volume.
        dims: [usize; 3],
        /// Partition grid.
        partition: [usize; 3],
    },

    /// The transfer function file could not be read.
    #[error("cannot read transfer function {path:?}: {reason}")]
    TransferFunctionFile {
        /// Path of the file.
        path: PathBuf,
        /// Why reading failed.
        reason: String,
    },

    /// The transfer function payload is malformed.
    #[error("malformed transfer function: {0}")]
    MalformedTransferFunction(String),

    /// The host started without a transfer function to broadcast.
    #[error("host has no transfer function to broadcast")]
    MissingTransferFunction,
}

/// Errors raised while tracking features inside one block.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackError {
    /// Tracking was requested before a transfer function was set.
    #[error("transfer function must be set before tracking")]
    TransferFunctionNotSet,

    /// A scalar field does not match the block dimensions.
    #[error("scalar field has {actual} values, block needs {expected}")]
    FieldSizeMismatch {
        /// Number of voxels of the block.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// The requested timestep is not available.
    #[error("timestep {0} is not loaded")]
    TimestepNotLoaded(usize),
}

/// Message passing errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommError {
    /// The peer has gone away.
    #[error("rank {peer} disconnected")]
    Disconnected {
        /// Rank of the peer.
        peer: usize,
    },

    /// The peer did not answer within the configured timeout.
    #[error("timed out waiting for rank {peer}")]
    Timeout {
        /// Rank of the peer.
        peer: usize,
    },

    /// A payload does not have the size the receiver expected.
    #[error("expected {expected} bytes from rank {peer}, got {actual}")]
    SizeMismatch {
        /// Rank of the peer.
        peer: usize,
        /// Bytes expected.
        expected: usize,
        /// Bytes received.
        actual: usize,
    },

    /// A caller supplied buffer or partition does not fit the collective.
    #[error("buffer holds {actual} elements, the collective needs {expected}")]
    BufferLength {
        /// Elements the collective needs.
        expected: usize,
        /// Elements supplied.
        actual: usize,
    },

    /// A count or displacement of a variable gather is negative.
    #[error("negative count or displacement for rank {rank}")]
    NegativePartition {
        /// Rank whose entry is negative.
        rank: usize,
    },

    /// A rank outside of the communicator was addressed.
    #[error("rank {rank} is outside of a communicator of size {size}")]
    InvalidRank {
        /// Addressed rank.
        rank: usize,
        /// Size of the communicator.
        size: usize,
    },
}

/// Host/worker protocol violations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    /// A worker received a command value it does not know.
    #[error("unknown command {0}")]
    UnknownCommand(i32),

    /// A worker process has no worker communicator.
    #[error("rank {0} is a worker but has no worker communicator")]
    MissingWorkerGroup(usize),
}

/// Crate result type.
pub type Result<T> = std::result::Result<T, ParaftError>;
