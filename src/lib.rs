//! Block-parallel extraction and tracking of features in time-varying volumes.
//!
//! The global volume is split into a grid of blocks, one per worker. Each worker
//! tracks the features of its block over time ([feature_tracker]), derives the
//! edges where its features cross block faces ([block_controller]) and merges these
//! edges with all other workers into one global graph ([controller]). Message
//! passing goes through the [comm::Communicator] trait, over threads or MPI.
#![cfg_attr(feature = "strict", deny(warnings), deny(unused_crate_dependencies))]
#![warn(missing_docs)]

pub mod block_controller;
pub mod comm;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod feature;
pub mod feature_tracker;
pub mod geometry;
pub mod graph;
pub mod tools;
pub mod transfer_function;
pub mod volume;

pub use config::{DatasetRange, TrackingConfig};
pub use controller::{Controller, StepOutcome, StepRecord};
pub use error::{ParaftError, Result};
