//! Host and worker sides of a distributed tracking run.
//!
//! The world communicator holds one host and one worker per block. The host owns no
//! block. It broadcasts the transfer function, then drives the workers through a fixed
//! number of forward steps with rendezvous sends and finally tells them to shut down.
//!
//! Per step every worker tracks its block, rebuilds its local graph and takes part in
//! the global graph assembly over the worker communicator. The collectives of one
//! step are entered by all workers in the same order:
//!
//! 1. barrier, track forward, barrier
//! 2. local graph, barrier
//! 3. all-gather of edge counts, variable all-gather of edges, barrier
//!
//! Every worker then merges the identical global edge list, so the merged ids agree
//! across workers without a coordinator.

use std::time::Instant;

use tracing::{debug, info, info_span, warn};

use crate::{
    block_controller::BlockController,
    comm::{Communicator, ProcessGroups, Tag},
    config::TrackingConfig,
    constants::{HOST_RANK, TF_CHANNELS},
    error::{ConfigError, ControlError, ParaftError},
    graph::{merge_correspondent_edges, restrict_to_group, Edge},
    tools::gather_to_all,
    transfer_function::TransferFunction,
    volume::VolumeSource,
};

/// Commands sent from the host to the workers.
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// The next message carries the timestep to advance to.
    SyncTimestep = 1,
    /// Run one forward step.
    TrackForward = 2,
    /// Leave the command loop.
    Shutdown = 3,
}

impl TryFrom<i32> for Command {
    type Error = ControlError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Command::SyncTimestep),
            2 => Ok(Command::TrackForward),
            3 => Ok(Command::Shutdown),
            other => Err(ControlError::UnknownCommand(other)),
        }
    }
}

/// Where a worker is in its command loop.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Blocked on the next command.
    Waiting,
    /// Advancing the block.
    Tracking,
    /// Assembling and merging the global graph.
    Merging,
}

/// Outcome of one forward step on one worker.
#[derive(Clone, Debug, PartialEq)]
pub struct StepRecord {
    /// Number of workers.
    pub worker_count: usize,
    /// Number of features crossing a block face, counting each crossing once.
    pub feature_count: usize,
    /// Partition grid.
    pub partition: [usize; 3],
    /// Seconds spent tracking, building the local graph and building the global graph.
    pub phase_times: [f64; 3],
}

impl StepRecord {
    /// Render the record as a comma separated line, without line break.
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            self.worker_count,
            self.feature_count,
            self.partition[0],
            self.partition[1],
            self.partition[2],
            self.phase_times[0],
            self.phase_times[1],
            self.phase_times[2],
        )
    }
}

/// Result of one forward step as seen by one worker.
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    /// Timing and feature count of the step.
    pub record: StepRecord,
    /// Merged edges of all blocks. Identical on every worker.
    pub global_graph: Vec<Edge>,
    /// Merged edges between this block and its neighbours.
    pub adjacent_graph: Vec<Edge>,
}

/// Entry point of every process of a run.
pub struct Controller<C: Communicator> {
    config: TrackingConfig,
    groups: ProcessGroups<C>,
}

impl<C: Communicator> Controller<C> {
    /// Check the configuration against the process layout.
    pub fn new(config: TrackingConfig, groups: ProcessGroups<C>) -> Result<Self, ConfigError> {
        config.validate()?;
        config.check_worker_count(groups.world.size().saturating_sub(1))?;
        Ok(Self { config, groups })
    }

    /// Check if this process is the host.
    pub fn is_host(&self) -> bool {
        self.groups.world.rank() == HOST_RANK
    }

    /// Run the host or the worker side, depending on the world rank.
    ///
    /// The host needs `tf` and ignores `volume`. Workers ignore `tf`, they receive it
    /// from the host. Workers return the outcome of every step, the host returns nothing.
    pub fn run<V: VolumeSource>(
        self,
        tf: Option<TransferFunction>,
        volume: V,
    ) -> Result<Vec<StepOutcome>, ParaftError> {
        if self.is_host() {
            let tf = tf.ok_or(ConfigError::MissingTransferFunction)?;
            self.run_host(&tf)?;
            Ok(Vec::new())
        } else {
            self.run_worker(volume)
        }
    }

    /// Host side: broadcast `tf` and drive all workers.
    pub fn run_host(&self, tf: &TransferFunction) -> Result<(), ParaftError> {
        let world = &self.groups.world;
        let span = info_span!("host", rank = world.rank());
        let _enter = span.enter();

        broadcast_transfer_function(world, Some(tf))?;
        info!(
            resolution = tf.resolution(),
            workers = world.size() - 1,
            "broadcast transfer function"
        );

        let last = self.config.dataset.end;
        let mut timestep = self.config.dataset.start;
        for step in 0..self.config.num_track_steps {
            if timestep >= last {
                warn!(step, timestep, "already at the last timestep");
                continue;
            }
            timestep += 1;

            for worker in (0..world.size()).filter(|&r| r != HOST_RANK) {
                world.synchronous_send(worker, Tag::Router, Command::SyncTimestep as i32)?;
                world.synchronous_send(worker, Tag::SyncTimestep, timestep as i32)?;
            }
            for worker in (0..world.size()).filter(|&r| r != HOST_RANK) {
                world.synchronous_send(worker, Tag::Router, Command::TrackForward as i32)?;
            }
            debug!(step, timestep, "issued forward step");
        }

        for worker in (0..world.size()).filter(|&r| r != HOST_RANK) {
            world.synchronous_send(worker, Tag::Router, Command::Shutdown as i32)?;
        }
        info!("workers shut down");

        Ok(())
    }

    /// Worker side: track the block assigned to this process until shutdown.
    pub fn run_worker<V: VolumeSource>(&self, volume: V) -> Result<Vec<StepOutcome>, ParaftError> {
        let world = &self.groups.world;
        let workers = self
            .groups
            .workers
            .as_ref()
            .ok_or(ControlError::MissingWorkerGroup(world.rank()))?;

        let partition = self.config.partition_grid();
        let block_coord = partition.coordinate(workers.rank());
        let span = info_span!("worker", rank = world.rank(), block = workers.rank());
        let _enter = span.enter();

        let tf = broadcast_transfer_function(world, None)?;

        let mut block = BlockController::new(
            volume,
            partition,
            block_coord,
            self.config.opacity_window(),
            self.config.min_feature_voxels,
        )?;
        block.set_transfer_function(tf);
        let count = block.extract_initial(self.config.dataset.start)?;
        info!(%block_coord, count, "extracted initial features");

        let mut worker = Worker {
            config: &self.config,
            workers,
            block,
            state: WorkerState::Waiting,
            timestep: self.config.dataset.start,
        };

        let mut outcomes = Vec::new();
        loop {
            let command = Command::try_from(world.receive(HOST_RANK, Tag::Router)?)?;
            match command {
                Command::SyncTimestep => {
                    worker.timestep = world.receive(HOST_RANK, Tag::SyncTimestep)? as usize;
                }
                Command::TrackForward => outcomes.push(worker.track_forward()?),
                Command::Shutdown => break,
            }
        }

        info!(steps = outcomes.len(), "shutting down");
        Ok(outcomes)
    }
}

struct Worker<'a, C: Communicator, V: VolumeSource> {
    config: &'a TrackingConfig,
    workers: &'a C,
    block: BlockController<V>,
    state: WorkerState,
    timestep: usize,
}

impl<C: Communicator, V: VolumeSource> Worker<'_, C, V> {
    fn transition(&mut self, state: WorkerState) {
        debug!(from = ?self.state, to = ?state, "worker state");
        self.state = state;
    }

    fn track_forward(&mut self) -> Result<StepOutcome, ParaftError> {
        self.transition(WorkerState::Tracking);

        self.workers.barrier()?;
        let t0 = Instant::now();

        self.block
            .track_forward(self.timestep, self.config.direction, self.config.prediction)?;
        self.workers.barrier()?;
        let t1 = Instant::now();

        self.block.update_local_graph();
        self.workers.barrier()?;
        let t2 = Instant::now();

        self.transition(WorkerState::Merging);
        let global_graph = self.update_global_graph()?;
        self.workers.barrier()?;
        let t3 = Instant::now();

        let adjacent_graph = restrict_to_group(&global_graph, &self.block.neighbour_group());

        let record = StepRecord {
            worker_count: self.workers.size(),
            feature_count: global_graph.len() / 2,
            partition: self.config.partition,
            phase_times: [
                (t1 - t0).as_secs_f64(),
                (t2 - t1).as_secs_f64(),
                (t3 - t2).as_secs_f64(),
            ],
        };
        info!(
            timestep = self.timestep,
            features = self.block.tracker().features().len(),
            edges = global_graph.len(),
            adjacent_edges = adjacent_graph.len(),
            record = %record.to_csv_row(),
            "finished forward step"
        );

        self.transition(WorkerState::Waiting);
        Ok(StepOutcome {
            record,
            global_graph,
            adjacent_graph,
        })
    }

    fn update_global_graph(&self) -> Result<Vec<Edge>, ParaftError> {
        let mut global_graph = gather_to_all(self.block.local_graph(), self.workers)?;
        merge_correspondent_edges(&mut global_graph, self.config.merge_distance);
        Ok(global_graph)
    }
}

/// Send the transfer function from the host to every process.
///
/// The resolution travels first so that receivers can size their table.
fn broadcast_transfer_function<C: Communicator>(
    world: &C,
    tf: Option<&TransferFunction>,
) -> Result<TransferFunction, ParaftError> {
    let mut resolution = [tf.map_or(0, |tf| tf.resolution() as u64)];
    world.broadcast_into(HOST_RANK, &mut resolution)?;

    let mut rgba = match tf {
        Some(tf) => tf.rgba().to_vec(),
        None => vec![0.0f32; resolution[0] as usize * TF_CHANNELS],
    };
    world.broadcast_into(HOST_RANK, &mut rgba)?;

    Ok(TransferFunction::from_rgba(rgba)?)
}
