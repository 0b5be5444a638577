//! Track moving blobs with one MPI process per block plus a host.
//!
//! Run with `mpirun -n 9 mpi_tracking [transfer_function.bin]`. Without a transfer
//! function file the host uses a linear opacity ramp.

use std::collections::BTreeMap;
use std::sync::Arc;

use itertools::{iproduct, Itertools};
use mpi::traits::Communicator as MpiCommunicator;
use paraft::{
    comm::MpiComm,
    constants::TF_RESOLUTION,
    geometry::{GridDims, Vec3i},
    transfer_function::TransferFunction,
    volume::InMemoryVolume,
    Controller, DatasetRange, ParaftError, TrackingConfig,
};

const GLOBAL_DIMS: [usize; 3] = [64, 64, 64];

/// A sphere of value 1 travelling along the diagonal of the volume.
fn travelling_sphere(timesteps: usize) -> BTreeMap<usize, Vec<f32>> {
    let grid = GridDims::new(GLOBAL_DIMS);
    (0..timesteps)
        .map(|t| {
            let c = 24.0 + 2.0 * t as f64;
            let mut field = vec![0.0; grid.len()];
            for (z, y, x) in iproduct!(0..GLOBAL_DIMS[2], 0..GLOBAL_DIMS[1], 0..GLOBAL_DIMS[0]) {
                let d = (x as f64 - c).powi(2) + (y as f64 - c).powi(2) + (z as f64 - c).powi(2);
                if d <= 64.0 {
                    field[grid.linear_index(Vec3i::from_usize([x, y, z]))] = 1.0;
                }
            }
            (t, field)
        })
        .collect()
}

pub fn main() -> Result<(), ParaftError> {
    tracing_subscriber::fmt().init();

    // Initialise MPI
    let universe = mpi::initialize().expect("MPI is already initialised");
    let world = universe.world();
    let rank = world.rank();

    let config = TrackingConfig {
        partition: [2, 2, 2],
        dataset: DatasetRange { start: 0, end: 3 },
        num_track_steps: 3,
        ..Default::default()
    };

    let tf = if rank == 0 {
        match std::env::args().nth(1) {
            Some(path) => Some(TransferFunction::load(path)?),
            None => {
                let ramp = (0..TF_RESOLUTION).map(|i| i as f32 / (TF_RESOLUTION - 1) as f32).collect_vec();
                Some(TransferFunction::from_opacity(&ramp)?)
            }
        }
    } else {
        None
    };

    let fields = Arc::new(travelling_sphere(config.dataset.end + 1));
    let volume = InMemoryVolume::new(GLOBAL_DIMS, config.partition, fields)?;

    let controller = Controller::new(config, MpiComm::process_groups(world))?;
    for outcome in controller.run(tf, volume)? {
        println!("{}", outcome.record.to_csv_row());
    }

    Ok(())
}
