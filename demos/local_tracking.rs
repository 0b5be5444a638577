//! Track moving blobs on a 2x2x2 partition, one thread per process.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use itertools::{iproduct, Itertools};
use paraft::{
    comm::LocalComm,
    constants::TF_RESOLUTION,
    geometry::{GridDims, Vec3i},
    tools::seeded_rng,
    transfer_function::TransferFunction,
    volume::InMemoryVolume,
    Controller, DatasetRange, ParaftError, TrackingConfig,
};
use rand::Rng;

const GLOBAL_DIMS: [usize; 3] = [32, 32, 32];
const NBLOBS: usize = 6;

/// Spheres of value 1 drifting through the volume with constant velocity.
fn moving_blobs(timesteps: usize) -> BTreeMap<usize, Vec<f32>> {
    let mut rng = seeded_rng(0);
    let grid = GridDims::new(GLOBAL_DIMS);

    let blobs = (0..NBLOBS)
        .map(|_| {
            let centre = [
                rng.gen_range(6.0..26.0),
                rng.gen_range(6.0..26.0),
                rng.gen_range(6.0..26.0),
            ];
            let velocity = [
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            ];
            let radius: f64 = rng.gen_range(2.0..5.0);
            (centre, velocity, radius)
        })
        .collect_vec();

    (0..timesteps)
        .map(|t| {
            let mut field = vec![0.0; grid.len()];
            for (centre, velocity, radius) in &blobs {
                let c = [
                    centre[0] + velocity[0] * t as f64,
                    centre[1] + velocity[1] * t as f64,
                    centre[2] + velocity[2] * t as f64,
                ];
                for (z, y, x) in iproduct!(0..GLOBAL_DIMS[2], 0..GLOBAL_DIMS[1], 0..GLOBAL_DIMS[0]) {
                    let d = (x as f64 - c[0]).powi(2)
                        + (y as f64 - c[1]).powi(2)
                        + (z as f64 - c[2]).powi(2);
                    if d <= radius * radius {
                        field[grid.linear_index(Vec3i::from_usize([x, y, z]))] = 1.0;
                    }
                }
            }
            (t, field)
        })
        .collect()
}

pub fn main() -> Result<(), ParaftError> {
    tracing_subscriber::fmt().init();

    let config = TrackingConfig {
        partition: [2, 2, 2],
        dataset: DatasetRange { start: 0, end: 4 },
        num_track_steps: 4,
        comm_timeout: Some(Duration::from_secs(60)),
        ..Default::default()
    };
    let nworkers: usize = config.partition.iter().product();

    let ramp = (0..TF_RESOLUTION).map(|i| i as f32 / (TF_RESOLUTION - 1) as f32).collect_vec();
    let tf = TransferFunction::from_opacity(&ramp)?;
    let fields = Arc::new(moving_blobs(config.dataset.end + 1));

    let mut handles = Vec::with_capacity(nworkers + 1);
    for groups in LocalComm::universe(nworkers, config.comm_timeout) {
        let controller = Controller::new(config.clone(), groups)?;
        let volume = InMemoryVolume::new(GLOBAL_DIMS, config.partition, fields.clone())?;
        let tf = controller.is_host().then(|| tf.clone());
        handles.push(thread::spawn(move || controller.run(tf, volume)));
    }

    for (rank, handle) in handles.into_iter().enumerate() {
        let outcomes = handle.join().expect("process thread panicked")?;
        // Every worker merged the same graph, one of them is enough.
        if rank == 1 {
            println!("workers,features,px,py,pz,track,local_graph,global_graph");
            for outcome in outcomes {
                println!("{}", outcome.record.to_csv_row());
            }
        }
    }

    Ok(())
}
