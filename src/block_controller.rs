//! One block of the partition: its tracker, its data and its neighbours.

use tracing::{debug, trace};

use crate::{
    constants::NUM_FACES,
    error::{ConfigError, ParaftError},
    feature::{PredictionMode, TrackingDirection},
    feature_tracker::{FeatureTracker, OpacityWindow},
    geometry::{Face, GridDims, Vec3i},
    graph::Edge,
    transfer_function::TransferFunction,
    volume::VolumeSource,
};

/// Linear ids of the blocks across each face, in [Face] order. `None` at the domain boundary.
pub type AdjacencyTable = [Option<i32>; NUM_FACES];

/// Compute the adjacency table of the block at `block_coord`.
pub fn init_adjacent_blocks(partition: GridDims, block_coord: Vec3i) -> AdjacencyTable {
    Face::ALL.map(|face| {
        let neighbour = block_coord + face.normal();
        partition
            .contains(neighbour)
            .then(|| partition.linear_index(neighbour) as i32)
    })
}

/// Owns the tracking state of a single block.
pub struct BlockController<V: VolumeSource> {
    volume: V,
    tracker: FeatureTracker,
    partition: GridDims,
    block_coord: Vec3i,
    block_id: i32,
    adjacent_blocks: AdjacencyTable,
    local_graph: Vec<Edge>,
    current_timestep: usize,
}

impl<V: VolumeSource> BlockController<V> {
    /// Create the controller of the block at `block_coord` in `partition`.
    pub fn new(
        volume: V,
        partition: GridDims,
        block_coord: Vec3i,
        window: OpacityWindow,
        min_voxels: usize,
    ) -> Result<Self, ConfigError> {
        if !partition.contains(block_coord) {
            return Err(ConfigError::BlockOutOfPartition {
                block: block_coord.to_array(),
                partition: partition.dims(),
            });
        }

        let tracker = FeatureTracker::new(
            volume.block_dims(),
            volume.create_mask_volume(),
            window,
            min_voxels,
        );

        Ok(Self {
            tracker,
            partition,
            block_coord,
            block_id: partition.linear_index(block_coord) as i32,
            adjacent_blocks: init_adjacent_blocks(partition, block_coord),
            local_graph: Vec::new(),
            current_timestep: 0,
            volume,
        })
    }

    /// Linear id of the block.
    pub fn block_id(&self) -> i32 {
        self.block_id
    }

    /// Coordinate of the block in the partition grid.
    pub fn block_coord(&self) -> Vec3i {
        self.block_coord
    }

    /// Neighbour per face.
    pub fn adjacent_blocks(&self) -> &AdjacencyTable {
        &self.adjacent_blocks
    }

    /// This block and its live neighbours, ascending.
    pub fn neighbour_group(&self) -> Vec<i32> {
        let mut group = self
            .adjacent_blocks
            .iter()
            .flatten()
            .copied()
            .chain(std::iter::once(self.block_id))
            .collect::<Vec<_>>();
        group.sort_unstable();
        group
    }

    /// The tracker of the block.
    pub fn tracker(&self) -> &FeatureTracker {
        &self.tracker
    }

    /// Timestep the tracker state refers to.
    pub fn current_timestep(&self) -> usize {
        self.current_timestep
    }

    /// Edges produced by the last call to [BlockController::update_local_graph].
    pub fn local_graph(&self) -> &[Edge] {
        &self.local_graph
    }

    /// Hand the transfer function to the tracker.
    pub fn set_transfer_function(&mut self, tf: TransferFunction) {
        self.tracker.set_transfer_function(tf);
    }

    /// Load `timestep` and extract its features from scratch.
    pub fn extract_initial(&mut self, timestep: usize) -> Result<usize, ParaftError> {
        self.volume
            .preload(self.partition, self.block_coord, timestep)?;
        let field = self.volume.data(timestep)?;
        let count = self.tracker.extract_all_features(field)?;
        self.current_timestep = timestep;
        debug!(timestep, count, "extracted features");
        Ok(count)
    }

    /// Load `timestep` and advance all features to it.
    ///
    /// New features appearing at `timestep` are extracted as part of the step.
    pub fn track_forward(
        &mut self,
        timestep: usize,
        direction: TrackingDirection,
        mode: PredictionMode,
    ) -> Result<(), ParaftError> {
        self.volume
            .preload(self.partition, self.block_coord, timestep)?;
        let field = self.volume.data(timestep)?;
        self.tracker.track_feature(field, direction, mode)?;
        self.current_timestep = timestep;
        Ok(())
    }

    /// Rebuild the local graph from the tracked features.
    ///
    /// Each feature yields one edge per face it touches that has a neighbour. Edge
    /// centroids are in global voxel coordinates.
    pub fn update_local_graph(&mut self) -> &[Edge] {
        let origin = self
            .block_coord
            .component_mul(self.tracker.dims().as_vec3i());

        self.local_graph.clear();
        for feature in self.tracker.features() {
            for face in feature.touched_faces() {
                let (Some(neighbour), Some(centroid)) = (
                    self.adjacent_blocks[face.index()],
                    feature.boundary_centroid(face),
                ) else {
                    continue;
                };
                self.local_graph.push(Edge::new(
                    feature.id() as i32,
                    self.block_id,
                    neighbour,
                    centroid + origin,
                ));
            }
        }

        trace!(edges = self.local_graph.len(), "updated local graph");
        &self.local_graph
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use itertools::{iproduct, Itertools};

    use super::{init_adjacent_blocks, BlockController};
    use crate::{
        feature::{PredictionMode, TrackingDirection},
        feature_tracker::OpacityWindow,
        geometry::{GridDims, Vec3i},
        graph::Edge,
        transfer_function::TransferFunction,
        volume::InMemoryVolume,
    };

    #[test]
    fn test_adjacency_of_corner_block() {
        let partition = GridDims::new([2, 2, 2]);

        let table = init_adjacent_blocks(partition, Vec3i::new(0, 0, 0));

        // Left, right, bottom, top, front, back.
        assert_eq!([None, Some(1), None, Some(2), None, Some(4)], table);
    }

    #[test]
    fn test_adjacency_of_inner_block() {
        let partition = GridDims::new([3, 3, 3]);

        let table = init_adjacent_blocks(partition, Vec3i::new(1, 1, 1));

        assert_eq!(
            [Some(12), Some(14), Some(10), Some(16), Some(4), Some(22)],
            table
        );
    }

    #[test]
    fn test_adjacency_of_single_block() {
        let table = init_adjacent_blocks(GridDims::new([1, 1, 1]), Vec3i::new(0, 0, 0));

        assert!(table.iter().all(Option::is_none));
    }

    /// Global 8x4x4 volume with a 4x2x2 slab straddling the plane between x = 3 and x = 4.
    fn straddling_volume(partition: [usize; 3]) -> InMemoryVolume {
        let grid = GridDims::new([8, 4, 4]);
        let mut field = vec![0.0; grid.len()];
        for (z, y, x) in iproduct!(1..3, 1..3, 2..6) {
            field[grid.linear_index(Vec3i::from_usize([x, y, z]))] = 1.0;
        }

        let fields = BTreeMap::from([(0, field.clone()), (1, field)]);
        InMemoryVolume::new([8, 4, 4], partition, Arc::new(fields)).unwrap()
    }

    fn controller(block: [usize; 3]) -> BlockController<InMemoryVolume> {
        let partition = [2, 1, 1];
        let ramp = (0..256).map(|i| i as f32 / 255.0).collect_vec();

        let mut controller = BlockController::new(
            straddling_volume(partition),
            GridDims::new(partition),
            Vec3i::from_usize(block),
            OpacityWindow {
                low: 0.2,
                high: 1.0,
            },
            4,
        )
        .unwrap();
        controller.set_transfer_function(TransferFunction::from_opacity(&ramp).unwrap());
        controller
    }

    #[test]
    fn test_local_graph() {
        let mut left = controller([0, 0, 0]);
        let mut right = controller([1, 0, 0]);

        assert_eq!(1, left.extract_initial(0).unwrap());
        assert_eq!(1, right.extract_initial(0).unwrap());

        // Block dims are 4x4x4, the centroids floor to (2, 1, 1) and (0, 1, 1).
        assert_eq!(
            &[Edge::new(22, 0, 1, Vec3i::new(3, 1, 1))],
            left.update_local_graph()
        );
        assert_eq!(
            &[Edge::new(20, 1, 0, Vec3i::new(4, 1, 1))],
            right.update_local_graph()
        );
    }

    #[test]
    fn test_track_forward_rebuilds_graph() {
        let mut left = controller([0, 0, 0]);
        left.extract_initial(0).unwrap();
        left.update_local_graph();

        left.track_forward(1, TrackingDirection::Forward, PredictionMode::Direct)
            .unwrap();

        assert_eq!(1, left.current_timestep());
        assert_eq!(1, left.tracker().features().len());
        assert_eq!(1, left.update_local_graph().len());
        assert_eq!(1, left.local_graph().len());
    }

    #[test]
    fn test_neighbour_group() {
        assert_eq!(vec![0, 1], controller([0, 0, 0]).neighbour_group());
        assert_eq!(vec![0, 1], controller([1, 0, 0]).neighbour_group());
    }

    #[test]
    fn test_block_outside_partition() {
        let volume = straddling_volume([2, 1, 1]);
        let window = OpacityWindow {
            low: 0.2,
            high: 1.0,
        };

        assert!(BlockController::new(
            volume,
            GridDims::new([2, 1, 1]),
            Vec3i::new(2, 0, 0),
            window,
            4
        )
        .is_err());
    }
}
