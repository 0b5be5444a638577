//! Access to per-block scalar fields.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use itertools::iproduct;

use crate::{
    error::{ConfigError, ParaftError, TrackError},
    geometry::{GridDims, Vec3i},
};

/// Supplies the dense scalar field of one block for each timestep.
pub trait VolumeSource {
    /// Prepare the field of the block at `block_coord` within `partition` for `timestep`.
    fn preload(
        &mut self,
        partition: GridDims,
        block_coord: Vec3i,
        timestep: usize,
    ) -> Result<(), ParaftError>;

    /// The field of a previously loaded timestep.
    fn data(&self, timestep: usize) -> Result<&[f32], TrackError>;

    /// Voxel dimensions of the block.
    fn block_dims(&self) -> GridDims;

    /// Allocate a label buffer parallel to the block's field.
    fn create_mask_volume(&self) -> Vec<u32> {
        vec![0; self.block_dims().len()]
    }
}

/// A time series of global fields held in memory, sliced into blocks on demand.
#[derive(Clone, Debug)]
pub struct InMemoryVolume {
    global_dims: GridDims,
    block_dims: GridDims,
    fields: Arc<BTreeMap<usize, Vec<f32>>>,
    loaded: HashMap<usize, Vec<f32>>,
}

impl InMemoryVolume {
    /// Create a source over global fields of dimension `global_dims` split by `partition`.
    ///
    /// Every field must hold `global_dims` values in row-major order.
    pub fn new(
        global_dims: [usize; 3],
        partition: [usize; 3],
        fields: Arc<BTreeMap<usize, Vec<f32>>>,
    ) -> Result<Self, ConfigError> {
        if partition.iter().any(|&p| p == 0) {
            return Err(ConfigError::EmptyPartition(partition));
        }

        if global_dims.iter().zip(partition).any(|(&d, p)| d % p != 0) {
            return Err(ConfigError::IndivisibleVolume {
                dims: global_dims,
                partition,
            });
        }

        let block_dims = GridDims::new([
            global_dims[0] / partition[0],
            global_dims[1] / partition[1],
            global_dims[2] / partition[2],
        ]);

        Ok(Self {
            global_dims: GridDims::new(global_dims),
            block_dims,
            fields,
            loaded: HashMap::new(),
        })
    }

    /// Dimensions of the global volume.
    pub fn global_dims(&self) -> GridDims {
        self.global_dims
    }
}

impl VolumeSource for InMemoryVolume {
    fn preload(
        &mut self,
        partition: GridDims,
        block_coord: Vec3i,
        timestep: usize,
    ) -> Result<(), ParaftError> {
        if !partition.contains(block_coord) {
            return Err(ConfigError::BlockOutOfPartition {
                block: block_coord.to_array(),
                partition: partition.dims(),
            }
            .into());
        }

        let global = self
            .fields
            .get(&timestep)
            .ok_or(TrackError::TimestepNotLoaded(timestep))?;

        if global.len() != self.global_dims.len() {
            return Err(TrackError::FieldSizeMismatch {
                expected: self.global_dims.len(),
                actual: global.len(),
            }
            .into());
        }

        let origin = block_coord.component_mul(self.block_dims.as_vec3i());
        let [nx, ny, nz] = self.block_dims.dims();

        let block = iproduct!(0..nz, 0..ny, 0..nx)
            .map(|(z, y, x)| {
                let p = origin + Vec3i::from_usize([x, y, z]);
                global[self.global_dims.linear_index(p)]
            })
            .collect();

        self.loaded.insert(timestep, block);

        Ok(())
    }

    fn data(&self, timestep: usize) -> Result<&[f32], TrackError> {
        self.loaded
            .get(&timestep)
            .map(|field| field.as_slice())
            .ok_or(TrackError::TimestepNotLoaded(timestep))
    }

    fn block_dims(&self) -> GridDims {
        self.block_dims
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::{InMemoryVolume, VolumeSource};
    use crate::geometry::{GridDims, Vec3i};

    #[test]
    fn test_block_slicing() {
        // Global field value equals its linear index.
        let global = (0..4 * 2 * 2).map(|v| v as f32).collect::<Vec<_>>();
        let fields = Arc::new(BTreeMap::from([(0, global)]));

        let mut source = InMemoryVolume::new([4, 2, 2], [2, 1, 1], fields).unwrap();
        source
            .preload(GridDims::new([2, 1, 1]), Vec3i::new(1, 0, 0), 0)
            .unwrap();

        assert_eq!([2, 2, 2], source.block_dims().dims());
        assert_eq!(
            &[2.0, 3.0, 6.0, 7.0, 10.0, 11.0, 14.0, 15.0],
            source.data(0).unwrap()
        );
        assert!(source.data(1).is_err());
        assert_eq!(8, source.create_mask_volume().len());
    }

    #[test]
    fn test_indivisible_volume() {
        let fields = Arc::new(BTreeMap::new());
        assert!(InMemoryVolume::new([5, 2, 2], [2, 1, 1], fields).is_err());
    }
}
