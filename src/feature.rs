//! Features and their motion prediction.

use crate::{
    constants::{HISTORY_DEPTH, NUM_FACES},
    geometry::{Face, GridDims, Vec3i},
};

/// How the frontier of a feature is moved before it is regrown.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PredictionMode {
    /// No motion.
    #[default]
    Direct,
    /// Constant velocity from the last two centroids.
    Linear,
    /// Second order extrapolation from the last three centroids.
    Quadratic,
}

/// Direction of time in which features are tracked.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TrackingDirection {
    /// Towards later timesteps.
    #[default]
    Forward,
    /// Towards earlier timesteps.
    Backward,
}

/// Centroids of the most recent steps, newest first.
pub type CentroidHistory = [Option<[f64; 3]>; HISTORY_DEPTH];

/// A connected region of voxels whose opacity lies in the tracked window.
#[derive(Clone, Debug)]
pub struct Feature {
    pub(crate) id: usize,
    pub(crate) label: u32,
    pub(crate) centroid_sum: [i64; 3],
    pub(crate) centroid: [f64; 3],
    pub(crate) body: Vec<Vec3i>,
    pub(crate) edge: Vec<Vec3i>,
    pub(crate) boundary: [Option<Vec3i>; NUM_FACES],
    pub(crate) history: CentroidHistory,
}

impl Feature {
    pub(crate) fn new(label: u32) -> Self {
        Self {
            id: 0,
            label,
            centroid_sum: [0; 3],
            centroid: [0.0; 3],
            body: Vec::new(),
            edge: Vec::new(),
            boundary: [None; NUM_FACES],
            history: [None; HISTORY_DEPTH],
        }
    }

    /// Position-keyed identifier: the linear voxel index of the centroid.
    ///
    /// Recomputed every step, so it moves with the feature.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Mask value of the feature. Stable for as long as the feature is tracked in its block.
    pub fn label(&self) -> u32 {
        self.label
    }

    /// Mean of the body voxel coordinates.
    pub fn centroid(&self) -> [f64; 3] {
        self.centroid
    }

    /// Voxels currently inside the feature.
    pub fn body(&self) -> &[Vec3i] {
        &self.body
    }

    /// Growth frontier.
    pub fn edge(&self) -> &[Vec3i] {
        &self.edge
    }

    /// Centroid history, newest first.
    pub fn history(&self) -> &CentroidHistory {
        &self.history
    }

    /// Mean position of the body voxels lying on `face`, if the feature touches it.
    pub fn boundary_centroid(&self, face: Face) -> Option<Vec3i> {
        self.boundary[face.index()]
    }

    /// Faces of the block the feature touches.
    pub fn touched_faces(&self) -> impl Iterator<Item = Face> + '_ {
        Face::ALL
            .into_iter()
            .filter(move |face| self.boundary[face.index()].is_some())
    }

    pub(crate) fn add_voxel(&mut self, p: Vec3i) {
        self.body.push(p);
        self.centroid_sum[0] += p.x as i64;
        self.centroid_sum[1] += p.y as i64;
        self.centroid_sum[2] += p.z as i64;
    }

    pub(crate) fn clear_body(&mut self) -> Vec<Vec3i> {
        self.centroid_sum = [0; 3];
        std::mem::take(&mut self.body)
    }

    /// Recompute the body sum after voxels were dropped from the body list.
    pub(crate) fn resum(&mut self) {
        self.centroid_sum = self.body.iter().fold([0; 3], |acc, p| {
            [acc[0] + p.x as i64, acc[1] + p.y as i64, acc[2] + p.z as i64]
        });
    }

    /// Update centroid, id and face contacts from the current body.
    ///
    /// The body must not be empty.
    pub(crate) fn update_geometry(&mut self, dims: &GridDims) {
        let n = self.body.len() as f64;
        self.centroid = [
            self.centroid_sum[0] as f64 / n,
            self.centroid_sum[1] as f64 / n,
            self.centroid_sum[2] as f64 / n,
        ];

        let voxel = dims.clamp(Vec3i::new(
            self.centroid[0].floor() as i32,
            self.centroid[1].floor() as i32,
            self.centroid[2].floor() as i32,
        ));
        self.id = dims.linear_index(voxel);

        let mut sums = [[0i64; 3]; NUM_FACES];
        let mut counts = [0i64; NUM_FACES];
        for &p in &self.body {
            for face in dims.faces_of(p) {
                let sum = &mut sums[face.index()];
                sum[0] += p.x as i64;
                sum[1] += p.y as i64;
                sum[2] += p.z as i64;
                counts[face.index()] += 1;
            }
        }

        for face in Face::ALL {
            let i = face.index();
            self.boundary[i] = (counts[i] > 0).then(|| {
                Vec3i::new(
                    (sums[i][0] / counts[i]) as i32,
                    (sums[i][1] / counts[i]) as i32,
                    (sums[i][2] / counts[i]) as i32,
                )
            });
        }
    }

    /// Push the current centroid into the history, dropping the oldest entry.
    pub(crate) fn rotate_history(&mut self) {
        self.history.rotate_right(1);
        self.history[0] = Some(self.centroid);
    }
}

/// Translation of a feature's frontier predicted from its history.
///
/// `available` caps how many history entries may be used.
pub fn predict_offset(history: &CentroidHistory, available: usize, mode: PredictionMode) -> [f64; 3] {
    let entries = history.iter().take(available).map_while(|c| *c).collect::<Vec<_>>();

    let linear = |c: &[[f64; 3]]| [c[0][0] - c[1][0], c[0][1] - c[1][1], c[0][2] - c[1][2]];

    match mode {
        PredictionMode::Direct => [0.0; 3],
        PredictionMode::Linear if entries.len() >= 2 => linear(&entries[..]),
        PredictionMode::Quadratic if entries.len() >= 3 => {
            let [c1, c2, c3] = [entries[0], entries[1], entries[2]];
            [
                2.0 * c1[0] - 3.0 * c2[0] + c3[0],
                2.0 * c1[1] - 3.0 * c2[1] + c3[1],
                2.0 * c1[2] - 3.0 * c2[2] + c3[2],
            ]
        }
        PredictionMode::Quadratic if entries.len() >= 2 => linear(&entries[..]),
        _ => [0.0; 3],
    }
}

#[cfg(test)]
mod test {
    use super::{predict_offset, Feature, PredictionMode};
    use crate::geometry::{Face, GridDims, Vec3i};

    #[test]
    fn test_direct_prediction_is_zero() {
        let history = [Some([5.0, 5.0, 5.0]), Some([2.0, 3.0, 4.0]), Some([0.0; 3])];

        for available in 0..=3 {
            assert_eq!(
                [0.0; 3],
                predict_offset(&history, available, PredictionMode::Direct)
            );
        }
    }

    #[test]
    fn test_linear_prediction() {
        let history = [Some([5.0, 5.0, 5.0]), Some([2.0, 3.0, 4.0]), None];

        assert_eq!(
            [3.0, 2.0, 1.0],
            predict_offset(&history, 3, PredictionMode::Linear)
        );

        // With fewer than two steps of history linear behaves like direct.
        for available in 0..2 {
            assert_eq!(
                predict_offset(&history, available, PredictionMode::Direct),
                predict_offset(&history, available, PredictionMode::Linear)
            );
        }
        let short = [Some([5.0, 5.0, 5.0]), None, None];
        assert_eq!([0.0; 3], predict_offset(&short, 3, PredictionMode::Linear));
    }

    #[test]
    fn test_quadratic_prediction() {
        let history = [Some([4.0, 0.0, 0.0]), Some([2.0, 0.0, 0.0]), Some([1.0, 0.0, 0.0])];

        // 2 * 4 - 3 * 2 + 1
        assert_eq!(
            [3.0, 0.0, 0.0],
            predict_offset(&history, 3, PredictionMode::Quadratic)
        );

        // Falls back to linear with two steps of history.
        assert_eq!(
            [2.0, 0.0, 0.0],
            predict_offset(&history, 2, PredictionMode::Quadratic)
        );
    }

    #[test]
    fn test_update_geometry() {
        let dims = GridDims::new([4, 4, 4]);
        let mut feature = Feature::new(1);
        feature.add_voxel(Vec3i::new(2, 1, 1));
        feature.add_voxel(Vec3i::new(3, 1, 1));
        feature.add_voxel(Vec3i::new(3, 2, 1));
        feature.add_voxel(Vec3i::new(3, 3, 1));

        feature.update_geometry(&dims);

        assert_eq!([2.75, 1.75, 1.0], feature.centroid());
        assert_eq!(dims.linear_index(Vec3i::new(2, 1, 1)), feature.id());
        assert_eq!(
            vec![Face::Right, Face::Top],
            feature.touched_faces().collect::<Vec<_>>()
        );
        assert_eq!(
            Some(Vec3i::new(3, 2, 1)),
            feature.boundary_centroid(Face::Right)
        );
        assert_eq!(
            Some(Vec3i::new(3, 3, 1)),
            feature.boundary_centroid(Face::Top)
        );
    }
}
