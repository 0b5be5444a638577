//! Region growing feature tracker for a single block.
//!
//! The tracker keeps two generations of a label mask. Tracking one step swaps the
//! generations and then, feature by feature, predicts where the frontier moved,
//! refills the body at the predicted position, shrinks away voxels that fell out of the
//! opacity window and regrows into voxels that entered it. All region growing uses
//! explicit worklists.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::{
    constants::HISTORY_DEPTH,
    error::TrackError,
    feature::{predict_offset, Feature, PredictionMode, TrackingDirection},
    geometry::{GridDims, Vec3i},
    transfer_function::TransferFunction,
};

/// Closed opacity interval a voxel must lie in to seed a feature.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OpacityWindow {
    /// Lower bound, also the growth threshold.
    pub low: f32,
    /// Upper bound.
    pub high: f32,
}

impl OpacityWindow {
    /// Check if an opacity seeds a feature.
    pub fn contains(&self, opacity: f32) -> bool {
        self.low <= opacity && opacity <= self.high
    }
}

/// Extracts and tracks features inside one block.
pub struct FeatureTracker {
    dims: GridDims,
    window: OpacityWindow,
    min_voxels: usize,
    tf: Option<TransferFunction>,
    mask: Vec<u32>,
    mask_prev: Vec<u32>,
    features: Vec<Feature>,
    last_label: u32,
    lookback_forward: usize,
    lookback_backward: usize,
}

impl FeatureTracker {
    /// Create a tracker for a block of the given dimensions.
    ///
    /// `mask` is the label buffer of the block, all zero.
    pub fn new(dims: GridDims, mask: Vec<u32>, window: OpacityWindow, min_voxels: usize) -> Self {
        debug_assert_eq!(dims.len(), mask.len());
        let mask_prev = vec![0; mask.len()];
        Self {
            dims,
            window,
            min_voxels,
            tf: None,
            mask,
            mask_prev,
            features: Vec::new(),
            last_label: 0,
            lookback_forward: 0,
            lookback_backward: 0,
        }
    }

    /// Set the transfer function used to map scalar values to opacity.
    pub fn set_transfer_function(&mut self, tf: TransferFunction) {
        self.tf = Some(tf);
    }

    /// The transfer function, if set.
    pub fn transfer_function(&self) -> Option<&TransferFunction> {
        self.tf.as_ref()
    }

    /// Block dimensions.
    pub fn dims(&self) -> GridDims {
        self.dims
    }

    /// Currently tracked features in tracking order.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Labels of the current step.
    pub fn mask(&self) -> &[u32] {
        &self.mask
    }

    /// Labels of the previous step.
    pub fn previous_mask(&self) -> &[u32] {
        &self.mask_prev
    }

    /// Number of history steps usable in the given direction.
    pub fn lookback(&self, direction: TrackingDirection) -> usize {
        match direction {
            TrackingDirection::Forward => self.lookback_forward,
            TrackingDirection::Backward => self.lookback_backward,
        }
    }

    /// Seed new features from every unmasked voxel whose opacity lies in the window.
    ///
    /// Candidates smaller than the minimum size are dropped, their voxels stay
    /// unmasked and their label is reused. Returns the number of new features.
    pub fn extract_all_features(&mut self, field: &[f32]) -> Result<usize, TrackError> {
        let opacity = self.opacity_field(field)?;
        Ok(self.extract_with_opacity(&opacity))
    }

    /// Advance all features to the next timestep given its scalar field.
    pub fn track_feature(
        &mut self,
        field: &[f32],
        direction: TrackingDirection,
        mode: PredictionMode,
    ) -> Result<(), TrackError> {
        let opacity = self.opacity_field(field)?;

        std::mem::swap(&mut self.mask, &mut self.mask_prev);
        self.mask.fill(0);

        let available = self.lookback(direction);
        let features = std::mem::take(&mut self.features);
        let mut tracked = Vec::with_capacity(features.len());

        for mut feature in features {
            let offset = predict_offset(&feature.history, available, mode);
            let offset = Vec3i::new(
                offset[0].floor() as i32,
                offset[1].floor() as i32,
                offset[2].floor() as i32,
            );

            self.fill_region(&mut feature, offset);
            self.shrink_region(&mut feature, &opacity);
            self.expand_region(&mut feature, &opacity);

            if feature.body.is_empty() {
                warn!(label = feature.label, "feature vanished, dropping it");
                continue;
            }

            feature.update_geometry(&self.dims);
            tracked.push(feature);
        }

        self.features = tracked;
        self.backup_feature_info(direction);

        let born = self.extract_with_opacity(&opacity);
        debug!(
            tracked = self.features.len() - born,
            born, "tracked one timestep"
        );

        Ok(())
    }

    fn opacity_field(&self, field: &[f32]) -> Result<Vec<f32>, TrackError> {
        let tf = self.tf.as_ref().ok_or(TrackError::TransferFunctionNotSet)?;

        if field.len() != self.dims.len() {
            return Err(TrackError::FieldSizeMismatch {
                expected: self.dims.len(),
                actual: field.len(),
            });
        }

        Ok(field.iter().map(|&value| tf.opacity(value)).collect())
    }

    fn extract_with_opacity(&mut self, opacity: &[f32]) -> usize {
        let mut born = 0;
        for index in 0..self.mask.len() {
            if self.mask[index] != 0 || !self.window.contains(opacity[index]) {
                continue;
            }
            if self.find_new_feature(self.dims.coordinate(index), opacity) {
                born += 1;
            }
        }
        born
    }

    fn find_new_feature(&mut self, seed: Vec3i, opacity: &[f32]) -> bool {
        let label = self.last_label + 1;
        let mut feature = Feature::new(label);

        self.mask[self.dims.linear_index(seed)] = label;
        feature.add_voxel(seed);
        feature.edge.push(seed);
        self.expand_region(&mut feature, opacity);

        if feature.body.len() < self.min_voxels {
            trace!(size = feature.body.len(), "rejecting undersized feature");
            for &p in &feature.body {
                self.mask[self.dims.linear_index(p)] = 0;
            }
            return false;
        }

        self.last_label = label;
        feature.update_geometry(&self.dims);
        self.features.push(feature);
        true
    }

    /// Move the frontier by `offset` and rebuild the body from it and from the
    /// previous body translated by the same offset.
    fn fill_region(&mut self, feature: &mut Feature, offset: Vec3i) {
        let label = feature.label;
        let previous_body = feature.clear_body();
        let frontier = std::mem::take(&mut feature.edge);

        for p in frontier {
            let p = self.dims.clamp(p + offset);
            let index = self.dims.linear_index(p);
            if self.mask[index] == 0 {
                self.mask[index] = label;
                feature.add_voxel(p);
                feature.edge.push(p);
            }
        }

        for old in previous_body {
            let p = old + offset;
            if !self.dims.contains(p) {
                continue;
            }
            let index = self.dims.linear_index(p);
            if self.mask[index] == 0 && self.mask_prev[self.dims.linear_index(old)] == label {
                self.mask[index] = label;
                feature.add_voxel(p);
            }
        }
    }

    /// Remove body voxels below the growth threshold, spreading through connected
    /// failing voxels, then requeue every body voxel bordering a non-member onto the edge.
    ///
    /// In-body neighbours that still pass stay in the body and end up on the edge, so
    /// the following expansion regrows from them.
    fn shrink_region(&mut self, feature: &mut Feature, opacity: &[f32]) {
        let label = feature.label;
        let low = self.window.low;

        let mut worklist = feature
            .body
            .iter()
            .copied()
            .filter(|&p| opacity[self.dims.linear_index(p)] < low)
            .collect::<Vec<_>>();

        let removed = !worklist.is_empty();

        while let Some(p) = worklist.pop() {
            let index = self.dims.linear_index(p);
            if self.mask[index] != label {
                continue;
            }
            self.mask[index] = 0;

            for n in self.dims.neighbours(p) {
                let n_index = self.dims.linear_index(n);
                if self.mask[n_index] == label && opacity[n_index] < low {
                    worklist.push(n);
                }
            }
        }

        if removed {
            let mask = &self.mask;
            let dims = self.dims;
            feature
                .body
                .retain(|&p| mask[dims.linear_index(p)] == label);
            feature.resum();
        }

        feature.edge = feature
            .body
            .iter()
            .copied()
            .filter(|&p| {
                self.dims
                    .neighbours(p)
                    .any(|n| self.mask[self.dims.linear_index(n)] != label)
            })
            .collect();
    }

    /// Breadth-first 6-connected growth from the edge voxels.
    ///
    /// A voxel stays on the edge if at least one neighbour could not join.
    fn expand_region(&mut self, feature: &mut Feature, opacity: &[f32]) {
        let label = feature.label;
        let low = self.window.low;

        let mut queue = std::mem::take(&mut feature.edge)
            .into_iter()
            .collect::<VecDeque<_>>();
        let mut edge = Vec::new();

        while let Some(seed) = queue.pop_front() {
            let mut on_edge = false;
            for n in self.dims.neighbours(seed) {
                let index = self.dims.linear_index(n);
                if self.mask[index] == label {
                    continue;
                }
                if self.mask[index] != 0 || opacity[index] < low {
                    on_edge = true;
                    continue;
                }
                self.mask[index] = label;
                feature.add_voxel(n);
                queue.push_back(n);
            }
            if on_edge {
                edge.push(seed);
            }
        }

        feature.edge = edge;
    }

    /// Rotate every feature's centroid history and update the lookback counters.
    fn backup_feature_info(&mut self, direction: TrackingDirection) {
        for feature in self.features.iter_mut() {
            feature.rotate_history();
        }

        let (grow, decay) = match direction {
            TrackingDirection::Forward => (&mut self.lookback_forward, &mut self.lookback_backward),
            TrackingDirection::Backward => (&mut self.lookback_backward, &mut self.lookback_forward),
        };
        *grow = (*grow + 1).min(HISTORY_DEPTH);
        *decay = decay.saturating_sub(1);
    }
}
