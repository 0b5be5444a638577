//! Feature connectivity across block faces.

use bytemuck::{Pod, Zeroable};

use crate::geometry::Vec3i;

/// One feature crossing one face shared by two blocks.
///
/// This is the fixed-layout record exchanged between processes as raw bytes. All
/// processes must agree on it.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Edge {
    /// Feature id, position keyed in the owning block.
    pub id: i32,
    /// Block the edge was observed from.
    pub start: i32,
    /// Block on the other side of the face.
    pub end: i32,
    /// Boundary centroid of the feature on the face, in global voxel coordinates.
    pub centroid: [i32; 3],
}

impl Edge {
    /// Create a new edge.
    pub fn new(id: i32, start: i32, end: i32, centroid: Vec3i) -> Self {
        Self {
            id,
            start,
            end,
            centroid: centroid.to_array(),
        }
    }

    /// The centroid as a coordinate.
    pub fn centroid(&self) -> Vec3i {
        Vec3i::new(self.centroid[0], self.centroid[1], self.centroid[2])
    }

    /// The block pair in ascending order.
    ///
    /// The two observations of one physical face have swapped endpoints.
    pub fn normalized(&self) -> (i32, i32) {
        if self.start > self.end {
            (self.end, self.start)
        } else {
            (self.start, self.end)
        }
    }
}

/// Coalesce edges that describe the same physical crossing.
///
/// Two edges with the same normalized block pair whose centroids are at most
/// `max_distance` apart both receive the smaller of their ids. The list is scanned
/// pairwise, left to right, exactly once: an id can change several times in one pass
/// and the result depends on the order of `edges`. Every process runs this on the
/// same list and therefore ends with the same ids.
///
/// Within row `i` the comparison uses the id edge `i` had when the row started, while
/// the copied id is the current one.
pub fn merge_correspondent_edges(edges: &mut [Edge], max_distance: f64) {
    for i in 0..edges.len() {
        let pair_i = edges[i].normalized();
        let id_i = edges[i].id;
        for j in i + 1..edges.len() {
            if pair_i != edges[j].normalized() {
                continue;
            }
            if edges[i].centroid().distance(edges[j].centroid()) > max_distance {
                continue;
            }
            if id_i < edges[j].id {
                edges[j].id = edges[i].id;
            } else {
                edges[i].id = edges[j].id;
            }
        }
    }
}

/// Edges whose endpoints both belong to `group`.
pub fn restrict_to_group(edges: &[Edge], group: &[i32]) -> Vec<Edge> {
    edges
        .iter()
        .filter(|edge| group.contains(&edge.start) && group.contains(&edge.end))
        .copied()
        .collect()
}

#[cfg(test)]
mod test {
    use super::{merge_correspondent_edges, restrict_to_group, Edge};
    use crate::geometry::Vec3i;

    #[test]
    fn test_edge_layout() {
        assert_eq!(24, std::mem::size_of::<Edge>());

        let edge = Edge::new(7, 1, 2, Vec3i::new(3, 4, 5));
        let bytes: &[u8] = bytemuck::bytes_of(&edge);
        assert_eq!(&7i32.to_ne_bytes(), &bytes[0..4]);
        assert_eq!(&5i32.to_ne_bytes(), &bytes[20..24]);
    }

    #[test]
    fn test_merge_close_edges() {
        let mut edges = vec![
            Edge::new(40, 0, 1, Vec3i::new(7, 3, 3)),
            Edge::new(12, 1, 0, Vec3i::new(8, 3, 4)),
        ];

        merge_correspondent_edges(&mut edges, 4.0);

        assert_eq!(12, edges[0].id);
        assert_eq!(12, edges[1].id);
        // Endpoints keep their orientation.
        assert_eq!((0, 1), (edges[0].start, edges[0].end));
        assert_eq!((1, 0), (edges[1].start, edges[1].end));
    }

    #[test]
    fn test_distant_edges_stay_distinct() {
        let mut edges = vec![
            Edge::new(40, 0, 1, Vec3i::new(7, 3, 3)),
            Edge::new(12, 1, 0, Vec3i::new(8, 3, 8)),
        ];

        merge_correspondent_edges(&mut edges, 4.0);

        assert_eq!(40, edges[0].id);
        assert_eq!(12, edges[1].id);
    }

    #[test]
    fn test_merge_requires_same_face() {
        let mut edges = vec![
            Edge::new(40, 0, 1, Vec3i::new(7, 3, 3)),
            Edge::new(12, 0, 2, Vec3i::new(7, 3, 3)),
        ];

        merge_correspondent_edges(&mut edges, 4.0);

        assert_eq!(40, edges[0].id);
        assert_eq!(12, edges[1].id);
    }

    #[test]
    fn test_merge_is_order_sensitive() {
        // Edge b is close to both a and c, a and c are far apart.
        let a = Edge::new(5, 0, 1, Vec3i::new(0, 0, 0));
        let b = Edge::new(9, 1, 0, Vec3i::new(0, 3, 0));
        let c = Edge::new(2, 0, 1, Vec3i::new(0, 6, 0));

        let mut forward = vec![a, b, c];
        merge_correspondent_edges(&mut forward, 4.0);
        assert_eq!(vec![5, 2, 2], forward.iter().map(|e| e.id).collect::<Vec<_>>());

        let mut reversed = vec![c, b, a];
        merge_correspondent_edges(&mut reversed, 4.0);
        assert_eq!(vec![2, 2, 2], reversed.iter().map(|e| e.id).collect::<Vec<_>>());
    }

    #[test]
    fn test_merge_compares_row_start_id() {
        // All three lie within reach of each other.
        let mut edges = vec![
            Edge::new(5, 0, 1, Vec3i::new(0, 0, 0)),
            Edge::new(3, 1, 0, Vec3i::new(0, 1, 0)),
            Edge::new(4, 1, 0, Vec3i::new(0, 2, 0)),
        ];

        merge_correspondent_edges(&mut edges, 4.0);

        // Against the third edge the first still compares with 5, although it already took 3.
        assert_eq!(vec![4, 3, 3], edges.iter().map(|e| e.id).collect::<Vec<_>>());
    }

    #[test]
    fn test_restrict_to_group() {
        let edges = vec![
            Edge::new(1, 0, 1, Vec3i::new(0, 0, 0)),
            Edge::new(2, 1, 3, Vec3i::new(0, 0, 0)),
            Edge::new(3, 3, 0, Vec3i::new(0, 0, 0)),
        ];

        let restricted = restrict_to_group(&edges, &[0, 1]);

        assert_eq!(vec![edges[0]], restricted);
    }
}
