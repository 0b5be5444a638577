//! Geometry information

use std::ops::{Add, Sub};

/// An integer voxel or block coordinate.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vec3i {
    /// x component.
    pub x: i32,
    /// y component.
    pub y: i32,
    /// z component.
    pub z: i32,
}

impl Vec3i {
    /// Create a new coordinate.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Convert from an unsigned triple.
    pub fn from_usize(v: [usize; 3]) -> Self {
        Self::new(v[0] as i32, v[1] as i32, v[2] as i32)
    }

    /// Return the components as an array.
    pub fn to_array(self) -> [i32; 3] {
        [self.x, self.y, self.z]
    }

    /// Component-wise product.
    pub fn component_mul(self, other: Self) -> Self {
        Self::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }

    /// Euclidean distance to another coordinate.
    pub fn distance(self, other: Self) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        let dz = (self.z - other.z) as f64;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl Add for Vec3i {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3i {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::fmt::Display for Vec3i {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// One of the six faces of a block.
///
/// The discriminant is the slot of the face in the adjacency table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    /// -x
    Left = 0,
    /// +x
    Right = 1,
    /// -y
    Bottom = 2,
    /// +y
    Top = 3,
    /// -z
    Front = 4,
    /// +z
    Back = 5,
}

impl Face {
    /// All faces in adjacency table order.
    pub const ALL: [Face; 6] = [
        Face::Left,
        Face::Right,
        Face::Bottom,
        Face::Top,
        Face::Front,
        Face::Back,
    ];

    /// Slot of the face in per-face tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Unit step across the face.
    pub fn normal(self) -> Vec3i {
        match self {
            Face::Left => Vec3i::new(-1, 0, 0),
            Face::Right => Vec3i::new(1, 0, 0),
            Face::Bottom => Vec3i::new(0, -1, 0),
            Face::Top => Vec3i::new(0, 1, 0),
            Face::Front => Vec3i::new(0, 0, -1),
            Face::Back => Vec3i::new(0, 0, 1),
        }
    }
}

/// Dimensions of a dense 3D grid, used both for voxels in a block and for blocks in a partition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GridDims {
    dims: [usize; 3],
}

impl GridDims {
    /// Create new grid dimensions `[nx, ny, nz]`.
    pub fn new(dims: [usize; 3]) -> Self {
        Self { dims }
    }

    /// Return the extents.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Return the extents as a coordinate.
    pub fn as_vec3i(&self) -> Vec3i {
        Vec3i::from_usize(self.dims)
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    /// True if any axis is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if a coordinate lies inside the grid.
    pub fn contains(&self, p: Vec3i) -> bool {
        let [nx, ny, nz] = self.dims;
        p.x >= 0
            && p.y >= 0
            && p.z >= 0
            && (p.x as usize) < nx
            && (p.y as usize) < ny
            && (p.z as usize) < nz
    }

    /// Row-major linear index `z * (nx * ny) + y * nx + x`.
    ///
    /// The coordinate must lie inside the grid.
    pub fn linear_index(&self, p: Vec3i) -> usize {
        debug_assert!(self.contains(p));
        let [nx, ny, _] = self.dims;
        p.z as usize * nx * ny + p.y as usize * nx + p.x as usize
    }

    /// Inverse of [GridDims::linear_index].
    pub fn coordinate(&self, index: usize) -> Vec3i {
        let [nx, ny, _] = self.dims;
        let z = index / (nx * ny);
        let y = (index - z * nx * ny) / nx;
        let x = index % nx;
        Vec3i::from_usize([x, y, z])
    }

    /// Clamp a coordinate component-wise into the grid.
    pub fn clamp(&self, p: Vec3i) -> Vec3i {
        let [nx, ny, nz] = self.dims;
        Vec3i::new(
            num::clamp(p.x, 0, nx as i32 - 1),
            num::clamp(p.y, 0, ny as i32 - 1),
            num::clamp(p.z, 0, nz as i32 - 1),
        )
    }

    /// The in-grid 6-connected neighbours of a coordinate.
    ///
    /// Neighbours are returned in the order +x, +y, +z, -x, -y, -z.
    pub fn neighbours(&self, p: Vec3i) -> impl Iterator<Item = Vec3i> + '_ {
        [
            Vec3i::new(1, 0, 0),
            Vec3i::new(0, 1, 0),
            Vec3i::new(0, 0, 1),
            Vec3i::new(-1, 0, 0),
            Vec3i::new(0, -1, 0),
            Vec3i::new(0, 0, -1),
        ]
        .into_iter()
        .map(move |step| p + step)
        .filter(move |q| self.contains(*q))
    }

    /// Faces of the grid a coordinate lies on.
    pub fn faces_of(&self, p: Vec3i) -> impl Iterator<Item = Face> + '_ {
        let [nx, ny, nz] = self.dims;
        Face::ALL.into_iter().filter(move |face| match face {
            Face::Left => p.x == 0,
            Face::Right => p.x as usize + 1 == nx,
            Face::Bottom => p.y == 0,
            Face::Top => p.y as usize + 1 == ny,
            Face::Front => p.z == 0,
            Face::Back => p.z as usize + 1 == nz,
        })
    }
}

impl std::fmt::Display for GridDims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [nx, ny, nz] = self.dims;
        write!(f, "{}x{}x{}", nx, ny, nz)
    }
}

#[cfg(test)]
mod test {
    use itertools::Itertools;

    use super::{Face, GridDims, Vec3i};

    #[test]
    fn test_linear_index_round_trip() {
        let grid = GridDims::new([3, 2, 2]);

        // Weighting z by 2 instead of 1 would give 17 for (2, 1, 1).
        assert_eq!(11, grid.linear_index(Vec3i::new(2, 1, 1)));
        assert_eq!(Vec3i::new(2, 1, 1), grid.coordinate(11));

        for index in 0..grid.len() {
            assert_eq!(index, grid.linear_index(grid.coordinate(index)));
        }
    }

    #[test]
    fn test_neighbours_at_corner() {
        let grid = GridDims::new([4, 4, 4]);

        let neighbours = grid.neighbours(Vec3i::new(0, 0, 0)).collect_vec();

        assert_eq!(3, neighbours.len());
        assert!(neighbours.contains(&Vec3i::new(1, 0, 0)));
        assert!(neighbours.contains(&Vec3i::new(0, 1, 0)));
        assert!(neighbours.contains(&Vec3i::new(0, 0, 1)));
    }

    #[test]
    fn test_faces_of_edge_voxel() {
        let grid = GridDims::new([4, 3, 2]);

        let faces = grid.faces_of(Vec3i::new(3, 0, 1)).collect_vec();

        assert_eq!(vec![Face::Right, Face::Bottom, Face::Back], faces);
    }

    #[test]
    fn test_clamp() {
        let grid = GridDims::new([4, 3, 2]);

        assert_eq!(Vec3i::new(0, 2, 1), grid.clamp(Vec3i::new(-5, 7, 1)));
    }
}
