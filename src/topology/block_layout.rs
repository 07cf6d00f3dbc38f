//! Block addressing for structured domain decomposition.
//!
//! A [`BlockLayout`] is a bijection between a 3D block coordinate `(x, y, z)`
//! with `x < X`, `y < Y`, `z < Z` and a linear block address in
//! `[0, X * Y * Z)`. The traversal order is chosen by a [`BlockLayoutMethod`].
//! Linear addresses are then split into contiguous per-rank ranges by
//! [`BlockLayout::blocks_for_rank`].

use std::ops::Range;

use crate::mesh_error::MeshError;

/// Traversal order of the block grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BlockLayoutMethod {
    /// dim0 fastest, then dim1, then dim2.
    ColumnMajor,
    /// Space-filling Hilbert curve. Not implemented.
    Hilbert,
    /// Like `ColumnMajor`, but dim0 runs backwards on odd `y` rows.
    ColumnMajorZigZag,
    /// dim0 fastest, then dim2, then dim1.
    ColumnMajorReverse,
}

/// Immutable block extents plus traversal method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockLayout {
    extents: [usize; 3],
    method: BlockLayoutMethod,
}

impl BlockLayout {
    /// # Errors
    /// `InvalidExtents` if any extent is zero or the block count overflows `usize`.
    pub fn new(extents: [usize; 3], method: BlockLayoutMethod) -> Result<Self, MeshError> {
        let count = extents
            .iter()
            .try_fold(1usize, |acc, &e| acc.checked_mul(e));
        if extents.contains(&0) || count.is_none() {
            return Err(MeshError::InvalidExtents { extents });
        }
        Ok(Self { extents, method })
    }

    pub fn extents(&self) -> [usize; 3] {
        self.extents
    }

    pub fn method(&self) -> BlockLayoutMethod {
        self.method
    }

    /// `X * Y * Z`.
    pub fn num_blocks(&self) -> usize {
        self.extents.iter().product()
    }

    /// Linear address of a block coordinate.
    ///
    /// # Errors
    /// `BlockOutOfRange` for a coordinate outside the extents,
    /// `NotImplemented` for the Hilbert method.
    pub fn get_address(&self, coord: [usize; 3]) -> Result<usize, MeshError> {
        let [nx, ny, nz] = self.extents;
        let [x, y, z] = coord;
        if x >= nx || y >= ny || z >= nz {
            return Err(MeshError::BlockOutOfRange {
                what: "coordinate",
                value: coord,
                extents: self.extents,
            });
        }
        match self.method {
            BlockLayoutMethod::ColumnMajor => Ok(x + nx * (y + ny * z)),
            BlockLayoutMethod::ColumnMajorReverse => Ok(x + nx * (z + nz * y)),
            BlockLayoutMethod::ColumnMajorZigZag => {
                let xr = if y % 2 == 0 { x } else { nx - 1 - x };
                Ok(xr + nx * (y + ny * z))
            }
            BlockLayoutMethod::Hilbert => Err(MeshError::NotImplemented("Hilbert block layout")),
        }
    }

    /// Block coordinate of a linear address; inverse of [`get_address`](Self::get_address).
    pub fn get_coordinates(&self, address: usize) -> Result<[usize; 3], MeshError> {
        if address >= self.num_blocks() {
            return Err(MeshError::BlockOutOfRange {
                what: "address",
                value: [address, 0, 0],
                extents: self.extents,
            });
        }
        let [nx, ny, nz] = self.extents;
        let x = address % nx;
        let rest = address / nx;
        match self.method {
            BlockLayoutMethod::ColumnMajor => Ok([x, rest % ny, rest / ny]),
            BlockLayoutMethod::ColumnMajorReverse => Ok([x, rest / nz, rest % nz]),
            BlockLayoutMethod::ColumnMajorZigZag => {
                let (y, z) = (rest % ny, rest / ny);
                let x = if y % 2 == 0 { x } else { nx - 1 - x };
                Ok([x, y, z])
            }
            BlockLayoutMethod::Hilbert => Err(MeshError::NotImplemented("Hilbert block layout")),
        }
    }

    /// All block coordinates in address order.
    pub fn iter_coordinates(&self) -> impl Iterator<Item = Result<[usize; 3], MeshError>> + '_ {
        (0..self.num_blocks()).map(move |a| self.get_coordinates(a))
    }

    /// Contiguous address range assigned to `rank` out of `size` ranks.
    ///
    /// The first `num_blocks % size` ranks receive one extra block.
    pub fn blocks_for_rank(&self, rank: usize, size: usize) -> Result<Range<usize>, MeshError> {
        if size == 0 || rank >= size {
            return Err(MeshError::ProcessCountMismatch {
                expected: rank + 1,
                got: size,
            });
        }
        let n = self.num_blocks();
        let (base, rem) = (n / size, n % size);
        let start = rank * base + rank.min(rem);
        let len = base + usize::from(rank < rem);
        Ok(start..start + len)
    }

    /// Rank owning `address` under [`blocks_for_rank`](Self::blocks_for_rank).
    pub fn owner_of(&self, address: usize, size: usize) -> Result<usize, MeshError> {
        let n = self.num_blocks();
        if address >= n {
            return Err(MeshError::BlockOutOfRange {
                what: "address",
                value: [address, 0, 0],
                extents: self.extents,
            });
        }
        if size == 0 {
            return Err(MeshError::ProcessCountMismatch { expected: 1, got: 0 });
        }
        let (base, rem) = (n / size, n % size);
        // the first `rem` ranks hold `base + 1` blocks each
        let wide = rem * (base + 1);
        Ok(if address < wide {
            address / (base + 1)
        } else {
            rem + (address - wide) / base
        })
    }
}
