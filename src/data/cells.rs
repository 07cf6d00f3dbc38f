//! Global cell indexing from per-process cell counts.
//!
//! Every rank owns a contiguous block of the global cell numbering. The block
//! of rank `r` starts at `global_base_address[r]`, the exclusive prefix sum of
//! the local counts of ranks `0..r`; the table has `size + 1` entries and its
//! last entry is the global cell count.

use crate::algs::communicator::Communicator;
use crate::algs::wire::{WireCount, cast_slice, cast_slice_mut};
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshError;

/// Per-process cell counts and the derived global base-address table.
///
/// # Invariants
///
/// After [`update_global_base`](Self::update_global_base):
/// - `global_base_address.len() == all_num_local_cells.len() + 1`,
/// - `global_base_address[0] == 0` and the table is non-decreasing,
/// - `global_base_address[i + 1] - global_base_address[i] == all_num_local_cells[i]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Cells {
    num_local_cells: usize,
    all_num_local_cells: Vec<usize>,
    global_base_address: Vec<usize>,
    /// Rank captured at the last synchronization; `None` until then.
    rank: Option<usize>,
}

impl Cells {
    pub fn new(num_local_cells: usize) -> Self {
        Self {
            num_local_cells,
            ..Self::default()
        }
    }

    /// Set this process's local count. Global state is untouched until the
    /// next [`update_global_base`](Self::update_global_base).
    pub fn set_num_local_cells(&mut self, n: usize) {
        self.num_local_cells = n;
    }

    pub fn num_local_cells(&self) -> usize {
        self.num_local_cells
    }

    /// Gather every rank's local count and rebuild the base-address table.
    ///
    /// Collective: every rank of `comm` must call it.
    pub fn update_global_base<C>(&mut self, comm: &C) -> Result<(), MeshError>
    where
        C: Communicator + ?Sized,
    {
        let counts = gather_counts(comm, self.num_local_cells)?;
        self.global_base_address = exclusive_prefix_sum(&counts);
        self.all_num_local_cells = counts;
        self.rank = Some(comm.rank());
        log::debug!(
            "[rank {}] global base updated: {} local of {} global cells",
            comm.rank(),
            self.num_local_cells,
            self.num_global_cells()
        );
        crate::debug_invariants!(self.validate_invariants(), "Cells::update_global_base");
        Ok(())
    }

    /// Re-gather the local counts and compare against the cached table.
    ///
    /// Collective. A verification hook; nothing is modified.
    pub fn check_global_base<C>(&self, comm: &C) -> Result<(), MeshError>
    where
        C: Communicator + ?Sized,
    {
        let counts = gather_counts(comm, self.num_local_cells)?;
        if self.rank.is_none() {
            return Err(MeshError::GlobalBaseNotReady);
        }
        if self.all_num_local_cells.len() != counts.len() {
            return Err(MeshError::ProcessCountMismatch {
                expected: self.all_num_local_cells.len(),
                got: counts.len(),
            });
        }
        let fresh = exclusive_prefix_sum(&counts);
        match fresh
            .iter()
            .zip(&self.global_base_address)
            .position(|(f, c)| f != c)
        {
            Some(i) => Err(MeshError::GlobalBaseInconsistent {
                rank: i,
                cached: self.global_base_address[i],
                fresh: fresh[i],
            }),
            None => Ok(()),
        }
    }

    /// Total cells across the group as of the last synchronization.
    pub fn num_global_cells(&self) -> usize {
        self.global_base_address.last().copied().unwrap_or(0)
    }

    /// Base-address table (`size + 1` entries); empty before synchronization.
    pub fn global_base_address(&self) -> &[usize] {
        &self.global_base_address
    }

    /// Every rank's local count as of the last synchronization.
    pub fn all_num_local_cells(&self) -> &[usize] {
        &self.all_num_local_cells
    }

    /// Global index range owned by this rank.
    pub fn owned_range(&self) -> Result<std::ops::Range<usize>, MeshError> {
        let rank = self.rank.ok_or(MeshError::GlobalBaseNotReady)?;
        Ok(self.global_base_address[rank]..self.global_base_address[rank + 1])
    }

    /// `global_base_address[rank] + local`.
    #[inline]
    pub fn to_global(&self, local: usize) -> Result<usize, MeshError> {
        let owned = self.owned_range()?;
        if local >= owned.len() {
            return Err(MeshError::LocalIndexOutOfRange {
                index: local,
                len: owned.len(),
            });
        }
        Ok(owned.start + local)
    }

    /// Inverse of [`to_global`](Self::to_global) for globals owned by this rank.
    #[inline]
    pub fn to_local(&self, global: usize) -> Result<usize, MeshError> {
        let owned = self.owned_range()?;
        if owned.contains(&global) {
            return Ok(global - owned.start);
        }
        let owner = self.owner_of(global)?;
        Err(MeshError::GlobalIndexNotOwned {
            index: global,
            owner,
            rank: self.rank.unwrap_or_default(),
        })
    }

    /// Rank owning `global` (binary search over the base table).
    pub fn owner_of(&self, global: usize) -> Result<usize, MeshError> {
        if self.rank.is_none() {
            return Err(MeshError::GlobalBaseNotReady);
        }
        let num_global = self.num_global_cells();
        if global >= num_global {
            return Err(MeshError::GlobalIndexOutOfRange {
                index: global,
                num_global,
            });
        }
        let starts = &self.global_base_address[..self.all_num_local_cells.len()];
        Ok(starts.partition_point(|&b| b <= global) - 1)
    }

    /// Number of ranks in the group at the last synchronization.
    pub fn num_ranks(&self) -> usize {
        self.all_num_local_cells.len()
    }
}

impl DebugInvariants for Cells {
    fn validate_invariants(&self) -> Result<(), MeshError> {
        if self.rank.is_none() {
            return Ok(());
        }
        let n = self.all_num_local_cells.len();
        if self.global_base_address.len() != n + 1 {
            return Err(MeshError::CountMismatch {
                what: "global base address table",
                expected: n + 1,
                got: self.global_base_address.len(),
            });
        }
        if self.global_base_address[0] != 0 {
            return Err(MeshError::GlobalBaseInconsistent {
                rank: 0,
                cached: self.global_base_address[0],
                fresh: 0,
            });
        }
        for (i, w) in self.global_base_address.windows(2).enumerate() {
            if w[1] < w[0] || w[1] - w[0] != self.all_num_local_cells[i] {
                return Err(MeshError::GlobalBaseInconsistent {
                    rank: i + 1,
                    cached: w[1],
                    fresh: w[0] + self.all_num_local_cells[i],
                });
            }
        }
        Ok(())
    }
}

fn gather_counts<C>(comm: &C, local: usize) -> Result<Vec<usize>, MeshError>
where
    C: Communicator + ?Sized,
{
    let n = comm.size();
    let mine = [WireCount::new(local)];
    let mut all = vec![WireCount::new(0); n];
    comm.allgather(cast_slice(&mine), cast_slice_mut(&mut all))?;
    Ok(all.iter().map(WireCount::get).collect())
}

/// `out[0] = 0`, `out[i] = sum(counts[..i])`; `out.len() == counts.len() + 1`.
pub fn exclusive_prefix_sum(counts: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(counts.len() + 1);
    let mut acc = 0usize;
    out.push(acc);
    for &c in counts {
        acc += c;
        out.push(acc);
    }
    out
}
