//! MeshError: unified error type for mesh-exchange public APIs
//!
//! Every fallible operation in the crate returns `Result<_, MeshError>`.
//! Protocol violations are not recoverable once a collective has started on
//! some ranks; the boundary converts them into a group-wide abort with
//! [`abort_on_error`] or [`OrAbort::or_abort`].

use std::panic::Location;
use thiserror::Error;

use crate::algs::communicator::Communicator;

/// Unified error type for mesh-exchange operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// Requested functionality exists in the API but has no implementation.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// A block layout was created with a zero extent.
    #[error("block layout extents must be non-zero, got {extents:?}")]
    InvalidExtents { extents: [usize; 3] },

    /// A block coordinate or address lies outside the layout.
    #[error("block {what} {value:?} outside layout extents {extents:?}")]
    BlockOutOfRange {
        what: &'static str,
        value: [usize; 3],
        extents: [usize; 3],
    },

    /// A global index is outside `[0, num_global_cells)`.
    #[error("global index {index} out of range (num_global_cells = {num_global})")]
    GlobalIndexOutOfRange { index: usize, num_global: usize },

    /// A global index is valid but owned by another rank.
    #[error("global index {index} is owned by rank {owner}, not rank {rank}")]
    GlobalIndexNotOwned {
        index: usize,
        owner: usize,
        rank: usize,
    },

    /// A local index is outside `[0, len)`.
    #[error("local index {index} out of range (len = {len})")]
    LocalIndexOutOfRange { index: usize, len: usize },

    /// A 1-based boundary index of zero was supplied.
    #[error("Fortran-style index must be >= 1, got {0}")]
    InvalidFortranIndex(i64),

    /// Global base table used before the first `update_global_base`.
    #[error("global base address table has not been synchronized")]
    GlobalBaseNotReady,

    /// Cached global base table disagrees with a fresh re-gather.
    #[error("global base address table inconsistent at rank {rank}: cached {cached}, fresh {fresh}")]
    GlobalBaseInconsistent {
        rank: usize,
        cached: usize,
        fresh: usize,
    },

    /// A slot-side buffer disagrees with the slot count declared at build time.
    #[error("slot buffer holds {got} values, token expects {expected}")]
    SlotCountMismatch { expected: usize, got: usize },

    /// A home-side buffer disagrees with the cell count captured at build time.
    #[error("home buffer holds {got} values, token expects {expected}")]
    HomeCountMismatch { expected: usize, got: usize },

    /// The process group size changed between build and use.
    #[error("process count mismatch: built for {expected} ranks, group has {got}")]
    ProcessCountMismatch { expected: usize, got: usize },

    /// A token is used through a communicator of a different rank than it was built on.
    #[error("rank mismatch: built on rank {expected}, used on rank {got}")]
    RankMismatch { expected: usize, got: usize },

    /// Parallel index/count arrays disagree in length or total.
    #[error("count mismatch in {what}: expected {expected}, got {got}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// A `(start, len)` region does not fit its buffer.
    #[error("region [{start}, {start}+{len}) exceeds buffer of length {buffer_len}")]
    RegionOutOfBounds {
        start: usize,
        len: usize,
        buffer_len: usize,
    },

    /// Received byte count disagrees with the declared receive size.
    #[error("buffer size mismatch with rank {neighbor}: expected {expected} bytes, got {got}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },

    /// Communication failure with a peer.
    #[error("communication error with rank {neighbor}: {message}")]
    CommError { neighbor: usize, message: String },

    /// Element datatype without a compiled instantiation.
    #[error("unsupported element kind `{0}`")]
    UnsupportedElementKind(String),

    /// Dimensionality outside `1..=3` or a point too short for it.
    #[error("invalid dimensionality {dim} for point of length {point_len}")]
    InvalidDimension { dim: usize, point_len: usize },

    /// `ZoneOptions::use_shape` does not agree with the zone geometry.
    #[error("zone options select {requested:?} but geometry is {actual:?}")]
    ZoneShapeMismatch {
        requested: crate::adapt::dzn::ZoneShape,
        actual: crate::adapt::dzn::ZoneShape,
    },
}

/// Log `err` together with the caller location and abort the whole group.
#[track_caller]
pub fn abort_group<C: Communicator + ?Sized>(comm: &C, err: &MeshError) -> ! {
    let loc = Location::caller();
    log::error!(
        "[rank {}] fatal at {}:{}: {err}",
        comm.rank(),
        loc.file(),
        loc.line()
    );
    comm.abort(1)
}

/// Unwrap `result` or abort the process group.
#[track_caller]
pub fn abort_on_error<T, C: Communicator + ?Sized>(comm: &C, result: Result<T, MeshError>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => abort_group(comm, &e),
    }
}

/// Extension for turning a fatal [`MeshError`] into a group abort at a boundary.
pub trait OrAbort<T> {
    fn or_abort<C: Communicator + ?Sized>(self, comm: &C) -> T;
}

impl<T> OrAbort<T> for Result<T, MeshError> {
    #[track_caller]
    fn or_abort<C: Communicator + ?Sized>(self, comm: &C) -> T {
        match self {
            Ok(v) => v,
            Err(e) => abort_group(comm, &e),
        }
    }
}
