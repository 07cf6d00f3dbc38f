#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-exchange
//!
//! mesh-exchange is the data-movement core of a distributed-memory structured
//! mesh code. It decomposes a block-structured domain over a process group,
//! maintains local and global cell numbering, moves data between processes
//! under reusable plans, and resolves time-evolving refinement zones.
//!
//! ## Features
//! - [`topology::BlockLayout`]: block coordinate <-> linear address bijection
//!   and balanced block-to-rank decomposition
//! - [`data::Cells`]: global base-address table from per-rank cell counts
//! - [`algs::CommTokenBuilder`] / [`algs::Token`]: build-once, reuse-many
//!   gather/scatter plans with combine operations
//! - [`algs::move_data`] and [`algs::RmaAllToAll`]: one-shot variable-length
//!   and fixed-length one-sided exchanges
//! - [`adapt::Dzn`]: defined-zone resolver for refinement decisions
//!
//! ## Process groups
//! Every collective is written against the [`algs::communicator::Communicator`]
//! trait. `NoComm` is a serial group of one, `ThreadComm::group(n)` runs `n`
//! ranks as threads of one process, and `MpiComm` (feature `mpi-support`)
//! runs over MPI. Collectives must be called by every rank of the group in the
//! same order.
//!
//! ## Errors
//! Fallible operations return [`mesh_error::MeshError`]. Protocol violations
//! leave the group in divergent collective state; callers at a process
//! boundary convert them into a group abort with
//! [`mesh_error::OrAbort::or_abort`].

pub mod adapt;
pub mod algs;
pub mod context;
pub mod data;
pub mod debug_invariants;
pub mod mesh_error;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::adapt::dzn::{Dzn, Interval, Zone, ZoneOptions, ZoneShape};
    pub use crate::algs::communicator::{CommTag, Communicator, NoComm, OneSided, ThreadComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::move_data::{FortranLocalIndex, Region, move_data};
    pub use crate::algs::rma::{DynRmaAllToAll, ElementKind, RmaAllToAll};
    pub use crate::algs::token::{CommTokenBuilder, Token, TokenOperation};
    pub use crate::context::{Context, ExchangeTags, TimerRegistry};
    pub use crate::data::cells::Cells;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::mesh_error::{MeshError, OrAbort};
    pub use crate::topology::block_layout::{BlockLayout, BlockLayoutMethod};
}
