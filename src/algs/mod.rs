//! Re-export public algorithms.

pub mod communicator;
pub mod move_data;
pub mod rma;
pub mod token;
pub mod wire;

pub use move_data::{FortranLocalIndex, Region, move_data};
pub use rma::{DynRmaAllToAll, ElementKind, RmaAllToAll};
pub use token::{CommTokenBuilder, Token, TokenOperation};
