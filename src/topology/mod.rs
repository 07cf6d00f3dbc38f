//! Structured-domain topology: block addressing and decomposition.

pub mod block_layout;

pub use block_layout::{BlockLayout, BlockLayoutMethod};
