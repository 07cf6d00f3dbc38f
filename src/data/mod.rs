//! Data module: global cell indexing

pub mod cells;

pub use cells::Cells;
