//! Refinement-zone resolution.

pub mod dzn;

pub use dzn::{Dzn, Interval, Zone, ZoneGeometry, ZoneKode, ZoneOptions, ZoneShape};
