//! Defined-zone (DZN) resolution for refinement decisions.
//!
//! A [`Dzn`] is an append-only list of [`Zone`]s. Every zone is a box or a
//! spherical shell whose bounds move linearly in time, tagged with the
//! refinement level it requests. Resolution walks the list newest first and
//! returns the first zone containing the point, so later zones override
//! earlier, coarser ones wherever they overlap.

use crate::mesh_error::MeshError;

/// Geometry family of a zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ZoneShape {
    BricksAndRectangles,
    SpheresAndCircles,
}

/// Activation rule of a zone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ZoneKode {
    /// Always active.
    #[default]
    Unconditional,
    /// Any other boundary code; carried but not resolvable.
    Other(i32),
}

impl ZoneKode {
    /// Decode a boundary code; `0` is unconditional.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => ZoneKode::Unconditional,
            other => ZoneKode::Other(other),
        }
    }
}

/// Per-zone options.
///
/// Only `add = true`, `kode = Unconditional`, `outer = false` can be resolved;
/// [`Dzn::push`] refuses the rest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ZoneOptions {
    pub add: bool,
    pub kode: ZoneKode,
    pub outer: bool,
    pub use_shape: ZoneShape,
}

impl ZoneOptions {
    /// Additive, unconditional, whole-zone options for `shape`.
    pub fn new(use_shape: ZoneShape) -> Self {
        Self {
            add: true,
            kode: ZoneKode::Unconditional,
            outer: false,
            use_shape,
        }
    }
}

/// A bound `base + rate * time`.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bound {
    pub base: f64,
    pub rate: f64,
}

impl Bound {
    #[inline]
    pub fn at(&self, time: f64) -> f64 {
        self.base + self.rate * time
    }
}

/// Closed interval with independently moving ends.
///
/// The default interval is `[0, 0]` and matches nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Interval {
    pub lo: Bound,
    pub hi: Bound,
}

impl Interval {
    /// `[lo, hi]` moving at `rate = [rate_lo, rate_hi]`.
    pub fn moving(lo: f64, hi: f64, rate: [f64; 2]) -> Self {
        Self {
            lo: Bound { base: lo, rate: rate[0] },
            hi: Bound { base: hi, rate: rate[1] },
        }
    }

    pub fn fixed(lo: f64, hi: f64) -> Self {
        Self::moving(lo, hi, [0.0, 0.0])
    }

    /// Evolved `(lo, hi)` at `time`.
    pub fn at(&self, time: f64) -> (f64, f64) {
        (self.lo.at(time), self.hi.at(time))
    }

    /// Empty or inverted intervals contain nothing.
    pub fn contains(&self, time: f64, v: f64) -> bool {
        let (lo, hi) = self.at(time);
        lo < hi && lo <= v && v <= hi
    }
}

/// Time-evolving region of a zone.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ZoneGeometry {
    /// One interval per axis; only the first `dimensionality` axes are tested.
    Brick { axes: [Interval; 3] },
    /// Shell of distance from the origin.
    Sphere { radius: Interval },
}

impl ZoneGeometry {
    pub fn shape(&self) -> ZoneShape {
        match self {
            ZoneGeometry::Brick { .. } => ZoneShape::BricksAndRectangles,
            ZoneGeometry::Sphere { .. } => ZoneShape::SpheresAndCircles,
        }
    }

    fn contains(&self, dimensionality: usize, time: f64, point: &[f64]) -> bool {
        let coords = &point[..dimensionality];
        match self {
            ZoneGeometry::Brick { axes } => coords
                .iter()
                .zip(axes)
                .all(|(&v, axis)| axis.contains(time, v)),
            ZoneGeometry::Sphere { radius } => {
                let r = coords.iter().map(|v| v * v).sum::<f64>().sqrt();
                radius.contains(time, r)
            }
        }
    }
}

/// A refinement zone.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Zone {
    /// Target refinement level inside the zone.
    pub level: u32,
    pub geometry: ZoneGeometry,
    pub options: ZoneOptions,
}

impl Zone {
    pub fn brick(level: u32, axes: [Interval; 3]) -> Self {
        Self {
            level,
            geometry: ZoneGeometry::Brick { axes },
            options: ZoneOptions::new(ZoneShape::BricksAndRectangles),
        }
    }

    pub fn sphere(level: u32, radius: Interval) -> Self {
        Self {
            level,
            geometry: ZoneGeometry::Sphere { radius },
            options: ZoneOptions::new(ZoneShape::SpheresAndCircles),
        }
    }

    pub fn with_options(mut self, options: ZoneOptions) -> Self {
        self.options = options;
        self
    }
}

/// Ordered, append-only zone list.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Dzn {
    zones: Vec<Zone>,
}

impl Dzn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `zone`; the returned index is permanent.
    pub fn push(&mut self, zone: Zone) -> Result<usize, MeshError> {
        let opts = zone.options;
        if !opts.add {
            return Err(MeshError::NotImplemented("subtractive zones (add = false)"));
        }
        if let ZoneKode::Other(_) = opts.kode {
            return Err(MeshError::NotImplemented("conditional zone activation"));
        }
        if opts.outer {
            return Err(MeshError::NotImplemented("outer-boundary zones"));
        }
        if opts.use_shape != zone.geometry.shape() {
            return Err(MeshError::ZoneShapeMismatch {
                requested: opts.use_shape,
                actual: zone.geometry.shape(),
            });
        }
        self.zones.push(zone);
        Ok(self.zones.len() - 1)
    }

    /// Index of the newest zone containing `point` at `time`.
    pub fn find_dzn(
        &self,
        dimensionality: usize,
        time: f64,
        point: &[f64],
    ) -> Result<Option<usize>, MeshError> {
        if !(1..=3).contains(&dimensionality) || point.len() < dimensionality {
            return Err(MeshError::InvalidDimension {
                dim: dimensionality,
                point_len: point.len(),
            });
        }
        Ok(self
            .zones
            .iter()
            .rposition(|z| z.geometry.contains(dimensionality, time, point)))
    }

    /// Refinement level requested at `point`, if any zone applies.
    pub fn target_level(
        &self,
        dimensionality: usize,
        time: f64,
        point: &[f64],
    ) -> Result<Option<u32>, MeshError> {
        Ok(self
            .find_dzn(dimensionality, time, point)?
            .map(|i| self.zones[i].level))
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Zone> {
        self.zones.get(index)
    }

    /// Zones in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Zone> {
        self.zones.iter()
    }
}

impl<'a> IntoIterator for &'a Dzn {
    type Item = &'a Zone;
    type IntoIter = std::slice::Iter<'a, Zone>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x_only(x: Interval) -> [Interval; 3] {
        [x, Interval::default(), Interval::default()]
    }

    #[test]
    fn shrinking_brick() {
        let mut dzn = Dzn::new();
        assert_eq!(dzn.push(Zone::brick(4, x_only(Interval::fixed(-2.0, 2.0)))).unwrap(), 0);
        let inner = Interval::moving(-1.0, 1.0, [0.5, -0.5]);
        assert_eq!(dzn.push(Zone::brick(2, x_only(inner))).unwrap(), 1);

        assert_eq!(dzn.find_dzn(1, 0.0, &[0.75]).unwrap(), Some(1));
        assert_eq!(dzn.find_dzn(1, 1.0, &[0.75]).unwrap(), Some(0));
        assert_eq!(dzn.target_level(1, 1.0, &[0.75]).unwrap(), Some(4));
        assert_eq!(dzn.find_dzn(1, 0.0, &[3.0]).unwrap(), None);
    }

    #[test]
    fn growing_sphere() {
        let mut dzn = Dzn::new();
        dzn.push(Zone::sphere(1, Interval::fixed(2.0, 3.0))).unwrap();
        dzn.push(Zone::sphere(3, Interval::moving(0.0, 0.0, [0.0, 1.0]))).unwrap();
        let inner = [1.0, 0.0];
        let outer = [0.0, 2.5];

        assert_eq!(dzn.find_dzn(2, 0.0, &inner).unwrap(), None);
        assert_eq!(dzn.find_dzn(2, 0.0, &outer).unwrap(), Some(0));
        assert_eq!(dzn.find_dzn(2, 1.1, &inner).unwrap(), Some(1));
        assert_eq!(dzn.find_dzn(2, 1.1, &outer).unwrap(), Some(0));
        assert_eq!(dzn.find_dzn(2, 2.6, &inner).unwrap(), Some(1));
        assert_eq!(dzn.find_dzn(2, 2.6, &outer).unwrap(), Some(1));
    }

    #[test]
    fn brick_tests_only_active_axes() {
        let mut dzn = Dzn::new();
        let axes = [
            Interval::fixed(0.0, 1.0),
            Interval::fixed(0.0, 1.0),
            Interval::fixed(5.0, 6.0),
        ];
        dzn.push(Zone::brick(1, axes)).unwrap();
        let p = [0.5, 0.5, 0.0];
        assert_eq!(dzn.find_dzn(2, 0.0, &p).unwrap(), Some(0));
        assert_eq!(dzn.find_dzn(3, 0.0, &p).unwrap(), None);
    }

    #[test]
    fn unresolvable_options_are_refused() {
        let mut dzn = Dzn::new();
        let base = Zone::sphere(1, Interval::fixed(0.0, 1.0));
        let mut opts = ZoneOptions::new(ZoneShape::SpheresAndCircles);
        opts.add = false;
        assert!(matches!(
            dzn.push(base.clone().with_options(opts)),
            Err(MeshError::NotImplemented(_))
        ));
        let mut opts = ZoneOptions::new(ZoneShape::SpheresAndCircles);
        opts.kode = ZoneKode::from_raw(2);
        assert!(matches!(
            dzn.push(base.clone().with_options(opts)),
            Err(MeshError::NotImplemented(_))
        ));
        let opts = ZoneOptions::new(ZoneShape::BricksAndRectangles);
        assert_eq!(
            dzn.push(base.with_options(opts)),
            Err(MeshError::ZoneShapeMismatch {
                requested: ZoneShape::BricksAndRectangles,
                actual: ZoneShape::SpheresAndCircles,
            })
        );
        assert!(dzn.is_empty());
    }

    #[test]
    fn bad_dimensionality() {
        let dzn = Dzn::new();
        assert!(matches!(
            dzn.find_dzn(0, 0.0, &[1.0]),
            Err(MeshError::InvalidDimension { dim: 0, .. })
        ));
        assert!(matches!(
            dzn.find_dzn(3, 0.0, &[1.0, 2.0]),
            Err(MeshError::InvalidDimension { dim: 3, point_len: 2 })
        ));
    }
}
