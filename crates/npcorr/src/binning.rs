//! Binning axes.
//!
//! There are 2 layers:
//! - the user-facing axes ([`SepAxis`], [`ShapeAxis`], [`TriangleBinning`])
//!   built from the "3 of 4" parameter rule while validating a config
//! - the internal spaces ([`SepSpace`], [`TriangleSpace`]) that the
//!   traversal bins into. These are only known once the coordinate system of
//!   the catalogs is known, since separations may need to be converted to
//!   radians or to chord lengths.

use crate::config::{Coords, MetricKind};
use crate::error::Error;
use npcorr_nostd_internal::{BinEdges, RegularBinEdges};
use std::f64::consts::PI;

/// How a separation axis is spaced
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Spacing {
    /// uniform in `ln(r)`
    Log,
    /// uniform in `r`
    Linear,
}

/// A fully-resolved separation axis (in user units)
#[derive(Clone, Debug, PartialEq)]
pub struct SepAxis {
    pub(crate) spacing: Spacing,
    pub(crate) min_sep: f64,
    pub(crate) max_sep: f64,
    pub(crate) nbins: usize,
    pub(crate) bin_size: f64,
}

fn wrong_count(who: &str, names: &str) -> Error {
    Error::bin_spec(who, format!("exactly 3 of {names} must be given"))
}

impl SepAxis {
    /// Apply the "3 of 4" rule. When `nbins` is derived, it is rounded up and
    /// `bin_size` is recomputed so that the bins exactly span the range.
    pub(crate) fn resolve(
        who: &str,
        spacing: Spacing,
        min_sep: Option<f64>,
        max_sep: Option<f64>,
        nbins: Option<usize>,
        bin_size: Option<f64>,
    ) -> Result<Self, Error> {
        let names = "min_sep, max_sep, nbins, bin_size";
        let n_given = [
            min_sep.is_some(),
            max_sep.is_some(),
            nbins.is_some(),
            bin_size.is_some(),
        ]
        .iter()
        .filter(|x| **x)
        .count();
        if n_given != 3 {
            return Err(wrong_count(who, names));
        }
        if nbins == Some(0) {
            return Err(Error::bin_spec(who, "nbins must be positive"));
        }
        if let Some(size) = bin_size {
            if !(size > 0.0) || !size.is_finite() {
                return Err(Error::bin_spec(who, "bin_size must be positive"));
            }
        }

        // `span` maps (min, max) onto the axis coordinate
        let span = |lo: f64, hi: f64| match spacing {
            Spacing::Log => (hi / lo).ln(),
            Spacing::Linear => hi - lo,
        };
        let check_range = |lo: f64, hi: f64| -> Result<(), Error> {
            let lower_ok = match spacing {
                Spacing::Log => lo > 0.0,
                Spacing::Linear => lo >= 0.0,
            };
            if !lower_ok || !lo.is_finite() {
                let limit = if spacing == Spacing::Log { "positive" } else { "non-negative" };
                Err(Error::bin_spec(who, format!("min_sep must be {limit}")))
            } else if !(lo < hi) || !hi.is_finite() {
                Err(Error::bin_spec(who, "min_sep must be less than max_sep"))
            } else {
                Ok(())
            }
        };

        let (min_sep, max_sep, nbins, bin_size) = match (min_sep, max_sep, nbins, bin_size) {
            (Some(lo), Some(hi), None, Some(size)) => {
                check_range(lo, hi)?;
                let n = (span(lo, hi) / size).ceil().max(1.0) as usize;
                (lo, hi, n, span(lo, hi) / n as f64)
            }
            (Some(lo), Some(hi), Some(n), None) => {
                check_range(lo, hi)?;
                (lo, hi, n, span(lo, hi) / n as f64)
            }
            (Some(lo), None, Some(n), Some(size)) => {
                let hi = match spacing {
                    Spacing::Log => lo * (n as f64 * size).exp(),
                    Spacing::Linear => lo + n as f64 * size,
                };
                check_range(lo, hi)?;
                (lo, hi, n, size)
            }
            (None, Some(hi), Some(n), Some(size)) => {
                let lo = match spacing {
                    Spacing::Log => hi * (-(n as f64) * size).exp(),
                    Spacing::Linear => hi - n as f64 * size,
                };
                check_range(lo, hi)?;
                (lo, hi, n, size)
            }
            _ => return Err(wrong_count(who, names)),
        };

        Ok(SepAxis {
            spacing,
            min_sep,
            max_sep,
            nbins,
            bin_size,
        })
    }

    /// TwoD binning covers `[-max_sep, max_sep]` along both axes. Exactly 2
    /// of `max_sep`, `nbins`, `bin_size` must be given. `min_sep` is optional
    /// and excludes pairs closer than it.
    pub(crate) fn resolve_twod(
        min_sep: Option<f64>,
        max_sep: Option<f64>,
        nbins: Option<usize>,
        bin_size: Option<f64>,
    ) -> Result<Self, Error> {
        let who = "TwoD";
        if nbins == Some(0) {
            return Err(Error::bin_spec(who, "nbins must be positive"));
        }
        if let Some(size) = bin_size {
            if !(size > 0.0) || !size.is_finite() {
                return Err(Error::bin_spec(who, "bin_size must be positive"));
            }
        }
        let (max_sep, nbins, bin_size) = match (max_sep, nbins, bin_size) {
            (Some(hi), None, Some(size)) => {
                let n = (2.0 * hi / size).ceil().max(1.0) as usize;
                (hi, n, 2.0 * hi / n as f64)
            }
            (Some(hi), Some(n), None) => (hi, n, 2.0 * hi / n as f64),
            (None, Some(n), Some(size)) => (0.5 * n as f64 * size, n, size),
            _ => {
                return Err(Error::bin_spec(
                    who,
                    "exactly 2 of max_sep, nbins, bin_size must be given",
                ));
            }
        };
        if !(max_sep > 0.0) || !max_sep.is_finite() {
            return Err(Error::bin_spec(who, "max_sep must be positive"));
        }
        let min_sep = min_sep.unwrap_or(0.0);
        if !(min_sep >= 0.0) || min_sep >= max_sep {
            return Err(Error::bin_spec(
                who,
                "min_sep must be non-negative and less than max_sep",
            ));
        }
        Ok(SepAxis {
            spacing: Spacing::Linear,
            min_sep,
            max_sep,
            nbins,
            bin_size,
        })
    }

    pub fn spacing(&self) -> Spacing {
        self.spacing
    }

    /// nominal bin centers (in user units)
    pub fn rnom(&self) -> Vec<f64> {
        (0..self.nbins)
            .map(|i| match self.spacing {
                Spacing::Log => (self.min_sep.ln() + (i as f64 + 0.5) * self.bin_size).exp(),
                Spacing::Linear => self.min_sep + (i as f64 + 0.5) * self.bin_size,
            })
            .collect()
    }
}

/// A linear axis describing one triangle-shape parameter (u, v or phi)
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeAxis {
    pub(crate) min: f64,
    pub(crate) max: f64,
    pub(crate) nbins: usize,
    pub(crate) bin_size: f64,
}

impl ShapeAxis {
    /// Resolve `(min, max, nbins, bin_size)` for a shape axis.
    ///
    /// Unlike the separation axis, every parameter has a default. Missing
    /// parameters are filled (min, then max, then bin_size) until 3 are
    /// known and the 4th is derived with the linear "3 of 4" rule. Supplying
    /// all 4 is an error.
    pub(crate) fn resolve(
        who: &str,
        (min, max, nbins, bin_size): (Option<f64>, Option<f64>, Option<usize>, Option<f64>),
        (default_min, default_max): (f64, f64),
        (hard_min, hard_max): (f64, f64),
        default_bin_size: f64,
    ) -> Result<Self, Error> {
        let mut min = min;
        let mut max = max;
        let mut bin_size = bin_size;
        let count = |min: &Option<f64>, max: &Option<f64>, size: &Option<f64>| {
            [min.is_some(), max.is_some(), nbins.is_some(), size.is_some()]
                .iter()
                .filter(|x| **x)
                .count()
        };
        if count(&min, &max, &bin_size) == 4 {
            return Err(Error::bin_spec(
                who,
                format!("at most 3 of min_{who}, max_{who}, n{who}bins, {who}bin_size may be given"),
            ));
        }
        while count(&min, &max, &bin_size) < 3 {
            if min.is_none() {
                min = Some(default_min);
            } else if max.is_none() {
                max = Some(default_max);
            } else {
                bin_size = Some(default_bin_size);
            }
        }

        if nbins == Some(0) {
            return Err(Error::bin_spec(who, "the number of bins must be positive"));
        }
        if let Some(size) = bin_size {
            if !(size > 0.0) || !size.is_finite() {
                return Err(Error::bin_spec(who, "the bin size must be positive"));
            }
        }

        let (lo, hi, n, size) = match (min, max, nbins, bin_size) {
            (Some(lo), Some(hi), None, Some(size)) => {
                let n = ((hi - lo) / size).ceil().max(1.0) as usize;
                (lo, hi, n, (hi - lo) / n as f64)
            }
            (Some(lo), Some(hi), Some(n), None) => (lo, hi, n, (hi - lo) / n as f64),
            (Some(lo), None, Some(n), Some(size)) => (lo, lo + n as f64 * size, n, size),
            (None, Some(hi), Some(n), Some(size)) => (hi - n as f64 * size, hi, n, size),
            _ => return Err(Error::internal("shape axis resolution reached a bad state")),
        };

        // allow for rounding in derived limits
        let tol = 1e-10 * (hard_max - hard_min);
        if !(lo >= hard_min - tol) || !(hi <= hard_max + tol) || !(lo < hi) {
            return Err(Error::bin_spec(
                who,
                format!(
                    "need {hard_min} <= min_{who} < max_{who} <= {hard_max}, got [{lo}, {hi}]"
                ),
            ));
        }
        Ok(ShapeAxis {
            min: lo.max(hard_min),
            max: hi.min(hard_max),
            nbins: n,
            bin_size: size,
        })
    }

    /// nominal bin centers
    pub fn centers(&self) -> Vec<f64> {
        (0..self.nbins)
            .map(|i| self.min + (i as f64 + 0.5) * self.bin_size)
            .collect()
    }

    pub fn min(&self) -> f64 {
        self.min
    }
    pub fn max(&self) -> f64 {
        self.max
    }
    pub fn nbins(&self) -> usize {
        self.nbins
    }
    pub fn bin_size(&self) -> f64 {
        self.bin_size
    }
}

/// The binning of a 3-point correlation
#[derive(Clone, Debug, PartialEq)]
pub enum TriangleBinning {
    /// `r = d2` (log), `u = d3/d2`, `v = ±(d1-d2)/d3`. The v axis is
    /// doubled so that both orientations get separate bins.
    Ruv {
        sep: SepAxis,
        u: ShapeAxis,
        v: ShapeAxis,
    },
    /// `d2` and `d3` share one log axis, `phi` is the opening angle at the
    /// vertex between them
    Sas { sep: SepAxis, phi: ShapeAxis },
}

impl TriangleBinning {
    pub fn sep(&self) -> &SepAxis {
        match self {
            TriangleBinning::Ruv { sep, .. } | TriangleBinning::Sas { sep, .. } => sep,
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        match self {
            TriangleBinning::Ruv { sep, u, v } => [sep.nbins, u.nbins, 2 * v.nbins],
            TriangleBinning::Sas { sep, phi } => [sep.nbins, sep.nbins, phi.nbins],
        }
    }

    /// the bin size that determines the recommended bin_slop
    pub(crate) fn largest_bin_size(&self) -> f64 {
        match self {
            TriangleBinning::Ruv { sep, u, v } => sep.bin_size.max(u.bin_size).max(v.bin_size),
            TriangleBinning::Sas { sep, phi } => sep.bin_size.max(phi.bin_size),
        }
    }

    /// nominal values of the 3 binned coordinates, one array per axis, laid
    /// out over the full (flattened) bin grid
    pub fn nominal(&self) -> [Vec<f64>; 3] {
        let shape = self.shape();
        let n = shape.iter().product();
        let mut out = [vec![0.0; n], vec![0.0; n], vec![0.0; n]];
        let rnom = self.sep().rnom();
        for i in 0..shape[0] {
            for j in 0..shape[1] {
                for k in 0..shape[2] {
                    let idx = (i * shape[1] + j) * shape[2] + k;
                    match self {
                        TriangleBinning::Ruv { u, v, .. } => {
                            out[0][idx] = rnom[i];
                            out[1][idx] = u.min + (j as f64 + 0.5) * u.bin_size;
                            let nv = v.nbins;
                            out[2][idx] = if k >= nv {
                                v.min + ((k - nv) as f64 + 0.5) * v.bin_size
                            } else {
                                -(v.min + ((nv - 1 - k) as f64 + 0.5) * v.bin_size)
                            };
                        }
                        TriangleBinning::Sas { phi, .. } => {
                            out[0][idx] = rnom[i];
                            out[1][idx] = rnom[j];
                            out[2][idx] = phi.min + (k as f64 + 0.5) * phi.bin_size;
                        }
                    }
                }
            }
        }
        out
    }
}

/// How an internal separation converts back to user units
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum SepConversion {
    /// `user = internal / unit_scale`
    Scale(f64),
    /// the internal separation is a chord length on the unit sphere:
    /// `user = 2 asin(internal/2) / unit_scale`
    Chord(f64),
}

impl SepConversion {
    pub(crate) fn to_user(&self, r: f64) -> f64 {
        match *self {
            SepConversion::Scale(scale) => r / scale,
            SepConversion::Chord(scale) => 2.0 * (0.5 * r).min(1.0).asin() / scale,
        }
    }

    fn to_internal(&self, r: f64) -> f64 {
        match *self {
            SepConversion::Scale(scale) => r * scale,
            SepConversion::Chord(scale) => 2.0 * (0.5 * (r * scale).min(PI)).sin(),
        }
    }
}

/// A separation axis expressed in the units used by the traversal
#[derive(Clone, Debug)]
pub(crate) struct SepSpace {
    pub(crate) spacing: Spacing,
    /// bins in `ln(r)` (Log) or `r` (Linear)
    pub(crate) edges: RegularBinEdges,
    pub(crate) min_sep: f64,
    pub(crate) max_sep: f64,
    pub(crate) conversion: SepConversion,
}

impl SepSpace {
    pub(crate) fn new(
        axis: &SepAxis,
        metric: MetricKind,
        coords: Coords,
        unit_scale: f64,
    ) -> Result<Self, Error> {
        let conversion = if metric == MetricKind::Euclidean && coords == Coords::Spherical {
            SepConversion::Chord(unit_scale)
        } else {
            // 3d coordinates only carry units with the Arc metric
            SepConversion::Scale(unit_scale)
        };
        let min_sep = conversion.to_internal(axis.min_sep);
        let max_sep = conversion.to_internal(axis.max_sep);
        let edges = match axis.spacing {
            Spacing::Log => RegularBinEdges::new(min_sep.ln(), max_sep.ln(), axis.nbins),
            Spacing::Linear => RegularBinEdges::new(min_sep, max_sep, axis.nbins),
        }
        .map_err(|e| Error::bin_spec("separation", e))?;
        Ok(SepSpace {
            spacing: axis.spacing,
            edges,
            min_sep,
            max_sep,
            conversion,
        })
    }

    /// TwoD space. The edges cover `[-max_sep, max_sep]` in each dimension.
    pub(crate) fn new_twod(axis: &SepAxis) -> Result<Self, Error> {
        let edges = RegularBinEdges::new(-axis.max_sep, axis.max_sep, axis.nbins)
            .map_err(|e| Error::bin_spec("TwoD", e))?;
        Ok(SepSpace {
            spacing: Spacing::Linear,
            edges,
            min_sep: axis.min_sep,
            max_sep: axis.max_sep,
            conversion: SepConversion::Scale(1.0),
        })
    }

    /// the axis coordinate of separation `r`
    #[inline]
    pub(crate) fn coord(&self, r: f64) -> f64 {
        match self.spacing {
            Spacing::Log => r.ln(),
            Spacing::Linear => r,
        }
    }

    /// bin of a separation (None if outside `[min_sep, max_sep)`)
    #[inline]
    pub(crate) fn bin_index(&self, r: f64) -> Option<usize> {
        if !(r >= self.min_sep && r < self.max_sep) {
            return None;
        }
        Some(self.edges.clamped_bin_index(self.coord(r)))
    }

    /// the single bin holding every separation in `[lo, hi]`, if any
    #[inline]
    pub(crate) fn interval_bin_index(&self, lo: f64, hi: f64) -> Option<usize> {
        if !(lo >= self.min_sep && hi < self.max_sep) {
            return None;
        }
        let i = self.edges.clamped_bin_index(self.coord(lo));
        let j = self.edges.clamped_bin_index(self.coord(hi));
        if i == j { Some(i) } else { None }
    }
}

/// Bin of `value` on a shape axis whose range is closed at the top
#[inline]
pub(crate) fn closed_bin_index(edges: &RegularBinEdges, value: f64) -> Option<usize> {
    if !(value >= edges.leftmost_edge() && value <= edges.rightmost_edge()) {
        return None;
    }
    Some(edges.clamped_bin_index(value))
}

/// Like [`closed_bin_index`], for every value in `[lo, hi]`
#[inline]
pub(crate) fn closed_interval_bin_index(
    edges: &RegularBinEdges,
    lo: f64,
    hi: f64,
) -> Option<usize> {
    let i = closed_bin_index(edges, lo)?;
    let j = closed_bin_index(edges, hi)?;
    if i == j { Some(i) } else { None }
}

/// The shape part of a [`TriangleSpace`]
#[derive(Clone, Debug)]
pub(crate) enum ShapeSpace {
    Ruv {
        u: RegularBinEdges,
        /// edges in `|v|`
        v: RegularBinEdges,
    },
    Sas {
        phi: RegularBinEdges,
        /// when false, phi is folded into `[0, pi]` regardless of orientation
        oriented: bool,
    },
}

/// Triangle binning expressed in traversal units
#[derive(Clone, Debug)]
pub(crate) struct TriangleSpace {
    pub(crate) sep: SepSpace,
    pub(crate) shape: ShapeSpace,
    /// `[n0, n1, n2]` bins
    pub(crate) dims: [usize; 3],
}

impl TriangleSpace {
    pub(crate) fn new(
        binning: &TriangleBinning,
        metric: MetricKind,
        coords: Coords,
        unit_scale: f64,
    ) -> Result<Self, Error> {
        let sep = SepSpace::new(binning.sep(), metric, coords, unit_scale)?;
        let edges = |axis: &ShapeAxis, who: &str| {
            RegularBinEdges::new(axis.min, axis.max, axis.nbins).map_err(|e| Error::bin_spec(who, e))
        };
        let shape = match binning {
            TriangleBinning::Ruv { u, v, .. } => ShapeSpace::Ruv {
                u: edges(u, "u")?,
                v: edges(v, "v")?,
            },
            TriangleBinning::Sas { phi, .. } => ShapeSpace::Sas {
                phi: edges(phi, "phi")?,
                oriented: phi.max > PI,
            },
        };
        Ok(TriangleSpace {
            sep,
            shape,
            dims: binning.shape(),
        })
    }

    #[inline]
    pub(crate) fn flat_index(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.dims[1] + j) * self.dims[2] + k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_nbins() {
        let axis = SepAxis::resolve(
            "sep",
            Spacing::Log,
            Some(1.0),
            Some(100.0),
            None,
            Some(0.2),
        )
        .unwrap();
        // ln(100)/0.2 = 23.03
        assert_eq!(axis.nbins, 24);
        assert!((axis.bin_size - (100.0f64).ln() / 24.0).abs() < 1e-14);

        let axis = SepAxis::resolve(
            "sep",
            Spacing::Linear,
            None,
            Some(10.0),
            Some(4),
            Some(2.0),
        )
        .unwrap();
        assert_eq!(axis.min_sep, 2.0);
        // negative min_sep for linear
        assert!(
            SepAxis::resolve("sep", Spacing::Linear, None, Some(10.0), Some(6), Some(2.0)).is_err()
        );
        // non-positive min_sep for log
        assert!(
            SepAxis::resolve("sep", Spacing::Log, Some(0.0), Some(10.0), Some(6), None).is_err()
        );
    }

    #[test]
    fn rnom_log() {
        let axis =
            SepAxis::resolve("sep", Spacing::Log, Some(1.0), None, Some(2), Some(0.5)).unwrap();
        let rnom = axis.rnom();
        assert!((rnom[0] - (0.25f64).exp()).abs() < 1e-14);
        assert!((rnom[1] - (0.75f64).exp()).abs() < 1e-14);
    }

    #[test]
    fn twod_axis() {
        let axis = SepAxis::resolve_twod(None, Some(5.0), Some(10), None).unwrap();
        assert_eq!(axis.bin_size, 1.0);
        assert_eq!(axis.min_sep, 0.0);
        assert!(SepAxis::resolve_twod(None, Some(5.0), Some(10), Some(1.0)).is_err());
        let space = SepSpace::new_twod(&axis).unwrap();
        assert_eq!(space.edges.bin_index(-4.5), Some(0));
        assert_eq!(space.edges.bin_index(0.5), Some(5));
    }

    #[test]
    fn shape_defaults() {
        let u = ShapeAxis::resolve("u", (None, None, None, None), (0.0, 1.0), (0.0, 1.0), 0.1).unwrap();
        assert_eq!(u.nbins, 10);
        assert_eq!((u.min, u.max), (0.0, 1.0));

        let u = ShapeAxis::resolve("u", (None, None, Some(4), None), (0.0, 1.0), (0.0, 1.0), 0.1).unwrap();
        assert_eq!(u.bin_size, 0.25);

        let v = ShapeAxis::resolve("v", (Some(0.5), None, None, None), (0.0, 1.0), (0.0, 1.0), 0.1).unwrap();
        assert_eq!(v.nbins, 5);

        // out of range
        assert!(ShapeAxis::resolve("u", (None, Some(1.5), None, None), (0.0, 1.0), (0.0, 1.0), 0.1).is_err());
        // all four
        assert!(
            ShapeAxis::resolve("u", (Some(0.0), Some(1.0), Some(10), Some(0.1)), (0.0, 1.0), (0.0, 1.0), 0.1)
                .is_err()
        );
    }

    #[test]
    fn ruv_nominal_v() {
        let sep = SepAxis::resolve("sep", Spacing::Log, Some(1.0), None, Some(1), Some(0.1)).unwrap();
        let u = ShapeAxis::resolve("u", (None, None, Some(1), None), (0.0, 1.0), (0.0, 1.0), 0.1).unwrap();
        let v = ShapeAxis::resolve("v", (None, None, Some(2), None), (0.0, 1.0), (0.0, 1.0), 0.1).unwrap();
        let binning = TriangleBinning::Ruv { sep, u, v };
        assert_eq!(binning.shape(), [1, 1, 4]);
        let [_, _, vnom] = binning.nominal();
        assert_eq!(vnom, vec![-0.75, -0.25, 0.25, 0.75]);
    }

    #[test]
    fn sep_space_conversions() {
        let axis =
            SepAxis::resolve("sep", Spacing::Log, Some(1.0), Some(10.0), Some(5), None).unwrap();
        let deg = PI / 180.0;

        let space = SepSpace::new(&axis, MetricKind::Arc, Coords::Spherical, deg).unwrap();
        assert!((space.min_sep - deg).abs() < 1e-15);
        assert!((space.conversion.to_user(space.max_sep) - 10.0).abs() < 1e-12);

        let space = SepSpace::new(&axis, MetricKind::Euclidean, Coords::Spherical, deg).unwrap();
        assert!((space.min_sep - 2.0 * (0.5 * deg).sin()).abs() < 1e-15);
        assert!((space.conversion.to_user(space.min_sep) - 1.0).abs() < 1e-12);

        let space = SepSpace::new(&axis, MetricKind::Euclidean, Coords::Flat, 1.0).unwrap();
        assert_eq!(space.bin_index(1.0), Some(0));
        assert_eq!(space.bin_index(9.999), Some(4));
        assert_eq!(space.bin_index(10.0), None);
        assert_eq!(space.interval_bin_index(1.1, 1.2), Some(0));
        assert_eq!(space.interval_bin_index(1.1, 2.0), None);

        // flat positions in radians, separations in degrees
        let space = SepSpace::new(&axis, MetricKind::Euclidean, Coords::Flat, deg).unwrap();
        assert!((space.min_sep - deg).abs() < 1e-15);
        assert_eq!(space.bin_index(1.5 * deg), Some(0));
    }

    #[test]
    fn closed_axis() {
        let edges = RegularBinEdges::new(0.0, 1.0, 4).unwrap();
        assert_eq!(closed_bin_index(&edges, 1.0), Some(3));
        assert_eq!(closed_bin_index(&edges, 1.01), None);
        assert_eq!(closed_interval_bin_index(&edges, 0.8, 1.0), Some(3));
        assert_eq!(closed_interval_bin_index(&edges, 0.7, 0.8), None);
    }
}
