//! Uniform bin edges along one axis.
//!
//! Logarithmic separation bins are uniform in `ln(r)`; `npcorr` takes the
//! logarithm before asking for an index, since `ln` needs `std` (or `libm`).

/// Lookup of the bin that holds a coordinate.
pub trait BinEdges {
    /// Index of the half-open bin `[lo, hi)` holding `value`, or `None`
    /// outside of the binned range (NaN included).
    fn bin_index(&self, value: f64) -> Option<usize>;

    fn n_bins(&self) -> usize;

    fn leftmost_edge(&self) -> f64;

    fn rightmost_edge(&self) -> f64;

    /// The bin that holds all of `[lo, hi]`, if there is one.
    ///
    /// A cell pair whose separation range resolves to a single bin can be
    /// accumulated without being split further.
    fn interval_bin_index(&self, lo: f64, hi: f64) -> Option<usize> {
        match (self.bin_index(lo), self.bin_index(hi)) {
            (Some(i), Some(j)) if i == j => Some(i),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RegularBinEdges {
    lo: f64,
    hi: f64,
    width: f64,
    count: usize,
}

impl RegularBinEdges {
    /// `count` bins of equal width spanning `[lo, hi)`.
    pub fn new(lo: f64, hi: f64, count: usize) -> Result<Self, &'static str> {
        if count == 0 {
            return Err("need at least one bin");
        }
        if !(lo.is_finite() && hi.is_finite()) {
            return Err("bin limits must be finite");
        }
        if hi <= lo {
            return Err("upper bin limit must exceed the lower one");
        }
        let span = hi - lo;
        let width = span / count as f64;
        // an infinite span overflows from two finite limits; a zero width
        // underflows when the bins are narrower than the smallest f64
        if !span.is_finite() || width == 0.0 {
            return Err("bin limits give a degenerate bin width");
        }
        Ok(Self {
            lo,
            hi,
            width,
            count,
        })
    }

    pub fn bin_size(&self) -> f64 {
        self.width
    }

    #[inline(always)]
    fn raw_index(&self, value: f64) -> usize {
        // the float-to-int cast saturates, so both ends just need a cap
        (((value - self.lo) / self.width) as usize).min(self.count - 1)
    }

    /// Index of the bin holding `value`, pinned to the first or last bin for
    /// values outside the range.
    ///
    /// For callers that already know `value` lies within the limits, up to
    /// rounding.
    pub fn clamped_bin_index(&self, value: f64) -> usize {
        if value <= self.lo { 0 } else { self.raw_index(value) }
    }
}

impl BinEdges for RegularBinEdges {
    fn bin_index(&self, value: f64) -> Option<usize> {
        (value >= self.lo && value < self.hi).then(|| self.raw_index(value))
    }

    fn n_bins(&self) -> usize {
        self.count
    }

    fn leftmost_edge(&self) -> f64 {
        self.lo
    }

    fn rightmost_edge(&self) -> f64 {
        self.hi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_errors() {
        assert!(RegularBinEdges::new(0.0, 10.0, 0).is_err());
        assert!(RegularBinEdges::new(10.0, 10.0, 5).is_err());
        assert!(RegularBinEdges::new(10.0, 0.0, 5).is_err());
        assert!(RegularBinEdges::new(f64::NEG_INFINITY, 10.0, 5).is_err());
        assert!(RegularBinEdges::new(0.0, f64::INFINITY, 5).is_err());
        assert!(RegularBinEdges::new(f64::NAN, 10.0, 5).is_err());
        assert!(RegularBinEdges::new(-f64::MAX, f64::MAX, 5).is_err());
    }

    #[test]
    fn half_open_bins() {
        let bins = RegularBinEdges::new(0.0, 10.0, 5).unwrap();
        assert_eq!(bins.n_bins(), 5);
        assert_eq!(bins.bin_size(), 2.0);

        assert_eq!(bins.bin_index(0.0), Some(0));
        assert_eq!(bins.bin_index(1.9), Some(0));
        assert_eq!(bins.bin_index(2.0), Some(1));
        assert_eq!(bins.bin_index(9.9), Some(4));

        assert_eq!(bins.bin_index(10.0), None);
        assert_eq!(bins.bin_index(-0.1), None);
        assert_eq!(bins.bin_index(f64::NAN), None);
    }

    #[test]
    fn intervals() {
        let bins = RegularBinEdges::new(-1.0, 1.0, 4).unwrap();
        assert_eq!(bins.interval_bin_index(-0.9, -0.6), Some(0));
        assert_eq!(bins.interval_bin_index(0.1, 0.4), Some(2));
        // straddles the edge at -0.5
        assert_eq!(bins.interval_bin_index(-0.6, -0.4), None);
        // runs off either end
        assert_eq!(bins.interval_bin_index(0.6, 1.2), None);
        assert_eq!(bins.interval_bin_index(-1.5, -0.9), None);
    }

    #[test]
    fn clamping() {
        let bins = RegularBinEdges::new(1.0, 3.0, 4).unwrap();
        assert_eq!(bins.clamped_bin_index(0.2), 0);
        assert_eq!(bins.clamped_bin_index(2.1), 2);
        assert_eq!(bins.clamped_bin_index(3.0), 3);
        assert_eq!(bins.clamped_bin_index(7.5), 3);
    }
}
