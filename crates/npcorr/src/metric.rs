//! Distance metrics.
//!
//! Each metric is a small `Copy` type implementing [`MetricOps`]. The
//! traversal engines are generic over `MetricOps` so the per-pair work is
//! monomorphized; [`Metric`] is the runtime selection, and [`with_metric!`]
//! performs the single dispatch at the top of a calculation.
//!
//! Besides the separation of 2 positions, a metric has to bound the
//! separation of *any* pair of points drawn from 2 cells (given the cells'
//! centers and sizes). The traversal relies on those bounds for pruning and
//! for deciding when a pair of cells falls entirely within 1 bin.

use crate::config::{CommonConfig, Coords, MetricKind};
use crate::error::Error;

pub(crate) type Pos = [f64; 3];

#[inline(always)]
pub(crate) fn sub(a: &Pos, b: &Pos) -> Pos {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline(always)]
pub(crate) fn dot(a: &Pos, b: &Pos) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline(always)]
pub(crate) fn cross(a: &Pos, b: &Pos) -> Pos {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline(always)]
pub(crate) fn norm(a: &Pos) -> f64 {
    dot(a, a).sqrt()
}

/// Where a cell pair's line-of-sight separation lies relative to the
/// `[min_rpar, max_rpar]` window
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RparCheck {
    /// every pair is outside of the window
    Outside,
    /// every pair is inside of the window
    Inside,
    /// some pairs may be inside & others outside
    Straddle,
}

#[inline]
fn rpar_check(rpar: f64, e: f64, min_rpar: f64, max_rpar: f64) -> RparCheck {
    if rpar + e < min_rpar || rpar - e >= max_rpar {
        RparCheck::Outside
    } else if rpar - e >= min_rpar && rpar + e < max_rpar {
        RparCheck::Inside
    } else {
        RparCheck::Straddle
    }
}

pub(crate) trait MetricOps: Copy + Send + Sync {
    /// the separation between 2 positions
    fn dist(&self, p1: &Pos, p2: &Pos) -> f64;

    /// Bounds `[lo, hi]` on the separation between any point within `s1` of
    /// `p1` and any point within `s2` of `p2`, where `d = self.dist(p1, p2)`
    fn bounds(&self, p1: &Pos, p2: &Pos, d: f64, s1: f64, s2: f64) -> (f64, f64) {
        let _ = (p1, p2);
        let e = s1 + s2;
        ((d - e).max(0.0), d + e)
    }

    /// The offset vector from `p1` to `p2` (what the TwoD binning and shear
    /// projections see)
    #[inline(always)]
    fn offset(&self, p1: &Pos, p2: &Pos) -> Pos {
        sub(p2, p1)
    }

    /// Check against the line-of-sight window. Always `Inside` for metrics
    /// without a line-of-sight component.
    #[inline(always)]
    fn check_rpar(&self, p1: &Pos, p2: &Pos, s1: f64, s2: f64) -> RparCheck {
        let _ = (p1, p2, s1, s2);
        RparCheck::Inside
    }
}

/// Straight-line distance. For spherical coordinates this is the chord
/// length between unit vectors.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Euclidean;

impl MetricOps for Euclidean {
    #[inline(always)]
    fn dist(&self, p1: &Pos, p2: &Pos) -> f64 {
        norm(&sub(p2, p1))
    }
}

/// Great-circle angle between unit vectors. Cell sizes are angles too.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Arc;

impl MetricOps for Arc {
    #[inline(always)]
    fn dist(&self, p1: &Pos, p2: &Pos) -> f64 {
        // atan2 stays accurate for both tiny and near-antipodal angles
        norm(&cross(p1, p2)).atan2(dot(p1, p2))
    }

    fn bounds(&self, _p1: &Pos, _p2: &Pos, d: f64, s1: f64, s2: f64) -> (f64, f64) {
        let e = s1 + s2;
        ((d - e).max(0.0), (d + e).min(std::f64::consts::PI))
    }
}

/// Perpendicular separation relative to the line of sight through the
/// midpoint of the 2 positions
#[derive(Clone, Copy, Debug)]
pub(crate) struct Rperp {
    pub(crate) min_rpar: f64,
    pub(crate) max_rpar: f64,
}

impl Rperp {
    /// `(rpar, |p2-p1|, |L|)`
    #[inline(always)]
    fn decompose(p1: &Pos, p2: &Pos) -> (f64, f64, f64) {
        let delta = sub(p2, p1);
        let l = [
            0.5 * (p1[0] + p2[0]),
            0.5 * (p1[1] + p2[1]),
            0.5 * (p1[2] + p2[2]),
        ];
        let lnorm = norm(&l);
        let rpar = if lnorm > 0.0 { dot(&delta, &l) / lnorm } else { 0.0 };
        (rpar, norm(&delta), lnorm)
    }

    /// uncertainty in both rpar and rperp, from shifting the endpoints and
    /// rotating the line of sight
    #[inline(always)]
    fn effective_error(full: f64, lnorm: f64, s1: f64, s2: f64) -> f64 {
        let e = s1 + s2;
        if e == 0.0 {
            0.0
        } else if lnorm > 0.0 {
            e * (1.0 + full / lnorm)
        } else {
            f64::INFINITY
        }
    }
}

impl MetricOps for Rperp {
    #[inline(always)]
    fn dist(&self, p1: &Pos, p2: &Pos) -> f64 {
        let (rpar, full, _) = Self::decompose(p1, p2);
        (full * full - rpar * rpar).max(0.0).sqrt()
    }

    fn bounds(&self, p1: &Pos, p2: &Pos, d: f64, s1: f64, s2: f64) -> (f64, f64) {
        let (_, full, lnorm) = Self::decompose(p1, p2);
        let e = Self::effective_error(full, lnorm, s1, s2);
        ((d - e).max(0.0), d + e)
    }

    fn check_rpar(&self, p1: &Pos, p2: &Pos, s1: f64, s2: f64) -> RparCheck {
        let (rpar, full, lnorm) = Self::decompose(p1, p2);
        let e = Self::effective_error(full, lnorm, s1, s2);
        rpar_check(rpar, e, self.min_rpar, self.max_rpar)
    }
}

/// The older perpendicular separation, with `rpar = |p2| - |p1|`
#[derive(Clone, Copy, Debug)]
pub(crate) struct OldRperp {
    pub(crate) min_rpar: f64,
    pub(crate) max_rpar: f64,
}

impl MetricOps for OldRperp {
    #[inline(always)]
    fn dist(&self, p1: &Pos, p2: &Pos) -> f64 {
        let rpar = norm(p2) - norm(p1);
        let full = norm(&sub(p2, p1));
        (full * full - rpar * rpar).max(0.0).sqrt()
    }

    fn bounds(&self, p1: &Pos, p2: &Pos, _d: f64, s1: f64, s2: f64) -> (f64, f64) {
        let e = s1 + s2;
        let rpar = (norm(p2) - norm(p1)).abs();
        let full = norm(&sub(p2, p1));
        let full_lo = (full - e).max(0.0);
        let full_hi = full + e;
        let rpar_lo = (rpar - e).max(0.0);
        let rpar_hi = rpar + e;
        let lo = (full_lo * full_lo - rpar_hi * rpar_hi).max(0.0).sqrt();
        let hi = (full_hi * full_hi - rpar_lo * rpar_lo).max(0.0).sqrt();
        (lo, hi)
    }

    fn check_rpar(&self, p1: &Pos, p2: &Pos, s1: f64, s2: f64) -> RparCheck {
        rpar_check(norm(p2) - norm(p1), s1 + s2, self.min_rpar, self.max_rpar)
    }
}

/// Distance from the first position (the lens) to the line of sight through
/// the second
#[derive(Clone, Copy, Debug)]
pub(crate) struct Rlens {
    pub(crate) min_rpar: f64,
    pub(crate) max_rpar: f64,
}

impl Rlens {
    #[inline(always)]
    fn effective_error(p1: &Pos, p2: &Pos, s1: f64, s2: f64) -> f64 {
        if s2 == 0.0 {
            s1
        } else {
            let n2 = norm(p2);
            if n2 > 0.0 { s1 + 2.0 * s2 * norm(p1) / n2 } else { f64::INFINITY }
        }
    }
}

impl MetricOps for Rlens {
    #[inline(always)]
    fn dist(&self, p1: &Pos, p2: &Pos) -> f64 {
        let n2 = norm(p2);
        if n2 > 0.0 { norm(&cross(p1, p2)) / n2 } else { norm(p1) }
    }

    fn bounds(&self, p1: &Pos, p2: &Pos, d: f64, s1: f64, s2: f64) -> (f64, f64) {
        let e = Self::effective_error(p1, p2, s1, s2);
        ((d - e).max(0.0), d + e)
    }

    fn check_rpar(&self, p1: &Pos, p2: &Pos, s1: f64, s2: f64) -> RparCheck {
        rpar_check(norm(p2) - norm(p1), s1 + s2, self.min_rpar, self.max_rpar)
    }
}

/// Euclidean distance using the minimum-image convention of a periodic box.
/// A period of 0 means the axis isn't periodic (only used for the z-axis of
/// flat coordinates).
#[derive(Clone, Copy, Debug)]
pub(crate) struct Periodic {
    pub(crate) period: [f64; 3],
}

impl MetricOps for Periodic {
    #[inline(always)]
    fn dist(&self, p1: &Pos, p2: &Pos) -> f64 {
        norm(&self.offset(p1, p2))
    }

    #[inline(always)]
    fn offset(&self, p1: &Pos, p2: &Pos) -> Pos {
        let mut delta = sub(p2, p1);
        for (dx, l) in delta.iter_mut().zip(self.period) {
            if l > 0.0 {
                *dx -= l * (*dx / l).round();
            }
        }
        delta
    }
}

/// The runtime selection of a metric
#[derive(Clone, Copy, Debug)]
pub(crate) enum Metric {
    Euclidean(Euclidean),
    Arc(Arc),
    Rperp(Rperp),
    OldRperp(OldRperp),
    Rlens(Rlens),
    Periodic(Periodic),
}

impl Metric {
    /// Build the metric for a calculation, after checking it against the
    /// coordinate system of the catalogs
    pub(crate) fn new(
        common: &CommonConfig,
        coords: Coords,
        three_point: bool,
    ) -> Result<Self, Error> {
        common.check_coords(coords, three_point)?;
        let (min_rpar, max_rpar) = common.rpar_range();
        Ok(match common.metric() {
            MetricKind::Euclidean => Metric::Euclidean(Euclidean),
            MetricKind::Arc => Metric::Arc(Arc),
            MetricKind::Rperp => Metric::Rperp(Rperp { min_rpar, max_rpar }),
            MetricKind::OldRperp => Metric::OldRperp(OldRperp { min_rpar, max_rpar }),
            MetricKind::Rlens => Metric::Rlens(Rlens { min_rpar, max_rpar }),
            MetricKind::Periodic => {
                let mut period = common.period();
                if coords == Coords::Flat {
                    period[2] = 0.0;
                }
                Metric::Periodic(Periodic { period })
            }
        })
    }

    /// whether positions must be projected onto the unit sphere (and cell
    /// sizes measured as angles)
    pub(crate) fn is_angular(&self) -> bool {
        matches!(self, Metric::Arc(_))
    }

    /// whether the metric restricts the line-of-sight separation
    pub(crate) fn has_rpar(&self) -> bool {
        matches!(self, Metric::Rperp(_) | Metric::OldRperp(_) | Metric::Rlens(_))
    }
}

/// Expand `$body` once per metric type, with `$m` bound to the concrete
/// metric.
macro_rules! with_metric {
    ($metric:expr, $m:ident => $body:expr) => {
        match $metric {
            $crate::metric::Metric::Euclidean($m) => $body,
            $crate::metric::Metric::Arc($m) => $body,
            $crate::metric::Metric::Rperp($m) => $body,
            $crate::metric::Metric::OldRperp($m) => $body,
            $crate::metric::Metric::Rlens($m) => $body,
            $crate::metric::Metric::Periodic($m) => $body,
        }
    };
}
pub(crate) use with_metric;

#[cfg(test)]
mod tests {
    use super::*;
    use rand::distr::{Distribution, Uniform};
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn random_offset(rng: &mut impl Rng, size: f64) -> Pos {
        // a point inside of a ball of radius `size`
        let unit = Uniform::try_from(-1.0..1.0).unwrap();
        loop {
            let p = [unit.sample(rng), unit.sample(rng), unit.sample(rng)];
            if dot(&p, &p) <= 1.0 {
                return [p[0] * size, p[1] * size, p[2] * size];
            }
        }
    }

    fn add(a: &Pos, b: &Pos) -> Pos {
        [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
    }

    fn check_bounds_hold<M: MetricOps>(metric: M, seed: u64) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let coord = Uniform::try_from(5.0..15.0).unwrap();
        for _ in 0..200 {
            let c1 = [coord.sample(&mut rng), coord.sample(&mut rng), coord.sample(&mut rng)];
            let c2 = [coord.sample(&mut rng), coord.sample(&mut rng), coord.sample(&mut rng)];
            let (s1, s2) = (0.5, 0.25);
            let d = metric.dist(&c1, &c2);
            let (lo, hi) = metric.bounds(&c1, &c2, d, s1, s2);
            for _ in 0..20 {
                let p1 = add(&c1, &random_offset(&mut rng, s1));
                let p2 = add(&c2, &random_offset(&mut rng, s2));
                let dp = metric.dist(&p1, &p2);
                assert!(dp >= lo - 1e-12 && dp <= hi + 1e-12, "{dp} not in [{lo}, {hi}]");
            }
        }
    }

    #[test]
    fn bounds_contain_member_separations() {
        let rpar = (f64::NEG_INFINITY, f64::INFINITY);
        check_bounds_hold(Euclidean, 1);
        check_bounds_hold(Rperp { min_rpar: rpar.0, max_rpar: rpar.1 }, 2);
        check_bounds_hold(OldRperp { min_rpar: rpar.0, max_rpar: rpar.1 }, 3);
        check_bounds_hold(Rlens { min_rpar: rpar.0, max_rpar: rpar.1 }, 4);
        check_bounds_hold(Periodic { period: [7.0, 7.0, 7.0] }, 5);
    }

    #[test]
    fn arc_distance() {
        let p1 = [1.0, 0.0, 0.0];
        let p2 = [0.0, 1.0, 0.0];
        assert!((Arc.dist(&p1, &p2) - std::f64::consts::FRAC_PI_2).abs() < 1e-15);
        let tiny = 1e-9f64;
        let p3 = [tiny.cos(), tiny.sin(), 0.0];
        assert!((Arc.dist(&p1, &p3) - tiny).abs() < 1e-20);
    }

    #[test]
    fn periodic_minimum_image() {
        let metric = Periodic {
            period: [10.0, 10.0, 0.0],
        };
        let d = metric.dist(&[0.5, 0.5, 0.0], &[9.5, 9.5, 0.0]);
        assert!((d - 2.0f64.sqrt()).abs() < 1e-12);
        let off = metric.offset(&[0.5, 0.0, 0.0], &[9.5, 0.0, 0.0]);
        assert!((off[0] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn line_of_sight_decompositions() {
        let p1 = [0.0, 0.0, 10.0];
        let p2 = [3.0, 0.0, 14.0];
        // midpoint is (1.5, 0, 12); delta = (3, 0, 4)
        let rperp = Rperp {
            min_rpar: 0.0,
            max_rpar: 100.0,
        };
        let l = [1.5, 0.0, 12.0];
        let rpar = dot(&[3.0, 0.0, 4.0], &l) / norm(&l);
        let expected = (25.0 - rpar * rpar).sqrt();
        assert!((rperp.dist(&p1, &p2) - expected).abs() < 1e-12);
        assert_eq!(rperp.check_rpar(&p1, &p2, 0.0, 0.0), RparCheck::Inside);

        // OldRperp: rpar = |p2| - |p1|
        let old = OldRperp {
            min_rpar: 5.0,
            max_rpar: 100.0,
        };
        let rpar = norm(&p2) - norm(&p1);
        let expected = (25.0 - rpar * rpar).sqrt();
        assert!((old.dist(&p1, &p2) - expected).abs() < 1e-12);
        assert_eq!(old.check_rpar(&p1, &p2, 0.0, 0.0), RparCheck::Outside);
        assert_eq!(old.check_rpar(&p1, &p2, 0.0, 1.0), RparCheck::Straddle);

        // Rlens: distance from p1 to the line of sight toward p2
        let lens = Rlens {
            min_rpar: f64::NEG_INFINITY,
            max_rpar: f64::INFINITY,
        };
        let d = lens.dist(&[1.0, 0.0, 10.0], &[0.0, 0.0, 20.0]);
        assert!((d - 1.0).abs() < 1e-12);
    }
}
