//! The dual-tree traversal behind 2-point correlations.
//!
//! A pair of cells is either discarded (every member pair is outside the
//! separation range), binned as a whole (every member pair lands in the same
//! bin, or the spread of separations is within the bin_slop tolerance) or
//! split into sub-pairs. The result of a traversal is a statepack holding one
//! [`PairReducer`] accumulator per bin.
//!
//! The top-level cell pairs are independent jobs that are handed to an
//! [`Executor`].

use crate::binning::SepSpace;
use crate::config::{BinType, Brute, CommonConfig, Coords, Corr2Config};
use crate::error::Error;
use crate::executor::{Executor, Workers};
use crate::field::{Cell, Field, FieldOpts};
use crate::metric::{Metric, MetricOps, Pos, RparCheck, with_metric};
use npcorr_nostd_internal::{
    BinEdges, PairDatum, PairReducer, Reducer, StatePackView, StatePackViewMut, ValueKind,
    merge_full_statepacks,
};

/// seed of the tree-splitting rng when the configuration doesn't set one
pub(crate) const DEFAULT_TREE_SEED: u64 = 0x6e70_636f_7272;

/// a cell is split along with the larger cell of a pair when it is at least
/// this fraction of the larger size
const SPLIT_FACTOR: f64 = 0.585;

#[inline(always)]
pub(crate) fn cmul(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [a[0] * b[0] - a[1] * b[1], a[0] * b[1] + a[1] * b[0]]
}

#[inline(always)]
pub(crate) fn conj(a: [f64; 2]) -> [f64; 2] {
    [a[0], -a[1]]
}

/// How much spread of separations a cell pair may have before it's split
#[derive(Clone, Copy, Debug, PartialEq)]
enum Tolerance {
    /// relative to the separation (log binning)
    Relative(f64),
    /// in units of the separation (linear & TwoD binning)
    Absolute(f64),
}

impl Tolerance {
    #[inline(always)]
    fn allows(&self, half_width: f64, d: f64) -> bool {
        match *self {
            Tolerance::Relative(b) => half_width <= b * d,
            Tolerance::Absolute(a) => half_width <= a,
        }
    }
}

/// Everything a 2-point traversal needs besides the metric and the trees
#[derive(Clone, Debug)]
pub(crate) struct PairSetup {
    pub(crate) space: SepSpace,
    pub(crate) twod: bool,
    tol: Tolerance,
    brute: Brute,
    pub(crate) reducer: PairReducer,
    pub(crate) n_bins: usize,
}

impl PairSetup {
    pub(crate) fn new(config: &Corr2Config, coords: Coords, kind: ValueKind) -> Result<Self, Error> {
        let common = config.common();
        let twod = config.bin_type() == BinType::TwoD;
        let space = if twod {
            SepSpace::new_twod(&config.axis)?
        } else {
            SepSpace::new(&config.axis, common.metric(), coords, common.unit_scale())?
        };
        let slop = common.bin_slop();
        let tol = match config.bin_type() {
            BinType::Log => Tolerance::Relative(slop * space.edges.bin_size()),
            BinType::Linear | BinType::TwoD => Tolerance::Absolute(slop * space.edges.bin_size()),
        };
        Ok(PairSetup {
            space,
            twod,
            tol,
            brute: common.brute(),
            reducer: PairReducer::new(kind),
            n_bins: config.n_bins_total(),
        })
    }

    /// the tree parameters matching this setup
    pub(crate) fn field_opts(&self, common: &CommonConfig, metric: &Metric) -> FieldOpts {
        let (min_size, max_size) = match self.tol {
            Tolerance::Relative(b) => (self.space.min_sep * b / (2.0 + 3.0 * b), self.space.max_sep * b),
            Tolerance::Absolute(a) => (0.5 * a, a),
        };
        // leaves are treated as points, which the line-of-sight checks can't
        // tolerate
        let min_size = if self.brute.any() || metric.has_rpar() { 0.0 } else { min_size };
        FieldOpts {
            min_size,
            max_size,
            min_top: common.min_top(),
            max_top: common.max_top(),
            split_method: common.split_method(),
            seed: common.rng_seed().unwrap_or(DEFAULT_TREE_SEED),
            angular: metric.is_angular(),
        }
    }

    pub(crate) fn state_size(&self) -> usize {
        self.reducer.accum_state_size()
    }

    /// an empty statepack buffer
    pub(crate) fn zeros(&self) -> Vec<f64> {
        vec![0.0; self.n_bins * self.state_size()]
    }

    /// add `other` into `acc` (both hold a full statepack)
    pub(crate) fn merge_into(&self, acc: &mut [f64], other: &[f64]) -> Result<(), Error> {
        let n = self.n_bins;
        let size = self.state_size();
        let mut pack = StatePackViewMut::from_slice(n, size, acc).map_err(Error::internal)?;
        let other = StatePackView::from_slice(n, size, other).map_err(Error::internal)?;
        merge_full_statepacks(&self.reducer, &mut pack, &other).map_err(Error::internal)
    }

    /// all pairs within a single field
    pub(crate) fn process_auto(
        &self,
        metric: &Metric,
        field: &Field,
        workers: &Workers,
    ) -> Result<Vec<f64>, Error> {
        with_metric!(*metric, m => self.run(m, field, field, true, workers))
    }

    /// all pairs with 1 point from each field
    pub(crate) fn process_cross(
        &self,
        metric: &Metric,
        f1: &Field,
        f2: &Field,
        workers: &Workers,
    ) -> Result<Vec<f64>, Error> {
        with_metric!(*metric, m => self.run(m, f1, f2, false, workers))
    }

    fn run<M: MetricOps>(
        &self,
        metric: M,
        f1: &Field,
        f2: &Field,
        auto: bool,
        workers: &Workers,
    ) -> Result<Vec<f64>, Error> {
        let tops1 = f1.tops();
        let tops2 = f2.tops();
        // auto jobs: every top cell on its own, then every distinct pair
        let top_pairs: Vec<(usize, usize)> = if auto {
            (0..tops1.len())
                .flat_map(|i| ((i + 1)..tops1.len()).map(move |j| (i, j)))
                .collect()
        } else {
            Vec::new()
        };
        let n_jobs = if auto {
            tops1.len() + top_pairs.len()
        } else {
            tops1.len() * tops2.len()
        };
        if n_jobs > 0 {
            log::debug!("2-point traversal over {n_jobs} top-level jobs");
        }

        let state_size = self.state_size();
        workers.run(
            n_jobs,
            || self.zeros(),
            |job, acc: &mut Vec<f64>| {
                let pack = StatePackViewMut::from_slice(self.n_bins, state_size, acc)
                    .map_err(Error::internal)?;
                let mut walker = PairWalker {
                    setup: self,
                    metric,
                    f1,
                    f2,
                    auto,
                    pack,
                };
                if !auto {
                    walker.process11(tops1[job / tops2.len()], tops2[job % tops2.len()]);
                } else if job < tops1.len() {
                    walker.process2(tops1[job]);
                } else {
                    let (i, j) = top_pairs[job - tops1.len()];
                    walker.process11(tops1[i], tops1[j]);
                }
                Ok(())
            },
            |acc, other| self.merge_into(acc, &other),
        )
    }
}

/// the cells to recurse into for one side of a pair
#[inline(always)]
fn parts(cell: &Cell, idx: usize, split: bool) -> ([usize; 2], usize) {
    match (split, cell.children) {
        (true, Some(children)) => (children, 2),
        _ => ([idx, idx], 1),
    }
}

struct PairWalker<'a, 'p, M: MetricOps> {
    setup: &'a PairSetup,
    metric: M,
    f1: &'a Field,
    f2: &'a Field,
    /// `f1` and `f2` are the same field and every pair is visited once
    auto: bool,
    pack: StatePackViewMut<'p>,
}

impl<M: MetricOps> PairWalker<'_, '_, M> {
    /// all pairs with both points inside cell `ci` (of `f1`)
    fn process2(&mut self, ci: usize) {
        let cell = self.f1.cell(ci);
        // every pair inside the cell is closer than 2*size
        if 2.0 * cell.size < self.setup.space.min_sep {
            return;
        }
        if let Some([left, right]) = cell.children {
            self.process2(left);
            self.process2(right);
            self.process11(left, right);
        }
    }

    /// all pairs with 1 point in cell `i1` (of `f1`) and 1 in `i2` (of `f2`)
    fn process11(&mut self, i1: usize, i2: usize) {
        let c1 = *self.f1.cell(i1);
        let c2 = *self.f2.cell(i2);
        let rpar = self.metric.check_rpar(&c1.pos, &c2.pos, c1.size, c2.size);
        if rpar == RparCheck::Outside {
            return;
        }
        let d = self.metric.dist(&c1.pos, &c2.pos);
        let (lo, hi) = self.metric.bounds(&c1.pos, &c2.pos, d, c1.size, c2.size);
        let space = &self.setup.space;

        if c1.is_leaf() && c2.is_leaf() {
            if d > 0.0 {
                self.bin_exact(&c1, &c2, d);
            }
            return;
        }
        if hi < space.min_sep {
            return;
        }

        let force1 = self.setup.brute.first() && !c1.is_leaf();
        let force2 = self.setup.brute.second() && !c2.is_leaf();
        if self.setup.twod {
            let off = self.metric.offset(&c1.pos, &c2.pos);
            let e = c1.size + c2.size;
            let max = space.max_sep;
            if off[0].abs() - e > max || off[1].abs() - e > max {
                return;
            }
            if !force1 && !force2 && rpar == RparCheck::Inside && self.try_twod_cells(&c1, &c2, d, lo, off, e) {
                return;
            }
        } else {
            if lo >= space.max_sep {
                return;
            }
            if !force1 && !force2 && rpar == RparCheck::Inside {
                if self.setup.tol.allows(0.5 * (hi - lo), d) {
                    if let Some(k) = space.bin_index(d) {
                        self.accumulate(k, &c1, &c2, d, 1.0);
                    }
                    return;
                }
                if let Some(k) = space.interval_bin_index(lo, hi) {
                    self.accumulate(k, &c1, &c2, d, 1.0);
                    return;
                }
            }
        }

        let (mut split1, mut split2) = if c1.size >= c2.size {
            (true, !c2.is_leaf() && c2.size > SPLIT_FACTOR * c1.size)
        } else {
            (!c1.is_leaf() && c1.size > SPLIT_FACTOR * c2.size, true)
        };
        split1 |= force1;
        split2 |= force2;
        let (a, na) = parts(&c1, i1, split1);
        let (b, nb) = parts(&c2, i2, split2);
        for &j1 in &a[..na] {
            for &j2 in &b[..nb] {
                self.process11(j1, j2);
            }
        }
    }

    /// bin a pair of leaves
    fn bin_exact(&mut self, c1: &Cell, c2: &Cell, d: f64) {
        if !self.setup.twod {
            if let Some(k) = self.setup.space.bin_index(d) {
                self.accumulate(k, c1, c2, d, 1.0);
            }
            return;
        }
        if d < self.setup.space.min_sep {
            return;
        }
        let off = self.metric.offset(&c1.pos, &c2.pos);
        if self.auto {
            // an unordered pair contributes half to each orientation
            if let Some(k) = self.twod_bin(off) {
                self.accumulate_twod(k, c1, c2, d, off, 0.5);
            }
            let neg = off.map(|x| -x);
            if let Some(k) = self.twod_bin(neg) {
                self.accumulate_twod(k, c1, c2, d, neg, 0.5);
            }
        } else if let Some(k) = self.twod_bin(off) {
            self.accumulate_twod(k, c1, c2, d, off, 1.0);
        }
    }

    /// Try to bin a pair of cells as a whole in TwoD space. Returns false
    /// when the pair must be split.
    fn try_twod_cells(&mut self, c1: &Cell, c2: &Cell, d: f64, lo: f64, off: Pos, e: f64) -> bool {
        let edges = &self.setup.space.edges;
        let orientations: &[f64] = if self.auto { &[1.0, -1.0] } else { &[1.0] };
        let factor = 1.0 / orientations.len() as f64;

        if self.setup.tol.allows(e, d) {
            if d >= self.setup.space.min_sep {
                for &sign in orientations {
                    let o = off.map(|x| sign * x);
                    if let Some(k) = self.twod_bin(o) {
                        self.accumulate_twod(k, c1, c2, d, o, factor);
                    }
                }
            }
            return true;
        }

        if lo < self.setup.space.min_sep {
            return false;
        }
        let mut bins = [0usize; 2];
        for (slot, &sign) in bins.iter_mut().zip(orientations) {
            let o = off.map(|x| sign * x);
            let kx = edges.interval_bin_index(o[0] - e, o[0] + e);
            let ky = edges.interval_bin_index(o[1] - e, o[1] + e);
            match (kx, ky) {
                (Some(kx), Some(ky)) => *slot = ky * edges.n_bins() + kx,
                _ => return false,
            }
        }
        for (&k, &sign) in bins.iter().zip(orientations) {
            self.accumulate_twod(k, c1, c2, d, off.map(|x| sign * x), factor);
        }
        true
    }

    #[inline]
    fn twod_bin(&self, off: Pos) -> Option<usize> {
        let edges = &self.setup.space.edges;
        let kx = edges.bin_index(off[0])?;
        let ky = edges.bin_index(off[1])?;
        Some(ky * edges.n_bins() + kx)
    }

    fn accumulate(&mut self, k: usize, c1: &Cell, c2: &Cell, d: f64, factor: f64) {
        let off = if self.setup.reducer.kind() == ValueKind::Shear {
            self.metric.offset(&c1.pos, &c2.pos)
        } else {
            [0.0; 3]
        };
        let r = self.setup.space.conversion.to_user(d);
        self.consume(k, c1, c2, r, off, factor);
    }

    fn accumulate_twod(&mut self, k: usize, c1: &Cell, c2: &Cell, d: f64, off: Pos, factor: f64) {
        self.consume(k, c1, c2, d, off, factor);
    }

    #[inline]
    fn consume(&mut self, k: usize, c1: &Cell, c2: &Cell, r: f64, off: Pos, factor: f64) {
        let mut zeta = [0.0; 4];
        match self.setup.reducer.kind() {
            ValueKind::Count => {}
            ValueKind::Scalar => zeta[0] = factor * c1.wk * c2.wk,
            ValueKind::Shear => {
                let xip = cmul(c1.wg, conj(c2.wg));
                let rsq = off[0] * off[0] + off[1] * off[1];
                // exp(-2i alpha), where alpha is the angle of the separation
                let expm2ia = if rsq > 0.0 {
                    [(off[0] * off[0] - off[1] * off[1]) / rsq, -2.0 * off[0] * off[1] / rsq]
                } else {
                    [1.0, 0.0]
                };
                let xim = cmul(cmul(c1.wg, c2.wg), cmul(expm2ia, expm2ia));
                zeta = [factor * xip[0], factor * xip[1], factor * xim[0], factor * xim[1]];
            }
        }
        let datum = PairDatum {
            npairs: factor * c1.n * c2.n,
            weight: factor * c1.w * c2.w,
            r,
            logr: r.ln(),
            zeta,
        };
        self.setup.reducer.consume(&mut self.pack.get_state_mut(k), &datum);
    }
}
