//! Define basic accumulator machinery (that doesn't require the standard lib)
//!
//! # Accumulation Machinery
//!
//! Every traversal produces a stream of contributions. A contribution comes
//! either from a single pair (triple) of points or from a whole pair (triple)
//! of tree cells that the traversal decided to treat as a single pair
//! (triple). Each contribution has already been assigned to a bin by the time
//! it reaches a [`Reducer`].
//!
//! We draw a distinction between the current state of a bin's accumulator
//! and the accumulation logic.
//! - We refer to the current state of a single accumulator as the
//!   `accum_state`. It is a handful of `f64` registers.
//! - The accumulation logic is encapsulated by the functions implemented by
//!   the [`Reducer`] trait. A Reducer modifies a single `accum_state` at a
//!   time.
//!
//! Every register tracked by the reducers in this module is a plain sum.
//! That makes merging associative and commutative, which is what lets us
//! combine results from threads, from patch pairs, and from separate
//! processes in any grouping.

use crate::state::{AccumStateView, AccumStateViewMut};
use ndarray::ArrayViewMut1;

/// The kind of values carried by the points of a catalog
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    /// no values. Only counts & weights are accumulated
    Count,
    /// a scalar field value, `k`
    Scalar,
    /// a 2-component shear, `(g1, g2)`
    Shear,
}

impl ValueKind {
    /// number of estimator-numerator registers used by a pair of this kind
    pub const fn n_pair_zeta(&self) -> usize {
        match self {
            ValueKind::Count => 0,
            ValueKind::Scalar => 1,
            ValueKind::Shear => 4,
        }
    }

    /// number of estimator-numerator registers used by a triple of this kind
    pub const fn n_triple_zeta(&self) -> usize {
        match self {
            ValueKind::Count => 0,
            ValueKind::Scalar => 1,
            ValueKind::Shear => 8,
        }
    }
}

/// A single contribution from a pair of points (or cells)
///
/// `zeta` holds the weighted products that make up the estimator numerator.
/// Only the first [`ValueKind::n_pair_zeta`] entries are meaningful.
#[derive(Clone, Copy, Debug)]
pub struct PairDatum {
    pub npairs: f64,
    pub weight: f64,
    pub r: f64,
    pub logr: f64,
    pub zeta: [f64; 4],
}

/// A single contribution from a triple of points (or cells)
///
/// `d` and `logd` are ordered `[d1, d2, d3]`. `shape` holds `[u, v]` for the
/// LogRUV parameterization and `[phi, 0]` for LogSAS.
#[derive(Clone, Copy, Debug)]
pub struct TripleDatum {
    pub ntri: f64,
    pub weight: f64,
    pub d: [f64; 3],
    pub logd: [f64; 3],
    pub shape: [f64; 2],
    pub zeta: [f64; 8],
}

/// describes the output components from a single Reducer accum_state
pub enum OutputDescr {
    MultiScalarComp(&'static [&'static str]),
}

impl OutputDescr {
    /// the number of components to allocate per component
    pub fn n_per_accum_state(&self) -> usize {
        match self {
            Self::MultiScalarComp(names) => names.len(),
        }
    }

    pub fn names(&self) -> &'static [&'static str] {
        match self {
            Self::MultiScalarComp(names) => names,
        }
    }
}

/// Reducers generally operate on individual `accum_state`s.
pub trait Reducer {
    type Datum;

    /// the number of f64 elements needed to track the accumulator data
    fn accum_state_size(&self) -> usize;

    /// initializes the storage tracking the acumulator's state.
    ///
    /// You need to call this function before you start working with the
    /// storage. You can also use this to reset the accumulator's state since
    /// it blindly overwrites any existing values.
    fn init_accum_state(&self, accum_state: &mut AccumStateViewMut);

    /// consume the datum to update the accum_state
    fn consume(&self, accum_state: &mut AccumStateViewMut, datum: &Self::Datum);

    /// merge the state information tracked by `accum_state` and `other`, and
    /// update `accum_state` accordingly
    fn merge(&self, accum_state: &mut AccumStateViewMut, other: &AccumStateView);

    /// extract all output-values from a single accum_state. Expects `value` to
    /// have the shape given by `[self.output_descr().n_per_accum_state()]`
    ///
    /// Means are divided by the total weight. When the weight is 0, the means
    /// are set to NaN; callers fill in nominal values.
    fn value_from_accum_state(&self, value: &mut ArrayViewMut1<f64>, accum_state: &AccumStateView);

    /// Describes the outputs produced from a single accum_state
    fn output_descr(&self) -> OutputDescr;
}

/// Register layout for 2-point accumulation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PairReducer {
    kind: ValueKind,
}

impl PairReducer {
    pub const NPAIRS: usize = 0;
    pub const WEIGHT: usize = 1;
    pub const SUM_R: usize = 2;
    pub const SUM_LOGR: usize = 3;
    pub const ZETA: usize = 4;

    const COUNT_OUTPUTS: &'static [&'static str] = &["npairs", "weight", "meanr", "meanlogr"];
    const SCALAR_OUTPUTS: &'static [&'static str] =
        &["npairs", "weight", "meanr", "meanlogr", "xi"];
    const SHEAR_OUTPUTS: &'static [&'static str] = &[
        "npairs", "weight", "meanr", "meanlogr", "xip", "xip_im", "xim", "xim_im",
    ];

    pub const fn new(kind: ValueKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }
}

impl Reducer for PairReducer {
    type Datum = PairDatum;

    fn accum_state_size(&self) -> usize {
        Self::ZETA + self.kind.n_pair_zeta()
    }

    fn init_accum_state(&self, accum_state: &mut AccumStateViewMut) {
        accum_state.fill(0.0);
    }

    #[inline(always)]
    fn consume(&self, accum_state: &mut AccumStateViewMut, datum: &PairDatum) {
        accum_state[Self::NPAIRS] += datum.npairs;
        accum_state[Self::WEIGHT] += datum.weight;
        accum_state[Self::SUM_R] += datum.weight * datum.r;
        accum_state[Self::SUM_LOGR] += datum.weight * datum.logr;
        for k in 0..self.kind.n_pair_zeta() {
            accum_state[Self::ZETA + k] += datum.zeta[k];
        }
    }

    fn merge(&self, accum_state: &mut AccumStateViewMut, other: &AccumStateView) {
        for k in 0..self.accum_state_size() {
            accum_state[k] += other[k];
        }
    }

    fn value_from_accum_state(&self, value: &mut ArrayViewMut1<f64>, accum_state: &AccumStateView) {
        let weight = accum_state[Self::WEIGHT];
        let inv = if weight != 0.0 { 1.0 / weight } else { f64::NAN };
        value[[0]] = accum_state[Self::NPAIRS];
        value[[1]] = weight;
        value[[2]] = accum_state[Self::SUM_R] * inv;
        value[[3]] = accum_state[Self::SUM_LOGR] * inv;
        for k in 0..self.kind.n_pair_zeta() {
            value[[4 + k]] = accum_state[Self::ZETA + k] * inv;
        }
    }

    fn output_descr(&self) -> OutputDescr {
        OutputDescr::MultiScalarComp(match self.kind {
            ValueKind::Count => Self::COUNT_OUTPUTS,
            ValueKind::Scalar => Self::SCALAR_OUTPUTS,
            ValueKind::Shear => Self::SHEAR_OUTPUTS,
        })
    }
}

/// Which triangle-shape parameterization a [`TripleReducer`] tracks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriangleShape {
    /// `(r, u, v)`
    Ruv,
    /// `(d2, d3, phi)`
    Sas,
}

/// Register layout for 3-point accumulation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TripleReducer {
    kind: ValueKind,
    shape: TriangleShape,
}

impl TripleReducer {
    pub const NTRI: usize = 0;
    pub const WEIGHT: usize = 1;
    /// `SUM_D + 2*k` holds the weighted sum of d_(k+1) and `SUM_D + 2*k + 1`
    /// the weighted sum of its log
    pub const SUM_D: usize = 2;
    pub const SUM_SHAPE: usize = 8;

    const RUV_COUNT: &'static [&'static str] = &[
        "ntri", "weight", "meand1", "meanlogd1", "meand2", "meanlogd2", "meand3", "meanlogd3",
        "meanu", "meanv",
    ];
    const RUV_SCALAR: &'static [&'static str] = &[
        "ntri", "weight", "meand1", "meanlogd1", "meand2", "meanlogd2", "meand3", "meanlogd3",
        "meanu", "meanv", "zeta",
    ];
    const RUV_SHEAR: &'static [&'static str] = &[
        "ntri", "weight", "meand1", "meanlogd1", "meand2", "meanlogd2", "meand3", "meanlogd3",
        "meanu", "meanv", "gam0r", "gam0i", "gam1r", "gam1i", "gam2r", "gam2i", "gam3r", "gam3i",
    ];
    const SAS_COUNT: &'static [&'static str] = &[
        "ntri", "weight", "meand1", "meanlogd1", "meand2", "meanlogd2", "meand3", "meanlogd3",
        "meanphi",
    ];
    const SAS_SCALAR: &'static [&'static str] = &[
        "ntri", "weight", "meand1", "meanlogd1", "meand2", "meanlogd2", "meand3", "meanlogd3",
        "meanphi", "zeta",
    ];
    const SAS_SHEAR: &'static [&'static str] = &[
        "ntri", "weight", "meand1", "meanlogd1", "meand2", "meanlogd2", "meand3", "meanlogd3",
        "meanphi", "gam0r", "gam0i", "gam1r", "gam1i", "gam2r", "gam2i", "gam3r", "gam3i",
    ];

    pub const fn new(kind: ValueKind, shape: TriangleShape) -> Self {
        Self { kind, shape }
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn shape(&self) -> TriangleShape {
        self.shape
    }

    /// number of shape registers (2 for `(u, v)`, 1 for `phi`)
    pub const fn n_shape(&self) -> usize {
        match self.shape {
            TriangleShape::Ruv => 2,
            TriangleShape::Sas => 1,
        }
    }

    /// index of the first estimator-numerator register
    pub const fn zeta_offset(&self) -> usize {
        Self::SUM_SHAPE + self.n_shape()
    }
}

impl Reducer for TripleReducer {
    type Datum = TripleDatum;

    fn accum_state_size(&self) -> usize {
        self.zeta_offset() + self.kind.n_triple_zeta()
    }

    fn init_accum_state(&self, accum_state: &mut AccumStateViewMut) {
        accum_state.fill(0.0);
    }

    #[inline(always)]
    fn consume(&self, accum_state: &mut AccumStateViewMut, datum: &TripleDatum) {
        let w = datum.weight;
        accum_state[Self::NTRI] += datum.ntri;
        accum_state[Self::WEIGHT] += w;
        for k in 0..3 {
            accum_state[Self::SUM_D + 2 * k] += w * datum.d[k];
            accum_state[Self::SUM_D + 2 * k + 1] += w * datum.logd[k];
        }
        for k in 0..self.n_shape() {
            accum_state[Self::SUM_SHAPE + k] += w * datum.shape[k];
        }
        let offset = self.zeta_offset();
        for k in 0..self.kind.n_triple_zeta() {
            accum_state[offset + k] += datum.zeta[k];
        }
    }

    fn merge(&self, accum_state: &mut AccumStateViewMut, other: &AccumStateView) {
        for k in 0..self.accum_state_size() {
            accum_state[k] += other[k];
        }
    }

    fn value_from_accum_state(&self, value: &mut ArrayViewMut1<f64>, accum_state: &AccumStateView) {
        let weight = accum_state[Self::WEIGHT];
        let inv = if weight != 0.0 { 1.0 / weight } else { f64::NAN };
        value[[0]] = accum_state[Self::NTRI];
        value[[1]] = weight;
        for k in 2..self.accum_state_size() {
            value[[k]] = accum_state[k] * inv;
        }
    }

    fn output_descr(&self) -> OutputDescr {
        OutputDescr::MultiScalarComp(match (self.shape, self.kind) {
            (TriangleShape::Ruv, ValueKind::Count) => Self::RUV_COUNT,
            (TriangleShape::Ruv, ValueKind::Scalar) => Self::RUV_SCALAR,
            (TriangleShape::Ruv, ValueKind::Shear) => Self::RUV_SHEAR,
            (TriangleShape::Sas, ValueKind::Count) => Self::SAS_COUNT,
            (TriangleShape::Sas, ValueKind::Scalar) => Self::SAS_SCALAR,
            (TriangleShape::Sas, ValueKind::Shear) => Self::SAS_SHEAR,
        })
    }
}
