/*!
Tree-accelerated 2-point and 3-point correlation functions of point
catalogs.

A correlation function measures how a quantity attached to points (a count,
a scalar `k`, or a shear `(g1, g2)`) correlates with itself as a function of
separation. Computing one directly means visiting every pair (or triangle)
of points. Instead, the catalogs are organized into ball trees and whole
cells are binned at once whenever every pair (triangle) they hold would
land in the same bin to within a tolerance, `bin_slop`. `bin_slop = 0`
reproduces the brute-force result.

# User Guide

1. Build a configuration with [`Corr2Builder`]/[`Corr3Builder`] (or from
   a JSON namespace of parameters with [`Corr2Config::from_json`]).
2. Build catalogs with [`PointSet`]. Divide them into patches with
   [`PointSet::with_npatch`] (k-means) or explicit labels to get resampling
   covariance estimates.
3. Create a [`Corr2`] or [`Corr3`] and `process` the catalogs.
4. Read the columns (`npairs`, `meanr`, `xi`, ...), the covariance, or
   [`Corr2::write`] them to a [`ResultSink`].

Count correlations (`NN`, `NNN`) need a random catalog for their estimator;
see [`Corr2::calculate_xi`] and [`Corr3::calculate_zeta`].

# Developer Guide

The per-bin accumulation registers and the binning primitives are in the
`no_std` crate [`npcorr_nostd_internal`]. This crate holds the trees, the
traversals, the patch orchestration, and everything user facing.

*/

#![deny(rustdoc::broken_intra_doc_links)]

// inform build-system of the crates in this package
mod binning;
mod catalog;
mod columns;
mod comm;
mod config;
mod corr2;
mod corr3;
mod covariance;
mod error;
mod executor;
mod field;
mod io;
mod kmeans;
mod metric;
mod patch;
mod threepoint;
mod twopoint;

// pull in symbols that visible outside of the package
pub use binning::{SepAxis, ShapeAxis, Spacing, TriangleBinning};
pub use catalog::PointSet;
pub use comm::{Communicator, LocalComm, SingleProcess};
pub use config::{
    BinType, Brute, BruteParam, CommonConfig, Coords, Corr2Builder, Corr2Config, Corr2Params,
    Corr3Builder, Corr3Config, Corr3Params, MetricKind, SepUnits, SplitMethod, TriangleBinType,
    VarMethod,
};
pub use corr2::{Corr2, PairKind};
pub use corr3::{Corr3, TripleKind};
pub use covariance::{AnyCorr, CorrRef, estimate_multi_cov};
pub use error::Error;
pub use io::{JsonSink, JsonSource, ResultSink, ResultSource, ResultTable, TableMeta};
pub use npcorr_nostd_internal::ValueKind;
pub use patch::ProcessOptions;
