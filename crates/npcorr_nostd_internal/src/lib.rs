//! Internal building blocks of `npcorr` that don't require the standard
//! library: accumulator storage, the per-bin reducers, and regular bin-edge
//! arithmetic.
//!
//! Nothing in here knows about trees, metrics or patches. The traversal
//! engines in `npcorr` turn pairs/triples of cells into [`PairDatum`] and
//! [`TripleDatum`] instances and hand them to a [`Reducer`] along with the
//! bin's `accum_state`.
#![no_std]
mod bins;
mod misc;
mod reduce_utils;
mod reducer;
mod state;

pub use bins::{BinEdges, RegularBinEdges};
pub use misc::flat_bin_index;
pub use reduce_utils::merge_full_statepacks;
pub use reducer::{
    OutputDescr, PairDatum, PairReducer, Reducer, TriangleShape, TripleDatum, TripleReducer,
    ValueKind,
};
pub use state::{AccumStateView, AccumStateViewMut, StatePackView, StatePackViewMut};
