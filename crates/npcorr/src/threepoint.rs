//! The triple-tree traversal behind 3-point correlations.
//!
//! Triangles are described with their sides sorted as `d1 >= d2 >= d3`,
//! where side `dk` is opposite vertex `k`. The LogRUV binning uses
//! `r = d2`, `u = d3/d2` and `v = ±(d1 - d2)/d3` (positive for
//! counter-clockwise vertices); LogSAS uses `d2`, `d3` and the angle `phi`
//! at vertex 1.
//!
//! A triple of cells is binned as a whole only when the sorted order of its
//! sides is certain, the orientation of every member triangle is certain,
//! and every coordinate either lands in a single bin or is within the
//! bin_slop tolerance.
//!
//! When the vertices come from different catalogs, the catalog labels of the
//! sorted vertices route a triangle to one of several output slots:
//! - [`TripleMode::Auto`]: 1 slot
//! - [`TripleMode::Cross12`]: 3 slots, the position of the catalog-1 vertex
//! - [`TripleMode::Cross`]: 6 slots, one per permutation
//!   `[123, 132, 213, 231, 312, 321]`

use crate::binning::{ShapeSpace, TriangleBinning, TriangleSpace, closed_bin_index, closed_interval_bin_index};
use crate::config::{CommonConfig, Coords, Corr3Config};
use crate::error::Error;
use crate::executor::{Executor, Workers};
use crate::field::{Cell, Field, FieldOpts};
use crate::metric::{Metric, MetricOps, Pos, cross, dot, with_metric};
use crate::twopoint::{DEFAULT_TREE_SEED, cmul, conj};
use npcorr_nostd_internal::{
    BinEdges, StatePackView, StatePackViewMut, TriangleShape, TripleDatum, TripleReducer, Reducer,
    ValueKind, merge_full_statepacks,
};
use std::f64::consts::PI;

/// The catalogs the 3 vertices are drawn from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TripleMode {
    /// all 3 vertices from 1 catalog
    Auto,
    /// 1 vertex from catalog 1 and 2 from catalog 2
    Cross12,
    /// 1 vertex from each of 3 catalogs
    Cross,
}

impl TripleMode {
    pub(crate) fn n_slots(&self) -> usize {
        match self {
            TripleMode::Auto => 1,
            TripleMode::Cross12 => 3,
            TripleMode::Cross => 6,
        }
    }

    /// the output slot of a triangle whose sorted vertices carry `labels`
    #[inline]
    fn slot(&self, labels: [usize; 3]) -> usize {
        match self {
            TripleMode::Auto => 0,
            TripleMode::Cross12 => labels.iter().position(|&l| l == 0).unwrap_or(0),
            TripleMode::Cross => 2 * labels[0] + usize::from(labels[1] > labels[2]),
        }
    }
}

/// a cell, identified by the field it belongs to and its index
type Node = (usize, usize);

/// Everything a 3-point traversal needs besides the metric and the trees
#[derive(Clone, Debug)]
pub(crate) struct TripleSetup {
    pub(crate) space: TriangleSpace,
    slop: f64,
    brute: bool,
    flat: bool,
    arc: bool,
    pub(crate) reducer: TripleReducer,
    pub(crate) n_bins: usize,
}

impl TripleSetup {
    pub(crate) fn new(
        config: &Corr3Config,
        metric: &Metric,
        coords: Coords,
        kind: ValueKind,
    ) -> Result<Self, Error> {
        let common = config.common();
        let space = TriangleSpace::new(config.binning(), common.metric(), coords, common.unit_scale())?;
        let shape = match config.binning() {
            TriangleBinning::Ruv { .. } => TriangleShape::Ruv,
            TriangleBinning::Sas { .. } => TriangleShape::Sas,
        };
        Ok(TripleSetup {
            space,
            slop: common.bin_slop(),
            brute: common.brute().any(),
            flat: coords == Coords::Flat,
            arc: matches!(metric, Metric::Arc(_)),
            reducer: TripleReducer::new(kind, shape),
            n_bins: config.n_bins_total(),
        })
    }

    pub(crate) fn field_opts(&self, common: &CommonConfig, metric: &Metric) -> FieldOpts {
        let b = self.slop * self.space.sep.edges.bin_size();
        let sep = &self.space.sep;
        FieldOpts {
            min_size: if self.brute { 0.0 } else { sep.min_sep * b / (2.0 + 3.0 * b) },
            max_size: sep.max_sep * b,
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

    /// length of the statepack buffer of a single slot
    pub(crate) fn block_len(&self) -> usize {
        self.n_bins * self.state_size()
    }

    /// add `other` into `acc` (each holds a whole number of slots)
    pub(crate) fn merge_into(&self, acc: &mut [f64], other: &[f64]) -> Result<(), Error> {
        if acc.len() != other.len() {
            return Err(Error::internal("mismatched triple statepacks"));
        }
        let block = self.block_len();
        for (a, b) in acc.chunks_mut(block).zip(other.chunks(block)) {
            let mut pack = StatePackViewMut::from_slice(self.n_bins, self.state_size(), a)
                .map_err(Error::internal)?;
            let other = StatePackView::from_slice(self.n_bins, self.state_size(), b)
                .map_err(Error::internal)?;
            merge_full_statepacks(&self.reducer, &mut pack, &other).map_err(Error::internal)?;
        }
        Ok(())
    }

    /// all triangles within a single field
    pub(crate) fn process_auto(
        &self,
        metric: &Metric,
        field: &Field,
        workers: &Workers,
    ) -> Result<Vec<f64>, Error> {
        let mut slots = with_metric!(*metric, m => self.run(m, [field, field, field], TripleMode::Auto, workers))?;
        Ok(slots.swap_remove(0))
    }

    /// triangles with 1 vertex from `f1` and 2 from `f2`, one buffer per
    /// position of the `f1` vertex
    pub(crate) fn process_cross12(
        &self,
        metric: &Metric,
        f1: &Field,
        f2: &Field,
        workers: &Workers,
    ) -> Result<Vec<Vec<f64>>, Error> {
        with_metric!(*metric, m => self.run(m, [f1, f2, f2], TripleMode::Cross12, workers))
    }

    /// triangles with 1 vertex from each field, one buffer per permutation
    pub(crate) fn process_cross(
        &self,
        metric: &Metric,
        fields: [&Field; 3],
        workers: &Workers,
    ) -> Result<Vec<Vec<f64>>, Error> {
        with_metric!(*metric, m => self.run(m, fields, TripleMode::Cross, workers))
    }

    fn run<M: MetricOps>(
        &self,
        metric: M,
        fields: [&Field; 3],
        mode: TripleMode,
        workers: &Workers,
    ) -> Result<Vec<Vec<f64>>, Error> {
        let block = self.block_len();
        let n_slots = mode.n_slots();
        let tops: [&[usize]; 3] = [fields[0].tops(), fields[1].tops(), fields[2].tops()];
        let n_jobs = tops[0].len();
        log::debug!("3-point traversal over {n_jobs} top-level jobs ({mode:?})");

        let merged = workers.run(
            n_jobs,
            || vec![0.0; n_slots * block],
            |job, acc: &mut Vec<f64>| {
                let packs = acc
                    .chunks_mut(block)
                    .map(|chunk| StatePackViewMut::from_slice(self.n_bins, self.state_size(), chunk))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(Error::internal)?;
                let mut walker = TripleWalker {
                    setup: self,
                    metric,
                    fields,
                    mode,
                    packs,
                };
                let t1 = tops[0][job];
                match mode {
                    TripleMode::Auto => {
                        let t = tops[0];
                        walker.process3((0, t1));
                        for j in (job + 1)..t.len() {
                            walker.process12((0, t1), (0, t[j]));
                            walker.process12((0, t[j]), (0, t1));
                            for &t3 in &t[(j + 1)..] {
                                walker.process111([(0, t1), (0, t[j]), (0, t3)]);
                            }
                        }
                    }
                    TripleMode::Cross12 => {
                        let t = tops[1];
                        for j in 0..t.len() {
                            walker.process12((0, t1), (1, t[j]));
                            for &t3 in &t[(j + 1)..] {
                                walker.process111([(0, t1), (1, t[j]), (1, t3)]);
                            }
                        }
                    }
                    TripleMode::Cross => {
                        for &t2 in tops[1] {
                            for &t3 in tops[2] {
                                walker.process111([(0, t1), (1, t2), (2, t3)]);
                            }
                        }
                    }
                }
                Ok(())
            },
            |acc, other| self.merge_into(acc, &other),
        )?;
        Ok(merged.chunks(block).map(|c| c.to_vec()).collect())
    }
}

/// vertex indices ordered by decreasing opposite side
#[inline]
fn sort_vertices(d: [f64; 3]) -> [usize; 3] {
    let mut order = [0, 1, 2];
    order.sort_by(|&a, &b| d[b].total_cmp(&d[a]));
    order
}

#[inline]
fn permute<T: Copy>(vals: &[T; 3], order: [usize; 3]) -> [T; 3] {
    [vals[order[0]], vals[order[1]], vals[order[2]]]
}

/// `(conj(q)/|q|)^2`, the rotation that projects a shear onto the direction
/// of `q`
#[inline]
fn projection(q: [f64; 2]) -> [f64; 2] {
    let rsq = q[0] * q[0] + q[1] * q[1];
    if rsq > 0.0 {
        [(q[0] * q[0] - q[1] * q[1]) / rsq, -2.0 * q[0] * q[1] / rsq]
    } else {
        [1.0, 0.0]
    }
}

struct TripleWalker<'a, 'p, M: MetricOps> {
    setup: &'a TripleSetup,
    metric: M,
    fields: [&'a Field; 3],
    mode: TripleMode,
    packs: Vec<StatePackViewMut<'p>>,
}

impl<M: MetricOps> TripleWalker<'_, '_, M> {
    #[inline(always)]
    fn cell(&self, node: Node) -> Cell {
        *self.fields[node.0].cell(node.1)
    }

    /// all triangles inside one cell
    fn process3(&mut self, node: Node) {
        let cell = self.cell(node);
        if 2.0 * cell.size < self.setup.space.sep.min_sep {
            return;
        }
        if let Some([left, right]) = cell.children {
            let (l, r) = ((node.0, left), (node.0, right));
            self.process3(l);
            self.process3(r);
            self.process12(l, r);
            self.process12(r, l);
        }
    }

    /// triangles with 1 vertex in `n1` and 2 in `n2`
    fn process12(&mut self, n1: Node, n2: Node) {
        let c1 = self.cell(n1);
        let c2 = self.cell(n2);
        // a leaf holds a single position, so its pairs are degenerate
        let Some([left, right]) = c2.children else {
            return;
        };
        let sep = &self.setup.space.sep;
        let d = self.metric.dist(&c1.pos, &c2.pos);
        let (lo, hi) = self.metric.bounds(&c1.pos, &c2.pos, d, c1.size, c2.size);
        if lo >= sep.max_sep || hi < sep.min_sep {
            return;
        }
        if matches!(self.setup.space.shape, ShapeSpace::Sas { .. }) && 2.0 * c2.size < sep.min_sep {
            return;
        }
        let (l, r) = ((n2.0, left), (n2.0, right));
        self.process12(n1, l);
        self.process12(n1, r);
        self.process111([n1, l, r]);
    }

    /// triangles with 1 vertex in each node
    fn process111(&mut self, nodes: [Node; 3]) {
        let cells = nodes.map(|n| self.cell(n));
        let m = self.metric;
        // side k is opposite vertex k
        let pairs = [(1, 2), (0, 2), (0, 1)];
        let d = pairs.map(|(a, b)| m.dist(&cells[a].pos, &cells[b].pos));
        let labels = nodes.map(|n| n.0);

        if cells.iter().all(Cell::is_leaf) {
            if d.iter().all(|&x| x > 0.0) {
                self.bin_leaves(&cells, labels, d);
            }
            return;
        }

        let mut lo = [0.0; 3];
        let mut hi = [0.0; 3];
        for (k, &(a, b)) in pairs.iter().enumerate() {
            (lo[k], hi[k]) = m.bounds(&cells[a].pos, &cells[b].pos, d[k], cells[a].size, cells[b].size);
        }
        if self.out_of_range(lo, hi) {
            return;
        }
        if !self.setup.brute && self.try_bin_cells(&cells, labels, d, lo, hi) {
            return;
        }

        let largest = cells.iter().map(|c| c.size).fold(0.0, f64::max);
        let mut parts = [([0usize; 2], 1usize); 3];
        for (k, (cell, node)) in cells.iter().zip(&nodes).enumerate() {
            let split = match cell.children {
                Some(_) => self.setup.brute || cell.size >= 0.5 * largest,
                None => false,
            };
            parts[k] = match (split, cell.children) {
                (true, Some(children)) => (children, 2),
                _ => ([node.1, node.1], 1),
            };
        }
        for &a in &parts[0].0[..parts[0].1] {
            for &b in &parts[1].0[..parts[1].1] {
                for &c in &parts[2].0[..parts[2].1] {
                    self.process111([(nodes[0].0, a), (nodes[1].0, b), (nodes[2].0, c)]);
                }
            }
        }
    }

    /// whether every triangle with sides within `[lo, hi]` is outside of the
    /// separation range
    fn out_of_range(&self, lo: [f64; 3], hi: [f64; 3]) -> bool {
        let sep = &self.setup.space.sep;
        let median = |v: [f64; 3]| {
            let mut v = v;
            v.sort_by(f64::total_cmp);
            v[1]
        };
        match self.setup.space.shape {
            ShapeSpace::Ruv { .. } => median(hi) < sep.min_sep || median(lo) >= sep.max_sep,
            ShapeSpace::Sas { .. } => {
                hi.iter().copied().fold(f64::INFINITY, f64::min) < sep.min_sep
                    || median(lo) >= sep.max_sep
            }
        }
    }

    /// whether the sorted vertices run counter-clockwise
    #[inline]
    fn ccw(&self, p: [Pos; 3]) -> bool {
        let q2 = self.metric.offset(&p[0], &p[1]);
        let q3 = self.metric.offset(&p[0], &p[2]);
        let n = cross(&q2, &q3);
        if self.setup.flat {
            n[2] > 0.0
        } else {
            let p2 = [p[0][0] + q2[0], p[0][1] + q2[1], p[0][2] + q2[2]];
            let p3 = [p[0][0] + q3[0], p[0][1] + q3[1], p[0][2] + q3[2]];
            let sum = [p[0][0] + p2[0] + p3[0], p[0][1] + p2[1] + p3[1], p[0][2] + p2[2] + p3[2]];
            dot(&n, &sum) < 0.0
        }
    }

    /// the (unoriented) angle at vertex 1 of a triangle with sorted sides
    #[inline]
    fn phi(&self, ds: [f64; 3]) -> f64 {
        let cosphi = if self.setup.arc {
            (ds[0].cos() - ds[1].cos() * ds[2].cos()) / (ds[1].sin() * ds[2].sin())
        } else {
            (ds[1] * ds[1] + ds[2] * ds[2] - ds[0] * ds[0]) / (2.0 * ds[1] * ds[2])
        };
        cosphi.clamp(-1.0, 1.0).acos()
    }

    /// the bin of a single triangle with sorted sides `ds`
    fn center_bin(&self, ds: [f64; 3], ccw: bool) -> Option<usize> {
        let space = &self.setup.space;
        match &space.shape {
            ShapeSpace::Ruv { u, v } => {
                let kr = space.sep.bin_index(ds[1])?;
                let ku = closed_bin_index(u, ds[2] / ds[1])?;
                let kv = closed_bin_index(v, (ds[0] - ds[1]) / ds[2])?;
                let nv = v.n_bins();
                let kv = if ccw { nv + kv } else { nv - 1 - kv };
                Some(space.flat_index(kr, ku, kv))
            }
            ShapeSpace::Sas { phi, oriented } => {
                let k2 = space.sep.bin_index(ds[1])?;
                let k3 = space.sep.bin_index(ds[2])?;
                let mut angle = self.phi(ds);
                if *oriented && !ccw {
                    angle = 2.0 * PI - angle;
                }
                let kp = closed_bin_index(phi, angle)?;
                Some(space.flat_index(k2, k3, kp))
            }
        }
    }

    fn bin_leaves(&mut self, cells: &[Cell; 3], labels: [usize; 3], d: [f64; 3]) {
        let order = sort_vertices(d);
        let sorted = permute(cells, order);
        let ds = permute(&d, order);
        let ccw = self.ccw(sorted.map(|c| c.pos));
        if let Some(k) = self.center_bin(ds, ccw) {
            let slot = self.mode.slot(permute(&labels, order));
            let shape = self.shape_values(ds, ccw);
            self.accumulate(slot, k, &sorted, ds, shape);
        }
    }

    /// Try to bin a triple of cells as a whole. Returns false when it must be
    /// split.
    fn try_bin_cells(
        &mut self,
        cells: &[Cell; 3],
        labels: [usize; 3],
        d: [f64; 3],
        lo: [f64; 3],
        hi: [f64; 3],
    ) -> bool {
        let order = sort_vertices(d);
        let (ds, ls, hs) = (permute(&d, order), permute(&lo, order), permute(&hi, order));
        if !(ls[0] > hs[1] && ls[1] > hs[2]) {
            return false;
        }
        let sorted = permute(cells, order);
        let ccw = self.ccw(sorted.map(|c| c.pos));
        let space = &self.setup.space;
        let sep = &space.sep;
        let slop = self.setup.slop;
        let sep_width = |lo: f64, hi: f64| 0.5 * (sep.coord(hi) - sep.coord(lo));

        let exact = match &space.shape {
            ShapeSpace::Ruv { u, v } => {
                let (u_lo, u_hi) = (ls[2] / hs[1], hs[2] / ls[1]);
                let (v_lo, v_hi) = ((ls[0] - hs[1]) / hs[2], (hs[0] - ls[1]) / ls[2]);
                // v < 1 keeps every member triangle away from collinear
                if !(v_hi < 1.0) {
                    return false;
                }
                if hs[1] < sep.min_sep
                    || ls[1] >= sep.max_sep
                    || u_lo > u.rightmost_edge()
                    || u_hi < u.leftmost_edge()
                    || v_lo > v.rightmost_edge()
                    || v_hi < v.leftmost_edge()
                {
                    return true;
                }
                if slop > 0.0
                    && sep_width(ls[1], hs[1]) <= slop * sep.edges.bin_size()
                    && 0.5 * (u_hi - u_lo) <= slop * u.bin_size()
                    && 0.5 * (v_hi - v_lo) <= slop * v.bin_size()
                {
                    None
                } else {
                    let kr = sep.interval_bin_index(ls[1], hs[1]);
                    let ku = closed_interval_bin_index(u, u_lo, u_hi);
                    let kv = closed_interval_bin_index(v, v_lo, v_hi);
                    match (kr, ku, kv) {
                        (Some(kr), Some(ku), Some(kv)) => {
                            let nv = v.n_bins();
                            let kv = if ccw { nv + kv } else { nv - 1 - kv };
                            Some(space.flat_index(kr, ku, kv))
                        }
                        _ => return false,
                    }
                }
            }
            ShapeSpace::Sas { phi, oriented } => {
                let s = sorted.map(|c| c.size);
                let angle = self.phi(ds);
                // the largest rotation of a ray of length `len` whose ends
                // move by up to `e` in total
                let ray_err = |e: f64, len: f64| if e < len { (e / len).asin() } else { PI };
                let mut delta = ray_err(s[0] + s[1], ds[2]) + ray_err(s[0] + s[2], ds[1]);
                if self.setup.arc {
                    delta *= 2.0;
                }
                if *oriented && !(angle - delta > 0.0 && angle + delta < PI) {
                    return false;
                }
                if hs[2] < sep.min_sep || ls[1] >= sep.max_sep {
                    return true;
                }
                if slop > 0.0
                    && sep_width(ls[1], hs[1]) <= slop * sep.edges.bin_size()
                    && sep_width(ls[2], hs[2]) <= slop * sep.edges.bin_size()
                    && delta <= slop * phi.bin_size()
                {
                    None
                } else {
                    let (a_lo, a_hi) = if *oriented && !ccw {
                        (2.0 * PI - angle - delta, 2.0 * PI - angle + delta)
                    } else {
                        ((angle - delta).max(0.0), (angle + delta).min(PI))
                    };
                    let k2 = sep.interval_bin_index(ls[1], hs[1]);
                    let k3 = sep.interval_bin_index(ls[2], hs[2]);
                    let kp = closed_interval_bin_index(phi, a_lo, a_hi);
                    match (k2, k3, kp) {
                        (Some(k2), Some(k3), Some(kp)) => Some(space.flat_index(k2, k3, kp)),
                        _ => return false,
                    }
                }
            }
        };

        let k = match exact {
            Some(k) => k,
            None => match self.center_bin(ds, ccw) {
                Some(k) => k,
                None => return true,
            },
        };
        let slot = self.mode.slot(permute(&labels, order));
        let shape = self.shape_values(ds, ccw);
        self.accumulate(slot, k, &sorted, ds, shape);
        true
    }

    fn shape_values(&self, ds: [f64; 3], ccw: bool) -> [f64; 2] {
        match &self.setup.space.shape {
            ShapeSpace::Ruv { .. } => {
                let v = (ds[0] - ds[1]) / ds[2];
                [ds[2] / ds[1], if ccw { v } else { -v }]
            }
            ShapeSpace::Sas { oriented, .. } => {
                let angle = self.phi(ds);
                [if *oriented && !ccw { 2.0 * PI - angle } else { angle }, 0.0]
            }
        }
    }

    fn accumulate(&mut self, slot: usize, k: usize, sorted: &[Cell; 3], ds: [f64; 3], shape: [f64; 2]) {
        let conversion = self.setup.space.sep.conversion;
        let d = ds.map(|x| conversion.to_user(x));
        let mut zeta = [0.0; 8];
        match self.setup.reducer.kind() {
            ValueKind::Count => {}
            ValueKind::Scalar => zeta[0] = sorted[0].wk * sorted[1].wk * sorted[2].wk,
            ValueKind::Shear => {
                // project each shear onto the line joining its vertex to the
                // centroid
                let q2 = self.metric.offset(&sorted[0].pos, &sorted[1].pos);
                let q3 = self.metric.offset(&sorted[0].pos, &sorted[2].pos);
                let cen = [(q2[0] + q3[0]) / 3.0, (q2[1] + q3[1]) / 3.0];
                let rel = [
                    [-cen[0], -cen[1]],
                    [q2[0] - cen[0], q2[1] - cen[1]],
                    [q3[0] - cen[0], q3[1] - cen[1]],
                ];
                let g: [[f64; 2]; 3] = [0, 1, 2].map(|i| cmul(sorted[i].wg, projection(rel[i])));
                let gam = [
                    cmul(cmul(g[0], g[1]), g[2]),
                    cmul(cmul(conj(g[0]), g[1]), g[2]),
                    cmul(cmul(g[0], conj(g[1])), g[2]),
                    cmul(cmul(g[0], g[1]), conj(g[2])),
                ];
                for (i, z) in gam.iter().enumerate() {
                    zeta[2 * i] = z[0];
                    zeta[2 * i + 1] = z[1];
                }
            }
        }
        let datum = TripleDatum {
            ntri: sorted[0].n * sorted[1].n * sorted[2].n,
            weight: sorted[0].w * sorted[1].w * sorted[2].w,
            d,
            logd: d.map(f64::ln),
            shape,
            zeta,
        };
        self.setup.reducer.consume(&mut self.packs[slot].get_state_mut(k), &datum);
    }
}
