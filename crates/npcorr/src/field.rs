//! The spatial tree ("field") built over a point set.
//!
//! The tree is stored as an arena of [`Cell`]s. Every cell records the
//! weighted centroid of its points, its size (the largest distance from the
//! centroid to a member point) and the summed weights and values that the
//! traversal needs when a whole cell is treated as a single point.
//!
//! Cells are split along the axis of largest extent until a cell holds a
//! single point, holds only coincident points, or is smaller than
//! `min_size`. Leaves have a traversal size of 0.
//!
//! The traversal starts from the "top-level" cells: the cells reached by
//! descending at least `min_top` levels, and further until a cell is no
//! larger than `max_size`, but never more than `max_top` levels.

use crate::catalog::{PointSet, Values};
use crate::config::SplitMethod;
use crate::metric::{Pos, cross, dot, norm, sub};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Cell {
    pub(crate) pos: Pos,
    /// the size used by the traversal (0 for leaves)
    pub(crate) size: f64,
    /// the sum of the weights
    pub(crate) w: f64,
    /// the number of points
    pub(crate) n: f64,
    /// the sum of `w * k`
    pub(crate) wk: f64,
    /// the sum of `w * g`
    pub(crate) wg: [f64; 2],
    pub(crate) children: Option<[usize; 2]>,
}

impl Cell {
    #[inline(always)]
    pub(crate) fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

/// Parameters controlling the construction of a [`Field`]
#[derive(Clone, Debug)]
pub(crate) struct FieldOpts {
    pub(crate) min_size: f64,
    pub(crate) max_size: f64,
    pub(crate) min_top: u32,
    pub(crate) max_top: u32,
    pub(crate) split_method: SplitMethod,
    pub(crate) seed: u64,
    /// project positions onto the unit sphere and measure sizes as angles
    pub(crate) angular: bool,
}

#[derive(Clone, Copy)]
struct Point {
    pos: Pos,
    w: f64,
    k: f64,
    g: [f64; 2],
}

#[derive(Clone, Debug)]
pub(crate) struct Field {
    cells: Vec<Cell>,
    tops: Vec<usize>,
}

/// moves every element satisfying `pred` to the front, returns how many did
fn partition_in_place<T>(slice: &mut [T], pred: impl Fn(&T) -> bool) -> usize {
    let mut n_left = 0;
    for i in 0..slice.len() {
        if pred(&slice[i]) {
            slice.swap(i, n_left);
            n_left += 1;
        }
    }
    n_left
}

fn centroid_and_size(points: &[Point], angular: bool) -> (Pos, f64, f64) {
    let mut sumw = 0.0;
    let mut weighted = [0.0; 3];
    let mut plain = [0.0; 3];
    for p in points {
        for k in 0..3 {
            weighted[k] += p.w * p.pos[k];
            plain[k] += p.pos[k];
        }
        sumw += p.w;
    }
    let mut center = if sumw != 0.0 {
        weighted.map(|x| x / sumw)
    } else {
        plain.map(|x| x / points.len() as f64)
    };
    if angular {
        let len = norm(&center);
        if len > 0.0 {
            center = center.map(|x| x / len);
        }
    }
    let mut size: f64 = 0.0;
    for p in points {
        let d = if angular {
            norm(&cross(&center, &p.pos)).atan2(dot(&center, &p.pos))
        } else {
            norm(&sub(&p.pos, &center))
        };
        size = size.max(d);
    }
    (center, size, sumw)
}

impl Field {
    /// Build the tree over the points of `cat` listed in `members` (or all
    /// points). Points with zero weight are dropped.
    pub(crate) fn build(cat: &PointSet, members: Option<&[usize]>, opts: &FieldOpts) -> Self {
        let pos = cat.positions();
        let w = cat.weights();
        let make_point = |i: usize| {
            let mut p = pos[i];
            if opts.angular {
                let len = norm(&p);
                if len > 0.0 {
                    p = p.map(|x| x / len);
                }
            }
            let (k, g) = match cat.values() {
                Values::Count => (0.0, [0.0; 2]),
                Values::Scalar(k) => (k[i], [0.0; 2]),
                Values::Shear(g) => (0.0, g[i]),
            };
            Point { pos: p, w: w[i], k, g }
        };
        let mut points: Vec<Point> = match members {
            Some(idx) => idx.iter().copied().filter(|&i| w[i] != 0.0).map(make_point).collect(),
            None => (0..pos.len()).filter(|&i| w[i] != 0.0).map(make_point).collect(),
        };
        let mut field = Field {
            cells: Vec::with_capacity(2 * points.len()),
            tops: Vec::new(),
        };
        if !points.is_empty() {
            let raw_sizes = field.build_cells(&mut points, opts);
            field.collect_tops(0, 0, &raw_sizes, opts);
        }
        field
    }

    /// returns the untruncated size of every cell
    fn build_cells(&mut self, points: &mut [Point], opts: &FieldOpts) -> Vec<f64> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(opts.seed);
        let placeholder = Cell {
            pos: [0.0; 3],
            size: 0.0,
            w: 0.0,
            n: 0.0,
            wk: 0.0,
            wg: [0.0; 2],
            children: None,
        };
        let mut raw_sizes = Vec::with_capacity(2 * points.len());
        self.cells.push(placeholder);
        raw_sizes.push(0.0);

        // (cell index, start, end)
        let mut stack = vec![(0usize, 0usize, points.len())];
        while let Some((ci, start, end)) = stack.pop() {
            let slice = &mut points[start..end];
            let (center, size, w) = centroid_and_size(slice, opts.angular);
            let mut cell = Cell {
                pos: center,
                size,
                w,
                n: slice.len() as f64,
                wk: slice.iter().map(|p| p.w * p.k).sum(),
                wg: [
                    slice.iter().map(|p| p.w * p.g[0]).sum(),
                    slice.iter().map(|p| p.w * p.g[1]).sum(),
                ],
                children: None,
            };
            raw_sizes[ci] = size;

            let splittable = slice.len() > 1 && size > 0.0 && size >= opts.min_size;
            if splittable {
                let mid = split_points(slice, opts.split_method, &mut rng);
                let left = self.cells.len();
                self.cells.push(placeholder);
                self.cells.push(placeholder);
                raw_sizes.push(0.0);
                raw_sizes.push(0.0);
                cell.children = Some([left, left + 1]);
                stack.push((left + 1, start + mid, end));
                stack.push((left, start, start + mid));
            } else {
                cell.size = 0.0;
            }
            self.cells[ci] = cell;
        }
        raw_sizes
    }

    fn collect_tops(&mut self, ci: usize, depth: u32, raw_sizes: &[f64], opts: &FieldOpts) {
        let cell = self.cells[ci];
        let descend = match cell.children {
            Some(_) if depth < opts.max_top => {
                depth < opts.min_top || raw_sizes[ci] > opts.max_size
            }
            _ => false,
        };
        match cell.children {
            Some([left, right]) if descend => {
                self.collect_tops(left, depth + 1, raw_sizes, opts);
                self.collect_tops(right, depth + 1, raw_sizes, opts);
            }
            _ => self.tops.push(ci),
        }
    }

    #[inline(always)]
    pub(crate) fn cell(&self, i: usize) -> &Cell {
        &self.cells[i]
    }

    pub(crate) fn tops(&self) -> &[usize] {
        &self.tops
    }
}

/// Split `slice` along its widest axis. Returns the number of points that
/// go to the first child (always in `1..slice.len()`).
fn split_points(slice: &mut [Point], method: SplitMethod, rng: &mut impl Rng) -> usize {
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for p in slice.iter() {
        for k in 0..3 {
            lo[k] = lo[k].min(p.pos[k]);
            hi[k] = hi[k].max(p.pos[k]);
        }
    }
    let mut axis = 0;
    for k in 1..3 {
        if hi[k] - lo[k] > hi[axis] - lo[axis] {
            axis = k;
        }
    }

    let split_value = match method {
        SplitMethod::Mean => {
            Some(slice.iter().map(|p| p.pos[axis]).sum::<f64>() / slice.len() as f64)
        }
        SplitMethod::Middle => Some(0.5 * (lo[axis] + hi[axis])),
        SplitMethod::Random => {
            let frac: f64 = rng.random_range(0.2..0.8);
            Some(lo[axis] + frac * (hi[axis] - lo[axis]))
        }
        SplitMethod::Median => None,
    };

    if let Some(value) = split_value {
        let n_left = partition_in_place(slice, |p| p.pos[axis] < value);
        if n_left > 0 && n_left < slice.len() {
            return n_left;
        }
    }
    // median split (also the fallback when a split value leaves a side empty)
    let mid = slice.len() / 2;
    slice.select_nth_unstable_by(mid, |a, b| a.pos[axis].total_cmp(&b.pos[axis]));
    mid
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::distr::{Distribution, Uniform};

    fn opts(method: SplitMethod) -> FieldOpts {
        FieldOpts {
            min_size: 0.0,
            max_size: f64::INFINITY,
            min_top: 0,
            max_top: 10,
            split_method: method,
            seed: 12345,
            angular: false,
        }
    }

    fn random_catalog(n: usize, seed: u64) -> PointSet {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let uniform = Uniform::try_from(0.0..10.0).unwrap();
        let x: Vec<f64> = (0..n).map(|_| uniform.sample(&mut rng)).collect();
        let y: Vec<f64> = (0..n).map(|_| uniform.sample(&mut rng)).collect();
        let k: Vec<f64> = (0..n).map(|_| uniform.sample(&mut rng)).collect();
        PointSet::flat(&x, &y).unwrap().with_k(&k).unwrap()
    }

    fn check_cell(field: &Field, ci: usize) -> (f64, f64, f64) {
        let cell = field.cell(ci);
        match cell.children {
            None => (cell.n, cell.w, cell.wk),
            Some([l, r]) => {
                let a = check_cell(field, l);
                let b = check_cell(field, r);
                assert_eq!(cell.n, a.0 + b.0);
                assert!((cell.w - a.1 - b.1).abs() < 1e-10);
                assert!((cell.wk - a.2 - b.2).abs() < 1e-9);
                (cell.n, cell.w, cell.wk)
            }
        }
    }

    #[test]
    fn cells_are_consistent() {
        let cat = random_catalog(200, 1);
        for method in [
            SplitMethod::Mean,
            SplitMethod::Median,
            SplitMethod::Middle,
            SplitMethod::Random,
        ] {
            let field = Field::build(&cat, None, &opts(method));
            let (n, w, _) = check_cell(&field, 0);
            assert_eq!(n, 200.0);
            assert!((w - 200.0).abs() < 1e-10);
            // every leaf holds a single point (no coincident points here)
            for i in 0..field.cells.len() {
                let cell = field.cell(i);
                if cell.is_leaf() {
                    assert_eq!(cell.n, 1.0);
                    assert_eq!(cell.size, 0.0);
                }
            }
        }
    }

    #[test]
    fn top_level_cells() {
        let cat = random_catalog(100, 2);
        let mut o = opts(SplitMethod::Mean);
        o.min_top = 3;
        let field = Field::build(&cat, None, &o);
        assert_eq!(field.tops().len(), 8);
        let total: f64 = field.tops().iter().map(|&i| field.cell(i).n).sum();
        assert_eq!(total, 100.0);

        o.min_top = 0;
        o.max_size = 2.0;
        let field = Field::build(&cat, None, &o);
        for &i in field.tops() {
            let cell = field.cell(i);
            assert!(cell.is_leaf() || cell.size <= 2.0);
        }
    }

    #[test]
    fn min_size_leaves_and_zero_weights() {
        let cat = PointSet::flat(&[0.0, 0.01, 5.0, 6.0], &[0.0; 4])
            .unwrap()
            .with_weights(&[1.0, 1.0, 0.0, 2.0])
            .unwrap();
        let mut o = opts(SplitMethod::Middle);
        o.min_size = 0.1;
        let field = Field::build(&cat, None, &o);
        // the root cell is built first
        let root = field.cell(0);
        assert_eq!(root.n, 3.0);
        assert_eq!(root.w, 4.0);
        let [l, r] = root.children.unwrap();
        // the 2 nearby points end up in a single leaf
        let (near, far) = if field.cell(l).n == 2.0 { (l, r) } else { (r, l) };
        assert!(field.cell(near).is_leaf());
        assert_eq!(field.cell(near).size, 0.0);
        assert_eq!(field.cell(far).pos, [6.0, 0.0, 0.0]);
    }

    #[test]
    fn members_subset() {
        let cat = random_catalog(20, 3);
        let members: Vec<usize> = (0..20).step_by(2).collect();
        let field = Field::build(&cat, Some(&members), &opts(SplitMethod::Mean));
        let total: f64 = field.tops().iter().map(|&i| field.cell(i).n).sum();
        assert_eq!(total, 10.0);
        assert!(Field::build(&cat, Some(&[]), &opts(SplitMethod::Mean)).tops().is_empty());
    }
}
