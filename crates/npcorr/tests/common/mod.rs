// the reason this is named mod.rs has to do with some complexities of how
// testing is handled
//
// we are following the advice of the rust book
// https://doc.rust-lang.org/book/ch11-03-test-organization.html#submodules-in-integration-tests

#![allow(dead_code)]

use npcorr::PointSet;
use rand::distr::{Distribution, Uniform};
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;

// based on numpy!
// https://numpy.org/doc/stable/reference/generated/numpy.isclose.html
pub fn isclose(actual: f64, ref_val: f64, rtol: f64, atol: f64) -> bool {
    let actual_nan = actual.is_nan();
    let ref_nan = ref_val.is_nan();
    if actual_nan || ref_nan {
        actual_nan && ref_nan
    } else {
        (actual - ref_val).abs() <= (atol + rtol * ref_val.abs())
    }
}

/// panic with a readable message at the first element that isn't close
pub fn assert_consistent_results(actual: &[f64], expected: &[f64], rtol: f64, atol: f64, what: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{what}: lengths differ ({} vs {})",
        actual.len(),
        expected.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            isclose(*a, *e, rtol, atol),
            "{what}: element {i} is {a}, expected {e} (rtol = {rtol}, atol = {atol})"
        );
    }
}

/// The arrays of a random flat catalog
pub struct RandomCatalog {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub w: Vec<f64>,
    pub k: Vec<f64>,
    pub g1: Vec<f64>,
    pub g2: Vec<f64>,
}

impl RandomCatalog {
    /// `n` points uniformly in `[0, size)²`. Weights and values are small
    /// integers (or halves) so sums don't depend on the order they're
    /// accumulated in.
    pub fn new(n: usize, size: f64, seed: u64) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let pos = Uniform::new(0.0, size).unwrap();
        let ints = Uniform::try_from(-4..=4).unwrap();
        let weights = Uniform::try_from(1..=3).unwrap();
        let mut out = RandomCatalog {
            x: Vec::with_capacity(n),
            y: Vec::with_capacity(n),
            w: Vec::with_capacity(n),
            k: Vec::with_capacity(n),
            g1: Vec::with_capacity(n),
            g2: Vec::with_capacity(n),
        };
        for _ in 0..n {
            out.x.push(pos.sample(&mut rng));
            out.y.push(pos.sample(&mut rng));
            out.w.push(weights.sample(&mut rng) as f64);
            out.k.push(ints.sample(&mut rng) as f64);
            out.g1.push(0.5 * ints.sample(&mut rng) as f64 / 4.0);
            out.g2.push(0.5 * ints.sample(&mut rng) as f64 / 4.0);
        }
        out
    }

    pub fn counts(&self) -> PointSet {
        PointSet::flat(&self.x, &self.y)
            .unwrap()
            .with_weights(&self.w)
            .unwrap()
    }

    pub fn scalars(&self) -> PointSet {
        self.counts().with_k(&self.k).unwrap()
    }

    pub fn shears(&self) -> PointSet {
        self.counts().with_g(&self.g1, &self.g2).unwrap()
    }

    /// patch labels from a regular `n x n` grid over `[0, size)²`
    pub fn grid_patches(&self, n: usize, size: f64) -> Vec<usize> {
        let cell = |v: f64| ((v / size * n as f64) as usize).min(n - 1);
        self.x
            .iter()
            .zip(&self.y)
            .map(|(&x, &y)| cell(y) * n + cell(x))
            .collect()
    }

    /// the catalog without the points whose label is `drop`
    pub fn without(&self, labels: &[usize], drop: usize) -> RandomCatalog {
        let keep: Vec<usize> = (0..self.x.len()).filter(|&i| labels[i] != drop).collect();
        let pick = |v: &[f64]| keep.iter().map(|&i| v[i]).collect::<Vec<f64>>();
        RandomCatalog {
            x: pick(&self.x),
            y: pick(&self.y),
            w: pick(&self.w),
            k: pick(&self.k),
            g1: pick(&self.g1),
            g2: pick(&self.g2),
        }
    }
}

/// Brute-force KK sums over every unordered pair with log binning:
/// `(npairs, weight, xi)` per bin
pub fn brute_force_kk(
    cat: &RandomCatalog,
    min_sep: f64,
    max_sep: f64,
    nbins: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let bin_size = (max_sep.ln() - min_sep.ln()) / nbins as f64;
    let mut npairs = vec![0.0; nbins];
    let mut weight = vec![0.0; nbins];
    let mut sum = vec![0.0; nbins];
    let n = cat.x.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let (dx, dy) = (cat.x[j] - cat.x[i], cat.y[j] - cat.y[i]);
            let r = (dx * dx + dy * dy).sqrt();
            if r < min_sep || r >= max_sep {
                continue;
            }
            let k = (((r.ln() - min_sep.ln()) / bin_size) as usize).min(nbins - 1);
            let w = cat.w[i] * cat.w[j];
            npairs[k] += 1.0;
            weight[k] += w;
            sum[k] += w * cat.k[i] * cat.k[j];
        }
    }
    let xi = sum
        .iter()
        .zip(&weight)
        .map(|(s, w)| if *w > 0.0 { s / w } else { 0.0 })
        .collect();
    (npairs, weight, xi)
}
