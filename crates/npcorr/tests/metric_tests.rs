use npcorr::{Corr2, Corr2Builder, Corr2Config, MetricKind, PairKind, PointSet, SepUnits};
use rand::distr::{Distribution, Uniform};
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;

mod common;

use common::RandomCatalog;

type Pos = [f64; 3];

fn sub(a: &Pos, b: &Pos) -> Pos {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: &Pos, b: &Pos) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn norm(a: &Pos) -> f64 {
    dot(a, a).sqrt()
}

fn cross(a: &Pos, b: &Pos) -> Pos {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// `n` points uniformly in the box `[lo, hi)` with weights in 1..=3
fn random_box(n: usize, lo: Pos, hi: Pos, seed: u64) -> (Vec<Pos>, Vec<f64>) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let axes: Vec<_> = (0..3).map(|k| Uniform::new(lo[k], hi[k]).unwrap()).collect();
    let weights = Uniform::try_from(1..=3).unwrap();
    let pos = (0..n)
        .map(|_| [axes[0].sample(&mut rng), axes[1].sample(&mut rng), axes[2].sample(&mut rng)])
        .collect();
    let w = (0..n).map(|_| weights.sample(&mut rng) as f64).collect();
    (pos, w)
}

fn three_d(pos: &[Pos], w: &[f64]) -> PointSet {
    let axis = |k: usize| pos.iter().map(|p| p[k]).collect::<Vec<_>>();
    PointSet::three_d(&axis(0), &axis(1), &axis(2))
        .unwrap()
        .with_weights(w)
        .unwrap()
}

/// Log bins over `[min_sep, max_sep)`, indexed the way the correlations
/// index them
struct LogBins {
    lo: f64,
    width: f64,
    nbins: usize,
    min_sep: f64,
    max_sep: f64,
}

impl LogBins {
    fn new(min_sep: f64, max_sep: f64, nbins: usize) -> Self {
        let (lo, hi) = (min_sep.ln(), max_sep.ln());
        LogBins {
            lo,
            width: (hi - lo) / nbins as f64,
            nbins,
            min_sep,
            max_sep,
        }
    }

    fn index(&self, r: f64) -> Option<usize> {
        if !(r >= self.min_sep && r < self.max_sep) {
            return None;
        }
        Some((((r.ln() - self.lo) / self.width) as usize).min(self.nbins - 1))
    }
}

/// `(npairs, weight)` per bin, summing `sep(i, j)` over the pairs `i < j`
/// (`auto`) or over every `(i, j)`
fn brute_force_counts(
    bins: &LogBins,
    w1: &[f64],
    w2: &[f64],
    auto: bool,
    sep: impl Fn(usize, usize) -> Option<f64>,
) -> (Vec<f64>, Vec<f64>) {
    let mut npairs = vec![0.0; bins.nbins];
    let mut weight = vec![0.0; bins.nbins];
    for i in 0..w1.len() {
        let start = if auto { i + 1 } else { 0 };
        for j in start..w2.len() {
            let Some(r) = sep(i, j) else { continue };
            if r == 0.0 {
                continue;
            }
            if let Some(k) = bins.index(r) {
                npairs[k] += 1.0;
                weight[k] += w1[i] * w2[j];
            }
        }
    }
    (npairs, weight)
}

fn exact(builder: Corr2Builder) -> Corr2Config {
    builder.bin_slop(0.0).build().unwrap()
}

fn assert_counts(corr: &Corr2, expected: &(Vec<f64>, Vec<f64>)) {
    assert_eq!(corr.npairs(), expected.0.as_slice());
    assert_eq!(corr.weight(), expected.1.as_slice());
    assert!(corr.npairs().iter().sum::<f64>() > 0.0);
}

#[test]
fn periodic_matches_brute_force() {
    let period = 10.0;
    let data = RandomCatalog::new(200, period, 41);
    let config = exact(
        Corr2Builder::new()
            .min_sep(0.5)
            .max_sep(5.0)
            .nbins(6)
            .metric(MetricKind::Periodic)
            .period(period),
    );
    let mut corr = Corr2::new(config, PairKind::NN).unwrap();
    corr.process(&data.counts(), None).unwrap();

    let wrap = |d: f64| d - period * (d / period).round();
    let expected = brute_force_counts(&LogBins::new(0.5, 5.0, 6), &data.w, &data.w, true, |i, j| {
        let delta = [wrap(data.x[j] - data.x[i]), wrap(data.y[j] - data.y[i]), 0.0];
        Some(norm(&delta))
    });
    assert_counts(&corr, &expected);
}

#[test]
fn arc_matches_brute_force() {
    let (pos, w) = random_box(150, [0.0, -5.0, 0.0], [10.0, 5.0, 1.0], 42);
    let ra: Vec<f64> = pos.iter().map(|p| p[0]).collect();
    let dec: Vec<f64> = pos.iter().map(|p| p[1]).collect();
    let cat = PointSet::spherical(&ra, &dec, SepUnits::Degrees)
        .unwrap()
        .with_weights(&w)
        .unwrap();
    let config = exact(
        Corr2Builder::new()
            .min_sep(0.3)
            .max_sep(6.0)
            .nbins(6)
            .metric(MetricKind::Arc)
            .sep_units(SepUnits::Degrees),
    );
    let mut corr = Corr2::new(config, PairKind::NN).unwrap();
    corr.process(&cat, None).unwrap();

    let deg = std::f64::consts::PI / 180.0;
    let unit: Vec<Pos> = ra
        .iter()
        .zip(&dec)
        .map(|(&ra, &dec)| {
            let (ra, dec) = (ra * deg, dec * deg);
            [dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin()]
        })
        .collect();
    let bins = LogBins::new(0.3 * deg, 6.0 * deg, 6);
    let expected = brute_force_counts(&bins, &w, &w, true, |i, j| {
        Some(norm(&cross(&unit[i], &unit[j])).atan2(dot(&unit[i], &unit[j])))
    });
    assert_counts(&corr, &expected);
    // reported in the configured units
    assert!(corr.meanr().iter().all(|&r| r > 0.299 && r < 6.001));
}

#[test]
fn rperp_matches_brute_force() {
    let (pos, w) = random_box(200, [0.0, 0.0, 90.0], [10.0, 10.0, 100.0], 43);
    let config = exact(
        Corr2Builder::new()
            .min_sep(0.5)
            .max_sep(8.0)
            .nbins(6)
            .metric(MetricKind::Rperp)
            .min_rpar(-4.0)
            .max_rpar(4.0),
    );
    let mut corr = Corr2::new(config, PairKind::NN).unwrap();
    corr.process(&three_d(&pos, &w), None).unwrap();

    let expected = brute_force_counts(&LogBins::new(0.5, 8.0, 6), &w, &w, true, |i, j| {
        let (p1, p2) = (&pos[i], &pos[j]);
        let delta = sub(p2, p1);
        let l = [0.5 * (p1[0] + p2[0]), 0.5 * (p1[1] + p2[1]), 0.5 * (p1[2] + p2[2])];
        let rpar = dot(&delta, &l) / norm(&l);
        let full = norm(&delta);
        (-4.0..4.0)
            .contains(&rpar)
            .then(|| (full * full - rpar * rpar).max(0.0).sqrt())
    });
    assert_counts(&corr, &expected);
}

#[test]
fn old_rperp_matches_brute_force() {
    let (pos, w) = random_box(200, [0.0, 0.0, 90.0], [10.0, 10.0, 100.0], 44);
    let config = exact(
        Corr2Builder::new()
            .min_sep(0.5)
            .max_sep(8.0)
            .nbins(6)
            .metric(MetricKind::OldRperp)
            .min_rpar(-4.0)
            .max_rpar(4.0),
    );
    let mut corr = Corr2::new(config, PairKind::NN).unwrap();
    corr.process(&three_d(&pos, &w), None).unwrap();

    let expected = brute_force_counts(&LogBins::new(0.5, 8.0, 6), &w, &w, true, |i, j| {
        let (p1, p2) = (&pos[i], &pos[j]);
        let rpar = norm(p2) - norm(p1);
        let full = norm(&sub(p2, p1));
        (-4.0..4.0)
            .contains(&rpar)
            .then(|| (full * full - rpar * rpar).max(0.0).sqrt())
    });
    assert_counts(&corr, &expected);
}

#[test]
fn rlens_matches_brute_force() {
    // lenses in front of the sources; the metric isn't symmetric, so this
    // is a cross correlation
    let (lens, wl) = random_box(120, [0.0, 0.0, 40.0], [10.0, 10.0, 50.0], 45);
    let (src, ws) = random_box(150, [0.0, 0.0, 90.0], [10.0, 10.0, 100.0], 46);
    let config = exact(
        Corr2Builder::new()
            .min_sep(0.5)
            .max_sep(8.0)
            .nbins(6)
            .metric(MetricKind::Rlens)
            .min_rpar(45.0)
            .max_rpar(55.0),
    );
    let mut corr = Corr2::new(config, PairKind::NN).unwrap();
    corr.process(&three_d(&lens, &wl), Some(&three_d(&src, &ws)))
        .unwrap();

    let expected = brute_force_counts(&LogBins::new(0.5, 8.0, 6), &wl, &ws, false, |i, j| {
        let (p1, p2) = (&lens[i], &src[j]);
        let rpar = norm(p2) - norm(p1);
        (45.0..55.0)
            .contains(&rpar)
            .then(|| norm(&cross(p1, p2)) / norm(p2))
    });
    assert_counts(&corr, &expected);
}
