use npcorr::{Corr3, Corr3Builder, Corr3Config, ProcessOptions, TriangleBinType, TripleKind};

mod common;

use common::{RandomCatalog, assert_consistent_results};

fn ruv_config(bin_slop: f64, num_threads: usize) -> Corr3Config {
    Corr3Builder::new()
        .min_sep(1.0)
        .bin_size(0.2)
        .nbins(10)
        .min_u(0.1)
        .nubins(3)
        .nvbins(2)
        .bin_slop(bin_slop)
        .num_threads(num_threads)
        .build()
        .unwrap()
}

/// `(ntri, weight, sum of w k k k)` per LogRUV bin of every triangle, with
/// the default `u` and `v` axes (10 bins each)
fn brute_force_kkk(cat: &RandomCatalog, config: &Corr3Config) -> [Vec<f64>; 3] {
    let (nr, nu, nv) = (config.nbins(), 10, 10);
    let (min_sep, bin_size) = (config.min_sep(), config.bin_size());
    let n_bins = nr * nu * 2 * nv;
    let mut out = [vec![0.0; n_bins], vec![0.0; n_bins], vec![0.0; n_bins]];
    let pos = |i: usize| [cat.x[i], cat.y[i]];
    let dist = |a: usize, b: usize| ((cat.x[a] - cat.x[b]).powi(2) + (cat.y[a] - cat.y[b]).powi(2)).sqrt();
    let n = cat.x.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let v = [i, j, k];
                // side m is opposite vertex m
                let d = [dist(j, k), dist(i, k), dist(i, j)];
                let mut o = [0, 1, 2];
                o.sort_by(|&a, &b| d[b].total_cmp(&d[a]));
                let (d1, d2, d3) = (d[o[0]], d[o[1]], d[o[2]]);
                let kr = ((d2 / min_sep).ln() / bin_size).floor();
                if kr < 0.0 || kr >= nr as f64 {
                    continue;
                }
                let ku = ((d3 / d2 / (1.0 / nu as f64)) as usize).min(nu - 1);
                let kv = (((d1 - d2) / d3 / (1.0 / nv as f64)) as usize).min(nv - 1);
                let (a, b, c) = (pos(v[o[0]]), pos(v[o[1]]), pos(v[o[2]]));
                let z = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
                let kv = if z > 0.0 { nv + kv } else { nv - 1 - kv };
                let bin = (kr as usize * nu + ku) * 2 * nv + kv;
                let w = cat.w[i] * cat.w[j] * cat.w[k];
                out[0][bin] += 1.0;
                out[1][bin] += w;
                out[2][bin] += w * cat.k[i] * cat.k[j] * cat.k[k];
            }
        }
    }
    out
}

#[test]
fn kkk_brute_matches_a_triple_loop() {
    let data = RandomCatalog::new(100, 20.0, 11);
    let config = Corr3Builder::new()
        .min_sep(1.0)
        .bin_size(0.2)
        .nbins(10)
        .brute(true)
        .build()
        .unwrap();
    assert_eq!(config.shape(), vec![10, 10, 20]);
    let mut corr = Corr3::new(config.clone(), TripleKind::KKK).unwrap();
    corr.process(&[&data.scalars()]).unwrap();

    let [ntri, weight, wkkk] = brute_force_kkk(&data, &config);
    assert_eq!(corr.ntri(), ntri.as_slice());
    assert_eq!(corr.weight(), weight.as_slice());
    let weighted: Vec<f64> = corr
        .zeta()
        .iter()
        .zip(corr.weight())
        .map(|(z, w)| z * w)
        .collect();
    assert_consistent_results(&weighted, &wkkk, 1e-12, 1e-9, "w zeta");

    let sumw: f64 = data.w.iter().sum();
    assert!((corr.tot() - sumw.powi(3) / 6.0).abs() <= 1e-12 * corr.tot());

    // the tree with bin_slop = 0 agrees with the brute-force traversal
    let exact = Corr3Builder::new()
        .min_sep(1.0)
        .bin_size(0.2)
        .nbins(10)
        .bin_slop(0.0)
        .build()
        .unwrap();
    let mut tree = Corr3::new(exact, TripleKind::KKK).unwrap();
    tree.process(&[&data.scalars()]).unwrap();
    assert_eq!(tree.ntri(), corr.ntri());
}

#[test]
fn crosses_of_a_catalog_with_itself() {
    let data = RandomCatalog::new(60, 15.0, 4);
    let cat = data.counts();
    let mut auto = Corr3::new(ruv_config(0.0, 1), TripleKind::NNN).unwrap();
    auto.process(&[&cat]).unwrap();
    let mut cross12 = Corr3::new(ruv_config(0.0, 1), TripleKind::NNN).unwrap();
    cross12.process(&[&cat, &cat]).unwrap();
    let mut cross = Corr3::new(ruv_config(0.0, 1), TripleKind::NNN).unwrap();
    cross.process(&[&cat, &cat, &cat]).unwrap();

    let times = |f: f64, v: &[f64]| v.iter().map(|x| f * x).collect::<Vec<_>>();
    assert_eq!(cross12.ntri(), times(3.0, auto.ntri()).as_slice());
    assert_eq!(cross.ntri(), times(6.0, auto.ntri()).as_slice());
    assert_eq!(cross.weight(), times(6.0, auto.weight()).as_slice());
    assert!(auto.ntri().iter().sum::<f64>() > 0.0);

    let opts = ProcessOptions {
        ordered: true,
        ..Default::default()
    };
    let mut ordered = Corr3::new(ruv_config(0.0, 1), TripleKind::NNN).unwrap();
    ordered.process_with(&[&cat, &cat, &cat], &opts).unwrap();
    assert_eq!(ordered.ntri(), auto.ntri());
}

#[test]
fn permutations_sum_to_the_unordered_cross() {
    let a = RandomCatalog::new(30, 12.0, 1).counts();
    let b = RandomCatalog::new(30, 12.0, 2).counts();
    let c = RandomCatalog::new(30, 12.0, 3).counts();
    let mut unordered = Corr3::new(ruv_config(0.0, 1), TripleKind::NNN).unwrap();
    unordered.process(&[&a, &b, &c]).unwrap();
    let perms = unordered
        .process_cross_permutations(&a, &b, &c, &ProcessOptions::default())
        .unwrap();
    assert_eq!(perms.len(), 6);

    let n = unordered.ntri().len();
    let mut total = vec![0.0; n];
    for p in &perms {
        for (t, x) in total.iter_mut().zip(p.ntri()) {
            *t += x;
        }
    }
    assert_eq!(total, unordered.ntri());

    // the ordered cross keeps only the first assignment
    let mut ordered = Corr3::new(ruv_config(0.0, 1), TripleKind::NNN).unwrap();
    let opts = ProcessOptions {
        ordered: true,
        ..Default::default()
    };
    ordered.process_with(&[&a, &b, &c], &opts).unwrap();
    assert_eq!(ordered.ntri(), perms[0].ntri());
}

#[test]
fn threads_match_serial() {
    let data = RandomCatalog::new(120, 20.0, 6);
    let cat = data.scalars();
    let mut serial = Corr3::new(ruv_config(0.5, 1), TripleKind::KKK).unwrap();
    serial.process(&[&cat]).unwrap();
    let mut pooled = Corr3::new(ruv_config(0.5, 3), TripleKind::KKK).unwrap();
    pooled.process(&[&cat]).unwrap();
    assert_eq!(serial.ntri(), pooled.ntri());
    assert_consistent_results(serial.zeta(), pooled.zeta(), 1e-10, 1e-12, "zeta");

    serial.clear().unwrap();
    assert!(serial.ntri().iter().all(|&n| n == 0.0));
    assert!(serial.zeta().iter().all(|&z| z == 0.0));
    assert_eq!(serial.tot(), 0.0);
}

#[test]
fn sas_brute_matches_exact_tree() {
    let data = RandomCatalog::new(50, 12.0, 9);
    let cat = data.counts();
    let build = |brute: bool| {
        Corr3Builder::new()
            .bin_type(TriangleBinType::LogSAS)
            .min_sep(1.0)
            .max_sep(6.0)
            .nbins(4)
            .nphi_bins(6)
            .bin_slop(0.0)
            .brute(brute)
            .build()
            .unwrap()
    };
    let mut tree = Corr3::new(build(false), TripleKind::NNN).unwrap();
    tree.process(&[&cat]).unwrap();
    let mut brute = Corr3::new(build(true), TripleKind::NNN).unwrap();
    brute.process(&[&cat]).unwrap();
    assert_eq!(tree.ntri(), brute.ntri());
    assert_eq!(tree.weight(), brute.weight());
}

#[test]
fn catalog_errors() {
    let data = RandomCatalog::new(5, 5.0, 0);
    let cat = data.counts();
    let mut corr = Corr3::new(ruv_config(0.0, 1), TripleKind::KKK).unwrap();
    assert!(corr.process(&[&cat]).unwrap_err().is_configuration());
    assert!(corr.process(&[]).unwrap_err().is_configuration());
    // mismatched patch counts
    let two = cat.clone().with_patches(&[0, 1, 0, 1, 0]).unwrap();
    let three = cat.with_patches(&[0, 1, 2, 0, 1]).unwrap();
    let nnn = Corr3::new(ruv_config(0.0, 1), TripleKind::NNN).unwrap();
    let err = nnn
        .process_cross_permutations(&two, &two, &three, &ProcessOptions::default())
        .unwrap_err();
    assert!(err.is_configuration());
}
