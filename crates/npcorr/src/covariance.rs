//! Covariance estimates of correlation functions.
//!
//! Every resampling method builds a design matrix: one row per resampling
//! of the patches, holding the statistic recomputed from the patch
//! combinations that resampling selects. The rows are then reduced to a
//! covariance matrix:
//!
//! - jackknife: row `i` leaves out every combination touching patch `i`;
//!   `C = (n-1)/n Σ (v_i - <v>)(v_i - <v>)ᵀ`
//! - sample: row `i` keeps the combinations whose first patched index is
//!   `i`, weighted by the fraction of the total weight it holds;
//!   `C = 1/(n-1) Σ w_i (v_i - <v>)(v_i - <v>)ᵀ`
//! - bootstrap: every row draws `n` patches with replacement; a combination
//!   counts once for every way it can be formed from the draws
//! - marked bootstrap: like bootstrap, but a combination only counts with
//!   the multiplicity of its first patched index
//!
//! Both bootstraps use `C = 1/(N-1) Σ (v_i - <v>)(v_i - <v>)ᵀ`. `<v>` is
//! always the plain row mean.

use crate::config::VarMethod;
use crate::corr2::Corr2;
use crate::corr3::Corr3;
use crate::error::Error;
use crate::patch::{PatchResults, common_npatch};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

/// seed of the bootstrap draws when the configuration doesn't give one
pub(crate) const DEFAULT_BOOTSTRAP_SEED: u64 = 0x5eed_b007;

/// A borrowed correlation of either order
#[derive(Clone, Copy, Debug)]
pub enum CorrRef<'a> {
    Two(&'a Corr2),
    Three(&'a Corr3),
}

impl<'a> From<&'a Corr2> for CorrRef<'a> {
    fn from(corr: &'a Corr2) -> Self {
        CorrRef::Two(corr)
    }
}

impl<'a> From<&'a Corr3> for CorrRef<'a> {
    fn from(corr: &'a Corr3) -> Self {
        CorrRef::Three(corr)
    }
}

/// A resampled correlation, as handed to the statistic of
/// [`estimate_multi_cov`]
#[derive(Clone, Debug)]
pub enum AnyCorr {
    Two(Corr2),
    Three(Corr3),
}

impl AnyCorr {
    pub fn as_corr2(&self) -> Option<&Corr2> {
        match self {
            AnyCorr::Two(c) => Some(c),
            AnyCorr::Three(_) => None,
        }
    }

    pub fn as_corr3(&self) -> Option<&Corr3> {
        match self {
            AnyCorr::Three(c) => Some(c),
            AnyCorr::Two(_) => None,
        }
    }

    /// the default statistic of the correlation
    pub fn stat(&self) -> Vec<f64> {
        match self {
            AnyCorr::Two(c) => c.stat(),
            AnyCorr::Three(c) => c.stat(),
        }
    }

    fn total_weight(&self) -> f64 {
        match self {
            AnyCorr::Two(c) => c.total_weight(),
            AnyCorr::Three(c) => c.total_weight(),
        }
    }
}

impl CorrRef<'_> {
    fn patch_results(&self) -> Option<&PatchResults> {
        match self {
            CorrRef::Two(c) => c.patch_results(),
            CorrRef::Three(c) => c.patch_results(),
        }
    }

    fn resampled(&self, sel: &Selection) -> Result<AnyCorr, Error> {
        match self {
            CorrRef::Two(c) => Ok(AnyCorr::Two(c.resampled(sel)?)),
            CorrRef::Three(c) => Ok(AnyCorr::Three(c.resampled(sel)?)),
        }
    }

    fn shot_variance(&self) -> Result<Vec<f64>, Error> {
        match self {
            CorrRef::Two(c) => c.shot_variance(),
            CorrRef::Three(c) => c.shot_variance(),
        }
    }

    /// `(num_bootstrap, rng_seed)` of the configuration
    fn bootstrap_params(&self) -> (usize, Option<u64>) {
        let common = match self {
            CorrRef::Two(c) => c.config().common(),
            CorrRef::Three(c) => c.config().common(),
        };
        (common.num_bootstrap(), common.rng_seed())
    }
}

/// The largest `num_bootstrap` and `rng_seed` among `corrs`, so that a joint
/// bootstrap doesn't depend on their order
fn joint_bootstrap_params(corrs: &[CorrRef<'_>]) -> (usize, Option<u64>) {
    corrs
        .iter()
        .map(CorrRef::bootstrap_params)
        .fold((0, None), |(nboot, seed), (n, s)| (nboot.max(n), seed.max(s)))
}

/// The patch combinations included in one row of a design matrix
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Selection {
    /// everything except patch `i`
    Jackknife(usize),
    /// only combinations whose first patched index is `i`
    Sample(usize),
    /// multiplicity of every patch in a bootstrap draw
    Bootstrap(Vec<f64>),
    Marked(Vec<f64>),
}

impl Selection {
    /// The weight of the combination `key`. Sides with a single patch
    /// (`npatch[s] == 1`) don't take part in the selection.
    pub(crate) fn weight(&self, npatch: &[usize], key: &[usize]) -> f64 {
        let mut patched = key
            .iter()
            .zip(npatch)
            .filter(|&(_, &n)| n > 1)
            .map(|(&k, _)| k);
        match self {
            Selection::Jackknife(i) => {
                if patched.any(|k| k == *i) {
                    0.0
                } else {
                    1.0
                }
            }
            Selection::Sample(i) => match patched.next() {
                Some(k) if k != *i => 0.0,
                _ => 1.0,
            },
            Selection::Bootstrap(m) => {
                let mut distinct: Vec<usize> = patched.collect();
                distinct.sort_unstable();
                distinct.dedup();
                distinct.iter().map(|&k| m.get(k).copied().unwrap_or(0.0)).product()
            }
            Selection::Marked(m) => patched
                .next()
                .map_or(1.0, |k| m.get(k).copied().unwrap_or(0.0)),
        }
    }
}

/// the common patch count of all the correlations
fn check_patches(corrs: &[CorrRef<'_>]) -> Result<usize, Error> {
    let mut npatch = Vec::new();
    for (k, corr) in corrs.iter().enumerate() {
        let results = corr
            .patch_results()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                Error::covariance(format!(
                    "correlation {k} was not processed with patched catalogs"
                ))
            })?;
        npatch.extend_from_slice(results.npatch());
    }
    let n = common_npatch(&npatch)?;
    if n < 2 {
        return Err(Error::covariance("resampling needs at least 2 patches"));
    }
    Ok(n)
}

/// one row per selection, plus the total weight of every row
fn design_matrix<F>(
    corrs: &[CorrRef<'_>],
    selections: &[Selection],
    func: &F,
) -> Result<(Array2<f64>, Array1<f64>), Error>
where
    F: Fn(&[AnyCorr]) -> Vec<f64>,
{
    let mut rows = Vec::with_capacity(selections.len());
    let mut weights = Vec::with_capacity(selections.len());
    for sel in selections {
        let resampled = corrs
            .iter()
            .map(|c| c.resampled(sel))
            .collect::<Result<Vec<_>, _>>()?;
        weights.push(resampled.iter().map(AnyCorr::total_weight).sum());
        rows.push(func(&resampled));
    }
    let nstat = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|r| r.len() != nstat) {
        return Err(Error::covariance("the statistic changed length between samples"));
    }
    let v = Array2::from_shape_vec((rows.len(), nstat), rows.concat())
        .map_err(|e| Error::covariance(e.to_string()))?;
    log::debug!("design matrix of {} samples x {nstat} values", v.nrows());
    Ok((v, Array1::from(weights)))
}

/// `Σ w_i (v_i - <v>)(v_i - <v>)ᵀ`, with `<v>` the unweighted row mean and
/// unit weights when `w` is None
fn spread(v: &Array2<f64>, w: Option<&Array1<f64>>) -> Array2<f64> {
    let mean = v
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(v.ncols()));
    let centered = v - &mean;
    match w {
        Some(w) => {
            let weighted = &centered * &w.view().insert_axis(Axis(1));
            weighted.t().dot(&centered)
        }
        None => centered.t().dot(&centered),
    }
}

/// Estimate the joint covariance of the statistic `func` computes from
/// several correlations. All of them must have been processed with catalogs
/// of the same patch count.
///
/// With [`VarMethod::Shot`], `func` is ignored and the result is the
/// diagonal of the shot-noise variances of the default statistics.
pub fn estimate_multi_cov<F>(
    corrs: &[CorrRef<'_>],
    method: VarMethod,
    func: F,
) -> Result<Array2<f64>, Error>
where
    F: Fn(&[AnyCorr]) -> Vec<f64>,
{
    if corrs.is_empty() {
        return Err(Error::covariance("no correlations to estimate the covariance of"));
    }
    if method == VarMethod::Shot {
        let var = corrs
            .iter()
            .map(CorrRef::shot_variance)
            .collect::<Result<Vec<_>, _>>()?
            .concat();
        return Ok(Array2::from_diag(&Array1::from(var)));
    }

    let npatch = check_patches(corrs)?;
    log::debug!("{method} covariance over {npatch} patches");
    match method {
        VarMethod::Jackknife => {
            let sels: Vec<_> = (0..npatch).map(Selection::Jackknife).collect();
            let (v, _) = design_matrix(corrs, &sels, &func)?;
            Ok(spread(&v, None) * ((npatch - 1) as f64 / npatch as f64))
        }
        VarMethod::Sample => {
            let sels: Vec<_> = (0..npatch).map(Selection::Sample).collect();
            let (v, w) = design_matrix(corrs, &sels, &func)?;
            if let Some(i) = w.iter().position(|&x| !(x > 0.0)) {
                return Err(Error::covariance(format!(
                    "patch {i} holds no pairs, so the sample variance is undefined"
                )));
            }
            let w = &w / w.sum();
            Ok(spread(&v, Some(&w)) / (npatch - 1) as f64)
        }
        VarMethod::Bootstrap | VarMethod::MarkedBootstrap => {
            let (nboot, seed) = joint_bootstrap_params(corrs);
            if nboot < 2 {
                return Err(Error::covariance("the bootstrap needs at least 2 resamplings"));
            }
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed.unwrap_or(DEFAULT_BOOTSTRAP_SEED));
            let sels: Vec<_> = (0..nboot)
                .map(|_| {
                    let mut m = vec![0.0; npatch];
                    for _ in 0..npatch {
                        m[rng.random_range(0..npatch)] += 1.0;
                    }
                    if method == VarMethod::Bootstrap {
                        Selection::Bootstrap(m)
                    } else {
                        Selection::Marked(m)
                    }
                })
                .collect();
            let (v, _) = design_matrix(corrs, &sels, &func)?;
            Ok(spread(&v, None) / (nboot - 1) as f64)
        }
        VarMethod::Shot => Err(Error::internal("shot noise has no design matrix")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn selection_weights() {
        let npatch = [4, 4];
        assert_eq!(Selection::Jackknife(1).weight(&npatch, &[0, 2]), 1.0);
        assert_eq!(Selection::Jackknife(2).weight(&npatch, &[0, 2]), 0.0);
        assert_eq!(Selection::Sample(0).weight(&npatch, &[0, 2]), 1.0);
        assert_eq!(Selection::Sample(2).weight(&npatch, &[0, 2]), 0.0);

        let m = vec![2.0, 0.0, 3.0, 1.0];
        assert_eq!(Selection::Bootstrap(m.clone()).weight(&npatch, &[0, 2]), 6.0);
        assert_eq!(Selection::Bootstrap(m.clone()).weight(&npatch, &[2, 2]), 3.0);
        assert_eq!(Selection::Marked(m.clone()).weight(&npatch, &[2, 0]), 3.0);

        // the unpatched side is ignored
        let npatch = [1, 4];
        assert_eq!(Selection::Jackknife(0).weight(&npatch, &[0, 1]), 1.0);
        assert_eq!(Selection::Sample(1).weight(&npatch, &[0, 1]), 1.0);
        assert_eq!(Selection::Marked(m).weight(&npatch, &[0, 3]), 1.0);
    }

    #[test]
    fn spread_of_rows() {
        let v = array![[1.0, 2.0], [3.0, 2.0], [2.0, 5.0]];
        let c = spread(&v, None);
        assert_eq!(c, array![[2.0, 0.0], [0.0, 6.0]]);

        // the weights scale the outer products but not the mean
        let w = array![0.5, 0.5, 0.0];
        let c = spread(&v, Some(&w));
        assert_eq!(c, array![[1.0, 0.0], [0.0, 1.0]]);

        let v = array![[0.0], [4.0]];
        let w = array![0.75, 0.25];
        assert_eq!(spread(&v, Some(&w)), array![[4.0]]);
    }

    #[test]
    fn bootstrap_params_take_the_largest() {
        use crate::{Corr2, Corr2Builder, PairKind};
        let corr = |nboot: usize, seed: Option<u64>| {
            let mut builder = Corr2Builder::new()
                .min_sep(1.0)
                .max_sep(10.0)
                .nbins(4)
                .num_bootstrap(nboot);
            if let Some(seed) = seed {
                builder = builder.rng_seed(seed);
            }
            Corr2::new(builder.build().unwrap(), PairKind::NN).unwrap()
        };
        let (a, b) = (corr(20, Some(7)), corr(60, None));
        let c = corr(10, Some(3));
        let forward = [CorrRef::from(&a), CorrRef::from(&b), CorrRef::from(&c)];
        let backward = [CorrRef::from(&c), CorrRef::from(&b), CorrRef::from(&a)];
        assert_eq!(joint_bootstrap_params(&forward), (60, Some(7)));
        assert_eq!(joint_bootstrap_params(&backward), (60, Some(7)));
    }
}
