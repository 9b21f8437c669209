//! 3-point correlation functions.
//!
//! A [`Corr3`] accumulates triangle statistics over 1, 2 or 3 catalogs.
//! With 2 catalogs, every triangle has 1 vertex from the first and 2 from
//! the second; with 3, 1 vertex from each. By default, triangles are counted
//! regardless of which vertex (sides sorted as `d1 >= d2 >= d3`) came from
//! which catalog. [`ProcessOptions::ordered`] keeps only the triangles whose
//! vertex `k` comes from catalog `k`, and
//! [`Corr3::process_cross_permutations`] splits a 3-catalog calculation
//! into all 6 orderings at once.

use crate::binning::{ShapeAxis, TriangleBinning};
use crate::catalog::PointSet;
use crate::columns::{add_assign, outputs_from_statepack, statepack_from_outputs};
use crate::config::{Coords, Corr3Config, TriangleBinType, VarMethod};
use crate::covariance::{CorrRef, Selection, estimate_multi_cov};
use crate::error::Error;
use crate::executor::Workers;
use crate::io::{ResultSink, ResultSource, ResultTable, TableMeta, static_name};
use crate::metric::Metric;
use crate::patch::{
    FieldCache, JobKind, PatchGeometry, PatchResults, ProcessOptions, common_npatch, run_patch_jobs,
    triple_jobs,
};
use crate::threepoint::TripleSetup;
use ndarray::Array2;
use npcorr_nostd_internal::{Reducer, TriangleShape, TripleReducer, ValueKind, flat_bin_index};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// The values that are correlated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TripleKind {
    /// counts (weights only)
    NNN,
    /// scalar
    KKK,
    /// shear
    GGG,
}

impl TripleKind {
    pub fn name(&self) -> &'static str {
        match self {
            TripleKind::NNN => "NNN",
            TripleKind::KKK => "KKK",
            TripleKind::GGG => "GGG",
        }
    }

    fn value_kind(&self) -> ValueKind {
        match self {
            TripleKind::NNN => ValueKind::Count,
            TripleKind::KKK => ValueKind::Scalar,
            TripleKind::GGG => ValueKind::Shear,
        }
    }

    fn check_catalog(&self, cat: &PointSet) -> Result<(), Error> {
        match self {
            TripleKind::NNN => Ok(()),
            TripleKind::KKK if cat.kind() == ValueKind::Scalar => Ok(()),
            TripleKind::KKK => Err(Error::parameter("catalog", "KKK correlations need scalar (k) values")),
            TripleKind::GGG if cat.kind() != ValueKind::Shear => {
                Err(Error::parameter("catalog", "GGG correlations need shear (g1, g2) values"))
            }
            TripleKind::GGG if cat.coords() != Coords::Flat => Err(Error::metric_coords(
                "GGG correlations are only supported for flat coordinates",
            )),
            TripleKind::GGG => Ok(()),
        }
    }
}

impl FromStr for TripleKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NNN" => Ok(TripleKind::NNN),
            "KKK" => Ok(TripleKind::KKK),
            "GGG" => Ok(TripleKind::GGG),
            _ => Err(Error::choice("correlation kind", s, &["NNN", "KKK", "GGG"])),
        }
    }
}

impl fmt::Display for TripleKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which triangles of a multi-catalog calculation end up in which output
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Routing {
    /// every triangle, in a single output
    Unordered,
    /// only triangles whose vertex k comes from catalog k
    Ordered,
    /// 6 outputs, one per assignment of catalogs to the sorted vertices
    Permutations,
}

const GAM_COLUMNS: [&str; 8] = ["gam0r", "gam0i", "gam1r", "gam1i", "gam2r", "gam2i", "gam3r", "gam3i"];
const VARGAM_COLUMNS: [&str; 4] = ["vargam0", "vargam1", "vargam2", "vargam3"];
const EXTRA_COLUMNS: &[&str] = &[
    "r_nom", "u_nom", "v_nom", "d2_nom", "d3_nom", "phi_nom", "zeta", "varzeta", "vargam0",
    "vargam1", "vargam2", "vargam3",
];

fn ln_or_zero(x: f64) -> f64 {
    if x > 0.0 { x.ln() } else { 0.0 }
}

fn sum_slots(slots: &[Vec<f64>], len: usize) -> Vec<f64> {
    let mut out = vec![0.0; len];
    for slot in slots {
        add_assign(&mut out, slot);
    }
    out
}

/// Fold the 6 permutation slots of a triangle with 1 vertex from catalog 1
/// and 2 from catalog 2 into 3 slots: the sorted position of the catalog-1
/// vertex.
fn fold_cross12(slots: &[Vec<f64>], len: usize) -> Vec<Vec<f64>> {
    [[0, 1], [2, 4], [3, 5]]
        .iter()
        .map(|idx| {
            let picked: Vec<Vec<f64>> = idx.iter().filter_map(|&i| slots.get(i).cloned()).collect();
            sum_slots(&picked, len)
        })
        .collect()
}

/// the correlations an NNN estimator was computed from
#[derive(Clone, Debug)]
struct NnnInputs {
    rrr: Corr3,
    drr: Option<Corr3>,
    rdd: Option<Corr3>,
}

/// A 3-point correlation function
#[derive(Clone, Debug)]
pub struct Corr3 {
    config: Corr3Config,
    kind: TripleKind,
    reducer: TripleReducer,
    coords: Option<Coords>,
    statepack: Vec<f64>,
    tot: f64,
    results: Option<PatchResults>,
    var_num: f64,
    columns: HashMap<&'static str, Vec<f64>>,
    estimator: Option<Box<NnnInputs>>,
    cov: Option<Array2<f64>>,
}

impl Corr3 {
    pub fn new(config: Corr3Config, kind: TripleKind) -> Result<Self, Error> {
        let shape = match config.binning() {
            TriangleBinning::Ruv { .. } => TriangleShape::Ruv,
            TriangleBinning::Sas { .. } => TriangleShape::Sas,
        };
        let reducer = TripleReducer::new(kind.value_kind(), shape);
        let statepack = vec![0.0; config.n_bins_total() * reducer.accum_state_size()];
        let mut out = Corr3 {
            config,
            kind,
            reducer,
            coords: None,
            statepack,
            tot: 0.0,
            results: None,
            var_num: 0.0,
            columns: HashMap::new(),
            estimator: None,
            cov: None,
        };
        out.refresh()?;
        Ok(out)
    }

    pub fn kind(&self) -> TripleKind {
        self.kind
    }

    pub fn config(&self) -> &Corr3Config {
        &self.config
    }

    pub fn coords(&self) -> Option<Coords> {
        self.coords
    }

    /// the total weight product of every triangle that could have been
    /// formed
    pub fn tot(&self) -> f64 {
        self.tot
    }

    /// Compute the correlation of 1, 2 or 3 catalogs, replacing any previous
    /// result.
    pub fn process(&mut self, cats: &[&PointSet]) -> Result<(), Error> {
        self.process_with(cats, &ProcessOptions::default())
    }

    pub fn process_with(&mut self, cats: &[&PointSet], opts: &ProcessOptions) -> Result<(), Error> {
        let routing = if opts.ordered { Routing::Ordered } else { Routing::Unordered };
        let (mut results, coords) = self.run_jobs(cats, opts, routing)?;
        let results = results.pop().ok_or(Error::internal("missing triangle results"))?;
        self.clear()?;
        self.absorb(results, coords)?;
        self.finish(cats)
    }

    /// Compute the correlation of 3 catalogs once per assignment of the
    /// catalogs to the sorted triangle vertices. The 6 results are in the
    /// order `[123, 132, 213, 231, 312, 321]`, where `213` holds the
    /// triangles with vertex 1 from catalog 2, vertex 2 from catalog 1 and
    /// vertex 3 from catalog 3.
    pub fn process_cross_permutations(
        &self,
        cat1: &PointSet,
        cat2: &PointSet,
        cat3: &PointSet,
        opts: &ProcessOptions,
    ) -> Result<Vec<Corr3>, Error> {
        let cats = [cat1, cat2, cat3];
        let (results, coords) = self.run_jobs(&cats, opts, Routing::Permutations)?;
        results
            .into_iter()
            .map(|r| {
                let mut corr = Corr3::new(self.config.clone(), self.kind)?;
                corr.absorb(r, coords)?;
                corr.finish(&cats)?;
                Ok(corr)
            })
            .collect()
    }

    /// Add the triangles of `cat` to the current sums. Call
    /// [`Corr3::finalize`] to set the shot noise afterwards.
    pub fn process_auto(&mut self, cat: &PointSet) -> Result<(), Error> {
        self.accumulate(&[cat])
    }

    /// Add the triangles with 1 vertex from `cat1` and 2 from `cat2`
    pub fn process_cross12(&mut self, cat1: &PointSet, cat2: &PointSet) -> Result<(), Error> {
        self.accumulate(&[cat1, cat2])
    }

    /// Add the triangles with 1 vertex from each catalog
    pub fn process_cross(&mut self, cat1: &PointSet, cat2: &PointSet, cat3: &PointSet) -> Result<(), Error> {
        self.accumulate(&[cat1, cat2, cat3])
    }

    /// set the shot-noise variance from the value variances of the 3
    /// catalogs (ignored for NNN)
    pub fn finalize(&mut self, var1: f64, var2: f64, var3: f64) -> Result<(), Error> {
        self.var_num = match self.kind {
            TripleKind::NNN => 0.0,
            _ => var1 * var2 * var3,
        };
        self.refresh()
    }

    fn accumulate(&mut self, cats: &[&PointSet]) -> Result<(), Error> {
        let (mut results, coords) = self.run_jobs(cats, &ProcessOptions::default(), Routing::Unordered)?;
        let results = results.pop().ok_or(Error::internal("missing triangle results"))?;
        self.absorb(results, coords)?;
        self.refresh()
    }

    /// set the shot noise from the catalogs and derive the columns (and the
    /// covariance, for resampling methods)
    fn finish(&mut self, cats: &[&PointSet]) -> Result<(), Error> {
        let kind = self.kind;
        let var = |k: usize| {
            let cat = cats[k.min(cats.len() - 1)];
            match kind {
                TripleKind::GGG => cat.varg(),
                _ => cat.vark(),
            }
        };
        self.var_num = match (self.kind, cats.len()) {
            (TripleKind::NNN, _) => 0.0,
            (_, 1) => var(0).powi(3),
            (_, 2) => var(0) * var(1) * var(1),
            _ => var(0) * var(1) * var(2),
        };
        self.refresh()?;
        if self.kind != TripleKind::NNN && self.config.common().var_method() != VarMethod::Shot {
            self.update_cov()?;
        }
        Ok(())
    }

    /// Traverse every patch combination of the catalogs. Returns 1 result
    /// set (6 for [`Routing::Permutations`]) and the coordinate system.
    fn run_jobs(
        &self,
        cats: &[&PointSet],
        opts: &ProcessOptions,
        routing: Routing,
    ) -> Result<(Vec<PatchResults>, Coords), Error> {
        if cats.is_empty() || cats.len() > 3 {
            return Err(Error::parameter(
                "catalogs",
                format!("a 3-point correlation takes 1 to 3 catalogs, got {}", cats.len()),
            ));
        }
        if routing == Routing::Permutations && cats.len() != 3 {
            return Err(Error::parameter("catalogs", "permutations need 3 catalogs"));
        }
        let common = self.config.common();
        let coords = cats[0].coords();
        if cats.iter().any(|c| c.coords() != coords) {
            return Err(Error::metric_coords("the catalogs use different coordinate systems"));
        }
        for cat in cats {
            self.kind.check_catalog(cat)?;
        }
        let metric = Metric::new(common, coords, true)?;
        let setup = TripleSetup::new(&self.config, &metric, coords, self.kind.value_kind())?;
        let npatch: Vec<usize> = cats.iter().map(|c| c.npatch()).collect();
        common_npatch(&npatch)?;
        let key_npatch = match npatch.as_slice() {
            [n] => vec![*n; 3],
            [n1, n2] => vec![*n1, *n2, *n2],
            _ => npatch.clone(),
        };

        let geo: Vec<PatchGeometry> = cats
            .iter()
            .map(|c| PatchGeometry::new(c, metric.is_angular()))
            .collect();
        let geo: Vec<&PatchGeometry> = geo.iter().collect();
        let jobs = triple_jobs(&geo, &metric, setup.space.sep.max_sep);
        let n_threads = common.num_threads();
        let workers = Workers::new(n_threads)?;
        log::info!(
            "{} correlation of {} catalogs: {} patch combinations on {n_threads} threads",
            self.kind,
            cats.len(),
            jobs.len()
        );

        let n_cats = cats.len();
        let block = setup.block_len();
        let n_out = if routing == Routing::Permutations { 6 } else { 1 };
        let mut cache = FieldCache::new(cats.to_vec(), setup.field_opts(common, &metric), opts.low_mem);
        let mut results = vec![PatchResults::new(key_npatch); n_out];
        run_patch_jobs(&jobs, &mut cache, opts.comm, &mut results, |job, f| {
            let slots = match (n_cats, job.kind) {
                (_, JobKind::Auto) => vec![setup.process_auto(&metric, f[0], &workers)?],
                (_, JobKind::Cross12) => setup.process_cross12(&metric, f[0], f[1], &workers)?,
                (2, JobKind::Cross) => {
                    fold_cross12(&setup.process_cross(&metric, [f[0], f[1], f[2]], &workers)?, block)
                }
                (_, JobKind::Cross) => setup.process_cross(&metric, [f[0], f[1], f[2]], &workers)?,
            };
            Ok(match routing {
                Routing::Permutations => slots,
                Routing::Ordered if n_cats > 1 => slots.into_iter().take(1).collect(),
                _ => vec![sum_slots(&slots, block)],
            })
        })?;
        log::debug!("built {} patch fields more than once", cache.n_rebuilds());
        Ok((results, coords))
    }

    /// add a set of patch results to the sums
    fn absorb(&mut self, results: PatchResults, coords: Coords) -> Result<(), Error> {
        match self.coords {
            Some(prev) if prev != coords => log::warn!(
                "accumulating {coords} catalogs into a correlation of {prev} catalogs"
            ),
            _ => {}
        }
        self.coords = Some(coords);
        let (data, tot) = results.sum(self.statepack.len());
        add_assign(&mut self.statepack, &data);
        self.tot += tot;
        if results.npatch().iter().any(|&n| n > 1) {
            if let Some(existing) = self.results.as_mut() {
                existing.merge(results)?;
            } else {
                self.results = Some(results);
            }
        }
        Ok(())
    }

    fn weight_register(&self) -> &[f64] {
        let n = self.config.n_bins_total();
        &self.statepack[TripleReducer::WEIGHT * n..(TripleReducer::WEIGHT + 1) * n]
    }

    /// nominal `[d1, d2, d3]` of every bin
    fn nominal_sides(&self, nominal: &[Vec<f64>; 3]) -> [Vec<f64>; 3] {
        let n = nominal[0].len();
        let mut sides = [vec![0.0; n], vec![0.0; n], vec![0.0; n]];
        for i in 0..n {
            let (a, b, c) = (nominal[0][i], nominal[1][i], nominal[2][i]);
            let [d1, d2, d3] = match self.config.binning() {
                TriangleBinning::Ruv { .. } => {
                    let d3 = b * a;
                    [c.abs() * d3 + a, a, d3]
                }
                TriangleBinning::Sas { .. } => [(a * a + b * b - 2.0 * a * b * c.cos()).max(0.0).sqrt(), a, b],
            };
            sides[0][i] = d1;
            sides[1][i] = d2;
            sides[2][i] = d3;
        }
        sides
    }

    fn refresh(&mut self) -> Result<(), Error> {
        let n = self.config.n_bins_total();
        let mut columns: HashMap<&'static str, Vec<f64>> =
            outputs_from_statepack(&self.reducer, n, &self.statepack)?
                .into_iter()
                .collect();
        let weight = self.weight_register().to_vec();
        let nominal = self.config.binning().nominal();
        let sides = self.nominal_sides(&nominal);

        for (name, col) in columns.iter_mut() {
            for (i, val) in col.iter_mut().enumerate() {
                if weight[i] != 0.0 {
                    continue;
                }
                *val = match *name {
                    "ntri" | "weight" => *val,
                    "meand1" => sides[0][i],
                    "meand2" => sides[1][i],
                    "meand3" => sides[2][i],
                    "meanlogd1" => ln_or_zero(sides[0][i]),
                    "meanlogd2" => ln_or_zero(sides[1][i]),
                    "meanlogd3" => ln_or_zero(sides[2][i]),
                    "meanu" => nominal[1][i],
                    "meanv" | "meanphi" => nominal[2][i],
                    _ => 0.0,
                };
            }
        }

        let shot: Vec<f64> = weight
            .iter()
            .map(|&w| if w > 0.0 { self.var_num / w } else { 0.0 })
            .collect();
        match self.kind {
            TripleKind::NNN => {}
            TripleKind::KKK => {
                columns.insert("varzeta", shot);
            }
            TripleKind::GGG => {
                for name in VARGAM_COLUMNS {
                    columns.insert(name, shot.clone());
                }
            }
        }
        let nominal_names = match self.config.bin_type() {
            TriangleBinType::LogRUV => ["r_nom", "u_nom", "v_nom"],
            TriangleBinType::LogSAS => ["d2_nom", "d3_nom", "phi_nom"],
        };
        for (name, values) in nominal_names.into_iter().zip(nominal) {
            columns.insert(name, values);
        }

        self.columns = columns;
        self.estimator = None;
        self.cov = None;
        Ok(())
    }

    /// a named column (empty if this kind of correlation doesn't have it)
    pub fn column(&self, name: &str) -> &[f64] {
        self.columns.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn columns(&self) -> HashMap<&'static str, Vec<f64>> {
        self.columns.clone()
    }

    pub fn ntri(&self) -> &[f64] {
        self.column("ntri")
    }

    pub fn weight(&self) -> &[f64] {
        self.column("weight")
    }

    /// `[meand1, meand2, meand3]`
    pub fn meand(&self) -> [&[f64]; 3] {
        ["meand1", "meand2", "meand3"].map(|name| self.column(name))
    }

    pub fn meanlogd(&self) -> [&[f64]; 3] {
        ["meanlogd1", "meanlogd2", "meanlogd3"].map(|name| self.column(name))
    }

    /// `<w k k k>/<w>` for KKK, the result of [`Corr3::calculate_zeta`] for
    /// NNN (empty before that)
    pub fn zeta(&self) -> &[f64] {
        self.column("zeta")
    }

    pub fn varzeta(&self) -> &[f64] {
        self.column("varzeta")
    }

    /// the 4 natural components of a GGG correlation, as `(real, imag)`
    pub fn gam(&self) -> [(&[f64], &[f64]); 4] {
        [0, 1, 2, 3].map(|k| (self.column(GAM_COLUMNS[2 * k]), self.column(GAM_COLUMNS[2 * k + 1])))
    }

    /// the variance of each of the 4 natural components of a GGG correlation
    pub fn vargam(&self) -> [&[f64]; 4] {
        VARGAM_COLUMNS.map(|name| self.column(name))
    }

    pub fn cov(&self) -> Option<&Array2<f64>> {
        self.cov.as_ref()
    }

    /// flat index of the bin at `[ir, iu, iv]` (LogRUV) or `[id2, id3, iphi]`
    /// (LogSAS)
    pub fn bin_index(&self, coord: &[usize]) -> Option<usize> {
        flat_bin_index(&self.config.shape(), coord)
    }

    /// the statistic the covariance describes: `zeta` for NNN and KKK; the
    /// real and imaginary parts of the 4 components for GGG
    pub fn stat(&self) -> Vec<f64> {
        match self.kind {
            TripleKind::GGG => GAM_COLUMNS.iter().flat_map(|name| self.column(name).to_vec()).collect(),
            _ => self.zeta().to_vec(),
        }
    }

    pub(crate) fn shot_variance(&self) -> Result<Vec<f64>, Error> {
        match self.kind {
            // split evenly between the real and imaginary parts
            TripleKind::GGG => Ok(VARGAM_COLUMNS
                .iter()
                .flat_map(|name| {
                    let half: Vec<f64> = self.column(name).iter().map(|v| 0.5 * v).collect();
                    [half.clone(), half]
                })
                .flatten()
                .collect()),
            TripleKind::NNN if self.varzeta().is_empty() => {
                Err(Error::covariance("call calculate_zeta before asking for the NNN variance"))
            }
            _ => Ok(self.varzeta().to_vec()),
        }
    }

    pub(crate) fn patch_results(&self) -> Option<&PatchResults> {
        self.results.as_ref()
    }

    pub(crate) fn total_weight(&self) -> f64 {
        self.weight_register().iter().sum()
    }

    pub(crate) fn resampled(&self, sel: &Selection) -> Result<Corr3, Error> {
        let mut out = Corr3 {
            config: self.config.clone(),
            kind: self.kind,
            reducer: self.reducer,
            coords: self.coords,
            statepack: self.statepack.clone(),
            tot: self.tot,
            results: None,
            var_num: self.var_num,
            columns: HashMap::new(),
            estimator: None,
            cov: None,
        };
        if let Some(results) = &self.results {
            let npatch = results.npatch().to_vec();
            let (data, tot) = results.sum_weighted(self.statepack.len(), |key| sel.weight(&npatch, key));
            out.statepack = data;
            out.tot = tot;
        }
        out.refresh()?;
        if let Some(inputs) = &self.estimator {
            let rrr = inputs.rrr.resampled(sel)?;
            let drr = inputs.drr.as_ref().map(|c| c.resampled(sel)).transpose()?;
            let rdd = inputs.rdd.as_ref().map(|c| c.resampled(sel)).transpose()?;
            let (zeta, varzeta) = out.zeta_from(&rrr, drr.as_ref().zip(rdd.as_ref()));
            out.columns.insert("zeta", zeta);
            out.columns.insert("varzeta", varzeta);
        }
        Ok(out)
    }

    /// Compute the NNN estimator from the random triangles `rrr`, and
    /// optionally `drr` (1 data vertex, 2 random) and `rdd` (1 random
    /// vertex, 2 data): `(DDD - RDD + DRR - RRR)/RRR`, every term normalized
    /// by its `tot`. Without `drr` and `rdd` this is `DDD/RRR - 1`.
    ///
    /// Returns `(zeta, varzeta)`.
    pub fn calculate_zeta(
        &mut self,
        rrr: &Corr3,
        drr: Option<&Corr3>,
        rdd: Option<&Corr3>,
    ) -> Result<(Vec<f64>, Vec<f64>), Error> {
        if drr.is_some() != rdd.is_some() {
            return Err(Error::parameter("drr", "drr and rdd must be given together"));
        }
        for (name, other) in [("rrr", Some(rrr)), ("drr", drr), ("rdd", rdd)] {
            let Some(other) = other else { continue };
            if self.kind != TripleKind::NNN || other.kind != TripleKind::NNN {
                return Err(Error::parameter(name, "calculate_zeta requires NNN correlations"));
            }
            self.check_binning(other)?;
            if other.tot == 0.0 {
                return Err(Error::parameter(name, "the correlation has not been processed"));
            }
        }
        let (zeta, varzeta) = self.zeta_from(rrr, drr.zip(rdd));
        self.columns.insert("zeta", zeta.clone());
        self.columns.insert("varzeta", varzeta.clone());
        self.estimator = Some(Box::new(NnnInputs {
            rrr: rrr.clone(),
            drr: drr.cloned(),
            rdd: rdd.cloned(),
        }));
        if self.config.common().var_method() != VarMethod::Shot {
            self.update_cov()?;
            return Ok((zeta, self.varzeta().to_vec()));
        }
        Ok((zeta, varzeta))
    }

    fn zeta_from(&self, rrr: &Corr3, cross: Option<(&Corr3, &Corr3)>) -> (Vec<f64>, Vec<f64>) {
        let scaled = |c: &Corr3| -> Vec<f64> {
            let w = if c.tot != 0.0 { self.tot / c.tot } else { 0.0 };
            c.weight_register().iter().map(|x| x * w).collect()
        };
        let rrrw = scaled(rrr);
        let cross = cross.map(|(drr, rdd)| (scaled(drr), scaled(rdd)));
        let ddd = self.weight_register();
        let mut zeta = vec![0.0; ddd.len()];
        let mut varzeta = vec![0.0; ddd.len()];
        for i in 0..ddd.len() {
            if rrrw[i] <= 0.0 {
                continue;
            }
            let num = match &cross {
                Some((drr, rdd)) => ddd[i] - rdd[i] + drr[i] - rrrw[i],
                None => ddd[i] - rrrw[i],
            };
            zeta[i] = num / rrrw[i];
            varzeta[i] = 1.0 / rrrw[i];
        }
        (zeta, varzeta)
    }

    /// estimate the covariance of [`Corr3::stat`] with `method`
    pub fn estimate_cov(&self, method: VarMethod) -> Result<Array2<f64>, Error> {
        if self.kind == TripleKind::NNN && self.zeta().is_empty() {
            return Err(Error::covariance("call calculate_zeta before estimating the NNN covariance"));
        }
        estimate_multi_cov(&[CorrRef::Three(self)], method, |corrs| corrs[0].stat())
    }

    fn update_cov(&mut self) -> Result<(), Error> {
        let cov = self.estimate_cov(self.config.common().var_method())?;
        let diag = cov.diag().to_vec();
        let n = self.config.n_bins_total();
        match self.kind {
            TripleKind::GGG => {
                for (k, name) in VARGAM_COLUMNS.iter().enumerate() {
                    let re = &diag[2 * k * n..(2 * k + 1) * n];
                    let im = &diag[(2 * k + 1) * n..(2 * k + 2) * n];
                    self.columns.insert(name, re.iter().zip(im).map(|(a, b)| a + b).collect());
                }
            }
            _ => {
                self.columns.insert("varzeta", diag);
            }
        }
        self.cov = Some(cov);
        Ok(())
    }

    fn check_binning(&self, other: &Corr3) -> Result<(), Error> {
        let (a, b) = (&self.config, &other.config);
        if a.binning() != b.binning() || a.common().sep_units() != b.common().sep_units() {
            return Err(Error::incompatible(format!(
                "binning differs: {} [{}, {}) x {} vs {} [{}, {}) x {}",
                a.bin_type(),
                a.min_sep(),
                a.max_sep(),
                a.nbins(),
                b.bin_type(),
                b.min_sep(),
                b.max_sep(),
                b.nbins()
            )));
        }
        Ok(())
    }

    /// `self += other`. Fails when the binning or the kind differ; a
    /// different metric or coordinate system is only logged.
    pub fn try_add_assign(&mut self, other: &Corr3) -> Result<(), Error> {
        if self.kind != other.kind {
            return Err(Error::incompatible(format!(
                "can't add a {} correlation to a {} correlation",
                other.kind, self.kind
            )));
        }
        self.check_binning(other)?;
        if self.config.common().metric() != other.config.common().metric() {
            log::warn!(
                "adding a correlation computed with the {} metric to one computed with the {} metric",
                other.config.common().metric(),
                self.config.common().metric()
            );
        }
        match (self.coords, other.coords) {
            (Some(a), Some(b)) if a != b => {
                log::warn!("adding a correlation of {b} catalogs to one of {a} catalogs")
            }
            (None, b) => self.coords = b,
            _ => {}
        }
        add_assign(&mut self.statepack, &other.statepack);
        self.tot += other.tot;
        if let Some(theirs) = &other.results {
            if let Some(mine) = self.results.as_mut() {
                mine.merge(theirs.clone())?;
            } else {
                self.results = Some(theirs.clone());
            }
        }
        self.refresh()
    }

    /// reset every sum (and the patch results)
    pub fn clear(&mut self) -> Result<(), Error> {
        self.statepack.iter_mut().for_each(|x| *x = 0.0);
        self.tot = 0.0;
        self.results = None;
        self.coords = None;
        self.var_num = 0.0;
        self.refresh()
    }

    fn meta(&self) -> TableMeta {
        let c = &self.config;
        let mut shape_axes = BTreeMap::new();
        let mut put = |prefix: &str, axis: &ShapeAxis| {
            shape_axes.insert(format!("min_{prefix}"), axis.min());
            shape_axes.insert(format!("max_{prefix}"), axis.max());
            shape_axes.insert(format!("n{prefix}bins"), axis.nbins() as f64);
            shape_axes.insert(format!("{prefix}bin_size"), axis.bin_size());
        };
        match c.binning() {
            TriangleBinning::Ruv { u, v, .. } => {
                put("u", u);
                put("v", v);
            }
            TriangleBinning::Sas { phi, .. } => put("phi", phi),
        }
        TableMeta {
            kind: self.kind.name().to_string(),
            bin_type: c.bin_type().name().to_string(),
            metric: c.common().metric().name().to_string(),
            coords: self.coords.map(|x| x.name().to_string()),
            sep_units: c.common().sep_units().map(|x| x.name().to_string()),
            nbins: c.nbins(),
            min_sep: c.min_sep(),
            max_sep: c.max_sep(),
            bin_size: c.bin_size(),
            bin_slop: c.common().bin_slop(),
            tot: self.tot,
            shape: c.shape(),
            shape_axes,
        }
    }

    pub fn write(&self, sink: &mut impl ResultSink) -> Result<(), Error> {
        let table = ResultTable {
            columns: self
                .columns
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            meta: self.meta(),
        };
        sink.write_table(&table)
    }

    /// Replace the contents with a table written by [`Corr3::write`]. The
    /// binning and kind of the table must match.
    pub fn read(&mut self, source: &mut impl ResultSource) -> Result<(), Error> {
        let table = source.read_table()?;
        let mine = self.meta();
        let meta = &table.meta;
        if meta.kind != mine.kind
            || meta.bin_type != mine.bin_type
            || meta.nbins != mine.nbins
            || meta.min_sep != mine.min_sep
            || meta.max_sep != mine.max_sep
            || meta.bin_size != mine.bin_size
            || meta.sep_units != mine.sep_units
            || meta.shape_axes != mine.shape_axes
        {
            return Err(Error::incompatible(format!(
                "the table holds a {} {} correlation with {} bins in [{}, {}), expected {} {} with {} bins in [{}, {})",
                meta.kind,
                meta.bin_type,
                meta.nbins,
                meta.min_sep,
                meta.max_sep,
                mine.kind,
                mine.bin_type,
                mine.nbins,
                mine.min_sep,
                mine.max_sep
            )));
        }
        if meta.metric != mine.metric {
            log::warn!("reading a {} correlation into a {} correlation", meta.metric, mine.metric);
        }
        let coords = meta.coords.as_deref().map(|c| c.parse::<Coords>()).transpose()?;

        let names = self.reducer.output_descr().names();
        let mut columns = HashMap::new();
        for (name, col) in table.columns {
            let key = static_name(&name, &[names, EXTRA_COLUMNS])
                .ok_or_else(|| Error::serialization(format!("unknown column {name}")))?;
            columns.insert(key, col);
        }
        let statepack = statepack_from_outputs(&self.reducer, self.config.n_bins_total(), &columns)?;

        self.clear()?;
        self.statepack = statepack;
        self.tot = meta.tot;
        self.coords = coords;
        self.columns = columns;
        Ok(())
    }
}
