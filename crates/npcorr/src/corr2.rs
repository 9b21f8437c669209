//! 2-point correlation functions.
//!
//! A [`Corr2`] accumulates pair statistics over one catalog (an
//! auto-correlation) or two catalogs (a cross-correlation). The raw sums
//! live in a statepack; the user-facing columns (`npairs`, `meanr`, `xi`,
//! ...) are derived from it whenever it changes.
//!
//! When the catalogs carry patches, every patch pair is traversed on its own
//! and its contribution is kept so that the resampling covariance
//! estimators can recombine them.

use crate::catalog::PointSet;
use crate::columns::{add_assign, outputs_from_statepack, statepack_from_outputs};
use crate::config::{BinType, Coords, Corr2Config, MetricKind, VarMethod};
use crate::covariance::{CorrRef, Selection, estimate_multi_cov};
use crate::error::Error;
use crate::executor::Workers;
use crate::io::{ResultSink, ResultSource, ResultTable, TableMeta, static_name};
use crate::metric::Metric;
use crate::patch::{
    FieldCache, JobKind, PatchGeometry, PatchResults, ProcessOptions, common_npatch, pair_jobs,
    run_patch_jobs,
};
use crate::twopoint::PairSetup;
use ndarray::Array2;
use npcorr_nostd_internal::{PairReducer, Reducer, ValueKind, flat_bin_index};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The values that are correlated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PairKind {
    /// counts (weights only)
    NN,
    /// scalar-scalar
    KK,
    /// shear-shear
    GG,
}

impl PairKind {
    pub fn name(&self) -> &'static str {
        match self {
            PairKind::NN => "NN",
            PairKind::KK => "KK",
            PairKind::GG => "GG",
        }
    }

    fn value_kind(&self) -> ValueKind {
        match self {
            PairKind::NN => ValueKind::Count,
            PairKind::KK => ValueKind::Scalar,
            PairKind::GG => ValueKind::Shear,
        }
    }

    fn check_catalog(&self, cat: &PointSet) -> Result<(), Error> {
        match self {
            PairKind::NN => Ok(()),
            PairKind::KK if cat.kind() == ValueKind::Scalar => Ok(()),
            PairKind::KK => Err(Error::parameter("catalog", "KK correlations need scalar (k) values")),
            PairKind::GG if cat.kind() != ValueKind::Shear => {
                Err(Error::parameter("catalog", "GG correlations need shear (g1, g2) values"))
            }
            PairKind::GG if cat.coords() != Coords::Flat => Err(Error::metric_coords(
                "GG correlations are only supported for flat coordinates",
            )),
            PairKind::GG => Ok(()),
        }
    }
}

impl FromStr for PairKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NN" => Ok(PairKind::NN),
            "KK" => Ok(PairKind::KK),
            "GG" => Ok(PairKind::GG),
            _ => Err(Error::choice("correlation kind", s, &["NN", "KK", "GG"])),
        }
    }
}

impl fmt::Display for PairKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// the correlations an NN estimator was computed from
#[derive(Clone, Debug)]
struct NnInputs {
    rr: Corr2,
    dr: Option<Corr2>,
    rd: Option<Corr2>,
}

const EXTRA_COLUMNS: &[&str] = &["r_nom", "x_nom", "y_nom", "xi", "varxi", "varxip", "varxim"];

/// A 2-point correlation function
#[derive(Clone, Debug)]
pub struct Corr2 {
    config: Corr2Config,
    kind: PairKind,
    reducer: PairReducer,
    /// coordinate system of the processed catalogs
    coords: Option<Coords>,
    statepack: Vec<f64>,
    tot: f64,
    /// per patch pair contributions (only when processed with patches)
    results: Option<PatchResults>,
    /// numerator of the shot-noise variance
    var_num: f64,
    columns: HashMap<&'static str, Vec<f64>>,
    estimator: Option<Box<NnInputs>>,
    cov: Option<Array2<f64>>,
}

impl Corr2 {
    pub fn new(config: Corr2Config, kind: PairKind) -> Result<Self, Error> {
        let reducer = PairReducer::new(kind.value_kind());
        let statepack = vec![0.0; config.n_bins_total() * reducer.accum_state_size()];
        let mut out = Corr2 {
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

    pub fn kind(&self) -> PairKind {
        self.kind
    }

    pub fn config(&self) -> &Corr2Config {
        &self.config
    }

    /// the coordinate system of the processed catalogs
    pub fn coords(&self) -> Option<Coords> {
        self.coords
    }

    /// the normalization: the total weight product of every pair that could
    /// have been formed
    pub fn tot(&self) -> f64 {
        self.tot
    }

    /// Compute the correlation of `cat1` with itself (`cat2 = None`) or with
    /// `cat2`, replacing any previous result.
    pub fn process(&mut self, cat1: &PointSet, cat2: Option<&PointSet>) -> Result<(), Error> {
        self.process_with(cat1, cat2, &ProcessOptions::default())
    }

    pub fn process_with(
        &mut self,
        cat1: &PointSet,
        cat2: Option<&PointSet>,
        opts: &ProcessOptions,
    ) -> Result<(), Error> {
        self.clear()?;
        let cats: Vec<&PointSet> = match cat2 {
            Some(cat2) => vec![cat1, cat2],
            None => vec![cat1],
        };
        self.accumulate(&cats, opts)?;
        let other = cat2.unwrap_or(cat1);
        self.var_num = match self.kind {
            PairKind::NN => 0.0,
            PairKind::KK => cat1.vark() * other.vark(),
            PairKind::GG => 2.0 * cat1.varg() * other.varg(),
        };
        self.refresh()?;
        if self.kind != PairKind::NN && self.config.common().var_method() != VarMethod::Shot {
            self.update_cov()?;
        }
        Ok(())
    }

    /// Add the pairs of `cat` to the current sums. Call [`Corr2::finalize`]
    /// to set the shot noise once everything is accumulated.
    pub fn process_auto(&mut self, cat: &PointSet) -> Result<(), Error> {
        self.accumulate(&[cat], &ProcessOptions::default())?;
        self.refresh()
    }

    /// Add the pairs between `cat1` and `cat2` to the current sums
    pub fn process_cross(&mut self, cat1: &PointSet, cat2: &PointSet) -> Result<(), Error> {
        self.accumulate(&[cat1, cat2], &ProcessOptions::default())?;
        self.refresh()
    }

    /// set the shot-noise variance from the value variances of the two
    /// catalogs (ignored for NN)
    pub fn finalize(&mut self, var1: f64, var2: f64) -> Result<(), Error> {
        self.var_num = match self.kind {
            PairKind::NN => 0.0,
            PairKind::KK => var1 * var2,
            PairKind::GG => 2.0 * var1 * var2,
        };
        self.refresh()
    }

    fn accumulate(&mut self, cats: &[&PointSet], opts: &ProcessOptions) -> Result<(), Error> {
        let common = self.config.common();
        let coords = cats[0].coords();
        if cats.iter().any(|c| c.coords() != coords) {
            return Err(Error::metric_coords("the catalogs use different coordinate systems"));
        }
        for cat in cats {
            self.kind.check_catalog(cat)?;
        }
        let metric = Metric::new(common, coords, false)?;
        let setup = PairSetup::new(&self.config, coords, self.kind.value_kind())?;
        let npatch: Vec<usize> = cats.iter().map(|c| c.npatch()).collect();
        common_npatch(&npatch)?;
        let key_npatch = if cats.len() == 1 { vec![npatch[0]; 2] } else { npatch.clone() };

        match self.coords {
            Some(prev) if prev != coords => log::warn!(
                "accumulating {coords} catalogs into a correlation of {prev} catalogs"
            ),
            _ => {}
        }
        self.coords = Some(coords);

        let geo: Vec<PatchGeometry> = cats
            .iter()
            .map(|c| PatchGeometry::new(c, metric.is_angular()))
            .collect();
        let geo: Vec<&PatchGeometry> = geo.iter().collect();
        let reach = if setup.twod {
            std::f64::consts::SQRT_2 * setup.space.max_sep
        } else {
            setup.space.max_sep
        };
        let jobs = pair_jobs(&geo, &metric, reach);
        let n_threads = common.num_threads();
        let workers = Workers::new(n_threads)?;
        log::info!(
            "{} correlation: {} patch combinations on {n_threads} threads",
            self.kind,
            jobs.len()
        );

        let mut cache = FieldCache::new(cats.to_vec(), setup.field_opts(common, &metric), opts.low_mem);
        let mut results = vec![PatchResults::new(key_npatch)];
        run_patch_jobs(&jobs, &mut cache, opts.comm, &mut results, |job, fields| {
            let buf = match job.kind {
                JobKind::Auto => setup.process_auto(&metric, fields[0], &workers)?,
                _ => setup.process_cross(&metric, fields[0], fields[1], &workers)?,
            };
            Ok(vec![buf])
        })?;
        let results = results
            .pop()
            .ok_or(Error::internal("missing pair results"))?;

        let (data, tot) = results.sum(self.statepack.len());
        setup.merge_into(&mut self.statepack, &data)?;
        self.tot += tot;
        if npatch.iter().any(|&n| n > 1) {
            if let Some(existing) = self.results.as_mut() {
                existing.merge(results)?;
            } else {
                self.results = Some(results);
            }
        }
        Ok(())
    }

    /// recompute the columns from the statepack
    fn refresh(&mut self) -> Result<(), Error> {
        let n = self.config.n_bins_total();
        let mut columns: HashMap<&'static str, Vec<f64>> =
            outputs_from_statepack(&self.reducer, n, &self.statepack)?
                .into_iter()
                .collect();
        let weight = self.weight_register().to_vec();
        let rnom = self.rnom();

        // empty bins get nominal separations and a zero estimator
        for (name, col) in columns.iter_mut() {
            for (i, val) in col.iter_mut().enumerate() {
                if weight[i] != 0.0 {
                    continue;
                }
                *val = match *name {
                    "npairs" | "weight" => *val,
                    "meanr" => rnom[i],
                    "meanlogr" if rnom[i] > 0.0 => rnom[i].ln(),
                    _ => 0.0,
                };
            }
        }

        let shot: Vec<f64> = weight
            .iter()
            .map(|&w| if w > 0.0 { self.var_num / w } else { 0.0 })
            .collect();
        match self.kind {
            PairKind::NN => {}
            PairKind::KK => {
                columns.insert("varxi", shot);
            }
            PairKind::GG => {
                columns.insert("varxip", shot.clone());
                columns.insert("varxim", shot);
            }
        }
        if self.config.bin_type() == BinType::TwoD {
            let (x, y) = self.twod_nominal();
            columns.insert("x_nom", x);
            columns.insert("y_nom", y);
        }
        columns.insert("r_nom", rnom);

        self.columns = columns;
        self.estimator = None;
        self.cov = None;
        Ok(())
    }

    fn weight_register(&self) -> &[f64] {
        let n = self.config.n_bins_total();
        &self.statepack[PairReducer::WEIGHT * n..(PairReducer::WEIGHT + 1) * n]
    }

    fn twod_nominal(&self) -> (Vec<f64>, Vec<f64>) {
        let n = self.config.nbins();
        let max = self.config.max_sep();
        let size = 2.0 * max / n as f64;
        let center = |i: usize| -max + (i as f64 + 0.5) * size;
        (0..n * n).map(|k| (center(k % n), center(k / n))).unzip()
    }

    /// nominal separation of every bin
    pub fn rnom(&self) -> Vec<f64> {
        match self.config.bin_type() {
            BinType::TwoD => {
                let (x, y) = self.twod_nominal();
                x.iter().zip(&y).map(|(x, y)| x.hypot(*y)).collect()
            }
            _ => self.config.axis.rnom(),
        }
    }

    /// a named column (empty if this kind of correlation doesn't have it)
    pub fn column(&self, name: &str) -> &[f64] {
        self.columns.get(name).map_or(&[], Vec::as_slice)
    }

    /// every column, by name
    pub fn columns(&self) -> HashMap<&'static str, Vec<f64>> {
        self.columns.clone()
    }

    pub fn npairs(&self) -> &[f64] {
        self.column("npairs")
    }

    pub fn weight(&self) -> &[f64] {
        self.column("weight")
    }

    /// weighted mean separation (nominal for empty bins)
    pub fn meanr(&self) -> &[f64] {
        self.column("meanr")
    }

    pub fn meanlogr(&self) -> &[f64] {
        self.column("meanlogr")
    }

    /// the estimator: `<w k k>/<w>` for KK, the result of
    /// [`Corr2::calculate_xi`] for NN (empty before that)
    pub fn xi(&self) -> &[f64] {
        self.column("xi")
    }

    pub fn varxi(&self) -> &[f64] {
        self.column("varxi")
    }

    /// `(xip, xip_im, xim, xim_im)` of a GG correlation
    pub fn xipm(&self) -> [&[f64]; 4] {
        ["xip", "xip_im", "xim", "xim_im"].map(|name| self.column(name))
    }

    /// the covariance of [`Corr2::stat`] computed by the configured
    /// `var_method` (None for shot noise)
    pub fn cov(&self) -> Option<&Array2<f64>> {
        self.cov.as_ref()
    }

    /// flat index of the bin at multi-dimensional coordinates `coord`
    /// (`[ix]`, or `[iy, ix]` for TwoD)
    pub fn bin_index(&self, coord: &[usize]) -> Option<usize> {
        flat_bin_index(&self.config.shape(), coord)
    }

    /// the statistic the covariance describes: `xi` for NN and KK, `xip`
    /// followed by `xim` for GG
    pub fn stat(&self) -> Vec<f64> {
        match self.kind {
            PairKind::GG => [self.column("xip"), self.column("xim")].concat(),
            _ => self.xi().to_vec(),
        }
    }

    /// the shot-noise variance of every entry of [`Corr2::stat`]
    pub(crate) fn shot_variance(&self) -> Result<Vec<f64>, Error> {
        match self.kind {
            PairKind::GG => Ok([self.column("varxip"), self.column("varxim")].concat()),
            PairKind::NN if self.varxi().is_empty() => {
                Err(Error::covariance("call calculate_xi before asking for the NN variance"))
            }
            _ => Ok(self.varxi().to_vec()),
        }
    }

    pub(crate) fn patch_results(&self) -> Option<&PatchResults> {
        self.results.as_ref()
    }

    /// a copy whose sums only include the patch combinations selected by
    /// `sel` (each weighted by its multiplicity)
    pub(crate) fn resampled(&self, sel: &Selection) -> Result<Corr2, Error> {
        let mut out = Corr2 {
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
            let rr = inputs.rr.resampled(sel)?;
            let dr = inputs.dr.as_ref().map(|c| c.resampled(sel)).transpose()?;
            let rd = inputs.rd.as_ref().map(|c| c.resampled(sel)).transpose()?;
            let (xi, varxi) = out.xi_from(&rr, dr.as_ref(), rd.as_ref());
            out.columns.insert("xi", xi);
            out.columns.insert("varxi", varxi);
        }
        Ok(out)
    }

    /// the sum of the weights of all bins
    pub(crate) fn total_weight(&self) -> f64 {
        self.weight_register().iter().sum()
    }

    /// Compute the NN estimator from the random-random pairs `rr`, and
    /// optionally the data-random (`dr`) and random-data (`rd`) pairs:
    /// `(DD - DR - RD + RR)/RR` with every term normalized by its `tot`.
    /// With neither `dr` nor `rd` this is the natural estimator
    /// `DD/RR - 1`; with only one of them, it's counted twice.
    ///
    /// Returns `(xi, varxi)`, where varxi is the shot noise. When the
    /// configured `var_method` is a resampling method, the covariance is
    /// computed too (and `varxi` is replaced by its diagonal).
    pub fn calculate_xi(
        &mut self,
        rr: &Corr2,
        dr: Option<&Corr2>,
        rd: Option<&Corr2>,
    ) -> Result<(Vec<f64>, Vec<f64>), Error> {
        for (name, other) in [("rr", Some(rr)), ("dr", dr), ("rd", rd)] {
            let Some(other) = other else { continue };
            if self.kind != PairKind::NN || other.kind != PairKind::NN {
                return Err(Error::parameter(name, "calculate_xi requires NN correlations"));
            }
            self.check_binning(other)?;
            if other.tot == 0.0 {
                return Err(Error::parameter(name, "the correlation has not been processed"));
            }
        }
        let (xi, varxi) = self.xi_from(rr, dr, rd);
        self.columns.insert("xi", xi.clone());
        self.columns.insert("varxi", varxi.clone());
        self.estimator = Some(Box::new(NnInputs {
            rr: rr.clone(),
            dr: dr.cloned(),
            rd: rd.cloned(),
        }));
        if self.config.common().var_method() != VarMethod::Shot {
            self.update_cov()?;
            return Ok((xi, self.varxi().to_vec()));
        }
        Ok((xi, varxi))
    }

    fn xi_from(&self, rr: &Corr2, dr: Option<&Corr2>, rd: Option<&Corr2>) -> (Vec<f64>, Vec<f64>) {
        let scaled = |c: &Corr2| -> Vec<f64> {
            let w = if c.tot != 0.0 { self.tot / c.tot } else { 0.0 };
            c.weight_register().iter().map(|x| x * w).collect()
        };
        let rrw = scaled(rr);
        let (drw, rdw) = match (dr.map(scaled), rd.map(scaled)) {
            (None, None) => (None, None),
            (Some(d), None) => (Some(d.clone()), Some(d)),
            (None, Some(r)) => (Some(r.clone()), Some(r)),
            (Some(d), Some(r)) => (Some(d), Some(r)),
        };
        let dd = self.weight_register();
        let mut xi = vec![0.0; dd.len()];
        let mut varxi = vec![0.0; dd.len()];
        for i in 0..dd.len() {
            if rrw[i] <= 0.0 {
                continue;
            }
            let num = match (&drw, &rdw) {
                (Some(d), Some(r)) => dd[i] - d[i] - r[i] + rrw[i],
                _ => dd[i] - rrw[i],
            };
            xi[i] = num / rrw[i];
            varxi[i] = 1.0 / rrw[i];
        }
        (xi, varxi)
    }

    /// estimate the covariance of [`Corr2::stat`] with `method`
    pub fn estimate_cov(&self, method: VarMethod) -> Result<Array2<f64>, Error> {
        if self.kind == PairKind::NN && self.xi().is_empty() {
            return Err(Error::covariance("call calculate_xi before estimating the NN covariance"));
        }
        estimate_multi_cov(&[CorrRef::Two(self)], method, |corrs| corrs[0].stat())
    }

    fn update_cov(&mut self) -> Result<(), Error> {
        let cov = self.estimate_cov(self.config.common().var_method())?;
        let diag = cov.diag().to_vec();
        let n = self.config.n_bins_total();
        match self.kind {
            PairKind::GG => {
                self.columns.insert("varxip", diag[..n].to_vec());
                self.columns.insert("varxim", diag[n..].to_vec());
            }
            _ => {
                self.columns.insert("varxi", diag);
            }
        }
        self.cov = Some(cov);
        Ok(())
    }

    fn check_binning(&self, other: &Corr2) -> Result<(), Error> {
        let (a, b) = (&self.config, &other.config);
        if a.bin_type() != b.bin_type()
            || a.axis != b.axis
            || a.common().sep_units() != b.common().sep_units()
        {
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
    pub fn try_add_assign(&mut self, other: &Corr2) -> Result<(), Error> {
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
        self.estimator = None;
        self.cov = None;
        self.refresh()
    }

    fn meta(&self) -> TableMeta {
        let c = &self.config;
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
            shape_axes: Default::default(),
        }
    }

    /// write the columns and metadata to `sink`
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

    /// Replace the contents with a table written by [`Corr2::write`]. The
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

    /// the metric the correlation is configured with
    pub fn metric(&self) -> MetricKind {
        self.config.common().metric()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Corr2Builder;

    fn line(n: usize) -> PointSet {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y = vec![0.0; n];
        let k: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        PointSet::flat(&x, &y).unwrap().with_k(&k).unwrap()
    }

    fn config() -> Corr2Config {
        Corr2Builder::new()
            .min_sep(0.5)
            .max_sep(4.5)
            .nbins(4)
            .bin_type(BinType::Linear)
            .bin_slop(0.0)
            .build()
            .unwrap()
    }

    #[test]
    fn counts_on_a_line() {
        let mut corr = Corr2::new(config(), PairKind::KK).unwrap();
        corr.process(&line(6), None).unwrap();
        // separations 1..=4 occur 5, 4, 3, 2 times
        assert_eq!(corr.npairs(), &[5.0, 4.0, 3.0, 2.0]);
        assert_eq!(corr.meanr(), &[1.0, 2.0, 3.0, 4.0]);
        // odd separations pair opposite signs
        assert_eq!(corr.xi(), &[-1.0, 1.0, -1.0, 1.0]);
        assert_eq!(corr.tot(), 18.0);
        assert_eq!(corr.bin_index(&[2]), Some(2));
        assert!(corr.varxi().iter().all(|&v| v > 0.0));
    }

    #[test]
    fn empty_bins_use_nominal_values() {
        let mut corr = Corr2::new(config(), PairKind::NN).unwrap();
        corr.process(&line(2), None).unwrap();
        assert_eq!(corr.npairs(), &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(corr.meanr()[1..], corr.rnom()[1..]);
        assert!(corr.xi().is_empty());
    }

    #[test]
    fn add_assign_checks_binning() {
        let mut a = Corr2::new(config(), PairKind::KK).unwrap();
        a.process(&line(6), None).unwrap();
        let b = a.clone();
        a.try_add_assign(&b).unwrap();
        assert_eq!(a.npairs(), &[10.0, 8.0, 6.0, 4.0]);
        assert_eq!(a.xi(), b.xi());

        let other = Corr2Builder::new()
            .min_sep(0.5)
            .max_sep(4.5)
            .nbins(5)
            .bin_type(BinType::Linear)
            .build()
            .unwrap();
        let c = Corr2::new(other, PairKind::KK).unwrap();
        assert!(a.try_add_assign(&c).unwrap_err().is_incompatible());
        let d = Corr2::new(config(), PairKind::NN).unwrap();
        assert!(a.try_add_assign(&d).unwrap_err().is_incompatible());
    }

    #[test]
    fn natural_estimator() {
        let mut dd = Corr2::new(config(), PairKind::NN).unwrap();
        dd.process(&line(6), None).unwrap();
        let mut rr = Corr2::new(config(), PairKind::NN).unwrap();
        rr.process(&line(6), None).unwrap();
        let (xi, varxi) = dd.calculate_xi(&rr, None, None).unwrap();
        assert_eq!(xi, vec![0.0; 4]);
        assert_eq!(varxi, vec![0.2, 0.25, 1.0 / 3.0, 0.5]);
        // the same data counted against fewer randoms
        let mut rr_short = Corr2::new(config(), PairKind::NN).unwrap();
        rr_short.process(&line(5), None).unwrap();
        assert!(dd.calculate_xi(&rr_short, None, None).is_ok());
        assert!(dd.estimate_cov(VarMethod::Jackknife).unwrap_err().is_covariance());
    }

    #[test]
    fn catalog_checks() {
        let mut corr = Corr2::new(config(), PairKind::GG).unwrap();
        let err = corr.process(&line(4), None).unwrap_err();
        assert!(err.is_configuration());
    }
}
