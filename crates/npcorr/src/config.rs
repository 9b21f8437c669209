//! Configuration of correlation calculations.
//!
//! There are two ways to configure a calculation:
//! - a string-keyed namespace ([`Corr2Params`]/[`Corr3Params`]) that can be
//!   deserialized with serde (e.g. from JSON)
//! - the builders ([`Corr2Builder`]/[`Corr3Builder`])
//!
//! Both funnel into [`Corr2Config`]/[`Corr3Config`], which are immutable and
//! fully validated. All derived quantities (the 4th binning parameter,
//! `bin_slop`, `b`, ...) are computed eagerly on construction.

use crate::binning::{SepAxis, ShapeAxis, Spacing, TriangleBinning};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// looks up `name` (case-insensitively) in a table of choices
fn parse_choice<T: Copy>(
    what: &'static str,
    name: &str,
    table: &[(&str, T)],
    names: &'static [&'static str],
) -> Result<T, Error> {
    table
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, val)| *val)
        .ok_or_else(|| Error::choice(what, name, names))
}

macro_rules! choice_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal, [$(($variant:ident, $canonical:literal $(, $alias:literal)*)),+ $(,)?]
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            const NAMES: &'static [&'static str] = &[$($canonical),+];

            /// the canonical name of the choice
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $canonical),+
                }
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let table = [$(($canonical, $name::$variant) $(, ($alias, $name::$variant))*),+];
                parse_choice($what, s, &table, Self::NAMES)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

choice_enum!(
    /// 2-point binning schemes
    BinType, "bin_type", [(Log, "Log"), (Linear, "Linear"), (TwoD, "TwoD")]
);

choice_enum!(
    /// 3-point triangle parameterizations
    TriangleBinType, "bin_type", [(LogRUV, "LogRUV"), (LogSAS, "LogSAS")]
);

choice_enum!(
    /// Distance metrics. `FisherRperp` is accepted as an alias of `Rperp`
    MetricKind, "metric", [
        (Euclidean, "Euclidean"),
        (Arc, "Arc"),
        (Rperp, "Rperp", "FisherRperp"),
        (OldRperp, "OldRperp"),
        (Rlens, "Rlens"),
        (Periodic, "Periodic"),
    ]
);

choice_enum!(
    /// Coordinate systems of a point set
    Coords, "coordinate system", [(Flat, "flat"), (ThreeD, "3d"), (Spherical, "spherical")]
);

choice_enum!(
    /// Angular units used for separations
    SepUnits, "sep_units", [
        (Radians, "radians", "rad"),
        (Degrees, "degrees", "deg"),
        (Hours, "hours", "hr"),
        (Arcmin, "arcmin"),
        (Arcsec, "arcsec"),
    ]
);

choice_enum!(
    /// Variance estimators
    VarMethod, "var_method", [
        (Shot, "shot"),
        (Jackknife, "jackknife"),
        (Sample, "sample"),
        (Bootstrap, "bootstrap"),
        (MarkedBootstrap, "marked_bootstrap"),
    ]
);

choice_enum!(
    /// How a tree cell picks the location where it is split
    SplitMethod, "split_method", [
        (Mean, "mean"),
        (Median, "median"),
        (Middle, "middle"),
        (Random, "random"),
    ]
);

impl SepUnits {
    /// the size of one unit in radians
    pub fn radians(&self) -> f64 {
        use std::f64::consts::PI;
        match self {
            SepUnits::Radians => 1.0,
            SepUnits::Degrees => PI / 180.0,
            SepUnits::Hours => PI / 12.0,
            SepUnits::Arcmin => PI / 180.0 / 60.0,
            SepUnits::Arcsec => PI / 180.0 / 3600.0,
        }
    }
}

/// Controls whether the traversal may aggregate whole cells
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Brute {
    /// normal bin_slop driven traversal
    #[default]
    No,
    /// always descend to leaves for both catalogs
    Both,
    /// always descend to leaves for the first catalog only
    First,
    /// always descend to leaves for the second catalog only
    Second,
}

impl Brute {
    pub fn first(&self) -> bool {
        matches!(self, Brute::Both | Brute::First)
    }

    pub fn second(&self) -> bool {
        matches!(self, Brute::Both | Brute::Second)
    }

    pub fn any(&self) -> bool {
        !matches!(self, Brute::No)
    }
}

/// The value of `brute` in a config namespace: `false`, `true`, `1` or `2`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BruteParam {
    Flag(bool),
    Side(u8),
}

impl TryFrom<BruteParam> for Brute {
    type Error = Error;

    fn try_from(value: BruteParam) -> Result<Self, Self::Error> {
        match value {
            BruteParam::Flag(false) | BruteParam::Side(0) => Ok(Brute::No),
            BruteParam::Flag(true) => Ok(Brute::Both),
            BruteParam::Side(1) => Ok(Brute::First),
            BruteParam::Side(2) => Ok(Brute::Second),
            BruteParam::Side(other) => Err(Error::parameter(
                "brute",
                format!("{other} is not one of false, true, 1, 2"),
            )),
        }
    }
}

/// String-keyed configuration namespace for 2-point correlations
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Corr2Params {
    pub min_sep: Option<f64>,
    pub max_sep: Option<f64>,
    pub nbins: Option<usize>,
    pub bin_size: Option<f64>,
    pub bin_type: Option<String>,
    pub bin_slop: Option<f64>,
    pub brute: Option<BruteParam>,
    pub metric: Option<String>,
    pub sep_units: Option<String>,
    pub min_rpar: Option<f64>,
    pub max_rpar: Option<f64>,
    pub period: Option<f64>,
    pub xperiod: Option<f64>,
    pub yperiod: Option<f64>,
    pub zperiod: Option<f64>,
    pub var_method: Option<String>,
    pub num_bootstrap: Option<usize>,
    pub max_top: Option<u32>,
    pub min_top: Option<u32>,
    pub split_method: Option<String>,
    pub num_threads: Option<usize>,
    pub rng_seed: Option<u64>,
}

/// String-keyed configuration namespace for 3-point correlations
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Corr3Params {
    pub min_sep: Option<f64>,
    pub max_sep: Option<f64>,
    pub nbins: Option<usize>,
    pub bin_size: Option<f64>,
    pub min_u: Option<f64>,
    pub max_u: Option<f64>,
    pub nubins: Option<usize>,
    pub ubin_size: Option<f64>,
    pub min_v: Option<f64>,
    pub max_v: Option<f64>,
    pub nvbins: Option<usize>,
    pub vbin_size: Option<f64>,
    pub min_phi: Option<f64>,
    pub max_phi: Option<f64>,
    pub nphi_bins: Option<usize>,
    pub phi_bin_size: Option<f64>,
    pub bin_type: Option<String>,
    pub bin_slop: Option<f64>,
    pub brute: Option<bool>,
    pub metric: Option<String>,
    pub sep_units: Option<String>,
    pub period: Option<f64>,
    pub xperiod: Option<f64>,
    pub yperiod: Option<f64>,
    pub zperiod: Option<f64>,
    pub var_method: Option<String>,
    pub num_bootstrap: Option<usize>,
    pub max_top: Option<u32>,
    pub min_top: Option<u32>,
    pub split_method: Option<String>,
    pub num_threads: Option<usize>,
    pub rng_seed: Option<u64>,
}

/// Settings shared by 2-point and 3-point calculations
#[derive(Clone, Debug, PartialEq)]
pub struct CommonConfig {
    pub(crate) bin_slop: f64,
    pub(crate) brute: Brute,
    pub(crate) metric: MetricKind,
    pub(crate) sep_units: Option<SepUnits>,
    pub(crate) min_rpar: f64,
    pub(crate) max_rpar: f64,
    pub(crate) period: [f64; 3],
    pub(crate) var_method: VarMethod,
    pub(crate) num_bootstrap: usize,
    pub(crate) max_top: u32,
    pub(crate) min_top: Option<u32>,
    pub(crate) split_method: SplitMethod,
    pub(crate) num_threads: Option<usize>,
    pub(crate) rng_seed: Option<u64>,
}

impl CommonConfig {
    pub fn bin_slop(&self) -> f64 {
        self.bin_slop
    }
    pub fn brute(&self) -> Brute {
        self.brute
    }
    pub fn metric(&self) -> MetricKind {
        self.metric
    }
    pub fn sep_units(&self) -> Option<SepUnits> {
        self.sep_units
    }
    pub fn rpar_range(&self) -> (f64, f64) {
        (self.min_rpar, self.max_rpar)
    }
    pub fn period(&self) -> [f64; 3] {
        self.period
    }
    pub fn var_method(&self) -> VarMethod {
        self.var_method
    }
    pub fn num_bootstrap(&self) -> usize {
        self.num_bootstrap
    }
    pub fn max_top(&self) -> u32 {
        self.max_top
    }
    pub fn split_method(&self) -> SplitMethod {
        self.split_method
    }
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }

    /// the number of worker threads used for top-level traversal jobs
    pub fn num_threads(&self) -> usize {
        match self.num_threads {
            Some(n) => n,
            None => rayon::current_num_threads(),
        }
    }

    /// minimum number of tree levels that become independent top-level jobs
    pub fn min_top(&self) -> u32 {
        match self.min_top {
            Some(n) => n,
            None => {
                let threads = self.num_threads().max(1) as f64;
                threads.log2().ceil() as u32
            }
        }
        .min(self.max_top)
    }

    /// the factor that converts user separation units into radians (1 when
    /// no units are in play)
    pub fn unit_scale(&self) -> f64 {
        self.sep_units.map_or(1.0, |u| u.radians())
    }

    fn period_is_set(&self) -> bool {
        self.period.iter().any(|&p| p != 0.0)
    }

    /// Checks the combination of metric, coordinates and units. Called at the
    /// start of every `process*` call, once the coordinate system is known.
    pub(crate) fn check_coords(&self, coords: Coords, three_point: bool) -> Result<(), Error> {
        use Coords::*;
        use MetricKind::*;
        let ok = match self.metric {
            Euclidean => true,
            Arc => matches!(coords, Spherical | ThreeD),
            Rperp | OldRperp | Rlens => !three_point && coords == ThreeD,
            Periodic => matches!(coords, Flat | ThreeD),
        };
        if !ok {
            return Err(Error::metric_coords(format!(
                "the {} metric can't be used with {} coordinates{}",
                self.metric,
                coords,
                if three_point { " for 3-point correlations" } else { "" }
            )));
        }
        if self.sep_units.is_some() && coords == ThreeD && self.metric != Arc {
            return Err(Error::metric_coords(
                "sep_units is invalid with 3d coordinates unless the metric is Arc",
            ));
        }
        if self.metric == Periodic {
            let needed = if coords == ThreeD { 3 } else { 2 };
            if self.period[..needed].iter().any(|&p| p == 0.0) {
                return Err(Error::metric_coords(
                    "the Periodic metric requires a nonzero period along every axis",
                ));
            }
        }
        Ok(())
    }
}

/// raw shared parameters, before validation
struct RawCommon<'a> {
    bin_slop: Option<f64>,
    brute: Brute,
    metric: Option<&'a str>,
    sep_units: Option<&'a str>,
    min_rpar: Option<f64>,
    max_rpar: Option<f64>,
    period: Option<f64>,
    xperiod: Option<f64>,
    yperiod: Option<f64>,
    zperiod: Option<f64>,
    var_method: Option<&'a str>,
    num_bootstrap: Option<usize>,
    max_top: Option<u32>,
    min_top: Option<u32>,
    split_method: Option<&'a str>,
    num_threads: Option<usize>,
    rng_seed: Option<u64>,
}

impl RawCommon<'_> {
    /// `max_good_slop` is the largest bin_slop that keeps the worst-case
    /// placement error at 0.1 of the relevant bin size
    fn build(self, max_good_slop: f64) -> Result<CommonConfig, Error> {
        let metric = match self.metric {
            Some(name) => name.parse()?,
            None => MetricKind::Euclidean,
        };
        let sep_units = self.sep_units.map(SepUnits::from_str).transpose()?;

        let bin_slop = match self.bin_slop {
            Some(slop) if !(slop >= 0.0) => {
                return Err(Error::parameter("bin_slop", "must be non-negative"));
            }
            Some(slop) => {
                if slop > max_good_slop + 1.0e-4 {
                    log::warn!(
                        "bin_slop = {slop} is larger than the recommended {max_good_slop}. \
                         Results may be inaccurate"
                    );
                }
                slop
            }
            None => max_good_slop.min(1.0),
        };

        if (self.min_rpar.is_some() || self.max_rpar.is_some())
            && !matches!(
                metric,
                MetricKind::Rperp | MetricKind::OldRperp | MetricKind::Rlens
            )
        {
            return Err(Error::metric_coords(format!(
                "min_rpar/max_rpar are invalid for the {metric} metric"
            )));
        }
        let min_rpar = self.min_rpar.unwrap_or(f64::NEG_INFINITY);
        let max_rpar = self.max_rpar.unwrap_or(f64::INFINITY);
        if min_rpar > max_rpar {
            return Err(Error::parameter("min_rpar", "must not exceed max_rpar"));
        }

        let base = self.period.unwrap_or(0.0);
        let period = [
            self.xperiod.unwrap_or(base),
            self.yperiod.unwrap_or(base),
            self.zperiod.unwrap_or(base),
        ];
        if period.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(Error::parameter("period", "must be finite and non-negative"));
        }

        let var_method = match self.var_method {
            Some(name) => name.parse()?,
            None => VarMethod::Shot,
        };
        let num_bootstrap = self.num_bootstrap.unwrap_or(500);
        if num_bootstrap < 2 {
            return Err(Error::parameter("num_bootstrap", "must be at least 2"));
        }

        let max_top = self.max_top.unwrap_or(10);
        if max_top > 30 {
            return Err(Error::parameter("max_top", "must not exceed 30"));
        }
        let split_method = match self.split_method {
            Some(name) => name.parse()?,
            None => SplitMethod::Mean,
        };
        if self.num_threads == Some(0) {
            return Err(Error::parameter("num_threads", "must be positive"));
        }

        let out = CommonConfig {
            bin_slop,
            brute: self.brute,
            metric,
            sep_units,
            min_rpar,
            max_rpar,
            period,
            var_method,
            num_bootstrap,
            max_top,
            min_top: self.min_top,
            split_method,
            num_threads: self.num_threads,
            rng_seed: self.rng_seed,
        };
        if out.period_is_set() && metric != MetricKind::Periodic {
            return Err(Error::metric_coords(format!(
                "period is invalid for the {metric} metric"
            )));
        }
        Ok(out)
    }
}

/// Validated configuration of a 2-point correlation
#[derive(Clone, Debug, PartialEq)]
pub struct Corr2Config {
    pub(crate) bin_type: BinType,
    pub(crate) axis: SepAxis,
    /// relative tolerance used by the traversal (for TwoD, an absolute
    /// tolerance in units of the separation)
    pub(crate) b: f64,
    pub(crate) common: CommonConfig,
}

impl Corr2Config {
    pub fn from_params(params: &Corr2Params) -> Result<Self, Error> {
        let bin_type = match &params.bin_type {
            Some(name) => name.parse()?,
            None => BinType::Log,
        };
        let axis = match bin_type {
            BinType::Log => SepAxis::resolve(
                "separation",
                Spacing::Log,
                params.min_sep,
                params.max_sep,
                params.nbins,
                params.bin_size,
            )?,
            BinType::Linear => SepAxis::resolve(
                "separation",
                Spacing::Linear,
                params.min_sep,
                params.max_sep,
                params.nbins,
                params.bin_size,
            )?,
            BinType::TwoD => {
                SepAxis::resolve_twod(params.min_sep, params.max_sep, params.nbins, params.bin_size)?
            }
        };

        // the reference log bin size determines the recommended bin_slop
        let (min_log_bin_size, max_log_bin_size) = match bin_type {
            BinType::Log => (axis.bin_size, axis.bin_size),
            BinType::Linear => (
                axis.bin_size / axis.max_sep,
                axis.bin_size / (axis.min_sep + 0.5 * axis.bin_size),
            ),
            // for TwoD, b is an absolute tolerance expressed in bins
            BinType::TwoD => (1.0, 1.0),
        };

        let brute = match params.brute {
            Some(b) => Brute::try_from(b)?,
            None => Brute::No,
        };
        let common = RawCommon {
            bin_slop: params.bin_slop,
            brute,
            metric: params.metric.as_deref(),
            sep_units: params.sep_units.as_deref(),
            min_rpar: params.min_rpar,
            max_rpar: params.max_rpar,
            period: params.period,
            xperiod: params.xperiod,
            yperiod: params.yperiod,
            zperiod: params.zperiod,
            var_method: params.var_method.as_deref(),
            num_bootstrap: params.num_bootstrap,
            max_top: params.max_top,
            min_top: params.min_top,
            split_method: params.split_method.as_deref(),
            num_threads: params.num_threads,
            rng_seed: params.rng_seed,
        }
        .build(0.1 / max_log_bin_size)?;

        if bin_type == BinType::TwoD
            && !matches!(common.metric, MetricKind::Euclidean | MetricKind::Periodic)
        {
            return Err(Error::metric_coords(format!(
                "TwoD binning requires the Euclidean or Periodic metric, not {}",
                common.metric
            )));
        }

        let b = match bin_type {
            BinType::TwoD => common.bin_slop * axis.bin_size,
            _ => common.bin_slop * min_log_bin_size,
        };

        Ok(Corr2Config {
            bin_type,
            axis,
            b,
            common,
        })
    }

    /// deserialize a JSON config namespace and validate it
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let params: Corr2Params = serde_json::from_str(text)?;
        Self::from_params(&params)
    }

    pub fn bin_type(&self) -> BinType {
        self.bin_type
    }
    pub fn min_sep(&self) -> f64 {
        self.axis.min_sep
    }
    pub fn max_sep(&self) -> f64 {
        self.axis.max_sep
    }
    pub fn nbins(&self) -> usize {
        self.axis.nbins
    }
    pub fn bin_size(&self) -> f64 {
        self.axis.bin_size
    }
    pub fn b(&self) -> f64 {
        self.b
    }
    pub fn common(&self) -> &CommonConfig {
        &self.common
    }

    /// the shape of the output arrays
    pub fn shape(&self) -> Vec<usize> {
        match self.bin_type {
            BinType::TwoD => vec![self.axis.nbins, self.axis.nbins],
            _ => vec![self.axis.nbins],
        }
    }

    /// total number of bins
    pub fn n_bins_total(&self) -> usize {
        self.shape().iter().product()
    }
}

/// Validated configuration of a 3-point correlation
#[derive(Clone, Debug, PartialEq)]
pub struct Corr3Config {
    pub(crate) binning: TriangleBinning,
    pub(crate) common: CommonConfig,
}

impl Corr3Config {
    pub fn from_params(params: &Corr3Params) -> Result<Self, Error> {
        let bin_type = match &params.bin_type {
            Some(name) => name.parse()?,
            None => TriangleBinType::LogRUV,
        };
        let sep = SepAxis::resolve(
            "separation",
            Spacing::Log,
            params.min_sep,
            params.max_sep,
            params.nbins,
            params.bin_size,
        )?;

        let binning = match bin_type {
            TriangleBinType::LogRUV => {
                if params.min_phi.is_some()
                    || params.max_phi.is_some()
                    || params.nphi_bins.is_some()
                    || params.phi_bin_size.is_some()
                {
                    return Err(Error::bin_spec("phi", "phi parameters are invalid for LogRUV"));
                }
                let u = ShapeAxis::resolve(
                    "u",
                    (params.min_u, params.max_u, params.nubins, params.ubin_size),
                    (0.0, 1.0),
                    (0.0, 1.0),
                    0.1,
                )?;
                let v = ShapeAxis::resolve(
                    "v",
                    (params.min_v, params.max_v, params.nvbins, params.vbin_size),
                    (0.0, 1.0),
                    (0.0, 1.0),
                    0.1,
                )?;
                TriangleBinning::Ruv { sep, u, v }
            }
            TriangleBinType::LogSAS => {
                if params.min_u.is_some()
                    || params.max_u.is_some()
                    || params.nubins.is_some()
                    || params.ubin_size.is_some()
                    || params.min_v.is_some()
                    || params.max_v.is_some()
                    || params.nvbins.is_some()
                    || params.vbin_size.is_some()
                {
                    return Err(Error::bin_spec(
                        "u/v",
                        "u and v parameters are invalid for LogSAS",
                    ));
                }
                let phi = ShapeAxis::resolve(
                    "phi",
                    (
                        params.min_phi,
                        params.max_phi,
                        params.nphi_bins,
                        params.phi_bin_size,
                    ),
                    (0.0, std::f64::consts::PI),
                    (0.0, 2.0 * std::f64::consts::PI),
                    0.1,
                )?;
                TriangleBinning::Sas { sep, phi }
            }
        };

        let brute = match params.brute {
            Some(true) => Brute::Both,
            _ => Brute::No,
        };
        let common = RawCommon {
            bin_slop: params.bin_slop,
            brute,
            metric: params.metric.as_deref(),
            sep_units: params.sep_units.as_deref(),
            min_rpar: None,
            max_rpar: None,
            period: params.period,
            xperiod: params.xperiod,
            yperiod: params.yperiod,
            zperiod: params.zperiod,
            var_method: params.var_method.as_deref(),
            num_bootstrap: params.num_bootstrap,
            max_top: params.max_top,
            min_top: params.min_top,
            split_method: params.split_method.as_deref(),
            num_threads: params.num_threads,
            rng_seed: params.rng_seed,
        }
        .build(0.1 / binning.largest_bin_size())?;

        if !matches!(
            common.metric,
            MetricKind::Euclidean | MetricKind::Arc | MetricKind::Periodic
        ) {
            return Err(Error::metric_coords(format!(
                "the {} metric is not supported for 3-point correlations",
                common.metric
            )));
        }

        Ok(Corr3Config { binning, common })
    }

    /// deserialize a JSON config namespace and validate it
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let params: Corr3Params = serde_json::from_str(text)?;
        Self::from_params(&params)
    }

    pub fn bin_type(&self) -> TriangleBinType {
        match self.binning {
            TriangleBinning::Ruv { .. } => TriangleBinType::LogRUV,
            TriangleBinning::Sas { .. } => TriangleBinType::LogSAS,
        }
    }
    pub fn binning(&self) -> &TriangleBinning {
        &self.binning
    }
    pub fn min_sep(&self) -> f64 {
        self.binning.sep().min_sep
    }
    pub fn max_sep(&self) -> f64 {
        self.binning.sep().max_sep
    }
    pub fn nbins(&self) -> usize {
        self.binning.sep().nbins
    }
    pub fn bin_size(&self) -> f64 {
        self.binning.sep().bin_size
    }
    pub fn common(&self) -> &CommonConfig {
        &self.common
    }

    /// the shape of the output arrays
    pub fn shape(&self) -> Vec<usize> {
        self.binning.shape().to_vec()
    }

    /// total number of bins
    pub fn n_bins_total(&self) -> usize {
        self.binning.shape().iter().product()
    }
}

/// Programmatic construction of a [`Corr2Config`]
#[derive(Clone, Debug, Default)]
pub struct Corr2Builder {
    params: Corr2Params,
}

impl Corr2Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_sep(mut self, val: f64) -> Self {
        self.params.min_sep = Some(val);
        self
    }
    pub fn max_sep(mut self, val: f64) -> Self {
        self.params.max_sep = Some(val);
        self
    }
    pub fn nbins(mut self, val: usize) -> Self {
        self.params.nbins = Some(val);
        self
    }
    pub fn bin_size(mut self, val: f64) -> Self {
        self.params.bin_size = Some(val);
        self
    }
    pub fn bin_type(mut self, val: BinType) -> Self {
        self.params.bin_type = Some(val.name().to_string());
        self
    }
    pub fn bin_slop(mut self, val: f64) -> Self {
        self.params.bin_slop = Some(val);
        self
    }
    pub fn brute(mut self, val: Brute) -> Self {
        self.params.brute = Some(match val {
            Brute::No => BruteParam::Flag(false),
            Brute::Both => BruteParam::Flag(true),
            Brute::First => BruteParam::Side(1),
            Brute::Second => BruteParam::Side(2),
        });
        self
    }
    pub fn metric(mut self, val: MetricKind) -> Self {
        self.params.metric = Some(val.name().to_string());
        self
    }
    pub fn sep_units(mut self, val: SepUnits) -> Self {
        self.params.sep_units = Some(val.name().to_string());
        self
    }
    pub fn min_rpar(mut self, val: f64) -> Self {
        self.params.min_rpar = Some(val);
        self
    }
    pub fn max_rpar(mut self, val: f64) -> Self {
        self.params.max_rpar = Some(val);
        self
    }
    /// the same period along every axis
    pub fn period(mut self, val: f64) -> Self {
        self.params.period = Some(val);
        self
    }
    pub fn periods(mut self, x: f64, y: f64, z: f64) -> Self {
        self.params.xperiod = Some(x);
        self.params.yperiod = Some(y);
        self.params.zperiod = Some(z);
        self
    }
    pub fn var_method(mut self, val: VarMethod) -> Self {
        self.params.var_method = Some(val.name().to_string());
        self
    }
    pub fn num_bootstrap(mut self, val: usize) -> Self {
        self.params.num_bootstrap = Some(val);
        self
    }
    pub fn max_top(mut self, val: u32) -> Self {
        self.params.max_top = Some(val);
        self
    }
    pub fn min_top(mut self, val: u32) -> Self {
        self.params.min_top = Some(val);
        self
    }
    pub fn split_method(mut self, val: SplitMethod) -> Self {
        self.params.split_method = Some(val.name().to_string());
        self
    }
    pub fn num_threads(mut self, val: usize) -> Self {
        self.params.num_threads = Some(val);
        self
    }
    pub fn rng_seed(mut self, val: u64) -> Self {
        self.params.rng_seed = Some(val);
        self
    }

    pub fn build(&self) -> Result<Corr2Config, Error> {
        Corr2Config::from_params(&self.params)
    }
}

/// Programmatic construction of a [`Corr3Config`]
#[derive(Clone, Debug, Default)]
pub struct Corr3Builder {
    params: Corr3Params,
}

impl Corr3Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_sep(mut self, val: f64) -> Self {
        self.params.min_sep = Some(val);
        self
    }
    pub fn max_sep(mut self, val: f64) -> Self {
        self.params.max_sep = Some(val);
        self
    }
    pub fn nbins(mut self, val: usize) -> Self {
        self.params.nbins = Some(val);
        self
    }
    pub fn bin_size(mut self, val: f64) -> Self {
        self.params.bin_size = Some(val);
        self
    }
    pub fn min_u(mut self, val: f64) -> Self {
        self.params.min_u = Some(val);
        self
    }
    pub fn max_u(mut self, val: f64) -> Self {
        self.params.max_u = Some(val);
        self
    }
    pub fn nubins(mut self, val: usize) -> Self {
        self.params.nubins = Some(val);
        self
    }
    pub fn ubin_size(mut self, val: f64) -> Self {
        self.params.ubin_size = Some(val);
        self
    }
    pub fn min_v(mut self, val: f64) -> Self {
        self.params.min_v = Some(val);
        self
    }
    pub fn max_v(mut self, val: f64) -> Self {
        self.params.max_v = Some(val);
        self
    }
    pub fn nvbins(mut self, val: usize) -> Self {
        self.params.nvbins = Some(val);
        self
    }
    pub fn vbin_size(mut self, val: f64) -> Self {
        self.params.vbin_size = Some(val);
        self
    }
    pub fn min_phi(mut self, val: f64) -> Self {
        self.params.min_phi = Some(val);
        self
    }
    pub fn max_phi(mut self, val: f64) -> Self {
        self.params.max_phi = Some(val);
        self
    }
    pub fn nphi_bins(mut self, val: usize) -> Self {
        self.params.nphi_bins = Some(val);
        self
    }
    pub fn phi_bin_size(mut self, val: f64) -> Self {
        self.params.phi_bin_size = Some(val);
        self
    }
    pub fn bin_type(mut self, val: TriangleBinType) -> Self {
        self.params.bin_type = Some(val.name().to_string());
        self
    }
    pub fn bin_slop(mut self, val: f64) -> Self {
        self.params.bin_slop = Some(val);
        self
    }
    pub fn brute(mut self, val: bool) -> Self {
        self.params.brute = Some(val);
        self
    }
    pub fn metric(mut self, val: MetricKind) -> Self {
        self.params.metric = Some(val.name().to_string());
        self
    }
    pub fn sep_units(mut self, val: SepUnits) -> Self {
        self.params.sep_units = Some(val.name().to_string());
        self
    }
    pub fn period(mut self, val: f64) -> Self {
        self.params.period = Some(val);
        self
    }
    pub fn var_method(mut self, val: VarMethod) -> Self {
        self.params.var_method = Some(val.name().to_string());
        self
    }
    pub fn num_bootstrap(mut self, val: usize) -> Self {
        self.params.num_bootstrap = Some(val);
        self
    }
    pub fn max_top(mut self, val: u32) -> Self {
        self.params.max_top = Some(val);
        self
    }
    pub fn min_top(mut self, val: u32) -> Self {
        self.params.min_top = Some(val);
        self
    }
    pub fn split_method(mut self, val: SplitMethod) -> Self {
        self.params.split_method = Some(val.name().to_string());
        self
    }
    pub fn num_threads(mut self, val: usize) -> Self {
        self.params.num_threads = Some(val);
        self
    }
    pub fn rng_seed(mut self, val: u64) -> Self {
        self.params.rng_seed = Some(val);
        self
    }

    pub fn build(&self) -> Result<Corr3Config, Error> {
        Corr3Config::from_params(&self.params)
    }
}
