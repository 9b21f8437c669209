//! Point sets (catalogs).
//!
//! A [`PointSet`] is an immutable collection of weighted points. Positions
//! are always stored as 3-vectors:
//! - flat `(x, y)` becomes `(x, y, 0)`
//! - spherical `(ra, dec)` becomes a unit vector
//! - spherical `(ra, dec, r)` becomes a 3-D position (and the catalog uses
//!   3-D coordinates)
//!
//! Each point may carry a value: nothing (counts), a scalar `k` or a shear
//! `(g1, g2)`. Catalogs can optionally be divided into patches, which is
//! what the resampling covariance estimators are built on.

use crate::config::{Coords, SepUnits};
use crate::error::Error;
use crate::kmeans::{assign_patches, kmeans};
use crate::metric::Pos;
use npcorr_nostd_internal::ValueKind;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Values {
    Count,
    Scalar(Vec<f64>),
    Shear(Vec<[f64; 2]>),
}

impl Values {
    pub(crate) fn kind(&self) -> ValueKind {
        match self {
            Values::Count => ValueKind::Count,
            Values::Scalar(_) => ValueKind::Scalar,
            Values::Shear(_) => ValueKind::Shear,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PointSet {
    coords: Coords,
    pos: Vec<Pos>,
    w: Vec<f64>,
    values: Values,
    /// patch label of every point (None when the catalog isn't patched)
    patch: Option<Vec<usize>>,
    npatch: usize,
    patch_centers: Option<Vec<Pos>>,
    sumw: f64,
    vark: f64,
    varg: f64,
}

fn check_len(name: &str, len: usize, expected: usize) -> Result<(), Error> {
    if len != expected {
        Err(Error::input_shape(format!(
            "{name} has {len} entries, expected {expected}"
        )))
    } else {
        Ok(())
    }
}

fn check_finite(name: &str, vals: &[f64]) -> Result<(), Error> {
    if vals.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(Error::input_shape(format!("{name} holds non-finite values")))
    }
}

impl PointSet {
    fn from_positions(coords: Coords, pos: Vec<Pos>) -> Self {
        let n = pos.len();
        let mut out = PointSet {
            coords,
            pos,
            w: vec![1.0; n],
            values: Values::Count,
            patch: None,
            npatch: 1,
            patch_centers: None,
            sumw: 0.0,
            vark: 0.0,
            varg: 0.0,
        };
        out.update_stats();
        out
    }

    /// flat 2-D positions
    pub fn flat(x: &[f64], y: &[f64]) -> Result<Self, Error> {
        check_len("y", y.len(), x.len())?;
        check_finite("x", x)?;
        check_finite("y", y)?;
        let pos = x.iter().zip(y).map(|(&x, &y)| [x, y, 0.0]).collect();
        Ok(Self::from_positions(Coords::Flat, pos))
    }

    /// 3-D positions
    pub fn three_d(x: &[f64], y: &[f64], z: &[f64]) -> Result<Self, Error> {
        check_len("y", y.len(), x.len())?;
        check_len("z", z.len(), x.len())?;
        check_finite("x", x)?;
        check_finite("y", y)?;
        check_finite("z", z)?;
        let pos = x
            .iter()
            .zip(y)
            .zip(z)
            .map(|((&x, &y), &z)| [x, y, z])
            .collect();
        Ok(Self::from_positions(Coords::ThreeD, pos))
    }

    /// positions on the sky, with angles in `units`
    pub fn spherical(ra: &[f64], dec: &[f64], units: SepUnits) -> Result<Self, Error> {
        check_len("dec", dec.len(), ra.len())?;
        check_finite("ra", ra)?;
        check_finite("dec", dec)?;
        let scale = units.radians();
        let pos = ra
            .iter()
            .zip(dec)
            .map(|(&ra, &dec)| {
                let (ra, dec) = (ra * scale, dec * scale);
                [dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin()]
            })
            .collect();
        Ok(Self::from_positions(Coords::Spherical, pos))
    }

    /// positions on the sky plus a distance. The result uses 3-D coordinates.
    pub fn spherical_with_r(
        ra: &[f64],
        dec: &[f64],
        r: &[f64],
        units: SepUnits,
    ) -> Result<Self, Error> {
        check_len("r", r.len(), ra.len())?;
        check_finite("r", r)?;
        let mut out = Self::spherical(ra, dec, units)?;
        for (p, &r) in out.pos.iter_mut().zip(r) {
            *p = p.map(|x| x * r);
        }
        out.coords = Coords::ThreeD;
        Ok(out)
    }

    /// attach weights (default: all 1). Points with zero weight are ignored
    /// by every calculation.
    pub fn with_weights(mut self, w: &[f64]) -> Result<Self, Error> {
        check_len("w", w.len(), self.pos.len())?;
        check_finite("w", w)?;
        self.w = w.to_vec();
        self.update_stats();
        Ok(self)
    }

    /// attach a scalar value to every point
    pub fn with_k(mut self, k: &[f64]) -> Result<Self, Error> {
        check_len("k", k.len(), self.pos.len())?;
        check_finite("k", k)?;
        self.values = Values::Scalar(k.to_vec());
        self.update_stats();
        Ok(self)
    }

    /// attach a shear to every point
    pub fn with_g(mut self, g1: &[f64], g2: &[f64]) -> Result<Self, Error> {
        check_len("g1", g1.len(), self.pos.len())?;
        check_len("g2", g2.len(), self.pos.len())?;
        check_finite("g1", g1)?;
        check_finite("g2", g2)?;
        self.values = Values::Shear(g1.iter().zip(g2).map(|(&a, &b)| [a, b]).collect());
        self.update_stats();
        Ok(self)
    }

    /// assign explicit patch labels (`npatch` becomes `max(label) + 1`)
    pub fn with_patches(mut self, labels: &[usize]) -> Result<Self, Error> {
        check_len("patch", labels.len(), self.pos.len())?;
        let npatch = labels.iter().max().map_or(1, |m| m + 1);
        self.patch = Some(labels.to_vec());
        self.npatch = npatch;
        self.patch_centers = Some(self.compute_patch_centers());
        Ok(self)
    }

    /// divide the catalog into `npatch` patches with k-means
    pub fn with_npatch(mut self, npatch: usize) -> Result<Self, Error> {
        let (labels, centers) = kmeans(&self.pos, &self.w, npatch, self.coords == Coords::Spherical)?;
        self.patch = Some(labels);
        self.npatch = npatch;
        self.patch_centers = Some(centers);
        Ok(self)
    }

    /// assign every point to the nearest of the given patch centers (e.g.
    /// the centers of another catalog, so that both share patches)
    pub fn with_patch_centers(mut self, centers: &[[f64; 3]]) -> Result<Self, Error> {
        if centers.is_empty() {
            return Err(Error::parameter("patch_centers", "at least 1 center is required"));
        }
        self.patch = Some(assign_patches(&self.pos, centers));
        self.npatch = centers.len();
        self.patch_centers = Some(centers.to_vec());
        Ok(self)
    }

    fn compute_patch_centers(&self) -> Vec<Pos> {
        let mut sums = vec![[0.0; 3]; self.npatch];
        let mut count = vec![0.0; self.npatch];
        if let Some(labels) = &self.patch {
            for (p, &label) in self.pos.iter().zip(labels) {
                for k in 0..3 {
                    sums[label][k] += p[k];
                }
                count[label] += 1.0;
            }
        }
        let spherical = self.coords == Coords::Spherical;
        sums.iter()
            .zip(&count)
            .map(|(s, &n)| {
                let c = if n > 0.0 { s.map(|x| x / n) } else { *s };
                let len = crate::metric::norm(&c);
                if spherical && len > 0.0 { c.map(|x| x / len) } else { c }
            })
            .collect()
    }

    fn update_stats(&mut self) {
        let sumw: f64 = self.w.iter().sum();
        self.sumw = sumw;
        self.vark = 0.0;
        self.varg = 0.0;
        if sumw == 0.0 {
            return;
        }
        match &self.values {
            Values::Count => {}
            Values::Scalar(k) => {
                let meank = k.iter().zip(&self.w).map(|(k, w)| k * w).sum::<f64>() / sumw;
                self.vark = k
                    .iter()
                    .zip(&self.w)
                    .map(|(k, w)| w * w * (k - meank) * (k - meank))
                    .sum::<f64>()
                    / sumw;
            }
            Values::Shear(g) => {
                let mut mean = [0.0; 2];
                for (g, w) in g.iter().zip(&self.w) {
                    mean[0] += w * g[0];
                    mean[1] += w * g[1];
                }
                mean = mean.map(|x| x / sumw);
                self.varg = g
                    .iter()
                    .zip(&self.w)
                    .map(|(g, w)| {
                        let d1 = g[0] - mean[0];
                        let d2 = g[1] - mean[1];
                        w * w * (d1 * d1 + d2 * d2)
                    })
                    .sum::<f64>()
                    / (2.0 * sumw);
            }
        }
    }

    pub fn coords(&self) -> Coords {
        self.coords
    }

    pub fn nobj(&self) -> usize {
        self.pos.len()
    }

    pub fn sumw(&self) -> f64 {
        self.sumw
    }

    /// weighted variance of the scalar values (0 without scalar values)
    pub fn vark(&self) -> f64 {
        self.vark
    }

    /// weighted per-component variance of the shear values (0 without shear
    /// values)
    pub fn varg(&self) -> f64 {
        self.varg
    }

    pub fn kind(&self) -> ValueKind {
        self.values.kind()
    }

    pub fn npatch(&self) -> usize {
        self.npatch
    }

    pub fn patch_labels(&self) -> Option<&[usize]> {
        self.patch.as_deref()
    }

    pub fn patch_centers(&self) -> Option<&[[f64; 3]]> {
        self.patch_centers.as_deref()
    }

    pub(crate) fn positions(&self) -> &[Pos] {
        &self.pos
    }

    pub(crate) fn weights(&self) -> &[f64] {
        &self.w
    }

    pub(crate) fn values(&self) -> &Values {
        &self.values
    }

    /// indices of the points in every patch (a single group when the
    /// catalog isn't patched)
    pub(crate) fn patch_members(&self) -> Vec<Vec<usize>> {
        match &self.patch {
            None => vec![(0..self.pos.len()).collect()],
            Some(labels) => {
                let mut out = vec![Vec::new(); self.npatch];
                for (i, &label) in labels.iter().enumerate() {
                    out[label].push(i);
                }
                out
            }
        }
    }

    /// the sum of the weights in every patch
    pub(crate) fn patch_sumw(&self) -> Vec<f64> {
        match &self.patch {
            None => vec![self.sumw],
            Some(labels) => {
                let mut out = vec![0.0; self.npatch];
                for (&label, &w) in labels.iter().zip(&self.w) {
                    out[label] += w;
                }
                out
            }
        }
    }
}
