//! Patch orchestration.
//!
//! When catalogs are divided into patches, a correlation is computed as a
//! sum over patch combinations (pairs for 2-point, triples for 3-point).
//! Every combination is a [`PatchJob`]; its contribution is kept as a
//! [`PatchResult`] so the resampling covariance estimators can recombine
//! them later.
//!
//! Jobs between patches that are too far apart to hold any pair (or
//! triangle) in range are "trivially zero": no traversal is run, but their
//! normalization (`tot`) is still recorded.
//!
//! With a [`Communicator`], each rank computes the jobs it owns and the
//! partial results are gathered on rank 0, merged, and broadcast back.

use crate::catalog::PointSet;
use crate::comm::Communicator;
use crate::error::Error;
use crate::field::{Field, FieldOpts};
use crate::metric::{Metric, MetricOps, Pos, norm, sub};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Options of a `process` call
#[derive(Clone, Copy, Default)]
pub struct ProcessOptions<'a> {
    /// 3-point only: vertex k of every triangle (sides sorted by length)
    /// comes from catalog k
    pub ordered: bool,
    /// keep only the patch fields needed by the next job in memory
    pub low_mem: bool,
    /// spread the patch combinations over the ranks of a communicator
    pub comm: Option<&'a dyn Communicator>,
}

/// The contribution of a single patch combination
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct PatchResult {
    /// the statepack buffer (empty when nothing was accumulated)
    pub(crate) data: Vec<f64>,
    /// the normalization (weight products) of the combination
    pub(crate) tot: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PatchEntry {
    key: Vec<usize>,
    #[serde(flatten)]
    result: PatchResult,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PatchResultsWire {
    npatch: Vec<usize>,
    entries: Vec<PatchEntry>,
}

/// Patch results keyed by patch indices (one index per catalog side)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "PatchResultsWire", into = "PatchResultsWire")]
pub(crate) struct PatchResults {
    npatch: Vec<usize>,
    map: BTreeMap<Vec<usize>, PatchResult>,
}

impl From<PatchResultsWire> for PatchResults {
    fn from(wire: PatchResultsWire) -> Self {
        let mut out = PatchResults::new(wire.npatch);
        for entry in wire.entries {
            out.insert(entry.key, entry.result);
        }
        out
    }
}

impl From<PatchResults> for PatchResultsWire {
    fn from(results: PatchResults) -> Self {
        PatchResultsWire {
            npatch: results.npatch,
            entries: results
                .map
                .into_iter()
                .map(|(key, result)| PatchEntry { key, result })
                .collect(),
        }
    }
}

fn add_into(dst: &mut Vec<f64>, src: &[f64]) {
    if dst.is_empty() {
        dst.extend_from_slice(src);
    } else if !src.is_empty() {
        for (a, b) in dst.iter_mut().zip(src) {
            *a += b;
        }
    }
}

impl PatchResults {
    /// `npatch` holds the patch count of every catalog side
    pub(crate) fn new(npatch: Vec<usize>) -> Self {
        PatchResults {
            npatch,
            map: BTreeMap::new(),
        }
    }

    pub(crate) fn npatch(&self) -> &[usize] {
        &self.npatch
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// the largest patch count of any side
    pub(crate) fn max_npatch(&self) -> usize {
        self.npatch.iter().copied().max().unwrap_or(1)
    }

    /// Record a result (adding to any existing result with the same key).
    /// Results holding nothing are dropped.
    pub(crate) fn insert(&mut self, key: Vec<usize>, mut result: PatchResult) {
        if result.data.iter().all(|&x| x == 0.0) {
            result.data.clear();
        }
        if result.data.is_empty() && result.tot == 0.0 {
            return;
        }
        match self.map.get_mut(&key) {
            Some(existing) => {
                add_into(&mut existing.data, &result.data);
                existing.tot += result.tot;
            }
            None => {
                self.map.insert(key, result);
            }
        }
    }

    pub(crate) fn merge(&mut self, other: PatchResults) -> Result<(), Error> {
        if other.npatch != self.npatch {
            return Err(Error::patch_count(other.npatch));
        }
        for (key, result) in other.map {
            self.insert(key, result);
        }
        Ok(())
    }

    /// the sum over every key, weighted by `weight(key)` (keys with weight 0
    /// are skipped). Returns the summed buffer (of length `len`) and tot.
    pub(crate) fn sum_weighted(&self, len: usize, weight: impl Fn(&[usize]) -> f64) -> (Vec<f64>, f64) {
        let mut data = vec![0.0; len];
        let mut tot = 0.0;
        for (key, result) in &self.map {
            let w = weight(key);
            if w == 0.0 {
                continue;
            }
            for (a, b) in data.iter_mut().zip(&result.data) {
                *a += w * b;
            }
            tot += w * result.tot;
        }
        (data, tot)
    }

    pub(crate) fn sum(&self, len: usize) -> (Vec<f64>, f64) {
        self.sum_weighted(len, |_| 1.0)
    }
}

/// How the fields of a job are traversed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum JobKind {
    /// within a single field
    Auto,
    /// 1 vertex from the first field, 2 from the second (3-point only)
    Cross12,
    /// 1 point/vertex from each field
    Cross,
}

/// A single patch combination
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PatchJob {
    pub(crate) key: Vec<usize>,
    pub(crate) kind: JobKind,
    /// `(catalog, patch)` of every field the traversal uses
    pub(crate) fields: Vec<(usize, usize)>,
    pub(crate) tot: f64,
    pub(crate) trivial: bool,
}

/// Bounding spheres and weights of the patches of a catalog
#[derive(Clone, Debug)]
pub(crate) struct PatchGeometry {
    centers: Vec<Pos>,
    radii: Vec<f64>,
    sumw: Vec<f64>,
}

impl PatchGeometry {
    /// `angular` projects positions onto the unit sphere first (matching the
    /// trees used by angular metrics)
    pub(crate) fn new(cat: &PointSet, angular: bool) -> Self {
        let pos = cat.positions();
        let point = |i: usize| {
            let p = pos[i];
            let len = norm(&p);
            if angular && len > 0.0 { p.map(|x| x / len) } else { p }
        };
        let members = cat.patch_members();
        let mut centers = Vec::with_capacity(members.len());
        let mut radii = Vec::with_capacity(members.len());
        for idx in &members {
            let mut center = [0.0; 3];
            for &i in idx {
                let p = point(i);
                for k in 0..3 {
                    center[k] += p[k];
                }
            }
            if !idx.is_empty() {
                center = center.map(|x| x / idx.len() as f64);
            }
            let radius = idx
                .iter()
                .map(|&i| norm(&sub(&point(i), &center)))
                .fold(0.0, f64::max);
            centers.push(center);
            radii.push(radius);
        }
        PatchGeometry {
            centers,
            radii,
            sumw: cat.patch_sumw(),
        }
    }

    pub(crate) fn npatch(&self) -> usize {
        self.centers.len()
    }

    pub(crate) fn sumw(&self) -> &[f64] {
        &self.sumw
    }
}

/// Whether patch `i` of `a` and patch `j` of `b` are too far apart to hold a
/// separation below `reach`. Separations are bounded with the Euclidean
/// distance between the patch centers (the minimum image for periodic
/// boxes), which bounds every metric from above.
fn trivially_zero(a: &PatchGeometry, i: usize, b: &PatchGeometry, j: usize, metric: &Metric, reach: f64) -> bool {
    let (c1, c2) = (&a.centers[i], &b.centers[j]);
    let d = match metric {
        Metric::Periodic(p) => p.dist(c1, c2),
        _ => norm(&sub(c2, c1)),
    };
    d > a.radii[i] + b.radii[j] + 2.0 * reach
}

/// Check that the patch counts of the catalogs can be combined and return
/// the count that drives the jobs
pub(crate) fn common_npatch(npatch: &[usize]) -> Result<usize, Error> {
    let n = npatch.iter().copied().max().unwrap_or(1);
    if npatch.iter().any(|&k| k != n && k != 1) {
        return Err(Error::patch_count(npatch.to_vec()));
    }
    Ok(n)
}

/// Jobs of a 2-point correlation: an auto-correlation with 1 geometry or a
/// cross-correlation with 2. `reach` is the largest separation that can be
/// binned (in traversal units).
pub(crate) fn pair_jobs(geo: &[&PatchGeometry], metric: &Metric, reach: f64) -> Vec<PatchJob> {
    let mut jobs = Vec::new();
    match geo {
        [g] => {
            let w = g.sumw();
            for i in 0..g.npatch() {
                for j in i..g.npatch() {
                    let (kind, fields, tot) = if i == j {
                        (JobKind::Auto, vec![(0, i)], 0.5 * w[i] * w[i])
                    } else {
                        (JobKind::Cross, vec![(0, i), (0, j)], w[i] * w[j])
                    };
                    jobs.push(PatchJob {
                        key: vec![i, j],
                        kind,
                        fields,
                        tot,
                        trivial: i != j && trivially_zero(g, i, g, j, metric, reach),
                    });
                }
            }
        }
        [g1, g2] => {
            for i in 0..g1.npatch() {
                for j in 0..g2.npatch() {
                    jobs.push(PatchJob {
                        key: vec![i, j],
                        kind: JobKind::Cross,
                        fields: vec![(0, i), (1, j)],
                        tot: g1.sumw()[i] * g2.sumw()[j],
                        trivial: trivially_zero(g1, i, g2, j, metric, reach),
                    });
                }
            }
        }
        _ => {}
    }
    jobs
}

/// Jobs of a 3-point correlation with 1 geometry (auto), 2 (1 vertex from
/// the first catalog, 2 from the second) or 3 (cross).
pub(crate) fn triple_jobs(geo: &[&PatchGeometry], metric: &Metric, reach: f64) -> Vec<PatchJob> {
    let mut jobs = Vec::new();
    let far = |a: usize, i: usize, b: usize, j: usize| trivially_zero(geo[a], i, geo[b], j, metric, reach);
    match geo.len() {
        1 => {
            let n = geo[0].npatch();
            let w = geo[0].sumw();
            for i in 0..n {
                for j in i..n {
                    for k in j..n {
                        let (kind, fields, tot) = if i == j && j == k {
                            (JobKind::Auto, vec![(0, i)], w[i].powi(3) / 6.0)
                        } else if i == j {
                            (JobKind::Cross12, vec![(0, k), (0, i)], 0.5 * w[i] * w[i] * w[k])
                        } else if j == k {
                            (JobKind::Cross12, vec![(0, i), (0, j)], 0.5 * w[i] * w[j] * w[j])
                        } else {
                            (JobKind::Cross, vec![(0, i), (0, j), (0, k)], w[i] * w[j] * w[k])
                        };
                        let trivial = far(0, i, 0, j) || far(0, i, 0, k) || far(0, j, 0, k);
                        jobs.push(PatchJob {
                            key: vec![i, j, k],
                            kind,
                            fields,
                            tot,
                            trivial,
                        });
                    }
                }
            }
        }
        2 => {
            let (w1, w2) = (geo[0].sumw(), geo[1].sumw());
            let n2 = geo[1].npatch();
            for i in 0..geo[0].npatch() {
                for j in 0..n2 {
                    for k in j..n2 {
                        let (kind, fields, tot) = if j == k {
                            (JobKind::Cross12, vec![(0, i), (1, j)], 0.5 * w1[i] * w2[j] * w2[j])
                        } else {
                            (JobKind::Cross, vec![(0, i), (1, j), (1, k)], w1[i] * w2[j] * w2[k])
                        };
                        let trivial = far(0, i, 1, j) || far(0, i, 1, k) || far(1, j, 1, k);
                        jobs.push(PatchJob {
                            key: vec![i, j, k],
                            kind,
                            fields,
                            tot,
                            trivial,
                        });
                    }
                }
            }
        }
        3 => {
            for i in 0..geo[0].npatch() {
                for j in 0..geo[1].npatch() {
                    for k in 0..geo[2].npatch() {
                        let tot = geo[0].sumw()[i] * geo[1].sumw()[j] * geo[2].sumw()[k];
                        let trivial = far(0, i, 1, j) || far(0, i, 2, k) || far(1, j, 2, k);
                        jobs.push(PatchJob {
                            key: vec![i, j, k],
                            kind: JobKind::Cross,
                            fields: vec![(0, i), (1, j), (2, k)],
                            tot,
                            trivial,
                        });
                    }
                }
            }
        }
        _ => {}
    }
    jobs
}

/// the rank that owns patch `i` when `n` patches are split over `size`
/// ranks (rank `r` owns the block `n*r/size..n*(r+1)/size`)
#[inline]
fn rank_of(i: usize, n: usize, size: usize) -> usize {
    (0..size).rev().find(|&r| n * r / size <= i).unwrap_or(0)
}

/// The rank responsible for a job. Patch pairs go to a rank that owns one
/// of the 2 patches, alternating between the first and the second so that
/// work spreads evenly. Patch triples go to the rank owning the majority of
/// the 3 patches.
pub(crate) fn owner(key: &[usize], n: usize, size: usize) -> usize {
    if size <= 1 {
        return 0;
    }
    let r = |i: usize| rank_of(i, n, size);
    match *key {
        [i, j] => {
            let (ri, rj) = (r(i), r(j));
            if ri == rj {
                ri
            } else if j.abs_diff(i) < n / 2 {
                if i % 2 == 0 { ri } else { rj }
            } else if j % 2 == 0 {
                rj
            } else {
                ri
            }
        }
        [i, j, k] => {
            let (ri, rj, rk) = (r(i), r(j), r(k));
            if ri == rj || ri == rk {
                ri
            } else if rj == rk {
                rj
            } else {
                r(key[(i + j + k) % 3])
            }
        }
        _ => 0,
    }
}

/// Lazily built fields of every catalog patch
pub(crate) struct FieldCache<'a> {
    cats: Vec<&'a PointSet>,
    members: Vec<Vec<Vec<usize>>>,
    opts: FieldOpts,
    fields: HashMap<(usize, usize), Field>,
    builds: HashMap<(usize, usize), usize>,
    low_mem: bool,
}

impl<'a> FieldCache<'a> {
    pub(crate) fn new(cats: Vec<&'a PointSet>, opts: FieldOpts, low_mem: bool) -> Self {
        let members = cats.iter().map(|c| c.patch_members()).collect();
        FieldCache {
            cats,
            members,
            opts,
            fields: HashMap::new(),
            builds: HashMap::new(),
            low_mem,
        }
    }

    fn ensure(&mut self, which: &[(usize, usize)]) -> Result<(), Error> {
        for &(c, p) in which {
            if self.fields.contains_key(&(c, p)) {
                continue;
            }
            let cat = self
                .cats
                .get(c)
                .ok_or(Error::internal("job refers to a missing catalog"))?;
            let members = self.members[c]
                .get(p)
                .ok_or(Error::internal("job refers to a missing patch"))?;
            let members = if cat.npatch() == 1 { None } else { Some(members.as_slice()) };
            let count = self.builds.entry((c, p)).or_insert(0);
            *count += 1;
            if *count > 1 {
                log::debug!("rebuilding the field of patch {p} of catalog {c}");
            }
            self.fields.insert((c, p), Field::build(cat, members, &self.opts));
        }
        Ok(())
    }

    fn get(&self, which: (usize, usize)) -> Result<&Field, Error> {
        self.fields
            .get(&which)
            .ok_or(Error::internal("field was not built"))
    }

    /// drop every field that isn't listed in `keep`
    fn release_except(&mut self, keep: &[(usize, usize)]) {
        self.fields.retain(|k, _| keep.contains(k));
    }

    /// the number of field builds beyond the first of each field
    pub(crate) fn n_rebuilds(&self) -> usize {
        self.builds.values().map(|&n| n.saturating_sub(1)).sum()
    }
}

/// Run the patch jobs owned by this rank, storing the outputs of every job
/// in `results` (one [`PatchResults`] per output), then share the results
/// between ranks.
///
/// `compute` returns one buffer per output.
pub(crate) fn run_patch_jobs<F>(
    jobs: &[PatchJob],
    cache: &mut FieldCache<'_>,
    comm: Option<&dyn Communicator>,
    results: &mut Vec<PatchResults>,
    mut compute: F,
) -> Result<(), Error>
where
    F: FnMut(&PatchJob, &[&Field]) -> Result<Vec<Vec<f64>>, Error>,
{
    let (rank, size) = comm.map_or((0, 1), |c| (c.rank(), c.size()));
    let n = results.first().map_or(1, PatchResults::max_npatch);
    let local: Vec<&PatchJob> = jobs.iter().filter(|job| owner(&job.key, n, size) == rank).collect();
    let n_trivial = local.iter().filter(|job| job.trivial).count();
    log::info!(
        "rank {rank}/{size}: processing {} patch combinations ({n_trivial} trivially zero)",
        local.len()
    );

    for (pos, job) in local.iter().enumerate() {
        if job.trivial {
            log::debug!("skipping patches {:?}: too far apart", job.key);
            for out in results.iter_mut() {
                out.insert(job.key.clone(), PatchResult { data: Vec::new(), tot: job.tot });
            }
        } else {
            log::debug!("processing patches {:?}", job.key);
            cache.ensure(&job.fields)?;
            let fields = job
                .fields
                .iter()
                .map(|&f| cache.get(f))
                .collect::<Result<Vec<_>, _>>()?;
            let outputs = compute(job, &fields)?;
            if outputs.len() != results.len() {
                return Err(Error::internal("wrong number of patch outputs"));
            }
            for (out, data) in results.iter_mut().zip(outputs) {
                out.insert(job.key.clone(), PatchResult { data, tot: job.tot });
            }
        }
        if cache.low_mem {
            let next = local[(pos + 1)..].iter().find(|j| !j.trivial);
            cache.release_except(next.map_or(&[][..], |j| &j.fields[..]));
        }
    }
    let rebuilds = cache.n_rebuilds();
    if rebuilds > 0 {
        log::warn!("low-memory mode rebuilt patch fields {rebuilds} times");
    }

    if let Some(comm) = comm {
        if comm.size() > 1 {
            share_results(results, comm)?;
        }
    }
    Ok(())
}

/// gather the results of every rank on rank 0, merge them and send the
/// merged results back
fn share_results(results: &mut Vec<PatchResults>, comm: &dyn Communicator) -> Result<(), Error> {
    if comm.rank() == 0 {
        for source in 1..comm.size() {
            let bytes = comm.recv(source)?;
            let other: Vec<PatchResults> = serde_json::from_slice(&bytes)?;
            if other.len() != results.len() {
                return Err(Error::comm(format!(
                    "rank {source} sent {} results, expected {}",
                    other.len(),
                    results.len()
                )));
            }
            for (mine, theirs) in results.iter_mut().zip(other) {
                mine.merge(theirs)?;
            }
        }
        let merged = serde_json::to_vec(&*results)?;
        for dest in 1..comm.size() {
            comm.send(dest, merged.clone())?;
        }
    } else {
        comm.send(0, serde_json::to_vec(&*results)?)?;
        *results = serde_json::from_slice(&comm.recv(0)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Euclidean;

    fn two_clumps() -> PointSet {
        let x = [0.0, 1.0, 0.5, 100.0, 101.0, 100.5];
        let y = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        PointSet::flat(&x, &y)
            .unwrap()
            .with_weights(&[1.0, 1.0, 2.0, 1.0, 3.0, 1.0])
            .unwrap()
            .with_patches(&[0, 0, 0, 1, 1, 1])
            .unwrap()
    }

    #[test]
    fn results_skip_empty_entries_and_merge() {
        let mut results = PatchResults::new(vec![2, 2]);
        results.insert(vec![0, 1], PatchResult { data: vec![0.0, 0.0], tot: 0.0 });
        assert_eq!(results, PatchResults::new(vec![2, 2]));
        results.insert(vec![0, 1], PatchResult { data: vec![0.0, 0.0], tot: 2.0 });
        results.insert(vec![0, 0], PatchResult { data: vec![1.0, 2.0], tot: 1.0 });
        let mut other = PatchResults::new(vec![2, 2]);
        other.insert(vec![0, 0], PatchResult { data: vec![1.0, 1.0], tot: 1.0 });
        results.merge(other).unwrap();
        assert_eq!(results.sum(2), (vec![2.0, 3.0], 4.0));
        let (data, tot) = results.sum_weighted(2, |key| if key.contains(&1) { 0.0 } else { 1.0 });
        assert_eq!((data, tot), (vec![2.0, 3.0], 2.0));

        let bytes = serde_json::to_vec(&results).unwrap();
        let back: PatchResults = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, results);

        assert!(results.merge(PatchResults::new(vec![3, 3])).is_err());
    }

    #[test]
    fn pair_jobs_and_trivial_zero() {
        let cat = two_clumps();
        let geo = PatchGeometry::new(&cat, false);
        let metric = Metric::Euclidean(Euclidean);
        let jobs = pair_jobs(&[&geo], &metric, 5.0);
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].tot, 0.5 * 16.0);
        assert_eq!(jobs[1].key, vec![0, 1]);
        assert_eq!(jobs[1].tot, 4.0 * 5.0);
        assert!(jobs[1].trivial);
        assert!(!jobs[2].trivial);
        // a larger reach keeps the cross job
        assert!(!pair_jobs(&[&geo], &metric, 60.0)[1].trivial);
    }

    #[test]
    fn triple_job_tots() {
        let cat = two_clumps();
        let geo = PatchGeometry::new(&cat, false);
        let metric = Metric::Euclidean(Euclidean);
        let jobs = triple_jobs(&[&geo], &metric, 1000.0);
        let keys: Vec<_> = jobs.iter().map(|j| j.key.clone()).collect();
        assert_eq!(keys, vec![vec![0, 0, 0], vec![0, 0, 1], vec![0, 1, 1], vec![1, 1, 1]]);
        // the two patches have sumw 4 and 5
        assert_eq!(jobs[0].tot, 64.0 / 6.0);
        assert_eq!(jobs[1].tot, 0.5 * 16.0 * 5.0);
        assert_eq!(jobs[1].fields, vec![(0, 1), (0, 0)]);
        assert_eq!(jobs[2].tot, 0.5 * 4.0 * 25.0);
        // the tots add up to (sum of w)^3 / 6
        let total: f64 = jobs.iter().map(|j| j.tot).sum();
        assert!((total - 9.0f64.powi(3) / 6.0).abs() < 1e-9);
    }

    #[test]
    fn owners_cover_ranks() {
        let n = 10;
        let size = 3;
        let mut counts = vec![0; size];
        for i in 0..n {
            for j in i..n {
                let r = owner(&[i, j], n, size);
                assert!(r < size);
                counts[r] += 1;
            }
        }
        assert!(counts.iter().all(|&c| c > 0));
        assert_eq!(owner(&[0, 0, 0], n, size), 0);
        assert_eq!(owner(&[9, 9, 9], n, size), 2);
        assert_eq!(owner(&[3, 7], n, 1), 0);
    }

    #[test]
    fn patch_counts() {
        assert_eq!(common_npatch(&[4, 1]).unwrap(), 4);
        assert_eq!(common_npatch(&[1, 1, 1]).unwrap(), 1);
        assert!(common_npatch(&[4, 3]).is_err());
    }
}
