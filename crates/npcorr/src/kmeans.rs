//! Patch assignment by k-means.
//!
//! The initial centers come from recursively bisecting the point set (the
//! largest group is split at the median of its widest axis), which makes the
//! result deterministic. Lloyd iterations then refine the centers.

use crate::error::Error;
use crate::metric::{Pos, dot, norm, sub};
use rayon::prelude::*;

const MAX_ITER: usize = 100;

fn widest_axis(pos: &[Pos], indices: &[usize]) -> usize {
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for &i in indices {
        for k in 0..3 {
            lo[k] = lo[k].min(pos[i][k]);
            hi[k] = hi[k].max(pos[i][k]);
        }
    }
    let mut axis = 0;
    for k in 1..3 {
        if hi[k] - lo[k] > hi[axis] - lo[axis] {
            axis = k;
        }
    }
    axis
}

/// weighted centroid (falls back to the plain mean when the weights sum to 0)
fn centroid(pos: &[Pos], w: &[f64], indices: impl Iterator<Item = usize> + Clone) -> Pos {
    let mut out = [0.0; 3];
    let mut sumw = 0.0;
    for i in indices.clone() {
        for k in 0..3 {
            out[k] += w[i] * pos[i][k];
        }
        sumw += w[i];
    }
    if sumw != 0.0 {
        out.map(|x| x / sumw)
    } else {
        let mut n = 0.0;
        out = [0.0; 3];
        for i in indices {
            for k in 0..3 {
                out[k] += pos[i][k];
            }
            n += 1.0;
        }
        out.map(|x| x / n)
    }
}

fn project_to_sphere(p: Pos) -> Pos {
    let n = norm(&p);
    if n > 0.0 { p.map(|x| x / n) } else { p }
}

fn initial_centers(pos: &[Pos], w: &[f64], npatch: usize) -> Vec<Pos> {
    let mut groups: Vec<Vec<usize>> = vec![(0..pos.len()).collect()];
    while groups.len() < npatch {
        // split the most populous group (the first one in case of a tie)
        let (idx, _) = groups
            .iter()
            .enumerate()
            .fold((0, 0), |best, (i, g)| if g.len() > best.1 { (i, g.len()) } else { best });
        let mut group = groups.swap_remove(idx);
        let axis = widest_axis(pos, &group);
        let mid = group.len() / 2;
        group.select_nth_unstable_by(mid, |a, b| pos[*a][axis].total_cmp(&pos[*b][axis]));
        let right = group.split_off(mid);
        groups.push(group);
        groups.push(right);
    }
    groups
        .iter()
        .map(|g| centroid(pos, w, g.iter().copied()))
        .collect()
}

#[inline]
fn nearest(p: &Pos, centers: &[Pos]) -> usize {
    let mut best = 0;
    let mut best_d2 = f64::INFINITY;
    for (i, c) in centers.iter().enumerate() {
        let delta = sub(p, c);
        let d2 = dot(&delta, &delta);
        if d2 < best_d2 {
            best_d2 = d2;
            best = i;
        }
    }
    best
}

/// the label of the nearest center for every position
pub(crate) fn assign_patches(pos: &[Pos], centers: &[Pos]) -> Vec<usize> {
    pos.par_iter().map(|p| nearest(p, centers)).collect()
}

/// Partition `pos` into `npatch` patches. Returns the label of every point
/// and the patch centers.
pub(crate) fn kmeans(
    pos: &[Pos],
    w: &[f64],
    npatch: usize,
    spherical: bool,
) -> Result<(Vec<usize>, Vec<Pos>), Error> {
    if npatch == 0 {
        return Err(Error::parameter("npatch", "must be positive"));
    } else if npatch > pos.len() {
        return Err(Error::parameter(
            "npatch",
            format!("can't make {npatch} patches from {} points", pos.len()),
        ));
    }

    let mut centers = initial_centers(pos, w, npatch);
    if spherical {
        centers = centers.into_iter().map(project_to_sphere).collect();
    }
    let mut labels = assign_patches(pos, &centers);

    for iteration in 0..MAX_ITER {
        // recompute the centers; an emptied patch keeps its old center
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); npatch];
        for (i, &label) in labels.iter().enumerate() {
            members[label].push(i);
        }
        for (center, idx) in centers.iter_mut().zip(&members) {
            if !idx.is_empty() {
                let c = centroid(pos, w, idx.iter().copied());
                *center = if spherical { project_to_sphere(c) } else { c };
            }
        }

        let new_labels = assign_patches(pos, &centers);
        let n_changed = new_labels
            .iter()
            .zip(&labels)
            .filter(|(a, b)| a != b)
            .count();
        labels = new_labels;
        if n_changed == 0 {
            log::debug!("k-means converged after {} iterations", iteration + 1);
            break;
        }
    }
    Ok((labels, centers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separated_clusters() {
        // 3 well separated clumps
        let mut pos = Vec::new();
        for (cx, cy) in [(0.0, 0.0), (100.0, 0.0), (200.0, 0.0)] {
            for i in 0..10 {
                let dx = (i % 3) as f64;
                let dy = (i / 3) as f64;
                pos.push([cx + dx, cy + dy, 0.0]);
            }
        }
        let w = vec![1.0; pos.len()];
        let (labels, centers) = kmeans(&pos, &w, 3, false).unwrap();
        assert_eq!(centers.len(), 3);
        for clump in labels.chunks(10) {
            assert!(clump.iter().all(|&l| l == clump[0]));
        }
        assert_ne!(labels[0], labels[10]);
        assert_ne!(labels[0], labels[20]);
        assert_ne!(labels[10], labels[20]);
    }

    #[test]
    fn bad_npatch() {
        let pos = vec![[0.0; 3]; 4];
        let w = vec![1.0; 4];
        assert!(kmeans(&pos, &w, 0, false).is_err());
        assert!(kmeans(&pos, &w, 5, false).is_err());
    }

    #[test]
    fn deterministic() {
        let pos: Vec<Pos> = (0..50)
            .map(|i| {
                let t = i as f64 * 0.37;
                [t.cos() * (1.0 + t), t.sin() * (1.0 + t), 0.0]
            })
            .collect();
        let w = vec![1.0; pos.len()];
        let a = kmeans(&pos, &w, 5, false).unwrap();
        let b = kmeans(&pos, &w, 5, false).unwrap();
        assert_eq!(a.0, b.0);
    }
}
