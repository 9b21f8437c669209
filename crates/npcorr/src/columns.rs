//! Conversion between statepacks and named output columns.
//!
//! The output components of a reducer line up with its registers: output
//! `o` of a bin is register `o` (the counts and the weight) or register `o`
//! divided by the weight (every mean). That lets a table of outputs be
//! turned back into a statepack.

use crate::error::Error;
use ndarray::Array2;
use npcorr_nostd_internal::{Reducer, StatePackView};
use std::collections::HashMap;

/// compute every output component of every bin. Returns one row per output
/// name (in the order of the reducer's output description).
pub(crate) fn outputs_from_statepack(
    reducer: &impl Reducer,
    n_bins: usize,
    data: &[f64],
) -> Result<Vec<(&'static str, Vec<f64>)>, Error> {
    let names = reducer.output_descr().names();
    let pack = StatePackView::from_slice(n_bins, reducer.accum_state_size(), data)
        .map_err(Error::internal)?;
    let mut out = Array2::<f64>::zeros((names.len(), n_bins));
    for i in 0..n_bins {
        let mut col = out.column_mut(i);
        reducer.value_from_accum_state(&mut col, &pack.get_state(i));
    }
    Ok(names
        .iter()
        .copied()
        .zip(out.rows().into_iter().map(|row| row.to_vec()))
        .collect())
}

/// Rebuild a statepack from output columns. Means of empty bins are
/// ignored (their registers are 0 regardless).
pub(crate) fn statepack_from_outputs(
    reducer: &impl Reducer,
    n_bins: usize,
    columns: &HashMap<&'static str, Vec<f64>>,
) -> Result<Vec<f64>, Error> {
    let names = reducer.output_descr().names();
    let fetch = |name: &str| -> Result<&[f64], Error> {
        match columns.get(name) {
            Some(col) if col.len() == n_bins => Ok(col.as_slice()),
            Some(_) => Err(Error::serialization(format!("column {name} has the wrong length"))),
            None => Err(Error::serialization(format!("column {name} is missing"))),
        }
    };
    let weight = fetch(names[1])?;
    let mut data = vec![0.0; n_bins * names.len()];
    for (o, name) in names.iter().enumerate() {
        let col = fetch(name)?;
        for i in 0..n_bins {
            data[o * n_bins + i] = match o {
                0 | 1 => col[i],
                _ if weight[i] == 0.0 => 0.0,
                _ => col[i] * weight[i],
            };
        }
    }
    Ok(data)
}

/// elementwise `dst += src`
pub(crate) fn add_assign(dst: &mut [f64], src: &[f64]) {
    for (a, b) in dst.iter_mut().zip(src) {
        *a += b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npcorr_nostd_internal::{PairDatum, PairReducer, StatePackViewMut, ValueKind};

    #[test]
    fn outputs_and_back() {
        let reducer = PairReducer::new(ValueKind::Scalar);
        let mut data = vec![0.0; 2 * reducer.accum_state_size()];
        let mut pack = StatePackViewMut::from_slice(2, reducer.accum_state_size(), &mut data).unwrap();
        let datum = PairDatum {
            npairs: 1.0,
            weight: 2.0,
            r: 4.0,
            logr: 4.0f64.ln(),
            zeta: [3.0, 0.0, 0.0, 0.0],
        };
        reducer.consume(&mut pack.get_state_mut(1), &datum);

        let outputs = outputs_from_statepack(&reducer, 2, &data).unwrap();
        let names: Vec<_> = outputs.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["npairs", "weight", "meanr", "meanlogr", "xi"]);
        let columns: HashMap<_, _> = outputs.into_iter().collect();
        assert_eq!(columns["meanr"][1], 4.0);
        assert_eq!(columns["xi"][1], 1.5);
        assert!(columns["meanr"][0].is_nan());

        let back = statepack_from_outputs(&reducer, 2, &columns).unwrap();
        assert_eq!(back, data);
    }
}
