// this defines some basic utilities used in reductions.

use crate::reducer::Reducer;
use crate::state::{StatePackView, StatePackViewMut};

/// merge every accum_state of `other` into the matching accum_state of
/// `statepack`
pub fn merge_full_statepacks(
    reducer: &impl Reducer,
    statepack: &mut StatePackViewMut,
    other: &StatePackView,
) -> Result<(), &'static str> {
    if statepack.n_states() != other.n_states() || statepack.state_size() != other.state_size() {
        return Err("statepacks have inconsistent shapes");
    }
    for i in 0..statepack.n_states() {
        reducer.merge(&mut statepack.get_state_mut(i), &other.get_state(i));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::{PairDatum, PairReducer, ValueKind};

    #[test]
    fn merge() {
        let reducer = PairReducer::new(ValueKind::Count);
        let mut buf_a = [0.0; 8];
        let mut buf_b = [0.0; 8];
        let mut a = StatePackViewMut::from_slice(2, 4, &mut buf_a).unwrap();

        let mut b = StatePackViewMut::from_slice(2, 4, &mut buf_b).unwrap();
        let datum = PairDatum {
            npairs: 2.0,
            weight: 1.5,
            r: 1.0,
            logr: 0.0,
            zeta: [0.0; 4],
        };
        reducer.consume(&mut b.get_state_mut(1), &datum);
        merge_full_statepacks(&reducer, &mut a, &b.as_view()).unwrap();
        merge_full_statepacks(&reducer, &mut a, &b.as_view()).unwrap();
        assert_eq!(a.get_state(1)[PairReducer::NPAIRS], 4.0);
        assert_eq!(a.get_state(1)[PairReducer::WEIGHT], 3.0);
        assert_eq!(a.get_state(0)[PairReducer::NPAIRS], 0.0);
    }

    #[test]
    fn mismatched_shapes() {
        let reducer = PairReducer::new(ValueKind::Count);
        let mut buf_a = [0.0; 8];
        let buf_b = [0.0; 12];
        let mut a = StatePackViewMut::from_slice(2, 4, &mut buf_a).unwrap();
        let b = StatePackView::from_slice(3, 4, &buf_b).unwrap();
        assert!(merge_full_statepacks(&reducer, &mut a, &b).is_err());
    }
}
