//! Per-bin accumulator storage.
//!
//! A statepack holds the registers of every bin in one flat `[f64]`, laid
//! out register-major: register `r` of bin `b` sits at `r * n_bins + b`.
//! Merging two statepacks (or summing the per-thread buffers of a pool) is
//! then a single elementwise pass, and the registers of one bin are reached
//! through a strided view rather than a subslice.
//!
//! Strided views can't be expressed as unsized slice wrappers, so the shared
//! and exclusive flavors are separate types built on demand.
use core::{
    num::NonZeroUsize,
    ops::{Index, IndexMut},
};

/// Shape of a statepack: how many bins and how many registers per bin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Layout {
    n_bins: NonZeroUsize,
    n_registers: NonZeroUsize,
}

impl Layout {
    fn checked(n_bins: usize, n_registers: usize, available: usize) -> Result<Self, &'static str> {
        let n_bins = NonZeroUsize::new(n_bins).ok_or("a statepack needs at least one bin")?;
        let n_registers =
            NonZeroUsize::new(n_registers).ok_or("an accum_state needs at least one register")?;
        let needed = n_bins
            .get()
            .checked_mul(n_registers.get())
            .ok_or("statepack size overflows usize")?;
        if needed > available {
            return Err("buffer is too short for the statepack");
        }
        Ok(Self {
            n_bins,
            n_registers,
        })
    }

    #[inline(always)]
    fn stride(&self) -> usize {
        self.n_bins.get()
    }

    /// the subslice running from register 0 of `bin` to its last register
    #[inline(always)]
    fn span(&self, bin: usize) -> core::ops::Range<usize> {
        assert!(bin < self.n_bins.get(), "bin index out of range");
        bin..(bin + (self.n_registers.get() - 1) * self.stride() + 1)
    }
}

/// Read-only view of one bin's registers.
pub struct AccumStateView<'a> {
    regs: &'a [f64],
    stride: usize,
    len: NonZeroUsize,
}

impl AccumStateView<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        self.len.get()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Index<usize> for AccumStateView<'_> {
    type Output = f64;

    #[inline(always)]
    fn index(&self, register: usize) -> &f64 {
        &self.regs[register * self.stride]
    }
}

/// Mutable view of one bin's registers.
pub struct AccumStateViewMut<'a> {
    regs: &'a mut [f64],
    stride: usize,
    len: NonZeroUsize,
}

impl<'a> AccumStateViewMut<'a> {
    /// Wraps a standalone accum_state whose registers are adjacent.
    pub fn from_contiguous_slice(regs: &'a mut [f64]) -> Result<Self, &'static str> {
        let len = NonZeroUsize::new(regs.len()).ok_or("an accum_state needs at least one register")?;
        Ok(Self {
            regs,
            stride: 1,
            len,
        })
    }

    pub fn as_view(&self) -> AccumStateView<'_> {
        AccumStateView {
            regs: &*self.regs,
            stride: self.stride,
            len: self.len,
        }
    }

    pub fn fill(&mut self, val: f64) {
        self.regs
            .iter_mut()
            .step_by(self.stride)
            .take(self.len.get())
            .for_each(|r| *r = val);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len.get()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Index<usize> for AccumStateViewMut<'_> {
    type Output = f64;

    #[inline(always)]
    fn index(&self, register: usize) -> &f64 {
        &self.regs[register * self.stride]
    }
}

impl IndexMut<usize> for AccumStateViewMut<'_> {
    #[inline(always)]
    fn index_mut(&mut self, register: usize) -> &mut f64 {
        &mut self.regs[register * self.stride]
    }
}

/// Read-only statepack over a borrowed buffer.
pub struct StatePackView<'a> {
    data: &'a [f64],
    layout: Layout,
}

impl<'a> StatePackView<'a> {
    /// `data` may be longer than `n_states * state_size`; the tail is ignored.
    pub fn from_slice(
        n_states: usize,
        state_size: usize,
        data: &'a [f64],
    ) -> Result<Self, &'static str> {
        let layout = Layout::checked(n_states, state_size, data.len())?;
        Ok(Self { data, layout })
    }

    pub fn as_slice(&self) -> &[f64] {
        self.data
    }

    #[inline]
    pub fn get_state(&self, i: usize) -> AccumStateView<'_> {
        AccumStateView {
            regs: &self.data[self.layout.span(i)],
            stride: self.layout.stride(),
            len: self.layout.n_registers,
        }
    }

    #[inline]
    pub fn state_size(&self) -> usize {
        self.layout.n_registers.get()
    }

    #[inline]
    pub fn n_states(&self) -> usize {
        self.layout.n_bins.get()
    }
}

/// Mutable statepack over a borrowed buffer. Only a single-bin pack hands
/// out contiguous accum_states.
pub struct StatePackViewMut<'a> {
    data: &'a mut [f64],
    layout: Layout,
}

impl<'a> StatePackViewMut<'a> {
    pub fn from_slice(
        n_states: usize,
        state_size: usize,
        data: &'a mut [f64],
    ) -> Result<Self, &'static str> {
        let layout = Layout::checked(n_states, state_size, data.len())?;
        Ok(Self { data, layout })
    }

    pub fn as_slice(&self) -> &[f64] {
        &*self.data
    }

    pub fn as_view(&self) -> StatePackView<'_> {
        StatePackView {
            data: &*self.data,
            layout: self.layout,
        }
    }

    #[inline]
    pub fn get_state(&self, i: usize) -> AccumStateView<'_> {
        AccumStateView {
            regs: &self.data[self.layout.span(i)],
            stride: self.layout.stride(),
            len: self.layout.n_registers,
        }
    }

    #[inline]
    pub fn get_state_mut(&mut self, i: usize) -> AccumStateViewMut<'_> {
        let span = self.layout.span(i);
        AccumStateViewMut {
            regs: &mut self.data[span],
            stride: self.layout.stride(),
            len: self.layout.n_registers,
        }
    }

    #[inline]
    pub fn state_size(&self) -> usize {
        self.layout.n_registers.get()
    }

    #[inline]
    pub fn n_states(&self) -> usize {
        self.layout.n_bins.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_major_layout() {
        // 3 bins with 2 registers each
        let mut buf = [0.0; 6];
        let mut pack = StatePackViewMut::from_slice(3, 2, &mut buf).unwrap();
        {
            let mut state = pack.get_state_mut(1);
            state[0] = 5.0;
            state[1] = 7.0;
        }
        assert_eq!(pack.as_slice(), &[0.0, 5.0, 0.0, 0.0, 7.0, 0.0]);
        let view = pack.as_view();
        assert_eq!(view.get_state(1)[1], 7.0);
        assert_eq!(view.get_state(2)[0], 0.0);
        assert_eq!(view.get_state(2).len(), 2);
    }

    #[test]
    fn rejects_bad_buffers() {
        let mut buf = [0.0; 5];
        assert!(StatePackViewMut::from_slice(3, 2, &mut buf).is_err());
        assert!(StatePackViewMut::from_slice(0, 2, &mut buf).is_err());
        assert!(StatePackView::from_slice(1, 0, &buf).is_err());
        assert!(AccumStateViewMut::from_contiguous_slice(&mut []).is_err());
    }

    #[test]
    fn fill_touches_one_bin() {
        let mut buf = [1.0; 6];
        let mut pack = StatePackViewMut::from_slice(2, 3, &mut buf).unwrap();
        pack.get_state_mut(0).fill(0.0);
        assert_eq!(pack.as_slice(), &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn last_bin_span() {
        let buf = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let pack = StatePackView::from_slice(3, 3, &buf).unwrap();
        let last = pack.get_state(2);
        assert_eq!((last[0], last[1], last[2]), (2.0, 5.0, 8.0));
    }
}
