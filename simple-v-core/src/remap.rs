//! REMAP index generation.
//!
//! Turns a [`ShapeDescriptor`] plus a linear step number into the physical
//! element index that step touches. Every algorithm here is a pure function of
//! `(shape, step)`: computing step `k` never depends on having computed any
//! earlier step. That restartability is a hard requirement, not an
//! optimization — an interrupt may suspend a vector loop between any two
//! elements, and the resumed loop must pick up at an arbitrary step without
//! replaying the schedule from zero.
//!
//! Four schedules are implemented (selected by [`ShapeMode`]):
//!
//! - *linear*: identity, with optional offset-modulo wrap;
//! - *FFT*: the iterative radix-2 Cooley-Tukey butterfly pattern, `size`
//!   doubling from 2 up to `n`, expressed as a flat-counter decomposition;
//! - *DCT*: the mirrored butterfly pairing `(i+j, i+size-1-j)` with the
//!   half-reversal input permutation of the DCT-II (or its inverse for
//!   DCT-III);
//! - *matrix*: up to three nested counters with arbitrary nesting order,
//!   per-dimension reversal, dimension elimination and offset-modulo wrap.

use crate::shape::{DctVariant, ShapeDescriptor, ShapeMode};

/// The result of one schedule step.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RemapStep {
    /// The physical element index selected by the shape's `skip` field.
    pub value: u32,
    /// Loop-boundary mask: bit `i` is set when nesting level `i` (0 =
    /// innermost) finishes with this step. For butterflies, bit 0 marks the
    /// end of a butterfly row, bit 1 the end of a block, bit 2 the end of a
    /// `size` layer. Callers use this to detect size-boundary crossings.
    pub loop_ends: u8,
}

impl ShapeDescriptor {
    /// The number of steps in one full pass of this shape's schedule.
    pub fn element_count(&self) -> u32 {
        match self.mode {
            ShapeMode::Linear | ShapeMode::Matrix => self.dim(0) * self.dim(1) * self.dim(2),
            // log2(n) layers of n/2 butterflies each.
            ShapeMode::Fft | ShapeMode::Dct(_) => {
                let n = self.lims[0];
                (n / 2) * n.trailing_zeros()
            }
        }
    }

    /// Computes the element index for `step`, a pure function of its inputs.
    ///
    /// `step` must be below [`element_count`](Self::element_count) for
    /// butterfly and matrix shapes. The shape must have passed
    /// [`validate`](Self::validate).
    pub fn index(&self, step: u32) -> RemapStep {
        match self.mode {
            ShapeMode::Linear => self.linear_index(step),
            ShapeMode::Fft => self.fft_index(step),
            ShapeMode::Dct(variant) => self.dct_index(step, variant),
            ShapeMode::Matrix => self.matrix_index(step),
        }
    }

    /// Restart-capable iterator over the whole schedule.
    ///
    /// Purely a convenience wrapper: `nth` is as cheap as `next` because each
    /// step is computed directly.
    pub fn indices(&self) -> RemapIter<'_> {
        RemapIter {
            shape: self,
            step: 0,
            count: self.element_count(),
        }
    }

    fn linear_index(&self, step: u32) -> RemapStep {
        let n = self.lims[0];
        let mut position = step;
        if n != 0 {
            if self.invxyz[0] {
                position = n - 1 - (step % n);
            }
            position = wrap(position, self.offset, n);
        } else if self.offset != 0 {
            position = (position as i64 + self.offset as i64) as u32;
        }
        RemapStep {
            value: position,
            loop_ends: (n != 0 && step % n == n - 1) as u8,
        }
    }

    fn fft_index(&self, step: u32) -> RemapStep {
        let n = self.lims[0];
        let half = n / 2;
        let layers = n.trailing_zeros();
        // Flat counter -> (size, block, butterfly-row) decomposition of the
        // iterative Cooley-Tukey loops, so any step maps directly without
        // replaying earlier layers.
        let layer = step / half;
        let row = step % half;
        let size = 2u32 << layer;
        let halfsize = size / 2;
        let blocks = n / size;
        let block = row / halfsize;
        let raw_j = row % halfsize;
        let j = if self.invxyz[0] {
            halfsize - 1 - raw_j
        } else {
            raw_j
        };
        let low = block * size + j;
        let value = match self.skip {
            0 => wrap(low, self.offset, n),
            1 => wrap(low + halfsize, self.offset, n),
            // Twiddle index: offset applies, but no wrap (it indexes a
            // separate coefficient table, not the data vector).
            2 => (j * (n / size)).wrapping_add_signed(self.offset),
            _ => unreachable!("validated shape"),
        };
        RemapStep {
            value,
            loop_ends: butterfly_ends(
                raw_j == halfsize - 1,
                block == blocks - 1,
                layer == layers - 1,
            ),
        }
    }

    fn dct_index(&self, step: u32, variant: DctVariant) -> RemapStep {
        let n = self.lims[0];
        let half = n / 2;
        let layers = n.trailing_zeros();
        let layer = step / half;
        let row = step % half;
        // DCT-II recursion splits from the full vector downwards; the inverse
        // walks the layers in the opposite direction.
        let size = if variant.is_inverse() {
            2u32 << layer
        } else {
            n >> layer
        };
        let halfsize = size / 2;
        let blocks = n / size;
        let block = row / halfsize;
        let raw_j = row % halfsize;
        let j = if self.invxyz[0] {
            halfsize - 1 - raw_j
        } else {
            raw_j
        };
        let base = block * size;
        let position = match self.skip {
            0 => base + j,
            // The mirrored twin: pairs close in from both ends of the block.
            1 => base + size - 1 - j,
            2 => {
                // Layer-local coefficient index; offset applies, no wrap.
                return RemapStep {
                    value: j.wrapping_add_signed(self.offset),
                    loop_ends: butterfly_ends(
                        raw_j == halfsize - 1,
                        block == blocks - 1,
                        layer == layers - 1,
                    ),
                };
            }
            3 => {
                // Coefficient-table size for this layer.
                return RemapStep {
                    value: size,
                    loop_ends: butterfly_ends(
                        raw_j == halfsize - 1,
                        block == blocks - 1,
                        layer == layers - 1,
                    ),
                };
            }
            _ => unreachable!("validated shape"),
        };
        let permuted = if variant.is_raw() {
            position
        } else if variant.is_inverse() {
            halfrev_inverse(n, position)
        } else {
            halfrev(n, position)
        };
        RemapStep {
            value: wrap(permuted, self.offset, n),
            loop_ends: butterfly_ends(
                raw_j == halfsize - 1,
                block == blocks - 1,
                layer == layers - 1,
            ),
        }
    }

    fn matrix_index(&self, step: u32) -> RemapStep {
        let dims = [self.dim(0), self.dim(1), self.dim(2)];
        // Decompose the flat step into one counter per dimension, walking the
        // nesting levels innermost first as `order` dictates.
        let mut remainder = step;
        let mut raw = [0u32; 3];
        let mut loop_ends = 0u8;
        let mut inner_done = true;
        for (level, &axis) in self.order.iter().enumerate() {
            let axis = axis as usize;
            raw[axis] = remainder % dims[axis];
            remainder /= dims[axis];
            inner_done &= raw[axis] == dims[axis] - 1;
            if inner_done {
                loop_ends |= 1 << level;
            }
        }
        let mut counters = [0u32; 3];
        for axis in 0..3 {
            counters[axis] = if self.invxyz[axis] {
                dims[axis] - 1 - raw[axis]
            } else {
                raw[axis]
            };
        }
        // skip = d+1 eliminates dimension d, giving broadcast along it (e.g.
        // the operand of a matrix multiply that does not vary along a loop).
        if self.skip != 0 {
            counters[self.skip as usize - 1] = 0;
        }
        let index = (counters[2] * dims[1] + counters[1]) * dims[0] + counters[0];
        RemapStep {
            value: wrap(index, self.offset, dims[0] * dims[1] * dims[2]),
            loop_ends,
        }
    }
}

/// Adds `offset` to `position`, wrapping into `0..modulo`.
fn wrap(position: u32, offset: i32, modulo: u32) -> u32 {
    (position as i64 + offset as i64).rem_euclid(modulo as i64) as u32
}

/// Packs the three butterfly loop-boundary flags into a mask, outer bits only
/// valid together with all inner ones.
fn butterfly_ends(row_end: bool, block_end: bool, layer_end: bool) -> u8 {
    let b0 = row_end;
    let b1 = b0 && block_end;
    let b2 = b1 && layer_end;
    (b0 as u8) | (b1 as u8) << 1 | (b2 as u8) << 2
}

/// The DCT-II input half-reversal: butterfly position `x` reads original
/// element `2x` in the first half and the odd elements mirrored back in the
/// second half. A bijection on `0..n`.
fn halfrev(n: u32, x: u32) -> u32 {
    if x < n / 2 {
        2 * x
    } else {
        2 * (n - 1 - x) + 1
    }
}

/// Inverse of [`halfrev`], used by the DCT-III variants.
fn halfrev_inverse(n: u32, y: u32) -> u32 {
    if y % 2 == 0 {
        y / 2
    } else {
        n - 1 - (y - 1) / 2
    }
}

/// Restart-capable iterator over a shape's schedule.
#[derive(Debug, Clone)]
pub struct RemapIter<'a> {
    shape: &'a ShapeDescriptor,
    step: u32,
    count: u32,
}

impl Iterator for RemapIter<'_> {
    type Item = RemapStep;

    fn next(&mut self) -> Option<RemapStep> {
        (self.step < self.count).then(|| {
            let result = self.shape.index(self.step);
            self.step += 1;
            result
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.count - self.step) as usize;
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<RemapStep> {
        // Direct jump; no replay needed.
        self.step = self.step.saturating_add(n as u32);
        self.next()
    }
}

impl ExactSizeIterator for RemapIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{DctVariant, ShapeDescriptor};
    use std::collections::BTreeSet;

    fn values(shape: &ShapeDescriptor) -> Vec<u32> {
        shape.indices().map(|s| s.value).collect()
    }

    #[test]
    fn test_linear_identity() {
        let shape = ShapeDescriptor::identity();
        for step in [0, 1, 17, 126] {
            assert_eq!(step, shape.index(step).value);
        }
    }

    #[test]
    fn test_linear_offset_modulo() {
        // "Every Nth register" access: offset 3 into a ring of 5.
        let mut shape = ShapeDescriptor::identity();
        shape.lims = [5, 0, 0];
        shape.offset = 3;
        assert_eq!(vec![3, 4, 0, 1, 2], values(&shape));
        shape.invxyz[0] = true;
        assert_eq!(vec![2, 1, 0, 4, 3], values(&shape));
    }

    #[test]
    fn test_restartability() {
        // Generating indices sequentially for 0..k2 equals generating the
        // index at k2 directly, for every shape kind.
        let shapes = [
            ShapeDescriptor::matrix([3, 4, 2], [1, 0, 2], [true, false, false]),
            ShapeDescriptor::fft(16, 1),
            ShapeDescriptor::dct(16, DctVariant::TypeTwo, 0),
            ShapeDescriptor::dct(8, DctVariant::TypeThreeRaw, 1),
        ];
        for shape in &shapes {
            let sequential: Vec<_> = shape.indices().collect();
            for (k, &expected) in sequential.iter().enumerate() {
                assert_eq!(expected, shape.index(k as u32), "shape {shape:?} step {k}");
            }
            // nth() jumps directly.
            assert_eq!(Some(sequential[5]), shape.indices().nth(5));
        }
    }

    #[test]
    fn test_matrix_nesting_order() {
        // 2 wide (x) by 3 tall (y), x innermost: row-major walk.
        let shape = ShapeDescriptor::matrix([2, 3, 0], [0, 1, 2], [false; 3]);
        assert_eq!(vec![0, 1, 2, 3, 4, 5], values(&shape));
        // y innermost: column-major walk of the same space.
        let shape = ShapeDescriptor::matrix([2, 3, 0], [1, 0, 2], [false; 3]);
        assert_eq!(vec![0, 2, 4, 1, 3, 5], values(&shape));
    }

    #[test]
    fn test_matrix_inversion_and_offset() {
        let mut shape = ShapeDescriptor::matrix([4, 0, 0], [0, 1, 2], [true, false, false]);
        assert_eq!(vec![3, 2, 1, 0], values(&shape));
        shape.offset = 2;
        assert_eq!(vec![1, 0, 3, 2], values(&shape));
    }

    #[test]
    fn test_matrix_dimension_skip() {
        // Eliminating y broadcasts the x row across the y loop.
        let mut shape = ShapeDescriptor::matrix([2, 3, 0], [0, 1, 2], [false; 3]);
        shape.skip = 2;
        assert_eq!(vec![0, 1, 0, 1, 0, 1], values(&shape));
    }

    #[test]
    fn test_matrix_loop_ends() {
        let shape = ShapeDescriptor::matrix([2, 2, 0], [0, 1, 2], [false; 3]);
        let ends: Vec<_> = shape.indices().map(|s| s.loop_ends).collect();
        // Inner loop ends every 2 steps; both outer bits fire on the last.
        assert_eq!(vec![0b000, 0b001, 0b000, 0b111], ends);
    }

    #[test]
    fn test_fft_schedule_n8() {
        let n = 8;
        let low = ShapeDescriptor::fft(n, 0);
        let high = ShapeDescriptor::fft(n, 1);
        let twiddle = ShapeDescriptor::fft(n, 2);
        assert_eq!(12, low.element_count());
        // First layer (size=2): adjacent pairs, twiddle always 0.
        let lows = values(&low);
        let highs = values(&high);
        let twiddles = values(&twiddle);
        assert_eq!(&[0, 2, 4, 6], &lows[0..4]);
        assert_eq!(&[1, 3, 5, 7], &highs[0..4]);
        assert_eq!(&[0, 0, 0, 0], &twiddles[0..4]);
        // Final layer (size=8): one block, stride-1 twiddles.
        assert_eq!(&[0, 1, 2, 3], &lows[8..12]);
        assert_eq!(&[4, 5, 6, 7], &highs[8..12]);
        assert_eq!(&[0, 1, 2, 3], &twiddles[8..12]);
    }

    #[test]
    fn test_butterfly_completeness() {
        // For each size layer, the (low, high) pairs must form a permutation
        // of 0..n: no collisions, no omissions.
        let n = 16u32;
        for shape in [
            (ShapeDescriptor::fft(n, 0), ShapeDescriptor::fft(n, 1)),
            (
                ShapeDescriptor::dct(n, DctVariant::TypeTwo, 0),
                ShapeDescriptor::dct(n, DctVariant::TypeTwo, 1),
            ),
            (
                ShapeDescriptor::dct(n, DctVariant::TypeThree, 0),
                ShapeDescriptor::dct(n, DctVariant::TypeThree, 1),
            ),
            (
                ShapeDescriptor::dct(n, DctVariant::TypeTwoRaw, 0),
                ShapeDescriptor::dct(n, DctVariant::TypeTwoRaw, 1),
            ),
        ] {
            let (low, high) = shape;
            let half = n / 2;
            for layer in 0..n.trailing_zeros() {
                let mut touched = BTreeSet::new();
                for row in 0..half {
                    let step = layer * half + row;
                    assert!(touched.insert(low.index(step).value), "low collision");
                    assert!(touched.insert(high.index(step).value), "high collision");
                }
                assert_eq!((0..n).collect::<BTreeSet<_>>(), touched, "layer {layer}");
            }
        }
    }

    #[test]
    fn test_fft_layer_end_mask() {
        let shape = ShapeDescriptor::fft(8, 0);
        let ends: Vec<_> = shape.indices().map(|s| s.loop_ends).collect();
        // Bit 0 ends a butterfly row, bit 1 the block loop, bit 2 the layer
        // loop; outer bits only fire together with all inner ones.
        assert_eq!(
            vec![
                0b001, 0b001, 0b001, 0b011, // layer 0: 4 single-row blocks
                0b000, 0b001, 0b000, 0b011, // layer 1: 2 blocks of 2 rows
                0b000, 0b000, 0b000, 0b111, // layer 2: 1 block of 4 rows
            ],
            ends
        );
    }

    #[test]
    fn test_dct_coefficient_outputs() {
        let n = 8;
        let ci = ShapeDescriptor::dct(n, DctVariant::TypeTwo, 2);
        let csz = ShapeDescriptor::dct(n, DctVariant::TypeTwo, 3);
        let cis = values(&ci);
        let sizes = values(&csz);
        // First layer: one block of size 8, coefficient indices 0..4.
        assert_eq!(&[0, 1, 2, 3], &cis[0..4]);
        assert_eq!(&[8, 8, 8, 8], &sizes[0..4]);
        // Last layer: blocks of size 2, coefficient index always 0.
        assert_eq!(&[0, 0, 0, 0], &cis[8..12]);
        assert_eq!(&[2, 2, 2, 2], &sizes[8..12]);
    }

    #[test]
    fn test_halfrev_inverse_roundtrip() {
        for n in [2u32, 4, 8, 16, 32] {
            for x in 0..n {
                assert_eq!(x, halfrev_inverse(n, halfrev(n, x)));
                assert_eq!(x, halfrev(n, halfrev_inverse(n, x)));
            }
        }
    }
}
