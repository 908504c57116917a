//! REMAP shape descriptors.
//!
//! A shape is the static configuration of one REMAP "port": it describes an
//! iteration space (up to three nested dimensions), the order those dimensions
//! nest in, per-dimension direction flags, an output selector, an offset, and
//! which index-generation algorithm to run over it. Shapes live in one of four
//! architectural slots (`SVSHAPE0..3`), are populated by `svshape`,
//! `svshape2` and `svindex`, and are read-only for the duration of any vector
//! loop they are bound to.
//!
//! The index-generation algorithms themselves live in [`crate::remap`].

use thiserror::Error;

/// Number of architectural shape slots.
pub const SHAPE_SLOTS: usize = 4;

/// The index-generation algorithm a shape selects.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum ShapeMode {
    /// Identity schedule: element index == step.
    #[default]
    Linear,
    /// Radix-2 FFT butterfly schedule (iterative Cooley-Tukey).
    Fft,
    /// DCT butterfly schedule, with a sub-mode picking the ordering variant.
    Dct(DctVariant),
    /// Multi-dimensional matrix schedule with offset-modulo wrap.
    Matrix,
}

impl ShapeMode {
    /// Decodes the 2-bit algorithm selector plus the 2-bit sub-mode.
    ///
    /// The sub-mode only carries meaning for DCT shapes; for the other
    /// algorithms it must be zero (non-zero values are reserved).
    pub fn from_u2(mode_u2: u8, submode_u2: u8) -> Result<Self, ShapeError> {
        let mode = match mode_u2 {
            0 => Self::Linear,
            1 => Self::Fft,
            2 => Self::Dct(DctVariant::from_u2(submode_u2)),
            3 => Self::Matrix,
            _ => panic!("out of range u2 used"),
        };
        if mode_u2 != 2 && submode_u2 != 0 {
            return Err(ShapeError::ReservedSubMode(submode_u2));
        }
        Ok(mode)
    }
}

/// The DCT ordering variants, encoded in the shape's 2-bit sub-mode.
///
/// The butterfly network is the same for all variants; they differ in whether
/// the half-reversal permutation of the initial vector is baked into the
/// generated indices, and in which direction the layer sizes progress
/// (halving for the DCT-II decomposition, doubling for the inverse DCT-III).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DctVariant {
    /// DCT-II: sizes halve from `n` down to 2, indices pass through the
    /// half-reversal input permutation.
    TypeTwo = 0,
    /// DCT-II butterfly only: no input permutation (the caller has already
    /// reordered the vector).
    TypeTwoRaw = 1,
    /// DCT-III (inverse): sizes double from 2 up to `n`, inverse permutation.
    TypeThree = 2,
    /// DCT-III butterfly only.
    TypeThreeRaw = 3,
}

impl DctVariant {
    /// Convert a 2-bit value into a [`DctVariant`].
    /// Panics if the value doesn't fit in 2 bits (`0..=3`).
    pub fn from_u2(value_u2: u8) -> Self {
        match value_u2 {
            0 => Self::TypeTwo,
            1 => Self::TypeTwoRaw,
            2 => Self::TypeThree,
            3 => Self::TypeThreeRaw,
            _ => panic!("out of range u2 used"),
        }
    }

    /// `true` for the variants that skip the input half-reversal permutation.
    pub fn is_raw(self) -> bool {
        matches!(self, Self::TypeTwoRaw | Self::TypeThreeRaw)
    }

    /// `true` for the inverse (DCT-III) variants.
    pub fn is_inverse(self) -> bool {
        matches!(self, Self::TypeThree | Self::TypeThreeRaw)
    }
}

/// Static configuration of one REMAP port.
///
/// `lims` holds the sizes of up to three nested dimensions, innermost first; a
/// zero entry disables that dimension (size 1). `order` is a permutation of
/// `{0, 1, 2}` choosing which dimension each nesting level walks. `invxyz`
/// reverses the counting direction of a dimension. `skip` selects which of the
/// schedule's simultaneous outputs a step returns (for butterflies: low index,
/// high index, twiddle/coefficient index, coefficient-table size; for matrix
/// shapes it eliminates one dimension). `offset` shifts the generated index,
/// wrapping modulo the iteration-space size.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ShapeDescriptor {
    pub lims: [u32; 3],
    pub order: [u8; 3],
    pub invxyz: [bool; 3],
    pub skip: u8,
    pub offset: i32,
    pub mode: ShapeMode,
}

impl Default for ShapeDescriptor {
    fn default() -> Self {
        Self::identity()
    }
}

impl ShapeDescriptor {
    /// The identity shape: a linear schedule with no dimensions, no inversion
    /// and no offset. Unbound REMAP ports behave as if this were bound.
    pub fn identity() -> Self {
        Self {
            lims: [0, 0, 0],
            order: [0, 1, 2],
            invxyz: [false, false, false],
            skip: 0,
            offset: 0,
            mode: ShapeMode::Linear,
        }
    }

    /// A matrix shape over dimensions `lims` (innermost first).
    pub fn matrix(lims: [u32; 3], order: [u8; 3], invxyz: [bool; 3]) -> Self {
        Self {
            lims,
            order,
            invxyz,
            skip: 0,
            offset: 0,
            mode: ShapeMode::Matrix,
        }
    }

    /// An FFT butterfly shape over `n` elements, returning the output selected
    /// by `skip` (0 = low index, 1 = high index, 2 = twiddle index).
    pub fn fft(n: u32, skip: u8) -> Self {
        Self {
            lims: [n, 0, 0],
            order: [0, 1, 2],
            invxyz: [false, false, false],
            skip,
            offset: 0,
            mode: ShapeMode::Fft,
        }
    }

    /// A DCT butterfly shape over `n` elements.
    pub fn dct(n: u32, variant: DctVariant, skip: u8) -> Self {
        Self {
            lims: [n, 0, 0],
            order: [0, 1, 2],
            invxyz: [false, false, false],
            skip,
            offset: 0,
            mode: ShapeMode::Dct(variant),
        }
    }

    /// The size of dimension `dim`, treating a zero limit as size 1.
    pub fn dim(&self, dim: usize) -> u32 {
        self.lims[dim].max(1)
    }

    /// Checks all issue-time invariants of this shape against `maxvl`.
    ///
    /// Must pass before the shape is installed in a slot; the index generator
    /// in [`crate::remap`] is entitled to assume a validated shape.
    pub fn validate(&self, maxvl: u8) -> Result<(), ShapeError> {
        let mut seen = [false; 3];
        for &level in &self.order {
            match seen.get_mut(level as usize) {
                Some(seen @ false) => *seen = true,
                _ => return Err(ShapeError::InvalidOrder(self.order)),
            }
        }
        if self.skip > 3 {
            return Err(ShapeError::ReservedSkip(self.skip));
        }
        match self.mode {
            ShapeMode::Linear | ShapeMode::Matrix => {
                let product = self.dim(0) as u64 * self.dim(1) as u64 * self.dim(2) as u64;
                if product > maxvl as u64 {
                    return Err(ShapeError::TooManyElements { product, maxvl });
                }
                // A dimensionless linear shape has no modulo to wrap the
                // offset into; a negative offset would walk off the front of
                // the index space.
                if matches!(self.mode, ShapeMode::Linear)
                    && self.lims[0] == 0
                    && self.offset != 0
                {
                    return Err(ShapeError::UnboundedOffset(self.offset));
                }
            }
            ShapeMode::Fft | ShapeMode::Dct(_) => {
                let n = self.lims[0];
                if n < 2 || !n.is_power_of_two() {
                    return Err(ShapeError::NotPowerOfTwo(n));
                }
                if n > maxvl as u32 {
                    return Err(ShapeError::TooManyElements {
                        product: n as u64,
                        maxvl,
                    });
                }
                if self.lims[1] != 0 || self.lims[2] != 0 {
                    return Err(ShapeError::ExtraDimensions(self.lims));
                }
                if matches!(self.mode, ShapeMode::Fft) && self.skip == 3 {
                    // FFT butterflies have three outputs; selector 3 is only
                    // defined for DCT (coefficient-table size).
                    return Err(ShapeError::ReservedSkip(self.skip));
                }
            }
        }
        Ok(())
    }
}

/// Shape validation failures, all detectable at issue time.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ShapeError {
    #[error("iteration space of {product} elements exceeds MAXVL={maxvl}")]
    TooManyElements { product: u64, maxvl: u8 },
    #[error("dimension order {0:?} is not a permutation of 0..3")]
    InvalidOrder([u8; 3]),
    #[error("butterfly length {0} is not a power of two >= 2")]
    NotPowerOfTwo(u32),
    #[error("butterfly shapes are one-dimensional, got lims {0:?}")]
    ExtraDimensions([u32; 3]),
    #[error("skip selector {0} is reserved for this shape mode")]
    ReservedSkip(u8),
    #[error("offset {0} needs a modulo to wrap into")]
    UnboundedOffset(i32),
    #[error("sub-mode {0} is reserved for non-DCT shapes")]
    ReservedSubMode(u8),
}

/// Identifies one of the four architectural shape slots.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ShapeId {
    Shape0 = 0,
    Shape1 = 1,
    Shape2 = 2,
    Shape3 = 3,
}

impl ShapeId {
    /// Convert a 2-bit value into a [`ShapeId`].
    /// Panics if the value doesn't fit in 2 bits (`0..=3`).
    pub fn from_u2(value_u2: u8) -> Self {
        match value_u2 {
            0 => Self::Shape0,
            1 => Self::Shape1,
            2 => Self::Shape2,
            3 => Self::Shape3,
            _ => panic!("out of range u2 used"),
        }
    }
}

/// The four architectural shape slots (`SVSHAPE0..3`).
///
/// Ordinary last-writer-wins registers; there is no locking because there is
/// no concurrency in the architectural model.
#[derive(Debug, Clone, Default)]
pub struct ShapeFile {
    slots: [ShapeDescriptor; SHAPE_SLOTS],
}

impl ShapeFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ShapeId) -> &ShapeDescriptor {
        &self.slots[id as usize]
    }

    /// Installs `shape` in slot `id` after validating it against `maxvl`.
    pub fn install(
        &mut self,
        id: ShapeId,
        shape: ShapeDescriptor,
        maxvl: u8,
    ) -> Result<(), ShapeError> {
        shape.validate(maxvl)?;
        self.slots[id as usize] = shape;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_valid() {
        ShapeDescriptor::identity().validate(0).unwrap();
        ShapeDescriptor::identity().validate(127).unwrap();
    }

    #[test]
    fn test_matrix_product_limit() {
        let shape = ShapeDescriptor::matrix([3, 4, 0], [0, 1, 2], [false; 3]);
        shape.validate(12).unwrap();
        assert_eq!(
            Err(ShapeError::TooManyElements {
                product: 12,
                maxvl: 11
            }),
            shape.validate(11)
        );
    }

    #[test]
    fn test_order_must_be_permutation() {
        let mut shape = ShapeDescriptor::matrix([2, 2, 0], [0, 0, 2], [false; 3]);
        assert_eq!(
            Err(ShapeError::InvalidOrder([0, 0, 2])),
            shape.validate(127)
        );
        shape.order = [2, 1, 0];
        shape.validate(127).unwrap();
    }

    #[test]
    fn test_butterfly_requires_power_of_two() {
        assert_eq!(
            Err(ShapeError::NotPowerOfTwo(6)),
            ShapeDescriptor::fft(6, 0).validate(127)
        );
        assert_eq!(
            Err(ShapeError::NotPowerOfTwo(1)),
            ShapeDescriptor::fft(1, 0).validate(127)
        );
        ShapeDescriptor::fft(8, 0).validate(127).unwrap();
        ShapeDescriptor::dct(8, DctVariant::TypeTwo, 3)
            .validate(127)
            .unwrap();
    }

    #[test]
    fn test_offset_requires_modulo() {
        let shape = ShapeDescriptor {
            offset: -1,
            ..ShapeDescriptor::identity()
        };
        assert_eq!(Err(ShapeError::UnboundedOffset(-1)), shape.validate(127));
        // With a modulo the same offset wraps and is fine.
        let shape = ShapeDescriptor {
            lims: [4, 0, 0],
            offset: -1,
            ..ShapeDescriptor::identity()
        };
        shape.validate(127).unwrap();
    }

    #[test]
    fn test_fft_skip_3_reserved() {
        assert_eq!(
            Err(ShapeError::ReservedSkip(3)),
            ShapeDescriptor::fft(8, 3).validate(127)
        );
    }

    #[test]
    fn test_shape_file_rejects_invalid() {
        let mut file = ShapeFile::new();
        let bad = ShapeDescriptor::fft(5, 0);
        assert!(file.install(ShapeId::Shape2, bad, 127).is_err());
        assert_eq!(ShapeDescriptor::identity(), *file.get(ShapeId::Shape2));
        file.install(ShapeId::Shape2, ShapeDescriptor::fft(4, 1), 127)
            .unwrap();
        assert_eq!(ShapeDescriptor::fft(4, 1), *file.get(ShapeId::Shape2));
    }

    #[test]
    fn test_mode_decode() {
        assert_eq!(Ok(ShapeMode::Linear), ShapeMode::from_u2(0, 0));
        assert_eq!(
            Ok(ShapeMode::Dct(DctVariant::TypeThree)),
            ShapeMode::from_u2(2, 2)
        );
        assert_eq!(Err(ShapeError::ReservedSubMode(1)), ShapeMode::from_u2(1, 1));
    }
}
