//! Bit-exact accessors for the 24-bit SVP64 "RM" prefix field.
//!
//! The RM field rides in the suffix half of the 64-bit SVP64 prefix and has a
//! fixed layout (bit 0 is the most significant bit of the field, following the
//! Power ISA bit-numbering convention):
//!
//! | bits  | field     | meaning                                            |
//! |-------|-----------|----------------------------------------------------|
//! | 0     | `mmode`   | predicate mode: integer (0) or CR (1)              |
//! | 1-3   | `mask`    | predicate selector (table depends on `mmode`)      |
//! | 4-5   | `elwidth` | destination element width override                 |
//! | 6-7   | `ewsrc`   | source element width override                      |
//! | 8-9   | `subvl`   | sub-vector length (1..=4 lanes)                    |
//! | 10-18 | `extra`   | EXTRA2×4 or EXTRA3×3 register-extension fields     |
//! | 19-23 | `mode`    | loop-mode selector (see [`crate::mode`])           |
//!
//! Bit-for-bit reproduction of this layout is required for binary
//! compatibility with existing SVP64 toolchains.

use crate::registers::Specifier;
use crate::{ElementWidth, SubVl};
use bitvec::{field::BitField, order::Lsb0, view::BitView};

/// Field positions. Values are the *Power bit numbers* (MSB0) of the first and
/// one-past-last bit of each field within the 24-bit RM value.
mod pos {
    pub const MMODE: (usize, usize) = (0, 1);
    pub const MASK: (usize, usize) = (1, 4);
    pub const ELWIDTH: (usize, usize) = (4, 6);
    pub const EWSRC: (usize, usize) = (6, 8);
    pub const SUBVL: (usize, usize) = (8, 10);
    pub const EXTRA: (usize, usize) = (10, 19);
    pub const MODE: (usize, usize) = (19, 24);
}

/// The 24-bit RM field of one SVP64 prefix.
///
/// Stored right-aligned in a `u32`; the upper 8 bits are always zero.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Rm(u32);

impl Rm {
    /// Wraps a raw RM value.
    /// Panics if the value doesn't fit in 24 bits.
    pub fn from_u24(value_u24: u32) -> Self {
        if value_u24 >= 1 << 24 {
            panic!("out of range u24 used");
        }
        Self(value_u24)
    }

    /// The raw 24-bit value.
    pub fn to_u24(self) -> u32 {
        self.0
    }

    /// Reads the field at MSB0 position `(first, end)` as an unsigned value.
    fn field(self, (first, end): (usize, usize)) -> u32 {
        // MSB0 bit `b` of a 24-bit value is Lsb0 bit `23 - b`.
        self.0.view_bits::<Lsb0>()[24 - end..24 - first].load_le::<u32>()
    }

    /// The `mmode` bit: `false` selects integer predicate masks, `true`
    /// selects CR-based predicate masks.
    pub fn mmode(self) -> bool {
        self.field(pos::MMODE) != 0
    }

    /// The 3-bit predicate `mask` selector.
    pub fn mask(self) -> u8 {
        self.field(pos::MASK) as u8
    }

    /// The destination element width override.
    pub fn elwidth(self) -> ElementWidth {
        ElementWidth::from_u2(self.field(pos::ELWIDTH) as u8)
    }

    /// The raw 2-bit `elwidth` field. Branch instructions reinterpret these
    /// bits (they carry no width meaning there); see [`crate::mode`].
    pub fn elwidth_raw(self) -> u8 {
        self.field(pos::ELWIDTH) as u8
    }

    /// The source element width override.
    pub fn ewsrc(self) -> ElementWidth {
        ElementWidth::from_u2(self.field(pos::EWSRC) as u8)
    }

    /// The raw 2-bit `ewsrc` field (reinterpreted by branch instructions).
    pub fn ewsrc_raw(self) -> u8 {
        self.field(pos::EWSRC) as u8
    }

    /// The sub-vector length.
    pub fn subvl(self) -> SubVl {
        SubVl::from_u2(self.field(pos::SUBVL) as u8)
    }

    /// The source-mask selector of explicitly twin-predicated instructions.
    ///
    /// Twin-predicated forms have no separate source element width; the
    /// `ewsrc` bits plus the first `subvl` bit are reinterpreted as a second
    /// 3-bit mask selector (same table as [`mask`](Self::mask), applied to
    /// the source stream).
    pub fn smask(self) -> u8 {
        self.field((pos::EWSRC.0, pos::EWSRC.0 + 3)) as u8
    }

    /// The raw 9-bit `extra` field.
    pub fn extra(self) -> u16 {
        self.field(pos::EXTRA) as u16
    }

    /// One of the three 3-bit EXTRA3 sub-fields (`n` in `0..3`).
    /// Panics if `n > 2`.
    pub fn extra3(self, n: usize) -> u8 {
        if n > 2 {
            panic!("EXTRA3 index out of range");
        }
        let first = pos::EXTRA.0 + 3 * n;
        self.field((first, first + 3)) as u8
    }

    /// One of the four 2-bit EXTRA2 sub-fields (`n` in `0..4`).
    /// Panics if `n > 3`. The ninth `extra` bit is unused in EXTRA2 form.
    pub fn extra2(self, n: usize) -> u8 {
        if n > 3 {
            panic!("EXTRA2 index out of range");
        }
        let first = pos::EXTRA.0 + 2 * n;
        self.field((first, first + 2)) as u8
    }

    /// The raw 5-bit `mode` field.
    pub fn mode(self) -> u8 {
        self.field(pos::MODE) as u8
    }
}

/// One operand after EXTRA extension: a 7-bit physical register number plus
/// the vector/scalar tag that decides whether the loop offsets it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Operand {
    pub reg: Specifier,
    pub vector: bool,
}

impl Operand {
    /// A plain scalar operand, untouched by any EXTRA field.
    pub fn scalar(reg: Specifier) -> Self {
        Self { reg, vector: false }
    }

    /// A vector operand starting at `reg`.
    pub fn vector(reg: Specifier) -> Self {
        Self { reg, vector: true }
    }
}

/// Extends a 5-bit GPR operand with a 3-bit EXTRA3 field.
///
/// The most significant EXTRA3 bit tags the operand as a vector. For vectors
/// the two remaining bits become the *low* bits of the 7-bit register number
/// (`reg * 4 + extension`), keeping vector bases 4-register aligned; for
/// scalars they become the *high* bits (`extension * 32 + reg`), reaching the
/// registers above the base 32.
pub fn extend_gpr_extra3(reg_u5: u8, extra3_u3: u8) -> Operand {
    assert!(reg_u5 < 32 && extra3_u3 < 8);
    let extension = extra3_u3 & 0b011;
    if extra3_u3 & 0b100 != 0 {
        Operand::vector(Specifier::from_u7(reg_u5 << 2 | extension))
    } else {
        Operand::scalar(Specifier::from_u7(extension << 5 | reg_u5))
    }
}

/// Extends a 5-bit GPR operand with a 2-bit EXTRA2 field.
///
/// Same scheme as [`extend_gpr_extra3`] with only one extension bit: vector
/// bases reach even multiples of 2 within the 4-aligned slot
/// (`reg * 4 + extension * 2`), scalars reach `r0..r63`.
pub fn extend_gpr_extra2(reg_u5: u8, extra2_u2: u8) -> Operand {
    assert!(reg_u5 < 32 && extra2_u2 < 4);
    let extension = extra2_u2 & 0b01;
    if extra2_u2 & 0b10 != 0 {
        Operand::vector(Specifier::from_u7(reg_u5 << 2 | extension << 1))
    } else {
        Operand::scalar(Specifier::from_u7(extension << 5 | reg_u5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_extraction() {
        // mmode=1, mask=0b011, elwidth=0b10, ewsrc=0b01, subvl=0b11,
        // extra=0b101010101, mode=0b10011, packed MSB0 left to right.
        let raw = 0b1_011_10_01_11_101010101_10011;
        let rm = Rm::from_u24(raw);
        assert!(rm.mmode());
        assert_eq!(0b011, rm.mask());
        assert_eq!(ElementWidth::Halfword, rm.elwidth());
        assert_eq!(ElementWidth::Word, rm.ewsrc());
        assert_eq!(SubVl::S4, rm.subvl());
        assert_eq!(0b101010101, rm.extra());
        assert_eq!(0b10011, rm.mode());
    }

    #[test]
    fn test_all_zero() {
        let rm = Rm::from_u24(0);
        assert!(!rm.mmode());
        assert_eq!(0, rm.mask());
        assert_eq!(ElementWidth::Dword, rm.elwidth());
        assert_eq!(ElementWidth::Dword, rm.ewsrc());
        assert_eq!(SubVl::S1, rm.subvl());
        assert_eq!(0, rm.mode());
    }

    #[test]
    fn test_extra_subfields() {
        let rm = Rm::from_u24(0b0_000_00_00_00_110_010_001_00000);
        assert_eq!(0b110, rm.extra3(0));
        assert_eq!(0b010, rm.extra3(1));
        assert_eq!(0b001, rm.extra3(2));
        assert_eq!(0b11, rm.extra2(0));
        assert_eq!(0b00, rm.extra2(1));
        assert_eq!(0b10, rm.extra2(2));
        assert_eq!(0b00, rm.extra2(3));
    }

    #[test]
    fn test_extend_extra3() {
        // Vector flag set: register number gains the extension as low bits.
        let operand = extend_gpr_extra3(5, 0b101);
        assert!(operand.vector);
        assert_eq!(5 << 2 | 1, u8::from(operand.reg));
        // Scalar: extension becomes the high bits.
        let operand = extend_gpr_extra3(5, 0b010);
        assert!(!operand.vector);
        assert_eq!(2 << 5 | 5, u8::from(operand.reg));
        // All-zero EXTRA3 is the scalar identity.
        let operand = extend_gpr_extra3(17, 0);
        assert!(!operand.vector);
        assert_eq!(17, u8::from(operand.reg));
    }

    #[test]
    fn test_extend_extra2() {
        let operand = extend_gpr_extra2(31, 0b11);
        assert!(operand.vector);
        assert_eq!(31 << 2 | 2, u8::from(operand.reg));
        let operand = extend_gpr_extra2(3, 0b01);
        assert!(!operand.vector);
        assert_eq!(35, u8::from(operand.reg));
    }
}
