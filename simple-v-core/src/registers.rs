//! Register files as seen by the vector-iteration core.
//!
//! SVP64 extends the Power ISA integer register file to 128 entries and the
//! condition register to 128 four-bit fields, so that vector element indices
//! have somewhere to land. Elements narrower than 64 bits are packed into
//! registers back to back; writing one element must leave its neighbours in
//! the same physical register untouched.

use crate::ElementWidth;
use bitvec::{field::BitField, order::Lsb0, view::BitView};
use core::fmt;
use std::fmt::Formatter;

/// The type of a single general purpose register.
pub type Gpr = u64;

/// The bit width of the general purpose registers.
pub const GLEN: u32 = Gpr::BITS;

/// The number of general purpose registers (SVP64 extends the base 32 to 128).
pub const GPR_LEN: u8 = 128;

/// The number of condition register fields (SVP64 extends the base 8 to 128).
pub const CR_LEN: u8 = 128;

const_assert!(GPR_LEN as u32 > crate::MAX_VL as u32);
const_assert_eq!(GPR_LEN, CR_LEN);

/// A general purpose register specifier. Can take values in the range
/// `0..GPR_LEN`.
///
/// Unlike RISC-V there is no hardwired-zero register; `r0` is an ordinary
/// register (the few Power instructions that read `r0` as zero do so by
/// opcode, which is the scalar executor's concern, not ours).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct Specifier(u8);

impl Specifier {
    /// Create a register specifier from its index, returning `None` if
    /// `index > 127`.
    pub fn new<U: TryInto<u8>>(index: U) -> Option<Self> {
        let index = index.try_into().ok()?;
        (index < GPR_LEN).then_some(Self(index))
    }

    /// Convert a 7-bit value into a register specifier.
    /// Panics if the value doesn't fit in 7 bits (`0..=127`).
    pub fn from_u7(value_u7: u8) -> Self {
        if value_u7 >= GPR_LEN {
            panic!("out of range u7 used");
        }
        Self(value_u7)
    }

    /// Return an iterator over all register specifiers, `r0` up to `r127`.
    pub fn iter_all() -> impl Iterator<Item = Self> {
        (0..GPR_LEN).map(Self)
    }
}

impl From<Specifier> for u8 {
    fn from(value: Specifier) -> Self {
        value.0
    }
}

impl From<Specifier> for u32 {
    fn from(value: Specifier) -> Self {
        value.0 as u32
    }
}

impl From<Specifier> for usize {
    fn from(value: Specifier) -> Self {
        value.0 as usize
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// The SVP64-extended general purpose register file.
#[derive(Debug, Clone)]
pub struct GprFile {
    registers: [Gpr; GPR_LEN as usize],
}

impl Default for GprFile {
    fn default() -> Self {
        Self::new()
    }
}

impl GprFile {
    /// Returns a fresh set of all-zero registers.
    pub fn new() -> Self {
        Self {
            registers: [0; GPR_LEN as usize],
        }
    }

    /// Returns the full 64-bit value of a register.
    pub fn read(&self, specifier: Specifier) -> Gpr {
        self.registers[usize::from(specifier)]
    }

    /// Sets the full 64-bit value of a register.
    pub fn write(&mut self, specifier: Specifier, value: Gpr) {
        self.registers[usize::from(specifier)] = value;
    }

    /// Reads element `offset` of the element vector starting at `base`, as an
    /// unsigned value of width `width`.
    ///
    /// With `width` narrower than 64 bits, consecutive elements share physical
    /// registers: element 0 occupies the least significant bits of `base`,
    /// element `per_register` the least significant bits of `base + 1`, and so
    /// on.
    ///
    /// # Panics
    ///
    /// Panics if the element lands beyond `r127`. Issue-time validation of
    /// VL/MAXVL against the register file keeps legal loops inside the file.
    pub fn read_element(&self, base: Specifier, width: ElementWidth, offset: u32) -> u64 {
        let (register, slot) = locate(base, width, offset);
        let lo = (slot * width.bits()) as usize;
        let hi = lo + width.bits() as usize;
        self.registers[register].view_bits::<Lsb0>()[lo..hi].load_le::<u64>()
    }

    /// Writes element `offset` of the element vector starting at `base`.
    ///
    /// Only the `width.bits()` bits belonging to the element are modified;
    /// neighbouring elements in the same physical register are preserved.
    /// Bits of `value` above the element width are discarded.
    ///
    /// # Panics
    ///
    /// Panics if the element lands beyond `r127` (see
    /// [`read_element`](Self::read_element)).
    pub fn write_element(&mut self, base: Specifier, width: ElementWidth, offset: u32, value: u64) {
        let (register, slot) = locate(base, width, offset);
        let lo = (slot * width.bits()) as usize;
        let hi = lo + width.bits() as usize;
        let value = value & width.unsigned_max();
        self.registers[register].view_bits_mut::<Lsb0>()[lo..hi].store_le(value);
    }
}

/// Maps `(base, width, offset)` to a physical register index and the element
/// slot within that register.
fn locate(base: Specifier, width: ElementWidth, offset: u32) -> (usize, u32) {
    let per_register = width.per_register();
    let register = usize::from(base) + (offset / per_register) as usize;
    if register >= GPR_LEN as usize {
        panic!("element address beyond the register file");
    }
    (register, offset % per_register)
}

/// The four condition bits of one CR field.
///
/// > CR Field n bits: LT (negative), GT (positive), EQ (zero), SO (summary
/// > overflow).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct ConditionFlags {
    pub lt: bool,
    pub gt: bool,
    pub eq: bool,
    pub so: bool,
}

impl ConditionFlags {
    /// Flags produced by an Rc=1-style signed comparison of `value` with zero.
    pub fn from_signed_result(value: i64, so: bool) -> Self {
        Self {
            lt: value < 0,
            gt: value > 0,
            eq: value == 0,
            so,
        }
    }

    /// Convert a 4-bit value (LT as the most significant bit, Power bit
    /// order) into flags. Panics if the value doesn't fit in 4 bits.
    pub fn from_u4(value_u4: u8) -> Self {
        if value_u4 > 0b1111 {
            panic!("out of range u4 used");
        }
        Self {
            lt: value_u4 & 0b1000 != 0,
            gt: value_u4 & 0b0100 != 0,
            eq: value_u4 & 0b0010 != 0,
            so: value_u4 & 0b0001 != 0,
        }
    }

    /// The 4-bit encoding of these flags (LT as the most significant bit).
    pub fn to_u4(self) -> u8 {
        (self.lt as u8) << 3 | (self.gt as u8) << 2 | (self.eq as u8) << 1 | self.so as u8
    }

    /// Returns the value of one of the four bits.
    pub fn bit(self, bit: CrBit) -> bool {
        match bit {
            CrBit::Lt => self.lt,
            CrBit::Gt => self.gt,
            CrBit::Eq => self.eq,
            CrBit::So => self.so,
        }
    }
}

/// Selects one bit of a CR field, in Power bit order.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CrBit {
    Lt = 0,
    Gt = 1,
    Eq = 2,
    So = 3,
}

impl CrBit {
    /// Convert a 2-bit value into a [`CrBit`].
    /// Panics if the value doesn't fit in 2 bits (`0..=3`).
    pub fn from_u2(value_u2: u8) -> Self {
        match value_u2 {
            0 => Self::Lt,
            1 => Self::Gt,
            2 => Self::Eq,
            3 => Self::So,
            _ => panic!("out of range u2 used"),
        }
    }
}

/// The SVP64-extended condition register: 128 four-bit fields.
#[derive(Debug, Clone)]
pub struct CrFile {
    fields: [u8; CR_LEN as usize],
}

impl Default for CrFile {
    fn default() -> Self {
        Self::new()
    }
}

impl CrFile {
    /// Returns a fresh set of all-zero CR fields.
    pub fn new() -> Self {
        Self {
            fields: [0; CR_LEN as usize],
        }
    }

    /// Returns the flags of CR field `index`, or `None` for `index >= 128`.
    pub fn field(&self, index: u32) -> Option<ConditionFlags> {
        self.fields
            .get(index as usize)
            .map(|&bits| ConditionFlags::from_u4(bits))
    }

    /// Sets CR field `index`.
    /// Panics if `index` is beyond the implemented CR width.
    pub fn set_field(&mut self, index: u32, flags: ConditionFlags) {
        self.fields[index as usize] = flags.to_u4();
    }
}

/// The complete register state the vector loop can touch: GPRs and CR fields.
#[derive(Debug, Clone, Default)]
pub struct RegisterSet {
    pub gprs: GprFile,
    pub crs: CrFile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_full() {
        let mut gprs = GprFile::new();
        for specifier in Specifier::iter_all() {
            assert_eq!(0, gprs.read(specifier));
        }
        gprs.write(Specifier::from_u7(5), 0xDEAD_BEEF_0123_4567);
        assert_eq!(0xDEAD_BEEF_0123_4567, gprs.read(Specifier::from_u7(5)));
        assert_eq!(0, gprs.read(Specifier::from_u7(4)));
        assert_eq!(0, gprs.read(Specifier::from_u7(6)));
    }

    #[test]
    fn test_element_packing() {
        let mut gprs = GprFile::new();
        let base = Specifier::from_u7(8);
        // 4 halfwords per register; element 5 is the second halfword of r9.
        gprs.write_element(base, ElementWidth::Halfword, 5, 0xABCD);
        assert_eq!(0, gprs.read(Specifier::from_u7(8)));
        assert_eq!(0xABCD_0000, gprs.read(Specifier::from_u7(9)));
        assert_eq!(0xABCD, gprs.read_element(base, ElementWidth::Halfword, 5));
    }

    #[test]
    fn test_element_write_preserves_neighbours() {
        let mut gprs = GprFile::new();
        let base = Specifier::from_u7(3);
        gprs.write(base, 0x1122_3344_5566_7788);
        gprs.write_element(base, ElementWidth::Byte, 2, 0xFF);
        assert_eq!(0x1122_3344_55FF_7788, gprs.read(base));
        // Value bits above the element width are discarded.
        gprs.write_element(base, ElementWidth::Byte, 2, 0xE00);
        assert_eq!(0x1122_3344_5500_7788, gprs.read(base));
    }

    #[test]
    fn test_dword_elements_are_whole_registers() {
        let mut gprs = GprFile::new();
        let base = Specifier::from_u7(10);
        gprs.write_element(base, ElementWidth::Dword, 3, u64::MAX);
        assert_eq!(u64::MAX, gprs.read(Specifier::from_u7(13)));
    }

    #[test]
    #[should_panic]
    fn test_element_beyond_file_panics() {
        let gprs = GprFile::new();
        gprs.read_element(Specifier::from_u7(127), ElementWidth::Dword, 1);
    }

    #[test]
    fn test_condition_flags_roundtrip() {
        for bits in 0..16 {
            assert_eq!(bits, ConditionFlags::from_u4(bits).to_u4());
        }
    }

    #[test]
    fn test_condition_flags_from_result() {
        let flags = ConditionFlags::from_signed_result(-3, false);
        assert!(flags.lt && !flags.gt && !flags.eq);
        let flags = ConditionFlags::from_signed_result(0, true);
        assert!(flags.eq && flags.so);
        assert!(flags.bit(CrBit::Eq));
        assert!(!flags.bit(CrBit::Lt));
    }

    #[test]
    fn test_cr_file() {
        let mut crs = CrFile::new();
        let flags = ConditionFlags::from_signed_result(7, false);
        crs.set_field(100, flags);
        assert_eq!(Some(flags), crs.field(100));
        assert_eq!(None, crs.field(128));
    }
}
