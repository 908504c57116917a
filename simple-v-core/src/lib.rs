//! Architectural software model of the SVP64 ("Simple-V") vector-iteration
//! control system of the Power ISA.
//!
//! SVP64 re-issues one scalar Power ISA instruction across multiple register
//! "elements". This crate models everything that decides *which* elements are
//! issued: the 24-bit RM prefix decode, REMAP shape schedules (linear, FFT and
//! DCT butterflies, matrix/offset-modulo), integer and CR predication with
//! zeroing, the per-element step sequencer with its twin-predication cursors,
//! and the mode controllers (mapreduce, fail-first, saturate, predicate-result
//! and branch gating).
//!
//! Scalar arithmetic semantics are deliberately behind a trait
//! ([`executor::ScalarExecutor`]); the bundled [`executor::IntegerExecutor`]
//! implements just enough integer ops to exercise every loop mode.

#[macro_use]
extern crate static_assertions;

use std::fmt;

pub mod executor;
pub mod mode;
pub mod modes;
pub mod predicate;
pub mod prefix;
pub mod registers;
pub mod remap;
pub mod sequencer;
pub mod shape;
pub mod state;
pub mod unit;

/// Re-export of the main entry point for convenience.
pub use unit::VectorUnit;

/// The largest value VL (and MAXVL) can take.
///
/// VL is held in a 7-bit field; with the SVP64 extended register file of 128
/// entries there is never a reason to iterate more than 127 elements.
pub const MAX_VL: u8 = 127;

/// Per-operand element width override.
///
/// SVP64 elements are narrower than or equal to the 64-bit physical register
/// width; a 64-bit register holds 8 byte-elements, 4 halfword-elements, and so
/// on. The 2-bit encoding is shared by the `elwidth` (destination) and `ewsrc`
/// (source) fields of the RM prefix.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum ElementWidth {
    /// 64-bit elements, the default (encoding `0b00`).
    #[default]
    Dword = 0,
    /// 32-bit elements (encoding `0b01`).
    Word = 1,
    /// 16-bit elements (encoding `0b10`).
    Halfword = 2,
    /// 8-bit elements (encoding `0b11`).
    Byte = 3,
}

impl ElementWidth {
    /// Convert a 2-bit value into an [`ElementWidth`].
    /// Panics if the value doesn't fit in 2 bits (`0..=3`).
    pub fn from_u2(value_u2: u8) -> Self {
        match value_u2 {
            0 => Self::Dword,
            1 => Self::Word,
            2 => Self::Halfword,
            3 => Self::Byte,
            _ => panic!("out of range u2 used"),
        }
    }

    /// Width of one element in bits.
    pub fn bits(self) -> u32 {
        64 >> (self as u32)
    }

    /// Number of elements packed into one 64-bit register.
    pub fn per_register(self) -> u32 {
        64 / self.bits()
    }

    /// Largest unsigned value representable in this width.
    pub fn unsigned_max(self) -> u64 {
        u64::MAX >> (64 - self.bits())
    }

    /// Largest signed value representable in this width.
    pub fn signed_max(self) -> i64 {
        (self.unsigned_max() >> 1) as i64
    }

    /// Smallest (most negative) signed value representable in this width.
    pub fn signed_min(self) -> i64 {
        !self.signed_max()
    }
}

impl fmt::Display for ElementWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}b", self.bits())
    }
}

/// The sub-vector length: how many contiguous lanes make up one element.
///
/// With `SUBVL > 1` every step of the vector loop covers a small group of
/// lanes (e.g. x/y/z coordinates), stepped by the sequencer's sub-element
/// counter.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum SubVl {
    #[default]
    S1 = 0,
    S2 = 1,
    S3 = 2,
    S4 = 3,
}

impl SubVl {
    /// Convert a 2-bit value into a [`SubVl`].
    /// Panics if the value doesn't fit in 2 bits (`0..=3`).
    pub fn from_u2(value_u2: u8) -> Self {
        match value_u2 {
            0 => Self::S1,
            1 => Self::S2,
            2 => Self::S3,
            3 => Self::S4,
            _ => panic!("out of range u2 used"),
        }
    }

    /// Number of lanes per element (`1..=4`).
    pub fn lanes(self) -> u8 {
        self as u8 + 1
    }
}
