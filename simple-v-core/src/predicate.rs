//! Predicate decode and per-element evaluation.
//!
//! A predicate turns each step of the vector loop into one of three outcomes:
//! *active* (the element executes), *skip* (the cursor advances but nothing is
//! consumed or written), or *zero* (the destination is written with zero and
//! the cursor advances). Source and destination streams carry independent
//! predicates — twin predication — which is what produces gather/compress and
//! scatter/expand effects when the two masks differ.

use crate::registers::{CrBit, RegisterSet, Specifier, CR_LEN};
use bitvec::{order::Lsb0, view::BitView};
use thiserror::Error;

/// Where a predicate's per-element bits come from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PredicateKind {
    /// Unconditionally active (the all-ones predicate).
    Always,
    /// Bit `step` of an integer mask register.
    IntReg(Specifier),
    /// Active only at the step equal to the register's value (`1 << r3` in
    /// the SVP64 mask table): a single-element selector.
    OneHot(Specifier),
    /// A fixed bit of the per-step CR field (field number == step).
    CrField(CrBit),
}

/// A fully decoded predicate: source, sense, and masked-element policy.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PredicateSpec {
    pub kind: PredicateKind,
    /// Flips the active sense of the mask bit.
    pub invert: bool,
    /// Zeroing mode: masked-out destination elements are written with zero
    /// instead of being skipped.
    pub zero_when_masked: bool,
}

impl PredicateSpec {
    /// The unpredicated default: every element active.
    pub fn always() -> Self {
        Self {
            kind: PredicateKind::Always,
            invert: false,
            zero_when_masked: false,
        }
    }

    /// Decodes the RM `mmode` bit plus 3-bit `mask` selector.
    ///
    /// Integer table (`mmode` = 0): always / `1<<r3` / `r3` / `~r3` / `r10` /
    /// `~r10` / `r30` / `~r30`. CR table (`mmode` = 1): LT / GE / GT / LE /
    /// EQ / NE / SO / NS, i.e. one of the four CR bits with an optional
    /// inverted sense. All 16 combinations are defined; there are no reserved
    /// encodings here.
    ///
    /// `zeroing` comes from the mode decode (`sz`/`dz` bits), not from the
    /// mask selector itself.
    pub fn decode(mmode: bool, mask_u3: u8, zeroing: bool) -> Self {
        if mask_u3 > 0b111 {
            panic!("out of range u3 used");
        }
        let (kind, invert) = if mmode {
            (PredicateKind::CrField(CrBit::from_u2(mask_u3 >> 1)), mask_u3 & 1 != 0)
        } else {
            match mask_u3 {
                0b000 => (PredicateKind::Always, false),
                0b001 => (PredicateKind::OneHot(Specifier::from_u7(3)), false),
                0b010 => (PredicateKind::IntReg(Specifier::from_u7(3)), false),
                0b011 => (PredicateKind::IntReg(Specifier::from_u7(3)), true),
                0b100 => (PredicateKind::IntReg(Specifier::from_u7(10)), false),
                0b101 => (PredicateKind::IntReg(Specifier::from_u7(10)), true),
                0b110 => (PredicateKind::IntReg(Specifier::from_u7(30)), false),
                0b111 => (PredicateKind::IntReg(Specifier::from_u7(30)), true),
                _ => unreachable!(),
            }
        };
        Self {
            kind,
            invert,
            zero_when_masked: zeroing,
        }
    }

    /// Issue-time range check: every step in `0..vl` must be evaluatable.
    ///
    /// Integer masks provide 64 bits, CR predication one field per step up to
    /// the implemented CR width.
    pub fn validate(&self, vl: u8) -> Result<(), PredicateError> {
        let limit = match self.kind {
            PredicateKind::Always | PredicateKind::OneHot(_) => return Ok(()),
            PredicateKind::IntReg(_) => 64,
            PredicateKind::CrField(_) => CR_LEN as u32,
        };
        if vl as u32 > limit {
            return Err(PredicateError::OutOfRange {
                vl,
                limit: limit as u8,
            });
        }
        Ok(())
    }

    /// Classifies the element at `step`.
    ///
    /// Infallible: [`validate`](Self::validate) must have passed at issue, so
    /// every lookup is in range.
    pub fn action(&self, regs: &RegisterSet, step: u32) -> ElementAction {
        let bit = match self.kind {
            PredicateKind::Always => true,
            PredicateKind::IntReg(reg) => {
                let mask = regs.gprs.read(reg);
                mask.view_bits::<Lsb0>()[step as usize]
            }
            PredicateKind::OneHot(reg) => regs.gprs.read(reg) == step as u64,
            PredicateKind::CrField(cr_bit) => regs
                .crs
                .field(step)
                .map(|flags| flags.bit(cr_bit))
                .unwrap_or(false),
        };
        if bit != self.invert {
            ElementAction::Active
        } else if self.zero_when_masked {
            ElementAction::Zero
        } else {
            ElementAction::Skip
        }
    }
}

/// The per-element predication outcome. Every step is exactly one of these.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ElementAction {
    /// Execute and consume the element.
    Active,
    /// Advance the cursor without consuming the register slot.
    Skip,
    /// Write zero to the destination and advance the cursor.
    Zero,
}

/// Predicate range failures, detected at instruction issue.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum PredicateError {
    #[error("VL={vl} exceeds the {limit} elements this predicate can address")]
    OutOfRange { vl: u8, limit: u8 },
}
