//! Decode of the 5-bit RM `mode` field into a loop mode plus sub-flags.
//!
//! The same 5 bits mean different things depending on the instruction class
//! (arithmetic vs branch) and, within the arithmetic class, on whether the
//! scalar instruction records a condition (`Rc=1`). Reserved combinations are
//! rejected at issue with [`ModeError::Reserved`] rather than silently falling
//! through to NORMAL; that policy choice is deliberate (see DESIGN.md).
//!
//! Arithmetic-class table (`m0..m4` are the mode bits, most significant
//! first):
//!
//! | m0-1 | m2  | m3  | m4  | meaning                                    |
//! |------|-----|-----|-----|--------------------------------------------|
//! | 00   | 0   | dz  | sz  | NORMAL, with dest/source zeroing           |
//! | 00   | 1   | 0   | RG  | MAPREDUCE, RG = reverse gear               |
//! | 01   | inv | CR-bit ⁂ | FAIL-FIRST on a CR bit (`Rc=1`)            |
//! | 01   | inv | VLi | 0   | FAIL-FIRST on result non-zero (`Rc=0`)     |
//! | 10   | N   | dz  | sz  | SATURATE, N=0 signed, N=1 unsigned         |
//! | 11   | inv | CR-bit ⁂ | PREDICATE-RESULT on a CR bit (`Rc=1`)      |
//! | 11   | inv | VLi | VS  | PREDICATE-RESULT, result non-zero (`Rc=0`),|
//! |      |     |     |     | VS enables VL truncation                   |
//!
//! ⁂ `m3:m4` select LT/GT/EQ/SO.
//!
//! Branch instructions have no element width, so the `elwidth` and `ewsrc`
//! RM bits are reinterpreted as the branch stepping and VL-truncation
//! controls; only `m0` (ANY/ALL gate) and `m1` (link-register update) of the
//! mode field carry meaning, the rest must be zero.

use crate::prefix::Rm;
use crate::registers::CrBit;
use thiserror::Error;

/// The instruction class driving the mode-field interpretation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SvClass {
    /// Arithmetic/logical/load-store: the table above.
    Normal,
    /// Conditional branches: the separate decode of [`BranchDecode`].
    Branch,
}

/// The per-element condition tested by fail-first and predicate-result modes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ResultTest {
    /// A bit of the element's natural CR result (the data-dependent variant;
    /// no separate compare op is issued).
    CrBit(CrBit),
    /// The element result compared against zero.
    NonZero,
}

/// Fully decoded loop mode. Computed fresh from the RM field at each
/// instruction issue; never mutated.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ModeDecode {
    Normal {
        dst_zero: bool,
        src_zero: bool,
    },
    Mapreduce {
        /// Process `srcstep` from `vl-1` down to 0 (associativity direction).
        reverse_gear: bool,
    },
    FailFirst {
        test: ResultTest,
        invert: bool,
        /// VLi: the failing element itself remains inside the truncated VL.
        include_failing: bool,
    },
    Saturate {
        signed: bool,
        dst_zero: bool,
        src_zero: bool,
    },
    PredicateResult {
        test: ResultTest,
        invert: bool,
        /// VS: also truncate VL at the first failing element.
        vl_set: bool,
        include_boundary: bool,
    },
    Branch(BranchDecode),
}

impl ModeDecode {
    /// Decodes the mode for one SVP64-prefixed instruction.
    ///
    /// `rc` is the scalar instruction's record bit; it selects between the
    /// CR-bit and non-zero flavours of fail-first and predicate-result.
    pub fn decode(rm: Rm, class: SvClass, rc: bool) -> Result<Self, ModeError> {
        match class {
            SvClass::Normal => Self::decode_normal(rm.mode(), rc),
            SvClass::Branch => Ok(Self::Branch(BranchDecode::decode(rm)?)),
        }
    }

    fn decode_normal(mode: u8, rc: bool) -> Result<Self, ModeError> {
        let m01 = mode >> 3;
        let m2 = mode & 0b100 != 0;
        let m3 = mode & 0b010 != 0;
        let m4 = mode & 0b001 != 0;
        match m01 {
            0b00 if !m2 => Ok(Self::Normal {
                dst_zero: m3,
                src_zero: m4,
            }),
            0b00 => {
                if m3 {
                    return Err(ModeError::Reserved { mode });
                }
                Ok(Self::Mapreduce { reverse_gear: m4 })
            }
            0b01 => {
                if rc {
                    Ok(Self::FailFirst {
                        test: ResultTest::CrBit(CrBit::from_u2(mode & 0b011)),
                        invert: m2,
                        include_failing: false,
                    })
                } else {
                    if m4 {
                        return Err(ModeError::Reserved { mode });
                    }
                    Ok(Self::FailFirst {
                        test: ResultTest::NonZero,
                        invert: m2,
                        include_failing: m3,
                    })
                }
            }
            0b10 => Ok(Self::Saturate {
                signed: !m2,
                dst_zero: m3,
                src_zero: m4,
            }),
            0b11 => {
                if rc {
                    Ok(Self::PredicateResult {
                        test: ResultTest::CrBit(CrBit::from_u2(mode & 0b011)),
                        invert: m2,
                        vl_set: false,
                        include_boundary: false,
                    })
                } else {
                    Ok(Self::PredicateResult {
                        test: ResultTest::NonZero,
                        invert: m2,
                        vl_set: m4,
                        include_boundary: m3,
                    })
                }
            }
            _ => unreachable!(),
        }
    }

    /// The `(src, dst)` zeroing flags carried by this mode (only NORMAL and
    /// SATURATE have them; every other mode skips rather than zeroes).
    pub fn zeroing(&self) -> (bool, bool) {
        match *self {
            Self::Normal {
                dst_zero, src_zero, ..
            }
            | Self::Saturate {
                dst_zero, src_zero, ..
            } => (src_zero, dst_zero),
            _ => (false, false),
        }
    }
}

/// How a vectorised branch steps through its elements.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BranchStep {
    /// No per-element stepping: the branch tests the gate once.
    None,
    /// Step through elements, testing the CR field at each.
    StepTestCr,
    /// Step without testing (used to advance predication state only).
    StepOnly,
}

/// Whether a vectorised branch truncates VL at the first failing element.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BranchVlSet {
    None,
    /// The failing element remains inside the new VL.
    IncludeBoundary,
    /// VL stops just before the failing element.
    ExcludeBoundary,
}

/// Reduction applied across the active elements' branch conditions.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BranchGate {
    /// OR: taken if any active element passes.
    Any,
    /// AND: taken only if all active elements pass.
    All,
}

/// Decode of the SVP64 branch controls.
///
/// The branch decision itself belongs to the external scalar executor; this
/// struct only captures how the vector loop gathers and reduces the
/// per-element conditions.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BranchDecode {
    pub step: BranchStep,
    pub vl_set: BranchVlSet,
    pub gate: BranchGate,
    /// LRu: update the link register even for not-taken vectorised branches.
    pub link_update: bool,
}

impl BranchDecode {
    fn decode(rm: Rm) -> Result<Self, ModeError> {
        let step = match rm.elwidth_raw() {
            0b00 => BranchStep::None,
            0b01 => BranchStep::StepTestCr,
            0b10 => BranchStep::StepOnly,
            _ => return Err(ModeError::Reserved { mode: rm.mode() }),
        };
        let vl_set = match rm.ewsrc_raw() {
            0b00 => BranchVlSet::None,
            0b01 => BranchVlSet::IncludeBoundary,
            0b10 => BranchVlSet::ExcludeBoundary,
            _ => return Err(ModeError::Reserved { mode: rm.mode() }),
        };
        let mode = rm.mode();
        if mode & 0b00111 != 0 {
            // Only the gate and LRu bits are defined for branches.
            return Err(ModeError::Reserved { mode });
        }
        Ok(Self {
            step,
            vl_set,
            gate: if mode & 0b10000 != 0 {
                BranchGate::All
            } else {
                BranchGate::Any
            },
            link_update: mode & 0b01000 != 0,
        })
    }
}

/// Mode decode failures, all detectable at instruction issue.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ModeError {
    #[error("reserved mode bit combination {mode:#07b}")]
    Reserved { mode: u8 },
    #[error("invalid mode combination: {0}")]
    InvalidCombination(&'static str),
}
