//! The scalar executor interface consumed by the step sequencer.
//!
//! The vector-iteration core computes *which* physical elements an operation
//! touches; what the operation does to their values is someone else's
//! business, hidden behind [`ScalarExecutor`]. The sequencer hands the
//! executor the computed element locations and the effective element width,
//! and gets back the raw result plus condition flags. The destination write
//! stays with the sequencer, which may zero it (predication), clamp it
//! (saturation) or suppress it (predicate-result) first.
//!
//! [`IntegerExecutor`] is the bundled implementation: a plain integer ALU
//! with just enough operations to exercise every loop mode.

use crate::registers::{ConditionFlags, RegisterSet, Specifier};
use crate::ElementWidth;

/// The physical location of one element: a base register and an element
/// offset at a given width (offset 0 is the low element of `base`).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ElementLoc {
    pub base: Specifier,
    pub offset: u32,
}

impl ElementLoc {
    pub fn new(base: Specifier, offset: u32) -> Self {
        Self { base, offset }
    }
}

/// The outcome of one scalar element operation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ElementResult {
    /// The result, wrapped to 64 bits. The sequencer truncates to the
    /// destination element width on write.
    pub value: u64,
    /// The mathematically exact result with operands read as signed values,
    /// before any width wrap. The saturate controller clamps this into the
    /// destination width's signed range.
    pub exact: i128,
    /// The exact result with operands read as unsigned values, for the
    /// unsigned saturation flavour.
    pub unsigned_exact: i128,
    /// Rc=1-style flags: the sign/zero classification of the result at the
    /// destination width, as the scalar instruction would record them.
    pub flags: ConditionFlags,
}

/// Scalar operations understood by the bundled [`IntegerExecutor`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OpKind {
    /// Two-source addition.
    Add,
    /// Two-source subtraction (first minus second).
    Sub,
    And,
    Or,
    Xor,
    /// Sign-extend the source element from its width to the destination
    /// width (the `extsb`/`extsh`/`extsw` family, width-driven).
    SignExtend,
    /// Copy the source element (`mr`/`ori r,r,0` style move).
    Move,
}

impl OpKind {
    /// Number of source operands the operation consumes.
    pub fn source_count(self) -> usize {
        match self {
            OpKind::Add | OpKind::Sub | OpKind::And | OpKind::Or | OpKind::Xor => 2,
            OpKind::SignExtend | OpKind::Move => 1,
        }
    }
}

/// Interface to the scalar execution unit (consumed, not defined, by this
/// crate).
pub trait ScalarExecutor {
    /// Executes `op` over the elements at `srcs`, read at `src_width`,
    /// producing a result destined for a `dst_width` element.
    fn execute(
        &mut self,
        regs: &RegisterSet,
        op: OpKind,
        srcs: &[ElementLoc],
        src_width: ElementWidth,
        dst_width: ElementWidth,
    ) -> ElementResult;
}

/// A minimal elwidth-aware integer ALU.
#[derive(Debug, Default)]
pub struct IntegerExecutor;

impl ScalarExecutor for IntegerExecutor {
    fn execute(
        &mut self,
        regs: &RegisterSet,
        op: OpKind,
        srcs: &[ElementLoc],
        src_width: ElementWidth,
        dst_width: ElementWidth,
    ) -> ElementResult {
        let read = |loc: &ElementLoc| regs.gprs.read_element(loc.base, src_width, loc.offset);
        let signed = |value: u64| sign_extend(value, src_width) as i128;
        let (value, exact, unsigned_exact) = match op {
            OpKind::Add => {
                let (a, b) = (read(&srcs[0]), read(&srcs[1]));
                (
                    a.wrapping_add(b),
                    signed(a) + signed(b),
                    a as i128 + b as i128,
                )
            }
            OpKind::Sub => {
                let (a, b) = (read(&srcs[0]), read(&srcs[1]));
                (
                    a.wrapping_sub(b),
                    signed(a) - signed(b),
                    a as i128 - b as i128,
                )
            }
            OpKind::And => logical(read(&srcs[0]) & read(&srcs[1])),
            OpKind::Or => logical(read(&srcs[0]) | read(&srcs[1])),
            OpKind::Xor => logical(read(&srcs[0]) ^ read(&srcs[1])),
            OpKind::SignExtend => {
                let extended = sign_extend(read(&srcs[0]), src_width);
                (extended as u64, extended as i128, extended as i128)
            }
            OpKind::Move => logical(read(&srcs[0])),
        };
        let recorded = sign_extend(value & dst_width.unsigned_max(), dst_width);
        ElementResult {
            value,
            exact,
            unsigned_exact,
            flags: ConditionFlags::from_signed_result(recorded, false),
        }
    }
}

fn logical(value: u64) -> (u64, i128, i128) {
    (value, value as i128, value as i128)
}

/// Sign-extends the low `width` bits of `value` to 64 bits.
fn sign_extend(value: u64, width: ElementWidth) -> i64 {
    let shift = 64 - width.bits();
    ((value << shift) as i64) >> shift
}
