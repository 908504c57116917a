//! Mode controllers: the per-element post-processing each loop mode applies.
//!
//! The step sequencer calls into these after dispatching an element. They are
//! deliberately small pure functions; all the stateful bookkeeping stays in
//! the sequencer so that a controller can never violate the loop invariants.

use crate::executor::ElementResult;
use crate::mode::{BranchDecode, BranchGate, BranchVlSet, ResultTest};
use crate::ElementWidth;

/// Applies the SATURATE controller: clamps the exact result into the
/// destination width's representable range. Returns the clamped value and
/// whether clamping occurred. Loop length is unaffected.
pub fn saturate(result: &ElementResult, width: ElementWidth, signed: bool) -> (u64, bool) {
    if signed {
        let (min, max) = (width.signed_min() as i128, width.signed_max() as i128);
        let clamped = result.exact.clamp(min, max);
        (clamped as i64 as u64, clamped != result.exact)
    } else {
        let clamped = result.unsigned_exact.clamp(0, width.unsigned_max() as i128);
        (clamped as u64, clamped != result.unsigned_exact)
    }
}

/// Evaluates the fail-first / predicate-result element test.
///
/// The data-dependent CR variant inspects the element's natural CR result
/// without a separate compare op; the non-zero variant tests the recorded
/// result against zero. `invert` flips the pass/fail sense.
pub fn result_passes(test: ResultTest, invert: bool, result: &ElementResult) -> bool {
    let pass = match test {
        ResultTest::CrBit(bit) => result.flags.bit(bit),
        ResultTest::NonZero => !result.flags.eq,
    };
    pass != invert
}

/// The VL a failing element truncates the loop to.
///
/// Truncating to `srcstep` keeps every already-completed element valid and
/// drops the failing one; with the include-boundary flag the failing element
/// stays inside the new VL.
pub fn truncated_vl(srcstep: u8, include_failing: bool) -> u8 {
    srcstep + include_failing as u8
}

/// MAPREDUCE source ordering: maps the loop counter to the source step,
/// running backwards in reverse gear (`vl-1` down to 0), which picks the
/// associativity direction (prefix-sum vs reverse-prefix-sum).
pub fn mapreduce_source(counter: u8, vl: u8, reverse_gear: bool) -> u8 {
    if reverse_gear {
        vl - 1 - counter
    } else {
        counter
    }
}

/// The outcome of reducing a vectorised branch's element conditions.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BranchOutcome {
    /// The reduced gate value the external scalar executor branches on.
    pub gate_passed: bool,
    /// New VL if the decode requested truncation at the first failure.
    pub truncate_vl: Option<u8>,
}

/// Reduces the per-element branch conditions of the active elements with the
/// decoded ANY/ALL gate, and computes the VL truncation if requested.
///
/// With no active elements the OR reduction is vacuously false and the AND
/// reduction vacuously true.
pub fn branch_reduce(
    decode: &BranchDecode,
    conditions: impl IntoIterator<Item = (u8, bool)>,
) -> BranchOutcome {
    let mut any = false;
    let mut all = true;
    let mut first_fail = None;
    for (step, pass) in conditions {
        any |= pass;
        all &= pass;
        if !pass && first_fail.is_none() {
            first_fail = Some(step);
        }
    }
    let truncate_vl = match (decode.vl_set, first_fail) {
        (BranchVlSet::None, _) | (_, None) => None,
        (BranchVlSet::IncludeBoundary, Some(step)) => Some(truncated_vl(step, true)),
        (BranchVlSet::ExcludeBoundary, Some(step)) => Some(truncated_vl(step, false)),
    };
    BranchOutcome {
        gate_passed: match decode.gate {
            BranchGate::Any => any,
            BranchGate::All => all,
        },
        truncate_vl,
    }
}
