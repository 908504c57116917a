//! The per-element step sequencer: the heart of the vector loop.
//!
//! One [`Sequencer`] is the in-flight execution of one SVP64-prefixed
//! instruction. [`Sequencer::issue`] performs all fallible decode and
//! validation up front; after a successful issue, [`Sequencer::step`]
//! dispatches one element lane per call until it reports
//! [`StepEvent::Done`], and can be abandoned and re-issued at any point
//! because the entire loop position lives in the architectural
//! [`VectorState`], not in the sequencer.
//!
//! Twin predication runs two independent cursors: `srcstep` skips over
//! masked-out source elements while `dststep` skips masked-out destination
//! elements, so a sparse source stream compresses into a dense destination
//! (or the reverse). The cursors advance together only when an element is
//! actually dispatched or zeroed.

use crate::executor::{ElementLoc, OpKind, ScalarExecutor};
use crate::mode::{BranchDecode, BranchStep, ModeDecode, ModeError, SvClass};
use crate::modes::{self, BranchOutcome};
use crate::predicate::{ElementAction, PredicateError, PredicateSpec};
use crate::prefix::{Operand, Rm};
use crate::registers::{CrBit, RegisterSet, Specifier, GPR_LEN};
use crate::shape::{ShapeFile, ShapeId, ShapeMode};
use crate::state::{skew_lane, VectorState};
use crate::{ElementWidth, SubVl};
use log::trace;
use thiserror::Error;

/// One scalar instruction plus the operand tagging the SVP64 prefix gave it.
///
/// The EXTRA decode (see [`crate::prefix`]) has already happened: operands
/// carry their full 7-bit register numbers and vector/scalar tags.
#[derive(Debug, Clone)]
pub struct SvInstruction {
    pub op: OpKind,
    pub srcs: Vec<Operand>,
    pub dst: Operand,
    /// The scalar instruction's record bit (`Rc=1`): per-element CR results.
    pub rc: bool,
    pub class: SvClass,
    /// Explicitly twin-predicated form (`mv`-class): a second source mask
    /// rides in the reinterpreted `ewsrc`/`subvl` bits.
    pub twin: bool,
}

/// What one call to [`Sequencer::step`] did.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StepEvent {
    /// One element lane was executed and written.
    Dispatched { srcstep: u8, dststep: u8, lane: u8 },
    /// A masked-out destination element was written with zero.
    Zeroed { dststep: u8 },
    /// Vertical-first only: the current element is masked out and nothing
    /// was written. Horizontal loops skip internally and never report this.
    Masked { srcstep: u8, dststep: u8 },
    /// The loop is complete (or was empty to begin with).
    Done,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Phase {
    Running,
    Done,
}

/// Errors detectable when an instruction is issued, before any element runs.
///
/// A failed issue leaves all architectural state untouched.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum IssueError {
    #[error(transparent)]
    Mode(#[from] ModeError),
    #[error(transparent)]
    Predicate(#[from] PredicateError),
    #[error("{op:?} takes {expected} source operands, got {got}")]
    SourceCount {
        op: OpKind,
        expected: usize,
        got: usize,
    },
    #[error("vector operand at {base} spans {spanned} registers, beyond the register file")]
    BeyondRegisterFile { base: Specifier, spanned: u64 },
    #[error("VL={vl} exceeds the {steps} steps of the bound schedule")]
    ScheduleExhausted { vl: u8, steps: u32 },
}

/// The in-flight execution of one SVP64-prefixed instruction.
#[derive(Debug)]
pub struct Sequencer {
    op: OpKind,
    srcs: Vec<Operand>,
    dst: Operand,
    rc: bool,
    mode: ModeDecode,
    src_pred: PredicateSpec,
    dst_pred: PredicateSpec,
    subvl: SubVl,
    src_width: ElementWidth,
    dst_width: ElementWidth,
    phase: Phase,
}

impl Sequencer {
    /// Decodes and validates one prefixed instruction against the current
    /// vector state and shape slots.
    ///
    /// All reserved-encoding and range failures surface here, including
    /// vector operands whose elements would land beyond the register file; a
    /// returned sequencer will never fail mid-loop.
    pub fn issue(
        inst: SvInstruction,
        rm: Rm,
        state: &VectorState,
        shapes: &ShapeFile,
    ) -> Result<Self, IssueError> {
        let expected = inst.op.source_count();
        if inst.srcs.len() != expected {
            return Err(IssueError::SourceCount {
                op: inst.op,
                expected,
                got: inst.srcs.len(),
            });
        }
        let mode = ModeDecode::decode(rm, inst.class, inst.rc)?;
        if matches!(mode, ModeDecode::Branch(_)) {
            return Err(ModeError::InvalidCombination(
                "vectorised branches are reduced with evaluate_branch, not stepped",
            )
            .into());
        }
        if matches!(mode, ModeDecode::Mapreduce { .. }) && inst.dst.vector {
            return Err(ModeError::InvalidCombination(
                "mapreduce requires a scalar destination",
            )
            .into());
        }
        let (src_zero, dst_zero) = mode.zeroing();
        let dst_pred = PredicateSpec::decode(rm.mmode(), rm.mask(), dst_zero);
        let src_pred = if inst.twin {
            PredicateSpec::decode(rm.mmode(), rm.smask(), src_zero)
        } else {
            PredicateSpec::decode(rm.mmode(), rm.mask(), src_zero)
        };
        src_pred.validate(state.vl())?;
        dst_pred.validate(state.vl())?;
        let dst_width = rm.elwidth();
        // Twin-predicated forms have no separate source width: the ewsrc bits
        // carry the source mask instead, and only the low subvl bit survives.
        let (src_width, subvl) = if inst.twin {
            (dst_width, SubVl::from_u2(rm.subvl() as u8 & 0b01))
        } else {
            (rm.ewsrc(), rm.subvl())
        };
        for (n, operand) in inst.srcs.iter().enumerate() {
            validate_extent(*operand, src_width, subvl, state, shapes, state.ports.source(n))?;
        }
        validate_extent(inst.dst, dst_width, subvl, state, shapes, state.ports.dest(0))?;
        trace!(
            "issued {:?} dst={} vl={} mode={mode:?}",
            inst.op,
            inst.dst.reg,
            state.vl()
        );
        Ok(Self {
            op: inst.op,
            srcs: inst.srcs,
            dst: inst.dst,
            rc: inst.rc,
            mode,
            src_pred,
            dst_pred,
            subvl,
            src_width,
            dst_width,
            phase: if state.vl() == 0 {
                Phase::Done
            } else {
                Phase::Running
            },
        })
    }

    /// `true` once the loop has completed (or never had elements to run).
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Advances the loop by one productive event.
    ///
    /// Horizontal loops skip masked elements internally, so every call either
    /// dispatches a lane, zeroes a masked destination element, or completes.
    /// Vertical-first loops handle exactly the element at the current cursor
    /// and then park: the cursor is advanced externally (`svstep`), never
    /// here.
    pub fn step(
        &mut self,
        state: &mut VectorState,
        shapes: &ShapeFile,
        regs: &mut RegisterSet,
        exec: &mut dyn ScalarExecutor,
    ) -> StepEvent {
        if self.phase == Phase::Done {
            return StepEvent::Done;
        }
        if state.vertical_first {
            return self.step_vertical(state, shapes, regs, exec);
        }
        loop {
            let vl = state.vl();
            if state.srcstep >= vl || state.dststep >= vl {
                return self.finish(state);
            }
            let src_action = self.src_pred.action(regs, state.srcstep as u32);
            let dst_action = self.dst_pred.action(regs, state.dststep as u32);
            match (src_action, dst_action) {
                (_, ElementAction::Zero) => {
                    let dststep = state.dststep;
                    self.write_zero_lanes(state, shapes, regs, dststep);
                    state.dststep += 1;
                    // A masked source element is consumed along with its
                    // zeroed destination; an active one waits for the next
                    // active destination slot.
                    if src_action != ElementAction::Active {
                        state.srcstep += 1;
                    }
                    return StepEvent::Zeroed { dststep };
                }
                (src_action, ElementAction::Skip) => {
                    state.dststep += 1;
                    if src_action != ElementAction::Active {
                        state.srcstep += 1;
                    }
                }
                (ElementAction::Skip, ElementAction::Active) => {
                    state.srcstep += 1;
                }
                (ElementAction::Zero, ElementAction::Active) => {
                    // Source zeroing: the masked source element is consumed
                    // and contributes zero, so the destination gets zero.
                    let dststep = state.dststep;
                    self.write_zero_lanes(state, shapes, regs, dststep);
                    state.srcstep += 1;
                    state.dststep += 1;
                    return StepEvent::Zeroed { dststep };
                }
                (ElementAction::Active, ElementAction::Active) => {
                    let (event, done) = self.dispatch(state, shapes, regs, exec);
                    if done {
                        return self.finish(state);
                    }
                    state.substep += 1;
                    if state.substep >= self.subvl.lanes() {
                        state.substep = 0;
                        state.srcstep += 1;
                        state.dststep += 1;
                    }
                    return event;
                }
            }
        }
    }

    /// Vertical-first step: exactly the element under the cursor, no advance.
    fn step_vertical(
        &mut self,
        state: &mut VectorState,
        shapes: &ShapeFile,
        regs: &mut RegisterSet,
        exec: &mut dyn ScalarExecutor,
    ) -> StepEvent {
        self.phase = Phase::Done;
        let vl = state.vl();
        if state.srcstep >= vl || state.dststep >= vl {
            return StepEvent::Done;
        }
        let src_action = self.src_pred.action(regs, state.srcstep as u32);
        let dst_action = self.dst_pred.action(regs, state.dststep as u32);
        match (src_action, dst_action) {
            (ElementAction::Active, ElementAction::Active) => {
                let (event, _) = self.dispatch(state, shapes, regs, exec);
                event
            }
            (ElementAction::Zero, _) | (_, ElementAction::Zero) => {
                let dststep = state.dststep;
                self.write_zero_lanes(state, shapes, regs, dststep);
                StepEvent::Zeroed { dststep }
            }
            _ => StepEvent::Masked {
                srcstep: state.srcstep,
                dststep: state.dststep,
            },
        }
    }

    /// Executes the lane under the cursor and applies the mode controller.
    ///
    /// Returns the event plus whether the mode controller ended the loop
    /// (fail-first and VL-setting predicate-result).
    fn dispatch(
        &mut self,
        state: &mut VectorState,
        shapes: &ShapeFile,
        regs: &mut RegisterSet,
        exec: &mut dyn ScalarExecutor,
    ) -> (StepEvent, bool) {
        let vl = state.vl();
        let srcstep = state.srcstep;
        let dststep = state.dststep;
        let lane = state.substep;
        let src_step = match self.mode {
            ModeDecode::Mapreduce { reverse_gear } => {
                modes::mapreduce_source(srcstep, vl, reverse_gear)
            }
            _ => srcstep,
        };
        let lanes = self.subvl.lanes() as u32;
        let locs: Vec<ElementLoc> = self
            .srcs
            .iter()
            .enumerate()
            .map(|(n, operand)| {
                if operand.vector {
                    let remapped = remap(shapes, state.ports.source(n), src_step as u32);
                    ElementLoc::new(operand.reg, remapped * lanes + lane as u32)
                } else {
                    ElementLoc::new(operand.reg, 0)
                }
            })
            .collect();
        let dst_offset = self.dst_lane_offset(state, shapes, dststep, lane);
        let result = exec.execute(regs, self.op, &locs, self.src_width, self.dst_width);
        trace!("element {srcstep}->{dststep}.{lane}: {:#x}", result.value);

        let mut value = result.value;
        let mut flags = result.flags;
        let mut write_value = true;
        let mut done = false;
        match self.mode {
            ModeDecode::Saturate { signed, .. } => {
                let (clamped, saturated) = modes::saturate(&result, self.dst_width, signed);
                value = clamped;
                flags.so = saturated;
            }
            ModeDecode::FailFirst {
                test,
                invert,
                include_failing,
            } => {
                if !modes::result_passes(test, invert, &result) {
                    write_value = include_failing;
                    state.truncate_vl(modes::truncated_vl(srcstep, include_failing));
                    done = true;
                }
            }
            ModeDecode::PredicateResult {
                test,
                invert,
                vl_set,
                include_boundary,
            } => {
                let pass = modes::result_passes(test, invert, &result);
                write_value = pass;
                if !pass && vl_set {
                    state.truncate_vl(modes::truncated_vl(dststep, include_boundary));
                    done = true;
                }
            }
            _ => {}
        }
        if write_value {
            regs.gprs
                .write_element(self.dst.reg, self.dst_width, dst_offset, value);
        }
        if self.rc {
            regs.crs.set_field(dststep as u32, flags);
        }
        (
            StepEvent::Dispatched {
                srcstep,
                dststep,
                lane,
            },
            done,
        )
    }

    /// The physical element offset of destination lane `lane` at `dststep`,
    /// after REMAP and pack/unpack skew. Scalar destinations sit at offset 0.
    fn dst_lane_offset(
        &self,
        state: &VectorState,
        shapes: &ShapeFile,
        dststep: u8,
        lane: u8,
    ) -> u32 {
        if !self.dst.vector {
            return 0;
        }
        let remapped = remap(shapes, state.ports.dest(0), dststep as u32);
        skew_lane(
            remapped,
            lane,
            state.vl(),
            self.subvl,
            state.pack,
            state.unpack,
        )
    }

    /// Zeroing predication: writes zero to every lane of `dststep`.
    fn write_zero_lanes(
        &self,
        state: &VectorState,
        shapes: &ShapeFile,
        regs: &mut RegisterSet,
        dststep: u8,
    ) {
        for lane in 0..self.subvl.lanes() {
            let offset = self.dst_lane_offset(state, shapes, dststep, lane);
            regs.gprs
                .write_element(self.dst.reg, self.dst_width, offset, 0);
        }
    }

    fn finish(&mut self, state: &mut VectorState) -> StepEvent {
        self.phase = Phase::Done;
        state.complete();
        StepEvent::Done
    }
}

/// Issue-time check that every element of a vector operand lands inside the
/// register file, including elements reached through a bound REMAP schedule.
///
/// The bound is exact: remapped indices are enumerated over the steps the
/// loop will take. Pack/unpack and lane skew never reach past
/// `max(bound + 1, vl)` elements, so that count sizes the operand.
fn validate_extent(
    operand: Operand,
    width: ElementWidth,
    subvl: SubVl,
    state: &VectorState,
    shapes: &ShapeFile,
    port: Option<ShapeId>,
) -> Result<(), IssueError> {
    let vl = state.vl();
    if !operand.vector || vl == 0 {
        return Ok(());
    }
    let bound = match port {
        Some(id) => {
            let shape = shapes.get(id);
            if matches!(shape.mode, ShapeMode::Fft | ShapeMode::Dct(_))
                && vl as u32 > shape.element_count()
            {
                // Stepping a butterfly schedule past its last layer is
                // undefined.
                return Err(IssueError::ScheduleExhausted {
                    vl,
                    steps: shape.element_count(),
                });
            }
            (0..vl as u32)
                .map(|step| shape.index(step).value)
                .max()
                .unwrap_or(0)
        }
        None => vl as u32 - 1,
    };
    let slots = (bound as u64 + 1).max(vl as u64) * subvl.lanes() as u64;
    let spanned = slots.div_ceil(width.per_register() as u64);
    if u8::from(operand.reg) as u64 + spanned > GPR_LEN as u64 {
        return Err(IssueError::BeyondRegisterFile {
            base: operand.reg,
            spanned,
        });
    }
    Ok(())
}

/// Applies the REMAP schedule bound to a port, or the identity if unbound.
fn remap(shapes: &ShapeFile, port: Option<ShapeId>, step: u32) -> u32 {
    match port {
        Some(id) => shapes.get(id).index(step).value,
        None => step,
    }
}

/// Reduces the per-element conditions of one vectorised branch.
///
/// Gathers `bit` from the CR field of every remaining active element (masked
/// elements under zeroing predication count as failing), reduces with the
/// decoded ANY/ALL gate and applies the requested VL truncation. The branch
/// decision itself (and the actual PC change) belongs to the scalar executor;
/// only the gathering and reduction are vector-loop business.
pub fn evaluate_branch(
    rm: Rm,
    bit: CrBit,
    state: &mut VectorState,
    regs: &RegisterSet,
) -> Result<BranchOutcome, IssueError> {
    let decode = match ModeDecode::decode(rm, SvClass::Branch, false)? {
        ModeDecode::Branch(decode) => decode,
        _ => unreachable!(),
    };
    let pred = PredicateSpec::decode(rm.mmode(), rm.mask(), false);
    pred.validate(state.vl())?;
    let outcome = reduce_conditions(&decode, bit, &pred, state, regs);
    if let Some(vl) = outcome.truncate_vl {
        state.truncate_vl(vl);
    }
    state.complete();
    Ok(outcome)
}

fn reduce_conditions(
    decode: &BranchDecode,
    bit: CrBit,
    pred: &PredicateSpec,
    state: &VectorState,
    regs: &RegisterSet,
) -> BranchOutcome {
    let condition = |step: u8| {
        regs.crs
            .field(step as u32)
            .map(|flags| flags.bit(bit))
            .unwrap_or(false)
    };
    let range = match decode.step {
        // Unstepped: only the element under the cursor is tested.
        BranchStep::None => state.srcstep..state.srcstep.saturating_add(1).min(state.vl()),
        BranchStep::StepTestCr => state.srcstep..state.vl(),
        // Stepping without testing: the gate reduces over nothing.
        BranchStep::StepOnly => 0..0,
    };
    let conditions = range.filter_map(|step| match pred.action(regs, step as u32) {
        ElementAction::Active => Some((step, condition(step))),
        ElementAction::Zero => Some((step, false)),
        ElementAction::Skip => None,
    });
    modes::branch_reduce(decode, conditions)
}
