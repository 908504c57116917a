//! The mutable vector loop cursor.
//!
//! [`VectorState`] is ordinary, fully visible architectural state: an
//! interrupt taken mid-loop saves it and later restores it exactly, resuming
//! at the same element. That is the whole reason the index generator in
//! [`crate::remap`] must be restartable at an arbitrary step.

use crate::shape::ShapeId;
use crate::{SubVl, MAX_VL};
use thiserror::Error;

/// REMAP port bindings: which shape slot, if any, reorders each of the three
/// source ports and two destination ports. Set by `svremap`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct RemapPorts {
    pub mi0: Option<ShapeId>,
    pub mi1: Option<ShapeId>,
    pub mi2: Option<ShapeId>,
    pub mo0: Option<ShapeId>,
    pub mo1: Option<ShapeId>,
}

impl RemapPorts {
    /// The binding for source operand `n` (0..3).
    pub fn source(&self, n: usize) -> Option<ShapeId> {
        [self.mi0, self.mi1, self.mi2][n]
    }

    /// The binding for destination operand `n` (0..2).
    pub fn dest(&self, n: usize) -> Option<ShapeId> {
        [self.mo0, self.mo1][n]
    }

    /// `true` if no port is bound (pure linear element order).
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The loop cursor of one in-flight (or suspended) vector instruction.
///
/// Invariants: `srcstep <= vl`, `dststep <= vl`, `vl <= maxvl`. Exactly one
/// element is current at a time; the step sequencer advances the cursor once
/// per element and resets it when the loop completes, unless persistence is
/// requested.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VectorState {
    vl: u8,
    maxvl: u8,
    /// Source element cursor.
    pub srcstep: u8,
    /// Destination element cursor (diverges from `srcstep` under twin
    /// predication).
    pub dststep: u8,
    /// Sub-element lane cursor, `0..SUBVL`.
    pub substep: u8,
    /// Vertical-first: the loop yields after every element and is advanced
    /// explicitly by `svstep`.
    pub vertical_first: bool,
    /// Pack skew on the destination lane order.
    pub pack: bool,
    /// Unpack skew on the destination lane order.
    pub unpack: bool,
    /// REMAP port bindings.
    pub ports: RemapPorts,
    /// Keep the REMAP bindings (and cursor) across instructions instead of
    /// resetting at the next issue.
    pub persist: bool,
}

impl Default for VectorState {
    fn default() -> Self {
        Self::new(MAX_VL)
    }
}

impl VectorState {
    /// A fresh cursor with `vl == maxvl` and everything else cleared.
    pub fn new(maxvl: u8) -> Self {
        assert!(maxvl <= MAX_VL);
        Self {
            vl: maxvl,
            maxvl,
            srcstep: 0,
            dststep: 0,
            substep: 0,
            vertical_first: false,
            pack: false,
            unpack: false,
            ports: RemapPorts::default(),
            persist: false,
        }
    }

    pub fn vl(&self) -> u8 {
        self.vl
    }

    pub fn maxvl(&self) -> u8 {
        self.maxvl
    }

    /// Sets MAXVL, clamping VL and the cursor into range.
    pub fn set_maxvl(&mut self, maxvl: u8) -> Result<(), StateError> {
        if maxvl > MAX_VL {
            return Err(StateError::VlTooLarge { requested: maxvl });
        }
        self.maxvl = maxvl;
        self.vl = self.vl.min(maxvl);
        self.clamp_steps();
        Ok(())
    }

    /// Sets VL. Fails if the request exceeds MAXVL.
    pub fn set_vl(&mut self, vl: u8) -> Result<(), StateError> {
        if vl > self.maxvl {
            return Err(StateError::VlExceedsMaxVl {
                requested: vl,
                maxvl: self.maxvl,
            });
        }
        self.vl = vl;
        self.clamp_steps();
        Ok(())
    }

    /// Truncates VL downwards (fail-first and friends). Never grows VL, and
    /// never fails.
    pub fn truncate_vl(&mut self, vl: u8) {
        self.vl = self.vl.min(vl);
        self.clamp_steps();
    }

    /// Resets the element cursor to the start of the loop.
    pub fn reset_steps(&mut self) {
        self.srcstep = 0;
        self.dststep = 0;
        self.substep = 0;
    }

    /// Reset performed when an instruction completes. With persistence
    /// requested the cursor and REMAP bindings survive into the next
    /// instruction; otherwise everything goes back to zero.
    pub fn complete(&mut self) {
        if !self.persist {
            self.reset_steps();
            self.ports = RemapPorts::default();
        }
    }

    fn clamp_steps(&mut self) {
        self.srcstep = self.srcstep.min(self.vl);
        self.dststep = self.dststep.min(self.vl);
    }
}

/// Vector-length configuration failures.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum StateError {
    #[error("requested VL {requested} exceeds MAXVL {maxvl}")]
    VlExceedsMaxVl { requested: u8, maxvl: u8 },
    #[error("requested length {requested} exceeds the architectural maximum")]
    VlTooLarge { requested: u8 },
}

/// Destination lane position under pack/unpack skew.
///
/// "Pack" writes element `i`, lane `j` at linear lane position `i*SUBVL + j`;
/// "unpack" is the inverse. With neither flag the natural order
/// `i*SUBVL + j` of element-major layout already applies, so pack and unpack
/// here exchange element-major and lane-major layouts. This is an index
/// transform composed onto `dststep`, not a separate state machine.
pub fn skew_lane(step: u32, lane: u8, vl: u8, subvl: SubVl, pack: bool, unpack: bool) -> u32 {
    let lanes = subvl.lanes() as u32;
    match (pack, unpack) {
        // Lane-major: all elements' lane 0, then all lane 1, ...
        (true, false) => lane as u32 * vl as u32 + step,
        // Inverse of pack.
        (false, true) => {
            let linear = step * lanes + lane as u32;
            (linear % vl as u32) * lanes + linear / vl as u32
        }
        _ => step * lanes + lane as u32,
    }
}
