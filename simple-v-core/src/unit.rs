//! The top-level vector unit: register files, shape slots and loop state
//! bundled together, with the SVP64 management operations (`setvl`, `svstep`,
//! `svshape`, `svshape2`, `svindex`, `svremap`) and a driver that runs one
//! prefixed instruction to completion.
//!
//! Everything here is orchestration; the actual per-element work happens in
//! [`crate::sequencer`].

use crate::executor::ScalarExecutor;
use crate::prefix::Rm;
use crate::registers::{ConditionFlags, RegisterSet};
use crate::sequencer::{IssueError, Sequencer, StepEvent, SvInstruction};
use crate::shape::{DctVariant, ShapeDescriptor, ShapeError, ShapeFile, ShapeId};
use crate::state::{RemapPorts, StateError, VectorState};
use crate::SubVl;
use log::debug;

/// The complete architectural state of one SVP64 vector unit.
#[derive(Debug, Clone, Default)]
pub struct VectorUnit {
    pub regs: RegisterSet,
    pub shapes: ShapeFile,
    pub state: VectorState,
}

impl VectorUnit {
    pub fn new(maxvl: u8) -> Self {
        Self {
            regs: RegisterSet::default(),
            shapes: ShapeFile::new(),
            state: VectorState::new(maxvl),
        }
    }

    /// `setvl`: configures MAXVL and VL and selects horizontal or
    /// vertical-first execution. Returns the new VL.
    ///
    /// The element cursor is reset: `setvl` starts a fresh loop.
    pub fn setvl(
        &mut self,
        maxvl: u8,
        vl: Option<u8>,
        vertical_first: bool,
    ) -> Result<u8, StateError> {
        self.state.set_maxvl(maxvl)?;
        let vl = vl.unwrap_or(maxvl);
        self.state.set_vl(vl)?;
        self.state.vertical_first = vertical_first;
        self.state.reset_steps();
        debug!("setvl: vl={vl} maxvl={maxvl} vertical_first={vertical_first}");
        Ok(vl)
    }

    /// `svstep`: explicitly advances the vertical-first cursor by one lane.
    ///
    /// With `subvl` above 1 the cursor walks the sub-vector lanes of the
    /// current element before moving to the next element, mirroring the lane
    /// order of the horizontal loop. Reports the loop position as CR-style
    /// flags: EQ set when the loop has just completed (and the cursor reset,
    /// unless persistent), LT/GT set while the source/destination cursor is
    /// mid-loop. With `rc` the flags are also recorded in CR field 0, so a
    /// vertical-first loop can close with a single conditional branch on
    /// CR0.EQ.
    pub fn svstep(&mut self, subvl: SubVl, rc: bool) -> ConditionFlags {
        let state = &mut self.state;
        state.substep += 1;
        let done = if state.substep < subvl.lanes() {
            false
        } else {
            state.substep = 0;
            state.srcstep += 1;
            state.dststep += 1;
            state.srcstep >= state.vl() || state.dststep >= state.vl()
        };
        if done {
            state.complete();
        }
        let flags = ConditionFlags {
            lt: !done && state.srcstep != 0,
            gt: !done && state.dststep != 0,
            eq: done,
            so: false,
        };
        if rc {
            self.regs.crs.set_field(0, flags);
        }
        flags
    }

    /// `svshape` (butterfly form): installs the complete FFT REMAP set for an
    /// in-place transform over `n` elements.
    ///
    /// Slots 0..=2 receive the low-index, high-index and twiddle-index
    /// schedules; binding them to the operand ports with [`svremap`]
    /// vectorises an entire radix-2 butterfly network in one loop.
    pub fn svshape_fft(&mut self, n: u32) -> Result<(), ShapeError> {
        let maxvl = self.state.maxvl();
        for skip in 0..3 {
            self.shapes.install(
                ShapeId::from_u2(skip),
                ShapeDescriptor::fft(n, skip),
                maxvl,
            )?;
        }
        Ok(())
    }

    /// `svshape` (DCT form): installs the four DCT REMAP schedules (low,
    /// high, coefficient index, coefficient-table size) for `n` elements.
    pub fn svshape_dct(&mut self, n: u32, variant: DctVariant) -> Result<(), ShapeError> {
        let maxvl = self.state.maxvl();
        for skip in 0..4 {
            self.shapes.install(
                ShapeId::from_u2(skip),
                ShapeDescriptor::dct(n, variant, skip),
                maxvl,
            )?;
        }
        Ok(())
    }

    /// `svshape` (matrix form): installs a multi-dimensional schedule in one
    /// slot.
    pub fn svshape_matrix(
        &mut self,
        id: ShapeId,
        lims: [u32; 3],
        order: [u8; 3],
        invxyz: [bool; 3],
    ) -> Result<(), ShapeError> {
        let shape = ShapeDescriptor::matrix(lims, order, invxyz);
        self.shapes.install(id, shape, self.state.maxvl())
    }

    /// `svshape2`: the offset-modulo form. Installs a linear schedule whose
    /// generated indices are shifted by `offset` and wrapped modulo `modulo`.
    pub fn svshape2(
        &mut self,
        id: ShapeId,
        modulo: u32,
        offset: i32,
        invert: bool,
    ) -> Result<(), ShapeError> {
        let shape = ShapeDescriptor {
            lims: [modulo, 0, 0],
            invxyz: [invert, false, false],
            offset,
            ..ShapeDescriptor::identity()
        };
        self.shapes.install(id, shape, self.state.maxvl())
    }

    /// `svindex`: installs a matrix schedule with an explicit output selector
    /// and offset, the general-purpose remapping form.
    pub fn svindex(
        &mut self,
        id: ShapeId,
        lims: [u32; 3],
        skip: u8,
        offset: i32,
    ) -> Result<(), ShapeError> {
        let shape = ShapeDescriptor {
            skip,
            offset,
            ..ShapeDescriptor::matrix(lims, [0, 1, 2], [false; 3])
        };
        self.shapes.install(id, shape, self.state.maxvl())
    }

    /// `svremap`: binds shape slots to the five operand ports.
    ///
    /// With `persist` the bindings (and the cursor) survive instruction
    /// completion instead of clearing; otherwise they apply to the next
    /// prefixed instruction only.
    pub fn svremap(&mut self, ports: RemapPorts, persist: bool) {
        self.state.ports = ports;
        self.state.persist = persist;
    }

    /// Issues one prefixed instruction and steps it to completion (or, in
    /// vertical-first mode, through exactly one element).
    ///
    /// Returns every productive event in order, mostly useful to tests and
    /// tracing; the architectural effects land in `self.regs` and
    /// `self.state`.
    pub fn execute(
        &mut self,
        inst: SvInstruction,
        rm: Rm,
        exec: &mut dyn ScalarExecutor,
    ) -> Result<Vec<StepEvent>, IssueError> {
        let mut seq = Sequencer::issue(inst, rm, &self.state, &self.shapes)?;
        let mut events = Vec::new();
        loop {
            match seq.step(&mut self.state, &self.shapes, &mut self.regs, exec) {
                StepEvent::Done => break,
                event => events.push(event),
            }
        }
        debug!("executed prefixed instruction: {} events", events.len());
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{IntegerExecutor, OpKind};
    use crate::mode::SvClass;
    use crate::prefix::Operand;
    use crate::registers::Specifier;
    use crate::remap::RemapStep;
    use crate::shape::ShapeMode;

    fn r(index: u8) -> Specifier {
        Specifier::from_u7(index)
    }

    fn add(a: u8, b: u8, dst: u8) -> SvInstruction {
        SvInstruction {
            op: OpKind::Add,
            srcs: vec![Operand::vector(r(a)), Operand::vector(r(b))],
            dst: Operand::vector(r(dst)),
            rc: false,
            class: SvClass::Normal,
            twin: false,
        }
    }

    #[test]
    fn test_setvl_configures_loop() {
        let mut unit = VectorUnit::new(8);
        assert_eq!(Ok(5), unit.setvl(5, None, false));
        assert_eq!(5, unit.state.vl());
        assert_eq!(Ok(2), unit.setvl(5, Some(2), true));
        assert!(unit.state.vertical_first);
        assert!(unit.setvl(5, Some(6), false).is_err());
    }

    #[test]
    fn test_horizontal_add_loop() {
        // VL=2: r1 = r5 + r9, r2 = r6 + r10, in a single prefixed add.
        let mut unit = VectorUnit::new(8);
        unit.setvl(8, Some(2), false).unwrap();
        unit.regs.gprs.write(r(5), 0x1111);
        unit.regs.gprs.write(r(6), 0x2222);
        unit.regs.gprs.write(r(9), 0x4444);
        unit.regs.gprs.write(r(10), 0x1112);
        let mut alu = IntegerExecutor;
        let events = unit
            .execute(add(5, 9, 1), Rm::from_u24(0), &mut alu)
            .unwrap();
        assert_eq!(2, events.len());
        assert_eq!(0x5555, unit.regs.gprs.read(r(1)));
        assert_eq!(0x3334, unit.regs.gprs.read(r(2)));
        // r3 untouched: the loop stops exactly at VL.
        assert_eq!(0, unit.regs.gprs.read(r(3)));
    }

    #[test]
    fn test_vl_zero_is_a_no_op() {
        let mut unit = VectorUnit::new(8);
        unit.setvl(8, Some(0), false).unwrap();
        unit.regs.gprs.write(r(5), 7);
        let mut alu = IntegerExecutor;
        let events = unit
            .execute(add(5, 9, 1), Rm::from_u24(0), &mut alu)
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(0, unit.regs.gprs.read(r(1)));
    }

    #[test]
    fn test_vertical_first_program() {
        // A vertical-first loop: re-issue the prefixed add once per element,
        // advancing with svstep, closing on CR0.EQ.
        let mut unit = VectorUnit::new(8);
        unit.setvl(8, Some(3), true).unwrap();
        for i in 0..3 {
            unit.regs.gprs.write(r(5 + i), 10 * (i as u64 + 1));
            unit.regs.gprs.write(r(9 + i), i as u64 + 1);
        }
        let mut alu = IntegerExecutor;
        let mut iterations = 0;
        loop {
            let events = unit
                .execute(add(5, 9, 1), Rm::from_u24(0), &mut alu)
                .unwrap();
            assert_eq!(1, events.len());
            iterations += 1;
            let flags = unit.svstep(SubVl::S1, true);
            assert_eq!(Some(flags), unit.regs.crs.field(0));
            if flags.eq {
                break;
            }
            assert!(flags.lt && flags.gt);
        }
        assert_eq!(3, iterations);
        let written: Vec<u64> = (1..4).map(|i| unit.regs.gprs.read(r(i))).collect();
        assert_eq!(vec![11, 22, 33], written);
        // Loop completion reset the cursor.
        assert_eq!(0, unit.state.srcstep);
    }

    #[test]
    fn test_vertical_first_walks_subvl_lanes() {
        // SUBVL=2 vertical-first: svstep advances through both lanes of an
        // element before moving to the next element, so VL=2 takes four
        // issues of the prefixed add.
        let mut unit = VectorUnit::new(8);
        unit.setvl(8, Some(2), true).unwrap();
        for (i, value) in [1u64, 2, 3, 4].into_iter().enumerate() {
            unit.regs.gprs.write(r(8 + i as u8), value);
        }
        for (i, value) in [10u64, 20, 30, 40].into_iter().enumerate() {
            unit.regs.gprs.write(r(16 + i as u8), value);
        }
        let rm = Rm::from_u24(0b01 << 14);
        let mut alu = IntegerExecutor;
        let mut lanes = Vec::new();
        loop {
            let events = unit.execute(add(8, 16, 24), rm, &mut alu).unwrap();
            assert_eq!(1, events.len());
            lanes.push(events[0]);
            if unit.svstep(SubVl::S2, false).eq {
                break;
            }
        }
        assert_eq!(
            vec![
                StepEvent::Dispatched { srcstep: 0, dststep: 0, lane: 0 },
                StepEvent::Dispatched { srcstep: 0, dststep: 0, lane: 1 },
                StepEvent::Dispatched { srcstep: 1, dststep: 1, lane: 0 },
                StepEvent::Dispatched { srcstep: 1, dststep: 1, lane: 1 },
            ],
            lanes
        );
        let written: Vec<u64> = (24..28).map(|i| unit.regs.gprs.read(r(i))).collect();
        assert_eq!(vec![11, 22, 33, 44], written);
    }

    #[test]
    fn test_svshape_fft_installs_three_slots() {
        let mut unit = VectorUnit::new(16);
        unit.svshape_fft(8).unwrap();
        for skip in 0..3 {
            let shape = unit.shapes.get(ShapeId::from_u2(skip));
            assert_eq!(ShapeMode::Fft, shape.mode);
            assert_eq!(skip, shape.skip);
            assert_eq!(12, shape.element_count());
        }
        // Slot 3 stays at the identity.
        assert_eq!(
            ShapeDescriptor::identity(),
            *unit.shapes.get(ShapeId::Shape3)
        );
        assert!(unit.svshape_fft(6).is_err());
    }

    #[test]
    fn test_svshape_dct_installs_four_slots() {
        let mut unit = VectorUnit::new(16);
        unit.svshape_dct(8, DctVariant::TypeTwo).unwrap();
        for skip in 0..4 {
            let shape = unit.shapes.get(ShapeId::from_u2(skip));
            assert_eq!(ShapeMode::Dct(DctVariant::TypeTwo), shape.mode);
            assert_eq!(skip, shape.skip);
        }
    }

    #[test]
    fn test_svshape2_offset_modulo() {
        let mut unit = VectorUnit::new(8);
        unit.svshape2(ShapeId::Shape1, 4, 2, false).unwrap();
        let shape = unit.shapes.get(ShapeId::Shape1);
        let indices: Vec<u32> = shape.indices().map(|step| step.value).collect();
        assert_eq!(vec![2, 3, 0, 1], indices);
    }

    #[test]
    fn test_svindex_matrix_schedule() {
        let mut unit = VectorUnit::new(8);
        unit.svindex(ShapeId::Shape0, [2, 3, 0], 0, 0).unwrap();
        let shape = unit.shapes.get(ShapeId::Shape0);
        assert_eq!(6, shape.element_count());
        assert_eq!(RemapStep { value: 0, loop_ends: 0 }, shape.index(0));
    }

    #[test]
    fn test_svremap_persistence() {
        let mut unit = VectorUnit::new(8);
        unit.setvl(8, Some(2), false).unwrap();
        unit.svshape2(ShapeId::Shape0, 2, 1, false).unwrap();
        unit.svremap(
            RemapPorts {
                mi0: Some(ShapeId::Shape0),
                ..RemapPorts::default()
            },
            true,
        );
        unit.regs.gprs.write(r(8), 10);
        unit.regs.gprs.write(r(9), 20);
        let mut alu = IntegerExecutor;
        let inst = SvInstruction {
            op: OpKind::Move,
            srcs: vec![Operand::vector(r(8))],
            dst: Operand::vector(r(16)),
            rc: false,
            class: SvClass::Normal,
            twin: false,
        };
        unit.execute(inst.clone(), Rm::from_u24(0), &mut alu).unwrap();
        // The rotation shape swapped the two elements.
        assert_eq!(20, unit.regs.gprs.read(r(16)));
        assert_eq!(10, unit.regs.gprs.read(r(17)));
        // Persistent bindings survive completion.
        assert_eq!(Some(ShapeId::Shape0), unit.state.ports.mi0);

        // Without persistence they clear. The persistent completion also
        // kept the cursor, so restart it explicitly.
        unit.state.reset_steps();
        unit.svremap(
            RemapPorts {
                mi0: Some(ShapeId::Shape0),
                ..RemapPorts::default()
            },
            false,
        );
        unit.execute(inst, Rm::from_u24(0), &mut alu).unwrap();
        assert!(unit.state.ports.is_empty());
    }
}
