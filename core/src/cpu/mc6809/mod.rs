//! Cycle-accurate MC6809 core with the HD6309 extensions behind a variant
//! switch.
//!
//! Execution is a per-cycle state machine: every call to `execute_cycle`
//! performs exactly one bus transaction (read, write, or internal dead
//! cycle). Decode is table driven (`decode`); the addressing and operate
//! sequencers in `exec` and `indexed` walk the decoded instruction through
//! its bus cycles. Interrupt lines are sampled every cycle; dispatch happens
//! only at instruction boundaries, between TFM transfer units, and out of
//! SYNC/CWAI waits.

mod alu;
mod decode;
mod exec;
mod hd6309;
mod indexed;

use crate::core::{
    Bus, BusMaster,
    component::BusMasterComponent,
};
use crate::cpu::{
    Cpu,
    state::{CpuStateTrait, Mc6809State, WaitState},
};
use decode::{AddrMode, Instr, Op, Reg8, Reg16, StackPtr};
use indexed::IdxState;

#[repr(u8)]
#[derive(Copy, Clone, Debug)]
pub enum CcFlag {
    C = 0x01, // Carry
    V = 0x02, // Overflow
    Z = 0x04, // Zero
    N = 0x08, // Negative
    I = 0x10, // IRQ mask
    H = 0x20, // Half carry
    F = 0x40, // FIRQ mask
    E = 0x80, // Entire
}

// MD register bits (6309). The low two are program-writable via LDMD; the
// high two are status bits latched by the trap paths and read via BITMD.
pub const MD_NATIVE: u8 = 0x01;
pub const MD_FIRQ_ENTIRE: u8 = 0x02;
pub const MD_ILLEGAL: u8 = 0x40;
pub const MD_DIV0: u8 = 0x80;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    Mc6809,
    Hd6309,
}

/// Exception and interrupt sources, each with its own vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IntKind {
    Nmi,
    Firq,
    Irq,
    Swi,
    Swi2,
    Swi3,
    Trap,
}

impl IntKind {
    pub(crate) fn vector(self) -> u16 {
        match self {
            IntKind::Trap => 0xFFF0,
            IntKind::Swi3 => 0xFFF2,
            IntKind::Swi2 => 0xFFF4,
            IntKind::Firq => 0xFFF6,
            IntKind::Irq => 0xFFF8,
            IntKind::Swi => 0xFFFA,
            IntKind::Nmi => 0xFFFC,
        }
    }

    /// Mask bits ORed into CC after stacking.
    pub(crate) fn mask(self) -> u8 {
        match self {
            IntKind::Irq => CcFlag::I as u8,
            IntKind::Swi2 | IntKind::Swi3 => 0,
            _ => CcFlag::I as u8 | CcFlag::F as u8,
        }
    }
}

/// One byte of a stacking sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub(crate) enum StackItem {
    #[default]
    Cc,
    A,
    B,
    E,
    F,
    Dp,
    Xh,
    Xl,
    Yh,
    Yl,
    Uh,
    Ul,
    Sh,
    Sl,
    Pch,
    Pcl,
}

/// Where control goes when the stack sequencer drains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AfterStack {
    /// Straight to the next instruction boundary.
    Next,
    /// One trailing dead cycle, then the boundary.
    Dead1,
    /// Interrupt vector fetch.
    Vector,
    /// Load PC from the resolved effective address (BSR/JSR).
    Jump,
    /// RTI pulled CC; decide between the short and entire frame.
    RtiCc,
    /// CWAI finished stacking; sleep until an enabled interrupt.
    Cwai,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum State {
    Reset,
    Next,
    Prefix,
    Addressing,
    AccessDead,
    Operate,
    Stack,
    TailDead,
    Vector,
    DispatchDead,
    Sync,
    CwaiWait,
    Tfm,
}

pub struct Mc6809 {
    pub variant: Variant,

    // Register file. E/F/V/MD exist only on the enhanced part.
    pub a: u8,
    pub b: u8,
    pub e: u8,
    pub f: u8,
    pub dp: u8,
    pub cc: u8,
    pub md: u8,
    pub x: u16,
    pub y: u16,
    pub u: u16,
    pub s: u16,
    pub pc: u16,
    pub v: u16,

    // Execution engine.
    pub(crate) state: State,
    pub(crate) page: u8,
    pub(crate) instr: Instr,
    pub(crate) instr_pc: u16,
    pub(crate) ea: u16,
    pub(crate) temp: u32,
    pub(crate) imm: u8,
    pub(crate) imm_pending: bool,
    pub(crate) step: u8,
    pub(crate) access_dead: u8,
    pub(crate) idx: IdxState,

    // Stack sequencer.
    pub(crate) stack_items: [StackItem; 16],
    pub(crate) stack_len: u8,
    pub(crate) stack_idx: u8,
    pub(crate) stack_ptr: StackPtr,
    pub(crate) stack_pull: bool,
    pub(crate) after_stack: AfterStack,

    // Interrupt dispatch in flight.
    pub(crate) int_vector: u16,
    pub(crate) int_mask: u8,

    // Line latches. NMI is edge triggered and disarmed until the first
    // load of S; FIRQ and IRQ follow the sampled level.
    pub(crate) nmi_armed: bool,
    pub(crate) nmi_latch: bool,
    pub(crate) nmi_line: bool,
    pub(crate) firq_latch: bool,
    pub(crate) irq_latch: bool,
}

impl Mc6809 {
    #[must_use]
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            a: 0,
            b: 0,
            e: 0,
            f: 0,
            dp: 0,
            cc: CcFlag::I as u8 | CcFlag::F as u8,
            md: 0,
            x: 0,
            y: 0,
            u: 0,
            s: 0,
            pc: 0,
            v: 0,
            state: State::Reset,
            page: 0,
            instr: Instr {
                op: Op::Nop,
                mode: AddrMode::Inherent,
            },
            instr_pc: 0,
            ea: 0,
            temp: 0,
            imm: 0,
            imm_pending: false,
            step: 0,
            access_dead: 0,
            idx: IdxState::default(),
            stack_items: [StackItem::default(); 16],
            stack_len: 0,
            stack_idx: 0,
            stack_ptr: StackPtr::S,
            stack_pull: false,
            after_stack: AfterStack::Next,
            int_vector: 0,
            int_mask: 0,
            nmi_armed: false,
            nmi_latch: false,
            nmi_line: false,
            firq_latch: false,
            irq_latch: false,
        }
    }

    pub(crate) fn enhanced(&self) -> bool {
        self.variant == Variant::Hd6309
    }

    /// Native mode drops most of the 6809 compatibility dead cycles and
    /// widens the interrupt stack frame by E and F.
    pub(crate) fn native(&self) -> bool {
        self.enhanced() && self.md & MD_NATIVE != 0
    }

    // -- register access ------------------------------------------------

    pub(crate) fn get_d(&self) -> u16 {
        u16::from_be_bytes([self.a, self.b])
    }

    pub(crate) fn set_d(&mut self, val: u16) {
        [self.a, self.b] = val.to_be_bytes();
    }

    pub(crate) fn get_w(&self) -> u16 {
        u16::from_be_bytes([self.e, self.f])
    }

    pub(crate) fn set_w(&mut self, val: u16) {
        [self.e, self.f] = val.to_be_bytes();
    }

    pub(crate) fn get_q(&self) -> u32 {
        u32::from(self.get_d()) << 16 | u32::from(self.get_w())
    }

    pub(crate) fn set_q(&mut self, val: u32) {
        self.set_d((val >> 16) as u16);
        self.set_w(val as u16);
    }

    /// All S loads arm NMI recognition.
    pub(crate) fn set_s(&mut self, val: u16) {
        self.s = val;
        self.nmi_armed = true;
    }

    pub(crate) fn reg8(&self, r: Reg8) -> u8 {
        match r {
            Reg8::A => self.a,
            Reg8::B => self.b,
            Reg8::E => self.e,
            Reg8::F => self.f,
        }
    }

    pub(crate) fn set_reg8(&mut self, r: Reg8, val: u8) {
        match r {
            Reg8::A => self.a = val,
            Reg8::B => self.b = val,
            Reg8::E => self.e = val,
            Reg8::F => self.f = val,
        }
    }

    pub(crate) fn reg16(&self, r: Reg16) -> u16 {
        match r {
            Reg16::D => self.get_d(),
            Reg16::X => self.x,
            Reg16::Y => self.y,
            Reg16::U => self.u,
            Reg16::S => self.s,
            Reg16::W => self.get_w(),
        }
    }

    pub(crate) fn set_reg16(&mut self, r: Reg16, val: u16) {
        match r {
            Reg16::D => self.set_d(val),
            Reg16::X => self.x = val,
            Reg16::Y => self.y = val,
            Reg16::U => self.u = val,
            Reg16::S => self.set_s(val),
            Reg16::W => self.set_w(val),
        }
    }

    #[inline]
    pub(crate) fn flag(&self, flag: CcFlag) -> bool {
        self.cc & flag as u8 != 0
    }

    #[inline]
    pub(crate) fn set_flag(&mut self, flag: CcFlag, set: bool) {
        if set {
            self.cc |= flag as u8
        } else {
            self.cc &= !(flag as u8)
        }
    }

    // -- cycle engine ---------------------------------------------------

    /// Execute one machine cycle.
    pub fn execute_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) {
        let ints = bus.check_interrupts(master);
        if ints.nmi && !self.nmi_line {
            self.nmi_latch = true;
        }
        self.nmi_line = ints.nmi;
        self.firq_latch = ints.firq;
        self.irq_latch = ints.irq;

        // HALT / DMA stall: the clock keeps running, the CPU does not.
        if bus.is_halted_for(master) {
            bus.internal_cycle(master);
            return;
        }

        match self.state {
            State::Reset => self.reset_cycle(bus, master),
            State::Next => self.boundary_cycle(bus, master),
            State::Prefix => self.prefix_cycle(bus, master),
            State::Addressing => self.addressing_cycle(bus, master),
            State::AccessDead => {
                bus.internal_cycle(master);
                self.access_dead -= 1;
                if self.access_dead == 0 {
                    self.enter_operate();
                }
            }
            State::Operate => self.operate_cycle(bus, master),
            State::Stack => self.stack_cycle(bus, master),
            State::TailDead => {
                bus.internal_cycle(master);
                self.step -= 1;
                if self.step == 0 {
                    self.state = State::Next;
                }
            }
            State::Vector => self.vector_cycle(bus, master),
            State::DispatchDead => {
                bus.internal_cycle(master);
                self.step -= 1;
                if self.step == 0 {
                    self.state = State::Stack;
                }
            }
            State::Sync => self.sync_cycle(bus, master),
            State::CwaiWait => self.cwai_wait_cycle(bus, master),
            State::Tfm => self.tfm_cycle(bus, master),
        }
    }

    fn reset_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) {
        bus.internal_cycle(master);
        self.step += 1;
        if self.step >= 2 {
            self.int_vector = 0xFFFE;
            self.int_mask = CcFlag::I as u8 | CcFlag::F as u8;
            self.state = State::Vector;
            self.step = 0;
        }
    }

    /// Instruction boundary: dispatch a pending interrupt or fetch the next
    /// opcode.
    fn boundary_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) {
        if let Some(kind) = self.pending_interrupt() {
            bus.internal_cycle(master);
            self.dispatch_interrupt(kind);
            return;
        }
        self.instr_pc = self.pc;
        self.page = 0;
        let opcode = bus.read(master, self.pc);
        self.pc = self.pc.wrapping_add(1);
        match opcode {
            0x10 => {
                self.page = 2;
                self.state = State::Prefix;
            }
            0x11 => {
                self.page = 3;
                self.state = State::Prefix;
            }
            _ => self.begin_instruction(opcode),
        }
    }

    /// Second and further opcode bytes. Repeated prefixes latch the last
    /// one seen, as on hardware.
    fn prefix_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) {
        let opcode = bus.read(master, self.pc);
        self.pc = self.pc.wrapping_add(1);
        match opcode {
            0x10 => self.page = 2,
            0x11 => self.page = 3,
            _ => self.begin_instruction(opcode),
        }
    }

    fn pending_interrupt(&mut self) -> Option<IntKind> {
        if self.nmi_latch && self.nmi_armed {
            self.nmi_latch = false;
            Some(IntKind::Nmi)
        } else if self.firq_latch && !self.flag(CcFlag::F) {
            Some(IntKind::Firq)
        } else if self.irq_latch && !self.flag(CcFlag::I) {
            Some(IntKind::Irq)
        } else {
            None
        }
    }

    /// Begin a hardware interrupt or trap: stack the frame, then vector.
    /// The caller has already spent the recognition cycle.
    pub(crate) fn dispatch_interrupt(&mut self, kind: IntKind) {
        let entire = match kind {
            IntKind::Firq => self.enhanced() && self.md & MD_FIRQ_ENTIRE != 0,
            _ => true,
        };
        self.set_flag(CcFlag::E, entire);
        self.int_vector = kind.vector();
        self.int_mask = kind.mask();
        let mask = if entire { 0xFF } else { 0x81 };
        let with_w = entire && self.native();
        self.build_stack(mask, with_w, StackPtr::S, false, AfterStack::Vector);
        self.step = 2;
        self.state = State::DispatchDead;
    }

    /// Illegal instruction / division-by-zero trap (6309 only). `md_bit`
    /// records the cause for BITMD.
    pub(crate) fn trap(&mut self, md_bit: u8) {
        self.md |= md_bit;
        self.dispatch_interrupt(IntKind::Trap);
    }

    fn vector_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) {
        match self.step {
            0 => {
                bus.internal_cycle(master);
                self.cc |= self.int_mask;
            }
            1 => {
                self.temp = u32::from(bus.read(master, self.int_vector)) << 8;
            }
            2 => {
                self.pc = self.temp as u16 | u16::from(bus.read(master, self.int_vector.wrapping_add(1)));
            }
            _ => {
                bus.internal_cycle(master);
                self.state = State::Next;
                self.step = 0;
                return;
            }
        }
        self.step += 1;
    }

    /// SYNC: stopped until any interrupt line is asserted. A masked line
    /// resumes execution without dispatching.
    fn sync_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) {
        bus.internal_cycle(master);
        if let Some(kind) = self.pending_interrupt() {
            self.dispatch_interrupt(kind);
        } else if self.firq_latch || self.irq_latch {
            self.state = State::Next;
        }
    }

    /// CWAI already stacked the entire frame; wake straight into the
    /// vector fetch when an enabled interrupt arrives.
    fn cwai_wait_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) {
        bus.internal_cycle(master);
        if let Some(kind) = self.pending_interrupt() {
            self.int_vector = kind.vector();
            self.int_mask = kind.mask();
            self.state = State::Vector;
            self.step = 0;
        }
    }
}

impl BusMasterComponent for Mc6809 {
    type Bus = dyn Bus<Address = u16, Data = u8>;

    fn tick_with_bus(&mut self, bus: &mut Self::Bus, master: BusMaster) -> bool {
        self.execute_cycle(bus, master);
        matches!(self.state, State::Next)
    }
}

impl CpuStateTrait for Mc6809 {
    type Snapshot = Mc6809State;

    fn snapshot(&self) -> Mc6809State {
        let wait = match self.state {
            State::Sync => WaitState::Sync,
            State::CwaiWait => WaitState::Cwai,
            _ => WaitState::None,
        };
        Mc6809State {
            a: self.a,
            b: self.b,
            e: self.e,
            f: self.f,
            dp: self.dp,
            x: self.x,
            y: self.y,
            u: self.u,
            s: self.s,
            pc: self.pc,
            v: self.v,
            cc: self.cc,
            md: self.md,
            wait,
            nmi_armed: self.nmi_armed,
            nmi_latched: self.nmi_latch,
        }
    }
}

impl Mc6809 {
    /// Restore a boundary snapshot taken with `snapshot`.
    pub fn restore(&mut self, state: &Mc6809State) {
        self.a = state.a;
        self.b = state.b;
        self.e = state.e;
        self.f = state.f;
        self.dp = state.dp;
        self.x = state.x;
        self.y = state.y;
        self.u = state.u;
        self.s = state.s;
        self.pc = state.pc;
        self.v = state.v;
        self.cc = state.cc;
        self.md = state.md;
        self.nmi_armed = state.nmi_armed;
        self.nmi_latch = state.nmi_latched;
        self.nmi_line = false;
        self.step = 0;
        self.state = match state.wait {
            WaitState::None => State::Next,
            WaitState::Sync => State::Sync,
            WaitState::Cwai => {
                // CWAI restores mid-wait; the vector fetch needs the mask of
                // the interrupt that eventually fires, set at wake time.
                State::CwaiWait
            }
        };
    }
}

impl Cpu for Mc6809 {
    fn reset(&mut self) {
        self.cc |= CcFlag::I as u8 | CcFlag::F as u8;
        self.dp = 0;
        self.md = 0;
        self.nmi_armed = false;
        self.nmi_latch = false;
        self.state = State::Reset;
        self.step = 0;
    }

    fn is_sleeping(&self) -> bool {
        matches!(self.state, State::Sync | State::CwaiWait)
    }
}
