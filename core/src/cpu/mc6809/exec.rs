//! Instruction sequencing: decode entry, addressing cycles, the operate
//! phase, and the shared stacking machinery used by PSH/PUL, subroutine
//! calls, RTI and interrupt dispatch.
//!
//! Cycle counts follow the Motorola tables for the base part; native-mode
//! reductions follow the Hitachi tables.

use crate::core::{Bus, BusMaster};

use super::decode::{self, AddrMode, Op, Reg16, StackPtr};
use super::indexed::IdxState;
use super::{AfterStack, CcFlag, IntKind, Mc6809, StackItem, State, MD_ILLEGAL};

impl Mc6809 {
    /// Decode `opcode` (on the current page) and set up its first phase.
    /// Runs at the tail of the fetch cycle.
    pub(crate) fn begin_instruction(&mut self, opcode: u8) {
        let Some(instr) = decode::decode(self.enhanced(), self.page, opcode) else {
            // The base part quietly skips encodings it does not implement;
            // the enhanced part takes the illegal-instruction trap.
            if self.enhanced() {
                self.trap(MD_ILLEGAL);
            } else {
                self.state = State::Next;
            }
            return;
        };
        self.instr = instr;
        self.temp = 0;
        self.step = 0;
        self.idx = IdxState::default();
        // AIM/OIM/EIM/TIM and the bit transfers carry an extra byte ahead
        // of the address bytes.
        self.imm_pending = matches!(instr.op, Op::ImmRmw(_) | Op::BitOp(_));
        self.access_dead = self.pre_access_dead();
        match instr.mode {
            AddrMode::Inherent => self.begin_inherent(),
            AddrMode::Imm8 => {
                self.ea = self.pc;
                self.pc = self.pc.wrapping_add(1);
                self.enter_operate();
            }
            AddrMode::Imm16 => {
                self.ea = self.pc;
                self.pc = self.pc.wrapping_add(2);
                self.enter_operate();
            }
            AddrMode::Imm32 => {
                self.ea = self.pc;
                self.pc = self.pc.wrapping_add(4);
                self.enter_operate();
            }
            _ => self.state = State::Addressing,
        }
    }

    /// Dead cycle between address resolution and the data access. Native
    /// mode drops it for ordinary accesses; a few operations own their
    /// cycle budget entirely.
    fn pre_access_dead(&self) -> u8 {
        match self.instr.mode {
            AddrMode::Direct | AddrMode::Extended | AddrMode::Indexed => match self.instr.op {
                Op::Jsr | Op::ImmRmw(_) | Op::BitOp(_) => 0,
                Op::Lea(_) => 2,
                _ => u8::from(!self.native()),
            },
            _ => 0,
        }
    }

    pub(crate) fn addressing_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) {
        if self.imm_pending {
            self.imm = bus.read(master, self.pc);
            self.pc = self.pc.wrapping_add(1);
            self.imm_pending = false;
            return;
        }
        match self.instr.mode {
            AddrMode::Direct => {
                self.ea = u16::from(self.dp) << 8 | u16::from(bus.read(master, self.pc));
                self.pc = self.pc.wrapping_add(1);
                self.end_addressing();
            }
            AddrMode::Extended => {
                if self.step == 0 {
                    self.temp = u32::from(bus.read(master, self.pc)) << 8;
                    self.pc = self.pc.wrapping_add(1);
                    self.step = 1;
                } else {
                    self.ea = self.temp as u16 | u16::from(bus.read(master, self.pc));
                    self.pc = self.pc.wrapping_add(1);
                    self.end_addressing();
                }
            }
            AddrMode::Indexed => {
                if self.indexed_cycle(bus, master) {
                    self.end_addressing();
                }
            }
            AddrMode::Rel8 => {
                let off = bus.read(master, self.pc) as i8;
                self.pc = self.pc.wrapping_add(1);
                self.ea = self.pc.wrapping_add(i16::from(off) as u16);
                self.enter_operate();
            }
            AddrMode::Rel16 => {
                if self.step == 0 {
                    self.temp = u32::from(bus.read(master, self.pc)) << 8;
                    self.pc = self.pc.wrapping_add(1);
                    self.step = 1;
                } else {
                    let off = self.temp as u16 | u16::from(bus.read(master, self.pc));
                    self.pc = self.pc.wrapping_add(1);
                    self.ea = self.pc.wrapping_add(off);
                    self.enter_operate();
                }
            }
            // Inherent and immediate modes never reach the addressing state.
            _ => self.enter_operate(),
        }
    }

    fn end_addressing(&mut self) {
        if self.access_dead > 0 {
            self.state = State::AccessDead;
        } else {
            self.enter_operate();
        }
    }

    /// Entered at the tail of the cycle that finished addressing. A few
    /// operations need no further bus traffic and complete here.
    pub(crate) fn enter_operate(&mut self) {
        self.step = 0;
        self.temp = 0;
        match self.instr.op {
            Op::Jmp => {
                self.pc = self.ea;
                self.state = State::Next;
            }
            Op::Lea(r) => {
                let ea = self.ea;
                self.set_reg16(r, ea);
                // Only the index registers report zero.
                if matches!(r, Reg16::X | Reg16::Y) {
                    self.set_flag(CcFlag::Z, ea == 0);
                }
                self.state = State::Next;
            }
            _ => self.state = State::Operate,
        }
    }

    fn begin_inherent(&mut self) {
        match self.instr.op {
            Op::Nop
            | Op::Daa
            | Op::Sex
            | Op::Sexw
            | Op::Abx
            | Op::Mul
            | Op::RmwReg8(..)
            | Op::RmwReg16(..) => {
                // Native mode completes the single-cycle group at the fetch.
                if self.inherent_cycles() == 0 {
                    self.apply_inherent();
                } else {
                    self.state = State::Operate;
                }
            }
            // RTS, RTI, SWI and the wide stack ops sequence themselves.
            _ => self.state = State::Operate,
        }
    }

    /// Internal cycles after the fetch for the plain inherent operations.
    /// The flow operations (RTS, SWI, ...) sequence themselves.
    fn inherent_cycles(&self) -> u8 {
        let native = self.native();
        match self.instr.op {
            Op::Nop | Op::Daa | Op::Sex | Op::RmwReg8(..) | Op::RmwReg16(..) => u8::from(!native),
            Op::Abx => {
                if native {
                    1
                } else {
                    2
                }
            }
            Op::Mul => {
                if native {
                    9
                } else {
                    10
                }
            }
            Op::Sexw => 3,
            _ => 0,
        }
    }

    fn apply_inherent(&mut self) {
        match self.instr.op {
            Op::Daa => self.daa(),
            Op::Sex => {
                self.a = if self.b & 0x80 != 0 { 0xFF } else { 0 };
                let d = self.get_d();
                self.set_nz16(d);
            }
            Op::Sexw => {
                self.set_d(if self.get_w() & 0x8000 != 0 { 0xFFFF } else { 0 });
                let q = self.get_q();
                self.set_nz32(q);
            }
            Op::Abx => self.x = self.x.wrapping_add(u16::from(self.b)),
            Op::Mul => {
                let product = u16::from(self.a) * u16::from(self.b);
                self.set_d(product);
                self.set_flag(CcFlag::Z, product == 0);
                self.set_flag(CcFlag::C, product & 0x80 != 0);
            }
            Op::RmwReg8(op, r) => {
                let (val, store) = self.rmw8(op, self.reg8(r));
                if store {
                    self.set_reg8(r, val);
                }
            }
            Op::RmwReg16(op, r) => {
                let (val, store) = self.rmw16(op, self.reg16(r));
                if store {
                    self.set_reg16(r, val);
                }
            }
            _ => {}
        }
        self.state = State::Next;
    }

    pub(crate) fn operate_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) {
        let native = self.native();
        match self.instr.op {
            Op::Nop
            | Op::Daa
            | Op::Sex
            | Op::Sexw
            | Op::Abx
            | Op::Mul
            | Op::RmwReg8(..)
            | Op::RmwReg16(..) => {
                bus.internal_cycle(master);
                self.step += 1;
                if self.step >= self.inherent_cycles() {
                    self.apply_inherent();
                }
            }

            Op::Ld8(r) => {
                let val = bus.read(master, self.ea);
                self.set_reg8(r, val);
                self.load_flags8(val);
                self.state = State::Next;
            }
            Op::St8(r) => {
                let val = self.reg8(r);
                bus.write(master, self.ea, val);
                self.load_flags8(val);
                self.state = State::Next;
            }
            Op::Alu8(op, r) => {
                let m = bus.read(master, self.ea);
                let val = self.alu8(op, self.reg8(r), m);
                self.set_reg8(r, val);
                self.state = State::Next;
            }

            Op::Ld16(r) => {
                if self.step == 0 {
                    self.temp = u32::from(bus.read(master, self.ea)) << 8;
                    self.step = 1;
                } else {
                    let val = self.temp as u16 | u16::from(bus.read(master, self.ea.wrapping_add(1)));
                    self.set_reg16(r, val);
                    self.load_flags16(val);
                    self.state = State::Next;
                }
            }
            Op::St16(r) => {
                let val = self.reg16(r);
                if self.step == 0 {
                    bus.write(master, self.ea, (val >> 8) as u8);
                    self.step = 1;
                } else {
                    bus.write(master, self.ea.wrapping_add(1), val as u8);
                    self.load_flags16(val);
                    self.state = State::Next;
                }
            }
            Op::Alu16(op, r) => match self.step {
                0 => {
                    self.temp = u32::from(bus.read(master, self.ea)) << 8;
                    self.step = 1;
                }
                1 => {
                    self.temp |= u32::from(bus.read(master, self.ea.wrapping_add(1)));
                    if native {
                        let val = self.alu16(op, self.reg16(r), self.temp as u16);
                        self.set_reg16(r, val);
                        self.state = State::Next;
                    } else {
                        self.step = 2;
                    }
                }
                _ => {
                    bus.internal_cycle(master);
                    let val = self.alu16(op, self.reg16(r), self.temp as u16);
                    self.set_reg16(r, val);
                    self.state = State::Next;
                }
            },

            Op::Ldq => {
                let byte = bus.read(master, self.ea.wrapping_add(u16::from(self.step)));
                self.temp = self.temp << 8 | u32::from(byte);
                self.step += 1;
                if self.step == 4 {
                    let q = self.temp;
                    self.set_q(q);
                    self.set_nz32(q);
                    self.set_flag(CcFlag::V, false);
                    self.state = State::Next;
                }
            }
            Op::Stq => {
                let q = self.get_q();
                let byte = (q >> (24 - 8 * u32::from(self.step))) as u8;
                bus.write(master, self.ea.wrapping_add(u16::from(self.step)), byte);
                self.step += 1;
                if self.step == 4 {
                    self.set_nz32(q);
                    self.set_flag(CcFlag::V, false);
                    self.state = State::Next;
                }
            }

            Op::Rmw(op) => match self.step {
                0 => {
                    self.temp = u32::from(bus.read(master, self.ea));
                    self.step = 1;
                }
                1 => {
                    bus.internal_cycle(master);
                    let (val, store) = self.rmw8(op, self.temp as u8);
                    self.temp = u32::from(val);
                    if store {
                        self.step = 2;
                    } else if native {
                        // TST owes no writeback, just the trailing cycle(s).
                        self.state = State::Next;
                    } else {
                        self.step = 3;
                    }
                }
                2 => {
                    bus.write(master, self.ea, self.temp as u8);
                    self.state = State::Next;
                }
                _ => {
                    bus.internal_cycle(master);
                    self.state = State::Next;
                }
            },
            Op::ImmRmw(op) => match self.step {
                0 => {
                    self.temp = u32::from(bus.read(master, self.ea));
                    self.step = 1;
                }
                1 => {
                    bus.internal_cycle(master);
                    let m = self.temp as u8;
                    let (result, store) = match op {
                        decode::ImmRmwOp::And => (m & self.imm, true),
                        decode::ImmRmwOp::Or => (m | self.imm, true),
                        decode::ImmRmwOp::Eor => (m ^ self.imm, true),
                        decode::ImmRmwOp::Tst => (m & self.imm, false),
                    };
                    self.load_flags8(result);
                    self.temp = u32::from(result);
                    if store {
                        self.step = 2;
                    } else if native {
                        self.state = State::Next;
                    } else {
                        self.step = 3;
                    }
                }
                2 => {
                    bus.write(master, self.ea, self.temp as u8);
                    self.state = State::Next;
                }
                _ => {
                    bus.internal_cycle(master);
                    self.state = State::Next;
                }
            },

            Op::Branch(cond) => {
                bus.internal_cycle(master);
                if self.test_cond(cond) {
                    self.pc = self.ea;
                }
                self.state = State::Next;
            }
            Op::LBranch(cond) => {
                bus.internal_cycle(master);
                if self.step == 0 {
                    if self.test_cond(cond) {
                        self.step = 1;
                    } else {
                        self.state = State::Next;
                    }
                } else {
                    self.pc = self.ea;
                    self.state = State::Next;
                }
            }
            Op::Bsr | Op::LBsr | Op::Jsr => {
                bus.internal_cycle(master);
                self.step += 1;
                let dead = if matches!(self.instr.op, Op::LBsr) { 4 } else { 3 };
                if self.step >= dead {
                    self.build_stack(0x80, false, StackPtr::S, false, AfterStack::Jump);
                }
            }
            Op::Rts => {
                bus.internal_cycle(master);
                self.build_stack(0x80, false, StackPtr::S, true, AfterStack::Dead1);
            }
            Op::Rti => {
                bus.internal_cycle(master);
                self.build_stack(0x01, false, StackPtr::S, true, AfterStack::RtiCc);
            }

            Op::Psh(ptr) => {
                if self.step == 0 {
                    self.imm = bus.read(master, self.ea);
                    self.step = 1;
                } else {
                    bus.internal_cycle(master);
                    self.step += 1;
                    let dead = if native { 2 } else { 3 };
                    if self.step >= 1 + dead {
                        self.build_stack(self.imm, false, ptr, false, AfterStack::Next);
                    }
                }
            }
            Op::Pul(ptr) => {
                if self.step == 0 {
                    self.imm = bus.read(master, self.ea);
                    self.step = 1;
                } else {
                    bus.internal_cycle(master);
                    self.step += 1;
                    let dead = if native { 1 } else { 2 };
                    if self.step >= 1 + dead {
                        self.build_stack(self.imm, false, ptr, true, AfterStack::Dead1);
                    }
                }
            }
            Op::PshW(ptr) => {
                bus.internal_cycle(master);
                self.step += 1;
                if self.step >= 2 {
                    self.build_stack(0, true, ptr, false, AfterStack::Next);
                }
            }
            Op::PulW(ptr) => {
                bus.internal_cycle(master);
                self.build_stack(0, true, ptr, true, AfterStack::Dead1);
            }

            Op::Swi | Op::Swi2 | Op::Swi3 => {
                bus.internal_cycle(master);
                self.step += 1;
                if self.step >= 2 {
                    let kind = match self.instr.op {
                        Op::Swi => IntKind::Swi,
                        Op::Swi2 => IntKind::Swi2,
                        _ => IntKind::Swi3,
                    };
                    self.set_flag(CcFlag::E, true);
                    self.int_vector = kind.vector();
                    self.int_mask = kind.mask();
                    let with_w = self.native();
                    self.build_stack(0xFF, with_w, StackPtr::S, false, AfterStack::Vector);
                }
            }
            Op::Cwai => {
                if self.step == 0 {
                    let mask = bus.read(master, self.ea);
                    self.cc &= mask;
                    self.set_flag(CcFlag::E, true);
                    self.step = 1;
                } else {
                    bus.internal_cycle(master);
                    self.step += 1;
                    if self.step >= 3 {
                        let with_w = self.native();
                        self.build_stack(0xFF, with_w, StackPtr::S, false, AfterStack::Cwai);
                    }
                }
            }
            Op::Sync => {
                bus.internal_cycle(master);
                self.state = State::Sync;
            }

            Op::OrCc | Op::AndCc => {
                if self.step == 0 {
                    let val = bus.read(master, self.ea);
                    self.temp = u32::from(val);
                    if native {
                        self.apply_cc_mask();
                    } else {
                        self.step = 1;
                    }
                } else {
                    bus.internal_cycle(master);
                    self.apply_cc_mask();
                }
            }
            Op::Tfr | Op::Exg => {
                if self.step == 0 {
                    self.imm = bus.read(master, self.ea);
                    self.step = 1;
                } else {
                    bus.internal_cycle(master);
                    self.step += 1;
                    let dead = match (self.instr.op, native) {
                        (Op::Exg, true) => 3,
                        (Op::Exg, false) => 6,
                        (_, true) => 2,
                        (_, false) => 4,
                    };
                    if self.step >= 1 + dead {
                        if matches!(self.instr.op, Op::Exg) {
                            self.apply_exg();
                        } else {
                            self.apply_tfr();
                        }
                        self.state = State::Next;
                    }
                }
            }
            Op::AluR(op) => {
                if self.step == 0 {
                    self.imm = bus.read(master, self.ea);
                    self.step = 1;
                } else {
                    bus.internal_cycle(master);
                    self.apply_alur(op);
                    self.state = State::Next;
                }
            }

            Op::LdMd => {
                if self.step == 0 {
                    self.temp = u32::from(bus.read(master, self.ea));
                    self.step = 1;
                } else {
                    bus.internal_cycle(master);
                    self.step += 1;
                    if self.step >= 3 {
                        self.md = self.md & 0xC0 | self.temp as u8 & 0x03;
                        self.state = State::Next;
                    }
                }
            }
            Op::BitMd => {
                if self.step == 0 {
                    self.temp = u32::from(bus.read(master, self.ea));
                    self.step = 1;
                } else {
                    bus.internal_cycle(master);
                    let tested = self.temp as u8 & 0xC0;
                    self.set_flag(CcFlag::Z, self.md & tested == 0);
                    // Reading the status bits clears them.
                    self.md &= !tested;
                    self.state = State::Next;
                }
            }

            Op::Muld | Op::Divd | Op::Divq => self.muldiv_cycle(bus, master),
            Op::BitOp(kind) => self.bit_transfer_cycle(bus, master, kind),
            Op::Tfm(_) => self.tfm_setup_cycle(bus, master),

            // Completed in enter_operate.
            Op::Jmp | Op::Lea(_) => self.state = State::Next,
        }
    }

    fn apply_cc_mask(&mut self) {
        let val = self.temp as u8;
        if matches!(self.instr.op, Op::OrCc) {
            self.cc |= val;
        } else {
            self.cc &= val;
        }
        self.state = State::Next;
    }

    // -- inter-register transfer --------------------------------------------

    /// Read a register by TFR/EXG nibble. 8-bit registers present their
    /// value on both halves of the bus; invalid selections float high on
    /// the base part and read as zero on the enhanced part.
    pub(crate) fn tfr_read(&self, nib: u8) -> u16 {
        let dup = |v: u8| u16::from_be_bytes([v, v]);
        match nib & 0x0F {
            0x0 => self.get_d(),
            0x1 => self.x,
            0x2 => self.y,
            0x3 => self.u,
            0x4 => self.s,
            0x5 => self.pc,
            0x6 if self.enhanced() => self.get_w(),
            0x7 if self.enhanced() => self.v,
            0x8 => dup(self.a),
            0x9 => dup(self.b),
            0xA => dup(self.cc),
            0xB => dup(self.dp),
            0xC | 0xD if self.enhanced() => 0,
            0xE if self.enhanced() => dup(self.e),
            0xF if self.enhanced() => dup(self.f),
            _ => 0xFFFF,
        }
    }

    pub(crate) fn tfr_write(&mut self, nib: u8, val: u16) {
        match nib & 0x0F {
            0x0 => self.set_d(val),
            0x1 => self.x = val,
            0x2 => self.y = val,
            0x3 => self.u = val,
            0x4 => self.set_s(val),
            0x5 => self.pc = val,
            0x6 if self.enhanced() => self.set_w(val),
            0x7 if self.enhanced() => self.v = val,
            0x8 => self.a = val as u8,
            0x9 => self.b = val as u8,
            0xA => self.cc = val as u8,
            0xB => self.dp = val as u8,
            0xE if self.enhanced() => self.e = val as u8,
            0xF if self.enhanced() => self.f = val as u8,
            _ => {}
        }
    }

    fn apply_tfr(&mut self) {
        let val = self.tfr_read(self.imm >> 4);
        self.tfr_write(self.imm & 0x0F, val);
    }

    fn apply_exg(&mut self) {
        let hi = self.imm >> 4;
        let lo = self.imm & 0x0F;
        let a = self.tfr_read(hi);
        let b = self.tfr_read(lo);
        self.tfr_write(hi, b);
        self.tfr_write(lo, a);
    }

    /// 6309 inter-register ALU op (ADDR and friends): `r1 = r1 op r0`,
    /// at the destination register's width.
    fn apply_alur(&mut self, op: decode::AluOp) {
        let src = self.imm >> 4;
        let dst = self.imm & 0x0F;
        if dst <= 0x7 {
            let a = self.tfr_read(dst);
            let m = self.tfr_read(src);
            let r = self.alu16(op, a, m);
            if !matches!(op, decode::AluOp::Cmp) {
                self.tfr_write(dst, r);
            }
        } else {
            let a = self.tfr_read(dst) as u8;
            let m = self.tfr_read(src) as u8;
            let r = self.alu8(op, a, m);
            if !matches!(op, decode::AluOp::Cmp) {
                self.tfr_write(dst, u16::from(r));
            }
        }
    }

    // -- stacking -----------------------------------------------------------

    /// Set up the stack sequencer. `mask` uses the PSHS postbyte layout;
    /// `with_w` widens an entire frame by E and F (6309 native frames and
    /// PSHSW/PULSW, which pass mask 0). Runs in the tail of the current
    /// cycle; an empty sequence completes immediately.
    pub(crate) fn build_stack(
        &mut self,
        mask: u8,
        with_w: bool,
        ptr: StackPtr,
        pull: bool,
        after: AfterStack,
    ) {
        let mut items = [StackItem::Cc; 16];
        let mut n = 0usize;
        // Pull order; pushes run the same list in reverse.
        if mask & 0x01 != 0 {
            items[n] = StackItem::Cc;
            n += 1;
        }
        if mask & 0x02 != 0 {
            items[n] = StackItem::A;
            n += 1;
        }
        if mask & 0x04 != 0 {
            items[n] = StackItem::B;
            n += 1;
        }
        if with_w {
            items[n] = StackItem::E;
            items[n + 1] = StackItem::F;
            n += 2;
        }
        if mask & 0x08 != 0 {
            items[n] = StackItem::Dp;
            n += 1;
        }
        if mask & 0x10 != 0 {
            items[n] = StackItem::Xh;
            items[n + 1] = StackItem::Xl;
            n += 2;
        }
        if mask & 0x20 != 0 {
            items[n] = StackItem::Yh;
            items[n + 1] = StackItem::Yl;
            n += 2;
        }
        if mask & 0x40 != 0 {
            // The postbyte bit names "the other stack pointer".
            let (hi, lo) = match ptr {
                StackPtr::S => (StackItem::Uh, StackItem::Ul),
                StackPtr::U => (StackItem::Sh, StackItem::Sl),
            };
            items[n] = hi;
            items[n + 1] = lo;
            n += 2;
        }
        if mask & 0x80 != 0 {
            items[n] = StackItem::Pch;
            items[n + 1] = StackItem::Pcl;
            n += 2;
        }
        if !pull {
            items[..n].reverse();
        }
        self.stack_items = items;
        self.stack_len = n as u8;
        self.stack_idx = 0;
        self.stack_ptr = ptr;
        self.stack_pull = pull;
        self.after_stack = after;
        if n == 0 {
            self.finish_stack();
        } else {
            self.state = State::Stack;
        }
    }

    pub(crate) fn stack_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) {
        let item = self.stack_items[usize::from(self.stack_idx)];
        if self.stack_pull {
            let sp = self.sp();
            let val = bus.read(master, sp);
            self.set_sp(sp.wrapping_add(1));
            self.set_stack_byte(item, val);
        } else {
            let sp = self.sp().wrapping_sub(1);
            self.set_sp(sp);
            bus.write(master, sp, self.stack_byte(item));
        }
        self.stack_idx += 1;
        if self.stack_idx >= self.stack_len {
            self.finish_stack();
        }
    }

    fn finish_stack(&mut self) {
        match self.after_stack {
            AfterStack::Next => self.state = State::Next,
            AfterStack::Dead1 => {
                self.state = State::TailDead;
                self.step = 1;
            }
            AfterStack::Vector => {
                self.state = State::Vector;
                self.step = 0;
            }
            AfterStack::Jump => {
                self.pc = self.ea;
                self.state = State::Next;
            }
            AfterStack::RtiCc => {
                // CC is in; the E flag decides how much frame follows.
                if self.flag(CcFlag::E) {
                    let with_w = self.native();
                    self.build_stack(0xFE, with_w, StackPtr::S, true, AfterStack::Dead1);
                } else {
                    self.build_stack(0x80, false, StackPtr::S, true, AfterStack::Dead1);
                }
            }
            AfterStack::Cwai => self.state = State::CwaiWait,
        }
    }

    fn sp(&self) -> u16 {
        match self.stack_ptr {
            StackPtr::S => self.s,
            StackPtr::U => self.u,
        }
    }

    fn set_sp(&mut self, val: u16) {
        match self.stack_ptr {
            StackPtr::S => self.set_s(val),
            StackPtr::U => self.u = val,
        }
    }

    fn stack_byte(&self, item: StackItem) -> u8 {
        match item {
            StackItem::Cc => self.cc,
            StackItem::A => self.a,
            StackItem::B => self.b,
            StackItem::E => self.e,
            StackItem::F => self.f,
            StackItem::Dp => self.dp,
            StackItem::Xh => (self.x >> 8) as u8,
            StackItem::Xl => self.x as u8,
            StackItem::Yh => (self.y >> 8) as u8,
            StackItem::Yl => self.y as u8,
            StackItem::Uh => (self.u >> 8) as u8,
            StackItem::Ul => self.u as u8,
            StackItem::Sh => (self.s >> 8) as u8,
            StackItem::Sl => self.s as u8,
            StackItem::Pch => (self.pc >> 8) as u8,
            StackItem::Pcl => self.pc as u8,
        }
    }

    fn set_stack_byte(&mut self, item: StackItem, val: u8) {
        let hi = |r: u16| r & 0x00FF | u16::from(val) << 8;
        let lo = |r: u16| r & 0xFF00 | u16::from(val);
        match item {
            StackItem::Cc => self.cc = val,
            StackItem::A => self.a = val,
            StackItem::B => self.b = val,
            StackItem::E => self.e = val,
            StackItem::F => self.f = val,
            StackItem::Dp => self.dp = val,
            StackItem::Xh => self.x = hi(self.x),
            StackItem::Xl => self.x = lo(self.x),
            StackItem::Yh => self.y = hi(self.y),
            StackItem::Yl => self.y = lo(self.y),
            StackItem::Uh => self.u = hi(self.u),
            StackItem::Ul => self.u = lo(self.u),
            StackItem::Sh => self.set_s(hi(self.s)),
            StackItem::Sl => self.set_s(lo(self.s)),
            StackItem::Pch => self.pc = hi(self.pc),
            StackItem::Pcl => self.pc = lo(self.pc),
        }
    }
}
