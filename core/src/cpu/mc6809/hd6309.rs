//! HD6309-only execution paths: the hardware multiply/divide unit, the
//! direct-page bit transfers, and the interruptible TFM block move.

use crate::core::{Bus, BusMaster};

use super::decode::{BitOpKind, Op};
use super::{CcFlag, Mc6809, State, MD_DIV0, MD_ILLEGAL};

impl Mc6809 {
    /// MULD / DIVD / DIVQ: operand fetch, a long internal computation, then
    /// the register update. A zero divisor takes the division-by-zero trap
    /// in place of the result.
    pub(crate) fn muldiv_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) {
        let width: u8 = if matches!(self.instr.op, Op::Divd) { 1 } else { 2 };
        if self.step < width {
            let byte = bus.read(master, self.ea.wrapping_add(u16::from(self.step)));
            self.temp = self.temp << 8 | u32::from(byte);
            self.step += 1;
            return;
        }
        bus.internal_cycle(master);
        if self.step == width
            && !matches!(self.instr.op, Op::Muld)
            && self.temp == 0
        {
            self.trap(MD_DIV0);
            return;
        }
        self.step += 1;
        let dead = match self.instr.op {
            Op::Muld => 24,
            Op::Divd => 22,
            _ => 30,
        };
        if self.step < width + dead {
            return;
        }
        match self.instr.op {
            Op::Muld => {
                let product =
                    i32::from(self.get_d() as i16) * i32::from(self.temp as u16 as i16);
                self.set_q(product as u32);
                self.set_nz32(product as u32);
                self.set_flag(CcFlag::V, false);
                self.set_flag(CcFlag::C, false);
            }
            Op::Divd => {
                let num = i32::from(self.get_d() as i16);
                let den = i32::from(self.temp as u8 as i8);
                let quot = num / den;
                let rem = num % den;
                if quot >= -128 && quot <= 127 {
                    self.b = quot as u8;
                    self.a = rem as u8;
                    self.set_nz8(quot as u8);
                    self.set_flag(CcFlag::V, false);
                    self.set_flag(CcFlag::C, quot & 1 != 0);
                } else {
                    // Range overflow leaves the registers alone.
                    self.set_flag(CcFlag::V, true);
                    self.set_flag(CcFlag::N, false);
                    self.set_flag(CcFlag::Z, false);
                    self.set_flag(CcFlag::C, false);
                }
            }
            _ => {
                let num = self.get_q() as i32;
                let den = i32::from(self.temp as u16 as i16);
                let quot = i64::from(num) / i64::from(den);
                let rem = i64::from(num) % i64::from(den);
                if quot >= -32768 && quot <= 32767 {
                    self.set_w(quot as u16);
                    self.set_d(rem as u16);
                    self.set_nz16(quot as u16);
                    self.set_flag(CcFlag::V, false);
                    self.set_flag(CcFlag::C, quot & 1 != 0);
                } else {
                    self.set_flag(CcFlag::V, true);
                    self.set_flag(CcFlag::N, false);
                    self.set_flag(CcFlag::Z, false);
                    self.set_flag(CcFlag::C, false);
                }
            }
        }
        self.state = State::Next;
    }

    /// BAND..STBT: one bit moves between a direct-page byte and CC, A or B.
    /// The postbyte (already fetched) selects the register, the memory bit
    /// and the register bit.
    pub(crate) fn bit_transfer_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
        kind: BitOpKind,
    ) {
        match self.step {
            0 => {
                self.temp = u32::from(bus.read(master, self.ea));
                self.step = 1;
            }
            1 => {
                bus.internal_cycle(master);
                let reg_sel = self.imm >> 6 & 3;
                if reg_sel == 3 {
                    self.trap(MD_ILLEGAL);
                    return;
                }
                let mem_bit = self.imm >> 3 & 7;
                let reg_bit = self.imm & 7;
                let reg_val = match reg_sel {
                    0 => self.cc,
                    1 => self.a,
                    _ => self.b,
                };
                let m = self.temp as u8 >> mem_bit & 1 != 0;
                let r = reg_val >> reg_bit & 1 != 0;
                if matches!(kind, BitOpKind::Stbt) {
                    let mem = self.temp as u8 & !(1 << mem_bit) | u8::from(r) << mem_bit;
                    self.temp = u32::from(mem);
                    self.step = 2;
                    return;
                }
                let bit = match kind {
                    BitOpKind::Band => r && m,
                    BitOpKind::Biand => r && !m,
                    BitOpKind::Bor => r || m,
                    BitOpKind::Bior => r || !m,
                    BitOpKind::Beor => r != m,
                    BitOpKind::Bieor => r == m,
                    _ => m, // LDBT
                };
                let new = reg_val & !(1 << reg_bit) | u8::from(bit) << reg_bit;
                match reg_sel {
                    0 => self.cc = new,
                    1 => self.a = new,
                    _ => self.b = new,
                }
                self.step = 3;
            }
            2 => {
                bus.write(master, self.ea, self.temp as u8);
                self.state = State::Next;
            }
            _ => {
                bus.internal_cycle(master);
                self.state = State::Next;
            }
        }
    }

    /// TFM setup: postbyte fetch, register validation and the internal
    /// cycles before the first transfer unit.
    pub(crate) fn tfm_setup_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) {
        if self.step == 0 {
            self.imm = bus.read(master, self.ea);
            if self.imm >> 4 > 4 || self.imm & 0x0F > 4 {
                self.trap(MD_ILLEGAL);
                return;
            }
            self.step = 1;
            return;
        }
        bus.internal_cycle(master);
        self.step += 1;
        if self.step >= 4 {
            if self.get_w() == 0 {
                self.state = State::Next;
            } else {
                self.state = State::Tfm;
                self.step = 0;
            }
        }
    }

    /// One cycle of the TFM transfer loop: read, write, count. The loop
    /// yields to pending interrupts between transfer units by rewinding PC
    /// onto the TFM instruction, so it resumes with the partially advanced
    /// registers.
    pub(crate) fn tfm_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) {
        let Op::Tfm(mode) = self.instr.op else {
            self.state = State::Next;
            return;
        };
        let src = self.imm >> 4;
        let dst = self.imm & 0x0F;
        match self.step {
            0 => {
                if self.interrupt_pending_peek() {
                    bus.internal_cycle(master);
                    self.pc = self.instr_pc;
                    self.state = State::Next;
                    return;
                }
                let addr = self.tfr_read(src);
                self.temp = u32::from(bus.read(master, addr));
                match mode {
                    0 | 2 => self.tfr_write(src, addr.wrapping_add(1)),
                    1 => self.tfr_write(src, addr.wrapping_sub(1)),
                    _ => {}
                }
                self.step = 1;
            }
            1 => {
                let addr = self.tfr_read(dst);
                bus.write(master, addr, self.temp as u8);
                match mode {
                    0 | 3 => self.tfr_write(dst, addr.wrapping_add(1)),
                    1 => self.tfr_write(dst, addr.wrapping_sub(1)),
                    _ => {}
                }
                self.step = 2;
            }
            _ => {
                bus.internal_cycle(master);
                let w = self.get_w().wrapping_sub(1);
                self.set_w(w);
                if w == 0 {
                    self.state = State::Next;
                } else {
                    self.step = 0;
                }
            }
        }
    }

    /// Interrupt check without consuming the NMI latch.
    pub(crate) fn interrupt_pending_peek(&self) -> bool {
        self.nmi_latch && self.nmi_armed
            || self.firq_latch && !self.flag(CcFlag::F)
            || self.irq_latch && !self.flag(CcFlag::I)
    }
}
