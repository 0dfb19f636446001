//! Arithmetic, logic and condition-code helpers shared by the operate
//! sequencer.

use super::{CcFlag, Mc6809};
use super::decode::{AluOp, Cond, RmwOp};

impl Mc6809 {
    pub(crate) fn set_nz8(&mut self, val: u8) {
        self.set_flag(CcFlag::N, val & 0x80 != 0);
        self.set_flag(CcFlag::Z, val == 0);
    }

    pub(crate) fn set_nz16(&mut self, val: u16) {
        self.set_flag(CcFlag::N, val & 0x8000 != 0);
        self.set_flag(CcFlag::Z, val == 0);
    }

    pub(crate) fn set_nz32(&mut self, val: u32) {
        self.set_flag(CcFlag::N, val & 0x8000_0000 != 0);
        self.set_flag(CcFlag::Z, val == 0);
    }

    /// Load/store flag rule: N and Z from the value, V cleared.
    pub(crate) fn load_flags8(&mut self, val: u8) {
        self.set_nz8(val);
        self.set_flag(CcFlag::V, false);
    }

    pub(crate) fn load_flags16(&mut self, val: u16) {
        self.set_nz16(val);
        self.set_flag(CcFlag::V, false);
    }

    pub(crate) fn add8(&mut self, a: u8, b: u8, carry: bool) -> u8 {
        let c = u16::from(carry);
        let sum = u16::from(a) + u16::from(b) + c;
        let r = sum as u8;
        self.set_flag(CcFlag::H, (a & 0x0F) + (b & 0x0F) + c as u8 > 0x0F);
        self.set_flag(CcFlag::V, (a ^ r) & (b ^ r) & 0x80 != 0);
        self.set_flag(CcFlag::C, sum > 0xFF);
        self.set_nz8(r);
        r
    }

    /// Subtract with flags. H is left alone, as on the real part.
    pub(crate) fn sub8(&mut self, a: u8, b: u8, carry: bool) -> u8 {
        let c = u16::from(carry);
        let diff = u16::from(a).wrapping_sub(u16::from(b)).wrapping_sub(c);
        let r = diff as u8;
        self.set_flag(CcFlag::V, (a ^ b) & (a ^ r) & 0x80 != 0);
        self.set_flag(CcFlag::C, diff > 0xFF);
        self.set_nz8(r);
        r
    }

    pub(crate) fn add16(&mut self, a: u16, b: u16, carry: bool) -> u16 {
        let c = u32::from(carry);
        let sum = u32::from(a) + u32::from(b) + c;
        let r = sum as u16;
        self.set_flag(CcFlag::V, (a ^ r) & (b ^ r) & 0x8000 != 0);
        self.set_flag(CcFlag::C, sum > 0xFFFF);
        self.set_nz16(r);
        r
    }

    pub(crate) fn sub16(&mut self, a: u16, b: u16, carry: bool) -> u16 {
        let c = u32::from(carry);
        let diff = u32::from(a).wrapping_sub(u32::from(b)).wrapping_sub(c);
        let r = diff as u16;
        self.set_flag(CcFlag::V, (a ^ b) & (a ^ r) & 0x8000 != 0);
        self.set_flag(CcFlag::C, diff > 0xFFFF);
        self.set_nz16(r);
        r
    }

    /// Apply a binary ALU op at 8 bits, returning the value to store (the
    /// input `a` unchanged for CMP/BIT).
    pub(crate) fn alu8(&mut self, op: AluOp, a: u8, m: u8) -> u8 {
        let carry = self.flag(CcFlag::C);
        match op {
            AluOp::Sub => self.sub8(a, m, false),
            AluOp::Cmp => {
                self.sub8(a, m, false);
                a
            }
            AluOp::Sbc => self.sub8(a, m, carry),
            AluOp::And => {
                let r = a & m;
                self.load_flags8(r);
                r
            }
            AluOp::Bit => {
                self.load_flags8(a & m);
                a
            }
            AluOp::Eor => {
                let r = a ^ m;
                self.load_flags8(r);
                r
            }
            AluOp::Adc => self.add8(a, m, carry),
            AluOp::Or => {
                let r = a | m;
                self.load_flags8(r);
                r
            }
            AluOp::Add => self.add8(a, m, false),
        }
    }

    pub(crate) fn alu16(&mut self, op: AluOp, a: u16, m: u16) -> u16 {
        let carry = self.flag(CcFlag::C);
        match op {
            AluOp::Sub => self.sub16(a, m, false),
            AluOp::Cmp => {
                self.sub16(a, m, false);
                a
            }
            AluOp::Sbc => self.sub16(a, m, carry),
            AluOp::And => {
                let r = a & m;
                self.load_flags16(r);
                r
            }
            AluOp::Bit => {
                self.load_flags16(a & m);
                a
            }
            AluOp::Eor => {
                let r = a ^ m;
                self.load_flags16(r);
                r
            }
            AluOp::Adc => self.add16(a, m, carry),
            AluOp::Or => {
                let r = a | m;
                self.load_flags16(r);
                r
            }
            AluOp::Add => self.add16(a, m, false),
        }
    }

    /// Unary read-modify-write at 8 bits: result plus whether it is written
    /// back (TST only tests).
    pub(crate) fn rmw8(&mut self, op: RmwOp, val: u8) -> (u8, bool) {
        let carry = self.flag(CcFlag::C);
        match op {
            RmwOp::Neg => (self.sub8(0, val, false), true),
            RmwOp::Com => {
                let r = !val;
                self.load_flags8(r);
                self.set_flag(CcFlag::C, true);
                (r, true)
            }
            RmwOp::Lsr => {
                let r = val >> 1;
                self.set_flag(CcFlag::C, val & 1 != 0);
                self.set_nz8(r);
                (r, true)
            }
            RmwOp::Ror => {
                let r = val >> 1 | u8::from(carry) << 7;
                self.set_flag(CcFlag::C, val & 1 != 0);
                self.set_nz8(r);
                (r, true)
            }
            RmwOp::Asr => {
                let r = val >> 1 | (val & 0x80);
                self.set_flag(CcFlag::C, val & 1 != 0);
                self.set_nz8(r);
                (r, true)
            }
            RmwOp::Asl => {
                let r = val << 1;
                self.set_flag(CcFlag::C, val & 0x80 != 0);
                self.set_flag(CcFlag::V, (val ^ r) & 0x80 != 0);
                self.set_nz8(r);
                (r, true)
            }
            RmwOp::Rol => {
                let r = val << 1 | u8::from(carry);
                self.set_flag(CcFlag::C, val & 0x80 != 0);
                self.set_flag(CcFlag::V, (val ^ r) & 0x80 != 0);
                self.set_nz8(r);
                (r, true)
            }
            RmwOp::Dec => {
                let r = val.wrapping_sub(1);
                self.set_flag(CcFlag::V, val == 0x80);
                self.set_nz8(r);
                (r, true)
            }
            RmwOp::Inc => {
                let r = val.wrapping_add(1);
                self.set_flag(CcFlag::V, val == 0x7F);
                self.set_nz8(r);
                (r, true)
            }
            RmwOp::Tst => {
                self.load_flags8(val);
                (val, false)
            }
            RmwOp::Clr => {
                self.cc = self.cc & !(CcFlag::N as u8 | CcFlag::V as u8 | CcFlag::C as u8)
                    | CcFlag::Z as u8;
                (0, true)
            }
        }
    }

    /// 6309 register-form unary ops at 16 bits (NEGD, COMW, ...).
    pub(crate) fn rmw16(&mut self, op: RmwOp, val: u16) -> (u16, bool) {
        let carry = self.flag(CcFlag::C);
        match op {
            RmwOp::Neg => (self.sub16(0, val, false), true),
            RmwOp::Com => {
                let r = !val;
                self.load_flags16(r);
                self.set_flag(CcFlag::C, true);
                (r, true)
            }
            RmwOp::Lsr => {
                let r = val >> 1;
                self.set_flag(CcFlag::C, val & 1 != 0);
                self.set_nz16(r);
                (r, true)
            }
            RmwOp::Ror => {
                let r = val >> 1 | u16::from(carry) << 15;
                self.set_flag(CcFlag::C, val & 1 != 0);
                self.set_nz16(r);
                (r, true)
            }
            RmwOp::Asr => {
                let r = val >> 1 | (val & 0x8000);
                self.set_flag(CcFlag::C, val & 1 != 0);
                self.set_nz16(r);
                (r, true)
            }
            RmwOp::Asl => {
                let r = val << 1;
                self.set_flag(CcFlag::C, val & 0x8000 != 0);
                self.set_flag(CcFlag::V, (val ^ r) & 0x8000 != 0);
                self.set_nz16(r);
                (r, true)
            }
            RmwOp::Rol => {
                let r = val << 1 | u16::from(carry);
                self.set_flag(CcFlag::C, val & 0x8000 != 0);
                self.set_flag(CcFlag::V, (val ^ r) & 0x8000 != 0);
                self.set_nz16(r);
                (r, true)
            }
            RmwOp::Dec => {
                let r = val.wrapping_sub(1);
                self.set_flag(CcFlag::V, val == 0x8000);
                self.set_nz16(r);
                (r, true)
            }
            RmwOp::Inc => {
                let r = val.wrapping_add(1);
                self.set_flag(CcFlag::V, val == 0x7FFF);
                self.set_nz16(r);
                (r, true)
            }
            RmwOp::Tst => {
                self.load_flags16(val);
                (val, false)
            }
            RmwOp::Clr => {
                self.cc = self.cc & !(CcFlag::N as u8 | CcFlag::V as u8 | CcFlag::C as u8)
                    | CcFlag::Z as u8;
                (0, true)
            }
        }
    }

    pub(crate) fn daa(&mut self) {
        let mut adjust = 0u8;
        if self.cc & CcFlag::H as u8 != 0 || self.a & 0x0F > 0x09 {
            adjust |= 0x06;
        }
        if self.cc & CcFlag::C as u8 != 0 || self.a > 0x99 || (self.a > 0x8F && self.a & 0x0F > 0x09)
        {
            adjust |= 0x60;
        }
        let sum = u16::from(self.a) + u16::from(adjust);
        // DAA never clears an already set carry.
        if sum > 0xFF {
            self.set_flag(CcFlag::C, true);
        }
        self.a = sum as u8;
        self.set_nz8(self.a);
    }

    pub(crate) fn test_cond(&self, cond: Cond) -> bool {
        let c = self.flag(CcFlag::C);
        let z = self.flag(CcFlag::Z);
        let n = self.flag(CcFlag::N);
        let v = self.flag(CcFlag::V);
        match cond {
            Cond::Ra => true,
            Cond::Rn => false,
            Cond::Hi => !c && !z,
            Cond::Ls => c || z,
            Cond::Cc => !c,
            Cond::Cs => c,
            Cond::Ne => !z,
            Cond::Eq => z,
            Cond::Vc => !v,
            Cond::Vs => v,
            Cond::Pl => !n,
            Cond::Mi => n,
            Cond::Ge => n == v,
            Cond::Lt => n != v,
            Cond::Gt => !z && n == v,
            Cond::Le => z || n != v,
        }
    }
}
