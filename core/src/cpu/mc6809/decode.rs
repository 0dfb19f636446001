//! Opcode decode tables for the MC6809 and the HD6309 superset.
//!
//! Decoding maps (page, opcode) to an operation plus addressing mode; the
//! sequencers in `exec` and `indexed` turn that pair into bus cycles. Base
//! variant decoding rejects every 6309-only encoding.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reg8 {
    A,
    B,
    E,
    F,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reg16 {
    D,
    X,
    Y,
    U,
    S,
    W,
}

/// Which stack pointer a push/pull works through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StackPtr {
    S,
    U,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AluOp {
    Sub,
    Cmp,
    Sbc,
    And,
    Bit,
    Eor,
    Adc,
    Or,
    Add,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RmwOp {
    Neg,
    Com,
    Lsr,
    Ror,
    Asr,
    Asl,
    Rol,
    Dec,
    Inc,
    Tst,
    Clr,
}

/// 6309 memory-immediate logic ops (AIM/OIM/EIM/TIM). The immediate byte
/// precedes the address bytes in the instruction stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ImmRmwOp {
    And,
    Or,
    Eor,
    Tst,
}

/// 6309 direct-page bit transfer family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BitOpKind {
    Band,
    Biand,
    Bor,
    Bior,
    Beor,
    Bieor,
    Ldbt,
    Stbt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Cond {
    Ra,
    Rn,
    Hi,
    Ls,
    Cc,
    Cs,
    Ne,
    Eq,
    Vc,
    Vs,
    Pl,
    Mi,
    Ge,
    Lt,
    Gt,
    Le,
}

impl Cond {
    fn from_nibble(n: u8) -> Self {
        match n & 0x0F {
            0x0 => Cond::Ra,
            0x1 => Cond::Rn,
            0x2 => Cond::Hi,
            0x3 => Cond::Ls,
            0x4 => Cond::Cc,
            0x5 => Cond::Cs,
            0x6 => Cond::Ne,
            0x7 => Cond::Eq,
            0x8 => Cond::Vc,
            0x9 => Cond::Vs,
            0xA => Cond::Pl,
            0xB => Cond::Mi,
            0xC => Cond::Ge,
            0xD => Cond::Lt,
            0xE => Cond::Gt,
            _ => Cond::Le,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AddrMode {
    Inherent,
    Imm8,
    Imm16,
    Imm32,
    Direct,
    Indexed,
    Extended,
    Rel8,
    Rel16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    Nop,
    Sync,
    Daa,
    Sex,
    Sexw,
    Abx,
    Mul,
    OrCc,
    AndCc,
    Cwai,
    Exg,
    Tfr,
    Branch(Cond),
    LBranch(Cond),
    Bsr,
    LBsr,
    Jmp,
    Jsr,
    Rts,
    Rti,
    Swi,
    Swi2,
    Swi3,
    Psh(StackPtr),
    Pul(StackPtr),
    PshW(StackPtr),
    PulW(StackPtr),
    Ld8(Reg8),
    St8(Reg8),
    Alu8(AluOp, Reg8),
    Ld16(Reg16),
    St16(Reg16),
    Alu16(AluOp, Reg16),
    Ldq,
    Stq,
    Lea(Reg16),
    Rmw(RmwOp),
    RmwReg8(RmwOp, Reg8),
    RmwReg16(RmwOp, Reg16),
    ImmRmw(ImmRmwOp),
    AluR(AluOp),
    Muld,
    Divd,
    Divq,
    BitMd,
    LdMd,
    BitOp(BitOpKind),
    Tfm(u8),
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Instr {
    pub op: Op,
    pub mode: AddrMode,
}

fn ins(op: Op, mode: AddrMode) -> Option<Instr> {
    Some(Instr { op, mode })
}

/// Decode one opcode byte on the given page. `enhanced` selects the 6309
/// superset. Returns None for encodings the variant does not implement.
pub(crate) fn decode(enhanced: bool, page: u8, opcode: u8) -> Option<Instr> {
    match page {
        0 => page1(enhanced, opcode),
        2 => page2(enhanced, opcode),
        _ => page3(enhanced, opcode),
    }
}

fn rmw_low(n: u8) -> Option<RmwOp> {
    match n {
        0x0 => Some(RmwOp::Neg),
        0x3 => Some(RmwOp::Com),
        0x4 => Some(RmwOp::Lsr),
        0x6 => Some(RmwOp::Ror),
        0x7 => Some(RmwOp::Asr),
        0x8 => Some(RmwOp::Asl),
        0x9 => Some(RmwOp::Rol),
        0xA => Some(RmwOp::Dec),
        0xC => Some(RmwOp::Inc),
        0xD => Some(RmwOp::Tst),
        0xF => Some(RmwOp::Clr),
        _ => None,
    }
}

fn imm_rmw_low(n: u8) -> Option<ImmRmwOp> {
    match n {
        0x1 => Some(ImmRmwOp::Or),
        0x2 => Some(ImmRmwOp::And),
        0x5 => Some(ImmRmwOp::Eor),
        0xB => Some(ImmRmwOp::Tst),
        _ => None,
    }
}

fn alu_low(n: u8) -> Option<AluOp> {
    match n {
        0x0 => Some(AluOp::Sub),
        0x1 => Some(AluOp::Cmp),
        0x2 => Some(AluOp::Sbc),
        0x4 => Some(AluOp::And),
        0x5 => Some(AluOp::Bit),
        0x8 => Some(AluOp::Eor),
        0x9 => Some(AluOp::Adc),
        0xA => Some(AluOp::Or),
        0xB => Some(AluOp::Add),
        _ => None,
    }
}

/// Memory addressing mode for opcode rows 8-F (imm/dir/idx/ext repeating).
fn row_mode(opcode: u8, imm: AddrMode) -> AddrMode {
    match (opcode >> 4) & 0x3 {
        0 => imm,
        1 => AddrMode::Direct,
        2 => AddrMode::Indexed,
        _ => AddrMode::Extended,
    }
}

fn page1(enh: bool, op: u8) -> Option<Instr> {
    use AddrMode::*;
    match op {
        0x00..=0x0F | 0x60..=0x7F => {
            let mode = match op & 0xF0 {
                0x00 => Direct,
                0x60 => Indexed,
                _ => Extended,
            };
            let low = op & 0x0F;
            match low {
                0xE => ins(Op::Jmp, mode),
                _ => {
                    if let Some(r) = rmw_low(low) {
                        ins(Op::Rmw(r), mode)
                    } else if enh {
                        imm_rmw_low(low).and_then(|r| ins(Op::ImmRmw(r), mode))
                    } else {
                        None
                    }
                }
            }
        }
        0x12 => ins(Op::Nop, Inherent),
        0x13 => ins(Op::Sync, Inherent),
        0x14 if enh => ins(Op::Sexw, Inherent),
        0x16 => ins(Op::LBranch(Cond::Ra), Rel16),
        0x17 => ins(Op::LBsr, Rel16),
        0x19 => ins(Op::Daa, Inherent),
        0x1A => ins(Op::OrCc, Imm8),
        0x1C => ins(Op::AndCc, Imm8),
        0x1D => ins(Op::Sex, Inherent),
        0x1E => ins(Op::Exg, Imm8),
        0x1F => ins(Op::Tfr, Imm8),
        0x20..=0x2F => ins(Op::Branch(Cond::from_nibble(op)), Rel8),
        0x30 => ins(Op::Lea(Reg16::X), Indexed),
        0x31 => ins(Op::Lea(Reg16::Y), Indexed),
        0x32 => ins(Op::Lea(Reg16::S), Indexed),
        0x33 => ins(Op::Lea(Reg16::U), Indexed),
        0x34 => ins(Op::Psh(StackPtr::S), Imm8),
        0x35 => ins(Op::Pul(StackPtr::S), Imm8),
        0x36 => ins(Op::Psh(StackPtr::U), Imm8),
        0x37 => ins(Op::Pul(StackPtr::U), Imm8),
        0x39 => ins(Op::Rts, Inherent),
        0x3A => ins(Op::Abx, Inherent),
        0x3B => ins(Op::Rti, Inherent),
        0x3C => ins(Op::Cwai, Imm8),
        0x3D => ins(Op::Mul, Inherent),
        0x3F => ins(Op::Swi, Inherent),
        0x40..=0x5F => {
            let reg = if op & 0x10 == 0 { Reg8::A } else { Reg8::B };
            rmw_low(op & 0x0F).and_then(|r| ins(Op::RmwReg8(r, reg), Inherent))
        }
        0x80..=0xFF => {
            let reg = if op & 0x40 == 0 { Reg8::A } else { Reg8::B };
            let mode = row_mode(op, Imm8);
            match op & 0x0F {
                0x3 => {
                    // SUBD in the A rows, ADDD in the B rows.
                    let aop = if op & 0x40 == 0 { AluOp::Sub } else { AluOp::Add };
                    ins(Op::Alu16(aop, Reg16::D), row_mode(op, Imm16))
                }
                0x6 => ins(Op::Ld8(reg), mode),
                0x7 if mode != Imm8 => ins(Op::St8(reg), mode),
                0xC if op & 0x40 == 0 => ins(Op::Alu16(AluOp::Cmp, Reg16::X), row_mode(op, Imm16)),
                0xC => ins(Op::Ld16(Reg16::D), row_mode(op, Imm16)),
                0xD if op == 0x8D => ins(Op::Bsr, Rel8),
                0xD if op & 0x40 == 0 => ins(Op::Jsr, mode),
                0xD if op == 0xCD && enh => ins(Op::Ldq, Imm32),
                0xD if mode != Imm8 => ins(Op::St16(Reg16::D), mode),
                0xE => {
                    let r = if op & 0x40 == 0 { Reg16::X } else { Reg16::U };
                    ins(Op::Ld16(r), row_mode(op, Imm16))
                }
                0xF if mode != Imm8 => {
                    let r = if op & 0x40 == 0 { Reg16::X } else { Reg16::U };
                    ins(Op::St16(r), mode)
                }
                low => alu_low(low).and_then(|a| ins(Op::Alu8(a, reg), mode)),
            }
        }
        _ => None,
    }
}

fn page2(enh: bool, op: u8) -> Option<Instr> {
    use AddrMode::*;
    match op {
        0x21..=0x2F => ins(Op::LBranch(Cond::from_nibble(op)), Rel16),
        0x30 if enh => ins(Op::AluR(AluOp::Add), Imm8),
        0x31 if enh => ins(Op::AluR(AluOp::Adc), Imm8),
        0x32 if enh => ins(Op::AluR(AluOp::Sub), Imm8),
        0x33 if enh => ins(Op::AluR(AluOp::Sbc), Imm8),
        0x34 if enh => ins(Op::AluR(AluOp::And), Imm8),
        0x35 if enh => ins(Op::AluR(AluOp::Or), Imm8),
        0x36 if enh => ins(Op::AluR(AluOp::Eor), Imm8),
        0x37 if enh => ins(Op::AluR(AluOp::Cmp), Imm8),
        0x38 if enh => ins(Op::PshW(StackPtr::S), Inherent),
        0x39 if enh => ins(Op::PulW(StackPtr::S), Inherent),
        0x3A if enh => ins(Op::PshW(StackPtr::U), Inherent),
        0x3B if enh => ins(Op::PulW(StackPtr::U), Inherent),
        0x3F => ins(Op::Swi2, Inherent),
        0x40..=0x4F if enh => {
            rmw_low(op & 0x0F).and_then(|r| ins(Op::RmwReg16(r, Reg16::D), Inherent))
        }
        // Only a subset of the unary column exists for W.
        0x53 if enh => ins(Op::RmwReg16(RmwOp::Com, Reg16::W), Inherent),
        0x54 if enh => ins(Op::RmwReg16(RmwOp::Lsr, Reg16::W), Inherent),
        0x56 if enh => ins(Op::RmwReg16(RmwOp::Ror, Reg16::W), Inherent),
        0x59 if enh => ins(Op::RmwReg16(RmwOp::Rol, Reg16::W), Inherent),
        0x5A if enh => ins(Op::RmwReg16(RmwOp::Dec, Reg16::W), Inherent),
        0x5C if enh => ins(Op::RmwReg16(RmwOp::Inc, Reg16::W), Inherent),
        0x5D if enh => ins(Op::RmwReg16(RmwOp::Tst, Reg16::W), Inherent),
        0x5F if enh => ins(Op::RmwReg16(RmwOp::Clr, Reg16::W), Inherent),
        0x80..=0xBF => {
            let mode = row_mode(op, Imm16);
            match op & 0x0F {
                0x0 if enh => ins(Op::Alu16(AluOp::Sub, Reg16::W), mode),
                0x1 if enh => ins(Op::Alu16(AluOp::Cmp, Reg16::W), mode),
                0x2 if enh => ins(Op::Alu16(AluOp::Sbc, Reg16::D), mode),
                0x3 => ins(Op::Alu16(AluOp::Cmp, Reg16::D), mode),
                0x4 if enh => ins(Op::Alu16(AluOp::And, Reg16::D), mode),
                0x5 if enh => ins(Op::Alu16(AluOp::Bit, Reg16::D), mode),
                0x6 if enh => ins(Op::Ld16(Reg16::W), mode),
                0x7 if enh && mode != Imm16 => ins(Op::St16(Reg16::W), mode),
                0x8 if enh => ins(Op::Alu16(AluOp::Eor, Reg16::D), mode),
                0x9 if enh => ins(Op::Alu16(AluOp::Adc, Reg16::D), mode),
                0xA if enh => ins(Op::Alu16(AluOp::Or, Reg16::D), mode),
                0xB if enh => ins(Op::Alu16(AluOp::Add, Reg16::W), mode),
                0xC => ins(Op::Alu16(AluOp::Cmp, Reg16::Y), mode),
                0xE => ins(Op::Ld16(Reg16::Y), mode),
                0xF if mode != Imm16 => ins(Op::St16(Reg16::Y), mode),
                _ => None,
            }
        }
        0xC0..=0xFF => {
            let mode = row_mode(op, Imm16);
            match op & 0x0F {
                0xC if enh && mode != Imm16 => ins(Op::Ldq, mode),
                0xD if enh && mode != Imm16 => ins(Op::Stq, mode),
                0xE => ins(Op::Ld16(Reg16::S), mode),
                0xF if mode != Imm16 => ins(Op::St16(Reg16::S), mode),
                _ => None,
            }
        }
        _ => None,
    }
}

fn page3(enh: bool, op: u8) -> Option<Instr> {
    use AddrMode::*;
    match op {
        0x30 if enh => ins(Op::BitOp(BitOpKind::Band), Direct),
        0x31 if enh => ins(Op::BitOp(BitOpKind::Biand), Direct),
        0x32 if enh => ins(Op::BitOp(BitOpKind::Bor), Direct),
        0x33 if enh => ins(Op::BitOp(BitOpKind::Bior), Direct),
        0x34 if enh => ins(Op::BitOp(BitOpKind::Beor), Direct),
        0x35 if enh => ins(Op::BitOp(BitOpKind::Bieor), Direct),
        0x36 if enh => ins(Op::BitOp(BitOpKind::Ldbt), Direct),
        0x37 if enh => ins(Op::BitOp(BitOpKind::Stbt), Direct),
        0x38..=0x3B if enh => ins(Op::Tfm(op & 0x03), Imm8),
        0x3C if enh => ins(Op::BitMd, Imm8),
        0x3D if enh => ins(Op::LdMd, Imm8),
        0x3F => ins(Op::Swi3, Inherent),
        0x43 if enh => ins(Op::RmwReg8(RmwOp::Com, Reg8::E), Inherent),
        0x4A if enh => ins(Op::RmwReg8(RmwOp::Dec, Reg8::E), Inherent),
        0x4C if enh => ins(Op::RmwReg8(RmwOp::Inc, Reg8::E), Inherent),
        0x4D if enh => ins(Op::RmwReg8(RmwOp::Tst, Reg8::E), Inherent),
        0x4F if enh => ins(Op::RmwReg8(RmwOp::Clr, Reg8::E), Inherent),
        0x53 if enh => ins(Op::RmwReg8(RmwOp::Com, Reg8::F), Inherent),
        0x5A if enh => ins(Op::RmwReg8(RmwOp::Dec, Reg8::F), Inherent),
        0x5C if enh => ins(Op::RmwReg8(RmwOp::Inc, Reg8::F), Inherent),
        0x5D if enh => ins(Op::RmwReg8(RmwOp::Tst, Reg8::F), Inherent),
        0x5F if enh => ins(Op::RmwReg8(RmwOp::Clr, Reg8::F), Inherent),
        0x80..=0xBF => {
            let mode8 = row_mode(op, Imm8);
            let mode16 = row_mode(op, Imm16);
            match op & 0x0F {
                0x0 if enh => ins(Op::Alu8(AluOp::Sub, Reg8::E), mode8),
                0x1 if enh => ins(Op::Alu8(AluOp::Cmp, Reg8::E), mode8),
                0x3 => ins(Op::Alu16(AluOp::Cmp, Reg16::U), mode16),
                0x6 if enh => ins(Op::Ld8(Reg8::E), mode8),
                0x7 if enh && mode8 != Imm8 => ins(Op::St8(Reg8::E), mode8),
                0xB if enh => ins(Op::Alu8(AluOp::Add, Reg8::E), mode8),
                0xC => ins(Op::Alu16(AluOp::Cmp, Reg16::S), mode16),
                0xD if enh => ins(Op::Divd, mode8),
                0xE if enh => ins(Op::Divq, mode16),
                0xF if enh => ins(Op::Muld, mode16),
                _ => None,
            }
        }
        0xC0..=0xFF if enh => {
            let mode = row_mode(op, Imm8);
            match op & 0x0F {
                0x0 => ins(Op::Alu8(AluOp::Sub, Reg8::F), mode),
                0x1 => ins(Op::Alu8(AluOp::Cmp, Reg8::F), mode),
                0x6 => ins(Op::Ld8(Reg8::F), mode),
                0x7 if mode != Imm8 => ins(Op::St8(Reg8::F), mode),
                0xB => ins(Op::Alu8(AluOp::Add, Reg8::F), mode),
                _ => None,
            }
        }
        _ => None,
    }
}
