//! Indexed addressing: postbyte decode and the per-cycle effective-address
//! sequencer. Covers the 6809 forms plus the 6309 W-indexed family.
//!
//! Cycle accounting: the "+n" columns of the indexed timing table are the
//! cycles this sequencer spends after the postbyte read (offset fetches,
//! internal add cycles, indirection). The base access cycle shared with
//! direct/extended addressing is charged by the caller, not here.

use crate::core::{Bus, BusMaster};

use super::{Mc6809, MD_ILLEGAL};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum IdxStage {
    #[default]
    Post,
    Fetch,
    Dead,
    IndHigh,
    IndLow,
    IndDead,
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct IdxState {
    pub stage: IdxStage,
    /// Offset bytes still to fetch (0-2).
    pub fetch: u8,
    pub fetch_word: bool,
    /// Internal cycles still to burn after the fetches.
    pub dead: u8,
    pub indirect: bool,
    /// PC-relative: the base is PC as of the end of the offset fetch.
    pub pc_rel: bool,
    pub base: u16,
}

impl Mc6809 {
    /// One cycle of indexed address resolution. Returns true at the end of
    /// the cycle that leaves `ea` holding the final effective address.
    pub(crate) fn indexed_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) -> bool {
        match self.idx.stage {
            IdxStage::Post => {
                let post = bus.read(master, self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.plan_indexed(post)
            }
            IdxStage::Fetch => {
                self.temp = self.temp << 8 | u32::from(bus.read(master, self.pc));
                self.pc = self.pc.wrapping_add(1);
                self.idx.fetch -= 1;
                if self.idx.fetch > 0 {
                    return false;
                }
                let off = if self.idx.fetch_word {
                    self.temp as u16
                } else {
                    i16::from(self.temp as u8 as i8) as u16
                };
                let base = if self.idx.pc_rel { self.pc } else { self.idx.base };
                self.ea = base.wrapping_add(off);
                self.advance_plan()
            }
            IdxStage::Dead => {
                bus.internal_cycle(master);
                self.idx.dead -= 1;
                if self.idx.dead > 0 {
                    return false;
                }
                if self.idx.indirect {
                    self.idx.stage = IdxStage::IndHigh;
                    false
                } else {
                    true
                }
            }
            IdxStage::IndHigh => {
                self.temp = u32::from(bus.read(master, self.ea)) << 8;
                self.idx.stage = IdxStage::IndLow;
                false
            }
            IdxStage::IndLow => {
                self.ea = self.temp as u16 | u16::from(bus.read(master, self.ea.wrapping_add(1)));
                self.idx.stage = IdxStage::IndDead;
                false
            }
            IdxStage::IndDead => {
                bus.internal_cycle(master);
                true
            }
        }
    }

    /// Move past the stage that just completed. Returns true if the address
    /// is already final.
    fn advance_plan(&mut self) -> bool {
        if self.idx.dead > 0 {
            self.idx.stage = IdxStage::Dead;
            false
        } else if self.idx.indirect {
            self.idx.stage = IdxStage::IndHigh;
            false
        } else {
            true
        }
    }

    fn index_reg(&self, rr: u8) -> u16 {
        match rr & 3 {
            0 => self.x,
            1 => self.y,
            2 => self.u,
            _ => self.s,
        }
    }

    fn set_index_reg(&mut self, rr: u8, val: u16) {
        match rr & 3 {
            0 => self.x = val,
            1 => self.y = val,
            2 => self.u = val,
            _ => self.set_s(val),
        }
    }

    /// Decode the postbyte into the cycle plan. The postbyte read itself is
    /// the cycle being executed; returns true if no further address cycles
    /// are owed.
    fn plan_indexed(&mut self, post: u8) -> bool {
        self.idx = IdxState::default();
        self.temp = 0;

        // 5-bit constant offset.
        if post & 0x80 == 0 {
            let off = (post & 0x0F) as i16 - if post & 0x10 != 0 { 16 } else { 0 };
            self.ea = self.index_reg(post >> 5).wrapping_add(off as u16);
            self.idx.dead = 1;
            self.idx.stage = IdxStage::Dead;
            return false;
        }

        // 6309 W-indexed family claims a handful of otherwise invalid
        // encodings; the indirect forms have a zero low nibble.
        if self.enhanced() {
            let handled = match post {
                0x8F | 0x90 => {
                    self.ea = self.get_w();
                    true
                }
                0xAF | 0xB0 => {
                    self.idx.base = self.get_w();
                    self.idx.fetch = 2;
                    true
                }
                0xCF | 0xD0 => {
                    self.ea = self.get_w();
                    self.set_w(self.get_w().wrapping_add(2));
                    self.idx.dead = 1;
                    true
                }
                0xEF | 0xF0 => {
                    self.set_w(self.get_w().wrapping_sub(2));
                    self.ea = self.get_w();
                    self.idx.dead = 1;
                    true
                }
                _ => false,
            };
            if handled {
                self.idx.indirect = post & 0x0F == 0;
                self.idx.fetch_word = self.idx.fetch == 2;
                if self.idx.fetch > 0 {
                    self.idx.stage = IdxStage::Fetch;
                    return false;
                }
                return self.advance_plan();
            }
        }

        let rr = (post >> 5) & 3;
        let indirect = post & 0x10 != 0;
        let native = self.native();
        match post & 0x0F {
            0x0 => {
                // ,R+  (no indirect form exists)
                self.ea = self.index_reg(rr);
                self.set_index_reg(rr, self.ea.wrapping_add(1));
                self.idx.dead = if native { 1 } else { 2 };
            }
            0x1 => {
                // ,R++
                self.ea = self.index_reg(rr);
                self.set_index_reg(rr, self.ea.wrapping_add(2));
                self.idx.dead = if native { 2 } else { 3 };
            }
            0x2 => {
                // ,-R
                let v = self.index_reg(rr).wrapping_sub(1);
                self.set_index_reg(rr, v);
                self.ea = v;
                self.idx.dead = if native { 1 } else { 2 };
            }
            0x3 => {
                // ,--R
                let v = self.index_reg(rr).wrapping_sub(2);
                self.set_index_reg(rr, v);
                self.ea = v;
                self.idx.dead = if native { 2 } else { 3 };
            }
            0x4 => {
                // ,R
                self.ea = self.index_reg(rr);
            }
            0x5 => {
                // B,R
                self.ea = self.index_reg(rr).wrapping_add(i16::from(self.b as i8) as u16);
                self.idx.dead = 1;
            }
            0x6 => {
                // A,R
                self.ea = self.index_reg(rr).wrapping_add(i16::from(self.a as i8) as u16);
                self.idx.dead = 1;
            }
            0x7 if self.enhanced() => {
                // E,R
                self.ea = self.index_reg(rr).wrapping_add(i16::from(self.e as i8) as u16);
                self.idx.dead = 1;
            }
            0x8 => {
                // n8,R
                self.idx.base = self.index_reg(rr);
                self.idx.fetch = 1;
            }
            0x9 => {
                // n16,R
                self.idx.base = self.index_reg(rr);
                self.idx.fetch = 2;
                self.idx.dead = if native { 1 } else { 2 };
            }
            0xA if self.enhanced() => {
                // F,R
                self.ea = self.index_reg(rr).wrapping_add(i16::from(self.f as i8) as u16);
                self.idx.dead = 1;
            }
            0xB => {
                // D,R
                self.ea = self.index_reg(rr).wrapping_add(self.get_d());
                self.idx.dead = if native { 2 } else { 4 };
            }
            0xC => {
                // n8,PCR
                self.idx.pc_rel = true;
                self.idx.fetch = 1;
            }
            0xD => {
                // n16,PCR
                self.idx.pc_rel = true;
                self.idx.fetch = 2;
                self.idx.dead = if native { 2 } else { 3 };
            }
            0xF if indirect => {
                // [n16] extended indirect
                self.idx.fetch = 2;
            }
            _ => {
                // Invalid encoding: the enhanced part traps, the base part
                // falls back to ,R.
                if self.enhanced() {
                    self.trap(MD_ILLEGAL);
                    return false;
                }
                self.ea = self.index_reg(rr);
            }
        }
        if indirect && post & 0x0F != 0x0 {
            self.idx.indirect = true;
        }
        self.idx.fetch_word = self.idx.fetch == 2;
        if self.idx.fetch > 0 {
            self.idx.stage = IdxStage::Fetch;
            return false;
        }
        self.advance_plan()
    }
}
