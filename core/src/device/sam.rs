//! SAM (synchronous address multiplexer) — the MC6883 address decoder,
//! DRAM multiplexer, CPU-rate divider and VDG address counter.
//!
//! The chip's control register is write-only and addressed as 16 paired
//! clear/set lines at 0xFFC0-0xFFDF: an access to an even address clears
//! bit `(addr >> 1) & 15`, an odd address sets it. Every derived field
//! (row/column masks, cycle divisors, video divide ratios) is a pure
//! function of the register and is recomputed on each write.
//!
//! Register bit layout:
//!
//! | Bits  | Field | Meaning                               |
//! |-------|-------|---------------------------------------|
//! | 0-2   | V     | VDG addressing mode                   |
//! | 3-9   | F     | VDG address base (counter bits 9-15)  |
//! | 10    | P1    | RAM page select (64K map type 0)      |
//! | 11-12 | R     | CPU rate: 00 slow, 01 AD, 1x fast     |
//! | 13-14 | M     | memory size: 00 4K, 01 16K, 1x 64K    |
//! | 15    | TY    | map type                              |

use crate::core::scheduler::Ticks;

/// Master-clock ticks for one CPU cycle on the slow (0.89 MHz) bus.
pub const SLOW_CYCLE: u64 = 16;
/// Master-clock ticks for one CPU cycle on the fast (1.78 MHz) bus.
pub const FAST_CYCLE: u64 = 8;

/// What a CPU address resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    /// Multiplexed DRAM; physical offset comes from `ram_address`.
    Ram,
    /// BASIC ROM window (0x8000-0x9FFF in map type 0).
    Rom0,
    /// Second ROM window (0xA000-0xBFFF in map type 0).
    Rom1,
    /// Cartridge ROM window (0xC000-0xFEFF in map type 0).
    CartRom,
    /// First fixed I/O device window (0xFF00-0xFF1F).
    Io0,
    /// Second fixed I/O device window (0xFF20-0xFF3F).
    Io1,
    /// Cartridge I/O window (0xFF40-0xFF5F).
    CartIo,
    /// Unmapped; reads return the idle bus value.
    Reserved,
    /// The SAM's own clear/set register lines (0xFFC0-0xFFDF, write-only).
    SamRegister,
    /// Interrupt-vector ROM mirror (0xFFE0-0xFFFF).
    VectorRom,
}

/// VDG divide ratios per addressing mode V2..V0: X divider then Y divider.
/// Modes 5-7 run undivided; mode 7 is the direct (6R/DMA) mode.
const VDG_DIV: [(u8, u8); 8] = [
    (1, 12), // 0: alpha/semigraphics, 12 scanlines per row
    (3, 1),  // 1: CG1
    (1, 3),  // 2: RG1
    (2, 1),  // 3: CG2
    (1, 2),  // 4: RG2
    (1, 1),  // 5: CG3
    (1, 1),  // 6: RG3
    (1, 1),  // 7: CG6/RG6
];

pub struct Sam {
    reg: u16,

    // Derived from M bits; never set independently of `reg`.
    row_mask: u16,
    col_shift: u32,
    col_mask: u16,
    page_offset: usize,

    // Derived from V bits.
    xdiv: u8,
    ydiv: u8,

    // VDG address counter state.
    vdg_address: u16,
    row_start: u16,
    xcount: u8,
    ycount: u8,
}

/// Serializable SAM state: the register plus VDG counter phase. Derived
/// fields are recomputed on restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamState {
    pub reg: u16,
    pub vdg_address: u16,
    pub row_start: u16,
    pub xcount: u8,
    pub ycount: u8,
}

impl Sam {
    #[must_use]
    pub fn new() -> Self {
        let mut sam = Self {
            reg: 0,
            row_mask: 0,
            col_shift: 0,
            col_mask: 0,
            page_offset: 0,
            xdiv: 1,
            ydiv: 1,
            vdg_address: 0,
            row_start: 0,
            xcount: 0,
            ycount: 0,
        };
        sam.update_derived();
        sam
    }

    /// Hardware reset clears the whole register (4K map, slow rate, mode 0).
    pub fn reset(&mut self) {
        self.reg = 0;
        self.vdg_address = 0;
        self.row_start = 0;
        self.xcount = 0;
        self.ycount = 0;
        self.update_derived();
    }

    #[must_use]
    pub fn register(&self) -> u16 {
        self.reg
    }

    fn update_derived(&mut self) {
        match self.memory_size() {
            0 => {
                // 4K devices: 6-bit row and column.
                self.row_mask = 0x3F;
                self.col_shift = 6;
                self.col_mask = 0x3F;
            }
            1 => {
                // 16K devices: 7-bit row and column.
                self.row_mask = 0x7F;
                self.col_shift = 7;
                self.col_mask = 0x7F;
            }
            _ => {
                // 64K devices: 8-bit row and column.
                self.row_mask = 0xFF;
                self.col_shift = 8;
                self.col_mask = 0xFF;
            }
        }
        // P1 selects the upper 32K bank when a 64K part runs in map type 0.
        self.page_offset = if self.memory_size() >= 2 && !self.map_type() && self.page_bit() {
            0x8000
        } else {
            0
        };
        let (xdiv, ydiv) = VDG_DIV[self.video_mode() as usize];
        self.xdiv = xdiv;
        self.ydiv = ydiv;
    }

    // -- register fields ----------------------------------------------------

    #[must_use]
    pub fn video_mode(&self) -> u8 {
        (self.reg & 0x07) as u8
    }

    /// VDG base address: F bits become counter bits 9-15.
    #[must_use]
    pub fn video_base(&self) -> u16 {
        (self.reg >> 3 & 0x7F) << 9
    }

    fn page_bit(&self) -> bool {
        self.reg & 0x0400 != 0
    }

    fn cpu_rate(&self) -> u8 {
        (self.reg >> 11 & 0x03) as u8
    }

    fn memory_size(&self) -> u8 {
        (self.reg >> 13 & 0x03) as u8
    }

    /// TY bit: false = map type 0 (ROM map), true = map type 1 (all-RAM).
    #[must_use]
    pub fn map_type(&self) -> bool {
        self.reg & 0x8000 != 0
    }

    // -- register writes ----------------------------------------------------

    /// Handle a CPU write anywhere in 0xFFC0-0xFFDF. The data bus value is
    /// ignored by the hardware; only the address line matters.
    pub fn write_register(&mut self, addr: u16) {
        let bit = (addr >> 1) & 0x0F;
        if addr & 1 == 0 {
            self.reg &= !(1 << bit);
        } else {
            self.reg |= 1 << bit;
        }
        self.update_derived();
    }

    // -- address decode -----------------------------------------------------

    /// Partition the CPU address space. Pure given the current register.
    #[must_use]
    pub fn decode(&self, addr: u16) -> Region {
        match addr {
            0x0000..=0x7FFF => Region::Ram,
            0x8000..=0xFEFF => {
                if self.map_type() {
                    Region::Ram
                } else {
                    match addr {
                        0x8000..=0x9FFF => Region::Rom0,
                        0xA000..=0xBFFF => Region::Rom1,
                        _ => Region::CartRom,
                    }
                }
            }
            0xFF00..=0xFF1F => Region::Io0,
            0xFF20..=0xFF3F => Region::Io1,
            0xFF40..=0xFF5F => Region::CartIo,
            0xFF60..=0xFFBF => Region::Reserved,
            0xFFC0..=0xFFDF => Region::SamRegister,
            0xFFE0..=0xFFFF => Region::VectorRom,
        }
    }

    /// DRAM row/column multiplex: physical RAM offset for a CPU address.
    ///
    /// Column bits are extracted with the size-dependent shift and mask and
    /// recombined with the row bits, so addresses beyond the installed array
    /// wrap exactly as the real multiplexer wraps them. Software reads
    /// "wrapped" memory through this remap, so it must be bit-for-bit
    /// stable.
    #[must_use]
    pub fn ram_address(&self, addr: u16) -> usize {
        let row = addr & self.row_mask;
        let col = (addr >> self.col_shift) & self.col_mask;
        (usize::from(col) << self.col_shift | usize::from(row)) + self.page_offset
    }

    /// Master-clock ticks consumed by one CPU access to `addr`.
    ///
    /// R=00 runs everything at the slow divisor. R=01 is the
    /// address-dependent rate: ROM-side addresses (0x8000 up) run fast, RAM
    /// stays slow — but map type 1 turns the whole space into RAM, so it
    /// forces slow regardless of the rate field. R=1x runs everything fast.
    #[must_use]
    pub fn cycle_cost(&self, addr: u16) -> Ticks {
        let fast = match self.cpu_rate() {
            0 => false,
            1 => !self.map_type() && addr >= 0x8000,
            _ => true,
        };
        Ticks::new(if fast { FAST_CYCLE } else { SLOW_CYCLE })
    }

    // -- VDG address counter ------------------------------------------------

    /// One VDG byte fetch: returns the address driven for this fetch and
    /// advances the divide-by-X ladder.
    pub fn vdg_fetch(&mut self) -> u16 {
        let addr = self.vdg_address;
        self.advance_video();
        addr
    }

    fn advance_video(&mut self) {
        self.xcount += 1;
        if self.xcount >= self.xdiv {
            self.xcount = 0;
            self.vdg_address = self.vdg_address.wrapping_add(1);
        }
    }

    /// End-of-scanline pulse. The hardware clocks one dummy fetch so the
    /// divider stays in phase even when the pulse lands mid-character, then
    /// either rewinds the counter to the start of the row group or, every
    /// Y-divide scanlines, latches the new row start.
    pub fn vdg_hsync(&mut self) {
        self.advance_video();
        self.ycount += 1;
        if self.ycount >= self.ydiv {
            self.ycount = 0;
            self.row_start = self.vdg_address;
        } else {
            self.vdg_address = self.row_start;
        }
    }

    /// Field sync: reload the counter from the F base bits.
    pub fn vdg_fsync(&mut self) {
        self.vdg_address = self.video_base();
        self.row_start = self.vdg_address;
        self.xcount = 0;
        self.ycount = 0;
    }

    // -- snapshot -----------------------------------------------------------

    #[must_use]
    pub fn snapshot(&self) -> SamState {
        SamState {
            reg: self.reg,
            vdg_address: self.vdg_address,
            row_start: self.row_start,
            xcount: self.xcount,
            ycount: self.ycount,
        }
    }

    pub fn restore(&mut self, state: &SamState) {
        self.reg = state.reg;
        self.vdg_address = state.vdg_address;
        self.row_start = state.row_start;
        self.xcount = state.xcount;
        self.ycount = state.ycount;
        self.update_derived();
    }
}

impl Default for Sam {
    fn default() -> Self {
        Self::new()
    }
}
