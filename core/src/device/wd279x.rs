//! WD279x floppy disk controller family (WD2791/93/95/97, WD1773).
//!
//! The command state machine follows the datasheet flowcharts: a single
//! accept-command dispatch classifies the command byte by its top bits into
//! type 1 (restore/seek/step), type 2 (read/write sector) and type 3
//! (read address / read track / write track). Each phase re-enters through
//! the event scheduler after a drive-derived delay (next byte cell, next
//! IDAM, step-rate table, head-settle time), so the controller never blocks:
//! "waiting for the disk" is always a pending event.
//!
//! All transient failures — CRC mismatch, record-not-found, seek error,
//! write protect — are reported through status bits plus the completion
//! interrupt, never as host errors. Internal state uses named fields; the
//! externally visible 8-bit register images are composed on access so the
//! bus-level layout stays bit-exact.

use crate::core::scheduler::{EventId, Ticks};
use crate::device::crc16::Crc16;
use crate::device::drive::{Drive, StepDirection};

/// Scheduling capability handed to the controller by its owner.
///
/// `schedule_in` parks a "continue the command state machine" event;
/// `cancel` removes it (force interrupt aborts mid-phase). Tests inject a
/// fake implementation to single-step phases.
pub trait FdcScheduler {
    fn now(&self) -> Ticks;
    fn schedule_in(&mut self, delta: Ticks) -> EventId;
    fn cancel(&mut self, id: EventId);
}

// Status register bits. Bits 1, 2 and 5 are context-dependent: type-1
// commands report index/track-0/head-loaded, types 2 and 3 report
// DRQ/lost-data/record-type.
const S_BUSY: u8 = 0x01;
const S_INDEX: u8 = 0x02;
const S_DRQ: u8 = 0x02;
const S_TRACK0: u8 = 0x04;
const S_LOST_DATA: u8 = 0x04;
const S_CRC_ERROR: u8 = 0x08;
const S_SEEK_ERROR: u8 = 0x10;
const S_RNF: u8 = 0x10;
const S_HEAD_LOADED: u8 = 0x20;
const S_RECORD_TYPE: u8 = 0x20;
const S_WRITE_PROTECT: u8 = 0x40;
const S_NOT_READY: u8 = 0x80;

/// Type-1 step rates in milliseconds, indexed by the low two command bits
/// (1 MHz clock column of the datasheet).
const STEP_RATES_MS: [u64; 4] = [6, 12, 20, 30];
/// Head-settling delay before verify, and the E-flag delay on types 2/3.
const SETTLE_MS: u64 = 30;

/// Master-clock ticks per millisecond (14.31818 MHz crystal).
const TICKS_PER_MS: u64 = 14_318;

const fn ms(n: u64) -> Ticks {
    Ticks::new(n * TICKS_PER_MS)
}

/// Revolutions the controller will scan for an IDAM before giving up:
/// 5 index pulses for track verify, 6 for sector/address searches.
const VERIFY_INDEX_LIMIT: u32 = 5;
const SEARCH_INDEX_LIMIT: u32 = 6;

/// Chip variants differ in side-select output, data-bus inversion, the
/// head-load pin and the sector-length flag interpretation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChipType {
    Wd2791,
    Wd2793,
    Wd2795,
    Wd2797,
    Wd1773,
}

#[derive(Clone, Copy, Debug)]
pub struct ChipFeatures {
    /// Side-select output pin: command bit 1 drives the drive's side line.
    pub has_sso: bool,
    /// Command bit 3 selects between the two sector-length tables.
    pub has_length_flag: bool,
    /// Data bus is inverted between CPU and controller.
    pub inverted_data: bool,
    /// Head-load pin and HLD status reporting.
    pub has_hld: bool,
}

impl ChipType {
    #[must_use]
    pub fn features(self) -> ChipFeatures {
        match self {
            ChipType::Wd2791 => ChipFeatures {
                has_sso: false,
                has_length_flag: false,
                inverted_data: true,
                has_hld: true,
            },
            ChipType::Wd2793 => ChipFeatures {
                has_sso: false,
                has_length_flag: false,
                inverted_data: false,
                has_hld: true,
            },
            ChipType::Wd2795 => ChipFeatures {
                has_sso: true,
                has_length_flag: true,
                inverted_data: true,
                has_hld: false,
            },
            ChipType::Wd2797 => ChipFeatures {
                has_sso: true,
                has_length_flag: true,
                inverted_data: false,
                has_hld: false,
            },
            ChipType::Wd1773 => ChipFeatures {
                has_sso: false,
                has_length_flag: true,
                inverted_data: false,
                has_hld: false,
            },
        }
    }
}

/// Sector size in bytes for an ID-field length code. With the length-flag
/// feature and L=0 the alternate table applies.
fn sector_size(len_code: u8, features: ChipFeatures, l_flag: bool) -> u16 {
    let code = usize::from(len_code & 3);
    if features.has_length_flag && !l_flag {
        [256, 512, 1024, 128][code]
    } else {
        128 << code
    }
}

/// Command state machine phases, one per datasheet flowchart box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    // Type 1
    Type1Begin,
    Type1Step,
    Type1Verify,
    VerifyScanLatch,
    VerifyScanIdam,
    // Type 2 common
    Type2Begin,
    Type2ScanLatch,
    Type2ScanIdam,
    // Read sector
    ReadSectorFindDam,
    ReadSectorByte,
    ReadSectorCrc,
    // Write sector
    WriteSectorDelay,
    WriteSectorGap,
    WriteSectorLead,
    WriteSectorByte,
    WriteSectorTrail,
    // Type 3
    ReadAddressLatch,
    ReadAddressIdam,
    ReadAddressByte,
    ReadTrackWaitIndex,
    ReadTrackByte,
    WriteTrackCheck,
    WriteTrackWaitIndex,
    WriteTrackByte,
}

/// Full serializable controller state. Pending event time is captured by
/// the owning machine's queue snapshot, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wd279xState {
    pub state: State,
    pub command: u8,
    pub track: u8,
    pub sector: u8,
    pub data: u8,
    pub direction_in: bool,
    pub side: u8,
    pub double_density: bool,
    pub status_type1: bool,
    pub busy: bool,
    pub drq: bool,
    pub intrq: bool,
    pub lost_data: bool,
    pub crc_error: bool,
    pub rnf_error: bool,
    pub record_deleted: bool,
    pub wp_error: bool,
    pub head_loaded: bool,
    pub index_start: u32,
    pub bytes_remaining: u16,
    pub delay_count: u16,
    pub crc: u16,
    pub id_field: [u8; 6],
    pub id_index: u8,
}

pub struct Wd279x {
    features: ChipFeatures,

    // Programmer-visible registers.
    command_register: u8,
    track_register: u8,
    sector_register: u8,
    data_register: u8,

    // Machine-readable output lines.
    intrq: bool,
    drq: bool,

    state: State,
    pending: Option<EventId>,

    // Drive-side latches.
    direction: StepDirection,
    side: u8,
    double_density: bool,

    // Named status flags; `status()` composes the external byte.
    status_type1: bool,
    busy: bool,
    lost_data: bool,
    crc_error: bool,
    rnf_error: bool,
    record_deleted: bool,
    wp_error: bool,
    head_loaded: bool,

    // Per-command working set.
    index_start: u32,
    bytes_remaining: u16,
    delay_count: u16,
    crc: Crc16,
    id_field: [u8; 6],
    id_index: u8,

    /// Latched diagnostic: a command byte the controller accepted but has
    /// no implementation for (e.g. unsupported force-interrupt condition
    /// bits). The command simply never completes; this is not an error.
    last_unknown_command: Option<u8>,
}

impl Wd279x {
    #[must_use]
    pub fn new(chip: ChipType) -> Self {
        Self {
            features: chip.features(),
            command_register: 0,
            track_register: 0,
            sector_register: 0,
            data_register: 0,
            intrq: false,
            drq: false,
            state: State::Idle,
            pending: None,
            direction: StepDirection::Inward,
            side: 0,
            double_density: false,
            status_type1: true,
            busy: false,
            lost_data: false,
            crc_error: false,
            rnf_error: false,
            record_deleted: false,
            wp_error: false,
            head_loaded: false,
            index_start: 0,
            bytes_remaining: 0,
            delay_count: 0,
            crc: Crc16::PRESET,
            id_field: [0; 6],
            id_index: 0,
            last_unknown_command: None,
        }
    }

    /// Hardware reset. Any pending phase event must be cancelled by the
    /// owner before calling this.
    pub fn reset(&mut self) {
        self.command_register = 0;
        self.track_register = 0;
        self.sector_register = 0;
        self.data_register = 0;
        self.intrq = false;
        self.drq = false;
        self.state = State::Idle;
        self.pending = None;
        self.status_type1 = true;
        self.busy = false;
        self.lost_data = false;
        self.crc_error = false;
        self.rnf_error = false;
        self.record_deleted = false;
        self.wp_error = false;
        self.head_loaded = false;
        self.last_unknown_command = None;
    }

    /// Completion interrupt line (wired to NMI on the CoCo controller).
    #[must_use]
    pub fn intrq(&self) -> bool {
        self.intrq
    }

    /// Data-request line (wired to the HALT release on the CoCo controller).
    #[must_use]
    pub fn drq(&self) -> bool {
        self.drq
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    #[must_use]
    pub fn last_unknown_command(&self) -> Option<u8> {
        self.last_unknown_command
    }

    /// Density select input (from the controller card's control register).
    pub fn set_density(&mut self, double: bool, drive: &mut dyn Drive) {
        self.double_density = double;
        drive.set_density(double);
    }

    fn bus_invert(&self, v: u8) -> u8 {
        if self.features.inverted_data { !v } else { v }
    }

    // -- register file ------------------------------------------------------

    /// Read register `offset & 3`: status, track, sector, data.
    pub fn read(&mut self, offset: u8, drive: &mut dyn Drive) -> u8 {
        let v = match offset & 3 {
            0 => {
                // Reading status clears the completion interrupt.
                self.intrq = false;
                self.status(drive)
            }
            1 => self.track_register,
            2 => self.sector_register,
            _ => {
                self.drq = false;
                self.data_register
            }
        };
        self.bus_invert(v)
    }

    /// Write register `offset & 3`: command, track, sector, data.
    pub fn write(
        &mut self,
        offset: u8,
        value: u8,
        drive: &mut dyn Drive,
        sched: &mut dyn FdcScheduler,
    ) {
        let value = self.bus_invert(value);
        match offset & 3 {
            0 => self.write_command(value, drive, sched),
            1 => self.track_register = value,
            2 => self.sector_register = value,
            _ => {
                self.data_register = value;
                self.drq = false;
            }
        }
    }

    /// Compose the external status byte from named flags plus live drive
    /// lines. Bit meanings depend on the class of the last command.
    fn status(&self, drive: &mut dyn Drive) -> u8 {
        let mut s = 0;
        if self.busy {
            s |= S_BUSY;
        }
        if !drive.is_ready() {
            s |= S_NOT_READY;
        }
        if self.status_type1 {
            if drive.is_index() {
                s |= S_INDEX;
            }
            if drive.is_tr00() {
                s |= S_TRACK0;
            }
            if self.crc_error {
                s |= S_CRC_ERROR;
            }
            if self.rnf_error {
                s |= S_SEEK_ERROR;
            }
            if self.head_loaded && self.features.has_hld {
                s |= S_HEAD_LOADED;
            }
            if drive.is_write_protected() {
                s |= S_WRITE_PROTECT;
            }
        } else {
            if self.drq {
                s |= S_DRQ;
            }
            if self.lost_data {
                s |= S_LOST_DATA;
            }
            if self.crc_error {
                s |= S_CRC_ERROR;
            }
            if self.rnf_error {
                s |= S_RNF;
            }
            if self.record_deleted {
                s |= S_RECORD_TYPE;
            }
            if self.wp_error {
                s |= S_WRITE_PROTECT;
            }
        }
        s
    }

    // -- command acceptance -------------------------------------------------

    fn write_command(&mut self, cmd: u8, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        // A new command clears the previous completion interrupt.
        self.intrq = false;

        // Force interrupt is honored even while busy; everything else is
        // ignored until the current command completes.
        if cmd & 0xF0 == 0xD0 {
            self.force_interrupt(cmd, sched);
            return;
        }
        if self.busy {
            return;
        }

        self.command_register = cmd;
        self.busy = true;
        self.crc_error = false;
        self.rnf_error = false;
        self.lost_data = false;
        self.record_deleted = false;
        self.wp_error = false;

        match cmd >> 4 {
            // Type 1: restore, seek, step, step-in, step-out.
            0x0..=0x7 => {
                self.status_type1 = true;
                self.drq = false;
                self.head_loaded = cmd & 0x08 != 0;
                if cmd >> 4 == 0 {
                    // RESTORE: pretend the head is far inside and seek to 0.
                    self.track_register = 0xFF;
                    self.data_register = 0x00;
                }
                match cmd >> 5 {
                    2 => self.direction = StepDirection::Inward, // STEP IN
                    3 => self.direction = StepDirection::Outward, // STEP OUT
                    _ => {} // SEEK/RESTORE pick direction per loop; STEP keeps last
                }
                self.enter(State::Type1Begin, drive, sched);
            }
            // Type 2: read/write sector. Type 3: read address/track, write track.
            _ => {
                self.status_type1 = false;
                self.drq = false;
                if !drive.is_ready() {
                    self.finish(sched);
                    return;
                }
                if self.features.has_sso {
                    self.side = (cmd >> 1) & 1;
                    drive.set_side(self.side);
                }
                // Per-command working-set setup before the shared E delay.
                match cmd >> 4 {
                    0xE => self.index_start = drive.index_pulses(),
                    0xF => self.delay_count = 3,
                    _ => {}
                }
                self.enter(State::Type2Begin, drive, sched);
            }
        }
    }

    /// Force interrupt (0xD0 | condition). Aborts any in-flight phase
    /// synchronously; condition bit 3 raises the completion interrupt
    /// immediately. The ready-transition and index-pulse conditions (bits
    /// 0-2) are not implemented: they latch as an unknown command and the
    /// "interrupt on condition" never fires, which matches treating them as
    /// a diagnostic rather than an error.
    fn force_interrupt(&mut self, cmd: u8, sched: &mut dyn FdcScheduler) {
        if let Some(id) = self.pending.take() {
            sched.cancel(id);
        }
        let was_busy = self.busy;
        self.busy = false;
        self.state = State::Idle;
        if !was_busy {
            self.status_type1 = true;
        }
        match cmd & 0x0F {
            0x00 => {}
            0x08 => self.intrq = true,
            _ => self.last_unknown_command = Some(cmd),
        }
    }

    // -- state machine plumbing ---------------------------------------------

    /// Move to `state` and run phases until one schedules a delay or the
    /// command completes.
    fn enter(&mut self, state: State, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        self.state = state;
        self.run(drive, sched);
    }

    /// The scheduled phase event fired: continue the command.
    pub fn fired(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        self.pending = None;
        self.run(drive, sched);
    }

    /// Park the machine in `state` and come back after `delta`.
    fn sleep(&mut self, state: State, delta: Ticks, sched: &mut dyn FdcScheduler) {
        self.state = state;
        self.pending = Some(sched.schedule_in(delta));
    }

    /// Complete the current command: clear BUSY, raise the completion
    /// interrupt.
    fn finish(&mut self, _sched: &mut dyn FdcScheduler) {
        self.busy = false;
        self.state = State::Idle;
        self.intrq = true;
    }

    fn run(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        loop {
            match self.state {
                State::Idle => return,
                State::Type1Begin => {
                    if !self.type1_begin(drive, sched) {
                        return;
                    }
                }
                State::Type1Step => {
                    if !self.type1_step(drive, sched) {
                        return;
                    }
                }
                State::Type1Verify => {
                    if !self.type1_verify(sched) {
                        return;
                    }
                }
                State::VerifyScanLatch => {
                    self.scan_latch(State::VerifyScanIdam, drive, sched);
                    return;
                }
                State::VerifyScanIdam => {
                    self.verify_scan_idam(drive, sched);
                    return;
                }
                State::Type2Begin => {
                    if !self.type2_begin(sched) {
                        return;
                    }
                }
                State::Type2ScanLatch => {
                    self.scan_latch(State::Type2ScanIdam, drive, sched);
                    return;
                }
                State::Type2ScanIdam => {
                    self.type2_scan_idam(drive, sched);
                    return;
                }
                State::ReadSectorFindDam => {
                    self.read_sector_find_dam(drive, sched);
                    return;
                }
                State::ReadSectorByte => {
                    self.read_sector_byte(drive, sched);
                    return;
                }
                State::ReadSectorCrc => {
                    if !self.read_sector_crc(drive, sched) {
                        return;
                    }
                }
                State::WriteSectorDelay => {
                    self.write_sector_delay(drive, sched);
                    return;
                }
                State::WriteSectorGap => {
                    self.write_sector_gap(drive, sched);
                    return;
                }
                State::WriteSectorLead => {
                    self.write_sector_lead(drive, sched);
                    return;
                }
                State::WriteSectorByte => {
                    self.write_sector_byte(drive, sched);
                    return;
                }
                State::WriteSectorTrail => {
                    if !self.write_sector_trail(drive, sched) {
                        return;
                    }
                }
                State::ReadAddressLatch => {
                    self.scan_latch(State::ReadAddressIdam, drive, sched);
                    return;
                }
                State::ReadAddressIdam => {
                    self.read_address_idam(drive, sched);
                    return;
                }
                State::ReadAddressByte => {
                    self.read_address_byte(drive, sched);
                    return;
                }
                State::ReadTrackWaitIndex => {
                    self.read_track_wait_index(drive, sched);
                    return;
                }
                State::ReadTrackByte => {
                    self.read_track_byte(drive, sched);
                    return;
                }
                State::WriteTrackCheck => {
                    self.write_track_check(drive, sched);
                    return;
                }
                State::WriteTrackWaitIndex => {
                    self.write_track_wait_index(drive, sched);
                    return;
                }
                State::WriteTrackByte => {
                    self.write_track_byte(drive, sched);
                    return;
                }
            }
        }
    }

    // -- type 1: restore / seek / step ---------------------------------------

    /// Decide whether more stepping is needed. Returns true to fall through
    /// to the next phase immediately.
    fn type1_begin(&mut self, _drive: &mut dyn Drive, _sched: &mut dyn FdcScheduler) -> bool {
        let cmd = self.command_register;
        match cmd >> 5 {
            0 => {
                // RESTORE/SEEK: step until track register meets data register.
                if self.track_register == self.data_register {
                    self.state = State::Type1Verify;
                } else {
                    self.direction = if self.data_register > self.track_register {
                        StepDirection::Inward
                    } else {
                        StepDirection::Outward
                    };
                    self.state = State::Type1Step;
                }
            }
            _ => {
                // STEP family: exactly one step in the latched direction.
                self.state = State::Type1Step;
            }
        }
        true
    }

    /// Issue one head step, clamp at track 0, and wait out the step rate.
    /// Even a clamped step waits the full delay before verifying.
    fn type1_step(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) -> bool {
        let cmd = self.command_register;
        let seeking = cmd >> 5 == 0;
        let update = seeking || cmd & 0x10 != 0;

        drive.set_direction(self.direction);
        let mut clamped = false;
        if self.direction == StepDirection::Outward && drive.is_tr00() {
            // Head is already against the track-0 stop.
            self.track_register = 0;
            clamped = true;
        } else {
            drive.step();
            if update {
                self.track_register = match self.direction {
                    StepDirection::Inward => self.track_register.wrapping_add(1),
                    StepDirection::Outward => self.track_register.wrapping_sub(1),
                };
            }
        }
        let rate = STEP_RATES_MS[usize::from(cmd & 3)];
        // Seeks keep looping through the compare phase; single steps and a
        // clamped seek go straight to the verify decision.
        let next = if seeking && !clamped {
            State::Type1Begin
        } else {
            State::Type1Verify
        };
        self.sleep(next, ms(rate), sched);
        false
    }

    /// Optionally verify the destination track after head settle.
    fn type1_verify(&mut self, sched: &mut dyn FdcScheduler) -> bool {
        if self.command_register & 0x04 == 0 {
            self.finish(sched);
            return false;
        }
        self.sleep(State::VerifyScanLatch, ms(SETTLE_MS), sched);
        false
    }

    /// Latch the revolution count that bounds an IDAM scan, then wait for
    /// the first IDAM.
    fn scan_latch(&mut self, next: State, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        self.index_start = drive.index_pulses();
        self.sleep(next, drive.time_to_next_idam(), sched);
    }

    fn scan_expired(&self, drive: &dyn Drive, limit: u32) -> bool {
        drive.index_pulses().wrapping_sub(self.index_start) >= limit
    }

    /// Examine one IDAM during track verify: the track byte must match the
    /// track register and the ID CRC must be clean.
    fn verify_scan_idam(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        if self.scan_expired(drive, VERIFY_INDEX_LIMIT) {
            self.rnf_error = true; // reads back as seek error for type 1
            self.finish(sched);
            return;
        }
        if !drive.next_idam() {
            self.sleep(State::VerifyScanIdam, drive.time_to_next_idam(), sched);
            return;
        }
        let mut crc = self.id_preset();
        crc = crc.update(0xFE);
        let mut id = [0u8; 6];
        for b in &mut id {
            *b = drive.read();
            crc = crc.update(*b);
        }
        if id[0] == self.track_register && crc.value() == 0 {
            self.crc_error = false;
            self.finish(sched);
        } else {
            if crc.value() != 0 {
                self.crc_error = true;
            }
            self.sleep(State::VerifyScanIdam, drive.time_to_next_idam(), sched);
        }
    }

    /// CRC preset for an ID or data field. In double density the three A1
    /// sync bytes preceding the mark are part of the checksummed span; the
    /// drive exposes the mark byte itself at the IDAM position, so fold the
    /// sync bytes here.
    fn id_preset(&self) -> Crc16 {
        if self.double_density {
            Crc16::PRESET.update_block(&[0xA1, 0xA1, 0xA1])
        } else {
            Crc16::PRESET
        }
    }

    // -- type 2: read / write sector -----------------------------------------

    /// Optional head-engage delay (E flag) shared by types 2 and 3, then
    /// route to the command's scan state.
    fn type2_begin(&mut self, sched: &mut dyn FdcScheduler) -> bool {
        let target = self.type2_or_3_target();
        if self.command_register & 0x04 != 0 {
            self.sleep(target, ms(SETTLE_MS), sched);
            return false;
        }
        self.state = target;
        true
    }

    /// Examine one IDAM during a sector search: track, sector (and side,
    /// for compare-capable chips) must match and the ID CRC must be clean.
    fn type2_scan_idam(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        if self.scan_expired(drive, SEARCH_INDEX_LIMIT) {
            self.rnf_error = true;
            self.finish(sched);
            return;
        }
        if !drive.next_idam() {
            self.sleep(State::Type2ScanIdam, drive.time_to_next_idam(), sched);
            return;
        }
        let mut crc = self.id_preset();
        crc = crc.update(0xFE);
        for b in &mut self.id_field {
            *b = drive.read();
            crc = crc.update(*b);
        }
        let side_ok = if self.features.has_sso || self.command_register & 0x02 == 0 {
            true
        } else {
            // Side-compare chips: command bit 3 carries the expected side.
            self.id_field[1] == (self.command_register >> 3) & 1
        };
        if self.id_field[0] != self.track_register
            || self.id_field[2] != self.sector_register
            || !side_ok
        {
            self.sleep(State::Type2ScanIdam, drive.time_to_next_idam(), sched);
            return;
        }
        if crc.value() != 0 {
            // Bad ID CRC: flag it and keep searching; only an exhausted
            // scan ends the command.
            self.crc_error = true;
            self.sleep(State::Type2ScanIdam, drive.time_to_next_idam(), sched);
            return;
        }
        self.crc_error = false;
        self.bytes_remaining = sector_size(
            self.id_field[3],
            self.features,
            self.command_register & 0x08 != 0,
        );
        if self.command_register & 0x20 == 0 {
            // READ SECTOR: hunt for the data address mark within the gap.
            self.delay_count = if self.double_density { 43 } else { 30 };
            self.sleep(State::ReadSectorFindDam, drive.time_to_next_byte(), sched);
        } else {
            self.wp_error = false;
            if drive.is_write_protected() {
                self.wp_error = true;
                self.finish(sched);
                return;
            }
            // DRQ immediately; the CPU gets a two-byte grace to service it.
            self.drq = true;
            self.delay_count = 2;
            self.sleep(State::WriteSectorDelay, drive.time_to_next_byte(), sched);
        }
    }

    /// Scan gap bytes for the data address mark (0xFB) or deleted mark
    /// (0xF8). An exhausted window re-enters the ID search.
    fn read_sector_find_dam(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        let byte = drive.read();
        if byte == 0xFB || byte == 0xF8 {
            self.record_deleted = byte == 0xF8;
            self.crc = self.id_preset().update(byte);
            self.sleep(State::ReadSectorByte, drive.time_to_next_byte(), sched);
            return;
        }
        self.delay_count -= 1;
        if self.delay_count == 0 {
            self.sleep(State::Type2ScanIdam, drive.time_to_next_idam(), sched);
        } else {
            self.sleep(State::ReadSectorFindDam, drive.time_to_next_byte(), sched);
        }
    }

    /// Transfer one sector byte to the data register, flagging an overrun
    /// if the previous byte was never collected.
    fn read_sector_byte(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        let byte = drive.read();
        self.crc = self.crc.update(byte);
        if self.drq {
            self.lost_data = true;
        }
        self.data_register = byte;
        self.drq = true;
        self.bytes_remaining -= 1;
        if self.bytes_remaining == 0 {
            self.delay_count = 2;
            self.sleep(State::ReadSectorCrc, drive.time_to_next_byte(), sched);
        } else {
            self.sleep(State::ReadSectorByte, drive.time_to_next_byte(), sched);
        }
    }

    /// Fold the two recorded CRC bytes; a non-zero result is a data CRC
    /// error. Multiple-sector reads then advance the sector register and
    /// re-enter the search.
    fn read_sector_crc(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) -> bool {
        let byte = drive.read();
        self.crc = self.crc.update(byte);
        self.delay_count -= 1;
        if self.delay_count > 0 {
            self.sleep(State::ReadSectorCrc, drive.time_to_next_byte(), sched);
            return false;
        }
        if self.crc.value() != 0 {
            self.crc_error = true;
            self.finish(sched);
            return false;
        }
        if self.command_register & 0x10 != 0 {
            self.sector_register = self.sector_register.wrapping_add(1);
            self.state = State::Type2ScanLatch;
            return true;
        }
        self.finish(sched);
        false
    }

    /// Two-byte grace after raising DRQ for a write; an unserviced DRQ is
    /// lost data and aborts the write before the media is touched.
    fn write_sector_delay(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        drive.skip();
        self.delay_count -= 1;
        if self.delay_count > 0 {
            self.sleep(State::WriteSectorDelay, drive.time_to_next_byte(), sched);
            return;
        }
        if self.drq {
            self.lost_data = true;
            self.finish(sched);
            return;
        }
        // Let the rest of gap 2 pass before the write gate opens: 22 byte
        // cells total in double density, 11 in single.
        self.delay_count = if self.double_density { 20 } else { 9 };
        self.sleep(State::WriteSectorGap, drive.time_to_next_byte(), sched);
    }

    fn write_sector_gap(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        drive.skip();
        self.delay_count -= 1;
        let next = if self.delay_count == 0 {
            // Lead-in: zeros, then (in double density) the A1 sync run.
            self.delay_count = if self.double_density { 12 } else { 6 };
            State::WriteSectorLead
        } else {
            State::WriteSectorGap
        };
        self.sleep(next, drive.time_to_next_byte(), sched);
    }

    /// Write the lead-in zeros, sync bytes and the data address mark.
    fn write_sector_lead(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        if self.delay_count > 0 {
            drive.write(0x00);
            self.delay_count -= 1;
            self.sleep(State::WriteSectorLead, drive.time_to_next_byte(), sched);
            return;
        }
        // Mark byte: 0xF8 (deleted) when commanded, else 0xFB. The sync
        // bytes are folded into the CRC by the preset.
        let mark = if self.command_register & 0x01 != 0 {
            0xF8
        } else {
            0xFB
        };
        if self.double_density {
            for _ in 0..3 {
                drive.write(0xA1);
            }
        }
        self.crc = self.id_preset().update(mark);
        drive.write(mark);
        self.sleep(State::WriteSectorByte, drive.time_to_next_byte(), sched);
    }

    /// Write one data byte from the data register; an unserviced DRQ writes
    /// a zero in its place and flags lost data.
    fn write_sector_byte(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        let byte = if self.drq {
            self.lost_data = true;
            0x00
        } else {
            self.data_register
        };
        drive.write(byte);
        self.crc = self.crc.update(byte);
        self.bytes_remaining -= 1;
        if self.bytes_remaining == 0 {
            self.drq = false;
            self.delay_count = 0;
            self.sleep(State::WriteSectorTrail, drive.time_to_next_byte(), sched);
        } else {
            self.drq = true;
            self.sleep(State::WriteSectorByte, drive.time_to_next_byte(), sched);
        }
    }

    /// Append the CRC and a trailing gap byte, then complete or loop for
    /// multiple-sector writes.
    fn write_sector_trail(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) -> bool {
        match self.delay_count {
            0 => {
                let crc = self.crc.value();
                drive.write((crc >> 8) as u8);
                self.delay_count = 1;
                self.sleep(State::WriteSectorTrail, drive.time_to_next_byte(), sched);
                false
            }
            1 => {
                let crc = self.crc.value();
                drive.write(crc as u8);
                self.delay_count = 2;
                self.sleep(State::WriteSectorTrail, drive.time_to_next_byte(), sched);
                false
            }
            _ => {
                drive.write(0xFF);
                if self.command_register & 0x10 != 0 {
                    self.sector_register = self.sector_register.wrapping_add(1);
                    self.state = State::Type2ScanLatch;
                    return true;
                }
                self.finish(sched);
                false
            }
        }
    }

    // -- type 3: read address / read track / write track ---------------------

    fn read_address_idam(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        if self.scan_expired(drive, SEARCH_INDEX_LIMIT) {
            self.rnf_error = true;
            self.finish(sched);
            return;
        }
        if !drive.next_idam() {
            self.sleep(State::ReadAddressIdam, drive.time_to_next_idam(), sched);
            return;
        }
        self.crc = self.id_preset().update(0xFE);
        self.id_index = 0;
        self.read_address_byte(drive, sched);
    }

    /// Stream the six ID bytes through the data register, one DRQ each.
    /// The hardware copies the ID track byte into the sector register.
    fn read_address_byte(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        let byte = drive.read();
        self.crc = self.crc.update(byte);
        self.id_field[usize::from(self.id_index)] = byte;
        if self.drq {
            self.lost_data = true;
        }
        self.data_register = byte;
        self.drq = true;
        self.id_index += 1;
        if self.id_index < 6 {
            self.sleep(State::ReadAddressByte, drive.time_to_next_byte(), sched);
            return;
        }
        if self.crc.value() != 0 {
            self.crc_error = true;
        }
        self.sector_register = self.id_field[0];
        self.finish(sched);
    }

    /// Read track: wait for the index hole, then stream raw bytes until it
    /// comes around again.
    fn read_track_wait_index(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        if self.scan_expired(drive, 1) {
            self.index_start = drive.index_pulses();
            self.sleep(State::ReadTrackByte, drive.time_to_next_byte(), sched);
            return;
        }
        drive.skip();
        self.sleep(State::ReadTrackWaitIndex, drive.time_to_next_byte(), sched);
    }

    fn read_track_byte(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        if self.scan_expired(drive, 1) {
            self.finish(sched);
            return;
        }
        let byte = drive.read();
        if self.drq {
            self.lost_data = true;
        }
        self.data_register = byte;
        self.drq = true;
        self.sleep(State::ReadTrackByte, drive.time_to_next_byte(), sched);
    }

    /// Write track: gate on write protect, demand the first byte up front,
    /// then format from index hole to index hole.
    fn write_track_check(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        if self.delay_count == 3 {
            if drive.is_write_protected() {
                self.wp_error = true;
                self.finish(sched);
                return;
            }
            self.drq = true;
        }
        self.delay_count -= 1;
        if self.delay_count == 0 {
            if self.drq {
                self.lost_data = true;
                self.finish(sched);
                return;
            }
            self.index_start = drive.index_pulses();
            self.state = State::WriteTrackWaitIndex;
            self.write_track_wait_index(drive, sched);
            return;
        }
        self.sleep(State::WriteTrackCheck, drive.time_to_next_byte(), sched);
    }

    fn write_track_wait_index(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        if self.scan_expired(drive, 1) {
            self.index_start = drive.index_pulses();
            self.state = State::WriteTrackByte;
            self.write_track_byte(drive, sched);
            return;
        }
        drive.skip();
        self.sleep(State::WriteTrackWaitIndex, drive.time_to_next_byte(), sched);
    }

    /// Format one byte. Control bytes expand per density: in double density
    /// 0xF5 writes an A1 sync byte and presets the CRC, 0xF6 writes C2, and
    /// 0xF7 emits the two accumulated CRC bytes; single density presets the
    /// CRC at each address mark (0xF8-0xFE) and expands only 0xF7.
    fn write_track_byte(&mut self, drive: &mut dyn Drive, sched: &mut dyn FdcScheduler) {
        if self.scan_expired(drive, 1) {
            self.drq = false;
            self.finish(sched);
            return;
        }
        let byte = if self.drq {
            self.lost_data = true;
            0x00
        } else {
            self.data_register
        };
        match (self.double_density, byte) {
            (_, 0xF7) => {
                let crc = self.crc.value();
                drive.write((crc >> 8) as u8);
                drive.write(crc as u8);
            }
            (true, 0xF5) => {
                drive.write(0xA1);
                self.crc = Crc16::PRESET.update_block(&[0xA1, 0xA1, 0xA1]);
            }
            (true, 0xF6) => {
                drive.write(0xC2);
            }
            (false, 0xF8..=0xFE) => {
                self.crc = Crc16::PRESET.update(byte);
                if byte == 0xFE {
                    drive.write_idam();
                } else {
                    drive.write(byte);
                }
            }
            (true, 0xFE) => {
                self.crc = self.crc.update(byte);
                drive.write_idam();
            }
            _ => {
                self.crc = self.crc.update(byte);
                drive.write(byte);
            }
        }
        self.drq = true;
        self.sleep(State::WriteTrackByte, drive.time_to_next_byte(), sched);
    }

    // -- type 3 entry (dispatched from type2_begin) --------------------------

    /// Types 2 and 3 share the E-flag delay; route to the right scan state
    /// afterwards.
    fn type2_or_3_target(&self) -> State {
        match self.command_register >> 4 {
            0x8 | 0x9 | 0xA | 0xB => State::Type2ScanLatch,
            0xC => State::ReadAddressLatch,
            0xE => State::ReadTrackWaitIndex,
            _ => State::WriteTrackCheck, // 0xF
        }
    }

    // -- snapshot ------------------------------------------------------------

    #[must_use]
    pub fn snapshot(&self) -> Wd279xState {
        Wd279xState {
            state: self.state,
            command: self.command_register,
            track: self.track_register,
            sector: self.sector_register,
            data: self.data_register,
            direction_in: self.direction == StepDirection::Inward,
            side: self.side,
            double_density: self.double_density,
            status_type1: self.status_type1,
            busy: self.busy,
            drq: self.drq,
            intrq: self.intrq,
            lost_data: self.lost_data,
            crc_error: self.crc_error,
            rnf_error: self.rnf_error,
            record_deleted: self.record_deleted,
            wp_error: self.wp_error,
            head_loaded: self.head_loaded,
            index_start: self.index_start,
            bytes_remaining: self.bytes_remaining,
            delay_count: self.delay_count,
            crc: self.crc.value(),
            id_field: self.id_field,
            id_index: self.id_index,
        }
    }

    /// Restore from a snapshot. The owner re-schedules the pending phase
    /// event (if the snapshot's queue held one) and passes the new id.
    pub fn restore(&mut self, s: &Wd279xState, pending: Option<EventId>) {
        self.state = s.state;
        self.command_register = s.command;
        self.track_register = s.track;
        self.sector_register = s.sector;
        self.data_register = s.data;
        self.direction = if s.direction_in {
            StepDirection::Inward
        } else {
            StepDirection::Outward
        };
        self.side = s.side;
        self.double_density = s.double_density;
        self.status_type1 = s.status_type1;
        self.busy = s.busy;
        self.drq = s.drq;
        self.intrq = s.intrq;
        self.lost_data = s.lost_data;
        self.crc_error = s.crc_error;
        self.rnf_error = s.rnf_error;
        self.record_deleted = s.record_deleted;
        self.wp_error = s.wp_error;
        self.head_loaded = s.head_loaded;
        self.index_start = s.index_start;
        self.bytes_remaining = s.bytes_remaining;
        self.delay_count = s.delay_count;
        self.crc = Crc16::new(s.crc);
        self.id_field = s.id_field;
        self.id_index = s.id_index;
        self.pending = pending;
    }
}
