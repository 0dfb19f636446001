//! Dragon 64: the same MC6809 + MC6883 SAM core as the CoCo, wired the
//! Dragon Data way. One 16K BASIC ROM fills 0x8000-0xBFFF, with a second
//! 16K image selectable in place of it (the 64's ROMSEL line), and the
//! DragonDOS cartridge puts the WD2797 at the bottom of the cartridge
//! window with its control latch at 0xFF48.
//!
//! Unlike the RS-DOS card there is no HALT latch: DragonDOS raises NMI on
//! command completion (gated by a control-register bit) and presents DRQ
//! on the cartridge interrupt line, so sector loops are interrupt-driven
//! or polled.

use ember_core::core::machine::{Machine, StopReason};
use ember_core::core::{Bus, BusMaster, BusMasterComponent, EventQueue, InterruptState, Ticks};
use ember_core::cpu::{Cpu, CpuStateTrait, Mc6809, Mc6809State, Variant};
use ember_core::device::sam::{Region, Sam, SamState};
use ember_core::device::wd279x::{ChipType, Wd279x, Wd279xState};

use crate::coco::{MachineEvent, QueueSched, rom_byte};
use crate::disk::{VirtualDisk, VirtualDrive};
use crate::registry::MachineEntry;
use crate::rom_loader::{RomEntry, RomLoadError, RomRegion, RomSet};

const RAM_BYTES: usize = 0x10000;

/// DragonDOS control register bits (0xFF48).
const DOS_DRIVE_MASK: u8 = 0x03;
const DOS_MOTOR: u8 = 0x04;
const DOS_SINGLE_DENSITY: u8 = 0x08;
const DOS_NMI_ENABLE: u8 = 0x20;

static DRAGON64_BASIC: RomRegion = RomRegion {
    size: 0x4000,
    entries: &[RomEntry {
        name: "d64_1.rom",
        size: 0x4000,
        offset: 0,
        crc32: Some(0x84F6_8BF9),
    }],
};

static DRAGON64_ALT: RomRegion = RomRegion {
    size: 0x4000,
    entries: &[RomEntry {
        name: "d64_2.rom",
        size: 0x4000,
        offset: 0,
        crc32: Some(0x1789_3A66),
    }],
};

// Several compatible DOS cartridges circulate (DragonDOS, SuperDOS,
// Cumana); accept any correctly sized dump.
static DRAGONDOS: RomRegion = RomRegion {
    size: 0x2000,
    entries: &[RomEntry {
        name: "dragondos.rom",
        size: 0x2000,
        offset: 0,
        crc32: None,
    }],
};

/// The DragonDOS cartridge: WD2797, four drive bays and the control latch.
struct DosController {
    fdc: Wd279x,
    drives: [VirtualDrive; 4],
    selected: usize,
    control: u8,
    nmi_enable: bool,
}

impl DosController {
    fn new() -> Self {
        Self {
            fdc: Wd279x::new(ChipType::Wd2797),
            drives: std::array::from_fn(|_| VirtualDrive::new()),
            selected: 0,
            control: 0,
            nmi_enable: false,
        }
    }
}

pub struct Dragon64Machine {
    cpu: Mc6809,
    sam: Sam,
    ram: Vec<u8>,
    basic_rom: Vec<u8>,
    alt_rom: Vec<u8>,
    /// ROMSEL line level: true maps the second 16K image.
    rom_select: bool,
    cart_rom: Vec<u8>,
    disk: Option<DosController>,

    events: EventQueue<MachineEvent>,
    now: Ticks,

    at_boundary: bool,
    stop_requested: bool,
}

/// Whole-machine state at an instruction boundary, event times as deltas.
#[derive(Clone)]
pub struct Dragon64Snapshot {
    pub cpu: Mc6809State,
    pub sam: SamState,
    pub ram: Vec<u8>,
    pub rom_select: bool,
    pub disk: Option<DosSnapshot>,
    pub events: Vec<(u64, MachineEvent)>,
}

#[derive(Clone)]
pub struct DosSnapshot {
    pub fdc: Wd279xState,
    pub control: u8,
    pub nmi_enable: bool,
    pub selected: usize,
    drives: [VirtualDrive; 4],
}

impl Dragon64Machine {
    /// Build a machine from raw firmware images. `basic_rom` and `alt_rom`
    /// are the two 16K images behind the ROMSEL line; `cart_rom` fills the
    /// cartridge window. ROM lengths must be powers of two; short images
    /// mirror.
    #[must_use]
    pub fn new(basic_rom: Vec<u8>, alt_rom: Vec<u8>, cart_rom: Vec<u8>, with_dos: bool) -> Self {
        Self {
            cpu: Mc6809::new(Variant::Mc6809),
            sam: Sam::new(),
            ram: vec![0; RAM_BYTES],
            basic_rom,
            alt_rom,
            rom_select: false,
            cart_rom,
            disk: with_dos.then(DosController::new),
            events: EventQueue::new(),
            now: Ticks::ZERO,
            at_boundary: true,
            stop_requested: false,
        }
    }

    /// Factory for the registry: cassette-only Dragon 64.
    pub fn dragon64(roms: &RomSet) -> Result<Box<dyn Machine>, RomLoadError> {
        let basic = DRAGON64_BASIC.load(roms)?;
        let alt = DRAGON64_ALT.load(roms)?;
        Ok(Box::new(Self::new(basic, alt, Vec::new(), false)))
    }

    /// Factory for the registry: Dragon 64 with the DragonDOS cartridge.
    pub fn dragon64_dos(roms: &RomSet) -> Result<Box<dyn Machine>, RomLoadError> {
        let basic = DRAGON64_BASIC.load(roms)?;
        let alt = DRAGON64_ALT.load(roms)?;
        let cart = DRAGONDOS.load(roms)?;
        Ok(Box::new(Self::new(basic, alt, cart, true)))
    }

    #[must_use]
    pub fn now(&self) -> Ticks {
        self.now
    }

    #[must_use]
    pub fn cpu(&self) -> &Mc6809 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Mc6809 {
        &mut self.cpu
    }

    #[must_use]
    pub fn sam(&self) -> &Sam {
        &self.sam
    }

    /// Drive the ROMSEL line. On hardware this is a PIA output bit; the
    /// PIAs are unpopulated here, so the line is exposed directly.
    pub fn select_rom(&mut self, alt: bool) {
        self.rom_select = alt;
    }

    /// Insert media into a drive bay. Returns false if the machine has no
    /// DOS cartridge or the bay index is out of range.
    pub fn insert_disk(&mut self, bay: usize, disk: VirtualDisk) -> bool {
        match self.disk.as_mut().and_then(|c| c.drives.get_mut(bay)) {
            Some(drive) => {
                drive.insert_disk(disk);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn drive(&self, bay: usize) -> Option<&VirtualDrive> {
        self.disk.as_ref().and_then(|c| c.drives.get(bay))
    }

    pub fn drive_mut(&mut self, bay: usize) -> Option<&mut VirtualDrive> {
        self.disk.as_mut().and_then(|c| c.drives.get_mut(bay))
    }

    #[must_use]
    pub fn fdc(&self) -> Option<&Wd279x> {
        self.disk.as_ref().map(|c| &c.fdc)
    }

    /// Debugger read: full address decode, no bus time charged.
    pub fn peek(&mut self, addr: u16) -> u8 {
        self.mem_read(addr)
    }

    /// Debugger write: full address decode, no bus time charged.
    pub fn poke(&mut self, addr: u16, data: u8) {
        self.mem_write(addr, data);
    }

    #[must_use]
    pub fn snapshot(&self) -> Dragon64Snapshot {
        debug_assert!(self.at_boundary);
        Dragon64Snapshot {
            cpu: self.cpu.snapshot(),
            sam: self.sam.snapshot(),
            ram: self.ram.clone(),
            rom_select: self.rom_select,
            disk: self.disk.as_ref().map(|c| DosSnapshot {
                fdc: c.fdc.snapshot(),
                control: c.control,
                nmi_enable: c.nmi_enable,
                selected: c.selected,
                drives: c.drives.clone(),
            }),
            events: self.events.pending_deltas(self.now),
        }
    }

    pub fn restore(&mut self, snap: &Dragon64Snapshot) {
        self.cpu.restore(&snap.cpu);
        self.sam.restore(&snap.sam);
        self.ram.clone_from(&snap.ram);
        self.rom_select = snap.rom_select;
        self.events.clear();
        let mut fdc_pending = None;
        for &(delta, event) in &snap.events {
            let id = self.events.schedule(self.now + Ticks::new(delta), event);
            if event == MachineEvent::FdcPhase {
                fdc_pending = Some(id);
            }
        }
        if let (Some(ctrl), Some(s)) = (self.disk.as_mut(), snap.disk.as_ref()) {
            ctrl.fdc.restore(&s.fdc, fdc_pending);
            ctrl.control = s.control;
            ctrl.nmi_enable = s.nmi_enable;
            ctrl.selected = s.selected;
            ctrl.drives = s.drives.clone();
        }
        self.at_boundary = true;
    }

    // -- clocking -------------------------------------------------------------

    fn dispatch_events(&mut self) {
        while let Some((at, event)) = self.events.pop_due(self.now) {
            match event {
                MachineEvent::FdcPhase => self.fdc_event(at),
            }
        }
    }

    fn fdc_event(&mut self, at: Ticks) {
        let Some(ctrl) = self.disk.as_mut() else {
            return;
        };
        let mut sched = QueueSched {
            events: &mut self.events,
            now: at,
        };
        let DosController {
            fdc,
            drives,
            selected,
            ..
        } = ctrl;
        fdc.fired(&mut drives[*selected], &mut sched);
    }

    fn cpu_cycle(&mut self) -> bool {
        let bus_ptr: *mut Self = self;
        unsafe {
            let bus = &mut *bus_ptr as &mut dyn Bus<Address = u16, Data = u8>;
            self.cpu.tick_with_bus(bus, BusMaster::Cpu(0))
        }
    }

    // -- address decode -------------------------------------------------------

    fn mem_read(&mut self, addr: u16) -> u8 {
        match self.sam.decode(addr) {
            Region::Ram => {
                let p = self.sam.ram_address(addr);
                self.ram.get(p).copied().unwrap_or(0xFF)
            }
            // One 16K image spans both ROM windows and the vector mirror.
            Region::Rom0 | Region::Rom1 | Region::VectorRom => {
                let rom = if self.rom_select {
                    &self.alt_rom
                } else {
                    &self.basic_rom
                };
                rom_byte(rom, addr)
            }
            Region::CartRom => rom_byte(&self.cart_rom, addr),
            Region::CartIo => self.dos_io_read(addr),
            // PIA windows are unpopulated here; reads float high.
            Region::Io0 | Region::Io1 | Region::Reserved | Region::SamRegister => 0xFF,
        }
    }

    fn mem_write(&mut self, addr: u16, data: u8) {
        match self.sam.decode(addr) {
            Region::Ram => {
                let p = self.sam.ram_address(addr);
                if let Some(b) = self.ram.get_mut(p) {
                    *b = data;
                }
            }
            Region::SamRegister => self.sam.write_register(addr),
            Region::CartIo => self.dos_io_write(addr, data),
            _ => {}
        }
    }

    fn dos_io_read(&mut self, addr: u16) -> u8 {
        let Some(ctrl) = self.disk.as_mut() else {
            return 0xFF;
        };
        match addr & 0x0F {
            0x00..=0x03 => {
                let DosController {
                    fdc,
                    drives,
                    selected,
                    ..
                } = ctrl;
                fdc.read((addr & 3) as u8, &mut drives[*selected])
            }
            // The control latch is write-only.
            _ => 0xFF,
        }
    }

    fn dos_io_write(&mut self, addr: u16, data: u8) {
        match addr & 0x0F {
            0x00..=0x03 => {
                let Some(ctrl) = self.disk.as_mut() else {
                    return;
                };
                let mut sched = QueueSched {
                    events: &mut self.events,
                    now: self.now,
                };
                let DosController {
                    fdc,
                    drives,
                    selected,
                    ..
                } = ctrl;
                fdc.write((addr & 3) as u8, data, &mut drives[*selected], &mut sched);
            }
            0x08..=0x0F => self.write_control(data),
            _ => {}
        }
    }

    /// DOS control latch: binary drive select, motor, density and the NMI
    /// enable gate.
    fn write_control(&mut self, data: u8) {
        let Some(ctrl) = self.disk.as_mut() else {
            return;
        };
        ctrl.control = data;
        ctrl.selected = usize::from(data & DOS_DRIVE_MASK);
        ctrl.nmi_enable = data & DOS_NMI_ENABLE != 0;
        let motor = data & DOS_MOTOR != 0;
        for drive in &mut ctrl.drives {
            drive.set_motor(motor);
        }
        let DosController {
            fdc,
            drives,
            selected,
            ..
        } = ctrl;
        fdc.set_density(data & DOS_SINGLE_DENSITY == 0, &mut drives[*selected]);
    }
}

impl Bus for Dragon64Machine {
    type Address = u16;
    type Data = u8;

    fn read(&mut self, master: BusMaster, addr: u16) -> u8 {
        match master {
            BusMaster::Video => {
                let v = self.sam.vdg_fetch();
                self.ram.get(usize::from(v)).copied().unwrap_or(0xFF)
            }
            BusMaster::Cpu(_) => {
                self.now += self.sam.cycle_cost(addr);
                self.mem_read(addr)
            }
        }
    }

    fn write(&mut self, master: BusMaster, addr: u16, data: u8) {
        if let BusMaster::Cpu(_) = master {
            self.now += self.sam.cycle_cost(addr);
        }
        self.mem_write(addr, data);
    }

    fn internal_cycle(&mut self, _master: BusMaster) {
        self.now += self.sam.cycle_cost(0xFFFF);
    }

    fn is_halted_for(&self, _master: BusMaster) -> bool {
        // No HALT latch on the DragonDOS cartridge.
        false
    }

    fn check_interrupts(&self, target: BusMaster) -> InterruptState {
        let mut ints = InterruptState::default();
        if let BusMaster::Cpu(_) = target {
            if let Some(ctrl) = self.disk.as_ref() {
                ints.nmi = ctrl.nmi_enable && ctrl.fdc.intrq();
                // DRQ rides the cartridge line into FIRQ.
                ints.firq = ctrl.fdc.drq();
            }
        }
        ints
    }
}

impl Machine for Dragon64Machine {
    fn run(&mut self, budget: u64) -> StopReason {
        let target = self.now + Ticks::new(budget);
        while self.now < target {
            if self.stop_requested {
                self.stop_requested = false;
                return StopReason::Halted;
            }
            self.dispatch_events();
            self.at_boundary = self.cpu_cycle();
        }
        StopReason::BudgetSpent
    }

    fn step(&mut self) -> StopReason {
        loop {
            if self.stop_requested {
                self.stop_requested = false;
                return StopReason::Halted;
            }
            self.dispatch_events();
            self.at_boundary = self.cpu_cycle();
            if self.at_boundary {
                return StopReason::Stepped;
            }
        }
    }

    fn reset(&mut self) {
        self.events.clear();
        self.sam.reset();
        self.rom_select = false;
        if let Some(ctrl) = self.disk.as_mut() {
            ctrl.fdc.reset();
            ctrl.control = 0;
            ctrl.selected = 0;
            ctrl.nmi_enable = false;
            for drive in &mut ctrl.drives {
                drive.set_motor(false);
            }
        }
        Cpu::reset(&mut self.cpu);
        self.at_boundary = true;
    }

    fn stop(&mut self) {
        self.stop_requested = true;
    }
}

inventory::submit! {
    MachineEntry::new("dragon64", "dragon64", Dragon64Machine::dragon64)
}

inventory::submit! {
    MachineEntry::new("dragon64-dos", "dragon64", Dragon64Machine::dragon64_dos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::SECTOR_BYTES;

    /// 16K ROM with a program at the reset target and an NMI handler that
    /// drops a marker byte. Vectors sit in the image top, which the SAM
    /// mirrors at 0xFFE0.
    fn rom_with_program(program: &[u8]) -> Vec<u8> {
        let mut rom = vec![0x12; 0x4000]; // NOP filler
        rom[..program.len()].copy_from_slice(program);
        // NMI handler at 0x8100: LDA #$42 / STA $0410 / RTI.
        rom[0x0100..0x0106].copy_from_slice(&[0x86, 0x42, 0xB7, 0x04, 0x10, 0x3B]);
        // Reset vector -> 0x8000, NMI vector -> 0x8100.
        rom[0x3FFE] = 0x80;
        rom[0x3FFF] = 0x00;
        rom[0x3FFC] = 0x81;
        rom[0x3FFD] = 0x00;
        rom
    }

    /// Machine with a DOS cartridge, formatted media in bay 0 and the CPU
    /// parked on a spin loop with its stack (and NMI arming) set up.
    fn dos_machine() -> Dragon64Machine {
        let rom = rom_with_program(&[
            0x10, 0xCE, 0x70, 0x00, // LDS #$7000
            0x20, 0xFE, // BRA *
        ]);
        let mut m = Dragon64Machine::new(rom, vec![0x12; 0x4000], Vec::new(), true);
        m.insert_disk(0, VirtualDisk::formatted(35, 1));
        m.step(); // reset sequence
        m.step(); // LDS
        m
    }

    #[test]
    fn reset_vector_starts_execution_in_rom() {
        let rom = rom_with_program(&[
            0x86, 0x55, // LDA #$55
            0xB7, 0x04, 0x00, // STA $0400
            0x20, 0xFE, // BRA *
        ]);
        let mut m = Dragon64Machine::new(rom, vec![0x12; 0x4000], Vec::new(), false);
        assert_eq!(m.step(), StopReason::Stepped); // reset sequence
        assert_eq!(m.cpu().pc, 0x8000);
        m.step(); // LDA
        m.step(); // STA
        assert_eq!(m.peek(0x0400), 0x55);
    }

    #[test]
    fn romsel_swaps_the_basic_window() {
        let basic = rom_with_program(&[0x20, 0xFE]);
        let mut m = Dragon64Machine::new(basic, vec![0x39; 0x4000], Vec::new(), false);
        assert_eq!(m.peek(0x8000), 0x20);
        assert_eq!(m.peek(0xBFFF), 0x00, "reset vector low byte at image top");
        m.select_rom(true);
        assert_eq!(m.peek(0x8000), 0x39);
        assert_eq!(m.peek(0xA123), 0x39, "both 8K windows map the same image");
        m.reset();
        assert_eq!(m.peek(0x8000), 0x20, "reset drops ROMSEL");
    }

    #[test]
    fn control_latch_selects_drive_and_motor() {
        let mut m = dos_machine();
        m.insert_disk(2, VirtualDisk::formatted(35, 1));
        m.poke(0xFF48, 0x02 | DOS_MOTOR);
        let ctrl = m.disk.as_ref().unwrap();
        assert_eq!(ctrl.selected, 2);
        // Status at the window base: selected drive ready, NOT READY clear.
        assert_eq!(m.peek(0xFF40) & 0x80, 0);
        // Empty bay 1 selected: not ready.
        m.poke(0xFF48, 0x01 | DOS_MOTOR);
        assert_eq!(m.peek(0xFF40) & 0x80, 0x80);
    }

    #[test]
    fn read_sector_by_polling() {
        let mut m = dos_machine();
        m.poke(0xFF48, DOS_MOTOR);
        m.poke(0xFF42, 0x01); // sector register
        m.poke(0xFF40, 0x88); // READ SECTOR, 256-byte length code

        let mut data = Vec::new();
        for _ in 0..100_000 {
            m.run(200);
            let status = m.peek(0xFF40);
            if status & 0x02 != 0 {
                data.push(m.peek(0xFF43));
            }
            if status & 0x01 == 0 {
                break;
            }
        }
        assert_eq!(data.len(), SECTOR_BYTES);
        assert!(data.iter().all(|&b| b == 0xFF), "format fill");
        assert_eq!(m.peek(0xFF40) & 0x5C, 0, "no error bits");
    }

    #[test]
    fn intrq_raises_nmi_when_enabled() {
        let mut m = dos_machine();
        m.poke(0xFF48, DOS_MOTOR | DOS_NMI_ENABLE);
        m.poke(0xFF40, 0x00); // RESTORE
        m.run(200_000);
        assert_eq!(m.peek(0x0410), 0x42, "NMI handler ran");
    }

    #[test]
    fn intrq_is_gated_off_without_the_enable_bit() {
        let mut m = dos_machine();
        m.poke(0xFF48, DOS_MOTOR);
        m.poke(0xFF40, 0x00); // RESTORE
        m.run(200_000);
        assert_eq!(m.peek(0x0410), 0x00);
        // The command itself still completed.
        assert!(m.fdc().unwrap().intrq());
    }

    #[test]
    fn registry_lists_dragon_models() {
        let names: Vec<_> = crate::registry::all().iter().map(|e| e.name).collect();
        assert!(names.contains(&"dragon64"));
        assert!(names.contains(&"dragon64-dos"));
    }

    #[test]
    fn snapshot_restore_resumes_a_seek_identically() {
        let mut m = dos_machine();
        m.poke(0xFF48, DOS_MOTOR);
        m.poke(0xFF43, 20); // data register: target track
        m.poke(0xFF40, 0x10); // SEEK, 6 ms steps
        m.run(100_000); // partway through the stepping
        m.step(); // settle on an instruction boundary
        assert!(m.fdc().unwrap().is_busy());
        let snap = m.snapshot();

        let rom = rom_with_program(&[
            0x10, 0xCE, 0x70, 0x00, // LDS #$7000
            0x20, 0xFE, // BRA *
        ]);
        let mut n = Dragon64Machine::new(rom, vec![0x12; 0x4000], Vec::new(), true);
        n.restore(&snap);
        for _ in 0..40 {
            m.run(50_000);
            n.run(50_000);
        }
        assert!(!m.fdc().unwrap().is_busy());
        assert_eq!(m.peek(0xFF41), 20, "track register arrived");
        assert_eq!(m.peek(0xFF41), n.peek(0xFF41));
        assert_eq!(m.cpu().snapshot(), n.cpu().snapshot());
    }
}
