//! Tandy Color Computer 2: MC6809 + MC6883 SAM, 64K DRAM, BASIC ROMs and
//! an optional disk controller cartridge.
//!
//! The machine owns the master clock. Every CPU bus cycle charges the
//! SAM's rate-dependent cost against `now`, and timed device work (floppy
//! controller phases) is drained from the event queue between cycles, so
//! the whole system advances on one deterministic timeline.
//!
//! The disk cartridge wires the WD2793 the way the RS-DOS card does:
//! INTRQ drives the CPU's NMI line, and a latch bit in the control
//! register holds the CPU on the HALT line until DRQ or INTRQ releases
//! it, which is how 8-bit sector loops keep up with the byte rate.

use ember_core::core::machine::{Machine, StopReason};
use ember_core::core::{
    Bus, BusMaster, BusMasterComponent, EventId, EventQueue, InterruptState, Ticks,
};
use ember_core::cpu::{Cpu, CpuStateTrait, Mc6809, Mc6809State, Variant};
use ember_core::device::sam::{Region, Sam, SamState};
use ember_core::device::wd279x::{ChipType, FdcScheduler, Wd279x, Wd279xState};

use crate::disk::{VirtualDisk, VirtualDrive};
use crate::registry::MachineEntry;
use crate::rom_loader::{RomEntry, RomLoadError, RomRegion, RomSet};

const RAM_BYTES: usize = 0x10000;

/// Control register bits of the disk cartridge (0xFF40).
const DSKREG_DRIVE1: u8 = 0x02;
const DSKREG_DRIVE2: u8 = 0x04;
const DSKREG_MOTOR: u8 = 0x08;
const DSKREG_DENSITY: u8 = 0x20;
const DSKREG_DRIVE3: u8 = 0x40;
const DSKREG_HALT: u8 = 0x80;

/// Timed-event kinds parked on the machine's queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachineEvent {
    /// Continue the floppy controller's command state machine.
    FdcPhase,
}

/// Scheduler view handed to the floppy controller: absolute time plus the
/// machine's event queue. Shared by every machine assembly that carries a
/// disk controller.
pub(crate) struct QueueSched<'a> {
    pub(crate) events: &'a mut EventQueue<MachineEvent>,
    pub(crate) now: Ticks,
}

impl FdcScheduler for QueueSched<'_> {
    fn now(&self) -> Ticks {
        self.now
    }

    fn schedule_in(&mut self, delta: Ticks) -> EventId {
        self.events.schedule(self.now + delta, MachineEvent::FdcPhase)
    }

    fn cancel(&mut self, id: EventId) {
        self.events.cancel(id);
    }
}

/// The disk controller cartridge: WD2793, four drive bays and the control
/// register latches.
struct DiskController {
    fdc: Wd279x,
    drives: [VirtualDrive; 4],
    selected: usize,
    dskreg: u8,
    /// Asserted by the control register; dropped when INTRQ fires so the
    /// NMI handler can run.
    halt_enable: bool,
}

impl DiskController {
    fn new() -> Self {
        Self {
            fdc: Wd279x::new(ChipType::Wd2793),
            drives: std::array::from_fn(|_| VirtualDrive::new()),
            selected: 0,
            dskreg: 0,
            halt_enable: false,
        }
    }
}

pub struct CocoMachine {
    cpu: Mc6809,
    sam: Sam,
    ram: Vec<u8>,
    rom0: Vec<u8>,
    rom1: Vec<u8>,
    cart_rom: Vec<u8>,
    disk: Option<DiskController>,

    events: EventQueue<MachineEvent>,
    now: Ticks,

    /// True when the CPU last stopped at an instruction boundary; the HALT
    /// line is only honored there.
    at_boundary: bool,
    stop_requested: bool,
    breakpoints: Vec<u16>,
}

/// Whole-machine state at an instruction boundary. Event times are stored
/// as deltas so a restored machine replays identically from any origin.
#[derive(Clone)]
pub struct CocoSnapshot {
    pub cpu: Mc6809State,
    pub sam: SamState,
    pub ram: Vec<u8>,
    pub disk: Option<DiskSnapshot>,
    pub events: Vec<(u64, MachineEvent)>,
}

#[derive(Clone)]
pub struct DiskSnapshot {
    pub fdc: Wd279xState,
    pub dskreg: u8,
    pub halt_enable: bool,
    pub selected: usize,
    drives: [VirtualDrive; 4],
}

static COCO2_BASIC: RomRegion = RomRegion {
    size: 0x2000,
    entries: &[RomEntry {
        name: "bas13.rom",
        size: 0x2000,
        offset: 0,
        crc32: Some(0xD8F4_D15E),
    }],
};

static COCO2_EXTBAS: RomRegion = RomRegion {
    size: 0x2000,
    entries: &[RomEntry {
        name: "extbas11.rom",
        size: 0x2000,
        offset: 0,
        crc32: Some(0xA82A_6254),
    }],
};

static COCO2_DISK: RomRegion = RomRegion {
    size: 0x2000,
    entries: &[RomEntry {
        name: "disk11.rom",
        size: 0x2000,
        offset: 0,
        crc32: Some(0x0B9C_5415),
    }],
};

impl CocoMachine {
    /// Build a machine from raw firmware images. `rom0` fills the BASIC
    /// window (0x8000), `rom1` the Extended BASIC window (0xA000, also
    /// mirrored as the vector page), `cart_rom` the cartridge window.
    /// ROM lengths must be powers of two; short images mirror.
    #[must_use]
    pub fn new(rom0: Vec<u8>, rom1: Vec<u8>, cart_rom: Vec<u8>, with_disk: bool) -> Self {
        Self {
            cpu: Mc6809::new(Variant::Mc6809),
            sam: Sam::new(),
            ram: vec![0; RAM_BYTES],
            rom0,
            rom1,
            cart_rom,
            disk: with_disk.then(DiskController::new),
            events: EventQueue::new(),
            now: Ticks::ZERO,
            at_boundary: true,
            stop_requested: false,
            breakpoints: Vec::new(),
        }
    }

    /// Factory for the registry: cassette-only CoCo 2.
    pub fn coco2(roms: &RomSet) -> Result<Box<dyn Machine>, RomLoadError> {
        let rom0 = COCO2_BASIC.load(roms)?;
        let rom1 = COCO2_EXTBAS.load(roms)?;
        Ok(Box::new(Self::new(rom0, rom1, Vec::new(), false)))
    }

    /// Factory for the registry: CoCo 2 with the disk controller cartridge.
    pub fn coco2_dos(roms: &RomSet) -> Result<Box<dyn Machine>, RomLoadError> {
        let rom0 = COCO2_BASIC.load(roms)?;
        let rom1 = COCO2_EXTBAS.load(roms)?;
        let cart = COCO2_DISK.load(roms)?;
        Ok(Box::new(Self::new(rom0, rom1, cart, true)))
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

    /// Insert media into a drive bay. Returns false if the machine has no
    /// disk controller or the bay index is out of range.
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

    pub fn set_breakpoint(&mut self, addr: u16) {
        if !self.breakpoints.contains(&addr) {
            self.breakpoints.push(addr);
        }
    }

    pub fn clear_breakpoint(&mut self, addr: u16) {
        self.breakpoints.retain(|&a| a != addr);
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
    pub fn snapshot(&self) -> CocoSnapshot {
        debug_assert!(self.at_boundary);
        CocoSnapshot {
            cpu: self.cpu.snapshot(),
            sam: self.sam.snapshot(),
            ram: self.ram.clone(),
            disk: self.disk.as_ref().map(|c| DiskSnapshot {
                fdc: c.fdc.snapshot(),
                dskreg: c.dskreg,
                halt_enable: c.halt_enable,
                selected: c.selected,
                drives: c.drives.clone(),
            }),
            events: self.events.pending_deltas(self.now),
        }
    }

    pub fn restore(&mut self, snap: &CocoSnapshot) {
        self.cpu.restore(&snap.cpu);
        self.sam.restore(&snap.sam);
        self.ram.clone_from(&snap.ram);
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
            ctrl.dskreg = s.dskreg;
            ctrl.halt_enable = s.halt_enable;
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

    /// Run one pending controller phase at its exact due time, so phase
    /// chains stay byte-cell accurate regardless of CPU cycle quantization.
    fn fdc_event(&mut self, at: Ticks) {
        let Some(ctrl) = self.disk.as_mut() else {
            return;
        };
        {
            let mut sched = QueueSched {
                events: &mut self.events,
                now: at,
            };
            let DiskController {
                fdc,
                drives,
                selected,
                ..
            } = ctrl;
            fdc.fired(&mut drives[*selected], &mut sched);
        }
        if ctrl.fdc.intrq() {
            ctrl.halt_enable = false;
        }
    }

    /// HALT line level: asserted by the cartridge latch while a command is
    /// in flight and no data request is outstanding.
    fn halt_asserted(&self) -> bool {
        self.disk
            .as_ref()
            .is_some_and(|c| c.halt_enable && c.fdc.is_busy() && !c.fdc.drq())
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
            Region::Rom0 => rom_byte(&self.rom0, addr),
            Region::Rom1 | Region::VectorRom => rom_byte(&self.rom1, addr),
            Region::CartRom => rom_byte(&self.cart_rom, addr),
            Region::CartIo => self.cart_io_read(addr),
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
            Region::CartIo => self.cart_io_write(addr, data),
            _ => {}
        }
    }

    fn cart_io_read(&mut self, addr: u16) -> u8 {
        let Some(ctrl) = self.disk.as_mut() else {
            return 0xFF;
        };
        match addr & 0x0F {
            0x08..=0x0B => {
                let DiskController {
                    fdc,
                    drives,
                    selected,
                    ..
                } = ctrl;
                fdc.read((addr & 3) as u8, &mut drives[*selected])
            }
            // The control register is write-only.
            _ => 0xFF,
        }
    }

    fn cart_io_write(&mut self, addr: u16, data: u8) {
        match addr & 0x0F {
            0x00..=0x07 => self.write_control(data),
            0x08..=0x0B => {
                let Some(ctrl) = self.disk.as_mut() else {
                    return;
                };
                let mut sched = QueueSched {
                    events: &mut self.events,
                    now: self.now,
                };
                let DiskController {
                    fdc,
                    drives,
                    selected,
                    ..
                } = ctrl;
                fdc.write((addr & 3) as u8, data, &mut drives[*selected], &mut sched);
            }
            _ => {}
        }
    }

    /// Disk cartridge control register: drive select, motor, density and
    /// the HALT latch.
    fn write_control(&mut self, data: u8) {
        let Some(ctrl) = self.disk.as_mut() else {
            return;
        };
        ctrl.dskreg = data;
        ctrl.selected = if data & DSKREG_DRIVE3 != 0 {
            3
        } else if data & DSKREG_DRIVE2 != 0 {
            2
        } else if data & DSKREG_DRIVE1 != 0 {
            1
        } else {
            0
        };
        ctrl.halt_enable = data & DSKREG_HALT != 0;
        let motor = data & DSKREG_MOTOR != 0;
        for drive in &mut ctrl.drives {
            drive.set_motor(motor);
        }
        let DiskController {
            fdc,
            drives,
            selected,
            ..
        } = ctrl;
        fdc.set_density(data & DSKREG_DENSITY != 0, &mut drives[*selected]);
    }
}

pub(crate) fn rom_byte(rom: &[u8], addr: u16) -> u8 {
    if rom.is_empty() {
        0xFF
    } else {
        rom[usize::from(addr) & (rom.len() - 1)]
    }
}

impl Bus for CocoMachine {
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
        // VMA cycles drive 0xFFFF, so the address-dependent rate applies to
        // them like any other ROM-side access.
        self.now += self.sam.cycle_cost(0xFFFF);
    }

    fn is_halted_for(&self, master: BusMaster) -> bool {
        matches!(master, BusMaster::Cpu(_)) && self.halt_asserted()
    }

    fn check_interrupts(&self, target: BusMaster) -> InterruptState {
        let mut ints = InterruptState::default();
        if let BusMaster::Cpu(_) = target {
            ints.nmi = self.disk.as_ref().is_some_and(|c| c.fdc.intrq());
        }
        ints
    }
}

impl Machine for CocoMachine {
    fn run(&mut self, budget: u64) -> StopReason {
        let target = self.now + Ticks::new(budget);
        while self.now < target {
            if self.stop_requested {
                self.stop_requested = false;
                return StopReason::Halted;
            }
            self.dispatch_events();
            if self.at_boundary && self.halt_asserted() {
                // The CPU is off the bus; fast-forward to the next event.
                self.now = match self.events.next_at() {
                    Some(at) => at.min(target),
                    None => target,
                };
                continue;
            }
            self.at_boundary = self.cpu_cycle();
            if self.at_boundary && self.breakpoints.contains(&self.cpu.pc) {
                return StopReason::Breakpoint(self.cpu.pc);
            }
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
            if self.at_boundary && self.halt_asserted() {
                match self.events.next_at() {
                    Some(at) => self.now = at,
                    // Nothing will ever release the halt.
                    None => return StopReason::Halted,
                }
                continue;
            }
            self.at_boundary = self.cpu_cycle();
            if self.at_boundary {
                if self.breakpoints.contains(&self.cpu.pc) {
                    return StopReason::Breakpoint(self.cpu.pc);
                }
                return StopReason::Stepped;
            }
        }
    }

    fn reset(&mut self) {
        self.events.clear();
        self.sam.reset();
        if let Some(ctrl) = self.disk.as_mut() {
            ctrl.fdc.reset();
            ctrl.dskreg = 0;
            ctrl.selected = 0;
            ctrl.halt_enable = false;
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
    MachineEntry::new("coco2", "coco2", CocoMachine::coco2)
}

inventory::submit! {
    MachineEntry::new("coco2-dos", "coco2", CocoMachine::coco2_dos)
}
