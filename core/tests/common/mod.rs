use ember_core::core::{Bus, BusMaster, BusMasterComponent, bus::InterruptState};
use ember_core::cpu::{CpuStateTrait, Mc6809, Variant};

/// Minimal bus for testing: flat 64KB read/write memory, no peripherals.
pub struct TestBus {
    pub memory: [u8; 0x10000],
}

impl TestBus {
    pub fn new() -> Self {
        Self {
            memory: [0; 0x10000],
        }
    }

    pub fn load(&mut self, addr: u16, data: &[u8]) {
        let start = addr as usize;
        self.memory[start..start + data.len()].copy_from_slice(data);
    }
}

impl Bus for TestBus {
    type Address = u16;
    type Data = u8;

    fn read(&mut self, _master: BusMaster, addr: u16) -> u8 {
        self.memory[addr as usize]
    }

    fn write(&mut self, _master: BusMaster, addr: u16, data: u8) {
        self.memory[addr as usize] = data;
    }

    fn is_halted_for(&self, _master: BusMaster) -> bool {
        false
    }

    fn check_interrupts(&self, _target: BusMaster) -> InterruptState {
        InterruptState::default()
    }
}

/// CPU parked at an instruction boundary at `pc`, skipping the power-on
/// reset sequence. CC starts with both interrupt masks set, NMI unarmed.
pub fn ready(variant: Variant, pc: u16) -> Mc6809 {
    let mut cpu = Mc6809::new(variant);
    let snap = cpu.snapshot();
    cpu.restore(&snap);
    cpu.pc = pc;
    cpu
}

/// Run one instruction to completion, returning its cycle count.
pub fn run_one(cpu: &mut Mc6809, bus: &mut TestBus) -> u32 {
    let mut cycles = 0;
    loop {
        cycles += 1;
        if cpu.tick_with_bus(bus, BusMaster::Cpu(0)) {
            return cycles;
        }
    }
}
