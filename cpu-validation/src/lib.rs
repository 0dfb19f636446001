//! Cycle-level CPU validation support: a tracing bus plus the JSON test
//! vector types shared by the generator binary and the single-step tests.

use ember_core::core::bus::InterruptState;
use ember_core::core::{Bus, BusMaster};
use ember_core::cpu::{Mc6809State, state::WaitState};
use serde::{Deserialize, Serialize};

// --- TracingBus: flat 64KB memory with cycle-by-cycle recording ---

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BusOp {
    Read,
    Write,
    Internal,
}

#[derive(Clone, Debug)]
pub struct BusCycle {
    pub addr: u16,
    pub data: u8,
    pub op: BusOp,
}

pub struct TracingBus {
    pub memory: [u8; 0x10000],
    pub cycles: Vec<BusCycle>,
}

impl TracingBus {
    pub fn new() -> Self {
        Self {
            memory: [0; 0x10000],
            cycles: Vec::new(),
        }
    }

    pub fn load(&mut self, addr: u16, data: &[u8]) {
        let start = addr as usize;
        self.memory[start..start + data.len()].copy_from_slice(data);
    }

    pub fn clear_cycles(&mut self) {
        self.cycles.clear();
    }
}

impl Default for TracingBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for TracingBus {
    type Address = u16;
    type Data = u8;

    fn read(&mut self, _master: BusMaster, addr: u16) -> u8 {
        let data = self.memory[addr as usize];
        self.cycles.push(BusCycle {
            addr,
            data,
            op: BusOp::Read,
        });
        data
    }

    fn write(&mut self, _master: BusMaster, addr: u16, data: u8) {
        self.memory[addr as usize] = data;
        self.cycles.push(BusCycle {
            addr,
            data,
            op: BusOp::Write,
        });
    }

    fn internal_cycle(&mut self, _master: BusMaster) {
        // VMA cycles drive 0xFFFF with nothing transferred.
        self.cycles.push(BusCycle {
            addr: 0xFFFF,
            data: 0,
            op: BusOp::Internal,
        });
    }

    fn is_halted_for(&self, _master: BusMaster) -> bool {
        false
    }

    fn check_interrupts(&self, _target: BusMaster) -> InterruptState {
        InterruptState::default()
    }
}

// --- JSON test vector types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub initial: CpuState,
    #[serde(rename = "final")]
    pub final_state: CpuState,
    pub cycles: Vec<(u16, u8, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuState {
    pub pc: u16,
    pub s: u16,
    pub u: u16,
    pub a: u8,
    pub b: u8,
    pub dp: u8,
    pub x: u16,
    pub y: u16,
    pub cc: u8,
    pub ram: Vec<(u16, u8)>,
}

impl CpuState {
    /// Turn a vector state into a boundary snapshot the CPU can restore.
    /// NMI is armed so the vectors exercise the same interrupt sampling a
    /// running system sees (the tracing bus never asserts a line).
    pub fn to_snapshot(&self) -> Mc6809State {
        Mc6809State {
            a: self.a,
            b: self.b,
            e: 0,
            f: 0,
            dp: self.dp,
            x: self.x,
            y: self.y,
            u: self.u,
            s: self.s,
            pc: self.pc,
            v: 0,
            cc: self.cc,
            md: 0,
            wait: WaitState::None,
            nmi_armed: true,
            nmi_latched: false,
        }
    }

    pub fn from_snapshot(s: &Mc6809State) -> Self {
        Self {
            pc: s.pc,
            s: s.s,
            u: s.u,
            a: s.a,
            b: s.b,
            dp: s.dp,
            x: s.x,
            y: s.y,
            cc: s.cc,
            ram: Vec::new(),
        }
    }
}
