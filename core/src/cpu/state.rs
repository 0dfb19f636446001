//! CPU state snapshot types and traits

/// Trait for CPU types that can provide state snapshots
pub trait CpuStateTrait {
    type Snapshot;
    fn snapshot(&self) -> Self::Snapshot;
}

/// Stable wait condition a snapshot can land on. Snapshots are taken at
/// instruction boundaries, where the only in-flight conditions are the
/// wait states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitState {
    #[default]
    None,
    /// SYNC: stopped until any interrupt line is asserted.
    Sync,
    /// CWAI: registers already stacked, waiting for an enabled interrupt.
    Cwai,
}

/// MC6809 / HD6309 CPU state snapshot. The 6309-only registers are
/// meaningful only when the CPU runs as the enhanced variant; a base-variant
/// snapshot carries them as zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Mc6809State {
    pub a: u8,   // Accumulator A
    pub b: u8,   // Accumulator B
    pub e: u8,   // Accumulator E (6309)
    pub f: u8,   // Accumulator F (6309)
    pub dp: u8,  // Direct Page register
    pub x: u16,  // Index register X
    pub y: u16,  // Index register Y
    pub u: u16,  // User stack pointer
    pub s: u16,  // Hardware stack pointer
    pub pc: u16, // Program counter
    pub v: u16,  // Inter-register transfer value (6309)
    pub cc: u8,  // Condition codes
    pub md: u8,  // Mode register (6309)

    pub wait: WaitState,
    pub nmi_armed: bool,
    pub nmi_latched: bool,
}
