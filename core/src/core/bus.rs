/// Identifies who is driving the bus for this access.
///
/// The SAM interleaves CPU and VDG access slots on real hardware; the
/// machine uses the master tag to route video fetches through the VDG
/// address counter instead of the CPU address decode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BusMaster {
    Cpu(usize), // CPU 0, CPU 1, etc.
    Video,      // VDG fetch through the SAM's video address counter
}

/// Generic bus interface supporting halt/arbitration (HALT, TSC, DMA).
pub trait Bus {
    type Address: Copy + Into<u64>; // u16 for 8-bit machines
    type Data; // u8

    fn read(&mut self, master: BusMaster, addr: Self::Address) -> Self::Data;
    fn write(&mut self, master: BusMaster, addr: Self::Address, data: Self::Data);

    /// A "no valid memory access" cycle: the CPU drives the address bus but
    /// transfers no data. Still consumes bus time, so machines override this
    /// to charge the cycle cost; the default is a no-op for plain test buses.
    fn internal_cycle(&mut self, _master: BusMaster) {}

    /// Check if the bus is halted for this master (HALT line, TSC).
    /// Returns true if the master must pause before the next bus cycle.
    fn is_halted_for(&self, master: BusMaster) -> bool;

    /// Current interrupt line levels as seen by this master. The CPU samples
    /// these every bus cycle and latches them internally.
    fn check_interrupts(&self, target: BusMaster) -> InterruptState;
}

#[derive(Default, Clone, Copy, Debug)]
pub struct InterruptState {
    pub nmi: bool,
    pub firq: bool,
    pub irq: bool,
}
