use super::bus::BusMaster;

/// A component that owns bus cycles (CPUs, DMA engines).
pub trait BusMasterComponent {
    type Bus: ?Sized;

    /// Run one bus cycle against `bus` as `master`. Returns true when the
    /// component is at an instruction boundary after this cycle.
    fn tick_with_bus(&mut self, bus: &mut Self::Bus, master: BusMaster) -> bool;
}
