pub mod core;
pub mod cpu;
pub mod device;

pub mod prelude {
    pub use crate::core::machine::{Machine, StopReason};
    pub use crate::core::{
        Bus, BusMaster, BusMasterComponent, EventId, EventQueue, Ticks, bus::InterruptState,
    };
    pub use crate::cpu::Cpu;
}
