use crate::core::component::BusMasterComponent;

/// Generic CPU interface
pub trait Cpu: BusMasterComponent + CpuStateTrait {
    /// Begin the hardware reset sequence (vector fetch through the
    /// interrupt-dispatch machinery).
    fn reset(&mut self);

    /// Query if the CPU is waiting internally (SYNC, CWAI).
    fn is_sleeping(&self) -> bool;
}

pub mod state;
pub use state::{CpuStateTrait, Mc6809State};

pub mod mc6809;
pub use mc6809::{CcFlag, Mc6809, Variant};
