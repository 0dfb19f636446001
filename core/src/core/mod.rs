pub mod bus;
pub mod component;
pub mod machine;
pub mod scheduler;

pub use bus::{Bus, BusMaster, InterruptState};
pub use component::BusMasterComponent;
pub use machine::{Machine, StopReason};
pub use scheduler::{EventId, EventQueue, Ticks};
