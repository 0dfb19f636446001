pub mod coco;
pub mod disk;
pub mod dragon;
pub mod registry;
pub mod rom_loader;

pub use coco::CocoMachine;
pub use disk::{VirtualDisk, VirtualDrive};
pub use dragon::Dragon64Machine;
