pub mod crc16;
pub mod drive;
pub mod sam;
pub mod wd279x;

pub use crc16::Crc16;
pub use drive::{Drive, NullDrive, StepDirection};
pub use sam::{Region, Sam};
pub use wd279x::{ChipType, FdcScheduler, Wd279x};
