//! Floppy drive capability interface.
//!
//! The WD279x state machine never touches media directly; it drives one of
//! these. The contract couples head motion to the controller's own timing:
//! the controller asks `time_to_next_byte` / `time_to_next_idam`, sleeps
//! that long on the event queue, then calls `read`/`write`/`next_idam`,
//! which advance the head by exactly the span it slept over. Nothing else
//! moves the head, so replay is deterministic.

use crate::core::scheduler::Ticks;

/// Head step direction. `Outward` is toward track 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepDirection {
    Outward,
    Inward,
}

pub trait Drive {
    /// Latch the direction used by subsequent `step` calls.
    fn set_direction(&mut self, dir: StepDirection);
    /// Select head 0 or 1.
    fn set_side(&mut self, side: u8);
    /// Select single (false) or double (true) density.
    fn set_density(&mut self, double: bool);
    /// Move the head one track in the latched direction. Steps outward from
    /// track 0 stay at track 0.
    fn step(&mut self);

    /// Read the byte under the head and advance one byte position.
    fn read(&mut self) -> u8;
    /// Write a byte at the head and advance one byte position.
    fn write(&mut self, data: u8);
    /// Advance one byte position without transferring data.
    fn skip(&mut self);
    /// Write an identification address mark at the head position and record
    /// it in the track's IDAM table (used when formatting).
    fn write_idam(&mut self);

    /// Ticks until the next byte cell passes under the head.
    fn time_to_next_byte(&self) -> Ticks;
    /// Ticks until the next IDAM (or the index hole, when the track has no
    /// IDAMs) passes under the head.
    fn time_to_next_idam(&self) -> Ticks;
    /// Move the head to the IDAM that `time_to_next_idam` pointed at,
    /// leaving it on the first ID byte. Returns false if the span contained
    /// no IDAM (the head is then just past the index hole).
    fn next_idam(&mut self) -> bool;

    /// Cumulative count of index-hole passes. The controller bounds its
    /// scans by differences of this count, never by wall time.
    fn index_pulses(&self) -> u32;

    fn is_ready(&self) -> bool;
    fn is_tr00(&self) -> bool;
    fn is_write_protected(&self) -> bool;
    /// Instantaneous index-hole level (true while the hole passes the
    /// sensor), used for the type-1 status INDEX bit.
    fn is_index(&self) -> bool;
}

/// Permanently empty drive slot: never ready, ignores all motion.
pub struct NullDrive;

/// One nominal revolution at 300 rpm in master-clock ticks (14.31818 MHz).
const REV_TICKS: u64 = 14_318_180 / 5;

impl Drive for NullDrive {
    fn set_direction(&mut self, _dir: StepDirection) {}
    fn set_side(&mut self, _side: u8) {}
    fn set_density(&mut self, _double: bool) {}
    fn step(&mut self) {}
    fn read(&mut self) -> u8 {
        0
    }
    fn write(&mut self, _data: u8) {}
    fn skip(&mut self) {}
    fn write_idam(&mut self) {}
    fn time_to_next_byte(&self) -> Ticks {
        Ticks::new(REV_TICKS)
    }
    fn time_to_next_idam(&self) -> Ticks {
        Ticks::new(REV_TICKS)
    }
    fn next_idam(&mut self) -> bool {
        false
    }
    fn index_pulses(&self) -> u32 {
        0
    }
    fn is_ready(&self) -> bool {
        false
    }
    fn is_tr00(&self) -> bool {
        true
    }
    fn is_write_protected(&self) -> bool {
        false
    }
    fn is_index(&self) -> bool {
        false
    }
}
