//! In-memory floppy media and the drive mechanics behind it.
//!
//! A [`VirtualDisk`] stores each track as the raw byte stream the head would
//! see, plus a table of IDAM offsets, so the controller's ID search, CRC
//! checks and write-track formatting all operate on real surface data. A
//! [`VirtualDrive`] adds head position, stepper state and the index pulse
//! counter, and implements the [`Drive`] capability interface the WD279x
//! state machine runs against.

use ember_core::core::scheduler::Ticks;
use ember_core::device::crc16::Crc16;
use ember_core::device::drive::{Drive, StepDirection};

/// Bytes per track at 250 kbit/s, 300 rpm (double density).
pub const TRACK_BYTES_DD: usize = 6250;

/// Master-clock ticks per byte cell: 32 us at 14.31818 MHz.
const BYTE_TICKS_DD: u64 = 458;
/// Single density halves the data rate.
const BYTE_TICKS_SD: u64 = 916;

/// Head positions the index sensor reads as "hole present".
const INDEX_WINDOW: usize = 4;

/// The stepper will run past the last formatted cylinder; cap the carriage
/// travel like the mechanical end stop does.
const MAX_CYLINDER: u8 = 84;

pub const SECTORS_PER_TRACK: u8 = 18;
pub const SECTOR_BYTES: usize = 256;
/// ID-field length code for 256-byte sectors.
const SECTOR_SIZE_CODE: u8 = 1;

/// Gap window the controller scans for a data mark after an ID field.
const DAM_SCAN_DD: usize = 43;

#[derive(Clone)]
struct Track {
    data: Vec<u8>,
    /// Offsets of the 0xFE ID address mark bytes, ascending.
    idams: Vec<usize>,
}

impl Track {
    fn blank() -> Self {
        Self {
            data: vec![0x4E; TRACK_BYTES_DD],
            idams: Vec::new(),
        }
    }

    fn at(&self, pos: usize) -> u8 {
        self.data[pos % self.data.len()]
    }
}

/// One double-sided stack of formatted tracks.
#[derive(Clone)]
pub struct VirtualDisk {
    cylinders: u8,
    sides: u8,
    write_protected: bool,
    tracks: Vec<Track>,
}

impl VirtualDisk {
    /// Unformatted media: uniform gap bytes, no address marks anywhere.
    #[must_use]
    pub fn blank(cylinders: u8, sides: u8) -> Self {
        let count = usize::from(cylinders) * usize::from(sides);
        Self {
            cylinders,
            sides,
            write_protected: false,
            tracks: (0..count).map(|_| Track::blank()).collect(),
        }
    }

    /// Standard 18-sector, 256-byte double-density format with 0xFF data
    /// fill. The surface layout matches what WRITE TRACK produces, so the
    /// controller's gap and CRC handling sees the same geometry either way.
    #[must_use]
    pub fn formatted(cylinders: u8, sides: u8) -> Self {
        let mut disk = Self::blank(cylinders, sides);
        for cyl in 0..cylinders {
            for side in 0..sides {
                let idx = disk.track_index(cyl, side);
                disk.tracks[idx] = format_track(cyl, side);
            }
        }
        disk
    }

    /// Build a formatted disk from a flat sector dump (cylinder-major,
    /// then side, then sector 1..18). Short images leave the remaining
    /// sectors at the format fill.
    #[must_use]
    pub fn from_flat_image(data: &[u8], cylinders: u8, sides: u8) -> Self {
        let mut disk = Self::formatted(cylinders, sides);
        let mut off = 0;
        'outer: for cyl in 0..cylinders {
            for side in 0..sides {
                for sector in 1..=SECTORS_PER_TRACK {
                    if off + SECTOR_BYTES > data.len() {
                        break 'outer;
                    }
                    disk.write_sector(cyl, side, sector, &data[off..off + SECTOR_BYTES]);
                    off += SECTOR_BYTES;
                }
            }
        }
        disk
    }

    #[must_use]
    pub fn cylinders(&self) -> u8 {
        self.cylinders
    }

    #[must_use]
    pub fn sides(&self) -> u8 {
        self.sides
    }

    #[must_use]
    pub fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    pub fn set_write_protected(&mut self, wp: bool) {
        self.write_protected = wp;
    }

    fn track_index(&self, cyl: u8, side: u8) -> usize {
        usize::from(cyl) * usize::from(self.sides) + usize::from(side)
    }

    /// Locate the data field of a sector: (track index, offset of the first
    /// data byte, size). Walks the IDAM table and scans the gap for the data
    /// mark the same way the controller does.
    fn find_data(&self, cyl: u8, side: u8, sector: u8) -> Option<(usize, usize, usize)> {
        if cyl >= self.cylinders || side >= self.sides {
            return None;
        }
        let ti = self.track_index(cyl, side);
        let t = &self.tracks[ti];
        for &i in &t.idams {
            if t.at(i + 1) != cyl || t.at(i + 3) != sector {
                continue;
            }
            let size = 128usize << (t.at(i + 4) & 3);
            // ID field and CRC occupy 6 bytes after the mark.
            for j in i + 7..i + 7 + DAM_SCAN_DD {
                let b = t.at(j);
                if b == 0xFB || b == 0xF8 {
                    return Some((ti, j + 1, size));
                }
            }
        }
        None
    }

    /// Read a sector's data field directly (no controller involved).
    #[must_use]
    pub fn read_sector(&self, cyl: u8, side: u8, sector: u8) -> Option<Vec<u8>> {
        let (ti, start, size) = self.find_data(cyl, side, sector)?;
        let t = &self.tracks[ti];
        Some((0..size).map(|k| t.at(start + k)).collect())
    }

    /// Overwrite a sector's data field and recompute its CRC. Returns false
    /// if the sector does not exist on the media.
    pub fn write_sector(&mut self, cyl: u8, side: u8, sector: u8, data: &[u8]) -> bool {
        let Some((ti, start, size)) = self.find_data(cyl, side, sector) else {
            return false;
        };
        let t = &mut self.tracks[ti];
        let len = t.data.len();
        let mark = t.data[(start + len - 1) % len];
        let mut crc = Crc16::PRESET.update_block(&[0xA1, 0xA1, 0xA1, mark]);
        for k in 0..size {
            let b = data.get(k).copied().unwrap_or(0);
            t.data[(start + k) % len] = b;
            crc = crc.update(b);
        }
        let v = crc.value();
        t.data[(start + size) % len] = (v >> 8) as u8;
        t.data[(start + size + 1) % len] = v as u8;
        true
    }
}

/// Lay out one formatted track. Gap sizes follow the standard WRITE TRACK
/// stream: the ID CRC spans the A1 sync run plus the mark and ID bytes, and
/// the data mark sits 37 byte cells after the ID CRC, inside the window the
/// controller scans.
fn format_track(cyl: u8, side: u8) -> Track {
    let mut t = Track::blank();
    let mut pos = 32; // post-index gap

    let mut put = |t: &mut Track, pos: &mut usize, byte: u8, count: usize| {
        for _ in 0..count {
            t.data[*pos] = byte;
            *pos += 1;
        }
    };

    for sector in 1..=SECTORS_PER_TRACK {
        put(&mut t, &mut pos, 0x00, 12);
        put(&mut t, &mut pos, 0xA1, 3);
        t.idams.push(pos);
        put(&mut t, &mut pos, 0xFE, 1);
        let id = [cyl, side, sector, SECTOR_SIZE_CODE];
        let crc = Crc16::PRESET
            .update_block(&[0xA1, 0xA1, 0xA1, 0xFE])
            .update_block(&id)
            .value();
        for b in id {
            put(&mut t, &mut pos, b, 1);
        }
        put(&mut t, &mut pos, (crc >> 8) as u8, 1);
        put(&mut t, &mut pos, crc as u8, 1);

        put(&mut t, &mut pos, 0x4E, 22);
        put(&mut t, &mut pos, 0x00, 12);
        put(&mut t, &mut pos, 0xA1, 3);
        put(&mut t, &mut pos, 0xFB, 1);
        let mut dcrc = Crc16::PRESET.update_block(&[0xA1, 0xA1, 0xA1, 0xFB]);
        for _ in 0..SECTOR_BYTES {
            dcrc = dcrc.update(0xFF);
        }
        put(&mut t, &mut pos, 0xFF, SECTOR_BYTES);
        let v = dcrc.value();
        put(&mut t, &mut pos, (v >> 8) as u8, 1);
        put(&mut t, &mut pos, v as u8, 1);

        put(&mut t, &mut pos, 0x4E, 24);
    }
    t
}

/// Drive mechanics: carriage position, selected head, density clock and the
/// index counter. The head advances only through the [`Drive`] calls the
/// controller makes after sleeping the matching span, so media access is
/// deterministic under replay.
#[derive(Clone)]
pub struct VirtualDrive {
    disk: Option<VirtualDisk>,
    cylinder: u8,
    side: u8,
    direction: StepDirection,
    double_density: bool,
    head_pos: usize,
    pulses: u32,
    motor_on: bool,
}

impl VirtualDrive {
    #[must_use]
    pub fn new() -> Self {
        Self {
            disk: None,
            cylinder: 0,
            side: 0,
            direction: StepDirection::Inward,
            double_density: false,
            head_pos: 0,
            pulses: 0,
            motor_on: false,
        }
    }

    pub fn insert_disk(&mut self, disk: VirtualDisk) {
        self.disk = Some(disk);
    }

    pub fn eject_disk(&mut self) -> Option<VirtualDisk> {
        self.disk.take()
    }

    #[must_use]
    pub fn disk(&self) -> Option<&VirtualDisk> {
        self.disk.as_ref()
    }

    pub fn disk_mut(&mut self) -> Option<&mut VirtualDisk> {
        self.disk.as_mut()
    }

    /// Spindle motor control (from the cartridge's control register).
    pub fn set_motor(&mut self, on: bool) {
        self.motor_on = on;
    }

    #[must_use]
    pub fn cylinder(&self) -> u8 {
        self.cylinder
    }

    fn track(&self) -> Option<&Track> {
        let disk = self.disk.as_ref()?;
        if self.cylinder >= disk.cylinders || self.side >= disk.sides {
            return None;
        }
        Some(&disk.tracks[disk.track_index(self.cylinder, self.side)])
    }

    fn track_len(&self) -> usize {
        self.track().map_or(TRACK_BYTES_DD, |t| t.data.len())
    }

    fn byte_ticks(&self) -> u64 {
        if self.double_density {
            BYTE_TICKS_DD
        } else {
            BYTE_TICKS_SD
        }
    }

    /// Advance one byte cell, counting an index pulse on wrap.
    fn advance(&mut self) {
        self.head_pos += 1;
        if self.head_pos >= self.track_len() {
            self.head_pos = 0;
            self.pulses = self.pulses.wrapping_add(1);
        }
    }

    /// Circular byte distance from the head to the next IDAM, or to the
    /// index hole when the track has none.
    fn idam_distance(&self) -> (usize, bool) {
        let len = self.track_len();
        if let Some(t) = self.track() {
            if let Some(&next) = t.idams.iter().find(|&&i| i > self.head_pos) {
                return (next - self.head_pos, true);
            }
            if let Some(&first) = t.idams.first() {
                return (len - self.head_pos + first, true);
            }
        }
        (len - self.head_pos, false)
    }
}

impl Default for VirtualDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl Drive for VirtualDrive {
    fn set_direction(&mut self, dir: StepDirection) {
        self.direction = dir;
    }

    fn set_side(&mut self, side: u8) {
        self.side = side & 1;
    }

    fn set_density(&mut self, double: bool) {
        self.double_density = double;
    }

    fn step(&mut self) {
        self.cylinder = match self.direction {
            StepDirection::Outward => self.cylinder.saturating_sub(1),
            StepDirection::Inward => (self.cylinder + 1).min(MAX_CYLINDER),
        };
    }

    fn read(&mut self) -> u8 {
        let b = self.track().map_or(0, |t| t.data[self.head_pos]);
        self.advance();
        b
    }

    fn write(&mut self, data: u8) {
        let pos = self.head_pos;
        let cyl = self.cylinder;
        let side = self.side;
        if let Some(disk) = self.disk.as_mut()
            && !disk.write_protected
            && cyl < disk.cylinders
            && side < disk.sides
        {
            let ti = disk.track_index(cyl, side);
            let t = &mut disk.tracks[ti];
            t.data[pos] = data;
            // Overwriting a recorded address mark removes it.
            if let Ok(i) = t.idams.binary_search(&pos) {
                t.idams.remove(i);
            }
        }
        self.advance();
    }

    fn skip(&mut self) {
        self.advance();
    }

    fn write_idam(&mut self) {
        let pos = self.head_pos;
        let cyl = self.cylinder;
        let side = self.side;
        self.write(0xFE);
        if let Some(disk) = self.disk.as_mut()
            && !disk.write_protected
            && cyl < disk.cylinders
            && side < disk.sides
        {
            let ti = disk.track_index(cyl, side);
            let t = &mut disk.tracks[ti];
            if let Err(i) = t.idams.binary_search(&pos) {
                t.idams.insert(i, pos);
            }
        }
    }

    fn time_to_next_byte(&self) -> Ticks {
        Ticks::new(self.byte_ticks())
    }

    fn time_to_next_idam(&self) -> Ticks {
        let (dist, _) = self.idam_distance();
        Ticks::new(dist as u64 * self.byte_ticks())
    }

    fn next_idam(&mut self) -> bool {
        let (dist, found) = self.idam_distance();
        for _ in 0..dist {
            self.advance();
        }
        if found {
            // Leave the head on the first ID byte, past the mark cell.
            self.advance();
        }
        found
    }

    fn index_pulses(&self) -> u32 {
        self.pulses
    }

    fn is_ready(&self) -> bool {
        self.motor_on && self.disk.is_some()
    }

    fn is_tr00(&self) -> bool {
        self.cylinder == 0
    }

    fn is_write_protected(&self) -> bool {
        self.disk.as_ref().is_some_and(|d| d.write_protected)
    }

    fn is_index(&self) -> bool {
        self.head_pos < INDEX_WINDOW
    }
}
