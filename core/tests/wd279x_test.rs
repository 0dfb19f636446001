use ember_core::core::{EventId, EventQueue, Ticks};
use ember_core::device::{ChipType, FdcScheduler, NullDrive, Wd279x};
use ember_machines::disk::{SECTOR_BYTES, TRACK_BYTES_DD, VirtualDisk, VirtualDrive};

/// Minimal scheduler: a clock plus a real event queue. Firing an event
/// advances the clock straight to it, so each test runs in virtual time.
struct Sched {
    now: Ticks,
    queue: EventQueue<()>,
}

impl Sched {
    fn new() -> Self {
        Self {
            now: Ticks::ZERO,
            queue: EventQueue::new(),
        }
    }
}

impl FdcScheduler for Sched {
    fn now(&self) -> Ticks {
        self.now
    }

    fn schedule_in(&mut self, delta: Ticks) -> EventId {
        self.queue.schedule(self.now + delta, ())
    }

    fn cancel(&mut self, id: EventId) {
        self.queue.cancel(id);
    }
}

fn setup(disk: VirtualDisk) -> (Wd279x, VirtualDrive, Sched) {
    let mut fdc = Wd279x::new(ChipType::Wd2797);
    let mut drive = VirtualDrive::new();
    drive.insert_disk(disk);
    drive.set_motor(true);
    fdc.set_density(true, &mut drive);
    (fdc, drive, Sched::new())
}

/// Advance the clock to the next pending phase event and deliver it.
fn fire_one(fdc: &mut Wd279x, drive: &mut VirtualDrive, sched: &mut Sched) {
    let at = sched.queue.next_at().expect("busy with no pending event");
    sched.now = at;
    sched.queue.pop_due(at).expect("event not due");
    fdc.fired(drive, sched);
}

/// Run the command to completion, calling `service` after every phase event
/// so the test can play the CPU's part of the data transfer.
fn pump<F>(fdc: &mut Wd279x, drive: &mut VirtualDrive, sched: &mut Sched, mut service: F)
where
    F: FnMut(&mut Wd279x, &mut VirtualDrive, &mut Sched),
{
    let mut events = 0;
    while fdc.is_busy() {
        fire_one(fdc, drive, sched);
        service(fdc, drive, sched);
        events += 1;
        assert!(events < 100_000, "command never completed");
    }
}

fn pump_unserviced(fdc: &mut Wd279x, drive: &mut VirtualDrive, sched: &mut Sched) {
    pump(fdc, drive, sched, |_, _, _| {});
}

#[test]
fn test_restore_homes_head() {
    let (mut fdc, mut drive, mut sched) = setup(VirtualDisk::formatted(35, 1));

    // Seek inward first so restore has somewhere to come back from.
    fdc.write(3, 6, &mut drive, &mut sched);
    fdc.write(0, 0x10, &mut drive, &mut sched);
    pump_unserviced(&mut fdc, &mut drive, &mut sched);
    assert_eq!(drive.cylinder(), 6);
    assert_eq!(fdc.read(1, &mut drive), 6);

    fdc.write(0, 0x00, &mut drive, &mut sched);
    pump_unserviced(&mut fdc, &mut drive, &mut sched);
    assert_eq!(drive.cylinder(), 0);
    assert_eq!(fdc.read(1, &mut drive), 0);

    assert!(fdc.intrq());
    let status = fdc.read(0, &mut drive);
    assert_ne!(status & 0x04, 0, "TRACK0");
    assert_eq!(status & 0x01, 0, "BUSY");
    assert!(!fdc.intrq(), "status read clears the interrupt");
}

#[test]
fn test_seek_with_verify() {
    let (mut fdc, mut drive, mut sched) = setup(VirtualDisk::formatted(35, 1));

    fdc.write(3, 12, &mut drive, &mut sched);
    fdc.write(0, 0x14, &mut drive, &mut sched);
    pump_unserviced(&mut fdc, &mut drive, &mut sched);

    assert_eq!(drive.cylinder(), 12);
    assert_eq!(fdc.read(1, &mut drive), 12);
    let status = fdc.read(0, &mut drive);
    assert_eq!(status & 0x18, 0, "no CRC or seek error");
}

#[test]
fn test_seek_verify_fails_on_blank_media() {
    let (mut fdc, mut drive, mut sched) = setup(VirtualDisk::blank(35, 1));

    fdc.write(3, 3, &mut drive, &mut sched);
    fdc.write(0, 0x14, &mut drive, &mut sched);
    pump_unserviced(&mut fdc, &mut drive, &mut sched);

    let status = fdc.read(0, &mut drive);
    assert_ne!(status & 0x10, 0, "SEEK ERROR after five revolutions");
}

#[test]
fn test_step_commands() {
    let (mut fdc, mut drive, mut sched) = setup(VirtualDisk::formatted(35, 1));

    // STEP IN with track update, twice.
    for _ in 0..2 {
        fdc.write(0, 0x50, &mut drive, &mut sched);
        pump_unserviced(&mut fdc, &mut drive, &mut sched);
    }
    assert_eq!(drive.cylinder(), 2);
    assert_eq!(fdc.read(1, &mut drive), 2);

    // STEP IN without update moves the head but not the register.
    fdc.write(0, 0x40, &mut drive, &mut sched);
    pump_unserviced(&mut fdc, &mut drive, &mut sched);
    assert_eq!(drive.cylinder(), 3);
    assert_eq!(fdc.read(1, &mut drive), 2);

    // Plain STEP repeats the last direction.
    fdc.write(0, 0x20, &mut drive, &mut sched);
    pump_unserviced(&mut fdc, &mut drive, &mut sched);
    assert_eq!(drive.cylinder(), 4);

    // STEP OUT with update.
    fdc.write(0, 0x70, &mut drive, &mut sched);
    pump_unserviced(&mut fdc, &mut drive, &mut sched);
    assert_eq!(drive.cylinder(), 3);
    assert_eq!(fdc.read(1, &mut drive), 1);
}

#[test]
fn test_read_sector() {
    let mut disk = VirtualDisk::formatted(35, 1);
    let payload: Vec<u8> = (0..SECTOR_BYTES).map(|i| i as u8).collect();
    assert!(disk.write_sector(0, 0, 5, &payload));
    let (mut fdc, mut drive, mut sched) = setup(disk);

    fdc.write(2, 5, &mut drive, &mut sched);
    fdc.write(0, 0x88, &mut drive, &mut sched);
    let mut collected = Vec::new();
    pump(&mut fdc, &mut drive, &mut sched, |f, d, _| {
        if f.drq() {
            collected.push(f.read(3, d));
        }
    });

    assert_eq!(collected, payload);
    assert!(fdc.intrq());
    let status = fdc.read(0, &mut drive);
    assert_eq!(status & 0x5D, 0, "clean completion");
}

#[test]
fn test_read_sector_unserviced_drq_is_lost_data() {
    let (mut fdc, mut drive, mut sched) = setup(VirtualDisk::formatted(35, 1));

    fdc.write(2, 1, &mut drive, &mut sched);
    fdc.write(0, 0x88, &mut drive, &mut sched);
    pump_unserviced(&mut fdc, &mut drive, &mut sched);

    let status = fdc.read(0, &mut drive);
    assert_ne!(status & 0x04, 0, "LOST DATA");
    assert_eq!(status & 0x08, 0, "the CRC still folds clean");
}

#[test]
fn test_read_missing_sector_is_record_not_found() {
    let (mut fdc, mut drive, mut sched) = setup(VirtualDisk::formatted(35, 1));

    fdc.write(2, 19, &mut drive, &mut sched);
    fdc.write(0, 0x88, &mut drive, &mut sched);
    let mut collected = Vec::new();
    pump(&mut fdc, &mut drive, &mut sched, |f, d, _| {
        if f.drq() {
            collected.push(f.read(3, d));
        }
    });

    assert!(collected.is_empty());
    let status = fdc.read(0, &mut drive);
    assert_ne!(status & 0x10, 0, "RNF after six revolutions");
}

#[test]
fn test_multiple_sector_read_runs_off_the_track() {
    let mut disk = VirtualDisk::formatted(35, 1);
    disk.write_sector(0, 0, 17, &vec![0x17; SECTOR_BYTES]);
    disk.write_sector(0, 0, 18, &vec![0x18; SECTOR_BYTES]);
    let (mut fdc, mut drive, mut sched) = setup(disk);

    fdc.write(2, 17, &mut drive, &mut sched);
    fdc.write(0, 0x98, &mut drive, &mut sched);
    let mut collected = Vec::new();
    pump(&mut fdc, &mut drive, &mut sched, |f, d, _| {
        if f.drq() {
            collected.push(f.read(3, d));
        }
    });

    // Sectors 17 and 18 transfer; the hunt for 19 ends in RNF.
    assert_eq!(collected.len(), 2 * SECTOR_BYTES);
    assert!(collected[..SECTOR_BYTES].iter().all(|&b| b == 0x17));
    assert!(collected[SECTOR_BYTES..].iter().all(|&b| b == 0x18));
    assert_eq!(fdc.read(2, &mut drive), 19);
    let status = fdc.read(0, &mut drive);
    assert_ne!(status & 0x10, 0);
}

#[test]
fn test_write_sector_round_trip() {
    let (mut fdc, mut drive, mut sched) = setup(VirtualDisk::formatted(35, 1));
    let payload: Vec<u8> = (0..SECTOR_BYTES).map(|i| (i * 7) as u8).collect();

    fdc.write(2, 5, &mut drive, &mut sched);
    fdc.write(0, 0xA8, &mut drive, &mut sched);
    let mut feed = payload.iter().copied();
    pump(&mut fdc, &mut drive, &mut sched, |f, d, s| {
        if f.drq() {
            f.write(3, feed.next().expect("feed exhausted"), d, s);
        }
    });

    let status = fdc.read(0, &mut drive);
    assert_eq!(status & 0x44, 0, "no write fault or lost data");
    assert_eq!(drive.disk().unwrap().read_sector(0, 0, 5).unwrap(), payload);

    // Read back through the controller: the rewritten CRC must fold clean.
    fdc.write(0, 0x88, &mut drive, &mut sched);
    let mut collected = Vec::new();
    pump(&mut fdc, &mut drive, &mut sched, |f, d, _| {
        if f.drq() {
            collected.push(f.read(3, d));
        }
    });
    assert_eq!(collected, payload);
    assert_eq!(fdc.read(0, &mut drive) & 0x08, 0);
}

#[test]
fn test_write_deleted_mark_reads_back_as_record_type() {
    let (mut fdc, mut drive, mut sched) = setup(VirtualDisk::formatted(35, 1));
    let payload = vec![0x42; SECTOR_BYTES];

    fdc.write(2, 3, &mut drive, &mut sched);
    fdc.write(0, 0xA9, &mut drive, &mut sched);
    let mut feed = payload.iter().copied();
    pump(&mut fdc, &mut drive, &mut sched, |f, d, s| {
        if f.drq() {
            f.write(3, feed.next().expect("feed exhausted"), d, s);
        }
    });

    fdc.write(0, 0x88, &mut drive, &mut sched);
    let mut collected = Vec::new();
    pump(&mut fdc, &mut drive, &mut sched, |f, d, _| {
        if f.drq() {
            collected.push(f.read(3, d));
        }
    });
    assert_eq!(collected, payload);
    assert_ne!(fdc.read(0, &mut drive) & 0x20, 0, "RECORD TYPE");
}

#[test]
fn test_write_sector_on_protected_media() {
    let mut disk = VirtualDisk::formatted(35, 1);
    disk.set_write_protected(true);
    let (mut fdc, mut drive, mut sched) = setup(disk);

    fdc.write(2, 1, &mut drive, &mut sched);
    fdc.write(0, 0xA8, &mut drive, &mut sched);
    pump_unserviced(&mut fdc, &mut drive, &mut sched);

    let status = fdc.read(0, &mut drive);
    assert_ne!(status & 0x40, 0, "WRITE PROTECT");
    assert!(drive.disk().unwrap().read_sector(0, 0, 1).unwrap().iter().all(|&b| b == 0xFF));
}

#[test]
fn test_write_sector_aborts_before_touching_media_on_lost_data() {
    let (mut fdc, mut drive, mut sched) = setup(VirtualDisk::formatted(35, 1));

    fdc.write(2, 1, &mut drive, &mut sched);
    fdc.write(0, 0xA8, &mut drive, &mut sched);
    pump_unserviced(&mut fdc, &mut drive, &mut sched);

    let status = fdc.read(0, &mut drive);
    assert_ne!(status & 0x04, 0, "LOST DATA");
    assert!(drive.disk().unwrap().read_sector(0, 0, 1).unwrap().iter().all(|&b| b == 0xFF));
}

#[test]
fn test_read_address_streams_the_next_id_field() {
    let (mut fdc, mut drive, mut sched) = setup(VirtualDisk::formatted(35, 1));

    fdc.write(0, 0xC0, &mut drive, &mut sched);
    let mut collected = Vec::new();
    pump(&mut fdc, &mut drive, &mut sched, |f, d, _| {
        if f.drq() {
            collected.push(f.read(3, d));
        }
    });

    assert_eq!(collected.len(), 6);
    assert_eq!(&collected[..4], &[0, 0, 1, 1], "track, side, sector, length");
    // The hardware copies the ID track byte into the sector register.
    assert_eq!(fdc.read(2, &mut drive), 0);
    assert_eq!(fdc.read(0, &mut drive) & 0x18, 0);
}

#[test]
fn test_read_track_streams_one_revolution() {
    let (mut fdc, mut drive, mut sched) = setup(VirtualDisk::formatted(35, 1));

    fdc.write(0, 0xE0, &mut drive, &mut sched);
    let mut collected = Vec::new();
    pump(&mut fdc, &mut drive, &mut sched, |f, d, _| {
        if f.drq() {
            collected.push(f.read(3, d));
        }
    });

    assert_eq!(collected.len(), TRACK_BYTES_DD);
    let idams = collected.iter().filter(|&&b| b == 0xFE).count();
    assert_eq!(idams, 18);
}

#[test]
fn test_write_track_formats_blank_media() {
    let (mut fdc, mut drive, mut sched) = setup(VirtualDisk::blank(35, 1));

    // The stream a formatter would feed: per sector, an ID field between
    // sync runs, a CRC expansion byte and a 0xE5-filled data field.
    let mut script = vec![0x4E; 32];
    for sector in 1..=18u8 {
        script.extend_from_slice(&[0x00; 12]);
        script.extend_from_slice(&[0xF5, 0xF5, 0xF5, 0xFE, 0, 0, sector, 0x01, 0xF7]);
        script.extend(std::iter::repeat_n(0x4E, 22));
        script.extend_from_slice(&[0x00; 12]);
        script.extend_from_slice(&[0xF5, 0xF5, 0xF5, 0xFB]);
        script.extend(std::iter::repeat_n(0xE5, SECTOR_BYTES));
        script.push(0xF7);
        script.extend(std::iter::repeat_n(0x4E, 24));
    }
    let mut feed = script.into_iter().chain(std::iter::repeat(0x4E));

    fdc.write(0, 0xF0, &mut drive, &mut sched);
    // The first byte is demanded up front, before formatting starts.
    assert!(fdc.drq());
    let first = feed.next().expect("script empty");
    fdc.write(3, first, &mut drive, &mut sched);
    pump(&mut fdc, &mut drive, &mut sched, |f, d, s| {
        if f.drq() {
            f.write(3, feed.next().expect("feed exhausted"), d, s);
        }
    });

    let disk = drive.disk().unwrap();
    assert!(disk.read_sector(0, 0, 1).unwrap().iter().all(|&b| b == 0xE5));
    assert!(disk.read_sector(0, 0, 18).unwrap().iter().all(|&b| b == 0xE5));
}

#[test]
fn test_write_track_on_protected_media() {
    let mut disk = VirtualDisk::blank(35, 1);
    disk.set_write_protected(true);
    let (mut fdc, mut drive, mut sched) = setup(disk);

    fdc.write(0, 0xF0, &mut drive, &mut sched);
    pump_unserviced(&mut fdc, &mut drive, &mut sched);

    assert_ne!(fdc.read(0, &mut drive) & 0x40, 0, "WRITE PROTECT");
}

#[test]
fn test_side_select_line() {
    let mut disk = VirtualDisk::formatted(35, 2);
    let payload = vec![0x99; SECTOR_BYTES];
    disk.write_sector(0, 1, 3, &payload);
    let (mut fdc, mut drive, mut sched) = setup(disk);

    // Command bit 1 drives the side-select output on this chip.
    fdc.write(2, 3, &mut drive, &mut sched);
    fdc.write(0, 0x8A, &mut drive, &mut sched);
    let mut collected = Vec::new();
    pump(&mut fdc, &mut drive, &mut sched, |f, d, _| {
        if f.drq() {
            collected.push(f.read(3, d));
        }
    });

    assert_eq!(collected, payload);
}

#[test]
fn test_type2_against_an_empty_bay_finishes_immediately() {
    let mut fdc = Wd279x::new(ChipType::Wd2797);
    let mut drive = NullDrive;
    let mut sched = Sched::new();

    fdc.write(0, 0x88, &mut drive, &mut sched);
    assert!(!fdc.is_busy());
    assert!(fdc.intrq());
    assert_ne!(fdc.read(0, &mut drive) & 0x80, 0, "NOT READY");
}

#[test]
fn test_force_interrupt() {
    let (mut fdc, mut drive, mut sched) = setup(VirtualDisk::formatted(35, 1));

    // Park the controller in a long sector hunt, then abort it.
    fdc.write(2, 19, &mut drive, &mut sched);
    fdc.write(0, 0x88, &mut drive, &mut sched);
    assert!(fdc.is_busy());
    fire_one(&mut fdc, &mut drive, &mut sched);

    fdc.write(0, 0xD0, &mut drive, &mut sched);
    assert!(!fdc.is_busy());
    assert!(!fdc.intrq());
    assert!(sched.queue.is_empty(), "pending phase event cancelled");

    // Condition bit 3: immediate interrupt, no command.
    fdc.write(0, 0xD8, &mut drive, &mut sched);
    assert!(fdc.intrq());
    assert!(!fdc.is_busy());
    fdc.read(0, &mut drive);
    assert!(!fdc.intrq());

    // Unimplemented conditions latch as a diagnostic and never fire.
    fdc.write(0, 0xD1, &mut drive, &mut sched);
    assert_eq!(fdc.last_unknown_command(), Some(0xD1));
    assert!(!fdc.intrq());
}

#[test]
fn test_snapshot_resumes_mid_transfer() {
    let mut disk = VirtualDisk::formatted(35, 1);
    let payload: Vec<u8> = (0..SECTOR_BYTES).map(|i| (255 - i) as u8).collect();
    disk.write_sector(0, 0, 5, &payload);
    let (mut fdc, mut drive, mut sched) = setup(disk);

    fdc.write(2, 5, &mut drive, &mut sched);
    fdc.write(0, 0x88, &mut drive, &mut sched);
    let mut collected = Vec::new();
    for _ in 0..120 {
        fire_one(&mut fdc, &mut drive, &mut sched);
        if fdc.drq() {
            collected.push(fdc.read(3, &mut drive));
        }
    }
    assert!(fdc.is_busy(), "transfer should still be in flight");
    assert!(!collected.is_empty() && collected.len() < SECTOR_BYTES);

    let snap = fdc.snapshot();
    let deltas = sched.queue.pending_deltas(sched.now);
    assert_eq!(deltas.len(), 1);

    // Rebuild the controller and queue, re-park the phase event, continue.
    let mut fdc2 = Wd279x::new(ChipType::Wd2797);
    let mut sched2 = Sched::new();
    sched2.now = sched.now;
    let (delta, ()) = deltas[0];
    let id = sched2.schedule_in(Ticks::new(delta));
    fdc2.restore(&snap, Some(id));
    assert!(fdc2.is_busy());

    pump(&mut fdc2, &mut drive, &mut sched2, |f, d, _| {
        if f.drq() {
            collected.push(f.read(3, d));
        }
    });
    assert_eq!(collected, payload);
    assert_eq!(fdc2.read(0, &mut drive) & 0x1C, 0);
}
