//! Disk cartridge integration: WD2793 commands driven through the CoCo's
//! bus and event queue, against formatted virtual media.

use ember_core::core::machine::{Machine, StopReason};
use ember_machines::{CocoMachine, VirtualDisk};

const DSKREG: u16 = 0xFF40;
const FDC_COMMAND: u16 = 0xFF48;
const FDC_STATUS: u16 = 0xFF48;
const FDC_TRACK: u16 = 0xFF49;
const FDC_SECTOR: u16 = 0xFF4A;
const FDC_DATA: u16 = 0xFF4B;

const MOTOR_DD_D0: u8 = 0x08 | 0x20; // motor on, double density, drive 0
const HALT_ENABLE: u8 = 0x80;

const S_BUSY: u8 = 0x01;
const S_TRACK0: u8 = 0x04;
const S_CRC_ERROR: u8 = 0x08;
const S_SEEK_ERROR: u8 = 0x10;
const S_RNF: u8 = 0x10;

/// Machine whose CPU parks in a BRA loop so tests can drive the controller
/// registers directly while `run` advances the clock.
fn disk_machine() -> CocoMachine {
    let mut rom0 = vec![0x12; 0x2000];
    let program = [
        0x10, 0xCE, 0x08, 0x00, // LDS #$0800 (arms NMI)
        0x20, 0xFE, // BRA *
    ];
    rom0[..program.len()].copy_from_slice(&program);
    // NMI handler at 0x8100: record a marker, return.
    let handler = [
        0x86, 0x99, // LDA #$99
        0xB7, 0x04, 0x10, // STA $0410
        0x3B, // RTI
    ];
    rom0[0x100..0x100 + handler.len()].copy_from_slice(&handler);

    let mut rom1 = vec![0x12; 0x2000];
    rom1[0x1FFE] = 0x80; // reset -> 0x8000
    rom1[0x1FFF] = 0x00;
    rom1[0x1FFC] = 0x81; // NMI -> 0x8100
    rom1[0x1FFD] = 0x00;

    let mut m = CocoMachine::new(rom0, rom1, Vec::new(), true);
    m.insert_disk(0, VirtualDisk::formatted(35, 1));
    m.poke(DSKREG, MOTOR_DD_D0);
    // Let the CPU come out of reset and load its stack pointer.
    m.run(2_000);
    m
}

/// Run until the controller drops BUSY, bounded so a stuck command fails
/// the test instead of hanging it.
fn run_until_idle(m: &mut CocoMachine) {
    for _ in 0..40_000 {
        if !m.fdc().unwrap().is_busy() {
            return;
        }
        m.run(10_000);
    }
    panic!("controller never completed");
}

#[test]
fn restore_homes_the_head() {
    let mut m = disk_machine();
    m.poke(FDC_COMMAND, 0x03); // RESTORE, 30 ms steps
    run_until_idle(&mut m);
    assert!(m.fdc().unwrap().intrq());
    let status = m.peek(FDC_STATUS);
    assert_eq!(status & S_BUSY, 0);
    assert_ne!(status & S_TRACK0, 0);
    assert_eq!(m.peek(FDC_TRACK), 0);
    // Reading status cleared the completion interrupt.
    assert!(!m.fdc().unwrap().intrq());
}

#[test]
fn seek_with_verify_reaches_the_target_track() {
    let mut m = disk_machine();
    m.poke(FDC_COMMAND, 0x03);
    run_until_idle(&mut m);

    m.poke(FDC_DATA, 5);
    m.poke(FDC_COMMAND, 0x14); // SEEK with verify
    run_until_idle(&mut m);
    let status = m.peek(FDC_STATUS);
    assert_eq!(status & (S_SEEK_ERROR | S_CRC_ERROR), 0);
    assert_eq!(m.peek(FDC_TRACK), 5);
    assert_eq!(m.drive(0).unwrap().cylinder(), 5);
}

#[test]
fn seek_verify_fails_on_unformatted_media() {
    let mut m = disk_machine();
    m.drive_mut(0).unwrap().insert_disk(VirtualDisk::blank(35, 1));
    m.poke(FDC_DATA, 3);
    m.poke(FDC_COMMAND, 0x14); // SEEK with verify
    run_until_idle(&mut m);
    assert_ne!(m.peek(FDC_STATUS) & S_SEEK_ERROR, 0);
}

#[test]
fn read_sector_streams_format_fill() {
    let mut m = disk_machine();
    m.poke(FDC_COMMAND, 0x03);
    run_until_idle(&mut m);

    m.poke(FDC_SECTOR, 3);
    m.poke(FDC_COMMAND, 0x80); // READ SECTOR
    let mut data = Vec::new();
    for _ in 0..400_000 {
        m.run(200);
        if m.fdc().unwrap().drq() {
            data.push(m.peek(FDC_DATA));
        }
        if data.len() == 256 && !m.fdc().unwrap().is_busy() {
            break;
        }
    }
    assert_eq!(data.len(), 256);
    assert!(data.iter().all(|&b| b == 0xFF));
    let status = m.peek(FDC_STATUS);
    assert_eq!(status & (S_CRC_ERROR | S_RNF), 0);
}

#[test]
fn write_sector_lands_on_the_media() {
    let mut m = disk_machine();
    m.poke(FDC_COMMAND, 0x03);
    run_until_idle(&mut m);

    let payload: Vec<u8> = (0..=255).collect();
    let mut fed = 0usize;
    m.poke(FDC_SECTOR, 7);
    m.poke(FDC_COMMAND, 0xA0); // WRITE SECTOR
    for _ in 0..400_000 {
        m.run(200);
        if fed < payload.len() && m.fdc().unwrap().drq() {
            m.poke(FDC_DATA, payload[fed]);
            fed += 1;
        }
        if fed == payload.len() && !m.fdc().unwrap().is_busy() {
            break;
        }
    }
    assert_eq!(fed, 256);
    assert_eq!(m.peek(FDC_STATUS) & (S_CRC_ERROR | S_RNF), 0);
    let written = m
        .drive(0)
        .unwrap()
        .disk()
        .unwrap()
        .read_sector(0, 0, 7)
        .unwrap();
    assert_eq!(written, payload);
}

#[test]
fn record_not_found_for_missing_sector() {
    let mut m = disk_machine();
    m.poke(FDC_COMMAND, 0x03);
    run_until_idle(&mut m);

    m.poke(FDC_SECTOR, 19); // the format has 18 sectors
    m.poke(FDC_COMMAND, 0x80);
    run_until_idle(&mut m);
    assert_ne!(m.peek(FDC_STATUS) & S_RNF, 0);
}

#[test]
fn write_protect_blocks_write_sector() {
    let mut m = disk_machine();
    m.poke(FDC_COMMAND, 0x03);
    run_until_idle(&mut m);
    m.drive_mut(0)
        .unwrap()
        .disk_mut()
        .unwrap()
        .set_write_protected(true);

    m.poke(FDC_SECTOR, 1);
    m.poke(FDC_COMMAND, 0xA0);
    run_until_idle(&mut m);
    assert_ne!(m.peek(FDC_STATUS) & 0x40, 0); // WRITE PROTECT
}

#[test]
fn halt_latch_parks_cpu_and_intrq_raises_nmi() {
    let mut m = disk_machine();
    // Enable the HALT latch together with the motor, then start a command.
    m.poke(DSKREG, MOTOR_DD_D0 | HALT_ENABLE);
    m.poke(FDC_COMMAND, 0x03); // RESTORE
    run_until_idle(&mut m);
    // Completion dropped the latch, raised INTRQ and the CPU took the NMI.
    m.run(2_000);
    assert_eq!(m.peek(0x0410), 0x99);
}

#[test]
fn read_address_returns_an_id_field() {
    let mut m = disk_machine();
    m.poke(FDC_COMMAND, 0x03);
    run_until_idle(&mut m);

    m.poke(FDC_COMMAND, 0xC0); // READ ADDRESS
    let mut id = Vec::new();
    for _ in 0..400_000 {
        m.run(200);
        if m.fdc().unwrap().drq() {
            id.push(m.peek(FDC_DATA));
        }
        if id.len() >= 6 && !m.fdc().unwrap().is_busy() {
            break;
        }
    }
    assert_eq!(id.len(), 6);
    assert_eq!(id[0], 0); // cylinder
    assert_eq!(id[1], 0); // side
    assert!((1..=18).contains(&id[2])); // sector
    assert_eq!(id[3], 1); // 256-byte size code
    // The hardware copies the ID track byte into the sector register.
    assert_eq!(m.peek(FDC_SECTOR), 0);
}

#[test]
fn force_interrupt_aborts_a_command() {
    let mut m = disk_machine();
    m.poke(FDC_DATA, 30);
    m.poke(FDC_COMMAND, 0x17); // SEEK, slowest rate
    m.run(5_000);
    assert!(m.fdc().unwrap().is_busy());
    m.poke(FDC_COMMAND, 0xD0); // FORCE INTERRUPT, no condition
    assert!(!m.fdc().unwrap().is_busy());
    assert!(!m.fdc().unwrap().intrq());
    // The queue no longer drives the controller anywhere.
    m.run(10_000_000);
    assert!(!m.fdc().unwrap().is_busy());
}

#[test]
fn snapshot_mid_command_resumes_deterministically() {
    let mut m = disk_machine();
    m.poke(FDC_SECTOR, 2);
    m.poke(FDC_COMMAND, 0x80); // READ SECTOR in flight
    let until = m.now().get() + 100_000;
    while m.now().get() < until {
        m.step();
    }
    assert!(m.fdc().unwrap().is_busy());
    let snap = m.snapshot();

    let mut n = disk_machine();
    n.restore(&snap);

    let collect = |m: &mut CocoMachine| {
        let mut data = Vec::new();
        for _ in 0..400_000 {
            m.run(200);
            if m.fdc().unwrap().drq() {
                data.push(m.peek(FDC_DATA));
            }
            if data.len() == 256 && !m.fdc().unwrap().is_busy() {
                break;
            }
        }
        (data, m.peek(FDC_STATUS))
    };
    let (data_m, status_m) = collect(&mut m);
    let (data_n, status_n) = collect(&mut n);
    assert_eq!(data_m.len(), 256);
    assert_eq!(data_m, data_n);
    assert_eq!(status_m, status_n);
}
