use ember_core::core::Ticks;
use ember_core::device::sam::{FAST_CYCLE, SLOW_CYCLE, Sam};
use ember_core::device::Region;

/// Set or clear one register bit through the paired address lines.
fn poke_bit(sam: &mut Sam, bit: u16, set: bool) {
    let addr = 0xFFC0 + bit * 2 + u16::from(set);
    sam.write_register(addr);
}

#[test]
fn test_register_clear_set_lines() {
    let mut sam = Sam::new();
    assert_eq!(sam.register(), 0);

    sam.write_register(0xFFDF); // odd: set bit 15 (TY)
    assert_eq!(sam.register(), 0x8000);
    assert!(sam.map_type());

    sam.write_register(0xFFDD); // odd: set bit 14
    assert_eq!(sam.register(), 0xC000);

    sam.write_register(0xFFDE); // even: clear bit 15
    assert_eq!(sam.register(), 0x4000);
    assert!(!sam.map_type());
}

#[test]
fn test_video_fields() {
    let mut sam = Sam::new();
    poke_bit(&mut sam, 0, true);
    poke_bit(&mut sam, 1, true); // V = 3
    assert_eq!(sam.video_mode(), 3);

    // F bits land in counter bits 9-15.
    poke_bit(&mut sam, 3, true);
    assert_eq!(sam.video_base(), 0x0200);
    poke_bit(&mut sam, 9, true);
    assert_eq!(sam.video_base(), 0x8200);
}

#[test]
fn test_decode_map_type_0() {
    let sam = Sam::new();
    assert_eq!(sam.decode(0x0000), Region::Ram);
    assert_eq!(sam.decode(0x7FFF), Region::Ram);
    assert_eq!(sam.decode(0x8000), Region::Rom0);
    assert_eq!(sam.decode(0xA000), Region::Rom1);
    assert_eq!(sam.decode(0xC000), Region::CartRom);
    assert_eq!(sam.decode(0xFEFF), Region::CartRom);
    assert_eq!(sam.decode(0xFF00), Region::Io0);
    assert_eq!(sam.decode(0xFF20), Region::Io1);
    assert_eq!(sam.decode(0xFF48), Region::CartIo);
    assert_eq!(sam.decode(0xFF60), Region::Reserved);
    assert_eq!(sam.decode(0xFFC0), Region::SamRegister);
    assert_eq!(sam.decode(0xFFFE), Region::VectorRom);
}

#[test]
fn test_decode_map_type_1_is_all_ram_below_io() {
    let mut sam = Sam::new();
    sam.write_register(0xFFDF); // TY = 1
    assert_eq!(sam.decode(0x8000), Region::Ram);
    assert_eq!(sam.decode(0xFEFF), Region::Ram);
    // The top page keeps its hardware windows.
    assert_eq!(sam.decode(0xFF00), Region::Io0);
    assert_eq!(sam.decode(0xFFFE), Region::VectorRom);
}

#[test]
fn test_ram_address_wraps_per_memory_size() {
    let mut sam = Sam::new();
    // 4K parts: 6-bit row and column, 4096-byte wrap.
    assert_eq!(sam.ram_address(0x0000), 0x0000);
    assert_eq!(sam.ram_address(0x0FFF), 0x0FFF);
    assert_eq!(sam.ram_address(0x1000), 0x0000);

    // 16K parts: 7-bit row and column.
    poke_bit(&mut sam, 13, true); // M = 01
    assert_eq!(sam.ram_address(0x3FFF), 0x3FFF);
    assert_eq!(sam.ram_address(0x4000), 0x0000);

    // 64K parts: full 8-bit multiplex, no wrap within the bank.
    poke_bit(&mut sam, 13, false);
    poke_bit(&mut sam, 14, true); // M = 1x
    assert_eq!(sam.ram_address(0xFFFF), 0xFFFF);
    assert_eq!(sam.ram_address(0x8000), 0x8000);
}

#[test]
fn test_p1_selects_upper_bank_in_map_0() {
    let mut sam = Sam::new();
    poke_bit(&mut sam, 14, true); // 64K
    poke_bit(&mut sam, 10, true); // P1
    assert_eq!(sam.ram_address(0x0000), 0x8000);
    assert_eq!(sam.ram_address(0x1234), 0x9234);

    // Map type 1 exposes the whole array; P1 stops applying.
    poke_bit(&mut sam, 15, true);
    assert_eq!(sam.ram_address(0x0000), 0x0000);
}

#[test]
fn test_cycle_cost_slow_rate() {
    let sam = Sam::new();
    assert_eq!(sam.cycle_cost(0x0000), Ticks::new(SLOW_CYCLE));
    assert_eq!(sam.cycle_cost(0xC000), Ticks::new(SLOW_CYCLE));
}

#[test]
fn test_cycle_cost_address_dependent_rate() {
    let mut sam = Sam::new();
    poke_bit(&mut sam, 11, true); // R = 01
    assert_eq!(sam.cycle_cost(0x7FFF), Ticks::new(SLOW_CYCLE));
    assert_eq!(sam.cycle_cost(0x8000), Ticks::new(FAST_CYCLE));
    assert_eq!(sam.cycle_cost(0xFFFE), Ticks::new(FAST_CYCLE));

    // All-RAM map runs the AD rate slow everywhere.
    poke_bit(&mut sam, 15, true);
    assert_eq!(sam.cycle_cost(0x8000), Ticks::new(SLOW_CYCLE));
}

#[test]
fn test_cycle_cost_fast_rate() {
    let mut sam = Sam::new();
    poke_bit(&mut sam, 12, true); // R = 1x
    assert_eq!(sam.cycle_cost(0x0000), Ticks::new(FAST_CYCLE));
    assert_eq!(sam.cycle_cost(0x8000), Ticks::new(FAST_CYCLE));

    // Fast rate ignores the map type.
    poke_bit(&mut sam, 15, true);
    assert_eq!(sam.cycle_cost(0x0000), Ticks::new(FAST_CYCLE));
}

#[test]
fn test_vdg_text_row_replay() {
    let mut sam = Sam::new();
    // Mode 0: X undivided, 12 scanlines per text row.
    sam.vdg_fsync();
    for i in 0..32 {
        assert_eq!(sam.vdg_fetch(), i);
    }
    // Hsync clocks one dummy fetch then rewinds to the row start.
    sam.vdg_hsync();
    assert_eq!(sam.vdg_fetch(), 0, "scanline 2 re-reads the same bytes");

    // After 12 scanlines the counter is allowed to move on.
    for _ in 0..31 {
        sam.vdg_fetch();
    }
    for _ in 0..11 {
        sam.vdg_hsync();
        for _ in 0..32 {
            sam.vdg_fetch();
        }
    }
    sam.vdg_hsync();
    assert_eq!(sam.vdg_fetch(), 33, "row start advanced past the first line");
}

#[test]
fn test_vdg_x_divider() {
    let mut sam = Sam::new();
    poke_bit(&mut sam, 0, true); // V = 1: CG1, divide X by 3
    sam.vdg_fsync();

    // Three fetches per address step.
    assert_eq!(sam.vdg_fetch(), 0);
    assert_eq!(sam.vdg_fetch(), 0);
    assert_eq!(sam.vdg_fetch(), 0);
    assert_eq!(sam.vdg_fetch(), 1);
}

#[test]
fn test_vdg_divider_tables_per_mode() {
    // X and Y divide ratios for each V2..V0 selector value.
    let divs: [(u32, u32); 8] = [(1, 12), (3, 1), (1, 3), (2, 1), (1, 2), (1, 1), (1, 1), (1, 1)];
    for (mode, &(xdiv, ydiv)) in divs.iter().enumerate() {
        let mut sam = Sam::new();
        poke_bit(&mut sam, 0, mode & 1 != 0);
        poke_bit(&mut sam, 1, mode & 2 != 0);
        poke_bit(&mut sam, 2, mode & 4 != 0);
        sam.vdg_fsync();

        // Each address step spans exactly xdiv fetches.
        for step in 0..3u16 {
            for rep in 0..xdiv {
                assert_eq!(sam.vdg_fetch(), step, "mode {mode} rep {rep}");
            }
        }

        // An 8-step scanline replays for ydiv lines before the row moves on.
        for _ in 0..5 * xdiv {
            sam.vdg_fetch();
        }
        for line in 1..ydiv {
            sam.vdg_hsync();
            assert_eq!(sam.vdg_fetch(), 0, "mode {mode} line {line} replays");
            for _ in 0..8 * xdiv - 1 {
                sam.vdg_fetch();
            }
        }
        sam.vdg_hsync();
        assert!(sam.vdg_fetch() > 0, "mode {mode} advances after {ydiv} lines");
    }
}

#[test]
fn test_vdg_fsync_reloads_base() {
    let mut sam = Sam::new();
    poke_bit(&mut sam, 4, true); // F bit 1 -> base 0x0400
    sam.vdg_fsync();
    assert_eq!(sam.vdg_fetch(), 0x0400);

    for _ in 0..100 {
        sam.vdg_fetch();
    }
    sam.vdg_fsync();
    assert_eq!(sam.vdg_fetch(), 0x0400);
}

#[test]
fn test_snapshot_restore() {
    let mut sam = Sam::new();
    poke_bit(&mut sam, 14, true); // 64K
    poke_bit(&mut sam, 12, true); // fast rate
    poke_bit(&mut sam, 1, true); // V = 2
    sam.vdg_fsync();
    for _ in 0..7 {
        sam.vdg_fetch();
    }
    let state = sam.snapshot();

    let mut restored = Sam::new();
    restored.restore(&state);
    assert_eq!(restored.register(), sam.register());
    assert_eq!(restored.cycle_cost(0x0000), Ticks::new(FAST_CYCLE));
    assert_eq!(restored.ram_address(0xFFFF), 0xFFFF, "derived masks recomputed");
    assert_eq!(restored.vdg_fetch(), sam.vdg_fetch());
}

#[test]
fn test_reset_clears_everything() {
    let mut sam = Sam::new();
    sam.write_register(0xFFDF);
    sam.write_register(0xFFD7);
    sam.vdg_fsync();
    sam.vdg_fetch();

    sam.reset();
    assert_eq!(sam.register(), 0);
    assert!(!sam.map_type());
    assert_eq!(sam.cycle_cost(0x0000), Ticks::new(SLOW_CYCLE));
    assert_eq!(sam.vdg_fetch(), 0);
}
