use ember_core::device::crc16::{ccitt, Crc16};

#[test]
fn test_known_vector() {
    // The standard CCITT-FALSE check value.
    assert_eq!(ccitt(0xFFFF, b"123456789"), 0x29B1);
}

#[test]
fn test_empty_slice_preserves_init() {
    assert_eq!(ccitt(0x1234, &[]), 0x1234);
    assert_eq!(ccitt(0xFFFF, &[]), 0xFFFF);
}

#[test]
fn test_update_matches_update_block() {
    let data = [0xA1, 0xA1, 0xA1, 0xFE, 0x11, 0x00, 0x03, 0x01];
    let one_at_a_time = data.iter().fold(Crc16::PRESET, |c, &b| c.update(b));
    let block = Crc16::PRESET.update_block(&data);
    assert_eq!(one_at_a_time, block);
}

#[test]
fn test_span_plus_crc_sums_to_zero() {
    // An ID field the way the controller writes it: three A1 sync bytes,
    // the mark, the four ID bytes, then the big-endian remainder.
    let mut field = vec![0xA1, 0xA1, 0xA1, 0xFE, 0x22, 0x00, 0x0A, 0x01];
    let crc = ccitt(0xFFFF, &field);
    field.push((crc >> 8) as u8);
    field.push(crc as u8);
    assert_eq!(ccitt(0xFFFF, &field), 0);
}

#[test]
fn test_single_density_framing_omits_sync_bytes() {
    // Single density checksums from the mark itself; no A1 run.
    let mut field = vec![0xFE, 0x22, 0x00, 0x0A, 0x01];
    let crc = ccitt(0xFFFF, &field);
    field.push((crc >> 8) as u8);
    field.push(crc as u8);
    assert_eq!(ccitt(0xFFFF, &field), 0);
}

#[test]
fn test_corruption_is_detected() {
    let mut field = vec![0xA1, 0xA1, 0xA1, 0xFB];
    field.extend(std::iter::repeat_n(0xE5, 256));
    let crc = ccitt(0xFFFF, &field);
    field.push((crc >> 8) as u8);
    field.push(crc as u8);
    assert_eq!(ccitt(0xFFFF, &field), 0);

    field[10] ^= 0x01;
    assert_ne!(ccitt(0xFFFF, &field), 0);
}

#[test]
fn test_default_is_preset() {
    assert_eq!(Crc16::default(), Crc16::PRESET);
    assert_eq!(Crc16::PRESET.value(), 0xFFFF);
}

#[test]
fn test_resumable_accumulation() {
    // A running CRC can be carried across chunk boundaries.
    let data = b"the quick brown fox";
    let (head, tail) = data.split_at(7);
    let split = Crc16::PRESET.update_block(head).update_block(tail);
    assert_eq!(split.value(), ccitt(0xFFFF, data));
}
