//! Checksum unit tests, including the classic RFC 1071 example.

use crate::checksum;
use crate::types::Ipv4Addr;

#[test]
fn rfc1071_example() {
    // Words 0x0001 0xf203 0xf4f5 0xf6f7 sum to 0x2ddf0; folded 0xddf2,
    // complemented 0x220d.
    let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
    assert_eq!(checksum::add_bytes(&data), 0x2ddf0);
    assert_eq!(checksum::finalize(checksum::add_bytes(&data)), 0x220d);
}

#[test]
fn odd_trailing_byte_pads_low_half() {
    assert_eq!(checksum::add_bytes(&[0xab]), 0xab00);
    assert_eq!(checksum::finalize(checksum::add_bytes(&[0xab])), 0x54ff);
}

#[test]
fn finalize_nonzero_substitutes_all_ones() {
    // A sum that folds to 0xffff complements to zero.
    assert_eq!(checksum::finalize(0xffff), 0);
    assert_eq!(checksum::finalize_nonzero(0xffff), 0xffff);
    // Non-zero results pass through unchanged.
    assert_eq!(checksum::finalize_nonzero(0), 0xffff);
}

#[test]
fn stored_checksum_verifies_to_zero() {
    // Law: recomputing over the region with the computed checksum patched
    // in folds to zero.
    let mut header: [u8; 20] = [
        0x45, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x40, 0x11, 0x00, 0x00, 0x0a, 0x00, 0x02,
        0x0f, 0x0a, 0x00, 0x02, 0x01,
    ];
    let csum = checksum::ipv4_header_checksum(&header);
    assert_ne!(csum, 0);
    header[10..12].copy_from_slice(&csum.to_be_bytes());
    assert_eq!(checksum::ipv4_header_checksum(&header), 0);
}

#[test]
fn pseudo_header_accumulates_addresses_protocol_and_length() {
    let src = Ipv4Addr([10, 0, 2, 15]);
    let dst = Ipv4Addr([10, 0, 2, 1]);
    let sum = checksum::pseudo_header_sum(src, dst, 17, 13);
    let expected = 0x0a00u32 + 0x020f + 0x0a00 + 0x0201 + 17 + 13;
    assert_eq!(sum, expected);
}
