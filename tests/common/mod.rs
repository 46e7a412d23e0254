//! Hand-assembled hive fixtures shared by the integration tests.

#![allow(dead_code)]

use regf_codec::utils::calculate_checksum;

/// Key node cell from a real hive: allocated, 120 bytes, compressed name
/// `{49ede77f-4b2f-45b8-b1f8-5bc740182bdf}` followed by two padding bytes.
pub const KEY_NODE_CELL: [u8; 120] = [
    0x88, 0xff, 0xff, 0xff, // size -120
    0x6e, 0x6b, // "nk"
    0x2c, 0x00, // flags
    0xbc, 0xfc, 0xf8, 0xab, 0x2b, 0xfc, 0xd2, 0x01, // last written
    0x00, 0x00, 0x00, 0x00, // access bits
    0xa8, 0x07, 0x00, 0x00, // parent
    0x02, 0x00, 0x00, 0x00, // subkey count
    0x00, 0x00, 0x00, 0x00, // volatile subkey count
    0xf8, 0x03, 0x00, 0x00, // subkey list offset
    0xff, 0xff, 0xff, 0xff, // volatile subkey list offset
    0x00, 0x00, 0x00, 0x00, // value count
    0xff, 0xff, 0xff, 0xff, // value list offset
    0x98, 0x00, 0x00, 0x00, // security offset
    0xff, 0xff, 0xff, 0xff, // class name offset
    0x20, 0x00, 0x00, 0x00, // max subkey name length
    0x00, 0x00, 0x00, 0x00, // max subkey class length
    0x00, 0x00, 0x00, 0x00, // max value name length
    0x00, 0x00, 0x00, 0x00, // max value data length
    0x00, 0x00, 0x00, 0x00, // work var
    0x26, 0x00, // name length
    0x00, 0x00, // class name length
    0x7b, 0x34, 0x39, 0x65, 0x64, 0x65, 0x37, 0x37, //
    0x66, 0x2d, 0x34, 0x62, 0x32, 0x66, 0x2d, 0x34, //
    0x35, 0x62, 0x38, 0x2d, 0x62, 0x31, 0x66, 0x38, //
    0x2d, 0x35, 0x62, 0x63, 0x37, 0x34, 0x30, 0x31, //
    0x38, 0x32, 0x62, 0x64, 0x66, 0x7d, 0x00, 0x00, // name + padding
];

/// Name carried by [`KEY_NODE_CELL`].
pub const KEY_NODE_NAME: &str = "{49ede77f-4b2f-45b8-b1f8-5bc740182bdf}";

/// Timestamp of the first bin in [`sample_hive`].
pub const BIN_TIMESTAMP: u64 = 0x01d2_fcdd_c7ec_1046;

/// Size of each bin in [`sample_hive`].
pub const BIN_SIZE: u32 = 0x1000;

/// Offset of the root key node in [`sample_hive`].
pub const ROOT_OFFSET: u32 = 0x20;

/// Offsets of the cells in the first bin of [`sample_hive`].
pub const FAST_LEAF_OFFSET: u32 = 0x98;
pub const VALUE_OFFSET: u32 = 0xa8;
pub const SECURITY_OFFSET: u32 = 0xc8;
pub const BIG_DATA_OFFSET: u32 = 0xf8;
pub const DATA_RECORD_OFFSET: u32 = 0x108;
pub const FIRST_FREE_OFFSET: u32 = 0x118;

/// Offsets of the cells in the second bin of [`sample_hive`].
pub const INDEX_LEAF_OFFSET: u32 = 0x1020;
pub const INDEX_ROOT_OFFSET: u32 = 0x1030;
pub const STALE_KEY_OFFSET: u32 = 0x1040;

/// Trailing bytes after the bin area of [`sample_hive`].
pub const REMNANT: [u8; 16] = [0xee; 16];

/// Builds a structured cell: prologue, body, zero padding up to `|size|`.
pub fn cell(size: i32, signature: &[u8; 2], metadata: u16, body: &[u8]) -> Vec<u8> {
    let mut data = size.to_le_bytes().to_vec();
    data.extend_from_slice(signature);
    data.extend_from_slice(&metadata.to_le_bytes());
    data.extend_from_slice(body);
    assert!(data.len() <= size.unsigned_abs() as usize, "cell body too long");
    data.resize(size.unsigned_abs() as usize, 0);
    data
}

/// Builds a raw cell: size field followed by `fill` up to `|size|`.
pub fn raw_cell(size: i32, fill: u8) -> Vec<u8> {
    let mut data = size.to_le_bytes().to_vec();
    data.resize(size.unsigned_abs() as usize, fill);
    data
}

/// Builds a bin whose cells must fill `size` exactly.
pub fn bin(offset: u32, size: u32, timestamp: u64, cells: &[Vec<u8>]) -> Vec<u8> {
    let mut data = b"hbin".to_vec();
    data.extend_from_slice(&offset.to_le_bytes());
    data.extend_from_slice(&size.to_le_bytes());
    data.extend_from_slice(&0u64.to_le_bytes());
    data.extend_from_slice(&timestamp.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    for cell in cells {
        data.extend_from_slice(cell);
    }
    assert_eq!(data.len(), size as usize, "cells do not fill the bin");
    data
}

/// Builds a valid version 1.5 base block with a correct checksum.
pub fn base_block(hive_length: u32, root_cell_offset: u32) -> Vec<u8> {
    let mut data = vec![0u8; 4096];
    data[0..4].copy_from_slice(b"regf");
    data[4..8].copy_from_slice(&1u32.to_le_bytes());
    data[8..12].copy_from_slice(&1u32.to_le_bytes());
    data[12..20].copy_from_slice(&0x01d2_fc2b_abf8_fcbcu64.to_le_bytes());
    data[20..24].copy_from_slice(&1u32.to_le_bytes());
    data[24..28].copy_from_slice(&5u32.to_le_bytes());
    data[32..36].copy_from_slice(&1u32.to_le_bytes());
    data[36..40].copy_from_slice(&root_cell_offset.to_le_bytes());
    data[40..44].copy_from_slice(&hive_length.to_le_bytes());
    data[44..48].copy_from_slice(&1u32.to_le_bytes());
    for (i, unit) in "SYSTEM".encode_utf16().enumerate() {
        data[48 + i * 2..50 + i * 2].copy_from_slice(&unit.to_le_bytes());
    }
    data[4088..4092].copy_from_slice(&2u32.to_le_bytes());

    let checksum = calculate_checksum(&data);
    data[508..512].copy_from_slice(&checksum.to_le_bytes());
    data
}

/// First bin: every structured variant except li/ri, a data record and a
/// large free cell.
pub fn first_bin() -> Vec<u8> {
    let mut fast_leaf = Vec::new();
    fast_leaf.extend_from_slice(&ROOT_OFFSET.to_le_bytes());
    fast_leaf.extend_from_slice(b"{49e");

    let mut value = Vec::new();
    value.extend_from_slice(&0x8000_0004u32.to_le_bytes()); // inline, 4 bytes
    value.extend_from_slice(&0x0000_002au32.to_le_bytes());
    value.extend_from_slice(&4u32.to_le_bytes()); // REG_DWORD
    value.extend_from_slice(&1u16.to_le_bytes()); // compressed name
    value.extend_from_slice(&0u16.to_le_bytes());
    value.extend_from_slice(b"Ver");

    let mut security = Vec::new();
    security.extend_from_slice(&SECURITY_OFFSET.to_le_bytes());
    security.extend_from_slice(&SECURITY_OFFSET.to_le_bytes());
    security.extend_from_slice(&1u32.to_le_bytes());
    security.extend_from_slice(&20u32.to_le_bytes());
    security.extend_from_slice(&[0x01, 0x00, 0x04, 0x80]);
    security.extend_from_slice(&[0x5d; 16]);

    let big_data = DATA_RECORD_OFFSET.to_le_bytes();

    let mut record = (-16i32).to_le_bytes().to_vec();
    record.extend_from_slice(&(0x2000u32).to_le_bytes());
    record.extend_from_slice(&(0x4000u32).to_le_bytes());
    record.extend_from_slice(&[0u8; 4]);

    let free = raw_cell((BIN_SIZE - FIRST_FREE_OFFSET) as i32, 0);

    bin(
        0,
        BIN_SIZE,
        BIN_TIMESTAMP,
        &[
            KEY_NODE_CELL.to_vec(),
            cell(-16, b"lf", 1, &fast_leaf),
            cell(-32, b"vk", 3, &value),
            cell(-48, b"sk", 0, &security),
            cell(-16, b"db", 2, &big_data),
            record,
            free,
        ],
    )
}

/// Second bin: an index leaf, an index root and a free cell whose stale
/// `nk` contents no longer decode.
pub fn second_bin() -> Vec<u8> {
    let mut index_leaf = Vec::new();
    index_leaf.extend_from_slice(&ROOT_OFFSET.to_le_bytes());
    index_leaf.extend_from_slice(&0x5000u32.to_le_bytes());

    let index_root = FAST_LEAF_OFFSET.to_le_bytes();

    let stale_size = (BIN_SIZE - (STALE_KEY_OFFSET - BIN_SIZE)) as i32;
    let mut stale = raw_cell(stale_size, 0xcc);
    stale[4..6].copy_from_slice(b"nk");

    bin(
        BIN_SIZE,
        BIN_SIZE,
        0,
        &[
            cell(-16, b"li", 2, &index_leaf),
            cell(-16, b"ri", 1, &index_root),
            stale,
        ],
    )
}

/// Complete hive image: base block, two bins and a remnant.
pub fn sample_hive() -> Vec<u8> {
    let mut data = base_block(2 * BIN_SIZE, ROOT_OFFSET);
    data.extend(first_bin());
    data.extend(second_bin());
    data.extend_from_slice(&REMNANT);
    data
}
