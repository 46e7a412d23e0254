//! Byte-exact round trips and property tests over every cell variant.

mod common;

use common::{cell, raw_cell};
use proptest::prelude::*;
use regf_codec::*;

fn align8(len: usize) -> usize {
    (len + 7) & !7
}

fn signed(len: usize, allocated: bool) -> i32 {
    if allocated {
        -(len as i32)
    } else {
        len as i32
    }
}

fn assert_round_trip(data: &[u8], expected: CellType) -> Cell {
    let decoded = Cell::decode(data).unwrap();
    assert_eq!(decoded.cell_type(), expected);
    assert_eq!(decoded.cell_size(), data.len());
    assert_eq!(decoded.encode().unwrap(), data);
    decoded
}

#[test]
fn test_data_record_scenario() {
    let mut data = vec![0x10, 0x00, 0x00, 0x00];
    data.extend_from_slice(&[b'A'; 16]);

    let record = DataRecord::decode(&data).unwrap();
    assert_eq!(record.size, 16);
    assert_eq!(record.data, vec![b'A'; 16]);
    assert_eq!(record.encode().unwrap(), data);
}

#[test]
fn test_big_data_scenario() {
    let data = [
        0x10, 0x00, 0x00, 0x00, b'd', b'b', 0x02, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ];

    let cell = assert_round_trip(&data, CellType::BigData);
    match cell {
        Cell::BigData(db) => {
            assert_eq!(db.header.size, 16);
            assert_eq!(db.segment_count(), 2);
            assert_eq!(db.segment_list_offset, 9);
            assert_eq!(db.header.padding, vec![0u8; 4]);
        }
        other => panic!("unexpected cell: {:?}", other),
    }
}

#[test]
fn test_every_variant_round_trips() {
    let mut value = vec![0u8; 16];
    value.extend_from_slice(b"Name");
    assert_round_trip(&cell(-32, b"vk", 4, &value), CellType::KeyValue);

    let mut security = vec![0u8; 12];
    security.extend_from_slice(&8u32.to_le_bytes());
    security.extend_from_slice(&[0x11; 8]);
    assert_round_trip(&cell(-32, b"sk", 0, &security), CellType::KeySecurity);

    let offsets = [0x20u32.to_le_bytes(), 0x40u32.to_le_bytes()].concat();
    assert_round_trip(&cell(-16, b"li", 2, &offsets), CellType::IndexLeaf);
    assert_round_trip(&cell(-16, b"ri", 2, &offsets), CellType::IndexRoot);

    let named = [0x20u32.to_le_bytes(), *b"Soft"].concat();
    assert_round_trip(&cell(-16, b"lf", 1, &named), CellType::FastLeaf);
    assert_round_trip(&cell(-16, b"lh", 1, &named), CellType::HashLeaf);

    assert_round_trip(&common::KEY_NODE_CELL, CellType::KeyNode);
    assert_round_trip(&raw_cell(-24, 0x42), CellType::DataRecord);
}

#[test]
fn test_signature_fidelity() {
    // "nk" bytes whose fixed block happens to read like a vk layout.
    let mut body = vec![0u8; 72];
    body[0..4].copy_from_slice(&0x8000_0004u32.to_le_bytes());
    body[8..12].copy_from_slice(&4u32.to_le_bytes());
    let data = cell(-80, b"nk", 0x20, &body);
    assert_round_trip(&data, CellType::KeyNode);
}

#[test]
fn test_bounds_guard_reports_both_lengths() {
    let data = cell(-48, b"vk", 0, &[0u8; 16]);
    match Cell::decode(&data[..32]) {
        Err(RegistryError::OutOfBounds {
            required,
            available,
            ..
        }) => {
            assert_eq!(required, 48);
            assert_eq!(available, 32);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_variant_decoders_accept_unaligned_buffers() {
    let mut data = cell(-27, b"vk", 3, &[0u8; 16]);
    data[24..27].copy_from_slice(b"123");
    assert_eq!(data.len(), 27);

    let value = KeyValue::decode(&data).unwrap();
    assert_eq!(value.name, b"123");
    assert_eq!(value.encode().unwrap(), data);
    assert_eq!(Cell::decode(&data).unwrap_err().kind(), ErrorKind::MalformedInput);
}

fn key_value_bytes() -> impl Strategy<Value = Vec<u8>> {
    (
        prop::collection::vec(any::<u8>(), 0..48),
        any::<[u8; 16]>(),
        0usize..4,
        any::<bool>(),
        any::<u8>(),
    )
        .prop_map(|(name, fixed, extra, allocated, fill)| {
            let len = align8(8 + 16 + name.len()) + extra * 8;
            let mut body = fixed.to_vec();
            body.extend_from_slice(&name);
            let mut data = cell(signed(len, allocated), b"vk", name.len() as u16, &body);
            let tail = 8 + body.len();
            data[tail..].fill(fill);
            data
        })
}

fn key_node_bytes() -> impl Strategy<Value = Vec<u8>> {
    (
        prop::collection::vec(any::<u8>(), 0..64),
        prop::collection::vec(any::<u8>(), 68),
        any::<u16>(),
        any::<u16>(),
        0usize..3,
    )
        .prop_map(|(name, fixed, flags, class_len, extra)| {
            let len = align8(80 + name.len()) + extra * 8;
            let mut body = fixed;
            body.extend_from_slice(&(name.len() as u16).to_le_bytes());
            body.extend_from_slice(&class_len.to_le_bytes());
            body.extend_from_slice(&name);
            cell(-(len as i32), b"nk", flags, &body)
        })
}

fn security_bytes() -> impl Strategy<Value = Vec<u8>> {
    (prop::collection::vec(any::<u8>(), 0..96), any::<[u8; 12]>())
        .prop_map(|(descriptor, links)| {
            let len = align8(24 + descriptor.len());
            let mut body = links.to_vec();
            body.extend_from_slice(&(descriptor.len() as u32).to_le_bytes());
            body.extend_from_slice(&descriptor);
            cell(-(len as i32), b"sk", 0, &body)
        })
}

fn list_bytes() -> impl Strategy<Value = (Vec<u8>, CellType)> {
    (
        prop::sample::select(vec![
            (*b"li", CellType::IndexLeaf, 4usize),
            (*b"ri", CellType::IndexRoot, 4),
            (*b"lf", CellType::FastLeaf, 8),
            (*b"lh", CellType::HashLeaf, 8),
        ]),
        prop::collection::vec(any::<[u8; 8]>(), 0..32),
    )
        .prop_map(|((signature, cell_type, width), elements)| {
            let body: Vec<u8> = elements.iter().flat_map(|e| e[..width].to_vec()).collect();
            let len = align8(8 + body.len());
            let data = cell(-(len as i32), &signature, elements.len() as u16, &body);
            (data, cell_type)
        })
}

fn free_cell_bytes() -> impl Strategy<Value = Vec<u8>> {
    (
        1usize..32,
        prop::sample::select(vec![*b"nk", *b"vk", *b"sk", *b"li", *b"lf", *b"lh", *b"ri", *b"db", *b"??"]),
        any::<u8>(),
    )
        .prop_flat_map(|(blocks, signature, metadata)| {
            prop::collection::vec(any::<u8>(), blocks * 8 - 6).prop_map(move |payload| {
                let mut data = ((blocks * 8) as i32).to_le_bytes().to_vec();
                data.extend_from_slice(&signature);
                data.push(metadata);
                data.extend_from_slice(&payload);
                data.truncate(blocks * 8);
                data
            })
        })
}

proptest! {
    #[test]
    fn prop_key_value_round_trip(data in key_value_bytes()) {
        let cell = Cell::decode(&data).unwrap();
        prop_assert_eq!(cell.cell_type(), CellType::KeyValue);
        prop_assert_eq!(cell.encode().unwrap(), data);
    }

    #[test]
    fn prop_key_node_round_trip(data in key_node_bytes()) {
        let cell = Cell::decode(&data).unwrap();
        prop_assert_eq!(cell.cell_type(), CellType::KeyNode);
        prop_assert_eq!(cell.encode().unwrap(), data);
    }

    #[test]
    fn prop_security_round_trip(data in security_bytes()) {
        let cell = Cell::decode(&data).unwrap();
        prop_assert_eq!(cell.cell_type(), CellType::KeySecurity);
        prop_assert_eq!(cell.encode().unwrap(), data);
    }

    #[test]
    fn prop_list_round_trip((data, cell_type) in list_bytes()) {
        let cell = Cell::decode(&data).unwrap();
        prop_assert_eq!(cell.cell_type(), cell_type);
        prop_assert_eq!(cell.encode().unwrap(), data);
    }

    #[test]
    fn prop_free_cells_always_round_trip(data in free_cell_bytes()) {
        let cell = Cell::decode(&data).unwrap();
        prop_assert!(!cell.is_allocated());
        prop_assert_eq!(cell.encode().unwrap(), data);
    }

    #[test]
    fn prop_alignment_guard(len in 0usize..128) {
        prop_assume!(len % 8 != 0 || len == 0);
        let data = vec![0u8; len];
        prop_assert_eq!(Cell::decode(&data).unwrap_err().kind(), ErrorKind::MalformedInput);
        prop_assert_eq!(HBin::decode(&data).unwrap_err().kind(), ErrorKind::MalformedInput);
        prop_assert_eq!(HBinData::decode(&data).unwrap_err().kind(), ErrorKind::MalformedInput);
        prop_assert_eq!(Block::decode(&data).unwrap_err().kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn prop_bin_sequence_offsets(blocks in prop::collection::vec(0usize..64, 1..6)) {
        let mut data = Vec::new();
        let mut expected = Vec::new();
        for &cells in &blocks {
            let start = data.len() as u32;
            let size = 32 + cells as u32 * 8;
            expected.push(start);

            let body: Vec<Vec<u8>> = if cells == 0 {
                Vec::new()
            } else {
                vec![raw_cell(cells as i32 * 8, 0)]
            };
            data.extend(common::bin(start, size, 0, &body));
        }

        let hbins = HBinData::decode(&data).unwrap();
        prop_assert_eq!(hbins.len(), blocks.len());
        prop_assert_eq!(hbins.bin_offsets(), expected);
        prop_assert_eq!(hbins.encode().unwrap(), data);
    }
}

#[cfg(feature = "serde")]
#[test]
fn test_serde_json_round_trip() {
    let cell = Cell::decode(&common::KEY_NODE_CELL).unwrap();
    let json = serde_json::to_string(&cell).unwrap();
    let back: Cell = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cell);
    assert_eq!(back.encode().unwrap(), common::KEY_NODE_CELL);

    let bin = HBin::decode(&common::first_bin()).unwrap();
    let json = serde_json::to_value(&bin).unwrap();
    assert_eq!(json["header"]["size"], 4096);
    let back: HBin = serde_json::from_value(json).unwrap();
    assert_eq!(back, bin);
}
