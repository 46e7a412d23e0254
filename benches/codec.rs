use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use regf_codec::{Cell, HBinData, Hive, ReadOptions, WriteOptions};

const BIN_SIZE: usize = 0x1000;
const BIN_COUNT: usize = 64;

fn value_cell(index: u32) -> Vec<u8> {
    let mut data = (-32i32).to_le_bytes().to_vec();
    data.extend_from_slice(b"vk");
    data.extend_from_slice(&4u16.to_le_bytes());
    data.extend_from_slice(&0x8000_0004u32.to_le_bytes());
    data.extend_from_slice(&index.to_le_bytes());
    data.extend_from_slice(&4u32.to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(format!("v{:03}", index % 1000).as_bytes());
    data.resize(32, 0);
    data
}

fn bin_area() -> Vec<u8> {
    let mut data = Vec::with_capacity(BIN_SIZE * BIN_COUNT);
    for bin in 0..BIN_COUNT {
        let start = data.len();
        data.extend_from_slice(b"hbin");
        data.extend_from_slice(&((bin * BIN_SIZE) as u32).to_le_bytes());
        data.extend_from_slice(&(BIN_SIZE as u32).to_le_bytes());
        data.extend_from_slice(&[0u8; 20]);
        for i in 0..(BIN_SIZE - 32) / 32 {
            data.extend(value_cell((bin * 1000 + i) as u32));
        }
        debug_assert_eq!(data.len() - start, BIN_SIZE);
    }
    data
}

fn hive_image() -> Vec<u8> {
    let bins = bin_area();
    let mut data = vec![0u8; 4096];
    data[0..4].copy_from_slice(b"regf");
    data[20..24].copy_from_slice(&1u32.to_le_bytes());
    data[24..28].copy_from_slice(&5u32.to_le_bytes());
    data[36..40].copy_from_slice(&0x20u32.to_le_bytes());
    data[40..44].copy_from_slice(&(bins.len() as u32).to_le_bytes());
    data.extend(bins);
    data
}

fn bench_cell_decode(c: &mut Criterion) {
    let cell = value_cell(7);
    c.bench_function("decode vk cell", |b| b.iter(|| Cell::decode(black_box(&cell))));
}

fn bench_bin_sequence(c: &mut Criterion) {
    let data = bin_area();
    let mut group = c.benchmark_group("bin sequence");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("decode", |b| b.iter(|| HBinData::decode(black_box(&data))));

    let hbins = HBinData::decode(&data).expect("bench bins decode");
    group.bench_function("encode", |b| b.iter(|| black_box(&hbins).encode()));
    group.finish();
}

fn bench_hive_round_trip(c: &mut Criterion) {
    let data = hive_image();
    c.bench_function("hive load + to_bytes", |b| {
        b.iter(|| {
            let hive = Hive::load(black_box(&data), &ReadOptions::all()).expect("load");
            hive.to_bytes(&WriteOptions::all()).expect("to_bytes")
        })
    });
}

criterion_group!(benches, bench_cell_decode, bench_bin_sequence, bench_hive_round_trip);
criterion_main!(benches);
