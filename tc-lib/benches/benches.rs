use rand::Rng;

use ccsds_tc::bch::{BchCodeblock, BchConfig};
use ccsds_tc::cltu::Cltu;
use ccsds_tc::frame::{crc16, TcTransferFrame};
use ccsds_tc::pdu::{Pdu, PduHeader, PduParser};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};

fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

fn bench_crc16(c: &mut Criterion) {
    let data = random_bytes(1022);
    let mut group = c.benchmark_group("crc16");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("max_frame", |b| {
        b.iter(|| crc16(&data));
    });
    group.finish();
}

fn bench_bch_encode(c: &mut Criterion) {
    let data = random_bytes(7 * 128);
    let config = BchConfig::default();
    let mut group = c.benchmark_group("bch");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("encode", |b| {
        b.iter(|| {
            for chunk in data.chunks(7) {
                BchCodeblock::encode(chunk, config).unwrap();
            }
        });
    });
    group.finish();
}

fn bench_cltu_from_frames(c: &mut Criterion) {
    let frames = TcTransferFrame::builder()
        .scid(100)
        .vcid(1)
        .data(&random_bytes(1017))
        .build()
        .unwrap();
    let mut group = c.benchmark_group("cltu");
    group.throughput(Throughput::Bytes(1024));
    group.bench_function("from_frames", |b| {
        b.iter(|| Cltu::from_frames(frames.clone(), BchConfig::default()).unwrap());
    });
    group.finish();
}

fn bench_pdu_parse(c: &mut Criterion) {
    let mut data = Vec::new();
    for seq in 0..16 {
        let hdr = PduHeader::builder()
            .crc_flag(true)
            .source_entity(1)
            .sequence_number(seq)
            .dest_entity(2)
            .build();
        data.extend(Pdu::new(hdr, &random_bytes(50)).unwrap().data);
    }
    let parser = PduParser::new();
    let mut group = c.benchmark_group("pdu");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("parse", |b| {
        b.iter(|| {
            let zult = parser.parse(&data);
            assert_eq!(zult.pdus.len(), 16);
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_crc16,
    bench_bch_encode,
    bench_cltu_from_frames,
    bench_pdu_parse,
);
criterion_main!(benches);
