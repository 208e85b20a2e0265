//! Criterion benchmarks for the per-frame consumer path.
//!
//! Every displayed frame is decoded, calibrated, and measured on the consumer's
//! refresh tick, so this path bounds the achievable refresh rate.
//!
//! Run with: cargo bench --bench frame_pipeline

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use probe_daq::calibration::{CalibrationPipeline, OutlierFilter};
use probe_daq::decoder::SampleDecoder;
use probe_daq::frame::RawFrame;
use probe_daq::measurement::Measurements;
use probe_daq::settings::InstrumentSettings;
use probe_daq::stream::{FrameCodec, WireFormat};
use tokio_util::codec::Decoder;

const FRAME_SIZE: usize = 1000;

/// A sine sweep across the code range, a few periods per frame.
fn sine_frame(decoder: &SampleDecoder) -> RawFrame {
    let codes = (0..FRAME_SIZE)
        .map(|i| {
            let phase = i as f64 / FRAME_SIZE as f64 * 5.0 * std::f64::consts::TAU;
            decoder.encode_volts(0.5 * phase.sin())
        })
        .collect();
    RawFrame::new(codes)
}

fn decode_frame(c: &mut Criterion) {
    let decoder = SampleDecoder::default();
    let frame = sine_frame(&decoder);

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(FRAME_SIZE as u64));
    group.bench_function("decode_frame", |b| {
        b.iter(|| decoder.decode_frame(black_box(&frame)));
    });
    group.finish();
}

/// Compare the outlier strategies, which dominate calibration cost.
fn calibrate_frame(c: &mut Criterion) {
    let decoder = SampleDecoder::default();
    let samples = decoder.decode_frame(&sine_frame(&decoder));
    let settings = InstrumentSettings::default();

    let filters = vec![
        ("disabled", OutlierFilter::Disabled),
        ("median_4", OutlierFilter::Median { window: 4 }),
        ("percentile_1_99", OutlierFilter::default()),
    ];

    let mut group = c.benchmark_group("calibrate");
    group.throughput(Throughput::Elements(FRAME_SIZE as u64));
    for (name, filter) in filters {
        let pipeline = CalibrationPipeline::default().with_outlier_filter(filter);
        group.bench_with_input(BenchmarkId::new("calibrate_frame", name), &samples, |b, s| {
            b.iter(|| pipeline.calibrate_frame(black_box(s), &settings));
        });
    }
    group.finish();
}

/// Wire bytes to measurements, as one refresh tick does it.
fn full_tick(c: &mut Criterion) {
    let decoder = SampleDecoder::default();
    let pipeline = CalibrationPipeline::default();
    let settings = InstrumentSettings::default();
    let wire: Vec<u8> = sine_frame(&decoder)
        .codes()
        .iter()
        .flat_map(|code| code.to_be_bytes())
        .collect();

    c.bench_function("full_tick", |b| {
        b.iter(|| {
            let mut codec = FrameCodec::new(FRAME_SIZE, WireFormat::TCP);
            let mut buf = BytesMut::from(black_box(&wire[..]));
            if let Ok(Some(raw)) = codec.decode(&mut buf) {
                let samples = decoder.decode_frame(&raw);
                let frame = pipeline.calibrate_frame(&samples, &settings);
                black_box(Measurements::of_frame(&frame));
            }
        });
    });
}

criterion_group!(benches, decode_frame, calibrate_frame, full_tick);
criterion_main!(benches);
