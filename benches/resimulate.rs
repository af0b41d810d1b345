//! Benchmarks for the rollback hot paths: a full-window resimulation per
//! step (the worst case the client can hit) and the wire codec.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rollback_netcode::game::prediction::PredictionEngine;
use rollback_netcode::network::protocol::SnapshotEntry;
use rollback_netcode::{
    InputFrame, InputRecord, Message, ParticipantId, ParticipantState, Vec3, MAX_PARTICIPANTS,
    ROLLBACK_WINDOW,
};

fn pid(raw: u8) -> ParticipantId {
    ParticipantId::new(raw).unwrap()
}

fn bench_resimulate_full_window(c: &mut Criterion) {
    let mut engine = PredictionEngine::new(pid(1), 1000);
    for raw in 2..=4u8 {
        engine.join(pid(raw));
    }

    let frame = InputFrame::from_flags(true, false, false, true);
    let mut tick = 1000u32;

    c.bench_function("resimulate_full_window", |b| {
        b.iter(|| {
            tick += 1;
            // A remote input from the oldest reachable tick forces a
            // rollback across the entire window every step.
            let arrived = [InputRecord {
                participant: pid(2),
                tick: tick - (ROLLBACK_WINDOW as u32 - 1),
                frame,
            }];
            black_box(engine.advance(&arrived, frame).unwrap());
        });
    });
}

fn bench_codec_input(c: &mut Criterion) {
    let msg = Message::ClientInput(InputRecord {
        participant: pid(3),
        tick: 123_456,
        frame: InputFrame::from_flags(true, true, false, false),
    });
    let bytes = msg.encode();

    c.bench_function("codec_input_roundtrip", |b| {
        b.iter(|| {
            let decoded = Message::decode(black_box(&bytes)).unwrap();
            black_box(decoded.encode())
        });
    });
}

fn bench_codec_snapshot(c: &mut Criterion) {
    let entries: Vec<SnapshotEntry> = (1..=MAX_PARTICIPANTS as u8)
        .map(|raw| SnapshotEntry {
            participant: pid(raw),
            state: ParticipantState {
                position: Vec3::new(raw as f32, 0.0, -(raw as f32)),
                ..Default::default()
            },
        })
        .collect();
    let msg = Message::StateSnapshot {
        tick: 5000,
        entries,
    };
    let bytes = msg.encode();

    c.bench_function("codec_snapshot_roundtrip", |b| {
        b.iter(|| {
            let decoded = Message::decode(black_box(&bytes)).unwrap();
            black_box(decoded.encode())
        });
    });
}

criterion_group!(
    benches,
    bench_resimulate_full_window,
    bench_codec_input,
    bench_codec_snapshot
);
criterion_main!(benches);
