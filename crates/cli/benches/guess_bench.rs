use criterion::{black_box, criterion_group, criterion_main, Criterion};
use guesstz::engine::Guesser;
use guesstz_db::{Db, DbBuilder};
use guesstz_expand::{
    expand, ByDay, Repeat, RuleComponent, Weekday, Window, ZoneDefinition,
};
use jiff::{civil, Timestamp};

fn ts(s: &str) -> Timestamp {
    s.parse().unwrap()
}

/// A two-rule daylight-saving zone whose offsets are shifted by `shift`
/// seconds, so many distinct histories share the database.
fn dst_zone(shift: i32) -> ZoneDefinition {
    ZoneDefinition {
        components: vec![
            RuleComponent {
                start: civil::datetime(1996, 10, 27, 3, 0, 0, 0),
                offset_from: 7200 + shift,
                offset_to: 3600 + shift,
                daylight: false,
                repeat: Some(Repeat {
                    until: None,
                    month: 10,
                    by_day: Some(ByDay {
                        nth: -1,
                        weekday: Weekday::Sunday,
                    }),
                    interval: 1,
                }),
                extra_dates: vec![],
            },
            RuleComponent {
                start: civil::datetime(1981, 3, 29, 2, 0, 0, 0),
                offset_from: 3600 + shift,
                offset_to: 7200 + shift,
                daylight: true,
                repeat: Some(Repeat {
                    until: None,
                    month: 3,
                    by_day: Some(ByDay {
                        nth: -1,
                        weekday: Weekday::Sunday,
                    }),
                    interval: 1,
                }),
                extra_dates: vec![],
            },
        ],
    }
}

fn build_db() -> Db {
    let mut b = DbBuilder::new(
        ts("2000-01-01T00:00:00Z"),
        ts("2032-01-01T00:00:00Z"),
        "bench",
    )
    .unwrap();
    for i in 0..200 {
        b.add_zone(&format!("Bench/Zone{i:03}"), &dst_zone(i * 60))
            .unwrap();
    }
    Db::from_bytes(b.to_bytes().unwrap()).unwrap()
}

fn bench_expand(c: &mut Criterion) {
    let zone = dst_zone(0);
    let window = Window::closed(
        ts("2000-01-01T00:00:00Z"),
        ts("2032-01-01T00:00:00Z"),
    )
    .unwrap();
    c.bench_function("expand_dst_zone_32y", |b| {
        b.iter(|| expand(black_box(&zone), window).unwrap())
    });
}

fn bench_guess(c: &mut Criterion) {
    let guesser = Guesser::new(build_db());
    let zone = dst_zone(0);
    let start = ts("2005-06-01T00:00:00Z");
    c.bench_function("guess_dst_zone_200_candidates", |b| {
        b.iter(|| guesser.guess(black_box(&zone), start, None).unwrap())
    });
}

criterion_group!(benches, bench_expand, bench_guess);
criterion_main!(benches);
