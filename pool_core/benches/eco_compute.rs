use std::time::Duration;

use chrono::NaiveDate;
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use pool_core::eco::EcoMode;
use pool_core::status::Encoder;

fn start() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .unwrap_or_default()
}

fn bench_compute(c: &mut Criterion) {
    let now = start();
    c.bench_function("eco_compute_10h_3_periods", |b| {
        b.iter_batched(
            || {
                let mut eco = EcoMode::new(now, Encoder::tracing());
                eco.set_daily(Duration::from_secs(10 * 3600));
                eco.set_period(3);
                eco
            },
            |mut eco| {
                eco.compute(black_box(now));
                black_box(eco.on_duration())
            },
            BatchSize::SmallInput,
        );
    });

    // one simulated day of 10 s ticks
    c.bench_function("eco_update_day", |b| {
        b.iter_batched(
            || EcoMode::new(now, Encoder::tracing()),
            |mut eco| {
                let mut t = now;
                for _ in 0..8640 {
                    t += chrono::TimeDelta::seconds(10);
                    eco.update(t, 1.0);
                }
                black_box(eco.elapsed())
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_compute);
criterion_main!(benches);
