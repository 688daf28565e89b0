use chrono::{Duration, TimeZone, Utc};
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use glyco_core::{CarbEntry, Engine, EngineSettings, GlucoseReading, InsulinDose, PredictionSnapshot};

// Synthetic day: sine-shaped glucose with additive noise every 5 min,
// a bolus and a meal every few hours, and a run of temp basals.
fn synth_snapshot(hours: i64, noise_amp: f64, seed: u32) -> PredictionSnapshot {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let start = now - Duration::hours(hours);
    // tiny PRNG
    let mut state = seed.max(1);
    let mut next_f64 = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        f64::from(x) / (f64::from(u32::MAX) + 1.0)
    };

    let n = hours * 12;
    let glucose: Vec<GlucoseReading> = (0..=n)
        .map(|i| {
            let t = i as f64 / 40.0;
            let noise = (next_f64() * 2.0 - 1.0) * noise_amp;
            GlucoseReading::sensor(start + Duration::minutes(5 * i), 140.0 + 40.0 * t.sin() + noise)
        })
        .collect();

    let mut doses = Vec::new();
    let mut carbs = Vec::new();
    for h in (0..hours).step_by(4) {
        let at = start + Duration::hours(h);
        carbs.push(CarbEntry::new(at, 45.0));
        doses.push(InsulinDose::bolus(at, 3.0));
        doses.push(InsulinDose::temp_basal(
            at + Duration::minutes(60),
            at + Duration::minutes(90),
            0.8,
        ));
    }

    PredictionSnapshot::builder()
        .with_glucose(glucose)
        .with_settings(EngineSettings::default())
        .at(now)
        .with_doses(doses)
        .with_carbs(carbs)
        .dose_history_complete_since(start)
        .build()
        .expect("synthetic snapshot is valid")
}

pub fn bench_evaluate(c: &mut Criterion) {
    let mut g = c.benchmark_group("evaluate");
    // Allow quick tweaking without CLI flags (Criterion 0.5):
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p glyco_core --bench predictor
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(1));
        }
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }

    let engine = Engine::new();
    for &hours in &[8i64, 24] {
        let snap = synth_snapshot(hours, 3.0, 0xC0FFEE);
        g.bench_function(format!("history_{hours}h"), |b| {
            b.iter_batched(
                || snap.clone(),
                |s| {
                    let out = engine.evaluate(black_box(&s));
                    black_box(out.is_ok());
                },
                BatchSize::SmallInput,
            )
        });
    }
    g.finish();
}

criterion_group!(predictor, bench_evaluate);
criterion_main!(predictor);
