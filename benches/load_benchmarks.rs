use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use trainload::pmc::{PmcCalculator, PmcSeed, ProjectedLoad};
use trainload::repository::InMemoryRepository;
use trainload::tss::TssCalculator;
use trainload::zones::ZoneCalculator;
use trainload::{AthleteThresholds, EngineOptions, Session, SessionRepository, Sport, TrainingLoadEngine};

/// Throughput of the load calculations over growing histories

fn benchmark_thresholds() -> AthleteThresholds {
    AthleteThresholds {
        ftp: Some(250),
        lthr: Some(165),
        threshold_pace: Some(dec!(4.0)),
        css: Some(dec!(1.25)),
        max_hr: Some(190),
        resting_hr: Some(50),
    }
}

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn create_session_history(days: u32) -> Vec<Session> {
    (0..days)
        .filter(|day| day % 7 != 6)
        .map(|day| {
            let sport = match day % 3 {
                0 => Sport::Cycling,
                1 => Sport::Running,
                _ => Sport::Swimming,
            };
            let date = start_date() + Duration::days(day as i64);
            let mut session = Session::new(format!("s{}", day), "bench", date, sport, 3600 + (day % 5) * 600);
            session.avg_heart_rate = Some(140 + (day % 20) as u16);
            match sport {
                Sport::Cycling => session.normalized_power = Some(200 + (day % 40) as u16),
                Sport::Running => session.distance = Some(Decimal::from(10_000 + (day % 6) * 500)),
                _ => session.distance = Some(Decimal::from(3_000)),
            }
            session
        })
        .collect()
}

fn scored_history(days: u32) -> Vec<Session> {
    let thresholds = benchmark_thresholds();
    let mut sessions = create_session_history(days);
    for session in &mut sessions {
        TssCalculator::apply(session, &thresholds);
    }
    sessions
}

fn bench_tss_calculation(c: &mut Criterion) {
    let thresholds = benchmark_thresholds();
    let mut group = c.benchmark_group("TSS Calculation");

    for &size in &[10u32, 100, 1000] {
        let sessions = create_session_history(size);

        group.throughput(Throughput::Elements(sessions.len() as u64));
        group.bench_with_input(BenchmarkId::new("calculate_tss", size), &sessions, |b, sessions| {
            b.iter(|| {
                for session in sessions {
                    black_box(TssCalculator::calculate_tss(session, &thresholds));
                }
            });
        });
    }

    group.finish();
}

fn bench_pmc_calculation(c: &mut Criterion) {
    let calculator = PmcCalculator::new();
    let mut group = c.benchmark_group("PMC Calculation");

    for &days in &[30u32, 365, 3650] {
        let daily = calculator.aggregate_daily_tss(&scored_history(days));
        let end = start_date() + Duration::days(days as i64 - 1);

        group.throughput(Throughput::Elements(days as u64));
        group.bench_with_input(BenchmarkId::new("calculate_pmc_series", days), &daily, |b, daily| {
            b.iter(|| calculator.calculate_pmc_series(black_box(daily), start_date(), end));
        });
    }

    group.finish();
}

fn bench_pmc_incremental(c: &mut Criterion) {
    let calculator = PmcCalculator::new();
    let days = 3650;
    let daily = calculator.aggregate_daily_tss(&scored_history(days));
    let end = start_date() + Duration::days(days as i64 - 1);
    let existing = calculator.calculate_pmc_series(&daily, start_date(), end).unwrap();

    let mut group = c.benchmark_group("PMC Incremental");

    // Backfill near the end touches a short suffix; near the start, almost all of it
    for &offset in &[7i64, 365, 3000] {
        let from = end - Duration::days(offset);
        group.bench_with_input(BenchmarkId::new("rebuild_from", offset), &from, |b, &from| {
            b.iter(|| calculator.rebuild_from(&existing, from, &daily, end, PmcSeed::default()));
        });
    }

    for &horizon in &[14u32, 90] {
        group.bench_with_input(BenchmarkId::new("project", horizon), &horizon, |b, &horizon| {
            b.iter(|| calculator.project(&existing, horizon, &ProjectedLoad::Constant(dec!(60))));
        });
    }

    group.finish();
}

fn bench_zone_calculation(c: &mut Criterion) {
    let thresholds = benchmark_thresholds();
    c.bench_function("calculate_all_zones", |b| {
        b.iter(|| ZoneCalculator::calculate_all_zones(black_box(&thresholds)));
    });
}

fn bench_engine_queries(c: &mut Criterion) {
    let repository = InMemoryRepository::new();
    repository.save_thresholds("bench", &benchmark_thresholds()).unwrap();
    let engine = TrainingLoadEngine::new(repository, EngineOptions::default()).unwrap();
    engine.record_sessions(create_session_history(730)).unwrap();
    let today = start_date() + Duration::days(729);

    let mut group = c.benchmark_group("Engine Queries");
    group.bench_function("get_pmc_cached", |b| {
        b.iter(|| engine.get_pmc("bench", 90, today));
    });
    group.bench_function("get_tri_score", |b| {
        b.iter(|| engine.get_tri_score("bench", today));
    });
    group.bench_function("get_efficiency_trend", |b| {
        b.iter(|| engine.get_efficiency_trend("bench", Sport::Cycling, 180, today));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_tss_calculation,
    bench_pmc_calculation,
    bench_pmc_incremental,
    bench_zone_calculation,
    bench_engine_queries
);
criterion_main!(benches);
