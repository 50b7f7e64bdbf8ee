use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

use trainload::{
    AthleteThresholds, EngineOptions, InMemoryRepository, Session, Sport, TrainingLoadEngine,
    TssCalculator, TssMethod, ZoneCalculator, ZoneTable,
};

fn day(n: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 9, 4).unwrap() + Days::new(n)
}

fn thresholds() -> AthleteThresholds {
    AthleteThresholds {
        ftp: Some(240),
        lthr: Some(168),
        threshold_pace: Some(Decimal::new(38, 1)),
        css: Some(Decimal::new(12, 1)),
        ..AthleteThresholds::default()
    }
}

fn engine() -> TrainingLoadEngine<InMemoryRepository> {
    let engine = TrainingLoadEngine::new(InMemoryRepository::new(), EngineOptions::default()).unwrap();
    engine.update_thresholds("p1", &thresholds()).unwrap();
    engine
}

fn session(id: String, date: NaiveDate, sport: Sport, seconds: u32) -> Session {
    let mut session = Session::new(id, "p1", date, sport, seconds);
    session.avg_heart_rate = Some(148);
    match sport {
        Sport::Cycling => session.normalized_power = Some(210),
        Sport::Running => session.distance = Some(Decimal::from(seconds * 3)),
        Sport::Swimming => session.distance = Some(Decimal::from(seconds)),
        _ => {}
    }
    session
}

fn assert_contiguous(table: &ZoneTable) -> Result<(), TestCaseError> {
    prop_assert_eq!(table.zones[0].min, Decimal::ZERO);
    prop_assert!(table.zones.last().unwrap().max.is_none());
    for pair in table.zones.windows(2) {
        prop_assert_eq!(pair[0].max, Some(pair[1].min));
        prop_assert!(pair[0].min <= pair[1].min);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn pmc_has_one_point_per_day(
        days in proptest::collection::btree_set(0u64..90, 1..25),
        extra in 0u64..20,
    ) {
        let engine = engine();
        let sessions: Vec<Session> = days
            .iter()
            .map(|&n| session(format!("s{}", n), day(n), Sport::Cycling, 3600))
            .collect();
        engine.record_sessions(sessions).unwrap();

        let first = *days.iter().next().unwrap();
        let today = day(days.iter().last().unwrap() + extra);
        let pmc = engine.get_pmc("p1", 365, today).unwrap();

        prop_assert_eq!(pmc.history.len() as i64, (today - day(first)).num_days() + 1);
        prop_assert_eq!(pmc.history[0].date, day(first));
        for pair in pmc.history.windows(2) {
            prop_assert_eq!((pair[1].date - pair[0].date).num_days(), 1);
        }
        for point in &pmc.history {
            let offset = (point.date - day(0)).num_days() as u64;
            prop_assert_eq!(point.tss > Decimal::ZERO, days.contains(&offset));
        }
    }

    #[test]
    fn pmc_reads_are_idempotent(
        days in proptest::collection::btree_set(0u64..60, 1..20),
        today in 60u64..75,
    ) {
        let engine = engine();
        for n in &days {
            engine.record_session(session(format!("s{}", n), day(*n), Sport::Running, 2700)).unwrap();
        }
        let first = engine.get_pmc("p1", 90, day(today)).unwrap();
        let second = engine.get_pmc("p1", 90, day(today)).unwrap();
        prop_assert_eq!(&first, &second);

        engine.store().invalidate("p1");
        prop_assert_eq!(engine.get_pmc("p1", 90, day(today)).unwrap(), first);
    }

    #[test]
    fn zones_are_contiguous_for_any_threshold(
        ftp in 1u16..700,
        lthr in 40u16..220,
        pace_cm in 50i64..800,
    ) {
        let zones = ZoneCalculator::calculate_all_zones(&AthleteThresholds {
            ftp: Some(ftp),
            lthr: Some(lthr),
            threshold_pace: Some(Decimal::new(pace_cm, 2)),
            css: Some(Decimal::new(pace_cm, 2)),
            ..AthleteThresholds::default()
        });

        assert_contiguous(zones.power.as_ref().unwrap())?;
        assert_contiguous(zones.heart_rate.as_ref().unwrap())?;
        assert_contiguous(zones.pace.as_ref().unwrap())?;
        assert_contiguous(zones.swim.as_ref().unwrap())?;
    }

    #[test]
    fn tss_fallback_follows_data_availability(
        seconds in 1u32..14400,
        power in 80u16..450,
        hr in 90u16..200,
    ) {
        let thresholds = thresholds();
        let mut with_power = Session::new("p", "p1", day(0), Sport::Cycling, seconds);
        with_power.normalized_power = Some(power);
        with_power.avg_heart_rate = Some(hr);
        prop_assert_eq!(TssCalculator::calculate_tss(&with_power, &thresholds).method, TssMethod::PowerBased);

        let mut hr_only = Session::new("h", "p1", day(0), Sport::Cycling, seconds);
        hr_only.avg_heart_rate = Some(hr);
        prop_assert_eq!(TssCalculator::calculate_tss(&hr_only, &thresholds).method, TssMethod::HeartRateBased);

        let bare = Session::new("b", "p1", day(0), Sport::Strength, seconds);
        let estimated = TssCalculator::calculate_tss(&bare, &thresholds);
        prop_assert_eq!(estimated.method, TssMethod::Estimated);
        prop_assert!(estimated.tss > Decimal::ZERO);
    }

    #[test]
    fn untrained_sports_are_never_weak_points(
        bike in proptest::collection::vec(1200u32..7200, 7),
        run in proptest::collection::vec(1200u32..5400, 7),
        skip in proptest::collection::btree_set(0usize..7, 0..4),
    ) {
        let engine = engine();
        let skipped: BTreeSet<usize> = skip;
        let mut sessions = Vec::new();
        for week in 0..7usize {
            let base = week as u64 * 7;
            sessions.push(session(format!("b{}", week), day(base + 1), Sport::Cycling, bike[week]));
            if !skipped.contains(&week) {
                sessions.push(session(format!("r{}", week), day(base + 3), Sport::Running, run[week]));
            }
        }
        engine.record_sessions(sessions).unwrap();

        let score = engine.get_tri_score("p1", day(48)).unwrap();
        for recommendation in &score.balance.recommendations {
            prop_assert!(!recommendation.contains(Sport::Swimming.label()));
            prop_assert!(!recommendation.contains(Sport::Strength.label()));
        }
        prop_assert!(score.balance.weakest != Some(Sport::Swimming));
        prop_assert!(score.balance.weakest != Some(Sport::Strength));
        for sport in &score.sports {
            prop_assert!(sport.score >= Decimal::ZERO && sport.score <= Decimal::from(100));
        }
    }
}
