//! Training load engine: the operations exposed to callers.
//!
//! Sessions and thresholds live in a [`SessionRepository`]; the PMC series is
//! a cache in [`PmcStore`], built lazily on read and repaired eagerly when a
//! session or threshold changes.

use crate::efficiency::{EfficiencyAnalyzer, EfficiencyConfig, EfficiencyTrend};
use crate::error::{Result, TrainLoadError};
use crate::models::{AthleteThresholds, Session, Sport};
use crate::pmc::{PmcCalculator, PmcConfig, PmcPoint, PmcSeed, ProjectedLoad, ProjectionPoint};
use crate::repository::{RepositoryError, SessionRepository};
use crate::store::{DailyLoad, PmcSeries, PmcStore};
use crate::triscore::{
    CompositeScore, DateWindow, TriScoreCalculator, TriScoreConfig, TriScoreInput, TriScoreWindows,
};
use crate::tss::{TssCalculator, TssResult};
use crate::zones::{ZoneCalculator, ZoneSet};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunables for every analysis the engine runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    pub pmc: PmcConfig,

    /// Days of rest projected past the last real PMC point
    pub projection_horizon_days: u32,
    pub tri_score: TriScoreConfig,
    pub efficiency: EfficiencyConfig,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            pmc: PmcConfig::default(),
            projection_horizon_days: 14,
            tri_score: TriScoreConfig::default(),
            efficiency: EfficiencyConfig::default(),
        }
    }
}

/// PMC view returned to callers, rounded for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PmcResponse {
    pub history: Vec<PmcPoint>,
    pub projections: Vec<ProjectionPoint>,
    pub current: Option<PmcPoint>,
}

impl PmcResponse {
    fn empty() -> Self {
        PmcResponse {
            history: Vec::new(),
            projections: Vec::new(),
            current: None,
        }
    }
}

pub struct TrainingLoadEngine<R: SessionRepository> {
    repository: R,
    store: PmcStore,
    options: EngineOptions,
    tri_score: TriScoreCalculator,
    efficiency: EfficiencyAnalyzer,
}

impl<R: SessionRepository> TrainingLoadEngine<R> {
    pub fn new(repository: R, options: EngineOptions) -> Result<Self> {
        options.pmc.validate()?;
        Ok(TrainingLoadEngine {
            repository,
            store: PmcStore::new(PmcCalculator::with_config(options.pmc.clone())),
            tri_score: TriScoreCalculator::with_config(options.tri_score.clone()),
            efficiency: EfficiencyAnalyzer::with_config(options.efficiency.clone()),
            options,
        })
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn store(&self) -> &PmcStore {
        &self.store
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn compute_zones(&self, thresholds: &AthleteThresholds) -> ZoneSet {
        ZoneCalculator::calculate_all_zones(thresholds)
    }

    pub fn compute_session_tss(&self, session: &Session, thresholds: &AthleteThresholds) -> TssResult {
        TssCalculator::calculate_tss(session, thresholds)
    }

    /// Zones from the athlete's current thresholds
    pub fn zones_for(&self, athlete_id: &str) -> Result<ZoneSet> {
        let thresholds = self.repository.thresholds(athlete_id)?;
        Ok(self.compute_zones(&thresholds))
    }

    fn thresholds_or_default(&self, athlete_id: &str) -> Result<AthleteThresholds> {
        match self.repository.thresholds(athlete_id) {
            Ok(thresholds) => Ok(thresholds),
            Err(RepositoryError::AthleteNotFound(_)) => Ok(AthleteThresholds::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Daily totals for an inclusive range. Sessions stored without a TSS get
    /// one computed from current thresholds and written back first.
    fn load_daily(&self, athlete_id: &str, from: NaiveDate, to: NaiveDate) -> Result<DailyLoad> {
        let mut sessions = self.repository.sessions(athlete_id, Some(from), Some(to))?;

        if sessions.iter().any(|s| s.tss.is_none()) {
            let thresholds = self.thresholds_or_default(athlete_id)?;
            for session in sessions.iter_mut().filter(|s| s.tss.is_none()) {
                let result = TssCalculator::apply(session, &thresholds);
                self.repository.update_session_tss(&session.id, &result)?;
            }
        }

        Ok(self.store.calculator().aggregate_daily_tss(&sessions))
    }

    /// Compute and cache a session's TSS, persist it, and repair any cached
    /// PMC from the earliest affected date
    pub fn record_session(&self, session: Session) -> Result<TssResult> {
        let mut affected = BTreeMap::new();
        let result = self.store_with_tss(session, &mut affected);
        self.repair(&affected)?;
        result
    }

    /// Bulk variant of [`record_session`](Self::record_session): one PMC repair per athlete
    pub fn record_sessions(&self, sessions: Vec<Session>) -> Result<usize> {
        let mut affected = BTreeMap::new();
        let count = sessions.len();
        let stored = sessions
            .into_iter()
            .try_for_each(|session| self.store_with_tss(session, &mut affected).map(drop));

        // Sessions written before a failure are already visible to reads
        let repaired = self.repair(&affected);
        stored?;
        repaired?;
        info!(sessions = count, athletes = affected.len(), "Recorded sessions");
        Ok(count)
    }

    fn store_with_tss(
        &self,
        mut session: Session,
        affected: &mut BTreeMap<String, NaiveDate>,
    ) -> Result<TssResult> {
        if session.athlete_id.is_empty() {
            return Err(TrainLoadError::Validation(format!(
                "Session {} has no athlete",
                session.id
            )));
        }

        let thresholds = self.thresholds_or_default(&session.athlete_id)?;
        let previous = self.repository.session(&session.id)?;

        let result = TssCalculator::apply(&mut session, &thresholds);
        self.repository.store_session(&session)?;
        debug!(
            session = %session.id,
            athlete = %session.athlete_id,
            tss = %result.tss,
            method = result.method.as_str(),
            "Stored session"
        );

        // A replaced session may have moved dates or athletes
        for (athlete, date) in previous
            .iter()
            .map(|p| (p.athlete_id.clone(), p.date))
            .chain(std::iter::once((session.athlete_id.clone(), session.date)))
        {
            affected
                .entry(athlete)
                .and_modify(|earliest: &mut NaiveDate| *earliest = (*earliest).min(date))
                .or_insert(date);
        }

        Ok(result)
    }

    /// Recompute cached series from each athlete's earliest changed date.
    /// A series that cannot be repaired is dropped so the next read rebuilds it.
    fn repair(&self, affected: &BTreeMap<String, NaiveDate>) -> Result<()> {
        let mut first_error = None;
        for (athlete_id, from) in affected {
            if let Err(e) = self.repair_athlete(athlete_id, *from) {
                warn!(athlete = %athlete_id, error = %e, "PMC repair failed, dropping cached series");
                self.store.invalidate(athlete_id);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn repair_athlete(&self, athlete_id: &str, from: NaiveDate) -> Result<()> {
        self.store
            .repair_from(athlete_id, from, |f, t| self.load_daily(athlete_id, f, t))?;
        Ok(())
    }

    /// Replace an athlete's thresholds and recompute every session's TSS
    /// against them. Returns the number of sessions recomputed.
    pub fn update_thresholds(&self, athlete_id: &str, thresholds: &AthleteThresholds) -> Result<usize> {
        self.repository.save_thresholds(athlete_id, thresholds)?;

        let sessions = self.repository.sessions(athlete_id, None, None)?;
        let updated = sessions.iter().try_for_each(|session| {
            let result = TssCalculator::calculate_tss(session, thresholds);
            self.repository.update_session_tss(&session.id, &result)
        });

        if let Some(first) = sessions.first().map(|s| s.date) {
            // Some sessions may carry new TSS even when the update stopped early
            let repaired = if updated.is_ok() {
                self.repair_athlete(athlete_id, first)
            } else {
                self.store.invalidate(athlete_id);
                Ok(())
            };
            updated?;
            if let Err(e) = repaired {
                self.store.invalidate(athlete_id);
                return Err(e);
            }
        }
        info!(athlete = athlete_id, sessions = sessions.len(), "Updated thresholds");

        Ok(sessions.len())
    }

    /// Rebuild the athlete's series from a starting fitness carried over from
    /// another system. The seed is kept for later repairs of the cached series.
    pub fn seed_pmc(&self, athlete_id: &str, seed: PmcSeed, today: NaiveDate) -> Result<Option<Arc<PmcSeries>>> {
        self.repository.thresholds(athlete_id)?;
        let Some(first) = self.repository.first_session_date(athlete_id)? else {
            return Ok(None);
        };
        if first > today {
            return Ok(None);
        }
        let series = self
            .store
            .rebuild(athlete_id, first, today, seed, |f, t| self.load_daily(athlete_id, f, t))?;
        Ok(Some(series))
    }

    /// The athlete's series from the first session through `today`, built or
    /// extended as needed. `None` when there is no session on or before `today`.
    fn series_for(&self, athlete_id: &str, today: NaiveDate) -> Result<Option<Arc<PmcSeries>>> {
        self.repository.thresholds(athlete_id)?;

        if let Some(tomorrow) = today.checked_add_days(Days::new(1)) {
            let future = self.repository.sessions(athlete_id, Some(tomorrow), None)?;
            if !future.is_empty() {
                warn!(
                    athlete = athlete_id,
                    today = %today,
                    sessions = future.len(),
                    "Ignoring sessions dated after today"
                );
            }
        }

        let Some(first) = self.repository.first_session_date(athlete_id)? else {
            return Ok(None);
        };
        if first > today {
            return Ok(None);
        }

        let load = |f, t| self.load_daily(athlete_id, f, t);
        let cached = self.store.snapshot(athlete_id);
        let starts_at_first = cached
            .as_ref()
            .is_some_and(|series| series.first_date() == Some(first));

        if let Some(series) = cached.as_ref().filter(|_| starts_at_first) {
            if series.last_date().is_some_and(|last| last > today) {
                // Earlier view of a longer cached series: slice, keep the cache
                return Ok(Some(Arc::new(series.through(today))));
            }
        }

        if starts_at_first {
            if let Some(series) = self.store.extend_to(athlete_id, today, load)? {
                return Ok(Some(series));
            }
            // Invalidated between the check and the extend
            let seed = cached.map(|s| s.seed).unwrap_or_default();
            return self
                .store
                .rebuild(athlete_id, first, today, seed, |f, t| self.load_daily(athlete_id, f, t))
                .map(Some);
        }

        let seed = cached.map(|s| s.seed).unwrap_or_default();
        self.store.rebuild(athlete_id, first, today, seed, load).map(Some)
    }

    /// PMC history for the last `days` days with a rest projection
    pub fn get_pmc(&self, athlete_id: &str, days: u32, today: NaiveDate) -> Result<PmcResponse> {
        self.get_pmc_with_plan(athlete_id, days, today, &ProjectedLoad::Rest)
    }

    /// PMC history with a projection under a caller-supplied load
    pub fn get_pmc_with_plan(
        &self,
        athlete_id: &str,
        days: u32,
        today: NaiveDate,
        load: &ProjectedLoad,
    ) -> Result<PmcResponse> {
        if days == 0 {
            return Err(TrainLoadError::Validation(
                "PMC window must cover at least one day".to_string(),
            ));
        }

        let Some(series) = self.series_for(athlete_id, today)? else {
            debug!(athlete = athlete_id, "No sessions, empty PMC");
            return Ok(PmcResponse::empty());
        };

        let projections = self.store.calculator().project(
            &series.points,
            self.options.projection_horizon_days,
            load,
        )?;

        Ok(PmcResponse {
            history: series.tail(days as usize).iter().map(PmcPoint::rounded).collect(),
            projections: projections.iter().map(ProjectionPoint::rounded).collect(),
            current: series.current().map(PmcPoint::rounded),
        })
    }

    /// Composite per-sport scores for the week ending `today`
    pub fn get_tri_score(&self, athlete_id: &str, today: NaiveDate) -> Result<CompositeScore> {
        let weeks = self.tri_score.config().baseline_weeks;
        let windows = TriScoreWindows::ending(today, weeks).ok_or_else(|| {
            TrainLoadError::Validation(format!("Date {} is out of range for scoring", today))
        })?;

        // Also ensures every session up to today carries a TSS
        let series = self.series_for(athlete_id, today)?;
        let pmc = series.as_ref().and_then(|s| s.current().cloned());

        let aggregate = |window: DateWindow| {
            self.repository
                .weekly_aggregate(athlete_id, window.start, window.end)
        };
        let current = aggregate(windows.current)?;
        let prior = aggregate(windows.prior)?;
        let baseline = aggregate(windows.baseline)?;

        let input = TriScoreInput::from_aggregates(today, &current, &prior, &baseline, weeks, pmc);
        let score = self.tri_score.calculate(&input);
        debug!(
            athlete = athlete_id,
            overall = %score.overall,
            balanced = score.balance.balanced,
            "Computed Tri-Score"
        );
        Ok(score)
    }

    /// EF trend for one sport over the last `days` days
    pub fn get_efficiency_trend(
        &self,
        athlete_id: &str,
        sport: Sport,
        days: u32,
        today: NaiveDate,
    ) -> Result<EfficiencyTrend> {
        if days == 0 {
            return Err(TrainLoadError::Validation(
                "Efficiency window must cover at least one day".to_string(),
            ));
        }
        self.repository.thresholds(athlete_id)?;

        let from = today
            .checked_sub_days(Days::new(u64::from(days) - 1))
            .ok_or_else(|| TrainLoadError::Validation(format!("Window of {} days is out of range", days)))?;
        let sessions = self.repository.sessions(athlete_id, Some(from), Some(today))?;
        Ok(self.efficiency.analyze(&sessions, sport))
    }

    /// Rebuild every athlete's series through `today`, athletes in parallel
    pub fn refresh_all(&self, today: NaiveDate) -> Result<Vec<(String, Result<Arc<PmcSeries>>)>> {
        let mut jobs = Vec::new();
        for athlete_id in self.repository.athlete_ids()? {
            match self.repository.first_session_date(&athlete_id)? {
                Some(first) if first <= today => jobs.push((athlete_id, first, today)),
                _ => self.store.invalidate(&athlete_id),
            }
        }

        let results = self
            .store
            .rebuild_many(&jobs, |athlete_id, from, to| self.load_daily(athlete_id, from, to));

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(athletes = results.len(), failed, today = %today, "Refreshed PMC series");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap() + Days::new(n)
    }

    fn create_test_engine() -> TrainingLoadEngine<InMemoryRepository> {
        let engine =
            TrainingLoadEngine::new(InMemoryRepository::new(), EngineOptions::default()).unwrap();
        let thresholds = AthleteThresholds {
            ftp: Some(250),
            lthr: Some(165),
            threshold_pace: Some(dec!(4.0)),
            ..AthleteThresholds::default()
        };
        engine.update_thresholds("a1", &thresholds).unwrap();
        engine
    }

    fn ride(id: &str, date: NaiveDate, np: u16) -> Session {
        let mut session = Session::new(id, "a1", date, Sport::Cycling, 3600);
        session.normalized_power = Some(np);
        session.avg_heart_rate = Some(140);
        session
    }

    #[test]
    fn test_record_session_caches_tss() {
        let engine = create_test_engine();
        let result = engine.record_session(ride("r1", day(0), 250)).unwrap();
        assert_eq!(result.tss, dec!(100));

        let stored = engine.repository().session("r1").unwrap().unwrap();
        assert_eq!(stored.tss, Some(dec!(100)));
        assert_eq!(stored.intensity_factor, Some(dec!(1)));
    }

    #[test]
    fn test_get_pmc_history_and_projection() {
        let engine = create_test_engine();
        engine.record_session(ride("r1", day(0), 250)).unwrap();
        engine.record_session(ride("r2", day(3), 200)).unwrap();

        let pmc = engine.get_pmc("a1", 30, day(9)).unwrap();
        assert_eq!(pmc.history.len(), 10);
        assert_eq!(pmc.history[0].date, day(0));
        assert_eq!(pmc.history[3].tss, dec!(64));
        assert_eq!(pmc.projections.len(), 14);
        assert_eq!(pmc.projections[0].date, day(10));
        assert_eq!(pmc.current.as_ref().map(|p| p.date), Some(day(9)));

        let short = engine.get_pmc("a1", 3, day(9)).unwrap();
        assert_eq!(short.history.len(), 3);
        assert_eq!(short.history[0].date, day(7));
    }

    #[test]
    fn test_retroactive_edit_matches_fresh_engine() {
        let engine = create_test_engine();
        for (i, np) in [220u16, 180, 240, 200].iter().enumerate() {
            engine
                .record_session(ride(&format!("r{}", i), day(i as u64 * 2), *np))
                .unwrap();
        }
        engine.get_pmc("a1", 30, day(12)).unwrap();

        // Edit an early session after the series is cached
        engine.record_session(ride("r1", day(2), 300)).unwrap();
        let repaired = engine.get_pmc("a1", 30, day(12)).unwrap();

        let fresh = create_test_engine();
        for session in engine.repository().sessions("a1", None, None).unwrap() {
            fresh.record_session(session).unwrap();
        }
        assert_eq!(repaired, fresh.get_pmc("a1", 30, day(12)).unwrap());
        assert_eq!(repaired.history[2].tss, dec!(144));
    }

    #[test]
    fn test_session_before_first_rebuilds() {
        let engine = create_test_engine();
        engine.record_session(ride("r1", day(5), 250)).unwrap();
        assert_eq!(engine.get_pmc("a1", 60, day(8)).unwrap().history.len(), 4);

        engine.record_session(ride("r0", day(1), 250)).unwrap();
        let pmc = engine.get_pmc("a1", 60, day(8)).unwrap();
        assert_eq!(pmc.history.len(), 8);
        assert_eq!(pmc.history[0].date, day(1));
    }

    #[test]
    fn test_threshold_update_recomputes_tss() {
        let engine = create_test_engine();
        engine.record_session(ride("r1", day(0), 250)).unwrap();
        let before = engine.get_pmc("a1", 7, day(1)).unwrap();

        let raised = AthleteThresholds {
            ftp: Some(300),
            ..engine.repository().thresholds("a1").unwrap()
        };
        assert_eq!(engine.update_thresholds("a1", &raised).unwrap(), 1);

        let stored = engine.repository().session("r1").unwrap().unwrap();
        assert_eq!(stored.tss, Some(dec!(69.4)));
        let after = engine.get_pmc("a1", 7, day(1)).unwrap();
        assert!(after.history[0].ctl <= before.history[0].ctl);
        assert_eq!(after.history[0].tss, dec!(69.4));
    }

    #[test]
    fn test_contract_violations() {
        let engine = create_test_engine();
        assert!(matches!(
            engine.get_pmc("a1", 0, day(0)),
            Err(TrainLoadError::Validation(_))
        ));
        assert!(matches!(
            engine.get_pmc("nobody", 7, day(0)),
            Err(TrainLoadError::Repository(RepositoryError::AthleteNotFound(_)))
        ));
        assert!(engine
            .get_efficiency_trend("a1", Sport::Cycling, 0, day(0))
            .is_err());
    }

    #[test]
    fn test_no_sessions_and_future_sessions() {
        let engine = create_test_engine();
        let empty = engine.get_pmc("a1", 7, day(0)).unwrap();
        assert!(empty.history.is_empty() && empty.current.is_none());

        engine.record_session(ride("future", day(20), 250)).unwrap();
        assert!(engine.get_pmc("a1", 7, day(0)).unwrap().current.is_none());

        engine.record_session(ride("past", day(0), 250)).unwrap();
        let pmc = engine.get_pmc("a1", 30, day(5)).unwrap();
        assert_eq!(pmc.history.len(), 6);
        assert!(pmc.history.iter().all(|p| p.date <= day(5)));
    }

    #[test]
    fn test_seeded_series() {
        let engine = create_test_engine();
        engine.record_session(ride("r1", day(0), 250)).unwrap();
        let seed = PmcSeed {
            ctl: dec!(50),
            atl: dec!(40),
        };
        engine.seed_pmc("a1", seed, day(3)).unwrap().unwrap();

        let pmc = engine.get_pmc("a1", 7, day(3)).unwrap();
        assert_eq!(pmc.history[0].tsb, dec!(10));
        assert!(pmc.history[0].ctl > dec!(50));
    }

    #[test]
    fn test_sessions_without_tss_are_filled_on_read() {
        let engine = create_test_engine();
        engine
            .repository()
            .store_session(&ride("raw", day(0), 250))
            .unwrap();

        let pmc = engine.get_pmc("a1", 7, day(0)).unwrap();
        assert_eq!(pmc.history[0].tss, dec!(100));
        let stored = engine.repository().session("raw").unwrap().unwrap();
        assert_eq!(stored.tss, Some(dec!(100)));
    }

    #[test]
    fn test_tri_score_and_efficiency() {
        let engine = create_test_engine();
        for n in 0..50u64 {
            if n % 2 == 0 {
                engine
                    .record_session(ride(&format!("ride_{}", n), day(n), 200 + n as u16))
                    .unwrap();
            }
        }
        let mut run = Session::new("run_1", "a1", day(48), Sport::Running, 3000);
        run.distance = Some(dec!(10000));
        run.avg_heart_rate = Some(150);
        engine.record_session(run).unwrap();

        let score = engine.get_tri_score("a1", day(49)).unwrap();
        let bike = score.sport(Sport::Cycling).unwrap();
        assert!(bike.score > Decimal::ZERO);
        assert!(bike.activity_count > 0);
        assert!(score.pmc.is_some());
        assert!(score.sport(Sport::Swimming).map_or(true, |s| s.activity_count == 0));
        assert!(!score
            .balance
            .recommendations
            .iter()
            .any(|r| r.contains("Swim") || r.contains("Strength")));

        let trend = engine
            .get_efficiency_trend("a1", Sport::Cycling, 50, day(49))
            .unwrap();
        assert_eq!(trend.points.len(), 25);
        assert_eq!(trend.trend_direction, crate::efficiency::TrendDirection::Improving);
    }

    #[test]
    fn test_refresh_all() {
        let engine = create_test_engine();
        engine.record_session(ride("r1", day(0), 250)).unwrap();
        let mut other = ride("r2", day(2), 200);
        other.athlete_id = "a2".to_string();
        engine.record_session(other).unwrap();

        let results = engine.refresh_all(day(4)).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(engine.store().snapshot("a1").unwrap().points.len(), 5);
        assert_eq!(engine.store().snapshot("a2").unwrap().points.len(), 3);
    }

    #[test]
    fn test_failed_bulk_write_still_repairs_cache() {
        let engine = create_test_engine();
        engine.record_session(ride("r0", day(0), 250)).unwrap();
        engine.record_session(ride("r2", day(6), 200)).unwrap();
        engine.get_pmc("a1", 30, day(9)).unwrap();

        let orphan = Session::new("orphan", "", day(4), Sport::Running, 1800);
        let result = engine.record_sessions(vec![ride("r1", day(3), 250), orphan]);
        assert!(matches!(result, Err(TrainLoadError::Validation(_))));
        assert_eq!(engine.repository().sessions("a1", None, None).unwrap().len(), 3);

        let cached = engine.get_pmc("a1", 30, day(9)).unwrap();
        assert_eq!(cached.history[3].tss, dec!(100));

        let fresh = create_test_engine();
        fresh
            .record_sessions(engine.repository().sessions("a1", None, None).unwrap())
            .unwrap();
        assert_eq!(cached, fresh.get_pmc("a1", 30, day(9)).unwrap());
    }

    /// Delegates to memory but refuses TSS updates for one session
    #[derive(Default)]
    struct FailingTssRepository {
        inner: InMemoryRepository,
        refuse: std::sync::RwLock<Option<String>>,
    }

    impl SessionRepository for FailingTssRepository {
        fn thresholds(&self, athlete_id: &str) -> std::result::Result<AthleteThresholds, RepositoryError> {
            self.inner.thresholds(athlete_id)
        }

        fn save_thresholds(
            &self,
            athlete_id: &str,
            thresholds: &AthleteThresholds,
        ) -> std::result::Result<(), RepositoryError> {
            self.inner.save_thresholds(athlete_id, thresholds)
        }

        fn sessions(
            &self,
            athlete_id: &str,
            from: Option<NaiveDate>,
            to: Option<NaiveDate>,
        ) -> std::result::Result<Vec<Session>, RepositoryError> {
            self.inner.sessions(athlete_id, from, to)
        }

        fn session(&self, session_id: &str) -> std::result::Result<Option<Session>, RepositoryError> {
            self.inner.session(session_id)
        }

        fn store_session(&self, session: &Session) -> std::result::Result<(), RepositoryError> {
            self.inner.store_session(session)
        }

        fn update_session_tss(
            &self,
            session_id: &str,
            result: &TssResult,
        ) -> std::result::Result<(), RepositoryError> {
            if self.refuse.read().unwrap().as_deref() == Some(session_id) {
                return Err(RepositoryError::Storage(format!("disk full writing {}", session_id)));
            }
            self.inner.update_session_tss(session_id, result)
        }

        fn athlete_ids(&self) -> std::result::Result<Vec<String>, RepositoryError> {
            self.inner.athlete_ids()
        }
    }

    #[test]
    fn test_failed_threshold_update_drops_cache() {
        let engine =
            TrainingLoadEngine::new(FailingTssRepository::default(), EngineOptions::default()).unwrap();
        let ftp = |watts| AthleteThresholds {
            ftp: Some(watts),
            ..AthleteThresholds::default()
        };
        engine.update_thresholds("a1", &ftp(250)).unwrap();
        engine.record_session(ride("r0", day(0), 200)).unwrap();
        engine.record_session(ride("r1", day(3), 200)).unwrap();
        assert_eq!(engine.get_pmc("a1", 30, day(6)).unwrap().history[0].tss, dec!(64));

        *engine.repository().refuse.write().unwrap() = Some("r1".to_string());
        assert!(engine.update_thresholds("a1", &ftp(200)).is_err());
        assert!(engine.store().snapshot("a1").is_none());

        // r0 was rescored before the failure, r1 keeps its old TSS
        let pmc = engine.get_pmc("a1", 30, day(6)).unwrap();
        assert_eq!(pmc.history[0].tss, dec!(100));
        assert_eq!(pmc.history[3].tss, dec!(64));
    }

    #[test]
    fn test_earlier_day_reads_slice_of_cache() {
        let engine = create_test_engine();
        engine.record_session(ride("r0", day(0), 250)).unwrap();
        engine.record_session(ride("r1", day(5), 220)).unwrap();
        engine.record_session(ride("r2", day(10), 240)).unwrap();
        engine.get_pmc("a1", 30, day(12)).unwrap();
        let version = engine.store().snapshot("a1").unwrap().version;

        let early = engine.get_pmc("a1", 30, day(8)).unwrap();
        assert_eq!(early.history.len(), 9);
        assert_eq!(early.current.as_ref().map(|p| p.date), Some(day(8)));
        assert_eq!(early.projections[0].date, day(9));

        let cached = engine.store().snapshot("a1").unwrap();
        assert_eq!(cached.version, version);
        assert_eq!(cached.last_date(), Some(day(12)));

        let fresh = create_test_engine();
        fresh
            .record_sessions(engine.repository().sessions("a1", None, None).unwrap())
            .unwrap();
        assert_eq!(early, fresh.get_pmc("a1", 30, day(8)).unwrap());
    }
}
