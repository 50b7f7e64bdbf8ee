//! Per-athlete PMC cache.
//!
//! Each athlete has a slot with a writer lock and a published snapshot.
//! Writers hold the lock for the whole load-fold-publish cycle, build a
//! complete new series and swap it in. Readers clone the published `Arc`
//! and never wait on a writer.

use crate::pmc::{DailyTss, PmcCalculator, PmcError, PmcPoint, PmcSeed};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

/// Daily totals for the inclusive range requested by the store
pub type DailyLoad = BTreeMap<NaiveDate, DailyTss>;

/// An immutable, published PMC series for one athlete
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PmcSeries {
    pub athlete_id: String,
    pub points: Vec<PmcPoint>,
    pub seed: PmcSeed,

    /// Incremented on every publish for the athlete
    pub version: u64,
}

impl PmcSeries {
    pub fn current(&self) -> Option<&PmcPoint> {
        self.points.last()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// A copy ending at `date`; the earlier points do not depend on later days
    pub fn through(&self, date: NaiveDate) -> PmcSeries {
        let keep = self.points.partition_point(|p| p.date <= date);
        PmcSeries {
            athlete_id: self.athlete_id.clone(),
            points: self.points[..keep].to_vec(),
            seed: self.seed,
            version: self.version,
        }
    }

    /// The most recent `days` points
    pub fn tail(&self, days: usize) -> &[PmcPoint] {
        let start = self.points.len().saturating_sub(days);
        &self.points[start..]
    }
}

#[derive(Debug, Default)]
struct AthleteSlot {
    writer: Mutex<()>,
    published: RwLock<Option<Arc<PmcSeries>>>,
}

impl AthleteSlot {
    fn read(&self) -> Option<Arc<PmcSeries>> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, series: PmcSeries) -> Arc<PmcSeries> {
        let series = Arc::new(series);
        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&series));
        series
    }

    fn next_version(&self) -> u64 {
        self.read().map_or(1, |s| s.version + 1)
    }
}

/// Keyed store of PMC series with a single writer per athlete
#[derive(Debug, Default)]
pub struct PmcStore {
    calculator: PmcCalculator,
    slots: RwLock<HashMap<String, Arc<AthleteSlot>>>,
}

impl PmcStore {
    pub fn new(calculator: PmcCalculator) -> Self {
        PmcStore {
            calculator,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn calculator(&self) -> &PmcCalculator {
        &self.calculator
    }

    fn slot(&self, athlete_id: &str) -> Arc<AthleteSlot> {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(athlete_id)
        {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(athlete_id.to_string()).or_default())
    }

    /// Latest published series, without blocking on writers
    pub fn snapshot(&self, athlete_id: &str) -> Option<Arc<PmcSeries>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(athlete_id)
            .and_then(|slot| slot.read())
    }

    /// Drop the cached series; the next read rebuilds it
    pub fn invalidate(&self, athlete_id: &str) {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(athlete_id)
        {
            let _guard = slot.writer.lock().unwrap_or_else(PoisonError::into_inner);
            *slot
                .published
                .write()
                .unwrap_or_else(PoisonError::into_inner) = None;
            debug!(athlete = athlete_id, "Invalidated PMC series");
        }
    }

    /// Build the series for `[start, end]` from scratch and publish it.
    ///
    /// `load` is called with the writer lock held, so the totals it returns
    /// cannot be overtaken by a concurrent writer for the same athlete.
    pub fn rebuild<F, E>(
        &self,
        athlete_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        seed: PmcSeed,
        load: F,
    ) -> Result<Arc<PmcSeries>, E>
    where
        F: FnOnce(NaiveDate, NaiveDate) -> Result<DailyLoad, E>,
        E: From<PmcError>,
    {
        let slot = self.slot(athlete_id);
        let _guard = slot.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.rebuild_locked(&slot, athlete_id, start, end, seed, load)
    }

    fn rebuild_locked<F, E>(
        &self,
        slot: &AthleteSlot,
        athlete_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        seed: PmcSeed,
        load: F,
    ) -> Result<Arc<PmcSeries>, E>
    where
        F: FnOnce(NaiveDate, NaiveDate) -> Result<DailyLoad, E>,
        E: From<PmcError>,
    {
        if start > end {
            return Err(PmcError::InvalidDateRange(format!(
                "Start date {} is after end date {}",
                start, end
            ))
            .into());
        }

        let daily_tss = load(start, end)?;
        let days = self.calculator.fill_daily_range(&daily_tss, start, end)?;
        let points = self.calculator.build_series(&days, seed)?;

        let series = PmcSeries {
            athlete_id: athlete_id.to_string(),
            points,
            seed,
            version: slot.next_version(),
        };
        info!(
            athlete = athlete_id,
            start = %start,
            end = %end,
            days = series.points.len(),
            version = series.version,
            "Rebuilt PMC series"
        );
        Ok(slot.publish(series))
    }

    /// Recompute every point from `from` through `end` after a retroactive edit.
    ///
    /// Returns `Ok(None)` when nothing is cached for the athlete: there is
    /// nothing to invalidate and the next read builds from scratch. An edit
    /// before the cached series starts rebuilds the whole series from `from`.
    pub fn recompute_from<F, E>(
        &self,
        athlete_id: &str,
        from: NaiveDate,
        end: NaiveDate,
        load: F,
    ) -> Result<Option<Arc<PmcSeries>>, E>
    where
        F: FnOnce(NaiveDate, NaiveDate) -> Result<DailyLoad, E>,
        E: From<PmcError>,
    {
        let slot = self.slot(athlete_id);
        let _guard = slot.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.recompute_locked(&slot, athlete_id, from, end, load)
    }

    fn recompute_locked<F, E>(
        &self,
        slot: &AthleteSlot,
        athlete_id: &str,
        from: NaiveDate,
        end: NaiveDate,
        load: F,
    ) -> Result<Option<Arc<PmcSeries>>, E>
    where
        F: FnOnce(NaiveDate, NaiveDate) -> Result<DailyLoad, E>,
        E: From<PmcError>,
    {
        let Some(existing) = slot.read() else {
            return Ok(None);
        };

        match existing.first_date() {
            Some(first) if from >= first => {}
            _ => {
                return self
                    .rebuild_locked(slot, athlete_id, from, end, existing.seed, load)
                    .map(Some);
            }
        }

        if from > end {
            return Err(PmcError::InvalidDateRange(format!(
                "Recompute date {} is after end date {}",
                from, end
            ))
            .into());
        }

        let resume = PmcCalculator::resume_date(&existing.points, from)?;
        let daily_tss = load(resume, end)?;
        let points =
            self.calculator
                .rebuild_from(&existing.points, from, &daily_tss, end, existing.seed)?;

        let series = PmcSeries {
            athlete_id: athlete_id.to_string(),
            points,
            seed: existing.seed,
            version: existing.version + 1,
        };
        debug!(
            athlete = athlete_id,
            resume = %resume,
            end = %end,
            version = series.version,
            "Replaced PMC suffix"
        );
        Ok(Some(slot.publish(series)))
    }

    /// Repair after sessions dated `from` onward were written.
    ///
    /// The cached end is read under the writer lock: a concurrent extend
    /// either finishes first and is repaired here, or starts after and loads
    /// the new sessions itself. Edits past the cached end leave it untouched.
    pub fn repair_from<F, E>(
        &self,
        athlete_id: &str,
        from: NaiveDate,
        load: F,
    ) -> Result<Option<Arc<PmcSeries>>, E>
    where
        F: FnOnce(NaiveDate, NaiveDate) -> Result<DailyLoad, E>,
        E: From<PmcError>,
    {
        let slot = self.slot(athlete_id);
        let _guard = slot.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(end) = slot.read().and_then(|series| series.last_date()) else {
            return Ok(None);
        };
        if from > end {
            return Ok(None);
        }
        self.recompute_locked(&slot, athlete_id, from, end, load)
    }

    /// Extend a cached series forward to `end`; a no-op if it already reaches it
    pub fn extend_to<F, E>(
        &self,
        athlete_id: &str,
        end: NaiveDate,
        load: F,
    ) -> Result<Option<Arc<PmcSeries>>, E>
    where
        F: FnOnce(NaiveDate, NaiveDate) -> Result<DailyLoad, E>,
        E: From<PmcError>,
    {
        let slot = self.slot(athlete_id);
        let _guard = slot.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(existing) = slot.read() else {
            return Ok(None);
        };
        match existing.last_date() {
            Some(last) if last >= end => Ok(Some(existing)),
            // Starting past the last point resumes the day after it
            Some(_) => self.recompute_locked(&slot, athlete_id, end, end, load),
            None => Ok(Some(existing)),
        }
    }

    /// Rebuild several athletes in parallel, keeping any cached seed. Each
    /// athlete's fold stays sequential.
    pub fn rebuild_many<F, E>(
        &self,
        jobs: &[(String, NaiveDate, NaiveDate)],
        load: F,
    ) -> Vec<(String, Result<Arc<PmcSeries>, E>)>
    where
        F: Fn(&str, NaiveDate, NaiveDate) -> Result<DailyLoad, E> + Sync,
        E: From<PmcError> + Send,
    {
        jobs.par_iter()
            .map(|(athlete_id, start, end)| {
                let seed = self
                    .snapshot(athlete_id)
                    .map(|series| series.seed)
                    .unwrap_or_default();
                let result = self.rebuild(athlete_id, *start, *end, seed, |from, to| {
                    load(athlete_id, from, to)
                });
                (athlete_id.clone(), result)
            })
            .collect()
    }
}
