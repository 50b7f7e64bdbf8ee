use crate::models::{round_dp, Session};
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PmcError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Daily TSS total for one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTss {
    pub date: NaiveDate,

    /// Total TSS for the day (sum of all sessions)
    pub total_tss: Decimal,

    /// Number of sessions completed on this day, 0 for a rest day
    pub session_count: u16,
}

impl DailyTss {
    pub fn rest(date: NaiveDate) -> Self {
        DailyTss {
            date,
            total_tss: Decimal::ZERO,
            session_count: 0,
        }
    }
}

/// Starting fitness and fatigue, for athletes migrating history from elsewhere
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PmcSeed {
    pub ctl: Decimal,
    pub atl: Decimal,
}

/// One day on the Performance Management Chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmcPoint {
    pub date: NaiveDate,

    /// Sum of the day's session TSS
    pub tss: Decimal,

    /// Chronic Training Load (fitness)
    pub ctl: Decimal,

    /// Acute Training Load (fatigue)
    pub atl: Decimal,

    /// Form going into the day: previous CTL minus previous ATL
    pub tsb: Decimal,

    /// CTL change over the ramp window, absent until the window is filled
    pub ramp_rate: Option<Decimal>,
}

impl PmcPoint {
    /// Display precision: whole CTL/ATL/TSB, TSS and ramp rate to 1 dp
    pub fn rounded(&self) -> PmcPoint {
        PmcPoint {
            date: self.date,
            tss: round_dp(self.tss, 1),
            ctl: round_dp(self.ctl, 0),
            atl: round_dp(self.atl, 0),
            tsb: round_dp(self.tsb, 0),
            ramp_rate: self.ramp_rate.map(|r| round_dp(r, 1)),
        }
    }
}

/// A future day computed under an assumed load. Never part of the real series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionPoint {
    pub date: NaiveDate,
    pub tss: Decimal,
    pub ctl: Decimal,
    pub atl: Decimal,
    pub tsb: Decimal,
    pub ramp_rate: Option<Decimal>,
}

impl ProjectionPoint {
    pub fn rounded(&self) -> ProjectionPoint {
        ProjectionPoint {
            date: self.date,
            tss: round_dp(self.tss, 1),
            ctl: round_dp(self.ctl, 0),
            atl: round_dp(self.atl, 0),
            tsb: round_dp(self.tsb, 0),
            ramp_rate: self.ramp_rate.map(|r| round_dp(r, 1)),
        }
    }
}

/// Daily load assumed for projection days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProjectedLoad {
    /// No training at all
    Rest,
    /// The same TSS every day
    Constant(Decimal),
    /// One TSS per future day; days past the end of the plan are rest days
    Planned(Vec<Decimal>),
}

impl ProjectedLoad {
    fn tss_for_day(&self, index: usize) -> Decimal {
        match self {
            ProjectedLoad::Rest => Decimal::ZERO,
            ProjectedLoad::Constant(tss) => *tss,
            ProjectedLoad::Planned(plan) => plan.get(index).copied().unwrap_or(Decimal::ZERO),
        }
    }

    fn validate(&self) -> Result<(), PmcError> {
        let negative = match self {
            ProjectedLoad::Rest => false,
            ProjectedLoad::Constant(tss) => *tss < Decimal::ZERO,
            ProjectedLoad::Planned(plan) => plan.iter().any(|t| *t < Decimal::ZERO),
        };
        if negative {
            return Err(PmcError::InvalidInput(
                "Projected TSS cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Time constants for the CTL/ATL recurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmcConfig {
    /// CTL time constant in days (default: 42)
    pub ctl_time_constant: u16,

    /// ATL time constant in days (default: 7)
    pub atl_time_constant: u16,

    /// Ramp rate window in days (default: 7)
    pub ramp_rate_days: u16,
}

impl Default for PmcConfig {
    fn default() -> Self {
        PmcConfig {
            ctl_time_constant: 42,
            atl_time_constant: 7,
            ramp_rate_days: 7,
        }
    }
}

impl PmcConfig {
    pub fn validate(&self) -> Result<(), PmcError> {
        if self.ctl_time_constant == 0 || self.atl_time_constant == 0 {
            return Err(PmcError::ConfigurationError(
                "Time constants must be at least one day".to_string(),
            ));
        }
        if self.ramp_rate_days == 0 {
            return Err(PmcError::ConfigurationError(
                "Ramp rate window must be at least one day".to_string(),
            ));
        }
        Ok(())
    }
}

/// Form band for a TSB value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TsbInterpretation {
    VeryFresh,
    Fresh,
    Neutral,
    Fatigued,
    VeryFatigued,
}

impl TsbInterpretation {
    /// Lower TSB bound of each band, freshest first
    const BANDS: [(i64, TsbInterpretation); 4] = [
        (25, TsbInterpretation::VeryFresh),
        (5, TsbInterpretation::Fresh),
        (-10, TsbInterpretation::Neutral),
        (-30, TsbInterpretation::Fatigued),
    ];

    pub fn from_tsb(tsb: Decimal) -> Self {
        Self::BANDS
            .iter()
            .find(|(floor, _)| tsb >= Decimal::from(*floor))
            .map(|(_, band)| *band)
            .unwrap_or(TsbInterpretation::VeryFatigued)
    }

    pub fn description(&self) -> &'static str {
        match self {
            TsbInterpretation::VeryFresh => "Well rested, fitness starting to fade",
            TsbInterpretation::Fresh => "Rested, good day for a key session or race",
            TsbInterpretation::Neutral => "Absorbing normal training",
            TsbInterpretation::Fatigued => "Carrying fatigue, keep an eye on recovery",
            TsbInterpretation::VeryFatigued => "Deep fatigue, schedule rest",
        }
    }
}

/// Core PMC calculation engine.
///
/// The recurrence is a sequential fold: every day depends on the previous
/// day's CTL and ATL, so a series is always produced front to back and a
/// change to any day's TSS invalidates every later point.
#[derive(Debug, Clone)]
pub struct PmcCalculator {
    config: PmcConfig,
}

impl PmcCalculator {
    pub fn new() -> Self {
        PmcCalculator {
            config: PmcConfig::default(),
        }
    }

    pub fn with_config(config: PmcConfig) -> Self {
        PmcCalculator { config }
    }

    pub fn config(&self) -> &PmcConfig {
        &self.config
    }

    /// Aggregate daily TSS from a collection of sessions
    pub fn aggregate_daily_tss(&self, sessions: &[Session]) -> BTreeMap<NaiveDate, DailyTss> {
        let mut daily_tss: BTreeMap<NaiveDate, DailyTss> = BTreeMap::new();

        for session in sessions {
            let tss = session.tss.unwrap_or(Decimal::ZERO);

            daily_tss
                .entry(session.date)
                .and_modify(|day| {
                    day.total_tss += tss;
                    day.session_count += 1;
                })
                .or_insert(DailyTss {
                    date: session.date,
                    total_tss: tss,
                    session_count: 1,
                });
        }

        daily_tss
    }

    /// Materialize one entry per calendar day in `[start, end]`, with rest days for gaps
    pub fn fill_daily_range(
        &self,
        daily_tss: &BTreeMap<NaiveDate, DailyTss>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyTss>, PmcError> {
        if start > end {
            return Err(PmcError::InvalidDateRange(format!(
                "Start date {} is after end date {}",
                start, end
            )));
        }

        Ok(start
            .iter_days()
            .take_while(|date| *date <= end)
            .map(|date| {
                daily_tss
                    .get(&date)
                    .cloned()
                    .unwrap_or_else(|| DailyTss::rest(date))
            })
            .collect())
    }

    /// Build the series from a contiguous, ordered list of daily totals
    pub fn build_series(&self, days: &[DailyTss], seed: PmcSeed) -> Result<Vec<PmcPoint>, PmcError> {
        if days.is_empty() {
            return Err(PmcError::InsufficientData(
                "No daily TSS values supplied".to_string(),
            ));
        }
        Self::check_contiguous(days)?;

        Ok(self.fold(Vec::with_capacity(days.len()), days, seed))
    }

    /// Fill the range and build from a zero seed
    pub fn calculate_pmc_series(
        &self,
        daily_tss: &BTreeMap<NaiveDate, DailyTss>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PmcPoint>, PmcError> {
        let days = self.fill_daily_range(daily_tss, start_date, end_date)?;
        self.build_series(&days, PmcSeed::default())
    }

    /// Recompute the series from `from` through `end`.
    ///
    /// Points before the resume date are carried over untouched and seed the
    /// recurrence. If the existing series stops before `from`, the gap is
    /// recomputed too. Returns a new vector; `existing` is never modified.
    pub fn rebuild_from(
        &self,
        existing: &[PmcPoint],
        from: NaiveDate,
        daily_tss: &BTreeMap<NaiveDate, DailyTss>,
        end: NaiveDate,
        seed: PmcSeed,
    ) -> Result<Vec<PmcPoint>, PmcError> {
        if from > end {
            return Err(PmcError::InvalidDateRange(format!(
                "Recompute date {} is after end date {}",
                from, end
            )));
        }

        let resume = Self::resume_date(existing, from)?;

        let prefix: Vec<PmcPoint> = existing
            .iter()
            .take_while(|p| p.date < resume)
            .cloned()
            .collect();

        let days = self.fill_daily_range(daily_tss, resume, end)?;
        debug!(
            resume = %resume,
            end = %end,
            kept = prefix.len(),
            recomputed = days.len(),
            "Recomputing PMC suffix"
        );

        Ok(self.fold(prefix, &days, seed))
    }

    /// First day a recompute starting at `from` must produce: `from` itself,
    /// or the day after the series ends when the series stops earlier
    pub fn resume_date(existing: &[PmcPoint], from: NaiveDate) -> Result<NaiveDate, PmcError> {
        match existing.last() {
            Some(last) if last.date < from => last
                .date
                .checked_add_days(Days::new(1))
                .ok_or_else(|| PmcError::InvalidDateRange("Date out of range".to_string())),
            _ => Ok(from),
        }
    }

    /// Continue a real series into the future under an assumed load
    pub fn project(
        &self,
        history: &[PmcPoint],
        horizon_days: u32,
        load: &ProjectedLoad,
    ) -> Result<Vec<ProjectionPoint>, PmcError> {
        let last = history.last().ok_or_else(|| {
            PmcError::InsufficientData("Cannot project without a PMC history".to_string())
        })?;
        load.validate()?;

        let window = self.config.ramp_rate_days as usize;
        let mut ctl_trail: Vec<Decimal> = history.iter().map(|p| p.ctl).collect();

        let mut ctl = last.ctl;
        let mut atl = last.atl;
        let mut projections = Vec::with_capacity(horizon_days as usize);

        for (i, date) in last.date.iter_days().skip(1).take(horizon_days as usize).enumerate() {
            let tss = load.tss_for_day(i);
            let tsb = ctl - atl;
            (ctl, atl) = self.step(ctl, atl, tss);

            let index = ctl_trail.len();
            let ramp_rate = if index >= window {
                Some(ctl - ctl_trail[index - window])
            } else {
                None
            };
            ctl_trail.push(ctl);

            projections.push(ProjectionPoint {
                date,
                tss,
                ctl,
                atl,
                tsb,
                ramp_rate,
            });
        }

        trace!(horizon = horizon_days, from = %last.date, "Projected PMC");
        Ok(projections)
    }

    /// One day of the recurrence
    pub fn step(&self, prev_ctl: Decimal, prev_atl: Decimal, tss: Decimal) -> (Decimal, Decimal) {
        let ctl = prev_ctl + (tss - prev_ctl) / Decimal::from(self.config.ctl_time_constant);
        let atl = prev_atl + (tss - prev_atl) / Decimal::from(self.config.atl_time_constant);
        (ctl, atl)
    }

    fn fold(&self, mut series: Vec<PmcPoint>, days: &[DailyTss], seed: PmcSeed) -> Vec<PmcPoint> {
        let window = self.config.ramp_rate_days as usize;
        let (mut ctl, mut atl) = series
            .last()
            .map(|p| (p.ctl, p.atl))
            .unwrap_or((seed.ctl, seed.atl));

        series.reserve(days.len());
        for day in days {
            let tsb = ctl - atl;
            (ctl, atl) = self.step(ctl, atl, day.total_tss);

            let index = series.len();
            let ramp_rate = if index >= window {
                Some(ctl - series[index - window].ctl)
            } else {
                None
            };

            series.push(PmcPoint {
                date: day.date,
                tss: day.total_tss,
                ctl,
                atl,
                tsb,
                ramp_rate,
            });
        }

        series
    }

    fn check_contiguous(days: &[DailyTss]) -> Result<(), PmcError> {
        for pair in days.windows(2) {
            let gap = (pair[1].date - pair[0].date).num_days();
            if gap != 1 {
                return Err(PmcError::InvalidDateRange(format!(
                    "Daily TSS must cover consecutive days: {} followed by {}",
                    pair[0].date, pair[1].date
                )));
            }
        }
        Ok(())
    }
}

impl Default for PmcCalculator {
    fn default() -> Self {
        Self::new()
    }
}
