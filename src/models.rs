use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::tss::TssMethod;

/// Sport types tracked by the load engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Swimming,
    Cycling,
    Running,
    Strength,
    Other,
}

impl Sport {
    /// Sports that carry a Tri-Score, in display order
    pub const SCORED: [Sport; 4] = [
        Sport::Swimming,
        Sport::Cycling,
        Sport::Running,
        Sport::Strength,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Swimming => "swimming",
            Sport::Cycling => "cycling",
            Sport::Running => "running",
            Sport::Strength => "strength",
            Sport::Other => "other",
        }
    }

    /// Human-readable label used in recommendations
    pub fn label(&self) -> &'static str {
        match self {
            Sport::Swimming => "Swim",
            Sport::Cycling => "Bike",
            Sport::Running => "Run",
            Sport::Strength => "Strength",
            Sport::Other => "Other",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "swim" | "swimming" | "open_water" | "pool" => Ok(Sport::Swimming),
            "bike" | "ride" | "cycling" | "cycle" | "virtualride" => Ok(Sport::Cycling),
            "run" | "running" | "trail_run" | "treadmill" => Ok(Sport::Running),
            "strength" | "weights" | "gym" | "weight_training" => Ok(Sport::Strength),
            "other" | "walk" | "hike" | "yoga" => Ok(Sport::Other),
            _ => Err(format!("Unknown sport: {}", s)),
        }
    }
}

/// Current physiological thresholds for one athlete.
///
/// Values of zero are treated the same as absent values, so a record that was
/// cleared by setting a field to 0 never produces a zone table or a
/// threshold-relative TSS.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AthleteThresholds {
    /// Functional threshold power in watts
    pub ftp: Option<u16>,

    /// Lactate threshold heart rate in bpm
    pub lthr: Option<u16>,

    /// Threshold running speed in meters per second
    pub threshold_pace: Option<Decimal>,

    /// Critical swim speed in meters per second
    pub css: Option<Decimal>,

    pub max_hr: Option<u16>,
    pub resting_hr: Option<u16>,
}

impl AthleteThresholds {
    pub fn ftp_watts(&self) -> Option<Decimal> {
        self.ftp.filter(|v| *v > 0).map(Decimal::from)
    }

    pub fn lthr_bpm(&self) -> Option<Decimal> {
        self.lthr.filter(|v| *v > 0).map(Decimal::from)
    }

    pub fn threshold_speed(&self) -> Option<Decimal> {
        self.threshold_pace.filter(|v| *v > Decimal::ZERO)
    }

    pub fn css_speed(&self) -> Option<Decimal> {
        self.css.filter(|v| *v > Decimal::ZERO)
    }

    /// Threshold speed matching the sport's pace-based TSS, if any
    pub fn speed_threshold_for(&self, sport: Sport) -> Option<Decimal> {
        match sport {
            Sport::Running => self.threshold_speed(),
            Sport::Swimming => self.css_speed(),
            _ => None,
        }
    }
}

/// One completed exercise bout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub athlete_id: String,
    pub date: NaiveDate,
    pub sport: Sport,

    /// Moving duration in seconds
    pub duration_seconds: u32,

    /// Distance in meters
    pub distance: Option<Decimal>,

    pub avg_heart_rate: Option<u16>,
    pub avg_power: Option<u16>,
    pub normalized_power: Option<u16>,

    /// Average speed in meters per second
    pub avg_speed: Option<Decimal>,

    /// Cached TSS, set once computed
    pub tss: Option<Decimal>,
    pub intensity_factor: Option<Decimal>,
    pub tss_method: Option<TssMethod>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        athlete_id: impl Into<String>,
        date: NaiveDate,
        sport: Sport,
        duration_seconds: u32,
    ) -> Self {
        Session {
            id: id.into(),
            athlete_id: athlete_id.into(),
            date,
            sport,
            duration_seconds,
            distance: None,
            avg_heart_rate: None,
            avg_power: None,
            normalized_power: None,
            avg_speed: None,
            tss: None,
            intensity_factor: None,
            tss_method: None,
        }
    }

    pub fn hours(&self) -> Decimal {
        Decimal::from(self.duration_seconds) / Decimal::from(3600)
    }

    /// Speed from distance over duration, falling back to the recorded average
    pub fn effective_speed(&self) -> Option<Decimal> {
        let from_distance = match self.distance {
            Some(distance) if distance > Decimal::ZERO && self.duration_seconds > 0 => {
                Some(distance / Decimal::from(self.duration_seconds))
            }
            _ => None,
        };

        from_distance.or(self.avg_speed.filter(|s| *s > Decimal::ZERO))
    }

    /// Normalized power if recorded, otherwise average power
    pub fn effective_power(&self) -> Option<u16> {
        self.normalized_power
            .filter(|p| *p > 0)
            .or(self.avg_power.filter(|p| *p > 0))
    }

    pub fn avg_hr(&self) -> Option<u16> {
        self.avg_heart_rate.filter(|hr| *hr > 0)
    }
}

/// Volume for one sport over an aggregation window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SportAggregate {
    pub hours: Decimal,
    pub tss: Decimal,
    pub activity_count: u32,
}

impl SportAggregate {
    pub fn is_active(&self) -> bool {
        self.activity_count > 0
    }

    pub fn add(&mut self, session: &Session) {
        self.hours += session.hours();
        self.tss += session.tss.unwrap_or(Decimal::ZERO);
        self.activity_count += 1;
    }
}

/// Group sessions by sport into aggregates
pub fn aggregate_by_sport<'a, I>(sessions: I) -> BTreeMap<Sport, SportAggregate>
where
    I: IntoIterator<Item = &'a Session>,
{
    let mut totals: BTreeMap<Sport, SportAggregate> = BTreeMap::new();
    for session in sessions {
        totals.entry(session.sport).or_default().add(session);
    }
    totals
}

/// Round half away from zero to a fixed number of decimal places
pub fn round_dp(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Round an f64 ratio to a fixed number of decimal places
pub fn round_f64(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}
