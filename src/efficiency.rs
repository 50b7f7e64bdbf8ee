//! Efficiency Factor (EF) trend analysis
//!
//! EF is output per heartbeat: watts per bpm on the bike, meters per minute
//! per bpm for running and swimming. Rising EF at the same heart rate is the
//! classic signal of improving aerobic fitness.

use crate::models::{round_f64, Session, Sport};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

/// EF analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyConfig {
    /// Sessions shorter than this are too noisy to include (default 30 min)
    pub min_duration_seconds: u32,

    /// First-half vs second-half change (percent) that counts as a trend
    pub trend_threshold_percent: f64,
}

impl Default for EfficiencyConfig {
    fn default() -> Self {
        EfficiencyConfig {
            min_duration_seconds: 1800,
            trend_threshold_percent: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

/// EF for one qualifying session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyPoint {
    pub session_id: String,
    pub date: NaiveDate,
    pub ef: f64,

    /// Watts, or meters per minute for running and swimming
    pub output: f64,
    pub avg_heart_rate: u16,
    pub duration_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyTrend {
    pub sport: Sport,
    pub points: Vec<EfficiencyPoint>,
    pub average_ef: f64,
    pub trend_direction: TrendDirection,

    /// Change of the second-half mean relative to the first-half mean
    pub trend_percent: f64,

    /// Least-squares EF change per session
    pub slope_per_session: f64,
    pub best: Option<EfficiencyPoint>,
}

impl EfficiencyTrend {
    fn stable(sport: Sport, points: Vec<EfficiencyPoint>) -> Self {
        let average_ef = if points.is_empty() {
            0.0
        } else {
            round_f64(points.iter().map(|p| p.ef).mean(), 3)
        };
        let best = best_point(&points);
        EfficiencyTrend {
            sport,
            points,
            average_ef,
            trend_direction: TrendDirection::Stable,
            trend_percent: 0.0,
            slope_per_session: 0.0,
            best,
        }
    }
}

pub struct EfficiencyAnalyzer {
    config: EfficiencyConfig,
}

impl EfficiencyAnalyzer {
    pub fn new() -> Self {
        EfficiencyAnalyzer {
            config: EfficiencyConfig::default(),
        }
    }

    pub fn with_config(config: EfficiencyConfig) -> Self {
        EfficiencyAnalyzer { config }
    }

    /// EF for a session, if it has both an output metric and a heart rate
    pub fn efficiency_factor(session: &Session) -> Option<(f64, f64)> {
        let hr = session.avg_hr()? as f64;
        let output = match session.sport {
            Sport::Cycling => session.effective_power()? as f64,
            Sport::Running | Sport::Swimming => {
                session.effective_speed()?.to_f64()? * 60.0
            }
            _ => return None,
        };
        if output <= 0.0 {
            return None;
        }
        Some((output / hr, output))
    }

    /// Analyze sessions of one sport, oldest first after sorting by date
    pub fn analyze(&self, sessions: &[Session], sport: Sport) -> EfficiencyTrend {
        let mut qualifying: Vec<&Session> = sessions
            .iter()
            .filter(|s| s.sport == sport && s.duration_seconds >= self.config.min_duration_seconds)
            .collect();
        qualifying.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));

        let points: Vec<EfficiencyPoint> = qualifying
            .into_iter()
            .filter_map(|session| {
                let (ef, output) = Self::efficiency_factor(session)?;
                Some(EfficiencyPoint {
                    session_id: session.id.clone(),
                    date: session.date,
                    ef: round_f64(ef, 3),
                    output: round_f64(output, 1),
                    avg_heart_rate: session.avg_heart_rate.unwrap_or_default(),
                    duration_seconds: session.duration_seconds,
                })
            })
            .collect();

        if points.len() < 2 {
            debug!(sport = %sport, qualifying = points.len(), "Too few sessions for an EF trend");
            return EfficiencyTrend::stable(sport, points);
        }

        let values: Vec<f64> = points.iter().map(|p| p.ef).collect();
        let half = values.len() / 2;
        let first_half = values[..half].iter().mean();
        let second_half = values[values.len() - half..].iter().mean();

        let trend_percent = if first_half > 0.0 {
            (second_half - first_half) / first_half * 100.0
        } else {
            0.0
        };

        let threshold = self.config.trend_threshold_percent;
        let trend_direction = if trend_percent > threshold {
            TrendDirection::Improving
        } else if trend_percent < -threshold {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        };

        EfficiencyTrend {
            sport,
            average_ef: round_f64(values.iter().mean(), 3),
            trend_direction,
            trend_percent: round_f64(trend_percent, 1),
            slope_per_session: round_f64(linear_slope(&values), 4),
            best: best_point(&points),
            points,
        }
    }
}

impl Default for EfficiencyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn best_point(points: &[EfficiencyPoint]) -> Option<EfficiencyPoint> {
    points
        .iter()
        .max_by(|a, b| a.ef.total_cmp(&b.ef))
        .cloned()
}

/// Least-squares slope of values against their index
fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().mean();

    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });

    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
