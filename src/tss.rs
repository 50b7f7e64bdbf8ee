use crate::models::{round_dp, AthleteThresholds, Session, Sport};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Intensity assumed when a session carries no usable intensity data
pub const ESTIMATED_INTENSITY_FACTOR: Decimal = dec!(0.55);

/// Smallest TSS reported for a session with any duration
const MIN_POSITIVE_TSS: Decimal = dec!(0.1);

/// TSS calculation result with method used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TssResult {
    pub tss: Decimal,
    pub intensity_factor: Option<Decimal>,

    /// Normalized power (W), speed (m/s) or heart rate (bpm), depending on method
    pub normalized_effort: Option<Decimal>,
    pub method: TssMethod,
}

/// Methods used for TSS calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TssMethod {
    PowerBased,     // Cycling with power data
    PaceBased,      // rTSS for running, sTSS for swimming
    HeartRateBased, // hrTSS
    Estimated,      // Duration only
}

impl TssMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TssMethod::PowerBased => "power_based",
            TssMethod::PaceBased => "pace_based",
            TssMethod::HeartRateBased => "heart_rate_based",
            TssMethod::Estimated => "estimated",
        }
    }
}

impl std::str::FromStr for TssMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "power_based" => Ok(TssMethod::PowerBased),
            "pace_based" => Ok(TssMethod::PaceBased),
            "heart_rate_based" => Ok(TssMethod::HeartRateBased),
            "estimated" => Ok(TssMethod::Estimated),
            _ => Err(format!("Unknown TSS method: {}", s)),
        }
    }
}

/// Core TSS calculation engine
pub struct TssCalculator;

impl TssCalculator {
    /// Calculate TSS using the best available method.
    ///
    /// Capability checks run in order: power, pace, heart rate, then
    /// duration only. A tier whose data or threshold is missing falls through
    /// to the next one, so every session yields a value.
    pub fn calculate_tss(session: &Session, thresholds: &AthleteThresholds) -> TssResult {
        if session.duration_seconds == 0 {
            return TssResult {
                tss: Decimal::ZERO,
                intensity_factor: None,
                normalized_effort: None,
                method: TssMethod::Estimated,
            };
        }

        let result = Self::power_tss(session, thresholds)
            .or_else(|| Self::pace_tss(session, thresholds))
            .or_else(|| Self::heart_rate_tss(session, thresholds))
            .unwrap_or_else(|| Self::estimated_tss(session));

        debug!(
            session = %session.id,
            sport = %session.sport,
            method = result.method.as_str(),
            tss = %result.tss,
            "Calculated session TSS"
        );

        result
    }

    /// Compute TSS and cache it on the session
    pub fn apply(session: &mut Session, thresholds: &AthleteThresholds) -> TssResult {
        let result = Self::calculate_tss(session, thresholds);
        session.tss = Some(result.tss);
        session.intensity_factor = result.intensity_factor;
        session.tss_method = Some(result.method);
        result
    }

    /// Power-based TSS for cycling.
    /// TSS = (duration_s × NP × IF) / (FTP × 3600) × 100
    pub fn power_tss(session: &Session, thresholds: &AthleteThresholds) -> Option<TssResult> {
        if session.sport != Sport::Cycling {
            return None;
        }
        let ftp = thresholds.ftp_watts()?;
        let np = Decimal::from(session.effective_power()?);

        let intensity_factor = np / ftp;
        let tss = Decimal::from(session.duration_seconds) * np * intensity_factor
            / (ftp * Decimal::from(3600))
            * Decimal::from(100);

        Some(Self::finish(tss, intensity_factor, np, TssMethod::PowerBased))
    }

    /// Pace-based TSS for running (threshold pace) and swimming (CSS).
    /// Same shape as the power formula with speed in place of power.
    pub fn pace_tss(session: &Session, thresholds: &AthleteThresholds) -> Option<TssResult> {
        let threshold = thresholds.speed_threshold_for(session.sport)?;
        let speed = session.effective_speed()?;

        let intensity_factor = speed / threshold;
        let tss = Decimal::from(session.duration_seconds) * speed * intensity_factor
            / (threshold * Decimal::from(3600))
            * Decimal::from(100);

        Some(Self::finish(tss, intensity_factor, speed, TssMethod::PaceBased))
    }

    /// Heart-rate TSS, any sport.
    /// hrTSS = duration_hours × IF² × 100
    pub fn heart_rate_tss(session: &Session, thresholds: &AthleteThresholds) -> Option<TssResult> {
        let lthr = thresholds.lthr_bpm()?;
        let hr = Decimal::from(session.avg_hr()?);

        let intensity_factor = hr / lthr;
        let tss = session.hours() * intensity_factor * intensity_factor * Decimal::from(100);

        Some(Self::finish(tss, intensity_factor, hr, TssMethod::HeartRateBased))
    }

    /// Conservative duration-only estimate at a fixed low intensity
    pub fn estimated_tss(session: &Session) -> TssResult {
        let intensity_factor = ESTIMATED_INTENSITY_FACTOR;
        let tss = session.hours() * intensity_factor * intensity_factor * Decimal::from(100);

        TssResult {
            tss: Self::round_tss(tss),
            intensity_factor: Some(intensity_factor),
            normalized_effort: None,
            method: TssMethod::Estimated,
        }
    }

    /// One decimal place, never rounding a positive load down to zero
    fn round_tss(tss: Decimal) -> Decimal {
        let rounded = round_dp(tss, 1);
        if tss > Decimal::ZERO && rounded.is_zero() {
            MIN_POSITIVE_TSS
        } else {
            rounded
        }
    }

    fn finish(tss: Decimal, intensity_factor: Decimal, effort: Decimal, method: TssMethod) -> TssResult {
        TssResult {
            tss: Self::round_tss(tss),
            intensity_factor: Some(round_dp(intensity_factor, 3)),
            normalized_effort: Some(round_dp(effort, 3)),
            method,
        }
    }
}
