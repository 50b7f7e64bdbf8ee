use crate::models::{round_dp, AthleteThresholds};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Breakpoints are percentages of threshold (hundredths)
const HR_BREAKPOINTS: [i64; 6] = [81, 89, 93, 99, 102, 106];
const HR_ZONE_NAMES: [&str; 7] = [
    "Recovery",
    "Aerobic",
    "Tempo",
    "Sub-Threshold",
    "Threshold",
    "VO2max",
    "Anaerobic",
];

const POWER_BREAKPOINTS: [i64; 6] = [55, 75, 90, 105, 120, 150];
const POWER_ZONE_NAMES: [&str; 7] = [
    "Recovery",
    "Endurance",
    "Tempo",
    "Threshold",
    "VO2max",
    "Anaerobic",
    "Neuromuscular",
];

/// Run pace breakpoints are multiples of threshold speed, so a higher zone is faster
const PACE_BREAKPOINTS: [i64; 5] = [78, 88, 94, 101, 111];
const PACE_ZONE_NAMES: [&str; 6] = [
    "Recovery",
    "Aerobic",
    "Tempo",
    "Threshold",
    "VO2max",
    "Anaerobic",
];

const SWIM_BREAKPOINTS: [i64; 5] = [80, 90, 96, 102, 108];
const SWIM_ZONE_NAMES: [&str; 6] = [
    "Recovery",
    "Aerobic",
    "Tempo",
    "Threshold",
    "VO2max",
    "Sprint",
];

/// A single training zone. `max` of `None` means the zone is open-ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub zone: u8,
    pub name: String,
    pub min: Decimal,
    pub max: Option<Decimal>,
    pub description: String,
}

impl Zone {
    pub fn contains(&self, value: Decimal) -> bool {
        value >= self.min && self.max.map_or(true, |max| value < max)
    }
}

/// Ordered, contiguous zones for one domain covering `[0, ∞)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneTable {
    pub zones: Vec<Zone>,
}

impl ZoneTable {
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Zone containing the value. Negative values have no zone.
    pub fn zone_for(&self, value: Decimal) -> Option<&Zone> {
        self.zones.iter().find(|z| z.contains(value))
    }

    pub fn get(&self, zone: u8) -> Option<&Zone> {
        self.zones.iter().find(|z| z.zone == zone)
    }
}

/// Every zone table derivable from an athlete's current thresholds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneSet {
    pub heart_rate: Option<ZoneTable>,
    pub power: Option<ZoneTable>,
    pub pace: Option<ZoneTable>,
    pub swim: Option<ZoneTable>,
}

/// Unit of the values a zone table is expressed in
#[derive(Debug, Clone, Copy)]
enum ZoneUnit {
    HeartRate,
    Power,
    RunSpeed,
    SwimSpeed,
}

/// Zone calculation utilities
pub struct ZoneCalculator;

impl ZoneCalculator {
    /// Derive all zone tables. Absent thresholds yield `None` for that domain.
    pub fn calculate_all_zones(thresholds: &AthleteThresholds) -> ZoneSet {
        ZoneSet {
            heart_rate: Self::calculate_heart_rate_zones(thresholds),
            power: Self::calculate_power_zones(thresholds),
            pace: Self::calculate_pace_zones(thresholds),
            swim: Self::calculate_swim_zones(thresholds),
        }
    }

    /// Seven heart rate zones from LTHR
    pub fn calculate_heart_rate_zones(thresholds: &AthleteThresholds) -> Option<ZoneTable> {
        let lthr = thresholds.lthr_bpm()?;
        Some(Self::build_table(
            lthr,
            &HR_BREAKPOINTS,
            &HR_ZONE_NAMES,
            ZoneUnit::HeartRate,
        ))
    }

    /// Seven power zones from FTP.
    ///
    /// With an FTP of 250 W the Threshold zone spans 225 W to 262.5 W.
    pub fn calculate_power_zones(thresholds: &AthleteThresholds) -> Option<ZoneTable> {
        let ftp = thresholds.ftp_watts()?;
        Some(Self::build_table(
            ftp,
            &POWER_BREAKPOINTS,
            &POWER_ZONE_NAMES,
            ZoneUnit::Power,
        ))
    }

    /// Six run zones as speed bounds (m/s) from threshold pace
    pub fn calculate_pace_zones(thresholds: &AthleteThresholds) -> Option<ZoneTable> {
        let speed = thresholds.threshold_speed()?;
        Some(Self::build_table(
            speed,
            &PACE_BREAKPOINTS,
            &PACE_ZONE_NAMES,
            ZoneUnit::RunSpeed,
        ))
    }

    /// Six swim zones as speed bounds (m/s) from critical swim speed
    pub fn calculate_swim_zones(thresholds: &AthleteThresholds) -> Option<ZoneTable> {
        let css = thresholds.css_speed()?;
        Some(Self::build_table(
            css,
            &SWIM_BREAKPOINTS,
            &SWIM_ZONE_NAMES,
            ZoneUnit::SwimSpeed,
        ))
    }

    fn build_table(
        threshold: Decimal,
        breakpoints: &[i64],
        names: &[&str],
        unit: ZoneUnit,
    ) -> ZoneTable {
        debug_assert_eq!(breakpoints.len() + 1, names.len());

        let bounds: Vec<Decimal> = breakpoints
            .iter()
            .map(|pct| threshold * Decimal::new(*pct, 2))
            .collect();

        let zones = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let min = if i == 0 { Decimal::ZERO } else { bounds[i - 1] };
                let max = bounds.get(i).copied();
                let lower_pct = if i == 0 { None } else { Some(breakpoints[i - 1]) };
                let upper_pct = breakpoints.get(i).copied();

                Zone {
                    zone: (i + 1) as u8,
                    name: name.to_string(),
                    min,
                    max,
                    description: Self::describe(unit, min, max, lower_pct, upper_pct),
                }
            })
            .collect();

        ZoneTable { zones }
    }

    fn describe(
        unit: ZoneUnit,
        min: Decimal,
        max: Option<Decimal>,
        lower_pct: Option<i64>,
        upper_pct: Option<i64>,
    ) -> String {
        match unit {
            ZoneUnit::HeartRate | ZoneUnit::Power => {
                let (label, suffix) = match unit {
                    ZoneUnit::HeartRate => ("LTHR", "bpm"),
                    _ => ("FTP", "W"),
                };
                match (lower_pct, upper_pct, max) {
                    (None, Some(hi), Some(max)) => format!(
                        "< {}% {} (< {} {})",
                        hi,
                        label,
                        round_dp(max, 1).normalize(),
                        suffix
                    ),
                    (Some(lo), Some(hi), Some(max)) => format!(
                        "{}-{}% {} ({}-{} {})",
                        lo,
                        hi,
                        label,
                        round_dp(min, 1).normalize(),
                        round_dp(max, 1).normalize(),
                        suffix
                    ),
                    _ => format!(
                        "> {}% {} (> {} {})",
                        lower_pct.unwrap_or(0),
                        label,
                        round_dp(min, 1).normalize(),
                        suffix
                    ),
                }
            }
            ZoneUnit::RunSpeed | ZoneUnit::SwimSpeed => {
                let (distance, label) = match unit {
                    ZoneUnit::RunSpeed => (Decimal::from(1000), "/km"),
                    _ => (Decimal::from(100), "/100m"),
                };
                let pace = |speed: Decimal| format_pace(distance, speed);
                match max {
                    Some(max) if min.is_zero() => format!("slower than {}{}", pace(max), label),
                    Some(max) => format!("{}-{}{}", pace(min), pace(max), label),
                    None => format!("faster than {}{}", pace(min), label),
                }
            }
        }
    }
}

/// Time to cover `distance` meters at `speed` m/s, as m:ss
pub fn format_pace(distance: Decimal, speed: Decimal) -> String {
    if speed <= Decimal::ZERO {
        return "--:--".to_string();
    }
    let seconds = round_dp(distance / speed, 0).to_u64().unwrap_or(0);
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
