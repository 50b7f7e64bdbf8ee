//! Tri-Score: per-sport load scores relative to personal history, an overall
//! blend with current form, and a discipline balance verdict.

use crate::models::{round_dp, Sport, SportAggregate};
use crate::pmc::PmcPoint;
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Relative weight of each sport in the overall score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SportWeights {
    pub swimming: Decimal,
    pub cycling: Decimal,
    pub running: Decimal,
    pub strength: Decimal,
}

impl Default for SportWeights {
    fn default() -> Self {
        SportWeights {
            swimming: dec!(0.25),
            cycling: dec!(0.35),
            running: dec!(0.30),
            strength: dec!(0.10),
        }
    }
}

impl SportWeights {
    pub fn weight(&self, sport: Sport) -> Decimal {
        match sport {
            Sport::Swimming => self.swimming,
            Sport::Cycling => self.cycling,
            Sport::Running => self.running,
            Sport::Strength => self.strength,
            Sport::Other => Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriScoreConfig {
    /// Weeks averaged into the personal baseline (default 6)
    pub baseline_weeks: u16,

    pub weights: SportWeights,

    /// Share of the overall score taken by current form (TSB)
    pub form_weight: Decimal,

    /// Score gap between strongest and weakest sport that counts as imbalance
    pub imbalance_threshold: Decimal,
}

impl Default for TriScoreConfig {
    fn default() -> Self {
        TriScoreConfig {
            baseline_weeks: 6,
            weights: SportWeights::default(),
            form_weight: dec!(0.2),
            imbalance_threshold: dec!(20),
        }
    }
}

/// Inclusive date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// The three aggregation windows a Tri-Score needs, ending on `as_of`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriScoreWindows {
    pub current: DateWindow,
    pub prior: DateWindow,
    pub baseline: DateWindow,
}

impl TriScoreWindows {
    /// Current week is the 7 days ending `as_of`; the baseline is the
    /// `baseline_weeks` weeks before it, the prior period the last of those.
    pub fn ending(as_of: NaiveDate, baseline_weeks: u16) -> Option<Self> {
        let weeks = u64::from(baseline_weeks.max(1));
        let current_start = as_of.checked_sub_days(Days::new(6))?;
        let prior_end = current_start.checked_sub_days(Days::new(1))?;
        let prior_start = prior_end.checked_sub_days(Days::new(6))?;
        let baseline_start = current_start.checked_sub_days(Days::new(7 * weeks))?;

        Some(TriScoreWindows {
            current: DateWindow {
                start: current_start,
                end: as_of,
            },
            prior: DateWindow {
                start: prior_start,
                end: prior_end,
            },
            baseline: DateWindow {
                start: baseline_start,
                end: prior_end,
            },
        })
    }
}

/// Aggregates for one sport across the scoring windows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SportWindow {
    pub current: SportAggregate,
    pub prior: SportAggregate,

    /// Mean weekly TSS over the baseline window
    pub baseline_weekly_tss: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriScoreInput {
    pub as_of: NaiveDate,
    pub sports: BTreeMap<Sport, SportWindow>,
    pub pmc: Option<PmcPoint>,
}

impl TriScoreInput {
    /// Assemble from per-window aggregates; baseline totals are divided by the week count
    pub fn from_aggregates(
        as_of: NaiveDate,
        current: &BTreeMap<Sport, SportAggregate>,
        prior: &BTreeMap<Sport, SportAggregate>,
        baseline_total: &BTreeMap<Sport, SportAggregate>,
        baseline_weeks: u16,
        pmc: Option<PmcPoint>,
    ) -> Self {
        let weeks = Decimal::from(baseline_weeks.max(1));
        let sports = Sport::SCORED
            .iter()
            .map(|sport| {
                let window = SportWindow {
                    current: current.get(sport).cloned().unwrap_or_default(),
                    prior: prior.get(sport).cloned().unwrap_or_default(),
                    baseline_weekly_tss: baseline_total
                        .get(sport)
                        .map(|agg| agg.tss / weeks)
                        .unwrap_or(Decimal::ZERO),
                };
                (*sport, window)
            })
            .collect();

        TriScoreInput { as_of, sports, pmc }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SportScore {
    pub sport: Sport,
    pub score: Decimal,
    pub trend: Decimal,
    pub weekly_hours: Decimal,
    pub weekly_tss: Decimal,
    pub activity_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceVerdict {
    pub balanced: bool,
    pub balance_score: Decimal,
    pub weakest: Option<Sport>,
    pub strongest: Option<Sport>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub as_of: NaiveDate,
    pub sports: Vec<SportScore>,
    pub overall: Decimal,

    /// Form component derived from TSB, absent without a PMC point
    pub form_score: Option<Decimal>,
    pub balance: BalanceVerdict,
    pub pmc: Option<PmcPoint>,
}

impl CompositeScore {
    pub fn sport(&self, sport: Sport) -> Option<&SportScore> {
        self.sports.iter().find(|s| s.sport == sport)
    }
}

pub struct TriScoreCalculator {
    config: TriScoreConfig,
}

impl TriScoreCalculator {
    pub fn new() -> Self {
        TriScoreCalculator {
            config: TriScoreConfig::default(),
        }
    }

    pub fn with_config(config: TriScoreConfig) -> Self {
        TriScoreCalculator { config }
    }

    pub fn config(&self) -> &TriScoreConfig {
        &self.config
    }

    /// Score for a week's TSS against the athlete's own baseline.
    ///
    /// `100 × r / (r + 0.5)` where `r = weekly / baseline`: bounded in
    /// [0, 100) and strictly increasing in weekly TSS. Matching the baseline
    /// scores 67. With no baseline yet, any load counts as matching it.
    pub fn sport_score(weekly_tss: Decimal, baseline_weekly_tss: Decimal) -> Decimal {
        if weekly_tss <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let ratio = if baseline_weekly_tss > Decimal::ZERO {
            weekly_tss / baseline_weekly_tss
        } else {
            Decimal::ONE
        };
        Decimal::from(100) * ratio / (ratio + dec!(0.5))
    }

    /// Form score from TSB: 50 at neutral, clamped to [0, 100]
    pub fn form_score(tsb: Decimal) -> Decimal {
        (dec!(50) + dec!(2) * tsb).clamp(Decimal::ZERO, Decimal::from(100))
    }

    pub fn calculate(&self, input: &TriScoreInput) -> CompositeScore {
        let mut sports = Vec::new();
        let mut raw_scores: Vec<(Sport, Decimal)> = Vec::new();

        for sport in Sport::SCORED {
            let window = input.sports.get(&sport).cloned().unwrap_or_default();
            let score = if window.current.is_active() {
                Self::sport_score(window.current.tss, window.baseline_weekly_tss)
            } else {
                Decimal::ZERO
            };
            let prior_score = if window.prior.is_active() {
                Self::sport_score(window.prior.tss, window.baseline_weekly_tss)
            } else {
                Decimal::ZERO
            };

            if window.current.is_active() {
                raw_scores.push((sport, score));
            }

            sports.push(SportScore {
                sport,
                score: round_dp(score, 0),
                trend: round_dp(score - prior_score, 0),
                weekly_hours: round_dp(window.current.hours, 1),
                weekly_tss: round_dp(window.current.tss, 1),
                activity_count: window.current.activity_count,
            });
        }

        let form_score = input
            .pmc
            .as_ref()
            .map(|point| round_dp(Self::form_score(point.tsb), 0));
        let overall = self.overall(&raw_scores, form_score);

        let rounded: Vec<(Sport, Decimal)> = raw_scores
            .iter()
            .map(|(sport, score)| (*sport, round_dp(*score, 0)))
            .collect();
        let balance = self.balance(&rounded);

        debug!(
            as_of = %input.as_of,
            active = raw_scores.len(),
            overall = %overall,
            balanced = balance.balanced,
            "Calculated Tri-Score"
        );

        CompositeScore {
            as_of: input.as_of,
            sports,
            overall,
            form_score,
            balance,
            pmc: input.pmc.as_ref().map(PmcPoint::rounded),
        }
    }

    fn overall(&self, active: &[(Sport, Decimal)], form_score: Option<Decimal>) -> Decimal {
        let total_weight: Decimal = active
            .iter()
            .map(|(sport, _)| self.config.weights.weight(*sport))
            .sum();
        if active.is_empty() || total_weight <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let volume: Decimal = active
            .iter()
            .map(|(sport, score)| self.config.weights.weight(*sport) * *score)
            .sum::<Decimal>()
            / total_weight;

        let blended = match form_score {
            Some(form) => {
                let form_weight = self.config.form_weight.clamp(Decimal::ZERO, Decimal::ONE);
                volume * (Decimal::ONE - form_weight) + form * form_weight
            }
            None => volume,
        };
        round_dp(blended, 0)
    }

    /// Only sports with activity take part; an untrained sport is never a weak point
    fn balance(&self, active: &[(Sport, Decimal)]) -> BalanceVerdict {
        if active.len() < 2 {
            return BalanceVerdict {
                balanced: true,
                balance_score: Decimal::from(100),
                weakest: None,
                strongest: None,
                recommendations: Vec::new(),
            };
        }

        let mut weakest = active[0];
        let mut strongest = active[0];
        for entry in &active[1..] {
            if entry.1 < weakest.1 {
                weakest = *entry;
            }
            if entry.1 > strongest.1 {
                strongest = *entry;
            }
        }

        let threshold = self.config.imbalance_threshold;
        let spread = strongest.1 - weakest.1;
        let balanced = spread <= threshold;
        let mut recommendations = Vec::new();

        if !balanced {
            recommendations.push(format!(
                "{} is your weakest discipline (score {} vs {} for {}). Add volume there to rebalance.",
                weakest.0.label(),
                weakest.1,
                strongest.1,
                strongest.0.label()
            ));
        }

        let total: Decimal = active.iter().map(|(_, score)| *score).sum();
        let others = Decimal::from(active.len() - 1);
        for &(sport, score) in active {
            if !balanced && sport == weakest.0 {
                continue;
            }
            let mean_of_others = (total - score) / others;
            if mean_of_others - score > threshold {
                recommendations.push(format!(
                    "{} is lagging your other sports ({} vs average {}).",
                    sport.label(),
                    score,
                    round_dp(mean_of_others, 0)
                ));
            }
        }

        BalanceVerdict {
            balanced,
            balance_score: (Decimal::from(100) - spread).max(Decimal::ZERO),
            weakest: Some(weakest.0),
            strongest: Some(strongest.0),
            recommendations,
        }
    }
}

impl Default for TriScoreCalculator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn aggregate(hours: Decimal, tss: Decimal, count: u32) -> SportAggregate {
        SportAggregate {
            hours,
            tss,
            activity_count: count,
        }
    }

    fn window(current_tss: Decimal, prior_tss: Decimal, baseline: Decimal) -> SportWindow {
        let count = |tss: Decimal| if tss > Decimal::ZERO { 3 } else { 0 };
        SportWindow {
            current: aggregate(dec!(4), current_tss, count(current_tss)),
            prior: aggregate(dec!(4), prior_tss, count(prior_tss)),
            baseline_weekly_tss: baseline,
        }
    }

    fn neutral_pmc() -> PmcPoint {
        PmcPoint {
            date: as_of(),
            tss: dec!(60),
            ctl: dec!(55),
            atl: dec!(55),
            tsb: Decimal::ZERO,
            ramp_rate: None,
        }
    }

    #[test]
    fn test_sport_score_shape() {
        assert_eq!(TriScoreCalculator::sport_score(dec!(200), dec!(100)), dec!(80));
        assert_eq!(TriScoreCalculator::sport_score(dec!(50), dec!(100)), dec!(50));
        assert_eq!(TriScoreCalculator::sport_score(Decimal::ZERO, dec!(100)), Decimal::ZERO);
        assert_eq!(
            round_dp(TriScoreCalculator::sport_score(dec!(120), Decimal::ZERO), 0),
            dec!(67)
        );
    }

    #[test]
    fn test_windows() {
        let windows = TriScoreWindows::ending(as_of(), 6).unwrap();
        assert_eq!(windows.current.start, NaiveDate::from_ymd_opt(2024, 6, 24).unwrap());
        assert_eq!(windows.prior.end, NaiveDate::from_ymd_opt(2024, 6, 23).unwrap());
        assert_eq!(windows.prior.start, NaiveDate::from_ymd_opt(2024, 6, 17).unwrap());
        assert_eq!(windows.baseline.start, NaiveDate::from_ymd_opt(2024, 5, 13).unwrap());
        assert_eq!((windows.baseline.end - windows.baseline.start).num_days(), 41);
    }

    #[test]
    fn test_overall_renormalizes_over_active_sports() {
        let mut sports = BTreeMap::new();
        sports.insert(Sport::Cycling, window(dec!(200), dec!(100), dec!(100)));
        sports.insert(Sport::Running, window(dec!(50), dec!(50), dec!(100)));
        let input = TriScoreInput {
            as_of: as_of(),
            sports,
            pmc: Some(neutral_pmc()),
        };

        let result = TriScoreCalculator::new().calculate(&input);
        assert_eq!(result.sport(Sport::Cycling).unwrap().score, dec!(80));
        assert_eq!(result.sport(Sport::Running).unwrap().score, dec!(50));
        assert_eq!(result.form_score, Some(dec!(50)));
        // 0.8 * (0.35*80 + 0.30*50) / 0.65 + 0.2 * 50
        assert_eq!(result.overall, dec!(63));
        assert_eq!(result.sport(Sport::Swimming).unwrap().score, Decimal::ZERO);
        assert_eq!(result.sports.len(), 4);
    }

    #[test]
    fn test_trend_against_prior_week() {
        let mut sports = BTreeMap::new();
        sports.insert(Sport::Cycling, window(dec!(100), dec!(50), dec!(100)));
        let input = TriScoreInput {
            as_of: as_of(),
            sports,
            pmc: None,
        };
        let result = TriScoreCalculator::new().calculate(&input);
        let cycling = result.sport(Sport::Cycling).unwrap();
        assert_eq!(cycling.score, dec!(67));
        assert_eq!(cycling.trend, dec!(17));
        assert_eq!(result.overall, dec!(67));
        assert!(result.pmc.is_none());
    }

    #[test]
    fn test_untrained_sports_are_not_weak_points() {
        let mut sports = BTreeMap::new();
        sports.insert(Sport::Cycling, window(dec!(300), dec!(0), dec!(150)));
        sports.insert(Sport::Running, window(dec!(150), dec!(0), dec!(150)));
        let input = TriScoreInput {
            as_of: as_of(),
            sports,
            pmc: Some(neutral_pmc()),
        };

        let result = TriScoreCalculator::new().calculate(&input);
        assert!(result.balance.balanced);
        assert!(result.balance.recommendations.is_empty());
        assert_eq!(result.balance.weakest, Some(Sport::Running));
        assert_eq!(result.balance.strongest, Some(Sport::Cycling));
        assert_eq!(result.balance.balance_score, dec!(87));
    }

    #[test]
    fn test_imbalance_names_weakest_sport() {
        let mut sports = BTreeMap::new();
        sports.insert(Sport::Swimming, window(dec!(100), dec!(100), dec!(100)));
        sports.insert(Sport::Cycling, window(dec!(30), dec!(100), dec!(100)));
        sports.insert(Sport::Running, window(dec!(250), dec!(100), dec!(100)));
        let input = TriScoreInput {
            as_of: as_of(),
            sports,
            pmc: Some(neutral_pmc()),
        };

        let result = TriScoreCalculator::new().calculate(&input);
        assert!(!result.balance.balanced);
        assert_eq!(result.balance.weakest, Some(Sport::Cycling));
        assert_eq!(result.balance.strongest, Some(Sport::Running));
        assert!(result.balance.recommendations[0].starts_with("Bike"));
        assert!(result
            .balance
            .recommendations
            .iter()
            .all(|r| !r.contains("Strength")));
    }

    #[test]
    fn test_no_activity_scores_zero() {
        let input = TriScoreInput {
            as_of: as_of(),
            sports: BTreeMap::new(),
            pmc: Some(neutral_pmc()),
        };
        let result = TriScoreCalculator::new().calculate(&input);
        assert_eq!(result.overall, Decimal::ZERO);
        assert!(result.balance.balanced);
        assert!(result.balance.weakest.is_none());
    }

    #[test]
    fn test_form_score_clamped() {
        assert_eq!(TriScoreCalculator::form_score(dec!(10)), dec!(70));
        assert_eq!(TriScoreCalculator::form_score(dec!(-40)), Decimal::ZERO);
        assert_eq!(TriScoreCalculator::form_score(dec!(40)), dec!(100));
    }

    #[test]
    fn test_from_aggregates_divides_baseline() {
        let mut baseline = BTreeMap::new();
        baseline.insert(Sport::Running, aggregate(dec!(30), dec!(600), 18));
        let mut current = BTreeMap::new();
        current.insert(Sport::Running, aggregate(dec!(5), dec!(100), 3));

        let input = TriScoreInput::from_aggregates(as_of(), &current, &BTreeMap::new(), &baseline, 6, None);
        assert_eq!(input.sports[&Sport::Running].baseline_weekly_tss, dec!(100));
        assert_eq!(input.sports[&Sport::Cycling].baseline_weekly_tss, Decimal::ZERO);
        assert_eq!(input.sports.len(), 4);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn sport_score_bounded_and_monotonic(a in 0u32..2000, b in 0u32..2000, baseline in 0u32..1000) {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                let baseline = Decimal::from(baseline);
                let s_lo = TriScoreCalculator::sport_score(Decimal::from(lo), baseline);
                let s_hi = TriScoreCalculator::sport_score(Decimal::from(hi), baseline);
                prop_assert!(s_lo >= Decimal::ZERO && s_hi <= Decimal::from(100));
                prop_assert!(s_lo <= s_hi);
            }
        }
    }
}
