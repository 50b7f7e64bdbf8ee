use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::efficiency::EfficiencyConfig;
use crate::engine::EngineOptions;
use crate::logging::LogConfig;
use crate::pmc::PmcConfig;
use crate::triscore::TriScoreConfig;

const CONFIG_DIR: &str = ".trainload";
const MAX_PROJECTION_DAYS: u32 = 365;

/// Everything `trainload` reads from `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub metadata: ConfigMetadata,
    pub settings: AppSettings,

    /// CTL/ATL time constants and ramp window
    pub pmc: PmcConfig,
    pub projection: ProjectionSettings,
    pub tri_score: TriScoreConfig,
    pub efficiency: EfficiencyConfig,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConfigMetadata {
    fn new() -> Self {
        let now = Utc::now();
        ConfigMetadata {
            version: "1.0".to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// SQLite session database; defaults to `~/.trainload/trainload.db`
    pub database_path: Option<PathBuf>,

    /// Athlete used when a command does not name one
    pub default_athlete_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSettings {
    /// Days projected past today
    pub horizon_days: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        let engine = EngineOptions::default();
        AppConfig {
            metadata: ConfigMetadata::new(),
            settings: AppSettings::default(),
            pmc: engine.pmc,
            projection: ProjectionSettings {
                horizon_days: engine.projection_horizon_days,
            },
            tri_score: engine.tri_score,
            efficiency: engine.efficiency,
            logging: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parse and validate a TOML config file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Malformed config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        Ok(config)
    }

    /// Write the config as TOML, creating parent directories and stamping `updated_at`
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.metadata.updated_at = Utc::now();

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create {}", dir.display()))?;
        }
        let body = toml::to_string_pretty(self).context("Cannot encode config as TOML")?;
        fs::write(path, body).with_context(|| format!("Cannot write config {}", path.display()))?;
        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        self.pmc.validate()?;

        if self.projection.horizon_days > MAX_PROJECTION_DAYS {
            bail!(
                "projection.horizon_days must be at most {}, got {}",
                MAX_PROJECTION_DAYS,
                self.projection.horizon_days
            );
        }

        let weights = &self.tri_score.weights;
        let all = [weights.swimming, weights.cycling, weights.running, weights.strength];
        if all.iter().any(|w| w.is_sign_negative()) {
            bail!("tri_score.weights must not be negative");
        }
        if all.iter().all(|w| w.is_zero()) {
            bail!("tri_score.weights must give at least one sport a weight");
        }
        if self.tri_score.baseline_weeks == 0 {
            bail!("tri_score.baseline_weeks must be at least 1");
        }
        if self.tri_score.form_weight < Decimal::ZERO || self.tri_score.form_weight > Decimal::ONE {
            bail!("tri_score.form_weight must be between 0 and 1");
        }
        if self.efficiency.trend_threshold_percent < 0.0 {
            bail!("efficiency.trend_threshold_percent must not be negative");
        }
        Ok(())
    }

    fn base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR)
    }

    /// `~/.trainload/config.toml`
    pub fn default_config_path() -> PathBuf {
        Self::base_dir().join("config.toml")
    }

    /// The default config file if it loads cleanly, built-in defaults otherwise
    pub fn load_or_default() -> Self {
        let path = Self::default_config_path();
        if !path.exists() {
            return Self::default();
        }
        Self::load_from_file(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unusable config file");
            Self::default()
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.settings
            .database_path
            .clone()
            .unwrap_or_else(|| Self::base_dir().join("trainload.db"))
    }

    /// Engine tunables drawn from this configuration
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            pmc: self.pmc.clone(),
            projection_horizon_days: self.projection.horizon_days,
            tri_score: self.tri_score.clone(),
            efficiency: self.efficiency.clone(),
        }
    }
}
