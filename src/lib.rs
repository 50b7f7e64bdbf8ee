// Library interface for the training load engine
// Integration tests and the CLI binary both build on these modules

pub mod config;
pub mod database;
pub mod efficiency;
pub mod engine;
pub mod error;
pub mod import;
pub mod logging;
pub mod models;
pub mod pmc;
pub mod repository;
pub mod store;
pub mod triscore;
pub mod tss;
pub mod zones;

// Re-export commonly used types for convenience
pub use models::*;
pub use efficiency::{EfficiencyAnalyzer, EfficiencyTrend, TrendDirection};
pub use engine::{EngineOptions, PmcResponse, TrainingLoadEngine};
pub use pmc::{PmcCalculator, PmcPoint, PmcSeed, ProjectedLoad, ProjectionPoint, TsbInterpretation};
pub use repository::{InMemoryRepository, SessionRepository};
pub use store::{PmcSeries, PmcStore};
pub use triscore::{CompositeScore, TriScoreCalculator};
pub use tss::{TssCalculator, TssMethod, TssResult};
pub use zones::{ZoneCalculator, ZoneSet, ZoneTable};
pub use error::{Result, TrainLoadError};
pub use logging::{LogConfig, LogFormat, LogLevel};
