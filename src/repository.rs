use crate::database::DatabaseError;
use crate::models::{aggregate_by_sport, AthleteThresholds, Session, Sport, SportAggregate};
use crate::tss::TssResult;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Athlete not found: {0}")]
    AthleteNotFound(String),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl<T> From<PoisonError<T>> for RepositoryError {
    fn from(_: PoisonError<T>) -> Self {
        RepositoryError::Storage("repository lock poisoned".to_string())
    }
}

/// Source of athlete thresholds and session records.
///
/// Implementations must return sessions ordered by date, then id.
pub trait SessionRepository: Send + Sync {
    /// Current thresholds; unknown athletes are an error
    fn thresholds(&self, athlete_id: &str) -> Result<AthleteThresholds, RepositoryError>;

    /// Create or replace an athlete's thresholds
    fn save_thresholds(
        &self,
        athlete_id: &str,
        thresholds: &AthleteThresholds,
    ) -> Result<(), RepositoryError>;

    /// Sessions in an inclusive, optionally open-ended date range
    fn sessions(
        &self,
        athlete_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Session>, RepositoryError>;

    fn session(&self, session_id: &str) -> Result<Option<Session>, RepositoryError>;

    /// Insert or replace a session. Registers the athlete if needed.
    fn store_session(&self, session: &Session) -> Result<(), RepositoryError>;

    /// Attach a computed TSS to an existing session
    fn update_session_tss(&self, session_id: &str, result: &TssResult)
        -> Result<(), RepositoryError>;

    fn athlete_ids(&self) -> Result<Vec<String>, RepositoryError>;

    fn first_session_date(&self, athlete_id: &str) -> Result<Option<NaiveDate>, RepositoryError> {
        Ok(self
            .sessions(athlete_id, None, None)?
            .first()
            .map(|s| s.date))
    }

    /// Per-sport hours, TSS and count over an inclusive window
    fn weekly_aggregate(
        &self,
        athlete_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<Sport, SportAggregate>, RepositoryError> {
        let sessions = self.sessions(athlete_id, Some(from), Some(to))?;
        Ok(aggregate_by_sport(&sessions))
    }
}

pub(crate) fn check_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<(), RepositoryError> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(RepositoryError::InvalidQuery(format!(
            "range start {} is after end {}",
            from, to
        ))),
        _ => Ok(()),
    }
}

/// Repository held entirely in memory, used by tests and dry runs
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    athletes: RwLock<HashMap<String, AthleteThresholds>>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRepository for InMemoryRepository {
    fn thresholds(&self, athlete_id: &str) -> Result<AthleteThresholds, RepositoryError> {
        self.athletes
            .read()?
            .get(athlete_id)
            .cloned()
            .ok_or_else(|| RepositoryError::AthleteNotFound(athlete_id.to_string()))
    }

    fn save_thresholds(
        &self,
        athlete_id: &str,
        thresholds: &AthleteThresholds,
    ) -> Result<(), RepositoryError> {
        self.athletes
            .write()?
            .insert(athlete_id.to_string(), thresholds.clone());
        Ok(())
    }

    fn sessions(
        &self,
        athlete_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Session>, RepositoryError> {
        check_range(from, to)?;
        let mut sessions: Vec<Session> = self
            .sessions
            .read()?
            .values()
            .filter(|s| s.athlete_id == athlete_id)
            .filter(|s| from.map_or(true, |from| s.date >= from))
            .filter(|s| to.map_or(true, |to| s.date <= to))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(sessions)
    }

    fn session(&self, session_id: &str) -> Result<Option<Session>, RepositoryError> {
        Ok(self.sessions.read()?.get(session_id).cloned())
    }

    fn store_session(&self, session: &Session) -> Result<(), RepositoryError> {
        self.athletes
            .write()?
            .entry(session.athlete_id.clone())
            .or_default();
        self.sessions
            .write()?
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn update_session_tss(
        &self,
        session_id: &str,
        result: &TssResult,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write()?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| RepositoryError::SessionNotFound(session_id.to_string()))?;
        session.tss = Some(result.tss);
        session.intensity_factor = result.intensity_factor;
        session.tss_method = Some(result.method);
        Ok(())
    }

    fn athlete_ids(&self) -> Result<Vec<String>, RepositoryError> {
        let mut ids: Vec<String> = self.athletes.read()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
