use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::models::{AthleteThresholds, Session, Sport};
use crate::repository::{check_range, RepositoryError, SessionRepository};
use crate::tss::{TssMethod, TssResult};

/// Database error types
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

const SESSION_COLUMNS: &str = r#"
    id, athlete_id, date, sport, duration_seconds, distance, avg_heart_rate,
    avg_power, normalized_power, avg_speed, tss, intensity_factor, tss_method
"#;

/// SQLite-backed session repository
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create or open a database at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, DatabaseError> {
        let conn = Connection::open(db_path.as_ref())?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        info!(path = %db_path.as_ref().display(), "Opened session database");
        Ok(db)
    }

    /// Private in-memory database
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.conn()?;

        // journal_mode returns a row, so it cannot go through execute()
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.execute("PRAGMA foreign_keys=ON", [])?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS athletes (
                id TEXT PRIMARY KEY,
                ftp INTEGER,
                lthr INTEGER,
                threshold_pace TEXT,
                css TEXT,
                max_hr INTEGER,
                resting_hr INTEGER,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                athlete_id TEXT NOT NULL,
                date DATE NOT NULL,
                sport TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL CHECK (duration_seconds >= 0),
                distance TEXT,
                avg_heart_rate INTEGER,
                avg_power INTEGER,
                normalized_power INTEGER,
                avg_speed TEXT,

                -- Cached load, recomputed when thresholds change
                tss TEXT,
                intensity_factor TEXT,
                tss_method TEXT,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,

                FOREIGN KEY (athlete_id) REFERENCES athletes (id)
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_athlete_date ON sessions (athlete_id, date)",
            [],
        )?;

        Ok(())
    }

    fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
        Ok(Session {
            id: row.get("id")?,
            athlete_id: row.get("athlete_id")?,
            date: row.get("date")?,
            sport: parse_column::<Sport>(row, "sport")?,
            duration_seconds: row.get("duration_seconds")?,
            distance: parse_optional::<Decimal>(row, "distance")?,
            avg_heart_rate: row.get("avg_heart_rate")?,
            avg_power: row.get("avg_power")?,
            normalized_power: row.get("normalized_power")?,
            avg_speed: parse_optional::<Decimal>(row, "avg_speed")?,
            tss: parse_optional::<Decimal>(row, "tss")?,
            intensity_factor: parse_optional::<Decimal>(row, "intensity_factor")?,
            tss_method: parse_optional::<TssMethod>(row, "tss_method")?,
        })
    }

    /// Number of stored sessions for an athlete
    pub fn session_count(&self, athlete_id: &str) -> Result<usize, DatabaseError> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM sessions WHERE athlete_id = ?1",
            params![athlete_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn parse_column<T>(row: &Row, column: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let index = row.as_ref().column_index(column)?;
    let text: String = row.get(index)?;
    text.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, e.to_string().into())
    })
}

fn parse_optional<T>(row: &Row, column: &str) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let index = row.as_ref().column_index(column)?;
    let text: Option<String> = row.get(index)?;
    text.map(|t| {
        t.parse::<T>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, e.to_string().into())
        })
    })
    .transpose()
}

impl SessionRepository for Database {
    fn thresholds(&self, athlete_id: &str) -> Result<AthleteThresholds, RepositoryError> {
        let thresholds = self
            .conn()?
            .query_row(
                "SELECT ftp, lthr, threshold_pace, css, max_hr, resting_hr FROM athletes WHERE id = ?1",
                params![athlete_id],
                |row| {
                    Ok(AthleteThresholds {
                        ftp: row.get("ftp")?,
                        lthr: row.get("lthr")?,
                        threshold_pace: parse_optional::<Decimal>(row, "threshold_pace")?,
                        css: parse_optional::<Decimal>(row, "css")?,
                        max_hr: row.get("max_hr")?,
                        resting_hr: row.get("resting_hr")?,
                    })
                },
            )
            .optional()
            .map_err(DatabaseError::from)?;

        thresholds.ok_or_else(|| RepositoryError::AthleteNotFound(athlete_id.to_string()))
    }

    fn save_thresholds(
        &self,
        athlete_id: &str,
        thresholds: &AthleteThresholds,
    ) -> Result<(), RepositoryError> {
        self.conn()?
            .execute(
                r#"
                INSERT INTO athletes (id, ftp, lthr, threshold_pace, css, max_hr, resting_hr)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(id) DO UPDATE SET
                    ftp = excluded.ftp,
                    lthr = excluded.lthr,
                    threshold_pace = excluded.threshold_pace,
                    css = excluded.css,
                    max_hr = excluded.max_hr,
                    resting_hr = excluded.resting_hr,
                    updated_at = CURRENT_TIMESTAMP
                "#,
                params![
                    athlete_id,
                    thresholds.ftp,
                    thresholds.lthr,
                    thresholds.threshold_pace.map(|p| p.to_string()),
                    thresholds.css.map(|c| c.to_string()),
                    thresholds.max_hr,
                    thresholds.resting_hr,
                ],
            )
            .map_err(DatabaseError::from)?;
        debug!(athlete = athlete_id, "Saved thresholds");
        Ok(())
    }

    fn sessions(
        &self,
        athlete_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Session>, RepositoryError> {
        check_range(from, to)?;
        let conn = self.conn()?;
        let query = format!(
            r#"
            SELECT {}
            FROM sessions
            WHERE athlete_id = ?1
              AND (?2 IS NULL OR date >= ?2)
              AND (?3 IS NULL OR date <= ?3)
            ORDER BY date, id
            "#,
            SESSION_COLUMNS
        );

        let mut stmt = conn.prepare(&query).map_err(DatabaseError::from)?;
        let sessions = stmt
            .query_map(params![athlete_id, from, to], Self::session_from_row)
            .map_err(DatabaseError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(DatabaseError::from)?;
        Ok(sessions)
    }

    fn session(&self, session_id: &str) -> Result<Option<Session>, RepositoryError> {
        let query = format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS);
        let session = self
            .conn()?
            .query_row(&query, params![session_id], Self::session_from_row)
            .optional()
            .map_err(DatabaseError::from)?;
        Ok(session)
    }

    fn store_session(&self, session: &Session) -> Result<(), RepositoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(DatabaseError::from)?;

        tx.execute(
            "INSERT OR IGNORE INTO athletes (id) VALUES (?1)",
            params![session.athlete_id],
        )
        .map_err(DatabaseError::from)?;

        tx.execute(
            r#"
            INSERT OR REPLACE INTO sessions (
                id, athlete_id, date, sport, duration_seconds, distance, avg_heart_rate,
                avg_power, normalized_power, avg_speed, tss, intensity_factor, tss_method,
                updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, CURRENT_TIMESTAMP
            )
            "#,
            params![
                session.id,
                session.athlete_id,
                session.date,
                session.sport.as_str(),
                session.duration_seconds,
                session.distance.map(|d| d.to_string()),
                session.avg_heart_rate,
                session.avg_power,
                session.normalized_power,
                session.avg_speed.map(|s| s.to_string()),
                session.tss.map(|t| t.to_string()),
                session.intensity_factor.map(|i| i.to_string()),
                session.tss_method.map(|m| m.as_str()),
            ],
        )
        .map_err(DatabaseError::from)?;

        tx.commit().map_err(DatabaseError::from)?;
        Ok(())
    }

    fn update_session_tss(
        &self,
        session_id: &str,
        result: &TssResult,
    ) -> Result<(), RepositoryError> {
        let updated = self
            .conn()?
            .execute(
                r#"
                UPDATE sessions
                SET tss = ?2, intensity_factor = ?3, tss_method = ?4, updated_at = CURRENT_TIMESTAMP
                WHERE id = ?1
                "#,
                params![
                    session_id,
                    result.tss.to_string(),
                    result.intensity_factor.map(|i| i.to_string()),
                    result.method.as_str(),
                ],
            )
            .map_err(DatabaseError::from)?;

        if updated == 0 {
            return Err(RepositoryError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    fn athlete_ids(&self) -> Result<Vec<String>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id FROM athletes ORDER BY id")
            .map_err(DatabaseError::from)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(DatabaseError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(DatabaseError::from)?;
        Ok(ids)
    }

    fn first_session_date(&self, athlete_id: &str) -> Result<Option<NaiveDate>, RepositoryError> {
        let date: Option<NaiveDate> = self
            .conn()?
            .query_row(
                "SELECT MIN(date) FROM sessions WHERE athlete_id = ?1",
                params![athlete_id],
                |row| row.get(0),
            )
            .map_err(DatabaseError::from)?;
        Ok(date)
    }
}
