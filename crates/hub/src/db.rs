use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use time::OffsetDateTime;

use crate::calibrate::MoistureStatus;

#[derive(Clone)]
pub(crate) struct Db {
    pool: Pool<Sqlite>,
}

/// A persisted, calibrated reading. `light` and `moisture` are percentages
/// in 0..=100; `moisture_status` is derived from the same raw moisture
/// input; `ts` is hub-side unix seconds, assigned at persistence time.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct Reading {
    pub(crate) id: i64,
    pub(crate) ts: i64,
    pub(crate) user_id: String,
    pub(crate) role: String,
    pub(crate) temperature: f64,
    pub(crate) light: f64,
    pub(crate) moisture: f64,
    pub(crate) moisture_status: MoistureStatus,
    pub(crate) ir_sensor: i64,
}

/// A reading about to be inserted (no rowid yet).
#[derive(Debug, Clone)]
pub(crate) struct NewReading {
    pub(crate) ts: i64,
    pub(crate) user_id: String,
    pub(crate) role: String,
    pub(crate) temperature: f64,
    pub(crate) light: f64,
    pub(crate) moisture: f64,
    pub(crate) moisture_status: MoistureStatus,
    pub(crate) ir_sensor: i64,
}

/// Optional ages for the household roles, one row per account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AgeConfig {
    pub(crate) mother: Option<i64>,
    pub(crate) father: Option<i64>,
    pub(crate) child: Option<i64>,
}

fn reading_from_row(row: &SqliteRow) -> Result<Reading> {
    let status: String = row.try_get("moisture_status")?;
    Ok(Reading {
        id: row.try_get("id")?,
        ts: row.try_get("ts")?,
        user_id: row.try_get("user_id")?,
        role: row.try_get("role")?,
        temperature: row.try_get("temperature")?,
        light: row.try_get("light")?,
        moisture: row.try_get("moisture")?,
        moisture_status: MoistureStatus::from_str(&status)
            .map_err(|e| anyhow!("corrupt readings row: {e}"))?,
        ir_sensor: row.try_get("ir_sensor")?,
    })
}

const READING_COLUMNS: &str =
    "id, ts, user_id, role, temperature, light, moisture, moisture_status, ir_sensor";

impl Db {
    /// db_url examples:
    /// - "sqlite:smartcomb.db?mode=rwc"
    /// - "sqlite::memory:" (tests)
    pub(crate) async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    /// Runs SQLx migrations from ./migrations.
    pub(crate) async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    // ----------------------------
    // Readings
    // ----------------------------

    pub(crate) async fn insert_reading(&self, r: &NewReading) -> Result<i64> {
        let res = sqlx::query(
            r#"
            INSERT INTO readings
              (ts, user_id, role, temperature, light, moisture, moisture_status, ir_sensor)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(r.ts)
        .bind(&r.user_id)
        .bind(&r.role)
        .bind(r.temperature)
        .bind(r.light)
        .bind(r.moisture)
        .bind(r.moisture_status.as_str())
        .bind(r.ir_sensor)
        .execute(&self.pool)
        .await
        .context("insert_reading failed")?;
        Ok(res.last_insert_rowid())
    }

    /// Newest reading for a (user, role) pair, if any. Ties on `ts` break
    /// toward the later insert.
    pub(crate) async fn latest_reading(
        &self,
        user_id: &str,
        role: &str,
    ) -> Result<Option<Reading>> {
        let row = sqlx::query(&format!(
            "SELECT {READING_COLUMNS} FROM readings \
             WHERE user_id = ? AND role = ? \
             ORDER BY ts DESC, id DESC LIMIT 1"
        ))
        .bind(user_id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await
        .context("latest_reading failed")?;

        row.as_ref().map(reading_from_row).transpose()
    }

    /// Recent readings for a user, newest first. `role: None` returns all
    /// roles.
    pub(crate) async fn recent_readings(
        &self,
        user_id: &str,
        role: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Reading>> {
        let rows = match role {
            Some(role) => {
                sqlx::query(&format!(
                    "SELECT {READING_COLUMNS} FROM readings \
                     WHERE user_id = ? AND role = ? \
                     ORDER BY ts DESC, id DESC LIMIT ?"
                ))
                .bind(user_id)
                .bind(role)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {READING_COLUMNS} FROM readings \
                     WHERE user_id = ? \
                     ORDER BY ts DESC, id DESC LIMIT ?"
                ))
                .bind(user_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("recent_readings failed")?;

        rows.iter().map(reading_from_row).collect()
    }

    // ----------------------------
    // Age configuration
    // ----------------------------

    /// Ages configured for a user; a missing row means nothing configured
    /// yet and comes back as all-`None`.
    pub(crate) async fn get_ages(&self, user_id: &str) -> Result<AgeConfig> {
        let row = sqlx::query(
            "SELECT mother_age, father_age, child_age FROM user_settings WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("get_ages failed")?;

        Ok(match row {
            Some(r) => AgeConfig {
                mother: r.try_get("mother_age")?,
                father: r.try_get("father_age")?,
                child: r.try_get("child_age")?,
            },
            None => AgeConfig::default(),
        })
    }

    pub(crate) async fn set_ages(&self, user_id: &str, ages: &AgeConfig) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        sqlx::query(
            r#"
            INSERT INTO user_settings (user_id, mother_age, father_age, child_age, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
              mother_age=excluded.mother_age,
              father_age=excluded.father_age,
              child_age=excluded.child_age,
              updated_at=excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(ages.mother)
        .bind(ages.father)
        .bind(ages.child)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("set_ages failed")?;
        Ok(())
    }

    // ----------------------------
    // Recommendations
    // ----------------------------

    pub(crate) async fn insert_recommendation(
        &self,
        user_id: &str,
        role: &str,
        age: Option<i64>,
        reading_id: i64,
        advice_json: &str,
    ) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        sqlx::query(
            r#"
            INSERT INTO recommendations (user_id, role, age, reading_id, advice, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(role)
        .bind(age)
        .bind(reading_id)
        .bind(advice_json)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("insert_recommendation failed")?;
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Db {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    fn reading(user_id: &str, role: &str, ts: i64) -> NewReading {
        NewReading {
            ts,
            user_id: user_id.to_string(),
            role: role.to_string(),
            temperature: 25.0,
            light: 50.0,
            moisture: 40.0,
            moisture_status: MoistureStatus::Normal,
            ir_sensor: 1,
        }
    }

    // -- readings -----------------------------------------------------------

    #[tokio::test]
    async fn insert_and_fetch_latest() {
        let db = test_db().await;
        db.insert_reading(&reading("u1", "mother", 100)).await.unwrap();
        db.insert_reading(&reading("u1", "mother", 200)).await.unwrap();

        let latest = db.latest_reading("u1", "mother").await.unwrap().unwrap();
        assert_eq!(latest.ts, 200);
        assert_eq!(latest.user_id, "u1");
        assert_eq!(latest.role, "mother");
        assert_eq!(latest.moisture_status, MoistureStatus::Normal);
    }

    #[tokio::test]
    async fn latest_reading_none_for_unknown_user() {
        let db = test_db().await;
        assert!(db.latest_reading("nobody", "user").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn latest_reading_ties_break_toward_later_insert() {
        let db = test_db().await;
        let _first = db.insert_reading(&reading("u1", "mother", 100)).await.unwrap();
        let second = db.insert_reading(&reading("u1", "mother", 100)).await.unwrap();
        let latest = db.latest_reading("u1", "mother").await.unwrap().unwrap();
        assert_eq!(latest.id, second);
    }

    #[tokio::test]
    async fn duplicate_messages_produce_two_rows() {
        let db = test_db().await;
        db.insert_reading(&reading("u1", "user", 100)).await.unwrap();
        db.insert_reading(&reading("u1", "user", 100)).await.unwrap();
        let rows = db.recent_readings("u1", None, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn recent_readings_newest_first() {
        let db = test_db().await;
        db.insert_reading(&reading("u1", "user", 100)).await.unwrap();
        db.insert_reading(&reading("u1", "user", 300)).await.unwrap();
        db.insert_reading(&reading("u1", "user", 200)).await.unwrap();

        let rows = db.recent_readings("u1", None, 10).await.unwrap();
        let ts: Vec<i64> = rows.iter().map(|r| r.ts).collect();
        assert_eq!(ts, vec![300, 200, 100]);
    }

    #[tokio::test]
    async fn recent_readings_filters_by_role() {
        let db = test_db().await;
        db.insert_reading(&reading("u1", "mother", 100)).await.unwrap();
        db.insert_reading(&reading("u1", "child", 200)).await.unwrap();

        let rows = db.recent_readings("u1", Some("child"), 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].role, "child");

        let all = db.recent_readings("u1", None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn recent_readings_respects_limit() {
        let db = test_db().await;
        for ts in 0..5 {
            db.insert_reading(&reading("u1", "user", ts)).await.unwrap();
        }
        let rows = db.recent_readings("u1", None, 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ts, 4);
    }

    #[tokio::test]
    async fn recent_readings_scoped_to_user() {
        let db = test_db().await;
        db.insert_reading(&reading("u1", "user", 100)).await.unwrap();
        db.insert_reading(&reading("u2", "user", 200)).await.unwrap();
        let rows = db.recent_readings("u1", None, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, "u1");
    }

    // -- age config ----------------------------------------------------------

    #[tokio::test]
    async fn ages_default_to_none() {
        let db = test_db().await;
        assert_eq!(db.get_ages("u1").await.unwrap(), AgeConfig::default());
    }

    #[tokio::test]
    async fn ages_round_trip_and_upsert() {
        let db = test_db().await;
        let ages = AgeConfig {
            mother: Some(38),
            father: Some(41),
            child: None,
        };
        db.set_ages("u1", &ages).await.unwrap();
        assert_eq!(db.get_ages("u1").await.unwrap(), ages);

        let updated = AgeConfig {
            child: Some(7),
            ..ages
        };
        db.set_ages("u1", &updated).await.unwrap();
        assert_eq!(db.get_ages("u1").await.unwrap(), updated);
    }

    // -- recommendations ------------------------------------------------------

    #[tokio::test]
    async fn insert_recommendation_links_reading() {
        let db = test_db().await;
        let id = db.insert_reading(&reading("u1", "mother", 100)).await.unwrap();
        db.insert_recommendation("u1", "mother", Some(38), id, r#"{"recommendations":[]}"#)
            .await
            .unwrap();
    }
}
