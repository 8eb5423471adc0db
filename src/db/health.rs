use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::*;

const HEALTH_COLUMNS: &str = "id, stakeholder_key, assessment_date, engagement_frequency,
     engagement_quality, responsiveness, strategic_alignment, overall_health_score,
     relationship_momentum, risk_level, created_at";

impl StrategicDb {
    // =========================================================================
    // Relationship health (append-only time series, one row per day)
    // =========================================================================

    pub fn insert_health_metric(&self, metric: &NewHealthMetric) -> Result<DbHealthMetric, DbError> {
        for (name, value) in [
            ("engagement_frequency", metric.engagement_frequency),
            ("engagement_quality", metric.engagement_quality),
            ("responsiveness", metric.responsiveness),
            ("strategic_alignment", metric.strategic_alignment),
            ("overall_health_score", metric.overall_health_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DbError::InvalidInput(format!(
                    "{name} must be within 0.0..=1.0, got {value}"
                )));
            }
        }
        let ts = now();
        self.conn.execute(
            "INSERT INTO relationship_health_metrics (
                stakeholder_key, assessment_date, engagement_frequency, engagement_quality,
                responsiveness, strategic_alignment, overall_health_score,
                relationship_momentum, risk_level, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                metric.stakeholder_key,
                metric.assessment_date,
                metric.engagement_frequency,
                metric.engagement_quality,
                metric.responsiveness,
                metric.strategic_alignment,
                metric.overall_health_score,
                metric.relationship_momentum,
                metric.risk_level,
                ts,
            ],
        )?;
        Ok(DbHealthMetric {
            id: self.conn.last_insert_rowid(),
            stakeholder_key: metric.stakeholder_key.clone(),
            assessment_date: metric.assessment_date,
            engagement_frequency: metric.engagement_frequency,
            engagement_quality: metric.engagement_quality,
            responsiveness: metric.responsiveness,
            strategic_alignment: metric.strategic_alignment,
            overall_health_score: metric.overall_health_score,
            relationship_momentum: metric.relationship_momentum,
            risk_level: metric.risk_level,
            created_at: ts,
        })
    }

    /// Most recent snapshots for a stakeholder, newest first.
    pub fn get_recent_health_metrics(
        &self,
        stakeholder_key: &str,
        limit: usize,
    ) -> Result<Vec<DbHealthMetric>, DbError> {
        let sql = format!(
            "SELECT {HEALTH_COLUMNS} FROM relationship_health_metrics
             WHERE stakeholder_key = ?1
             ORDER BY assessment_date DESC, id DESC LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![stakeholder_key, limit as i64], Self::map_health_row)?;
        collect_rows(rows)
    }

    /// The snapshot already taken for `date`, if any.
    pub fn get_health_metric_on(
        &self,
        stakeholder_key: &str,
        date: NaiveDate,
    ) -> Result<Option<DbHealthMetric>, DbError> {
        let sql = format!(
            "SELECT {HEALTH_COLUMNS} FROM relationship_health_metrics
             WHERE stakeholder_key = ?1 AND assessment_date = ?2"
        );
        Ok(self
            .conn
            .query_row(&sql, params![stakeholder_key, date], Self::map_health_row)
            .optional()?)
    }

    /// Latest snapshot from a day before `date`.
    pub fn get_health_metric_before(
        &self,
        stakeholder_key: &str,
        date: NaiveDate,
    ) -> Result<Option<DbHealthMetric>, DbError> {
        let sql = format!(
            "SELECT {HEALTH_COLUMNS} FROM relationship_health_metrics
             WHERE stakeholder_key = ?1 AND assessment_date < ?2
             ORDER BY assessment_date DESC, id DESC LIMIT 1"
        );
        Ok(self
            .conn
            .query_row(&sql, params![stakeholder_key, date], Self::map_health_row)
            .optional()?)
    }

    fn map_health_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbHealthMetric> {
        Ok(DbHealthMetric {
            id: row.get(0)?,
            stakeholder_key: row.get(1)?,
            assessment_date: row.get(2)?,
            engagement_frequency: row.get(3)?,
            engagement_quality: row.get(4)?,
            responsiveness: row.get(5)?,
            strategic_alignment: row.get(6)?,
            overall_health_score: row.get(7)?,
            relationship_momentum: row.get(8)?,
            risk_level: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}
