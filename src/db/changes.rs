use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::*;
use crate::entity::{ChangeType, EntityKind, MeetingType};

const CHANGE_COLUMNS: &str = "id, change_type, path_full, path_relative, category, subcategory,
     stakeholders_detected, projects_detected, meeting_type_detected, content_summary,
     strategic_value, confidence, content_hash, created_at, processed_at, memory_stored_at";

impl StrategicDb {
    // =========================================================================
    // Workspace changes (append-only audit log)
    // =========================================================================

    /// Append an observed filesystem event. Returns the new row id.
    pub fn insert_change(
        &self,
        change_type: ChangeType,
        path_full: &str,
        path_relative: &str,
        content_hash: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO workspace_changes
                (change_type, path_full, path_relative, content_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![change_type, path_full, path_relative, content_hash, observed_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Write the classifier's verdict onto a change row.
    pub fn record_classification(
        &self,
        id: i64,
        category: &str,
        subcategory: Option<&str>,
        meeting_type: Option<MeetingType>,
    ) -> Result<(), DbError> {
        let changed = self.conn.execute(
            "UPDATE workspace_changes
             SET category = ?1, subcategory = ?2, meeting_type_detected = ?3
             WHERE id = ?4",
            params![category, subcategory, meeting_type, id],
        )?;
        if changed == 0 {
            return Err(DbError::not_found("workspace change", &id.to_string()));
        }
        Ok(())
    }

    /// Write extraction results (or a degraded marker) and stamp `processed_at`.
    pub fn record_extraction(&self, id: i64, extraction: &ChangeExtraction) -> Result<(), DbError> {
        let changed = self.conn.execute(
            "UPDATE workspace_changes
             SET stakeholders_detected = ?1, projects_detected = ?2, content_summary = ?3,
                 strategic_value = ?4, confidence = ?5, processed_at = ?6
             WHERE id = ?7",
            params![
                to_json_column(&extraction.stakeholders_detected)?,
                to_json_column(&extraction.projects_detected)?,
                extraction.content_summary,
                extraction.strategic_value,
                extraction.confidence,
                now(),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::not_found("workspace change", &id.to_string()));
        }
        Ok(())
    }

    /// Stamp `memory_stored_at` once a derived entity has been committed.
    pub fn mark_memory_stored(&self, id: i64) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE workspace_changes SET memory_stored_at = ?1
             WHERE id = ?2 AND memory_stored_at IS NULL",
            params![now(), id],
        )?;
        Ok(())
    }

    /// Most recent row for a path, whatever its change type.
    pub fn get_latest_change_for_path(
        &self,
        path_full: &str,
    ) -> Result<Option<DbWorkspaceChange>, DbError> {
        let sql = format!(
            "SELECT {CHANGE_COLUMNS} FROM workspace_changes
             WHERE path_full = ?1 ORDER BY id DESC LIMIT 1"
        );
        Ok(self
            .conn
            .query_row(&sql, params![path_full], Self::map_change_row)
            .optional()?)
    }

    /// The row already holding this (path, type, observed time) slot.
    pub fn find_change_at(
        &self,
        path_full: &str,
        change_type: ChangeType,
        observed_at: DateTime<Utc>,
    ) -> Result<Option<DbWorkspaceChange>, DbError> {
        let sql = format!(
            "SELECT {CHANGE_COLUMNS} FROM workspace_changes
             WHERE path_full = ?1 AND change_type = ?2 AND created_at = ?3"
        );
        Ok(self
            .conn
            .query_row(
                &sql,
                params![path_full, change_type, observed_at],
                Self::map_change_row,
            )
            .optional()?)
    }

    pub fn get_change(&self, id: i64) -> Result<Option<DbWorkspaceChange>, DbError> {
        let sql = format!("SELECT {CHANGE_COLUMNS} FROM workspace_changes WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], Self::map_change_row)
            .optional()?)
    }

    /// All recorded events for one path, in observed order.
    pub fn get_changes_for_path(&self, path_full: &str) -> Result<Vec<DbWorkspaceChange>, DbError> {
        let sql = format!(
            "SELECT {CHANGE_COLUMNS} FROM workspace_changes WHERE path_full = ?1 ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![path_full], Self::map_change_row)?;
        collect_rows(rows)
    }

    fn map_change_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbWorkspaceChange> {
        Ok(DbWorkspaceChange {
            id: row.get(0)?,
            change_type: row.get(1)?,
            path_full: row.get(2)?,
            path_relative: row.get(3)?,
            category: row.get(4)?,
            subcategory: row.get(5)?,
            stakeholders_detected: json_column(row, 6)?,
            projects_detected: json_column(row, 7)?,
            meeting_type_detected: row.get(8)?,
            content_summary: row.get(9)?,
            strategic_value: row.get(10)?,
            confidence: row.get(11)?,
            content_hash: row.get(12)?,
            created_at: row.get(13)?,
            processed_at: row.get(14)?,
            memory_stored_at: row.get(15)?,
        })
    }

    // =========================================================================
    // Ingest ledger (idempotent derived-entity creation)
    // =========================================================================

    /// Entities already derived from an ingestion dedup key.
    pub fn get_ledger_entries(&self, dedup_key: &str) -> Result<Vec<LedgerEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT dedup_key, entity_kind, entity_key, change_id
             FROM ingest_ledger WHERE dedup_key = ?1
             ORDER BY created_at, entity_key",
        )?;
        let rows = stmt.query_map(params![dedup_key], |row| {
            Ok(LedgerEntry {
                dedup_key: row.get(0)?,
                entity_kind: row.get(1)?,
                entity_key: row.get(2)?,
                change_id: row.get(3)?,
            })
        })?;
        collect_rows(rows)
    }

    pub fn record_ledger_entry(
        &self,
        dedup_key: &str,
        entity_kind: EntityKind,
        entity_key: &str,
        change_id: i64,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO ingest_ledger
                (dedup_key, entity_kind, entity_key, change_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![dedup_key, entity_kind, entity_key, change_id, now()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_db;
    use super::*;
    use crate::entity::StrategicValue;

    #[test]
    fn test_change_lifecycle() {
        let db = test_db();
        let id = db
            .insert_change(ChangeType::FileCreated, "/ws/a.md", "a.md", "h1", Utc::now())
            .unwrap();

        let fresh = db.get_change(id).unwrap().unwrap();
        assert!(fresh.category.is_none());
        assert!(fresh.stakeholders_detected.is_empty());
        assert!(fresh.memory_stored_at.is_none());

        db.record_classification(id, "meetings", Some("one_on_one"), Some(MeetingType::VpOneOnOne))
            .unwrap();
        db.record_extraction(
            id,
            &ChangeExtraction {
                stakeholders_detected: vec!["raghu".into()],
                projects_detected: vec![],
                content_summary: "Agenda: 3 items".into(),
                strategic_value: Some(StrategicValue::Medium),
                confidence: 0.6,
            },
        )
        .unwrap();
        db.mark_memory_stored(id).unwrap();

        let done = db.get_change(id).unwrap().unwrap();
        assert_eq!(done.category.as_deref(), Some("meetings"));
        assert_eq!(done.meeting_type_detected, Some(MeetingType::VpOneOnOne));
        assert_eq!(done.stakeholders_detected, vec!["raghu".to_string()]);
        assert_eq!(done.strategic_value, Some(StrategicValue::Medium));
        assert!(done.processed_at.is_some());
        assert!(done.memory_stored_at.is_some());
    }

    #[test]
    fn test_same_path_recurs_across_change_types() {
        let db = test_db();
        db.insert_change(ChangeType::FileCreated, "/ws/a.md", "a.md", "h1", Utc::now())
            .unwrap();
        db.insert_change(ChangeType::FileModified, "/ws/a.md", "a.md", "h2", Utc::now())
            .unwrap();
        db.insert_change(ChangeType::FileDeleted, "/ws/a.md", "a.md", "", Utc::now())
            .unwrap();

        let history = db.get_changes_for_path("/ws/a.md").unwrap();
        let kinds: Vec<ChangeType> = history.iter().map(|c| c.change_type).collect();
        assert_eq!(
            kinds,
            vec![ChangeType::FileCreated, ChangeType::FileModified, ChangeType::FileDeleted]
        );
        let latest = db.get_latest_change_for_path("/ws/a.md").unwrap().unwrap();
        assert_eq!(latest.change_type, ChangeType::FileDeleted);
        assert!(db.get_latest_change_for_path("/ws/b.md").unwrap().is_none());
    }

    #[test]
    fn test_find_change_at_observed_slot() {
        let db = test_db();
        let at: DateTime<Utc> = "2026-10-19T15:00:00Z".parse().unwrap();
        let id = db
            .insert_change(ChangeType::FileModified, "/ws/a.md", "a.md", "h1", at)
            .unwrap();

        let found = db
            .find_change_at("/ws/a.md", ChangeType::FileModified, at)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert!(db
            .find_change_at("/ws/a.md", ChangeType::FileDeleted, at)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_ledger_entries_are_idempotent() {
        let db = test_db();
        let id = db
            .insert_change(ChangeType::FileCreated, "/ws/a.md", "a.md", "h1", Utc::now())
            .unwrap();
        db.record_ledger_entry("k1", EntityKind::Meeting, "m-1", id).unwrap();
        db.record_ledger_entry("k1", EntityKind::Meeting, "m-1", id).unwrap();
        db.record_ledger_entry("k1", EntityKind::Task, "t-1", id).unwrap();

        let entries = db.get_ledger_entries("k1").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(db.get_ledger_entries("other").unwrap().is_empty());
    }
}
