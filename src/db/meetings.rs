use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::*;
use crate::entity::MeetingStatus;

const MEETING_COLUMNS: &str = "meeting_key, meeting_type, stakeholder_primary, stakeholder_secondary,
     meeting_date, meeting_status, agenda_items, preparation_notes, meeting_outcomes,
     action_items, persona_activated, strategic_themes, rescheduled_from, source_path,
     detection_confidence, version, created_at, updated_at";

/// Content merged into an existing session when another file resolves to it.
#[derive(Debug, Clone, Default)]
pub struct MeetingContentMerge {
    pub agenda_items: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub stakeholders: Vec<String>,
    pub persona_activated: Vec<String>,
    pub strategic_themes: Vec<String>,
    pub detection_confidence: Option<f64>,
}

fn append_unique<T: PartialEq + Clone>(target: &mut Vec<T>, incoming: &[T]) -> bool {
    let mut changed = false;
    for item in incoming {
        if !target.contains(item) {
            target.push(item.clone());
            changed = true;
        }
    }
    changed
}

impl StrategicDb {
    // =========================================================================
    // Meeting sessions
    // =========================================================================

    /// Insert a new session. `meeting_key` is immutable from here on.
    pub fn insert_meeting(&self, meeting: &NewMeetingSession) -> Result<DbMeetingSession, DbError> {
        if meeting.meeting_key.trim().is_empty() {
            return Err(DbError::InvalidInput("meeting key is empty".into()));
        }
        let ts = now();
        self.conn.execute(
            "INSERT INTO meeting_sessions (
                meeting_key, meeting_type, stakeholder_primary, stakeholder_secondary,
                meeting_date, meeting_status, agenda_items, preparation_notes,
                action_items, persona_activated, strategic_themes, rescheduled_from,
                source_path, detection_confidence, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
            params![
                meeting.meeting_key,
                meeting.meeting_type,
                meeting.stakeholder_primary,
                to_json_column(&meeting.stakeholder_secondary)?,
                meeting.meeting_date,
                MeetingStatus::Scheduled,
                to_json_column(&meeting.agenda_items)?,
                meeting.preparation_notes,
                to_json_column(&meeting.action_items)?,
                to_json_column(&meeting.persona_activated)?,
                to_json_column(&meeting.strategic_themes)?,
                meeting.rescheduled_from,
                meeting.source_path,
                meeting.detection_confidence,
                ts,
            ],
        )?;
        self.get_meeting(&meeting.meeting_key)?
            .ok_or_else(|| DbError::not_found("meeting", &meeting.meeting_key))
    }

    pub fn get_meeting(&self, meeting_key: &str) -> Result<Option<DbMeetingSession>, DbError> {
        let sql = format!("SELECT {MEETING_COLUMNS} FROM meeting_sessions WHERE meeting_key = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![meeting_key], Self::map_meeting_row)
            .optional()?)
    }

    /// Sessions dated within `[from, to]`, earliest first.
    pub fn get_meetings_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DbMeetingSession>, DbError> {
        let sql = format!(
            "SELECT {MEETING_COLUMNS} FROM meeting_sessions
             WHERE meeting_date >= ?1 AND meeting_date <= ?2
             ORDER BY meeting_date, meeting_key"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![from, to], Self::map_meeting_row)?;
        collect_rows(rows)
    }

    /// Sessions where the stakeholder is primary or listed as secondary.
    pub fn get_meetings_for_stakeholder(
        &self,
        stakeholder_key: &str,
    ) -> Result<Vec<DbMeetingSession>, DbError> {
        let sql = format!(
            "SELECT {MEETING_COLUMNS} FROM meeting_sessions
             WHERE stakeholder_primary = ?1
                OR EXISTS (SELECT 1 FROM json_each(meeting_sessions.stakeholder_secondary)
                           WHERE json_each.value = ?1)
             ORDER BY meeting_date DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![stakeholder_key], Self::map_meeting_row)?;
        collect_rows(rows)
    }

    /// Append newly detected content to an existing session. Existing entries
    /// keep their order; duplicates are skipped. Returns the updated session.
    pub fn merge_meeting_content(
        &self,
        meeting_key: &str,
        merge: &MeetingContentMerge,
        expected_version: i64,
    ) -> Result<DbMeetingSession, DbError> {
        let mut meeting = self
            .get_meeting(meeting_key)?
            .ok_or_else(|| DbError::not_found("meeting", meeting_key))?;
        if meeting.version != expected_version {
            return Err(DbError::WriteConflict {
                entity: "meeting",
                key: meeting_key.to_string(),
            });
        }

        let mut changed = append_unique(&mut meeting.agenda_items, &merge.agenda_items);
        changed |= append_unique(&mut meeting.action_items, &merge.action_items);
        changed |= append_unique(&mut meeting.persona_activated, &merge.persona_activated);
        changed |= append_unique(&mut meeting.strategic_themes, &merge.strategic_themes);

        for key in &merge.stakeholders {
            if meeting.stakeholder_primary.is_none() {
                meeting.stakeholder_primary = Some(key.clone());
                changed = true;
            } else if meeting.stakeholder_primary.as_deref() != Some(key.as_str())
                && !meeting.stakeholder_secondary.contains(key)
            {
                meeting.stakeholder_secondary.push(key.clone());
                changed = true;
            }
        }

        let confidence = match (meeting.detection_confidence, merge.detection_confidence) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        changed |= confidence != meeting.detection_confidence;

        if !changed {
            return Ok(meeting);
        }

        let updated = self.conn.execute(
            "UPDATE meeting_sessions
             SET agenda_items = ?1, action_items = ?2, persona_activated = ?3,
                 strategic_themes = ?4, stakeholder_primary = ?5, stakeholder_secondary = ?6,
                 detection_confidence = ?7, version = version + 1, updated_at = ?8
             WHERE meeting_key = ?9 AND version = ?10",
            params![
                to_json_column(&meeting.agenda_items)?,
                to_json_column(&meeting.action_items)?,
                to_json_column(&meeting.persona_activated)?,
                to_json_column(&meeting.strategic_themes)?,
                meeting.stakeholder_primary,
                to_json_column(&meeting.stakeholder_secondary)?,
                confidence,
                now(),
                meeting_key,
                expected_version,
            ],
        )?;
        if updated == 0 {
            return Err(DbError::WriteConflict {
                entity: "meeting",
                key: meeting_key.to_string(),
            });
        }
        self.get_meeting(meeting_key)?
            .ok_or_else(|| DbError::not_found("meeting", meeting_key))
    }

    /// Set preparation notes and/or outcomes. `None` leaves a field alone.
    pub fn update_meeting_notes(
        &self,
        meeting_key: &str,
        preparation_notes: Option<&str>,
        meeting_outcomes: Option<&str>,
        expected_version: i64,
    ) -> Result<DbMeetingSession, DbError> {
        let changed = self.conn.execute(
            "UPDATE meeting_sessions
             SET preparation_notes = COALESCE(?1, preparation_notes),
                 meeting_outcomes = COALESCE(?2, meeting_outcomes),
                 version = version + 1, updated_at = ?3
             WHERE meeting_key = ?4 AND version = ?5",
            params![preparation_notes, meeting_outcomes, now(), meeting_key, expected_version],
        )?;
        self.finish_versioned_meeting_write(meeting_key, changed)
    }

    /// Move a session out of `scheduled`. Rejects any other transition.
    pub fn set_meeting_status(
        &self,
        meeting_key: &str,
        next: MeetingStatus,
        expected_version: i64,
    ) -> Result<DbMeetingSession, DbError> {
        let current = self
            .get_meeting(meeting_key)?
            .ok_or_else(|| DbError::not_found("meeting", meeting_key))?;
        if !current.meeting_status.can_transition_to(next) {
            return Err(DbError::InvalidTransition {
                entity: "meeting",
                from: current.meeting_status.to_string(),
                to: next.to_string(),
            });
        }
        let changed = self.conn.execute(
            "UPDATE meeting_sessions
             SET meeting_status = ?1, version = version + 1, updated_at = ?2
             WHERE meeting_key = ?3 AND version = ?4",
            params![next, now(), meeting_key, expected_version],
        )?;
        self.finish_versioned_meeting_write(meeting_key, changed)
    }

    fn finish_versioned_meeting_write(
        &self,
        meeting_key: &str,
        changed: usize,
    ) -> Result<DbMeetingSession, DbError> {
        let meeting = self
            .get_meeting(meeting_key)?
            .ok_or_else(|| DbError::not_found("meeting", meeting_key))?;
        if changed == 0 {
            return Err(DbError::WriteConflict {
                entity: "meeting",
                key: meeting_key.to_string(),
            });
        }
        Ok(meeting)
    }

    fn map_meeting_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbMeetingSession> {
        Ok(DbMeetingSession {
            meeting_key: row.get(0)?,
            meeting_type: row.get(1)?,
            stakeholder_primary: row.get(2)?,
            stakeholder_secondary: json_column(row, 3)?,
            meeting_date: row.get(4)?,
            meeting_status: row.get(5)?,
            agenda_items: json_column(row, 6)?,
            preparation_notes: row.get(7)?,
            meeting_outcomes: row.get(8)?,
            action_items: json_column(row, 9)?,
            persona_activated: json_column(row, 10)?,
            strategic_themes: json_column(row, 11)?,
            rescheduled_from: row.get(12)?,
            source_path: row.get(13)?,
            detection_confidence: row.get(14)?,
            version: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }
}
