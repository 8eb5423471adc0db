// Meetings service
// Notes, status changes and rescheduling for meeting sessions.

use chrono::NaiveDate;

use crate::db::{DbMeetingSession, NewMeetingSession, StrategicDb};
use crate::entity::MeetingStatus;

pub fn get_meeting(db: &StrategicDb, meeting_key: &str) -> Result<DbMeetingSession, String> {
    db.get_meeting(meeting_key)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Meeting not found: {}", meeting_key))
}

pub fn meetings_between(
    db: &StrategicDb,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<DbMeetingSession>, String> {
    db.get_meetings_between(from, to).map_err(|e| e.to_string())
}

pub fn update_notes(
    db: &StrategicDb,
    meeting_key: &str,
    preparation_notes: Option<&str>,
    meeting_outcomes: Option<&str>,
    expected_version: i64,
) -> Result<DbMeetingSession, String> {
    db.update_meeting_notes(meeting_key, preparation_notes, meeting_outcomes, expected_version)
        .map_err(|e| e.to_string())
}

pub fn complete_meeting(
    db: &StrategicDb,
    meeting_key: &str,
    expected_version: i64,
) -> Result<DbMeetingSession, String> {
    set_status(db, meeting_key, MeetingStatus::Completed, expected_version)
}

pub fn cancel_meeting(
    db: &StrategicDb,
    meeting_key: &str,
    expected_version: i64,
) -> Result<DbMeetingSession, String> {
    set_status(db, meeting_key, MeetingStatus::Cancelled, expected_version)
}

fn set_status(
    db: &StrategicDb,
    meeting_key: &str,
    next: MeetingStatus,
    expected_version: i64,
) -> Result<DbMeetingSession, String> {
    let meeting = db
        .set_meeting_status(meeting_key, next, expected_version)
        .map_err(|e| e.to_string())?;
    log::info!("Meetings: '{}' is now {}", meeting_key, next);
    Ok(meeting)
}

/// Key for the session that replaces `original` on `new_date`: the date
/// suffix is swapped, or appended when the key carries none.
pub fn rescheduled_key(original: &DbMeetingSession, new_date: NaiveDate) -> String {
    let old_suffix = format!("-{}", original.meeting_date.format("%Y-%m-%d"));
    let base = original
        .meeting_key
        .strip_suffix(&old_suffix)
        .unwrap_or(&original.meeting_key);
    format!("{}-{}", base, new_date.format("%Y-%m-%d"))
}

/// Mark a session `rescheduled` and open its replacement.
///
/// The replacement carries the participants and agenda forward and points
/// back through `rescheduled_from`. Both writes commit together.
pub fn reschedule_meeting(
    db: &StrategicDb,
    meeting_key: &str,
    new_date: NaiveDate,
    expected_version: i64,
) -> Result<DbMeetingSession, String> {
    db.with_transaction(|tx| {
        let original = tx.set_meeting_status(meeting_key, MeetingStatus::Rescheduled, expected_version)?;
        let new_key = rescheduled_key(&original, new_date);
        if tx.get_meeting(&new_key)?.is_some() {
            return Err(crate::db::DbError::InvalidInput(format!(
                "a meeting already exists at {}",
                new_key
            )));
        }
        let mut next = NewMeetingSession::stub(new_key, original.meeting_type, new_date);
        next.stakeholder_primary = original.stakeholder_primary.clone();
        next.stakeholder_secondary = original.stakeholder_secondary.clone();
        next.agenda_items = original.agenda_items.clone();
        next.persona_activated = original.persona_activated.clone();
        next.strategic_themes = original.strategic_themes.clone();
        next.rescheduled_from = Some(original.meeting_key.clone());
        tx.insert_meeting(&next)
    })
    .map(|replacement| {
        log::info!(
            "Meetings: '{}' rescheduled to '{}'",
            meeting_key,
            replacement.meeting_key
        );
        replacement
    })
    .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;
    use crate::entity::MeetingType;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn seed(db: &StrategicDb) -> DbMeetingSession {
        let mut meeting = NewMeetingSession::stub(
            "raghu-vp_1on1-2026-10-19".into(),
            MeetingType::VpOneOnOne,
            date(19),
        );
        meeting.stakeholder_primary = Some("raghu".into());
        meeting.agenda_items = vec!["Budget".into()];
        db.ensure_stakeholder("raghu", "Raghu").unwrap();
        db.insert_meeting(&meeting).unwrap()
    }

    #[test]
    fn test_reschedule_links_new_session() {
        let db = test_db();
        let original = seed(&db);

        let next = reschedule_meeting(&db, &original.meeting_key, date(21), original.version).unwrap();
        assert_eq!(next.meeting_key, "raghu-vp_1on1-2026-10-21");
        assert_eq!(next.rescheduled_from.as_deref(), Some("raghu-vp_1on1-2026-10-19"));
        assert_eq!(next.agenda_items, vec!["Budget".to_string()]);
        assert_eq!(next.meeting_status, MeetingStatus::Scheduled);

        let old = get_meeting(&db, &original.meeting_key).unwrap();
        assert_eq!(old.meeting_status, MeetingStatus::Rescheduled);
    }

    #[test]
    fn test_reschedule_collision_rolls_back() {
        let db = test_db();
        let original = seed(&db);
        db.insert_meeting(&NewMeetingSession::stub(
            "raghu-vp_1on1-2026-10-21".into(),
            MeetingType::VpOneOnOne,
            date(21),
        ))
        .unwrap();

        assert!(reschedule_meeting(&db, &original.meeting_key, date(21), original.version).is_err());
        let old = get_meeting(&db, &original.meeting_key).unwrap();
        assert_eq!(old.meeting_status, MeetingStatus::Scheduled);
    }

    #[test]
    fn test_completed_meeting_cannot_be_cancelled() {
        let db = test_db();
        let original = seed(&db);
        let done = complete_meeting(&db, &original.meeting_key, original.version).unwrap();
        let err = cancel_meeting(&db, &original.meeting_key, done.version).unwrap_err();
        assert!(err.contains("Invalid meeting transition"));
    }

    #[test]
    fn test_notes_update() {
        let db = test_db();
        let original = seed(&db);
        let updated =
            update_notes(&db, &original.meeting_key, Some("Bring hiring plan"), None, original.version)
                .unwrap();
        assert_eq!(updated.preparation_notes.as_deref(), Some("Bring hiring plan"));
        assert!(updated.meeting_outcomes.is_none());
    }
}
