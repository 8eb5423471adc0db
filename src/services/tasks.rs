// Tasks service
// Creation, edits, status transitions and dependency edges for tasks.

use chrono::NaiveDate;

use crate::db::{DbTask, DbTaskActivity, NewTask, StrategicDb, TaskPatch};
use crate::entity::TaskStatus;

pub fn create_task(db: &StrategicDb, task: &NewTask) -> Result<DbTask, String> {
    let created = db.insert_task(task).map_err(|e| e.to_string())?;
    log::info!("Tasks: created '{}' ({})", created.task_key, created.priority);
    Ok(created)
}

pub fn update_task(
    db: &StrategicDb,
    task_key: &str,
    patch: &TaskPatch,
    expected_version: i64,
) -> Result<DbTask, String> {
    db.update_task(task_key, patch, expected_version)
        .map_err(|e| e.to_string())
}

/// Complete a task; `today` becomes its completion date.
pub fn complete_task(
    db: &StrategicDb,
    task_key: &str,
    today: NaiveDate,
    expected_version: i64,
) -> Result<DbTask, String> {
    transition_task(db, task_key, TaskStatus::Completed, None, today, expected_version)
}

/// Block a task, recording why.
pub fn block_task(
    db: &StrategicDb,
    task_key: &str,
    reason: &str,
    today: NaiveDate,
    expected_version: i64,
) -> Result<DbTask, String> {
    if reason.trim().is_empty() {
        return Err("A blocked task needs a reason".to_string());
    }
    transition_task(db, task_key, TaskStatus::Blocked, Some(reason), today, expected_version)
}

pub fn transition_task(
    db: &StrategicDb,
    task_key: &str,
    next: TaskStatus,
    note: Option<&str>,
    today: NaiveDate,
    expected_version: i64,
) -> Result<DbTask, String> {
    let task = db
        .set_task_status(task_key, next, note, today, expected_version)
        .map_err(|e| e.to_string())?;
    log::info!("Tasks: '{}' is now {}", task_key, task.status);
    Ok(task)
}

pub fn reopen_task(
    db: &StrategicDb,
    task_key: &str,
    note: Option<&str>,
    expected_version: i64,
) -> Result<DbTask, String> {
    let task = db
        .reopen_task(task_key, note, expected_version)
        .map_err(|e| e.to_string())?;
    log::info!("Tasks: reopened '{}'", task_key);
    Ok(task)
}

pub fn add_dependency(db: &StrategicDb, task_key: &str, depends_on: &str) -> Result<(), String> {
    db.add_task_dependency(task_key, depends_on)
        .map_err(|e| e.to_string())
}

pub fn remove_dependency(db: &StrategicDb, task_key: &str, depends_on: &str) -> Result<bool, String> {
    db.remove_task_dependency(task_key, depends_on)
        .map_err(|e| e.to_string())
}

pub fn task_history(db: &StrategicDb, task_key: &str) -> Result<Vec<DbTaskActivity>, String> {
    db.get_task_activity(task_key).map_err(|e| e.to_string())
}
