//! Workspace ingestion pipeline.
//!
//! Orchestrates: classify → read → extract (time-bounded) → promote → record.
//!
//! Every observed event lands in the `workspace_changes` audit log. Meetings
//! and tasks derived from an event are created at most once per
//! (path, change type, content hash): the ingest ledger row, the entity, and
//! the change's `memory_stored_at` stamp commit in one transaction.

pub mod classifier;
pub mod extract;
pub mod instantiate;

use std::path::{Path, PathBuf};
use std::sync::{mpsc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use walkdir::WalkDir;

use crate::db::meetings::MeetingContentMerge;
use crate::db::{ChangeExtraction, DbError, NewMeetingSession, NewTask, StrategicDb};
use crate::entity::{
    ActionItemStatus, AssignmentDirection, ChangeType, EntityKind, Importance, MeetingType,
    SourceType, StrategicValue,
};
use crate::error::IngestError;
use crate::state::AppState;
use crate::templates::WorkspaceTemplate;
use crate::types::InitiativeConfig;
use crate::util::{display_name_from_key, hash_file_head, relative_path, sha256_hex, slugify};
use classifier::{path_segments, Classification, UNSUPPORTED};
use extract::{decode_text, Dictionary, ExtractContext, Extraction};
use instantiate::{apply_skeleton, SkeletonOutcome};

/// Category whose action items become auto-detected tasks.
const TASKS_CATEGORY: &str = "tasks";

/// Extraction confidence at or above which a promoted change is high value.
const HIGH_VALUE_CONFIDENCE: f64 = 0.7;

/// A normalized filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub change_type: ChangeType,
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(path: PathBuf, change_type: ChangeType) -> Self {
        Self {
            path,
            change_type,
            observed_at: Utc::now(),
        }
    }
}

/// Result of processing a single event.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessingResult {
    /// The same (path, type, content) was already ingested.
    Duplicate,
    /// Logged and classified; no entity derived.
    Recorded { change_id: i64, category: String },
    /// A meeting and/or tasks were created or updated.
    Promoted {
        change_id: i64,
        meeting_key: Option<String>,
        task_keys: Vec<String>,
    },
    /// A recoverable failure was recorded on the change row.
    Degraded { change_id: i64, reason: String },
}

enum Content {
    Absent,
    Text(String),
    Binary,
}

/// Process one event end to end.
///
/// Only store errors come back as `Err`; the caller retries those when
/// [`IngestError::is_retryable`] says so. Everything else is recorded on the
/// change row and reported as [`ProcessingResult::Degraded`].
pub fn process_event(
    state: &AppState,
    db: &StrategicDb,
    event: &ChangeEvent,
) -> Result<ProcessingResult, IngestError> {
    let path_full = event.path.to_string_lossy().into_owned();
    let path_relative = relative_path(&state.workspace_root, &event.path);
    let classification = state.rules.classify(Path::new(&path_relative));
    let (content_hash, content) = observe(event);
    let dedup_key = dedup_key(&path_full, event.change_type, &content_hash);

    let awaiting_template = event.change_type == ChangeType::DirectoryCreated
        && classification
            .as_ref()
            .map(|c| c.template.is_some())
            .unwrap_or(false);
    let Some(change_id) = begin_change(
        db,
        event,
        &path_full,
        &path_relative,
        &content_hash,
        &dedup_key,
        awaiting_template,
    )?
    else {
        log::debug!("Pipeline: '{}' already ingested", path_relative);
        return Ok(ProcessingResult::Duplicate);
    };

    let classification = match classification {
        Ok(c) => c,
        Err(e) => return record_degraded(db, change_id, &e),
    };

    let unsupported = matches!(content, Content::Binary);
    if unsupported {
        db.record_classification(change_id, UNSUPPORTED, None, None)?;
    } else {
        db.record_classification(
            change_id,
            &classification.category,
            classification.subcategory.as_deref(),
            classification.meeting_type,
        )?;
    }
    log::info!(
        "Pipeline: classified '{}' as '{}'",
        path_relative,
        if unsupported {
            UNSUPPORTED
        } else {
            classification.category.as_str()
        }
    );

    let ctx = EventContext {
        state,
        event,
        classification: &classification,
        path_relative: &path_relative,
        change_id,
        dedup_key: &dedup_key,
    };

    match (event.change_type, content) {
        (ChangeType::DirectoryCreated, _) => apply_template(db, &ctx),
        (_, Content::Text(text)) => ingest_text(db, &ctx, text),
        (_, Content::Binary) => record_stored(
            db,
            change_id,
            UNSUPPORTED,
            "binary or non-UTF-8 content",
            StrategicValue::None,
        ),
        (ChangeType::FileDeleted, Content::Absent) => record_stored(
            db,
            change_id,
            &classification.category,
            "file deleted",
            StrategicValue::None,
        ),
        (_, Content::Absent) => record_stored(
            db,
            change_id,
            &classification.category,
            "file unreadable",
            StrategicValue::None,
        ),
    }
}

/// Per-event values threaded through the promotion steps.
struct EventContext<'a> {
    state: &'a AppState,
    event: &'a ChangeEvent,
    classification: &'a Classification,
    path_relative: &'a str,
    change_id: i64,
    dedup_key: &'a str,
}

/// `sha256(path|change_type|content_hash)`.
pub fn dedup_key(path_full: &str, change_type: ChangeType, content_hash: &str) -> String {
    sha256_hex(format!("{}|{}|{}", path_full, change_type.as_str(), content_hash).as_bytes())
}

fn observe(event: &ChangeEvent) -> (String, Content) {
    if !event.change_type.has_content() {
        return (String::new(), Content::Absent);
    }
    // A few spare bytes let truncation land on a char boundary
    match hash_file_head(&event.path, extract::MAX_EXTRACT_BYTES + 4) {
        Ok((hash, head)) => match decode_text(&head) {
            Some(text) => (hash, Content::Text(text)),
            None => (hash, Content::Binary),
        },
        Err(e) => {
            log::debug!("Pipeline: could not read '{}': {}", event.path.display(), e);
            (String::new(), Content::Absent)
        }
    }
}

/// Pick the change row for this event, or `None` for a repeat.
///
/// Only the latest row for the path counts: a revert to earlier content is
/// a new observation. A create that matches the latest content (with no
/// deletion in between) is a replay, not a new event. An unprocessed row
/// from an interrupted run is reused, and a directory whose template never
/// produced an entity gets a fresh attempt.
fn begin_change(
    db: &StrategicDb,
    event: &ChangeEvent,
    path_full: &str,
    path_relative: &str,
    content_hash: &str,
    dedup_key: &str,
    awaiting_template: bool,
) -> Result<Option<i64>, DbError> {
    if let Some(latest) = db.get_latest_change_for_path(path_full)? {
        let same_content = latest.content_hash == content_hash;
        let replayed_create = matches!(
            event.change_type,
            ChangeType::FileCreated | ChangeType::DirectoryCreated
        ) && latest.change_type != ChangeType::FileDeleted;
        if same_content && (latest.change_type == event.change_type || replayed_create) {
            if latest.processed_at.is_none() && latest.change_type == event.change_type {
                return Ok(Some(latest.id));
            }
            if !(awaiting_template && db.get_ledger_entries(dedup_key)?.is_empty()) {
                return Ok(None);
            }
        }
    }

    // A retried event carries its original timestamp
    if let Some(slot) = db.find_change_at(path_full, event.change_type, event.observed_at)? {
        return Ok(slot.processed_at.is_none().then_some(slot.id));
    }

    let id = db.insert_change(
        event.change_type,
        path_full,
        path_relative,
        content_hash,
        event.observed_at,
    )?;
    Ok(Some(id))
}

/// Log a recoverable failure once and write its marker onto the change.
fn record_degraded(
    db: &StrategicDb,
    change_id: i64,
    err: &IngestError,
) -> Result<ProcessingResult, IngestError> {
    let Some((value, reason)) = err.degraded_marker() else {
        return Err(IngestError::Store(DbError::InvalidInput(err.to_string())));
    };
    match err {
        IngestError::TemplateInstantiation { .. } => log::error!("Pipeline: {}", err),
        _ => log::warn!("Pipeline: {}", err),
    }
    db.record_extraction(
        change_id,
        &ChangeExtraction {
            content_summary: reason.clone(),
            strategic_value: Some(value),
            ..Default::default()
        },
    )?;
    Ok(ProcessingResult::Degraded { change_id, reason })
}

fn record_stored(
    db: &StrategicDb,
    change_id: i64,
    category: &str,
    summary: &str,
    value: StrategicValue,
) -> Result<ProcessingResult, IngestError> {
    db.record_extraction(
        change_id,
        &ChangeExtraction {
            content_summary: summary.to_string(),
            strategic_value: Some(value),
            ..Default::default()
        },
    )?;
    Ok(ProcessingResult::Recorded {
        change_id,
        category: category.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Template application (directory created)
// ---------------------------------------------------------------------------

fn apply_template(db: &StrategicDb, ctx: &EventContext<'_>) -> Result<ProcessingResult, IngestError> {
    let Some(template) = ctx.classification.template.as_ref() else {
        let value = if ctx.classification.is_uncategorized() {
            StrategicValue::None
        } else {
            StrategicValue::Low
        };
        return record_stored(
            db,
            ctx.change_id,
            &ctx.classification.category,
            "directory created",
            value,
        );
    };

    let segments = path_segments(Path::new(ctx.path_relative))?;
    let date = meeting_date(ctx.path_relative, ctx.state.local_date(ctx.event.observed_at));
    let leaf = segments.last().cloned().unwrap_or_default();
    let title = display_name_from_key(&leaf);

    match apply_skeleton(&ctx.event.path, template, &title, date) {
        Ok(SkeletonOutcome::Created(entries)) => log::info!(
            "Instantiator: applied '{}' to '{}' ({} entries)",
            template.id,
            ctx.path_relative,
            entries.len()
        ),
        Ok(SkeletonOutcome::AlreadyPresent) => {}
        Err(e) => return record_degraded(db, ctx.change_id, &e),
    }

    let stakeholders = stakeholder_dictionary(db)?;
    let stakeholder = path_stakeholder(&segments, &stakeholders);

    let (meeting_key, task_keys) = db.with_transaction(|tx| {
        if let Some(prior) = derived_keys(tx, ctx.dedup_key)? {
            tx.mark_memory_stored(ctx.change_id)?;
            return Ok(prior);
        }

        let integration = &template.memory_integration;
        let derived = match integration.entity {
            EntityKind::Meeting => {
                let meeting_type = integration
                    .meeting_type
                    .or(ctx.classification.meeting_type)
                    .ok_or_else(|| {
                        DbError::InvalidInput(format!("template '{}' has no meeting type", template.id))
                    })?;
                ensure_stakeholders(tx, stakeholder.iter())?;
                let topic = ctx.classification.matched_segment.as_deref().unwrap_or(&leaf);
                let key = meeting_key(stakeholder.as_deref(), topic, meeting_type, date);
                upsert_meeting(
                    tx,
                    &key,
                    meeting_type,
                    date,
                    ctx.path_relative,
                    MeetingContentMerge {
                        stakeholders: stakeholder.iter().cloned().collect(),
                        persona_activated: template.persona_activation.clone(),
                        strategic_themes: integration.strategic_themes.clone(),
                        ..Default::default()
                    },
                )?;
                tx.record_ledger_entry(ctx.dedup_key, EntityKind::Meeting, &key, ctx.change_id)?;
                (Some(key), Vec::new())
            }
            EntityKind::Task => {
                let task = tx.insert_task(&template_task(template, &title, stakeholder.as_deref(), ctx))?;
                tx.record_ledger_entry(ctx.dedup_key, EntityKind::Task, &task.task_key, ctx.change_id)?;
                (None, vec![task.task_key])
            }
        };

        tx.record_extraction(
            ctx.change_id,
            &ChangeExtraction {
                stakeholders_detected: stakeholder.iter().cloned().collect(),
                content_summary: format!("template '{}' applied", template.id),
                strategic_value: Some(StrategicValue::Medium),
                confidence: 1.0,
                ..Default::default()
            },
        )?;
        tx.mark_memory_stored(ctx.change_id)?;
        Ok(derived)
    })?;

    Ok(ProcessingResult::Promoted {
        change_id: ctx.change_id,
        meeting_key,
        task_keys,
    })
}

fn template_task(
    template: &WorkspaceTemplate,
    title: &str,
    stakeholder: Option<&str>,
    ctx: &EventContext<'_>,
) -> NewTask {
    let integration = &template.memory_integration;
    let mut task = NewTask::manual(format!("{}: {}", template.name, title));
    task.category = Some(ctx.classification.category.clone());
    task.priority = integration.priority.unwrap_or(task.priority);
    task.impact_scope = integration.impact_scope.unwrap_or(task.impact_scope);
    task.stakeholders = stakeholder.map(|s| vec![s.to_string()]).unwrap_or_default();
    task.source_type = SourceType::AutoDetected;
    task.source_ref = Some(ctx.path_relative.to_string());
    task.persona_activated = template.persona_activation.clone();
    task.detection_confidence = Some(1.0);
    task
}

// ---------------------------------------------------------------------------
// Text ingestion (file created / modified)
// ---------------------------------------------------------------------------

fn ingest_text(
    db: &StrategicDb,
    ctx: &EventContext<'_>,
    text: String,
) -> Result<ProcessingResult, IngestError> {
    let state = ctx.state;
    let relative = Path::new(ctx.path_relative);
    let segments = path_segments(relative)?;
    let context_template = state.rules.context_template(relative).cloned();
    let expected_entities = context_template
        .as_ref()
        .and_then(|t| t.memory_integration.expected_entities)
        .unwrap_or(state.config.scoring.default_expected_entities);

    let stakeholders = stakeholder_dictionary(db)?;
    let projects = project_dictionary(&state.config.initiatives);
    let secs = state.config.extraction_timeout_secs;
    let extraction = {
        let segments = segments.clone();
        run_with_timeout(Duration::from_secs(secs), move || {
            let extract_ctx = ExtractContext {
                stakeholders: &stakeholders,
                projects: &projects,
                expected_entities,
            };
            extract::extract(&text, &segments, &extract_ctx)
        })
    };
    let Some(extraction) = extraction else {
        let err = IngestError::ExtractionTimeout {
            path: ctx.event.path.clone(),
            secs,
        };
        return record_degraded(db, ctx.change_id, &err);
    };

    let (meeting_key, task_keys) = db.with_transaction(|tx| {
        promote(tx, ctx, &segments, context_template.as_ref(), &extraction)
    })?;

    if meeting_key.is_none() && task_keys.is_empty() {
        return Ok(ProcessingResult::Recorded {
            change_id: ctx.change_id,
            category: ctx.classification.category.clone(),
        });
    }
    log::info!(
        "Pipeline: '{}' promoted (meeting: {}, tasks: {})",
        ctx.path_relative,
        meeting_key.as_deref().unwrap_or("-"),
        task_keys.len()
    );
    Ok(ProcessingResult::Promoted {
        change_id: ctx.change_id,
        meeting_key,
        task_keys,
    })
}

/// Decide what the extraction turns into and write it. Runs inside one
/// transaction together with the ledger and change-row updates.
fn promote(
    tx: &StrategicDb,
    ctx: &EventContext<'_>,
    segments: &[String],
    context_template: Option<&WorkspaceTemplate>,
    extraction: &Extraction,
) -> Result<(Option<String>, Vec<String>), DbError> {
    let classification = ctx.classification;
    let promotable = extraction.is_promotable() && !classification.is_uncategorized();

    let derived = match derived_keys(tx, ctx.dedup_key)? {
        Some(prior) => prior,
        None if !promotable => (None, Vec::new()),
        None => match classification.meeting_type {
            Some(meeting_type) => {
                ensure_stakeholders(tx, extraction.stakeholders_detected.iter())?;
                let date = meeting_date(ctx.path_relative, ctx.state.local_date(ctx.event.observed_at));
                let stakeholders = stakeholder_dictionary(tx)?;
                let path_person = path_stakeholder(segments, &stakeholders);
                let topic = classification
                    .matched_segment
                    .as_deref()
                    .or(segments.last().map(String::as_str))
                    .unwrap_or_default();
                let key = meeting_key(path_person.as_deref(), topic, meeting_type, date);
                let (personas, themes) = context_template
                    .map(|t| {
                        (
                            t.persona_activation.clone(),
                            t.memory_integration.strategic_themes.clone(),
                        )
                    })
                    .unwrap_or_default();
                upsert_meeting(
                    tx,
                    &key,
                    meeting_type,
                    date,
                    ctx.path_relative,
                    MeetingContentMerge {
                        agenda_items: extraction.agenda_items.clone(),
                        action_items: extraction.action_items.clone(),
                        stakeholders: extraction.stakeholders_detected.clone(),
                        persona_activated: personas.clone(),
                        strategic_themes: themes,
                        detection_confidence: Some(extraction.confidence),
                    },
                )?;
                tx.record_ledger_entry(ctx.dedup_key, EntityKind::Meeting, &key, ctx.change_id)?;
                let tasks = create_action_tasks(tx, ctx, extraction, SourceType::Meeting, &key, &personas)?;
                (Some(key), tasks)
            }
            None if classification.category == TASKS_CATEGORY => {
                ensure_stakeholders(tx, extraction.stakeholders_detected.iter())?;
                let personas = context_template
                    .map(|t| t.persona_activation.clone())
                    .unwrap_or_default();
                let tasks = create_action_tasks(
                    tx,
                    ctx,
                    extraction,
                    SourceType::AutoDetected,
                    ctx.path_relative,
                    &personas,
                )?;
                (None, tasks)
            }
            None => (None, Vec::new()),
        },
    };

    let promoted = derived.0.is_some() || !derived.1.is_empty();
    let value = if classification.is_uncategorized() {
        StrategicValue::None
    } else if !promoted {
        StrategicValue::Low
    } else if extraction.confidence >= HIGH_VALUE_CONFIDENCE
        || involves_key_stakeholder(tx, &extraction.stakeholders_detected)?
    {
        StrategicValue::High
    } else {
        StrategicValue::Medium
    };

    tx.record_extraction(
        ctx.change_id,
        &ChangeExtraction {
            stakeholders_detected: extraction.stakeholders_detected.clone(),
            projects_detected: extraction.projects_detected.clone(),
            content_summary: extraction.summary.clone(),
            strategic_value: Some(value),
            confidence: extraction.confidence,
        },
    )?;
    if promoted {
        tx.mark_memory_stored(ctx.change_id)?;
    }
    Ok(derived)
}

/// Open action items become tasks, skipping titles already derived from
/// the same source.
fn create_action_tasks(
    tx: &StrategicDb,
    ctx: &EventContext<'_>,
    extraction: &Extraction,
    source_type: SourceType,
    source_ref: &str,
    personas: &[String],
) -> Result<Vec<String>, DbError> {
    let mut existing: Vec<String> = tx
        .get_tasks_by_source(source_ref)?
        .into_iter()
        .map(|t| t.title)
        .collect();
    let mut keys = Vec::new();
    for item in &extraction.action_items {
        if item.status == ActionItemStatus::Done || existing.contains(&item.description) {
            continue;
        }
        let mut task = NewTask::manual(item.description.clone());
        task.assigned_to = item.owner.clone();
        task.assignment_direction = if item.owner.is_some() {
            AssignmentDirection::Outgoing
        } else {
            AssignmentDirection::SelfAssigned
        };
        task.due_date = item.due_date;
        task.category = Some(ctx.classification.category.clone());
        task.source_type = source_type;
        task.source_ref = Some(source_ref.to_string());
        task.persona_activated = personas.to_vec();
        task.detection_confidence = Some(extraction.confidence);

        let created = tx.insert_task(&task)?;
        tx.record_ledger_entry(ctx.dedup_key, EntityKind::Task, &created.task_key, ctx.change_id)?;
        existing.push(created.title);
        keys.push(created.task_key);
    }
    Ok(keys)
}

/// Entities this dedup key already produced, split into (meeting, tasks).
fn derived_keys(
    tx: &StrategicDb,
    dedup_key: &str,
) -> Result<Option<(Option<String>, Vec<String>)>, DbError> {
    let entries = tx.get_ledger_entries(dedup_key)?;
    if entries.is_empty() {
        return Ok(None);
    }
    let mut meeting = None;
    let mut tasks = Vec::new();
    for entry in entries {
        match entry.entity_kind {
            EntityKind::Meeting => meeting = Some(entry.entity_key),
            EntityKind::Task => tasks.push(entry.entity_key),
        }
    }
    Ok(Some((meeting, tasks)))
}

fn upsert_meeting(
    tx: &StrategicDb,
    key: &str,
    meeting_type: MeetingType,
    date: NaiveDate,
    source_path: &str,
    merge: MeetingContentMerge,
) -> Result<(), DbError> {
    if let Some(existing) = tx.get_meeting(key)? {
        tx.merge_meeting_content(key, &merge, existing.version)?;
        return Ok(());
    }
    let mut people = merge.stakeholders.into_iter();
    let mut meeting = NewMeetingSession::stub(key.to_string(), meeting_type, date);
    meeting.stakeholder_primary = people.next();
    meeting.stakeholder_secondary = people.collect();
    meeting.agenda_items = merge.agenda_items;
    meeting.action_items = merge.action_items;
    meeting.persona_activated = merge.persona_activated;
    meeting.strategic_themes = merge.strategic_themes;
    meeting.source_path = Some(source_path.to_string());
    meeting.detection_confidence = merge.detection_confidence;
    tx.insert_meeting(&meeting)?;
    log::info!("Pipeline: created meeting session '{}'", key);
    Ok(())
}

/// Create minimal profiles for referenced stakeholders that do not exist yet.
fn ensure_stakeholders<'a>(
    tx: &StrategicDb,
    keys: impl Iterator<Item = &'a String>,
) -> Result<(), DbError> {
    for key in keys {
        let (_, created) = tx.ensure_stakeholder(key, &display_name_from_key(key))?;
        if created {
            let gap = IngestError::ReferentialGap {
                entity: "stakeholder",
                key: key.clone(),
            };
            log::info!("Pipeline: {}", gap);
        }
    }
    Ok(())
}

fn involves_key_stakeholder(tx: &StrategicDb, keys: &[String]) -> Result<bool, DbError> {
    for key in keys {
        if let Some(profile) = tx.get_stakeholder(key)? {
            if matches!(
                profile.strategic_importance,
                Importance::Critical | Importance::High
            ) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

// ---------------------------------------------------------------------------
// Keys, dates, dictionaries
// ---------------------------------------------------------------------------

fn date_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("valid regex"))
}

/// The last `YYYY-MM-DD` token in the path, else `fallback`.
pub fn meeting_date(path_relative: &str, fallback: NaiveDate) -> NaiveDate {
    date_token_re()
        .captures_iter(path_relative)
        .filter_map(|c| NaiveDate::parse_from_str(c.get(1)?.as_str(), "%Y-%m-%d").ok())
        .last()
        .unwrap_or(fallback)
}

/// `{topic}-{meeting_type}-{date}`. The topic is the stakeholder named in
/// the path, else the matched segment without any date token.
pub fn meeting_key(
    stakeholder: Option<&str>,
    segment: &str,
    meeting_type: MeetingType,
    date: NaiveDate,
) -> String {
    let topic = match stakeholder {
        Some(s) => slugify(s),
        None => slugify(&date_token_re().replace_all(segment, "")),
    };
    let topic = if topic.is_empty() {
        meeting_type.as_str().replace('_', "-")
    } else {
        topic
    };
    format!("{}-{}-{}", topic, meeting_type.as_str(), date.format("%Y-%m-%d"))
}

/// Stakeholder named by the deepest `...-with-<name>` segment.
fn path_stakeholder(segments: &[String], stakeholders: &Dictionary) -> Option<String> {
    segments.iter().rev().find_map(|s| {
        extract::with_name(s).map(|name| {
            stakeholders
                .resolve(&name)
                .map(str::to_string)
                .unwrap_or_else(|| slugify(&name))
        })
    })
}

fn stakeholder_dictionary(db: &StrategicDb) -> Result<Dictionary, DbError> {
    Ok(Dictionary::new(db.get_stakeholder_dictionary()?))
}

/// Initiative keys match by key, by key with spaces, or by alias.
fn project_dictionary(initiatives: &[InitiativeConfig]) -> Dictionary {
    Dictionary::new(initiatives.iter().flat_map(|i| {
        let spaced = i.key.replace(['-', '_'], " ");
        std::iter::once((i.key.clone(), i.key.clone()))
            .chain(std::iter::once((spaced, i.key.clone())))
            .chain(i.aliases.iter().map(move |a| (a.clone(), i.key.clone())))
    }))
}

/// Run `f` on a helper thread, giving up after `timeout`.
///
/// An abandoned computation keeps its thread until it finishes; its result
/// is dropped.
pub fn run_with_timeout<T, F>(timeout: Duration, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = std::thread::Builder::new()
        .name("extract".into())
        .spawn(move || {
            let _ = tx.send(f());
        });
    if let Err(e) = spawned {
        log::warn!("Pipeline: could not start extraction thread: {}", e);
        return None;
    }
    rx.recv_timeout(timeout).ok()
}

// ---------------------------------------------------------------------------
// Rescan
// ---------------------------------------------------------------------------

/// Hidden entries and editor scratch files never enter the pipeline.
pub fn is_ignored(relative: &Path) -> bool {
    relative.components().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        name.starts_with('.') || name.ends_with('~') || name.ends_with(".swp") || name.ends_with(".tmp")
    })
}

/// Counts from a full-tree rescan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RescanSummary {
    pub seen: usize,
    pub processed: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Walk the workspace and replay every entry that was never ingested in
/// its current form. Recovers events missed while the service was down.
pub fn rescan_workspace(state: &AppState, db: &StrategicDb) -> RescanSummary {
    let mut summary = RescanSummary::default();
    let root = &state.workspace_root;
    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_ignored(e.path().strip_prefix(root).unwrap_or(e.path())));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Rescan: skipping unreadable entry: {}", e);
                continue;
            }
        };
        let change_type = if entry.file_type().is_dir() {
            ChangeType::DirectoryCreated
        } else if entry.file_type().is_file() {
            ChangeType::FileCreated
        } else {
            continue;
        };
        summary.seen += 1;
        match process_event(state, db, &ChangeEvent::new(entry.into_path(), change_type)) {
            Ok(ProcessingResult::Duplicate) => summary.duplicates += 1,
            Ok(_) => summary.processed += 1,
            Err(e) => {
                log::warn!("Rescan: {}", e);
                summary.failed += 1;
            }
        }
    }

    log::info!(
        "Rescan: {} entries, {} processed, {} already ingested, {} failed",
        summary.seen,
        summary.processed,
        summary.duplicates,
        summary.failed
    );
    summary
}
