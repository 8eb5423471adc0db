use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::db::{DbError, StrategicDb};
use crate::processor::classifier::RuleSet;
use crate::templates::loader::{load_classifier_rules, load_templates};
use crate::types::Config;

/// Upper bound on ingestion workers; each holds its own SQLite connection.
const MAX_WORKERS: usize = 32;

/// Shared, read-only runtime state handed to every background service.
///
/// Nothing here is mutable after startup. Persistence goes through a
/// `StrategicDb` each component opens for itself via [`AppState::open_db`].
pub struct AppState {
    pub config: Config,
    pub workspace_root: PathBuf,
    pub db_path: PathBuf,
    pub timezone: Tz,
    pub rules: Arc<RuleSet>,
}

impl AppState {
    /// Resolve paths, load the template/rule registry, and compile it.
    pub fn from_config(config: Config) -> Result<Self, String> {
        let config = validate_config(config)?;
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|e| format!("Invalid timezone '{}': {}", config.timezone, e))?;

        let db_path = match &config.database_path {
            Some(p) => PathBuf::from(p),
            None => StrategicDb::default_path().map_err(|e| e.to_string())?,
        };

        let templates = load_templates(config.templates_path.as_deref().map(Path::new))?;
        let rules = load_classifier_rules(config.classifier_rules_path.as_deref().map(Path::new))?;
        let rules = RuleSet::compile(rules, templates)?;

        Ok(Self {
            workspace_root: PathBuf::from(&config.workspace_path),
            db_path,
            timezone,
            rules: Arc::new(rules),
            config,
        })
    }

    /// Open a fresh connection to the store.
    pub fn open_db(&self) -> Result<StrategicDb, DbError> {
        StrategicDb::open_at(self.db_path.clone())
    }

    /// Calendar date of `at` in the configured timezone.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.timezone).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.local_date(Utc::now())
    }
}

/// Path to `~/.strategic-workspace/config.json`.
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".strategic-workspace").join("config.json"))
}

/// Load configuration from ~/.strategic-workspace/config.json
pub fn load_config() -> Result<Config, String> {
    load_config_from(&config_path()?)
}

/// Load and validate configuration from an explicit file.
pub fn load_config_from(config_path: &Path) -> Result<Config, String> {
    if !config_path.exists() {
        return Err(format!(
            "Config file not found at {}. Create it with: {{ \"workspacePath\": \"/path/to/workspace\" }}",
            config_path.display()
        ));
    }

    let content =
        fs::read_to_string(config_path).map_err(|e| format!("Failed to read config: {}", e))?;

    let config: Config =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

    validate_config(config)
}

/// Check the config against the filesystem and normalize bounded values.
pub fn validate_config(mut config: Config) -> Result<Config, String> {
    let workspace_path = Path::new(&config.workspace_path);
    if !workspace_path.is_dir() {
        return Err(format!(
            "Workspace path does not exist: {}",
            config.workspace_path
        ));
    }

    if config.worker_count == 0 || config.worker_count > MAX_WORKERS {
        let clamped = config.worker_count.clamp(1, MAX_WORKERS);
        log::warn!(
            "Config: workerCount {} out of range, using {}",
            config.worker_count,
            clamped
        );
        config.worker_count = clamped;
    }
    if config.extraction_timeout_secs == 0 {
        return Err("extractionTimeoutSecs must be at least 1".into());
    }

    config
        .timezone
        .parse::<Tz>()
        .map_err(|e| format!("Invalid timezone '{}': {}", config.timezone, e))?;
    crate::scheduler::parse_cron(&config.prioritization_schedule)
        .map_err(|e| format!("Invalid prioritizationSchedule: {}", e))?;

    let w = &config.scoring.health_weights;
    let weights = [
        w.engagement_frequency,
        w.engagement_quality,
        w.responsiveness,
        w.strategic_alignment,
    ];
    if weights.iter().any(|x| *x < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
        return Err("healthWeights must be non-negative with a positive sum".into());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("config.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("ws");
        fs::create_dir_all(&ws).unwrap();
        let body = format!(
            r#"{{ "workspacePath": "{}", "workerCount": 0, "timezone": "America/New_York" }}"#,
            ws.display()
        );
        let config = load_config_from(&write_config(dir.path(), &body)).unwrap();
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.timezone, "America/New_York");
    }

    #[test]
    fn test_missing_workspace_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{ "workspacePath": "/definitely/not/here" }"#;
        let err = load_config_from(&write_config(dir.path(), body)).unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn test_bad_timezone_and_cron_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::with_workspace(dir.path().to_string_lossy());
        config.timezone = "Mars/Olympus".into();
        assert!(validate_config(config.clone()).is_err());

        config.timezone = "UTC".into();
        config.prioritization_schedule = "every five minutes".into();
        assert!(validate_config(config).is_err());
    }

    #[test]
    fn test_app_state_uses_configured_timezone() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::with_workspace(dir.path().to_string_lossy());
        config.database_path = Some(dir.path().join("s.db").to_string_lossy().into_owned());
        config.timezone = "Asia/Tokyo".into();
        let state = AppState::from_config(config).unwrap();

        let late_utc = "2026-10-19T20:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(state.local_date(late_utc), NaiveDate::from_ymd_opt(2026, 10, 20).unwrap());
        assert!(state.open_db().is_ok());
    }
}
