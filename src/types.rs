//! Configuration types.
//!
//! `Config` is read from `~/.strategic-workspace/config.json` (camelCase).
//! Every heuristic constant of the prioritization engine lives in
//! [`ScoringConfig`] so it can be tuned without a rebuild.

use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Root of the watched workspace tree.
    pub workspace_path: String,
    /// SQLite file; defaults to `~/.strategic-workspace/strategic.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    /// Custom template registry file (JSON array). Embedded defaults otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_path: Option<String>,
    /// Custom ordered classifier rule file (JSON array). Embedded defaults otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier_rules_path: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_extraction_timeout_secs")]
    pub extraction_timeout_secs: u64,
    /// Five-field cron expression for the prioritization pass.
    #[serde(default = "default_prioritization_schedule")]
    pub prioritization_schedule: String,
    /// IANA timezone that defines "today" for due dates and meeting dates.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Known initiative/project keys for content extraction.
    #[serde(default)]
    pub initiatives: Vec<InitiativeConfig>,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

fn default_worker_count() -> usize {
    4
}

fn default_extraction_timeout_secs() -> u64 {
    5
}

fn default_prioritization_schedule() -> String {
    "*/5 * * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// A known initiative, matched by key or any alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiativeConfig {
    pub key: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Component weights for the overall relationship health score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthWeights {
    pub engagement_frequency: f64,
    pub engagement_quality: f64,
    pub responsiveness: f64,
    pub strategic_alignment: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            engagement_frequency: 0.25,
            engagement_quality: 0.25,
            responsiveness: 0.25,
            strategic_alignment: 0.25,
        }
    }
}

/// Heuristic constants for extraction confidence, health, and recommendations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringConfig {
    pub health_weights: HealthWeights,
    /// Score delta against the prior snapshot that counts as a trend.
    pub momentum_threshold: f64,
    /// Below this overall score momentum is forced to `at_risk`.
    pub at_risk_threshold: f64,
    pub base_confidence: f64,
    pub confidence_step: f64,
    pub confidence_cap: f64,
    pub recommendation_ttl_days: i64,
    /// Denominator for extraction confidence when no template declares one.
    pub default_expected_entities: u32,
    /// Look-back window for engagement-derived health components.
    pub assessment_window_days: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            health_weights: HealthWeights::default(),
            momentum_threshold: 0.05,
            at_risk_threshold: 0.3,
            base_confidence: 0.5,
            confidence_step: 0.1,
            confidence_cap: 0.95,
            recommendation_ttl_days: 14,
            default_expected_entities: 5,
            assessment_window_days: 90,
        }
    }
}

impl Config {
    /// A config with defaults for everything but the workspace root.
    pub fn with_workspace(workspace_path: impl Into<String>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            database_path: None,
            templates_path: None,
            classifier_rules_path: None,
            worker_count: default_worker_count(),
            extraction_timeout_secs: default_extraction_timeout_secs(),
            prioritization_schedule: default_prioritization_schedule(),
            timezone: default_timezone(),
            initiatives: Vec::new(),
            scoring: ScoringConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "workspacePath": "/tmp/ws" }"#).expect("parse");
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.extraction_timeout_secs, 5);
        assert_eq!(config.timezone, "UTC");
        assert!((config.scoring.momentum_threshold - 0.05).abs() < f64::EPSILON);
        assert!((config.scoring.health_weights.responsiveness - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_scoring_override() {
        let config: Config = serde_json::from_str(
            r#"{
                "workspacePath": "/tmp/ws",
                "scoring": { "atRiskThreshold": 0.4 },
                "initiatives": [{ "key": "platform-migration", "aliases": ["PM2"] }]
            }"#,
        )
        .expect("parse");
        assert!((config.scoring.at_risk_threshold - 0.4).abs() < f64::EPSILON);
        assert!((config.scoring.confidence_cap - 0.95).abs() < f64::EPSILON);
        assert_eq!(config.initiatives[0].aliases, vec!["PM2".to_string()]);
    }
}
