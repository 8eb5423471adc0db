const DEFAULT_TEMPLATES: &str = include_str!("../../templates/default-templates.json");
const DEFAULT_CLASSIFIER_RULES: &str = include_str!("../../rules/classifier-rules.json");

/// The built-in template registry (JSON array).
pub fn default_templates() -> &'static str {
    DEFAULT_TEMPLATES
}

/// The built-in ordered classifier table (JSON array).
pub fn default_classifier_rules() -> &'static str {
    DEFAULT_CLASSIFIER_RULES
}
