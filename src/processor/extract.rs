//! Content extraction from workspace text files.
//!
//! Pulls agenda items, action items, stakeholder mentions, and initiative
//! references out of Markdown-ish text using heading/list parsing and
//! dictionary lookups. No language understanding beyond that.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};

use crate::db::ActionItem;
use crate::entity::ActionItemStatus;
use crate::util::slugify;

/// Maximum text examined per file (100KB).
pub const MAX_EXTRACT_BYTES: usize = 100_000;

/// Bytes inspected for NUL when sniffing binary content.
const BINARY_SNIFF_BYTES: usize = 8_192;

/// Decode file bytes as UTF-8 text, or `None` for binary/non-UTF-8 content.
/// `bytes` may be a truncated head, so a character cut at the very end is
/// dropped rather than rejected. Long text is truncated at a char boundary.
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_BYTES)];
    if sniff.contains(&0) {
        return None;
    }
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) if e.error_len().is_none() => std::str::from_utf8(&bytes[..e.valid_up_to()]).ok()?,
        Err(_) => return None,
    };
    if text.len() <= MAX_EXTRACT_BYTES {
        return Some(text.to_string());
    }
    let mut end = MAX_EXTRACT_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    Some(text[..end].to_string())
}

/// A case-insensitive, word-boundary name → key lookup.
pub struct Dictionary {
    entries: Vec<(Regex, String)>,
}

impl Dictionary {
    /// Build from (name, key) pairs. Longer names are tried first so
    /// "Raghu Menon" wins over "Raghu" at the same position.
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut pairs: Vec<(String, String)> = pairs
            .into_iter()
            .filter(|(name, _)| !name.trim().is_empty())
            .collect();
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let entries = pairs
            .into_iter()
            .filter_map(|(name, key)| {
                let pattern = format!(r"\b{}\b", regex::escape(name.trim()));
                match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                    Ok(re) => Some((re, key)),
                    Err(e) => {
                        log::warn!("Extractor: skipping dictionary entry '{}': {}", name, e);
                        None
                    }
                }
            })
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Key for an exact (case-insensitive) name, if known.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(re, _)| {
                re.find(name)
                    .map(|m| m.start() == 0 && m.end() == name.len())
                    .unwrap_or(false)
            })
            .map(|(_, key)| key.as_str())
    }

    /// Keys mentioned in `text`, ordered by first appearance.
    pub fn find_all(&self, text: &str) -> Vec<String> {
        let mut hits: Vec<(usize, &str)> = Vec::new();
        for (re, key) in &self.entries {
            if let Some(m) = re.find(text) {
                hits.push((m.start(), key.as_str()));
            }
        }
        hits.sort_by_key(|(pos, _)| *pos);
        let mut keys: Vec<String> = Vec::new();
        for (_, key) in hits {
            push_unique(&mut keys, key.to_string());
        }
        keys
    }
}

/// What one file yielded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub agenda_items: Vec<String>,
    pub action_items: Vec<ActionItem>,
    /// Stakeholder keys: path-named first, then content order.
    pub stakeholders_detected: Vec<String>,
    pub projects_detected: Vec<String>,
    pub summary: String,
    pub confidence: f64,
}

impl Extraction {
    pub fn entity_count(&self) -> usize {
        self.agenda_items.len()
            + self.action_items.len()
            + self.stakeholders_detected.len()
            + self.projects_detected.len()
    }

    /// Zero entities: the file is recorded but produces no meeting or task.
    pub fn is_promotable(&self) -> bool {
        self.entity_count() > 0
    }
}

/// Inputs that come from the store and the template registry.
pub struct ExtractContext<'a> {
    pub stakeholders: &'a Dictionary,
    pub projects: &'a Dictionary,
    /// Denominator of the confidence score; at least 1.
    pub expected_entities: u32,
}

/// Run the full extractor over one file.
pub fn extract(text: &str, path_segments: &[String], ctx: &ExtractContext<'_>) -> Extraction {
    let agenda_items = parse_agenda(text);
    let action_items = parse_action_items(text, ctx.stakeholders);

    let mut stakeholders: Vec<String> = Vec::new();
    for segment in path_segments {
        if let Some(name) = with_name(segment) {
            let key = ctx
                .stakeholders
                .resolve(&name)
                .map(str::to_string)
                .unwrap_or_else(|| slugify(&name));
            push_unique(&mut stakeholders, key);
        }
    }
    for key in mentions_in_order(text, ctx.stakeholders) {
        push_unique(&mut stakeholders, key);
    }

    let projects_detected = ctx.projects.find_all(text);

    let mut extraction = Extraction {
        agenda_items,
        action_items,
        stakeholders_detected: stakeholders,
        projects_detected,
        summary: String::new(),
        confidence: 0.0,
    };
    let expected = ctx.expected_entities.max(1) as f64;
    extraction.confidence = (extraction.entity_count() as f64 / expected).min(1.0);
    extraction.summary = summarize(text, &extraction);
    extraction
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

// ---------------------------------------------------------------------------
// Line grammar
// ---------------------------------------------------------------------------

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.*?)\s*#*\s*$").expect("valid regex"))
}

fn list_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\s*)(?:[-*+]|\d{1,3}[.)])\s+(.+?)\s*$").expect("valid regex")
    })
}

fn checkbox_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-*+]|\d{1,3}[.)])\s+\[([ xX])\]\s+(.+?)\s*$").expect("valid regex"))
}

fn handle_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^\w.@])@([A-Za-z][A-Za-z0-9._-]*[A-Za-z0-9]|[A-Za-z])").expect("valid regex")
    })
}

fn due_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bdue:\s*(\d{4}-\d{2}-\d{2})\b").expect("valid regex"))
}

fn with_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[-_])with[-_]([a-z][a-z0-9]*(?:[-_.][a-z0-9]+)*)$").expect("valid regex")
    })
}

/// Heading level and text, if the line is an ATX heading.
fn heading(line: &str) -> Option<(usize, &str)> {
    heading_re()
        .captures(line)
        .and_then(|c| Some((c.get(1)?.as_str().len(), c.get(2)?.as_str())))
}

/// Indent width and item text, if the line is a bullet or numbered item.
fn list_item(line: &str) -> Option<(usize, &str)> {
    list_item_re()
        .captures(line)
        .and_then(|c| Some((c.get(1)?.as_str().len(), c.get(2)?.as_str())))
}

fn is_checkbox(line: &str) -> bool {
    checkbox_re().is_match(line)
}

/// Agenda items: list lines under the first heading mentioning "agenda",
/// up to the next heading of the same or a higher level. Without such a
/// heading, every top-level bullet in the document. Checkboxes are action
/// items, not agenda items.
pub fn parse_agenda(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();

    let agenda_heading = lines.iter().enumerate().find_map(|(i, line)| {
        heading(line)
            .filter(|(_, title)| title.to_lowercase().contains("agenda"))
            .map(|(level, _)| (i, level))
    });

    match agenda_heading {
        Some((start, level)) => {
            let mut items = Vec::new();
            for line in &lines[start + 1..] {
                if let Some((next_level, _)) = heading(line) {
                    if next_level <= level {
                        break;
                    }
                    continue;
                }
                if is_checkbox(line) {
                    continue;
                }
                if let Some((_, item)) = list_item(line) {
                    items.push(item.to_string());
                }
            }
            items
        }
        None => lines
            .iter()
            .filter(|line| !is_checkbox(line))
            .filter_map(|line| list_item(line))
            .filter(|(indent, _)| *indent == 0)
            .map(|(_, item)| item.to_string())
            .collect(),
    }
}

/// Checkbox lines as action items. `due:YYYY-MM-DD` sets the due date and
/// the first `@handle` the owner; both are stripped from the description.
pub fn parse_action_items(text: &str, stakeholders: &Dictionary) -> Vec<ActionItem> {
    let mut items = Vec::new();
    for line in text.lines() {
        let Some(caps) = checkbox_re().captures(line) else {
            continue;
        };
        let (Some(mark), Some(body)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let body = body.as_str();

        let due_date = due_re()
            .captures(body)
            .and_then(|c| c.get(1))
            .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok());
        let owner = handle_re()
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| resolve_handle(m.as_str(), stakeholders));

        let stripped = due_re().replace_all(body, "");
        let stripped = handle_re().replace_all(&stripped, " ");
        let description = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        if description.is_empty() {
            continue;
        }

        items.push(ActionItem {
            description,
            owner,
            due_date,
            status: if mark.as_str().eq_ignore_ascii_case("x") {
                ActionItemStatus::Done
            } else {
                ActionItemStatus::Open
            },
        });
    }
    items
}

fn resolve_handle(handle: &str, stakeholders: &Dictionary) -> String {
    stakeholders
        .resolve(handle)
        .map(str::to_string)
        .unwrap_or_else(|| slugify(handle))
}

/// Dictionary hits and `@handle` mentions, ordered by first appearance.
fn mentions_in_order(text: &str, stakeholders: &Dictionary) -> Vec<String> {
    let mut hits: Vec<(usize, String)> = Vec::new();
    for (re, key) in &stakeholders.entries {
        if let Some(m) = re.find(text) {
            hits.push((m.start(), key.clone()));
        }
    }
    for caps in handle_re().captures_iter(text) {
        if let Some(m) = caps.get(1) {
            hits.push((m.start(), resolve_handle(m.as_str(), stakeholders)));
        }
    }
    hits.sort_by_key(|(pos, _)| *pos);
    let mut keys = Vec::new();
    for (_, key) in hits {
        push_unique(&mut keys, key);
    }
    keys
}

/// Name from a `...-with-<name>` path segment.
pub fn with_name(segment: &str) -> Option<String> {
    with_re()
        .captures(segment)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

fn summarize(text: &str, extraction: &Extraction) -> String {
    let title = text
        .lines()
        .find_map(heading)
        .map(|(_, t)| t.trim())
        .filter(|t| !t.is_empty());
    let counts = format!(
        "{} agenda item(s), {} action item(s), {} stakeholder(s), {} project(s)",
        extraction.agenda_items.len(),
        extraction.action_items.len(),
        extraction.stakeholders_detected.len(),
        extraction.projects_detected.len()
    );
    match title {
        Some(t) => format!("{}: {}", t, counts),
        None => counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(pairs: &[(&str, &str)]) -> Dictionary {
        Dictionary::new(pairs.iter().map(|(n, k)| (n.to_string(), k.to_string())))
    }

    #[test]
    fn test_agenda_under_heading() {
        let text = "# VP 1:1\n\nIntro line\n- not agenda\n\n## Agenda\n- Budget\n- Hiring plan\n1. Roadmap\n\n## Notes\n- later\n";
        assert_eq!(parse_agenda(text), vec!["Budget", "Hiring plan", "Roadmap"]);
    }

    #[test]
    fn test_first_agenda_heading_wins() {
        let text = "## Agenda\n- one\n## Agenda (backup)\n- two\n";
        assert_eq!(parse_agenda(text), vec!["one"]);
    }

    #[test]
    fn test_agenda_keeps_nested_and_subsections() {
        let text = "## Agenda\n- Budget\n  - Q3 variance\n### Deep dive\n- Hiring\n## Other\n- x\n";
        assert_eq!(parse_agenda(text), vec!["Budget", "Q3 variance", "Hiring"]);
    }

    #[test]
    fn test_agenda_without_heading_uses_top_level_bullets() {
        let text = "- alpha\n  - nested\n* beta\n- [ ] a task\n";
        assert_eq!(parse_agenda(text), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_skeleton_has_no_agenda() {
        let text = "# Vp 1on1 Weekly\n\nDate: 2026-10-19\n\n## Agenda\n\n## Context\n\n## Outcomes\n";
        assert!(parse_agenda(text).is_empty());
    }

    #[test]
    fn test_action_items_with_annotations() {
        let d = dict(&[("Raghu Menon", "raghu")]);
        let text = "- [ ] Send budget @raghu due:2026-10-24\n- [x] Book room\n- plain bullet\n";
        let items = parse_action_items(text, &d);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].description, "Send budget");
        assert_eq!(items[0].owner.as_deref(), Some("raghu"));
        assert_eq!(items[0].due_date, NaiveDate::from_ymd_opt(2026, 10, 24));
        assert_eq!(items[1].status, ActionItemStatus::Done);
    }

    #[test]
    fn test_dictionary_uses_word_boundaries() {
        let d = dict(&[("Ana", "ana"), ("Platform Migration", "platform-migration")]);
        assert!(d.find_all("We discussed banana bread").is_empty());
        assert_eq!(
            d.find_all("platform migration status with Ana"),
            vec!["platform-migration", "ana"]
        );
    }

    #[test]
    fn test_stakeholders_from_path_handles_and_dictionary() {
        let stakeholders = dict(&[("Priya Shah", "priya")]);
        let projects = Dictionary::empty();
        let ctx = ExtractContext {
            stakeholders: &stakeholders,
            projects: &projects,
            expected_entities: 5,
        };
        let segments = vec!["meeting-prep".to_string(), "vp-1on1-with-raghu".to_string()];
        let text = "Sync with Priya Shah and @jo.lee about email me@example.com\n";
        let out = extract(text, &segments, &ctx);
        assert_eq!(out.stakeholders_detected, vec!["raghu", "priya", "jo-lee"]);
    }

    #[test]
    fn test_confidence_is_capped_ratio() {
        let none = Dictionary::empty();
        let ctx = ExtractContext {
            stakeholders: &none,
            projects: &none,
            expected_entities: 4,
        };
        let out = extract("## Agenda\n- a\n- b\n- c\n", &[], &ctx);
        assert!((out.confidence - 0.75).abs() < 1e-9);
        assert!(out.summary.starts_with("Agenda: 3 agenda item(s)"));

        let many = extract("- a\n- b\n- c\n- d\n- e\n- f\n", &[], &ctx);
        assert_eq!(many.confidence, 1.0);

        let empty = extract("just prose", &[], &ctx);
        assert_eq!(empty.confidence, 0.0);
        assert!(!empty.is_promotable());
    }

    #[test]
    fn test_decode_text_rejects_binary() {
        assert!(decode_text(&[0x89, b'P', b'N', b'G', 0, 0]).is_none());
        assert!(decode_text(&[0xff, 0xfe, 0xfd]).is_none());
        assert_eq!(decode_text(b"hello").as_deref(), Some("hello"));
    }

    #[test]
    fn test_decode_text_accepts_head_cut_mid_character() {
        // "café" with the final two-byte 'é' cut in half
        let head = &"café".as_bytes()[..4];
        assert_eq!(decode_text(head).as_deref(), Some("caf"));
    }

    #[test]
    fn test_with_name() {
        assert_eq!(with_name("vp-1on1-with-raghu").as_deref(), Some("raghu"));
        assert_eq!(with_name("1on1_with_Priya-Shah").as_deref(), Some("priya-shah"));
        assert_eq!(with_name("withdrawn"), None);
    }
}
