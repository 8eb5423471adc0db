//! Template and classifier-rule registry.
//!
//! Both tables are data: embedded JSON defaults, replaceable by custom files
//! named in the config. Nothing here knows about specific meeting types.

pub mod embedded;
pub mod loader;
pub mod schema;

pub use schema::{ClassifierRule, MemoryIntegration, TemplateFile, WorkspaceTemplate};
