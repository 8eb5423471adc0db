//! Explicit user-facing operations on the store.
//!
//! Thin business layer over `StrategicDb`: each call validates, applies one
//! versioned write, and logs it. Errors are flattened to strings at this
//! boundary, matching what a command surface hands back to a caller.

pub mod engagements;
pub mod meetings;
pub mod recommendations;
pub mod stakeholders;
pub mod tasks;
