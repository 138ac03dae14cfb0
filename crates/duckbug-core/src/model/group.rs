use serde::Serialize;

use super::{EventKind, GroupStatus, LogLevel};

/// Aggregate record for every occurrence of one fingerprint in a project.
///
/// `id` is the caller-supplied fingerprint. `counter` equals the number of
/// events ever ingested for it and is never decremented; `first_seen_at` is
/// written once on creation. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub project_id: String,
    #[serde(flatten)]
    pub origin: GroupOrigin,
    pub message: String,
    pub first_seen_at: i64,
    pub last_seen_at: i64,
    pub counter: u64,
    pub status: GroupStatus,
}

impl Group {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.origin.kind()
    }
}

/// Kind-specific columns that identify where a group's events come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GroupOrigin {
    Error { file: String, line: u32 },
    Log { level: LogLevel },
}

impl GroupOrigin {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Error { .. } => EventKind::Error,
            Self::Log { .. } => EventKind::Log,
        }
    }
}
