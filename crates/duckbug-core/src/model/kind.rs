//! The two event pipelines: errors and logs.
//!
//! Both kinds share grouping semantics and differ only in their table pair
//! and in the columns that discriminate a group (`file`/`line` for errors,
//! `level` for logs).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::UnknownVariant;

/// Which pipeline an event or group belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Error,
    Log,
}

impl EventKind {
    pub const ALL: [Self; 2] = [Self::Error, Self::Log];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Log => "log",
        }
    }

    /// Table holding one row per fingerprint.
    #[must_use]
    pub const fn group_table(self) -> &'static str {
        match self {
            Self::Error => "error_groups",
            Self::Log => "log_groups",
        }
    }

    /// Append-only table holding individual occurrences.
    #[must_use]
    pub const fn event_table(self) -> &'static str {
        match self {
            Self::Error => "errors",
            Self::Log => "logs",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" | "errors" => Ok(Self::Error),
            "log" | "logs" => Ok(Self::Log),
            _ => Err(UnknownVariant {
                field: "event kind",
                raw: s.to_string(),
                expected: "error, log",
            }),
        }
    }
}
