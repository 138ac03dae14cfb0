//! Per-project health summary for project listings.
//!
//! Loaded with two grouped queries regardless of how many projects are
//! requested: unresolved error groups per project, and log window counts.

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{EventKind, GroupStatus};
use crate::stats::StatsAggregator;

/// Health numbers for one project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectOverview {
    /// Error groups currently `unresolved`.
    pub open_errors: u64,
    /// Log events with `time` in the last 24 hours.
    pub logs_last_24h: u64,
}

/// Builds [`ProjectOverview`]s for a set of projects.
#[derive(Debug, Clone, Copy)]
pub struct ProjectOverviews<'conn> {
    stats: StatsAggregator<'conn>,
}

impl<'conn> ProjectOverviews<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self {
            stats: StatsAggregator::new(conn),
        }
    }

    /// One overview per distinct requested project, keyed and ordered by id.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Storage`] when either grouped query fails.
    pub fn load(&self, project_ids: &[String]) -> Result<BTreeMap<String, ProjectOverview>> {
        self.load_at(project_ids, Utc::now().timestamp_millis())
    }

    /// [`Self::load`] against an explicit `now` (unix ms).
    ///
    /// # Errors
    ///
    /// [`crate::Error::Storage`] when either grouped query fails.
    pub fn load_at(
        &self,
        project_ids: &[String],
        now_ms: i64,
    ) -> Result<BTreeMap<String, ProjectOverview>> {
        let open =
            self.stats
                .batch_count_groups(EventKind::Error, project_ids, GroupStatus::Unresolved)?;
        let logs = self
            .stats
            .batch_get_stats_at(EventKind::Log, project_ids, now_ms)?;

        Ok(open
            .into_iter()
            .map(|(project_id, open_errors)| {
                let logs_last_24h = logs.get(&project_id).map_or(0, |c| c.last_24h);
                (
                    project_id,
                    ProjectOverview {
                        open_errors,
                        logs_last_24h,
                    },
                )
            })
            .collect())
    }
}
