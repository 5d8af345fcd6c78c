//! Mutable state of one synchronizer run

use crate::error::{Result, SyncError};
use crate::progress::ProgressTracker;
use core_library::models::MediaType;
use core_metadata::SearchResult;
use core_tasks::{SyncPayload, TaskContext, TaskPayload};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MatchKey {
    media_type: MediaType,
    title: String,
    year: Option<i32>,
}

pub(crate) struct SyncRun<'a> {
    ctx: &'a TaskContext,
    pub payload: SyncPayload,
    pub tracker: ProgressTracker,
    matches: HashMap<MatchKey, Option<SearchResult>>,
    reconciled: HashSet<(MediaType, i64)>,
    /// People referenced by entries created or updated in this run
    pub people: BTreeSet<i64>,
}

impl<'a> SyncRun<'a> {
    pub fn new(ctx: &'a TaskContext) -> Self {
        Self {
            ctx,
            payload: SyncPayload::default(),
            tracker: ProgressTracker::new(),
            matches: HashMap::new(),
            reconciled: HashSet::new(),
            people: BTreeSet::new(),
        }
    }

    pub fn ctx(&self) -> &'a TaskContext {
        self.ctx
    }

    pub fn checkpoint(&self) -> Result<()> {
        checkpoint(self.ctx)
    }

    /// Publishes the payload snapshot and the current percentage.
    pub async fn publish(&mut self) {
        self.ctx
            .set_payload(TaskPayload::Sync(self.payload.clone()))
            .await;
        let percent = self.tracker.percent();
        self.ctx.report_progress(percent).await;
    }

    /// Counts a per-item failure and keeps it as the task's latest error.
    pub async fn item_failed(&mut self, subject: &str, error: &SyncError) {
        warn!(subject, error = %error, "Item failed");
        self.payload.items_failed += 1;
        self.ctx
            .record_error(format!("{}: {}", subject, error))
            .await;
    }

    pub fn cached_match(
        &self,
        media_type: MediaType,
        title: &str,
        year: Option<i32>,
    ) -> Option<Option<SearchResult>> {
        self.matches
            .get(&match_key(media_type, title, year))
            .cloned()
    }

    pub fn remember_match(
        &mut self,
        media_type: MediaType,
        title: &str,
        year: Option<i32>,
        hit: Option<SearchResult>,
    ) {
        self.matches.insert(match_key(media_type, title, year), hit);
    }

    pub fn is_reconciled(&self, media_type: MediaType, id: i64) -> bool {
        self.reconciled.contains(&(media_type, id))
    }

    pub fn mark_reconciled(&mut self, media_type: MediaType, id: i64) {
        self.reconciled.insert((media_type, id));
    }
}

fn match_key(media_type: MediaType, title: &str, year: Option<i32>) -> MatchKey {
    MatchKey {
        media_type,
        title: title.to_lowercase(),
        year,
    }
}

pub(crate) fn checkpoint(ctx: &TaskContext) -> Result<()> {
    if ctx.is_cancelled() {
        Err(SyncError::Cancelled)
    } else {
        Ok(())
    }
}
