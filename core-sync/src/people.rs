//! Person sync and orphan cleanup

use crate::error::Result;
use crate::run::{checkpoint, SyncRun};
use core_library::models::{MovieMetadata, TvShowMetadata};
use core_library::repositories::{MovieRepository, PersonRepository, TvShowRepository};
use core_metadata::MetadataProvider;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use core_tasks::{PersonCleanupPayload, TaskContext, TaskPayload};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PeopleSync {
    provider: Arc<dyn MetadataProvider>,
    people: Arc<dyn PersonRepository>,
    movies: Arc<dyn MovieRepository>,
    shows: Arc<dyn TvShowRepository>,
    event_bus: Option<Arc<EventBus>>,
}

impl PeopleSync {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        people: Arc<dyn PersonRepository>,
        movies: Arc<dyn MovieRepository>,
        shows: Arc<dyn TvShowRepository>,
        event_bus: Option<Arc<EventBus>>,
    ) -> Self {
        Self {
            provider,
            people,
            movies,
            shows,
            event_bus,
        }
    }

    /// Creates or refreshes every person collected by the run.
    ///
    /// Per-person failures are counted; only fatal catalog errors and
    /// cancellation abort.
    pub(crate) async fn sync_collected(&self, run: &mut SyncRun<'_>) -> Result<()> {
        let ids: Vec<i64> = run.people.iter().copied().collect();
        run.payload.people_total = ids.len() as u64;
        run.tracker.set_people_total(ids.len() as u64);
        run.publish().await;

        for id in ids {
            run.checkpoint()?;
            match self.provider.get_person(id).await {
                Ok(person) => match self.people.upsert(&person).await {
                    Ok(_) => run.payload.people_synced += 1,
                    Err(e) => {
                        warn!(person_id = id, error = %e, "Failed to store person");
                        run.payload.people_failed += 1;
                    }
                },
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(person_id = id, error = %e, "Failed to fetch person");
                    run.payload.people_failed += 1;
                }
            }
            run.tracker.person_done();
            run.publish().await;
        }

        run.tracker.finish_people();
        debug!(
            synced = run.payload.people_synced,
            failed = run.payload.people_failed,
            "Person sync finished"
        );
        Ok(())
    }

    /// Deletes each person in `person_ids` that no remaining movie or show
    /// references, including season and episode credits.
    pub async fn cleanup(
        &self,
        ctx: &TaskContext,
        person_ids: &[i64],
    ) -> Result<PersonCleanupPayload> {
        let candidates: BTreeSet<i64> = person_ids.iter().copied().collect();
        let movies = self.movies.find_all().await?;
        let shows = self.shows.find_all().await?;

        let mut payload = PersonCleanupPayload::default();
        let total = candidates.len();

        for id in candidates {
            checkpoint(ctx)?;
            payload.people_checked += 1;

            if is_referenced(id, &movies, &shows) {
                payload.people_retained += 1;
            } else {
                match self.people.delete(id).await {
                    Ok(true) => {
                        payload.people_deleted += 1;
                        debug!(person_id = id, "Orphaned person deleted");
                        if let Some(bus) = &self.event_bus {
                            bus.emit(CoreEvent::Library(LibraryEvent::PersonDeleted {
                                person_id: id,
                            }))
                            .ok();
                        }
                    }
                    Ok(false) => debug!(person_id = id, "Person already gone"),
                    Err(e) => {
                        warn!(person_id = id, error = %e, "Failed to delete person");
                        payload.people_failed += 1;
                        ctx.record_error(format!("person {}: {}", id, e)).await;
                    }
                }
            }

            ctx.set_payload(TaskPayload::PersonCleanup(payload.clone()))
                .await;
            ctx.report_progress(payload.people_checked as f64 / total as f64 * 100.0)
                .await;
        }

        info!(
            checked = payload.people_checked,
            deleted = payload.people_deleted,
            "Person cleanup finished"
        );
        ctx.set_payload(TaskPayload::PersonCleanup(payload.clone()))
            .await;
        Ok(payload)
    }
}

fn is_referenced(person_id: i64, movies: &[MovieMetadata], shows: &[TvShowMetadata]) -> bool {
    movies.iter().any(|m| m.references(person_id)) || shows.iter().any(|s| s.references(person_id))
}
