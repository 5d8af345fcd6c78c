//! Catalog matching
//!
//! Resolves an extracted title to a single catalog id. An exact-year hit is
//! preferred; otherwise the most popular result of a year-less search wins.

use crate::error::Result;
use crate::provider::{MetadataProvider, SearchResult};
use std::sync::Arc;
use tracing::debug;

pub struct CatalogMatcher {
    provider: Arc<dyn MetadataProvider>,
}

impl CatalogMatcher {
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self { provider }
    }

    /// Best movie match for `title`, or `None` when the catalog has no hit.
    pub async fn match_movie(&self, title: &str, year: Option<i32>) -> Result<Option<SearchResult>> {
        if let Some(year) = year {
            let hits = self.provider.search_movie(title, Some(year)).await?;
            if let Some(hit) = best_for_year(hits, year) {
                debug!(title, year, id = hit.id, "Movie matched by year");
                return Ok(Some(hit));
            }
        }

        let hits = self.provider.search_movie(title, None).await?;
        let matched = pick(hits, year);
        debug!(title, matched = ?matched.as_ref().map(|h| h.id), "Movie search finished");
        Ok(matched)
    }

    /// Best show match for `title`, or `None` when the catalog has no hit.
    pub async fn match_show(&self, title: &str, year: Option<i32>) -> Result<Option<SearchResult>> {
        if let Some(year) = year {
            let hits = self.provider.search_tv(title, Some(year)).await?;
            if let Some(hit) = best_for_year(hits, year) {
                debug!(title, year, id = hit.id, "Show matched by year");
                return Ok(Some(hit));
            }
        }

        let hits = self.provider.search_tv(title, None).await?;
        let matched = pick(hits, year);
        debug!(title, matched = ?matched.as_ref().map(|h| h.id), "Show search finished");
        Ok(matched)
    }
}

fn most_popular(hits: impl IntoIterator<Item = SearchResult>) -> Option<SearchResult> {
    hits.into_iter()
        .max_by(|a, b| a.popularity.total_cmp(&b.popularity))
}

fn best_for_year(hits: Vec<SearchResult>, year: i32) -> Option<SearchResult> {
    most_popular(hits.into_iter().filter(|hit| hit.year == Some(year)))
}

fn pick(hits: Vec<SearchResult>, year: Option<i32>) -> Option<SearchResult> {
    if let Some(year) = year {
        if hits.iter().any(|hit| hit.year == Some(year)) {
            return best_for_year(hits, year);
        }
    }
    most_popular(hits)
}
