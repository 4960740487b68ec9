//! Crawl target management
//!
//! Targets are registered from a bulk info lookup and enter the database as
//! fresh. Removing a target is an operator action; the engine never deletes
//! targets on its own.

use crate::crawler::parser::{lookup_objects, parse_target_info};
use crate::graph::{FetchOutcome, RateLimitedFetcher};
use crate::storage::{Storage, TargetRecord};
use crate::url::{GraphEndpoint, TARGET_INFO_FIELDS};
use crate::{CrawlerError, Result};

/// Outcome of a registration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterReport {
    /// Newly registered target IDs
    pub inserted: Vec<String>,
    /// Already registered; left untouched
    pub existing: Vec<String>,
    /// Requested but not returned by the provider
    pub missing: Vec<String>,
}

/// Looks up target info in one request and registers each target as fresh
///
/// # Returns
///
/// * `Ok(RegisterReport)` - Lookup succeeded
/// * `Err(CrawlerError::LookupAbandoned)` - The provider lookup was abandoned
pub async fn register_targets<S: Storage>(
    fetcher: &RateLimitedFetcher,
    endpoint: &GraphEndpoint,
    storage: &mut S,
    ids: &[String],
) -> Result<RegisterReport> {
    let mut report = RegisterReport::default();
    if ids.is_empty() {
        return Ok(report);
    }

    let url = endpoint.objects(ids, TARGET_INFO_FIELDS);
    let document = match fetcher.fetch(&url, None).await {
        FetchOutcome::Fetched { document, .. } => document,
        FetchOutcome::Abandoned { kind, message, .. } => {
            return Err(CrawlerError::LookupAbandoned { kind, message });
        }
    };

    let mut returned = Vec::new();
    for object in lookup_objects(&document) {
        let info = match parse_target_info(object) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping target without id");
                continue;
            }
        };

        returned.push(info.id.clone());
        if storage.insert_target(&info)? {
            tracing::info!(target_id = %info.id, name = %info.name, "Registered target");
            report.inserted.push(info.id);
        } else {
            report.existing.push(info.id);
        }
    }

    report.missing = ids
        .iter()
        .filter(|id| !returned.contains(id))
        .cloned()
        .collect();
    Ok(report)
}

/// Deletes targets and their crawled data
pub fn remove_targets<S: Storage>(storage: &mut S, ids: &[String]) -> Result<u64> {
    let removed = storage.remove_targets(ids)?;
    tracing::info!(removed, "Removed targets");
    Ok(removed)
}

/// All registered targets
pub fn list_targets<S: Storage>(storage: &S) -> Result<Vec<TargetRecord>> {
    Ok(storage.list_targets()?)
}
