//! Graph API URL construction
//!
//! Every request the crawler issues is built here: feed sweeps, comment and
//! like sub-resources, target info lookups and bulk identity lookups. Cursor
//! URLs handed back by the provider are rewritten in place with
//! [`set_query_param`] so that `limit` and `since` survive across pages.

mod query;

pub use query::{format_provider_date, query_param, set_query_param};

use crate::config::GraphConfig;
use chrono::NaiveDate;
use url::Url;

/// Fields requested when looking up target (page/group) information
pub const TARGET_INFO_FIELDS: &str =
    "id,name,link,category,website,founded,about,likes,talking_about_count";

/// Fields requested when re-resolving actor identities
pub const IDENTITY_FIELDS: &str = "id,name,username,gender";

/// Builds request URLs against one Graph endpoint with one access token
#[derive(Debug, Clone)]
pub struct GraphEndpoint {
    base: Url,
    access_token: String,
}

impl GraphEndpoint {
    /// Creates an endpoint from a base URL and access token
    ///
    /// # Returns
    ///
    /// * `Ok(GraphEndpoint)` - The base URL parsed and can carry path segments
    /// * `Err(url::ParseError)` - The base URL is malformed
    pub fn new(base_url: &str, access_token: &str) -> Result<Self, url::ParseError> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        Ok(Self {
            base,
            access_token: access_token.to_string(),
        })
    }

    /// Creates an endpoint from the `[graph]` configuration section
    pub fn from_config(config: &GraphConfig) -> Result<Self, url::ParseError> {
        Self::new(&config.base_url, &config.access_token)
    }

    /// Builds the first URL of a feed sweep
    ///
    /// `since` and `until` are sent in the provider's `YYYY-M-D` form.
    pub fn feed(
        &self,
        target_id: &str,
        limit: u32,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> String {
        let mut url = self.path(&[target_id, "feed"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("access_token", &self.access_token);
            query.append_pair("limit", &limit.to_string());
            if let Some(since) = since {
                query.append_pair("since", &format_provider_date(since));
            }
            if let Some(until) = until {
                query.append_pair("until", &format_provider_date(until));
            }
        }
        url.into()
    }

    /// Builds the first URL of a sub-resource sweep (`comments`, `likes`)
    ///
    /// The `summary` flag asks the provider for `summary.total_count`.
    pub fn sub_resource(&self, object_id: &str, edge: &str, limit: u32) -> String {
        let mut url = self.path(&[object_id, edge]);
        url.query_pairs_mut()
            .append_pair("access_token", &self.access_token)
            .append_pair("limit", &limit.to_string())
            .append_pair("summary", "true");
        url.into()
    }

    /// Builds a bulk object lookup (`?ids=a,b,c&fields=...`)
    pub fn objects<S: AsRef<str>>(&self, ids: &[S], fields: &str) -> String {
        let joined = ids
            .iter()
            .map(|id| id.as_ref())
            .collect::<Vec<_>>()
            .join(",");
        let mut url = self.path(&[]);
        url.query_pairs_mut()
            .append_pair("ids", &joined)
            .append_pair("fields", fields)
            .append_pair("access_token", &self.access_token);
        url.into()
    }

    /// Builds a single object lookup (`/{id}?fields=...`)
    pub fn object(&self, id: &str, fields: &str) -> String {
        let mut url = self.path(&[id]);
        url.query_pairs_mut()
            .append_pair("fields", fields)
            .append_pair("access_token", &self.access_token);
        url.into()
    }

    fn path(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}
