use chrono::{Datelike, NaiveDate};
use url::Url;

/// Formats a date the way the provider expects `since`/`until` bounds
///
/// Month and day are not zero-padded: 2014-03-09 becomes `2014-3-9`.
pub fn format_provider_date(date: NaiveDate) -> String {
    format!("{}-{}-{}", date.year(), date.month(), date.day())
}

/// Replaces (or appends) one query parameter, keeping the others in order
///
/// Cursor URLs from the provider already carry a `limit`; appending a second
/// one would leave the effective value up to the server, so the old value is
/// dropped first.
///
/// # Returns
///
/// * `Ok(String)` - The rewritten URL
/// * `Err(url::ParseError)` - The input is not an absolute URL
pub fn set_query_param(url: &str, key: &str, value: &str) -> Result<String, url::ParseError> {
    let mut parsed = Url::parse(url)?;

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut query = parsed.query_pairs_mut();
        query.clear();
        for (k, v) in &kept {
            query.append_pair(k, v);
        }
        query.append_pair(key, value);
    }

    Ok(parsed.into())
}

/// Reads one query parameter from a URL
pub fn query_param(url: &str, key: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let value = parsed
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned());
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_provider_date_is_not_padded() {
        let date = NaiveDate::from_ymd_opt(2014, 3, 9).unwrap();
        assert_eq!(format_provider_date(date), "2014-3-9");

        let date = NaiveDate::from_ymd_opt(2013, 11, 25).unwrap();
        assert_eq!(format_provider_date(date), "2013-11-25");
    }

    #[test]
    fn test_set_query_param_replaces_existing() {
        let url = "https://graph.facebook.com/42/feed?access_token=t&limit=500&until=1400000000";
        let rewritten = set_query_param(url, "limit", "250").unwrap();

        assert_eq!(query_param(&rewritten, "limit").as_deref(), Some("250"));
        assert_eq!(query_param(&rewritten, "until").as_deref(), Some("1400000000"));
        assert_eq!(rewritten.matches("limit=").count(), 1);
    }

    #[test]
    fn test_set_query_param_appends_missing() {
        let url = "https://graph.facebook.com/42/feed?access_token=t";
        let rewritten = set_query_param(url, "since", "2014-1-1").unwrap();
        assert_eq!(query_param(&rewritten, "since").as_deref(), Some("2014-1-1"));
        assert_eq!(query_param(&rewritten, "access_token").as_deref(), Some("t"));
    }

    #[test]
    fn test_set_query_param_rejects_relative() {
        assert!(set_query_param("/42/feed?limit=5", "limit", "2").is_err());
    }

    #[test]
    fn test_query_param_missing() {
        assert_eq!(query_param("https://example.com/?a=1", "b"), None);
        assert_eq!(query_param("not a url", "a"), None);
    }
}
