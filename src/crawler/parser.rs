//! Graph document parsing
//!
//! This module turns Graph JSON documents into storage records:
//! - Page-level accessors (`data`, `paging.next`, `summary.total_count`)
//! - Post, comment and actor extraction with malformed-item detection
//! - Target info and identity lookups

use crate::storage::{ActorIdentity, ActorRef, CommentRecord, PostRecord, TargetInfo};
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Why an item was skipped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedItem {
    #[error("item has no id")]
    MissingId,

    #[error("item {0} has no author")]
    MissingActor(String),
}

/// Items of a page; empty when `data` is absent or not an array
pub fn page_items(document: &Value) -> &[Value] {
    document
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// The `paging.next` cursor URL, if any
pub fn next_cursor(document: &Value) -> Option<&str> {
    document
        .get("paging")
        .and_then(|paging| paging.get("next"))
        .and_then(Value::as_str)
        .filter(|next| !next.is_empty())
}

/// The provider-reported `summary.total_count`
pub fn summary_total_count(document: &Value) -> Option<u64> {
    document
        .get("summary")
        .and_then(|summary| summary.get("total_count"))
        .and_then(as_i64)
        .map(|n| n.max(0) as u64)
}

/// Parses a feed item into a post
///
/// Counters come from the embedded `likes`/`comments` summaries and
/// `shares.count` when present; the collector overwrites the first two with
/// the sub-resource totals.
pub fn parse_post(item: &Value, target_id: &str) -> Result<PostRecord, MalformedItem> {
    let post_id = string_field(item, "id").ok_or(MalformedItem::MissingId)?;
    let from = item.get("from");

    Ok(PostRecord {
        post_id,
        target_id: target_id.to_string(),
        from_id: from.and_then(|f| string_field(f, "id")),
        from_name: from.and_then(|f| string_field(f, "name")),
        message: string_field(item, "message"),
        picture: string_field(item, "picture"),
        link: string_field(item, "link"),
        name: string_field(item, "name"),
        caption: string_field(item, "caption"),
        source: string_field(item, "source"),
        icon: string_field(item, "icon"),
        post_type: string_field(item, "type"),
        object_id: string_field(item, "object_id"),
        description: string_field(item, "description"),
        like_count: item
            .get("likes")
            .and_then(summary_total_count)
            .unwrap_or(0) as i64,
        comment_count: item
            .get("comments")
            .and_then(summary_total_count)
            .unwrap_or(0) as i64,
        share_count: item
            .get("shares")
            .and_then(|shares| shares.get("count"))
            .and_then(as_i64)
            .unwrap_or(0),
        created_time: time_field(item, "created_time"),
        updated_time: time_field(item, "updated_time"),
    })
}

/// Parses a comment; both `id` and `from.id` are required
pub fn parse_comment(
    item: &Value,
    post_id: &str,
    target_id: &str,
    post_created_time: Option<&str>,
) -> Result<CommentRecord, MalformedItem> {
    let comment_id = string_field(item, "id").ok_or(MalformedItem::MissingId)?;
    let actor = item
        .get("from")
        .and_then(|from| parse_actor(from).ok())
        .ok_or_else(|| MalformedItem::MissingActor(comment_id.clone()))?;

    Ok(CommentRecord {
        comment_id,
        post_id: post_id.to_string(),
        target_id: target_id.to_string(),
        from_id: actor.id,
        from_name: actor.name,
        message: string_field(item, "message"),
        like_count: item.get("like_count").and_then(as_i64).unwrap_or(0),
        created_time: time_field(item, "created_time"),
        post_created_time: post_created_time.map(str::to_string),
    })
}

/// Parses an `{id, name}` actor (a like entry or a `from` object)
pub fn parse_actor(item: &Value) -> Result<ActorRef, MalformedItem> {
    let id = string_field(item, "id").ok_or(MalformedItem::MissingId)?;
    Ok(ActorRef {
        name: string_field(item, "name").unwrap_or_default(),
        id,
    })
}

/// Parses a target info document
pub fn parse_target_info(document: &Value) -> Result<TargetInfo, MalformedItem> {
    let id = string_field(document, "id").ok_or(MalformedItem::MissingId)?;
    Ok(TargetInfo {
        id,
        name: string_field(document, "name").unwrap_or_default(),
        link: string_field(document, "link"),
        category: string_field(document, "category"),
        website: string_field(document, "website"),
        founded: string_field(document, "founded"),
        about: string_field(document, "about"),
        likes: document.get("likes").and_then(as_i64).unwrap_or(0),
        talking_about_count: document
            .get("talking_about_count")
            .and_then(as_i64)
            .unwrap_or(0),
    })
}

/// Objects of a bulk `?ids=` lookup
///
/// The provider answers with a map keyed by ID; a `data` array is accepted
/// too.
pub fn lookup_objects(document: &Value) -> Vec<&Value> {
    if let Some(items) = document.get("data").and_then(Value::as_array) {
        return items.iter().collect();
    }
    match document.as_object() {
        Some(map) => map.values().filter(|v| v.is_object()).collect(),
        None => Vec::new(),
    }
}

/// Identities from a bulk lookup; entries without an ID are dropped
pub fn parse_identities(document: &Value) -> Vec<ActorIdentity> {
    lookup_objects(document)
        .into_iter()
        .filter_map(|object| {
            Some(ActorIdentity {
                id: string_field(object, "id")?,
                name: string_field(object, "name"),
                username: string_field(object, "username"),
                gender: string_field(object, "gender"),
            })
        })
        .collect()
}

/// Normalizes a provider timestamp (`2013-07-28T19:18:24+0000`) to RFC 3339 UTC
///
/// Unparsable values are kept verbatim.
pub fn normalize_time(raw: &str) -> String {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|t| t.with_timezone(&Utc).to_rfc3339())
        .unwrap_or_else(|_| raw.to_string())
}

fn time_field(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(Value::as_str).map(normalize_time)
}

/// A string field; numeric IDs are accepted and stringified
fn string_field(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
