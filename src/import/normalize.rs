//! Mapping of provider records into Linkdock links.
//!
//! Only records under domains the workspace has verified are imported.
//! Everything else, including stray legacy domains and the provider's own
//! shortening domain, is dropped silently rather than reported. Aliases are
//! evaluated against the same set independently of the primary record, so
//! a record can contribute its aliases even when some of them live on
//! ineligible domains and vice versa.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::import::provider::SourceRecord;

/// A link ready for the idempotent sink.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLink {
    pub workspace_id: i32,
    pub user_id: i32,
    pub domain: String,
    pub key: String,
    pub url: String,
    pub title: Option<String>,
    pub archived: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub tag_id: Option<i32>,
}

pub struct NormalizeContext<'a> {
    pub workspace_id: i32,
    pub user_id: i32,
    pub eligible_domains: &'a HashSet<String>,
    pub tag_ids: Option<&'a HashMap<String, i32>>,
}

/// Split a short-link identifier (`d.co/abc`, optionally with a scheme)
/// into domain and key.
pub fn parse_link_id(id: &str) -> Option<(String, String)> {
    let stripped = id
        .strip_prefix("https://")
        .or_else(|| id.strip_prefix("http://"))
        .unwrap_or(id);

    let (domain, key) = stripped.split_once('/')?;
    if domain.is_empty() || key.is_empty() {
        return None;
    }
    Some((domain.to_string(), key.to_string()))
}

/// Normalize one page of records, preserving record order.
pub fn normalize_page(records: &[SourceRecord], ctx: &NormalizeContext<'_>) -> Vec<NewLink> {
    records
        .iter()
        .flat_map(|record| normalize_record(record, ctx))
        .collect()
}

/// Normalize one record into zero or more links: the primary identifier,
/// plus one link per alias whose own domain is eligible. Multi-tag
/// records collapse to the first tag name only.
pub fn normalize_record(record: &SourceRecord, ctx: &NormalizeContext<'_>) -> Vec<NewLink> {
    let tag_id = ctx.tag_ids.and_then(|tag_ids| {
        record
            .tags
            .first()
            .and_then(|name| tag_ids.get(name))
            .copied()
    });

    let mut links = Vec::new();

    if let Some((domain, key)) = parse_link_id(&record.id) {
        if ctx.eligible_domains.contains(&domain) {
            links.push(build_link(record, ctx, domain, key, tag_id));
        }
    }

    for alias in &record.aliases {
        if let Some((domain, key)) = parse_link_id(alias) {
            if ctx.eligible_domains.contains(&domain) {
                links.push(build_link(record, ctx, domain, key, tag_id));
            }
        }
    }

    links
}

fn build_link(
    record: &SourceRecord,
    ctx: &NormalizeContext<'_>,
    domain: String,
    key: String,
    tag_id: Option<i32>,
) -> NewLink {
    NewLink {
        workspace_id: ctx.workspace_id,
        user_id: ctx.user_id,
        domain,
        key,
        url: record.url.clone(),
        title: record.title.clone(),
        archived: record.archived,
        created_at: record.created_at,
        tag_id,
    }
}
