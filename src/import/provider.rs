//! Source-platform adapters and the page-fetch strategies.
//!
//! Each supported provider is a hand-written adapter behind one pipeline
//! shape: a way to fetch one page of link records, a mapping from the
//! provider's wire record into [`SourceRecord`], and a pagination dialect
//! (opaque cursor for Bitly, numeric offset for Rebrandly). Adapters are
//! selected by the provider id carried on the job message; there is no
//! plugin system.
//!
//! Two fetch strategies share the same request primitive:
//!
//! - **Standard**: one request per invocation.
//! - **Batch**: up to [`BATCH_PAGE_CEILING`] consecutive requests for
//!   accounts flagged as high-throughput, stopping early on a short page
//!   or a non-first rate limit and keeping whatever was accumulated.
//!
//! A rate limit on the *first* request returns the input cursor unchanged
//! so no progress is lost; the invocation is simply retried later.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::import::config::ImportConfig;
use crate::import::message::PageCursor;
use crate::import::sanitize::{self, FieldSpec, SanitizeError};

/// Records requested per page.
pub const PAGE_SIZE: usize = 100;

/// Maximum consecutive page requests in one Batch-strategy invocation.
pub const BATCH_PAGE_CEILING: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Bitly,
    Rebrandly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStyle {
    Cursor,
    Offset,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Bitly => "bitly",
            ProviderKind::Rebrandly => "rebrandly",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Bitly => "Bitly",
            ProviderKind::Rebrandly => "Rebrandly",
        }
    }

    pub fn pagination_style(&self) -> PaginationStyle {
        match self {
            ProviderKind::Bitly => PaginationStyle::Cursor,
            ProviderKind::Rebrandly => PaginationStyle::Offset,
        }
    }

    /// Field names the payload repair pass targets for this provider.
    fn field_spec(&self) -> FieldSpec {
        match self {
            ProviderKind::Bitly => FieldSpec {
                url_field: "long_url",
                sentinel_field: "created_at",
            },
            ProviderKind::Rebrandly => FieldSpec {
                url_field: "destination",
                sentinel_field: "slashtag",
            },
        }
    }
}

/// One link as represented by the source platform, mapped into a common
/// shape by the provider adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// Identifier composed of `domain/key`.
    pub id: String,
    /// Destination URL.
    pub url: String,
    pub title: Option<String>,
    pub archived: bool,
    pub created_at: Option<DateTime<Utc>>,
    /// Custom short links pointing at the same destination (full URLs).
    pub aliases: Vec<String>,
    /// Tag names attached on the provider side.
    pub tags: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned status {status}: {body}")]
    Service { status: StatusCode, body: String },
    #[error("provider rate limited")]
    RateLimited,
    #[error(transparent)]
    Sanitize(#[from] SanitizeError),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BatchStats {
    /// Pages successfully fetched in this invocation.
    pub batch_count: usize,
}

/// Result of one pipeline invocation's fetch phase.
#[derive(Debug)]
pub struct FetchOutcome {
    pub records: Vec<SourceRecord>,
    /// Cursor to resume from. Equals the input cursor when the first
    /// request was rate limited.
    pub next: PageCursor,
    pub rate_limited: bool,
    pub batch: BatchStats,
}

/// One page of the provider's tag taxonomy.
#[derive(Debug)]
pub struct TagPage {
    pub names: Vec<String>,
    pub next: PageCursor,
}

/// Result of one raw page request.
#[derive(Debug)]
enum PageOutcome {
    Page {
        records: Vec<SourceRecord>,
        next: PageCursor,
    },
    RateLimited,
}

/// Abstraction over the raw page request so the strategy loop can be
/// exercised without HTTP.
trait PageSource {
    async fn fetch(&self, cursor: &PageCursor) -> Result<PageOutcome, ProviderError>;
}

/// Shared strategy loop for Standard (`ceiling == 1`) and Batch fetches.
async fn run_fetch_strategy<S: PageSource>(
    source: &S,
    start: PageCursor,
    ceiling: usize,
) -> Result<FetchOutcome, ProviderError> {
    let mut records = Vec::new();
    let mut cursor = start;
    let mut batch_count = 0usize;
    let mut rate_limited = false;

    loop {
        match source.fetch(&cursor).await {
            Ok(PageOutcome::Page {
                records: page,
                next,
            }) => {
                batch_count += 1;
                let exhausted = page.len() < PAGE_SIZE;
                records.extend(page);
                cursor = next;

                if batch_count >= ceiling || exhausted || !matches!(cursor, PageCursor::InProgress(_)) {
                    break;
                }
            }
            Ok(PageOutcome::RateLimited) => {
                // Cursor still points at the last committed position, so
                // nothing is lost: partial batch results are returned and
                // a first-request limit returns the input cursor as-is.
                rate_limited = true;
                break;
            }
            Err(err) => {
                if batch_count == 0 {
                    return Err(err);
                }
                log::warn!(
                    "batch request {} failed, keeping {} records from {} pages: {}",
                    batch_count + 1,
                    records.len(),
                    batch_count,
                    err
                );
                break;
            }
        }
    }

    Ok(FetchOutcome {
        records,
        next: cursor,
        rate_limited,
        batch: BatchStats { batch_count },
    })
}

#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    kind: ProviderKind,
    account_id: String,
    token: String,
    base_url: String,
}

enum RawResponse {
    Payload(serde_json::Value),
    RateLimited,
}

impl ProviderClient {
    pub fn new(
        kind: ProviderKind,
        account_id: &str,
        token: &str,
        config: &ImportConfig,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("linkdock-api/0.1")
            .build()
            .map_err(ProviderError::Http)?;

        let base_url = match kind {
            ProviderKind::Bitly => config.bitly_base_url.trim_end_matches('/').to_string(),
            ProviderKind::Rebrandly => config.rebrandly_base_url.trim_end_matches('/').to_string(),
        };

        Ok(Self {
            http,
            kind,
            account_id: account_id.to_string(),
            token: token.to_string(),
            base_url,
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Fetch link records starting at `start`, using the Batch strategy
    /// when `batch` is set.
    pub async fn fetch_links(
        &self,
        start: PageCursor,
        batch: bool,
    ) -> Result<FetchOutcome, ProviderError> {
        let ceiling = if batch { BATCH_PAGE_CEILING } else { 1 };
        run_fetch_strategy(self, start, ceiling).await
    }

    /// Fetch one page of the provider's tag list, reverse-name ordered.
    pub async fn fetch_tag_page(&self, cursor: &PageCursor) -> Result<TagPage, ProviderError> {
        match self.kind {
            ProviderKind::Bitly => {
                let url = format!("{}/groups/{}/tags", self.base_url, self.account_id);
                let mut query = vec![
                    ("size", PAGE_SIZE.to_string()),
                    ("sort", "-name".to_string()),
                ];
                if let Some(value) = cursor.as_param() {
                    query.push(("search_after", value.to_string()));
                }

                let value = match self.get_payload(&url, &query).await? {
                    RawResponse::Payload(value) => value,
                    RawResponse::RateLimited => return Err(ProviderError::RateLimited),
                };
                let page: BitlyTagPage = serde_json::from_value(value).unwrap_or_default();

                Ok(TagPage {
                    names: page.tags,
                    next: PageCursor::from_provider(page.pagination.search_after),
                })
            }
            ProviderKind::Rebrandly => {
                let url = format!("{}/tags", self.base_url);
                let mut query = vec![
                    ("limit", PAGE_SIZE.to_string()),
                    ("orderBy", "name".to_string()),
                    ("orderDir", "desc".to_string()),
                ];
                if let Some(value) = cursor.as_param() {
                    query.push(("last", value.to_string()));
                }

                let value = match self.get_payload(&url, &query).await? {
                    RawResponse::Payload(value) => value,
                    RawResponse::RateLimited => return Err(ProviderError::RateLimited),
                };
                let tags: Vec<RebrandlyTag> = serde_json::from_value(value).unwrap_or_default();

                let next = if tags.len() < PAGE_SIZE {
                    PageCursor::Done
                } else {
                    PageCursor::from_provider(tags.last().map(|tag| tag.id.clone()))
                };

                Ok(TagPage {
                    names: tags.into_iter().map(|tag| tag.name).collect(),
                    next,
                })
            }
        }
    }

    async fn fetch_links_page(&self, cursor: &PageCursor) -> Result<PageOutcome, ProviderError> {
        match self.kind {
            ProviderKind::Bitly => {
                let url = format!("{}/groups/{}/bitlinks", self.base_url, self.account_id);
                let mut query = vec![("size", PAGE_SIZE.to_string())];
                if let Some(value) = cursor.as_param() {
                    query.push(("search_after", value.to_string()));
                }

                let value = match self.get_payload(&url, &query).await? {
                    RawResponse::Payload(value) => value,
                    RawResponse::RateLimited => return Ok(PageOutcome::RateLimited),
                };

                // Shape drift is benign end-of-data, never an error.
                let page: BitlyPage = serde_json::from_value(value).unwrap_or_default();
                let records = page.links.iter().map(map_bitly_record).collect();

                Ok(PageOutcome::Page {
                    records,
                    next: PageCursor::from_provider(page.pagination.search_after),
                })
            }
            ProviderKind::Rebrandly => {
                let url = format!("{}/links", self.base_url);
                let offset = cursor
                    .as_param()
                    .and_then(|value| value.parse::<usize>().ok())
                    .unwrap_or(0);
                let query = vec![
                    ("limit", PAGE_SIZE.to_string()),
                    ("offset", offset.to_string()),
                    ("orderBy", "createdAt".to_string()),
                    ("orderDir", "asc".to_string()),
                ];

                let value = match self.get_payload(&url, &query).await? {
                    RawResponse::Payload(value) => value,
                    RawResponse::RateLimited => return Ok(PageOutcome::RateLimited),
                };

                let links: Vec<RebrandlyLink> = serde_json::from_value(value).unwrap_or_default();
                let next = if links.len() < PAGE_SIZE {
                    PageCursor::Done
                } else {
                    PageCursor::InProgress((offset + links.len()).to_string())
                };
                let records = links.iter().map(map_rebrandly_record).collect();

                Ok(PageOutcome::Page { records, next })
            }
        }
    }

    async fn get_payload(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<RawResponse, ProviderError> {
        let mut request = self.http.get(url).query(query);
        request = match self.kind {
            ProviderKind::Bitly => request.bearer_auth(&self.token),
            ProviderKind::Rebrandly => request.header("apikey", &self.token),
        };

        let response = request.send().await.map_err(ProviderError::Http)?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Ok(RawResponse::RateLimited);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Service { status, body });
        }

        let text = response.text().await.map_err(ProviderError::Http)?;
        let value = sanitize::parse_payload(&text, &self.kind.field_spec())?;
        Ok(RawResponse::Payload(value))
    }
}

impl PageSource for ProviderClient {
    async fn fetch(&self, cursor: &PageCursor) -> Result<PageOutcome, ProviderError> {
        self.fetch_links_page(cursor).await
    }
}

// ===== Bitly wire shapes =====

#[derive(Debug, Default, Deserialize)]
struct BitlyPage {
    #[serde(default)]
    links: Vec<BitlyLink>,
    #[serde(default)]
    pagination: BitlyPagination,
}

#[derive(Debug, Default, Deserialize)]
struct BitlyPagination {
    #[serde(default)]
    search_after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BitlyLink {
    #[serde(default)]
    id: String,
    #[serde(default)]
    long_url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    custom_bitlinks: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BitlyTagPage {
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    pagination: BitlyPagination,
}

fn map_bitly_record(link: &BitlyLink) -> SourceRecord {
    SourceRecord {
        id: link.id.clone(),
        url: link.long_url.clone(),
        title: link.title.clone().filter(|title| !title.is_empty()),
        archived: link.archived,
        created_at: parse_timestamp(link.created_at.as_deref()),
        aliases: link.custom_bitlinks.clone(),
        tags: link.tags.clone(),
    }
}

// ===== Rebrandly wire shapes =====

#[derive(Debug, Deserialize)]
struct RebrandlyLink {
    #[serde(default, rename = "domainName")]
    domain_name: String,
    #[serde(default)]
    slashtag: String,
    #[serde(default)]
    destination: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, rename = "createdAt")]
    created_at: Option<String>,
    #[serde(default)]
    tags: Vec<RebrandlyTag>,
}

#[derive(Debug, Default, Deserialize)]
struct RebrandlyTag {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
}

fn map_rebrandly_record(link: &RebrandlyLink) -> SourceRecord {
    SourceRecord {
        id: format!("{}/{}", link.domain_name, link.slashtag),
        url: link.destination.clone(),
        title: link.title.clone().filter(|title| !title.is_empty()),
        archived: link.status.as_deref() == Some("archived"),
        created_at: parse_timestamp(link.created_at.as_deref()),
        aliases: Vec::new(),
        tags: link.tags.iter().map(|tag| tag.name.clone()).collect(),
    }
}

/// Provider timestamps are RFC 3339, except Bitly's `+0000` offset form.
fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedSource {
        outcomes: Mutex<Vec<Result<PageOutcome, ProviderError>>>,
    }

    impl ScriptedSource {
        fn new(outcomes: Vec<Result<PageOutcome, ProviderError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
            }
        }
    }

    impl PageSource for ScriptedSource {
        async fn fetch(&self, _cursor: &PageCursor) -> Result<PageOutcome, ProviderError> {
            self.outcomes.lock().unwrap().remove(0)
        }
    }

    fn records(count: usize) -> Vec<SourceRecord> {
        (0..count)
            .map(|idx| SourceRecord {
                id: format!("d.co/k{idx}"),
                url: format!("https://example.com/{idx}"),
                title: None,
                archived: false,
                created_at: None,
                aliases: Vec::new(),
                tags: Vec::new(),
            })
            .collect()
    }

    fn full_page(next: &str) -> Result<PageOutcome, ProviderError> {
        Ok(PageOutcome::Page {
            records: records(PAGE_SIZE),
            next: PageCursor::InProgress(next.to_string()),
        })
    }

    #[tokio::test]
    async fn rate_limit_on_first_request_keeps_input_cursor() {
        let source = ScriptedSource::new(vec![Ok(PageOutcome::RateLimited)]);
        let start = PageCursor::InProgress("abc".to_string());

        let outcome = run_fetch_strategy(&source, start.clone(), BATCH_PAGE_CEILING)
            .await
            .unwrap();

        assert!(outcome.rate_limited);
        assert_eq!(outcome.next, start);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.batch.batch_count, 0);
    }

    #[tokio::test]
    async fn batch_keeps_partial_results_when_rate_limited_mid_run() {
        let source = ScriptedSource::new(vec![
            full_page("c1"),
            full_page("c2"),
            full_page("c3"),
            Ok(PageOutcome::RateLimited),
        ]);

        let outcome = run_fetch_strategy(&source, PageCursor::NotStarted, BATCH_PAGE_CEILING)
            .await
            .unwrap();

        assert_eq!(outcome.batch.batch_count, 3);
        assert_eq!(outcome.records.len(), PAGE_SIZE * 3);
        assert!(outcome.rate_limited);
        assert_eq!(outcome.next, PageCursor::InProgress("c3".to_string()));
    }

    #[tokio::test]
    async fn batch_stops_on_short_page() {
        let source = ScriptedSource::new(vec![
            full_page("c1"),
            Ok(PageOutcome::Page {
                records: records(40),
                next: PageCursor::InProgress("c2".to_string()),
            }),
        ]);

        let outcome = run_fetch_strategy(&source, PageCursor::NotStarted, BATCH_PAGE_CEILING)
            .await
            .unwrap();

        assert_eq!(outcome.batch.batch_count, 2);
        assert_eq!(outcome.records.len(), PAGE_SIZE + 40);
        assert!(!outcome.rate_limited);
    }

    #[tokio::test]
    async fn non_first_failure_truncates_batch_instead_of_erroring() {
        let source = ScriptedSource::new(vec![
            full_page("c1"),
            Err(ProviderError::Service {
                status: StatusCode::BAD_GATEWAY,
                body: "upstream".to_string(),
            }),
        ]);

        let outcome = run_fetch_strategy(&source, PageCursor::NotStarted, BATCH_PAGE_CEILING)
            .await
            .unwrap();

        assert_eq!(outcome.batch.batch_count, 1);
        assert_eq!(outcome.records.len(), PAGE_SIZE);
        assert_eq!(outcome.next, PageCursor::InProgress("c1".to_string()));
    }

    #[tokio::test]
    async fn first_failure_is_fatal() {
        let source = ScriptedSource::new(vec![Err(ProviderError::Service {
            status: StatusCode::BAD_GATEWAY,
            body: "upstream".to_string(),
        })]);

        let result = run_fetch_strategy(&source, PageCursor::NotStarted, BATCH_PAGE_CEILING).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn standard_strategy_issues_one_request() {
        let source = ScriptedSource::new(vec![full_page("c1")]);

        let outcome = run_fetch_strategy(&source, PageCursor::NotStarted, 1)
            .await
            .unwrap();

        assert_eq!(outcome.batch.batch_count, 1);
        assert_eq!(outcome.records.len(), PAGE_SIZE);
        assert_eq!(outcome.next, PageCursor::InProgress("c1".to_string()));
    }

    #[tokio::test]
    async fn two_page_import_reaches_finalize_with_cumulative_count() {
        use crate::import::scheduler::{decide, Continuation};

        // Page 1: a full page with a follow-up cursor. The scheduler
        // should carry the cursor and running count forward.
        let source = ScriptedSource::new(vec![full_page("c2")]);
        let first = run_fetch_strategy(&source, PageCursor::NotStarted, 1)
            .await
            .unwrap();
        assert_eq!(
            decide(&first.next),
            Continuation::Continue {
                cursor: Some("c2".to_string())
            }
        );
        let count = first.records.len();
        assert_eq!(count, 100);

        // Page 2: 40 records and an empty-string cursor, the terminal
        // signal. The scheduler should finalize at a cumulative 140.
        let source = ScriptedSource::new(vec![Ok(PageOutcome::Page {
            records: records(40),
            next: PageCursor::from_provider(Some(String::new())),
        })]);
        let second = run_fetch_strategy(&source, PageCursor::InProgress("c2".to_string()), 1)
            .await
            .unwrap();
        assert_eq!(decide(&second.next), Continuation::Finalize);
        assert_eq!(count + second.records.len(), 140);
    }

    #[test]
    fn pagination_dialects_match_the_providers() {
        assert_eq!(
            ProviderKind::Bitly.pagination_style(),
            PaginationStyle::Cursor
        );
        assert_eq!(
            ProviderKind::Rebrandly.pagination_style(),
            PaginationStyle::Offset
        );
    }

    #[test]
    fn shape_drift_is_an_empty_terminal_page() {
        let value = serde_json::json!({ "message": "unexpected" });
        let page: BitlyPage = serde_json::from_value(value).unwrap_or_default();
        assert!(page.links.is_empty());
        assert_eq!(
            PageCursor::from_provider(page.pagination.search_after),
            PageCursor::Done
        );
    }

    #[test]
    fn bitly_offset_timestamp_form_parses() {
        let parsed = parse_timestamp(Some("2023-05-01T10:00:00+0000")).unwrap();
        assert_eq!(parsed.timestamp(), 1_682_935_200);
        assert!(parse_timestamp(Some("not a date")).is_none());
    }
}
