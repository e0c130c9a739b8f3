//! Bulk link-import pipeline.
//!
//! This module migrates a workspace's existing short links (and tags) from
//! a third-party URL shortener into the Linkdock store, one page per
//! invocation, with no long-lived process or external orchestrator.
//!
//! # Architecture Overview
//!
//! ## Core Components
//!
//! - **`message`**: The queue message carrying job state between
//!   invocations, and the explicit pagination tri-state.
//!
//! - **`signature`**: Authenticity verification for queue deliveries
//!   (detached JWT over a body hash).
//!
//! - **`queue`**: Publisher side of the durable queue transport used for
//!   continuation messages.
//!
//! - **`sanitize`**: Repair of malformed provider payloads before JSON
//!   parsing.
//!
//! - **`provider`**: Per-provider adapters (Bitly, Rebrandly) behind one
//!   pipeline shape, plus the Standard/Batch page-fetch strategies.
//!
//! - **`tags`**: One-time import of the provider's tag taxonomy, guarded
//!   by a KV marker.
//!
//! - **`normalize`**: Mapping of source records into Linkdock links with
//!   eligible-domain filtering and alias expansion.
//!
//! - **`sink`**: Idempotent persistence (KV dedup claims + bulk insert
//!   with conflict-skip).
//!
//! - **`scheduler`**: Continuation/finalization state machine.
//!
//! ## Data Flow
//!
//! 1. **Delivery**: the queue transport POSTs a signed message to the
//!    callback endpoint, which verifies it and calls [`run_import`]
//! 2. **Credentials**: the provider token is read from the KV store;
//!    a missing token stops the chain (that is how imports are cancelled)
//! 3. **Tags** (first invocation only): the provider's tag list is paged
//!    in and created under the workspace
//! 4. **Fetch**: one page (or one bounded batch) of records, repaired and
//!    parsed
//! 5. **Normalize + Sink**: eligible records become links; duplicates are
//!    skipped by constraint
//! 6. **Schedule**: a continuation message is enqueued with the updated
//!    cursor, or the job finalizes with cleanup and one summary email
//!
//! Each invocation does bounded work and hands off; ordering across pages
//! comes from enqueueing the successor only after this page's writes are
//! committed. Overlapping retries are safe because claims use SET NX and
//! inserts skip conflicting rows.

pub mod config;
pub mod message;
pub mod normalize;
pub mod provider;
pub mod queue;
pub mod sanitize;
pub mod scheduler;
pub mod signature;
pub mod sink;
pub mod tags;

use sqlx::PgPool;
use std::collections::HashSet;
use thiserror::Error;

use crate::kv::{self, KvError, KvStore};
use crate::notify::Mailer;

pub use config::ImportConfig;
pub use message::{ImportMessage, PageCursor};
pub use provider::{ProviderClient, ProviderError, ProviderKind};
pub use queue::{QueueClient, QueueError};
pub use sanitize::SanitizeError;

/// Shared handles the pipeline needs per invocation.
pub struct ImportContext {
    pub pool: PgPool,
    pub kv: KvStore,
    pub queue: QueueClient,
    pub mailer: Mailer,
    pub config: ImportConfig,
}

/// The workspace member that authorized the import; owns the imported
/// links and receives the completion email.
#[derive(Debug, Clone)]
pub struct WorkspaceOwner {
    pub user_id: i32,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no stored credentials for workspace {workspace_id}; import cancelled or expired")]
    MissingCredentials { workspace_id: i32 },
    #[error("workspace {workspace_id} has no owner")]
    MissingOwner { workspace_id: i32 },
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("kv error: {0}")]
    Kv(#[from] KvError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

/// What one invocation accomplished, for logging at the endpoint.
#[derive(Debug)]
pub struct ImportSummary {
    pub fetched: usize,
    pub inserted: usize,
    pub total: usize,
    pub finished: bool,
    pub rate_limited: bool,
}

/// Process one queue message: one page (or bounded batch) of the import.
pub async fn run_import(
    ctx: &ImportContext,
    job: &ImportMessage,
) -> Result<ImportSummary, ImportError> {
    let token = ctx
        .kv
        .get(&kv::credentials_key(job.provider, job.workspace_id))
        .await?
        .ok_or(ImportError::MissingCredentials {
            workspace_id: job.workspace_id,
        })?;

    let owner = load_workspace_owner(&ctx.pool, job.workspace_id).await?;

    let provider = ProviderClient::new(job.provider, &job.provider_account_id, &token, &ctx.config)?;

    let tag_ids = if job.import_tags {
        let importer = tags::TagImporter::new(&ctx.pool, &ctx.kv, &provider);
        Some(importer.ensure_imported(job.workspace_id).await?)
    } else {
        None
    };

    let cursor = PageCursor::from_message(job.cursor.as_deref());
    let batch = ctx.config.batch_workspaces.contains(&job.workspace_id);
    let outcome = provider.fetch_links(cursor, batch).await?;

    if outcome.rate_limited {
        log::info!(
            "workspace {}: provider rate limited after {} pages, will resume from the same position",
            job.workspace_id,
            outcome.batch.batch_count
        );
    }

    let eligible: HashSet<String> = job.eligible_domains.iter().cloned().collect();
    let links = normalize::normalize_page(
        &outcome.records,
        &normalize::NormalizeContext {
            workspace_id: job.workspace_id,
            user_id: owner.user_id,
            eligible_domains: &eligible,
            tag_ids: tag_ids.as_ref(),
        },
    );

    let sink = sink::LinkSink::new(ctx.pool.clone(), ctx.kv.clone());
    let inserted = sink.persist_batch(&links).await?;
    let total = job.count + inserted;

    let sched = scheduler::Scheduler::new(&ctx.pool, &ctx.kv, &ctx.queue, &ctx.mailer);
    let finished = sched
        .advance(job, &owner, &outcome.next, total, outcome.rate_limited)
        .await?;

    Ok(ImportSummary {
        fetched: outcome.records.len(),
        inserted,
        total,
        finished,
        rate_limited: outcome.rate_limited,
    })
}

/// Resolve the workspace owner (link ownership + notification target).
pub async fn load_workspace_owner(
    pool: &PgPool,
    workspace_id: i32,
) -> Result<WorkspaceOwner, ImportError> {
    let row: Option<(i32, String)> = sqlx::query_as(
        r#"SELECT u.id, u.email
           FROM users u
           JOIN workspace_users wu ON wu.user_id = u.id
           WHERE wu.workspace_id = $1 AND wu.role = 'owner'
           LIMIT 1"#,
    )
    .bind(workspace_id)
    .fetch_optional(pool)
    .await?;

    row.map(|(user_id, email)| WorkspaceOwner { user_id, email })
        .ok_or(ImportError::MissingOwner { workspace_id })
}
