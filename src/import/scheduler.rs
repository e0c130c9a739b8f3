//! Continuation and finalization of an import job.
//!
//! Every invocation ends here with the fetcher's resume position. Either
//! the job re-enqueues itself as a new durable message carrying the
//! updated cursor and running total, or the terminal page was reached and
//! the job finalizes: scratch state is deleted, speculatively created tags
//! that gathered no links are removed, and the workspace owner gets one
//! summary email.

use sqlx::PgPool;
use std::time::Duration;

use crate::import::message::{ImportMessage, PageCursor};
use crate::import::queue::QueueClient;
use crate::import::{ImportError, WorkspaceOwner};
use crate::kv::{self, KvStore};
use crate::notify::{Mailer, SampleLink};

/// Pause before enqueueing the next page, keeping the chain of
/// invocations under the provider's rate limit.
pub const CONTINUATION_DELAY: Duration = Duration::from_millis(500);

/// Transport-side delay for retrying after the provider rate limited us.
pub const RATE_LIMIT_RETRY_DELAY: Duration = Duration::from_secs(30);

const SAMPLE_LINK_COUNT: i64 = 5;

#[derive(Debug, PartialEq, Eq)]
pub enum Continuation {
    Continue { cursor: Option<String> },
    Finalize,
}

/// Map the fetcher's resume position onto the two scheduler states. A
/// rate-limited first request resumes from the unchanged input cursor,
/// which may legitimately be `NotStarted`.
pub fn decide(next: &PageCursor) -> Continuation {
    match next {
        PageCursor::Done => Continuation::Finalize,
        PageCursor::InProgress(cursor) => Continuation::Continue {
            cursor: Some(cursor.clone()),
        },
        PageCursor::NotStarted => Continuation::Continue { cursor: None },
    }
}

pub struct Scheduler<'a> {
    pool: &'a PgPool,
    kv: &'a KvStore,
    queue: &'a QueueClient,
    mailer: &'a Mailer,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        pool: &'a PgPool,
        kv: &'a KvStore,
        queue: &'a QueueClient,
        mailer: &'a Mailer,
    ) -> Self {
        Self {
            pool,
            kv,
            queue,
            mailer,
        }
    }

    /// Advance the job. Returns whether the job finalized.
    pub async fn advance(
        &self,
        job: &ImportMessage,
        owner: &WorkspaceOwner,
        next: &PageCursor,
        total: usize,
        rate_limited: bool,
    ) -> Result<bool, ImportError> {
        match decide(next) {
            Continuation::Continue { cursor } => {
                let message = job.continuation(cursor, total);
                if rate_limited {
                    self.queue
                        .enqueue(&message, Some(RATE_LIMIT_RETRY_DELAY))
                        .await?;
                    log::info!(
                        "workspace {}: rate limited, retry enqueued with {}s delay",
                        job.workspace_id,
                        RATE_LIMIT_RETRY_DELAY.as_secs()
                    );
                } else {
                    tokio::time::sleep(CONTINUATION_DELAY).await;
                    self.queue.enqueue(&message, None).await?;
                    log::info!(
                        "workspace {}: page done, {} links so far, continuation enqueued",
                        job.workspace_id,
                        total
                    );
                }
                Ok(false)
            }
            Continuation::Finalize => {
                self.finalize(job, owner, total).await?;
                Ok(true)
            }
        }
    }

    pub async fn finalize(
        &self,
        job: &ImportMessage,
        owner: &WorkspaceOwner,
        total: usize,
    ) -> Result<(), ImportError> {
        // The import secret must not outlive the job.
        self.kv
            .delete(&kv::credentials_key(job.provider, job.workspace_id))
            .await?;
        self.kv
            .delete(&kv::tag_marker_key(job.provider, job.workspace_id))
            .await?;

        let removed = sqlx::query(
            r#"DELETE FROM tags
               WHERE workspace_id = $1
                 AND NOT EXISTS (SELECT 1 FROM links WHERE links.tag_id = tags.id)"#,
        )
        .bind(job.workspace_id)
        .execute(self.pool)
        .await?
        .rows_affected();

        if removed > 0 {
            log::debug!(
                "workspace {}: removed {} tags with no links attached",
                job.workspace_id,
                removed
            );
        }

        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"SELECT domain, key, url FROM links
               WHERE workspace_id = $1 AND domain = ANY($2)
               ORDER BY created_at DESC
               LIMIT $3"#,
        )
        .bind(job.workspace_id)
        .bind(&job.eligible_domains)
        .bind(SAMPLE_LINK_COUNT)
        .fetch_all(self.pool)
        .await?;

        let samples: Vec<SampleLink> = rows
            .into_iter()
            .map(|(domain, key, url)| SampleLink { domain, key, url })
            .collect();

        // Links are already durably persisted at this point; a failed
        // notification never re-triggers page processing.
        if let Err(err) = self
            .mailer
            .send_links_imported(
                &owner.email,
                job.provider.display_name(),
                total,
                &samples,
                &job.eligible_domains,
            )
            .await
        {
            log::error!(
                "workspace {}: completion email failed (import still complete): {}",
                job.workspace_id,
                err
            );
        }

        log::info!(
            "workspace {}: import from {} finalized with {} links",
            job.workspace_id,
            job.provider.as_str(),
            total
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_cursor_finalizes() {
        assert_eq!(decide(&PageCursor::Done), Continuation::Finalize);
    }

    #[test]
    fn in_progress_cursor_continues_with_it() {
        assert_eq!(
            decide(&PageCursor::InProgress("abc".to_string())),
            Continuation::Continue {
                cursor: Some("abc".to_string())
            }
        );
    }

    #[test]
    fn unstarted_job_continues_without_cursor() {
        // A first request that was rate limited retries from the top.
        assert_eq!(
            decide(&PageCursor::NotStarted),
            Continuation::Continue { cursor: None }
        );
    }
}
