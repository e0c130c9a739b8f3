//! Idempotent persistence of normalized links.
//!
//! Two writes happen per batch, and both are attempted even if one fails:
//! a per-link KV claim (SET NX on `domain:key`, value = destination URL)
//! and one bulk relational insert that skips rows violating the
//! (domain, key) uniqueness constraint. Replaying a page is harmless: the
//! claims no-op and the insert affects zero rows. Only rows actually
//! inserted count toward the job total reported in the completion email.

use sqlx::PgPool;

use crate::import::normalize::NewLink;
use crate::kv::{self, KvStore};

pub struct LinkSink {
    pool: PgPool,
    kv: KvStore,
}

impl LinkSink {
    pub fn new(pool: PgPool, kv: KvStore) -> Self {
        Self { pool, kv }
    }

    /// Persist a batch, returning the number of rows actually inserted
    /// (duplicates are skipped, not errors).
    pub async fn persist_batch(&self, links: &[NewLink]) -> Result<usize, sqlx::Error> {
        if links.is_empty() {
            return Ok(0);
        }

        self.claim_slots(links).await;
        self.insert_links_batch(links).await
    }

    /// Claim `domain:key` slots in the KV store. A lost claim means the
    /// slot was already taken (an earlier page or a double-fired retry);
    /// a failed claim is logged and never blocks the relational write.
    async fn claim_slots(&self, links: &[NewLink]) {
        for link in links {
            let key = kv::claim_key(&link.domain, &link.key);
            match self.kv.set_nx(&key, &link.url).await {
                Ok(true) => {}
                Ok(false) => {
                    log::debug!("slot {}/{} already claimed", link.domain, link.key);
                }
                Err(err) => {
                    log::warn!(
                        "dedup claim failed for {}/{}: {}",
                        link.domain,
                        link.key,
                        err
                    );
                }
            }
        }
    }

    async fn insert_links_batch(&self, links: &[NewLink]) -> Result<usize, sqlx::Error> {
        let count = links.len();

        let mut workspace_ids = Vec::with_capacity(count);
        let mut user_ids = Vec::with_capacity(count);
        let mut domains = Vec::with_capacity(count);
        let mut keys = Vec::with_capacity(count);
        let mut urls = Vec::with_capacity(count);
        let mut titles = Vec::with_capacity(count);
        let mut archived_flags = Vec::with_capacity(count);
        let mut tag_ids = Vec::with_capacity(count);
        let mut created_ats = Vec::with_capacity(count);

        for link in links {
            workspace_ids.push(link.workspace_id);
            user_ids.push(link.user_id);
            domains.push(link.domain.clone());
            keys.push(link.key.clone());
            urls.push(link.url.clone());
            titles.push(link.title.clone());
            archived_flags.push(link.archived);
            tag_ids.push(link.tag_id);
            created_ats.push(link.created_at);
        }

        let result = sqlx::query(
            r#"INSERT INTO links
                (workspace_id, user_id, domain, key, url, title, archived, tag_id, created_at)
               SELECT
                   workspace_id,
                   user_id,
                   domain,
                   key,
                   url,
                   title,
                   archived,
                   tag_id,
                   COALESCE(created_at, NOW())
               FROM UNNEST(
                   $1::int[],
                   $2::int[],
                   $3::text[],
                   $4::text[],
                   $5::text[],
                   $6::text[],
                   $7::bool[],
                   $8::int[],
                   $9::timestamptz[]
               ) AS t (
                   workspace_id,
                   user_id,
                   domain,
                   key,
                   url,
                   title,
                   archived,
                   tag_id,
                   created_at
               )
               ON CONFLICT (domain, key) DO NOTHING"#,
        )
        .bind(&workspace_ids)
        .bind(&user_ids)
        .bind(&domains)
        .bind(&keys)
        .bind(&urls)
        .bind(&titles)
        .bind(&archived_flags)
        .bind(&tag_ids)
        .bind(&created_ats)
        .execute(&self.pool)
        .await?;

        let rows_affected = result.rows_affected() as usize;
        if rows_affected < count {
            log::debug!(
                "insert_links_batch: {} of {} links inserted ({} duplicates skipped)",
                rows_affected,
                count,
                count - rows_affected
            );
        }

        Ok(rows_affected)
    }
}
