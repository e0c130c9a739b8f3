//! One-time import of the provider's tag taxonomy.
//!
//! Runs before the first link page of a job and never again: a KV marker
//! records that the workspace already has its tags, and later invocations
//! only rebuild the name-to-id map from Postgres. Tag creation is
//! idempotent through the (workspace_id, name) uniqueness constraint, so
//! a retried first page cannot duplicate tags either.

use rand::seq::SliceRandom;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::import::message::PageCursor;
use crate::import::provider::ProviderClient;
use crate::import::ImportError;
use crate::kv::{self, KvStore};

/// Palette matching the dashboard's tag chips.
pub const TAG_COLORS: &[&str] = &[
    "red", "yellow", "green", "blue", "purple", "pink", "brown",
];

pub struct TagImporter<'a> {
    pool: &'a PgPool,
    kv: &'a KvStore,
    provider: &'a ProviderClient,
}

impl<'a> TagImporter<'a> {
    pub fn new(pool: &'a PgPool, kv: &'a KvStore, provider: &'a ProviderClient) -> Self {
        Self { pool, kv, provider }
    }

    /// Make sure the workspace has the provider's tags and return the
    /// name-to-id lookup used for link normalization.
    pub async fn ensure_imported(
        &self,
        workspace_id: i32,
    ) -> Result<HashMap<String, i32>, ImportError> {
        let marker = kv::tag_marker_key(self.provider.kind(), workspace_id);

        if self.kv.get(&marker).await?.is_none() {
            let created = self.import_all(workspace_id).await?;
            self.kv.set(&marker, "1").await?;
            log::info!(
                "workspace {}: imported {} tags from {}",
                workspace_id,
                created,
                self.provider.kind().as_str()
            );
        }

        self.load_mapping(workspace_id).await
    }

    /// Walk the provider's tag list page by page until a page comes back
    /// empty, creating missing tags as we go.
    async fn import_all(&self, workspace_id: i32) -> Result<usize, ImportError> {
        let mut cursor = PageCursor::NotStarted;
        let mut created = 0usize;

        loop {
            let page = self.provider.fetch_tag_page(&cursor).await?;
            if page.names.is_empty() {
                break;
            }

            created += self.insert_tags_batch(workspace_id, &page.names).await?;

            cursor = page.next;
            if cursor.is_done() {
                break;
            }
        }

        Ok(created)
    }

    /// Bulk-create tags, skipping names the workspace already has. Colors
    /// are picked at random from the fixed palette.
    async fn insert_tags_batch(
        &self,
        workspace_id: i32,
        names: &[String],
    ) -> Result<usize, ImportError> {
        if names.is_empty() {
            return Ok(0);
        }

        // ThreadRng is not Send; keep it out of scope before the query await.
        let colors: Vec<String> = {
            let mut rng = rand::thread_rng();
            names
                .iter()
                .map(|_| {
                    TAG_COLORS
                        .choose(&mut rng)
                        .copied()
                        .unwrap_or("blue")
                        .to_string()
                })
                .collect()
        };
        let workspace_ids = vec![workspace_id; names.len()];

        let result = sqlx::query(
            r#"INSERT INTO tags (workspace_id, name, color)
               SELECT * FROM UNNEST($1::int[], $2::text[], $3::text[])
               ON CONFLICT (workspace_id, name) DO NOTHING"#,
        )
        .bind(&workspace_ids)
        .bind(names)
        .bind(&colors)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn load_mapping(&self, workspace_id: i32) -> Result<HashMap<String, i32>, ImportError> {
        let rows: Vec<(String, i32)> =
            sqlx::query_as("SELECT name, id FROM tags WHERE workspace_id = $1")
                .bind(workspace_id)
                .fetch_all(self.pool)
                .await?;

        Ok(rows.into_iter().collect())
    }
}
