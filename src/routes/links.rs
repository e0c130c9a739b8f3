//! Read-side listing of a workspace's links and tags.

use crate::error::ApiError;
use crate::models::{DataResponse, Link, Tag};
use rocket::serde::json::Json;
use rocket::State;
use rocket_db_pools::sqlx;
use rocket_okapi::openapi;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

async fn workspace_id_by_slug(pool: &sqlx::PgPool, slug: &str) -> Result<i32, ApiError> {
    sqlx::query_scalar("SELECT id FROM workspaces WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Workspace '{}' not found", slug)))
}

/// List a workspace's links, most recent first.
#[openapi(tag = "Links")]
#[get("/workspaces/<slug>/links?<page>&<page_size>")]
pub async fn list_workspace_links(
    slug: String,
    page: Option<i64>,
    page_size: Option<i64>,
    pool: &State<sqlx::PgPool>,
) -> Result<Json<DataResponse<Vec<Link>>>, ApiError> {
    let workspace_id = workspace_id_by_slug(pool.inner(), &slug).await?;

    let page = page.unwrap_or(1).max(1);
    let page_size = page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1) * page_size;

    let links: Vec<Link> = sqlx::query_as(
        r#"SELECT id, workspace_id, user_id, domain, key, url, title, archived, tag_id, created_at
           FROM links
           WHERE workspace_id = $1
           ORDER BY created_at DESC, id DESC
           LIMIT $2 OFFSET $3"#,
    )
    .bind(workspace_id)
    .bind(page_size)
    .bind(offset)
    .fetch_all(pool.inner())
    .await?;

    Ok(Json(DataResponse { data: links }))
}

/// List a workspace's tags in name order.
#[openapi(tag = "Links")]
#[get("/workspaces/<slug>/tags")]
pub async fn list_workspace_tags(
    slug: String,
    pool: &State<sqlx::PgPool>,
) -> Result<Json<DataResponse<Vec<Tag>>>, ApiError> {
    let workspace_id = workspace_id_by_slug(pool.inner(), &slug).await?;

    let tags: Vec<Tag> = sqlx::query_as(
        r#"SELECT id, workspace_id, name, color, created_at
           FROM tags
           WHERE workspace_id = $1
           ORDER BY name ASC"#,
    )
    .bind(workspace_id)
    .fetch_all(pool.inner())
    .await?;

    Ok(Json(DataResponse { data: tags }))
}
