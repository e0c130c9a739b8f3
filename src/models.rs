use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::FromRow;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Generic wrapper for list/detail responses.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DataResponse<T> {
    pub data: T,
}

// ===== Link Models =====

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
pub struct Link {
    pub id: i32,
    pub workspace_id: i32,
    pub user_id: Option<i32>,
    pub domain: String,
    pub key: String,
    pub url: String,
    pub title: Option<String>,
    pub archived: bool,
    pub tag_id: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
pub struct Tag {
    pub id: i32,
    pub workspace_id: i32,
    pub name: String,
    pub color: String,
    pub created_at: Option<DateTime<Utc>>,
}
