//! The queue message that carries an import job between invocations.
//!
//! There is no job row anywhere: the chain of queue messages *is* the job.
//! Each invocation reconstructs its state from the message, does one page
//! (or one batch) of work, and either enqueues the successor message or
//! finalizes.

use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::import::provider::ProviderKind;

/// Body of an import trigger/continuation message.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportMessage {
    pub workspace_id: i32,
    pub provider: ProviderKind,
    /// Provider-side account identifier (e.g. a Bitly group guid).
    pub provider_account_id: String,
    /// Short-link domains the workspace has verified; everything else in
    /// the provider's export is dropped.
    pub eligible_domains: Vec<String>,
    pub import_tags: bool,
    /// Absent on the very first invocation of a job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    /// Links inserted so far across previous pages.
    #[serde(default)]
    pub count: usize,
}

impl ImportMessage {
    /// Successor message carrying the updated cursor and running total.
    pub fn continuation(&self, cursor: Option<String>, count: usize) -> Self {
        Self {
            cursor,
            count,
            ..self.clone()
        }
    }
}

/// Pagination position, made an explicit tri-state.
///
/// Providers signal "no more pages" either by omitting the next cursor or
/// by returning an empty string. Both map to `Done`; neither is ever
/// confused with `NotStarted`, which only describes a job that has not
/// issued its first request yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    NotStarted,
    InProgress(String),
    Done,
}

impl PageCursor {
    /// Position encoded in an incoming queue message.
    pub fn from_message(cursor: Option<&str>) -> Self {
        match cursor {
            None => PageCursor::NotStarted,
            Some(value) => PageCursor::InProgress(value.to_string()),
        }
    }

    /// Position reported back by a provider page response.
    pub fn from_provider(next: Option<String>) -> Self {
        match next {
            None => PageCursor::Done,
            Some(value) if value.is_empty() => PageCursor::Done,
            Some(value) => PageCursor::InProgress(value),
        }
    }

    /// Value to send as the provider's cursor query parameter, if any.
    pub fn as_param(&self) -> Option<&str> {
        match self {
            PageCursor::InProgress(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Value to embed in a continuation message.
    pub fn as_message_cursor(&self) -> Option<String> {
        match self {
            PageCursor::InProgress(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, PageCursor::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips_camel_case_wire_names() {
        let message = ImportMessage {
            workspace_id: 3,
            provider: ProviderKind::Bitly,
            provider_account_id: "grp_1".to_string(),
            eligible_domains: vec!["d.co".to_string()],
            import_tags: true,
            cursor: Some("abc".to_string()),
            count: 100,
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["workspaceId"], 3);
        assert_eq!(json["provider"], "bitly");
        assert_eq!(json["providerAccountId"], "grp_1");
        assert_eq!(json["importTags"], true);
        assert_eq!(json["cursor"], "abc");
        assert_eq!(json["count"], 100);

        let parsed: ImportMessage = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.cursor.as_deref(), Some("abc"));
        assert_eq!(parsed.count, 100);
    }

    #[test]
    fn first_invocation_omits_cursor_and_count() {
        let parsed: ImportMessage = serde_json::from_str(
            r#"{"workspaceId":1,"provider":"rebrandly","providerAccountId":"acct",
                "eligibleDomains":["d.co"],"importTags":false}"#,
        )
        .unwrap();
        assert!(parsed.cursor.is_none());
        assert_eq!(parsed.count, 0);

        let json = serde_json::to_value(&parsed).unwrap();
        assert!(json.get("cursor").is_none());
    }

    #[test]
    fn continuation_carries_cursor_and_count_forward() {
        let first = ImportMessage {
            workspace_id: 3,
            provider: ProviderKind::Bitly,
            provider_account_id: "grp_1".to_string(),
            eligible_domains: vec!["d.co".to_string()],
            import_tags: true,
            cursor: None,
            count: 0,
        };

        let next = first.continuation(Some("page2".to_string()), 100);
        assert_eq!(next.cursor.as_deref(), Some("page2"));
        assert_eq!(next.count, 100);
        assert_eq!(next.workspace_id, first.workspace_id);
        assert_eq!(next.eligible_domains, first.eligible_domains);
        assert!(next.import_tags);
    }

    #[test]
    fn empty_string_provider_cursor_is_terminal_not_unstarted() {
        assert_eq!(
            PageCursor::from_provider(Some(String::new())),
            PageCursor::Done
        );
        assert_eq!(PageCursor::from_provider(None), PageCursor::Done);
        assert_eq!(
            PageCursor::from_provider(Some("next".to_string())),
            PageCursor::InProgress("next".to_string())
        );
        assert_eq!(PageCursor::from_message(None), PageCursor::NotStarted);
    }
}
