use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::GatewayError;

pub const DEFAULT_PAGE_LIMIT: usize = 10;
pub const DEFAULT_SEARCH_K: usize = 3;
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub const ALLOWED_UPLOAD_TYPES: [&str; 2] = ["application/pdf", "text/plain"];

/// A file known to the document store. The client only ever holds a cached copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentReference {
    pub file_id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Upstream timestamps sometimes omit the offset; those are read as UTC.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| {
        DateTime::parse_from_rfc3339(&value)
            .map(|parsed| parsed.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(&value, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }))
}

/// Acknowledgement of an upload; `file_id` is the identifier assigned upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadReceipt {
    pub file_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

impl OrderDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderDirection::Asc => "asc",
            OrderDirection::Desc => "desc",
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderDirection {
    type Err = GatewayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(OrderDirection::Asc),
            "desc" => Ok(OrderDirection::Desc),
            other => Err(GatewayError::invalid_input(format!(
                "order_dir must be asc or desc, got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ListFilesRequest {
    pub offset: usize,
    pub limit: usize,
    pub order_dir: OrderDirection,
}

impl Default for ListFilesRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
            order_dir: OrderDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileListing {
    #[serde(default)]
    pub results: Vec<DocumentReference>,
}

/// Body of `POST /api/search`. Absent fields deserialize to values that fail
/// validation rather than to permissive defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub file_ids: Vec<String>,
    #[serde(default = "default_search_k")]
    pub k: usize,
}

fn default_search_k() -> usize {
    DEFAULT_SEARCH_K
}

/// A retrieved text fragment. `rank` is its zero-based position in the
/// upstream relevance order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextChunk {
    pub content: String,
    #[serde(default)]
    pub rank: usize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContextChunk {
    pub fn new(content: impl Into<String>, rank: usize) -> Self {
        Self {
            content: content.into(),
            rank,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    #[serde(default)]
    pub documents: Vec<ContextChunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UploadTextRequest {
    pub name: Option<String>,
    pub contents: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatChoice {
    pub message: ChatMessage,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Chat-completion body relayed to the client as received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    pub choices: Vec<ChatChoice>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletion {
    pub fn answer_text(&self) -> Option<&str> {
        self.choices
            .first()
            .map(|choice| choice.message.content.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Assistant,
    SystemError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

impl TranscriptEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_reference_keeps_unknown_fields() {
        let raw = json!({
            "file_id": "f1",
            "file_name": "handbook.pdf",
            "created_at": "2024-03-01T10:00:00Z",
            "type": "file"
        });
        let reference: DocumentReference = serde_json::from_value(raw).expect("parse");
        assert_eq!(reference.file_id, "f1");
        assert_eq!(reference.extra.get("type"), Some(&json!("file")));
        assert!(reference.created_at.is_some());
    }

    #[test]
    fn timestamps_without_offset_are_read_as_utc() {
        let raw = json!({
            "file_id": "f2",
            "file_name": "a.txt",
            "created_at": "2024-03-01T10:00:00.125"
        });
        let reference: DocumentReference = serde_json::from_value(raw).expect("parse");
        let created = reference.created_at.expect("timestamp");
        assert_eq!(created.to_rfc3339(), "2024-03-01T10:00:00.125+00:00");
    }

    #[test]
    fn search_request_defaults_k_but_not_file_ids() {
        let request: SearchRequest =
            serde_json::from_value(json!({"query": "refund"})).expect("parse");
        assert_eq!(request.k, DEFAULT_SEARCH_K);
        assert!(request.file_ids.is_empty());
    }

    #[test]
    fn order_direction_parses_case_insensitively() {
        assert_eq!("ASC".parse::<OrderDirection>().ok(), Some(OrderDirection::Asc));
        assert!("sideways".parse::<OrderDirection>().is_err());
    }

    #[test]
    fn system_error_role_uses_kebab_case() {
        let encoded = serde_json::to_value(Role::SystemError).expect("encode");
        assert_eq!(encoded, json!("system-error"));
    }
}
