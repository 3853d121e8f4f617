//! Serialized shape of a cached comment list.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::comments::Comment;

/// Current entry layout. Entries carrying any other version are misses.
pub const ENTRY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("entry is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported entry version {found}")]
    UnsupportedVersion { found: u32 },
}

/// Shadow copy of a post's comments, stored as one opaque string value.
///
/// `count` equals `comments.len()` when written; it is not re-checked on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: u32,
    /// Newest first.
    pub comments: Vec<Comment>,
    /// Write time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub count: usize,
}

impl CacheEntry {
    pub fn new(comments: Vec<Comment>) -> Self {
        let count = comments.len();
        Self {
            version: ENTRY_SCHEMA_VERSION,
            comments,
            timestamp: epoch_millis(),
            count,
        }
    }

    /// New entry with `comment` placed at the head of the list.
    pub fn prepended(self, comment: Comment) -> Self {
        let mut comments = Vec::with_capacity(self.comments.len() + 1);
        comments.push(comment);
        comments.extend(self.comments);
        Self::new(comments)
    }

    /// Drops every comment whose id is `comment_id`.
    ///
    /// Returns `None` when nothing matched, leaving the caller's entry as is.
    pub fn without(&self, comment_id: &str) -> Option<Self> {
        if !self.comments.iter().any(|comment| comment.id == comment_id) {
            return None;
        }
        let remaining = self
            .comments
            .iter()
            .filter(|comment| comment.id != comment_id)
            .cloned()
            .collect();
        Some(Self::new(remaining))
    }

    pub fn encode(&self) -> Result<String, EntryError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, EntryError> {
        let entry: Self = serde_json::from_str(raw)?;
        if entry.version != ENTRY_SCHEMA_VERSION {
            return Err(EntryError::UnsupportedVersion {
                found: entry.version,
            });
        }
        Ok(entry)
    }
}

pub(crate) fn epoch_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn comment(id: &str) -> Comment {
        Comment {
            id: id.to_string(),
            post_id: "post-1".to_string(),
            content: format!("content of {id}"),
            author_id: "user-1".to_string(),
            author_name: "Ada".to_string(),
            created_at: datetime!(2024-05-01 12:00:00 UTC),
        }
    }

    #[test]
    fn new_entry_counts_comments() {
        let entry = CacheEntry::new(vec![comment("c1"), comment("c2")]);
        assert_eq!(entry.version, ENTRY_SCHEMA_VERSION);
        assert_eq!(entry.count, 2);
        assert!(entry.timestamp > 0);
    }

    #[test]
    fn prepended_puts_newest_first() {
        let entry = CacheEntry::new(vec![comment("c1")]).prepended(comment("c2"));
        let ids: Vec<_> = entry.comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["c2", "c1"]);
        assert_eq!(entry.count, 2);
    }

    #[test]
    fn without_removes_matching_comment() {
        let entry = CacheEntry::new(vec![comment("c1"), comment("c2")]);
        let trimmed = entry.without("c1").expect("c1 is present");
        assert_eq!(trimmed.comments, vec![comment("c2")]);
        assert_eq!(trimmed.count, 1);
    }

    #[test]
    fn without_unknown_id_reports_no_change() {
        let entry = CacheEntry::new(vec![comment("c1")]);
        assert!(entry.without("missing").is_none());
    }

    #[test]
    fn decode_accepts_encoded_entry() {
        let entry = CacheEntry::new(vec![comment("c1")]);
        let raw = entry.encode().expect("encode");
        assert_eq!(CacheEntry::decode(&raw).expect("decode"), entry);
    }

    #[test]
    fn decode_rejects_unversioned_legacy_shape() {
        let raw = r#"{"comments":[],"timestamp":1700000000000,"count":0}"#;
        assert!(matches!(CacheEntry::decode(raw), Err(EntryError::Json(_))));
    }

    #[test]
    fn decode_rejects_future_version() {
        let raw = r#"{"version":7,"comments":[],"timestamp":1,"count":0}"#;
        assert!(matches!(
            CacheEntry::decode(raw),
            Err(EntryError::UnsupportedVersion { found: 7 })
        ));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(CacheEntry::decode("not json").is_err());
    }
}
