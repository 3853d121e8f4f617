//! Comments attached to posts.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::error::DomainError;

const MAX_CONTENT_CHARS: usize = 5_000;

/// A comment as persisted by the document store.
///
/// Lists of comments are always ordered newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Caller-supplied fields for a comment that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub post_id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.post_id.trim().is_empty() {
            return Err(DomainError::validation("post id must not be empty"));
        }
        if self.author_id.trim().is_empty() {
            return Err(DomainError::validation("author id must not be empty"));
        }
        let content = self.content.trim();
        if content.is_empty() {
            return Err(DomainError::validation("comment content must not be empty"));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(DomainError::validation(format!(
                "comment content exceeds {MAX_CONTENT_CHARS} characters"
            )));
        }
        Ok(())
    }
}
