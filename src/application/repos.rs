//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::comments::{Comment, NewComment};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("document store timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Authoritative storage for comments.
///
/// Implementations must report every failure as an `Err`; callers rely on
/// this to surface write errors.
#[async_trait]
pub trait CommentsRepo: Send + Sync {
    /// Comments for `post_id`, newest first.
    async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>, RepoError>;

    async fn create_comment(&self, params: NewComment) -> Result<Comment, RepoError>;

    async fn delete_comment(&self, comment_id: &str) -> Result<(), RepoError>;
}
