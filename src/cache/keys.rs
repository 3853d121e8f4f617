//! Cache key definitions.

use std::fmt;

use uuid::Uuid;

const COMMENTS_PREFIX: &str = "comments:";
const DIAGNOSTIC_PREFIX: &str = "test:connection:";

/// Key under which a value lives in the key-value store.
///
/// One key per post; there are no partial or paginated entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key holding the full comment list of `post_id`.
    pub fn comments(post_id: &str) -> Self {
        Self(format!("{COMMENTS_PREFIX}{post_id}"))
    }

    /// Fresh scratch key for connection tests.
    pub fn diagnostic() -> Self {
        Self(format!("{DIAGNOSTIC_PREFIX}{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
