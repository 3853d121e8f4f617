//! Test doubles shared by the integration suites.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use inkpost::application::repos::{CommentsRepo, RepoError};
use inkpost::cache::{CacheEntry, CacheKey, KvError, KvResult, KvStore, MemoryKvStore};
use inkpost::domain::comments::{Comment, NewComment};
use time::OffsetDateTime;
use time::macros::datetime;

pub fn comment(id: &str, post_id: &str, content: &str) -> Comment {
    Comment {
        id: id.to_string(),
        post_id: post_id.to_string(),
        content: content.to_string(),
        author_id: "user-1".to_string(),
        author_name: "Ada".to_string(),
        created_at: datetime!(2024-05-01 12:00:00 UTC),
    }
}

pub fn new_comment(post_id: &str, content: &str) -> NewComment {
    NewComment {
        post_id: post_id.to_string(),
        author_id: "user-2".to_string(),
        author_name: "Grace".to_string(),
        content: content.to_string(),
    }
}

pub fn ids(comments: &[Comment]) -> Vec<&str> {
    comments.iter().map(|c| c.id.as_str()).collect()
}

/// In-memory document store with call counters and injectable failures.
#[derive(Default)]
pub struct FakeCommentsRepo {
    posts: Mutex<HashMap<String, Vec<Comment>>>,
    next_id: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub fail_list: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FakeCommentsRepo {
    pub fn with_comments(post_id: &str, comments: Vec<Comment>) -> Self {
        let repo = Self::default();
        repo.replace(post_id, comments);
        repo
    }

    /// Replaces a post's comments behind the cache's back.
    pub fn replace(&self, post_id: &str, comments: Vec<Comment>) {
        self.posts
            .lock()
            .expect("posts lock")
            .insert(post_id.to_string(), comments);
    }

    pub fn stored(&self, post_id: &str) -> Vec<Comment> {
        self.posts
            .lock()
            .expect("posts lock")
            .get(post_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommentsRepo for FakeCommentsRepo {
    async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>, RepoError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("list unavailable".to_string()));
        }
        Ok(self.stored(post_id))
    }

    async fn create_comment(&self, params: NewComment) -> Result<Comment, RepoError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("create rejected".to_string()));
        }

        let id = format!("new-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let created = Comment {
            id,
            post_id: params.post_id.clone(),
            content: params.content,
            author_id: params.author_id,
            author_name: params.author_name,
            created_at: OffsetDateTime::now_utc(),
        };
        self.posts
            .lock()
            .expect("posts lock")
            .entry(params.post_id)
            .or_default()
            .insert(0, created.clone());
        Ok(created)
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<(), RepoError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("delete rejected".to_string()));
        }

        let mut posts = self.posts.lock().expect("posts lock");
        let mut removed = false;
        for comments in posts.values_mut() {
            let before = comments.len();
            comments.retain(|c| c.id != comment_id);
            removed |= comments.len() != before;
        }
        if removed {
            Ok(())
        } else {
            Err(RepoError::NotFound)
        }
    }
}

/// [`MemoryKvStore`] wrapper that can be told to fail individual commands.
pub struct FlakyKv {
    pub inner: MemoryKvStore,
    pub configured: AtomicBool,
    pub fail_ping: AtomicBool,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_delete: AtomicBool,
    pub ping_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub set_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

impl Default for FlakyKv {
    fn default() -> Self {
        Self {
            inner: MemoryKvStore::default(),
            configured: AtomicBool::new(true),
            fail_ping: AtomicBool::new(false),
            fail_get: AtomicBool::new(false),
            fail_set: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            ping_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            set_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }
}

impl FlakyKv {
    pub fn unconfigured() -> Self {
        Self {
            configured: AtomicBool::new(false),
            ..Self::default()
        }
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub async fn cached(&self, post_id: &str) -> Option<CacheEntry> {
        self.inner
            .get(&CacheKey::comments(post_id))
            .await
            .expect("memory store read")
    }

    pub async fn seed(&self, post_id: &str, comments: Vec<Comment>) {
        self.inner
            .set(
                &CacheKey::comments(post_id),
                &CacheEntry::new(comments),
                Duration::from_secs(3600),
            )
            .await
            .expect("memory store write");
    }

    fn guard(&self, flag: &AtomicBool) -> KvResult<()> {
        if !self.configured.load(Ordering::SeqCst) {
            return Err(KvError::NotConfigured);
        }
        if flag.load(Ordering::SeqCst) {
            return Err(KvError::Transport("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FlakyKv {
    fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    async fn ping(&self) -> KvResult<()> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        self.guard(&self.fail_ping)?;
        self.inner.ping().await
    }

    async fn get(&self, key: &CacheKey) -> KvResult<Option<CacheEntry>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.guard(&self.fail_get)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, entry: &CacheEntry, ttl: Duration) -> KvResult<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.guard(&self.fail_set)?;
        self.inner.set(key, entry, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> KvResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.guard(&self.fail_delete)?;
        self.inner.delete(key).await
    }
}
