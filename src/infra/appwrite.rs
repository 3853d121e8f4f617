//! Comments repository backed by an Appwrite database collection.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, warn};
use url::Url;

use crate::application::repos::{CommentsRepo, RepoError};
use crate::config::DocumentStoreSettings;
use crate::domain::comments::{Comment, NewComment};

use super::error::InfraError;

pub const TRACING_TARGET: &str = "inkpost::document_store";

const USER_AGENT: &str = concat!("inkpost/", env!("CARGO_PKG_VERSION"));
const LIST_LIMIT: u32 = 100;

/// Talks to the Appwrite REST API using a server API key.
pub struct AppwriteCommentsRepo {
    http: Client,
    documents_url: Url,
    project_id: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DocumentList {
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    documents: Vec<CommentDocument>,
}

#[derive(Debug, Deserialize)]
struct CommentDocument {
    #[serde(rename = "$id")]
    id: String,
    #[serde(rename = "$createdAt", with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(rename = "postId")]
    post_id: String,
    #[serde(rename = "userId", default)]
    user_id: String,
    #[serde(rename = "userName", default)]
    user_name: String,
    #[serde(default)]
    content: String,
}

impl From<CommentDocument> for Comment {
    fn from(doc: CommentDocument) -> Self {
        Self {
            id: doc.id,
            post_id: doc.post_id,
            content: doc.content,
            author_id: doc.user_id,
            author_name: doc.user_name,
            created_at: doc.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct CommentData<'a> {
    #[serde(rename = "postId")]
    post_id: &'a str,
    #[serde(rename = "userId")]
    user_id: &'a str,
    #[serde(rename = "userName")]
    user_name: &'a str,
    content: &'a str,
}

impl AppwriteCommentsRepo {
    pub fn new(settings: &DocumentStoreSettings) -> Result<Self, InfraError> {
        let endpoint = settings
            .endpoint
            .clone()
            .ok_or_else(|| InfraError::configuration("document_store.endpoint is required"))?;
        let project_id = required(settings.project_id.as_deref(), "document_store.project_id")?;
        let database_id = required(settings.database_id.as_deref(), "document_store.database_id")?;
        let collection_id = required(
            settings.comments_collection_id.as_deref(),
            "document_store.comments_collection_id",
        )?;

        let mut documents_url = endpoint;
        documents_url
            .path_segments_mut()
            .map_err(|_| InfraError::configuration("document store endpoint cannot carry a path"))?
            .pop_if_empty()
            .extend([
                "databases",
                database_id,
                "collections",
                collection_id,
                "documents",
            ]);

        let http = Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| InfraError::http(err.to_string()))?;

        if settings.api_key.is_none() {
            warn!(
                target: TRACING_TARGET,
                "No document store API key configured; requests are unauthenticated"
            );
        }

        Ok(Self {
            http,
            documents_url,
            project_id: project_id.to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("X-Appwrite-Project", &self.project_id);
        match self.api_key.as_deref() {
            Some(key) => request.header("X-Appwrite-Key", key),
            None => request,
        }
    }

    fn document_url(&self, document_id: &str) -> Result<Url, RepoError> {
        let mut url = self.documents_url.clone();
        url.path_segments_mut()
            .map_err(|_| RepoError::from_persistence("document url cannot carry a path"))?
            .push(document_id);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, RepoError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(target: TRACING_TARGET, status = status.as_u16(), body = %body, "Document store request failed");
        Err(map_status(status, body))
    }
}

fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str, InfraError> {
    value.ok_or_else(|| InfraError::configuration(format!("{key} is required")))
}

fn map_transport_error(err: reqwest::Error) -> RepoError {
    if err.is_timeout() {
        RepoError::Timeout
    } else {
        RepoError::from_persistence(err)
    }
}

fn map_status(status: StatusCode, body: String) -> RepoError {
    match status {
        StatusCode::NOT_FOUND => RepoError::NotFound,
        StatusCode::BAD_REQUEST => RepoError::invalid_input(body),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => RepoError::Timeout,
        other => RepoError::Persistence(format!("status {}: {body}", other.as_u16())),
    }
}

#[async_trait]
impl CommentsRepo for AppwriteCommentsRepo {
    async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>, RepoError> {
        let mut comments: Vec<Comment> = Vec::new();

        loop {
            let offset = comments.len();
            let queries = [
                json!({ "method": "equal", "attribute": "postId", "values": [post_id] }),
                json!({ "method": "orderDesc", "attribute": "$createdAt" }),
                json!({ "method": "limit", "values": [LIST_LIMIT] }),
                json!({ "method": "offset", "values": [offset] }),
            ];

            let mut url = self.documents_url.clone();
            {
                let mut pairs = url.query_pairs_mut();
                for query in &queries {
                    pairs.append_pair("queries[]", &query.to_string());
                }
            }

            let page: DocumentList = self
                .send(self.http.get(url))
                .await?
                .json()
                .await
                .map_err(RepoError::from_persistence)?;

            let fetched = page.documents.len();
            comments.extend(page.documents.into_iter().map(Comment::from));

            let reached_total = page
                .total
                .is_some_and(|total| u64::try_from(comments.len()).unwrap_or(u64::MAX) >= total);
            if fetched < LIST_LIMIT as usize || reached_total {
                break;
            }
            debug!(target: TRACING_TARGET, post_id, offset = comments.len(), "Fetching next comments page");
        }

        Ok(comments)
    }

    async fn create_comment(&self, params: NewComment) -> Result<Comment, RepoError> {
        let data = CommentData {
            post_id: &params.post_id,
            user_id: &params.author_id,
            user_name: &params.author_name,
            content: &params.content,
        };
        let body = json!({ "documentId": "unique()", "data": data });

        let document: CommentDocument = self
            .send(self.http.post(self.documents_url.clone()).json(&body))
            .await?
            .json()
            .await
            .map_err(RepoError::from_persistence)?;

        Ok(document.into())
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<(), RepoError> {
        let url = self.document_url(comment_id)?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }
}

/// Stand-in for commands that only touch the cache.
///
/// Every call fails with a persistence error naming the missing setting.
pub struct UnconfiguredCommentsRepo {
    reason: String,
}

impl UnconfiguredCommentsRepo {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> RepoError {
        RepoError::Persistence(format!("document store unavailable: {}", self.reason))
    }
}

#[async_trait]
impl CommentsRepo for UnconfiguredCommentsRepo {
    async fn list_comments(&self, _post_id: &str) -> Result<Vec<Comment>, RepoError> {
        Err(self.error())
    }

    async fn create_comment(&self, _params: NewComment) -> Result<Comment, RepoError> {
        Err(self.error())
    }

    async fn delete_comment(&self, _comment_id: &str) -> Result<(), RepoError> {
        Err(self.error())
    }
}
