//! Typed wrappers over the content endpoints.
//!
//! These are thin: each call validates its input locally, builds one
//! descriptor, and routes it through [`AuthenticatedClient`] so expiry and
//! refresh are handled the same way as every other call. Mutations do not
//! decode the response body; callers re-list when they need fresh data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::AuthenticatedClient;
use crate::error::ClientError;
use crate::request::RequestDescriptor;
use crate::types::{Identity, Role};

pub const POSTS_PATH: &str = "/posts";
pub const USERS_PATH: &str = "/users";

// =============================================================================
// POSTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl PostStatus {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Draft => Self::Published,
            Self::Published => Self::Draft,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: PostStatus,
    /// Author, timestamps and anything else the backend attaches.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub status: PostStatus,
}

impl NewPost {
    /// A draft with the given title and body.
    #[must_use]
    pub fn draft(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self { title: title.into(), content: content.into(), status: PostStatus::Draft }
    }
}

/// Partial post update; unset fields are left alone by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PostStatus>,
}

pub struct PostsApi<'a> {
    client: &'a AuthenticatedClient,
}

impl<'a> PostsApi<'a> {
    #[must_use]
    pub fn new(client: &'a AuthenticatedClient) -> Self {
        Self { client }
    }

    /// # Errors
    ///
    /// Any [`ClientError`] from the request or decoding.
    pub async fn list(&self) -> Result<Vec<Post>, ClientError> {
        self.client.get_json(POSTS_PATH).await
    }

    /// # Errors
    ///
    /// `Validation` if the title is blank; otherwise request errors.
    pub async fn create(&self, post: &NewPost) -> Result<(), ClientError> {
        if post.title.trim().is_empty() {
            return Err(ClientError::Validation("Title is required".into()));
        }
        self.client.send(&RequestDescriptor::post(POSTS_PATH).json(post)?).await?;
        tracing::info!(title = %post.title, status = ?post.status, "post created");
        Ok(())
    }

    /// # Errors
    ///
    /// `Validation` for an empty id or a blank replacement title; otherwise
    /// request errors.
    pub async fn update(&self, id: &str, update: &PostUpdate) -> Result<(), ClientError> {
        let path = item_path(POSTS_PATH, id)?;
        if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ClientError::Validation("Title is required".into()));
        }
        self.client.send(&RequestDescriptor::put(path).json(update)?).await?;
        Ok(())
    }

    /// Flip a post between draft and published. Returns the new status.
    ///
    /// # Errors
    ///
    /// As [`PostsApi::update`].
    pub async fn toggle_publish(&self, post: &Post) -> Result<PostStatus, ClientError> {
        let status = post.status.toggled();
        self.update(&post.id, &PostUpdate { status: Some(status), ..PostUpdate::default() }).await?;
        tracing::info!(post = %post.id, ?status, "post status changed");
        Ok(status)
    }

    /// # Errors
    ///
    /// `Validation` for an empty id; otherwise request errors.
    pub async fn delete(&self, id: &str) -> Result<(), ClientError> {
        self.client.send(&RequestDescriptor::delete(item_path(POSTS_PATH, id)?)).await?;
        tracing::info!(post = id, "post deleted");
        Ok(())
    }
}

// =============================================================================
// USERS
// =============================================================================

#[derive(Serialize)]
struct RoleChange {
    role: Role,
}

pub struct UsersApi<'a> {
    client: &'a AuthenticatedClient,
}

impl<'a> UsersApi<'a> {
    #[must_use]
    pub fn new(client: &'a AuthenticatedClient) -> Self {
        Self { client }
    }

    /// # Errors
    ///
    /// Any [`ClientError`] from the request or decoding.
    pub async fn list(&self) -> Result<Vec<Identity>, ClientError> {
        self.client.get_json(USERS_PATH).await
    }

    /// # Errors
    ///
    /// `Validation` for an empty id; otherwise request errors.
    pub async fn change_role(&self, id: &str, role: Role) -> Result<(), ClientError> {
        let request = RequestDescriptor::put(item_path(USERS_PATH, id)?).json(&RoleChange { role })?;
        self.client.send(&request).await?;
        tracing::info!(user = id, %role, "role changed");
        Ok(())
    }

    /// # Errors
    ///
    /// `Validation` for an empty id; otherwise request errors.
    pub async fn delete(&self, id: &str) -> Result<(), ClientError> {
        self.client.send(&RequestDescriptor::delete(item_path(USERS_PATH, id)?)).await?;
        tracing::info!(user = id, "user deleted");
        Ok(())
    }
}

// =============================================================================
// ANALYTICS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub post_count: usize,
    pub user_count: usize,
}

/// Post and user totals, fetched concurrently.
///
/// # Errors
///
/// The first failure of either listing.
pub async fn analytics(client: &AuthenticatedClient) -> Result<Analytics, ClientError> {
    let posts = PostsApi::new(client);
    let users = UsersApi::new(client);
    let (posts, users) = tokio::join!(posts.list(), users.list());
    Ok(Analytics { post_count: posts?.len(), user_count: users?.len() })
}

fn item_path(collection: &str, id: &str) -> Result<String, ClientError> {
    let id = id.trim();
    if id.is_empty() || id.contains('/') {
        return Err(ClientError::Validation("A valid id is required".into()));
    }
    Ok(format!("{collection}/{id}"))
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
