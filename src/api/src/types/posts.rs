use common::model::Post;
use serde::{Deserialize, Serialize};

/// Request body for creating a post
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub author_id: String,
    pub category_id: Option<String>,
    pub title: String,
    /// URL slug, unique per tenant
    pub name: String,
    /// Markdown body; staged images are moved into place
    #[serde(default)]
    pub content: String,
    /// Staged or placed cover image URL
    pub cover_image: Option<String>,
    #[serde(default)]
    pub published: bool,
}

/// Request body for updating a post; absent fields are left unchanged.
///
/// An empty `categoryId` detaches the post from its category and an empty
/// `coverImage` removes the cover.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub category_id: Option<String>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub content: Option<String>,
    pub cover_image: Option<String>,
    pub published: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: String,
    pub author_id: String,
    pub category_id: Option<String>,
    pub title: String,
    pub name: String,
    pub content: String,
    pub cover_image: Option<String>,
    pub published: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Post> for PostResponse {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            author_id: post.author_id,
            category_id: post.category_id,
            title: post.title,
            name: post.name,
            content: post.content,
            cover_image: post.cover_image,
            published: post.published,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPostsResponse {
    pub posts: Vec<PostResponse>,
}
