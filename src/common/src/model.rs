//! Entity records persisted by the repositories.
//!
//! Timestamps are RFC 3339 strings, matching the column representation.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::search::{Fields, SearchRecord};

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: String,
    pub tenant_id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Category {
    pub fn search_record(&self) -> SearchRecord {
        SearchRecord::new(
            self.id.clone(),
            fields(json!({
                "tenantId": self.tenant_id,
                "ownerId": self.owner_id,
                "name": self.name,
                "description": self.description,
                "coverImage": self.cover_image,
                "updatedAt": self.updated_at,
            })),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: String,
    pub tenant_id: String,
    pub author_id: String,
    pub category_id: Option<String>,
    pub title: String,
    /// URL slug, unique per tenant
    pub name: String,
    /// Markdown body
    pub content: String,
    pub cover_image: Option<String>,
    pub published: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Post {
    pub fn search_record(&self) -> SearchRecord {
        SearchRecord::new(
            self.id.clone(),
            fields(json!({
                "tenantId": self.tenant_id,
                "authorId": self.author_id,
                "categoryId": self.category_id,
                "title": self.title,
                "name": self.name,
                "content": self.content,
                "coverImage": self.cover_image,
                "published": self.published,
                "updatedAt": self.updated_at,
            })),
        )
    }

    /// Metadata mirrored into the document store.
    pub fn mirror_document(&self) -> Value {
        json!({
            "id": self.id,
            "tenantId": self.tenant_id,
            "title": self.title,
            "name": self.name,
            "coverImage": self.cover_image,
            "published": self.published,
            "updatedAt": self.updated_at,
        })
    }

    pub fn mirror_path(&self) -> String {
        format!("users/{}/posts/{}", self.author_id, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Identity provider uid
    pub id: String,
    pub tenant_id: String,
    pub username: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub password_changed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn search_record(&self) -> SearchRecord {
        SearchRecord::new(
            self.id.clone(),
            fields(json!({
                "tenantId": self.tenant_id,
                "username": self.username,
                "displayName": self.display_name,
                "bio": self.bio,
                "avatarUrl": self.avatar_url,
            })),
        )
    }

    pub fn mirror_document(&self) -> Value {
        json!({
            "uid": self.id,
            "tenantId": self.tenant_id,
            "username": self.username,
            "displayName": self.display_name,
            "avatarUrl": self.avatar_url,
        })
    }

    pub fn mirror_path(&self) -> String {
        format!("users/{}", self.id)
    }

    pub fn private_path(&self) -> String {
        private_path(&self.id)
    }
}

pub fn private_path(uid: &str) -> String {
    format!("privates/{uid}")
}
