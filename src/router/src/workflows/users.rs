use api::{CreateUserRequest, UpdateUserRequest};
use async_trait::async_trait;
use common::DbTx;
use common::identity::{IdentityError, UserRecord, UserRecordUpdate};
use common::model::{User, new_id, now_rfc3339, private_path};
use common::repository::users;
use common::search::PartialUpdate;
use mutation::layout;
use mutation::{MutationError, RollbackRegistry, UnitOfWork};
use serde_json::Value;

use super::media;
use super::merge_optional;
use crate::Services;
use crate::validation;

async fn load(tx: &mut DbTx, tenant: &str, id: &str) -> Result<User, MutationError> {
    users::find(tx, tenant, id)
        .await?
        .ok_or_else(|| MutationError::not_found("User"))
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    services: Services,
    tenant: String,
    id: String,
    request: CreateUserRequest,
}

impl CreateUser {
    pub fn new(services: Services, tenant: impl Into<String>, request: CreateUserRequest) -> Self {
        Self {
            services,
            tenant: tenant.into(),
            id: new_id(),
            request,
        }
    }
}

#[async_trait]
impl UnitOfWork<DbTx> for CreateUser {
    type Output = User;

    async fn run(&self, tx: &mut DbTx, rollback: &mut RollbackRegistry) -> Result<User, MutationError> {
        let request = &self.request;
        validation::username(&request.username)?;
        validation::required("displayName", &request.display_name)?;

        let services = &self.services;
        let avatar = services
            .mover
            .relocate(
                "promote-avatar",
                &media::staged(request.avatar_url.as_deref(), services.urls.bucket()),
                &layout::avatar(&self.id),
                rollback,
            )
            .await?;

        let now = now_rfc3339();
        let user = User {
            id: self.id.clone(),
            tenant_id: self.tenant.clone(),
            username: request.username.clone(),
            display_name: request.display_name.trim().to_string(),
            bio: validation::non_empty(request.bio.as_deref()),
            avatar_url: media::resolve_url(request.avatar_url.as_deref(), &avatar, &services.urls),
            password_changed_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        users::insert(tx, &user).await?;

        services
            .documents
            .write("mirror-user", &user.mirror_path(), &user.mirror_document(), rollback)
            .await?;

        let identity = services.identity.clone();
        identity
            .create_user_record(UserRecord {
                uid: user.id.clone(),
                display_name: Some(user.display_name.clone()),
                photo_url: user.avatar_url.clone(),
                disabled: false,
            })
            .await?;
        let uid = user.id.clone();
        rollback.register("create-identity", move || async move {
            identity.delete_user_record(&uid).await
        })?;

        services
            .search
            .create("index-user", &services.indexes.users, user.search_record(), rollback)
            .await?;
        Ok(user)
    }
}

#[derive(Debug, Clone)]
pub struct UpdateUser {
    services: Services,
    tenant: String,
    id: String,
    request: UpdateUserRequest,
}

impl UpdateUser {
    pub fn new(
        services: Services,
        tenant: impl Into<String>,
        id: impl Into<String>,
        request: UpdateUserRequest,
    ) -> Self {
        Self {
            services,
            tenant: tenant.into(),
            id: id.into(),
            request,
        }
    }
}

#[async_trait]
impl UnitOfWork<DbTx> for UpdateUser {
    type Output = User;

    async fn run(&self, tx: &mut DbTx, rollback: &mut RollbackRegistry) -> Result<User, MutationError> {
        let request = &self.request;
        let mut user = load(tx, &self.tenant, &self.id).await?;

        if let Some(username) = &request.username {
            validation::username(username)?;
            user.username = username.clone();
        }
        if let Some(display_name) = &request.display_name {
            validation::required("displayName", display_name)?;
            user.display_name = display_name.trim().to_string();
        }
        user.bio = merge_optional(request.bio.as_deref(), user.bio.take());

        let services = &self.services;
        let bucket = services.urls.bucket();
        let prefix = layout::avatar(&user.id);
        let avatar = merge_optional(request.avatar_url.as_deref(), user.avatar_url.clone());
        let stale = match media::placed_under(user.avatar_url.as_deref(), bucket, &prefix) {
            Some(path) if media::placed_under(avatar.as_deref(), bucket, &prefix).as_ref() != Some(&path) => {
                vec![path]
            }
            _ => Vec::new(),
        };

        let promoted = services
            .mover
            .relocate("promote-avatar", &media::staged(avatar.as_deref(), bucket), &prefix, rollback)
            .await?;
        services
            .mover
            .relocate(
                "demote-avatar",
                &media::not_replaced(stale, &promoted),
                &layout::staging(),
                rollback,
            )
            .await?;

        user.avatar_url = media::resolve_url(avatar.as_deref(), &promoted, &services.urls);
        user.updated_at = now_rfc3339();
        users::update(tx, &user).await?;

        services
            .documents
            .write("mirror-user", &user.mirror_path(), &user.mirror_document(), rollback)
            .await?;

        let identity = services.identity.clone();
        let snapshot = identity
            .get_user_record(&user.id)
            .await?
            .ok_or_else(|| IdentityError::NotFound(user.id.clone()))?;
        identity
            .update_user_record(
                &user.id,
                UserRecordUpdate {
                    display_name: Some(user.display_name.clone()),
                    photo_url: Some(user.avatar_url.clone()),
                    ..Default::default()
                },
            )
            .await?;
        rollback.register("update-identity", move || async move {
            identity
                .update_user_record(&snapshot.uid, UserRecordUpdate::restoring(&snapshot))
                .await
                .map(|_| ())
        })?;

        services
            .search
            .update(
                "reindex-user",
                &services.indexes.users,
                vec![PartialUpdate::new(user.id.clone(), user.search_record().fields)],
                rollback,
            )
            .await?;
        Ok(user)
    }
}

/// Removes a user and parks their media back in staging.
///
/// The identity record is disabled rather than deleted, as the last step.
#[derive(Debug, Clone)]
pub struct DeleteUser {
    services: Services,
    tenant: String,
    id: String,
}

impl DeleteUser {
    pub fn new(services: Services, tenant: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            services,
            tenant: tenant.into(),
            id: id.into(),
        }
    }
}

#[async_trait]
impl UnitOfWork<DbTx> for DeleteUser {
    type Output = ();

    async fn run(&self, tx: &mut DbTx, rollback: &mut RollbackRegistry) -> Result<(), MutationError> {
        let user = load(tx, &self.tenant, &self.id).await?;
        let services = &self.services;

        services
            .mover
            .relocate_tree(
                "demote-media",
                &layout::user_root(&user.id),
                &layout::retired(&user.id),
                rollback,
            )
            .await?;

        services
            .documents
            .remove("remove-mirror", &user.mirror_path(), rollback)
            .await?;
        services
            .documents
            .remove("remove-private", &user.private_path(), rollback)
            .await?;
        services
            .search
            .delete("unindex-user", &services.indexes.users, vec![user.id.clone()], rollback)
            .await?;
        users::delete(tx, &self.tenant, &user.id).await?;

        let identity = services.identity.clone();
        if let Some(snapshot) = identity.get_user_record(&user.id).await? {
            if !snapshot.disabled {
                identity
                    .update_user_record(
                        &user.id,
                        UserRecordUpdate {
                            disabled: Some(true),
                            ..Default::default()
                        },
                    )
                    .await?;
                rollback.register("disable-identity", move || async move {
                    identity
                        .update_user_record(&snapshot.uid, UserRecordUpdate::restoring(&snapshot))
                        .await
                        .map(|_| ())
                })?;
            }
        }
        Ok(())
    }
}

/// Sets a new password on the identity record.
///
/// The identity update cannot be undone, so it runs after every other step.
pub struct ChangePassword {
    services: Services,
    tenant: String,
    id: String,
    password: String,
}

impl std::fmt::Debug for ChangePassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangePassword")
            .field("tenant", &self.tenant)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl ChangePassword {
    pub fn new(
        services: Services,
        tenant: impl Into<String>,
        id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            services,
            tenant: tenant.into(),
            id: id.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl UnitOfWork<DbTx> for ChangePassword {
    type Output = ();

    async fn run(&self, tx: &mut DbTx, _rollback: &mut RollbackRegistry) -> Result<(), MutationError> {
        validation::password(&self.password)?;
        let user = load(tx, &self.tenant, &self.id).await?;

        users::set_password_changed(tx, &self.tenant, &user.id, &now_rfc3339()).await?;

        self.services
            .identity
            .update_user_record(
                &user.id,
                UserRecordUpdate {
                    password: Some(self.password.clone()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }
}

/// Replaces the private profile document of a user.
#[derive(Debug, Clone)]
pub struct UpdatePrivateProfile {
    services: Services,
    tenant: String,
    id: String,
    profile: Value,
}

impl UpdatePrivateProfile {
    pub fn new(
        services: Services,
        tenant: impl Into<String>,
        id: impl Into<String>,
        profile: Value,
    ) -> Self {
        Self {
            services,
            tenant: tenant.into(),
            id: id.into(),
            profile,
        }
    }
}

#[async_trait]
impl UnitOfWork<DbTx> for UpdatePrivateProfile {
    type Output = Value;

    async fn run(&self, tx: &mut DbTx, rollback: &mut RollbackRegistry) -> Result<Value, MutationError> {
        if !self.profile.is_object() {
            return Err(MutationError::validation("private profile must be a JSON object"));
        }
        let user = load(tx, &self.tenant, &self.id).await?;

        self.services
            .documents
            .write("write-private", &private_path(&user.id), &self.profile, rollback)
            .await?;
        users::touch(tx, &self.tenant, &user.id, &now_rfc3339()).await?;
        Ok(self.profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RouterState;
    use crate::test_support::{TestApp, test_app};
    use common::identity::IdentityProvider;
    use mutation::{DuplicateField, ErrorKind};
    use object_store::{PutPayload, path::Path as ObjectPath};
    use serde_json::json;

    fn request(username: &str, avatar_url: Option<&str>) -> CreateUserRequest {
        CreateUserRequest {
            username: username.into(),
            display_name: "Ada Lovelace".into(),
            bio: None,
            avatar_url: avatar_url.map(str::to_string),
        }
    }

    async fn create(app: &TestApp, request: CreateUserRequest) -> Result<User, mutation::ClassifiedError> {
        app.state
            .orchestrator()
            .execute(&CreateUser::new(app.state.services().clone(), "default", request))
            .await
    }

    #[tokio::test]
    async fn test_create_promotes_avatar_and_registers_identity() {
        let app = test_app().await;
        app.objects
            .put(&ObjectPath::from("temp/me.webp"), PutPayload::from_static(b"me"))
            .await
            .unwrap();

        let user = create(
            &app,
            request("ada", Some("https://storage.test/pressroom-test/temp/me.webp")),
        )
        .await
        .unwrap();

        let expected = format!("users/{}/avatar/me.webp", user.id);
        assert_eq!(
            user.avatar_url.as_deref(),
            Some(format!("https://storage.test/pressroom-test/{expected}").as_str())
        );
        assert!(app.objects.head(&ObjectPath::from(expected.as_str())).await.is_ok());
        let record = app.identity.get_user_record(&user.id).await.unwrap().unwrap();
        assert_eq!(record.photo_url, user.avatar_url);
        assert!(app.search.get("users", &user.id).await.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_username_reverts_avatar() {
        let app = test_app().await;
        create(&app, request("ada", None)).await.unwrap();
        app.objects
            .put(&ObjectPath::from("temp/me.webp"), PutPayload::from_static(b"me"))
            .await
            .unwrap();

        let err = create(
            &app,
            request("ada", Some("https://storage.test/pressroom-test/temp/me.webp")),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::DuplicateConflict(DuplicateField::Username));
        assert_eq!(err.status, 400);
        assert!(app.objects.head(&ObjectPath::from("temp/me.webp")).await.is_ok());
        assert_eq!(app.search.len("users").await, 1);
    }

    #[tokio::test]
    async fn test_password_change_stamps_row_and_identity() {
        let app = test_app().await;
        let user = create(&app, request("ada", None)).await.unwrap();

        let short = ChangePassword::new(app.state.services().clone(), "default", user.id.clone(), "short");
        let err = app.state.orchestrator().execute(&short).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationRejected);

        let work = ChangePassword::new(
            app.state.services().clone(),
            "default",
            user.id.clone(),
            "correct horse battery",
        );
        assert!(!format!("{work:?}").contains("correct horse"));
        app.state.orchestrator().execute(&work).await.unwrap();

        assert!(
            app.identity
                .verify_password(&user.id, "correct horse battery")
                .await
                .unwrap()
        );
        let stored = users::get(app.state.database(), "default", &user.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.password_changed_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_demotes_media_and_disables_identity() {
        let app = test_app().await;
        let user = create(&app, request("ada", None)).await.unwrap();
        let avatar = format!("users/{}/avatar/me.webp", user.id);
        let cover = format!("users/{}/posts/p1/cover/me.webp", user.id);
        for path in [&avatar, &cover] {
            app.objects
                .put(&ObjectPath::from(path.as_str()), PutPayload::from(path.clone().into_bytes()))
                .await
                .unwrap();
        }
        app.state
            .orchestrator()
            .execute(&UpdatePrivateProfile::new(
                app.state.services().clone(),
                "default",
                user.id.clone(),
                json!({"email": "ada@example.com"}),
            ))
            .await
            .unwrap();

        app.state
            .orchestrator()
            .execute(&DeleteUser::new(app.state.services().clone(), "default", user.id.clone()))
            .await
            .unwrap();

        for (placed, retired) in [
            (&avatar, format!("temp/{}/avatar/me.webp", user.id)),
            (&cover, format!("temp/{}/posts/p1/cover/me.webp", user.id)),
        ] {
            let bytes = app
                .objects
                .get(&ObjectPath::from(retired.as_str()))
                .await
                .unwrap()
                .bytes()
                .await
                .unwrap();
            assert_eq!(bytes.as_ref(), placed.as_bytes());
        }
        assert!(app.objects.head(&ObjectPath::from(avatar.as_str())).await.is_err());
        let documents = app.state.services().documents.store();
        assert_eq!(documents.get_snapshot(&user.private_path()).await.unwrap(), None);
        assert_eq!(documents.get_snapshot(&user.mirror_path()).await.unwrap(), None);
        assert!(app.identity.get_user_record(&user.id).await.unwrap().unwrap().disabled);
        assert!(app.search.get("users", &user.id).await.is_none());
    }

    #[tokio::test]
    async fn test_update_with_same_named_avatar_keeps_new_upload() {
        let app = test_app().await;
        let staged_url = "https://storage.test/pressroom-test/temp/me.webp";
        app.objects
            .put(&ObjectPath::from("temp/me.webp"), PutPayload::from_static(b"first"))
            .await
            .unwrap();
        let user = create(&app, request("ada", Some(staged_url))).await.unwrap();

        app.objects
            .put(&ObjectPath::from("temp/me.webp"), PutPayload::from_static(b"second"))
            .await
            .unwrap();
        let updated = app
            .state
            .orchestrator()
            .execute(&UpdateUser::new(
                app.state.services().clone(),
                "default",
                user.id.clone(),
                UpdateUserRequest {
                    avatar_url: Some(staged_url.into()),
                    ..Default::default()
                },
            ))
            .await
            .unwrap();

        let placed = format!("users/{}/avatar/me.webp", user.id);
        assert_eq!(updated.avatar_url, user.avatar_url);
        let bytes = app
            .objects
            .get(&ObjectPath::from(placed.as_str()))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), b"second");
        assert!(app.objects.head(&ObjectPath::from("temp/me.webp")).await.is_err());
    }

    #[tokio::test]
    async fn test_private_profile_must_be_an_object() {
        let app = test_app().await;
        let user = create(&app, request("ada", None)).await.unwrap();
        let err = app
            .state
            .orchestrator()
            .execute(&UpdatePrivateProfile::new(
                app.state.services().clone(),
                "default",
                user.id,
                json!(["not", "an", "object"]),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationRejected);
    }
}
