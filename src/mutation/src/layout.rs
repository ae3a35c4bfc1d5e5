//! Object storage layout.
//!
//! Uploads are staged under `temp/`. Mutations promote them to their final
//! place under `users/{uid}/` and demote them back to `temp/` when an entity
//! stops referencing them.

pub const STAGING_PREFIX: &str = "temp";
pub const USERS_PREFIX: &str = "users";

pub fn staging() -> String {
    STAGING_PREFIX.to_string()
}

pub fn user_root(uid: &str) -> String {
    format!("{USERS_PREFIX}/{uid}")
}

pub fn avatar(uid: &str) -> String {
    format!("{USERS_PREFIX}/{uid}/avatar")
}

pub fn category_cover(uid: &str, category_id: &str) -> String {
    format!("{USERS_PREFIX}/{uid}/categories/{category_id}/cover")
}

pub fn post_cover(uid: &str, post_id: &str) -> String {
    format!("{USERS_PREFIX}/{uid}/posts/{post_id}/cover")
}

pub fn post_images(uid: &str, post_id: &str) -> String {
    format!("{USERS_PREFIX}/{uid}/posts/{post_id}/images")
}

/// Staging area for everything a deleted user left behind.
pub fn retired(uid: &str) -> String {
    format!("{STAGING_PREFIX}/{uid}")
}

/// `source` moved from under `root` to the same relative path under `prefix`.
pub fn rebase(source: &str, root: &str, prefix: &str) -> String {
    let root = root.trim_end_matches('/');
    let relative = source
        .strip_prefix(root)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(source);
    format!("{}/{}", prefix.trim_end_matches('/'), relative)
}

/// Final name of an object moved into `prefix`, keeping its file name.
pub fn destination(source: &str, prefix: &str) -> String {
    let file_name = source.rsplit('/').next().unwrap_or(source);
    format!("{}/{}", prefix.trim_end_matches('/'), file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(post_cover("u1", "p1"), "users/u1/posts/p1/cover");
        assert_eq!(post_images("u1", "p1"), "users/u1/posts/p1/images");
        assert_eq!(category_cover("u1", "c1"), "users/u1/categories/c1/cover");
        assert_eq!(avatar("u1"), "users/u1/avatar");
        assert_eq!(user_root("u1"), "users/u1");
    }

    #[test]
    fn test_destination_keeps_file_name() {
        assert_eq!(
            destination("temp/abc.webp", "users/u1/avatar/"),
            "users/u1/avatar/abc.webp"
        );
        assert_eq!(destination("abc.webp", "temp"), "temp/abc.webp");
    }

    #[test]
    fn test_rebase_keeps_relative_path() {
        assert_eq!(retired("u1"), "temp/u1");
        assert_eq!(
            rebase("users/u1/posts/p1/cover/a.png", "users/u1", "temp/u1"),
            "temp/u1/posts/p1/cover/a.png"
        );
        assert_eq!(
            rebase("users/u1/avatar/a.png", "users/u1/", "temp/u1"),
            "temp/u1/avatar/a.png"
        );
    }
}
