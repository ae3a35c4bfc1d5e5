//! Input checks shared by the mutation workflows.

use mutation::MutationError;
use once_cell::sync::Lazy;
use regex::Regex;

static SLUG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$")
        .unwrap_or_else(|e| panic!("invalid slug pattern: {e}"))
});

static USERNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_]{3,30}$")
        .unwrap_or_else(|e| panic!("invalid username pattern: {e}"))
});

pub const MAX_TEXT_LEN: usize = 200;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

pub fn required(field: &str, value: &str) -> Result<(), MutationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MutationError::validation(format!("{field} is required")));
    }
    if trimmed.chars().count() > MAX_TEXT_LEN {
        return Err(MutationError::validation(format!(
            "{field} must be at most {MAX_TEXT_LEN} characters"
        )));
    }
    Ok(())
}

pub fn slug(field: &str, value: &str) -> Result<(), MutationError> {
    required(field, value)?;
    if !SLUG.is_match(value) {
        return Err(MutationError::validation(format!(
            "{field} may only contain lowercase letters, digits and single dashes"
        )));
    }
    Ok(())
}

pub fn username(value: &str) -> Result<(), MutationError> {
    if !USERNAME.is_match(value) {
        return Err(MutationError::validation(
            "username must be 3 to 30 letters, digits or underscores",
        ));
    }
    Ok(())
}

pub fn password(value: &str) -> Result<(), MutationError> {
    let len = value.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(MutationError::validation(format!(
            "password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// `Some("")` and whitespace collapse to `None`.
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugs() {
        assert!(slug("name", "hello-world-2").is_ok());
        assert!(slug("name", "Hello").is_err());
        assert!(slug("name", "a--b").is_err());
        assert!(slug("name", "").is_err());
    }

    #[test]
    fn test_usernames_and_passwords() {
        assert!(username("ada_lovelace").is_ok());
        assert!(username("ab").is_err());
        assert!(username("no spaces").is_err());
        assert!(password("short").is_err());
        assert!(password("long enough").is_ok());
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  ")), None);
        assert_eq!(non_empty(Some(" c1 ")), Some("c1".to_string()));
        assert_eq!(non_empty(None), None);
    }
}
