//! Decides whether a failed attempt is retried and what the caller sees if not.

use std::fmt;

use common::StoreError;
use common::identity::IdentityError;

use crate::error::MutationError;

/// Which uniqueness rule a duplicate broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateField {
    Username,
    CategoryName,
    PostName,
    Other,
}

impl DuplicateField {
    /// Derive the field from a constraint name or a driver message.
    pub fn from_hint(hint: &str) -> Self {
        let hint = hint.to_ascii_lowercase();
        if hint.contains("users") && hint.contains("username") {
            DuplicateField::Username
        } else if hint.contains("categories") && hint.contains("name") {
            DuplicateField::CategoryName
        } else if hint.contains("posts") && hint.contains("name") {
            DuplicateField::PostName
        } else {
            DuplicateField::Other
        }
    }

    fn message(self) -> &'static str {
        match self {
            DuplicateField::Username => "This username is already taken",
            DuplicateField::CategoryName => "A category with this name already exists",
            DuplicateField::PostName => "A post with this name already exists",
            DuplicateField::Other => "This record already exists",
        }
    }

    fn code(self) -> &'static str {
        match self {
            DuplicateField::Username => "duplicate_username",
            DuplicateField::CategoryName => "duplicate_category_name",
            DuplicateField::PostName => "duplicate_post_name",
            DuplicateField::Other => "duplicate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RetryExhausted,
    NotFound,
    DuplicateConflict(DuplicateField),
    ValidationRejected,
    Fatal,
}

/// The error a failed mutation surfaces to its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// HTTP status code
    pub status: u16,
    pub message: String,
    /// Machine-readable code
    pub code: Option<String>,
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for ClassifiedError {}

impl ClassifiedError {
    pub fn retry_exhausted() -> Self {
        Self {
            kind: ErrorKind::RetryExhausted,
            status: 500,
            message: "The service is busy, please try again later".to_string(),
            code: Some("retry_exhausted".to_string()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            status: 404,
            message: message.into(),
            code: Some("not_found".to_string()),
        }
    }

    pub fn duplicate(field: DuplicateField) -> Self {
        Self {
            kind: ErrorKind::DuplicateConflict(field),
            status: 400,
            message: field.message().to_string(),
            code: Some(field.code().to_string()),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ValidationRejected,
            status: 400,
            message: message.into(),
            code: Some("validation_failed".to_string()),
        }
    }

    pub fn fatal() -> Self {
        Self {
            kind: ErrorKind::Fatal,
            status: 500,
            message: "Internal server error".to_string(),
            code: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Retry,
    Surface(ClassifiedError),
}

pub fn classify(error: &MutationError) -> Classification {
    use Classification::{Retry, Surface};

    match error {
        MutationError::Store(StoreError::Conflict(_) | StoreError::Timeout(_)) => Retry,
        MutationError::DeadlineExceeded(_) => Retry,

        MutationError::Store(StoreError::NotFound) => {
            Surface(ClassifiedError::not_found("Record not found"))
        }
        MutationError::NotFound(what) => Surface(ClassifiedError::not_found(format!("{what} not found"))),
        MutationError::Identity(IdentityError::NotFound(_)) => {
            Surface(ClassifiedError::not_found("User not found"))
        }

        MutationError::Store(StoreError::UniqueViolation {
            constraint,
            message,
        }) => {
            let hint = constraint.as_deref().unwrap_or(message);
            Surface(ClassifiedError::duplicate(DuplicateField::from_hint(hint)))
        }
        MutationError::Identity(IdentityError::AlreadyExists(_)) => {
            Surface(ClassifiedError::duplicate(DuplicateField::Other))
        }

        MutationError::Validation(message) => Surface(ClassifiedError::validation(message.clone())),

        _ => Surface(ClassifiedError::fatal()),
    }
}

/// Retry only while attempts remain; a retryable failure on the last
/// attempt becomes [`ErrorKind::RetryExhausted`]. `attempt` is 0-based.
pub fn decide(attempt: u32, max_retries: u32, classification: Classification) -> Classification {
    match classification {
        Classification::Retry if attempt + 1 < max_retries.max(1) => Classification::Retry,
        Classification::Retry => Classification::Surface(ClassifiedError::retry_exhausted()),
        surfaced => surfaced,
    }
}
