//! Image references embedded in entity content.
//!
//! Posts carry markdown bodies whose images point either at our own storage
//! bucket or somewhere else entirely. Only managed references are ever moved;
//! everything here works on plain strings and is free of I/O.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::layout::{STAGING_PREFIX, USERS_PREFIX};

/// `![alt](url)` and `![alt](url "title")`
static MARKDOWN_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"!\[[^\]]*\]\(\s*<?([^\s)<>]+)>?(?:\s+"[^"]*")?\s*\)"#)
        .unwrap_or_else(|e| panic!("invalid markdown image pattern: {e}"))
});

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("cannot rewrite {previous} references with {next} replacements")]
    LengthMismatch { previous: usize, next: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Staged upload that still has to be moved into place
    Temporary,
    /// Managed object already at its destination
    DestinationConfirmed,
    /// Not served from our bucket; never touched
    Foreign,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub url: String,
    pub kind: ReferenceKind,
}

/// Image URLs of a markdown document in first-occurrence order, duplicates kept.
pub fn extract_references(content: &str) -> Vec<String> {
    MARKDOWN_IMAGE
        .captures_iter(content)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn is_managed(url: &str, bucket: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let host_matches = parsed
        .host_str()
        .is_some_and(|host| host == bucket || host.ends_with(&format!(".{bucket}")));
    host_matches
        || parsed
            .path_segments()
            .is_some_and(|mut segments| segments.any(|segment| segment == bucket))
}

/// Keep the URLs served from `bucket`, in order.
pub fn filter_managed_storage(urls: &[String], bucket: &str) -> Vec<String> {
    urls.iter()
        .filter(|url| is_managed(url, bucket))
        .cloned()
        .collect()
}

/// Bucket-relative object path of a URL.
///
/// Scheme and host are dropped and the path is cut at the first `users` or
/// `temp` segment. Paths without either segment are returned whole. Applying
/// this to its own output returns the output unchanged.
pub fn to_relative_path(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    };
    let path = path.trim_start_matches('/');
    let segments: Vec<&str> = path.split('/').collect();
    match segments
        .iter()
        .position(|segment| *segment == USERS_PREFIX || *segment == STAGING_PREFIX)
    {
        Some(start) => segments[start..].join("/"),
        None => path.to_string(),
    }
}

pub fn classify_reference(url: &str, bucket: &str) -> ImageReference {
    let kind = if !is_managed(url, bucket) {
        ReferenceKind::Foreign
    } else if to_relative_path(url).starts_with(&format!("{STAGING_PREFIX}/")) {
        ReferenceKind::Temporary
    } else {
        ReferenceKind::DestinationConfirmed
    };
    ImageReference {
        url: url.to_string(),
        kind,
    }
}

/// Relative paths of the staged uploads among `urls`, deduplicated in order.
pub fn staged_paths(urls: &[String], bucket: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for url in urls {
        if classify_reference(url, bucket).kind == ReferenceKind::Temporary {
            let path = to_relative_path(url);
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths
}

/// Replace `previous[i]` with `next[i]`, pairwise and in order.
///
/// Each pair replaces the first occurrence at or after the end of the
/// previous substitution, so repeated URLs are rewritten one occurrence per
/// pair. A pair whose URL no longer occurs is skipped.
pub fn rewrite_references(
    content: &str,
    previous: &[String],
    next: &[String],
) -> Result<String, ReferenceError> {
    if previous.len() != next.len() {
        return Err(ReferenceError::LengthMismatch {
            previous: previous.len(),
            next: next.len(),
        });
    }

    let mut output = String::with_capacity(content.len());
    let mut rest = content;
    for (from, to) in previous.iter().zip(next) {
        if from.is_empty() {
            continue;
        }
        if let Some(at) = rest.find(from.as_str()) {
            output.push_str(&rest[..at]);
            output.push_str(to);
            rest = &rest[at + from.len()..];
        }
    }
    output.push_str(rest);
    Ok(output)
}
