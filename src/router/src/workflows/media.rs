//! Image bookkeeping shared by the entity workflows.

use common::storage::PublicUrls;
use futures::future::join_all;
use mutation::references::{
    ReferenceKind, classify_reference, rewrite_references, to_relative_path,
};
use mutation::{MovedObject, MutationError, ObjectMover, RollbackRegistry};

/// One group of objects moved into a common prefix as a named step.
#[derive(Debug, Clone)]
pub struct Batch {
    pub step: &'static str,
    pub sources: Vec<String>,
    pub destination: String,
}

impl Batch {
    pub fn new(step: &'static str, sources: Vec<String>, destination: impl Into<String>) -> Self {
        Self {
            step,
            sources,
            destination: destination.into(),
        }
    }
}

/// Run every batch concurrently and register the revert of each before
/// failing on any of them, so nothing that moved is left behind.
pub async fn move_batches<const N: usize>(
    mover: &ObjectMover,
    batches: [Batch; N],
    rollback: &mut RollbackRegistry,
) -> Result<[Vec<MovedObject>; N], MutationError> {
    let mut outcomes = join_all(
        batches
            .iter()
            .map(|batch| mover.move_batch(&batch.sources, &batch.destination)),
    )
    .await
    .into_iter();

    let registered: [Result<Vec<MovedObject>, MutationError>; N] = std::array::from_fn(|i| {
        let outcome = outcomes.next().unwrap_or_default();
        mover.register_outcome(batches[i].step, &batches[i].destination, outcome, rollback)
    });

    let mut moved: [Vec<MovedObject>; N] = std::array::from_fn(|_| Vec::new());
    for (slot, result) in moved.iter_mut().zip(registered) {
        *slot = result?;
    }
    Ok(moved)
}

/// Relative path of `url` when it is a staged upload in our bucket.
pub fn staged(url: Option<&str>, bucket: &str) -> Vec<String> {
    match url {
        Some(url) if classify_reference(url, bucket).kind == ReferenceKind::Temporary => {
            vec![to_relative_path(url)]
        }
        _ => Vec::new(),
    }
}

/// Relative path of `url` when it is a placed object under `prefix`.
pub fn placed_under(url: Option<&str>, bucket: &str, prefix: &str) -> Option<String> {
    let url = url?;
    if classify_reference(url, bucket).kind != ReferenceKind::DestinationConfirmed {
        return None;
    }
    let path = to_relative_path(url);
    path.starts_with(&format!("{prefix}/")).then_some(path)
}

/// Placed objects under `prefix` among `urls`, deduplicated in order.
pub fn placed_paths_under(urls: &[String], bucket: &str, prefix: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for url in urls {
        if let Some(path) = placed_under(Some(url), bucket, prefix) {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths
}

/// Placed objects of `previous` that `current` no longer references.
pub fn dropped(previous: Vec<String>, current: &[String]) -> Vec<String> {
    previous
        .into_iter()
        .filter(|path| !current.contains(path))
        .collect()
}

/// Stale objects that no promotion has overwritten.
///
/// Promotions run first, so a staged upload that reuses the file name of the
/// object it replaces already sits at that path and must stay there.
pub fn not_replaced<'a>(
    stale: Vec<String>,
    promoted: impl IntoIterator<Item = &'a MovedObject>,
) -> Vec<String> {
    let placed: Vec<&str> = promoted.into_iter().map(|moved| moved.to.as_str()).collect();
    stale
        .into_iter()
        .filter(|path| !placed.contains(&path.as_str()))
        .collect()
}

/// Final URL of an image field after promotion.
///
/// Blank input clears the field; a promoted object gets its public URL and
/// anything else is kept as given.
pub fn resolve_url(url: Option<&str>, promoted: &[MovedObject], urls: &PublicUrls) -> Option<String> {
    let url = url.map(str::trim).filter(|u| !u.is_empty())?;
    match promoted.first() {
        Some(moved) => Some(urls.url_for(&moved.to)),
        None => Some(url.to_string()),
    }
}

/// Point every staged reference of `content` at its promoted object.
pub fn rewrite_content(
    content: &str,
    references: &[String],
    promoted: &[MovedObject],
    urls: &PublicUrls,
) -> Result<String, MutationError> {
    if promoted.is_empty() {
        return Ok(content.to_string());
    }

    let next: Vec<String> = references
        .iter()
        .map(|reference| {
            let path = to_relative_path(reference);
            promoted
                .iter()
                .find(|moved| moved.from == path)
                .filter(|_| classify_reference(reference, urls.bucket()).kind == ReferenceKind::Temporary)
                .map(|moved| urls.url_for(&moved.to))
                .unwrap_or_else(|| reference.clone())
        })
        .collect();
    Ok(rewrite_references(content, references, &next)?)
}
