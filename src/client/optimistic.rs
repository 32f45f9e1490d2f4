//! Optimistic updates over the query cache
//!
//! A mutation patches the cached list right away, then either invalidates
//! the list (success, so the next read refetches) or puts the snapshot back
//! (failure). The patch lives in memory only and never reaches persistent
//! storage. The list transforms are pure functions over [`Identified`]
//! records.

use std::future::Future;

use log::debug;
use serde_json::Value;

use super::ApiResult;
use crate::cache::QueryCache;
use crate::models::{Identified, RecordId, SoftDelete};

/// Run `mutation` with an optimistic patch of the list cached at `key`.
///
/// `apply` receives the cached list (empty when nothing is cached) and
/// returns the list to show while the mutation is in flight. On failure the
/// previous entry is restored with its original age and invalidation mark,
/// or removed if there was none.
pub async fn optimistic_update<F, Fut, R>(
    cache: &QueryCache,
    key: &str,
    apply: Option<F>,
    mutation: Fut,
) -> ApiResult<R>
where
    F: FnOnce(Vec<Value>) -> Vec<Value>,
    Fut: Future<Output = ApiResult<R>>,
{
    let snapshot = cache.snapshot(key);

    if let Some(apply) = apply {
        let current = snapshot
            .as_ref()
            .and_then(|s| s.data().as_array())
            .cloned()
            .unwrap_or_default();
        cache.set_transient(key, Value::Array(apply(current)));
        debug!("Applied optimistic update to {}", key);
    }

    match mutation.await {
        Ok(result) => {
            cache.invalidate(key);
            Ok(result)
        }
        Err(err) => {
            debug!("Mutation failed, rolling back {}", key);
            match snapshot {
                Some(previous) => cache.restore(key, previous),
                None => cache.remove(key),
            }
            Err(err)
        }
    }
}

/// Append `item` to the list
pub fn add_to_list<T: Clone>(list: &[T], item: T) -> Vec<T> {
    let mut next = list.to_vec();
    next.push(item);
    next
}

/// Replace the record with `id` by `update(record)`
pub fn update_in_list<T, F>(list: &[T], id: &RecordId, update: F) -> Vec<T>
where
    T: Identified + Clone,
    F: Fn(&T) -> T,
{
    list.iter()
        .map(|item| if item.has_id(id) { update(item) } else { item.clone() })
        .collect()
}

pub fn remove_from_list<T: Identified + Clone>(list: &[T], id: &RecordId) -> Vec<T> {
    list.iter().filter(|item| !item.has_id(id)).cloned().collect()
}

/// Mark the record with `id` deleted at `deleted_at`
pub fn soft_delete<T>(list: &[T], id: &RecordId, deleted_at: &str) -> Vec<T>
where
    T: Identified + SoftDelete + Clone,
{
    update_in_list(list, id, |item| {
        let mut next = item.clone();
        next.set_deleted(Some(deleted_at.to_string()));
        next
    })
}

/// Clear the deletion mark of the record with `id`
pub fn restore<T>(list: &[T], id: &RecordId) -> Vec<T>
where
    T: Identified + SoftDelete + Clone,
{
    update_in_list(list, id, |item| {
        let mut next = item.clone();
        next.set_deleted(None);
        next
    })
}

/// Shallow-merge the fields of `patch` into a JSON object
pub fn merge_fields(record: &Value, patch: &Value) -> Value {
    let mut merged = record.clone();
    if let (Value::Object(target), Value::Object(fields)) = (&mut merged, patch) {
        for (name, value) in fields {
            target.insert(name.clone(), value.clone());
        }
    }
    merged
}
