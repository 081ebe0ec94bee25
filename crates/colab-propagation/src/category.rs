//! Category labeler
//!
//! A category set on an entry overrides whatever it would inherit; an entry
//! without one shows the nearest explicit value upstream.

use crate::error::EngineError;
use colab_hierarchy::Node;
use colab_resource::{AbstractResourceId, ResourceStore};
use std::collections::{BTreeSet, VecDeque};

/// Trim a category name; blank means none
///
/// # Errors
/// `DataIntegrity` for names longer than `max_len` characters
pub fn normalize(name: Option<&str>, max_len: usize) -> Result<Option<String>, EngineError> {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if name.chars().count() > max_len {
        return Err(EngineError::integrity(format!(
            "category name exceeds {max_len} characters"
        )));
    }
    Ok(Some(name.to_owned()))
}

/// Explicit category of `id`, or the nearest one upstream
///
/// # Errors
/// Unknown id or a broken chain
pub fn effective_category(
    store: &ResourceStore,
    id: AbstractResourceId,
) -> Result<Option<&str>, EngineError> {
    Ok(store.chain(id)?.into_iter().find_map(|entry| entry.category()))
}

/// Distinct effective categories of the entries anchored at `node`, sorted
///
/// # Errors
/// Broken chain
pub fn list_categories(store: &ResourceStore, node: Node) -> Result<Vec<String>, EngineError> {
    let mut names = BTreeSet::new();
    for id in store.entries_at(node) {
        if let Some(name) = effective_category(store, id)? {
            names.insert(name.to_owned());
        }
    }
    Ok(names.into_iter().collect())
}

/// Rewrite `old` to `new` on the entries at `anchor` showing `old`, then on
/// every downstream entry still showing it. Entries with another explicit
/// value keep it, along with everything inheriting from them.
pub(crate) fn rename(
    store: &mut ResourceStore,
    anchor: Node,
    old: &str,
    new: &str,
    max_len: usize,
) -> Result<usize, EngineError> {
    let Some(new) = normalize(Some(new), max_len)? else {
        return Err(EngineError::integrity("category name must not be empty"));
    };
    let Some(old) = normalize(Some(old), usize::MAX)? else {
        return Ok(0);
    };
    if old == new {
        return Ok(0);
    }

    let mut renamed = 0;
    let mut queue = VecDeque::new();
    for id in store.entries_at(anchor) {
        if effective_category(store, id)? == Some(old.as_str()) {
            store.set_category(id, Some(new.clone()))?;
            renamed += 1;
            queue.extend(store.downstream(id));
        }
    }

    while let Some(id) = queue.pop_front() {
        let explicit = store.get(id)?.category().map(str::to_owned);
        match explicit {
            Some(explicit) if explicit == old => {
                store.set_category(id, Some(new.clone()))?;
                renamed += 1;
            }
            Some(_) => continue,
            None => {}
        }
        queue.extend(store.downstream(id));
    }
    Ok(renamed)
}
