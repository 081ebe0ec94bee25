//! Structural verification of a [`ResourceStore`]

use crate::error::StoreError;
use crate::model::AbstractResource;
use crate::store::ResourceStore;
use serde::Serialize;
use std::collections::BTreeMap;

/// Counts gathered by a successful [`ResourceStore::verify_integrity`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub resources: usize,
    pub refs: usize,
    /// Entries in the longest chain, resource included
    pub longest_chain: usize,
}

impl ResourceStore {
    /// Check every chain and index.
    ///
    /// - every chain ends at a resource, without dangling or looping `target`s
    /// - at most one entry per lineage per node
    /// - owner, downstream and document indexes match the entries
    ///
    /// # Errors
    /// The first violation found
    pub fn verify_integrity(&self) -> Result<IntegrityReport, StoreError> {
        let mut report = IntegrityReport::default();

        for entry in self.entries.values() {
            let id = entry.id();
            let indexed = self
                .by_owner
                .get(&entry.owner())
                .is_some_and(|ids| ids.contains(&id));
            if !indexed {
                return Err(StoreError::IndexMismatch(format!(
                    "{id} missing from the owner index of {}",
                    entry.owner()
                )));
            }

            match entry {
                AbstractResource::Resource(r) => {
                    report.resources += 1;
                    for document in r.documents() {
                        if self.documents.get(document) != Some(&id) {
                            return Err(StoreError::IndexMismatch(format!(
                                "{document} not indexed to {id}"
                            )));
                        }
                    }
                }
                AbstractResource::Ref(r) => {
                    report.refs += 1;
                    let linked = self
                        .downstream
                        .get(&r.target())
                        .is_some_and(|ids| ids.contains(&id));
                    if !linked {
                        return Err(StoreError::IndexMismatch(format!(
                            "{id} missing from the downstream index of {}",
                            r.target()
                        )));
                    }
                }
            }

            report.longest_chain = report.longest_chain.max(self.chain(id)?.len());
        }

        let mut owned = 0;
        for node in self.by_owner.keys() {
            let mut lineages = BTreeMap::new();
            for id in self.entries_at(*node) {
                let entry = self.get(id)?;
                if entry.owner() != *node {
                    return Err(StoreError::IndexMismatch(format!(
                        "{id} indexed under {node} but anchored at {}",
                        entry.owner()
                    )));
                }
                let resource = self.resolve(id)?;
                if let Some(existing) = lineages.insert(resource, id) {
                    return Err(StoreError::DuplicateLineage {
                        node: *node,
                        resource,
                        existing,
                    });
                }
                owned += 1;
            }
        }
        if owned != self.entries.len() {
            return Err(StoreError::IndexMismatch(format!(
                "owner index lists {owned} of {} entries",
                self.entries.len()
            )));
        }

        let mut linked = 0;
        for target in self.downstream.keys() {
            for id in self.downstream(*target) {
                if self.get(id)?.target() != Some(*target) {
                    return Err(StoreError::IndexMismatch(format!(
                        "{id} indexed downstream of {target}"
                    )));
                }
                linked += 1;
            }
        }
        if linked != report.refs {
            return Err(StoreError::IndexMismatch(format!(
                "downstream index lists {linked} of {} refs",
                report.refs
            )));
        }

        for (document, id) in self.documents.iter() {
            let listed = self
                .resource(*id)
                .is_ok_and(|r| r.documents().contains(document));
            if !listed {
                return Err(StoreError::IndexMismatch(format!(
                    "{document} indexed to {id}, which does not list it"
                )));
            }
        }

        Ok(report)
    }
}
