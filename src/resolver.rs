use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, error, info};

use crate::domain::{ConflictPolicy, LegacyId, StableId};
use crate::error::PipelineError;
use crate::history::HistoryChaser;
use crate::lookup::{HistoryLookup, IdentifierLookup};

pub const DEFAULT_QUERY_BATCH: usize = 450;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionResult {
    pub resolved: BTreeMap<LegacyId, StableId>,
    /// Ids claimed by more than one stable id, with the sorted candidates.
    pub conflicts: BTreeMap<LegacyId, Vec<StableId>>,
    pub unresolved: BTreeSet<LegacyId>,
}

/// Nothing is cached between calls, so resolving the same set twice against
/// unchanged lookup state gives equal results.
pub struct IdentifierResolver<L: IdentifierLookup> {
    lookup: L,
    query_batch: usize,
}

impl<L: IdentifierLookup> IdentifierResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            query_batch: DEFAULT_QUERY_BATCH,
        }
    }

    pub fn with_query_batch(mut self, query_batch: usize) -> Self {
        self.query_batch = query_batch.max(1);
        self
    }

    pub fn resolve(&self, ids: &BTreeSet<LegacyId>) -> Result<ResolutionResult, PipelineError> {
        let mut result = ResolutionResult::default();
        if ids.is_empty() {
            return Ok(result);
        }

        let query = ids.iter().cloned().collect::<Vec<_>>();
        let mut candidates: BTreeMap<LegacyId, Vec<StableId>> = BTreeMap::new();
        for slice in query.chunks(self.query_batch) {
            for hit in self.lookup.find_by_xref(slice)? {
                if !ids.contains(&hit.legacy) {
                    continue;
                }
                let claims = candidates.entry(hit.legacy).or_default();
                if !claims.contains(&hit.stable) {
                    claims.push(hit.stable);
                }
            }
        }

        for id in ids {
            match candidates.remove(id) {
                None => {
                    result.unresolved.insert(id.clone());
                }
                Some(mut claims) if claims.len() == 1 => {
                    if let Some(stable) = claims.pop() {
                        result.resolved.insert(id.clone(), stable);
                    }
                }
                Some(mut claims) => {
                    claims.sort();
                    let candidates = claims.iter().map(StableId::as_str).collect::<Vec<_>>();
                    error!(
                        id = %id,
                        candidates = ?candidates,
                        "conflicting stable ids; marking unresolvable"
                    );
                    result.conflicts.insert(id.clone(), claims);
                }
            }
        }

        Ok(result)
    }
}

/// Outcome of resolution with a history chase, keyed by the ids the caller
/// asked for (never by intermediate replacement ids).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryResolution {
    pub resolved: BTreeMap<LegacyId, StableId>,
    pub conflicts: BTreeMap<LegacyId, Vec<StableId>>,
    /// Ids that were renamed, with the replacement that was resolved in their place.
    pub replaced: BTreeMap<LegacyId, LegacyId>,
    pub discontinued: BTreeSet<LegacyId>,
    pub unresolved: BTreeSet<LegacyId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionCounts {
    pub resolved: usize,
    pub replaced: usize,
    pub conflicts: usize,
    pub discontinued: usize,
    pub unresolved: usize,
}

impl ResolutionCounts {
    pub fn add(&mut self, other: ResolutionCounts) {
        self.resolved += other.resolved;
        self.replaced += other.replaced;
        self.conflicts += other.conflicts;
        self.discontinued += other.discontinued;
        self.unresolved += other.unresolved;
    }
}

impl HistoryResolution {
    /// Stable ids a caller should use for `id` under `policy`.
    pub fn stable_ids_for(&self, id: &LegacyId, policy: ConflictPolicy) -> Vec<&StableId> {
        if let Some(stable) = self.resolved.get(id) {
            return vec![stable];
        }
        match (policy, self.conflicts.get(id)) {
            (ConflictPolicy::KeepAll, Some(candidates)) => candidates.iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn counts(&self) -> ResolutionCounts {
        ResolutionCounts {
            resolved: self.resolved.len(),
            replaced: self.replaced.len(),
            conflicts: self.conflicts.len(),
            discontinued: self.discontinued.len(),
            unresolved: self.unresolved.len(),
        }
    }
}

/// Resolver over boxed lookups, so one runner can mix table and Elasticsearch backends.
pub type BoxedResolver = HistoryAwareResolver<Box<dyn IdentifierLookup>, Box<dyn HistoryLookup>>;

pub struct HistoryAwareResolver<L: IdentifierLookup, H: HistoryLookup> {
    resolver: IdentifierResolver<L>,
    chaser: HistoryChaser<H>,
}

impl<L: IdentifierLookup, H: HistoryLookup> HistoryAwareResolver<L, H> {
    pub fn new(resolver: IdentifierResolver<L>, chaser: HistoryChaser<H>) -> Self {
        Self { resolver, chaser }
    }

    pub fn resolve_with_history(
        &self,
        ids: &BTreeSet<LegacyId>,
    ) -> Result<HistoryResolution, PipelineError> {
        let first = self.resolver.resolve(ids)?;
        let chased = self.chaser.chase(&first.unresolved)?;

        let mut outcome = HistoryResolution {
            resolved: first.resolved,
            conflicts: first.conflicts,
            ..HistoryResolution::default()
        };

        // replacement id -> original ids it stands in for
        let mut origins: BTreeMap<LegacyId, Vec<LegacyId>> = BTreeMap::new();
        for id in first.unresolved {
            if chased.permanently_discontinued.contains(&id) {
                outcome.discontinued.insert(id);
            } else if let Some(replacement) = chased.replacements.get(&id) {
                origins.entry(replacement.clone()).or_default().push(id);
            } else {
                outcome.unresolved.insert(id);
            }
        }

        let substituted = origins.keys().cloned().collect::<BTreeSet<_>>();
        let second = self.resolver.resolve(&substituted)?;

        for (replacement, originals) in origins {
            for original in originals {
                if let Some(stable) = second.resolved.get(&replacement) {
                    outcome.resolved.insert(original.clone(), stable.clone());
                    outcome.replaced.insert(original, replacement.clone());
                } else if let Some(candidates) = second.conflicts.get(&replacement) {
                    outcome.conflicts.insert(original.clone(), candidates.clone());
                    outcome.replaced.insert(original, replacement.clone());
                } else {
                    debug!(id = %original, replacement = %replacement, "replacement still unresolved");
                    outcome.unresolved.insert(original);
                }
            }
        }

        for id in &outcome.unresolved {
            debug!(id = %id, "unresolved legacy id");
        }
        let counts = outcome.counts();
        info!(
            requested = ids.len(),
            resolved = counts.resolved,
            replaced = counts.replaced,
            conflicts = counts.conflicts,
            discontinued = counts.discontinued,
            unresolved = counts.unresolved,
            "resolved legacy ids"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::lookup::{XrefHit, XrefTable};

    struct CountingLookup {
        table: XrefTable,
        calls: RefCell<Vec<usize>>,
    }

    impl IdentifierLookup for CountingLookup {
        fn find_by_xref(&self, ids: &[LegacyId]) -> Result<Vec<XrefHit>, PipelineError> {
            self.calls.borrow_mut().push(ids.len());
            self.table.find_by_xref(ids)
        }
    }

    #[test]
    fn resolve_queries_in_batches() {
        let mut table = XrefTable::new();
        for n in 1..=5 {
            table.insert(
                n.to_string().parse().unwrap(),
                format!("ENSG{n:04}").parse().unwrap(),
            );
        }
        let lookup = CountingLookup {
            table,
            calls: RefCell::new(Vec::new()),
        };
        let resolver = IdentifierResolver::new(&lookup).with_query_batch(2);
        let ids = (1..=5)
            .map(|n| n.to_string().parse().unwrap())
            .collect::<BTreeSet<LegacyId>>();
        let result = resolver.resolve(&ids).unwrap();
        assert_eq!(result.resolved.len(), 5);
        assert_eq!(*lookup.calls.borrow(), vec![2, 2, 1]);
    }

    #[test]
    fn empty_input_skips_lookup() {
        let lookup = CountingLookup {
            table: XrefTable::new(),
            calls: RefCell::new(Vec::new()),
        };
        let result = IdentifierResolver::new(&lookup)
            .resolve(&BTreeSet::new())
            .unwrap();
        assert_eq!(result, ResolutionResult::default());
        assert!(lookup.calls.borrow().is_empty());
    }
}
