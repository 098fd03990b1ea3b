use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::domain::{HistoryEntry, LegacyId};
use crate::error::PipelineError;
use crate::lookup::HistoryLookup;

pub const DEFAULT_MAX_HOPS: usize = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChaseOutcome {
    /// Original id to the last replacement reached within the hop budget.
    pub replacements: BTreeMap<LegacyId, LegacyId>,
    pub permanently_discontinued: BTreeSet<LegacyId>,
}

/// Each hop is one history query. A replacement that is itself stale after the
/// last hop is left for the resolver to report as unresolved.
pub struct HistoryChaser<H: HistoryLookup> {
    lookup: H,
    max_hops: usize,
}

impl<H: HistoryLookup> HistoryChaser<H> {
    pub fn new(lookup: H) -> Self {
        Self {
            lookup,
            max_hops: DEFAULT_MAX_HOPS,
        }
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn chase(&self, ids: &BTreeSet<LegacyId>) -> Result<ChaseOutcome, PipelineError> {
        let mut outcome = ChaseOutcome::default();
        // origin -> (current id, ids visited along the chain)
        let mut frontier = ids
            .iter()
            .map(|id| (id.clone(), (id.clone(), vec![id.clone()])))
            .collect::<BTreeMap<_, _>>();

        for hop in 0..self.max_hops {
            if frontier.is_empty() {
                break;
            }
            let query = frontier
                .values()
                .map(|(current, _)| current.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>();
            let entries = latest_entries(self.lookup.find_history(&query)?);
            debug!(hop, queried = query.len(), found = entries.len(), "history hop");

            let mut next = BTreeMap::new();
            for (origin, (current, mut visited)) in frontier {
                let Some(entry) = entries.get(&current) else {
                    continue;
                };
                match &entry.replacement_id {
                    None => {
                        outcome.replacements.remove(&origin);
                        outcome.permanently_discontinued.insert(origin);
                    }
                    Some(replacement) if visited.contains(replacement) => {
                        warn!(
                            id = %origin,
                            replacement = %replacement,
                            "gene history cycle; keeping last replacement"
                        );
                    }
                    Some(replacement) => {
                        outcome
                            .replacements
                            .insert(origin.clone(), replacement.clone());
                        visited.push(replacement.clone());
                        next.insert(origin, (replacement.clone(), visited));
                    }
                }
            }
            frontier = next;
        }

        Ok(outcome)
    }
}

/// Keeps one entry per legacy id: the most recently dated, first seen on ties.
fn latest_entries(entries: Vec<HistoryEntry>) -> HashMap<LegacyId, HistoryEntry> {
    let mut latest: HashMap<LegacyId, HistoryEntry> = HashMap::new();
    for entry in entries {
        match latest.get(&entry.legacy_id) {
            Some(existing) if existing.effective_date >= entry.effective_date => {}
            _ => {
                latest.insert(entry.legacy_id.clone(), entry);
            }
        }
    }
    latest
}
