use std::collections::HashMap;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::domain::{ConflictPolicy, Evidence, LegacyId, StableId};
use crate::resolver::HistoryResolution;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    pub neighbor: StableId,
    pub evidence: Vec<Evidence>,
}

/// Symmetric adjacency lists. Nodes keep first-seen order and each node's
/// neighbors keep insertion order; a neighbor appears at most once per node.
#[derive(Debug, Clone, Default)]
pub struct InteractionGraph {
    order: Vec<StableId>,
    adjacency: HashMap<StableId, Vec<NeighborEntry>>,
}

impl InteractionGraph {
    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum::<usize>() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &StableId> {
        self.order.iter()
    }

    pub fn neighbors(&self, node: &StableId) -> &[NeighborEntry] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entry(&self, node: &StableId, neighbor: &StableId) -> Option<&NeighborEntry> {
        self.neighbors(node)
            .iter()
            .find(|entry| &entry.neighbor == neighbor)
    }

    fn link(&mut self, from: &StableId, to: &StableId, evidence: Option<&Evidence>) {
        if !self.adjacency.contains_key(from) {
            self.order.push(from.clone());
        }
        let entries = self.adjacency.entry(from.clone()).or_default();
        let position = match entries.iter().position(|entry| &entry.neighbor == to) {
            Some(position) => position,
            None => {
                entries.push(NeighborEntry {
                    neighbor: to.clone(),
                    evidence: Vec::new(),
                });
                entries.len() - 1
            }
        };
        if let Some(evidence) = evidence {
            let existing = &mut entries[position].evidence;
            if !existing.contains(evidence) {
                existing.push(evidence.clone());
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PairStats {
    pub mapped: usize,
    pub unmapped: usize,
    pub self_pairs: usize,
    pub unmapped_ids: Vec<LegacyId>,
}

#[derive(Debug, Default)]
pub struct InteractionGraphBuilder {
    graph: InteractionGraph,
}

impl InteractionGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &InteractionGraph {
        &self.graph
    }

    /// Adds `a <-> b`. Returns false for self loops, which leave the graph unchanged.
    pub fn add_edge(&mut self, a: &StableId, b: &StableId, evidence: Option<&Evidence>) -> bool {
        if a == b {
            return false;
        }
        self.graph.link(a, b, evidence);
        self.graph.link(b, a, evidence);
        true
    }

    /// Adds pairs of legacy ids whose sides have been through resolution.
    /// Pairs with an unmapped side are left out and reported.
    pub fn add_legacy_pairs<'a, I>(
        &mut self,
        pairs: I,
        resolution: &HistoryResolution,
        policy: ConflictPolicy,
    ) -> PairStats
    where
        I: IntoIterator<Item = &'a (LegacyId, LegacyId, Option<Evidence>)>,
    {
        let mut stats = PairStats::default();
        for (a, b, evidence) in pairs {
            let mapped_a = resolution.stable_ids_for(a, policy);
            let mapped_b = resolution.stable_ids_for(b, policy);
            if mapped_a.is_empty() || mapped_b.is_empty() {
                stats.unmapped += 1;
                for (side, mapped) in [(a, &mapped_a), (b, &mapped_b)] {
                    if mapped.is_empty() && !stats.unmapped_ids.contains(side) {
                        stats.unmapped_ids.push(side.clone());
                    }
                }
                continue;
            }
            let mut added = false;
            for stable_a in &mapped_a {
                for stable_b in &mapped_b {
                    added |= self.add_edge(stable_a, stable_b, evidence.as_ref());
                }
            }
            if added {
                stats.mapped += 1;
            } else {
                stats.self_pairs += 1;
            }
        }
        stats
    }

    pub fn into_documents(
        self,
        source: String,
        evidence_key: Option<String>,
    ) -> impl Iterator<Item = InteractionDocument> {
        let InteractionGraph {
            order,
            mut adjacency,
        } = self.graph;
        order.into_iter().map(move |node| {
            let interactors = adjacency
                .remove(&node)
                .unwrap_or_default()
                .into_iter()
                .map(|entry| Interactor {
                    interactor: entry.neighbor,
                    evidence_key: evidence_key.clone(),
                    evidence: entry.evidence,
                })
                .collect();
            InteractionDocument {
                id: node.clone(),
                parent: node,
                interactors,
                interaction_source: source.clone(),
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionDocument {
    #[serde(rename = "_id")]
    pub id: StableId,
    #[serde(rename = "_parent")]
    pub parent: StableId,
    pub interactors: Vec<Interactor>,
    pub interaction_source: String,
}

/// `{"interactor": id, <evidence_key>: value}`; the value is a string for one
/// token and an array for several. The key is omitted without evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interactor {
    pub interactor: StableId,
    pub evidence_key: Option<String>,
    pub evidence: Vec<Evidence>,
}

impl Serialize for Interactor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let key = self
            .evidence_key
            .as_deref()
            .filter(|_| !self.evidence.is_empty());
        let mut map = serializer.serialize_map(Some(1 + usize::from(key.is_some())))?;
        map.serialize_entry("interactor", &self.interactor)?;
        if let Some(key) = key {
            match self.evidence.as_slice() {
                [single] => map.serialize_entry(key, single)?,
                many => map.serialize_entry(key, many)?,
            }
        }
        map.end()
    }
}
