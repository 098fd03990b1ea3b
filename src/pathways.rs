use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::domain::{ConflictPolicy, PathwayRecord, PathwaySource, StableId};
use crate::error::PipelineError;
use crate::lookup::{HistoryLookup, IdentifierLookup};
use crate::resolver::{HistoryAwareResolver, ResolutionCounts};
use crate::tables::RawPathway;

/// How the converted gene set compares in size to the input set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConversionClass {
    Equal,
    /// A legacy id fanned out into several stable ids.
    More(usize),
    /// Some legacy ids did not resolve and were dropped.
    Less(usize),
}

impl ConversionClass {
    pub fn classify(input: usize, output: usize) -> Self {
        match input.cmp(&output) {
            std::cmp::Ordering::Equal => ConversionClass::Equal,
            std::cmp::Ordering::Less => ConversionClass::More(output - input),
            std::cmp::Ordering::Greater => ConversionClass::Less(input - output),
        }
    }
}

impl fmt::Display for ConversionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionClass::Equal => write!(f, "Equal(0)"),
            ConversionClass::More(diff) => write!(f, "More({diff})"),
            ConversionClass::Less(diff) => write!(f, "Less({diff})"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversionTally {
    pub equal: usize,
    pub more: usize,
    pub less: usize,
}

impl ConversionTally {
    pub fn record(&mut self, class: ConversionClass) {
        match class {
            ConversionClass::Equal => self.equal += 1,
            ConversionClass::More(_) => self.more += 1,
            ConversionClass::Less(_) => self.less += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionDiagnostic {
    pub pathway_name: String,
    pub input_count: usize,
    pub output_count: usize,
    pub class: ConversionClass,
    pub resolution: ResolutionCounts,
}

impl fmt::Display for ConversionDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}/{}\t{}",
            self.pathway_name, self.input_count, self.output_count, self.class
        )
    }
}

/// Ids that do not resolve are dropped from the gene set without an error;
/// the loss only shows up in the returned [`ConversionDiagnostic`].
pub struct PathwayGenesetResolver<'r, L: IdentifierLookup, H: HistoryLookup> {
    resolver: &'r HistoryAwareResolver<L, H>,
    source: PathwaySource,
    is_public: bool,
    policy: ConflictPolicy,
}

impl<'r, L: IdentifierLookup, H: HistoryLookup> PathwayGenesetResolver<'r, L, H> {
    pub fn new(resolver: &'r HistoryAwareResolver<L, H>, source: PathwaySource) -> Self {
        Self {
            resolver,
            source,
            is_public: true,
            policy: ConflictPolicy::Exclude,
        }
    }

    pub fn with_public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn convert(
        &self,
        record: RawPathway,
    ) -> Result<(PathwayRecord, ConversionDiagnostic), PipelineError> {
        let ids = record.gene_ids.iter().cloned().collect::<BTreeSet<_>>();
        let resolution = self.resolver.resolve_with_history(&ids)?;

        let mut seen = BTreeSet::new();
        let mut gene_sets: Vec<StableId> = Vec::new();
        for id in &record.gene_ids {
            for stable in resolution.stable_ids_for(id, self.policy) {
                if seen.insert(stable.clone()) {
                    gene_sets.push(stable.clone());
                }
            }
        }

        let diagnostic = ConversionDiagnostic {
            input_count: record.gene_ids.len(),
            output_count: gene_sets.len(),
            class: ConversionClass::classify(record.gene_ids.len(), gene_sets.len()),
            pathway_name: record.name.clone(),
            resolution: resolution.counts(),
        };
        debug!(diagnostic = %diagnostic, "converted pathway gene set");

        Ok((
            PathwayRecord {
                pathway_name: record.name,
                pathway_url: record.url,
                gene_sets,
                source: self.source,
                is_public: self.is_public,
            },
            diagnostic,
        ))
    }
}
