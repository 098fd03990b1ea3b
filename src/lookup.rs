use std::collections::HashMap;
use std::io::BufRead;

use tracing::{debug, warn};

use crate::domain::{HistoryEntry, LegacyId, StableId};
use crate::error::PipelineError;
use crate::tables::{numbered_lines, parse_gene2ensembl_line, parse_history_line};

/// A stable-id document that claims a legacy id in its cross references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrefHit {
    pub legacy: LegacyId,
    pub stable: StableId,
}

/// "Find by cross-reference field, return the owning stable-id documents."
pub trait IdentifierLookup {
    fn find_by_xref(&self, ids: &[LegacyId]) -> Result<Vec<XrefHit>, PipelineError>;
}

/// "Find by discontinued-id field, return the current id (or none) and date."
pub trait HistoryLookup {
    fn find_history(&self, ids: &[LegacyId]) -> Result<Vec<HistoryEntry>, PipelineError>;
}

impl<T: IdentifierLookup + ?Sized> IdentifierLookup for &T {
    fn find_by_xref(&self, ids: &[LegacyId]) -> Result<Vec<XrefHit>, PipelineError> {
        (**self).find_by_xref(ids)
    }
}

impl<T: HistoryLookup + ?Sized> HistoryLookup for &T {
    fn find_history(&self, ids: &[LegacyId]) -> Result<Vec<HistoryEntry>, PipelineError> {
        (**self).find_history(ids)
    }
}

impl<T: IdentifierLookup + ?Sized> IdentifierLookup for Box<T> {
    fn find_by_xref(&self, ids: &[LegacyId]) -> Result<Vec<XrefHit>, PipelineError> {
        (**self).find_by_xref(ids)
    }
}

impl<T: HistoryLookup + ?Sized> HistoryLookup for Box<T> {
    fn find_history(&self, ids: &[LegacyId]) -> Result<Vec<HistoryEntry>, PipelineError> {
        (**self).find_history(ids)
    }
}

/// Cross-reference table held in memory, e.g. loaded from NCBI `gene2ensembl`.
#[derive(Debug, Clone, Default)]
pub struct XrefTable {
    by_legacy: HashMap<LegacyId, Vec<StableId>>,
}

impl XrefTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, legacy: LegacyId, stable: StableId) {
        let entry = self.by_legacy.entry(legacy).or_default();
        if !entry.contains(&stable) {
            entry.push(stable);
        }
    }

    pub fn len(&self) -> usize {
        self.by_legacy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_legacy.is_empty()
    }

    pub fn from_gene2ensembl<R: BufRead>(reader: R, taxon: &str) -> Result<Self, PipelineError> {
        let mut table = Self::new();
        let mut skipped = 0usize;
        for item in numbered_lines(reader) {
            match item.and_then(|(line_no, line)| parse_gene2ensembl_line(line_no, &line, taxon)) {
                Ok(Some(row)) => table.insert(row.legacy, row.stable),
                Ok(None) => {}
                Err(err) if err.is_recoverable() => {
                    warn!(error = %err, "skipping gene2ensembl line");
                    skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }
        debug!(ids = table.len(), skipped, "loaded cross-reference table");
        Ok(table)
    }
}

impl IdentifierLookup for XrefTable {
    fn find_by_xref(&self, ids: &[LegacyId]) -> Result<Vec<XrefHit>, PipelineError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.by_legacy.get(id).map(|stables| (id, stables)))
            .flat_map(|(id, stables)| {
                stables.iter().map(move |stable| XrefHit {
                    legacy: id.clone(),
                    stable: stable.clone(),
                })
            })
            .collect())
    }
}

/// Gene history table held in memory, e.g. loaded from NCBI `gene_history`.
#[derive(Debug, Clone, Default)]
pub struct HistoryTable {
    by_legacy: HashMap<LegacyId, Vec<HistoryEntry>>,
}

impl HistoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: HistoryEntry) {
        self.by_legacy
            .entry(entry.legacy_id.clone())
            .or_default()
            .push(entry);
    }

    pub fn len(&self) -> usize {
        self.by_legacy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_legacy.is_empty()
    }

    pub fn from_gene_history<R: BufRead>(reader: R, taxon: &str) -> Result<Self, PipelineError> {
        let mut table = Self::new();
        let mut skipped = 0usize;
        for item in numbered_lines(reader) {
            match item.and_then(|(line_no, line)| parse_history_line(line_no, &line, taxon)) {
                Ok(Some(entry)) => table.insert(entry),
                Ok(None) => {}
                Err(err) if err.is_recoverable() => {
                    warn!(error = %err, "skipping gene_history line");
                    skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }
        debug!(ids = table.len(), skipped, "loaded gene history table");
        Ok(table)
    }
}

impl HistoryLookup for HistoryTable {
    fn find_history(&self, ids: &[LegacyId]) -> Result<Vec<HistoryEntry>, PipelineError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.by_legacy.get(id))
            .flatten()
            .cloned()
            .collect())
    }
}
