use std::collections::BTreeSet;

use assert_matches::assert_matches;

use genedocs::domain::{ConflictPolicy, HistoryEntry, LegacyId, StableId};
use genedocs::error::PipelineError;
use genedocs::history::HistoryChaser;
use genedocs::lookup::{HistoryTable, IdentifierLookup, XrefHit, XrefTable};
use genedocs::resolver::{HistoryAwareResolver, IdentifierResolver};

fn id(value: &str) -> LegacyId {
    value.parse().unwrap()
}

fn sid(value: &str) -> StableId {
    value.parse().unwrap()
}

fn ids(values: &[&str]) -> BTreeSet<LegacyId> {
    values.iter().map(|value| id(value)).collect()
}

fn renamed(legacy: &str, replacement: &str) -> HistoryEntry {
    HistoryEntry {
        legacy_id: id(legacy),
        replacement_id: Some(id(replacement)),
        discontinued_symbol: None,
        effective_date: None,
    }
}

fn discontinued(legacy: &str) -> HistoryEntry {
    HistoryEntry {
        legacy_id: id(legacy),
        replacement_id: None,
        discontinued_symbol: Some(format!("LOC{legacy}")),
        effective_date: None,
    }
}

fn xrefs() -> XrefTable {
    let mut table = XrefTable::new();
    table.insert(id("85452"), sid("ENSG00000001"));
    table.insert(id("1"), sid("ENSG00000121410"));
    table.insert(id("7"), sid("ENSG00000007"));
    table.insert(id("7"), sid("ENSG00000070"));
    table
}

fn history() -> HistoryTable {
    let mut table = HistoryTable::new();
    table.insert(renamed("100", "85452"));
    table.insert(discontinued("197215"));
    table.insert(renamed("300", "301"));
    table.insert(renamed("301", "85452"));
    table
}

struct FailingLookup;

impl IdentifierLookup for FailingLookup {
    fn find_by_xref(&self, _ids: &[LegacyId]) -> Result<Vec<XrefHit>, PipelineError> {
        Err(PipelineError::ElasticHttp("connection refused".to_string()))
    }
}

#[test]
fn resolution_is_idempotent() {
    let table = xrefs();
    let resolver = IdentifierResolver::new(&table);
    let input = ids(&["1", "7", "85452", "999"]);
    let first = resolver.resolve(&input).unwrap();
    let second = resolver.resolve(&input).unwrap();
    assert_eq!(first, second);
}

#[test]
fn result_partitions_the_input() {
    let table = xrefs();
    let input = ids(&["1", "7", "85452", "999"]);
    let result = IdentifierResolver::new(&table).resolve(&input).unwrap();

    let mut seen = BTreeSet::new();
    for key in result
        .resolved
        .keys()
        .chain(result.conflicts.keys())
        .chain(result.unresolved.iter())
    {
        assert!(seen.insert(key.clone()), "{key} appears twice");
    }
    assert_eq!(seen, input);
}

#[test]
fn conflicting_ids_are_not_resolved() {
    let table = xrefs();
    let result = IdentifierResolver::new(&table)
        .resolve(&ids(&["7"]))
        .unwrap();
    assert!(result.resolved.is_empty());
    assert_eq!(
        result.conflicts.get(&id("7")),
        Some(&vec![sid("ENSG00000007"), sid("ENSG00000070")])
    );
}

#[test]
fn lookup_failures_propagate() {
    let resolver = IdentifierResolver::new(FailingLookup);
    assert_matches!(
        resolver.resolve(&ids(&["1"])),
        Err(PipelineError::ElasticHttp(_))
    );
}

#[test]
fn history_substitution_maps_back_to_original_id() {
    let (table, history) = (xrefs(), history());
    let resolver = HistoryAwareResolver::new(
        IdentifierResolver::new(&table),
        HistoryChaser::new(&history),
    );
    let outcome = resolver.resolve_with_history(&ids(&["100"])).unwrap();
    assert_eq!(outcome.resolved.get(&id("100")), Some(&sid("ENSG00000001")));
    assert_eq!(outcome.replaced.get(&id("100")), Some(&id("85452")));
    assert!(!outcome.resolved.contains_key(&id("85452")));
}

#[test]
fn discontinued_ids_are_dropped() {
    let (table, history) = (xrefs(), history());
    let resolver = HistoryAwareResolver::new(
        IdentifierResolver::new(&table),
        HistoryChaser::new(&history),
    );
    let outcome = resolver.resolve_with_history(&ids(&["197215"])).unwrap();
    assert!(outcome.discontinued.contains(&id("197215")));
    assert!(outcome.resolved.is_empty());
    assert!(outcome.unresolved.is_empty());
}

#[test]
fn single_hop_leaves_stale_replacements_unresolved() {
    let (table, history) = (xrefs(), history());
    let resolver = HistoryAwareResolver::new(
        IdentifierResolver::new(&table),
        HistoryChaser::new(&history),
    );
    let outcome = resolver
        .resolve_with_history(&ids(&["300", "999"]))
        .unwrap();
    assert_eq!(outcome.unresolved, ids(&["300", "999"]));

    let deeper = HistoryAwareResolver::new(
        IdentifierResolver::new(&table),
        HistoryChaser::new(&history).with_max_hops(2),
    );
    let outcome = deeper.resolve_with_history(&ids(&["300"])).unwrap();
    assert_eq!(outcome.resolved.get(&id("300")), Some(&sid("ENSG00000001")));
}

#[test]
fn conflict_policy_controls_fan_out() {
    let (table, history) = (xrefs(), history());
    let resolver = HistoryAwareResolver::new(
        IdentifierResolver::new(&table),
        HistoryChaser::new(&history),
    );
    let outcome = resolver.resolve_with_history(&ids(&["1", "7"])).unwrap();
    assert!(outcome.stable_ids_for(&id("7"), ConflictPolicy::Exclude).is_empty());
    assert_eq!(
        outcome.stable_ids_for(&id("7"), ConflictPolicy::KeepAll).len(),
        2
    );
    assert_eq!(
        outcome.stable_ids_for(&id("1"), ConflictPolicy::Exclude),
        vec![&sid("ENSG00000121410")]
    );
    let counts = outcome.counts();
    assert_eq!((counts.resolved, counts.conflicts), (1, 1));
}
