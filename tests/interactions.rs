use std::collections::BTreeSet;

use genedocs::domain::{ConflictPolicy, Evidence, LegacyId, StableId};
use genedocs::history::HistoryChaser;
use genedocs::interactions::{InteractionGraph, InteractionGraphBuilder};
use genedocs::lookup::{HistoryTable, XrefTable};
use genedocs::resolver::{HistoryAwareResolver, IdentifierResolver};

fn sid(value: &str) -> StableId {
    value.parse().unwrap()
}

fn lid(value: &str) -> LegacyId {
    value.parse().unwrap()
}

fn evidence(value: &str) -> Evidence {
    value.parse().unwrap()
}

fn assert_symmetric(graph: &InteractionGraph) {
    for node in graph.nodes() {
        for entry in graph.neighbors(node) {
            assert!(
                graph.entry(&entry.neighbor, node).is_some(),
                "{} -> {} has no reverse entry",
                node,
                entry.neighbor
            );
        }
    }
}

#[test]
fn edges_are_symmetric() {
    let mut builder = InteractionGraphBuilder::new();
    builder.add_edge(&sid("ENSG1"), &sid("ENSG2"), None);
    builder.add_edge(&sid("ENSG2"), &sid("ENSG3"), Some(&evidence("12345")));
    builder.add_edge(&sid("ENSG4"), &sid("ENSG1"), None);
    assert_symmetric(builder.graph());
    assert_eq!(builder.graph().edge_count(), 3);
}

#[test]
fn self_loops_leave_graph_unchanged() {
    let mut builder = InteractionGraphBuilder::new();
    assert!(!builder.add_edge(&sid("ENSG1"), &sid("ENSG1"), Some(&evidence("1"))));
    assert!(builder.graph().is_empty());

    builder.add_edge(&sid("ENSG1"), &sid("ENSG2"), None);
    builder.add_edge(&sid("ENSG2"), &sid("ENSG2"), None);
    assert_eq!(builder.graph().node_count(), 2);
    assert!(builder.graph().entry(&sid("ENSG2"), &sid("ENSG2")).is_none());
}

#[test]
fn repeated_pair_accumulates_evidence() {
    let mut builder = InteractionGraphBuilder::new();
    builder.add_edge(&sid("ENSG1"), &sid("ENSG2"), Some(&evidence("PMID:1")));
    builder.add_edge(&sid("ENSG1"), &sid("ENSG2"), Some(&evidence("PMID:2")));

    let graph = builder.graph();
    assert_eq!(graph.neighbors(&sid("ENSG1")).len(), 1);
    let forward = graph.entry(&sid("ENSG1"), &sid("ENSG2")).unwrap();
    let backward = graph.entry(&sid("ENSG2"), &sid("ENSG1")).unwrap();
    assert_eq!(forward.evidence, vec![evidence("PMID:1"), evidence("PMID:2")]);
    assert_eq!(forward.evidence, backward.evidence);
}

#[test]
fn reversed_duplicate_counts_once() {
    let mut builder = InteractionGraphBuilder::new();
    builder.add_edge(&sid("ENSG0001"), &sid("ENSG0002"), Some(&evidence("PMID:111")));
    builder.add_edge(&sid("ENSG0002"), &sid("ENSG0001"), Some(&evidence("PMID:111")));

    let graph = builder.graph();
    assert_eq!(graph.edge_count(), 1);
    assert_eq!(
        graph.entry(&sid("ENSG0001"), &sid("ENSG0002")).unwrap().evidence.len(),
        1
    );
    assert_eq!(
        graph.entry(&sid("ENSG0002"), &sid("ENSG0001")).unwrap().evidence.len(),
        1
    );
}

#[test]
fn legacy_pairs_use_resolution() {
    let mut xrefs = XrefTable::new();
    xrefs.insert(lid("1"), sid("ENSG1"));
    xrefs.insert(lid("2"), sid("ENSG2"));
    xrefs.insert(lid("3"), sid("ENSG3A"));
    xrefs.insert(lid("3"), sid("ENSG3B"));
    xrefs.insert(lid("5"), sid("ENSG1"));
    let history = HistoryTable::new();
    let resolver = HistoryAwareResolver::new(
        IdentifierResolver::new(&xrefs),
        HistoryChaser::new(&history),
    );
    let pairs = vec![
        (lid("1"), lid("2"), None),
        (lid("1"), lid("4"), None),
        (lid("2"), lid("3"), None),
        (lid("1"), lid("5"), None),
    ];
    let ids = pairs
        .iter()
        .flat_map(|(a, b, _)| [a.clone(), b.clone()])
        .collect::<BTreeSet<_>>();
    let resolution = resolver.resolve_with_history(&ids).unwrap();

    let mut excluded = InteractionGraphBuilder::new();
    let stats = excluded.add_legacy_pairs(&pairs, &resolution, ConflictPolicy::Exclude);
    assert_eq!(stats.mapped, 1);
    assert_eq!(stats.unmapped, 2);
    assert_eq!(stats.self_pairs, 1);
    assert_eq!(stats.unmapped_ids, vec![lid("4"), lid("3")]);

    let mut kept = InteractionGraphBuilder::new();
    let stats = kept.add_legacy_pairs(&pairs, &resolution, ConflictPolicy::KeepAll);
    assert_eq!(stats.mapped, 2);
    assert_eq!(kept.graph().neighbors(&sid("ENSG2")).len(), 3);
    assert_symmetric(kept.graph());
}

#[test]
fn documents_follow_first_seen_order() {
    let mut builder = InteractionGraphBuilder::new();
    builder.add_edge(&sid("ENSG2"), &sid("ENSG1"), Some(&evidence("111")));
    builder.add_edge(&sid("ENSG2"), &sid("ENSG3"), None);

    let documents = builder
        .into_documents("intact".to_string(), Some("pubmed".to_string()))
        .collect::<Vec<_>>();
    let ids = documents
        .iter()
        .map(|doc| doc.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["ENSG2", "ENSG1", "ENSG3"]);

    let json = serde_json::to_value(&documents[0]).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "_id": "ENSG2",
            "_parent": "ENSG2",
            "interactors": [
                {"interactor": "ENSG1", "pubmed": "111"},
                {"interactor": "ENSG3"}
            ],
            "interaction_source": "intact"
        })
    );
}
