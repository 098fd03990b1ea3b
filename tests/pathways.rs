use genedocs::domain::{ConflictPolicy, HistoryEntry, LegacyId, PathwaySource, StableId};
use genedocs::history::HistoryChaser;
use genedocs::lookup::{HistoryTable, XrefTable};
use genedocs::pathways::{ConversionClass, PathwayGenesetResolver};
use genedocs::resolver::{HistoryAwareResolver, IdentifierResolver};
use genedocs::tables::parse_gmt_line;

fn lid(value: &str) -> LegacyId {
    value.parse().unwrap()
}

fn sid(value: &str) -> StableId {
    value.parse().unwrap()
}

fn lookups() -> (XrefTable, HistoryTable) {
    let mut xrefs = XrefTable::new();
    xrefs.insert(lid("1"), sid("ENSG1"));
    xrefs.insert(lid("2"), sid("ENSG2"));
    xrefs.insert(lid("85452"), sid("ENSG85452"));
    xrefs.insert(lid("7"), sid("ENSG7A"));
    xrefs.insert(lid("7"), sid("ENSG7B"));
    xrefs.insert(lid("8"), sid("ENSG1"));

    let mut history = HistoryTable::new();
    history.insert(HistoryEntry {
        legacy_id: lid("100"),
        replacement_id: Some(lid("85452")),
        discontinued_symbol: None,
        effective_date: None,
    });
    (xrefs, history)
}

#[test]
fn converts_gene_set_through_history() {
    let (xrefs, history) = lookups();
    let resolver = HistoryAwareResolver::new(
        IdentifierResolver::new(&xrefs),
        HistoryChaser::new(&history),
    );
    let converter = PathwayGenesetResolver::new(&resolver, PathwaySource::Kegg);
    let raw = parse_gmt_line(1, "KEGG_GLYCOLYSIS\thttp://example.org/kegg\t2\t100\t1").unwrap();

    let (record, diagnostic) = converter.convert(raw).unwrap();
    assert_eq!(record.gene_sets, vec![sid("ENSG2"), sid("ENSG85452"), sid("ENSG1")]);
    assert_eq!(record.source, PathwaySource::Kegg);
    assert!(record.is_public);
    assert_eq!(diagnostic.class, ConversionClass::Equal);
    assert_eq!(diagnostic.resolution.replaced, 1);
}

#[test]
fn unresolved_ids_are_dropped_and_reported() {
    let (xrefs, history) = lookups();
    let resolver = HistoryAwareResolver::new(
        IdentifierResolver::new(&xrefs),
        HistoryChaser::new(&history),
    );
    let converter = PathwayGenesetResolver::new(&resolver, PathwaySource::Reactome);
    let raw = parse_gmt_line(1, "REACTOME_X\turl\t1\t999\t7").unwrap();

    let (record, diagnostic) = converter.convert(raw).unwrap();
    assert_eq!(record.gene_sets, vec![sid("ENSG1")]);
    assert_eq!(diagnostic.class, ConversionClass::Less(2));
    assert_eq!(diagnostic.to_string(), "REACTOME_X\t3/1\tLess(2)");
}

#[test]
fn keep_all_fans_out_conflicts() {
    let (xrefs, history) = lookups();
    let resolver = HistoryAwareResolver::new(
        IdentifierResolver::new(&xrefs),
        HistoryChaser::new(&history),
    );
    let converter = PathwayGenesetResolver::new(&resolver, PathwaySource::Go)
        .with_conflict_policy(ConflictPolicy::KeepAll)
        .with_public(false);
    let raw = parse_gmt_line(1, "GO_X\turl\t7,2").unwrap();

    let (record, diagnostic) = converter.convert(raw).unwrap();
    assert_eq!(record.gene_sets, vec![sid("ENSG7A"), sid("ENSG7B"), sid("ENSG2")]);
    assert_eq!(diagnostic.class, ConversionClass::More(1));
    assert!(!record.is_public);
}

#[test]
fn duplicate_stable_ids_collapse() {
    let (xrefs, history) = lookups();
    let resolver = HistoryAwareResolver::new(
        IdentifierResolver::new(&xrefs),
        HistoryChaser::new(&history),
    );
    let converter = PathwayGenesetResolver::new(&resolver, PathwaySource::Biocarta);
    let raw = parse_gmt_line(1, "BIOCARTA_X\turl\t1\t8").unwrap();

    let (record, diagnostic) = converter.convert(raw).unwrap();
    assert_eq!(record.gene_sets, vec![sid("ENSG1")]);
    assert_eq!(diagnostic.class, ConversionClass::Less(1));

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["source"], "biocarta");
    assert_eq!(json["gene_sets"], serde_json::json!(["ENSG1"]));
}

#[test]
fn source_from_file_name() {
    assert_eq!(
        PathwaySource::from_file_name("c2.cp.kegg.v5.0.entrez.gmt"),
        PathwaySource::Kegg
    );
    assert_eq!(
        PathwaySource::from_file_name("c5.all.v5.0.entrez.gmt"),
        PathwaySource::Go
    );
    assert_eq!(
        PathwaySource::from_file_name("c6.oncogenic.v5.0.entrez.gmt"),
        PathwaySource::Unknown
    );
}
