use std::io::BufRead;

use chrono::NaiveDate;
use regex::Regex;

use crate::domain::{Evidence, HistoryEntry, LegacyId, StableId};
use crate::error::PipelineError;

/// Yields `(line_number, line)` pairs, 1-based. A line that is not UTF-8 is a
/// parse error for that line; a read failure is fatal and ends the iterator.
pub fn numbered_lines<R: BufRead>(
    mut reader: R,
) -> impl Iterator<Item = Result<(usize, String), PipelineError>> {
    let mut line_no = 0usize;
    let mut failed = false;
    std::iter::from_fn(move || {
        if failed {
            return None;
        }
        let mut bytes = Vec::new();
        match reader.read_until(b'\n', &mut bytes) {
            Ok(0) => None,
            Ok(_) => {
                line_no += 1;
                if bytes.ends_with(b"\n") {
                    bytes.pop();
                    if bytes.ends_with(b"\r") {
                        bytes.pop();
                    }
                }
                Some(
                    String::from_utf8(bytes)
                        .map(|line| (line_no, line))
                        .map_err(|_| PipelineError::parse(line_no, "line is not valid UTF-8")),
                )
            }
            Err(err) => {
                failed = true;
                Some(Err(PipelineError::Filesystem(err.to_string())))
            }
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrefRow {
    pub legacy: LegacyId,
    pub stable: StableId,
}

/// `gene2ensembl`: `tax_id GeneID Ensembl_gene_identifier ...`
pub fn parse_gene2ensembl_line(
    line_no: usize,
    line: &str,
    taxon: &str,
) -> Result<Option<XrefRow>, PipelineError> {
    if line.starts_with('#') || line.trim().is_empty() {
        return Ok(None);
    }
    let parts = line.split('\t').collect::<Vec<_>>();
    if column(&parts, 0, line_no, "tax_id")? != taxon {
        return Ok(None);
    }
    let stable = column(&parts, 2, line_no, "Ensembl_gene_identifier")?;
    if stable == "-" {
        return Ok(None);
    }
    Ok(Some(XrefRow {
        legacy: parse_field(column(&parts, 1, line_no, "GeneID")?, line_no)?,
        stable: parse_field(stable, line_no)?,
    }))
}

/// `gene_history`: `tax_id GeneID Discontinued_GeneID Discontinued_Symbol Discontinue_Date`,
/// where a `GeneID` of `-` means the gene was discontinued without replacement.
pub fn parse_history_line(
    line_no: usize,
    line: &str,
    taxon: &str,
) -> Result<Option<HistoryEntry>, PipelineError> {
    if line.starts_with('#') || line.trim().is_empty() {
        return Ok(None);
    }
    let parts = line.trim_end().split('\t').collect::<Vec<_>>();
    if column(&parts, 0, line_no, "tax_id")? != taxon {
        return Ok(None);
    }
    let replacement = match column(&parts, 1, line_no, "GeneID")? {
        "-" => None,
        value => Some(parse_field(value, line_no)?),
    };
    let symbol = parts
        .get(3)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty() && *value != "-")
        .map(str::to_string);
    let effective_date = match parts.get(4).map(|value| value.trim()) {
        None | Some("") | Some("-") => None,
        Some(value) => Some(
            NaiveDate::parse_from_str(value, "%Y%m%d")
                .map_err(|err| PipelineError::parse(line_no, format!("date {value}: {err}")))?,
        ),
    };
    Ok(Some(HistoryEntry {
        legacy_id: parse_field(column(&parts, 2, line_no, "Discontinued_GeneID")?, line_no)?,
        replacement_id: replacement,
        discontinued_symbol: symbol,
        effective_date,
    }))
}

/// BioPlex interaction list; interactors are Entrez ids in `GeneA`/`GeneB`.
#[derive(Debug, Clone, Copy)]
pub struct BioplexColumns {
    gene_a: usize,
    gene_b: usize,
}

impl BioplexColumns {
    pub fn from_header(header: &str) -> Result<Self, PipelineError> {
        let names = header_names(header);
        Ok(Self {
            gene_a: header_index(&names, "GeneA")?,
            gene_b: header_index(&names, "GeneB")?,
        })
    }

    pub fn parse_row(
        &self,
        line_no: usize,
        line: &str,
    ) -> Result<(LegacyId, LegacyId), PipelineError> {
        let parts = line.split('\t').collect::<Vec<_>>();
        Ok((
            parse_field(column(&parts, self.gene_a, line_no, "GeneA")?, line_no)?,
            parse_field(column(&parts, self.gene_b, line_no, "GeneB")?, line_no)?,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntactRow {
    pub interactor_a: StableId,
    pub interactor_b: StableId,
    pub evidence: Option<Evidence>,
}

/// IntAct PSI-MITAB 2.7 export. Interactors are taken from their Ensembl
/// gene xrefs; the first PubMed publication id is kept as evidence.
#[derive(Debug, Clone)]
pub struct PsimitabColumns {
    taxid_a: usize,
    taxid_b: usize,
    xref_a: usize,
    xref_b: usize,
    publication: usize,
    taxon: Regex,
    ensembl: Regex,
    pubmed: Regex,
}

impl PsimitabColumns {
    pub fn from_header(header: &str, taxon: &str) -> Result<Self, PipelineError> {
        let names = header_names(header);
        let taxon = compile(&format!(r"taxid:{}(?:\D|$)", regex::escape(taxon)))?;
        Ok(Self {
            taxid_a: header_index(&names, "Taxid interactor A")?,
            taxid_b: header_index(&names, "Taxid interactor B")?,
            xref_a: header_index(&names, "Xref(s) interactor A")?,
            xref_b: header_index(&names, "Xref(s) interactor B")?,
            publication: header_index(&names, "Publication Identifier(s)")?,
            taxon,
            ensembl: compile(r"ensembl:(ENSG\d+)")?,
            pubmed: compile(r"pubmed:(\d+)")?,
        })
    }

    pub fn parse_row(&self, line_no: usize, line: &str) -> Result<Option<IntactRow>, PipelineError> {
        let parts = line.split('\t').collect::<Vec<_>>();
        let taxid_a = column(&parts, self.taxid_a, line_no, "Taxid interactor A")?;
        let taxid_b = column(&parts, self.taxid_b, line_no, "Taxid interactor B")?;
        if !self.taxon.is_match(taxid_a) || !self.taxon.is_match(taxid_b) {
            return Ok(None);
        }

        let xref_a = self.capture(
            &self.ensembl,
            column(&parts, self.xref_a, line_no, "Xref(s) interactor A")?,
        );
        let xref_b = self.capture(
            &self.ensembl,
            column(&parts, self.xref_b, line_no, "Xref(s) interactor B")?,
        );
        let (Some(xref_a), Some(xref_b)) = (xref_a, xref_b) else {
            return Ok(None);
        };
        if xref_a == xref_b {
            return Ok(None);
        }

        let evidence = self
            .capture(
                &self.pubmed,
                column(&parts, self.publication, line_no, "Publication Identifier(s)")?,
            )
            .map(|value| parse_field::<Evidence>(value, line_no))
            .transpose()?;

        Ok(Some(IntactRow {
            interactor_a: parse_field(xref_a, line_no)?,
            interactor_b: parse_field(xref_b, line_no)?,
            evidence,
        }))
    }

    fn capture<'a>(&self, pattern: &Regex, value: &'a str) -> Option<&'a str> {
        pattern
            .captures(value)
            .and_then(|captures| captures.get(1))
            .map(|found| found.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPathway {
    pub name: String,
    pub url: String,
    pub gene_ids: Vec<LegacyId>,
}

/// GMT row: `name<TAB>url<TAB>id<TAB>id...`; comma-separated id lists are accepted too.
pub fn parse_gmt_line(line_no: usize, line: &str) -> Result<RawPathway, PipelineError> {
    let mut parts = line.trim_end_matches(['\r', '\n']).split('\t');
    let name = parts.next().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(PipelineError::parse(line_no, "missing pathway name"));
    }
    let url = parts
        .next()
        .map(str::trim)
        .ok_or_else(|| PipelineError::parse(line_no, "missing pathway url"))?;
    let gene_ids = parts
        .flat_map(|field| field.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| parse_field(value, line_no))
        .collect::<Result<Vec<LegacyId>, _>>()?;
    Ok(RawPathway {
        name: name.to_string(),
        url: url.to_string(),
        gene_ids,
    })
}

fn compile(pattern: &str) -> Result<Regex, PipelineError> {
    Regex::new(pattern).map_err(|err| PipelineError::InvalidConfig(err.to_string()))
}

fn header_names(header: &str) -> Vec<String> {
    header
        .trim_end_matches(['\r', '\n'])
        .split('\t')
        .map(|name| name.trim().trim_start_matches('#').trim().to_string())
        .collect()
}

fn header_index(names: &[String], wanted: &str) -> Result<usize, PipelineError> {
    names
        .iter()
        .position(|name| name == wanted)
        .ok_or_else(|| PipelineError::parse(1, format!("missing column {wanted}")))
}

fn column<'a>(
    parts: &[&'a str],
    index: usize,
    line_no: usize,
    name: &str,
) -> Result<&'a str, PipelineError> {
    parts
        .get(index)
        .map(|value| value.trim())
        .ok_or_else(|| PipelineError::parse(line_no, format!("missing field {name}")))
}

fn parse_field<T>(value: &str, line_no: usize) -> Result<T, PipelineError>
where
    T: std::str::FromStr<Err = PipelineError>,
{
    value
        .parse()
        .map_err(|err: PipelineError| PipelineError::parse(line_no, err.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const INTACT_HEADER: &str = "#ID(s) interactor A\tID(s) interactor B\tPublication Identifier(s)\tTaxid interactor A\tTaxid interactor B\tXref(s) interactor A\tXref(s) interactor B";

    #[test]
    fn numbered_lines_strip_endings_and_flag_bad_bytes() {
        let input: &[u8] = b"GeneA\tGeneB\r\n1\t2\n2\t\xff\n3\t4";
        let lines = numbered_lines(input).collect::<Vec<_>>();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].as_ref().unwrap(), &(1, "GeneA\tGeneB".to_string()));
        assert_matches!(&lines[2], Err(PipelineError::Parse { line: 3, .. }));
        assert!(lines[2].as_ref().unwrap_err().is_recoverable());
        assert_eq!(lines[3].as_ref().unwrap(), &(4, "3\t4".to_string()));
    }

    #[test]
    fn gene2ensembl_filters_taxon_and_placeholders() {
        let row = parse_gene2ensembl_line(2, "9606\t1\tENSG00000121410\tNM_130786.3", "9606")
            .unwrap()
            .unwrap();
        assert_eq!(row.legacy.as_str(), "1");
        assert_eq!(row.stable.as_str(), "ENSG00000121410");

        assert!(
            parse_gene2ensembl_line(3, "10090\t11287\tENSMUSG00000030359", "9606")
                .unwrap()
                .is_none()
        );
        assert!(parse_gene2ensembl_line(4, "9606\t2\t-", "9606").unwrap().is_none());
        assert!(parse_gene2ensembl_line(1, "#tax_id\tGeneID", "9606").unwrap().is_none());
    }

    #[test]
    fn history_rows_with_and_without_replacement() {
        let renamed = parse_history_line(2, "9606\t85452\t100\tLOC100\t20050404", "9606")
            .unwrap()
            .unwrap();
        assert_eq!(renamed.legacy_id.as_str(), "100");
        assert_eq!(renamed.replacement_id.unwrap().as_str(), "85452");
        assert_eq!(
            renamed.effective_date,
            NaiveDate::from_ymd_opt(2005, 4, 4)
        );

        let gone = parse_history_line(3, "9606\t-\t197215\tLOC197215\t20050510", "9606")
            .unwrap()
            .unwrap();
        assert!(gone.is_discontinued());
    }

    #[test]
    fn history_rejects_bad_date() {
        let err = parse_history_line(7, "9606\t-\t1\tX\t2005-05-10", "9606").unwrap_err();
        assert_matches!(err, PipelineError::Parse { line: 7, .. });
    }

    #[test]
    fn bioplex_row() {
        let columns = BioplexColumns::from_header("GeneA\tGeneB\tUniprotA\tUniprotB").unwrap();
        let (a, b) = columns.parse_row(2, "100\t728378\tP00813\tA5A3E0").unwrap();
        assert_eq!((a.as_str(), b.as_str()), ("100", "728378"));
        assert_matches!(
            columns.parse_row(3, "100"),
            Err(PipelineError::Parse { line: 3, .. })
        );
    }

    #[test]
    fn psimitab_row_extracts_xrefs_and_pubmed() {
        let columns = PsimitabColumns::from_header(INTACT_HEADER, "9606").unwrap();
        let line = "uniprotkb:P1\tuniprotkb:P2\tpubmed:10542231|imex:IM-1\ttaxid:9606(human)\ttaxid:9606(human)\tensembl:ENSG00000078053|go:1\tensembl:ENSG00000159082";
        let row = columns.parse_row(2, line).unwrap().unwrap();
        assert_eq!(row.interactor_a.as_str(), "ENSG00000078053");
        assert_eq!(row.interactor_b.as_str(), "ENSG00000159082");
        assert_eq!(row.evidence.unwrap().as_str(), "10542231");
    }

    #[test]
    fn psimitab_skips_other_taxa_and_self_pairs() {
        let columns = PsimitabColumns::from_header(INTACT_HEADER, "9606").unwrap();
        let mouse = "a\tb\tpubmed:1\ttaxid:10090(mouse)\ttaxid:9606(human)\tensembl:ENSG1\tensembl:ENSG2";
        assert!(columns.parse_row(2, mouse).unwrap().is_none());
        let prefix = "a\tb\tpubmed:1\ttaxid:96061\ttaxid:9606\tensembl:ENSG1\tensembl:ENSG2";
        assert!(columns.parse_row(3, prefix).unwrap().is_none());
        let same = "a\tb\tpubmed:1\ttaxid:9606\ttaxid:9606\tensembl:ENSG1\tensembl:ENSG1";
        assert!(columns.parse_row(4, same).unwrap().is_none());
    }

    #[test]
    fn gmt_accepts_tab_and_comma_lists() {
        let tabbed = parse_gmt_line(1, "KEGG_GLYCOLYSIS\thttp://x\t2068\t2071\n").unwrap();
        assert_eq!(tabbed.gene_ids.len(), 2);
        let commas = parse_gmt_line(2, "P\thttp://x\t1,2,3").unwrap();
        assert_eq!(commas.gene_ids.len(), 3);
        assert_matches!(
            parse_gmt_line(3, "P\thttp://x\tABC"),
            Err(PipelineError::Parse { line: 3, .. })
        );
        assert_matches!(parse_gmt_line(4, "\t"), Err(PipelineError::Parse { .. }));
    }
}
