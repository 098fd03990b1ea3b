use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{OutputKind, SectionPlan};
use crate::domain::{Evidence, LegacyId, PathwaySource};
use crate::emitter::{BulkSink, BulkTransport, EmitSummary, JsonDocsSink, NdjsonSink, emit};
use crate::error::PipelineError;
use crate::fs_util::extract_member;
use crate::interactions::InteractionGraphBuilder;
use crate::pathways::{ConversionTally, PathwayGenesetResolver};
use crate::resolver::{BoxedResolver, ResolutionCounts};
use crate::store::Workspace;
use crate::tables::{
    BioplexColumns, PsimitabColumns, numbered_lines, parse_gmt_line, parse_history_line,
};

pub type StageHandler =
    fn(&StageContext<'_>, &SectionPlan) -> Result<StageReport, PipelineError>;

/// Member of `intact.zip` holding the PSI-MITAB table.
pub const INTACT_MEMBER: &str = "intact.txt";
pub const PUBMED_EVIDENCE_KEY: &str = "pubmed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageAction {
    GeneHistory,
    InteractionsBioplex,
    InteractionsIntact,
    PathwayGenesets,
}

impl StageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageAction::GeneHistory => "gene-history",
            StageAction::InteractionsBioplex => "interactions-bioplex",
            StageAction::InteractionsIntact => "interactions-intact",
            StageAction::PathwayGenesets => "pathway-genesets",
        }
    }

    pub fn handler(self) -> StageHandler {
        match self {
            StageAction::GeneHistory => stage_gene_history,
            StageAction::InteractionsBioplex => stage_bioplex,
            StageAction::InteractionsIntact => stage_intact,
            StageAction::PathwayGenesets => stage_pathways,
        }
    }

    /// Whether the action maps legacy ids, and so needs xref and history lookups.
    pub fn needs_lookups(self) -> bool {
        matches!(
            self,
            StageAction::InteractionsBioplex | StageAction::PathwayGenesets
        )
    }

    pub fn default_source(self) -> &'static str {
        match self {
            StageAction::GeneHistory => "gene_history",
            StageAction::InteractionsBioplex => "bioplex",
            StageAction::InteractionsIntact => "intact",
            StageAction::PathwayGenesets => "msigdb",
        }
    }
}

impl fmt::Display for StageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageAction {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "gene-history" => Ok(StageAction::GeneHistory),
            "interactions-bioplex" => Ok(StageAction::InteractionsBioplex),
            "interactions-intact" => Ok(StageAction::InteractionsIntact),
            "pathway-genesets" => Ok(StageAction::PathwayGenesets),
            other => Err(PipelineError::UnknownAction(other.to_string())),
        }
    }
}

pub struct StageContext<'a> {
    pub workspace: &'a Workspace,
    pub resolver: Option<&'a BoxedResolver>,
    pub bulk: Option<&'a dyn BulkTransport>,
    pub chunk_size: usize,
    pub taxon: &'a str,
}

impl<'a> StageContext<'a> {
    fn resolver(&self, plan: &SectionPlan) -> Result<&'a BoxedResolver, PipelineError> {
        self.resolver.ok_or_else(|| {
            PipelineError::InvalidConfig(format!("section {} needs identifier lookups", plan.name))
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub section: String,
    pub action: StageAction,
    pub output: String,
    pub skipped_lines: usize,
    pub records: usize,
    pub batches: usize,
    pub resolution: ResolutionCounts,
    pub unmapped_pairs: usize,
    pub self_pairs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversions: Option<ConversionTally>,
}

impl StageReport {
    fn new(plan: &SectionPlan, output: String, summary: EmitSummary, skipped_lines: usize) -> Self {
        Self {
            section: plan.name.clone(),
            action: plan.action,
            output,
            skipped_lines,
            records: summary.records,
            batches: summary.batches,
            resolution: ResolutionCounts::default(),
            unmapped_pairs: 0,
            self_pairs: 0,
            conversions: None,
        }
    }
}

fn stage_gene_history(
    ctx: &StageContext<'_>,
    plan: &SectionPlan,
) -> Result<StageReport, PipelineError> {
    let readers = open_all(ctx, plan)?;
    let skipped_lines = Cell::new(0);
    let skipped = &skipped_lines;
    let taxon = ctx.taxon;

    let records = readers.into_iter().flat_map(move |reader| {
        table_rows(numbered_lines(reader), skipped, move |line_no, line| {
            parse_history_line(line_no, line, taxon)
        })
    });
    let (output, summary) = emit_section(ctx, plan, records)?;

    info!(section = %plan.name, records = summary.records, "staged gene history");
    Ok(StageReport::new(plan, output, summary, skipped_lines.get()))
}

fn stage_bioplex(ctx: &StageContext<'_>, plan: &SectionPlan) -> Result<StageReport, PipelineError> {
    let resolver = ctx.resolver(plan)?;
    let skipped = Cell::new(0);
    let mut pairs: Vec<(LegacyId, LegacyId, Option<Evidence>)> = Vec::new();
    for file in &plan.files {
        let (header, lines) = split_header(ctx.workspace.open_text(&file.path)?)?;
        let columns = BioplexColumns::from_header(&header)?;
        for row in table_rows(lines, &skipped, |line_no, line| {
            columns.parse_row(line_no, line).map(Some)
        }) {
            let (a, b) = row?;
            pairs.push((a, b, None));
        }
    }

    let ids = pairs
        .iter()
        .flat_map(|(a, b, _)| [a.clone(), b.clone()])
        .collect::<BTreeSet<_>>();
    let resolution = resolver.resolve_with_history(&ids)?;

    let mut builder = InteractionGraphBuilder::new();
    let stats = builder.add_legacy_pairs(&pairs, &resolution, plan.conflicts);
    for id in &stats.unmapped_ids {
        debug!(id = %id, "interactor without stable id");
    }
    info!(
        section = %plan.name,
        pairs = pairs.len(),
        mapped = stats.mapped,
        unmapped = stats.unmapped,
        nodes = builder.graph().node_count(),
        edges = builder.graph().edge_count(),
        "built interaction graph"
    );

    let documents = builder
        .into_documents(plan.source.clone(), None)
        .map(Ok::<_, PipelineError>);
    let (output, summary) = emit_section(ctx, plan, documents)?;

    let mut report = StageReport::new(plan, output, summary, skipped.get());
    report.resolution = resolution.counts();
    report.unmapped_pairs = stats.unmapped;
    report.self_pairs = stats.self_pairs;
    Ok(report)
}

fn stage_intact(ctx: &StageContext<'_>, plan: &SectionPlan) -> Result<StageReport, PipelineError> {
    let scratch = ctx.workspace.scratch_dir()?;
    let skipped = Cell::new(0);
    let mut builder = InteractionGraphBuilder::new();
    let mut rows = 0usize;
    for file in &plan.files {
        let mut path = ctx.workspace.input_path(&file.path);
        if path.extension() == Some("zip") {
            let extracted = extract_member(path.as_std_path(), INTACT_MEMBER, scratch.path())?;
            path = Utf8PathBuf::from_path_buf(extracted)
                .map_err(|_| PipelineError::Filesystem("invalid extracted path".to_string()))?;
        }
        let (header, lines) = split_header(ctx.workspace.open_text(&path)?)?;
        let columns = PsimitabColumns::from_header(&header, ctx.taxon)?;
        for row in table_rows(lines, &skipped, |line_no, line| columns.parse_row(line_no, line)) {
            let row = row?;
            builder.add_edge(&row.interactor_a, &row.interactor_b, row.evidence.as_ref());
            rows += 1;
        }
    }
    info!(
        section = %plan.name,
        rows,
        nodes = builder.graph().node_count(),
        edges = builder.graph().edge_count(),
        "built interaction graph"
    );

    let documents = builder
        .into_documents(plan.source.clone(), Some(PUBMED_EVIDENCE_KEY.to_string()))
        .map(Ok::<_, PipelineError>);
    let (output, summary) = emit_section(ctx, plan, documents)?;
    Ok(StageReport::new(plan, output, summary, skipped.get()))
}

fn stage_pathways(
    ctx: &StageContext<'_>,
    plan: &SectionPlan,
) -> Result<StageReport, PipelineError> {
    let resolver = ctx.resolver(plan)?;
    let mut inputs = Vec::with_capacity(plan.files.len());
    for file in &plan.files {
        let source = file
            .source
            .unwrap_or_else(|| {
                PathwaySource::from_file_name(file.path.file_name().unwrap_or(file.path.as_str()))
            });
        inputs.push((source, ctx.workspace.open_text(&file.path)?));
    }

    let log_file = RefCell::new(ctx.workspace.create_stage_file(&plan.name, "log")?);
    let tally_cell = RefCell::new(ConversionTally::default());
    let counts_cell = RefCell::new(ResolutionCounts::default());
    let skipped_lines = Cell::new(0);
    let (log, tally, counts, skipped) = (&log_file, &tally_cell, &counts_cell, &skipped_lines);

    let records = inputs.into_iter().flat_map(move |(source, reader)| {
        let converter = PathwayGenesetResolver::new(resolver, source)
            .with_public(plan.is_public)
            .with_conflict_policy(plan.conflicts);
        table_rows(numbered_lines(reader), skipped, |line_no, line| {
            parse_gmt_line(line_no, line).map(Some)
        })
        .map(move |raw| {
            let (record, diagnostic) = converter.convert(raw?)?;
            writeln!(log.borrow_mut(), "{diagnostic}")
                .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
            tally.borrow_mut().record(diagnostic.class);
            counts.borrow_mut().add(diagnostic.resolution);
            Ok(record)
        })
    });
    let (output, summary) = emit_section(ctx, plan, records)?;
    let log_path = log_file.into_inner().commit()?;

    let tally = tally_cell.into_inner();
    info!(
        section = %plan.name,
        pathways = summary.records,
        equal = tally.equal,
        more = tally.more,
        less = tally.less,
        log = %log_path,
        "converted pathway gene sets"
    );
    let mut report = StageReport::new(plan, output, summary, skipped_lines.get());
    report.resolution = counts_cell.into_inner();
    report.conversions = Some(tally);
    Ok(report)
}

fn open_all(
    ctx: &StageContext<'_>,
    plan: &SectionPlan,
) -> Result<Vec<Box<dyn BufRead>>, PipelineError> {
    plan.files
        .iter()
        .map(|file| ctx.workspace.open_text(&file.path))
        .collect()
}

/// Splits off the first line of a table as its header row.
fn split_header<R: BufRead>(
    reader: R,
) -> Result<
    (
        String,
        impl Iterator<Item = Result<(usize, String), PipelineError>>,
    ),
    PipelineError,
> {
    let mut lines = numbered_lines(reader);
    match lines.next() {
        Some(first) => Ok((first?.1, lines)),
        None => Err(PipelineError::parse(1, "missing header row")),
    }
}

/// Parsed rows of a table. Blank lines are ignored; malformed rows are
/// counted in `skipped` and logged, any other error is passed through.
fn table_rows<'a, T, L, F>(
    lines: L,
    skipped: &'a Cell<usize>,
    mut parse: F,
) -> impl Iterator<Item = Result<T, PipelineError>> + 'a
where
    T: 'a,
    L: Iterator<Item = Result<(usize, String), PipelineError>> + 'a,
    F: FnMut(usize, &str) -> Result<Option<T>, PipelineError> + 'a,
{
    lines.filter_map(move |item| {
        let parsed = item.and_then(|(line_no, line)| {
            if line.trim().is_empty() {
                Ok(None)
            } else {
                parse(line_no, &line)
            }
        });
        match parsed {
            Ok(row) => row.map(Ok),
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "skipping malformed line");
                skipped.set(skipped.get() + 1);
                None
            }
            Err(err) => Some(Err(err)),
        }
    })
}

fn emit_section<I, T>(
    ctx: &StageContext<'_>,
    plan: &SectionPlan,
    records: I,
) -> Result<(String, EmitSummary), PipelineError>
where
    I: IntoIterator<Item = Result<T, PipelineError>>,
    T: Serialize,
{
    match plan.output {
        OutputKind::Stage => {
            let mut file = ctx.workspace.create_stage_file(&plan.name, "json")?;
            let summary = emit(records, ctx.chunk_size, &mut JsonDocsSink::new(&mut file))?;
            Ok((file.commit()?.to_string(), summary))
        }
        OutputKind::Ndjson => {
            let mut file = ctx.workspace.create_stage_file(&plan.name, "ndjson")?;
            let summary = emit(
                records,
                ctx.chunk_size,
                &mut NdjsonSink::new(&mut file, plan.index.as_str()),
            )?;
            Ok((file.commit()?.to_string(), summary))
        }
        OutputKind::Bulk => {
            let transport = ctx.bulk.ok_or_else(|| {
                PipelineError::InvalidConfig(format!("section {} has no bulk transport", plan.name))
            })?;
            let summary = emit(
                records,
                ctx.chunk_size,
                &mut BulkSink::new(transport, plan.index.as_str()),
            )?;
            Ok((format!("bulk:{}", plan.index), summary))
        }
    }
}
