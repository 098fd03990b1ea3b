use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::config::{OutputKind, ResolvedConfig, SectionPlan};
use crate::domain::{Identifier, LegacyId};
use crate::elastic::ElasticClient;
use crate::emitter::BulkTransport;
use crate::error::PipelineError;
use crate::history::HistoryChaser;
use crate::lookup::{HistoryLookup, HistoryTable, IdentifierLookup, XrefTable};
use crate::resolver::{
    BoxedResolver, HistoryAwareResolver, HistoryResolution, IdentifierResolver, ResolutionCounts,
};
use crate::stage::{StageAction, StageContext, StageReport};
use crate::store::Workspace;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sections: Vec<StageReport>,
    pub totals: ResolutionCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveResult {
    pub items: Vec<ResolveItem>,
    pub counts: ResolutionCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveStatus {
    Stable,
    Resolved,
    Replaced,
    Conflict,
    Discontinued,
    Unresolved,
}

impl ResolveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveStatus::Stable => "stable",
            ResolveStatus::Resolved => "resolved",
            ResolveStatus::Replaced => "replaced",
            ResolveStatus::Conflict => "conflict",
            ResolveStatus::Discontinued => "discontinued",
            ResolveStatus::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveItem {
    pub input: String,
    pub status: ResolveStatus,
    pub stable_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub base_dir: String,
    pub chunk_size: usize,
    pub history_hops: usize,
    pub lookups: Option<String>,
    pub sections: Vec<CheckedSection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckedSection {
    pub name: String,
    pub action: StageAction,
    pub output: OutputKind,
    pub index: String,
    pub files: Vec<CheckedFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckedFile {
    pub path: String,
    pub exists: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App {
    workspace: Workspace,
    resolver: Option<BoxedResolver>,
    bulk: Option<Box<dyn BulkTransport>>,
    chunk_size: usize,
    taxon: String,
}

impl App {
    pub fn new(workspace: Workspace, chunk_size: usize, taxon: impl Into<String>) -> Self {
        Self {
            workspace,
            resolver: None,
            bulk: None,
            chunk_size,
            taxon: taxon.into(),
        }
    }

    pub fn with_resolver(mut self, resolver: BoxedResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_bulk(mut self, bulk: Box<dyn BulkTransport>) -> Self {
        self.bulk = Some(bulk);
        self
    }

    /// Builds lookups from the config: local tables when configured,
    /// Elasticsearch otherwise.
    pub fn from_config(config: &ResolvedConfig) -> Result<Self, PipelineError> {
        let workspace = Workspace::new(config.base_dir.clone());
        let elastic = config
            .elastic
            .clone()
            .map(|settings| ElasticClient::new(settings, config.timeout))
            .transpose()?;

        let xref = xref_lookup(config, &workspace, elastic.as_ref())?;
        let history = history_lookup(config, &workspace, elastic.as_ref())?;

        let mut app = App::new(workspace, config.chunk_size, config.taxon.clone());
        if let (Some(xref), Some(history)) = (xref, history) {
            app = app.with_resolver(HistoryAwareResolver::new(
                IdentifierResolver::new(xref).with_query_batch(config.chunk_size),
                HistoryChaser::new(history).with_max_hops(config.history_hops),
            ));
        }
        if let Some(client) = elastic {
            app = app.with_bulk(Box::new(client));
        }
        Ok(app)
    }

    pub fn stage(
        &self,
        sections: &[&SectionPlan],
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, PipelineError> {
        let started_at = Utc::now();
        let ctx = StageContext {
            workspace: &self.workspace,
            resolver: self.resolver.as_ref(),
            bulk: self.bulk.as_deref(),
            chunk_size: self.chunk_size,
            taxon: &self.taxon,
        };

        let mut reports = Vec::with_capacity(sections.len());
        let mut totals = ResolutionCounts::default();
        for plan in sections.iter().copied() {
            let started = Instant::now();
            sink.event(ProgressEvent {
                message: format!("staging {} ({})", plan.name, plan.action),
                elapsed: None,
            });
            let report = (plan.handler)(&ctx, plan)?;
            sink.event(ProgressEvent {
                message: format!(
                    "{}: {} records in {} batches -> {}",
                    report.section, report.records, report.batches, report.output
                ),
                elapsed: Some(started.elapsed()),
            });
            totals.add(report.resolution);
            reports.push(report);
        }

        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            sections: reports,
            totals,
        })
    }

    /// Resolves ad hoc ids. Stable ids pass through unchanged.
    pub fn resolve(&self, inputs: &[String]) -> Result<ResolveResult, PipelineError> {
        let resolver = self.resolver.as_ref().ok_or_else(|| {
            PipelineError::InvalidConfig(
                "resolve needs elastic or tables.xref and tables.history".to_string(),
            )
        })?;

        let parsed = inputs
            .iter()
            .map(|input| input.parse::<Identifier>().map(|id| (input.clone(), id)))
            .collect::<Result<Vec<_>, _>>()?;
        let legacy = parsed
            .iter()
            .filter_map(|(_, id)| match id {
                Identifier::Legacy(legacy) => Some(legacy.clone()),
                Identifier::Stable(_) => None,
            })
            .collect::<BTreeSet<_>>();
        let resolution = resolver.resolve_with_history(&legacy)?;

        let items = parsed
            .into_iter()
            .map(|(input, id)| match id {
                Identifier::Stable(stable) => ResolveItem {
                    input,
                    status: ResolveStatus::Stable,
                    stable_ids: vec![stable.to_string()],
                    replacement: None,
                },
                Identifier::Legacy(legacy) => describe(&resolution, &legacy, input),
            })
            .collect();

        Ok(ResolveResult {
            items,
            counts: resolution.counts(),
        })
    }
}

/// Lists planned sections and whether their inputs are present, without
/// opening any lookup.
pub fn check(config: &ResolvedConfig) -> CheckResult {
    let workspace = Workspace::new(config.base_dir.clone());
    let lookups = match (&config.tables.xref, &config.elastic) {
        (Some(path), _) => Some(format!("tables ({path})")),
        (None, Some(elastic)) => Some(format!("elastic ({})", elastic.url)),
        (None, None) => None,
    };
    CheckResult {
        base_dir: config.base_dir.to_string(),
        chunk_size: config.chunk_size,
        history_hops: config.history_hops,
        lookups,
        sections: config
            .sections
            .iter()
            .map(|plan| CheckedSection {
                name: plan.name.clone(),
                action: plan.action,
                output: plan.output,
                index: plan.index.clone(),
                files: plan
                    .files
                    .iter()
                    .map(|file| {
                        let path = workspace.input_path(&file.path);
                        CheckedFile {
                            exists: path.as_std_path().exists(),
                            path: path.to_string(),
                        }
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn describe(resolution: &HistoryResolution, legacy: &LegacyId, input: String) -> ResolveItem {
    let replacement = resolution.replaced.get(legacy).map(ToString::to_string);
    let (status, stable_ids) = if let Some(stable) = resolution.resolved.get(legacy) {
        let status = if replacement.is_some() {
            ResolveStatus::Replaced
        } else {
            ResolveStatus::Resolved
        };
        (status, vec![stable.to_string()])
    } else if let Some(candidates) = resolution.conflicts.get(legacy) {
        (
            ResolveStatus::Conflict,
            candidates.iter().map(ToString::to_string).collect(),
        )
    } else if resolution.discontinued.contains(legacy) {
        (ResolveStatus::Discontinued, Vec::new())
    } else {
        (ResolveStatus::Unresolved, Vec::new())
    };
    ResolveItem {
        input,
        status,
        stable_ids,
        replacement,
    }
}

fn xref_lookup(
    config: &ResolvedConfig,
    workspace: &Workspace,
    elastic: Option<&ElasticClient>,
) -> Result<Option<Box<dyn IdentifierLookup>>, PipelineError> {
    if let Some(path) = &config.tables.xref {
        info!(path = %path, "loading cross-reference table");
        let table = XrefTable::from_gene2ensembl(workspace.open_text(path)?, &config.taxon)?;
        return Ok(Some(Box::new(table)));
    }
    Ok(elastic.map(|client| Box::new(client.clone()) as Box<dyn IdentifierLookup>))
}

fn history_lookup(
    config: &ResolvedConfig,
    workspace: &Workspace,
    elastic: Option<&ElasticClient>,
) -> Result<Option<Box<dyn HistoryLookup>>, PipelineError> {
    if let Some(path) = &config.tables.history {
        info!(path = %path, "loading gene history table");
        let table = HistoryTable::from_gene_history(workspace.open_text(path)?, &config.taxon)?;
        return Ok(Some(Box::new(table)));
    }
    Ok(elastic.map(|client| Box::new(client.clone()) as Box<dyn HistoryLookup>))
}
