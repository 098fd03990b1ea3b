use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{ConflictPolicy, PathwaySource};
use crate::emitter::DEFAULT_CHUNK_SIZE;
use crate::error::PipelineError;
use crate::history::DEFAULT_MAX_HOPS;
use crate::stage::{StageAction, StageHandler};

pub const DEFAULT_CONFIG_FILE: &str = "genedocs.json";
pub const DEFAULT_TAXON: &str = "9606";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_XREF_FIELD: &str = "dbxrefs.entrez";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub base_dir: Option<String>,
    #[serde(default)]
    pub taxon: Option<String>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub history_hops: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub elastic: Option<ElasticEntry>,
    #[serde(default)]
    pub tables: Option<TablesEntry>,
    #[serde(default)]
    pub sections: Vec<SectionEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ElasticEntry {
    pub url: String,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub history_index: Option<String>,
    #[serde(default)]
    pub xref_field: Option<String>,
}

/// Local cross-reference and history tables, used instead of Elasticsearch lookups.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TablesEntry {
    #[serde(default)]
    pub xref: Option<String>,
    #[serde(default)]
    pub history: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FileEntry {
    Shorthand(String),
    Detailed(FileEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FileEntryObject {
    pub path: String,
    #[serde(default)]
    pub source: Option<PathwaySource>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SectionEntry {
    pub name: String,
    pub action: String,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub output: Option<OutputKind>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub conflicts: Option<ConflictPolicy>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    /// `stage/<section>.json` holding one `{"docs":[...]}` document.
    #[default]
    Stage,
    /// `stage/<section>.ndjson` holding `_bulk` action pairs.
    Ndjson,
    /// `_bulk` requests straight to Elasticsearch.
    Bulk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElasticSettings {
    pub url: String,
    pub index: String,
    pub history_index: String,
    pub xref_field: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSettings {
    pub xref: Option<Utf8PathBuf>,
    pub history: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: Utf8PathBuf,
    pub source: Option<PathwaySource>,
}

#[derive(Debug, Clone)]
pub struct SectionPlan {
    pub name: String,
    pub action: StageAction,
    pub handler: StageHandler,
    pub files: Vec<InputFile>,
    /// `interaction_source` of emitted interaction documents.
    pub source: String,
    pub output: OutputKind,
    pub index: String,
    pub conflicts: ConflictPolicy,
    pub is_public: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub base_dir: Utf8PathBuf,
    pub taxon: String,
    pub chunk_size: usize,
    pub history_hops: usize,
    pub timeout: Duration,
    pub elastic: Option<ElasticSettings>,
    pub tables: TableSettings,
    pub sections: Vec<SectionPlan>,
}

impl ResolvedConfig {
    pub fn has_identifier_lookup(&self) -> bool {
        self.elastic.is_some() || self.tables.xref.is_some()
    }

    pub fn has_history_lookup(&self) -> bool {
        self.elastic.is_some() || self.tables.history.is_some()
    }

    /// Sections to run, in config order. An empty selection means all of them.
    pub fn select(&self, names: &[String]) -> Result<Vec<&SectionPlan>, PipelineError> {
        if let Some(unknown) = names
            .iter()
            .find(|name| !self.sections.iter().any(|plan| &plan.name == *name))
        {
            return Err(PipelineError::UnknownSection(unknown.clone()));
        }
        Ok(self
            .sections
            .iter()
            .filter(|plan| names.is_empty() || names.contains(&plan.name))
            .collect())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PipelineError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(PipelineError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PipelineError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PipelineError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PipelineError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(PipelineError::InvalidConfig(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let chunk_size = config.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(PipelineError::InvalidChunkSize);
        }

        let elastic = config.elastic.map(|entry| {
            let index = entry.index.unwrap_or_else(|| "genedoc".to_string());
            ElasticSettings {
                url: entry.url.trim_end_matches('/').to_string(),
                history_index: entry
                    .history_index
                    .unwrap_or_else(|| format!("{index}_history")),
                index,
                xref_field: entry
                    .xref_field
                    .unwrap_or_else(|| DEFAULT_XREF_FIELD.to_string()),
            }
        });

        let tables = config
            .tables
            .map(|entry| TableSettings {
                xref: entry.xref.map(Utf8PathBuf::from),
                history: entry.history.map(Utf8PathBuf::from),
            })
            .unwrap_or_default();

        let mut resolved = ResolvedConfig {
            schema_version,
            base_dir: Utf8PathBuf::from(config.base_dir.unwrap_or_else(|| ".".to_string())),
            taxon: config.taxon.unwrap_or_else(|| DEFAULT_TAXON.to_string()),
            chunk_size,
            history_hops: config.history_hops.unwrap_or(DEFAULT_MAX_HOPS),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            elastic,
            tables,
            sections: Vec::new(),
        };

        let mut names = BTreeSet::new();
        for entry in config.sections {
            if !names.insert(entry.name.clone()) {
                return Err(PipelineError::InvalidConfig(format!(
                    "duplicate section {}",
                    entry.name
                )));
            }
            let plan = resolve_section(entry, &resolved)?;
            resolved.sections.push(plan);
        }

        Ok(resolved)
    }
}

fn resolve_section(
    entry: SectionEntry,
    config: &ResolvedConfig,
) -> Result<SectionPlan, PipelineError> {
    let action: StageAction = entry.action.parse()?;
    if entry.files.is_empty() {
        return Err(PipelineError::InvalidConfig(format!(
            "section {} lists no files",
            entry.name
        )));
    }
    if action.needs_lookups() && !(config.has_identifier_lookup() && config.has_history_lookup()) {
        return Err(PipelineError::InvalidConfig(format!(
            "section {} needs elastic or tables.xref and tables.history",
            entry.name
        )));
    }

    let output = entry.output.unwrap_or_default();
    if output == OutputKind::Bulk && config.elastic.is_none() {
        return Err(PipelineError::InvalidConfig(format!(
            "section {} writes to bulk but no elastic is configured",
            entry.name
        )));
    }

    let files = entry
        .files
        .into_iter()
        .map(|file| match file {
            FileEntry::Shorthand(path) => InputFile {
                path: Utf8PathBuf::from(path),
                source: None,
            },
            FileEntry::Detailed(obj) => InputFile {
                path: Utf8PathBuf::from(obj.path),
                source: obj.source,
            },
        })
        .collect();

    let index = entry
        .index
        .or_else(|| config.elastic.as_ref().map(|elastic| elastic.index.clone()))
        .unwrap_or_else(|| entry.name.clone());

    Ok(SectionPlan {
        source: entry
            .source
            .unwrap_or_else(|| action.default_source().to_string()),
        handler: action.handler(),
        action,
        files,
        output,
        index,
        conflicts: entry.conflicts.unwrap_or_default(),
        is_public: entry.is_public.unwrap_or(true),
        name: entry.name,
    })
}
