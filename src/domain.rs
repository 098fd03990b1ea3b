use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Numeric gene id from an older or alternate database (NCBI Entrez `GeneID`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LegacyId(String);

impl LegacyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LegacyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LegacyId {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if normalized.is_empty() || !normalized.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(PipelineError::InvalidLegacyId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for LegacyId {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LegacyId> for String {
    fn from(value: LegacyId) -> Self {
        value.0
    }
}

/// Prefixed accession such as `ENSG00000139618`, optionally versioned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StableId(String);

impl StableId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StableId {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let (accession, version) = match normalized.split_once('.') {
            Some((accession, version)) => (accession, Some(version)),
            None => (normalized, None),
        };
        let digits_at = accession
            .find(|ch: char| ch.is_ascii_digit())
            .unwrap_or(accession.len());
        let (prefix, number) = accession.split_at(digits_at);
        let is_valid = !prefix.is_empty()
            && prefix.chars().all(|ch| ch.is_ascii_alphabetic())
            && !number.is_empty()
            && number.chars().all(|ch| ch.is_ascii_digit())
            && version
                .map(|v| !v.is_empty() && v.chars().all(|ch| ch.is_ascii_digit()))
                .unwrap_or(true);
        if !is_valid {
            return Err(PipelineError::InvalidStableId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for StableId {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StableId> for String {
    fn from(value: StableId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Legacy(LegacyId),
    Stable(StableId),
}

impl FromStr for Identifier {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            Ok(Identifier::Legacy(trimmed.parse()?))
        } else {
            Ok(Identifier::Stable(trimmed.parse()?))
        }
    }
}

/// Provenance token attached to an interaction, e.g. a PubMed id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Evidence(String);

impl Evidence {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Evidence {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
            return Err(PipelineError::InvalidEvidence(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// One row of a gene history table: `legacy_id` was renamed to
/// `replacement_id`, or discontinued outright when there is none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "discontinued_geneid", deserialize_with = "legacy_id_field")]
    pub legacy_id: LegacyId,
    #[serde(
        rename = "geneid",
        default,
        deserialize_with = "optional_legacy_id_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub replacement_id: Option<LegacyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discontinued_symbol: Option<String>,
    #[serde(
        rename = "discontinue_date",
        default,
        deserialize_with = "optional_date_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub effective_date: Option<NaiveDate>,
}

impl HistoryEntry {
    pub fn is_discontinued(&self) -> bool {
        self.replacement_id.is_none()
    }
}

// History indexes store gene ids as integers and dates as raw `YYYYMMDD`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(u64),
}

impl TextOrNumber {
    fn into_legacy_id<E: de::Error>(self) -> Result<LegacyId, E> {
        match self {
            TextOrNumber::Text(text) => text.parse().map_err(E::custom),
            TextOrNumber::Number(number) => number.to_string().parse().map_err(E::custom),
        }
    }
}

fn legacy_id_field<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LegacyId, D::Error> {
    TextOrNumber::deserialize(deserializer)?.into_legacy_id()
}

fn optional_legacy_id_field<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<LegacyId>, D::Error> {
    Option::<TextOrNumber>::deserialize(deserializer)?
        .map(TextOrNumber::into_legacy_id)
        .transpose()
}

fn optional_date_field<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error> {
    let Some(text) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y%m%d"))
        .map(Some)
        .map_err(|_| de::Error::custom(format!("invalid discontinue_date {text}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathwaySource {
    #[serde(rename = "kegg")]
    Kegg,
    #[serde(rename = "reactome")]
    Reactome,
    #[serde(rename = "biocarta")]
    Biocarta,
    #[serde(rename = "GO")]
    Go,
    #[serde(rename = "unknown")]
    Unknown,
}

impl PathwaySource {
    /// MSigDB file names carry the collection name, e.g. `c2.cp.kegg.v5.0.entrez.gmt`.
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("kegg") {
            PathwaySource::Kegg
        } else if lower.contains("reactome") {
            PathwaySource::Reactome
        } else if lower.contains("biocarta") {
            PathwaySource::Biocarta
        } else if lower.contains("all") {
            PathwaySource::Go
        } else {
            PathwaySource::Unknown
        }
    }
}

impl fmt::Display for PathwaySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            PathwaySource::Kegg => "kegg",
            PathwaySource::Reactome => "reactome",
            PathwaySource::Biocarta => "biocarta",
            PathwaySource::Go => "GO",
            PathwaySource::Unknown => "unknown",
        };
        write!(f, "{value}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathwayRecord {
    pub pathway_name: String,
    pub pathway_url: String,
    pub gene_sets: Vec<StableId>,
    pub source: PathwaySource,
    pub is_public: bool,
}

/// What to do with a legacy id that maps to more than one stable id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Treat the id as unresolvable.
    #[default]
    Exclude,
    /// Keep every candidate stable id.
    KeepAll,
}
