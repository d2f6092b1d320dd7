//! Source configuration document (`sources.yaml`)
//!
//! Groups are kept in document order so that job planning enumerates
//! sources exactly as they are written.

use crate::error::{IngestError, Result};
use crate::versioning::ResolverSpec;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_OLS_ENDPOINT: &str = "https://www.ebi.ac.uk/ols4/api/ontologies";

/// Ordered `id -> T` mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMap<T>(Vec<(String, T)>);

impl<T> Default for SourceMap<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> SourceMap<T> {
    pub fn get(&self, id: &str) -> Option<&T> {
        self.0.iter().find(|(key, _)| key == id).map(|(_, value)| value)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> FromIterator<(String, T)> for SourceMap<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

struct SourceMapVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for SourceMapVisitor<T> {
    type Value = SourceMap<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a mapping of source ids")
    }

    fn visit_unit<E>(self) -> std::result::Result<Self::Value, E> {
        Ok(SourceMap::default())
    }

    fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, T>()? {
            if entries.iter().any(|(existing, _): &(String, T)| existing == &key) {
                return Err(serde::de::Error::custom(format!("duplicate source id '{key}'")));
            }
            entries.push((key, value));
        }
        Ok(SourceMap(entries))
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for SourceMap<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(SourceMapVisitor(PhantomData))
    }
}

/// Ingestion strategy a source is configured under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceGroup {
    Api,
    Ftp,
    Ols,
    Web,
    BioPortal,
    /// Dedicated flow per source, invoked without a group argument.
    Custom,
}

impl SourceGroup {
    pub const ALL: [SourceGroup; 6] = [
        SourceGroup::Api,
        SourceGroup::Ftp,
        SourceGroup::Ols,
        SourceGroup::Web,
        SourceGroup::BioPortal,
        SourceGroup::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceGroup::Api => "api",
            SourceGroup::Ftp => "ftp",
            SourceGroup::Ols => "ols",
            SourceGroup::Web => "web",
            SourceGroup::BioPortal => "bioportal",
            SourceGroup::Custom => "custom",
        }
    }
}

impl fmt::Display for SourceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// File rules
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    And,
    #[default]
    Or,
}

/// Which listed files belong to a source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRules {
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub name_contains: Vec<String>,
    #[serde(default)]
    pub name_contains_mode: MatchMode,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Optional sub-folder inside the version folder.
    #[serde(default)]
    pub root: Option<String>,
}

impl FileRules {
    pub fn matches(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        if self.exclude.iter().any(|token| name.contains(token.as_str())) {
            return false;
        }
        if !self.extensions.is_empty()
            && !self
                .extensions
                .iter()
                .any(|ext| name.ends_with(&format!(".{}", ext.trim_start_matches('.'))))
        {
            return false;
        }
        if self.name_contains.is_empty() {
            return true;
        }
        let mut hits = self.name_contains.iter().map(|token| name.contains(token.as_str()));
        match self.name_contains_mode {
            MatchMode::And => hits.all(|hit| hit),
            MatchMode::Or => hits.any(|hit| hit),
        }
    }

    /// Case-insensitive variant used for scraped page links.
    pub fn matches_ignore_case(&self, name: &str) -> bool {
        let lower = |tokens: &[String]| tokens.iter().map(|t| t.to_lowercase()).collect::<Vec<_>>();
        let rules = FileRules {
            extensions: lower(&self.extensions),
            name_contains: lower(&self.name_contains),
            name_contains_mode: self.name_contains_mode,
            exclude: lower(&self.exclude),
            root: None,
        };
        rules.matches(&name.to_lowercase())
    }

    /// Storage-relative path for a matched file.
    pub fn relative_path(&self, file_name: &str) -> String {
        match self.root.as_deref().map(|r| r.trim_matches('/')) {
            Some(root) if !root.is_empty() => format!("{root}/{file_name}"),
            _ => file_name.to_string(),
        }
    }
}

// ============================================================================
// Groups
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiOperation {
    #[serde(default)]
    pub name: Option<String>,
    /// Probe operations only exist for version discovery and are never downloaded.
    #[serde(default)]
    pub probe: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ApiOperation {
    pub fn is_probe(&self) -> bool {
        self.probe.is_some()
    }

    pub fn path(&self) -> Option<&str> {
        self.probe.as_deref().or(self.name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiSource {
    pub base_url: String,
    #[serde(default)]
    pub version: Option<ResolverSpec>,
    #[serde(default)]
    pub operations: Vec<ApiOperation>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FtpHost {
    /// `host[:port]/path`
    pub host: String,
    #[serde(default)]
    pub file_rules: FileRules,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebPage {
    pub web_page: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default)]
    pub file_rules: FileRules,
}

fn default_tag() -> String {
    "a".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebSource {
    #[serde(default)]
    pub version: Option<ResolverSpec>,
    pub pages: Vec<WebPage>,
}

fn default_ols_endpoint() -> String {
    DEFAULT_OLS_ENDPOINT.to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceGroups {
    #[serde(default)]
    pub api: SourceMap<ApiSource>,
    #[serde(default)]
    pub ftp: SourceMap<Vec<FtpHost>>,
    #[serde(default)]
    pub ols: Vec<String>,
    #[serde(default = "default_ols_endpoint")]
    pub ols_endpoint: String,
    #[serde(default, alias = "web_pages")]
    pub web: SourceMap<WebSource>,
    #[serde(default)]
    pub bioportal: Vec<String>,
    #[serde(default)]
    pub custom: Vec<String>,
}

impl Default for SourceGroups {
    fn default() -> Self {
        Self {
            api: SourceMap::default(),
            ftp: SourceMap::default(),
            ols: Vec::new(),
            ols_endpoint: default_ols_endpoint(),
            web: SourceMap::default(),
            bioportal: Vec::new(),
            custom: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SourcesDocument {
    #[serde(default)]
    pub sources: SourceGroups,
}

fn unknown(group: &str, id: &str, available: Vec<&str>) -> IngestError {
    IngestError::Config(format!(
        "{group} source '{id}' not found. Available: [{}]",
        available.join(", ")
    ))
}

impl SourcesDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| IngestError::Config(format!("cannot read {}: {e}", path.display())))?;
        let document = Self::parse(&text)
            .map_err(|e| IngestError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded sources document");
        Ok(document)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let document: Self = serde_yaml::from_str(text)
            .map_err(|e| IngestError::Config(format!("invalid sources document: {e}")))?;
        document.validate()?;
        Ok(document)
    }

    fn validate(&self) -> Result<()> {
        let groups = &self.sources;
        for (id, source) in groups.api.iter() {
            if let Some(spec) = &source.version {
                spec.validate()?;
            }
            for op in source.operations.iter().filter(|op| !op.is_probe()) {
                if op.name.is_none() || op.filename.is_none() {
                    return Err(IngestError::Config(format!(
                        "api source '{id}': download operations need 'name' and 'filename'"
                    )));
                }
            }
        }
        for (_, source) in groups.web.iter() {
            if let Some(spec) = &source.version {
                spec.validate()?;
            }
        }
        Ok(())
    }

    /// Source ids of `group`, in document order.
    pub fn ids(&self, group: SourceGroup) -> Vec<&str> {
        let groups = &self.sources;
        match group {
            SourceGroup::Api => groups.api.ids().collect(),
            SourceGroup::Ftp => groups.ftp.ids().collect(),
            SourceGroup::Ols => groups.ols.iter().map(String::as_str).collect(),
            SourceGroup::Web => groups.web.ids().collect(),
            SourceGroup::BioPortal => groups.bioportal.iter().map(String::as_str).collect(),
            SourceGroup::Custom => groups.custom.iter().map(String::as_str).collect(),
        }
    }

    pub fn api(&self, id: &str) -> Result<&ApiSource> {
        let group = &self.sources.api;
        group.get(id).ok_or_else(|| unknown("api", id, group.ids().collect()))
    }

    pub fn ftp(&self, id: &str) -> Result<&[FtpHost]> {
        let group = &self.sources.ftp;
        group
            .get(id)
            .map(Vec::as_slice)
            .ok_or_else(|| unknown("ftp", id, group.ids().collect()))
    }

    pub fn web(&self, id: &str) -> Result<&WebSource> {
        let group = &self.sources.web;
        group.get(id).ok_or_else(|| unknown("web", id, group.ids().collect()))
    }

    pub fn ols(&self, id: &str) -> Result<&str> {
        let group = &self.sources.ols;
        group
            .iter()
            .find(|o| o.as_str() == id)
            .map(String::as_str)
            .ok_or_else(|| unknown("ols", id, group.iter().map(String::as_str).collect()))
    }

    pub fn bioportal(&self, id: &str) -> Result<&str> {
        let group = &self.sources.bioportal;
        group
            .iter()
            .find(|o| o.as_str() == id)
            .map(String::as_str)
            .ok_or_else(|| unknown("bioportal", id, group.iter().map(String::as_str).collect()))
    }
}
