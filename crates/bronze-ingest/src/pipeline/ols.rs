//! Ontologies published through the OLS4 API

use super::{Artifact, ArtifactName, IngestContext, Landing, SourcePlan};
use crate::error::{IngestError, Result};
use crate::storage::paths;
use crate::transfer::{DigestMode, HttpRequest};
use crate::versioning::ResolveError;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OlsRelease {
    pub version: String,
    pub download_url: String,
}

/// Version and download location from an ontology's OLS metadata.
///
/// `config.fileLocation` is preferred for the download, `config.versionIri`
/// is the fallback.
pub fn parse_ontology(document: &Value) -> std::result::Result<OlsRelease, ResolveError> {
    let config = document
        .get("config")
        .ok_or_else(|| ResolveError::format("OLS payload has no 'config' object"))?;
    let text = |field: &str| {
        config
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let version = text("version").ok_or_else(|| ResolveError::format("OLS payload has no 'config.version'"))?;
    let download_url = text("fileLocation")
        .or_else(|| text("versionIri"))
        .ok_or_else(|| ResolveError::format("OLS payload has neither 'config.fileLocation' nor 'config.versionIri'"))?;

    Ok(OlsRelease { version, download_url })
}

pub struct OlsPlan {
    ontology_id: String,
    endpoint: String,
    release: Option<OlsRelease>,
}

impl OlsPlan {
    pub fn new(ontology_id: &str, endpoint: &str) -> Self {
        Self {
            ontology_id: ontology_id.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            release: None,
        }
    }
}

#[async_trait]
impl SourcePlan for OlsPlan {
    fn source_id(&self) -> &str {
        &self.ontology_id
    }

    async fn resolve(&mut self, ctx: &IngestContext) -> Result<String> {
        let url = format!("{}/{}", self.endpoint, self.ontology_id);
        let release = ctx
            .http
            .get_json(&url, &HeaderMap::new())
            .await
            .and_then(|document| parse_ontology(&document))
            .map_err(|e| IngestError::resolution(&self.ontology_id, e))?;

        info!(
            ontology = %self.ontology_id,
            version = %release.version,
            download = %release.download_url,
            "Resolved OLS release"
        );
        let version = release.version.clone();
        self.release = Some(release);
        Ok(version)
    }

    async fn landing(&mut self, _ctx: &IngestContext, _marker: &str) -> Result<Landing> {
        let release = self
            .release
            .as_ref()
            .ok_or_else(|| IngestError::Config("OLS release requested before resolution".into()))?;

        let file_name = match paths::file_name(release.download_url.trim_end_matches('/')) {
            "" => format!("{}.owl", self.ontology_id),
            name => name.to_string(),
        };

        Ok(Landing {
            hosts: vec![release.download_url.clone()],
            artifacts: vec![Artifact::Http {
                request: HttpRequest::get(release.download_url.clone()),
                name: ArtifactName::Fixed(file_name),
                digest: DigestMode::Compute,
            }],
        })
    }
}
