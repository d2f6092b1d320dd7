//! REST API sources: fixed operations under a base URL

use super::{Artifact, ArtifactName, IngestContext, Landing, SourcePlan};
use crate::error::{IngestError, Result};
use crate::sources::{ApiOperation, ApiSource};
use crate::transfer::{DigestMode, HttpRequest};
use crate::versioning::resolver::header_map;
use crate::versioning::{HttpFetcher, VersionResolver};
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

/// Marker used when a source publishes no version: the UTC run date.
pub const DATE_MARKER_FORMAT: &str = "%Y_%m_%d";

pub struct ApiPlan {
    source_id: String,
    source: ApiSource,
    resolver: Option<Box<dyn VersionResolver>>,
}

impl ApiPlan {
    pub fn new(source_id: &str, source: &ApiSource, http: &HttpFetcher) -> Result<Self> {
        let resolver = source.version.as_ref().map(|spec| spec.build(http)).transpose()?;
        Ok(Self {
            source_id: source_id.to_string(),
            source: source.clone(),
            resolver,
        })
    }
}

pub fn operation_url(base_url: &str, operation: &ApiOperation) -> Option<String> {
    let path = operation.path()?;
    Some(format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/')))
}

#[async_trait]
impl SourcePlan for ApiPlan {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn resolve(&mut self, _ctx: &IngestContext) -> Result<String> {
        match &self.resolver {
            Some(resolver) => resolver
                .resolve()
                .await
                .map_err(|e| IngestError::resolution(&self.source_id, e)),
            None => {
                let marker = Utc::now().format(DATE_MARKER_FORMAT).to_string();
                info!(source = %self.source_id, marker = %marker, "No version endpoint, using run date");
                Ok(marker)
            },
        }
    }

    async fn landing(&mut self, _ctx: &IngestContext, _marker: &str) -> Result<Landing> {
        let mut hosts = Vec::new();
        let mut artifacts = Vec::new();

        for operation in self.source.operations.iter().filter(|op| !op.is_probe()) {
            let (Some(url), Some(filename)) = (operation_url(&self.source.base_url, operation), &operation.filename)
            else {
                continue;
            };
            let request = HttpRequest::get(url.clone())
                .with_params(&operation.params)
                .with_headers(header_map(&operation.headers)?);

            hosts.push(url);
            artifacts.push(Artifact::Http {
                request,
                name: ArtifactName::Fixed(filename.clone()),
                digest: DigestMode::Compute,
            });
        }

        Ok(Landing { hosts, artifacts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_operation_url() {
        let op = ApiOperation {
            name: Some("/annotation/downloadSearch".into()),
            probe: None,
            filename: Some("a.gaf".into()),
            params: BTreeMap::new(),
            headers: BTreeMap::new(),
        };
        assert_eq!(
            operation_url("https://www.ebi.ac.uk/QuickGO/services/", &op).as_deref(),
            Some("https://www.ebi.ac.uk/QuickGO/services/annotation/downloadSearch")
        );
    }
}
