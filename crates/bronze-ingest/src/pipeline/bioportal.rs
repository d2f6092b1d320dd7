//! BioPortal ontologies
//!
//! Resolution is two lookups: the ontology record names its latest
//! submission, and the submission carries the creation date and the
//! download link. Every call, the download included, carries the API key.

use super::{Artifact, ArtifactName, IngestContext, Landing, SourcePlan};
use crate::error::{IngestError, Result};
use crate::transfer::{DigestMode, HttpRequest};
use crate::versioning::{dates, ResolveError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub version: String,
    pub download_url: String,
}

fn pointer_str<'v>(document: &'v Value, pointer: &str) -> Option<&'v str> {
    document
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn parse_latest_submission_link(ontology: &Value) -> std::result::Result<String, ResolveError> {
    pointer_str(ontology, "/links/latest_submission")
        .map(str::to_string)
        .ok_or_else(|| ResolveError::format("ontology record has no 'links.latest_submission'"))
}

/// Marker is the submission's creation date as `YYYY-MM-DD`.
pub fn parse_submission(submission: &Value) -> std::result::Result<Submission, ResolveError> {
    let created = pointer_str(submission, "/creationDate")
        .ok_or_else(|| ResolveError::format("submission does not expose 'creationDate'"))?;
    let date = dates::parse_flexible(created)
        .ok_or_else(|| ResolveError::format(format!("unparsable creationDate '{created}'")))?;
    let download_url = pointer_str(submission, "/ontology/links/download")
        .ok_or_else(|| ResolveError::format("submission has no 'ontology.links.download'"))?;

    Ok(Submission {
        version: dates::to_marker(date),
        download_url: download_url.to_string(),
    })
}

pub struct BioPortalPlan {
    ontology_id: String,
    base_url: String,
    headers: HeaderMap,
    resolved: Option<(String, Submission)>,
}

impl BioPortalPlan {
    pub fn new(ontology_id: &str, base_url: &str, api_key: &str) -> Result<Self> {
        let token = HeaderValue::from_str(&format!("apikey token={api_key}"))
            .map_err(|_| IngestError::Config("BIOPORTAL_API_KEY is not a valid header value".into()))?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, token);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(Self {
            ontology_id: ontology_id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
            resolved: None,
        })
    }

    fn ontology_url(&self) -> String {
        format!("{}/ontologies/{}", self.base_url, self.ontology_id)
    }
}

#[async_trait]
impl SourcePlan for BioPortalPlan {
    fn source_id(&self) -> &str {
        &self.ontology_id
    }

    async fn resolve(&mut self, ctx: &IngestContext) -> Result<String> {
        let lookup = async {
            let ontology = ctx.http.get_json(&self.ontology_url(), &self.headers).await?;
            let submission_url = parse_latest_submission_link(&ontology)?;
            let submission = ctx.http.get_json(&submission_url, &self.headers).await?;
            Ok::<_, ResolveError>((submission_url, parse_submission(&submission)?))
        };
        let (submission_url, submission) = lookup
            .await
            .map_err(|e| IngestError::resolution(&self.ontology_id, e))?;

        info!(
            ontology = %self.ontology_id,
            version = %submission.version,
            download = %submission.download_url,
            "Resolved BioPortal submission"
        );
        let version = submission.version.clone();
        self.resolved = Some((submission_url, submission));
        Ok(version)
    }

    async fn landing(&mut self, _ctx: &IngestContext, _marker: &str) -> Result<Landing> {
        let (submission_url, submission) = self
            .resolved
            .as_ref()
            .ok_or_else(|| IngestError::Config("BioPortal submission requested before resolution".into()))?;

        let mut headers = self.headers.clone();
        headers.remove(ACCEPT);

        Ok(Landing {
            hosts: vec![submission_url.clone()],
            artifacts: vec![Artifact::Http {
                request: HttpRequest::get(submission.download_url.clone()).with_headers(headers),
                name: ArtifactName::FromResponse {
                    fallback: format!("{}.ttl", self.ontology_id),
                },
                digest: DigestMode::Compute,
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_latest_submission_link() {
        let doc = json!({"acronym": "HP", "links": {
            "latest_submission": "https://data.bioontology.org/ontologies/HP/latest_submission"
        }});
        assert_eq!(
            parse_latest_submission_link(&doc).unwrap(),
            "https://data.bioontology.org/ontologies/HP/latest_submission"
        );
        assert!(parse_latest_submission_link(&json!({"links": {}})).is_err());
    }

    #[test]
    fn test_submission_marker_is_creation_date() {
        let doc = json!({
            "creationDate": "2024-04-26T01:06:27-07:00",
            "ontology": {"links": {"download": "https://data.bioontology.org/ontologies/HP/download"}}
        });
        assert_eq!(
            parse_submission(&doc).unwrap(),
            Submission {
                version: "2024-04-26".into(),
                download_url: "https://data.bioontology.org/ontologies/HP/download".into(),
            }
        );
    }

    #[test]
    fn test_submission_without_date() {
        let doc = json!({"ontology": {"links": {"download": "https://x/download"}}});
        assert!(matches!(parse_submission(&doc).unwrap_err(), ResolveError::Format(_)));
    }

    #[test]
    fn test_invalid_key_is_config_error() {
        let err = BioPortalPlan::new("HP", "https://data.bioontology.org", "bad\nkey").err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }
}
