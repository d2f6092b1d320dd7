//! Pathway Commons PC2 HGNC export
//!
//! The download site has one `vNN/` folder per release. Each folder is
//! probed for the export with a HEAD request and the one with the newest
//! `Last-Modified` wins; that date is the marker.

use super::{Artifact, ArtifactName, IngestContext, Landing, SourcePlan};
use crate::error::{IngestError, Result};
use crate::transfer::{DigestMode, HttpRequest};
use crate::versioning::listing::selector;
use crate::versioning::{dates, ResolveError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::LAST_MODIFIED;
use reqwest::StatusCode;
use scraper::Html;
use tracing::{debug, info};

pub const SOURCE_ID: &str = "pathway_commons";
pub const TARGET_FILENAME: &str = "pc-hgnc.txt.gz";

/// Release folders (`v12`, `v14/`, ...) linked from the index page, in page order.
pub fn discover_versions(html: &str) -> std::result::Result<Vec<String>, ResolveError> {
    let anchors = selector("a[href]")?;
    let document = Html::parse_document(html);

    let mut versions: Vec<String> = Vec::new();
    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let name = href.trim().trim_matches('/');
        let is_release = name
            .strip_prefix('v')
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()));
        if is_release && !versions.iter().any(|v| v == name) {
            versions.push(name.to_string());
        }
    }
    Ok(versions)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Release {
    folder: String,
    last_modified: DateTime<Utc>,
}

pub struct PathwayCommonsPlan {
    base_url: String,
    release: Option<Release>,
}

impl PathwayCommonsPlan {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            release: None,
        }
    }

    fn folder_url(&self, folder: &str) -> String {
        format!("{}/{}", self.base_url, folder)
    }

    fn file_url(&self, folder: &str) -> String {
        format!("{}/{}/{}", self.base_url, folder, TARGET_FILENAME)
    }

    /// `Last-Modified` of the export in one folder, `None` when the probe fails.
    async fn probe(&self, ctx: &IngestContext, folder: &str) -> Option<DateTime<Utc>> {
        let url = self.file_url(folder);
        let response = match ctx.http.head(&url).await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %url, error = %e, "Probe failed");
                return None;
            },
        };
        if response.status() != StatusCode::OK {
            debug!(url = %url, status = %response.status(), "Export missing");
            return None;
        }
        response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(dates::parse_http_date)
    }
}

#[async_trait]
impl SourcePlan for PathwayCommonsPlan {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    async fn resolve(&mut self, ctx: &IngestContext) -> Result<String> {
        let index = format!("{}/", self.base_url);
        let html = ctx
            .http
            .get_text(&index)
            .await
            .map_err(|e| IngestError::resolution(SOURCE_ID, e))?;
        let versions = discover_versions(&html).map_err(|e| IngestError::resolution(SOURCE_ID, e))?;
        if versions.is_empty() {
            return Err(IngestError::resolution(
                SOURCE_ID,
                ResolveError::format("no release folders linked from the index"),
            ));
        }

        let mut best: Option<Release> = None;
        for folder in versions {
            let Some(last_modified) = self.probe(ctx, &folder).await else {
                continue;
            };
            if best.as_ref().map_or(true, |b| last_modified > b.last_modified) {
                best = Some(Release { folder, last_modified });
            }
        }

        let release = best.ok_or_else(|| {
            IngestError::resolution(
                SOURCE_ID,
                ResolveError::format(format!("no release folder serves {TARGET_FILENAME} with a Last-Modified date")),
            )
        })?;

        let marker = dates::to_marker(release.last_modified.date_naive());
        info!(folder = %release.folder, marker = %marker, "Resolved Pathway Commons release");
        self.release = Some(release);
        Ok(marker)
    }

    async fn landing(&mut self, _ctx: &IngestContext, _marker: &str) -> Result<Landing> {
        let release = self
            .release
            .as_ref()
            .ok_or_else(|| IngestError::Config("Pathway Commons release requested before resolution".into()))?;

        Ok(Landing {
            hosts: vec![self.folder_url(&release.folder)],
            artifacts: vec![Artifact::Http {
                request: HttpRequest::get(self.file_url(&release.folder)),
                name: ArtifactName::Fixed(TARGET_FILENAME.to_string()),
                digest: DigestMode::Compute,
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_versions() {
        let html = r#"<html><body><pre>
            <a href="../">../</a>
            <a href="v12/">v12/</a>
            <a href="v14/">v14/</a>
            <a href="v14">v14</a>
            <a href="vlatest/">vlatest/</a>
            <a href="v/">v/</a>
            <a href="README.txt">README.txt</a>
        </pre></body></html>"#;
        assert_eq!(discover_versions(html).unwrap(), vec!["v12", "v14"]);
    }

    #[test]
    fn test_urls() {
        let plan = PathwayCommonsPlan::new("https://download.baderlab.org/PathwayCommons/PC2/");
        assert_eq!(plan.folder_url("v14"), "https://download.baderlab.org/PathwayCommons/PC2/v14");
        assert_eq!(
            plan.file_url("v14"),
            "https://download.baderlab.org/PathwayCommons/PC2/v14/pc-hgnc.txt.gz"
        );
    }
}
