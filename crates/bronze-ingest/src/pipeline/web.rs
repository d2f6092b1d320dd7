//! Web pages scraped for download links

use super::{Artifact, ArtifactName, IngestContext, Landing, SourcePlan};
use crate::error::{IngestError, Result};
use crate::sources::{FileRules, WebSource};
use crate::transfer::http::filename_from_url;
use crate::transfer::{DigestMode, HttpRequest};
use crate::versioning::listing::selector;
use crate::versioning::{HttpFetcher, VersionResolver};
use async_trait::async_trait;
use chrono::Utc;
use scraper::Html;
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;

/// Marker used when a site publishes no version: the UTC run date.
pub const DATE_MARKER_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub file_name: String,
}

/// Absolute links of `tag` elements whose file name matches `rules`, in page
/// order and without duplicates.
pub fn discover_links(html: &str, page_url: &str, tag: &str, rules: &FileRules) -> Result<Vec<Link>> {
    let base = Url::parse(page_url).map_err(|e| IngestError::Config(format!("invalid page URL '{page_url}': {e}")))?;
    let element_selector = selector(tag).map_err(|e| IngestError::Config(format!("invalid tag '{tag}': {e}")))?;
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for element in document.select(&element_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href.trim()) else {
            debug!(href, "Skipping unparsable link");
            continue;
        };
        let Some(file_name) = filename_from_url(url.as_str()) else {
            continue;
        };
        if !rules.matches_ignore_case(&file_name) || !seen.insert(url.to_string()) {
            continue;
        }
        links.push(Link {
            url: url.to_string(),
            file_name,
        });
    }
    Ok(links)
}

pub struct WebPlan {
    source_id: String,
    source: WebSource,
    resolver: Option<Box<dyn VersionResolver>>,
}

impl WebPlan {
    pub fn new(source_id: &str, source: &WebSource, http: &HttpFetcher) -> Result<Self> {
        let resolver = source.version.as_ref().map(|spec| spec.build(http)).transpose()?;
        Ok(Self {
            source_id: source_id.to_string(),
            source: source.clone(),
            resolver,
        })
    }
}

#[async_trait]
impl SourcePlan for WebPlan {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn resolve(&mut self, _ctx: &IngestContext) -> Result<String> {
        match &self.resolver {
            Some(resolver) => resolver
                .resolve()
                .await
                .map_err(|e| IngestError::resolution(&self.source_id, e)),
            None => Ok(Utc::now().format(DATE_MARKER_FORMAT).to_string()),
        }
    }

    async fn landing(&mut self, ctx: &IngestContext, _marker: &str) -> Result<Landing> {
        let mut seen = HashSet::new();
        let mut artifacts = Vec::new();

        for page in &self.source.pages {
            let html = ctx
                .http
                .get_text(&page.web_page)
                .await
                .map_err(|e| IngestError::transfer(&page.web_page, e))?;
            let links = discover_links(&html, &page.web_page, &page.tag, &page.file_rules)?;
            info!(page = %page.web_page, matched = links.len(), "Scanned page");

            for link in links {
                if !seen.insert(link.url.clone()) {
                    continue;
                }
                artifacts.push(Artifact::Http {
                    request: HttpRequest::get(link.url),
                    name: ArtifactName::Fixed(page.file_rules.relative_path(&link.file_name)),
                    digest: DigestMode::Compute,
                });
            }
        }

        Ok(Landing {
            hosts: self.source.pages.iter().map(|p| p.web_page.clone()).collect(),
            artifacts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MatchMode;

    const PAGE: &str = r#"
        <html><body>
          <a href="/system/downloads/current/foodb_2020_4_7_csv.zip">CSV</a>
          <a href="https://foodb.ca/system/downloads/current/foodb_2020_4_7_csv.zip">CSV again</a>
          <a href="downloads/foodb_2020_04_07_json.tar.gz">JSON</a>
          <a href="mailto:someone@example.org">mail</a>
          <a name="anchor">no href</a>
          <link href="style.css">
        </body></html>"#;

    #[test]
    fn test_discover_resolves_and_dedupes() {
        let rules = FileRules {
            extensions: vec!["zip".into(), "gz".into()],
            ..Default::default()
        };
        let links = discover_links(PAGE, "https://foodb.ca/downloads", "a", &rules).unwrap();
        assert_eq!(
            links,
            vec![
                Link {
                    url: "https://foodb.ca/system/downloads/current/foodb_2020_4_7_csv.zip".into(),
                    file_name: "foodb_2020_4_7_csv.zip".into(),
                },
                Link {
                    url: "https://foodb.ca/downloads/foodb_2020_04_07_json.tar.gz".into(),
                    file_name: "foodb_2020_04_07_json.tar.gz".into(),
                },
            ]
        );
    }

    #[test]
    fn test_discover_applies_name_rules() {
        let rules = FileRules {
            name_contains: vec!["CSV".into(), "foodb".into()],
            name_contains_mode: MatchMode::And,
            ..Default::default()
        };
        let links = discover_links(PAGE, "https://foodb.ca/downloads", "a", &rules).unwrap();
        assert_eq!(links.len(), 1);
        assert!(links[0].file_name.ends_with("csv.zip"));
    }

    #[test]
    fn test_discover_custom_tag() {
        let links = discover_links(PAGE, "https://foodb.ca/downloads", "link", &FileRules::default()).unwrap();
        assert_eq!(links[0].url, "https://foodb.ca/style.css");
    }

    #[test]
    fn test_invalid_page_url() {
        assert!(discover_links(PAGE, "not a url", "a", &FileRules::default()).is_err());
    }
}
