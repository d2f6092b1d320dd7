//! Pluggable version resolvers
//!
//! Sources select a strategy in `sources.yaml` through a [`ResolverSpec`];
//! [`ResolverSpec::build`] turns it into a [`VersionResolver`] bound to the
//! task's HTTP client. Resolvers never write state and never retry.

use super::{
    dates,
    fetch::HttpFetcher,
    json::{JsonFieldResolver, Normalize},
    listing::{DirectoryListingResolver, HeaderTableQuery, HeaderTableResolver, ListingQuery, Selection},
    page::{FilenameDateResolver, PageTextResolver},
    ResolveError,
};
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

#[async_trait]
pub trait VersionResolver: Send + Sync {
    /// Short human-readable description for logs.
    fn describe(&self) -> String;

    async fn resolve(&self) -> Result<String, ResolveError>;
}

fn default_listing_column() -> usize {
    2
}

fn default_listing_date_format() -> String {
    "%Y-%m-%d %H:%M".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ResolverSpec {
    JsonField {
        url: String,
        /// JSON pointer, e.g. `/annotation/timestamp`.
        pointer: String,
        #[serde(default)]
        normalize: Normalize,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    DirectoryListing {
        url: String,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        suffix: Option<String>,
        #[serde(default)]
        contains_any: Vec<String>,
        #[serde(default = "default_listing_column")]
        column: usize,
        #[serde(default = "default_listing_date_format")]
        date_format: String,
        #[serde(default)]
        selection: Selection,
    },
    HeaderTable {
        url: String,
        column_header: String,
        date_format: String,
        #[serde(default)]
        row_contains: Vec<String>,
        #[serde(default)]
        selection: Selection,
    },
    FilenameDate {
        url: String,
        pattern: String,
    },
    PageText {
        url: String,
        pattern: String,
        #[serde(default)]
        prefix: Option<String>,
    },
    LatestOf {
        resolvers: Vec<ResolverSpec>,
    },
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| IngestError::Config(format!("invalid pattern '{pattern}': {e}")))
}

pub(crate) fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| IngestError::Config(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| IngestError::Config(format!("invalid value for header '{name}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

impl ResolverSpec {
    /// Check patterns and headers without building anything.
    pub fn validate(&self) -> Result<()> {
        match self {
            ResolverSpec::JsonField { headers, .. } => header_map(headers).map(|_| ()),
            ResolverSpec::FilenameDate { pattern, .. } => {
                let regex = compile(pattern)?;
                for group in ["year", "month", "day"] {
                    if !regex.capture_names().flatten().any(|name| name == group) {
                        return Err(IngestError::Config(format!(
                            "filename_date pattern '{pattern}' lacks a '{group}' group"
                        )));
                    }
                }
                Ok(())
            },
            ResolverSpec::PageText { pattern, .. } => {
                let regex = compile(pattern)?;
                if regex.captures_len() < 2 {
                    return Err(IngestError::Config(format!(
                        "page_text pattern '{pattern}' needs a capture group"
                    )));
                }
                Ok(())
            },
            ResolverSpec::LatestOf { resolvers } if resolvers.is_empty() => Err(IngestError::Config(
                "latest_of needs at least one resolver".to_string(),
            )),
            ResolverSpec::LatestOf { resolvers } => resolvers.iter().try_for_each(ResolverSpec::validate),
            ResolverSpec::DirectoryListing { .. } | ResolverSpec::HeaderTable { .. } => Ok(()),
        }
    }

    pub fn build(&self, http: &HttpFetcher) -> Result<Box<dyn VersionResolver>> {
        self.validate()?;

        let resolver: Box<dyn VersionResolver> = match self {
            ResolverSpec::JsonField {
                url,
                pointer,
                normalize,
                headers,
            } => Box::new(JsonFieldResolver {
                http: http.clone(),
                url: url.clone(),
                pointer: pointer.clone(),
                normalize: *normalize,
                headers: header_map(headers)?,
            }),
            ResolverSpec::DirectoryListing {
                url,
                target,
                suffix,
                contains_any,
                column,
                date_format,
                selection,
            } => Box::new(DirectoryListingResolver {
                http: http.clone(),
                url: url.clone(),
                query: ListingQuery {
                    target: target.clone(),
                    suffix: suffix.clone(),
                    contains_any: contains_any.clone(),
                    column: *column,
                    date_format: date_format.clone(),
                    selection: *selection,
                },
            }),
            ResolverSpec::HeaderTable {
                url,
                column_header,
                date_format,
                row_contains,
                selection,
            } => Box::new(HeaderTableResolver {
                http: http.clone(),
                url: url.clone(),
                query: HeaderTableQuery {
                    column_header: column_header.clone(),
                    date_format: date_format.clone(),
                    row_contains: row_contains.clone(),
                    selection: *selection,
                },
            }),
            ResolverSpec::FilenameDate { url, pattern } => Box::new(FilenameDateResolver {
                http: http.clone(),
                url: url.clone(),
                pattern: compile(pattern)?,
            }),
            ResolverSpec::PageText { url, pattern, prefix } => Box::new(PageTextResolver {
                http: http.clone(),
                url: url.clone(),
                pattern: compile(pattern)?,
                prefix: prefix.clone(),
            }),
            ResolverSpec::LatestOf { resolvers } => Box::new(LatestOf::new(
                resolvers
                    .iter()
                    .map(|spec| spec.build(http))
                    .collect::<Result<Vec<_>>>()?,
            )),
        };

        Ok(resolver)
    }
}

/// Combine several resolvers and keep the latest marker.
pub struct LatestOf {
    resolvers: Vec<Box<dyn VersionResolver>>,
}

impl LatestOf {
    pub fn new(resolvers: Vec<Box<dyn VersionResolver>>) -> Self {
        Self { resolvers }
    }
}

/// Latest of several markers: by date when all parse as dates, otherwise the
/// lexicographic maximum.
pub fn latest_marker(markers: &[String]) -> Option<String> {
    let parsed: Option<Vec<_>> = markers.iter().map(|m| dates::parse_flexible(m)).collect();
    match parsed {
        Some(parsed) => parsed.into_iter().max().map(dates::to_marker),
        None => markers.iter().max().cloned(),
    }
}

#[async_trait]
impl VersionResolver for LatestOf {
    fn describe(&self) -> String {
        let parts: Vec<String> = self.resolvers.iter().map(|r| r.describe()).collect();
        format!("latest of [{}]", parts.join(", "))
    }

    async fn resolve(&self) -> Result<String, ResolveError> {
        let mut markers = Vec::with_capacity(self.resolvers.len());
        for resolver in &self.resolvers {
            let marker = resolver.resolve().await?;
            debug!(resolver = %resolver.describe(), marker = %marker, "Candidate marker");
            markers.push(marker);
        }
        latest_marker(&markers).ok_or_else(|| ResolveError::format("no resolvers configured"))
    }
}
