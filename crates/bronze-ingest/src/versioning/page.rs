//! Resolvers reading a marker out of page links or visible page text

use super::{dates, fetch::HttpFetcher, listing::selector, resolver::VersionResolver, ResolveError};
use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use scraper::Html;
use tracing::info;

/// Date embedded in a linked file name.
///
/// `pattern` must define the named groups `year`, `month` and `day`, e.g.
/// `drugcentral\.dump\.(?P<day>\d{2})(?P<month>\d{2})(?P<year>\d{4})\.sql\.gz`.
pub fn parse_filename_date(html: &str, pattern: &Regex) -> Result<String, ResolveError> {
    let document = Html::parse_document(html);
    let link_selector = selector("a[href]")?;

    for link in document.select(&link_selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(caps) = pattern.captures(href) else {
            continue;
        };

        let field = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u32>().ok());
        let date = match (field("year"), field("month"), field("day")) {
            (Some(year), Some(month), Some(day)) => NaiveDate::from_ymd_opt(year as i32, month, day),
            _ => None,
        };

        return date.map(dates::to_marker).ok_or_else(|| ResolveError::Date {
            value: href.to_string(),
            format: pattern.as_str().to_string(),
        });
    }

    Err(ResolveError::format(format!(
        "no link matching '{}' on page",
        pattern.as_str()
    )))
}

/// Marker captured by the first group of `pattern` in the page's visible text.
///
/// Trailing dots are dropped and `prefix` is prepended, so
/// "Human Protein Atlas version 23.0." with prefix `v` yields `v23.0`.
pub fn parse_page_text(html: &str, pattern: &Regex, prefix: Option<&str>) -> Result<String, ResolveError> {
    let document = Html::parse_document(html);
    let text = document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let value = pattern
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().trim_end_matches('.'))
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ResolveError::format(format!("page text does not match '{}'", pattern.as_str()))
        })?;

    Ok(format!("{}{}", prefix.unwrap_or_default(), value))
}

pub struct FilenameDateResolver {
    pub(crate) http: HttpFetcher,
    pub(crate) url: String,
    pub(crate) pattern: Regex,
}

#[async_trait]
impl VersionResolver for FilenameDateResolver {
    fn describe(&self) -> String {
        format!("file name date on {}", self.url)
    }

    async fn resolve(&self) -> Result<String, ResolveError> {
        let html = self.http.get_text(&self.url).await?;
        let marker = parse_filename_date(&html, &self.pattern)?;
        info!(url = %self.url, marker = %marker, "Resolved version from file name");
        Ok(marker)
    }
}

pub struct PageTextResolver {
    pub(crate) http: HttpFetcher,
    pub(crate) url: String,
    pub(crate) pattern: Regex,
    pub(crate) prefix: Option<String>,
}

#[async_trait]
impl VersionResolver for PageTextResolver {
    fn describe(&self) -> String {
        format!("page text on {}", self.url)
    }

    async fn resolve(&self) -> Result<String, ResolveError> {
        let html = self.http.get_text(&self.url).await?;
        let marker = parse_page_text(&html, &self.pattern, self.prefix.as_deref())?;
        info!(url = %self.url, marker = %marker, "Resolved version from page text");
        Ok(marker)
    }
}
