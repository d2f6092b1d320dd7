//! Table scraping resolvers
//!
//! Directory listings (Apache-style `<tr><td>` indexes) and download pages
//! whose tables carry a dated column under a named header.

use super::{dates, fetch::HttpFetcher, resolver::VersionResolver, ResolveError};
use async_trait::async_trait;
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    /// The first matching row decides.
    #[default]
    First,
    /// Latest date over every matching row.
    Latest,
}

pub fn selector(css: &str) -> Result<Selector, ResolveError> {
    Selector::parse(css).map_err(|e| ResolveError::format(format!("invalid selector '{css}': {e}")))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingQuery {
    /// Substring the link text must contain.
    pub target: Option<String>,
    /// Case-insensitive suffix the link text must end with.
    pub suffix: Option<String>,
    /// Case-insensitive tokens of which the link text must contain at least one.
    pub contains_any: Vec<String>,
    /// Zero-based `<td>` index of the last-modified column.
    pub column: usize,
    pub date_format: String,
    pub selection: Selection,
}

impl ListingQuery {
    fn matches(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.target.as_deref().map_or(true, |t| name.contains(t))
            && self
                .suffix
                .as_deref()
                .map_or(true, |s| lower.ends_with(&s.to_lowercase()))
            && (self.contains_any.is_empty()
                || self.contains_any.iter().any(|t| lower.contains(&t.to_lowercase())))
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(target) = &self.target {
            parts.push(format!("containing '{target}'"));
        }
        if let Some(suffix) = &self.suffix {
            parts.push(format!("ending '{suffix}'"));
        }
        if !self.contains_any.is_empty() {
            parts.push(format!("with any of {:?}", self.contains_any));
        }
        if parts.is_empty() {
            "any entry".to_string()
        } else {
            format!("entry {}", parts.join(" "))
        }
    }
}

/// Find the last-modified date of the matching entry in a directory listing.
///
/// With [`Selection::First`] an unparsable date on the matched row is an
/// error. With [`Selection::Latest`] unparsable rows are skipped.
pub fn parse_directory_listing(html: &str, query: &ListingQuery) -> Result<String, ResolveError> {
    let document = Html::parse_document(html);
    let row_selector = selector("tr")?;
    let link_selector = selector("a")?;
    let cell_selector = selector("td")?;

    let rows: Vec<ElementRef<'_>> = document.select(&row_selector).collect();
    if rows.is_empty() {
        return Err(ResolveError::format("no table rows found in directory listing"));
    }

    let mut found: Vec<NaiveDate> = Vec::new();

    for row in rows {
        let Some(link) = row.select(&link_selector).next() else {
            continue;
        };
        let name = text_of(link);
        if !query.matches(&name) {
            continue;
        }

        let cells: Vec<ElementRef<'_>> = row.select(&cell_selector).collect();
        let Some(cell) = cells.get(query.column) else {
            continue;
        };
        let raw = text_of(*cell);
        if raw.is_empty() {
            continue;
        }

        match query.selection {
            Selection::First => {
                let date = dates::parse_with_format(&raw, &query.date_format)?;
                return Ok(dates::to_marker(date));
            },
            Selection::Latest => match dates::parse_with_format(&raw, &query.date_format) {
                Ok(date) => found.push(date),
                Err(_) => warn!(entry = %name, value = %raw, "Skipping unparsable timestamp"),
            },
        }
    }

    found
        .into_iter()
        .max()
        .map(dates::to_marker)
        .ok_or_else(|| {
            ResolveError::format(format!("no {} found in directory listing", query.describe()))
        })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderTableQuery {
    pub column_header: String,
    pub date_format: String,
    /// Case-insensitive tokens that must all appear in the row text.
    pub row_contains: Vec<String>,
    pub selection: Selection,
}

/// Read a dated column, located by its `<thead>` header, from page tables.
///
/// Rows whose date does not parse are skipped.
pub fn parse_header_table(html: &str, query: &HeaderTableQuery) -> Result<String, ResolveError> {
    let document = Html::parse_document(html);
    let table_selector = selector("table")?;
    let header_selector = selector("thead th")?;
    let row_selector = selector("tbody tr")?;
    let cell_selector = selector("td")?;

    let tokens: Vec<String> = query.row_contains.iter().map(|t| t.to_lowercase()).collect();
    let mut saw_column = false;
    let mut found: Vec<NaiveDate> = Vec::new();

    for table in document.select(&table_selector) {
        let headers: Vec<String> = table.select(&header_selector).map(text_of).collect();
        let Some(index) = headers.iter().position(|h| h == &query.column_header) else {
            continue;
        };
        saw_column = true;

        for row in table.select(&row_selector) {
            let cells: Vec<String> = row.select(&cell_selector).map(text_of).collect();
            let Some(raw) = cells.get(index) else {
                continue;
            };

            let row_text = cells.join(" ").to_lowercase();
            if !tokens.iter().all(|t| row_text.contains(t)) {
                continue;
            }

            match dates::parse_with_format(raw, &query.date_format) {
                Ok(date) if query.selection == Selection::First => return Ok(dates::to_marker(date)),
                Ok(date) => found.push(date),
                Err(_) => warn!(value = %raw, column = %query.column_header, "Skipping unparsable date"),
            }
        }
    }

    if !saw_column {
        return Err(ResolveError::format(format!(
            "no table with a '{}' column",
            query.column_header
        )));
    }

    found.into_iter().max().map(dates::to_marker).ok_or_else(|| {
        ResolveError::format(format!(
            "no matching row with a parsable '{}' date",
            query.column_header
        ))
    })
}

pub struct DirectoryListingResolver {
    pub(crate) http: HttpFetcher,
    pub(crate) url: String,
    pub(crate) query: ListingQuery,
}

#[async_trait]
impl VersionResolver for DirectoryListingResolver {
    fn describe(&self) -> String {
        format!("directory listing {} ({})", self.url, self.query.describe())
    }

    async fn resolve(&self) -> Result<String, ResolveError> {
        let html = self.http.get_text(&self.url).await?;
        let marker = parse_directory_listing(&html, &self.query)?;
        info!(url = %self.url, marker = %marker, "Resolved version from directory listing");
        Ok(marker)
    }
}

pub struct HeaderTableResolver {
    pub(crate) http: HttpFetcher,
    pub(crate) url: String,
    pub(crate) query: HeaderTableQuery,
}

#[async_trait]
impl VersionResolver for HeaderTableResolver {
    fn describe(&self) -> String {
        format!("'{}' column of {}", self.query.column_header, self.url)
    }

    async fn resolve(&self) -> Result<String, ResolveError> {
        let html = self.http.get_text(&self.url).await?;
        let marker = parse_header_table(&html, &self.query)?;
        info!(url = %self.url, marker = %marker, "Resolved version from page table");
        Ok(marker)
    }
}
