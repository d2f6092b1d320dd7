//! Storage key layout shared with downstream readers
//!
//! ```text
//! raw/{source}/latest/{version}/{relative}
//! raw/{source}/releases/{version}/{relative}
//! extracted/{source}/{zone}/{version}/{relative}
//! ```

pub const RAW_ROOT: &str = "raw";
pub const EXTRACTED_ROOT: &str = "extracted";
pub const LATEST_ZONE: &str = "latest";
pub const RELEASES_ZONE: &str = "releases";

/// Turn a version marker into a single path segment.
///
/// Path separators and whitespace become `_` so a marker can never add
/// levels to the hierarchy.
pub fn version_segment(marker: &str) -> String {
    let segment: String = marker
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_whitespace() { '_' } else { c })
        .collect();

    match segment.as_str() {
        "" | "." | ".." => "_".repeat(segment.len().max(1)),
        _ => segment,
    }
}

/// Prefix holding every version currently under `latest/` for a source.
pub fn latest_prefix(source_id: &str) -> String {
    format!("{RAW_ROOT}/{source_id}/{LATEST_ZONE}/")
}

pub fn latest_key(source_id: &str, marker: &str, relative: &str) -> String {
    format!(
        "{RAW_ROOT}/{source_id}/{LATEST_ZONE}/{}/{}",
        version_segment(marker),
        relative.trim_start_matches('/')
    )
}

/// Release key for an object that already lives under `latest/{segment}/`.
pub fn release_key(source_id: &str, segment: &str, relative: &str) -> String {
    format!("{RAW_ROOT}/{source_id}/{RELEASES_ZONE}/{segment}/{relative}")
}

/// Components of a key under `raw/{source}/latest/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestObject<'a> {
    pub source_id: &'a str,
    pub segment: &'a str,
    pub relative: &'a str,
}

/// Split a `latest/` key. Keys with fewer than five segments are not
/// version-scoped objects and yield `None`.
pub fn parse_latest_key(key: &str) -> Option<LatestObject<'_>> {
    let mut parts = key.splitn(5, '/');
    let root = parts.next()?;
    let source_id = parts.next()?;
    let zone = parts.next()?;
    let segment = parts.next()?;
    let relative = parts.next()?;

    if root != RAW_ROOT || zone != LATEST_ZONE || source_id.is_empty() || segment.is_empty() {
        return None;
    }

    Some(LatestObject {
        source_id,
        segment,
        relative,
    })
}

/// Mirror a raw key into the extracted zone, keeping the rest of the path.
pub fn extracted_key(raw_key: &str) -> Option<String> {
    raw_key
        .strip_prefix(RAW_ROOT)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|rest| format!("{EXTRACTED_ROOT}/{rest}"))
}

/// Last path segment of a key or URL path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
