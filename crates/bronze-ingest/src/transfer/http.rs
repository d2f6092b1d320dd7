//! HTTP transport helpers

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION};
use std::collections::BTreeMap;
use url::Url;

/// One GET request: URL plus optional query parameters and headers.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub headers: HeaderMap,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_params(mut self, params: &BTreeMap<String, String>) -> Self {
        self.params = params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// File name announced by a `Content-Disposition` header.
///
/// `filename*` (RFC 5987) wins over `filename`. Any directory part is dropped.
pub fn content_disposition_filename(value: &HeaderValue) -> Option<String> {
    let value = value.to_str().ok()?;
    let mut plain = None;
    let mut extended = None;

    for param in value.split(';').map(str::trim) {
        let Some((name, raw)) = param.split_once('=') else {
            continue;
        };
        let raw = raw.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = raw.split_once("''").map(|(_, rest)| rest).unwrap_or(raw);
                extended = urlencoding::decode(encoded.trim_matches('"'))
                    .ok()
                    .map(|s| s.into_owned());
            },
            "filename" => plain = Some(raw.trim_matches('"').to_string()),
            _ => {},
        }
    }

    extended
        .or(plain)
        .map(|name| name.rsplit(['/', '\\']).next().unwrap_or_default().to_string())
        .filter(|name| !name.is_empty() && name != "." && name != "..")
}

pub fn filename_from_headers(headers: &HeaderMap) -> Option<String> {
    headers.get(CONTENT_DISPOSITION).and_then(content_disposition_filename)
}

/// Last path segment of a URL, if it has one.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment).ok()?.into_owned();
    (!decoded.is_empty()).then_some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_plain() {
        let value = HeaderValue::from_static(r#"attachment; filename="MEDDRA.umls""#);
        assert_eq!(content_disposition_filename(&value).as_deref(), Some("MEDDRA.umls"));

        let value = HeaderValue::from_static("attachment; filename=hp.owl");
        assert_eq!(content_disposition_filename(&value).as_deref(), Some("hp.owl"));
    }

    #[test]
    fn test_content_disposition_extended_wins() {
        let value = HeaderValue::from_static(
            r#"attachment; filename="fallback.ttl"; filename*=UTF-8''onto%20logy.ttl"#,
        );
        assert_eq!(content_disposition_filename(&value).as_deref(), Some("onto logy.ttl"));
    }

    #[test]
    fn test_content_disposition_strips_directories() {
        let value = HeaderValue::from_static(r#"attachment; filename="../../etc/passwd""#);
        assert_eq!(content_disposition_filename(&value).as_deref(), Some("passwd"));
        let value = HeaderValue::from_static("inline");
        assert_eq!(content_disposition_filename(&value), None);
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://data.bioontology.org/ontologies/HP/download?x=1").as_deref(),
            Some("download")
        );
        assert_eq!(
            filename_from_url("http://purl.obolibrary.org/obo/efo/releases/v3.62.0/efo.owl").as_deref(),
            Some("efo.owl")
        );
        assert_eq!(filename_from_url("https://example.org/"), None);
        assert_eq!(filename_from_url("not a url"), None);
    }
}
