//! Metadata-field resolver: read one field out of a JSON endpoint

use super::{dates, fetch::HttpFetcher, resolver::VersionResolver, ResolveError};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalize {
    /// Parse the field as a date and emit `YYYY-MM-DD`.
    #[default]
    Date,
    /// Use the field verbatim.
    Raw,
}

/// Pull the value at `pointer` (RFC 6901) out of `document` as a marker.
pub fn extract_field(document: &Value, pointer: &str, normalize: Normalize) -> Result<String, ResolveError> {
    let value = document
        .pointer(pointer)
        .ok_or_else(|| ResolveError::format(format!("field '{pointer}' not present in response")))?;

    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(ResolveError::format(format!(
                "field '{pointer}' is not a string or number: {other}"
            )))
        },
    };

    if text.is_empty() {
        return Err(ResolveError::format(format!("field '{pointer}' is empty")));
    }

    match normalize {
        Normalize::Raw => Ok(text),
        Normalize::Date => dates::parse_flexible(&text)
            .map(dates::to_marker)
            .ok_or(ResolveError::Date {
                value: text,
                format: "RFC 3339, YYYY-MM-DD[ HH:MM[:SS]] or epoch milliseconds".to_string(),
            }),
    }
}

pub struct JsonFieldResolver {
    pub(crate) http: HttpFetcher,
    pub(crate) url: String,
    pub(crate) pointer: String,
    pub(crate) normalize: Normalize,
    pub(crate) headers: HeaderMap,
}

#[async_trait]
impl VersionResolver for JsonFieldResolver {
    fn describe(&self) -> String {
        format!("json field {} of {}", self.pointer, self.url)
    }

    async fn resolve(&self) -> Result<String, ResolveError> {
        let document = self.http.get_json(&self.url, &self.headers).await?;
        let marker = extract_field(&document, &self.pointer, self.normalize)?;
        info!(url = %self.url, marker = %marker, "Resolved version from JSON field");
        Ok(marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hgnc_last_modified() {
        let doc = json!({"lastModified": "2024-01-17T10:31:00Z", "numDoc": 44000});
        assert_eq!(extract_field(&doc, "/lastModified", Normalize::Date).unwrap(), "2024-01-17");
    }

    #[test]
    fn test_nested_epoch_millis() {
        let doc = json!({"annotation": {"timestamp": 1705487460000i64}});
        assert_eq!(
            extract_field(&doc, "/annotation/timestamp", Normalize::Date).unwrap(),
            "2024-01-17"
        );
    }

    #[test]
    fn test_raw_marker_is_verbatim() {
        let doc = json!({"config": {"version": "2024-01-03"}});
        assert_eq!(extract_field(&doc, "/config/version", Normalize::Raw).unwrap(), "2024-01-03");
        let doc = json!({"config": {"version": " releases/2024 "}});
        assert_eq!(extract_field(&doc, "/config/version", Normalize::Raw).unwrap(), "releases/2024");
    }

    #[test]
    fn test_missing_or_malformed_field() {
        let doc = json!({"config": {"version": null}});
        assert!(matches!(
            extract_field(&doc, "/config/missing", Normalize::Raw).unwrap_err(),
            ResolveError::Format(_)
        ));
        assert!(matches!(
            extract_field(&doc, "/config/version", Normalize::Raw).unwrap_err(),
            ResolveError::Format(_)
        ));
        let doc = json!({"lastModified": "soon"});
        assert!(matches!(
            extract_field(&doc, "/lastModified", Normalize::Date).unwrap_err(),
            ResolveError::Date { .. }
        ));
    }
}
