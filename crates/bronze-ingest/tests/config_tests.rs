//! Source document loading and task planning from files on disk

use bronze_ingest::config::JobSettings;
use bronze_ingest::jobs;
use bronze_ingest::{IngestConfig, SourceGroup, SourcesDocument};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn bundled_sources() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/sources.yaml")
}

fn write_document(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn test_bundled_sources_document_loads() {
    let sources = SourcesDocument::load(&bundled_sources()).unwrap();

    assert_eq!(sources.ids(SourceGroup::Api), vec!["quickgo", "hgnc"]);
    assert_eq!(sources.ids(SourceGroup::Ftp), vec!["ensembl", "uniprot"]);
    assert_eq!(sources.ids(SourceGroup::Ols), vec!["efo", "mondo", "hp"]);
    assert_eq!(sources.ids(SourceGroup::Custom), vec!["pathway_commons"]);
    assert!(sources.web("foodb").unwrap().version.is_some());
}

#[test]
fn test_bundled_sources_plan() {
    let sources = SourcesDocument::load(&bundled_sources()).unwrap();
    let settings = JobSettings {
        container_image: Some("registry.example.org/bronze-ingest:latest".into()),
        workdir: "/app".into(),
        binary: "bronze-ingest".into(),
    };

    let tasks = jobs::plan_tasks(&settings, &sources).unwrap();
    let total: usize = SourceGroup::ALL.iter().map(|group| sources.ids(*group).len()).sum();
    assert_eq!(tasks.len(), total);

    let custom = tasks.iter().find(|task| task.id == "custom_pathway_commons").unwrap();
    assert_eq!(custom.command_line, "bronze-ingest pathway_commons");
    let ftp = tasks.iter().find(|task| task.id == "ftp_ensembl").unwrap();
    assert_eq!(ftp.command_line, "bronze-ingest ftp --id ensembl");
    assert_eq!(ftp.container.run_options, "--workdir /app");
}

#[test]
fn test_missing_document_is_config_error() {
    let err = SourcesDocument::load(&PathBuf::from("/nonexistent/sources.yaml")).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_invalid_match_mode_rejected() {
    let file = write_document(
        r#"
sources:
  web:
    site:
      pages:
        - web_page: https://example.org
          file_rules:
            name_contains_mode: xor
"#,
    );
    let err = SourcesDocument::load(file.path()).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_unknown_source_lists_available() {
    let file = write_document("sources:\n  ols: [efo, mondo]\n");
    let sources = SourcesDocument::load(file.path()).unwrap();
    let message = sources.ols("chebi").unwrap_err().to_string();
    assert!(message.contains("efo, mondo"), "{message}");
}

#[test]
fn test_config_from_lookup_overrides() {
    let config = IngestConfig::from_lookup(|key| match key {
        "MANIFEST_KEY" => Some("state/manifest.json".into()),
        "FTP_MAX_ATTEMPTS" => Some("3".into()),
        "BRONZE_CONTAINER_IMAGE" => Some("img:1".into()),
        _ => None,
    })
    .unwrap();

    assert_eq!(config.manifest_key, "state/manifest.json");
    assert_eq!(config.ftp.max_attempts, 3);
    assert_eq!(config.jobs.container_image.as_deref(), Some("img:1"));
    assert_eq!(config.jobs.workdir, "/app");
}

#[test]
fn test_config_rejects_malformed_numbers() {
    let err = IngestConfig::from_lookup(|key| (key == "FTP_TIMEOUT_SECS").then(|| "soon".to_string())).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}
