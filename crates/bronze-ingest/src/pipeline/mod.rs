//! Ingestion pipeline
//!
//! Every source runs the same sequence:
//!
//! ```text
//! resolve -> gate -> land artifacts in latest/{version} -> rotate -> manifest -> extract
//! ```
//!
//! Groups differ only in how they resolve a marker and which artifacts they
//! land, which is what a [`SourcePlan`] supplies.

pub mod api;
pub mod bioportal;
pub mod ftp;
pub mod ols;
pub mod pathway_commons;
pub mod web;

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::extraction::Extractor;
use crate::manifest::ManifestStore;
use crate::rotation;
use crate::sources::{SourceGroup, SourcesDocument};
use crate::storage::{paths, BlobStore, S3Store};
use crate::transfer::http::{filename_from_headers, filename_from_url};
use crate::transfer::{DigestMode, FtpClient, HttpRequest, TransferEngine};
use crate::versioning::{GateDecision, HttpFetcher, ResolveError};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Handles shared by every step of one task.
pub struct IngestContext {
    pub config: IngestConfig,
    pub store: Arc<dyn BlobStore>,
    pub manifest: ManifestStore,
    pub transfer: TransferEngine,
    /// Client for resolver and metadata lookups.
    pub http: HttpFetcher,
}

impl IngestContext {
    pub fn new(config: IngestConfig, store: Arc<dyn BlobStore>) -> Result<Self> {
        let manifest = ManifestStore::new(store.clone(), config.manifest_key.clone());
        let transfer = TransferEngine::new(store.clone(), &config)?;
        let http = HttpFetcher::new(config.http.resolver_timeout(), config.http.connect_timeout())
            .map_err(|e| IngestError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            config,
            store,
            manifest,
            transfer,
            http,
        })
    }

    /// Context backed by the configured S3 bucket.
    pub async fn connect(config: IngestConfig) -> Result<Self> {
        let store = S3Store::new(&config.storage, config.transfer_chunk_size).await;
        Self::new(config, Arc::new(store))
    }

    pub fn extractor(&self) -> Extractor {
        Extractor::new(self.store.clone(), self.manifest.clone())
    }
}

/// How a landed artifact is named below the version folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactName {
    Fixed(String),
    /// From `Content-Disposition`, else the URL path, else `fallback`.
    FromResponse { fallback: String },
}

pub enum Artifact {
    Http {
        request: HttpRequest,
        name: ArtifactName,
        digest: DigestMode,
    },
    Ftp {
        client: FtpClient,
        file_name: String,
        relative: String,
    },
}

impl Artifact {
    pub fn locator(&self) -> String {
        match self {
            Artifact::Http { request, .. } => request.url.clone(),
            Artifact::Ftp { client, file_name, .. } => client.location().url(file_name),
        }
    }
}

/// Artifacts of one version, plus the hosts recorded as provenance.
pub struct Landing {
    pub hosts: Vec<String>,
    pub artifacts: Vec<Artifact>,
}

#[async_trait]
pub trait SourcePlan: Send {
    fn source_id(&self) -> &str;

    /// Remote version marker. Failures become resolution errors.
    async fn resolve(&mut self, ctx: &IngestContext) -> Result<String>;

    /// What to download for `marker`. Only called once the gate is open.
    async fn landing(&mut self, ctx: &IngestContext, marker: &str) -> Result<Landing>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    UpToDate {
        version: String,
    },
    /// Gate was open but no artifact matched. The manifest is left alone.
    NothingFound {
        version: String,
    },
    Ingested {
        version: String,
        files: Vec<String>,
        moved: usize,
        extracted: Vec<String>,
    },
}

pub struct IngestionPipeline<'a> {
    ctx: &'a IngestContext,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(ctx: &'a IngestContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip_all, fields(source = %plan.source_id()))]
    pub async fn run(&self, plan: &mut dyn SourcePlan) -> Result<IngestOutcome> {
        let ctx = self.ctx;
        let source_id = plan.source_id().to_string();

        let remote = match plan.resolve(ctx).await {
            Ok(marker) if !marker.trim().is_empty() => marker.trim().to_string(),
            Ok(_) => {
                warn!("Resolver returned an empty marker, gate closed");
                return Err(IngestError::resolution(&source_id, ResolveError::format("empty version marker")));
            },
            Err(e) => {
                warn!(error = %e, "No remote version, gate closed");
                return Err(e);
            },
        };

        let stored = ctx.manifest.stored_version(&source_id).await?;
        match GateDecision::decide(Some(&remote), stored.as_deref()) {
            GateDecision::Ingest => {
                info!(remote = %remote, stored = stored.as_deref().unwrap_or("-"), "New version detected");
            },
            GateDecision::UpToDate | GateDecision::NoRemote => {
                info!(version = %remote, "Already up to date");
                return Ok(IngestOutcome::UpToDate { version: remote });
            },
        }

        let landing = plan.landing(ctx, &remote).await?;
        if landing.artifacts.is_empty() {
            warn!(version = %remote, "No artifacts matched, manifest unchanged");
            return Ok(IngestOutcome::NothingFound { version: remote });
        }

        let mut files = Vec::with_capacity(landing.artifacts.len());
        for artifact in landing.artifacts {
            files.push(self.land(&source_id, &remote, artifact).await?);
        }

        let moved = rotation::promote(ctx.store.as_ref(), &source_id, &remote).await?;
        ctx.manifest
            .record_ingestion(&source_id, &remote, landing.hosts, files.clone())
            .await?;
        let extracted = ctx.extractor().extract_source(&source_id).await?;

        info!(
            version = %remote,
            files = files.len(),
            moved,
            extracted = extracted.len(),
            "Ingestion complete"
        );
        Ok(IngestOutcome::Ingested {
            version: remote,
            files,
            moved,
            extracted,
        })
    }

    async fn land(&self, source_id: &str, marker: &str, artifact: Artifact) -> Result<String> {
        let transfer = &self.ctx.transfer;
        match artifact {
            Artifact::Http {
                request,
                name: ArtifactName::Fixed(relative),
                digest,
            } => {
                let key = paths::latest_key(source_id, marker, &relative);
                transfer.http_to_store(&request, &key, digest).await?;
                Ok(key)
            },
            Artifact::Http {
                request,
                name: ArtifactName::FromResponse { fallback },
                digest,
            } => {
                let response = transfer.fetch(&request).await?;
                let relative = filename_from_headers(response.headers())
                    .or_else(|| filename_from_url(response.url().as_str()))
                    .unwrap_or(fallback);
                let key = paths::latest_key(source_id, marker, &relative);
                transfer.upload_response(&request.url, response, &key, digest).await?;
                Ok(key)
            },
            Artifact::Ftp {
                client,
                file_name,
                relative,
            } => {
                let key = paths::latest_key(source_id, marker, &relative);
                transfer.ftp_to_store(&client, &file_name, &key, DigestMode::Skip).await?;
                Ok(key)
            },
        }
    }
}

/// Build the plan for one configured source.
pub fn plan_for(
    ctx: &IngestContext,
    sources: &SourcesDocument,
    group: SourceGroup,
    source_id: &str,
) -> Result<Box<dyn SourcePlan>> {
    let plan: Box<dyn SourcePlan> = match group {
        SourceGroup::Api => Box::new(api::ApiPlan::new(source_id, sources.api(source_id)?, &ctx.http)?),
        SourceGroup::Ftp => Box::new(ftp::FtpPlan::new(source_id, sources.ftp(source_id)?, &ctx.transfer)?),
        SourceGroup::Ols => Box::new(ols::OlsPlan::new(sources.ols(source_id)?, &sources.sources.ols_endpoint)),
        SourceGroup::Web => Box::new(web::WebPlan::new(source_id, sources.web(source_id)?, &ctx.http)?),
        SourceGroup::BioPortal => Box::new(bioportal::BioPortalPlan::new(
            sources.bioportal(source_id)?,
            &ctx.config.bioportal.base_url,
            ctx.config.bioportal_api_key()?,
        )?),
        SourceGroup::Custom => match source_id {
            pathway_commons::SOURCE_ID => Box::new(pathway_commons::PathwayCommonsPlan::new(
                &ctx.config.pathway_commons_base_url,
            )),
            other => {
                return Err(IngestError::Config(format!(
                    "no built-in flow for custom source '{other}'"
                )))
            },
        },
    };
    Ok(plan)
}

/// Resolve, gate, land and extract one configured source.
pub async fn run_source(
    ctx: &IngestContext,
    sources: &SourcesDocument,
    group: SourceGroup,
    source_id: &str,
) -> Result<IngestOutcome> {
    let mut plan = plan_for(ctx, sources, group, source_id)?;
    IngestionPipeline::new(ctx).run(plan.as_mut()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use bytes::Bytes;
    use std::sync::Mutex;

    struct StaticPlan {
        marker: std::result::Result<String, String>,
        landed: Arc<Mutex<u32>>,
        artifacts: Vec<String>,
    }

    #[async_trait]
    impl SourcePlan for StaticPlan {
        fn source_id(&self) -> &str {
            "acme"
        }

        async fn resolve(&mut self, _ctx: &IngestContext) -> Result<String> {
            self.marker
                .clone()
                .map_err(|e| IngestError::resolution("acme", ResolveError::format(e)))
        }

        async fn landing(&mut self, _ctx: &IngestContext, _marker: &str) -> Result<Landing> {
            *self.landed.lock().unwrap() += 1;
            Ok(Landing {
                hosts: vec![],
                artifacts: self
                    .artifacts
                    .iter()
                    .map(|url| Artifact::Http {
                        request: HttpRequest::get(url.clone()),
                        name: ArtifactName::Fixed("x".into()),
                        digest: DigestMode::Skip,
                    })
                    .collect(),
            })
        }
    }

    fn context() -> (Arc<MemoryStore>, IngestContext) {
        let store = Arc::new(MemoryStore::new());
        let ctx = IngestContext::new(IngestConfig::default(), store.clone()).unwrap();
        (store, ctx)
    }

    #[tokio::test]
    async fn test_resolution_failure_closes_gate() {
        let (store, ctx) = context();
        let landed = Arc::new(Mutex::new(0));
        let mut plan = StaticPlan {
            marker: Err("no table".into()),
            landed: landed.clone(),
            artifacts: vec![],
        };
        let err = IngestionPipeline::new(&ctx).run(&mut plan).await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(*landed.lock().unwrap(), 0);
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_empty_marker_closes_gate() {
        let (_, ctx) = context();
        let mut plan = StaticPlan {
            marker: Ok("  ".into()),
            landed: Arc::new(Mutex::new(0)),
            artifacts: vec![],
        };
        let err = IngestionPipeline::new(&ctx).run(&mut plan).await.unwrap_err();
        assert!(matches!(err, IngestError::Resolution { .. }));
    }

    #[tokio::test]
    async fn test_up_to_date_skips_landing() {
        let (store, ctx) = context();
        ctx.manifest
            .record_ingestion("acme", "2024-01-01", vec![], vec![])
            .await
            .unwrap();
        let before = store.get("manifest.json").await.unwrap();

        let landed = Arc::new(Mutex::new(0));
        let mut plan = StaticPlan {
            marker: Ok(" 2024-01-01\n".into()),
            landed: landed.clone(),
            artifacts: vec![],
        };
        let outcome = IngestionPipeline::new(&ctx).run(&mut plan).await.unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::UpToDate {
                version: "2024-01-01".into()
            }
        );
        assert_eq!(*landed.lock().unwrap(), 0);
        assert_eq!(store.get("manifest.json").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_nothing_found_leaves_manifest_alone() {
        let (store, ctx) = context();
        store
            .put("raw/acme/latest/old/a.txt", Bytes::from_static(b"a"))
            .await
            .unwrap();
        let mut plan = StaticPlan {
            marker: Ok("2024-02-02".into()),
            landed: Arc::new(Mutex::new(0)),
            artifacts: vec![],
        };
        let outcome = IngestionPipeline::new(&ctx).run(&mut plan).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::NothingFound { .. }));
        assert!(ctx.manifest.entry("acme").await.unwrap().is_none());
        assert!(store.exists("raw/acme/latest/old/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_transfer_failure_leaves_state_untouched() {
        let (store, ctx) = context();
        store
            .put("raw/acme/latest/old/a.txt", Bytes::from_static(b"a"))
            .await
            .unwrap();
        let mut plan = StaticPlan {
            marker: Ok("2024-02-02".into()),
            landed: Arc::new(Mutex::new(0)),
            // nothing listens on port 9
            artifacts: vec!["http://127.0.0.1:9/file".into()],
        };
        let err = IngestionPipeline::new(&ctx).run(&mut plan).await.unwrap_err();
        assert!(matches!(err, IngestError::Transfer { .. }));
        assert!(ctx.manifest.entry("acme").await.unwrap().is_none());
        assert!(store.exists("raw/acme/latest/old/a.txt").await.unwrap());
    }

    #[test]
    fn test_unknown_custom_source() {
        let (_, ctx) = context();
        let sources = SourcesDocument::default();
        let err = plan_for(&ctx, &sources, SourceGroup::Custom, "mystery").err().unwrap();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_bioportal_requires_api_key() {
        let (_, ctx) = context();
        let sources = SourcesDocument::parse("sources:\n  bioportal: [HP]\n").unwrap();
        let err = plan_for(&ctx, &sources, SourceGroup::BioPortal, "HP").err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }
}
