//! FTP directory sources
//!
//! The version is the newest modification date among the files that match
//! the host's rules. Every matched file lands in that one version folder.

use super::{Artifact, IngestContext, Landing, SourcePlan};
use crate::error::{IngestError, Result};
use crate::sources::{FileRules, FtpHost};
use crate::transfer::{FtpClient, FtpLocation, TransferEngine};
use crate::versioning::{dates, ResolveError};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::{info, warn};

struct HostPlan {
    client: FtpClient,
    rules: FileRules,
    matched: Vec<String>,
}

pub struct FtpPlan {
    source_id: String,
    hosts: Vec<HostPlan>,
}

impl FtpPlan {
    pub fn new(source_id: &str, hosts: &[FtpHost], transfer: &TransferEngine) -> Result<Self> {
        let hosts = hosts
            .iter()
            .map(|host| {
                Ok(HostPlan {
                    client: transfer.ftp_client(FtpLocation::parse(&host.host)?),
                    rules: host.file_rules.clone(),
                    matched: Vec::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            source_id: source_id.to_string(),
            hosts,
        })
    }
}

/// Names with a known modification time, and the newest of those times.
pub fn newest(times: Vec<(String, Option<NaiveDateTime>)>) -> (Vec<String>, Option<NaiveDateTime>) {
    let mut kept = Vec::with_capacity(times.len());
    let mut latest: Option<NaiveDateTime> = None;
    for (name, time) in times {
        if let Some(time) = time {
            latest = Some(latest.map_or(time, |current| current.max(time)));
            kept.push(name);
        }
    }
    (kept, latest)
}

#[async_trait]
impl SourcePlan for FtpPlan {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn resolve(&mut self, _ctx: &IngestContext) -> Result<String> {
        let mut latest: Option<NaiveDateTime> = None;

        for host in &mut self.hosts {
            let candidates: Vec<String> = host
                .client
                .list()
                .await?
                .into_iter()
                .filter(|name| host.rules.matches(name))
                .collect();

            if candidates.is_empty() {
                warn!(host = %host.client.location().display_host(), "No matching files");
                continue;
            }

            let (kept, newest_here) = newest(host.client.modified_times(candidates).await?);
            host.matched = kept;
            latest = match (latest, newest_here) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
        }

        let latest = latest.ok_or_else(|| {
            IngestError::resolution(
                &self.source_id,
                ResolveError::Ftp("no matching file with a readable modification time".into()),
            )
        })?;
        let marker = dates::to_marker(latest.date());
        info!(source = %self.source_id, marker = %marker, "Resolved version from FTP modification times");
        Ok(marker)
    }

    async fn landing(&mut self, _ctx: &IngestContext, _marker: &str) -> Result<Landing> {
        let mut hosts = Vec::new();
        let mut artifacts = Vec::new();

        for host in &self.hosts {
            if host.matched.is_empty() {
                continue;
            }
            hosts.push(host.client.location().display_host());
            for name in &host.matched {
                artifacts.push(Artifact::Ftp {
                    client: host.client.clone(),
                    file_name: name.clone(),
                    relative: host.rules.relative_path(name),
                });
            }
        }

        hosts.sort();
        hosts.dedup();
        Ok(Landing { hosts, artifacts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(y, m, d).and_then(|date| date.and_hms_opt(12, 0, 0))
    }

    #[test]
    fn test_newest_skips_unknown_times() {
        let (kept, latest) = newest(vec![
            ("a.gz".into(), at(2024, 1, 5)),
            ("b.gz".into(), None),
            ("c.gz".into(), at(2024, 2, 1)),
        ]);
        assert_eq!(kept, vec!["a.gz", "c.gz"]);
        assert_eq!(latest, at(2024, 2, 1));
    }

    #[test]
    fn test_newest_all_unknown() {
        let (kept, latest) = newest(vec![("a.gz".into(), None)]);
        assert!(kept.is_empty());
        assert!(latest.is_none());
    }
}
