//! Task descriptions for the external task runner
//!
//! One task per configured source. Submitting them is the scheduler's job;
//! this module only produces what it needs: an id, a command line and the
//! container and identity settings.

use crate::config::JobSettings;
use crate::error::{IngestError, Result};
use crate::sources::{SourceGroup, SourcesDocument};
use serde::Serialize;

/// `(group, source_id)` for every configured source, group by group.
pub fn enumerate_sources(sources: &SourcesDocument) -> Vec<(SourceGroup, String)> {
    SourceGroup::ALL
        .into_iter()
        .flat_map(|group| sources.ids(group).into_iter().map(move |id| (group, id.to_string())))
        .collect()
}

/// Grouped sources share one entry point parameterised by `--id`; custom
/// sources have a dedicated subcommand named after the source.
pub fn build_command_line(binary: &str, group: SourceGroup, source_id: &str) -> String {
    match group {
        SourceGroup::Custom => format!("{binary} {source_id}"),
        group => format!("{binary} {group} --id {source_id}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkingDirectory {
    ContainerImageDefault,
    TaskWorkingDirectory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSettings {
    pub image: String,
    pub run_options: String,
    pub working_directory: WorkingDirectory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Elevation {
    NonAdmin,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserIdentity {
    pub scope: String,
    pub elevation: Elevation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSpec {
    pub id: String,
    pub command_line: String,
    pub container: ContainerSettings,
    pub user: UserIdentity,
}

pub fn build_task(settings: &JobSettings, image: &str, group: SourceGroup, source_id: &str) -> TaskSpec {
    TaskSpec {
        id: format!("{group}_{source_id}"),
        command_line: build_command_line(&settings.binary, group, source_id),
        container: ContainerSettings {
            image: image.to_string(),
            run_options: format!("--workdir {}", settings.workdir),
            working_directory: WorkingDirectory::ContainerImageDefault,
        },
        user: UserIdentity {
            scope: "pool".to_string(),
            elevation: Elevation::NonAdmin,
        },
    }
}

/// Every task for the document. The container image is required here and
/// nowhere else.
pub fn plan_tasks(settings: &JobSettings, sources: &SourcesDocument) -> Result<Vec<TaskSpec>> {
    let image = settings
        .container_image
        .as_deref()
        .filter(|image| !image.trim().is_empty())
        .ok_or_else(|| IngestError::Config("BRONZE_CONTAINER_IMAGE is required to plan tasks".into()))?;

    Ok(enumerate_sources(sources)
        .into_iter()
        .map(|(group, id)| build_task(settings, image, group, &id))
        .collect())
}
