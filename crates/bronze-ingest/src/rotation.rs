//! Folder rotation: keep only the current version under `latest/`
//!
//! Every object under `raw/{source}/latest/` whose version segment differs
//! from the new one is copied to `raw/{source}/releases/{its version}/` and
//! only then deleted. A crash between the two leaves a duplicate, never a
//! loss, and running the rotation again finishes the job.

use crate::error::{IngestError, Result};
use crate::storage::{paths, BlobStore};
use crate::transfer::relocate;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub from: String,
    pub to: String,
}

/// Moves needed to leave only `segment` under the source's `latest/`.
pub fn plan_moves<'a, I>(source_id: &str, segment: &str, keys: I) -> Vec<PlannedMove>
where
    I: IntoIterator<Item = &'a str>,
{
    keys.into_iter()
        .filter_map(|key| {
            let Some(object) = paths::parse_latest_key(key) else {
                warn!(key, "Unversioned object under latest/, leaving in place");
                return None;
            };
            if object.source_id != source_id || object.segment == segment {
                return None;
            }
            Some(PlannedMove {
                from: key.to_string(),
                to: paths::release_key(source_id, object.segment, object.relative),
            })
        })
        .collect()
}

/// Promote `marker` to be the only version under `latest/`.
///
/// Returns how many objects were moved to `releases/`.
pub async fn promote(store: &dyn BlobStore, source_id: &str, marker: &str) -> Result<usize> {
    let segment = paths::version_segment(marker);
    let listed = store.list(&paths::latest_prefix(source_id)).await?;
    let moves = plan_moves(source_id, &segment, listed.iter().map(|meta| meta.key.as_str()));

    for planned in &moves {
        relocate(store, &planned.from, &planned.to)
            .await
            .map_err(|source| IngestError::Rotation {
                key: planned.from.clone(),
                source,
            })?;
        debug!(from = %planned.from, to = %planned.to, "Moved to releases");
    }

    info!(source = %source_id, version = %segment, moved = moves.len(), "Rotation complete");
    Ok(moves.len())
}
