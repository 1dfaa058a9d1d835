//! Instance removal: terminate, unregister, delete storage.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::backend::Manager;
use crate::error::WslDevError;
use crate::instance::{Instances, storage_ids};
use crate::progress::StepProgress;

/// Steps narrated per removed instance.
pub const STEPS_PER_INSTANCE: usize = 3;

/// Remove one instance by id (the full prefixed name is accepted too).
///
/// Fails with `InstanceNotFound` before touching the manager when no
/// storage directory exists for `id`.
pub async fn remove<M: Manager>(
    instances: &Instances<'_, M>,
    id: &str,
    progress: &mut StepProgress,
) -> Result<(), WslDevError> {
    let id = id.strip_prefix(instances.settings.prefix.as_str()).unwrap_or(id);
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(WslDevError::InstanceNotFound { id: id.to_string() });
    }

    let dir = instances.instance_dir(id);
    if !dir.is_dir() {
        return Err(WslDevError::InstanceNotFound { id: id.to_string() });
    }
    let name = instances.instance_name(id);
    tracing::info!(%name, dir = %dir.display(), "removing instance");

    progress
        .run(&format!("Stopping {name}"), |_| instances.manager.terminate(&name))
        .await?;
    progress
        .run(&format!("Unregistering {name}"), |_| instances.manager.unregister(&name))
        .await?;
    progress
        .run(&format!("Deleting {}", dir.display()), |_| remove_storage(&dir))
        .await?;

    progress.println(&format!("Removed {name}."));
    Ok(())
}

/// Remove every instance under the instance root, in name order.
///
/// Stops at the first failure; instances after it are left untouched.
/// Returns the number of instances removed.
pub async fn remove_all<M: Manager>(
    instances: &Instances<'_, M>,
    progress: &mut StepProgress,
) -> Result<usize, WslDevError> {
    let ids = storage_ids(&instances.settings.instance_root, &instances.settings.prefix)?;
    if ids.is_empty() {
        progress.println("No instances to remove.");
        return Ok(0);
    }

    progress.set_total(ids.len() * STEPS_PER_INSTANCE);
    for id in &ids {
        remove(instances, id, progress).await?;
    }
    Ok(ids.len())
}

/// An instance directory and whether the manager still knows it.
#[derive(Debug, Clone, facet::Facet)]
pub struct InstanceStatus {
    pub id: String,
    pub name: String,
    pub registered: bool,
    pub dir: String,
}

pub async fn list_instances<M: Manager>(
    instances: &Instances<'_, M>,
) -> Result<Vec<InstanceStatus>, WslDevError> {
    let ids = storage_ids(&instances.settings.instance_root, &instances.settings.prefix)?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let registered = instances.manager.list().await?;

    Ok(ids
        .into_iter()
        .map(|id| {
            let name = instances.instance_name(&id);
            InstanceStatus {
                registered: registered.iter().any(|r| r.eq_ignore_ascii_case(&name)),
                dir: instances.instance_dir(&id).display().to_string(),
                id,
                name,
            }
        })
        .collect())
}

/// Recursively delete `dir`, clearing read-only bits and retrying once if
/// the first attempt is refused.
pub async fn remove_storage(dir: &Path) -> Result<(), WslDevError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "retrying removal after clearing read-only bits");
        }
    }

    make_writable(dir.to_path_buf());
    tokio::fs::remove_dir_all(dir)
        .await
        .map_err(|e| WslDevError::Io {
            context: format!("removing {}", dir.display()),
            source: e,
        })
}

/// Best effort: make every entry below `root` writable by its owner.
fn make_writable(root: PathBuf) {
    let mut stack = vec![root];
    while let Some(path) = stack.pop() {
        let Ok(meta) = std::fs::symlink_metadata(&path) else {
            continue;
        };
        if meta.file_type().is_symlink() {
            continue;
        }

        let mut perms = meta.permissions();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let owner_bits = if meta.is_dir() { 0o700 } else { 0o600 };
            perms.set_mode(perms.mode() | owner_bits);
        }
        #[cfg(not(unix))]
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        let _ = std::fs::set_permissions(&path, perms);

        if meta.is_dir()
            && let Ok(entries) = std::fs::read_dir(&path)
        {
            stack.extend(entries.filter_map(|e| e.ok()).map(|e| e.path()));
        }
    }
}
