use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::WslDevError;
use crate::host::Host;
use crate::paths;

/// Everything an operation needs from the outside world, passed explicitly.
pub struct Context<'a, M, F> {
    pub settings: &'a Settings,
    pub host: &'a Host,
    pub manager: &'a M,
    pub fetcher: &'a F,
}

impl<'a, M, F> Context<'a, M, F> {
    pub fn instances(&self) -> Instances<'a, M> {
        Instances {
            settings: self.settings,
            manager: self.manager,
        }
    }

    pub fn instance_name(&self, id: &str) -> String {
        self.instances().instance_name(id)
    }

    pub fn instance_dir(&self, id: &str) -> PathBuf {
        self.instances().instance_dir(id)
    }
}

/// What removal and listing need: the storage layout and the manager.
pub struct Instances<'a, M> {
    pub settings: &'a Settings,
    pub manager: &'a M,
}

impl<M> Instances<'_, M> {
    pub fn instance_name(&self, id: &str) -> String {
        paths::instance_name(&self.settings.prefix, id)
    }

    pub fn instance_dir(&self, id: &str) -> PathBuf {
        paths::instance_dir(&self.settings.instance_root, &self.settings.prefix, id)
    }
}

/// A created instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub dir: PathBuf,
}

/// Ids of the storage directories under `root` that carry `prefix`, sorted.
pub fn storage_ids(root: &Path, prefix: &str) -> Result<Vec<String>, WslDevError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(root).map_err(|e| WslDevError::Io {
        context: format!("reading instance root {}", root.display()),
        source: e,
    })?;

    let mut ids: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            let id = name.strip_prefix(prefix)?;
            (!id.is_empty()).then(|| id.to_string())
        })
        .collect();
    ids.sort();
    Ok(ids)
}
