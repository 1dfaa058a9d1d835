use std::path::{Path, PathBuf};

/// Prefix shared by every instance display name and storage directory.
pub const INSTANCE_PREFIX: &str = "wsldev-";

fn base_dir(dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(std::env::temp_dir).join("wsldev")
}

/// Root filesystem cache: `~/.cache/wsldev/images/`
pub fn cache_dir() -> PathBuf {
    base_dir(dirs::cache_dir()).join("images")
}

/// Instance storage root: `~/.local/share/wsldev/instances/`
pub fn instance_root() -> PathBuf {
    base_dir(dirs::data_local_dir()).join("instances")
}

/// Log directory: `~/.local/share/wsldev/logs/`
pub fn logs_dir() -> PathBuf {
    base_dir(dirs::data_local_dir()).join("logs")
}

/// Default config file: `~/.config/wsldev/config.toml`
pub fn default_config_file() -> PathBuf {
    base_dir(dirs::config_dir()).join("config.toml")
}

/// Display name registered with the manager for an instance id.
pub fn instance_name(prefix: &str, id: &str) -> String {
    format!("{prefix}{id}")
}

/// Storage directory backing an instance.
pub fn instance_dir(root: &Path, prefix: &str, id: &str) -> PathBuf {
    root.join(instance_name(prefix, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_dir_uses_prefixed_name() {
        let dir = instance_dir(Path::new("/data/instances"), INSTANCE_PREFIX, "AbCdEfGhIj");
        assert_eq!(dir, PathBuf::from("/data/instances/wsldev-AbCdEfGhIj"));
    }

    #[test]
    fn default_dirs_are_namespaced() {
        assert!(cache_dir().ends_with("wsldev/images"));
        assert!(instance_root().ends_with("wsldev/instances"));
        assert!(logs_dir().ends_with("wsldev/logs"));
    }
}
