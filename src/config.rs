use std::path::{Path, PathBuf};

use facet::Facet;

use crate::backend::WslVersion;
use crate::error::WslDevError;
use crate::paths;

pub const DEFAULT_RELEASE: &str = "focal";

pub const DEFAULT_IMAGE_URL: &str = "https://cloud-images.ubuntu.com/wsl/{release}/current/ubuntu-{release}-wsl-{arch}-wsl.rootfs.tar.gz";

pub const DEFAULT_GROUPS: &[&str] = &[
    "adm", "dialout", "cdrom", "floppy", "sudo", "audio", "dip", "video", "plugdev", "netdev",
];

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct Config {
    #[facet(default = "focal")]
    pub release: String,
    #[facet(default = "2")]
    pub version: String,
    #[facet(default)]
    pub paths: PathsConfig,
    #[facet(default)]
    pub wsl: WslConfig,
    #[facet(default)]
    pub user: UserConfig,
    #[facet(default)]
    pub image: ImageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            release: DEFAULT_RELEASE.into(),
            version: "2".into(),
            paths: PathsConfig::default(),
            wsl: WslConfig::default(),
            user: UserConfig::default(),
            image: ImageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct PathsConfig {
    pub cache_dir: Option<String>,
    pub instance_root: Option<String>,
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct WslConfig {
    #[facet(default = "wsl.exe")]
    pub command: String,
}

impl Default for WslConfig {
    fn default() -> Self {
        Self {
            command: "wsl.exe".into(),
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct UserConfig {
    pub groups: Vec<String>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            groups: DEFAULT_GROUPS.iter().map(|g| g.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct ImageConfig {
    #[facet(default = "https://cloud-images.ubuntu.com/wsl/{release}/current/ubuntu-{release}-wsl-{arch}-wsl.rootfs.tar.gz")]
    pub url: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_IMAGE_URL.into(),
        }
    }
}

// ── Settings ──────────────────────────────────────────────

/// Resolved runtime settings, passed explicitly into every operation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub release: String,
    pub version: WslVersion,
    pub cache_dir: PathBuf,
    pub instance_root: PathBuf,
    pub prefix: String,
    pub groups: Vec<String>,
    pub image_url: String,
    pub wsl_command: String,
}

impl Settings {
    pub fn from_config(config: Config) -> Result<Self, WslDevError> {
        validate_config(&config)?;
        let version = WslVersion::parse(&config.version)?;
        Ok(Self {
            release: config.release,
            version,
            cache_dir: config
                .paths
                .cache_dir
                .map(PathBuf::from)
                .unwrap_or_else(paths::cache_dir),
            instance_root: config
                .paths
                .instance_root
                .map(PathBuf::from)
                .unwrap_or_else(paths::instance_root),
            prefix: paths::INSTANCE_PREFIX.into(),
            groups: config.user.groups,
            image_url: config.image.url,
            wsl_command: config.wsl.command,
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            release: DEFAULT_RELEASE.into(),
            version: WslVersion::V2,
            cache_dir: paths::cache_dir(),
            instance_root: paths::instance_root(),
            prefix: paths::INSTANCE_PREFIX.into(),
            groups: UserConfig::default().groups,
            image_url: DEFAULT_IMAGE_URL.into(),
            wsl_command: WslConfig::default().command,
        }
    }
}

// ── validation ────────────────────────────────────────────

/// Release names end up in URLs and cache paths: `[A-Za-z0-9][A-Za-z0-9._-]*`.
pub fn validate_release(release: &str) -> Result<(), WslDevError> {
    let mut chars = release.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');
    if !valid {
        return Err(WslDevError::Validation {
            message: format!("release must match [A-Za-z0-9][A-Za-z0-9._-]* (got '{release}')"),
        });
    }
    Ok(())
}

fn validate_config(config: &Config) -> Result<(), WslDevError> {
    validate_release(&config.release)?;

    if !config.image.url.contains("{release}") || !config.image.url.contains("{arch}") {
        return Err(WslDevError::Validation {
            message: format!(
                "image.url must contain {{release}} and {{arch}} (got '{}')",
                config.image.url
            ),
        });
    }

    if config.wsl.command.trim().is_empty() {
        return Err(WslDevError::Validation {
            message: "wsl.command must not be empty".into(),
        });
    }

    if config.user.groups.is_empty() {
        return Err(WslDevError::Validation {
            message: "user.groups must list at least one group".into(),
        });
    }
    for group in &config.user.groups {
        if group.is_empty() || group.contains(',') || group.chars().any(char::is_whitespace) {
            return Err(WslDevError::Validation {
                message: format!("invalid group name '{group}'"),
            });
        }
    }

    Ok(())
}

// ── public API ────────────────────────────────────────────

/// Load settings from `path`, or from the default config file when `path` is None.
///
/// A missing default file means "use defaults"; an explicit path must exist.
pub fn load_config(path: Option<&Path>) -> Result<Settings, WslDevError> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (paths::default_config_file(), false),
    };

    if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Settings::default());
    }

    let contents = std::fs::read_to_string(&path).map_err(|source| WslDevError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;
    let config = parse_config(&contents, &path)?;
    Settings::from_config(config)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config, WslDevError> {
    facet_toml::from_str(contents).map_err(|e| WslDevError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Result<Settings, WslDevError> {
        let config = parse_config(toml, Path::new("test.toml"))?;
        Settings::from_config(config)
    }

    #[test]
    fn empty_file_gives_defaults() {
        let settings = parse("").unwrap();
        assert_eq!(settings.release, "focal");
        assert_eq!(settings.version, WslVersion::V2);
        assert_eq!(settings.wsl_command, "wsl.exe");
        assert_eq!(settings.image_url, DEFAULT_IMAGE_URL);
        assert_eq!(settings.groups.len(), DEFAULT_GROUPS.len());
        assert_eq!(settings.prefix, paths::INSTANCE_PREFIX);
    }

    #[test]
    fn overrides_are_applied() {
        let settings = parse(
            r#"
release = "jammy"
version = "1"

[paths]
cache_dir = "/tmp/cache"
instance_root = "/tmp/instances"

[wsl]
command = "wsl"

[user]
groups = ["sudo", "docker"]
"#,
        )
        .unwrap();
        assert_eq!(settings.release, "jammy");
        assert_eq!(settings.version, WslVersion::V1);
        assert_eq!(settings.cache_dir, PathBuf::from("/tmp/cache"));
        assert_eq!(settings.instance_root, PathBuf::from("/tmp/instances"));
        assert_eq!(settings.wsl_command, "wsl");
        assert_eq!(settings.groups, vec!["sudo", "docker"]);
    }

    #[test]
    fn rejects_unknown_version() {
        let err = parse(r#"version = "3""#).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn rejects_url_without_placeholders() {
        let err = parse(
            r#"
[image]
url = "https://example.com/rootfs.tar.gz"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("{release}"));
    }

    #[test]
    fn rejects_bad_group() {
        assert!(parse("[user]\ngroups = [\"a,b\"]").is_err());
        assert!(parse("[user]\ngroups = []").is_err());
    }

    #[test]
    fn release_validation() {
        assert!(validate_release("focal").is_ok());
        assert!(validate_release("22.04").is_ok());
        assert!(validate_release("").is_err());
        assert!(validate_release("../etc").is_err());
        assert!(validate_release("focal/x").is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/wsldev.toml"))).unwrap_err();
        assert!(matches!(err, WslDevError::ConfigLoad { .. }));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wsldev.toml");
        std::fs::write(&path, "release = \"noble\"\n").unwrap();
        let settings = load_config(Some(&path)).unwrap();
        assert_eq!(settings.release, "noble");
    }
}
