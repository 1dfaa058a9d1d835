pub mod wsl;

use std::fmt;
use std::path::Path;

use crate::error::WslDevError;

/// Subsystem version an instance is imported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WslVersion {
    #[value(name = "1")]
    V1,
    #[value(name = "2")]
    V2,
}

impl WslVersion {
    pub fn parse(raw: &str) -> Result<Self, WslDevError> {
        match raw.trim() {
            "1" => Ok(Self::V1),
            "2" => Ok(Self::V2),
            other => Err(WslDevError::Validation {
                message: format!("version must be \"1\" or \"2\" (got '{other}')"),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "1",
            Self::V2 => "2",
        }
    }
}

impl fmt::Display for WslVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The external virtualization manager.
///
/// Every call blocks until the underlying command finishes; a non-zero exit
/// is an error carrying the tool's own output.
#[allow(async_fn_in_trait)] // trait is internal-only
pub trait Manager {
    /// Register a new instance backed by `storage`, imported from `image`.
    async fn import(
        &self,
        name: &str,
        storage: &Path,
        image: &Path,
        version: WslVersion,
    ) -> Result<(), WslDevError>;

    /// Run `command` inside the instance, as `user` or the default user.
    async fn run(&self, name: &str, user: Option<&str>, command: &[&str])
    -> Result<(), WslDevError>;

    async fn terminate(&self, name: &str) -> Result<(), WslDevError>;

    async fn unregister(&self, name: &str) -> Result<(), WslDevError>;

    /// Names of all instances the manager currently knows about.
    async fn list(&self) -> Result<Vec<String>, WslDevError>;

    /// Interactive login shell attached to the caller's terminal.
    async fn shell(&self, name: &str, user: Option<&str>) -> Result<(), WslDevError>;
}

/// Whole-file download of a URL to a local path.
#[allow(async_fn_in_trait)] // trait is internal-only
pub trait Fetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), WslDevError>;
}
