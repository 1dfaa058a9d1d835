//! Read-only facts about the invoking host: user name and CPU architecture.

use std::fmt;

use crate::error::WslDevError;

/// Release/architecture pairs for which no root filesystem is published.
const INCOMPATIBLE: &[(&str, Arch)] = &[("bionic", Arch::Arm64)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Amd64,
    Arm64,
}

impl Arch {
    /// Map a host architecture string (`AMD64`, `x86_64`, `ARM64`, `aarch64`, ...)
    /// to a supported image architecture.
    pub fn parse(raw: &str) -> Result<Self, WslDevError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "amd64" | "x86_64" => Ok(Self::Amd64),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            _ => Err(WslDevError::UnsupportedArchitecture {
                arch: raw.to_string(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reject release/architecture pairs that have no published image.
pub fn check_release(release: &str, arch: Arch) -> Result<(), WslDevError> {
    if INCOMPATIBLE
        .iter()
        .any(|(r, a)| r.eq_ignore_ascii_case(release) && *a == arch)
    {
        return Err(WslDevError::UnsupportedReleaseArchitecture {
            release: release.to_string(),
            arch: arch.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Host {
    pub user: String,
    /// Raw architecture string as reported by the host; validated lazily.
    pub arch: String,
}

impl Host {
    pub fn detect() -> Result<Self, WslDevError> {
        let user = std::env::var("USERNAME")
            .or_else(|_| std::env::var("USER"))
            .map_err(|_| WslDevError::Validation {
                message: "cannot determine the current user (USERNAME/USER unset)".into(),
            })?;
        let arch = std::env::var("PROCESSOR_ARCHITECTURE")
            .unwrap_or_else(|_| std::env::consts::ARCH.to_string());
        Ok(Self { user, arch })
    }

    /// The Linux account name derived from the host user.
    ///
    /// Lower-cased and restricted to `[a-z_][a-z0-9_-]{0,31}`, which keeps it
    /// safe to splice into the provisioning commands.
    pub fn linux_user(&self) -> Result<String, WslDevError> {
        let name = self.user.trim().to_ascii_lowercase();
        let mut chars = name.chars();
        let valid = match chars.next() {
            Some(c) if c.is_ascii_lowercase() || c == '_' => chars
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-'),
            _ => false,
        } && name.len() <= 32;
        if !valid {
            return Err(WslDevError::Validation {
                message: format!(
                    "host user '{}' is not a valid Linux user name (use --root-only)",
                    self.user
                ),
            });
        }
        Ok(name)
    }
}
