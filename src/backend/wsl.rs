use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;

use super::{Manager, WslVersion};
use crate::error::WslDevError;

/// Keep error messages readable when a command dumps pages of output.
const MAX_DIAGNOSTIC_CHARS: usize = 2000;

/// What `wsl.exe --list` prints, then exits non-zero, on a host with no distributions.
const NO_DISTRIBUTIONS: &str = "has no installed distributions";

/// [`Manager`] backed by the `wsl.exe` command-line tool.
pub struct WslManager {
    program: String,
}

impl WslManager {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        // Ask wsl.exe for UTF-8 where it honours it; decode_output handles the rest.
        cmd.env("WSL_UTF8", "1");
        cmd
    }

    /// Run to completion with stdin closed and output captured and decoded.
    async fn capture(&self, mut cmd: Command, label: &str) -> Result<Captured, WslDevError> {
        tracing::debug!(command = ?cmd.as_std(), "running {}", self.program);

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| WslDevError::Io {
                context: format!("running {} ({label})", self.program),
                source: e,
            })?;

        let captured = Captured {
            status: output.status,
            stdout: decode_output(&output.stdout),
            stderr: decode_output(&output.stderr),
        };
        for line in captured.stdout.lines().filter(|l| !l.trim().is_empty()) {
            tracing::debug!(target: "wsldev::wsl", "{line}");
        }
        Ok(captured)
    }

    /// `ExternalCommand` carrying the tail of whatever the tool printed.
    fn failure(&self, label: &str, captured: &Captured) -> WslDevError {
        let mut message = format!("{label} exited with {}", captured.status);
        let diagnostic = tail(captured.diagnostic().trim(), MAX_DIAGNOSTIC_CHARS);
        if !diagnostic.is_empty() {
            message.push('\n');
            message.push_str(diagnostic);
        }
        WslDevError::ExternalCommand {
            command: self.program.clone(),
            message,
        }
    }

    /// Run to completion, failing on a non-zero exit. Returns stdout.
    async fn run_captured(&self, cmd: Command, label: &str) -> Result<String, WslDevError> {
        let captured = self.capture(cmd, label).await?;
        if !captured.status.success() {
            return Err(self.failure(label, &captured));
        }
        Ok(captured.stdout)
    }
}

struct Captured {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl Captured {
    /// stderr, or stdout when the tool reported on stdout (wsl.exe mostly does).
    fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

impl Manager for WslManager {
    async fn import(
        &self,
        name: &str,
        storage: &Path,
        image: &Path,
        version: WslVersion,
    ) -> Result<(), WslDevError> {
        let mut cmd = self.command(["--import", name]);
        cmd.arg(storage)
            .arg(image)
            .args(["--version", version.as_str()]);
        self.run_captured(cmd, &format!("import of {name}")).await?;
        tracing::info!(name, storage = %storage.display(), %version, "instance imported");
        Ok(())
    }

    async fn run(
        &self,
        name: &str,
        user: Option<&str>,
        command: &[&str],
    ) -> Result<(), WslDevError> {
        let mut cmd = self.command(["--distribution", name]);
        if let Some(user) = user {
            cmd.args(["--user", user]);
        }
        cmd.arg("--exec").args(command);
        let label = command.first().copied().unwrap_or("command");
        self.run_captured(cmd, &format!("`{label}` in {name}")).await?;
        Ok(())
    }

    async fn terminate(&self, name: &str) -> Result<(), WslDevError> {
        self.run_captured(self.command(["--terminate", name]), &format!("terminate of {name}"))
            .await?;
        Ok(())
    }

    async fn unregister(&self, name: &str) -> Result<(), WslDevError> {
        self.run_captured(
            self.command(["--unregister", name]),
            &format!("unregister of {name}"),
        )
        .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, WslDevError> {
        let label = "instance listing";
        let captured = self
            .capture(self.command(["--list", "--quiet"]), label)
            .await?;
        if !captured.status.success() {
            // A host without any distribution reports that as a failure.
            if captured
                .diagnostic()
                .to_ascii_lowercase()
                .contains(NO_DISTRIBUTIONS)
            {
                tracing::debug!("no distributions installed");
                return Ok(Vec::new());
            }
            return Err(self.failure(label, &captured));
        }
        Ok(parse_listing(&captured.stdout))
    }

    async fn shell(&self, name: &str, user: Option<&str>) -> Result<(), WslDevError> {
        let mut cmd = self.command(["--distribution", name]);
        if let Some(user) = user {
            cmd.args(["--user", user]);
        }
        cmd.args(["--cd", "~"]);

        let status = cmd
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| WslDevError::Io {
                context: format!("starting shell in {name}"),
                source: e,
            })?;

        // The exit status of an interactive shell is the user's last command.
        if !status.success() {
            tracing::warn!(name, "shell exited with {status}");
        }
        Ok(())
    }
}

/// Decode `wsl.exe` output, which is UTF-16LE for most subcommands.
pub fn decode_output(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xFFu8, 0xFE][..]).unwrap_or(bytes);
    let looks_utf16 = bytes.len() >= 2
        && bytes.len() % 2 == 0
        && bytes.iter().skip(1).step_by(2).filter(|b| **b == 0).count() * 2 >= bytes.len() / 2;

    let text = if looks_utf16 {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };
    text.replace('\0', "").replace("\r\n", "\n")
}

/// One instance name per non-empty line.
pub fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|l| l.trim().trim_start_matches('\u{feff}'))
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    let start = text.char_indices().nth(skip).map(|(i, _)| i).unwrap_or(0);
    &text[start..]
}
