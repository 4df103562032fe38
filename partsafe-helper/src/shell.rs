//! Privileged command execution
//!
//! Every command that needs root goes through [`PrivilegedShell`]. The real
//! implementation wraps commands in `su -c` (or runs them directly when the
//! helper already has uid 0); tests substitute a scripted shell.

pub use partsafe_common::command::shell_quote;
use partsafe_common::config::ShellMode;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

/// Captured result of one shell invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    pub success: bool,
    pub lines: Vec<String>,
}

impl ShellOutput {
    pub fn ok(lines: Vec<String>) -> Self {
        Self {
            success: true,
            lines,
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }

    pub fn first_line(&self) -> Option<&str> {
        self.lines.first().map(|l| l.trim())
    }

    /// Successful and produced at least one line
    pub fn has_output(&self) -> bool {
        self.success && !self.lines.is_empty()
    }
}

/// Elevated command execution
pub trait PrivilegedShell: Send + Sync {
    /// Run a command; all failures collapse to `success = false` with no output
    fn execute(&self, command: &str) -> ShellOutput;

    /// Open a file for reading with elevated privileges
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;
}

/// Shell backed by `su` (or `sh` when already running as root)
#[derive(Debug, Clone)]
pub struct SuShell {
    mode: ShellMode,
}

impl SuShell {
    pub fn new(mode: ShellMode) -> Self {
        Self { mode }
    }

    /// Pick the mode for this process: direct when the effective uid is 0
    pub fn for_current_process(configured: ShellMode) -> Self {
        if nix::unistd::geteuid().is_root() {
            Self::new(ShellMode::Direct)
        } else {
            Self::new(configured)
        }
    }

    pub fn mode(&self) -> ShellMode {
        self.mode
    }

    fn command(&self, command: &str) -> Command {
        let mut cmd = match self.mode {
            ShellMode::Su => Command::new("su"),
            ShellMode::Direct => Command::new("sh"),
        };
        cmd.arg("-c").arg(command);
        cmd
    }
}

impl PrivilegedShell for SuShell {
    fn execute(&self, command: &str) -> ShellOutput {
        log::debug!("exec: {}", command);

        let output = match self.command(command).stdin(Stdio::null()).output() {
            Ok(output) => output,
            Err(e) => {
                log::debug!("Failed to spawn shell for '{}': {}", command, e);
                return ShellOutput::failed();
            }
        };

        if !output.status.success() {
            log::debug!(
                "'{}' exited with {}: {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return ShellOutput::failed();
        }

        let lines = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.to_string())
            .collect();

        ShellOutput::ok(lines)
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let path_str = path
            .to_str()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "non UTF-8 path"))?;

        // Direct mode can read the node without another process
        if self.mode == ShellMode::Direct {
            return Ok(Box::new(File::open(path)?));
        }

        let mut child = self
            .command(&format!("cat {}", shell_quote(path_str)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture privileged reader output"))?;

        Ok(Box::new(PrivilegedReader { child, stdout }))
    }
}

/// Streams stdout of a privileged `cat`; reports a non-zero exit at EOF
struct PrivilegedReader {
    child: Child,
    stdout: ChildStdout,
}

impl Read for PrivilegedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.stdout.read(buf)?;
        if read == 0 && !buf.is_empty() {
            let status = self.child.wait()?;
            if !status.success() {
                return Err(io::Error::other(format!(
                    "privileged read exited with {status}"
                )));
            }
        }
        Ok(read)
    }
}

impl Drop for PrivilegedReader {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}
