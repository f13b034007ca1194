//! `git`-subprocess-backed [`VcsClient`].

use crate::{RemoteRef, Result, VcsClient, VcsError};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Shells out to the `git` binary on `PATH`. `GIT_TERMINAL_PROMPT=0` is set
/// on every invocation so a private repository fails fast instead of
/// blocking on a credential prompt (§6).
pub struct CliVcs {
    git_binary: String,
}

impl CliVcs {
    pub fn new() -> Self {
        Self {
            git_binary: "git".to_string(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.git_binary);
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .stdin(Stdio::null());
        cmd
    }

    async fn run(&self, label: &str, args: &[&str]) -> Result<std::process::Output> {
        tracing::debug!(command = label, args = ?args, "running git");
        let output = self
            .command(args)
            .output()
            .await
            .map_err(|e| VcsError::Spawn(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            if stderr.contains("terminal prompts disabled") {
                return Err(VcsError::AuthRequired);
            }
            return Err(VcsError::CommandFailed {
                command: label.to_string(),
                stderr,
            });
        }
        Ok(output)
    }
}

impl Default for CliVcs {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `git ls-remote` output: lines of `<hex digest>\t<ref name>`.
fn parse_ls_remote(stdout: &str) -> Vec<RemoteRef> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(2, char::is_whitespace);
            let digest = parts.next()?.trim();
            let name = parts.next()?.trim();
            if digest.is_empty() || name.is_empty() {
                return None;
            }
            Some(RemoteRef {
                digest: digest.to_ascii_lowercase(),
                name: name.to_string(),
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl VcsClient for CliVcs {
    async fn ls_remote(&self, url: &str, reference: &str) -> Result<Vec<RemoteRef>> {
        let output = self.run("ls-remote", &["ls-remote", "-q", url, reference]).await?;
        let refs = parse_ls_remote(&String::from_utf8_lossy(&output.stdout));
        if refs.is_empty() {
            return Err(VcsError::NoMatchingHeads);
        }
        Ok(refs)
    }

    async fn clone_shallow(&self, url: &str, dest: &Path) -> Result<()> {
        let dest = dest.to_string_lossy().to_string();
        self.run(
            "clone",
            &["clone", "--no-checkout", "--depth=1", url, &dest],
        )
        .await?;
        Ok(())
    }

    async fn fetch(&self, dest: &Path, digest: &str) -> Result<()> {
        let dest_str = dest.to_string_lossy().to_string();
        self.run(
            "fetch",
            &["-C", &dest_str, "fetch", "origin", digest],
        )
        .await?;
        Ok(())
    }

    async fn checkout_detached(&self, dest: &Path, digest: &str) -> Result<()> {
        let dest_str = dest.to_string_lossy().to_string();
        self.run(
            "checkout",
            &["-C", &dest_str, "checkout", "--detach", digest],
        )
        .await?;
        Ok(())
    }
}
