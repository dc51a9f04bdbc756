use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A remote image source fetching one item per call into its own folder.
pub trait Downloader: Send + Sync {
    /// Stable identity used to reuse instances across reloads
    fn identity(&self) -> &str;

    /// Folder receiving downloaded images (enumerated like any other folder)
    fn target_folder(&self) -> &Path;

    /// Fetch a single new image. Blocking.
    fn fetch_one(&self) -> Result<()>;
}

/// Runs a user supplied shell command that drops one image into its folder.
///
/// The command sees `ROTA_TARGET_DIR` and runs with that folder as its working
/// directory.
#[derive(Debug)]
pub struct CommandDownloader {
    identity: String,
    command: String,
    target_folder: PathBuf,
}

impl CommandDownloader {
    pub fn new(command: &str, download_folder: &Path) -> Result<Self> {
        let command = command.trim();
        if command.is_empty() {
            anyhow::bail!("Command source has an empty command");
        }

        let target_folder = download_folder.join(folder_name(command));
        fs::create_dir_all(&target_folder).with_context(|| {
            format!(
                "Failed to create download folder: {}",
                target_folder.display()
            )
        })?;

        Ok(Self {
            identity: identity_for(command),
            command: command.to_string(),
            target_folder,
        })
    }
}

impl Downloader for CommandDownloader {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn target_folder(&self) -> &Path {
        &self.target_folder
    }

    fn fetch_one(&self) -> Result<()> {
        log::info!("Downloading with: {}", self.command);

        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.target_folder)
            .env("ROTA_TARGET_DIR", &self.target_folder)
            .output()
            .with_context(|| format!("Failed to run download command: {}", self.command))?;

        if !output.status.success() {
            anyhow::bail!(
                "Download command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(())
    }
}

/// Cache key for a command source
pub fn identity_for(command: &str) -> String {
    format!("command:{}", command.trim())
}

/// Filesystem-safe folder name derived from a command
fn folder_name(command: &str) -> String {
    let name: String = command
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    format!("cmd_{}", name)
}
