//! Sandbox directory service
//!
//! Creates and removes the per-job working directory named by the job's
//! execution secret. A directory belongs to exactly one job from provisioning
//! until release. Sandbox paths contain the secret and are kept out of the
//! logs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::service::secret::ExecutionSecret;

/// Service trait for sandbox provisioning
#[async_trait]
pub trait SandboxProvisioner: Send + Sync {
    /// Creates the private directory for `secret` and returns its path
    async fn provision(&self, secret: &ExecutionSecret) -> Result<PathBuf>;

    /// Recursively removes a directory returned by `provision`
    async fn release(&self, dir: &Path) -> Result<()>;
}

/// Sandboxes as subdirectories of a local base directory
pub struct LocalSandboxProvisioner {
    base: PathBuf,
}

impl LocalSandboxProvisioner {
    /// Creates a provisioner rooted at `base` (created on first use)
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl SandboxProvisioner for LocalSandboxProvisioner {
    async fn provision(&self, secret: &ExecutionSecret) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.base)
            .await
            .with_context(|| format!("Failed to create workspace base {}", self.base.display()))?;

        // create_dir (not create_dir_all) so a reused secret is an error
        let dir = self.base.join(secret.as_str());
        tokio::fs::create_dir(&dir)
            .await
            .with_context(|| format!("Failed to create sandbox in {}", self.base.display()))?;

        debug!("Provisioned sandbox");
        Ok(dir)
    }

    async fn release(&self, dir: &Path) -> Result<()> {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => {
                debug!("Released sandbox");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove sandbox"),
        }
    }
}

/// Owns a provisioned sandbox until it is released
///
/// `release` consumes the guard, so a sandbox is released at most once. If a
/// guard is dropped without being released (the job future was cancelled or
/// unwound) the directory is removed synchronously.
pub struct SandboxGuard {
    provisioner: Arc<dyn SandboxProvisioner>,
    dir: PathBuf,
    released: bool,
}

impl SandboxGuard {
    pub fn new(provisioner: Arc<dyn SandboxProvisioner>, dir: PathBuf) -> Self {
        Self {
            provisioner,
            dir,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Releases the sandbox through its provisioner
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.provisioner.release(&self.dir).await {
            warn!("Failed to release sandbox: {:#}", e);
        }
    }
}

impl Drop for SandboxGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        warn!("Sandbox dropped without release, removing it");
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove sandbox: {}", e),
        }
    }
}
