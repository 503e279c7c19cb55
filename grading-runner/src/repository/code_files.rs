//! Code file repository
//!
//! Materializes a job's code artifacts inside its sandbox. Each file lands in
//! a directory named after its source: `<sandbox>/<source>/<file name>`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use grading_client::GradingClient;
use grading_core::domain::code_file::CodeFileDescriptor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Repository trait for code artifacts
#[async_trait]
pub trait CodeFileRepository: Send + Sync {
    /// Stores `file` under `sandbox_dir` and returns the local path
    async fn fetch(&self, file: &CodeFileDescriptor, sandbox_dir: &Path) -> Result<PathBuf>;
}

/// Downloads artifacts over HTTP
pub struct HttpCodeFileRepository {
    client: Arc<GradingClient>,
}

impl HttpCodeFileRepository {
    pub fn new(client: Arc<GradingClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CodeFileRepository for HttpCodeFileRepository {
    async fn fetch(&self, file: &CodeFileDescriptor, sandbox_dir: &Path) -> Result<PathBuf> {
        let bytes = self
            .client
            .download(&file.url)
            .await
            .with_context(|| format!("Failed to download {} from {}", file.source, file.url))?;

        let target = local_path(file, sandbox_dir);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {} directory", file.source))?;
        }

        tokio::fs::write(&target, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", file_name(file)))?;

        debug!(
            "Stored {} as {} ({} bytes)",
            file.source,
            file_name(file),
            bytes.len()
        );
        Ok(target)
    }
}

/// Where a code file is stored inside the sandbox
pub fn local_path(file: &CodeFileDescriptor, sandbox_dir: &Path) -> PathBuf {
    sandbox_dir.join(file.source.as_str()).join(file_name(file))
}

/// Last URL path segment when it is a plain file name, otherwise
/// `<source>.<extension>`
fn file_name(file: &CodeFileDescriptor) -> String {
    let candidate = Url::parse(&file.url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back())
                .map(str::to_string)
        })
        .unwrap_or_default();

    let is_plain = !candidate.is_empty()
        && !candidate.starts_with('.')
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if is_plain {
        candidate
    } else {
        format!("{}.{}", file.source, file.mime_type.extension())
    }
}
