//! In-memory fakes for the repository and service traits

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use grading_core::domain::code_file::{CodeFileDescriptor, CodeFileSource};
use grading_core::domain::output::GradingJobOutput;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::repository::{CodeFileRepository, JobQueue, ResultPublisher};
use crate::service::{
    ExecutionSecret, LocalSandboxProvisioner, SandboxProvisioner, SecretFactory,
};

/// Code file repository that records fetches without touching the disk
#[derive(Default)]
pub struct FakeCodeFiles {
    fetched: Mutex<Vec<CodeFileSource>>,
    fail: bool,
    panic: bool,
}

impl FakeCodeFiles {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Self::default()
        }
    }

    pub fn fetched(&self) -> Vec<CodeFileSource> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeFileRepository for FakeCodeFiles {
    async fn fetch(&self, file: &CodeFileDescriptor, sandbox_dir: &Path) -> Result<PathBuf> {
        self.fetched.lock().unwrap().push(file.source);
        if self.panic {
            panic!("fetch blew up for {}", file.url);
        }
        if self.fail {
            return Err(anyhow!("connection refused"));
        }
        let name = file.url.rsplit('/').next().unwrap_or_default();
        Ok(sandbox_dir.join(file.source.as_str()).join(name))
    }
}

/// Local sandboxes that count provisions and releases
pub struct CountingSandbox {
    inner: LocalSandboxProvisioner,
    provisioned: AtomicUsize,
    released: AtomicUsize,
    fail_provision: bool,
}

impl CountingSandbox {
    pub fn new(base: &Path) -> Self {
        Self {
            inner: LocalSandboxProvisioner::new(base),
            provisioned: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            fail_provision: false,
        }
    }

    pub fn failing(base: &Path) -> Self {
        Self {
            fail_provision: true,
            ..Self::new(base)
        }
    }

    pub fn provisioned(&self) -> usize {
        self.provisioned.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SandboxProvisioner for CountingSandbox {
    async fn provision(&self, secret: &ExecutionSecret) -> Result<PathBuf> {
        if self.fail_provision {
            return Err(anyhow!("disk full"));
        }
        let dir = self.inner.provision(secret).await?;
        self.provisioned.fetch_add(1, Ordering::SeqCst);
        Ok(dir)
    }

    async fn release(&self, dir: &Path) -> Result<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release(dir).await
    }
}

/// Hands out `job-0`, `job-1`, ...
#[derive(Default)]
pub struct SequentialSecrets {
    next: AtomicUsize,
}

impl SecretFactory for SequentialSecrets {
    fn generate(&self) -> ExecutionSecret {
        ExecutionSecret::new(format!("job-{}", self.next.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Queue replaying a fixed list of answers, then reporting empty
#[derive(Default)]
pub struct ScriptedQueue {
    answers: Mutex<VecDeque<Result<String, String>>>,
}

impl ScriptedQueue {
    pub fn with_jobs<I, S>(jobs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(jobs.into_iter().map(|job| Ok(job.into())).collect()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            answers: Mutex::new(VecDeque::from([Err(message.to_string())])),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.lock().unwrap().len()
    }
}

#[async_trait]
impl JobQueue for ScriptedQueue {
    async fn next_job(&self) -> Result<Option<String>> {
        match self.answers.lock().unwrap().pop_front() {
            Some(Ok(payload)) => Ok(Some(payload)),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(None),
        }
    }
}

/// Publisher keeping every output it is given
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<GradingJobOutput>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn published(&self) -> Vec<GradingJobOutput> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultPublisher for RecordingPublisher {
    async fn publish(&self, output: &GradingJobOutput) -> Result<()> {
        self.published.lock().unwrap().push(output.clone());
        if self.fail {
            return Err(anyhow!("results endpoint unavailable"));
        }
        Ok(())
    }
}
