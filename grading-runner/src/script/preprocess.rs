//! Grading script preprocessor
//!
//! Turns a raw job description into a validated [`CommandGraph`]:
//! - code file entries are checked against the known sources and MIME types
//! - branch targets are resolved and checked against the script length
//! - effective timeouts are computed (command, then job, then runner default)
//! - code files are materialized in the sandbox
//! - placeholders in command templates are substituted
//!
//! Everything that can be validated from the description alone is validated
//! before any artifact is downloaded. Nothing is executed here.

use grading_core::domain::code_file::{
    CodeFileDescriptor, CodeFileSource, SubmissionMimeType, UnknownVariant,
};
use grading_core::domain::script::{
    BranchRule, CommandGraph, GradingScriptCommand, GraphError, Next,
};
use grading_core::dto::job::{RawCommand, RawGradingJob, RawTarget};
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::repository::CodeFileRepository;
use crate::service::ExecutionSecret;

/// Placeholder replaced by the execution secret
pub const SECRET_PLACEHOLDER: &str = "SECRET";

/// Placeholder replaced by the job's sandbox directory
pub const WORKDIR_PLACEHOLDER: &str = "WORKDIR";

/// Reasons a job description is rejected
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("invalid job description: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    UnknownVariant(#[from] UnknownVariant),

    #[error("{0} has an empty url")]
    EmptyUrl(CodeFileSource),

    #[error("{0} is given more than once")]
    DuplicateCodeFile(CodeFileSource),

    #[error("command {position}: invalid {field} target '{value}'")]
    InvalidTarget {
        position: usize,
        field: BranchField,
        value: String,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("invalid timeout {value} for {scope}: expected a positive number of seconds")]
    InvalidTimeout { scope: String, value: f64 },

    #[error("command {position} references ${placeholder}, but the job has no {code_file}")]
    MissingCodeFile {
        position: usize,
        placeholder: &'static str,
        code_file: CodeFileSource,
    },

    #[error("failed to retrieve {code_file} from {url}: {message}")]
    Artifact {
        code_file: CodeFileSource,
        url: String,
        message: String,
    },
}

/// Which branch of a command a target belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchField {
    OnComplete,
    OnFail,
}

impl fmt::Display for BranchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchField::OnComplete => f.write_str("on_complete"),
            BranchField::OnFail => f.write_str("on_fail"),
        }
    }
}

/// Builds command graphs from raw job descriptions
pub struct GradingScriptPreprocessor {
    code_files: Arc<dyn CodeFileRepository>,
    default_timeout: Duration,
}

impl GradingScriptPreprocessor {
    pub fn new(code_files: Arc<dyn CodeFileRepository>, default_timeout: Duration) -> Self {
        Self {
            code_files,
            default_timeout,
        }
    }

    /// Parses a raw queue payload
    pub fn parse(payload: &str) -> Result<RawGradingJob, PreprocessError> {
        RawGradingJob::from_json(payload)
            .map_err(|e| PreprocessError::InvalidPayload(e.to_string()))
    }

    /// Validates `job` and resolves it into a command graph rooted in
    /// `sandbox_dir`
    pub async fn preprocess(
        &self,
        secret: &ExecutionSecret,
        sandbox_dir: &Path,
        job: &RawGradingJob,
    ) -> Result<CommandGraph, PreprocessError> {
        let files = code_file_descriptors(job)?;
        let branches = resolve_branches(&job.script)?;
        let timeouts = resolve_timeouts(&job.script, job.timeout, self.default_timeout)?;
        check_placeholders(&job.script, &files)?;

        let paths = self.materialize(&files, sandbox_dir).await?;

        let commands = job
            .script
            .iter()
            .zip(branches)
            .zip(timeouts)
            .map(|((raw, branch), timeout)| GradingScriptCommand {
                resolved_command: resolve_template(&raw.cmd, secret, sandbox_dir, &paths),
                working_directory: sandbox_dir.to_path_buf(),
                timeout,
                branch,
            })
            .collect();

        let graph = CommandGraph::new(commands)?;
        debug!(
            "Preprocessed script with {} command(s) and {} code file(s)",
            graph.len(),
            paths.len()
        );
        Ok(graph)
    }

    async fn materialize(
        &self,
        files: &[CodeFileDescriptor],
        sandbox_dir: &Path,
    ) -> Result<HashMap<CodeFileSource, PathBuf>, PreprocessError> {
        let mut paths = HashMap::new();

        for file in files {
            let path = self
                .code_files
                .fetch(file, sandbox_dir)
                .await
                .map_err(|e| PreprocessError::Artifact {
                    code_file: file.source,
                    url: file.url.clone(),
                    message: format!("{:#}", e),
                })?;
            paths.insert(file.source, path);
        }

        Ok(paths)
    }
}

fn code_file_descriptors(job: &RawGradingJob) -> Result<Vec<CodeFileDescriptor>, PreprocessError> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for (source, url, mime_type) in job.code_file_entries() {
        let source: CodeFileSource = source.parse()?;
        let mime_type: SubmissionMimeType = mime_type.parse()?;

        if url.trim().is_empty() {
            return Err(PreprocessError::EmptyUrl(source));
        }
        if !seen.insert(source) {
            return Err(PreprocessError::DuplicateCodeFile(source));
        }

        files.push(CodeFileDescriptor {
            url: url.to_string(),
            mime_type,
            source,
        });
    }

    Ok(files)
}

fn resolve_branches(script: &[RawCommand]) -> Result<Vec<BranchRule>, PreprocessError> {
    if script.is_empty() {
        return Err(GraphError::Empty.into());
    }

    let len = script.len();
    script
        .iter()
        .enumerate()
        .map(|(position, raw)| -> Result<BranchRule, PreprocessError> {
            let rule = BranchRule::new(
                resolve_target(raw.on_complete.as_ref(), position, len, BranchField::OnComplete)?,
                resolve_target(raw.on_fail.as_ref(), position, len, BranchField::OnFail)?,
            );
            rule.check(position, len)?;
            Ok(rule)
        })
        .collect()
}

/// Resolves one branch target
///
/// Missing targets default to the following command (or `output` after the
/// last one) on success and to `abort` on failure. `"next"` names the
/// following command.
fn resolve_target(
    raw: Option<&RawTarget>,
    position: usize,
    len: usize,
    field: BranchField,
) -> Result<Next, PreprocessError> {
    let following = || {
        if position + 1 < len || field == BranchField::OnFail {
            Next::Step(position + 1)
        } else {
            Next::Output
        }
    };

    let invalid = |value: String| PreprocessError::InvalidTarget {
        position,
        field,
        value,
    };

    match raw {
        None => match field {
            BranchField::OnComplete => Ok(following()),
            BranchField::OnFail => Ok(Next::Abort),
        },
        Some(RawTarget::Index(index)) => usize::try_from(*index)
            .map(Next::Step)
            .map_err(|_| invalid(index.to_string())),
        Some(RawTarget::Text(text)) if text.trim() == "next" => Ok(following()),
        Some(RawTarget::Text(text)) => text.parse().map_err(|_| invalid(text.clone())),
    }
}

fn resolve_timeouts(
    script: &[RawCommand],
    job_timeout: Option<f64>,
    default_timeout: Duration,
) -> Result<Vec<Duration>, PreprocessError> {
    let job_timeout = job_timeout
        .map(|secs| seconds(secs, || "the job".to_string()))
        .transpose()?;

    script
        .iter()
        .enumerate()
        .map(|(position, raw)| match raw.timeout {
            Some(secs) => seconds(secs, || format!("command {}", position)),
            None => Ok(job_timeout.unwrap_or(default_timeout)),
        })
        .collect()
}

fn seconds(value: f64, scope: impl FnOnce() -> String) -> Result<Duration, PreprocessError> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(PreprocessError::InvalidTimeout {
            scope: scope(),
            value,
        }),
    }
}

fn check_placeholders(
    script: &[RawCommand],
    files: &[CodeFileDescriptor],
) -> Result<(), PreprocessError> {
    let available: HashSet<CodeFileSource> = files.iter().map(|file| file.source).collect();

    for (position, raw) in script.iter().enumerate() {
        for name in placeholder_names(&raw.cmd) {
            let missing = CodeFileSource::ALL
                .into_iter()
                .find(|source| source.placeholder() == name && !available.contains(source));
            if let Some(code_file) = missing {
                return Err(PreprocessError::MissingCodeFile {
                    position,
                    placeholder: code_file.placeholder(),
                    code_file,
                });
            }
        }
    }

    Ok(())
}

/// `$NAME` or `${NAME}`
static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{(\w+)\}|(\w+))").expect("placeholder pattern is valid")
});

fn placeholder_name<'t>(captures: &Captures<'t>) -> &'t str {
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map_or("", |name| name.as_str())
}

fn placeholder_names(template: &str) -> impl Iterator<Item = &str> {
    PLACEHOLDER_REGEX
        .captures_iter(template)
        .map(|captures| placeholder_name(&captures))
}

/// Substitutes known placeholders; anything else is left for the shell
fn resolve_template(
    template: &str,
    secret: &ExecutionSecret,
    sandbox_dir: &Path,
    paths: &HashMap<CodeFileSource, PathBuf>,
) -> String {
    PLACEHOLDER_REGEX
        .replace_all(template, |captures: &Captures<'_>| {
            let name = placeholder_name(captures);
            let value = if name == SECRET_PLACEHOLDER {
                Some(secret.as_str().to_string())
            } else if name == WORKDIR_PLACEHOLDER {
                Some(sandbox_dir.display().to_string())
            } else {
                CodeFileSource::ALL
                    .into_iter()
                    .find(|source| source.placeholder() == name)
                    .and_then(|source| paths.get(&source))
                    .map(|path| path.display().to_string())
            };
            value.unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeCodeFiles;
    use grading_core::dto::job::{RawCodeFile, RawCodeFileEntry};

    const SANDBOX: &str = "/sandbox/abc";

    fn secret() -> ExecutionSecret {
        ExecutionSecret::new("abc")
    }

    fn preprocessor(files: Arc<FakeCodeFiles>) -> GradingScriptPreprocessor {
        GradingScriptPreprocessor::new(files, Duration::from_secs(60))
    }

    fn job(script: Vec<RawCommand>) -> RawGradingJob {
        RawGradingJob {
            script,
            ..Default::default()
        }
    }

    fn student_code(job: RawGradingJob) -> RawGradingJob {
        RawGradingJob {
            student_code: Some(RawCodeFileEntry {
                url: "http://files/hw1.zip".to_string(),
                mime_type: "application/zip".to_string(),
            }),
            ..job
        }
    }

    async fn run(
        job: &RawGradingJob,
    ) -> (Result<CommandGraph, PreprocessError>, Arc<FakeCodeFiles>) {
        let files = Arc::new(FakeCodeFiles::default());
        let result = preprocessor(Arc::clone(&files))
            .preprocess(&secret(), Path::new(SANDBOX), job)
            .await;
        (result, files)
    }

    #[tokio::test]
    async fn test_resolves_placeholders_and_working_directory() {
        let job = student_code(job(vec![
            RawCommand::new("unzip $STUDENT_CODE -d ${WORKDIR}/src && echo $SECRET"),
            RawCommand::new("echo $HOME ${UNKNOWN} $$ $"),
        ]));

        let (result, files) = run(&job).await;
        let graph = result.unwrap();

        let first = graph.get(0).unwrap();
        assert_eq!(
            first.resolved_command,
            "unzip /sandbox/abc/student_code/hw1.zip -d /sandbox/abc/src && echo abc"
        );
        assert_eq!(first.working_directory, PathBuf::from(SANDBOX));
        assert_eq!(graph.get(1).unwrap().resolved_command, "echo $HOME ${UNKNOWN} $$ $");
        assert_eq!(files.fetched(), vec![CodeFileSource::StudentCode]);
    }

    #[tokio::test]
    async fn test_default_branches() {
        let (result, _) = run(&job(vec![RawCommand::new("a"), RawCommand::new("b")])).await;
        let graph = result.unwrap();

        assert_eq!(
            graph.get(0).unwrap().branch,
            BranchRule::new(Next::Step(1), Next::Abort)
        );
        assert_eq!(
            graph.get(1).unwrap().branch,
            BranchRule::new(Next::Output, Next::Abort)
        );
    }

    #[tokio::test]
    async fn test_explicit_branches() {
        let (result, _) = run(&job(vec![
            RawCommand::new("a").on_complete("output").on_fail(1),
            RawCommand::new("b").on_complete("next").on_fail("0"),
        ]))
        .await;
        let graph = result.unwrap();

        assert_eq!(
            graph.get(0).unwrap().branch,
            BranchRule::new(Next::Output, Next::Step(1))
        );
        assert_eq!(
            graph.get(1).unwrap().branch,
            BranchRule::new(Next::Output, Next::Step(0))
        );
    }

    #[tokio::test]
    async fn test_timeout_precedence() {
        let mut raw = job(vec![
            RawCommand::new("a").with_timeout(2.5),
            RawCommand::new("b"),
        ]);

        let (result, _) = run(&raw).await;
        let graph = result.unwrap();
        assert_eq!(graph.get(0).unwrap().timeout, Duration::from_millis(2500));
        assert_eq!(graph.get(1).unwrap().timeout, Duration::from_secs(60));

        raw.timeout = Some(10.0);
        let (result, _) = run(&raw).await;
        let graph = result.unwrap();
        assert_eq!(graph.get(0).unwrap().timeout, Duration::from_millis(2500));
        assert_eq!(graph.get(1).unwrap().timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_invalid_timeouts_are_rejected() {
        for value in [0.0, -1.0, f64::NAN] {
            let (result, _) = run(&job(vec![RawCommand::new("a").with_timeout(value)])).await;
            assert!(matches!(result, Err(PreprocessError::InvalidTimeout { .. })));
        }
    }

    #[tokio::test]
    async fn test_out_of_range_branch_fails_before_any_download() {
        let raw = student_code(job(vec![
            RawCommand::new("a").on_complete(1),
            RawCommand::new("b").on_complete("output").on_fail(5),
        ]));

        let (result, files) = run(&raw).await;
        match result {
            Err(PreprocessError::Graph(GraphError::TargetOutOfRange {
                position, target, ..
            })) => {
                assert_eq!(position, 1);
                assert_eq!(target, 5);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(files.fetched().is_empty());
    }

    #[tokio::test]
    async fn test_misplaced_sentinels_are_rejected() {
        let (result, _) = run(&job(vec![RawCommand::new("a").on_complete("abort")])).await;
        assert!(matches!(
            result,
            Err(PreprocessError::Graph(GraphError::AbortOnSuccess { position: 0 }))
        ));

        let (result, _) = run(&job(vec![RawCommand::new("a").on_fail("output")])).await;
        assert!(matches!(
            result,
            Err(PreprocessError::Graph(GraphError::OutputOnError { position: 0 }))
        ));
    }

    #[tokio::test]
    async fn test_garbage_targets_are_rejected() {
        let (result, _) = run(&job(vec![RawCommand::new("a").on_fail(-1)])).await;
        assert!(matches!(
            result,
            Err(PreprocessError::InvalidTarget {
                field: BranchField::OnFail,
                ..
            })
        ));

        let (result, _) = run(&job(vec![RawCommand::new("a").on_complete("later")])).await;
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "command 0: invalid on_complete target 'later'");
    }

    #[tokio::test]
    async fn test_next_on_last_command_failure_is_out_of_range() {
        let (result, _) = run(&job(vec![RawCommand::new("a").on_fail("next")])).await;
        assert!(matches!(
            result,
            Err(PreprocessError::Graph(GraphError::TargetOutOfRange { .. }))
        ));
    }

    #[tokio::test]
    async fn test_empty_script_is_rejected() {
        let (result, _) = run(&job(vec![])).await;
        assert!(matches!(result, Err(PreprocessError::Graph(GraphError::Empty))));
    }

    #[tokio::test]
    async fn test_unknown_source_and_mime_type_are_rejected() {
        let mut raw = job(vec![RawCommand::new("a")]);
        raw.code_files.push(RawCodeFile {
            url: "http://files/x".to_string(),
            mime_type: "application/zip".to_string(),
            source: "homework".to_string(),
        });
        let (result, files) = run(&raw).await;
        assert!(matches!(result, Err(PreprocessError::UnknownVariant(_))));
        assert!(files.fetched().is_empty());

        raw.code_files[0].source = "starter_code".to_string();
        raw.code_files[0].mime_type = "application/pdf".to_string();
        let (result, _) = run(&raw).await;
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "unknown MIME type 'application/pdf'");
    }

    #[tokio::test]
    async fn test_duplicate_code_file_is_rejected() {
        let mut raw = student_code(job(vec![RawCommand::new("a")]));
        raw.code_files.push(RawCodeFile {
            url: "http://files/other.zip".to_string(),
            mime_type: "application/zip".to_string(),
            source: "student_code".to_string(),
        });

        let (result, _) = run(&raw).await;
        assert!(matches!(
            result,
            Err(PreprocessError::DuplicateCodeFile(CodeFileSource::StudentCode))
        ));
    }

    #[tokio::test]
    async fn test_missing_code_file_placeholder_is_rejected() {
        let (result, _) = run(&job(vec![RawCommand::new("python3 ${PROFESSOR_CODE}")])).await;
        match result {
            Err(PreprocessError::MissingCodeFile {
                position,
                code_file,
                ..
            }) => {
                assert_eq!(position, 0);
                assert_eq!(code_file, CodeFileSource::ProfessorCode);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_artifact_failure_is_preprocessing_error() {
        let files = Arc::new(FakeCodeFiles::failing());
        let raw = student_code(job(vec![RawCommand::new("true")]));
        let result = preprocessor(files)
            .preprocess(&secret(), Path::new(SANDBOX), &raw)
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, PreprocessError::Artifact { .. }));
        assert!(err.to_string().contains("http://files/hw1.zip"));
    }

    #[test]
    fn test_invalid_payload() {
        let result = GradingScriptPreprocessor::parse("{not json");
        assert!(matches!(result, Err(PreprocessError::InvalidPayload(_))));

        let job = GradingScriptPreprocessor::parse(r#"{"script": [{"cmd": "true"}]}"#).unwrap();
        assert_eq!(job.script.len(), 1);
    }

    #[tokio::test]
    async fn test_preprocessing_is_deterministic() {
        let raw = student_code(job(vec![
            RawCommand::new("cd $WORKDIR && unzip $STUDENT_CODE").on_fail(1),
            RawCommand::new("echo failed").on_complete("output"),
        ]));

        let (first, _) = run(&raw).await;
        let (second, _) = run(&raw).await;
        assert_eq!(first.unwrap(), second.unwrap());
    }

    #[test]
    fn test_placeholder_names() {
        let names: Vec<&str> = placeholder_names("a ${B} $C_1-d $$ ${unterminated $").collect();
        assert_eq!(names, vec!["B", "C_1"]);
        assert_eq!(placeholder_names("").count(), 0);
    }

    #[test]
    fn test_unknown_placeholders_are_left_alone() {
        let resolved = resolve_template(
            "cd ${WORKDIR} && echo $HOME ${UNKNOWN} $$ $ $SECRET_X $SECRET",
            &secret(),
            Path::new(SANDBOX),
            &HashMap::new(),
        );
        assert_eq!(
            resolved,
            "cd /sandbox/abc && echo $HOME ${UNKNOWN} $$ $ $SECRET_X abc"
        );
    }
}
