//! Raw grading job DTOs
//!
//! The job description as it sits on the grading queue. Code files may be
//! given as named top-level entries (`student_code`, `starter_code`,
//! `professor_code`) or as a `code_files` list carrying an explicit source.
//! Sources, MIME types and branch targets stay as text here; the preprocessor
//! validates them.

use serde::{Deserialize, Serialize};

/// A grading job as received from the queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawGradingJob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_code: Option<RawCodeFileEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starter_code: Option<RawCodeFileEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub professor_code: Option<RawCodeFileEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_files: Vec<RawCodeFile>,

    pub script: Vec<RawCommand>,

    /// Job-wide step timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl RawGradingJob {
    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    /// All code file entries, named ones first, as `(source, url, mime_type)`
    pub fn code_file_entries(&self) -> Vec<(&str, &str, &str)> {
        let named = [
            ("student_code", &self.student_code),
            ("starter_code", &self.starter_code),
            ("professor_code", &self.professor_code),
        ];

        named
            .into_iter()
            .filter_map(|(source, entry)| {
                entry
                    .as_ref()
                    .map(|entry| (source, entry.url.as_str(), entry.mime_type.as_str()))
            })
            .chain(
                self.code_files
                    .iter()
                    .map(|file| (file.source.as_str(), file.url.as_str(), file.mime_type.as_str())),
            )
            .collect()
    }
}

/// Code file named by its key in the job description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCodeFileEntry {
    pub url: String,
    pub mime_type: String,
}

/// Code file carrying its own source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCodeFile {
    pub url: String,
    pub mime_type: String,
    pub source: String,
}

/// One unresolved script command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCommand {
    /// Shell template, may contain placeholders
    pub cmd: String,

    /// Where to go when the command succeeds (default: the next command, or
    /// `output` for the last one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_complete: Option<RawTarget>,

    /// Where to go when the command fails (default: `abort`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_fail: Option<RawTarget>,

    /// Per-command timeout in seconds, overriding the job timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

impl RawCommand {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            on_complete: None,
            on_fail: None,
            timeout: None,
        }
    }

    pub fn on_complete(mut self, target: impl Into<RawTarget>) -> Self {
        self.on_complete = Some(target.into());
        self
    }

    pub fn on_fail(mut self, target: impl Into<RawTarget>) -> Self {
        self.on_fail = Some(target.into());
        self
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }
}

/// Branch target as written: a JSON integer or a string such as `"output"`,
/// `"abort"`, `"next"` or `"2"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTarget {
    Index(i64),
    Text(String),
}

impl From<i64> for RawTarget {
    fn from(index: i64) -> Self {
        RawTarget::Index(index)
    }
}

impl From<i32> for RawTarget {
    fn from(index: i32) -> Self {
        RawTarget::Index(index.into())
    }
}

impl From<&str> for RawTarget {
    fn from(text: &str) -> Self {
        RawTarget::Text(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_named_and_listed_code_files() {
        let job = RawGradingJob::from_json(
            r#"{
                "student_code": {"url": "http://files/sub.zip", "mime_type": "application/zip"},
                "code_files": [
                    {
                        "url": "http://files/tests.py",
                        "mime_type": "text/x-python",
                        "source": "professor_code"
                    }
                ],
                "script": [{"cmd": "unzip $STUDENT_CODE", "on_complete": 1, "on_fail": "abort"},
                           {"cmd": "python3 $PROFESSOR_CODE", "on_complete": "output"}],
                "timeout": 30,
                "submission_id": 42
            }"#,
        )
        .unwrap();

        assert_eq!(
            job.code_file_entries(),
            vec![
                ("student_code", "http://files/sub.zip", "application/zip"),
                ("professor_code", "http://files/tests.py", "text/x-python"),
            ]
        );
        assert_eq!(job.script.len(), 2);
        assert_eq!(job.script[0].on_complete, Some(RawTarget::Index(1)));
        assert_eq!(job.script[1].on_fail, None);
        assert_eq!(job.timeout, Some(30.0));
    }

    #[test]
    fn test_script_is_required() {
        assert!(RawGradingJob::from_json(r#"{"timeout": 5}"#).is_err());
    }

    #[test]
    fn test_command_builder() {
        let command = RawCommand::new("make")
            .on_complete("output")
            .on_fail(0)
            .with_timeout(1.5);
        assert_eq!(command.on_complete, Some(RawTarget::Text("output".into())));
        assert_eq!(command.on_fail, Some(RawTarget::Index(0)));
        assert_eq!(command.timeout, Some(1.5));
    }
}
