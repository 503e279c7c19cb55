//! Code file domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Where a code file comes from
///
/// The set is closed: a job description naming any other source is rejected
/// during preprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeFileSource {
    StudentCode,
    StarterCode,
    ProfessorCode,
}

impl CodeFileSource {
    pub const ALL: [CodeFileSource; 3] = [
        CodeFileSource::StudentCode,
        CodeFileSource::StarterCode,
        CodeFileSource::ProfessorCode,
    ];

    /// Wire name, also used as the directory name inside the job sandbox
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeFileSource::StudentCode => "student_code",
            CodeFileSource::StarterCode => "starter_code",
            CodeFileSource::ProfessorCode => "professor_code",
        }
    }

    /// Placeholder name usable in command templates (`$STUDENT_CODE`, ...)
    pub fn placeholder(&self) -> &'static str {
        match self {
            CodeFileSource::StudentCode => "STUDENT_CODE",
            CodeFileSource::StarterCode => "STARTER_CODE",
            CodeFileSource::ProfessorCode => "PROFESSOR_CODE",
        }
    }
}

impl fmt::Display for CodeFileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeFileSource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CodeFileSource::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("code file source", s))
    }
}

/// Accepted MIME types for code files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionMimeType {
    #[serde(rename = "application/zip")]
    Zip,
    #[serde(rename = "application/x-tar")]
    Tar,
    #[serde(rename = "application/gzip")]
    Gzip,
    #[serde(rename = "text/x-java")]
    Java,
    #[serde(rename = "text/x-python")]
    Python,
    #[serde(rename = "text/plain")]
    PlainText,
}

impl SubmissionMimeType {
    pub const ALL: [SubmissionMimeType; 6] = [
        SubmissionMimeType::Zip,
        SubmissionMimeType::Tar,
        SubmissionMimeType::Gzip,
        SubmissionMimeType::Java,
        SubmissionMimeType::Python,
        SubmissionMimeType::PlainText,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionMimeType::Zip => "application/zip",
            SubmissionMimeType::Tar => "application/x-tar",
            SubmissionMimeType::Gzip => "application/gzip",
            SubmissionMimeType::Java => "text/x-java",
            SubmissionMimeType::Python => "text/x-python",
            SubmissionMimeType::PlainText => "text/plain",
        }
    }

    /// File extension used when the artifact URL does not name a file
    pub fn extension(&self) -> &'static str {
        match self {
            SubmissionMimeType::Zip => "zip",
            SubmissionMimeType::Tar => "tar",
            SubmissionMimeType::Gzip => "tar.gz",
            SubmissionMimeType::Java => "java",
            SubmissionMimeType::Python => "py",
            SubmissionMimeType::PlainText => "txt",
        }
    }
}

impl fmt::Display for SubmissionMimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionMimeType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        SubmissionMimeType::ALL
            .into_iter()
            .find(|mime| mime.as_str() == normalized)
            .ok_or_else(|| UnknownVariant::new("MIME type", s))
    }
}

/// A validated reference to a code file that must be materialized before the
/// script runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFileDescriptor {
    pub url: String,
    pub mime_type: SubmissionMimeType,
    pub source: CodeFileSource,
}

/// A string did not name any member of a closed enumeration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
