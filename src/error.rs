use std::error::Error;
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// ffprobe could not be run, exited non-zero, or printed something we could
/// not make sense of.
#[derive(Clone, Debug)]
pub struct ProbeError {
    path: PathBuf,
    msg: String,
}

impl ProbeError {
    pub fn for_file(path: &Path, msg: &str) -> Self {
        ProbeError {
            path: PathBuf::from(path),
            msg: String::from(msg),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Error for ProbeError {}

impl Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error probing {:?}: {}", &self.path, &self.msg)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ToolErrorKind {
    Spawn,
    Exit(Option<i32>),
    TimedOut,
    Interrupted,
}

/// An external tool invocation that did not finish successfully.
#[derive(Clone, Debug)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub stderr_tail: Option<String>,
    msg: String,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, msg: &str) -> Self {
        ToolError {
            kind,
            stderr_tail: None,
            msg: String::from(msg),
        }
    }

    pub fn with_stderr(mut self, stderr_tail: Option<String>) -> Self {
        self.stderr_tail = stderr_tail;
        self
    }
}

impl Error for ToolError {}

impl Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.stderr_tail {
            Some(tail) if !tail.is_empty() => write!(f, "{} ({})", &self.msg, tail),
            _ => write!(f, "{}", &self.msg),
        }
    }
}

/// A resilient filesystem operation gave up.
#[derive(Clone, Debug)]
pub struct RetryExhausted {
    pub path: PathBuf,
    pub attempts: u32,
    pub operation: &'static str,
}

impl Error for RetryExhausted {}

impl Display for RetryExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unable to {} {:?} after {} attempts", self.operation, &self.path, self.attempts)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConversionStage {
    Preprocess,
    SilentAudio,
    Encode,
    Verify,
}

impl Display for ConversionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConversionStage::Preprocess => "preprocess",
            ConversionStage::SilentAudio => "silent audio",
            ConversionStage::Encode => "encode",
            ConversionStage::Verify => "verify",
        };
        write!(f, "{}", s)
    }
}

/// The media side of a conversion failed; the original file is untouched.
#[derive(Clone, Debug)]
pub struct ConversionError {
    path: PathBuf,
    pub stage: ConversionStage,
    msg: String,
}

impl ConversionError {
    pub fn for_file(path: &Path, stage: ConversionStage, msg: &str) -> Self {
        ConversionError {
            path: PathBuf::from(path),
            stage,
            msg: String::from(msg),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Error for ConversionError {}

impl Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error converting {:?} during {}: {}", &self.path, self.stage, &self.msg)
    }
}

/// Moving the encoded output into place failed. This is a filesystem or
/// locking problem, not a codec problem.
#[derive(Clone, Debug)]
pub struct CommitError {
    path: PathBuf,
    msg: String,
    pub cause: Option<RetryExhausted>,
}

impl CommitError {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl From<RetryExhausted> for CommitError {
    fn from(err: RetryExhausted) -> Self {
        CommitError {
            path: err.path.clone(),
            msg: err.to_string(),
            cause: Some(err),
        }
    }
}

impl Error for CommitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_ref().map(|e| e as &(dyn Error + 'static))
    }
}

impl Display for CommitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error committing {:?}: {}", &self.path, &self.msg)
    }
}

/// Everything that can go wrong with a single file.
#[derive(Clone, Debug)]
pub enum JobError {
    Probe(ProbeError),
    Conversion(ConversionError),
    Commit(CommitError),
}

impl JobError {
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Probe(_) => "probe",
            JobError::Conversion(_) => "conversion",
            JobError::Commit(_) => "commit",
        }
    }
}

impl Error for JobError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            JobError::Probe(e) => Some(e),
            JobError::Conversion(e) => Some(e),
            JobError::Commit(e) => Some(e),
        }
    }
}

impl Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::Probe(e) => write!(f, "{}", e),
            JobError::Conversion(e) => write!(f, "{}", e),
            JobError::Commit(e) => write!(f, "{}", e),
        }
    }
}

impl From<ProbeError> for JobError {
    fn from(err: ProbeError) -> Self {
        JobError::Probe(err)
    }
}

impl From<ConversionError> for JobError {
    fn from(err: ConversionError) -> Self {
        JobError::Conversion(err)
    }
}

impl From<CommitError> for JobError {
    fn from(err: CommitError) -> Self {
        JobError::Commit(err)
    }
}

#[derive(Debug)]
pub struct ConfigError {
    path: Option<PathBuf>,
    msg: String,
}

impl ConfigError {
    pub fn new(msg: &str) -> Self {
        ConfigError { path: None, msg: String::from(msg) }
    }

    pub fn for_file(path: &Path, msg: &str) -> Self {
        ConfigError {
            path: Some(PathBuf::from(path)),
            msg: String::from(msg),
        }
    }
}

impl Error for ConfigError {}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "Error in config {:?}: {}", path, &self.msg),
            None => write!(f, "Configuration error: {}", &self.msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_error_from_retry_exhausted() {
        let err = CommitError::from(RetryExhausted {
            path: PathBuf::from("/media/clip.mkv"),
            attempts: 5,
            operation: "remove",
        });
        assert_eq!(err.path(), Path::new("/media/clip.mkv"));
        assert!(err.to_string().contains("after 5 attempts"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_tool_error_display_includes_stderr_tail() {
        let err = ToolError::new(ToolErrorKind::Exit(Some(1)), "ffmpeg exited with 1")
            .with_stderr(Some(String::from("Unknown encoder 'h264_nvenc'")));
        assert_eq!(err.to_string(), "ffmpeg exited with 1 (Unknown encoder 'h264_nvenc')");
    }

    #[test]
    fn test_job_error_kind() {
        let err = JobError::from(ConversionError::for_file(Path::new("a.mkv"), ConversionStage::Encode, "boom"));
        assert_eq!(err.kind(), "conversion");
        assert!(err.to_string().contains("during encode"));
    }
}
