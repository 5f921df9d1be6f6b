use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::error::ToolError;

pub mod invocations;
pub mod runner;

/// One ffmpeg command line plus the file it is expected to produce.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub label: &'static str,
    pub args: Vec<OsString>,
    pub output: PathBuf,
}

impl Invocation {
    pub fn display_args(&self) -> String {
        self.args.iter().map(|s| format!("{:?}", s)).collect::<Vec<String>>().join(" ")
    }
}

pub trait Transcoder: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<(), ToolError>;
}

pub struct FFmpeg {
    binary: OsString,
    timeout: Option<Duration>,
    stop: Arc<AtomicBool>,
}

impl FFmpeg {
    pub fn new(binary: &Path, timeout: Option<Duration>, stop: Arc<AtomicBool>) -> Self {
        FFmpeg {
            binary: binary.as_os_str().to_owned(),
            timeout,
            stop,
        }
    }

    pub fn is_installed(&self) -> bool {
        let cmd = Command::new(&self.binary)
            .arg("-version")
            .output();
        match cmd {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }
}
