use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::fstools::RetryPolicy;
use crate::profile::TargetProfile;

/// Everything a run needs to know, fixed before the first file is touched
/// and handed to every component that needs it.
#[derive(Clone, Debug)]
pub struct Config {
    pub root: PathBuf,
    pub gpu: bool,
    pub workers: usize,
    pub audit_only: bool,
    pub retry: RetryPolicy,
    pub encode_timeout: Option<Duration>,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub profile: TargetProfile,
}

impl Config {
    pub fn new(root: PathBuf) -> Self {
        Config {
            root,
            gpu: false,
            workers: 1,
            audit_only: false,
            retry: RetryPolicy::default(),
            encode_timeout: None,
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            profile: TargetProfile::default(),
        }
    }
}

/// Optional TOML file. Any key may be left out.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub gpu: Option<bool>,
    pub workers: Option<usize>,
    pub retries: Option<u32>,
    pub retry_delay_secs: Option<f64>,
    pub timeout_secs: Option<u64>,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub profile: Option<TargetProfile>,
}

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Default)]
pub struct CliOptions {
    pub root: PathBuf,
    pub gpu: bool,
    pub audit_only: bool,
    pub workers: Option<usize>,
    pub retries: Option<u32>,
    pub retry_delay_secs: Option<f64>,
    pub timeout_secs: Option<u64>,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

pub fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::for_file(path, &format!("unable to read: {}", e)))?;
    let parsed = toml::from_str::<FileConfig>(&contents)
        .map_err(|e| ConfigError::for_file(path, &e.to_string()))?;
    info!("Using configuration from {}", path.display());
    Ok(parsed)
}

/// Command line beats the file, the file beats the defaults.
pub fn resolve(cli: CliOptions, file: Option<FileConfig>) -> Result<Config, ConfigError> {
    let file = file.unwrap_or_default();
    let mut config = Config::new(cli.root);

    config.gpu = cli.gpu || file.gpu.unwrap_or(false);
    config.audit_only = cli.audit_only;
    config.workers = cli.workers.or(file.workers).unwrap_or(config.workers);
    config.retry.attempts = cli.retries.or(file.retries).unwrap_or(config.retry.attempts);
    if let Some(delay) = cli.retry_delay_secs.or(file.retry_delay_secs) {
        if !delay.is_finite() || delay < 0.0 {
            return Err(ConfigError::new(&format!("retry delay must be a non-negative number of seconds, got {}", delay)));
        }
        config.retry.delay = Duration::from_secs_f64(delay);
    }
    config.encode_timeout = match cli.timeout_secs.or(file.timeout_secs) {
        None | Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
    };
    if let Some(ffmpeg) = cli.ffmpeg.or(file.ffmpeg) {
        config.ffmpeg = ffmpeg;
    }
    if let Some(ffprobe) = cli.ffprobe.or(file.ffprobe) {
        config.ffprobe = ffprobe;
    }
    if let Some(profile) = file.profile {
        config.profile = profile;
    }

    if config.workers == 0 {
        return Err(ConfigError::new("workers must be at least 1"));
    }
    if config.retry.attempts == 0 {
        return Err(ConfigError::new("retries must be at least 1"));
    }
    if config.profile.audio_codec.trim().is_empty() {
        return Err(ConfigError::new("profile.audio_codec cannot be empty"));
    }
    if config.profile.max_audio_channels == 0 {
        return Err(ConfigError::new("profile.max_audio_channels must be at least 1"));
    }

    Ok(config)
}
