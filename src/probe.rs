use std::ffi::OsString;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, trace};
use serde::Deserialize;

use crate::error::ProbeError;
use crate::fstools::is_temp_artifact;

/// Snapshot of a probed file. Never patched in place: probe again after
/// anything touches the file.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaDescriptor {
    pub path: PathBuf,
    pub container_format: Option<String>,
    pub video_codec: Option<String>,
    pub video_level: Option<i64>,
    /// `None` means the file has no audio track.
    pub audio_codec: Option<String>,
    /// Reported as 2 when there is no audio track.
    pub audio_channels: u32,
    /// Kept verbatim; `None` means ffprobe did not say.
    pub bit_depth: Option<String>,
    pub duration_seconds: f64,
}

impl MediaDescriptor {
    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }
}

impl Display for MediaDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn or_dash<T: Display>(v: &Option<T>) -> String {
            match v {
                Some(v) => v.to_string(),
                None => String::from("-"),
            }
        }

        write!(
            f,
            "[{}] container={} video={} level={} audio={} channels={} bits={} duration={:.2}s",
            self.path.display(),
            or_dash(&self.container_format),
            or_dash(&self.video_codec),
            or_dash(&self.video_level),
            or_dash(&self.audio_codec),
            self.audio_channels,
            or_dash(&self.bit_depth),
            self.duration_seconds)
    }
}

pub trait Prober: Send + Sync {
    /// `Ok(None)` means the path is one of our own temp artifacts and must be
    /// left alone.
    fn probe(&self, path: &Path) -> Result<Option<MediaDescriptor>, ProbeError>;
}

#[derive(Deserialize, Debug)]
struct FFProbeJsonOutput {
    #[serde(default)]
    pub streams: Vec<FFProbeJsonStream>,
    pub format: Option<FFProbeJsonFormat>,
}

#[derive(Deserialize, Debug)]
struct FFProbeJsonFormat {
    pub format_name: Option<String>,
    pub duration: Option<String>,
}

#[derive(Deserialize, Debug)]
struct FFProbeJsonStream {
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub level: Option<i64>,
    pub channels: Option<u32>,
    pub bits_per_raw_sample: Option<String>,
}

pub struct FFprobe {
    binary: OsString,
    temp_extension: &'static str,
}

impl FFprobe {
    /// `temp_extension` is the target container's, so our own temp files
    /// can be told apart from the user's.
    pub fn new(binary: &Path, temp_extension: &'static str) -> Self {
        FFprobe {
            binary: binary.as_os_str().to_owned(),
            temp_extension,
        }
    }

    pub fn is_installed(&self) -> bool {
        match Command::new(&self.binary).arg("-version").output() {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }
}

impl Prober for FFprobe {
    fn probe(&self, path: &Path) -> Result<Option<MediaDescriptor>, ProbeError> {
        if is_temp_artifact(path, self.temp_extension) {
            trace!("not probing temp artifact {:?}", path);
            return Ok(None);
        }

        let output = Command::new(&self.binary)
            .args(["-v", "error", "-show_format", "-show_streams", "-print_format", "json"])
            .arg(path)
            .output()
            .map_err(|e| ProbeError::for_file(path, &format!("unable to run ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("ffprobe stderr for {:?}: {}", path, stderr.trim());
            return Err(match output.status.code() {
                Some(code) => ProbeError::for_file(path, &format!("ffprobe exited with {}: {}", code, stderr.trim())),
                None => ProbeError::for_file(path, "ffprobe did not exit successfully."),
            });
        }

        let utf8 = String::from_utf8(output.stdout)
            .map_err(|_| ProbeError::for_file(path, "ffprobe output is not valid UTF-8."))?;
        parse_ffprobe_output(path, &utf8).map(Some)
    }
}

pub fn parse_ffprobe_output(path: &Path, json: &str) -> Result<MediaDescriptor, ProbeError> {
    let deserialized = serde_json::from_str::<FFProbeJsonOutput>(json)
        .map_err(|e| ProbeError::for_file(path, &format!("unparsable ffprobe output: {}", e)))?;

    let video = first_stream_of_type(&deserialized.streams, "video");
    let audio = first_stream_of_type(&deserialized.streams, "audio");

    let (container_format, duration_seconds) = match &deserialized.format {
        Some(format) => (format.format_name.clone(), parse_duration(path, &format.duration)?),
        None => (None, 0.0),
    };

    Ok(MediaDescriptor {
        path: PathBuf::from(path),
        container_format,
        video_codec: video.and_then(|s| s.codec_name.clone()),
        video_level: video.and_then(|s| s.level),
        audio_codec: audio.and_then(|s| s.codec_name.clone()),
        audio_channels: match audio {
            Some(stream) => stream.channels.unwrap_or(2),
            None => 2,
        },
        bit_depth: video.and_then(|s| s.bits_per_raw_sample.clone()),
        duration_seconds,
    })
}

fn first_stream_of_type<'a>(streams: &'a [FFProbeJsonStream], codec_type: &str) -> Option<&'a FFProbeJsonStream> {
    streams.iter().find(|s| s.codec_type.as_deref() == Some(codec_type))
}

fn parse_duration(path: &Path, duration: &Option<String>) -> Result<f64, ProbeError> {
    match duration {
        None => Ok(0.0),
        Some(d) if d.trim() == "N/A" => Ok(0.0),
        Some(d) => match d.trim().parse::<f64>() {
            Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(secs),
            _ => Err(ProbeError::for_file(path, &format!("unexpected duration format: '{}'", d))),
        },
    }
}
