use std::fmt::Display;

use serde::Deserialize;

use crate::codecs::Codec;
use crate::containers::Container;

/// What every file in the library should look like once we are done with it.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TargetProfile {
    pub container: Container,
    pub video_codec: Codec,
    /// Inclusive upper bound, as reported by ffprobe (`40` is level 4.0).
    pub max_video_level: i64,
    pub audio_codec: String,
    /// Inclusive upper bound.
    pub max_audio_channels: u32,
}

impl Default for TargetProfile {
    fn default() -> Self {
        TargetProfile {
            container: Container::MP4,
            video_codec: Codec::H264,
            max_video_level: 40,
            audio_codec: String::from("aac"),
            max_audio_channels: 2,
        }
    }
}

impl Display for TargetProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} / {} level<={} / {} channels<={}",
            self.container,
            self.video_codec,
            self.max_video_level,
            self.audio_codec,
            self.max_audio_channels)
    }
}
