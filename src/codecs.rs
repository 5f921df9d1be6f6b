use std::fmt::Display;

use serde::Deserialize;

/// Video codecs a target profile can ask for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    AV1,
    HEVC,
    #[default]
    H264,
}

impl Codec {
    pub fn cpu_encoder(&self) -> &'static str {
        match self {
            Codec::AV1 => "libsvtav1",
            Codec::HEVC => "libx265",
            Codec::H264 => "libx264",
        }
    }

    pub fn gpu_encoder(&self) -> &'static str {
        match self {
            Codec::AV1 => "av1_nvenc",
            Codec::HEVC => "hevc_nvenc",
            Codec::H264 => "h264_nvenc",
        }
    }
}

impl Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}
