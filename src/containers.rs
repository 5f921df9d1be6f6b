use std::fmt::Display;

use serde::Deserialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[serde(alias = "mkv")]
    Matroska,
    #[default]
    MP4,
}

impl Container {
    /// The `format.format_name` ffprobe reports for files in this container.
    pub fn format_name(&self) -> &'static str {
        match self {
            Container::Matroska => "matroska,webm",
            Container::MP4 => "mov,mp4,m4a,3gp,3g2,mj2",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Container::Matroska => "mkv",
            Container::MP4 => "mp4",
        }
    }

    pub fn parameters(&self) -> Vec<String> {
        match self {
            Container::Matroska => vec![
                String::from("-f"),
                String::from("matroska"),
            ],
            Container::MP4 => vec![
                String::from("-movflags"),
                String::from("+faststart"),
                String::from("-f"),
                String::from("mp4"),
            ],
        }
    }
}

impl Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Container::Matroska => write!(f, "matroska"),
            Container::MP4 => write!(f, "mp4"),
        }
    }
}
