use std::fmt::Display;
use std::path::PathBuf;

use crate::fstools::{final_path, same_file, temp_path};
use crate::probe::MediaDescriptor;
use crate::profile::TargetProfile;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JobState {
    Start,
    Preprocess,
    Encode,
    Commit,
    Done,
    Failed,
}

impl Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}

/// One attempt at converting one file. Dropped once the attempt is over,
/// whichever way it went.
#[derive(Clone, Debug)]
pub struct ConversionJob {
    pub source: PathBuf,
    pub temp: PathBuf,
    pub destination: PathBuf,
    pub gpu: bool,
    pub silent_audio: Option<PathBuf>,
    pub state: JobState,
}

impl ConversionJob {
    pub fn new(descriptor: &MediaDescriptor, profile: &TargetProfile, gpu: bool) -> Self {
        let extension = profile.container.extension();
        ConversionJob {
            source: descriptor.path.clone(),
            temp: temp_path(&descriptor.path, extension),
            destination: final_path(&descriptor.path, extension),
            gpu,
            silent_audio: None,
            state: JobState::Start,
        }
    }

    /// True when the output lands on the source's own name, e.g. a
    /// non-conformant `clip.mp4`.
    pub fn replaces_in_place(&self) -> bool {
        self.source == self.destination
    }

    /// Another file already sits at the destination. `clip.MP4` -> `clip.mp4`
    /// only counts as free when both names reach the source itself, as on a
    /// case-insensitive filesystem.
    pub fn destination_taken(&self) -> bool {
        if self.replaces_in_place() || !self.destination.exists() {
            return false;
        }
        !same_file(&self.source, &self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(path: &str) -> MediaDescriptor {
        MediaDescriptor {
            path: PathBuf::from(path),
            container_format: None,
            video_codec: None,
            video_level: None,
            audio_codec: None,
            audio_channels: 2,
            bit_depth: None,
            duration_seconds: 1.0,
        }
    }

    #[test]
    fn test_paths() {
        let job = ConversionJob::new(&descriptor("/m/clip.mkv"), &TargetProfile::default(), true);
        assert_eq!(job.temp, PathBuf::from("/m/clip.temp.mp4"));
        assert_eq!(job.destination, PathBuf::from("/m/clip.mp4"));
        assert_eq!(job.state, JobState::Start);
        assert!(job.gpu);
        assert!(!job.replaces_in_place());
    }

    #[test]
    fn test_mp4_source_is_replaced_in_place() {
        let job = ConversionJob::new(&descriptor("/m/clip.mp4"), &TargetProfile::default(), false);
        assert!(job.replaces_in_place());
        assert_eq!(job.temp, PathBuf::from("/m/clip.temp.mp4"));
        assert!(!job.destination_taken());
    }

    #[test]
    fn test_destination_taken() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("clip.mkv");
        std::fs::write(&source, b"mkv").unwrap();
        let job = ConversionJob::new(&descriptor(source.to_str().unwrap()), &TargetProfile::default(), false);
        assert!(!job.destination_taken());
        std::fs::write(tmp.path().join("clip.mp4"), b"other").unwrap();
        assert!(job.destination_taken());
    }

    #[test]
    fn test_case_only_difference() {
        let tmp = tempfile::TempDir::new().unwrap();
        let upper = tmp.path().join("clip.MP4");
        let lower = tmp.path().join("clip.mp4");
        std::fs::write(&upper, b"upper").unwrap();
        let job = ConversionJob::new(&descriptor(upper.to_str().unwrap()), &TargetProfile::default(), false);
        if lower.exists() {
            // case-insensitive filesystem: both names are the source
            assert!(!job.destination_taken());
            return;
        }
        std::fs::write(&lower, b"someone else").unwrap();
        assert!(job.destination_taken());

        std::fs::remove_file(&lower).unwrap();
        std::fs::hard_link(&upper, &lower).unwrap();
        assert!(!job.destination_taken());
    }
}
