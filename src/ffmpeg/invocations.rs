use std::ffi::OsString;
use std::path::Path;

use crate::containers::Container;
use crate::ffmpeg::Invocation;
use crate::profile::TargetProfile;

const NVENC_PRESET: &str = "slow";
const GPU_TEST_SECONDS: &str = "00:00:01";
const NORMALIZED_PIX_FMT: &str = "format=yuv420p";
const SILENT_SOURCE: &str = "anullsrc=channel_layout=stereo:sample_rate=44100";

fn os(s: &str) -> OsString { OsString::from(s) }

fn prelude() -> Vec<OsString> {
    vec![
        os("-hide_banner"),
        os("-nostats"),
        os("-loglevel"), os("warning"),
        os("-progress"), os("pipe:1"),
        os("-y"),
    ]
}

/// The main conversion into `temp`.
pub fn encode(
    source: &Path,
    silent_audio: Option<&Path>,
    temp: &Path,
    profile: &TargetProfile,
    gpu: bool,
) -> Invocation {
    let mut args = prelude();
    args.push(os("-vsync")); args.push(os("0"));

    if gpu {
        args.push(os("-hwaccel")); args.push(os("cuda"));
        args.push(os("-hwaccel_output_format")); args.push(os("cuda"));
    }

    args.push(os("-i")); args.push(source.as_os_str().to_owned());

    match silent_audio {
        Some(silent) => {
            args.push(os("-i")); args.push(silent.as_os_str().to_owned());
            args.push(os("-map")); args.push(os("0:v:0"));
            args.push(os("-map")); args.push(os("1:a:0"));
            // stop at the end of the video, not the generated track
            args.push(os("-shortest"));
        },
        None => {
            args.push(os("-map")); args.push(os("0:v:0"));
            args.push(os("-map")); args.push(os("0:a:0"));
        },
    }

    args.push(os("-c:a")); args.push(os(&profile.audio_codec));
    args.push(os("-ac")); args.push(os(&profile.max_audio_channels.to_string()));

    if gpu {
        args.push(os("-c:v")); args.push(os(profile.video_codec.gpu_encoder()));
        args.push(os("-preset")); args.push(os(NVENC_PRESET));
    } else {
        args.push(os("-c:v")); args.push(os(profile.video_codec.cpu_encoder()));
        args.push(os("-level:v")); args.push(os(&profile.max_video_level.to_string()));
    }

    args.extend(profile.container.parameters().iter().map(|s| os(s)));
    args.push(temp.as_os_str().to_owned());

    Invocation {
        label: "encode",
        args,
        output: temp.to_path_buf(),
    }
}

/// A silent stereo track `duration` seconds long.
pub fn silent_audio(duration: f64, output: &Path) -> Invocation {
    let mut args = prelude();
    args.push(os("-f")); args.push(os("lavfi"));
    args.push(os("-i")); args.push(os(SILENT_SOURCE));
    args.push(os("-t")); args.push(os(&format!("{:.3}", duration)));
    args.push(os("-q:a")); args.push(os("9"));
    args.push(output.as_os_str().to_owned());

    Invocation {
        label: "silent audio",
        args,
        output: output.to_path_buf(),
    }
}

/// Encode the first second with the hardware encoder to find out whether it
/// accepts this input at all.
pub fn gpu_test(source: &Path, output: &Path, profile: &TargetProfile) -> Invocation {
    let mut args = prelude();
    args.push(os("-i")); args.push(source.as_os_str().to_owned());
    args.push(os("-t")); args.push(os(GPU_TEST_SECONDS));
    args.push(os("-an"));
    args.push(os("-c:v")); args.push(os(profile.video_codec.gpu_encoder()));
    args.push(os("-preset")); args.push(os(NVENC_PRESET));
    args.push(output.as_os_str().to_owned());

    Invocation {
        label: "gpu test",
        args,
        output: output.to_path_buf(),
    }
}

/// CPU re-encode to 8-bit 4:2:0 so NVENC can take the file. Written as
/// matroska whatever the source container is, since it can hold any stream
/// the source had.
pub fn normalize_bit_depth(source: &Path, output: &Path, profile: &TargetProfile) -> Invocation {
    let mut args = prelude();
    args.push(os("-i")); args.push(source.as_os_str().to_owned());
    args.push(os("-map")); args.push(os("0:v:0"));
    args.push(os("-map")); args.push(os("0:a?"));
    args.push(os("-c:a")); args.push(os("copy"));
    args.push(os("-vf")); args.push(os(NORMALIZED_PIX_FMT));
    args.push(os("-c:v")); args.push(os(profile.video_codec.cpu_encoder()));
    args.extend(Container::Matroska.parameters().iter().map(|s| os(s)));
    args.push(output.as_os_str().to_owned());

    Invocation {
        label: "bit depth",
        args,
        output: output.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn strings(inv: &Invocation) -> Vec<String> {
        inv.args.iter().map(|s| s.to_string_lossy().into_owned()).collect()
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_cpu_encode_uses_level_and_profile_audio() {
        let inv = encode(Path::new("clip.mkv"), None, Path::new("clip.temp.mp4"), &TargetProfile::default(), false);
        let args = strings(&inv);
        assert!(has_pair(&args, "-c:v", "libx264"));
        assert!(has_pair(&args, "-level:v", "40"));
        assert!(has_pair(&args, "-c:a", "aac"));
        assert!(has_pair(&args, "-ac", "2"));
        assert!(has_pair(&args, "-map", "0:a:0"));
        assert!(!args.contains(&String::from("-hwaccel")));
        assert!(!args.contains(&String::from("-shortest")));
        assert_eq!(args.last().unwrap(), "clip.temp.mp4");
        assert_eq!(inv.output, PathBuf::from("clip.temp.mp4"));
    }

    #[test]
    fn test_gpu_encode_uses_nvenc_without_level() {
        let inv = encode(Path::new("clip.mkv"), None, Path::new("clip.temp.mp4"), &TargetProfile::default(), true);
        let args = strings(&inv);
        assert!(has_pair(&args, "-hwaccel", "cuda"));
        assert!(has_pair(&args, "-c:v", "h264_nvenc"));
        assert!(!args.contains(&String::from("-level:v")));
        let hwaccel = args.iter().position(|a| a == "-hwaccel").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(hwaccel < input);
    }

    #[test]
    fn test_encode_mixes_silent_track() {
        let inv = encode(
            Path::new("silent.mp4"),
            Some(Path::new("silent.silent.mp3")),
            Path::new("silent.temp.mp4"),
            &TargetProfile::default(),
            false);
        let args = strings(&inv);
        assert!(has_pair(&args, "-i", "silent.silent.mp3"));
        assert!(has_pair(&args, "-map", "1:a:0"));
        assert!(args.contains(&String::from("-shortest")));
    }

    #[test]
    fn test_silent_audio_matches_duration() {
        let inv = silent_audio(12.5, Path::new("clip.silent.mp3"));
        let args = strings(&inv);
        assert!(has_pair(&args, "-f", "lavfi"));
        assert!(has_pair(&args, "-t", "12.500"));
    }

    #[test]
    fn test_gpu_test_is_one_second() {
        let inv = gpu_test(Path::new("clip.mkv"), Path::new("clip.gputest.temp.mp4"), &TargetProfile::default());
        let args = strings(&inv);
        assert!(has_pair(&args, "-t", "00:00:01"));
        assert!(has_pair(&args, "-c:v", "h264_nvenc"));
    }

    #[test]
    fn test_normalize_forces_8bit() {
        let inv = normalize_bit_depth(Path::new("clip.mkv"), Path::new("clip.8bit.temp.mkv"), &TargetProfile::default());
        let args = strings(&inv);
        assert!(has_pair(&args, "-vf", "format=yuv420p"));
        assert!(has_pair(&args, "-c:v", "libx264"));
        assert!(has_pair(&args, "-f", "matroska"));
    }
}
