use crate::probe::MediaDescriptor;
use crate::profile::TargetProfile;

/// True when the file already matches the target profile. Every condition
/// must hold; a missing field fails its check rather than erroring.
pub fn is_conformant(descriptor: &MediaDescriptor, profile: &TargetProfile) -> bool {
    let extension_ok = descriptor.path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == profile.container.extension());

    let video_codec = profile.video_codec.to_string();

    extension_ok
        && descriptor.container_format.as_deref() == Some(profile.container.format_name())
        && descriptor.video_codec.as_deref() == Some(video_codec.as_str())
        && descriptor.video_level.is_some_and(|level| level <= profile.max_video_level)
        && descriptor.audio_codec.as_deref() == Some(profile.audio_codec.as_str())
        && descriptor.audio_channels <= profile.max_audio_channels
}

/// Human readable list of the checks a descriptor fails.
pub fn violations(descriptor: &MediaDescriptor, profile: &TargetProfile) -> Vec<String> {
    let mut out = vec![];
    let extension = descriptor.path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if extension != profile.container.extension() {
        out.push(format!("extension {:?} != {:?}", extension, profile.container.extension()));
    }
    if descriptor.container_format.as_deref() != Some(profile.container.format_name()) {
        out.push(format!("container {:?}", descriptor.container_format));
    }
    if descriptor.video_codec.as_deref() != Some(profile.video_codec.to_string().as_str()) {
        out.push(format!("video codec {:?}", descriptor.video_codec));
    }
    if !descriptor.video_level.is_some_and(|level| level <= profile.max_video_level) {
        out.push(format!("video level {:?} > {}", descriptor.video_level, profile.max_video_level));
    }
    if descriptor.audio_codec.as_deref() != Some(profile.audio_codec.as_str()) {
        out.push(format!("audio codec {:?}", descriptor.audio_codec));
    }
    if descriptor.audio_channels > profile.max_audio_channels {
        out.push(format!("audio channels {} > {}", descriptor.audio_channels, profile.max_audio_channels));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn conformant() -> MediaDescriptor {
        MediaDescriptor {
            path: PathBuf::from("/media/show/ep01.mp4"),
            container_format: Some(String::from("mov,mp4,m4a,3gp,3g2,mj2")),
            video_codec: Some(String::from("h264")),
            video_level: Some(31),
            audio_codec: Some(String::from("aac")),
            audio_channels: 2,
            bit_depth: Some(String::from("8")),
            duration_seconds: 60.0,
        }
    }

    #[test]
    fn test_matching_descriptor_is_conformant() {
        let profile = TargetProfile::default();
        assert!(is_conformant(&conformant(), &profile));
        assert!(violations(&conformant(), &profile).is_empty());
    }

    #[test]
    fn test_level_bound_is_inclusive() {
        let profile = TargetProfile::default();
        let mut d = conformant();
        d.video_level = Some(40);
        assert!(is_conformant(&d, &profile));
        d.video_level = Some(41);
        assert!(!is_conformant(&d, &profile));
        d.video_level = None;
        assert!(!is_conformant(&d, &profile));
    }

    #[test]
    fn test_channel_bound_is_inclusive() {
        let profile = TargetProfile::default();
        let mut d = conformant();
        d.audio_channels = 1;
        assert!(is_conformant(&d, &profile));
        d.audio_channels = 3;
        assert!(!is_conformant(&d, &profile));
    }

    #[test]
    fn test_any_single_field_flips_the_verdict() {
        let profile = TargetProfile::default();
        let cases: Vec<Box<dyn Fn(&mut MediaDescriptor)>> = vec![
            Box::new(|d| d.path = PathBuf::from("/media/show/ep01.mkv")),
            Box::new(|d| d.path = PathBuf::from("/media/show/ep01.MP4")),
            Box::new(|d| d.path = PathBuf::from("/media/show/ep01")),
            Box::new(|d| d.container_format = Some(String::from("matroska,webm"))),
            Box::new(|d| d.container_format = None),
            Box::new(|d| d.video_codec = Some(String::from("hevc"))),
            Box::new(|d| d.video_codec = None),
            Box::new(|d| d.audio_codec = Some(String::from("ac3"))),
        ];
        for mutate in cases {
            let mut d = conformant();
            mutate(&mut d);
            assert!(!is_conformant(&d, &profile), "{} should not conform", d);
            assert!(!violations(&d, &profile).is_empty());
        }
    }

    #[test]
    fn test_silent_file_never_conforms() {
        let profile = TargetProfile::default();
        let mut d = conformant();
        d.audio_codec = None;
        d.audio_channels = 2;
        assert!(!is_conformant(&d, &profile));
    }

    #[test]
    fn test_scenario_mkv_hevc_ac3() {
        let d = MediaDescriptor {
            path: PathBuf::from("clip.mkv"),
            container_format: Some(String::from("matroska,webm")),
            video_codec: Some(String::from("hevc")),
            video_level: Some(120),
            audio_codec: Some(String::from("ac3")),
            audio_channels: 6,
            bit_depth: None,
            duration_seconds: 10.0,
        };
        assert!(!is_conformant(&d, &TargetProfile::default()));
        assert_eq!(violations(&d, &TargetProfile::default()).len(), 6);
    }
}
