use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::error::RetryExhausted;

pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "webm", "flv", "mov", "wmv", "mpg", "mpeg", "m4v", "3gp",
];

const TEMP_MARKER: &str = ".temp";

pub enum DirEntryCategory {
    DoesNotExist,
    RegularFile,
    SymbolicLink,
    Directory,
    Unknown,
}

pub fn classify_file(path: &Path) -> DirEntryCategory {
    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            if metadata.is_symlink() {
                DirEntryCategory::SymbolicLink
            } else if metadata.is_file() {
                DirEntryCategory::RegularFile
            } else if metadata.is_dir() {
                DirEntryCategory::Directory
            } else {
                DirEntryCategory::Unknown
            }
        },
        Err(_) => DirEntryCategory::DoesNotExist,
    }
}

pub fn has_media_extension(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => MEDIA_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

/// Files this tool writes next to a source and may have abandoned:
/// `<name>.temp.<target ext>` (which covers the GPU test scratch) and the
/// `<name>.8bit.temp.mkv` normalization scratch. Anything else is the user's.
pub fn is_temp_artifact(path: &Path, extension: &str) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_lowercase();
    let suffixes = [
        format!("{}.{}", TEMP_MARKER, extension.to_lowercase()),
        format!(".8bit{}.mkv", TEMP_MARKER),
    ];
    suffixes.iter().any(|suffix| name.len() > suffix.len() && name.ends_with(suffix.as_str()))
}

/// A file the walker should hand to the pipeline.
pub fn is_candidate(path: &Path, extension: &str) -> bool {
    has_media_extension(path) && !is_temp_artifact(path, extension)
}

/// Both paths name the same file on disk, e.g. `clip.MP4` and `clip.mp4` on a
/// case-insensitive filesystem.
#[cfg(unix)]
pub fn same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(ma), Ok(mb)) => ma.dev() == mb.dev() && ma.ino() == mb.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}

fn sibling(path: &Path, suffix: &str, extension: &str) -> PathBuf {
    let mut name = OsString::from(path.file_stem().unwrap_or(path.as_os_str()));
    name.push(suffix);
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}

/// `clip.mkv` -> `clip.temp.mp4`
pub fn temp_path(source: &Path, extension: &str) -> PathBuf {
    sibling(source, TEMP_MARKER, extension)
}

/// `clip.mkv` -> `clip.mp4`
pub fn final_path(source: &Path, extension: &str) -> PathBuf {
    source.with_extension(extension)
}

/// Scratch file next to `source`, named so the sweep recognises it as a temp
/// artifact if we crash before removing it.
pub fn scratch_path(source: &Path, tag: &str, extension: &str) -> PathBuf {
    sibling(source, &format!(".{}{}", tag, TEMP_MARKER), extension)
}

pub fn silent_audio_path(source: &Path) -> PathBuf {
    sibling(source, ".silent", "mp3")
}

pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

/// Delete `path`, retrying on any failure. A missing path counts as deleted.
pub fn remove(path: &Path, max_retries: u32, delay: Duration) -> bool {
    remove_with(path, max_retries, delay, |p| fs::remove_file(p))
}

pub fn remove_with<F>(path: &Path, max_retries: u32, delay: Duration, mut op: F) -> bool
where
    F: FnMut(&Path) -> io::Result<()>,
{
    if !path.exists() {
        return true;
    }

    let attempts = max_retries.max(1);
    for attempt in 1..=attempts {
        match op(path) {
            Ok(()) => return true,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return true,
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                warn!("{:?} is locked or read-only, retrying removal ({}/{})", path, attempt, attempts);
            },
            Err(err) => {
                warn!("Failed to remove {:?}: {} ({}/{})", path, err, attempt, attempts);
            },
        }
        if attempt < attempts {
            thread::sleep(delay);
        }
    }

    warn!("Giving up on removing {:?} after {} attempts", path, attempts);
    false
}

pub fn ensure_removed(path: &Path, policy: &RetryPolicy) -> Result<(), RetryExhausted> {
    match remove(path, policy.attempts, policy.delay) {
        true => Ok(()),
        false => Err(RetryExhausted {
            path: PathBuf::from(path),
            attempts: policy.attempts.max(1),
            operation: "remove",
        }),
    }
}

/// Cleanup of side artifacts: a failure is logged and otherwise ignored.
pub fn remove_best_effort(path: &Path, policy: &RetryPolicy) {
    if !remove(path, policy.attempts, policy.delay) {
        warn!("Leaving {:?} behind", path);
    }
}

/// Rename with the same retry policy as `remove`. Replaces `to` if it exists.
pub fn rename(from: &Path, to: &Path, policy: &RetryPolicy) -> Result<(), RetryExhausted> {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match fs::rename(from, to) {
            Ok(()) => {
                debug!("renamed {:?} -> {:?}", from, to);
                return Ok(());
            },
            Err(err) => warn!("Failed to rename {:?} -> {:?}: {} ({}/{})", from, to, err, attempt, attempts),
        }
        if attempt < attempts {
            thread::sleep(policy.delay);
        }
    }

    Err(RetryExhausted {
        path: PathBuf::from(from),
        attempts,
        operation: "rename",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    const NO_WAIT: Duration = Duration::from_millis(0);

    #[test]
    fn test_media_extensions_are_case_insensitive() {
        assert!(has_media_extension(Path::new("a/b/Clip.MKV")));
        assert!(has_media_extension(Path::new("clip.3gp")));
        assert!(!has_media_extension(Path::new("notes.txt")));
        assert!(!has_media_extension(Path::new("Makefile")));
    }

    #[test]
    fn test_temp_artifacts() {
        assert!(is_temp_artifact(Path::new("/m/clip.temp.mp4"), "mp4"));
        assert!(is_temp_artifact(Path::new("/m/Clip.TEMP.MP4"), "mp4"));
        assert!(is_temp_artifact(Path::new("/m/clip.8bit.temp.mkv"), "mp4"));
        assert!(!is_temp_artifact(Path::new("/m/clip.mp4"), "mp4"));
        assert!(!is_temp_artifact(Path::new("/m/temp.mp4"), "mp4"));
        assert!(!is_temp_artifact(Path::new("/m/.temp.mp4"), "mp4"));
        assert!(!is_candidate(Path::new("/m/clip.temp.mp4"), "mp4"));
        assert!(is_candidate(Path::new("/m/clip.avi"), "mp4"));
    }

    #[test]
    fn test_user_temp_names_in_other_containers_are_not_ours() {
        assert!(!is_temp_artifact(Path::new("/m/Holiday.temp.avi"), "mp4"));
        assert!(!is_temp_artifact(Path::new("/m/Holiday.temp.mkv"), "mp4"));
        assert!(is_candidate(Path::new("/m/Holiday.temp.avi"), "mp4"));
        assert!(is_temp_artifact(Path::new("/m/Holiday.temp.mkv"), "mkv"));
    }

    #[test]
    fn test_same_file() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("clip.MP4");
        let b = tmp.path().join("link.mp4");
        fs::write(&a, b"upper").unwrap();
        assert!(same_file(&a, &a));
        assert!(!same_file(&a, &tmp.path().join("missing.mp4")));
        fs::hard_link(&a, &b).unwrap();
        assert!(same_file(&a, &b));
    }

    #[test]
    fn test_job_paths() {
        let source = Path::new("/media/show/clip.mkv");
        assert_eq!(temp_path(source, "mp4"), PathBuf::from("/media/show/clip.temp.mp4"));
        assert_eq!(final_path(source, "mp4"), PathBuf::from("/media/show/clip.mp4"));
        assert_eq!(scratch_path(source, "8bit", "mkv"), PathBuf::from("/media/show/clip.8bit.temp.mkv"));
        assert_eq!(silent_audio_path(source), PathBuf::from("/media/show/clip.silent.mp3"));
        assert!(is_temp_artifact(&scratch_path(source, "gputest", "mp4"), "mp4"));
        assert!(is_temp_artifact(&scratch_path(source, "8bit", "mkv"), "mp4"));
    }

    #[test]
    fn test_remove_missing_path_skips_retry_loop() {
        let calls = Cell::new(0);
        let ok = remove_with(Path::new("/definitely/not/here.mkv"), 5, NO_WAIT, |_| {
            calls.set(calls.get() + 1);
            Ok(())
        });
        assert!(ok);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_remove_retries_until_exhausted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("locked.mkv");
        fs::write(&path, b"x").unwrap();
        let calls = Cell::new(0);
        let ok = remove_with(&path, 3, NO_WAIT, |_| {
            calls.set(calls.get() + 1);
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "in use"))
        });
        assert!(!ok);
        assert_eq!(calls.get(), 3);
        assert!(path.exists());
    }

    #[test]
    fn test_remove_recovers_after_transient_failure() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("busy.mkv");
        fs::write(&path, b"x").unwrap();
        let calls = Cell::new(0);
        let ok = remove_with(&path, 5, NO_WAIT, |p| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(io::Error::new(io::ErrorKind::Other, "sharing violation"))
            } else {
                fs::remove_file(p)
            }
        });
        assert!(ok);
        assert_eq!(calls.get(), 3);
        assert!(!path.exists());
    }

    #[test]
    fn test_ensure_removed_reports_exhaustion() {
        let tmp = TempDir::new().unwrap();
        // remove_file refuses directories, which stands in for a locked file
        let dir = tmp.path().join("stuck.mkv");
        fs::create_dir(&dir).unwrap();
        let policy = RetryPolicy { attempts: 2, delay: NO_WAIT };
        let err = ensure_removed(&dir, &policy).unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(err.operation, "remove");
    }

    #[test]
    fn test_rename_replaces_target() {
        let tmp = TempDir::new().unwrap();
        let from = tmp.path().join("a.temp.mp4");
        let to = tmp.path().join("a.mp4");
        fs::write(&from, b"new").unwrap();
        fs::write(&to, b"old").unwrap();
        rename(&from, &to, &RetryPolicy { attempts: 1, delay: NO_WAIT }).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"new");
    }
}
