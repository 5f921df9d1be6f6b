use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use log::{debug, info, warn};

use crate::fstools::{classify_file, is_candidate, is_temp_artifact, remove, DirEntryCategory, RetryPolicy};

/// Walks a tree depth-first, one directory listing at a time, yielding media
/// files. Abandoned temp files in a directory are deleted when the walker
/// first enters it, before any of its files come out.
pub struct FileScanner {
    dirpaths: Vec<PathBuf>,
    files: VecDeque<PathBuf>,
    extension: &'static str,
    retry: RetryPolicy,
}

impl FileScanner {
    /// `extension` is the target container's; it decides which `*.temp.*`
    /// files are ours to sweep.
    pub fn new(root: &Path, extension: &'static str, retry: RetryPolicy) -> Self {
        let mut scanner = FileScanner {
            dirpaths: vec![],
            files: VecDeque::new(),
            extension,
            retry,
        };
        match classify_file(root) {
            DirEntryCategory::Directory => scanner.dirpaths.push(PathBuf::from(root)),
            DirEntryCategory::RegularFile if is_candidate(root, extension) => scanner.files.push_back(PathBuf::from(root)),
            DirEntryCategory::RegularFile => debug!("{:?} is not a media file", root),
            DirEntryCategory::SymbolicLink => info!("{:?} is a symlink; not following it", root),
            DirEntryCategory::DoesNotExist => warn!("{:?} does not exist", root),
            DirEntryCategory::Unknown => warn!("Unable to classify {:?}", root),
        }
        scanner
    }

    /// Feed every path into `tx`, for running the walk on its own thread.
    pub fn scan(self, tx: Sender<PathBuf>) {
        for path in self {
            if tx.send(path).is_err() {
                break;
            }
        }
    }

    fn enter(&mut self, dirpath: &Path) {
        let entries = match fs::read_dir(dirpath) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Unable to read {:?}: {}", dirpath, err);
                return;
            },
        };

        let mut files = vec![];
        let mut subdirs = vec![];
        for entry in entries.filter_map(|e| e.ok()) {
            let Ok(ft) = entry.file_type() else { continue };
            let path = entry.path();
            if ft.is_dir() {
                subdirs.push(path);
            } else if ft.is_file() {
                if is_temp_artifact(&path, self.extension) {
                    info!("Removing abandoned {:?}", path);
                    if !remove(&path, self.retry.attempts, self.retry.delay) {
                        warn!("Unable to remove abandoned {:?}", path);
                    }
                } else if is_candidate(&path, self.extension) {
                    files.push(path);
                }
            }
        }

        files.sort();
        subdirs.sort();
        self.files.extend(files);
        // popped from the end, so reverse to visit in name order
        self.dirpaths.extend(subdirs.into_iter().rev());
    }
}

impl Iterator for FileScanner {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            if let Some(path) = self.files.pop_front() {
                return Some(path);
            }
            let dirpath = self.dirpaths.pop()?;
            self.enter(&dirpath);
        }
    }
}
