use std::fmt::Display;
use std::path::PathBuf;

use human_repr::HumanCount;

use crate::error::JobError;

#[derive(Clone, Debug)]
pub enum FileOutcome {
    Conformant,
    /// Not a probe target, e.g. a temp file that appeared mid-walk.
    Skipped,
    /// Audit mode: what would have been converted, and why.
    NonConformant(Vec<String>),
    Converted {
        from: PathBuf,
        to: PathBuf,
        bytes_before: u64,
        bytes_after: u64,
    },
    Failed(JobError),
}

impl FileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, FileOutcome::Failed(_))
    }
}

impl Display for FileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOutcome::Conformant => write!(f, "conformant"),
            FileOutcome::Skipped => write!(f, "skipped"),
            FileOutcome::NonConformant(violations) => write!(f, "non-conformant: {}", violations.join(", ")),
            FileOutcome::Converted { to, bytes_before, bytes_after, .. } => write!(
                f,
                "converted to {:?} ({} -> {})",
                to, bytes_before.human_count_bytes(), bytes_after.human_count_bytes()),
            FileOutcome::Failed(err) => write!(f, "{} failed: {}", err.kind(), err),
        }
    }
}

/// Per-file outcomes of one run, in the order they finished.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<(PathBuf, FileOutcome)>,
    pub interrupted: bool,
}

impl RunReport {
    pub fn new() -> Self {
        RunReport::default()
    }

    pub fn record(&mut self, path: PathBuf, outcome: FileOutcome) {
        self.outcomes.push((path, outcome));
    }

    fn count(&self, predicate: fn(&FileOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| predicate(o)).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &JobError)> {
        self.outcomes.iter().filter_map(|(path, outcome)| match outcome {
            FileOutcome::Failed(err) => Some((path, err)),
            _ => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn non_conformant(&self) -> impl Iterator<Item = (&PathBuf, &Vec<String>)> {
        self.outcomes.iter().filter_map(|(path, outcome)| match outcome {
            FileOutcome::NonConformant(violations) => Some((path, violations)),
            _ => None,
        })
    }

    /// Bytes before and after, summed over every converted file.
    pub fn sizes(&self) -> (u64, u64) {
        self.outcomes.iter().fold((0, 0), |(before, after), (_, outcome)| match outcome {
            FileOutcome::Converted { bytes_before, bytes_after, .. } => (before + bytes_before, after + bytes_after),
            _ => (before, after),
        })
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "{} files: {} conformant, {} converted, {} non-conformant, {} skipped, {} failed",
            self.outcomes.len(),
            self.count(|o| matches!(o, FileOutcome::Conformant)),
            self.count(|o| matches!(o, FileOutcome::Converted { .. })),
            self.count(|o| matches!(o, FileOutcome::NonConformant(_))),
            self.count(|o| matches!(o, FileOutcome::Skipped)),
            self.count(FileOutcome::is_failure),
        )];

        let (before, after) = self.sizes();
        if before > 0 {
            if after <= before {
                lines.push(format!("saved {}", (before - after).human_count_bytes()));
            } else {
                lines.push(format!("grew by {}", (after - before).human_count_bytes()));
            }
        }

        for (path, violations) in self.non_conformant() {
            lines.push(format!("  needs conversion: {:?} ({})", path, violations.join(", ")));
        }

        if self.has_failures() {
            lines.push(String::from("failures:"));
            for (path, err) in self.failures() {
                lines.push(format!("  {:?}: {} error: {}", path, err.kind(), err));
            }
        }

        if self.interrupted {
            lines.push(String::from("run was interrupted; remaining files were not processed"));
        }

        lines.join("\n")
    }
}
