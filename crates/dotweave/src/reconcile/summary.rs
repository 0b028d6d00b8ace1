use std::fmt;
use std::path::PathBuf;

/// What happened to one backup entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Fresh render written without a merge.
    Rendered,
    /// Fresh render merged with the on-disk artifact.
    Merged { conflict: bool },
    /// Template unchanged and artifact present; nothing written.
    Unchanged,
    /// Symlink created or replaced.
    Linked,
    AlreadyLinked,
    /// Existing target moved into the backup tree, then linked.
    Adopted,
    /// Neither source nor target exists.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

/// Tally of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub rendered: usize,
    pub merged: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub linked: usize,
    pub adopted: usize,
    pub skipped: usize,
    pub failures: Vec<FailedFile>,
    pub outcomes: Vec<(PathBuf, FileOutcome)>,
    pub cancelled: bool,
}

impl ReconcileSummary {
    pub fn record(&mut self, path: PathBuf, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Rendered => self.rendered += 1,
            FileOutcome::Merged { conflict } => {
                self.merged += 1;
                if conflict {
                    self.conflicts += 1;
                }
            }
            FileOutcome::Unchanged | FileOutcome::AlreadyLinked => self.unchanged += 1,
            FileOutcome::Linked => self.linked += 1,
            FileOutcome::Adopted => self.adopted += 1,
            FileOutcome::Skipped => self.skipped += 1,
        }
        self.outcomes.push((path, outcome));
    }

    pub fn record_failure(&mut self, path: PathBuf, error: impl fmt::Display) {
        self.failures.push(FailedFile {
            path,
            error: error.to_string(),
        });
    }

    pub fn absorb(&mut self, other: ReconcileSummary) {
        self.rendered += other.rendered;
        self.merged += other.merged;
        self.unchanged += other.unchanged;
        self.conflicts += other.conflicts;
        self.linked += other.linked;
        self.adopted += other.adopted;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
        self.outcomes.extend(other.outcomes);
        self.cancelled |= other.cancelled;
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn has_conflicts(&self) -> bool {
        self.conflicts > 0
    }

    /// Entries handled, failed ones included.
    pub fn total(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }

    pub fn outcome_for(&self, path: &std::path::Path) -> Option<FileOutcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, outcome)| *outcome)
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rendered, {} merged ({} with conflicts), {} unchanged, {} linked, {} adopted, {} skipped, {} failed",
            self.rendered,
            self.merged,
            self.conflicts,
            self.unchanged,
            self.linked,
            self.adopted,
            self.skipped,
            self.failures.len()
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        for failure in &self.failures {
            write!(f, "\n  {}: {}", failure.path.display(), failure.error)?;
        }
        Ok(())
    }
}
