use serde::Serialize;

/// Options for a sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Perform all reads and compute the full plan, but replace every
    /// write with a logged intent. Counters still report the intended
    /// operations.
    pub dry_run: bool,
}

/// Outcome of a sync run. Counters cover applied operations, or intended
/// ones under dry-run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub groups_created: usize,
    pub users_created: usize,
    pub users_updated: usize,
    pub users_activated: usize,
    pub users_deactivated: usize,
    pub users_skipped: usize,
    /// Per-record failures. The run keeps going past these; a non-empty
    /// list turns into a non-zero exit code.
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn total_writes(&self) -> usize {
        self.groups_created
            + self.users_created
            + self.users_updated
            + self.users_activated
            + self.users_deactivated
    }

    /// The one-line summary always emitted at the end of a run.
    pub fn summary(&self) -> String {
        format!(
            "created {} users, updated {}, activated {}, deactivated {}, \
             skipped {}, created {} groups, {} errors",
            self.users_created,
            self.users_updated,
            self.users_activated,
            self.users_deactivated,
            self.users_skipped,
            self.groups_created,
            self.errors.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_report_has_no_writes() {
        let report = SyncReport::default();
        assert_eq!(report.total_writes(), 0);
        assert!(!report.has_errors());
    }

    #[test]
    fn summary_mentions_every_counter() {
        let report = SyncReport {
            users_created: 1,
            users_updated: 2,
            users_activated: 3,
            users_deactivated: 4,
            users_skipped: 5,
            groups_created: 6,
            errors: vec!["boom".to_string()],
        };
        let line = report.summary();
        for needle in ["created 1 users", "updated 2", "deactivated 4", "6 groups", "1 errors"] {
            assert!(line.contains(needle), "missing {:?} in {:?}", needle, line);
        }
        assert_eq!(report.total_writes(), 16);
    }
}
