use std::fmt;

/// Pipeline position of one root within a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanPhase {
    Idle,
    Walking,
    Reconciling,
    Committing,
    Logging,
    Done,
    Failed,
}

impl ScanPhase {
    /// Whether the pipeline may move from `self` to `next`.
    pub fn can_transition_to(self, next: ScanPhase) -> bool {
        use ScanPhase::*;
        matches!(
            (self, next),
            (Idle, Walking)
                | (Walking, Reconciling)
                | (Reconciling, Committing)
                | (Committing, Logging)
                | (Logging, Done)
                | (Walking, Failed)
                | (Committing, Failed)
                | (Logging, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ScanPhase::Done | ScanPhase::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScanPhase::Idle => "idle",
            ScanPhase::Walking => "walking",
            ScanPhase::Reconciling => "reconciling",
            ScanPhase::Committing => "committing",
            ScanPhase::Logging => "logging",
            ScanPhase::Done => "done",
            ScanPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_linear() {
        let path = [
            ScanPhase::Idle,
            ScanPhase::Walking,
            ScanPhase::Reconciling,
            ScanPhase::Committing,
            ScanPhase::Logging,
            ScanPhase::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(!ScanPhase::Idle.can_transition_to(ScanPhase::Committing));
        assert!(!ScanPhase::Committing.can_transition_to(ScanPhase::Done));
    }

    #[test]
    fn failure_is_reachable_only_from_fallible_phases() {
        assert!(ScanPhase::Walking.can_transition_to(ScanPhase::Failed));
        assert!(ScanPhase::Committing.can_transition_to(ScanPhase::Failed));
        assert!(ScanPhase::Logging.can_transition_to(ScanPhase::Failed));
        assert!(!ScanPhase::Idle.can_transition_to(ScanPhase::Failed));
        assert!(!ScanPhase::Reconciling.can_transition_to(ScanPhase::Failed));
        assert!(!ScanPhase::Done.can_transition_to(ScanPhase::Failed));
        assert!(ScanPhase::Failed.is_terminal());
    }
}
