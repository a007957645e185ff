use std::collections::BTreeMap;
use std::fmt;

use time::OffsetDateTime;

use super::{RootFailure, ScanPhase};
use crate::tracking::RootId;
use crate::tracking::reconcile::ChangeCounts;

/// Outcome classification for a root or a whole scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanStatus {
    Success,
    /// State was committed but something after the commit went wrong,
    /// or, for a whole scan, some roots failed and others did not.
    PartialFailure,
    Failure,
}

impl ScanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Success => "success",
            ScanStatus::PartialFailure => "partial_failure",
            ScanStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one root.
#[derive(Debug)]
pub struct RootReport {
    pub root_id: RootId,
    pub change_count: usize,
    pub counts: ChangeCounts,
    pub skipped_count: usize,
    pub status: ScanStatus,
    /// Last phase the root reached.
    pub phase: ScanPhase,
    pub failure: Option<RootFailure>,
    /// Set when the commit succeeded but the history write did not.
    pub log_warning: Option<String>,
}

impl RootReport {
    pub(super) fn new(root_id: RootId) -> Self {
        Self {
            root_id,
            change_count: 0,
            counts: ChangeCounts::default(),
            skipped_count: 0,
            status: ScanStatus::Success,
            phase: ScanPhase::Idle,
            failure: None,
            log_warning: None,
        }
    }

    pub(super) fn advance(&mut self, next: ScanPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal transition {} -> {next}",
            self.phase
        );
        tracing::debug!(root = %self.root_id, from = %self.phase, to = %next, "Root phase");
        self.phase = next;
    }

    /// Record a failure. Roots that never left `Idle` stay there.
    pub(super) fn fail(&mut self, failure: RootFailure) {
        if self.phase != ScanPhase::Idle {
            self.advance(ScanPhase::Failed);
        }
        self.status = ScanStatus::Failure;
        self.failure = Some(failure);
    }

    pub(super) fn set_counts(&mut self, counts: ChangeCounts) {
        self.counts = counts;
        self.change_count = counts.total();
    }
}

/// Outcome of one `run_scan` call.
#[derive(Debug)]
pub struct ScanResult {
    pub scan_started_at: OffsetDateTime,
    pub per_root: BTreeMap<RootId, RootReport>,
    pub overall_status: ScanStatus,
}

impl ScanResult {
    pub(super) fn new(
        scan_started_at: OffsetDateTime,
        per_root: BTreeMap<RootId, RootReport>,
    ) -> Self {
        let overall_status = overall_status(per_root.values().map(|report| report.status));
        Self {
            scan_started_at,
            per_root,
            overall_status,
        }
    }

    /// Change totals across every committed root.
    pub fn total_counts(&self) -> ChangeCounts {
        let mut total = ChangeCounts::default();
        for report in self.per_root.values() {
            total.merge(report.counts);
        }
        total
    }

    pub fn total_skipped(&self) -> usize {
        self.per_root.values().map(|report| report.skipped_count).sum()
    }

    /// Roots whose state was not committed; safe to retry on their own.
    pub fn failed_roots(&self) -> Vec<&RootId> {
        self.per_root
            .values()
            .filter(|report| report.status == ScanStatus::Failure)
            .map(|report| &report.root_id)
            .collect()
    }
}

fn overall_status(statuses: impl Iterator<Item = ScanStatus>) -> ScanStatus {
    let mut any = false;
    let mut all_success = true;
    let mut all_failure = true;
    for status in statuses {
        any = true;
        all_success &= status == ScanStatus::Success;
        all_failure &= status == ScanStatus::Failure;
    }
    if !any || all_success {
        ScanStatus::Success
    } else if all_failure {
        ScanStatus::Failure
    } else {
        ScanStatus::PartialFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_status_combines_root_outcomes() {
        use ScanStatus::*;
        assert_eq!(overall_status(std::iter::empty()), Success);
        assert_eq!(overall_status([Success, Success].into_iter()), Success);
        assert_eq!(overall_status([Failure, Failure].into_iter()), Failure);
        assert_eq!(overall_status([Success, Failure].into_iter()), PartialFailure);
        assert_eq!(overall_status([PartialFailure].into_iter()), PartialFailure);
    }

    #[test]
    fn idle_root_stays_idle_when_failed() {
        let mut report = RootReport::new(RootId::from_string("data"));
        report.fail(RootFailure::DeadlineExceeded);
        assert_eq!(report.phase, ScanPhase::Idle);
        assert_eq!(report.status, ScanStatus::Failure);
    }
}
