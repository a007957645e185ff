use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use super::{RootFailure, RootReport, ScanPhase, ScanResult, ScanStatus};
use crate::tracking::capture::CaptureOptions;
use crate::tracking::change_log::ChangeLogger;
use crate::tracking::reconcile::{ChangeCounts, Snapshot, carry_forward, diff};
use crate::tracking::store::StateStore;
use crate::tracking::walker::Walker;
use crate::tracking::{RegisteredRoot, RootId};

/// Caller-supplied knobs for one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions<'a> {
    pub capture: CaptureOptions,
    /// Paths never walked, e.g. the store's own files.
    pub exclusions: Vec<PathBuf>,
    /// Walk roots concurrently. Commits still run one root at a time, in order.
    pub parallel_walk: bool,
    /// Polled while walking and before each commit.
    pub cancel: Option<&'a AtomicBool>,
    /// Honored between roots only; a running commit is never interrupted.
    pub deadline: Option<Instant>,
}

impl ScanOptions<'_> {
    fn canceled(&self) -> bool {
        self.cancel.is_some_and(|cancel| cancel.load(Ordering::Relaxed))
    }

    fn past_deadline(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Reason to stop before starting the next root, if any.
    fn boundary_stop(&self) -> Option<RootFailure> {
        if self.canceled() {
            Some(RootFailure::Canceled)
        } else if self.past_deadline() {
            Some(RootFailure::DeadlineExceeded)
        } else {
            None
        }
    }
}

/// Walk output of one root, not yet compared to prior state.
struct WalkedRoot {
    records: Snapshot,
    skipped: usize,
    /// Paths whose prior state is kept because they could not be read.
    unreadable: Vec<PathBuf>,
}

/// Run one scan over `roots`: walk, reconcile, commit and log each root.
///
/// Never fails as a whole. Every root gets a report; a failed root leaves its
/// committed state untouched and does not stop the others.
pub fn run_scan(
    store: &mut StateStore,
    logger: &mut ChangeLogger,
    roots: &[RegisteredRoot],
    options: &ScanOptions<'_>,
) -> ScanResult {
    let scan_started_at = OffsetDateTime::now_utc();
    let roots = unique_roots(roots);
    let walker = Walker::new(options.capture).with_exclusions(options.exclusions.iter().cloned());
    info!(roots = roots.len(), parallel = options.parallel_walk, "Scan started");

    let mut per_root = BTreeMap::new();
    if options.parallel_walk {
        let walked = walk_parallel(&walker, &roots, options);
        for (root, walked) in roots.iter().zip(walked) {
            let mut report = RootReport::new(root.id.clone());
            report.advance(ScanPhase::Walking);
            match options.boundary_stop() {
                Some(stop) => report.fail(stop),
                None => finish_root(store, logger, root, walked, scan_started_at, options, &mut report),
            }
            per_root.insert(root.id.clone(), report);
        }
    } else {
        for root in &roots {
            let mut report = RootReport::new(root.id.clone());
            if let Some(stop) = options.boundary_stop() {
                warn!(root = %root.id, reason = %stop, "Root not scanned");
                report.fail(stop);
            } else {
                report.advance(ScanPhase::Walking);
                let walked = walk_root(&walker, root, options);
                finish_root(store, logger, root, walked, scan_started_at, options, &mut report);
            }
            per_root.insert(root.id.clone(), report);
        }
    }

    let result = ScanResult::new(scan_started_at, per_root);
    log_summary(&result);
    result
}

fn unique_roots(roots: &[RegisteredRoot]) -> Vec<&RegisteredRoot> {
    let mut seen = HashSet::new();
    roots
        .iter()
        .filter(|root| {
            let fresh = seen.insert(&root.id);
            if !fresh {
                warn!(root = %root.id, path = %root.path.display(), "Ignoring duplicate root id");
            }
            fresh
        })
        .collect()
}

fn walk_root(
    walker: &Walker,
    root: &RegisteredRoot,
    options: &ScanOptions<'_>,
) -> Result<WalkedRoot, RootFailure> {
    let mut walk = walker.walk_root(root)?;
    let mut records = Snapshot::new();
    loop {
        if options.canceled() {
            return Err(RootFailure::Canceled);
        }
        let Some(record) = walk.next() else {
            break;
        };
        records.insert(record.path.clone(), record);
    }
    Ok(WalkedRoot {
        records,
        skipped: walk.skipped(),
        unreadable: walk.unreadable().to_vec(),
    })
}

fn walk_parallel(
    walker: &Walker,
    roots: &[&RegisteredRoot],
    options: &ScanOptions<'_>,
) -> Vec<Result<WalkedRoot, RootFailure>> {
    thread::scope(|scope| {
        let handles: Vec<_> = roots
            .iter()
            .map(|root| scope.spawn(move || walk_root(walker, root, options)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    })
}

/// Everything after the walk for one root. `report` enters in `Walking`.
fn finish_root(
    store: &mut StateStore,
    logger: &mut ChangeLogger,
    root: &RegisteredRoot,
    walked: Result<WalkedRoot, RootFailure>,
    scan_started_at: OffsetDateTime,
    options: &ScanOptions<'_>,
    report: &mut RootReport,
) {
    let WalkedRoot {
        mut records,
        skipped,
        unreadable,
    } = match walked {
        Ok(walked) => walked,
        Err(failure) => {
            warn!(root = %root.id, error = %failure, "Root walk failed");
            report.fail(failure);
            return;
        }
    };
    report.skipped_count = skipped;
    if options.canceled() {
        report.fail(RootFailure::Canceled);
        return;
    }
    let previous = match store.load_all(Some(&root.id)) {
        Ok(previous) => previous,
        Err(err) => {
            error!(root = %root.id, error = %err, "Failed to load prior state");
            report.fail(RootFailure::Storage(err));
            return;
        }
    };

    report.advance(ScanPhase::Reconciling);
    let carried = carry_forward(&previous, &mut records, &unreadable);
    if carried > 0 {
        debug!(root = %root.id, carried, "Kept prior state of unreadable entries");
    }
    let changes = diff(&previous, &records, &root.id, scan_started_at);

    report.advance(ScanPhase::Committing);
    if let Err(err) = store.commit(&root.id, &records) {
        error!(
            root = %root.id,
            error = %err,
            pending = changes.len(),
            "Commit failed; root state left unchanged"
        );
        report.fail(RootFailure::Storage(err));
        return;
    }
    // Counts describe applied changes only.
    report.set_counts(ChangeCounts::from_changes(&changes));

    report.advance(ScanPhase::Logging);
    if let Err(err) = logger.log(&root.id, &changes, scan_started_at) {
        report.status = ScanStatus::PartialFailure;
        report.log_warning = Some(err.to_string());
    }
    report.advance(ScanPhase::Done);
    info!(
        root = %root.id,
        added = report.counts.added,
        removed = report.counts.removed,
        modified = report.counts.modified,
        skipped = report.skipped_count,
        "Root scanned"
    );
}

fn log_summary(result: &ScanResult) {
    let totals = result.total_counts();
    let failed: Vec<&str> = result.failed_roots().into_iter().map(RootId::as_str).collect();
    info!(
        "Scan finished ({}): {} added, {} removed, {} modified, {} skipped, {} of {} roots failed{}",
        result.overall_status,
        totals.added,
        totals.removed,
        totals.modified,
        result.total_skipped(),
        failed.len(),
        result.per_root.len(),
        if failed.is_empty() {
            String::new()
        } else {
            format!(" [{}]", failed.join(", "))
        }
    );
}
