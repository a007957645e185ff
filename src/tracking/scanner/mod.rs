mod errors;
mod phase;
mod result;
mod runner;
mod session;

pub use errors::{RootFailure, ScanError};
pub use phase::ScanPhase;
pub use result::{RootReport, ScanResult, ScanStatus};
pub use runner::{ScanOptions, run_scan};
pub use session::{ScanSession, scan_configured};
