//! Process-level collaborators: table scanning, liveness probing and
//! working-directory resolution.

pub mod elapsed;
pub mod liveness;
pub mod scanner;
pub mod working_dir;

pub use elapsed::parse_elapsed;
pub use liveness::{LivenessProbe, SignalProbe};
pub use scanner::{ProcessSample, ProcessScanner, ProcessTable, PsProcessTable, ScanReport};
pub use working_dir::{CwdLookup, PlatformCwdLookup, WorkingDirResolver};
