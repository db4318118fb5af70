//! Transcript tailing and interrupt detection.

pub mod entry;
pub mod path_safety;
pub mod tailer;

pub use path_safety::validate_log_path;
pub use tailer::{InterruptDetected, LogTailer, TranscriptCursor};
