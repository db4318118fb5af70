//! Lightweight process existence checks.

/// Existence check against an OS pid.
pub trait LivenessProbe: Send + Sync {
    /// Whether a process with `pid` currently exists.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe that sends signal 0 to the process.
///
/// `EPERM` still proves existence; only `ESRCH` (or an out-of-range pid)
/// counts as gone. On non-Unix platforms every pid is reported alive and
/// removal relies on the scan loop alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalProbe;

impl LivenessProbe for SignalProbe {
    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        match kill(Pid::from_raw(raw), None) {
            Ok(()) | Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        true
    }
}
