use sysinfo::{Pid, Signal, System};
use tracing::debug;

/// Best-effort OS process-table access used by the zombie-kill recovery path
/// and graceful shutdown.
///
/// The connection manager treats this as an optional capability: when no
/// enumerator is installed the orphan scan is skipped entirely, and none of
/// these operations may fail loudly.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessEnumerator: Send + Sync {
    /// Find PIDs of processes whose command line contains `needle`.
    fn find_by_command(&self, needle: &str) -> Vec<u32>;

    /// Send a termination signal (SIGTERM where supported). Returns whether
    /// the signal was delivered.
    fn terminate(&self, pid: u32) -> bool;

    /// Force-kill the process. Returns whether the signal was delivered.
    fn kill(&self, pid: u32) -> bool;
}

/// Process enumerator backed by the sysinfo process table.
pub struct SysinfoEnumerator;

impl ProcessEnumerator for SysinfoEnumerator {
    fn find_by_command(&self, needle: &str) -> Vec<u32> {
        let system = System::new_all();
        system
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let cmdline = process
                    .cmd()
                    .iter()
                    .map(|part| part.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                if !cmdline.is_empty() && cmdline.contains(needle) {
                    Some(pid.as_u32())
                } else {
                    None
                }
            })
            .collect()
    }

    fn terminate(&self, pid: u32) -> bool {
        let system = System::new_all();
        match system.process(Pid::from_u32(pid)) {
            Some(process) => process.kill_with(Signal::Term).unwrap_or(false),
            None => {
                debug!("process {pid} not found for terminate");
                false
            }
        }
    }

    fn kill(&self, pid: u32) -> bool {
        let system = System::new_all();
        match system.process(Pid::from_u32(pid)) {
            Some(process) => process.kill(),
            None => {
                debug!("process {pid} not found for kill");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_command_matches_own_process() {
        // The test binary itself is in the process table.
        let needle = std::env::current_exe()
            .unwrap()
            .to_string_lossy()
            .to_string();
        let enumerator = SysinfoEnumerator;
        let pids = enumerator.find_by_command(&needle);
        assert!(pids.contains(&std::process::id()));
    }

    #[test]
    fn test_signals_to_missing_pid_are_swallowed() {
        let enumerator = SysinfoEnumerator;
        // PID far outside the usual range; must not panic.
        assert!(!enumerator.terminate(u32::MAX - 1));
        assert!(!enumerator.kill(u32::MAX - 1));
    }
}
