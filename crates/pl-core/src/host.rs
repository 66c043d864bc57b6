//! Host process capability.
//!
//! Live process enumeration and termination belong to the host. The engine
//! only sees this trait; applying a Terminate recommendation calls
//! [`ProcessHost::terminate`] when one is supplied.

use std::sync::Mutex;

use pl_common::{Error, ProcessSnapshot, Result};
use tracing::debug;

/// What the engine needs from the operating system.
pub trait ProcessHost: Send + Sync {
    /// Current attribute snapshot of every visible process.
    fn list_processes(&self) -> Result<Vec<ProcessSnapshot>>;

    /// Terminate the process with OS id `pid`.
    fn terminate(&self, pid: u32) -> Result<()>;
}

/// In-memory host backed by a fixed snapshot list.
///
/// `terminate` removes the matching snapshot; unknown pids fail with
/// [`Error::Host`].
#[derive(Debug, Default)]
pub struct StaticHost {
    processes: Mutex<Vec<ProcessSnapshot>>,
}

impl StaticHost {
    pub fn new(processes: Vec<ProcessSnapshot>) -> Self {
        StaticHost {
            processes: Mutex::new(processes),
        }
    }
}

impl ProcessHost for StaticHost {
    fn list_processes(&self) -> Result<Vec<ProcessSnapshot>> {
        let guard = self.processes.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.clone())
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        let mut guard = self.processes.lock().unwrap_or_else(|e| e.into_inner());
        let before = guard.len();
        guard.retain(|p| p.id.as_pid() != Some(pid));
        if guard.len() == before {
            return Err(Error::Host(format!("no such process: {pid}")));
        }
        debug!(pid, "static host terminated process");
        Ok(())
    }
}
