use std::fmt;
use std::process::{Child, ExitStatus};

use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// ProcessKind
// ---------------------------------------------------------------------------

/// Role of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessKind {
    Server,
    Client,
    Display,
}

impl ProcessKind {
    /// Short name used in log file names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
            Self::Display => "xvfb",
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// ProcessHandle
// ---------------------------------------------------------------------------

/// Exclusive handle over one spawned child process.
///
/// Dropping the handle kills the process if it is still running.
pub struct ProcessHandle {
    kind: ProcessKind,
    child: Child,
    exit: Option<ExitStatus>,
}

impl ProcessHandle {
    pub(crate) const fn new(kind: ProcessKind, child: Child) -> Self {
        Self {
            kind,
            child,
            exit: None,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ProcessKind {
        self.kind
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Exit status, once the process has been observed to exit.
    #[must_use]
    pub const fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    /// Non-blocking liveness check.
    ///
    /// A failed status poll is reported as dead.
    pub fn is_alive(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(kind = %self.kind, pid = self.pid(), %status, "process exited");
                self.exit = Some(status);
                false
            }
            Err(e) => {
                warn!(kind = %self.kind, pid = self.pid(), error = %e, "failed to poll process");
                false
            }
        }
    }

    /// Forcefully terminate and reap the process. No-op if it already exited.
    pub fn kill(&mut self) {
        if !self.is_alive() {
            return;
        }
        if let Err(e) = self.child.kill() {
            warn!(kind = %self.kind, pid = self.pid(), error = %e, "failed to kill process");
            return;
        }
        match self.child.wait() {
            Ok(status) => {
                debug!(kind = %self.kind, pid = self.pid(), %status, "process killed");
                self.exit = Some(status);
            }
            Err(e) => warn!(kind = %self.kind, pid = self.pid(), error = %e, "failed to reap process"),
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("kind", &self.kind)
            .field("pid", &self.pid())
            .field("exit", &self.exit)
            .finish()
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.kill();
    }
}
