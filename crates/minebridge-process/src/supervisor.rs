//! Spawning, polling and stopping the engine processes of one instance.
//!
//! Every process gets its own stdout/stderr log files named
//! `<kind>_<stream>_<timestamp>_<instance-id>.log`. The timestamp is taken
//! once per reset via [`ProcessSupervisor::begin_reset`], so the server and
//! client logs of one reset share it and later resets never overwrite them.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use minebridge_core::error::ProcessError;
use tracing::info;
use uuid::Uuid;

use crate::command::{
    ClientLaunch, CommandSpec, DisplayLaunch, ServerLaunch, client_command, display_command,
    server_command,
};
use crate::handle::{ProcessHandle, ProcessKind};
use crate::sweep;

const TIMESTAMP_FORMAT: &str = "%m-%d-%Y_%H-%M-%S%.3f";

// ---------------------------------------------------------------------------
// SupervisorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Directory receiving process logs. Created on first spawn.
    pub log_dir: PathBuf,
    /// Instance id embedded in log file names.
    pub instance_id: Uuid,
}

// ---------------------------------------------------------------------------
// ProcessSupervisor
// ---------------------------------------------------------------------------

/// Starts and stops the processes belonging to one bridge instance.
#[derive(Debug)]
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    stamp: String,
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            stamp: now_stamp(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Change the instance id used in subsequent log names.
    pub fn set_instance_id(&mut self, id: Uuid) {
        self.config.instance_id = id;
    }

    /// Take a fresh timestamp for the logs of the next (re)start.
    pub fn begin_reset(&mut self) {
        self.stamp = now_stamp();
    }

    /// Log path for `kind`/`stream` under the current timestamp.
    #[must_use]
    pub fn log_path(&self, kind: ProcessKind, stream: &str) -> PathBuf {
        self.config.log_dir.join(format!(
            "{}_{}_{}_{}.log",
            kind.name(),
            stream,
            self.stamp,
            self.config.instance_id
        ))
    }

    /// Launch the engine server.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] if a log file cannot be opened or the
    /// executable cannot be spawned.
    pub fn start_server(&self, launch: &ServerLaunch<'_>) -> Result<ProcessHandle, ProcessError> {
        self.spawn(ProcessKind::Server, &server_command(launch))
    }

    /// Launch the engine client.
    ///
    /// # Errors
    ///
    /// See [`start_server`](Self::start_server).
    pub fn start_client(&self, launch: &ClientLaunch<'_>) -> Result<ProcessHandle, ProcessError> {
        self.spawn(ProcessKind::Client, &client_command(launch))
    }

    /// Launch a virtual framebuffer X server.
    ///
    /// # Errors
    ///
    /// See [`start_server`](Self::start_server).
    pub fn start_display(&self, launch: &DisplayLaunch) -> Result<ProcessHandle, ProcessError> {
        self.spawn(ProcessKind::Display, &display_command(launch))
    }

    /// Spawn `spec` in its own process group with logged stdio.
    ///
    /// # Errors
    ///
    /// See [`start_server`](Self::start_server).
    pub fn spawn(&self, kind: ProcessKind, spec: &CommandSpec) -> Result<ProcessHandle, ProcessError> {
        std::fs::create_dir_all(&self.config.log_dir).map_err(|source| ProcessError::LogFile {
            path: self.config.log_dir.clone(),
            source,
        })?;
        let stdout = open_log(&self.log_path(kind, "stdout"))?;
        let stderr = open_log(&self.log_path(kind, "stderr"))?;

        let mut cmd = spec.to_command();
        cmd.stdin(Stdio::null()).stdout(stdout).stderr(stderr);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: spec.program.display().to_string(),
            source,
        })?;
        info!(
            %kind,
            pid = child.id(),
            program = %spec.program.display(),
            instance = %self.config.instance_id,
            "started process"
        );
        Ok(ProcessHandle::new(kind, child))
    }

    /// Non-blocking liveness check.
    pub fn is_alive(handle: &mut ProcessHandle) -> bool {
        handle.is_alive()
    }

    /// Forcefully terminate `handle`.
    pub fn stop(handle: &mut ProcessHandle) {
        handle.kill();
    }

    /// Kill leftover Xvfb servers on display `:index`.
    pub fn sweep_display(index: u32) -> usize {
        sweep::sweep_display(index)
    }

    /// Kill leftover engine processes using `config_path`.
    pub fn sweep_engine(config_path: &Path) -> usize {
        sweep::sweep_engine(config_path)
    }
}

fn now_stamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn open_log(path: &Path) -> Result<File, ProcessError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ProcessError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn supervisor(dir: &Path) -> ProcessSupervisor {
        ProcessSupervisor::new(SupervisorConfig {
            log_dir: dir.join("log"),
            instance_id: Uuid::nil(),
        })
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh").arg("-c").arg(script)
    }

    fn wait_dead(handle: &mut ProcessHandle) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if !handle.is_alive() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn exited_process_is_not_alive() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path());
        let mut handle = sup.spawn(ProcessKind::Server, &sh("exit 3")).unwrap();
        assert!(wait_dead(&mut handle));
        assert_eq!(handle.exit_status().and_then(|s| s.code()), Some(3));
    }

    #[test]
    fn stop_kills_running_process() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path());
        let mut handle = sup.spawn(ProcessKind::Client, &sh("sleep 30")).unwrap();
        assert!(ProcessSupervisor::is_alive(&mut handle));
        ProcessSupervisor::stop(&mut handle);
        assert!(!ProcessSupervisor::is_alive(&mut handle));
        // second stop is a no-op
        ProcessSupervisor::stop(&mut handle);
    }

    #[test]
    fn sweeps_need_no_supervisor() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(ProcessSupervisor::sweep_display(u32::MAX), 0);
        assert_eq!(ProcessSupervisor::sweep_engine(&dir.path().join("absent.conf")), 0);
    }

    #[test]
    fn output_goes_to_named_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path());
        let mut handle = sup
            .spawn(ProcessKind::Server, &sh("echo hello; echo oops >&2"))
            .unwrap();
        assert!(wait_dead(&mut handle));

        let stdout = sup.log_path(ProcessKind::Server, "stdout");
        let name = stdout.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("server_stdout_"));
        assert!(name.ends_with("_00000000-0000-0000-0000-000000000000.log"));
        assert_eq!(std::fs::read_to_string(&stdout).unwrap(), "hello\n");
        let stderr = sup.log_path(ProcessKind::Server, "stderr");
        assert_eq!(std::fs::read_to_string(stderr).unwrap(), "oops\n");
    }

    #[test]
    fn new_reset_gets_new_log_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor(dir.path());
        let first = sup.log_path(ProcessKind::Client, "stdout");
        std::thread::sleep(Duration::from_millis(5));
        sup.begin_reset();
        assert_ne!(sup.log_path(ProcessKind::Client, "stdout"), first);
    }

    #[test]
    fn spawn_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path());
        let err = sup
            .spawn(ProcessKind::Server, &CommandSpec::new("/nonexistent/minetest"))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[test]
    fn env_is_passed_to_child() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path());
        let spec = sh("printf %s \"$DISPLAY\"").env("DISPLAY", ":9");
        let mut handle = sup.spawn(ProcessKind::Client, &spec).unwrap();
        assert!(wait_dead(&mut handle));
        let out = std::fs::read_to_string(sup.log_path(ProcessKind::Client, "stdout")).unwrap();
        assert_eq!(out, ":9");
    }
}
