//! Killing leftover processes that outlived their handles.
//!
//! Sweeps are scoped: an Xvfb sweep only matches the instance's display
//! index, an engine sweep only matches processes started with the instance's
//! config path. Parallel instances never kill each other's processes.

use std::ffi::{OsStr, OsString};
use std::path::Path;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, info};

/// True for an Xvfb process serving display `:index`.
#[must_use]
pub fn is_display_process(name: &OsStr, cmd: &[OsString], index: u32) -> bool {
    let target = format!(":{index}");
    name.to_string_lossy().starts_with("Xvfb") && cmd.iter().any(|a| a.as_os_str() == target.as_str())
}

/// True for a process launched with `config_path` as one of its arguments.
#[must_use]
pub fn references_config(cmd: &[OsString], config_path: &Path) -> bool {
    cmd.iter().any(|a| Path::new(a) == config_path)
}

/// Kill every process (other than this one) matching `pred(name, cmd)`.
///
/// Returns the number of processes signalled.
pub fn sweep_matching<F>(pred: F) -> usize
where
    F: Fn(&OsStr, &[OsString]) -> bool,
{
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::OnlyIfNotSet),
    );
    let own_pid = sysinfo::get_current_pid().ok();

    let mut killed = 0;
    for (pid, process) in system.processes() {
        if Some(*pid) == own_pid {
            continue;
        }
        if pred(process.name(), process.cmd()) {
            debug!(pid = pid.as_u32(), name = ?process.name(), "sweeping leftover process");
            if process.kill() {
                killed += 1;
            }
        }
    }
    killed
}

/// Kill leftover Xvfb servers for display `:index`.
pub fn sweep_display(index: u32) -> usize {
    let killed = sweep_matching(|name, cmd| is_display_process(name, cmd, index));
    if killed > 0 {
        info!(display = index, killed, "swept leftover display processes");
    }
    killed
}

/// Kill leftover engine processes started with `config_path`.
pub fn sweep_engine(config_path: &Path) -> usize {
    let killed = sweep_matching(|_, cmd| references_config(cmd, config_path));
    if killed > 0 {
        info!(config = %config_path.display(), killed, "swept leftover engine processes");
    }
    killed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn display_match_requires_exact_index() {
        let cmd = args(&["Xvfb", ":12", "-screen", "0", "64x48x24"]);
        assert!(is_display_process(OsStr::new("Xvfb"), &cmd, 12));
        assert!(!is_display_process(OsStr::new("Xvfb"), &cmd, 1));
        assert!(!is_display_process(OsStr::new("sleep"), &cmd, 12));
    }

    #[test]
    fn config_match_is_by_whole_argument() {
        let cmd = args(&["minetest", "--config", "/tmp/a.conf"]);
        assert!(references_config(&cmd, Path::new("/tmp/a.conf")));
        assert!(!references_config(&cmd, Path::new("/tmp/a.con")));
        assert!(!references_config(&cmd, Path::new("/tmp/b.conf")));
    }

    #[cfg(unix)]
    #[test]
    fn sweep_engine_kills_matching_process() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker.conf");
        let mut child = std::process::Command::new("/bin/sh")
            .arg("-c")
            .arg("sleep 30; true")
            .arg(&marker)
            .spawn()
            .unwrap();
        // Let the child exec so its command line is visible.
        std::thread::sleep(std::time::Duration::from_millis(200));

        let killed = sweep_engine(&marker);
        assert_eq!(killed, 1);
        let status = child.wait().unwrap();
        assert!(!status.success());
    }
}
