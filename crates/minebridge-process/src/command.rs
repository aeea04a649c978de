//! Command lines for the engine server, the engine client and Xvfb.
//!
//! Builders here are pure: they turn launch parameters into a
//! [`CommandSpec`] which the supervisor spawns.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use minebridge_core::config::SyncConfig;

/// Address the client is told to reach the server on.
pub const SERVER_ADDRESS: &str = "0.0.0.0";

/// Password the client logs in with.
pub const CLIENT_PASSWORD: &str = "1234";

// ---------------------------------------------------------------------------
// CommandSpec
// ---------------------------------------------------------------------------

/// Program, arguments and extra environment for one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Variables added on top of the parent's environment.
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append `flag value`.
    #[must_use]
    pub fn flag(self, flag: &str, value: impl Into<OsString>) -> Self {
        self.arg(flag).arg(value)
    }

    #[must_use]
    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_string(), value.into()));
        self
    }

    /// True if any argument equals `needle`.
    #[must_use]
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }

    /// Value following `flag`, if present.
    #[must_use]
    pub fn flag_value(&self, flag: &str) -> Option<&OsString> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
    }

    /// Build a [`Command`] without any stdio configuration.
    #[must_use]
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Parameters for launching the engine in server mode.
#[derive(Debug, Clone)]
pub struct ServerLaunch<'a> {
    pub executable: &'a Path,
    pub world_dir: &'a Path,
    pub game_id: &'a str,
    pub config_path: &'a Path,
    pub port: u16,
    pub sync: Option<SyncConfig>,
}

/// `<exe> --server --world W --gameid G --config C --port P [--sync-port S --sync-dtime D]`
#[must_use]
pub fn server_command(launch: &ServerLaunch<'_>) -> CommandSpec {
    let mut spec = CommandSpec::new(launch.executable)
        .arg("--server")
        .flag("--world", launch.world_dir)
        .flag("--gameid", launch.game_id)
        .flag("--config", launch.config_path)
        .flag("--port", launch.port.to_string());
    if let Some(sync) = launch.sync {
        spec = spec
            .flag("--sync-port", sync.port.to_string())
            .flag("--sync-dtime", sync.dtime.to_string());
    }
    spec
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Parameters for launching the engine client.
#[derive(Debug, Clone)]
pub struct ClientLaunch<'a> {
    pub executable: &'a Path,
    pub config_path: &'a Path,
    pub client_name: &'a str,
    pub server_port: u16,
    /// Port of the bridge's transport; the client connects back to it.
    pub env_port: u16,
    pub cursor_image: Option<&'a Path>,
    pub media_cache_dir: &'a Path,
    pub sync: Option<SyncConfig>,
    pub headless: bool,
    /// X display index exported as `DISPLAY=:<index>`.
    pub display: Option<u32>,
    pub gpu_env: bool,
    pub disable_vsync: bool,
}

#[must_use]
pub fn client_command(launch: &ClientLaunch<'_>) -> CommandSpec {
    let mut spec = CommandSpec::new(launch.executable)
        .flag("--name", launch.client_name)
        .flag("--password", CLIENT_PASSWORD)
        .flag("--address", SERVER_ADDRESS)
        .flag("--port", launch.server_port.to_string())
        .arg("--go")
        .arg("--dumb")
        .flag("--client-address", format!("tcp://localhost:{}", launch.env_port))
        .arg("--record")
        .arg("--noresizing")
        .flag("--config", launch.config_path)
        .flag("--cache", launch.media_cache_dir);
    if launch.headless {
        spec = spec.arg("--headless");
    }
    if let Some(cursor) = launch.cursor_image {
        spec = spec.flag("--cursor-image", cursor);
    }
    if let Some(sync) = launch.sync {
        spec = spec
            .flag("--sync-port", sync.port.to_string())
            .flag("--dtime", sync.dtime.to_string());
    }
    if let Some(index) = launch.display {
        spec = spec.env("DISPLAY", format!(":{index}"));
    }
    if launch.gpu_env {
        spec = spec
            .env("__GLX_VENDOR_LIBRARY_NAME", "nvidia")
            .env("__NV_PRIME_RENDER_OFFLOAD", "1");
    }
    if launch.disable_vsync {
        spec = spec.env("__GL_SYNC_TO_VBLANK", "0").env("vblank_mode", "0");
    }
    spec
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// Parameters for a virtual framebuffer X server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayLaunch {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// `Xvfb :<index> -screen 0 <w>x<h>x<depth>`
#[must_use]
pub fn display_command(launch: &DisplayLaunch) -> CommandSpec {
    CommandSpec::new("Xvfb")
        .arg(format!(":{}", launch.index))
        .arg("-screen")
        .arg("0")
        .arg(format!("{}x{}x{}", launch.width, launch.height, launch.depth))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
