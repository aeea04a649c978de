use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conf::{self, ConfMap, ConfValue};
use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_env_port() -> u16 {
    5555
}
const fn default_server_port() -> u16 {
    30000
}
const fn default_display_size() -> [u32; 2] {
    [1024, 600]
}
const fn default_fov() -> u32 {
    72
}
const fn default_true() -> bool {
    true
}
const fn default_sync_dtime() -> f64 {
    0.001
}
const fn default_display_depth() -> u32 {
    24
}
fn default_game_id() -> String {
    "minetest".into()
}
fn default_client_name() -> String {
    "minebridge".into()
}
fn default_executable() -> PathBuf {
    PathBuf::from("bin/minetest")
}
fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

/// Lock-step synchronization between client and server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Port the server listens on for step signals.
    pub port: u16,
    /// In-game seconds advanced per step (default: 0.001).
    #[serde(default = "default_sync_dtime")]
    pub dtime: f64,
}

// ---------------------------------------------------------------------------
// DisplayMode
// ---------------------------------------------------------------------------

/// Where the client draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DisplayMode {
    /// Use whatever display the caller's environment provides.
    #[default]
    Windowed,
    /// Client renders offscreen (`--headless`).
    Headless,
    /// Client draws on X display `:index`, optionally started by the bridge.
    Virtual {
        index: u32,
        /// Launch an Xvfb server for this display.
        #[serde(default = "default_true")]
        start: bool,
        /// Colour depth of the launched Xvfb screen.
        #[serde(default = "default_display_depth")]
        depth: u32,
    },
}

impl DisplayMode {
    /// Display index, when a specific X display is used.
    #[must_use]
    pub const fn index(&self) -> Option<u32> {
        match self {
            Self::Virtual { index, .. } => Some(*index),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_headless(&self) -> bool {
        matches!(self, Self::Headless)
    }
}

// ---------------------------------------------------------------------------
// EnginePaths
// ---------------------------------------------------------------------------

/// Filesystem locations of the engine and the bridge's working files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnginePaths {
    /// Engine executable (default: `bin/minetest`).
    #[serde(default = "default_executable")]
    pub executable: PathBuf,

    /// Directory holding seeded worlds and configs (default: `.`).
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Log directory (default: `<root_dir>/log`).
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Explicit world directory. When set, the bridge never deletes it.
    #[serde(default)]
    pub world_dir: Option<PathBuf>,

    /// Explicit engine config path. When set, the bridge never deletes it.
    #[serde(default)]
    pub config_path: Option<PathBuf>,

    /// Cursor image drawn into captured frames
    /// (default: `<root_dir>/cursors/mouse_cursor_white_16x16.png`).
    #[serde(default)]
    pub cursor_image: Option<PathBuf>,

    /// Client media cache (default: `<root_dir>/cache`).
    #[serde(default)]
    pub media_cache_dir: Option<PathBuf>,

    /// Client mods (default: `<executable dir>/../clientmods`).
    #[serde(default)]
    pub client_mods_dir: Option<PathBuf>,

    /// Server mods (default: `<executable dir>/../mods`).
    #[serde(default)]
    pub server_mods_dir: Option<PathBuf>,
}

impl Default for EnginePaths {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            root_dir: default_root_dir(),
            log_dir: None,
            world_dir: None,
            config_path: None,
            cursor_image: None,
            media_cache_dir: None,
            client_mods_dir: None,
            server_mods_dir: None,
        }
    }
}

impl EnginePaths {
    fn engine_sibling(&self, name: &str) -> PathBuf {
        let bin = self.executable.parent().unwrap_or_else(|| Path::new(""));
        bin.join("..").join(name)
    }

    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.join("log"))
    }

    #[must_use]
    pub fn cursor_image(&self) -> PathBuf {
        self.cursor_image.clone().unwrap_or_else(|| {
            self.root_dir
                .join("cursors")
                .join("mouse_cursor_white_16x16.png")
        })
    }

    #[must_use]
    pub fn media_cache_dir(&self) -> PathBuf {
        self.media_cache_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.join("cache"))
    }

    #[must_use]
    pub fn client_mods_dir(&self) -> PathBuf {
        self.client_mods_dir
            .clone()
            .unwrap_or_else(|| self.engine_sibling("clientmods"))
    }

    #[must_use]
    pub fn server_mods_dir(&self) -> PathBuf {
        self.server_mods_dir
            .clone()
            .unwrap_or_else(|| self.engine_sibling("mods"))
    }
}

// ---------------------------------------------------------------------------
// BridgeConfig
// ---------------------------------------------------------------------------

/// Everything needed to construct one bridge instance.
///
/// # Example
///
/// ```
/// use minebridge_core::config::BridgeConfig;
///
/// let config: BridgeConfig = toml::from_str(
///     r#"
///     env_port = 6000
///     seed = 42
///     display_size = [64, 48]
///
///     [overrides]
///     viewing_range = 50
///     "#,
/// )
/// .unwrap();
/// config.validate().unwrap();
/// assert_eq!(config.server_port, 30000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Port the bridge's transport binds; the client connects here.
    #[serde(default = "default_env_port")]
    pub env_port: u16,

    /// Port the engine server listens on.
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Lock-step synchronization. `None` lets the server run freely.
    #[serde(default)]
    pub sync: Option<SyncConfig>,

    /// Frame size `[width, height]`. Observations are `height x width x 3`.
    #[serde(default = "default_display_size")]
    pub display_size: [u32; 2],

    /// Vertical field of view in degrees.
    #[serde(default = "default_fov")]
    pub fov: u32,

    /// Seed for the instance id and the map generator.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Launch the engine. When false, an externally started client is
    /// expected to connect to the bridge's port.
    #[serde(default = "default_true")]
    pub start_processes: bool,

    #[serde(default)]
    pub display: DisplayMode,

    /// Client-side mods to enable in addition to the base mod.
    #[serde(default)]
    pub client_mods: Vec<String>,

    /// Server-side mods copied into the world.
    #[serde(default)]
    pub server_mods: Vec<String>,

    /// Extra engine settings. These are written after the fixed settings
    /// and replace them on key collision.
    #[serde(default)]
    pub overrides: BTreeMap<String, ConfValue>,

    /// End episodes with `truncated = true` after this many steps.
    #[serde(default)]
    pub max_episode_steps: Option<u32>,

    #[serde(default = "default_game_id")]
    pub game_id: String,

    /// Player name the client logs in with.
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Inject GPU vendor selection variables into the client environment.
    #[serde(default = "default_true")]
    pub gpu_env: bool,

    /// Inject vsync-disable variables into the client environment.
    #[serde(default = "default_true")]
    pub disable_vsync: bool,

    #[serde(default)]
    pub paths: EnginePaths,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            env_port: default_env_port(),
            server_port: default_server_port(),
            sync: None,
            display_size: default_display_size(),
            fov: default_fov(),
            seed: None,
            start_processes: true,
            display: DisplayMode::default(),
            client_mods: Vec::new(),
            server_mods: Vec::new(),
            overrides: BTreeMap::new(),
            max_episode_steps: None,
            game_id: default_game_id(),
            client_name: default_client_name(),
            gpu_env: true,
            disable_vsync: true,
            paths: EnginePaths::default(),
        }
    }
}

impl BridgeConfig {
    /// Validate configuration. Returns Err on invalid values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for zero ports, an empty frame,
    /// a non-positive sync step, zero `max_episode_steps` or an empty game
    /// id; [`ConfigError::Collision`] when two ports coincide; and conf
    /// errors for overrides that would not survive the config file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ports = vec![("env_port", self.env_port), ("server_port", self.server_port)];
        if let Some(sync) = &self.sync {
            ports.push(("sync.port", sync.port));
            if !(sync.dtime.is_finite() && sync.dtime > 0.0) {
                return Err(invalid("sync.dtime", format!("must be positive, got {}", sync.dtime)));
            }
        }
        let mut seen = HashSet::new();
        for (field, port) in ports {
            if port == 0 {
                return Err(invalid(field, "must be non-zero"));
            }
            if !seen.insert(port) {
                return Err(ConfigError::Collision {
                    resource: "port",
                    value: u64::from(port),
                });
            }
        }
        if self.display_size.contains(&0) {
            return Err(invalid(
                "display_size",
                format!("must be non-zero, got {:?}", self.display_size),
            ));
        }
        if self.max_episode_steps == Some(0) {
            return Err(invalid("max_episode_steps", "must be at least 1"));
        }
        if self.game_id.is_empty() {
            return Err(invalid("game_id", "must not be empty"));
        }
        for (key, value) in &self.overrides {
            conf::check_key(key)?;
            value.check_round_trip(key)?;
        }
        Ok(())
    }

    /// Observation shape `(height, width, 3)`.
    #[must_use]
    pub const fn image_shape(&self) -> (u32, u32, u32) {
        (self.display_size[1], self.display_size[0], 3)
    }

    /// Load from TOML file.
    ///
    /// # Errors
    ///
    /// Propagates I/O, TOML and [`validate`](Self::validate) errors.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// InstanceConfig
// ---------------------------------------------------------------------------

/// A provisioned instance: resolved identity, ports, paths and mods.
///
/// Produced by the provisioner from a [`BridgeConfig`]. `owns_world` and
/// `owns_config` record whether the paths were derived by the bridge (and are
/// therefore deleted by it) or supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceConfig {
    pub seed: Option<u64>,
    pub instance_id: Uuid,
    pub env_port: u16,
    pub server_port: u16,
    pub sync: Option<SyncConfig>,
    pub world_dir: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub owns_world: bool,
    pub owns_config: bool,
    /// Client mods including the base mod.
    pub client_mods: Vec<String>,
    /// Server mods including every requested client mod.
    pub server_mods: Vec<String>,
    pub display: DisplayMode,
    pub display_size: [u32; 2],
    pub fov: u32,
    pub overrides: BTreeMap<String, ConfValue>,
}

impl InstanceConfig {
    /// Display index, if the client draws on a specific X display.
    #[must_use]
    pub const fn display_index(&self) -> Option<u32> {
        self.display.index()
    }

    #[must_use]
    pub const fn headless(&self) -> bool {
        self.display.is_headless()
    }

    /// World directory, or an error if none is resolved.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingWorldDir`] when unset.
    pub fn require_world_dir(&self) -> Result<&Path, ConfigError> {
        self.world_dir.as_deref().ok_or(ConfigError::MissingWorldDir)
    }

    /// Config path, or an error if none is resolved.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingConfigPath`] when unset.
    pub fn require_config_path(&self) -> Result<&Path, ConfigError> {
        self.config_path
            .as_deref()
            .ok_or(ConfigError::MissingConfigPath)
    }

    /// Engine settings: the fixed settings with overrides applied on top.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn settings(&self) -> ConfMap {
        let mut map = ConfMap::new();
        map.insert("mute_sound".into(), true.into());
        map.insert("show_debug".into(), false.into());
        map.insert("enable_client_modding".into(), true.into());
        map.insert("csm_restriction_flags".into(), ConfValue::Int(0));
        map.insert("enable_mod_channels".into(), true.into());
        map.insert("screen_w".into(), self.display_size[0].into());
        map.insert("screen_h".into(), self.display_size[1].into());
        map.insert("fov".into(), self.fov.into());
        if let Some(seed) = self.seed {
            // Map seeds are unsigned 64-bit in the engine; keep the bit pattern.
            map.insert("fixed_map_seed".into(), ConfValue::Int(seed as i64));
        }
        for (key, value) in &self.overrides {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
