//! Fake engine installs for exercising process supervision without the real
//! engine binary.
//!
//! An [`EngineFixture`] lays out a temporary engine root the way a real
//! install looks:
//!
//! ```text
//! <root>/bin/minetest          shell script standing in for the engine
//! <root>/clientmods/rewards/   base client mod
//! <root>/mods/rewards/         same mod, as a server mod
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use minebridge_core::config::{BridgeConfig, DisplayMode, EnginePaths};
use tempfile::TempDir;

const SLEEPING: &str = "#!/bin/sh\nexec sleep 60\n";

const SERVER_EXITS: &str = "#!/bin/sh
case \" $* \" in
  *\" --server \"*) exit 0 ;;
esac
exec sleep 60
";

const CLIENT_EXITS: &str = "#!/bin/sh
case \" $* \" in
  *\" --server \"*) exec sleep 60 ;;
esac
exit 0
";

/// Temporary engine root with a scripted executable.
pub struct EngineFixture {
    dir: TempDir,
}

impl EngineFixture {
    /// Engine whose server and client both run until killed.
    #[must_use]
    pub fn sleeping() -> Self {
        Self::with_script(SLEEPING)
    }

    /// Engine whose client runs until killed while the server exits at once.
    #[must_use]
    pub fn server_exits() -> Self {
        Self::with_script(SERVER_EXITS)
    }

    /// Engine whose server runs until killed while the client exits at once.
    #[must_use]
    pub fn client_exits() -> Self {
        Self::with_script(CLIENT_EXITS)
    }

    /// Fixture running `script` as the engine executable.
    ///
    /// # Panics
    ///
    /// Panics if the temporary layout cannot be created.
    #[must_use]
    pub fn with_script(script: &str) -> Self {
        let dir = tempfile::tempdir().expect("create engine root");
        let root = dir.path();
        for sub in ["bin", "clientmods/rewards", "mods/rewards"] {
            fs::create_dir_all(root.join(sub)).expect("create engine layout");
        }
        fs::write(root.join("clientmods/rewards/init.lua"), "-- rewards\n").expect("write client mod");
        fs::write(root.join("mods/rewards/init.lua"), "-- rewards\n").expect("write server mod");

        let exe = root.join("bin/minetest");
        fs::write(&exe, script).expect("write engine script");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).expect("chmod engine script");
        }
        Self { dir }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn executable(&self) -> PathBuf {
        self.root().join("bin/minetest")
    }

    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.root().join("log")
    }

    /// Bridge configuration pointing every path into this fixture.
    ///
    /// Uses a tiny headless display so mock observations stay small.
    #[must_use]
    pub fn config(&self, env_port: u16, server_port: u16) -> BridgeConfig {
        BridgeConfig {
            env_port,
            server_port,
            display_size: [8, 6],
            display: DisplayMode::Headless,
            gpu_env: false,
            disable_vsync: false,
            paths: EnginePaths {
                executable: self.executable(),
                root_dir: self.root().to_path_buf(),
                log_dir: Some(self.log_dir()),
                client_mods_dir: Some(self.root().join("clientmods")),
                server_mods_dir: Some(self.root().join("mods")),
                ..EnginePaths::default()
            },
            ..BridgeConfig::default()
        }
    }
}
