//! Mod enabling: `mods.conf` for client mods, `worldmods/` copies for
//! server mods.

use std::path::Path;

use minebridge_core::conf::{self, ConfMap, ConfValue};
use minebridge_core::error::ProvisionError;
use tracing::{debug, warn};

/// File in the client mods directory listing enabled mods.
pub const MODS_CONF: &str = "mods.conf";

/// Subdirectory of a world holding world-local server mods.
pub const WORLDMODS_DIR: &str = "worldmods";

/// Write `<client_root>/mods.conf` enabling each mod in `mods` that exists
/// under `client_root`. Missing mods are skipped with a warning.
///
/// Returns the names actually enabled.
///
/// # Errors
///
/// [`ProvisionError::MissingModRoot`] if `client_root` does not exist, or an
/// I/O error writing the file.
pub fn enable_client_mods(client_root: &Path, mods: &[String]) -> Result<Vec<String>, ProvisionError> {
    if !client_root.is_dir() {
        return Err(ProvisionError::MissingModRoot {
            kind: "Client",
            path: client_root.to_path_buf(),
        });
    }
    let mut enabled = Vec::new();
    let mut entries = ConfMap::new();
    for name in mods {
        let mod_dir = client_root.join(name);
        if !mod_dir.is_dir() {
            warn!(
                client_mod = %name,
                path = %mod_dir.display(),
                "client mod not found, skipping"
            );
            continue;
        }
        entries.insert(format!("load_mod_{name}"), ConfValue::Bool(true));
        enabled.push(name.clone());
    }
    let path = client_root.join(MODS_CONF);
    conf::write_conf(&path, &entries).map_err(ProvisionError::from)?;
    debug!(path = %path.display(), mods = ?enabled, "wrote client mods.conf");
    Ok(enabled)
}

/// Copy each mod in `mods` from `server_root` into `<world_dir>/worldmods/`,
/// replacing earlier copies. Missing mods are skipped with a warning.
///
/// Returns the names actually copied.
///
/// # Errors
///
/// [`ProvisionError::MissingModRoot`] if `server_root` does not exist, or an
/// I/O error while copying.
pub fn enable_server_mods(
    server_root: &Path,
    world_dir: &Path,
    mods: &[String],
) -> Result<Vec<String>, ProvisionError> {
    if !server_root.is_dir() {
        return Err(ProvisionError::MissingModRoot {
            kind: "Server",
            path: server_root.to_path_buf(),
        });
    }
    let worldmods = world_dir.join(WORLDMODS_DIR);
    std::fs::create_dir_all(&worldmods).map_err(|e| ProvisionError::io(&worldmods, e))?;

    let mut copied = Vec::new();
    for name in mods {
        let src = server_root.join(name);
        if !src.is_dir() {
            warn!(
                server_mod = %name,
                path = %src.display(),
                "server mod not found, skipping"
            );
            continue;
        }
        let dst = worldmods.join(name);
        if dst.exists() {
            std::fs::remove_dir_all(&dst).map_err(|e| ProvisionError::io(&dst, e))?;
        }
        copy_dir_all(&src, &dst)?;
        copied.push(name.clone());
    }
    debug!(world = %world_dir.display(), mods = ?copied, "copied server mods");
    Ok(copied)
}

/// Recursively copy the directory tree `src` to `dst`.
///
/// # Errors
///
/// The first I/O failure, tagged with the path involved.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<(), ProvisionError> {
    std::fs::create_dir_all(dst).map_err(|e| ProvisionError::io(dst, e))?;
    let entries = std::fs::read_dir(src).map_err(|e| ProvisionError::io(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ProvisionError::io(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| ProvisionError::io(&from, e))?;
        if file_type.is_dir() {
            copy_dir_all(&from, &to)?;
        } else {
            std::fs::copy(&from, &to).map_err(|e| ProvisionError::io(&from, e))?;
        }
    }
    Ok(())
}
