//! Instance identity, paths and on-disk configuration.

use std::path::{Path, PathBuf};

use minebridge_core::conf;
use minebridge_core::config::{BridgeConfig, InstanceConfig};
use minebridge_core::error::ProvisionError;
use minebridge_core::seed::{instance_id_from_seed, random_instance_id};
use tracing::{debug, info};
use uuid::Uuid;

use crate::mods;

/// Client mod every instance loads; it reports rewards to the bridge.
pub const BASE_CLIENT_MOD: &str = "rewards";

// ---------------------------------------------------------------------------
// ModDirs
// ---------------------------------------------------------------------------

/// Roots of the engine's client and server mod trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModDirs {
    pub client: PathBuf,
    pub server: PathBuf,
}

impl ModDirs {
    /// Mod roots resolved from a bridge configuration.
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            client: config.paths.client_mods_dir(),
            server: config.paths.server_mods_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigProvisioner
// ---------------------------------------------------------------------------

/// Derives instance identity and manages the instance's files.
///
/// Seeded instances get a world directory `<root>/<uuid>` and a config file
/// `<root>/<uuid>.conf` that depend only on the seed, unless the caller
/// supplied explicit paths.
#[derive(Debug, Clone)]
pub struct ConfigProvisioner {
    mod_dirs: ModDirs,
    root_dir: PathBuf,
}

impl ConfigProvisioner {
    #[must_use]
    pub const fn new(mod_dirs: ModDirs, root_dir: PathBuf) -> Self {
        Self { mod_dirs, root_dir }
    }

    #[must_use]
    pub const fn mod_dirs(&self) -> &ModDirs {
        &self.mod_dirs
    }

    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Default world directory for an instance id.
    #[must_use]
    pub fn world_dir_for(&self, id: Uuid) -> PathBuf {
        self.root_dir.join(id.to_string())
    }

    /// Default config path for an instance id.
    #[must_use]
    pub fn config_path_for(&self, id: Uuid) -> PathBuf {
        self.root_dir.join(format!("{id}.conf"))
    }

    /// Resolve a bridge configuration into an instance.
    ///
    /// No files are touched. A path the caller supplied is not owned by the
    /// instance and is never deleted by it.
    #[must_use]
    pub fn provision(&self, config: &BridgeConfig) -> InstanceConfig {
        let instance_id = config
            .seed
            .map_or_else(random_instance_id, instance_id_from_seed);
        let owns_world = config.paths.world_dir.is_none();
        let owns_config = config.paths.config_path.is_none();

        let mut client_mods: Vec<String> = Vec::new();
        for name in &config.client_mods {
            if name != BASE_CLIENT_MOD && !client_mods.contains(name) {
                client_mods.push(name.clone());
            }
        }
        let mut server_mods: Vec<String> = Vec::new();
        for name in config.server_mods.iter().chain(&client_mods) {
            if !server_mods.contains(name) {
                server_mods.push(name.clone());
            }
        }
        client_mods.push(BASE_CLIENT_MOD.to_string());

        let instance = InstanceConfig {
            seed: config.seed,
            instance_id,
            env_port: config.env_port,
            server_port: config.server_port,
            sync: config.sync,
            world_dir: Some(
                config
                    .paths
                    .world_dir
                    .clone()
                    .unwrap_or_else(|| self.world_dir_for(instance_id)),
            ),
            config_path: Some(
                config
                    .paths
                    .config_path
                    .clone()
                    .unwrap_or_else(|| self.config_path_for(instance_id)),
            ),
            owns_world,
            owns_config,
            client_mods,
            server_mods,
            display: config.display,
            display_size: config.display_size,
            fov: config.fov,
            overrides: config.overrides.clone(),
        };
        debug!(
            instance = %instance.instance_id,
            world = ?instance.world_dir,
            config = ?instance.config_path,
            "provisioned instance"
        );
        instance
    }

    /// Re-seed an instance: new id, and new owned paths derived from it.
    ///
    /// Caller-supplied paths are left alone. Files at the old owned paths are
    /// not touched; delete them first if they should not linger.
    pub fn seed(&self, instance: &mut InstanceConfig, seed: u64) {
        instance.seed = Some(seed);
        instance.instance_id = instance_id_from_seed(seed);
        if instance.owns_world {
            instance.world_dir = Some(self.world_dir_for(instance.instance_id));
        }
        if instance.owns_config {
            instance.config_path = Some(self.config_path_for(instance.instance_id));
        }
        info!(seed, instance = %instance.instance_id, "seeded instance");
    }

    /// Write the engine config file for `instance`.
    ///
    /// # Errors
    ///
    /// A configuration error if no config path is resolved or a setting
    /// cannot be written faithfully; an I/O error otherwise.
    pub fn write_config(&self, instance: &InstanceConfig) -> Result<(), ProvisionError> {
        let path = instance.require_config_path()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ProvisionError::io(parent, e))?;
        }
        conf::write_conf(path, &instance.settings())?;
        debug!(path = %path.display(), "wrote engine config");
        Ok(())
    }

    /// Enable the instance's client mods. Returns the mods enabled.
    ///
    /// # Errors
    ///
    /// See [`mods::enable_client_mods`].
    pub fn enable_client_mods(&self, instance: &InstanceConfig) -> Result<Vec<String>, ProvisionError> {
        mods::enable_client_mods(&self.mod_dirs.client, &instance.client_mods)
    }

    /// Copy the instance's server mods into its world. Returns the mods copied.
    ///
    /// # Errors
    ///
    /// A configuration error if no world directory is resolved; otherwise
    /// see [`mods::enable_server_mods`].
    pub fn enable_server_mods(&self, instance: &InstanceConfig) -> Result<Vec<String>, ProvisionError> {
        let world = instance.require_world_dir()?;
        mods::enable_server_mods(&self.mod_dirs.server, world, &instance.server_mods)
    }

    /// Remove the world directory if it exists.
    ///
    /// # Errors
    ///
    /// A configuration error if no world directory is resolved, or an I/O
    /// error while removing it.
    pub fn delete_world(&self, instance: &InstanceConfig) -> Result<(), ProvisionError> {
        let world = instance.require_world_dir()?;
        if world.exists() {
            std::fs::remove_dir_all(world).map_err(|e| ProvisionError::io(world, e))?;
            debug!(path = %world.display(), "deleted world");
        }
        Ok(())
    }

    /// Remove the config file if it exists.
    ///
    /// # Errors
    ///
    /// A configuration error if no config path is resolved, or an I/O error
    /// while removing it.
    pub fn delete_config(&self, instance: &InstanceConfig) -> Result<(), ProvisionError> {
        let path = instance.require_config_path()?;
        if path.exists() {
            std::fs::remove_file(path).map_err(|e| ProvisionError::io(path, e))?;
            debug!(path = %path.display(), "deleted config");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::fs;

    use minebridge_core::conf::ConfValue;
    use minebridge_core::error::ConfigError;

    use super::*;

    fn provisioner(root: &Path) -> ConfigProvisioner {
        let dirs = ModDirs {
            client: root.join("clientmods"),
            server: root.join("mods"),
        };
        fs::create_dir_all(&dirs.client).unwrap();
        fs::create_dir_all(&dirs.server).unwrap();
        ConfigProvisioner::new(dirs, root.to_path_buf())
    }

    fn seeded(seed: u64) -> BridgeConfig {
        BridgeConfig {
            seed: Some(seed),
            ..BridgeConfig::default()
        }
    }

    // ---- provision / seed ----

    #[test]
    fn same_seed_same_paths() {
        let dir = tempfile::tempdir().unwrap();
        let prov = provisioner(dir.path());
        let a = prov.provision(&seeded(42));
        let b = prov.provision(&seeded(42));
        let c = prov.provision(&seeded(43));
        assert_eq!(a.instance_id, b.instance_id);
        assert_eq!(a.world_dir, b.world_dir);
        assert_eq!(a.config_path, b.config_path);
        assert_ne!(a.world_dir, c.world_dir);
        assert_ne!(a.config_path, c.config_path);
    }

    #[test]
    fn derived_paths_follow_instance_id() {
        let dir = tempfile::tempdir().unwrap();
        let prov = provisioner(dir.path());
        let inst = prov.provision(&seeded(7));
        let id = inst.instance_id.to_string();
        assert_eq!(inst.world_dir, Some(dir.path().join(&id)));
        assert_eq!(inst.config_path, Some(dir.path().join(format!("{id}.conf"))));
        assert!(inst.owns_world && inst.owns_config);
    }

    #[test]
    fn explicit_paths_are_not_owned() {
        let dir = tempfile::tempdir().unwrap();
        let prov = provisioner(dir.path());
        let mut config = seeded(1);
        config.paths.world_dir = Some(dir.path().join("myworld"));
        let inst = prov.provision(&config);
        assert!(!inst.owns_world);
        assert!(inst.owns_config);
        assert_eq!(inst.world_dir, Some(dir.path().join("myworld")));
    }

    #[test]
    fn unseeded_instances_get_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let prov = provisioner(dir.path());
        let a = prov.provision(&BridgeConfig::default());
        let b = prov.provision(&BridgeConfig::default());
        assert_ne!(a.world_dir, b.world_dir);
    }

    #[test]
    fn reseed_moves_owned_paths_only() {
        let dir = tempfile::tempdir().unwrap();
        let prov = provisioner(dir.path());
        let mut config = BridgeConfig::default();
        config.paths.config_path = Some(dir.path().join("fixed.conf"));
        let mut inst = prov.provision(&config);

        prov.seed(&mut inst, 42);
        let expected = prov.provision(&seeded(42));
        assert_eq!(inst.instance_id, expected.instance_id);
        assert_eq!(inst.world_dir, expected.world_dir);
        assert_eq!(inst.config_path, Some(dir.path().join("fixed.conf")));
        assert_eq!(inst.seed, Some(42));
    }

    #[test]
    fn client_mods_are_added_to_server_mods() {
        let dir = tempfile::tempdir().unwrap();
        let prov = provisioner(dir.path());
        let config = BridgeConfig {
            client_mods: vec!["treechop".into(), "rewards".into()],
            server_mods: vec!["mobs".into(), "treechop".into()],
            ..BridgeConfig::default()
        };
        let inst = prov.provision(&config);
        assert_eq!(inst.client_mods, vec!["treechop".to_string(), "rewards".into()]);
        assert_eq!(inst.server_mods, vec!["mobs".to_string(), "treechop".into()]);
    }

    // ---- files ----

    #[test]
    fn write_config_round_trips_settings() {
        let dir = tempfile::tempdir().unwrap();
        let prov = provisioner(dir.path());
        let mut config = seeded(42);
        config.display_size = [64, 48];
        config
            .overrides
            .insert("viewing_range".into(), ConfValue::Int(50));
        let inst = prov.provision(&config);
        prov.write_config(&inst).unwrap();

        let read = conf::read_conf(inst.config_path.as_ref().unwrap()).unwrap();
        assert_eq!(read, inst.settings());
        assert_eq!(read["screen_w"], ConfValue::Int(64));
        assert_eq!(read["fixed_map_seed"], ConfValue::Int(42));
        assert_eq!(read["viewing_range"], ConfValue::Int(50));
    }

    #[test]
    fn delete_without_paths_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let prov = provisioner(dir.path());
        let mut inst = prov.provision(&seeded(1));
        inst.world_dir = None;
        inst.config_path = None;
        assert!(matches!(
            prov.delete_world(&inst),
            Err(ProvisionError::Config(ConfigError::MissingWorldDir))
        ));
        assert!(matches!(
            prov.delete_config(&inst),
            Err(ProvisionError::Config(ConfigError::MissingConfigPath))
        ));
        assert!(matches!(
            prov.write_config(&inst),
            Err(ProvisionError::Config(ConfigError::MissingConfigPath))
        ));
    }

    #[test]
    fn delete_removes_files_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let prov = provisioner(dir.path());
        let inst = prov.provision(&seeded(3));
        prov.write_config(&inst).unwrap();
        fs::create_dir_all(inst.world_dir.as_ref().unwrap().join("worldmods")).unwrap();

        prov.delete_world(&inst).unwrap();
        prov.delete_config(&inst).unwrap();
        assert!(!inst.world_dir.as_ref().unwrap().exists());
        assert!(!inst.config_path.as_ref().unwrap().exists());

        prov.delete_world(&inst).unwrap();
        prov.delete_config(&inst).unwrap();
    }

    #[test]
    fn enable_mods_uses_instance_lists() {
        let dir = tempfile::tempdir().unwrap();
        let prov = provisioner(dir.path());
        fs::create_dir_all(prov.mod_dirs().client.join("rewards")).unwrap();
        fs::create_dir_all(prov.mod_dirs().server.join("treechop")).unwrap();
        fs::write(prov.mod_dirs().server.join("treechop").join("init.lua"), "").unwrap();

        let config = BridgeConfig {
            seed: Some(5),
            client_mods: vec!["treechop".into()],
            ..BridgeConfig::default()
        };
        let inst = prov.provision(&config);
        assert_eq!(prov.enable_client_mods(&inst).unwrap(), vec!["rewards".to_string()]);
        assert_eq!(prov.enable_server_mods(&inst).unwrap(), vec!["treechop".to_string()]);
        assert!(
            inst.world_dir
                .unwrap()
                .join("worldmods/treechop/init.lua")
                .exists()
        );
    }
}
