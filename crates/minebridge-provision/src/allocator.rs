//! Disjoint resources for N parallel instances.
//!
//! Rank `i` gets `base + i` in every dimension (env port, server port, sync
//! port, display index, seed). A template's own seed or virtual display
//! index is offset the same way when no base is set. Ranges of different
//! port kinds must not overlap either, so allocation fails instead of handing
//! two instances the same port.

use std::collections::HashSet;

use minebridge_core::config::{BridgeConfig, DisplayMode, SyncConfig};
use minebridge_core::error::ConfigError;
use serde::{Deserialize, Serialize};

const fn default_base_env_port() -> u16 {
    5555
}
const fn default_base_server_port() -> u16 {
    30000
}
const fn default_sync_dtime() -> f64 {
    0.001
}
const fn default_display_depth() -> u32 {
    24
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// Resources assigned to one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub rank: usize,
    pub env_port: u16,
    pub server_port: u16,
    pub sync_port: Option<u16>,
    pub display_index: Option<u32>,
    pub seed: Option<u64>,
}

// ---------------------------------------------------------------------------
// InstanceAllocator
// ---------------------------------------------------------------------------

/// Base values from which per-rank resources are offset.
///
/// # Example
///
/// ```
/// use minebridge_provision::allocator::InstanceAllocator;
///
/// let alloc = InstanceAllocator {
///     base_display: Some(10),
///     ..InstanceAllocator::default()
/// };
/// let all = alloc.allocate_all(3).unwrap();
/// assert_eq!(all[2].env_port, 5557);
/// assert_eq!(all[2].display_index, Some(12));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceAllocator {
    #[serde(default = "default_base_env_port")]
    pub base_env_port: u16,
    #[serde(default = "default_base_server_port")]
    pub base_server_port: u16,
    /// Enables lock-step sync ports when set.
    #[serde(default)]
    pub base_sync_port: Option<u16>,
    /// Enables per-rank virtual displays when set.
    #[serde(default)]
    pub base_display: Option<u32>,
    /// Seeds every rank when set.
    #[serde(default)]
    pub base_seed: Option<u64>,
}

impl Default for InstanceAllocator {
    fn default() -> Self {
        Self {
            base_env_port: default_base_env_port(),
            base_server_port: default_base_server_port(),
            base_sync_port: None,
            base_display: None,
            base_seed: None,
        }
    }
}

impl InstanceAllocator {
    /// Resources for a single rank.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] if any offset overflows its type.
    pub fn allocate(&self, rank: usize) -> Result<Allocation, ConfigError> {
        let port = |field: &str, base: u16| {
            u16::try_from(rank)
                .ok()
                .and_then(|r| base.checked_add(r))
                .ok_or_else(|| overflow(field, rank))
        };
        Ok(Allocation {
            rank,
            env_port: port("env_port", self.base_env_port)?,
            server_port: port("server_port", self.base_server_port)?,
            sync_port: self
                .base_sync_port
                .map(|b| port("sync_port", b))
                .transpose()?,
            display_index: self
                .base_display
                .map(|b| {
                    u32::try_from(rank)
                        .ok()
                        .and_then(|r| b.checked_add(r))
                        .ok_or_else(|| overflow("display", rank))
                })
                .transpose()?,
            seed: self
                .base_seed
                .map(|b| b.checked_add(rank as u64).ok_or_else(|| overflow("seed", rank)))
                .transpose()?,
        })
    }

    /// Resources for ranks `0..n`, checked to be pairwise disjoint.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Collision`] if a port would be handed out twice (for
    /// example an env port range running into the server port range), or
    /// an overflow error from [`allocate`](Self::allocate).
    pub fn allocate_all(&self, n: usize) -> Result<Vec<Allocation>, ConfigError> {
        let allocations = (0..n)
            .map(|rank| self.allocate(rank))
            .collect::<Result<Vec<_>, _>>()?;

        let mut ports = HashSet::new();
        for a in &allocations {
            for port in [Some(a.env_port), Some(a.server_port), a.sync_port]
                .into_iter()
                .flatten()
            {
                if !ports.insert(port) {
                    return Err(ConfigError::Collision {
                        resource: "port",
                        value: u64::from(port),
                    });
                }
            }
        }
        Ok(allocations)
    }

    /// Derive one bridge configuration per rank from a shared template.
    ///
    /// Display settings other than the index (Xvfb start, depth) and the
    /// sync step size are kept from the template. Without a base seed or
    /// base display, a seeded template or a virtual-display template is
    /// offset by rank instead, so no two ranks share a derived world, config
    /// file or X display.
    ///
    /// # Errors
    ///
    /// [`ConfigError::SharedPath`] if `n > 1` and the template names an
    /// explicit world directory or config path, allocation errors, and
    /// validation errors of the derived configurations.
    pub fn configure(&self, template: &BridgeConfig, n: usize) -> Result<Vec<BridgeConfig>, ConfigError> {
        if n > 1 {
            if template.paths.world_dir.is_some() {
                return Err(ConfigError::SharedPath("world directory"));
            }
            if template.paths.config_path.is_some() {
                return Err(ConfigError::SharedPath("config path"));
            }
        }
        let shared = n > 1;
        self.allocate_all(n)?
            .into_iter()
            .map(|a| {
                let mut config = template.clone();
                config.env_port = a.env_port;
                config.server_port = a.server_port;
                if let Some(port) = a.sync_port {
                    let dtime = template.sync.map_or_else(default_sync_dtime, |s| s.dtime);
                    config.sync = Some(SyncConfig { port, dtime });
                }

                let index = match (a.display_index, template.display) {
                    (Some(index), _) => Some(index),
                    (None, DisplayMode::Virtual { index, .. }) if shared => Some(
                        u32::try_from(a.rank)
                            .ok()
                            .and_then(|r| index.checked_add(r))
                            .ok_or_else(|| overflow("display", a.rank))?,
                    ),
                    (None, _) => None,
                };
                if let Some(index) = index {
                    config.display = match template.display {
                        DisplayMode::Virtual { start, depth, .. } => DisplayMode::Virtual {
                            index,
                            start,
                            depth,
                        },
                        _ => DisplayMode::Virtual {
                            index,
                            start: true,
                            depth: default_display_depth(),
                        },
                    };
                }

                config.seed = match (a.seed, template.seed) {
                    (Some(seed), _) => Some(seed),
                    (None, Some(seed)) if shared => Some(
                        seed.checked_add(a.rank as u64)
                            .ok_or_else(|| overflow("seed", a.rank))?,
                    ),
                    (None, seed) => seed,
                };
                config.validate()?;
                Ok(config)
            })
            .collect()
    }
}

fn overflow(field: &str, rank: usize) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("rank {rank} overflows the allocatable range"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::provisioner::{ConfigProvisioner, ModDirs};

    fn full() -> InstanceAllocator {
        InstanceAllocator {
            base_env_port: 6000,
            base_server_port: 31000,
            base_sync_port: Some(32000),
            base_display: Some(50),
            base_seed: Some(100),
        }
    }

    fn assert_distinct<T: std::hash::Hash + Eq + std::fmt::Debug>(values: impl IntoIterator<Item = T>) {
        let mut seen = HashSet::new();
        for v in values {
            assert!(seen.insert(v), "duplicate value");
        }
    }

    #[test]
    fn ranks_offset_every_dimension() {
        let a = full().allocate(3).unwrap();
        assert_eq!(
            a,
            Allocation {
                rank: 3,
                env_port: 6003,
                server_port: 31003,
                sync_port: Some(32003),
                display_index: Some(53),
                seed: Some(103),
            }
        );
    }

    #[test]
    fn all_dimensions_pairwise_distinct() {
        let all = full().allocate_all(16).unwrap();
        assert_eq!(all.len(), 16);
        assert_distinct(all.iter().map(|a| a.env_port));
        assert_distinct(all.iter().map(|a| a.server_port));
        assert_distinct(all.iter().filter_map(|a| a.sync_port));
        assert_distinct(all.iter().filter_map(|a| a.display_index));
        assert_distinct(all.iter().filter_map(|a| a.seed));
    }

    #[test]
    fn overlapping_port_ranges_rejected() {
        let alloc = InstanceAllocator {
            base_env_port: 30000,
            base_server_port: 30002,
            ..InstanceAllocator::default()
        };
        assert!(alloc.allocate_all(2).is_ok());
        assert!(matches!(
            alloc.allocate_all(3),
            Err(ConfigError::Collision { value: 30002, .. })
        ));
    }

    #[test]
    fn port_overflow_rejected() {
        let alloc = InstanceAllocator {
            base_env_port: u16::MAX,
            ..InstanceAllocator::default()
        };
        assert!(alloc.allocate(0).is_ok());
        assert!(matches!(
            alloc.allocate(1),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn configure_applies_allocation() {
        let template = BridgeConfig {
            display: DisplayMode::Virtual {
                index: 0,
                start: false,
                depth: 16,
            },
            ..BridgeConfig::default()
        };
        let configs = full().configure(&template, 2).unwrap();
        assert_eq!(configs[1].env_port, 6001);
        assert_eq!(configs[1].server_port, 31001);
        assert_eq!(configs[1].sync.map(|s| s.port), Some(32001));
        assert_eq!(configs[1].seed, Some(101));
        assert_eq!(
            configs[1].display,
            DisplayMode::Virtual {
                index: 51,
                start: false,
                depth: 16
            }
        );
    }

    #[test]
    fn seeded_template_is_offset_per_rank() {
        let template = BridgeConfig {
            seed: Some(9),
            ..BridgeConfig::default()
        };
        let configs = InstanceAllocator::default().configure(&template, 3).unwrap();
        let seeds: Vec<_> = configs.iter().map(|c| c.seed).collect();
        assert_eq!(seeds, vec![Some(9), Some(10), Some(11)]);
        assert_eq!(configs[0].display, DisplayMode::Windowed);

        let provisioner = ConfigProvisioner::new(ModDirs::from_config(&template), PathBuf::from("/tmp/engine"));
        let instances: Vec<_> = configs.iter().map(|c| provisioner.provision(c)).collect();
        assert_distinct(instances.iter().map(|i| i.world_dir.clone()));
        assert_distinct(instances.iter().map(|i| i.config_path.clone()));
    }

    #[test]
    fn single_rank_keeps_template_seed() {
        let template = BridgeConfig {
            seed: Some(9),
            ..BridgeConfig::default()
        };
        let configs = InstanceAllocator::default().configure(&template, 1).unwrap();
        assert_eq!(configs[0].seed, Some(9));
    }

    #[test]
    fn seed_offset_overflow_rejected() {
        let template = BridgeConfig {
            seed: Some(u64::MAX),
            ..BridgeConfig::default()
        };
        assert!(matches!(
            InstanceAllocator::default().configure(&template, 2),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn virtual_display_template_is_offset_per_rank() {
        let template = BridgeConfig {
            display: DisplayMode::Virtual {
                index: 5,
                start: true,
                depth: 24,
            },
            ..BridgeConfig::default()
        };
        let configs = InstanceAllocator::default().configure(&template, 3).unwrap();
        let displays: Vec<_> = configs.iter().map(|c| c.display).collect();
        assert_eq!(
            displays,
            (5..8)
                .map(|index| DisplayMode::Virtual {
                    index,
                    start: true,
                    depth: 24
                })
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn explicit_paths_cannot_be_shared() {
        let mut template = BridgeConfig::default();
        template.paths.world_dir = Some(PathBuf::from("/tmp/world"));
        assert!(InstanceAllocator::default().configure(&template, 1).is_ok());
        assert!(matches!(
            InstanceAllocator::default().configure(&template, 2),
            Err(ConfigError::SharedPath(_))
        ));
    }

    #[test]
    fn allocator_from_toml() {
        let alloc: InstanceAllocator = toml::from_str("base_env_port = 7000\nbase_seed = 1\n").unwrap();
        assert_eq!(alloc.base_env_port, 7000);
        assert_eq!(alloc.base_server_port, 30000);
        assert_eq!(alloc.base_seed, Some(1));
    }
}
