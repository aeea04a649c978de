// minebridge-provision: Instance provisioning (identity, config, mods) and parallel resource allocation.

pub mod allocator;
pub mod mods;
pub mod provisioner;

pub use allocator::{Allocation, InstanceAllocator};
pub use provisioner::{BASE_CLIENT_MOD, ConfigProvisioner, ModDirs};
